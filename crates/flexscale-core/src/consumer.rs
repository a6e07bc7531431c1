//! Metric consumers — bus subscribers feeding the app buffers.
//!
//! One long-lived task per topic. Each payload is unframed, decoded,
//! routed to the owning app by resource id (dropped silently when no
//! binding matches), and appended under the app's mutex. The consumers
//! never block the aggregator or scaler: appends are cheap and the
//! guard is released immediately.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use flexscale_bus::{
    decode_message, topics, ContainerMetric, HttpMetric, InstanceMetric, MessageBus,
};

use crate::manager::ScalableAppManager;

/// Spawn all metric consumers. Each observes the shutdown signal.
pub fn spawn_consumers(
    manager: Arc<ScalableAppManager>,
    bus: MessageBus,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_container_consumer(
            manager.clone(),
            bus.clone(),
            shutdown.clone(),
        )),
        tokio::spawn(run_http_consumer(
            manager.clone(),
            bus.clone(),
            shutdown.clone(),
        )),
        tokio::spawn(run_instance_consumer(manager, bus, shutdown)),
    ]
}

/// Consume container metrics into the per-app container buffers.
pub async fn run_container_consumer(
    manager: Arc<ScalableAppManager>,
    bus: MessageBus,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sub = bus.subscribe(topics::CONTAINER_METRICS);
    info!(topic = topics::CONTAINER_METRICS, "consumer started");

    loop {
        tokio::select! {
            payload = sub.recv() => {
                let Some(payload) = payload else { break };
                let metric: ContainerMetric = match decode_message(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(topic = topics::CONTAINER_METRICS, error = %e, "dropping undecodable payload");
                        continue;
                    }
                };
                let Some(app) = manager.get_by_resource_id(&metric.app_id).await else {
                    trace!(app = %metric.app_id, "container metric for unbound app, dropped");
                    continue;
                };
                let mut state = app.lock().await;
                state.add_container_metric(metric);
            }
            _ = shutdown.changed() => break,
        }
    }
    info!(topic = topics::CONTAINER_METRICS, "consumer stopped");
}

/// Consume HTTP metrics into the per-app HTTP buffers.
pub async fn run_http_consumer(
    manager: Arc<ScalableAppManager>,
    bus: MessageBus,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sub = bus.subscribe(topics::HTTP_METRICS);
    info!(topic = topics::HTTP_METRICS, "consumer started");

    loop {
        tokio::select! {
            payload = sub.recv() => {
                let Some(payload) = payload else { break };
                let metric: HttpMetric = match decode_message(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(topic = topics::HTTP_METRICS, error = %e, "dropping undecodable payload");
                        continue;
                    }
                };
                let Some(app) = manager.get_by_resource_id(&metric.app_id).await else {
                    trace!(app = %metric.app_id, "http metric for unbound app, dropped");
                    continue;
                };
                let mut state = app.lock().await;
                state.add_http_metric(metric);
            }
            _ = shutdown.changed() => break,
        }
    }
    info!(topic = topics::HTTP_METRICS, "consumer stopped");
}

/// Consume platform instance-count notifications.
pub async fn run_instance_consumer(
    manager: Arc<ScalableAppManager>,
    bus: MessageBus,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sub = bus.subscribe(topics::INSTANCE_METRICS);
    info!(topic = topics::INSTANCE_METRICS, "consumer started");

    loop {
        tokio::select! {
            payload = sub.recv() => {
                let Some(payload) = payload else { break };
                let metric: InstanceMetric = match decode_message(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(topic = topics::INSTANCE_METRICS, error = %e, "dropping undecodable payload");
                        continue;
                    }
                };
                let Some(app) = manager.get_by_resource_id(&metric.app_id).await else {
                    trace!(app = %metric.app_id, "instance metric for unbound app, dropped");
                    continue;
                };
                let mut state = app.lock().await;
                if state.current_instance_count != metric.instance_count {
                    debug!(
                        app = %metric.app_id,
                        from = state.current_instance_count,
                        to = metric.instance_count,
                        "instance count updated by platform"
                    );
                }
                state.current_instance_count = metric.instance_count;
            }
            _ = shutdown.changed() => break,
        }
    }
    info!(topic = topics::INSTANCE_METRICS, "consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    use flexscale_bus::encode_message;
    use flexscale_state::BlueprintStore;

    use crate::app::tests::test_binding;
    use crate::settings::ScalerSettings;

    async fn fixture() -> (Arc<ScalableAppManager>, MessageBus, watch::Sender<bool>) {
        let bus = MessageBus::new();
        let manager = Arc::new(ScalableAppManager::new(
            BlueprintStore::open_in_memory().unwrap(),
            bus.clone(),
            ScalerSettings::default(),
        ));
        let app = manager.new_app(test_binding("b-1"));
        manager.add(app, false).await;

        let (tx, rx) = watch::channel(false);
        spawn_consumers(manager.clone(), bus.clone(), rx);
        // Give the consumers a beat to subscribe.
        tokio::time::sleep(Duration::from_millis(20)).await;
        (manager, bus, tx)
    }

    async fn eventually<F>(mut check: F)
    where
        F: AsyncFnMut() -> bool,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn container_metric_routed_to_app_buffer() {
        let (manager, bus, _tx) = fixture().await;
        let metric = ContainerMetric {
            timestamp: 1_000,
            app_id: "resource-b-1".to_string(),
            instance_index: 0,
            cpu: 50,
            ram: 1_000,
            description: String::new(),
        };
        bus.publish(topics::CONTAINER_METRICS, encode_message(&metric).unwrap());

        let app = manager.get("b-1").await.unwrap();
        eventually(async || app.lock().await.container_metrics_len() == 1).await;
    }

    #[tokio::test]
    async fn http_metric_routed_to_app_buffer() {
        let (manager, bus, _tx) = fixture().await;
        let metric = HttpMetric {
            timestamp: 1_000,
            app_id: "resource-b-1".to_string(),
            requests: 7,
            latency: 11,
            description: String::new(),
        };
        bus.publish(topics::HTTP_METRICS, encode_message(&metric).unwrap());

        let app = manager.get("b-1").await.unwrap();
        eventually(async || app.lock().await.http_metrics_len() == 1).await;
    }

    #[tokio::test]
    async fn instance_metric_updates_count() {
        let (manager, bus, _tx) = fixture().await;
        let metric = InstanceMetric {
            timestamp: 1_000,
            app_id: "resource-b-1".to_string(),
            instance_count: 7,
            description: String::new(),
        };
        bus.publish(topics::INSTANCE_METRICS, encode_message(&metric).unwrap());

        let app = manager.get("b-1").await.unwrap();
        eventually(async || app.lock().await.current_instance_count == 7).await;
    }

    #[tokio::test]
    async fn unknown_resource_id_dropped_silently() {
        let (manager, bus, _tx) = fixture().await;
        let metric = ContainerMetric {
            timestamp: 1_000,
            app_id: "somebody-else".to_string(),
            instance_index: 0,
            cpu: 50,
            ram: 1_000,
            description: String::new(),
        };
        bus.publish(topics::CONTAINER_METRICS, encode_message(&metric).unwrap());
        // Follow with a routable metric; when it lands, the unknown one
        // has been processed and dropped.
        let routable = ContainerMetric {
            app_id: "resource-b-1".to_string(),
            ..metric
        };
        bus.publish(topics::CONTAINER_METRICS, encode_message(&routable).unwrap());

        let app = manager.get("b-1").await.unwrap();
        eventually(async || app.lock().await.container_metrics_len() == 1).await;
    }

    #[tokio::test]
    async fn undecodable_payload_skipped() {
        let (manager, bus, _tx) = fixture().await;
        bus.publish(topics::CONTAINER_METRICS, Bytes::from_static(b"\x00\x00\x00\x02{}"));

        let metric = ContainerMetric {
            timestamp: 1_000,
            app_id: "resource-b-1".to_string(),
            instance_index: 0,
            cpu: 50,
            ram: 1_000,
            description: String::new(),
        };
        bus.publish(topics::CONTAINER_METRICS, encode_message(&metric).unwrap());

        let app = manager.get("b-1").await.unwrap();
        eventually(async || app.lock().await.container_metrics_len() == 1).await;
    }

    #[tokio::test]
    async fn shutdown_stops_consumers() {
        let bus = MessageBus::new();
        let manager = Arc::new(ScalableAppManager::new(
            BlueprintStore::open_in_memory().unwrap(),
            bus.clone(),
            ScalerSettings::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handles = spawn_consumers(manager, bus, rx);

        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("consumer did not stop")
                .unwrap();
        }
    }
}
