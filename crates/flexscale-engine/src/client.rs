//! Scaling engine client.
//!
//! Plain HTTP/1 over a fresh TCP connection per request: order volume
//! is a handful of calls per scaler tick, so connection pooling buys
//! nothing. A URL without a scheme defaults to `http://`.

use std::time::Duration;

use anyhow::{bail, Context};
use http_body_util::BodyExt;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use flexscale_state::BindingContext;

/// Connection details of the scaling engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Host (and optional port/scheme) of the engine.
    pub host: String,
    /// Path prefix for scaling orders.
    pub scaling_endpoint: String,
    /// Path prefix for application-name lookups.
    pub name_endpoint: String,
    /// Shared secret sent with every request.
    pub secret: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8091".to_string(),
            scaling_endpoint: "v1/scale".to_string(),
            name_endpoint: "v1/name".to_string(),
            secret: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Body of a scaling order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingRequest {
    pub new_instances: u32,
    pub context: BindingContext,
}

/// Body of an application-name lookup; the engine echoes it back with
/// `name` filled in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationNameRequest {
    pub resource_id: String,
    pub name: String,
    pub context: BindingContext,
}

/// Client for the scaling engine's HTTP API.
#[derive(Debug, Clone)]
pub struct ScalingEngineClient {
    config: EngineConfig,
}

impl ScalingEngineClient {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Send a scaling order for a resource.
    ///
    /// Returns the engine's status code; the caller treats anything
    /// non-2xx as "not confirmed" and retries on its next tick.
    pub async fn scale(
        &self,
        resource_id: &str,
        context: &BindingContext,
        new_instances: u32,
    ) -> anyhow::Result<StatusCode> {
        let order = ScalingRequest {
            new_instances,
            context: context.clone(),
        };
        let url = self.url(&self.config.scaling_endpoint, resource_id)?;
        debug!(%resource_id, new_instances, url = %url.display(), "sending scaling order");

        let (status, _body) = self.post_json(&url, &order).await?;
        Ok(status)
    }

    /// Ask the engine for the resource's application name.
    ///
    /// Returns `None` when the engine answers but leaves the name
    /// empty (it could not resolve the resource).
    pub async fn fetch_application_name(
        &self,
        resource_id: &str,
        context: &BindingContext,
    ) -> anyhow::Result<Option<String>> {
        let request = ApplicationNameRequest {
            resource_id: resource_id.to_string(),
            name: String::new(),
            context: context.clone(),
        };
        let url = self.url(&self.config.name_endpoint, resource_id)?;
        debug!(%resource_id, url = %url.display(), "sending name request");

        let (status, body) = self.post_json(&url, &request).await?;
        if !status.is_success() {
            bail!("name request for '{resource_id}' answered with {status}");
        }
        let answer: ApplicationNameRequest =
            serde_json::from_slice(&body).context("name response is not valid JSON")?;
        Ok((!answer.name.is_empty()).then_some(answer.name))
    }

    fn url(&self, endpoint: &str, resource_id: &str) -> anyhow::Result<EngineUrl> {
        EngineUrl::parse(&self.config.host, endpoint, resource_id)
    }

    /// POST a JSON body, returning status and response bytes.
    async fn post_json<T: Serialize>(
        &self,
        url: &EngineUrl,
        body: &T,
    ) -> anyhow::Result<(StatusCode, bytes::Bytes)> {
        let payload = serde_json::to_vec(body)?;

        tokio::time::timeout(self.config.timeout, async {
            let stream = tokio::net::TcpStream::connect(&url.authority)
                .await
                .with_context(|| format!("connecting to scaling engine at {}", url.authority))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .context("scaling engine handshake failed")?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("POST")
                .uri(&url.path)
                .header("host", &url.authority)
                .header("secret", &self.config.secret)
                .header("content-type", "application/json")
                .body(http_body_util::Full::new(bytes::Bytes::from(payload)))?;

            let resp = sender.send_request(req).await?;
            let status = resp.status();
            let body = resp.into_body().collect().await?.to_bytes();
            Ok::<_, anyhow::Error>((status, body))
        })
        .await
        .context("scaling engine request timed out")?
    }
}

/// Split an engine URL into the TCP authority and the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EngineUrl {
    authority: String,
    path: String,
}

impl EngineUrl {
    fn parse(host: &str, endpoint: &str, resource_id: &str) -> anyhow::Result<Self> {
        let host = match host.strip_prefix("http://") {
            Some(rest) => rest,
            None if host.starts_with("https://") => {
                bail!("https scaling engine endpoints are not supported")
            }
            None => host,
        };
        let (authority, base_path) = match host.split_once('/') {
            Some((authority, path)) => (authority, format!("/{path}")),
            None => (host, String::new()),
        };
        if authority.is_empty() {
            bail!("scaling engine host is empty");
        }
        Ok(Self {
            authority: authority.to_string(),
            path: format!("{base_path}/{endpoint}/{resource_id}"),
        })
    }

    fn display(&self) -> String {
        format!("http://{}{}", self.authority, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_defaults_to_http() {
        let url = EngineUrl::parse("engine:8091", "v1/scale", "app-1").unwrap();
        assert_eq!(url.authority, "engine:8091");
        assert_eq!(url.path, "/v1/scale/app-1");
        assert_eq!(url.display(), "http://engine:8091/v1/scale/app-1");
    }

    #[test]
    fn url_accepts_explicit_scheme_and_base_path() {
        let url = EngineUrl::parse("http://engine:8091/engine", "v1/name", "app-1").unwrap();
        assert_eq!(url.authority, "engine:8091");
        assert_eq!(url.path, "/engine/v1/name/app-1");
    }

    #[test]
    fn https_is_rejected() {
        assert!(EngineUrl::parse("https://engine", "v1/scale", "app-1").is_err());
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(EngineUrl::parse("", "v1/scale", "app-1").is_err());
    }

    #[test]
    fn scaling_request_serializes_context() {
        let mut context = BindingContext::default();
        context.platform = "cloudfoundry".to_string();
        let order = ScalingRequest {
            new_instances: 4,
            context,
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["new_instances"], 4);
        assert_eq!(json["context"]["platform"], "cloudfoundry");
    }

    // Network behavior (headers, bodies, status mapping) is exercised
    // end-to-end in the scaler loop tests against a local listener.
}
