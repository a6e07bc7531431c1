//! flexscale-bus — messaging for the flexscale autoscaler.
//!
//! Defines the metric and event records that flow between the platform,
//! the autoscaler core and downstream consumers, the length-delimited
//! frame codec they travel in, and the in-process `MessageBus` the rest
//! of the system programs against. The wire-level broker client is an
//! external collaborator; everything here is the publish/subscribe
//! contract it has to satisfy.
//!
//! # Topics
//!
//! | topic | direction | payload |
//! |---|---|---|
//! | `metric.container` | in | [`ContainerMetric`] |
//! | `metric.http` | in | [`HttpMetric`] |
//! | `metric.instance` | in | [`InstanceMetric`] |
//! | `metric.application` | out | [`ApplicationMetric`] |
//! | `scaling.log` | out | [`ScalingLog`] |
//! | `binding.event` | out | [`BindingEvent`] |

pub mod bus;
pub mod codec;
pub mod messages;
pub mod topics;

pub use bus::{BusSubscription, MessageBus};
pub use codec::{decode_frame, decode_message, encode_frame, encode_message, CodecError};
pub use messages::*;
