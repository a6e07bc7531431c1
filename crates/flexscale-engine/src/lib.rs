//! flexscale-engine — outbound HTTP for the autoscaler.
//!
//! The scaling engine is an external service that performs the actual
//! instance-count changes on the platform. This crate owns the two
//! calls the autoscaler makes against it: scaling orders and
//! application-name lookups. Failures are never fatal; the scaler loop
//! logs and retries on its next tick.

pub mod client;

pub use client::{ApplicationNameRequest, EngineConfig, ScalingEngineClient, ScalingRequest};
