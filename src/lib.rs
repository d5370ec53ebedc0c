//! Client-side telemetry engine: timed moments with lateness-triggered screenshots,
//! severity-tagged log events and start/complete/fail business flows.
//!
//! Hosts normally go through [`app::initialize_sdk`] and the returned [`app::Sdk`]
//! handle. The engine pieces ([`moments::MomentRegistry`], [`flows::FlowEngine`],
//! [`events::EventLogger`]) can also be assembled directly with custom collaborators.

pub mod app;
pub mod events;
pub mod flows;
pub mod identity;
pub mod logger;
pub mod moments;
pub mod platform;
pub mod properties;
pub mod screenshot;
pub mod transport;
