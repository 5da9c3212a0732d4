//! Channel multiplexing engine.
//!
//! Binds channel IDs to endpoints and moves bytes between those endpoints
//! and one shared serial line, in two independent directions:
//! - ingress: frames read from the line are delivered to the endpoint
//!   registered for their channel
//! - egress: every endpoint is polled in registration order and whatever
//!   it has to say goes out as one frame on the line

pub mod config;
pub mod egress;
pub mod engine;
pub mod error;
pub mod ingress;
pub mod registry;
pub mod shutdown;
pub mod stats;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{MuxError, Result};
pub use registry::{ChannelRegistry, Endpoint};
pub use shutdown::ShutdownSignal;
pub use stats::{DirectionStats, EngineReport};
