//! Byte-stream endpoints for the serial multiplexer.
//!
//! Provides the two kinds of handles the multiplexing engine moves bytes
//! between:
//! - the physical serial line, opened non-blocking and configured raw
//! - pseudo-terminal endpoints, one per channel, optionally aliased by a
//!   symlink for external consumers
//!
//! Both are exposed to the engine only through the [`Port`] trait.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod pty;
#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};
pub use traits::{is_idle, Port};

#[cfg(unix)]
pub use pty::PtyEndpoint;
#[cfg(unix)]
pub use serial::{configure_raw, SerialPort};
