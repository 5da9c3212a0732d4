//! Serial channel multiplexer.
//!
//! Many independent byte channels share one serial line. Each channel is
//! exposed locally as a pseudo-terminal; on the line every chunk of
//! channel data travels as a frame: one channel byte, a big-endian `u16`
//! length, then the payload.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial device and pseudo-terminal acquisition, the `Port` trait
//! - [`frame`]: frame encoding, decoding and polling frame I/O
//! - [`mux`]: channel registry and the two-direction engine

/// Re-export transport types.
pub mod transport {
    pub use sermux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sermux_frame::*;
}

/// Re-export engine types.
pub mod mux {
    pub use sermux_mux::*;
}
