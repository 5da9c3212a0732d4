use std::time::Duration;

use sermux_frame::{FrameConfig, MAX_PAYLOAD};

use crate::error::{MuxError, Result};

/// Tunables for the multiplexing engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sleep between polls when neither the line nor any endpoint has data.
    pub poll_interval: Duration,
    /// Largest payload carried by one frame, in either direction.
    pub max_payload_size: usize,
    /// How long ingress keeps retrying a full endpoint before dropping the
    /// rest of a chunk for it.
    pub endpoint_stall_timeout: Duration,
    /// Consecutive hard read errors on the serial line after which ingress
    /// requests shutdown. `None` treats them like an idle line forever.
    pub transport_error_limit: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            max_payload_size: MAX_PAYLOAD,
            endpoint_stall_timeout: Duration::from_millis(500),
            transport_error_limit: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PAYLOAD {
            return Err(MuxError::InvalidConfig(format!(
                "max payload size must be 1..={MAX_PAYLOAD}, got {}",
                self.max_payload_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(MuxError::InvalidConfig(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.transport_error_limit == Some(0) {
            return Err(MuxError::InvalidConfig(
                "transport error limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            poll_interval: self.poll_interval,
        }
    }
}
