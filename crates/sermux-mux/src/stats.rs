use serde::Serialize;

/// Counters kept by one direction of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionStats {
    /// Frames delivered (ingress) or sent (egress).
    pub frames: u64,
    /// Payload bytes delivered or sent.
    pub bytes: u64,
    /// Frames for channels nobody registered; payload drained and dropped.
    pub unroutable: u64,
    /// Frames whose declared length exceeded the maximum payload size.
    pub oversized: u64,
    /// Frames the serial line only partly accepted.
    pub short_writes: u64,
    /// Failed writes to an endpoint.
    pub endpoint_errors: u64,
    /// Hard I/O errors on the serial line.
    pub transport_errors: u64,
}

/// What both directions did between start and shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    pub ingress: DirectionStats,
    pub egress: DirectionStats,
}
