//! Serial line → endpoints.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use sermux_frame::{FrameError, FrameHeader, FrameReader};
use sermux_transport::{is_idle, Port};
use tracing::{debug, error, trace, warn};

use crate::config::EngineConfig;
use crate::registry::{ChannelRegistry, Endpoint};
use crate::shutdown::ShutdownSignal;
use crate::stats::DirectionStats;

/// Read frames from `transport` and hand each payload to its channel's
/// endpoint until `shutdown` is triggered.
///
/// Frames for unregistered channels, and frames declaring more payload
/// than the configured maximum, are drained byte for byte and dropped so
/// the next header is read at the right offset.
pub fn run(
    transport: &dyn Port,
    registry: &ChannelRegistry,
    config: &EngineConfig,
    shutdown: &ShutdownSignal,
) -> DirectionStats {
    let reader =
        FrameReader::with_config(transport, config.frame_config()).with_stop_flag(shutdown.flag());
    let mut ingress = Ingress {
        reader,
        registry,
        config,
        shutdown,
        buf: vec![0u8; config.max_payload_size],
        stalled: HashSet::new(),
        consecutive_errors: 0,
        stats: DirectionStats::default(),
    };

    debug!("ingress started");
    ingress.run();
    debug!(frames = ingress.stats.frames, "ingress stopped");
    ingress.stats
}

struct Ingress<'a> {
    reader: FrameReader<&'a dyn Port>,
    registry: &'a ChannelRegistry,
    config: &'a EngineConfig,
    shutdown: &'a ShutdownSignal,
    buf: Vec<u8>,
    /// Channels whose endpoint already ran out its stall timeout. Writes to
    /// them fail on the first `WouldBlock` until they accept a byte again.
    stalled: HashSet<u8>,
    consecutive_errors: u32,
    stats: DirectionStats,
}

impl<'a> Ingress<'a> {
    fn run(&mut self) {
        while !self.shutdown.is_triggered() {
            let Some(header) = self.next_header() else {
                continue;
            };

            let registry = self.registry;
            let keep_going = match registry.lookup(header.channel) {
                Some(endpoint) => self.deliver(header, endpoint),
                None => self.drop_unroutable(header),
            };
            if !keep_going {
                break;
            }
        }
    }

    /// `None` means no frame this time round; the caller re-checks shutdown.
    fn next_header(&mut self) -> Option<FrameHeader> {
        match self.reader.read_header() {
            Ok(header) => {
                self.consecutive_errors = 0;
                trace!(channel = header.channel, len = header.len, "frame header");
                Some(header)
            }
            Err(FrameError::Cancelled) => None,
            Err(FrameError::PayloadTooLarge { size, max }) => {
                self.stats.oversized += 1;
                warn!(size, max, "declared frame length exceeds maximum; discarding");
                None
            }
            Err(FrameError::Io(err)) => {
                self.transport_error(err);
                None
            }
            Err(err) => {
                warn!(error = %err, "unexpected frame error");
                None
            }
        }
    }

    /// Returns false if shutdown interrupted the frame.
    fn deliver(&mut self, header: FrameHeader, endpoint: &Endpoint) -> bool {
        let mut delivered = 0usize;
        let mut endpoint_failed = false;

        loop {
            let n = match self.reader.read_payload(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(FrameError::Cancelled) => return false,
                Err(FrameError::Io(err)) => {
                    if !self.transport_error(err) {
                        return false;
                    }
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "unexpected frame error");
                    continue;
                }
            };
            self.consecutive_errors = 0;

            if endpoint_failed {
                continue;
            }
            let patience = if self.stalled.contains(&header.channel) {
                Duration::ZERO
            } else {
                self.config.endpoint_stall_timeout
            };
            match write_all(endpoint, &self.buf[..n], patience, self.config, self.shutdown) {
                Ok(()) => {
                    if self.stalled.remove(&header.channel) {
                        debug!(channel = header.channel, "endpoint accepting data again");
                    }
                    delivered += n;
                }
                Err(err) => {
                    endpoint_failed = true;
                    self.stats.endpoint_errors += 1;
                    if err.kind() == std::io::ErrorKind::TimedOut {
                        if self.stalled.insert(header.channel) {
                            warn!(
                                channel = header.channel,
                                name = endpoint.name(),
                                "endpoint not draining; dropping its frames until it does"
                            );
                        }
                    } else {
                        warn!(
                            channel = header.channel,
                            name = endpoint.name(),
                            error = %err,
                            "endpoint write failed; dropping rest of frame"
                        );
                    }
                }
            }
        }

        self.stats.frames += 1;
        self.stats.bytes += delivered as u64;
        trace!(channel = header.channel, bytes = delivered, "delivered frame");
        true
    }

    /// Returns false if shutdown interrupted the drain.
    fn drop_unroutable(&mut self, header: FrameHeader) -> bool {
        self.stats.unroutable += 1;
        warn!(
            channel = header.channel,
            len = header.len,
            "frame for unregistered channel; discarding payload"
        );
        loop {
            match self.reader.discard_payload() {
                Ok(_) => return true,
                Err(FrameError::Cancelled) => return false,
                Err(FrameError::Io(err)) => {
                    if !self.transport_error(err) {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "unexpected frame error");
                    return true;
                }
            }
        }
    }

    /// Count a hard read error on the line. Returns false once the
    /// configured limit is hit and shutdown has been requested.
    fn transport_error(&mut self, err: std::io::Error) -> bool {
        self.stats.transport_errors += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        if let Some(limit) = self.config.transport_error_limit {
            if self.consecutive_errors >= limit {
                error!(
                    errors = self.consecutive_errors,
                    error = %err,
                    "serial line keeps failing; requesting shutdown"
                );
                self.shutdown.trigger();
                return false;
            }
        }

        if self.consecutive_errors == 1 {
            warn!(error = %err, "serial line read failed");
        } else {
            debug!(errors = self.consecutive_errors, error = %err, "serial line read failed");
        }
        std::thread::sleep(self.config.poll_interval);
        true
    }
}

/// Write all of `data` to `endpoint`, waiting out a full endpoint for at
/// most `patience` without progress.
fn write_all(
    endpoint: &Endpoint,
    mut data: &[u8],
    patience: Duration,
    config: &EngineConfig,
    shutdown: &ShutdownSignal,
) -> std::io::Result<()> {
    let mut stalled_since: Option<Instant> = None;
    while !data.is_empty() {
        match endpoint.write_bytes(data) {
            Ok(0) => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero)),
            Ok(n) => {
                data = &data[n..];
                stalled_since = None;
            }
            Err(err) if is_idle(&err) => {
                let since = *stalled_since.get_or_insert_with(Instant::now);
                if shutdown.is_triggered() || since.elapsed() >= patience {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "endpoint not accepting data",
                    ));
                }
                std::thread::sleep(config.poll_interval);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
