//! Endpoints → serial line.

use sermux_frame::{FrameError, FrameWriter};
use sermux_transport::{is_idle, Port};
use tracing::{debug, error, trace, warn};

use crate::config::EngineConfig;
use crate::registry::ChannelRegistry;
use crate::shutdown::ShutdownSignal;
use crate::stats::DirectionStats;

/// Poll every endpoint in registration order and forward what it has as
/// one frame per endpoint per pass, until `shutdown` is triggered.
///
/// Nothing to read, including a read error from an endpoint nobody has
/// opened yet, just moves on to the next endpoint. The loop only sleeps
/// after a pass in which no endpoint had anything. Shutdown is checked
/// after each endpoint, so a pass may end early.
pub fn run(
    transport: &dyn Port,
    registry: &ChannelRegistry,
    config: &EngineConfig,
    shutdown: &ShutdownSignal,
) -> DirectionStats {
    let mut writer = FrameWriter::with_config(transport, config.frame_config());
    let mut buf = vec![0u8; config.max_payload_size];
    let mut stats = DirectionStats::default();

    debug!("egress started");
    'passes: while !shutdown.is_triggered() {
        let mut forwarded = false;

        for endpoint in registry {
            let n = match endpoint.read_bytes(&mut buf) {
                Ok(n) => n,
                Err(err) if is_idle(&err) => 0,
                Err(err) => {
                    trace!(channel = endpoint.channel(), error = %err, "endpoint not readable");
                    0
                }
            };

            if n > 0 {
                forwarded = true;
                match writer.send(endpoint.channel(), &buf[..n]) {
                    Ok(()) => {
                        stats.frames += 1;
                        stats.bytes += n as u64;
                        trace!(channel = endpoint.channel(), bytes = n, "sent frame");
                    }
                    Err(FrameError::ShortWrite { written, expected }) => {
                        stats.short_writes += 1;
                        error!(
                            channel = endpoint.channel(),
                            written,
                            expected,
                            "short write on serial line; frame lost"
                        );
                    }
                    Err(err) => {
                        stats.transport_errors += 1;
                        warn!(channel = endpoint.channel(), error = %err, "failed to send frame");
                    }
                }
            }

            if shutdown.is_triggered() {
                break 'passes;
            }
        }

        if !forwarded {
            std::thread::sleep(config.poll_interval);
        }
    }
    debug!(frames = stats.frames, "egress stopped");
    stats
}
