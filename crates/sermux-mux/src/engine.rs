use std::thread::{Builder, ScopedJoinHandle};

use sermux_transport::Port;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{MuxError, Result};
use crate::registry::ChannelRegistry;
use crate::shutdown::ShutdownSignal;
use crate::stats::{DirectionStats, EngineReport};
use crate::{egress, ingress};

/// Owns the serial line and the channel registry, and runs both directions.
///
/// [`run`](Self::run) borrows the engine and returns only after both
/// direction threads have stopped; [`shutdown`](Self::shutdown) consumes it.
/// Endpoints and the line therefore cannot be released while either
/// direction may still touch them.
pub struct Engine {
    transport: Box<dyn Port>,
    registry: ChannelRegistry,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine. Fails on an empty registry or invalid config.
    pub fn new(
        transport: impl Port + 'static,
        registry: ChannelRegistry,
        config: EngineConfig,
    ) -> Result<Self> {
        registry.validate()?;
        config.validate()?;
        Ok(Self {
            transport: Box::new(transport),
            registry,
            config,
        })
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run ingress and egress until `shutdown` is triggered.
    ///
    /// If either direction stops for any reason (including a panic) the
    /// signal is triggered so the other follows.
    pub fn run(&self, shutdown: &ShutdownSignal) -> Result<EngineReport> {
        info!(
            channels = ?self.registry.channels(),
            "starting multiplexer"
        );

        let transport: &dyn Port = &*self.transport;
        let registry = &self.registry;
        let config = &self.config;

        let (ingress_result, egress_result) = std::thread::scope(|scope| -> Result<_> {
            let ingress_handle = spawn_direction(scope, "ingress", shutdown, move || {
                ingress::run(transport, registry, config, shutdown)
            })?;
            let egress_handle = match spawn_direction(scope, "egress", shutdown, move || {
                egress::run(transport, registry, config, shutdown)
            }) {
                Ok(handle) => handle,
                Err(err) => {
                    shutdown.trigger();
                    let _ = ingress_handle.join();
                    return Err(err);
                }
            };
            Ok((ingress_handle.join(), egress_handle.join()))
        })?;

        let report = EngineReport {
            ingress: ingress_result.map_err(|_| MuxError::DirectionPanicked("ingress"))?,
            egress: egress_result.map_err(|_| MuxError::DirectionPanicked("egress"))?,
        };
        info!(
            ingress_frames = report.ingress.frames,
            egress_frames = report.egress.frames,
            "multiplexer stopped"
        );
        Ok(report)
    }

    /// Release every endpoint, then the serial line.
    pub fn shutdown(self) {
        let Engine {
            transport,
            registry,
            ..
        } = self;
        registry.close();
        drop(transport);
        debug!("serial line released");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Triggers the shutdown signal when dropped, so a direction that exits
/// (or unwinds) always takes the other one down with it.
struct StopOnExit<'a>(&'a ShutdownSignal);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

fn spawn_direction<'scope, 'env, F>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    direction: &'static str,
    shutdown: &'env ShutdownSignal,
    body: F,
) -> Result<ScopedJoinHandle<'scope, DirectionStats>>
where
    F: FnOnce() -> DirectionStats + Send + 'scope,
{
    Builder::new()
        .name(format!("sermux-{direction}"))
        .spawn_scoped(scope, move || {
            let _stop = StopOnExit(shutdown);
            body()
        })
        .map_err(|source| MuxError::Spawn { direction, source })
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::registry::Endpoint;

    #[test]
    fn empty_registry_is_a_configuration_error() {
        let (line, _peer) = UnixStream::pair().unwrap();
        let result = Engine::new(line, ChannelRegistry::new(), EngineConfig::default());
        assert!(matches!(result, Err(MuxError::NoChannels)));
    }

    #[test]
    fn invalid_config_rejected_before_start() {
        let (line, _peer) = UnixStream::pair().unwrap();
        let (ep, _user) = UnixStream::pair().unwrap();
        let mut registry = ChannelRegistry::new();
        registry.register(Endpoint::new(1, "one", ep)).unwrap();

        let config = EngineConfig {
            max_payload_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(line, registry, config),
            Err(MuxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stop_guard_triggers_on_drop() {
        let signal = ShutdownSignal::new();
        drop(StopOnExit(&signal));
        assert!(signal.is_triggered());
    }
}
