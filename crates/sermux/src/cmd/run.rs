use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sermux_mux::{ChannelRegistry, Endpoint, Engine, EngineConfig, ShutdownSignal};
use sermux_transport::{PtyEndpoint, SerialPort};
use tracing::{error, info};

use crate::cmd::{parse_duration, ChannelSpec, RunArgs};
use crate::exit::{
    mux_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR, USAGE,
};
use crate::output::{print_channels, print_report, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = engine_config(&args)?;
    check_unique(&args.channels)?;

    let serial = SerialPort::open(&args.serial_port)
        .map_err(|err| transport_error("cannot open serial port", err))?;
    info!(path = %args.serial_port.display(), "serial port opened");

    let registry = build_registry(&args.channels)?;
    let engine =
        Engine::new(serial, registry, config).map_err(|err| mux_error("engine setup failed", err))?;
    print_channels(&args.serial_port, engine.registry(), format);

    let shutdown = ShutdownSignal::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone(), interrupted.clone())?;

    let result = engine.run(&shutdown);
    engine.shutdown();
    let report = result.map_err(|err| mux_error("engine failed", err))?;
    print_report(&report, format);

    if interrupted.load(Ordering::SeqCst) {
        info!("stopped by signal");
        Ok(SUCCESS)
    } else {
        error!(
            errors = report.ingress.transport_errors,
            "stopped after repeated serial port errors"
        );
        Ok(TRANSPORT_ERROR)
    }
}

fn engine_config(args: &RunArgs) -> CliResult<EngineConfig> {
    let config = EngineConfig {
        poll_interval: parse_duration(&args.poll_interval)?,
        transport_error_limit: args.max_transport_errors,
        ..EngineConfig::default()
    };
    config
        .validate()
        .map_err(|err| mux_error("invalid configuration", err))?;
    Ok(config)
}

/// Reject a repeated channel ID before any device is touched.
fn check_unique(channels: &[ChannelSpec]) -> CliResult<()> {
    let mut seen = HashSet::new();
    for spec in channels {
        if !seen.insert(spec.id) {
            return Err(CliError::new(
                USAGE,
                format!("channel {} specified more than once", spec.id),
            ));
        }
    }
    Ok(())
}

/// Allocate one pseudo-terminal per channel, in command-line order.
fn build_registry(channels: &[ChannelSpec]) -> CliResult<ChannelRegistry> {
    let mut registry = ChannelRegistry::new();
    for spec in channels {
        let pty = PtyEndpoint::open(spec.link.as_deref()).map_err(|err| {
            transport_error(&format!("cannot create endpoint for channel {}", spec.id), err)
        })?;
        let name = pty.name().display().to_string();
        let mut endpoint = Endpoint::new(spec.id, name, pty);
        if let Some(link) = &spec.link {
            endpoint = endpoint.with_alias(link);
        }
        registry
            .register(endpoint)
            .map_err(|err| mux_error("channel setup failed", err))?;
    }
    Ok(registry)
}

fn install_ctrlc_handler(shutdown: ShutdownSignal, interrupted: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
        if shutdown.trigger() {
            info!("interrupt received; shutting down");
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
