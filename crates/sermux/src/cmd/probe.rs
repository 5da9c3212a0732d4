use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sermux_transport::{is_idle, Port, SerialPort};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ProbeArgs};
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{now_unix_seconds, payload_preview, print_exchange, ExchangeOutput, OutputFormat};

const RESPONSE_BUF_SIZE: usize = 4096;
const POLL_STEP: Duration = Duration::from_millis(5);

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let response_timeout = parse_duration(&args.response_timeout)?;

    let port = SerialPort::open(&args.serial_port)
        .map_err(|err| transport_error("cannot open port", err))?;
    info!(path = %args.serial_port.display(), instance = %args.instance_name, "probe started");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut seq = 0u64;
    while running.load(Ordering::SeqCst) && args.count.is_none_or(|count| seq < count) {
        seq += 1;
        send(&port, args.instance_name.as_bytes())
            .map_err(|err| io_error("write failed", err))?;

        let response = collect_response(&port, response_timeout, &running)
            .map_err(|err| io_error("read failed", err))?;
        print_exchange(
            &ExchangeOutput {
                instance: &args.instance_name,
                seq,
                response: response.as_deref().map(payload_preview),
                timestamp: now_unix_seconds(),
            },
            format,
        );

        pause(interval, &running);
    }

    info!(exchanges = seq, "probe finished");
    Ok(SUCCESS)
}

/// Write all of `data`, waiting out a full output queue.
fn send<P: Port + ?Sized>(port: &P, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        match port.write_bytes(data) {
            Ok(0) => std::thread::sleep(POLL_STEP),
            Ok(n) => data = &data[n..],
            Err(err) if is_idle(&err) => std::thread::sleep(POLL_STEP),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Wait up to `timeout` for a response to start, then keep reading until
/// the port goes quiet. `None` if nothing arrived in time.
fn collect_response<P: Port + ?Sized>(
    port: &P,
    timeout: Duration,
    running: &AtomicBool,
) -> std::io::Result<Option<Vec<u8>>> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; RESPONSE_BUF_SIZE];
    let mut response = Vec::new();

    loop {
        let n = match port.read_bytes(&mut buf) {
            Ok(n) => n,
            Err(err) if is_idle(&err) => 0,
            Err(err) => return Err(err),
        };

        if n > 0 {
            response.extend_from_slice(&buf[..n]);
            if response.len() >= RESPONSE_BUF_SIZE {
                break;
            }
            continue;
        }
        if !response.is_empty() || Instant::now() >= deadline || !running.load(Ordering::SeqCst)
        {
            break;
        }
        std::thread::sleep(POLL_STEP);
    }

    if response.is_empty() {
        debug!("no response before timeout");
        Ok(None)
    } else {
        Ok(Some(response))
    }
}

/// Sleep for `interval`, waking early on Ctrl-C.
fn pause(interval: Duration, running: &AtomicBool) {
    let until = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= until {
            break;
        }
        std::thread::sleep((until - now).min(Duration::from_millis(50)));
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if running.swap(false, Ordering::SeqCst) {
            warn!("interrupt received; stopping probe");
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
