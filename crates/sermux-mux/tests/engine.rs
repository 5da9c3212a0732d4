#![cfg(unix)]

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use sermux_frame::{decode_frame, encode_frame, MAX_PAYLOAD};
use sermux_mux::{
    ChannelRegistry, Endpoint, Engine, EngineConfig, EngineReport, MuxError, ShutdownSignal,
};
use sermux_transport::Port;

const DEADLINE: Duration = Duration::from_secs(3);

/// Engine-side end (non-blocking) plus the end a test drives directly.
fn pair() -> (UnixStream, UnixStream) {
    let (engine_side, test_side) = UnixStream::pair().expect("socket pair");
    engine_side
        .set_nonblocking(true)
        .expect("engine side should go non-blocking");
    test_side
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("read timeout should apply");
    (engine_side, test_side)
}

struct Harness {
    engine: Engine,
    line: UnixStream,
    users: Vec<(u8, UnixStream)>,
}

impl Harness {
    fn new(channels: &[u8]) -> Self {
        Self::with_config(channels, EngineConfig::default())
    }

    fn with_config(channels: &[u8], config: EngineConfig) -> Self {
        let (line_engine, line) = pair();
        let mut registry = ChannelRegistry::new();
        let mut users = Vec::new();
        for &channel in channels {
            let (engine_side, user_side) = pair();
            registry
                .register(Endpoint::new(channel, format!("test-{channel}"), engine_side))
                .expect("unique channel");
            users.push((channel, user_side));
        }
        let engine = Engine::new(line_engine, registry, config).expect("valid engine");
        Self {
            engine,
            line,
            users,
        }
    }

    fn user(&self, channel: u8) -> &UnixStream {
        &self
            .users
            .iter()
            .find(|(c, _)| *c == channel)
            .expect("registered channel")
            .1
    }

    /// Run the engine on a scoped thread while `body` drives the test ends.
    fn run_while<F: FnOnce(&Self)>(&self, body: F) -> EngineReport {
        let shutdown = ShutdownSignal::new();
        std::thread::scope(|scope| {
            let running = scope.spawn(|| self.engine.run(&shutdown));
            body(self);
            shutdown.trigger();
            running
                .join()
                .expect("engine thread should not panic")
                .expect("engine should stop cleanly")
        })
    }
}

fn read_exactly(stream: &UnixStream, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let start = Instant::now();
    let mut buf = [0u8; 1024];
    while out.len() < len {
        assert!(start.elapsed() < DEADLINE, "timed out after {} bytes", out.len());
        let want = (len - out.len()).min(buf.len());
        match (&*stream).read(&mut buf[..want]) {
            Ok(0) => panic!("stream closed"),
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => panic!("read failed: {err}"),
        }
    }
    out
}

fn assert_silent(stream: &UnixStream) {
    let mut buf = [0u8; 16];
    match (&*stream).read(&mut buf) {
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
        other => panic!("expected no data, got {other:?}"),
    }
}

fn frame_bytes(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut wire = BytesMut::new();
    encode_frame(channel, payload, &mut wire).expect("payload within limit");
    wire.to_vec()
}

#[test]
fn incoming_frame_reaches_only_its_endpoint() {
    let harness = Harness::new(&[10, 20]);

    let report = harness.run_while(|h| {
        (&h.line)
            .write_all(&[0x0A, 0x00, 0x03, b'a', b'b', b'c'])
            .unwrap();
        assert_eq!(read_exactly(h.user(10), 3), b"abc");
        assert_silent(h.user(20));
    });

    assert_eq!(report.ingress.frames, 1);
    assert_eq!(report.ingress.bytes, 3);
}

#[test]
fn outgoing_data_becomes_one_frame() {
    let harness = Harness::new(&[10, 20]);

    let report = harness.run_while(|h| {
        (h.user(10)).write_all(b"12345").unwrap();
        assert_eq!(
            read_exactly(&h.line, 8),
            [0x0A, 0x00, 0x05, b'1', b'2', b'3', b'4', b'5']
        );
        assert_silent(&h.line);
    });

    assert_eq!(report.egress.frames, 1);
    assert_eq!(report.egress.bytes, 5);
}

#[test]
fn unroutable_frame_does_not_desynchronize() {
    let harness = Harness::new(&[10]);

    let report = harness.run_while(|h| {
        let mut wire = frame_bytes(99, b"nobody listens here");
        wire.extend_from_slice(&frame_bytes(10, b"ok"));
        (&h.line).write_all(&wire).unwrap();

        assert_eq!(read_exactly(h.user(10), 2), b"ok");
        assert_silent(h.user(10));
    });

    assert_eq!(report.ingress.unroutable, 1);
    assert_eq!(report.ingress.frames, 1);
}

#[test]
fn oversized_declared_length_is_skipped() {
    let harness = Harness::new(&[10]);

    let report = harness.run_while(|h| {
        let mut wire = vec![10u8, 0x04, 0x00];
        wire.extend(std::iter::repeat(0xEE).take(1024));
        wire.extend_from_slice(&frame_bytes(10, b"after"));
        (&h.line).write_all(&wire).unwrap();

        assert_eq!(read_exactly(h.user(10), 5), b"after");
    });

    assert_eq!(report.ingress.oversized, 1);
}

#[test]
fn frame_split_across_reads_is_delivered_intact() {
    let harness = Harness::new(&[7]);
    let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| (i % 251) as u8).collect();

    harness.run_while(|h| {
        let wire = frame_bytes(7, &payload);
        for piece in wire.chunks(97) {
            (&h.line).write_all(piece).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(read_exactly(h.user(7), payload.len()), payload);
    });
}

#[test]
fn channels_stay_isolated_in_both_directions() {
    let harness = Harness::new(&[1, 2]);

    harness.run_while(|h| {
        for _ in 0..20 {
            h.user(1).write_all(b"AAAA").unwrap();
            h.user(2).write_all(b"BBBB").unwrap();
        }

        let mut wire = BytesMut::new();
        let mut seen_a = 0usize;
        let mut seen_b = 0usize;
        let start = Instant::now();
        while seen_a < 80 || seen_b < 80 {
            assert!(start.elapsed() < DEADLINE, "timed out collecting frames");
            let mut buf = [0u8; 512];
            match (&h.line).read(&mut buf) {
                Ok(n) => wire.extend_from_slice(&buf[..n]),
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(err) => panic!("read failed: {err}"),
            }
            while let Some(frame) = decode_frame(&mut wire, MAX_PAYLOAD).unwrap() {
                match frame.channel {
                    1 => {
                        assert!(frame.payload.iter().all(|&b| b == b'A'));
                        seen_a += frame.payload.len();
                    }
                    2 => {
                        assert!(frame.payload.iter().all(|&b| b == b'B'));
                        seen_b += frame.payload.len();
                    }
                    other => panic!("unexpected channel {other}"),
                }
            }
        }
        assert_eq!((seen_a, seen_b), (80, 80));

        let mut inbound = Vec::new();
        for _ in 0..10 {
            inbound.extend_from_slice(&frame_bytes(2, b"bb"));
            inbound.extend_from_slice(&frame_bytes(1, b"a"));
        }
        (&h.line).write_all(&inbound).unwrap();
        assert_eq!(read_exactly(h.user(1), 10), vec![b'a'; 10]);
        assert_eq!(read_exactly(h.user(2), 20), vec![b'b'; 20]);
    });
}

#[test]
fn shutdown_stops_both_directions_promptly() {
    let harness = Harness::new(&[1, 2, 3]);
    let shutdown = ShutdownSignal::new();

    let elapsed = std::thread::scope(|scope| {
        let running = scope.spawn(|| harness.engine.run(&shutdown));
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        shutdown.trigger();
        running.join().unwrap().unwrap();
        started.elapsed()
    });
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");

    // Endpoints are still open after run returns; only shutdown() closes them.
    assert_eq!(harness.engine.registry().len(), 3);
    let Harness { engine, users, .. } = harness;
    engine.shutdown();
    for (_, user) in users {
        let mut buf = [0u8; 1];
        assert_eq!((&user).read(&mut buf).unwrap(), 0, "endpoint should be closed");
    }
}

/// A serial line whose every read fails hard.
struct BrokenLine;

impl Port for BrokenLine {
    fn read_bytes(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(ErrorKind::Other))
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }
}

#[test]
fn transport_error_limit_requests_shutdown() {
    let (engine_side, _user) = pair();
    let mut registry = ChannelRegistry::new();
    registry
        .register(Endpoint::new(5, "five", engine_side))
        .unwrap();
    let config = EngineConfig {
        transport_error_limit: Some(3),
        ..EngineConfig::default()
    };
    let engine = Engine::new(BrokenLine, registry, config).unwrap();
    let shutdown = ShutdownSignal::new();

    let report = engine.run(&shutdown).unwrap();

    assert!(shutdown.is_triggered());
    assert_eq!(report.ingress.transport_errors, 3);
    engine.shutdown();
}

/// A serial line that accepts only the first byte of every write.
struct NarrowLine;

impl Port for NarrowLine {
    fn read_bytes(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len().min(1))
    }
}

#[test]
fn short_write_is_counted_and_engine_keeps_running() {
    let (engine_side, user) = pair();
    let mut registry = ChannelRegistry::new();
    registry.register(Endpoint::new(9, "nine", engine_side)).unwrap();
    let engine = Engine::new(NarrowLine, registry, EngineConfig::default()).unwrap();
    let shutdown = ShutdownSignal::new();

    let report = std::thread::scope(|scope| {
        let running = scope.spawn(|| engine.run(&shutdown));
        (&user).write_all(b"lost").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        (&user).write_all(b"also lost").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        shutdown.trigger();
        running.join().unwrap().unwrap()
    });

    assert_eq!(report.egress.short_writes, 2);
    assert_eq!(report.egress.frames, 0);
}

#[test]
fn duplicate_registration_is_fatal_before_start() {
    let (a, _ua) = pair();
    let (b, _ub) = pair();
    let mut registry = ChannelRegistry::new();
    registry.register(Endpoint::new(4, "first", a)).unwrap();
    let err = registry.register(Endpoint::new(4, "second", b)).unwrap_err();
    assert!(matches!(err, MuxError::DuplicateChannel(4)));
}

/// An endpoint whose consumer never drains it.
struct StuckEndpoint;

impl Port for StuckEndpoint {
    fn read_bytes(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }

    fn write_bytes(&self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(ErrorKind::WouldBlock))
    }
}

#[test]
fn stuck_endpoint_does_not_hold_up_other_channels() {
    let (line_engine, line) = pair();
    let (live_engine, live_user) = pair();
    let mut registry = ChannelRegistry::new();
    registry
        .register(Endpoint::new(1, "stuck", StuckEndpoint))
        .unwrap();
    registry
        .register(Endpoint::new(2, "live", live_engine))
        .unwrap();
    let config = EngineConfig {
        endpoint_stall_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let engine = Engine::new(line_engine, registry, config).unwrap();
    let shutdown = ShutdownSignal::new();

    let (elapsed, report) = std::thread::scope(|scope| {
        let running = scope.spawn(|| engine.run(&shutdown));

        let mut wire = Vec::new();
        for _ in 0..6 {
            wire.extend_from_slice(&frame_bytes(1, b"x"));
        }
        wire.extend_from_slice(&frame_bytes(2, b"ok"));
        let started = Instant::now();
        (&line).write_all(&wire).unwrap();
        assert_eq!(read_exactly(&live_user, 2), b"ok");
        let elapsed = started.elapsed();

        shutdown.trigger();
        (elapsed, running.join().unwrap().unwrap())
    });

    // Only the first frame for the stuck channel waits out the stall timeout.
    assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");
    assert_eq!(report.ingress.endpoint_errors, 6);
    assert_eq!(report.ingress.frames, 7);
    engine.shutdown();
}

#[test]
fn egress_polls_in_registration_order_one_frame_per_pass() {
    let (line_engine, line) = pair();
    let (twenty_engine, twenty_user) = pair();
    let (ten_engine, ten_user) = pair();
    let mut registry = ChannelRegistry::new();
    registry
        .register(Endpoint::new(20, "twenty", twenty_engine))
        .unwrap();
    registry
        .register(Endpoint::new(10, "ten", ten_engine))
        .unwrap();

    // Queue everything before the engine starts so the first pass sees it all.
    let backlog = vec![b'T'; MAX_PAYLOAD + 500];
    (&twenty_user).write_all(&backlog).unwrap();
    (&ten_user).write_all(b"ten").unwrap();

    let engine = Engine::new(line_engine, registry, EngineConfig::default()).unwrap();
    let shutdown = ShutdownSignal::new();

    let frames = std::thread::scope(|scope| {
        let running = scope.spawn(|| engine.run(&shutdown));

        let wire_len = 3 * 3 + backlog.len() + 3;
        let mut wire = BytesMut::from(&read_exactly(&line, wire_len)[..]);
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, MAX_PAYLOAD).unwrap() {
            frames.push((frame.channel, frame.payload.len()));
        }

        shutdown.trigger();
        running.join().unwrap().unwrap();
        frames
    });

    assert_eq!(frames, vec![(20, MAX_PAYLOAD), (10, 3), (20, 500)]);
    engine.shutdown();
}
