//! End-to-end replay tests over real loopback TCP connections.
//!
//! Each test binds a listener on an ephemeral port and runs a receiver thread
//! that collects everything it is sent until the sender closes.
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=pacer=debug cargo test --test loopback_replay -- --nocapture
//! ```

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Once;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pacer::{
    CpuConfig, Dataset, Endpoint, FormatDescriptor, HandshakeConfig, HandshakeError,
    PacedTransmitter, PacingConfig, Replay, ReplayConfig, ReplayError, Row, TcpConnection, Value,
};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        pacer::init_tracing();
    });
}

/// Binds a receiver on an ephemeral port. The thread optionally sends a
/// greeting, then reads until EOF.
fn spawn_receiver(greeting: Option<&'static [u8]>) -> (Endpoint, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    let endpoint = Endpoint::from(listener.local_addr().expect("local addr"));

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        if let Some(greeting) = greeting {
            stream.write_all(greeting).expect("send greeting");
        }
        let mut received = Vec::new();
        stream.read_to_end(&mut received).expect("read stream");
        received
    });

    (endpoint, handle)
}

fn replay_config(endpoint: Endpoint) -> ReplayConfig {
    ReplayConfig::default()
        .with_endpoint(endpoint.ip().to_string(), endpoint.port())
        .with_format("<3d".parse::<FormatDescriptor>().expect("format"))
}

fn dataset(name: &str, first: f64, rows: usize) -> Dataset {
    Dataset::from_values(
        name,
        (0..rows)
            .map(|i| {
                let v = first + i as f64;
                vec![Value::Float(v), Value::Float(v * 10.0), Value::Float(v * 100.0)]
            })
            .collect(),
    )
}

fn first_column(format: &FormatDescriptor, payload: &[u8]) -> Vec<f64> {
    payload
        .chunks(format.record_len())
        .map(|chunk| match format.decode(chunk).expect("decode")[0] {
            Value::Float(v) => v,
            ref other => panic!("unexpected value {other:?}"),
        })
        .collect()
}

#[test]
fn paced_records_arrive_in_order_with_sentinel() {
    init_test_tracing();

    let format: FormatDescriptor = "<2i3d".parse().expect("format");
    let rows = [
        Row::new(0, [Value::Int(1), Value::Int(2), Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]),
        Row::new(1, vec![Value::Null; 5]),
        Row::new(2, [Value::Int(4), Value::Int(5), Value::Float(4.0), Value::Float(5.0), Value::Float(6.0)]),
    ];
    let outcome = pacer::encode::encode_all(&rows, &format);
    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.records.iter().all(|r| r.len() == 32));
    assert_eq!(outcome.skipped, 1);
    assert!(outcome.failures.is_empty());

    let (endpoint, receiver) = spawn_receiver(None);
    let mut conn = TcpConnection::connect(endpoint, Duration::from_secs(2)).expect("connect");

    let mut tx = PacedTransmitter::new(PacingConfig::default().with_rate_hz(10.0)).expect("config");
    let started = Instant::now();
    let summary = tx.transmit(&mut conn, &outcome.records).expect("transmit");
    let wall = started.elapsed();
    conn.shutdown().expect("shutdown");

    assert!(wall >= Duration::from_millis(100), "took {wall:?}");
    assert!(summary.elapsed >= Duration::from_millis(200));
    assert_eq!(summary.records_sent, 2);
    assert_eq!(summary.bytes_sent, 64);

    let received = receiver.join().expect("receiver");
    assert_eq!(received.len(), 64 + "SHUTDOWN".len());
    assert_eq!(&received[64..], b"SHUTDOWN");
    assert_eq!(
        format.decode(&received[..32]).expect("decode"),
        [Value::Int(1), Value::Int(2), Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]
    );
    assert_eq!(
        format.decode(&received[32..64]).expect("decode"),
        [Value::Int(4), Value::Int(5), Value::Float(4.0), Value::Float(5.0), Value::Float(6.0)]
    );
}

#[test]
fn replay_runs_selected_datasets_circularly() {
    init_test_tracing();

    let (endpoint, receiver) = spawn_receiver(None);
    let config = replay_config(endpoint)
        .with_filename_prefix("trajectory_")
        .with_files_to_send(3);
    let format = config.format.clone();

    let datasets = vec![
        dataset("trajectory_a.csv", 0.0, 4),
        dataset("calibration.csv", 900.0, 2),
        dataset("trajectory_b.csv", 100.0, 3),
    ];

    let replay = Replay::new(config).expect("config");
    let report = replay.run(&datasets).expect("run");

    assert_eq!(
        report.files,
        ["trajectory_a.csv", "trajectory_b.csv", "trajectory_a.csv"]
    );
    assert_eq!(report.packed_records, 11);
    assert_eq!(report.conversion_failures, 0);
    assert_eq!(report.transmit.records_sent, 11);
    assert!(report.transmit.sentinel_sent);

    let received = receiver.join().expect("receiver");
    let payload_len = 11 * format.record_len();
    assert_eq!(&received[payload_len..], b"SHUTDOWN");
    assert_eq!(
        first_column(&format, &received[..payload_len]),
        [0.0, 1.0, 2.0, 3.0, 100.0, 101.0, 102.0, 0.0, 1.0, 2.0, 3.0]
    );
}

#[test]
fn bad_rows_are_dropped_and_counted() {
    init_test_tracing();

    let (endpoint, receiver) = spawn_receiver(None);
    let config = replay_config(endpoint).with_files_to_send(1);
    let format = config.format.clone();

    let mut data = dataset("run.csv", 1.0, 2);
    data.rows.push(Row::new(2, [Value::from("n/a"), Value::from(0.0), Value::from(0.0)]));
    data.rows.push(Row::new(3, [Value::Null, Value::Null, Value::Null]));
    data.rows.push(Row::new(4, [Value::from(" 7.5 "), Value::Null, Value::Int(3)]));

    let report = Replay::new(config).expect("config").run(&[data]).expect("run");
    assert_eq!(report.packed_records, 3);
    assert_eq!(report.conversion_failures, 1);
    assert_eq!(report.skipped_rows, 1);

    let received = receiver.join().expect("receiver");
    let payload = &received[..3 * format.record_len()];
    assert_eq!(first_column(&format, payload), [1.0, 2.0, 7.5]);

    let last = format.decode(&payload[48..]).expect("decode");
    assert!(matches!(last[1], Value::Float(v) if v.is_nan()));
    assert_eq!(last[2], Value::Float(3.0));
}

#[test]
fn replay_waits_for_buffer_ready() {
    init_test_tracing();

    let (endpoint, receiver) = spawn_receiver(Some(b"BUFFER_READY:axis1\n".as_slice()));
    let config = replay_config(endpoint)
        .with_files_to_send(1)
        .with_handshake(Some(HandshakeConfig::new("axis1")));

    let report = Replay::new(config)
        .expect("config")
        .run(&[dataset("run.csv", 0.0, 2)])
        .expect("run");
    assert_eq!(report.transmit.records_sent, 2);

    let received = receiver.join().expect("receiver");
    assert_eq!(received.len(), 2 * 24 + "SHUTDOWN".len());
}

#[test]
fn pinned_replay_streams_from_its_own_thread() {
    init_test_tracing();

    let (endpoint, receiver) = spawn_receiver(None);
    let config = replay_config(endpoint).with_files_to_send(1);
    let pacing = config.pacing.clone().with_cpu(CpuConfig::Auto);
    let format = config.format.clone();

    let report = Replay::new(config.with_pacing(pacing))
        .expect("config")
        .run(&[dataset("run.csv", 5.0, 3)])
        .expect("run");
    assert_eq!(report.transmit.records_sent, 3);

    let received = receiver.join().expect("receiver");
    assert_eq!(first_column(&format, &received[..72]), [5.0, 6.0, 7.0]);
    assert_eq!(&received[72..], b"SHUTDOWN");
}

#[test]
fn silent_receiver_times_out_and_connection_is_closed() {
    init_test_tracing();

    let (endpoint, receiver) = spawn_receiver(None);
    let config = replay_config(endpoint).with_files_to_send(1).with_handshake(Some(
        HandshakeConfig::new("axis1").with_timeout(Duration::from_millis(100)),
    ));

    let err = Replay::new(config)
        .expect("config")
        .run(&[dataset("run.csv", 0.0, 2)])
        .unwrap_err();
    assert!(matches!(err, ReplayError::Handshake(HandshakeError::Timeout)), "{err:?}");

    // The receiver only returns once the sender closed its side.
    assert!(receiver.join().expect("receiver").is_empty());
}

#[test]
fn refused_connection_reports_the_endpoint() {
    init_test_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    let endpoint = Endpoint::from(listener.local_addr().expect("local addr"));
    drop(listener);

    let err = Replay::new(replay_config(endpoint).with_files_to_send(1))
        .expect("config")
        .run(&[dataset("run.csv", 0.0, 1)])
        .unwrap_err();
    assert!(
        matches!(err, ReplayError::Connect { endpoint: ep, .. } if ep == endpoint),
        "{err:?}"
    );
}

#[test]
fn missing_input_fails_before_connecting() {
    init_test_tracing();

    let config = ReplayConfig::default()
        .with_endpoint("127.0.0.1", 9)
        .with_filename_prefix("nothing_");
    let err = Replay::new(config)
        .expect("config")
        .run(&[dataset("run.csv", 0.0, 1)])
        .unwrap_err();
    assert!(matches!(err, ReplayError::NoInput { .. }));
}
