//! Analyser session tests against scripted transports and a fake SCPI server.
//!
//! Run with: cargo test --test analyser_session_tests

use chamber_daq::hardware::analyser::{
    AnalyserBuilder, AnalyserSession, AnalyserSettings, ByteOrder, TransferFormat,
};
use chamber_daq::hardware::polling::{PollPolicy, RetryPolicy};
use chamber_daq::{ChamberError, ConnectionState};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::io::Builder;

const INIT_COMMANDS: [&str; 9] = [
    ":SYST:PRES",
    ":SENS1:FREQ:STAR 400000000.000000;:SENS1:FREQ:STOP 3000000000.000000",
    ":SOUR1:POW 10.000000",
    ":SENS1:SWE:POIN 1601",
    ":CALC1:FORM MLOG",
    ":SENS1:BWID 5000.000000",
    ":CALC1:PAR1:DEF S21",
    ":FORM:DATA REAL32",
    "*OPC?",
];

/// Expect the default initialisation sequence, answered with `+1`.
fn expect_initialisation(builder: &mut Builder) -> &mut Builder {
    for command in INIT_COMMANDS {
        builder.write(command.as_bytes());
    }
    builder.read(b"+1\r\n")
}

/// Expect the trigger commands and a completed sweep.
fn expect_trigger(builder: &mut Builder) -> &mut Builder {
    builder
        .write(b":TRIG:SOUR EXT")
        .write(b":TRIG:SING")
        .write(b"*OPC?")
        .read(b"1\n")
}

fn real32_block(values: impl Iterator<Item = f32>, order: ByteOrder) -> (Vec<u8>, Vec<u8>) {
    let mut block = Vec::new();
    for value in values {
        match order {
            ByteOrder::LittleEndian => block.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::BigEndian => block.extend_from_slice(&value.to_be_bytes()),
        }
    }
    let header = format!("{:>8}", block.len()).into_bytes();
    (header, block)
}

async fn attach(builder: &mut Builder) -> AnalyserSession<tokio_test::io::Mock> {
    AnalyserBuilder::new(AnalyserSettings::default())
        .attach(builder.build())
        .await
        .unwrap()
}

// =============================================================================
// Initialisation
// =============================================================================

#[tokio::test]
async fn test_initialisation_sends_preset_then_frequency_range() {
    let session = attach(expect_initialisation(&mut Builder::new())).await;

    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.start_frequency(), 4e8);
    assert_eq!(session.stop_frequency(), 3e9);
    assert_eq!(session.power_level(), 10.0);
    assert_eq!(session.ifbw(), 5e3);
    assert_eq!(session.sample_points(), 1601);
    assert_eq!(session.transfer_format(), TransferFormat::Real32);
}

#[tokio::test]
async fn test_initialisation_clamps_requested_values() {
    let settings = AnalyserSettings {
        start_freq_hz: 10.0,
        stop_freq_hz: 2e10,
        power_dbm: 30.0,
        ifbw_hz: 1.0,
        sample_points: 5000,
        ..AnalyserSettings::default()
    };
    let mock = Builder::new()
        .write(b":SYST:PRES")
        .write(b":SENS1:FREQ:STAR 100000.000000;:SENS1:FREQ:STOP 8500000000.000000")
        .write(b":SOUR1:POW 10.000000")
        .write(b":SENS1:SWE:POIN 1601")
        .write(b":CALC1:FORM MLOG")
        .write(b":SENS1:BWID 2.000000")
        .write(b":CALC1:PAR1:DEF S21")
        .write(b":FORM:DATA REAL32")
        .write(b"*OPC?")
        .read(b"1\n")
        .build();

    let session = AnalyserBuilder::new(settings).attach(mock).await.unwrap();
    assert_eq!(session.start_frequency(), 1e5);
    assert_eq!(session.stop_frequency(), 8.5e9);
    assert_eq!(session.ifbw(), 2.0);
    assert_eq!(session.sample_points(), 1601);
}

#[tokio::test]
async fn test_failed_initialisation_returns_no_session() {
    let mock = Builder::new()
        .write(b":SYST:PRES")
        .write_error(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ))
        .build();

    let result = AnalyserBuilder::new(AnalyserSettings::default())
        .attach(mock)
        .await;
    match result {
        Err(err @ ChamberError::Connection { .. }) => assert!(err.is_fatal()),
        Err(other) => panic!("expected connection error, got {other}"),
        Ok(_) => panic!("session returned after failed initialisation"),
    }
}

// =============================================================================
// Command sending
// =============================================================================

#[tokio::test]
async fn test_short_write_is_continued_with_remaining_bytes() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b":SENS1:BW")
        .wait(Duration::from_millis(5))
        .write(b"ID 1000.000000");
    let mut session = attach(&mut builder).await;

    session.set_ifbw(1000.0, 1).await.unwrap();
    assert_eq!(session.ifbw(), 1000.0);
}

#[tokio::test]
async fn test_short_write_gives_up_after_retries() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b":SOUR1")
        .wait(Duration::from_millis(1))
        .write(b":PO")
        .wait(Duration::from_millis(1))
        .write(b"W");
    let mut session = attach(&mut builder).await;
    session.set_retry_policy(RetryPolicy {
        max_retries: 2,
        backoff: Duration::from_millis(1),
    });

    let err = session.set_power_level(-5.0, 1).await.unwrap_err();
    match err {
        ChamberError::CommandSend {
            ref command,
            sent,
            expected,
        } => {
            assert_eq!(command, ":SOUR1:POW -5.000000");
            assert_eq!(sent, 10);
            assert_eq!(expected, 20);
        }
        other => panic!("expected short write, got {other}"),
    }
    assert!(!err.is_fatal());
    assert_eq!(session.power_level(), 10.0);
}

#[tokio::test]
async fn test_standalone_start_and_stop_frequency() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b":SENS2:FREQ:STAR 1200000000.000000")
        .write(b":SENS2:FREQ:STOP 8500000000.000000")
        .write(b":SENS2:FREQ:STAR 100000.000000");
    let mut session = attach(&mut builder).await;

    session.set_start_frequency(1.2e9, 2).await.unwrap();
    assert_eq!(session.start_frequency(), 1.2e9);
    assert_eq!(session.stop_frequency(), 3e9);

    session.set_stop_frequency(9e9, 2).await.unwrap();
    assert_eq!(session.stop_frequency(), 8.5e9);

    session.set_start_frequency(1e4, 2).await.unwrap();
    assert_eq!(session.start_frequency(), 1e5);
    assert_eq!(session.stop_frequency(), 8.5e9);
}

#[tokio::test]
async fn test_zero_indices_are_raised_to_one() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b":SENS1:SWE:POIN 2")
        .write(b":CALC1:PAR1:DEF S11");
    let mut session = attach(&mut builder).await;

    session.set_sample_points(0, 0).await.unwrap();
    session
        .set_parameter(chamber_daq::hardware::analyser::SParameter::S11, 0, 0)
        .await
        .unwrap();
    assert_eq!(session.sample_points(), 2);
}

// =============================================================================
// Completion polling
// =============================================================================

#[tokio::test]
async fn test_done_reports_pending_then_complete() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b"*OPC?")
        .read(b"0\n")
        .write(b"*OPC?")
        .read(b" +1\r\n");
    let mut session = attach(&mut builder).await;

    assert!(!session.done().await.unwrap());
    assert!(session.done().await.unwrap());
}

#[tokio::test]
async fn test_undecodable_completion_reply() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b"*OPC?")
        .read(b"BUSY\n");
    let mut session = attach(&mut builder).await;

    assert!(matches!(
        session.done().await,
        Err(ChamberError::MalformedFrame(_))
    ));
}

#[tokio::test]
async fn test_non_utf8_completion_reply_is_malformed() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b"*OPC?")
        .read(b"\xff\xfe\n");
    let mut session = attach(&mut builder).await;

    let err = session.done().await.unwrap_err();
    assert!(matches!(err, ChamberError::MalformedFrame(_)), "{err}");
}

#[tokio::test]
async fn test_wait_until_done_polls_until_complete() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder);
    for _ in 0..3 {
        builder.write(b"*OPC?").read(b"0\n");
    }
    builder.write(b"*OPC?").read(b"1\n");
    let mut session = attach(&mut builder).await;
    session.set_poll_policy(PollPolicy {
        interval: Duration::from_millis(1),
        timeout: Some(Duration::from_secs(5)),
    });

    session.wait_until_done().await.unwrap();
}

#[tokio::test]
async fn test_wait_until_done_times_out() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b"*OPC?")
        .wait(Duration::from_secs(3600));
    let mut session = attach(&mut builder).await;
    session.set_poll_policy(PollPolicy::with_timeout(Duration::from_millis(50)));

    match session.wait_until_done().await {
        Err(ChamberError::Timeout { after, .. }) => {
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

// =============================================================================
// Capture
// =============================================================================

#[tokio::test]
async fn test_capture_reads_two_elements_per_point() {
    // 1601 points = 3202 REAL32 elements, delivered in two blocks
    let (header_a, block_a) = real32_block((0..1601).map(|i| i as f32), ByteOrder::LittleEndian);
    let (header_b, block_b) =
        real32_block((1601..3202).map(|i| i as f32), ByteOrder::LittleEndian);
    assert_eq!(header_a, b"    6404");

    let mut builder = Builder::new();
    expect_initialisation(&mut builder);
    expect_trigger(&mut builder)
        .read(&header_a)
        .read(&block_a)
        .read(&header_b)
        .read(&block_b);
    let mut session = attach(&mut builder).await;

    let capture = session.capture_data(1, 1).await.unwrap();
    assert_eq!(capture.len(), 3202);
    assert_eq!(capture.channel, 1);
    assert_eq!(capture.trace, 1);
    assert_eq!(capture.format, TransferFormat::Real32);
    assert_eq!(capture.samples[0], 0.0);
    assert_eq!(capture.samples[3201], 3201.0);

    let pairs = capture.complex_pairs();
    assert_eq!(pairs.len(), 1601);
    assert_eq!(pairs[1].re, 2.0);
    assert_eq!(pairs[1].im, 3.0);
}

#[tokio::test]
async fn test_capture_discards_surplus_elements() {
    let (header_a, block_a) = real32_block([1.0, 2.0, 3.0, 4.0].into_iter(), ByteOrder::BigEndian);
    let (header_b, block_b) = real32_block([5.0, 6.0, 7.0, 8.0].into_iter(), ByteOrder::BigEndian);

    let mut builder = Builder::new();
    expect_initialisation(&mut builder).write(b":SENS1:SWE:POIN 3");
    expect_trigger(&mut builder)
        .read(&header_a)
        .read(&block_a)
        .read(&header_b)
        .read(&block_b);
    let mut session = attach(&mut builder).await;
    session.set_sample_points(3, 1).await.unwrap();
    session.set_byte_order(ByteOrder::BigEndian);

    let capture = session.capture_data(1, 2).await.unwrap();
    assert_eq!(capture.samples, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(capture.trace, 2);
}

#[tokio::test]
async fn test_capture_real64_block() {
    let values = [0.5f64, -0.25, 1e-3, 42.0];
    let block: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

    let mut builder = Builder::new();
    expect_initialisation(&mut builder)
        .write(b":SENS1:SWE:POIN 2")
        .write(b":FORM:DATA REAL");
    expect_trigger(&mut builder).read(b"32\0\0\0\0\0\0").read(&block);
    let mut session = attach(&mut builder).await;
    session.set_sample_points(2, 1).await.unwrap();
    session.set_transfer_format(TransferFormat::Real64).await.unwrap();

    let capture = session.capture_data(1, 1).await.unwrap();
    assert_eq!(capture.samples, values.to_vec());
}

#[tokio::test]
async fn test_capture_rejects_malformed_header() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder);
    expect_trigger(&mut builder).read(b"  12ab  ");
    let mut session = attach(&mut builder).await;

    let err = session.capture_data(1, 1).await.unwrap_err();
    assert!(matches!(err, ChamberError::MalformedFrame(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_capture_rejects_block_larger_than_trace() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder);
    expect_trigger(&mut builder).read(b"99999996");
    let mut session = attach(&mut builder).await;

    let err = session.capture_data(1, 1).await.unwrap_err();
    assert!(matches!(err, ChamberError::MalformedFrame(_)), "{err}");
}

#[tokio::test]
async fn test_trigger_short_write_yields_empty_capture() {
    let mut builder = Builder::new();
    expect_initialisation(&mut builder).write(b":TRIG:SO");
    let mut session = attach(&mut builder).await;
    session.set_retry_policy(RetryPolicy::single_attempt());

    let capture = session.capture_data(2, 3).await.unwrap();
    assert!(capture.is_empty());
    assert_eq!(capture.channel, 2);
    assert_eq!(capture.trace, 3);
    assert!(session.is_connected());
}

// =============================================================================
// TCP
// =============================================================================

/// Minimal SCPI endpoint: records everything received and answers every `*OPC?`.
async fn serve_one_session(listener: TcpListener) -> Vec<u8> {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut transcript = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return transcript;
        }
        transcript.extend_from_slice(&buf[..n]);
        if transcript.ends_with(b"*OPC?") {
            socket.write_all(b"+1\n").await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_connect_and_reconnect_over_tcp() {
    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let first_port = first.local_addr().unwrap().port();
    let first_device = tokio::spawn(serve_one_session(first));

    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second_port = second.local_addr().unwrap().port();
    let second_device = tokio::spawn(serve_one_session(second));

    let settings = AnalyserSettings {
        host: "127.0.0.1".to_string(),
        port: first_port,
        connect_timeout: Some(Duration::from_secs(5)),
        ..AnalyserSettings::default()
    };
    let mut session = AnalyserSession::builder(settings)
        .with_poll(PollPolicy::with_timeout(Duration::from_secs(5)))
        .connect()
        .await
        .unwrap();
    assert_eq!(session.remote_address(), ("127.0.0.1", first_port));

    session.set_power_level(-20.0, 1).await.unwrap();
    session.reconnect("127.0.0.1", second_port).await.unwrap();
    assert_eq!(session.remote_address(), ("127.0.0.1", second_port));
    assert_eq!(session.power_level(), -20.0);
    session.close().await;

    let expected_first: Vec<u8> = INIT_COMMANDS
        .iter()
        .chain([":SOUR1:POW -20.000000"].iter())
        .flat_map(|c| c.as_bytes().to_vec())
        .collect();
    assert_eq!(first_device.await.unwrap(), expected_first);

    // the current configuration is pushed again to the new address
    let second_transcript = String::from_utf8(second_device.await.unwrap()).unwrap();
    assert!(second_transcript.starts_with(":SYST:PRES:SENS1:FREQ:STAR"));
    assert!(second_transcript.contains(":SOUR1:POW -20.000000"));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let settings = AnalyserSettings {
        host: "127.0.0.1".to_string(),
        port,
        ..AnalyserSettings::default()
    };
    let result = AnalyserSession::builder(settings).connect().await;
    assert!(matches!(result, Err(ChamberError::Connection { .. })));
}
