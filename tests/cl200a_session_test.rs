//! CL-200A session behavior against a scripted serial link.

use luxmeter_daq::adapters::MockAdapter;
use luxmeter_daq::core::Cct;
use luxmeter_daq::error::DaqError;
use luxmeter_daq::instrument::cl200a::codec::{ack_response, measurement_response};
use luxmeter_daq::instrument::cl200a::{
    Cl200aSession, CommandCode, ResponseFault, SessionOptions, SessionState,
};
use luxmeter_daq::instrument::{ChromaMeter, LuxMeter, MeasurementSource};

const PC_MODE: &[u8] = b"00541   ";
const HOLD: &[u8] = b"99551  0";
const EXT_MODE: &[u8] = b"004010  ";
const EXT_TRIGGER: &[u8] = b"994021  ";
const READ_XYZ: &[u8] = b"00011200";
const READ_EV_XY: &[u8] = b"00021200";
const READ_EV_TCP: &[u8] = b"00081200";

fn handshake(link: &MockAdapter) {
    link.reply_to(PC_MODE, &ack_response(CommandCode::PcConnect, b' '));
    link.reply_to(EXT_MODE, &ack_response(CommandCode::SetExtMode, b' '));
}

fn connected(link: &MockAdapter) -> Cl200aSession<MockAdapter> {
    handshake(link);
    Cl200aSession::connect("cl200a", link.clone(), SessionOptions::immediate())
        .expect("handshake should succeed")
}

fn expect_measurement(link: &MockAdapter, read: &[u8], reply: &[u8]) {
    link.silent_on(EXT_TRIGGER);
    link.reply_to(read, reply);
}

#[test]
fn test_ext_mode_retries_are_bounded() {
    let link = MockAdapter::new();
    link.reply_to(PC_MODE, &ack_response(CommandCode::PcConnect, b' '));
    link.reply_to(EXT_MODE, &ack_response(CommandCode::SetExtMode, b'4'));
    link.reply_to(EXT_MODE, &ack_response(CommandCode::SetExtMode, b'4'));

    let result = Cl200aSession::connect("cl200a", link.clone(), SessionOptions::immediate());
    assert!(matches!(result, Err(DaqError::Handshake(_))));
    assert_eq!(link.count_writes(EXT_MODE), 2);
    // Initial hold plus one re-hold between the two attempts
    assert_eq!(link.count_writes(HOLD), 2);
}

#[test]
fn test_ext_mode_recovers_after_rehold() {
    let link = MockAdapter::new();
    link.reply_to(PC_MODE, &ack_response(CommandCode::PcConnect, b' '));
    link.reply_to(EXT_MODE, &ack_response(CommandCode::SetExtMode, b'4'));
    link.reply_to(EXT_MODE, &ack_response(CommandCode::SetExtMode, b' '));

    let session =
        Cl200aSession::connect("cl200a", link.clone(), SessionOptions::immediate()).unwrap();
    assert_eq!(session.state(), &SessionState::Ready);
    assert_eq!(link.count_writes(HOLD), 2);
}

#[test]
fn test_verified_pc_mode_gives_up_after_two_sends() {
    let link = MockAdapter::new();
    link.reply_to(PC_MODE, b"garbage\r\n");
    link.reply_to(PC_MODE, b"\x02still garbage\r\n");
    let options = SessionOptions {
        verify_handshake: true,
        ..SessionOptions::immediate()
    };

    let result = Cl200aSession::connect("cl200a", link.clone(), options);
    assert!(matches!(result, Err(DaqError::Handshake(_))));
    assert_eq!(link.count_writes(PC_MODE), 2);
    // Nothing past PC mode was attempted
    assert_eq!(link.count_writes(HOLD), 0);
    assert_eq!(link.count_writes(EXT_MODE), 0);
}

#[test]
fn test_ext_mode_fault_is_not_retried() {
    let link = MockAdapter::new();
    link.reply_to(PC_MODE, &ack_response(CommandCode::PcConnect, b' '));
    link.reply_to(EXT_MODE, &ack_response(CommandCode::SetExtMode, b'3'));

    let result = Cl200aSession::connect("cl200a", link.clone(), SessionOptions::immediate());
    match result {
        Err(DaqError::InstrumentFault { code, message }) => {
            assert_eq!(code, 3);
            assert!(message.contains("switch it back on"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake should fail"),
    }
    assert_eq!(link.count_writes(EXT_MODE), 1);
}

#[test]
fn test_checksum_mismatch_retried_once() {
    let link = MockAdapter::new();
    let mut session = connected(&link);

    let good = measurement_response(CommandCode::ReadEvXy, b' ', ["+50002", "+31270", "+32900"]);
    let mut corrupted = good.clone();
    corrupted[11] = b'1';
    expect_measurement(&link, READ_EV_XY, &corrupted);
    expect_measurement(&link, READ_EV_XY, &good);

    assert_eq!(session.get_lux().unwrap(), Some(50.0));
    assert_eq!(link.count_writes(READ_EV_XY), 2);
    assert_eq!(session.state(), &SessionState::Ready);
}

#[test]
fn test_repeated_checksum_mismatch_is_fatal() {
    let link = MockAdapter::new();
    let mut session = connected(&link);

    let mut corrupted =
        measurement_response(CommandCode::ReadEvXy, b' ', ["+50002", "+31270", "+32900"]);
    corrupted[11] = b'1';
    expect_measurement(&link, READ_EV_XY, &corrupted);
    expect_measurement(&link, READ_EV_XY, &corrupted);

    let err = session.get_lux().unwrap_err();
    assert!(matches!(
        err,
        DaqError::Frame(ResponseFault::ChecksumMismatch { .. })
    ));
    assert!(matches!(session.state(), SessionState::Faulted(_)));
    assert_eq!(link.count_writes(READ_EV_XY), 2);
}

#[test]
fn test_empty_read_is_no_data_yet() {
    let link = MockAdapter::new();
    let mut session = connected(&link);
    link.silent_on(EXT_TRIGGER).silent_on(READ_EV_XY);

    assert_eq!(session.get_lux().unwrap(), None);
    assert_eq!(session.state(), &SessionState::Ready);
    assert_eq!(link.count_writes(READ_EV_XY), 1);
}

#[test]
fn test_read_failure_loses_connection() {
    let link = MockAdapter::new();
    let mut session = connected(&link);
    link.fail_when_drained();

    assert!(matches!(
        session.get_lux(),
        Err(DaqError::ConnectionLost(_))
    ));
    assert!(matches!(session.state(), SessionState::Faulted(_)));
}

#[test]
fn test_get_xyz_and_delta_uv() {
    let link = MockAdapter::new();
    let mut session = connected(&link);

    expect_measurement(
        &link,
        READ_XYZ,
        &measurement_response(CommandCode::ReadXyz, b' ', ["+09503", "+10003", "+10893"]),
    );
    assert_eq!(session.get_xyz().unwrap(), Some((95.0, 100.0, 108.9)));

    expect_measurement(
        &link,
        READ_EV_TCP,
        &measurement_response(CommandCode::ReadEvTcpDeltaUv, b' ', ["+12344", "+65004", "+00124"]),
    );
    assert_eq!(session.get_delta_uv().unwrap(), Some((1234.0, 650.0, 1.2)));
}

#[test]
fn test_cct_zero_guard() {
    let link = MockAdapter::new();
    let mut session = connected(&link);
    expect_measurement(
        &link,
        READ_XYZ,
        &measurement_response(CommandCode::ReadXyz, b' ', ["+09503", "+10003", "+00000"]),
    );

    assert_eq!(
        session.get_cct(&["me_mccamy"]).unwrap(),
        Some(Cct::Single(0.0))
    );
}

#[test]
fn test_cct_per_method() {
    let link = MockAdapter::new();
    let mut session = connected(&link);
    expect_measurement(
        &link,
        READ_XYZ,
        &measurement_response(CommandCode::ReadXyz, b' ', ["+09503", "+10003", "+10893"]),
    );

    let Some(Cct::PerMethod(values)) = session
        .get_cct(&["me_mccamy", "Hernandez 1999"])
        .unwrap()
    else {
        panic!("expected one value per method");
    };
    assert_eq!(values.len(), 2);
    for value in values {
        assert!((6400.0..6600.0).contains(&value), "{value}");
    }
}

#[test]
fn test_unknown_cct_method_keeps_session_usable() {
    let link = MockAdapter::new();
    let mut session = connected(&link);
    expect_measurement(
        &link,
        READ_XYZ,
        &measurement_response(CommandCode::ReadXyz, b' ', ["+09503", "+10003", "+10893"]),
    );

    assert_eq!(session.get_cct(&["Kang 2002"]).unwrap(), None);
    assert_eq!(session.state(), &SessionState::Ready);
}

#[test]
fn test_full_sample() {
    let link = MockAdapter::new();
    let mut session = connected(&link);
    expect_measurement(
        &link,
        READ_EV_TCP,
        &measurement_response(CommandCode::ReadEvTcpDeltaUv, b' ', ["+12344", "+65004", "+00124"]),
    );
    expect_measurement(
        &link,
        READ_XYZ,
        &measurement_response(CommandCode::ReadXyz, b' ', ["+09503", "+10003", "+10893"]),
    );

    let sample = session.sample().unwrap().unwrap();
    assert_eq!(sample.instrument_id, "cl200a");
    assert_eq!(sample.lux, Some(1234.0));
    assert_eq!(sample.tcp, Some(650.0));
    assert!(matches!(sample.cct, Some(Cct::Single(_))));
    assert_eq!(link.pending_rules(), 0);
}
