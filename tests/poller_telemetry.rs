use std::time::Duration;

use gpd_panel_lib::serial::{MockHandle, MockTransport};
use gpd_panel_lib::session::{Session, SessionConfig, TelemetryEvent};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Session connected to an instrument with output on and all eight
/// telemetry queries scripted, so the poller starts immediately.
fn polling_session(mock: MockTransport) -> (Session, MockHandle) {
    mock.on("*IDN?", "GW Instek GPD-X303S");
    mock.on("STATUS?", "00000100");
    let handle = mock.handle();

    let mut session = Session::with_config(SessionConfig {
        read_timeout_ms: 20,
        poll_interval_ms: 10,
        ..Default::default()
    });
    session.connect_with(Box::new(mock)).expect("connect should succeed");
    assert!(session.is_polling());
    (session, handle)
}

fn script_telemetry(mock: &MockTransport) {
    for ch in 1..=4u8 {
        mock.on(&format!("VOUT{}?", ch), &format!("{}.000", ch));
        mock.on(&format!("IOUT{}?", ch), &format!("0.{}00", ch));
    }
}

#[test]
fn two_cycles_emit_all_channels_in_order() {
    let mock = MockTransport::new();
    script_telemetry(&mock);
    let (session, _handle) = polling_session(mock);

    let updates = session.subscribe();
    let received: Vec<TelemetryEvent> = (0..16)
        .map(|_| updates.recv_timeout(RECV_TIMEOUT).expect("poller should keep emitting"))
        .collect();

    let mut expected = Vec::new();
    for _cycle in 0..2 {
        for channel in 0..4usize {
            expected.push(TelemetryEvent::Voltage {
                channel,
                text: format!("{}.000", channel + 1),
            });
            expected.push(TelemetryEvent::Current {
                channel,
                text: format!("0.{}00", channel + 1),
            });
        }
    }

    assert_eq!(received, expected);
}

#[test]
fn silent_query_skips_that_update_only() {
    let mock = MockTransport::new();
    script_telemetry(&mock);
    // Channel 3's voltage query goes unanswered this session.
    mock.silence("VOUT3?");
    let (session, _handle) = polling_session(mock);

    let updates = session.subscribe();
    let received: Vec<TelemetryEvent> = (0..7)
        .map(|_| updates.recv_timeout(RECV_TIMEOUT).expect("poller should keep emitting"))
        .collect();

    // One full cycle: channel index 2 misses its voltage update but still
    // reports current, and channel 4 is queried normally.
    let expected = vec![
        TelemetryEvent::Voltage { channel: 0, text: "1.000".into() },
        TelemetryEvent::Current { channel: 0, text: "0.100".into() },
        TelemetryEvent::Voltage { channel: 1, text: "2.000".into() },
        TelemetryEvent::Current { channel: 1, text: "0.200".into() },
        TelemetryEvent::Current { channel: 2, text: "0.300".into() },
        TelemetryEvent::Voltage { channel: 3, text: "4.000".into() },
        TelemetryEvent::Current { channel: 3, text: "0.400".into() },
    ];
    assert_eq!(received, expected);
}

#[test]
fn readings_hold_the_latest_sample_per_channel() {
    let mock = MockTransport::new();
    script_telemetry(&mock);
    let (session, _handle) = polling_session(mock);

    let updates = session.subscribe();
    // Wait for one complete cycle to land.
    for _ in 0..8 {
        updates.recv_timeout(RECV_TIMEOUT).expect("poller should keep emitting");
    }

    let readings = session.readings();
    assert_eq!(readings[0].voltage, "1.000");
    assert_eq!(readings[0].current, "0.100");
    assert_eq!(readings[3].voltage, "4.000");
    assert_eq!(readings[3].current, "0.400");
}

#[test]
fn stop_returns_only_after_the_wire_goes_quiet() {
    let mock = MockTransport::new();
    script_telemetry(&mock);
    let (mut session, handle) = polling_session(mock);

    let updates = session.subscribe();
    // Let at least one cycle of traffic through.
    for _ in 0..8 {
        updates.recv_timeout(RECV_TIMEOUT).expect("poller should keep emitting");
    }

    session.disconnect();
    let writes_after_stop = handle.sent_count();

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(
        handle.sent_count(),
        writes_after_stop,
        "no transport call may happen after stop() returned"
    );
    assert!(!handle.is_open());
}
