//! GPD-X303S line protocol
//!
//! Stateless formatting and parsing for the instrument's ASCII command set.
//! Commands are produced without the newline terminator; the transport
//! appends it.

use serde::{Deserialize, Serialize};

use super::{Result, SerialError};

/// Number of output channels on the instrument.
pub const CHANNEL_COUNT: usize = 4;

/// Replies to `*IDN?` must contain this marker (case-insensitive) for the
/// device to be accepted.
pub const VENDOR_MARKER: &str = "gw instek";

/// Byte position in the `STATUS?` reply that carries the output relay state.
const STATUS_OUTPUT_BYTE: usize = 5;

pub const IDN_QUERY: &str = "*IDN?";
pub const STATUS_QUERY: &str = "STATUS?";
pub const OUTPUT_ENABLE: &str = "OUT1";
pub const OUTPUT_DISABLE: &str = "OUT0";

/// Instrument output relay state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputState {
    On,
    Off,
}

impl OutputState {
    pub fn is_on(self) -> bool {
        self == OutputState::On
    }
}

/// `VOUT{ch}?` queries actual voltage. `channel` is the 1-based channel
/// number printed on the front panel.
pub fn voltage_query(channel: u8) -> String {
    debug_assert!((1..=CHANNEL_COUNT as u8).contains(&channel));
    format!("VOUT{}?", channel)
}

/// `IOUT{ch}?` queries actual current.
pub fn current_query(channel: u8) -> String {
    debug_assert!((1..=CHANNEL_COUNT as u8).contains(&channel));
    format!("IOUT{}?", channel)
}

/// `VSET{ch}:{value}` programs a voltage setpoint. The value is forwarded
/// exactly as the operator typed it; the instrument rejects what it cannot
/// parse.
pub fn voltage_set(channel: u8, value: &str) -> String {
    debug_assert!((1..=CHANNEL_COUNT as u8).contains(&channel));
    format!("VSET{}:{}", channel, value)
}

/// `ISET{ch}:{value}` programs a current setpoint.
pub fn current_set(channel: u8, value: &str) -> String {
    debug_assert!((1..=CHANNEL_COUNT as u8).contains(&channel));
    format!("ISET{}:{}", channel, value)
}

/// Check an `*IDN?` reply against the expected vendor marker.
pub fn identity_matches(reply: &str) -> bool {
    reply.to_lowercase().contains(VENDOR_MARKER)
}

/// Decode the output relay state from a `STATUS?` reply.
///
/// The reply is a fixed-width flag string; only the output byte is
/// inspected here. A reply too short to carry it is a protocol error.
pub fn decode_output_status(reply: &str) -> Result<OutputState> {
    let flags = reply.as_bytes();
    if flags.len() <= STATUS_OUTPUT_BYTE {
        return Err(SerialError::ProtocolError(format!(
            "STATUS reply too short: {:?}",
            reply
        )));
    }

    if flags[STATUS_OUTPUT_BYTE] == b'1' {
        Ok(OutputState::On)
    } else {
        Ok(OutputState::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_commands_carry_channel_number() {
        assert_eq!(voltage_query(1), "VOUT1?");
        assert_eq!(voltage_query(4), "VOUT4?");
        assert_eq!(current_query(2), "IOUT2?");
    }

    #[test]
    fn setpoint_commands_forward_value_verbatim() {
        assert_eq!(voltage_set(2, "5.0"), "VSET2:5.0");
        assert_eq!(current_set(3, "0.250"), "ISET3:0.250");
        // No validation: whatever the operator typed goes on the wire.
        assert_eq!(voltage_set(1, "garbage"), "VSET1:garbage");
    }

    #[test]
    fn identity_match_is_case_insensitive() {
        assert!(identity_matches("GW INSTEK,GPD-3303S,SN123,V2.0"));
        assert!(identity_matches("GW Instek GPD-X303S"));
        assert!(!identity_matches("unknown device"));
        assert!(!identity_matches(""));
    }

    #[test]
    fn status_output_byte_decodes() {
        assert_eq!(decode_output_status("00000100").unwrap(), OutputState::On);
        assert_eq!(decode_output_status("00000000").unwrap(), OutputState::Off);
        // Any non-'1' byte means off.
        assert_eq!(decode_output_status("11111011").unwrap(), OutputState::Off);
        // Exactly six bytes is enough to reach the output flag.
        assert_eq!(decode_output_status("000001").unwrap(), OutputState::On);
    }

    #[test]
    fn short_status_reply_is_protocol_error() {
        for reply in ["", "0", "00000"] {
            let err = decode_output_status(reply).unwrap_err();
            assert!(
                matches!(err, SerialError::ProtocolError(_)),
                "expected ProtocolError for {:?}",
                reply
            );
        }
    }
}
