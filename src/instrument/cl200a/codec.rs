//! CL-200A command/response frame codec.
//!
//! Frame layout (both directions):
//!
//! ```text
//! STX | body (ASCII) | ETX | BCC (2 hex digits) | CR LF
//! ```
//!
//! The BCC is the XOR of every body byte and the ETX byte. Request bodies are
//! 8 characters: receptor head (2 digits), command (2 digits), parameter
//! field (4 characters, space padded).
//!
//! Measurement responses are decoded positionally. Numeric payloads may contain
//! characters that other response kinds use as separators, so fields are
//! always taken by offset, never by splitting.

use crate::error::DaqError;
use thiserror::Error;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Request body width: head (2) + command (2) + parameters (4).
pub const BODY_LEN: usize = 8;
pub const PARAM_WIDTH: usize = 4;

/// Acknowledgment frame length without CR LF.
pub const ACK_FRAME_LEN: usize = 12;
/// Measurement frame length without CR LF.
pub const MEASUREMENT_FRAME_LEN: usize = 30;

/// Error status character.
pub const ERR_INDEX: usize = 6;
/// Range status character.
pub const RANGE_INDEX: usize = 7;
/// Battery status character.
pub const BATTERY_INDEX: usize = 8;

/// Sign, four digits and exponent of the first data block.
pub const DATA1_SIGN: usize = 9;
pub const DATA1_DIGITS: std::ops::Range<usize> = 10..14;
pub const DATA1_EXPONENT: usize = 14;
pub const DATA2_DIGITS: std::ops::Range<usize> = 16..20;
pub const DATA3_DIGITS: std::ops::Range<usize> = 22..26;

/// Divisor applied to the raw four-digit XYZ/TCP/Δuv fields.
pub const FIELD_DIVISOR: f64 = 10.0;

/// Commands used by the acquisition engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// 01: read X, Y, Z
    ReadXyz,
    /// 02: read Ev, x, y
    ReadEvXy,
    /// 08: read Ev, TCP, Δuv
    ReadEvTcpDeltaUv,
    /// 40: switch to EXT mode
    SetExtMode,
    /// 40 broadcast: take one EXT measurement on every receptor
    ExtMeasure,
    /// 54: switch to PC connection mode
    PcConnect,
    /// 55: set hold status on every receptor
    Hold,
}

impl CommandCode {
    pub const ALL: [CommandCode; 7] = [
        CommandCode::ReadXyz,
        CommandCode::ReadEvXy,
        CommandCode::ReadEvTcpDeltaUv,
        CommandCode::SetExtMode,
        CommandCode::ExtMeasure,
        CommandCode::PcConnect,
        CommandCode::Hold,
    ];

    pub fn code(&self) -> u8 {
        match self {
            CommandCode::ReadXyz => 1,
            CommandCode::ReadEvXy => 2,
            CommandCode::ReadEvTcpDeltaUv => 8,
            CommandCode::SetExtMode | CommandCode::ExtMeasure => 40,
            CommandCode::PcConnect => 54,
            CommandCode::Hold => 55,
        }
    }

    pub fn default_receptor(&self) -> u8 {
        match self {
            CommandCode::ExtMeasure | CommandCode::Hold => 99,
            _ => 0,
        }
    }

    pub fn default_params(&self) -> &'static str {
        match self {
            CommandCode::ReadXyz | CommandCode::ReadEvXy | CommandCode::ReadEvTcpDeltaUv => "1200",
            CommandCode::SetExtMode => "10",
            CommandCode::ExtMeasure => "21",
            CommandCode::PcConnect => "1",
            CommandCode::Hold => "1  0",
        }
    }

    /// Expected response length (without CR LF), `None` when the instrument
    /// does not answer.
    pub fn response_len(&self) -> Option<usize> {
        match self {
            CommandCode::ReadXyz | CommandCode::ReadEvXy | CommandCode::ReadEvTcpDeltaUv => {
                Some(MEASUREMENT_FRAME_LEN)
            }
            CommandCode::SetExtMode | CommandCode::PcConnect => Some(ACK_FRAME_LEN),
            CommandCode::ExtMeasure | CommandCode::Hold => None,
        }
    }
}

/// A logical command: opcode plus its receptor head and parameter field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub code: CommandCode,
    pub receptor: u8,
    pub params: String,
}

impl Command {
    pub fn new(code: CommandCode) -> Self {
        Self {
            code,
            receptor: code.default_receptor(),
            params: code.default_params().to_string(),
        }
    }

    pub fn with_receptor(mut self, receptor: u8) -> Self {
        self.receptor = receptor;
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    /// The fixed-width 8 character body.
    pub fn body(&self) -> Result<String, DaqError> {
        if self.receptor > 99 {
            return Err(DaqError::Encoding(format!(
                "receptor head {} does not fit 2 digits",
                self.receptor
            )));
        }
        if self.params.len() > PARAM_WIDTH || !self.params.is_ascii() {
            return Err(DaqError::Encoding(format!(
                "parameter field '{}' does not fit {} ASCII characters",
                self.params, PARAM_WIDTH
            )));
        }
        Ok(format!(
            "{:02}{:02}{:<width$}",
            self.receptor,
            self.code.code(),
            self.params,
            width = PARAM_WIDTH
        ))
    }

    /// Parses a request body back into a command.
    pub fn parse(body: &[u8]) -> Result<Self, ResponseFault> {
        if body.len() != BODY_LEN {
            return Err(ResponseFault::ShortFrame {
                expected: BODY_LEN,
                actual: body.len(),
            });
        }
        if !body.is_ascii() {
            return Err(ResponseFault::BadField {
                start: 0,
                end: BODY_LEN,
            });
        }
        let text = std::str::from_utf8(body).map_err(|_| ResponseFault::BadField {
            start: 0,
            end: BODY_LEN,
        })?;
        let receptor: u8 = text[0..2]
            .parse()
            .map_err(|_| ResponseFault::BadField { start: 0, end: 2 })?;
        let number: u8 = text[2..4]
            .parse()
            .map_err(|_| ResponseFault::BadField { start: 2, end: 4 })?;
        let params = text[4..].trim_end().to_string();
        let code = CommandCode::ALL
            .iter()
            .copied()
            .filter(|c| c.code() == number)
            .find(|c| {
                // Both EXT commands share opcode 40; the parameter field tells them apart
                number != 40 || c.default_params() == params
            })
            .ok_or_else(|| ResponseFault::UnexpectedCommand {
                expected: String::from("known command"),
                found: text[2..4].to_string(),
            })?;
        Ok(Self {
            code,
            receptor,
            params,
        })
    }
}

/// Block check character over the body and ETX.
pub fn bcc(body: &[u8]) -> u8 {
    body.iter().fold(ETX, |acc, b| acc ^ b)
}

/// Wraps a body into a complete frame including CR LF.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 6);
    out.push(STX);
    out.extend_from_slice(body);
    out.push(ETX);
    out.extend_from_slice(format!("{:02X}", bcc(body)).as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Builds the exact bytes sent for `command`.
pub fn encode(command: &Command) -> Result<Vec<u8>, DaqError> {
    Ok(frame(command.body()?.as_bytes()))
}

/// Device-side acknowledgment frame, as the instrument sends it.
pub fn ack_response(code: CommandCode, err: u8) -> Vec<u8> {
    let body = format!("00{:02} {}  ", code.code(), err as char);
    frame(body.as_bytes())
}

/// Device-side measurement frame with three `±dddde` data blocks.
pub fn measurement_response(code: CommandCode, err: u8, blocks: [&str; 3]) -> Vec<u8> {
    let mut body = format!("00{:02}1", code.code()).into_bytes();
    body.push(err);
    body.extend_from_slice(b"0 ");
    for block in blocks {
        assert_eq!(block.len(), 6, "data block '{}' is not ±dddde", block);
        body.extend_from_slice(block.as_bytes());
    }
    frame(&body)
}

/// Why a response frame was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseFault {
    #[error("instrument reported error code {0}")]
    ErrorCode(u8),
    #[error("short frame: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("checksum mismatch: computed {computed:02X}, received '{received}'")]
    ChecksumMismatch { computed: u8, received: String },
    #[error("bad frame marker 0x{found:02X} at {index}")]
    BadMarker { index: usize, found: u8 },
    #[error("response echoes command '{found}', expected {expected}")]
    UnexpectedCommand { expected: String, found: String },
    #[error("unparsable numeric field at {start}..{end}")]
    BadField { start: usize, end: usize },
}

impl ResponseFault {
    /// Device-reported faults need a power cycle; everything else is a
    /// transmission problem worth one more attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ResponseFault::ErrorCode(_))
    }
}

/// Validates framing and checksum, returning the body.
pub fn decode_frame(raw: &[u8], verify_checksum: bool) -> Result<&[u8], ResponseFault> {
    let frame = trim_line_end(raw);
    if frame.len() < 4 {
        return Err(ResponseFault::ShortFrame {
            expected: 4,
            actual: frame.len(),
        });
    }
    if frame[0] != STX {
        return Err(ResponseFault::BadMarker {
            index: 0,
            found: frame[0],
        });
    }
    let etx_index = frame.len() - 3;
    if frame[etx_index] != ETX {
        return Err(ResponseFault::BadMarker {
            index: etx_index,
            found: frame[etx_index],
        });
    }
    let body = &frame[1..etx_index];
    let received = &frame[etx_index + 1..];
    if verify_checksum {
        let computed = bcc(body);
        let matches = std::str::from_utf8(received)
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .is_some_and(|value| value == computed);
        if !matches {
            return Err(ResponseFault::ChecksumMismatch {
                computed,
                received: String::from_utf8_lossy(received).into_owned(),
            });
        }
    }
    Ok(body)
}

/// Validates a response to `expected` and exposes its positional fields.
pub fn decode(
    raw: &[u8],
    expected: CommandCode,
    verify_checksum: bool,
) -> Result<ResponseFields, ResponseFault> {
    let frame = trim_line_end(raw);
    let min_len = expected.response_len().unwrap_or(ACK_FRAME_LEN);
    if frame.len() < min_len {
        return Err(ResponseFault::ShortFrame {
            expected: min_len,
            actual: frame.len(),
        });
    }
    let body = decode_frame(frame, verify_checksum)?;

    let echoed = &body[2..4];
    let wanted = format!("{:02}", expected.code());
    if echoed != wanted.as_bytes() {
        return Err(ResponseFault::UnexpectedCommand {
            expected: wanted,
            found: String::from_utf8_lossy(echoed).into_owned(),
        });
    }

    if let Some(code @ b'1'..=b'3') = frame.get(ERR_INDEX).copied() {
        return Err(ResponseFault::ErrorCode(code - b'0'));
    }

    Ok(ResponseFields {
        raw: frame.to_vec(),
    })
}

fn trim_line_end(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    &raw[..end]
}

/// A validated response frame (without CR LF).
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseFields {
    raw: Vec<u8>,
}

impl ResponseFields {
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Error status character, `b' '` when absent.
    pub fn err_code(&self) -> u8 {
        self.raw.get(ERR_INDEX).copied().unwrap_or(b' ')
    }

    pub fn field(&self, range: std::ops::Range<usize>) -> Result<&str, ResponseFault> {
        let bad = ResponseFault::BadField {
            start: range.start,
            end: range.end,
        };
        let bytes = self.raw.get(range).ok_or_else(|| bad.clone())?;
        std::str::from_utf8(bytes).map_err(|_| bad)
    }

    /// A fixed-width decimal field.
    pub fn number(&self, range: std::ops::Range<usize>) -> Result<f64, ResponseFault> {
        let (start, end) = (range.start, range.end);
        self.field(range)?
            .trim()
            .parse::<f64>()
            .map_err(|_| ResponseFault::BadField { start, end })
    }

    /// A fixed-width field scaled by [`FIELD_DIVISOR`].
    pub fn scaled(&self, range: std::ops::Range<usize>) -> Result<f64, ResponseFault> {
        Ok(self.number(range)? / FIELD_DIVISOR)
    }

    /// First data block as illuminance: sign × digits × 10^(exponent − 4).
    pub fn illuminance(&self) -> Result<f64, ResponseFault> {
        let sign = match self.raw.get(DATA1_SIGN) {
            Some(b'-') => -1.0,
            Some(_) => 1.0,
            None => {
                return Err(ResponseFault::BadField {
                    start: DATA1_SIGN,
                    end: DATA1_SIGN + 1,
                })
            }
        };
        let digits = self.number(DATA1_DIGITS)?;
        let exponent = self
            .raw
            .get(DATA1_EXPONENT)
            .filter(|b| b.is_ascii_digit())
            .map(|b| i32::from(b - b'0'))
            .ok_or(ResponseFault::BadField {
                start: DATA1_EXPONENT,
                end: DATA1_EXPONENT + 1,
            })?;
        let value = if exponent >= 4 {
            digits * 10f64.powi(exponent - 4)
        } else {
            digits / 10f64.powi(4 - exponent)
        };
        Ok(sign * value)
    }

    /// Non-fatal conditions flagged in the status characters.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        match self.err_code() {
            b'5' => out.push("measurement value over error: the reading exceeds the measurement range"),
            b'6' => out.push("low luminance error: the reading is below the measurement range"),
            _ => {}
        }
        if matches!(self.raw.get(BATTERY_INDEX), Some(b'1') | Some(b'3')) {
            out.push("battery is low");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_checksum() {
        let bytes = encode(&Command::new(CommandCode::PcConnect)).unwrap();
        assert_eq!(bytes, b"\x0200541   \x0313\r\n".to_vec());
    }

    #[test]
    fn test_command_bodies() {
        let body = |c| Command::new(c).body().unwrap();
        assert_eq!(body(CommandCode::ReadXyz), "00011200");
        assert_eq!(body(CommandCode::ReadEvXy), "00021200");
        assert_eq!(body(CommandCode::ReadEvTcpDeltaUv), "00081200");
        assert_eq!(body(CommandCode::SetExtMode), "004010  ");
        assert_eq!(body(CommandCode::ExtMeasure), "994021  ");
        assert_eq!(body(CommandCode::PcConnect), "00541   ");
        assert_eq!(body(CommandCode::Hold), "99551  0");
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for code in CommandCode::ALL {
            for receptor in [0u8, 7, 29, 99] {
                let cmd = Command::new(code).with_receptor(receptor);
                let bytes = encode(&cmd).unwrap();
                let body = decode_frame(&bytes, true).unwrap();
                let parsed = Command::parse(body).unwrap();
                assert_eq!(parsed.code, cmd.code);
                assert_eq!(parsed.receptor, cmd.receptor);
                assert_eq!(parsed.params, cmd.params.trim_end());
            }
        }
    }

    #[test]
    fn test_parse_rejects_non_ascii_body() {
        assert_eq!(
            Command::parse("0é541  ".as_bytes()),
            Err(ResponseFault::BadField {
                start: 0,
                end: BODY_LEN
            })
        );
        assert!(matches!(
            Command::parse(b"0x541   "),
            Err(ResponseFault::BadField { start: 0, end: 2 })
        ));
    }

    #[test]
    #[should_panic(expected = "is not ±dddde")]
    fn test_measurement_response_needs_full_blocks() {
        measurement_response(CommandCode::ReadEvXy, b' ', ["+12343", "+3127", "+32900"]);
    }

    #[test]
    fn test_encoding_rejects_wide_fields() {
        let err = encode(&Command::new(CommandCode::ReadXyz).with_receptor(100)).unwrap_err();
        assert!(matches!(err, DaqError::Encoding(_)));
        let err = encode(&Command::new(CommandCode::ReadXyz).with_params("12000")).unwrap_err();
        assert!(matches!(err, DaqError::Encoding(_)));
    }

    #[test]
    fn test_decode_measurement_fields() {
        let raw = measurement_response(CommandCode::ReadEvXy, b' ', ["+12343", "+03130", "+03290"]);
        let fields = decode(&raw, CommandCode::ReadEvXy, true).unwrap();
        assert!((fields.illuminance().unwrap() - 123.4).abs() < 1e-9);
        assert!((fields.scaled(DATA2_DIGITS).unwrap() - 31.3).abs() < 1e-9);
        assert!(fields.warnings().is_empty());
    }

    #[test]
    fn test_short_frame() {
        let raw = frame(b"0002");
        assert!(matches!(
            decode(&raw, CommandCode::ReadEvXy, true),
            Err(ResponseFault::ShortFrame { expected: 30, .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut raw = measurement_response(CommandCode::ReadXyz, b' ', ["+09500", "+10000", "+10880"]);
        let bcc_pos = raw.len() - 4;
        raw[bcc_pos] = if raw[bcc_pos] == b'0' { b'1' } else { b'0' };
        let fault = decode(&raw, CommandCode::ReadXyz, true).unwrap_err();
        assert!(matches!(fault, ResponseFault::ChecksumMismatch { .. }));
        assert!(fault.is_retryable());
        // Skipping verification accepts the frame
        assert!(decode(&raw, CommandCode::ReadXyz, false).is_ok());
    }

    #[test]
    fn test_device_error_code() {
        let raw = measurement_response(CommandCode::ReadXyz, b'2', ["+00000", "+00000", "+00000"]);
        let fault = decode(&raw, CommandCode::ReadXyz, true).unwrap_err();
        assert_eq!(fault, ResponseFault::ErrorCode(2));
        assert!(!fault.is_retryable());
    }

    #[test]
    fn test_wrong_command_echo() {
        let raw = measurement_response(CommandCode::ReadEvTcpDeltaUv, b' ', ["+12343", "+65000", "+00020"]);
        assert!(matches!(
            decode(&raw, CommandCode::ReadXyz, true),
            Err(ResponseFault::UnexpectedCommand { .. })
        ));
    }

    #[test]
    fn test_status_warnings() {
        let mut body = measurement_response(CommandCode::ReadEvXy, b'5', ["+12343", "+03130", "+03290"]);
        body[BATTERY_INDEX] = b'1';
        let fields = decode(&body, CommandCode::ReadEvXy, false).unwrap();
        assert_eq!(fields.warnings().len(), 2);
    }

    #[test]
    fn test_negative_illuminance() {
        let raw = measurement_response(CommandCode::ReadEvXy, b' ', ["-00054", "+03130", "+03290"]);
        let fields = decode(&raw, CommandCode::ReadEvXy, true).unwrap();
        assert!((fields.illuminance().unwrap() + 5.0).abs() < 1e-9);
    }
}
