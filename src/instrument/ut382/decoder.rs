//! UT382 frame validation and display decoding.
//!
//! The meter mirrors its LCD driver: 30 bytes carrying 15 data bytes as
//! nibble pairs (high nibble always `0x3`), then CR, LF and one trailing byte
//! that is not decoded.

use super::table::{Digit, DisplayMode, Field, MenuPage, Value, LCD_TABLE};
use crate::core::LuxUnit;
use std::collections::BTreeMap;
use std::fmt;

pub const FRAME_LEN: usize = 33;
/// Bytes carrying data nibbles.
pub const NIBBLE_SPAN: usize = 30;
pub const NIBBLE_PREFIX: u8 = 0x30;
pub const CR_INDEX: usize = 30;
pub const LF_INDEX: usize = 31;
/// Data bytes recovered from a complete frame.
pub const DATA_LEN: usize = NIBBLE_SPAN / 2;

/// Structural defect of a candidate frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameAnomaly {
    WrongLength(usize),
    BadPrefix { index: usize, byte: u8 },
    BadTerminator { index: usize, byte: u8 },
}

impl fmt::Display for FrameAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameAnomaly::WrongLength(len) => write!(f, "wrong message length {}", len),
            FrameAnomaly::BadPrefix { index, byte } => {
                write!(f, "bad byte prefix 0x{:02X} at {}", byte, index)
            }
            FrameAnomaly::BadTerminator { index, byte } => {
                write!(f, "bad byte {} (0x{:02X})", index, byte)
            }
        }
    }
}

/// Reconstructed data bytes plus everything that looked wrong on the way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub anomalies: Vec<FrameAnomaly>,
}

impl RawFrame {
    /// A weird frame is decoded anyway; the caller decides whether to use it.
    pub fn is_weird(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

/// Validates a candidate frame and folds nibble pairs into data bytes.
pub fn decode_raw(bytes: &[u8]) -> RawFrame {
    let mut anomalies = Vec::new();
    if bytes.len() != FRAME_LEN {
        anomalies.push(FrameAnomaly::WrongLength(bytes.len()));
    }
    for (index, &byte) in bytes.iter().enumerate().take(NIBBLE_SPAN) {
        if byte & 0xF0 != NIBBLE_PREFIX {
            anomalies.push(FrameAnomaly::BadPrefix { index, byte });
        }
    }
    for (index, expected) in [(CR_INDEX, 0x0D), (LF_INDEX, 0x0A)] {
        if let Some(&byte) = bytes.get(index) {
            if byte != expected {
                anomalies.push(FrameAnomaly::BadTerminator { index, byte });
            }
        }
    }

    let data = bytes[..bytes.len().min(NIBBLE_SPAN)]
        .chunks_exact(2)
        .map(|pair| (pair[0] & 0x0F) | ((pair[1] & 0x0F) << 4))
        .collect();

    RawFrame { data, anomalies }
}

/// Every table element found in a frame.
pub type Summary = BTreeMap<Field, Value>;

pub fn decode_summary(data: &[u8]) -> Summary {
    let mut summary = Summary::new();
    for (index, &byte) in data.iter().enumerate() {
        for spec in LCD_TABLE.iter().filter(|spec| spec.byte == index) {
            summary.insert(spec.field, spec.decode(byte));
        }
    }
    summary
}

/// Typed view of one display image.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    /// Main display, thousands first.
    pub big: [Digit; 4],
    /// Secondary display, thousands first.
    pub little: [Digit; 4],
    /// Tenths, hundredths and thousandths decimal points.
    pub decimals: [bool; 3],
    pub unit: Option<LuxUnit>,
    pub scale: Option<u32>,
    pub modes: Vec<DisplayMode>,
    pub auto_range: bool,
    pub x10: bool,
    pub battery_low: bool,
    pub usb: bool,
    pub rec: bool,
    pub power_off: bool,
    pub menu: Option<MenuPage>,
}

impl DecodedFrame {
    pub fn decode(data: &[u8]) -> Self {
        Self::from_summary(&decode_summary(data))
    }

    pub fn from_summary(summary: &Summary) -> Self {
        let digit = |field: Field| match summary.get(&field) {
            Some(Value::Digit(d)) => *d,
            Some(Value::Unrecognized(bits)) => Digit::Unrecognized(*bits),
            _ => Digit::Blank,
        };
        let flag = |field: Field| matches!(summary.get(&field), Some(Value::Flag(true)));

        Self {
            big: [
                digit(Field::Big1000),
                digit(Field::Big100),
                digit(Field::Big10),
                digit(Field::Big1),
            ],
            little: [
                digit(Field::Little1000),
                digit(Field::Little100),
                digit(Field::Little10),
                digit(Field::Little1),
            ],
            decimals: [
                flag(Field::Big10ths),
                flag(Field::Big100ths),
                flag(Field::Big1000ths),
            ],
            unit: match summary.get(&Field::Unit) {
                Some(Value::Unit(unit)) => Some(*unit),
                _ => None,
            },
            scale: match summary.get(&Field::Scale) {
                Some(Value::Scale(scale)) => Some(*scale),
                _ => None,
            },
            modes: match summary.get(&Field::Mode) {
                Some(Value::Modes(modes)) => modes.clone(),
                _ => Vec::new(),
            },
            auto_range: flag(Field::Auto),
            x10: flag(Field::X10),
            battery_low: flag(Field::Battery),
            usb: flag(Field::Usb),
            rec: flag(Field::Rec),
            power_off: flag(Field::PowerOff),
            menu: match summary.get(&Field::Menu) {
                Some(Value::Menu(page)) => Some(*page),
                _ => None,
            },
        }
    }
}

/// Illuminance shown on the main display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LuxReading {
    /// `None` for the over-range display and for non-numeric glyphs.
    pub lux: Option<f64>,
    /// A decimal point was lit.
    pub fractional: bool,
    pub unit: Option<LuxUnit>,
}

fn is_over_range(big: &[Digit; 4]) -> bool {
    big[0].is_empty()
        && big[1] == Digit::Number(0)
        && big[2] == Digit::Letter('L')
        && big[3].is_empty()
}

pub fn decode_lux(frame: &DecodedFrame) -> LuxReading {
    let fractional = frame.decimals.iter().any(|&set| set);
    let no_reading = LuxReading {
        lux: None,
        fractional,
        unit: frame.unit,
    };
    if is_over_range(&frame.big) {
        return no_reading;
    }

    let mut lux = 0.0;
    for (place, digit) in frame.big.iter().rev().enumerate() {
        match digit {
            Digit::Number(n) => lux += f64::from(*n) * 10f64.powi(place as i32),
            Digit::Letter(_) => return no_reading,
            Digit::Blank | Digit::Unrecognized(_) => {}
        }
    }
    for (set, divisor) in frame.decimals.iter().zip([10.0, 100.0, 1000.0]) {
        if *set {
            lux /= divisor;
        }
    }
    if frame.x10 {
        lux *= 10.0;
    }
    if !fractional {
        lux = lux.trunc();
    }

    LuxReading {
        lux: Some(lux),
        fractional,
        unit: frame.unit,
    }
}
