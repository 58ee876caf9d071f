//! Synthesizes UT382 frames from a display description.
//!
//! Used to script [`MockAdapter`](crate::adapters::MockAdapter) input and for
//! dry runs without a meter attached.

use super::decoder::{CR_INDEX, DATA_LEN, FRAME_LEN, LF_INDEX, NIBBLE_PREFIX};
use super::table::{Digit, DisplayMode, Field, FieldSpec, MenuPage, Value};
use crate::core::LuxUnit;

/// Trailing byte after CR LF; the meter sends a varying value here.
const TRAILER: u8 = 0x3C;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayImage {
    data: [u8; DATA_LEN],
}

impl Default for DisplayImage {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayImage {
    /// Blank display in lux.
    pub fn new() -> Self {
        Self {
            data: [0; DATA_LEN],
        }
        .unit(LuxUnit::Lux)
    }

    /// Lights `value` on `field`, leaving the other elements of the byte alone.
    pub fn set(mut self, field: Field, value: Value) -> Self {
        let spec = FieldSpec::spec(field);
        if let Some(bits) = spec.encode(&value) {
            let byte = &mut self.data[spec.byte];
            *byte = (*byte & !spec.used_bits()) | bits;
        }
        self
    }

    /// Main display, thousands first.
    pub fn big(self, digits: [Digit; 4]) -> Self {
        let fields = [Field::Big1000, Field::Big100, Field::Big10, Field::Big1];
        fields
            .into_iter()
            .zip(digits)
            .fold(self, |image, (field, digit)| image.set(field, Value::Digit(digit)))
    }

    /// Shows a decimal reading such as `"123.4"` on the main display.
    pub fn lux(self, shown: &str) -> Self {
        let (whole, fraction) = shown.split_once('.').unwrap_or((shown, ""));
        let numbers: Vec<Digit> = whole
            .chars()
            .chain(fraction.chars())
            .filter_map(|c| c.to_digit(10))
            .map(|d| Digit::Number(d as u8))
            .take(4)
            .collect();
        let mut big = [Digit::Blank; 4];
        let offset = big.len() - numbers.len();
        big[offset..].copy_from_slice(&numbers);
        self.big(big).decimal(fraction.len())
    }

    /// Lights the decimal point for `places` digits after it (0 clears all).
    pub fn decimal(self, places: usize) -> Self {
        [Field::Big10ths, Field::Big100ths, Field::Big1000ths]
            .into_iter()
            .enumerate()
            .fold(self, |image, (i, field)| {
                image.set(field, Value::Flag(i + 1 == places))
            })
    }

    pub fn unit(self, unit: LuxUnit) -> Self {
        self.set(Field::Unit, Value::Unit(unit))
    }

    pub fn x10(self) -> Self {
        self.set(Field::X10, Value::Flag(true))
    }

    pub fn battery_low(self) -> Self {
        self.set(Field::Battery, Value::Flag(true))
    }

    pub fn menu(self, page: MenuPage) -> Self {
        self.set(Field::Menu, Value::Menu(page))
    }

    pub fn modes(self, modes: &[DisplayMode]) -> Self {
        self.set(Field::Mode, Value::Modes(modes.to_vec()))
    }

    pub fn scale(self, scale: u32) -> Self {
        self.set(Field::Scale, Value::Scale(scale))
    }

    /// The 15 data bytes.
    pub fn data(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// The 33 bytes the meter sends for this image.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_LEN);
        for byte in self.data {
            frame.push(NIBBLE_PREFIX | (byte & 0x0F));
            frame.push(NIBBLE_PREFIX | (byte >> 4));
        }
        debug_assert_eq!(frame.len(), CR_INDEX);
        frame.push(0x0D);
        debug_assert_eq!(frame.len(), LF_INDEX);
        frame.push(0x0A);
        frame.push(TRAILER);
        frame
    }
}
