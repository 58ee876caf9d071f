//! LCD segment map of the UT382.
//!
//! Each entry names one display element by the reconstructed byte it lives
//! in, the bits it occupies and how those bits read. Several elements share a
//! byte (digit segments and the decimal point, unit and battery icons) but
//! never the same bits.

use crate::core::LuxUnit;

/// A display element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Big1,
    Big10,
    Big100,
    Big1000,
    Little1,
    Little10,
    Little100,
    Little1000,
    Big10ths,
    Big100ths,
    Big1000ths,
    Mode,
    Auto,
    Scale,
    Unit,
    X10,
    PowerOff,
    Battery,
    Rec,
    Usb,
    Menu,
}

/// What one seven-segment position shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Digit {
    Blank,
    Number(u8),
    Letter(char),
    /// Lit segments that form no known glyph.
    Unrecognized(u8),
}

impl Digit {
    /// True when the position contributes nothing to a number.
    pub fn is_empty(&self) -> bool {
        matches!(self, Digit::Blank | Digit::Unrecognized(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    Hold,
    Max,
    Min,
}

/// Settings page shown instead of a reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuPage {
    Usb,
    AutoPowerOff,
    Rec,
    Code,
    Defaults,
}

/// A decoded display element.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Digit(Digit),
    Flag(bool),
    Scale(u32),
    Unit(LuxUnit),
    Menu(MenuPage),
    Modes(Vec<DisplayMode>),
    /// Masked bits matching no known value.
    Unrecognized(u8),
}

/// How the masked bits of an entry are read.
#[derive(Clone, Copy, Debug)]
pub enum FieldKind {
    /// Seven-segment glyph via [`SEVEN_SEGMENT`].
    Glyph,
    /// Single indicator, set when every masked bit is lit.
    Flag,
    Scale(&'static [(u8, u32)]),
    Unit(&'static [(u8, LuxUnit)]),
    Menu(&'static [(u8, MenuPage)]),
    /// Set of independent indicators; every matching key is reported.
    Bitwise(&'static [(u8, DisplayMode)]),
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub field: Field,
    pub byte: usize,
    pub mask: u8,
    pub kind: FieldKind,
}

pub const SEVEN_SEGMENT: &[(u8, Digit)] = &[
    (0x00, Digit::Blank),
    (0x7B, Digit::Number(0)),
    (0x60, Digit::Number(1)),
    (0x5E, Digit::Number(2)),
    (0x7C, Digit::Number(3)),
    (0x65, Digit::Number(4)),
    (0x3D, Digit::Number(5)),
    (0x3F, Digit::Number(6)),
    (0x70, Digit::Number(7)),
    (0x7F, Digit::Number(8)),
    (0x7D, Digit::Number(9)),
    (0x6B, Digit::Letter('U')),
    (0x2F, Digit::Letter('b')),
    (0x77, Digit::Letter('A')),
    (0x57, Digit::Letter('P')),
    (0x1F, Digit::Letter('E')),
    (0x1B, Digit::Letter('C')),
    (0x6D, Digit::Letter('d')),
    (0x6E, Digit::Letter('d')),
    (0x17, Digit::Letter('F')),
    (0x56, Digit::Letter('?')),
    (0x0B, Digit::Letter('L')),
];

const MODES: &[(u8, DisplayMode)] = &[
    (0x10, DisplayMode::Hold),
    (0x20, DisplayMode::Max),
    (0x40, DisplayMode::Min),
];

const SCALES: &[(u8, u32)] = &[
    (0x00, 2),
    (0x80, 20),
    (0xC0, 200),
    (0xE0, 2000),
    (0xF0, 20000),
];

const UNITS: &[(u8, LuxUnit)] = &[(0x08, LuxUnit::Lux), (0x04, LuxUnit::Footcandle)];

const MENUS: &[(u8, MenuPage)] = &[
    (0x20, MenuPage::Usb),
    (0x30, MenuPage::AutoPowerOff),
    (0x40, MenuPage::Rec),
    (0x50, MenuPage::Code),
    (0x60, MenuPage::Defaults),
];

const fn entry(field: Field, byte: usize, mask: u8, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        field,
        byte,
        mask,
        kind,
    }
}

// Not mapped: rel, clock, load number, full memory, small colon.
pub static LCD_TABLE: [FieldSpec; 21] = [
    entry(Field::Big1, 1, 0x7F, FieldKind::Glyph),
    entry(Field::Big10, 2, 0x7F, FieldKind::Glyph),
    entry(Field::Big100, 3, 0x7F, FieldKind::Glyph),
    entry(Field::Big1000, 4, 0x7F, FieldKind::Glyph),
    entry(Field::Little1, 5, 0x7F, FieldKind::Glyph),
    entry(Field::Little10, 6, 0x7F, FieldKind::Glyph),
    entry(Field::Little100, 7, 0x7F, FieldKind::Glyph),
    entry(Field::Little1000, 8, 0x7F, FieldKind::Glyph),
    entry(Field::Big10ths, 2, 0x80, FieldKind::Flag),
    entry(Field::Big100ths, 3, 0x80, FieldKind::Flag),
    entry(Field::Big1000ths, 4, 0x80, FieldKind::Flag),
    entry(Field::Mode, 11, 0xFF, FieldKind::Bitwise(MODES)),
    entry(Field::Auto, 10, 0x02, FieldKind::Flag),
    entry(Field::Scale, 10, 0xF0, FieldKind::Scale(SCALES)),
    entry(Field::Unit, 9, 0x0C, FieldKind::Unit(UNITS)),
    entry(Field::X10, 9, 0x01, FieldKind::Flag),
    entry(Field::PowerOff, 11, 0x02, FieldKind::Flag),
    entry(Field::Battery, 9, 0x10, FieldKind::Flag),
    entry(Field::Rec, 11, 0x01, FieldKind::Flag),
    entry(Field::Usb, 9, 0x20, FieldKind::Flag),
    entry(Field::Menu, 0, 0xFF, FieldKind::Menu(MENUS)),
];

fn lookup<T: Copy>(table: &[(u8, T)], bits: u8) -> Option<T> {
    table.iter().find(|(key, _)| *key == bits).map(|(_, v)| *v)
}

fn reverse<T: PartialEq>(table: &[(u8, T)], value: &T) -> Option<u8> {
    table.iter().find(|(_, v)| v == value).map(|(key, _)| *key)
}

impl FieldSpec {
    /// Table entries are stored in `Field` declaration order.
    pub fn spec(field: Field) -> &'static FieldSpec {
        &LCD_TABLE[field as usize]
    }

    /// Reads this element from a reconstructed byte.
    pub fn decode(&self, byte: u8) -> Value {
        let bits = byte & self.mask;
        let found = match self.kind {
            FieldKind::Glyph => lookup(SEVEN_SEGMENT, bits).map(Value::Digit),
            FieldKind::Flag => Some(Value::Flag(bits == self.mask)),
            FieldKind::Scale(table) => lookup(table, bits).map(Value::Scale),
            FieldKind::Unit(table) => lookup(table, bits).map(Value::Unit),
            FieldKind::Menu(table) => lookup(table, bits).map(Value::Menu),
            FieldKind::Bitwise(table) => Some(Value::Modes(
                table
                    .iter()
                    .filter(|(key, _)| key & bits != 0)
                    .map(|(_, mode)| *mode)
                    .collect(),
            )),
        };
        found.unwrap_or(Value::Unrecognized(bits))
    }

    /// Bits that display `value`, `None` if this element cannot show it.
    pub fn encode(&self, value: &Value) -> Option<u8> {
        match (self.kind, value) {
            (FieldKind::Glyph, Value::Digit(digit)) => reverse(SEVEN_SEGMENT, digit),
            (FieldKind::Flag, Value::Flag(set)) => Some(if *set { self.mask } else { 0 }),
            (FieldKind::Scale(table), Value::Scale(scale)) => reverse(table, scale),
            (FieldKind::Unit(table), Value::Unit(unit)) => reverse(table, unit),
            (FieldKind::Menu(table), Value::Menu(page)) => reverse(table, page),
            (FieldKind::Bitwise(table), Value::Modes(modes)) => Some(
                modes
                    .iter()
                    .filter_map(|mode| reverse(table, mode))
                    .fold(0, |acc, key| acc | key),
            ),
            (_, Value::Unrecognized(bits)) => Some(bits & self.mask),
            _ => None,
        }
    }

    /// Bits any known value of this element can light.
    pub fn used_bits(&self) -> u8 {
        match self.kind {
            FieldKind::Bitwise(table) => table.iter().fold(0, |acc, (key, _)| acc | key),
            _ => self.mask,
        }
    }
}
