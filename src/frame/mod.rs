//! Declarative description of the fixed-layout binary frames sent by the battery computer.
//!
//! Every frame is a sequence of big-endian fields. A [`FrameSchema`] lists those fields in
//! wire order, names the ones worth keeping and says how to convert each raw integer into
//! a physical value. [`decode`] walks a payload against a schema and yields one or more
//! [`DecodedFrame`]s: some records carry the same layout twice in a row, and every
//! repetition of a field name starts a new frame.

mod conversion;
mod decoder;
pub mod schemas;

use std::fmt;

pub use conversion::Conversion;
pub use decoder::{decode, DecodeContext};

/// Wire representation of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    U8,
    U16,
    I16,
    I32,
    /// Three bytes, two's complement.
    I24,
    /// Opaque bytes handed through untouched.
    Bytes(usize),
    /// Bytes skipped without producing a value.
    Padding(usize),
}

impl Encoding {
    pub const fn width(self) -> usize {
        match self {
            Encoding::U8 => 1,
            Encoding::U16 | Encoding::I16 => 2,
            Encoding::I24 => 3,
            Encoding::I32 => 4,
            Encoding::Bytes(n) | Encoding::Padding(n) => n,
        }
    }

    /// Read a value from exactly `self.width()` bytes.
    pub(crate) fn read(self, bytes: &[u8]) -> RawValue {
        match self {
            Encoding::U8 => RawValue::Int(i64::from(bytes[0])),
            Encoding::U16 => RawValue::Int(i64::from(u16::from_be_bytes([bytes[0], bytes[1]]))),
            Encoding::I16 => RawValue::Int(i64::from(i16::from_be_bytes([bytes[0], bytes[1]]))),
            Encoding::I24 => {
                let value = i64::from(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]));
                if value & 0x80_0000 != 0 {
                    RawValue::Int(value - 0x100_0000)
                } else {
                    RawValue::Int(value)
                }
            }
            Encoding::I32 => RawValue::Int(i64::from(i32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            Encoding::Bytes(_) | Encoding::Padding(_) => RawValue::Bytes(bytes.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawValue {
    Int(i64),
    Bytes(Vec<u8>),
}

/// One field of a frame. A field with an empty name is skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub encoding: Encoding,
    pub name: &'static str,
    pub conversion: Conversion,
}

impl FieldSpec {
    pub const fn new(encoding: Encoding, name: &'static str) -> Self {
        Self {
            encoding,
            name,
            conversion: Conversion::Raw,
        }
    }

    pub const fn skip(bytes: usize) -> Self {
        Self::new(Encoding::Padding(bytes), "")
    }

    pub const fn with(self, conversion: Conversion) -> Self {
        Self {
            encoding: self.encoding,
            name: self.name,
            conversion,
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.name.is_empty() || matches!(self.encoding, Encoding::Padding(_))
    }

    pub(crate) fn convert(&self, raw: &RawValue) -> Value {
        match raw {
            RawValue::Int(value) => self.conversion.apply(*value),
            RawValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
        }
    }
}

/// Rewrites the raw field list before frames are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocess {
    /// A later field repeating an earlier name holds extra high-order bits: its converted
    /// value is added to the earlier raw value.
    MergeHighBytes,
}

/// Derives extra fields once a frame's map is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postprocess {
    /// `days_ago = max_day_count - day_counter`, with the maximum remembered in the
    /// [`DecodeContext`] for frames that do not carry it.
    DaysAgo,
}

/// Identifies each frame layout the battery computer can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Sec,
    LogDays,
    LogExtended,
    LogExtendedBooster,
    LogExtendedLargeSolar,
    LiveMeasurement,
    LiveMeasurementExtended,
    LiveMeasurementLargeSolar,
    SolarChargerEbl,
    SolarChargerStandard,
    SolarChargerExtended,
    SolarChargerLargeSolar,
    BatteryComputer1,
    BatteryComputer2,
    IntradayLog,
    IntradayLogExtended,
    NoBooster,
    Booster,
    BoosterExtended,
    BoosterExtendedBbx,
}

impl FrameKind {
    pub fn schema(self) -> &'static FrameSchema {
        use schemas::*;
        match self {
            FrameKind::Sec => &SEC,
            FrameKind::LogDays => &LOG_DAYS,
            FrameKind::LogExtended => &LOG_EXTENDED,
            FrameKind::LogExtendedBooster => &LOG_EXTENDED_BOOSTER,
            FrameKind::LogExtendedLargeSolar => &LOG_EXTENDED_LARGE_SOLAR,
            FrameKind::LiveMeasurement => &LIVE_MEASUREMENT,
            FrameKind::LiveMeasurementExtended => &LIVE_MEASUREMENT_EXTENDED,
            FrameKind::LiveMeasurementLargeSolar => &LIVE_MEASUREMENT_LARGE_SOLAR,
            FrameKind::SolarChargerEbl => &SOLAR_CHARGER_EBL,
            FrameKind::SolarChargerStandard => &SOLAR_CHARGER_STANDARD,
            FrameKind::SolarChargerExtended => &SOLAR_CHARGER_EXTENDED,
            FrameKind::SolarChargerLargeSolar => &SOLAR_CHARGER_LARGE_SOLAR,
            FrameKind::BatteryComputer1 => &BATTERY_COMPUTER_1,
            FrameKind::BatteryComputer2 => &BATTERY_COMPUTER_2,
            FrameKind::IntradayLog => &INTRADAY_LOG,
            FrameKind::IntradayLogExtended => &INTRADAY_LOG_EXTENDED,
            FrameKind::NoBooster => &NO_BOOSTER,
            FrameKind::Booster => &BOOSTER,
            FrameKind::BoosterExtended => &BOOSTER_EXTENDED,
            FrameKind::BoosterExtendedBbx => &BOOSTER_EXTENDED_BBX,
        }
    }
}

/// Layout of one frame type.
///
/// `fields` is a list of field groups laid out back to back, so layouts that extend a
/// shorter one can share its group.
#[derive(Debug)]
pub struct FrameSchema {
    pub kind: FrameKind,
    pub name: &'static str,
    /// Output id, may reference decoded fields as `{name}`.
    pub output_id: &'static str,
    pub fields: &'static [&'static [FieldSpec]],
    pub preprocess: Option<Preprocess>,
    pub postprocess: Option<Postprocess>,
}

impl FrameSchema {
    pub fn fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        let groups: &'static [&'static [FieldSpec]] = self.fields;
        groups.iter().flat_map(|group| group.iter())
    }

    /// Number of payload bytes the layout covers.
    pub fn width(&self) -> usize {
        self.fields().map(|field| field.encoding.width()).sum()
    }
}

/// A converted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(&'static str),
    Flags(Vec<&'static str>),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(text) => f.write_str(text),
            Value::Flags(flags) => f.write_str(&flags.join("|")),
            Value::Bytes(bytes) => f.write_str(&hex::encode(bytes)),
        }
    }
}

/// One logical frame decoded from a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub kind: FrameKind,
    pub output_id: String,
    /// Field values in wire order, followed by derived fields.
    pub fields: Vec<(&'static str, Value)>,
}

impl DecodedFrame {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }
}

#[test]
fn test_i24_reads_unsigned_below_sign_bit() {
    assert_eq!(Encoding::I24.read(&[0x01, 0x00, 0x00]), RawValue::Int(65_536));
    assert_eq!(Encoding::I24.read(&[0x7f, 0xff, 0xff]), RawValue::Int(8_388_607));
}

#[test]
fn test_i24_reads_twos_complement() {
    assert_eq!(Encoding::I24.read(&[0xff, 0xff, 0xff]), RawValue::Int(-1));
    assert_eq!(Encoding::I24.read(&[0x80, 0x00, 0x00]), RawValue::Int(-8_388_608));
}

#[test]
fn test_signed_and_unsigned_16_bit() {
    assert_eq!(Encoding::U16.read(&[0xff, 0xf6]), RawValue::Int(65_526));
    assert_eq!(Encoding::I16.read(&[0xff, 0xf6]), RawValue::Int(-10));
    assert_eq!(Encoding::I32.read(&[0x00, 0x01, 0x51, 0x80]), RawValue::Int(86_400));
}

#[test]
fn test_value_display() {
    assert_eq!(Value::Int(3).to_string(), "3");
    assert_eq!(Value::Float(12.5).to_string(), "12.5");
    assert_eq!(Value::Flags(vec!["enabled", "trigger_soc"]).to_string(), "enabled|trigger_soc");
    assert_eq!(Value::Bytes(vec![0xbe, 0xef]).to_string(), "beef");
}
