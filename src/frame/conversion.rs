use super::Value;

/// How a raw integer read off the wire becomes an output value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// Keep the raw integer.
    Raw,
    /// `raw * mul / div` as a float.
    Linear { mul: f64, div: f64 },
    /// Binary offset encoding: `(raw - offset) / div`.
    BinaryOffset { offset: i64, div: f64 },
    /// Integer multiple of the raw value.
    Times(i64),
    /// Raw value shifted into the high bits of a wider value.
    HighBits(u32),
    /// Solar charger status code (active, standby, reduced).
    SolarStatus,
    /// Charger phase in the low nibble (bulk, absorption, float, care).
    ChargerPhase,
    /// Relay status bitmask.
    RelayStatus,
}

const RELAY_STATUS_BITS: [&str; 8] = [
    "enabled",
    "trigger_soc",
    "trigger_board_voltage",
    "trigger_starter_voltage",
    "trigger_temperature",
    "trigger_solar_current",
    "trigger_time",
    "reserved",
];

impl Conversion {
    pub const MV_TO_V: Conversion = Conversion::per(1000.0);
    pub const MW_TO_W: Conversion = Conversion::per(1000.0);
    pub const MA_TO_A: Conversion = Conversion::per(1000.0);
    pub const TEN_MV_TO_V: Conversion = Conversion::per(100.0);
    pub const TEN_MA_TO_A: Conversion = Conversion::per(100.0);
    pub const TEN_MAH_TO_AH: Conversion = Conversion::per(100.0);
    pub const EIGHT_MA_TO_A: Conversion = Conversion::per(125.0);
    pub const HUNDRED_MA_TO_A: Conversion = Conversion::per(10.0);
    pub const NEG_HUNDRED_MA_TO_A: Conversion = Conversion::Linear { mul: -1.0, div: 10.0 };
    /// Temperatures are sent as hundredths of a degree around 0x8000.
    pub const BB_TEMP_TO_DEG_C: Conversion = Conversion::BinaryOffset {
        offset: 0x8000,
        div: 100.0,
    };

    /// Divide the raw value by `div`.
    pub const fn per(div: f64) -> Self {
        Conversion::Linear { mul: 1.0, div }
    }

    pub fn apply(&self, raw: i64) -> Value {
        match *self {
            Conversion::Raw => Value::Int(raw),
            Conversion::Linear { mul, div } => Value::Float(raw as f64 * mul / div),
            Conversion::BinaryOffset { offset, div } => Value::Float((raw - offset) as f64 / div),
            Conversion::Times(factor) => Value::Int(raw * factor),
            Conversion::HighBits(shift) => Value::Int(raw << shift),
            Conversion::SolarStatus => Value::Text(match raw {
                0 => "active",
                1 => "standby",
                2 => "reduced",
                _ => "unknown",
            }),
            Conversion::ChargerPhase => Value::Text(match raw & 0x0f {
                0 => "bulk",
                1 => "absorption",
                2 => "float",
                3 => "care",
                _ => "unknown",
            }),
            Conversion::RelayStatus => Value::Flags(
                RELAY_STATUS_BITS
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| raw & (1 << bit) != 0)
                    .map(|(_, name)| *name)
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_scalings() {
        assert_eq!(Conversion::MV_TO_V.apply(12_345), Value::Float(12.345));
        assert_eq!(Conversion::HUNDRED_MA_TO_A.apply(25), Value::Float(2.5));
        assert_eq!(Conversion::NEG_HUNDRED_MA_TO_A.apply(50), Value::Float(-5.0));
        assert_eq!(Conversion::EIGHT_MA_TO_A.apply(250), Value::Float(2.0));
    }

    #[test]
    fn test_binary_offset_temperature() {
        assert_eq!(Conversion::BB_TEMP_TO_DEG_C.apply(0x8866), Value::Float(21.5));
        assert_eq!(Conversion::BB_TEMP_TO_DEG_C.apply(0x7f9c), Value::Float(-1.0));
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(Conversion::Times(2).apply(18_000), Value::Int(36_000));
        assert_eq!(Conversion::HighBits(16).apply(1), Value::Int(65_536));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(Conversion::SolarStatus.apply(2), Value::Text("reduced"));
        assert_eq!(Conversion::SolarStatus.apply(9), Value::Text("unknown"));
        assert_eq!(Conversion::ChargerPhase.apply(0x13), Value::Text("care"));
        assert_eq!(Conversion::ChargerPhase.apply(0x07), Value::Text("unknown"));
    }

    #[test]
    fn test_relay_status_flags() {
        assert_eq!(Conversion::RelayStatus.apply(0), Value::Flags(vec![]));
        assert_eq!(
            Conversion::RelayStatus.apply(0b0100_0101),
            Value::Flags(vec!["enabled", "trigger_board_voltage", "trigger_time"])
        );
    }
}
