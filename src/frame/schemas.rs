//! The BlueBattery frame catalogue.
//!
//! Field order, widths and scalings are the wire contract with the battery computer.

use super::Conversion as C;
use super::Encoding::{I16, I24, I32, U16, U8};
use super::{FieldSpec as F, FrameKind, FrameSchema, Postprocess, Preprocess};

/// Seconds since midnight on the device clock. Starts at 0 after power-up and rolls over
/// into a new log day at 86400.
pub static SEC: FrameSchema = FrameSchema {
    kind: FrameKind::Sec,
    name: "sec",
    output_id: "sec",
    fields: &[&[F::new(I32, "time_of_day_s")]],
    preprocess: None,
    postprocess: None,
};

/// Payload written to the sec endpoint to set the device clock.
pub fn encode_time_of_day(seconds: i32) -> [u8; 4] {
    seconds.to_be_bytes()
}

const LOG_DAYS_FIELDS: &[F] = &[
    F::new(U16, "Wh_day").with(C::MW_TO_W),
    F::new(U16, "max_W_day").with(C::MW_TO_W),
    F::new(U16, "min_V_day").with(C::MV_TO_V),
    F::new(U16, "max_V_day").with(C::MV_TO_V),
    F::new(U16, "charge_minutes_day"),
    // counts up from 0 for the oldest entry
    F::new(U16, "day_counter"),
    F::new(U16, "max_day_count"),
    F::new(U16, "solar_charge_Ah").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "state_of_charge_Ah").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "max_current_A").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "min_current_A").with(C::NEG_HUNDRED_MA_TO_A),
    F::new(U16, "max_state_of_charge_Ah").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "min_state_of_charge_Ah").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "max_temperature_deg_C").with(C::BB_TEMP_TO_DEG_C),
    F::new(U16, "min_temperature_deg_C").with(C::BB_TEMP_TO_DEG_C),
    F::new(U16, "total_external_charge_day_Ah").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "total_discharge_Ah").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "total_charge_day_Ah").with(C::HUNDRED_MA_TO_A),
    // frame type
    F::skip(1),
    F::new(U16, "total_booster_charge_day_Ah").with(C::HUNDRED_MA_TO_A),
];

pub static LOG_DAYS: FrameSchema = FrameSchema {
    kind: FrameKind::LogDays,
    name: "log_days",
    output_id: "log/day/-{days_ago}",
    fields: &[LOG_DAYS_FIELDS],
    preprocess: None,
    postprocess: Some(Postprocess::DaysAgo),
};

// Extended log records hold two intraday entries back to back.

const LOG_ENTRY: &[F] = &[
    F::new(U16, "day_counter"),
    // stored in units of two seconds
    F::new(U16, "wall_time").with(C::Times(2)),
    F::new(U16, "avg_battery_voltage_V").with(C::MV_TO_V),
    F::new(U16, "avg_solar_current_A").with(C::MA_TO_A),
    F::new(U8, "solar_charger_status").with(C::SolarStatus),
    F::new(U16, "avg_battery_current_A").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "battery_state_of_charge_A").with(C::MA_TO_A),
];

const LOG_ENTRY_BOOSTER: &[F] = &[
    F::new(U16, "avg_booster_input_voltage_V").with(C::TEN_MV_TO_V),
    F::new(I16, "avg_booster_current_A").with(C::HUNDRED_MA_TO_A),
];

const LOG_ENTRY_LARGE_SOLAR: &[F] = &[
    F::new(U16, "day_counter"),
    F::new(U16, "wall_time").with(C::Times(2)),
    F::new(U16, "avg_battery_voltage_V").with(C::MV_TO_V),
    F::new(U16, "avg_solar_current_A").with(C::EIGHT_MA_TO_A),
    F::new(U8, "solar_charger_status").with(C::SolarStatus),
    F::new(U16, "avg_battery_current_A").with(C::HUNDRED_MA_TO_A),
    F::new(U16, "battery_state_of_charge_A").with(C::MA_TO_A),
];

/// Up to firmware V305.
pub static LOG_EXTENDED: FrameSchema = FrameSchema {
    kind: FrameKind::LogExtended,
    name: "log_extended",
    output_id: "log/day/-{days_ago}/extended",
    fields: &[LOG_ENTRY, LOG_ENTRY, &[F::skip(10), F::skip(1)]],
    preprocess: None,
    postprocess: Some(Postprocess::DaysAgo),
};

pub static LOG_EXTENDED_BOOSTER: FrameSchema = FrameSchema {
    kind: FrameKind::LogExtendedBooster,
    name: "log_extended_booster",
    output_id: "log/day/-{days_ago}/extended",
    fields: &[
        LOG_ENTRY,
        LOG_ENTRY_BOOSTER,
        LOG_ENTRY,
        LOG_ENTRY_BOOSTER,
        &[F::skip(2), F::skip(1)],
    ],
    preprocess: None,
    postprocess: Some(Postprocess::DaysAgo),
};

pub static LOG_EXTENDED_LARGE_SOLAR: FrameSchema = FrameSchema {
    kind: FrameKind::LogExtendedLargeSolar,
    name: "log_extended_large_solar",
    output_id: "log/day/-{days_ago}/extended",
    fields: &[
        LOG_ENTRY_LARGE_SOLAR,
        LOG_ENTRY_BOOSTER,
        LOG_ENTRY_LARGE_SOLAR,
        LOG_ENTRY_BOOSTER,
        &[F::skip(2), F::skip(1)],
    ],
    preprocess: None,
    postprocess: Some(Postprocess::DaysAgo),
};

/// Frame type discriminator of the log endpoint: byte 36.
pub const LOG_FRAME_TYPES: &[(&[u8], FrameKind)] = &[
    (&[0x00], FrameKind::LogDays),
    (&[0x01], FrameKind::LogExtended),
    (&[0x02], FrameKind::LogExtendedBooster),
    (&[0x03], FrameKind::LogExtendedLargeSolar),
];

// Live frames start with a type byte and a length byte.

const HEADER: &[F] = &[F::skip(2)];

const LIVE_MEASUREMENT_FIELDS: &[F] = &[
    F::new(U16, "battery_voltage_V").with(C::MV_TO_V),
    F::new(U16, "solar_charge_current_A").with(C::MA_TO_A),
    F::new(I24, "battery_current_A").with(C::MA_TO_A),
];

const HEAP_SIZE: &[F] = &[F::new(U16, "heap_size_bytes")];

pub static LIVE_MEASUREMENT: FrameSchema = FrameSchema {
    kind: FrameKind::LiveMeasurement,
    name: "live_measurement",
    output_id: "live/measurement",
    fields: &[HEADER, LIVE_MEASUREMENT_FIELDS],
    preprocess: None,
    postprocess: None,
};

pub static LIVE_MEASUREMENT_EXTENDED: FrameSchema = FrameSchema {
    kind: FrameKind::LiveMeasurementExtended,
    name: "live_measurement_extended",
    output_id: "live/measurement_ext",
    fields: &[HEADER, LIVE_MEASUREMENT_FIELDS, HEAP_SIZE],
    preprocess: None,
    postprocess: None,
};

pub static LIVE_MEASUREMENT_LARGE_SOLAR: FrameSchema = FrameSchema {
    kind: FrameKind::LiveMeasurementLargeSolar,
    name: "live_measurement_large_solar",
    output_id: "live/measurement_ext",
    fields: &[
        HEADER,
        LIVE_MEASUREMENT_FIELDS,
        HEAP_SIZE,
        &[F::new(U8, "solar_charge_current_A").with(C::HighBits(16))],
    ],
    preprocess: Some(Preprocess::MergeHighBytes),
    postprocess: None,
};

const SOLAR_CHARGER_FIELDS: &[F] = &[
    F::new(U16, "max_solar_current_day_A").with(C::MA_TO_A),
    // reported at the battery, 95% charger efficiency
    F::new(U16, "max_solar_watt_day_W").with(C::per(0.95)),
    F::new(U16, "solar_charge_day_Ah").with(C::TEN_MAH_TO_AH),
    F::new(U16, "solar_energy_day_Wh"),
    // bit 7 set while the charger sleeps
    F::new(U8, "solar_charger_status"),
];

const SOLAR_MODULE_VOLTAGE: &[F] = &[F::new(U16, "solar_module_voltage_V").with(C::TEN_MV_TO_V)];

// BB-X >= V407
const RELAY_STATUS: &[F] = &[F::new(U8, "relay_status").with(C::RelayStatus)];

pub static SOLAR_CHARGER_EBL: FrameSchema = FrameSchema {
    kind: FrameKind::SolarChargerEbl,
    name: "solar_charger_ebl",
    output_id: "live/solar_charger_ebl",
    fields: &[HEADER, SOLAR_CHARGER_FIELDS],
    preprocess: None,
    postprocess: None,
};

pub static SOLAR_CHARGER_STANDARD: FrameSchema = FrameSchema {
    kind: FrameKind::SolarChargerStandard,
    name: "solar_charger_standard",
    output_id: "live/solar_charger",
    fields: &[HEADER, SOLAR_CHARGER_FIELDS, SOLAR_MODULE_VOLTAGE],
    preprocess: None,
    postprocess: None,
};

pub static SOLAR_CHARGER_EXTENDED: FrameSchema = FrameSchema {
    kind: FrameKind::SolarChargerExtended,
    name: "solar_charger_extended",
    output_id: "live/solar_charger_ext",
    fields: &[HEADER, SOLAR_CHARGER_FIELDS, SOLAR_MODULE_VOLTAGE, RELAY_STATUS],
    preprocess: None,
    postprocess: None,
};

/// Firmware >= V418 adds the high bytes of two solar values.
pub static SOLAR_CHARGER_LARGE_SOLAR: FrameSchema = FrameSchema {
    kind: FrameKind::SolarChargerLargeSolar,
    name: "solar_charger_large_solar",
    output_id: "live/solar_charger_ext",
    fields: &[
        HEADER,
        SOLAR_CHARGER_FIELDS,
        SOLAR_MODULE_VOLTAGE,
        RELAY_STATUS,
        &[
            // only meaningful while (status & 0x18) != 0
            F::new(U8, "solar_charger_phase"),
            F::new(U8, "max_solar_current_day_A").with(C::HighBits(16)),
            F::new(U8, "solar_charge_day_Ah").with(C::HighBits(16)),
        ],
    ],
    preprocess: Some(Preprocess::MergeHighBytes),
    postprocess: None,
};

pub static BATTERY_COMPUTER_1: FrameSchema = FrameSchema {
    kind: FrameKind::BatteryComputer1,
    name: "battery_computer_1",
    output_id: "live/battery_comp_1",
    fields: &[
        HEADER,
        &[
            F::new(U16, "battery_charge_Ah").with(C::TEN_MAH_TO_AH),
            // 0.1% steps
            F::new(U16, "state_of_charge_percent").with(C::per(10.0)),
            F::new(U16, "max_battery_current_day_A").with(C::TEN_MA_TO_A),
            F::new(U16, "min_battery_current_day_A").with(C::per(-10.0)),
            F::new(U16, "max_battery_charge_day_Ah").with(C::TEN_MAH_TO_AH),
            F::new(U16, "min_battery_charge_day_Ah").with(C::TEN_MAH_TO_AH),
            F::new(U16, "max_battery_voltage_day_V").with(C::MV_TO_V),
            F::new(U16, "min_battery_voltage_day_V").with(C::MV_TO_V),
        ],
    ],
    preprocess: None,
    postprocess: None,
};

// Daily charge totals count in units of 32/225 mAh.
const CHARGE_UNITS_TO_AH: C = C::Linear {
    mul: 32.0 / 225.0,
    div: 1000.0,
};

pub static BATTERY_COMPUTER_2: FrameSchema = FrameSchema {
    kind: FrameKind::BatteryComputer2,
    name: "battery_computer_2",
    output_id: "live/battery_comp_2",
    fields: &[
        HEADER,
        &[
            F::new(U16, "temperature_deg_C").with(C::BB_TEMP_TO_DEG_C),
            F::new(U16, "min_temperature_deg_C").with(C::BB_TEMP_TO_DEG_C),
            F::new(U16, "max_temperature_deg_C").with(C::BB_TEMP_TO_DEG_C),
            F::new(I24, "total_charge_day_Ah").with(CHARGE_UNITS_TO_AH),
            F::new(I24, "total_discharge_day_Ah").with(CHARGE_UNITS_TO_AH),
            F::new(I24, "total_external_charge_day_Ah").with(CHARGE_UNITS_TO_AH),
        ],
    ],
    preprocess: None,
    postprocess: None,
};

const INTRADAY_LOG_FIELDS: &[F] = &[F::new(U8, "record_number")];

pub static INTRADAY_LOG: FrameSchema = FrameSchema {
    kind: FrameKind::IntradayLog,
    name: "intraday_log",
    output_id: "live/intraday_log",
    fields: &[HEADER, INTRADAY_LOG_FIELDS],
    preprocess: None,
    postprocess: None,
};

pub static INTRADAY_LOG_EXTENDED: FrameSchema = FrameSchema {
    kind: FrameKind::IntradayLogExtended,
    name: "intraday_log_extended",
    output_id: "live/intraday_log",
    fields: &[HEADER, INTRADAY_LOG_FIELDS, &[F::new(U8, "log_type")]],
    preprocess: None,
    postprocess: None,
};

const NO_BOOSTER_FIELDS: &[F] = &[
    // board battery
    F::new(U16, "battery_voltage_V").with(C::TEN_MV_TO_V),
    F::new(U16, "starter_battery_voltage_V").with(C::TEN_MV_TO_V),
];

const BOOSTER_FIELDS: &[F] = &[
    F::new(U16, "booster_charge_current_A").with(C::HUNDRED_MA_TO_A),
    F::new(U8, "booster_status"),
    // units of 256/18000 Ah
    F::new(I24, "total_booster_charge_day_Ah").with(C::Linear {
        mul: 256.0 / 18000.0,
        div: 1.0,
    }),
];

const BOOSTER_EXTENDED_FIELDS: &[F] = &[
    // 0: unknown, 1: off, 2: on
    F::new(U8, "booster_limit"),
    // only meaningful while (status & 0xc0) != 0
    F::new(U8, "booster_phase").with(C::ChargerPhase),
];

pub static NO_BOOSTER: FrameSchema = FrameSchema {
    kind: FrameKind::NoBooster,
    name: "no_booster",
    output_id: "live/info",
    fields: &[HEADER, NO_BOOSTER_FIELDS],
    preprocess: None,
    postprocess: None,
};

pub static BOOSTER: FrameSchema = FrameSchema {
    kind: FrameKind::Booster,
    name: "booster",
    output_id: "live/booster",
    fields: &[HEADER, NO_BOOSTER_FIELDS, BOOSTER_FIELDS],
    preprocess: None,
    postprocess: None,
};

pub static BOOSTER_EXTENDED: FrameSchema = FrameSchema {
    kind: FrameKind::BoosterExtended,
    name: "booster_extended",
    output_id: "live/booster",
    fields: &[HEADER, NO_BOOSTER_FIELDS, BOOSTER_FIELDS, BOOSTER_EXTENDED_FIELDS],
    preprocess: None,
    postprocess: None,
};

pub static BOOSTER_EXTENDED_BBX: FrameSchema = FrameSchema {
    kind: FrameKind::BoosterExtendedBbx,
    name: "booster_extended_bbx",
    output_id: "live/booster",
    fields: &[
        HEADER,
        NO_BOOSTER_FIELDS,
        BOOSTER_FIELDS,
        BOOSTER_EXTENDED_FIELDS,
        &[
            F::new(U16, "analog_board_voltage_V").with(C::MV_TO_V),
            F::new(U16, "analog_starter_voltage_V").with(C::MV_TO_V),
        ],
    ],
    preprocess: None,
    postprocess: None,
};

/// Frame type discriminator of the live endpoint: (type, length) in bytes 0 and 1.
pub const LIVE_FRAME_TYPES: &[(&[u8], FrameKind)] = &[
    (&[0x00, 0x07], FrameKind::LiveMeasurement),
    (&[0x00, 0x09], FrameKind::LiveMeasurementExtended),
    (&[0x00, 0x0a], FrameKind::LiveMeasurementLargeSolar),
    (&[0x01, 0x09], FrameKind::SolarChargerEbl),
    (&[0x01, 0x0b], FrameKind::SolarChargerStandard),
    (&[0x01, 0x0c], FrameKind::SolarChargerExtended),
    (&[0x01, 0x0f], FrameKind::SolarChargerLargeSolar),
    (&[0x02, 0x10], FrameKind::BatteryComputer1),
    (&[0x02, 0x11], FrameKind::BatteryComputer1),
    (&[0x03, 0x0f], FrameKind::BatteryComputer2),
    (&[0x04, 0x01], FrameKind::IntradayLog),
    (&[0x04, 0x02], FrameKind::IntradayLogExtended),
    (&[0x05, 0x04], FrameKind::NoBooster),
    (&[0x05, 0x0a], FrameKind::Booster),
    (&[0x05, 0x0c], FrameKind::BoosterExtended),
    (&[0x05, 0x10], FrameKind::BoosterExtendedBbx),
];
