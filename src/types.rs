use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Pounds per kilogram
pub const LB_PER_KG: f32 = 2.204_62;

/// Stones per kilogram
pub const ST_PER_KG: f32 = 0.157_473;

/// Weight unit a user prefers to see measurements in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightUnit {
    /// Kilograms
    #[default]
    Kilograms,
    /// Pounds
    Pounds,
    /// Stones
    Stones,
}

impl WeightUnit {
    /// Convert a weight in kilograms into this unit
    #[must_use]
    pub fn convert_kg(self, kg: f32) -> f32 {
        match self {
            Self::Kilograms => kg,
            Self::Pounds => kg * LB_PER_KG,
            Self::Stones => kg * ST_PER_KG,
        }
    }

    /// Convert a weight expressed in this unit back into kilograms
    #[must_use]
    pub fn to_kg(self, value: f32) -> f32 {
        match self {
            Self::Kilograms => value,
            Self::Pounds => value / LB_PER_KG,
            Self::Stones => value / ST_PER_KG,
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kilograms => write!(f, "kg"),
            Self::Pounds => write!(f, "lb"),
            Self::Stones => write!(f, "st"),
        }
    }
}

/// Gender as understood by the scale firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Encoded as `0x00`
    Male,
    /// Encoded as `0x01`
    Female,
}

impl Gender {
    /// Wire encoding of this gender
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Male => 0x00,
            Self::Female => 0x01,
        }
    }

    /// Decode a gender byte, `None` for values the firmware does not define
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Male),
            0x01 => Some(Self::Female),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "Male"),
            Self::Female => write!(f, "Female"),
        }
    }
}

/// Profile of the user stepping on the scale
///
/// Height and age are wider than their one-byte wire fields; values above
/// 255 wrap when the profile is sent to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User gender
    pub gender: Gender,
    /// Body height in centimeters
    pub height_cm: u16,
    /// Age in years
    pub age_years: u16,
    /// User slot on the scale
    pub user_slot: u8,
    /// Unit decoded weights are converted into
    pub weight_unit: WeightUnit,
}

impl UserProfile {
    /// Create a new profile using kilograms as the display unit
    #[must_use]
    pub const fn new(gender: Gender, height_cm: u16, age_years: u16, user_slot: u8) -> Self {
        Self {
            gender,
            height_cm,
            age_years,
            user_slot,
            weight_unit: WeightUnit::Kilograms,
        }
    }

    /// Same profile with a different display unit
    #[must_use]
    pub const fn with_weight_unit(mut self, weight_unit: WeightUnit) -> Self {
        self.weight_unit = weight_unit;
        self
    }
}

/// GATT endpoints a scale driver talks to
///
/// Fixed for the lifetime of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceChannelSet {
    /// Service owning all three characteristics
    pub service: Uuid,
    /// Primary measurement characteristic (read, notify)
    pub measurement: Uuid,
    /// Auxiliary data characteristic (read, notify)
    pub auxiliary: Uuid,
    /// Command characteristic (write only)
    pub command: Uuid,
    /// Client characteristic configuration descriptor
    pub config_descriptor: Uuid,
}

impl DeviceChannelSet {
    /// Whether `channel` is one of the notifying characteristics
    #[must_use]
    pub fn is_notifying(&self, channel: Uuid) -> bool {
        channel == self.measurement || channel == self.auxiliary
    }
}

/// Device information gathered while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Device MAC address
    pub mac_address: Option<String>,
    /// Signal strength (RSSI)
    pub rssi: i16,
}

impl DeviceInfo {
    /// Create new device info
    #[must_use]
    pub const fn new(name: String, rssi: i16) -> Self {
        Self {
            name,
            mac_address: None,
            rssi,
        }
    }
}

/// Connection parameters
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
    /// Scan timeout in milliseconds
    pub scan_timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            scan_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_conversion() {
        assert!((WeightUnit::Kilograms.convert_kg(65.8) - 65.8).abs() < f32::EPSILON);
        assert!((WeightUnit::Pounds.convert_kg(10.0) - 22.046).abs() < 0.01);
        assert!((WeightUnit::Stones.convert_kg(63.5) - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_weight_unit_round_trip() {
        let weights = vec![0.0, 0.1, 45.3, 65.8, 150.0, 6553.5];

        for kg in weights {
            for unit in [WeightUnit::Kilograms, WeightUnit::Pounds, WeightUnit::Stones] {
                let back = unit.to_kg(unit.convert_kg(kg));
                assert!(
                    (back - kg).abs() < 0.05,
                    "{kg} kg -> {unit} -> {back} kg drifted"
                );
            }
        }
    }

    #[test]
    fn test_gender_bytes() {
        assert_eq!(Gender::Male.to_byte(), 0x00);
        assert_eq!(Gender::Female.to_byte(), 0x01);
        assert_eq!(Gender::from_byte(0x00), Some(Gender::Male));
        assert_eq!(Gender::from_byte(0x01), Some(Gender::Female));
        assert_eq!(Gender::from_byte(0x07), None);
    }

    #[test]
    fn test_profile_defaults_to_kilograms() {
        let profile = UserProfile::new(Gender::Male, 180, 40, 1);
        assert_eq!(profile.weight_unit, WeightUnit::Kilograms);

        let profile = profile.with_weight_unit(WeightUnit::Stones);
        assert_eq!(profile.weight_unit, WeightUnit::Stones);
        assert_eq!(profile.height_cm, 180);
    }

    #[test]
    fn test_weight_unit_display() {
        assert_eq!(WeightUnit::Kilograms.to_string(), "kg");
        assert_eq!(WeightUnit::Pounds.to_string(), "lb");
        assert_eq!(WeightUnit::Stones.to_string(), "st");
    }

    #[test]
    fn test_connection_params_default() {
        let params = ConnectionParams::default();
        assert_eq!(params.timeout_ms, 30_000);
        assert_eq!(params.scan_timeout_ms, 10_000);
    }
}
