use crate::{
    error::{Result, ScaleError},
    types::{Gender, UserProfile, WeightUnit},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Measurement payload size in bytes
pub const PAYLOAD_SIZE: usize = 19;

/// User profile command size in bytes
pub const USER_PROFILE_COMMAND_SIZE: usize = 5;

/// Opcode introducing the user profile command
pub const USER_PROFILE_OPCODE: u8 = 0x10;

/// Fixed-point divisor used by every scaled field
const FIXED_POINT_SCALE: f32 = 10.0;

/// Payload layout reported in the high nibble of byte 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    /// Full body-composition frame
    Fat,
    /// Weight-only frame
    Weight,
    /// Nibble value the firmware does not document
    Unknown(u8),
}

impl From<u8> for ScaleType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Fat,
            1 => Self::Weight,
            other => Self::Unknown(other),
        }
    }
}

/// Build the 5-byte user profile command
///
/// Layout: `[0x10, user_slot, gender, age, height]`. Age and height keep only
/// their low byte.
#[must_use]
pub fn user_profile_command(profile: &UserProfile) -> Bytes {
    let mut buf = BytesMut::with_capacity(USER_PROFILE_COMMAND_SIZE);

    buf.put_u8(USER_PROFILE_OPCODE);
    buf.put_u8(profile.user_slot);
    buf.put_u8(profile.gender.to_byte());
    buf.put_u8(low_byte(profile.age_years));
    buf.put_u8(low_byte(profile.height_cm));

    buf.freeze()
}

#[allow(clippy::cast_possible_truncation)]
const fn low_byte(value: u16) -> u8 {
    (value & 0xFF) as u8
}

/// Raw contents of one measurement notification
///
/// Scaled fields are already divided by ten. The decode carries no
/// timestamp, so decoding the same buffer twice gives equal values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalePayload {
    /// Frame layout
    pub scale_type: ScaleType,
    /// User slot the scale attributed the measurement to (0-15)
    pub user_slot: u8,
    /// Gender echoed by the scale, `None` if undefined
    pub gender: Option<Gender>,
    /// Age in years
    pub age: u8,
    /// Height in centimeters
    pub height_cm: u8,
    /// Weight in kilograms
    pub weight_kg: f32,
    /// Body fat percentage
    pub fat: f32,
    /// Body water percentage
    pub water: f32,
    /// Bone mass in kilograms
    pub bone: f32,
    /// Muscle percentage
    pub muscle: f32,
    /// Visceral muscle percentage
    pub visceral_muscle: f32,
    /// Calorie estimate
    pub calorie: f32,
    /// Body mass index
    pub bmi: f32,
}

/// Decode a measurement notification
///
/// Byte layout (two-byte fields are big-endian, all unsigned):
/// - Byte 0: scale type (high nibble), user slot (low nibble)
/// - Byte 1: gender (0=male, 1=female)
/// - Byte 2: age
/// - Byte 3: height in cm
/// - Bytes 4-5: weight, kg x 10
/// - Bytes 6-7: fat %, x 10
/// - Bytes 8-9: water %, x 10
/// - Bytes 10-11: bone mass, kg x 10
/// - Bytes 12-13: muscle %, x 10
/// - Byte 14: visceral muscle %, x 10
/// - Bytes 15-16: calorie, x 10
/// - Bytes 17-18: BMI, x 10
///
/// No range validation is applied to the values.
///
/// # Errors
///
/// Returns [`ScaleError::MalformedPayload`] unless `data` is exactly
/// [`PAYLOAD_SIZE`] bytes long.
pub fn decode_payload(data: &[u8]) -> Result<ScalePayload> {
    if data.len() != PAYLOAD_SIZE {
        return Err(ScaleError::MalformedPayload { len: data.len() });
    }

    let mut buf = data;

    let header = buf.get_u8();
    let gender = buf.get_u8();
    let age = buf.get_u8();
    let height_cm = buf.get_u8();
    let weight_kg = scaled(buf.get_u16());
    let fat = scaled(buf.get_u16());
    let water = scaled(buf.get_u16());
    let bone = scaled(buf.get_u16());
    let muscle = scaled(buf.get_u16());
    let visceral_muscle = scaled(u16::from(buf.get_u8()));
    let calorie = scaled(buf.get_u16());
    let bmi = scaled(buf.get_u16());

    Ok(ScalePayload {
        scale_type: ScaleType::from(header >> 4),
        user_slot: header & 0x0F,
        gender: Gender::from_byte(gender),
        age,
        height_cm,
        weight_kg,
        fat,
        water,
        bone,
        muscle,
        visceral_muscle,
        calorie,
        bmi,
    })
}

fn scaled(raw: u16) -> f32 {
    f32::from(raw) / FIXED_POINT_SCALE
}

/// A decoded measurement ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Weight in `weight_unit`
    pub weight: f32,
    /// Unit of `weight`
    pub weight_unit: WeightUnit,
    /// Weight in kilograms as transmitted
    pub weight_kg: f32,
    /// Body fat percentage
    pub fat: f32,
    /// Body water percentage
    pub water: f32,
    /// Bone mass in kilograms
    pub bone: f32,
    /// Muscle percentage
    pub muscle: f32,
    /// Visceral muscle percentage
    pub visceral_muscle: f32,
    /// Calorie estimate
    pub calorie: f32,
    /// Body mass index
    pub bmi: f32,
    /// Frame layout
    pub scale_type: ScaleType,
    /// User slot reported by the scale
    pub user_slot: u8,
    /// Gender reported by the scale
    pub gender: Option<Gender>,
    /// Age reported by the scale
    pub age: u8,
    /// Height in centimeters reported by the scale
    pub height_cm: u8,
    /// Time the payload was decoded; the scale does not transmit one
    pub timestamp: SystemTime,
}

impl MeasurementRecord {
    /// Build a record from a decoded payload, stamped with the current time
    #[must_use]
    pub fn from_payload(payload: &ScalePayload, weight_unit: WeightUnit) -> Self {
        Self {
            weight: weight_unit.convert_kg(payload.weight_kg),
            weight_unit,
            weight_kg: payload.weight_kg,
            fat: payload.fat,
            water: payload.water,
            bone: payload.bone,
            muscle: payload.muscle,
            visceral_muscle: payload.visceral_muscle,
            calorie: payload.calorie,
            bmi: payload.bmi,
            scale_type: payload.scale_type,
            user_slot: payload.user_slot,
            gender: payload.gender,
            age: payload.age,
            height_cm: payload.height_cm,
            timestamp: SystemTime::now(),
        }
    }

    /// Decode a notification straight into a record
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::MalformedPayload`] if `data` is not a measurement frame.
    pub fn decode(data: &[u8], weight_unit: WeightUnit) -> Result<Self> {
        let payload = decode_payload(data)?;
        Ok(Self::from_payload(&payload, weight_unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: [u8; PAYLOAD_SIZE] = [
        0x05, 0x00, 0x22, 0xAA, 0x02, 0x8A, 0x00, 0xC8, 0x01, 0x90, 0x00, 0x64, 0x01, 0x38, 0x05,
        0x00, 0xF0, 0x00, 0x96,
    ];

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_user_profile_command() {
        let profile = UserProfile::new(Gender::Female, 170, 34, 5);
        let bytes = user_profile_command(&profile);

        assert_eq!(bytes.len(), USER_PROFILE_COMMAND_SIZE);
        assert_eq!(&bytes[..], &[0x10, 0x05, 0x01, 0x22, 0xAA]);
    }

    #[test]
    fn test_user_profile_command_wraps_wide_fields() {
        let profile = UserProfile::new(Gender::Male, 300, 256, 0xFF);
        let bytes = user_profile_command(&profile);

        // 300 = 0x12C, 256 = 0x100
        assert_eq!(&bytes[..], &[0x10, 0xFF, 0x00, 0x00, 0x2C]);
    }

    #[test]
    fn test_decode_sample_payload() {
        let payload = decode_payload(&SAMPLE).unwrap();

        assert_eq!(payload.scale_type, ScaleType::Fat);
        assert_eq!(payload.user_slot, 5);
        assert_eq!(payload.gender, Some(Gender::Male));
        assert_eq!(payload.age, 34);
        assert_eq!(payload.height_cm, 170);
        assert_close(payload.weight_kg, 65.0);
        assert_close(payload.fat, 20.0);
        assert_close(payload.water, 40.0);
        assert_close(payload.bone, 10.0);
        assert_close(payload.muscle, 31.2);
        assert_close(payload.visceral_muscle, 0.5);
        assert_close(payload.calorie, 24.0);
        assert_close(payload.bmi, 15.0);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        for len in [0, 1, 18, 20, 40] {
            let data = vec![0u8; len];
            match decode_payload(&data) {
                Err(ScaleError::MalformedPayload { len: got }) => assert_eq!(got, len),
                other => panic!("expected MalformedPayload for {len} bytes, got {other:?}"),
            }
            assert!(MeasurementRecord::decode(&data, WeightUnit::Kilograms).is_err());
        }
    }

    #[test]
    fn test_decode_header_nibbles() {
        let mut data = SAMPLE;
        data[0] = 0x1C;
        data[1] = 0x01;

        let payload = decode_payload(&data).unwrap();
        assert_eq!(payload.scale_type, ScaleType::Weight);
        assert_eq!(payload.user_slot, 12);
        assert_eq!(payload.gender, Some(Gender::Female));

        data[0] = 0xF0;
        data[1] = 0x09;
        let payload = decode_payload(&data).unwrap();
        assert_eq!(payload.scale_type, ScaleType::Unknown(15));
        assert_eq!(payload.user_slot, 0);
        assert_eq!(payload.gender, None);
    }

    #[test]
    fn test_decode_full_range_values() {
        let mut data = [0xFF; PAYLOAD_SIZE];
        data[0] = 0x0F;

        let payload = decode_payload(&data).unwrap();
        assert_eq!(payload.age, 255);
        assert_eq!(payload.height_cm, 255);
        assert_close(payload.weight_kg, 6553.5);
        assert_close(payload.visceral_muscle, 25.5);
        assert_close(payload.bmi, 6553.5);
    }

    #[test]
    fn test_decode_accepts_zero_weight() {
        let data = [0u8; PAYLOAD_SIZE];
        let payload = decode_payload(&data).unwrap();
        assert_close(payload.weight_kg, 0.0);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let first = MeasurementRecord::decode(&SAMPLE, WeightUnit::Kilograms).unwrap();
        let mut second = MeasurementRecord::decode(&SAMPLE, WeightUnit::Kilograms).unwrap();

        second.timestamp = first.timestamp;
        assert_eq!(first, second);
        assert_eq!(decode_payload(&SAMPLE).unwrap(), decode_payload(&SAMPLE).unwrap());
    }

    #[test]
    fn test_record_converts_weight_only() {
        let payload = decode_payload(&SAMPLE).unwrap();
        let record = MeasurementRecord::from_payload(&payload, WeightUnit::Pounds);

        assert_eq!(record.weight_unit, WeightUnit::Pounds);
        assert_close(record.weight_kg, 65.0);
        assert!((record.weight - 143.3).abs() < 0.01);
        assert_close(record.fat, payload.fat);
        assert_close(record.water, payload.water);
        assert_close(record.bone, payload.bone);
        assert_close(record.muscle, payload.muscle);
    }

    #[test]
    fn test_record_timestamp_is_decode_time() {
        let before = SystemTime::now();
        let record = MeasurementRecord::decode(&SAMPLE, WeightUnit::Kilograms).unwrap();
        let after = SystemTime::now();

        assert!(record.timestamp >= before);
        assert!(record.timestamp <= after);
    }
}
