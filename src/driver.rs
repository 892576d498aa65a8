use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{Result, ScaleError},
    handshake::{InitStep, StepOutcome},
    protocol::{user_profile_command, MeasurementRecord},
    types::{DeviceChannelSet, UserProfile, WeightUnit},
};

/// GATT endpoints of the Exingtech Y1
pub const EXINGTECH_Y1_CHANNELS: DeviceChannelSet = DeviceChannelSet {
    service: Uuid::from_u128(0xf433_bd80_75b8_11e2_97d9_0002_a5d5_c51b),
    measurement: Uuid::from_u128(0x1a2e_a400_75b9_11e2_be05_0002_a5d5_c51b),
    auxiliary: Uuid::from_u128(0x23b4_fec0_75b9_11e2_972a_0002_a5d5_c51b),
    command: Uuid::from_u128(0x29f1_1080_75b9_11e2_8bf6_0002_a5d5_c51b),
    config_descriptor: Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb),
};

/// Transport operations a scale driver needs
///
/// Each call resolves once the operation has been accepted by the link, which
/// is the confirmation the handshake waits for before issuing its next step.
#[async_trait]
pub trait ScaleTransport: Send + Sync {
    /// Enable notifications on `channel` through its configuration `descriptor`
    async fn enable_notifications(&self, channel: Uuid, descriptor: Uuid) -> Result<()>;

    /// Write `data` to `channel` without waiting for a response
    async fn write_command(&self, channel: Uuid, data: &[u8]) -> Result<()>;
}

/// Receiver of decoded measurements
pub trait MeasurementSink: Send + Sync {
    /// Called exactly once per accepted payload
    fn on_measurement_decoded(&self, record: MeasurementRecord);
}

impl MeasurementSink for mpsc::UnboundedSender<MeasurementRecord> {
    fn on_measurement_decoded(&self, record: MeasurementRecord) {
        if self.send(record).is_err() {
            debug!("Measurement receiver dropped, discarding record");
        }
    }
}

/// Capabilities every supported scale model provides
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Human readable model name
    fn device_name(&self) -> &'static str;

    /// Local name the device advertises
    fn default_device_name(&self) -> &'static str;

    /// GATT endpoints of this model
    fn channels(&self) -> &DeviceChannelSet;

    /// Issue initialization step `step` over `transport`
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::TransportRejected`] if the transport refuses the step.
    async fn init_step(
        &self,
        step: usize,
        transport: &dyn ScaleTransport,
        profile: &UserProfile,
    ) -> Result<StepOutcome>;

    /// Issue a command while the device is streaming measurements
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::TransportRejected`] if the transport refuses the command.
    async fn ongoing_step(&self, _step: usize, _transport: &dyn ScaleTransport) -> Result<StepOutcome> {
        Ok(StepOutcome::Done)
    }

    /// Issue a command before disconnecting
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::TransportRejected`] if the transport refuses the command.
    async fn cleanup_step(&self, _step: usize, _transport: &dyn ScaleTransport) -> Result<StepOutcome> {
        Ok(StepOutcome::Done)
    }

    /// Decode a notification payload into a record
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::MalformedPayload`] if `data` is not a measurement frame.
    fn decode(&self, data: &[u8], weight_unit: WeightUnit) -> Result<MeasurementRecord>;
}

/// Driver for the Exingtech Y1, advertised as "VScale"
#[derive(Debug, Clone, Copy, Default)]
pub struct ExingtechY1;

#[async_trait]
impl DeviceDriver for ExingtechY1 {
    fn device_name(&self) -> &'static str {
        "Exingtech Y1"
    }

    fn default_device_name(&self) -> &'static str {
        "VScale"
    }

    fn channels(&self) -> &DeviceChannelSet {
        &EXINGTECH_Y1_CHANNELS
    }

    async fn init_step(
        &self,
        step: usize,
        transport: &dyn ScaleTransport,
        profile: &UserProfile,
    ) -> Result<StepOutcome> {
        let Some(step) = InitStep::from_index(step) else {
            return Ok(StepOutcome::Done);
        };

        let channels = self.channels();
        let result = match step {
            InitStep::EnableMeasurementNotifications => {
                transport
                    .enable_notifications(channels.measurement, channels.config_descriptor)
                    .await
            }
            InitStep::EnableAuxiliaryNotifications => {
                transport
                    .enable_notifications(channels.auxiliary, channels.config_descriptor)
                    .await
            }
            InitStep::SendUserProfile => {
                let command = user_profile_command(profile);
                debug!("Sending user profile: {:02X?}", &command[..]);
                transport.write_command(channels.command, &command).await
            }
        };

        result.map_err(|e| {
            warn!("Handshake step {} rejected: {}", step, e);
            ScaleError::rejected(step, &e)
        })?;

        Ok(StepOutcome::MoreStepsRemain)
    }

    fn decode(&self, data: &[u8], weight_unit: WeightUnit) -> Result<MeasurementRecord> {
        MeasurementRecord::decode(data, weight_unit)
    }
}

/// Route one notification through `driver` to `sink`
///
/// Notifications from characteristics the driver does not subscribe to, and
/// payloads the decoder rejects, are dropped. Returns whether a record was
/// delivered.
pub fn dispatch_notification(
    driver: &dyn DeviceDriver,
    channel: Uuid,
    data: &[u8],
    weight_unit: WeightUnit,
    sink: &dyn MeasurementSink,
) -> bool {
    if !driver.channels().is_notifying(channel) {
        return false;
    }

    match driver.decode(data, weight_unit) {
        Ok(record) => {
            debug!(
                "Decoded measurement: {:.1} {} ({:02X?})",
                record.weight, record.weight_unit, data
            );
            sink.on_measurement_decoded(record);
            true
        }
        Err(e) => {
            debug!("Dropping notification from {}: {}", channel, e);
            false
        }
    }
}
