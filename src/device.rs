use crate::{
    ble::{handle_notifications, BleManager, ScaleConnection},
    driver::{DeviceDriver, ExingtechY1, MeasurementSink, ScaleTransport},
    error::{Result, ScaleError},
    handshake::{HandshakeSequencer, StepOutcome},
    protocol::MeasurementRecord,
    types::{ConnectionParams, DeviceInfo, UserProfile},
};
use std::{future::Future, sync::Arc};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

/// Connected body-composition scale
///
/// `ScaleDevice` ties a BLE connection to a [`DeviceDriver`]: it runs the
/// initialization handshake for a [`UserProfile`] and delivers every decoded
/// measurement through [`next_measurement`](Self::next_measurement).
///
/// # Examples
///
/// ```no_run
/// use vscale::{Gender, ScaleDevice, UserProfile, WeightUnit};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let profile = UserProfile::new(Gender::Female, 170, 34, 5)
///         .with_weight_unit(WeightUnit::Kilograms);
///
///     let mut scale = ScaleDevice::connect_first(profile).await?;
///
///     if let Some(record) = scale.next_measurement().await {
///         println!("Weight: {:.1} {}", record.weight, record.weight_unit);
///     }
///
///     scale.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct ScaleDevice {
    connection: Arc<Mutex<Option<ScaleConnection>>>,
    device_info: DeviceInfo,
    driver: Arc<dyn DeviceDriver>,
    profile: UserProfile,
    params: ConnectionParams,
    handshake: HandshakeSequencer,
    sink: mpsc::UnboundedSender<MeasurementRecord>,
    measurements: mpsc::UnboundedReceiver<MeasurementRecord>,
    notification_task: Option<JoinHandle<()>>,
    #[allow(dead_code)]
    ble_manager: BleManager,
}

impl ScaleDevice {
    /// Connect to the strongest VScale in range with default settings
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::DeviceNotFound`] if no scale is found during the
    /// scan, or any connection/handshake error.
    pub async fn connect_first(profile: UserProfile) -> Result<Self> {
        Self::connect_first_with_params(profile, ConnectionParams::default()).await
    }

    /// Connect to the strongest VScale in range with custom connection parameters
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::DeviceNotFound`] if no scale is found during the
    /// scan, or any connection/handshake error.
    pub async fn connect_first_with_params(
        profile: UserProfile,
        params: ConnectionParams,
    ) -> Result<Self> {
        let driver: Arc<dyn DeviceDriver> = Arc::new(ExingtechY1);
        let ble_manager = BleManager::new().await?;
        let devices = ble_manager
            .scan_for_devices(driver.as_ref(), &params)
            .await?;

        let device_info = strongest_signal(devices).ok_or(ScaleError::DeviceNotFound)?;

        Self::connect_with_driver(ble_manager, driver, device_info, profile, params).await
    }

    /// Connect to a scanned device using `driver`
    ///
    /// `ble_manager` must be the manager whose scan produced `device_info`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Device connection fails
    /// - A handshake step is rejected by the transport
    pub async fn connect_with_driver(
        ble_manager: BleManager,
        driver: Arc<dyn DeviceDriver>,
        device_info: DeviceInfo,
        profile: UserProfile,
        params: ConnectionParams,
    ) -> Result<Self> {
        let connection = ble_manager
            .connect_to_device(&device_info, *driver.channels(), &params)
            .await?;

        let (sink, measurements) = mpsc::unbounded_channel();

        let mut device = Self {
            connection: Arc::new(Mutex::new(Some(connection))),
            device_info,
            driver,
            profile,
            params,
            handshake: HandshakeSequencer::new(),
            sink,
            measurements,
            notification_task: None,
            ble_manager,
        };

        device.start_notification_pump().await?;
        device.run_handshake().await?;

        Ok(device)
    }

    /// Get device information
    #[must_use]
    pub const fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Profile the scale was initialized with
    #[must_use]
    pub const fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Whether the initialization handshake has completed on this connection
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.handshake.is_done()
    }

    /// Check if the device is connected
    pub async fn is_connected(&self) -> bool {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            conn.is_connected().await
        } else {
            false
        }
    }

    /// Wait for the next decoded measurement
    ///
    /// Returns `None` once the device has been disconnected.
    pub async fn next_measurement(&mut self) -> Option<MeasurementRecord> {
        self.measurements.recv().await
    }

    /// Reconnect after a dropped link and repeat the handshake from step 0
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Disconnected`] after [`disconnect`](Self::disconnect),
    /// or any connection/handshake error.
    pub async fn reconnect(&mut self) -> Result<()> {
        {
            let connection = self.connection.lock().await;
            let conn = connection.as_ref().ok_or(ScaleError::Disconnected)?;
            if !conn.is_connected().await {
                conn.reconnect(&self.params).await?;
            }
        }

        self.start_notification_pump().await?;
        self.handshake.reset();
        self.run_handshake().await
    }

    /// Run the driver's cleanup steps and disconnect
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Disconnected`] if already disconnected, a
    /// cleanup step error, or [`ScaleError::Ble`] if disconnection fails.
    pub async fn disconnect(&mut self) -> Result<()> {
        info!("Disconnecting from {}", self.device_info.name);

        let conn = self
            .connection
            .lock()
            .await
            .take()
            .ok_or(ScaleError::Disconnected)?;

        close_link(
            self.driver.as_ref(),
            &conn,
            self.notification_task.take(),
            conn.disconnect(),
        )
        .await
    }

    async fn run_handshake(&mut self) -> Result<()> {
        let connection = self.connection.lock().await;
        let conn = connection.as_ref().ok_or(ScaleError::Disconnected)?;

        if let Err(e) = self
            .handshake
            .run(self.driver.as_ref(), conn, &self.profile)
            .await
        {
            error!(
                "Handshake with {} failed at step {}: {}",
                self.device_info.name,
                self.handshake.step(),
                e
            );
            return Err(e);
        }

        Ok(())
    }

    async fn start_notification_pump(&mut self) -> Result<()> {
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }

        // Opened before the handshake subscribes so no payload is missed
        let notifications = self
            .connection
            .lock()
            .await
            .as_ref()
            .ok_or(ScaleError::Disconnected)?
            .notifications()
            .await?;
        let driver = Arc::clone(&self.driver);
        let weight_unit = self.profile.weight_unit;
        let sink: Arc<dyn MeasurementSink> = Arc::new(self.sink.clone());

        self.notification_task = Some(tokio::spawn(handle_notifications(
            notifications,
            driver,
            weight_unit,
            sink,
        )));

        Ok(())
    }
}

impl Drop for ScaleDevice {
    fn drop(&mut self) {
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }

        let connection = self.connection.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let value = connection.lock().await.take();
                if let Some(conn) = value {
                    let _ = conn.disconnect().await;
                }
            });
        }
    }
}

/// Run the driver's cleanup phase, stop the notification pump and disconnect
///
/// The pump is stopped and `disconnect` awaited even when a cleanup step
/// fails; the first error is returned.
async fn close_link<F>(
    driver: &dyn DeviceDriver,
    transport: &dyn ScaleTransport,
    notification_task: Option<JoinHandle<()>>,
    disconnect: F,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let mut step = 0;
    let cleanup = loop {
        match driver.cleanup_step(step, transport).await {
            Ok(StepOutcome::MoreStepsRemain) => step += 1,
            Ok(StepOutcome::Done) => break Ok(()),
            Err(e) => {
                warn!("Cleanup step {} failed: {}", step, e);
                break Err(e);
            }
        }
    };

    if let Some(task) = notification_task {
        task.abort();
    }

    let disconnected = disconnect.await;
    cleanup.and(disconnected)
}

/// Pick the device with the strongest signal
fn strongest_signal(devices: Vec<DeviceInfo>) -> Option<DeviceInfo> {
    devices.into_iter().max_by_key(|d| d.rssi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::{tests::RecordingTransport, EXINGTECH_Y1_CHANNELS},
        types::{DeviceChannelSet, WeightUnit},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    /// Driver whose first cleanup step is refused
    struct RefusingCleanup;

    #[async_trait]
    impl DeviceDriver for RefusingCleanup {
        fn device_name(&self) -> &'static str {
            "Refusing"
        }

        fn default_device_name(&self) -> &'static str {
            "Refusing"
        }

        fn channels(&self) -> &DeviceChannelSet {
            &EXINGTECH_Y1_CHANNELS
        }

        async fn init_step(
            &self,
            _step: usize,
            _transport: &dyn ScaleTransport,
            _profile: &UserProfile,
        ) -> Result<StepOutcome> {
            Ok(StepOutcome::Done)
        }

        async fn cleanup_step(&self, _step: usize, _transport: &dyn ScaleTransport) -> Result<StepOutcome> {
            Err(ScaleError::Protocol("cleanup refused".to_string()))
        }

        fn decode(&self, data: &[u8], weight_unit: WeightUnit) -> Result<MeasurementRecord> {
            MeasurementRecord::decode(data, weight_unit)
        }
    }

    /// Pump stand-in that reports when it gets aborted
    fn pending_pump() -> (JoinHandle<()>, oneshot::Receiver<()>) {
        let (alive, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });
        (task, stopped)
    }

    #[tokio::test]
    async fn test_close_link_disconnects_after_failed_cleanup() {
        let transport = RecordingTransport::default();
        let disconnected = AtomicBool::new(false);
        let (task, stopped) = pending_pump();

        let result = close_link(&RefusingCleanup, &transport, Some(task), async {
            disconnected.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        match assert_err!(result) {
            ScaleError::Protocol(reason) => assert_eq!(reason, "cleanup refused"),
            other => panic!("expected cleanup error, got {other:?}"),
        }
        assert!(disconnected.load(Ordering::SeqCst));
        assert!(stopped.await.is_err());
    }

    #[tokio::test]
    async fn test_close_link_runs_empty_cleanup() {
        let transport = RecordingTransport::default();
        let disconnected = AtomicBool::new(false);
        let (task, stopped) = pending_pump();

        assert_ok!(
            close_link(&ExingtechY1, &transport, Some(task), async {
                disconnected.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
        );

        assert!(disconnected.load(Ordering::SeqCst));
        assert!(stopped.await.is_err());
        assert!(transport.ops().is_empty());
    }

    #[tokio::test]
    async fn test_close_link_reports_disconnect_failure() {
        let transport = RecordingTransport::default();

        let result = close_link(&ExingtechY1, &transport, None, async {
            Err(ScaleError::Disconnected)
        })
        .await;

        assert!(matches!(result, Err(ScaleError::Disconnected)));
    }

    #[test]
    fn test_strongest_signal_selection() {
        let devices = vec![
            DeviceInfo::new("VScale".to_string(), -80),
            DeviceInfo::new("VScale".to_string(), -45),
            DeviceInfo::new("VScale".to_string(), -60),
        ];

        let chosen = strongest_signal(devices).unwrap();
        assert_eq!(chosen.rssi, -45);
    }

    #[test]
    fn test_strongest_signal_empty() {
        assert!(strongest_signal(Vec::new()).is_none());
    }
}
