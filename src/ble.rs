use async_trait::async_trait;
use btleplug::{
    api::{
        BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        ValueNotification, WriteType,
    },
    platform::{Manager, Peripheral},
};
use futures::stream::{Stream, StreamExt};
use std::{collections::HashMap, pin::Pin, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    driver::{dispatch_notification, DeviceDriver, MeasurementSink, ScaleTransport},
    error::{Result, ScaleError},
    types::{ConnectionParams, DeviceChannelSet, DeviceInfo, WeightUnit},
};

/// Notification stream of a connected peripheral
pub type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// BLE manager for scale discovery and connection
pub struct BleManager {
    manager: Manager,
    peripherals: Arc<Mutex<HashMap<BDAddr, Peripheral>>>,
}

impl BleManager {
    /// Create a new BLE manager
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Ble`] if the Bluetooth adapter cannot be initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;

        Ok(Self {
            manager,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Scan for scales served by `driver`
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::DeviceNotFound`] if no Bluetooth adapters are available,
    /// or [`ScaleError::Ble`] for other Bluetooth-related errors.
    pub async fn scan_for_devices(
        &self,
        driver: &dyn DeviceDriver,
        params: &ConnectionParams,
    ) -> Result<Vec<DeviceInfo>> {
        info!("Starting scan for {} devices...", driver.device_name());

        let adapters = self.manager.adapters().await?;
        let central = adapters.first().ok_or(ScaleError::DeviceNotFound)?;

        central.start_scan(ScanFilter::default()).await?;

        tokio::time::sleep(Duration::from_millis(params.scan_timeout_ms)).await;

        central.stop_scan().await?;

        let peripherals = central.peripherals().await?;
        let mut devices = Vec::new();
        for peripheral in peripherals {
            if let Some(device_info) = Self::match_device(driver, &peripheral).await {
                info!("Found {}: {}", driver.device_name(), device_info.name);
                devices.push(device_info);

                self.peripherals
                    .lock()
                    .await
                    .insert(peripheral.address(), peripheral);
            }
        }

        info!("Scan completed. Found {} device(s)", devices.len());
        Ok(devices)
    }

    /// Connect to a previously scanned device
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::DeviceNotFound`] if the device was not seen during a scan,
    /// [`ScaleError::Timeout`] if connection times out,
    /// [`ScaleError::ConnectionFailed`] if connection fails,
    /// or [`ScaleError::Protocol`] if the scale lacks an expected characteristic.
    pub async fn connect_to_device(
        &self,
        device_info: &DeviceInfo,
        channels: DeviceChannelSet,
        params: &ConnectionParams,
    ) -> Result<ScaleConnection> {
        info!("Connecting to device: {}", device_info.name);

        let peripheral = self
            .peripherals
            .lock()
            .await
            .values()
            .find(|p| device_info.mac_address.as_deref() == Some(p.address().to_string().as_str()))
            .cloned()
            .ok_or(ScaleError::DeviceNotFound)?;

        timeout(Duration::from_millis(params.timeout_ms), peripheral.connect())
            .await
            .map_err(|_| ScaleError::Timeout {
                timeout_ms: params.timeout_ms,
            })?
            .map_err(|e| ScaleError::ConnectionFailed(e.to_string()))?;

        peripheral.discover_services().await?;

        let characteristics = peripheral
            .characteristics()
            .into_iter()
            .filter(|c| c.service_uuid == channels.service)
            .map(|c| (c.uuid, c))
            .collect::<HashMap<_, _>>();

        for (uuid, name) in [
            (channels.measurement, "measurement"),
            (channels.auxiliary, "auxiliary"),
            (channels.command, "command"),
        ] {
            if !characteristics.contains_key(&uuid) {
                return Err(ScaleError::Protocol(format!(
                    "{name} characteristic {uuid} not found"
                )));
            }
        }

        info!("Successfully connected to {}", device_info.name);

        Ok(ScaleConnection {
            peripheral,
            characteristics,
        })
    }

    /// Device info for `peripheral` if it advertises the driver's name
    async fn match_device(driver: &dyn DeviceDriver, peripheral: &Peripheral) -> Option<DeviceInfo> {
        let properties = peripheral.properties().await.ok()??;
        let name = properties.local_name?;

        if !name.eq_ignore_ascii_case(driver.default_device_name()) {
            return None;
        }

        Some(DeviceInfo {
            name,
            mac_address: Some(properties.address.to_string()),
            rssi: properties.rssi.unwrap_or(0),
        })
    }
}

/// Active connection to a scale
pub struct ScaleConnection {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
}

impl ScaleConnection {
    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| ScaleError::Protocol(format!("Characteristic {uuid} not found")))
    }

    /// Re-establish the link after the peripheral dropped it
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Timeout`] if connection times out,
    /// or [`ScaleError::ConnectionFailed`] if connection fails.
    pub async fn reconnect(&self, params: &ConnectionParams) -> Result<()> {
        info!("Reconnecting to {}", self.peripheral.address());

        timeout(Duration::from_millis(params.timeout_ms), self.peripheral.connect())
            .await
            .map_err(|_| ScaleError::Timeout {
                timeout_ms: params.timeout_ms,
            })?
            .map_err(|e| ScaleError::ConnectionFailed(e.to_string()))?;

        self.peripheral.discover_services().await?;
        Ok(())
    }

    /// Check if the device is still connected
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Disconnect from the device
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Ble`] if disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    /// Open the notification stream of this connection
    ///
    /// Open it before the handshake subscribes so no payload is missed.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Ble`] if the stream cannot be opened.
    pub async fn notifications(&self) -> Result<NotificationStream> {
        Ok(self.peripheral.notifications().await?)
    }
}

#[async_trait]
impl ScaleTransport for ScaleConnection {
    async fn enable_notifications(&self, channel: Uuid, descriptor: Uuid) -> Result<()> {
        let characteristic = self.characteristic(channel)?;
        debug!("Subscribing to {} via descriptor {}", channel, descriptor);

        self.peripheral.subscribe(characteristic).await?;
        Ok(())
    }

    async fn write_command(&self, channel: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(channel)?;
        debug!("Writing to {}: {:02X?}", channel, data);

        self.peripheral
            .write(characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }
}

/// Pump `notifications` through `driver` into `sink`
///
/// Events are handled one at a time in arrival order. Returns when the
/// stream ends.
pub async fn handle_notifications<S>(
    mut notifications: S,
    driver: Arc<dyn DeviceDriver>,
    weight_unit: WeightUnit,
    sink: Arc<dyn MeasurementSink>,
) where
    S: Stream<Item = ValueNotification> + Unpin,
{
    while let Some(data) = notifications.next().await {
        dispatch_notification(
            driver.as_ref(),
            data.uuid,
            &data.value,
            weight_unit,
            sink.as_ref(),
        );
    }

    debug!("Notification stream closed");
}
