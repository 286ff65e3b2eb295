use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::runtime::Runtime;

use crate::shared::constants::{DEFAULT_SCAN_SECS, UART_RX_CHAR_UUID, UART_SERVICE_UUID};
use crate::transport::domain::wireless_transport::{
    ConnectionError, DeviceSelector, SendError, Transport,
};

struct Link {
    peripheral: Peripheral,
    label: String,
    rx: Option<Characteristic>,
}

/// Nordic UART link over the OS Bluetooth stack via btleplug.
///
/// btleplug is async; this adapter owns a small tokio runtime and blocks on
/// it so callers stay on plain threads. Must not be called from inside a
/// tokio runtime.
pub struct BleUartTransport {
    runtime: Runtime,
    selector: DeviceSelector,
    scan_duration: Duration,
    link: Mutex<Option<Link>>,
}

impl BleUartTransport {
    pub fn new(selector: DeviceSelector) -> Result<Self, ConnectionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ble-runtime")
            .enable_all()
            .build()
            .map_err(|e| ConnectionError::Ble(Box::new(e)))?;
        Ok(Self {
            runtime,
            selector,
            scan_duration: Duration::from_secs(DEFAULT_SCAN_SECS),
            link: Mutex::new(None),
        })
    }

    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Label of the connected peripheral (name, or address when unnamed).
    pub fn device_label(&self) -> Option<String> {
        self.lock_link().as_ref().map(|link| link.label.clone())
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn first_adapter() -> Result<Adapter, ConnectionError> {
        let manager = Manager::new().await.map_err(ble_error)?;
        manager
            .adapters()
            .await
            .map_err(ble_error)?
            .into_iter()
            .next()
            .ok_or(ConnectionError::NoAdapter)
    }

    async fn choose(&self, central: &Adapter) -> Result<(Peripheral, String), ConnectionError> {
        central
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_error)?;
        tokio::time::sleep(self.scan_duration).await;
        let peripherals = central.peripherals().await.map_err(ble_error)?;
        if let Err(e) = central.stop_scan().await {
            log::warn!("Failed to stop BLE scan: {e}");
        }
        log::debug!("Scan found {} peripherals", peripherals.len());

        for peripheral in peripherals {
            let Some(props) = peripheral.properties().await.map_err(ble_error)? else {
                continue;
            };
            let address = props.address.to_string();
            let name = props.local_name.as_deref();
            if self
                .selector
                .matches(name, &address, &props.services, UART_SERVICE_UUID)
            {
                let label = props.local_name.clone().unwrap_or(address);
                return Ok((peripheral, label));
            }
        }
        Err(ConnectionError::NoDeviceChosen)
    }

    async fn establish(&self) -> Result<Link, ConnectionError> {
        let central = Self::first_adapter().await?;
        let (peripheral, label) = self.choose(&central).await?;
        log::info!("Connecting to {label}");

        peripheral
            .connect()
            .await
            .map_err(|e| ConnectionError::Rejected {
                device: label.clone(),
                source: Box::new(e),
            })?;
        if let Err(e) = peripheral.discover_services().await {
            release(&peripheral, &label).await;
            return Err(ble_error(e));
        }

        if !has_uart_service(peripheral.services().iter().map(|s| s.uuid)) {
            release(&peripheral, &label).await;
            return Err(ConnectionError::ServiceAbsent { device: label });
        }

        Ok(Link {
            peripheral,
            label,
            rx: None,
        })
    }

    /// Cached write characteristic, resolved on first use per link.
    fn rx_characteristic(&self) -> Result<(Peripheral, Characteristic), SendError> {
        let mut guard = self.lock_link();
        let link = guard.as_mut().ok_or(SendError::NotConnected)?;
        if link.rx.is_none() {
            link.rx = link
                .peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == UART_RX_CHAR_UUID && c.service_uuid == UART_SERVICE_UUID);
        }
        let rx = link.rx.clone().ok_or(SendError::CharacteristicMissing)?;
        Ok((link.peripheral.clone(), rx))
    }
}

impl Transport for BleUartTransport {
    fn connect(&self) -> Result<(), ConnectionError> {
        let link = self.runtime.block_on(self.establish())?;
        let new_id = link.peripheral.id();
        let previous = self.lock_link().replace(link);

        if let Some(old) = previous.filter(|old| old.peripheral.id() != new_id) {
            if let Err(e) = self.runtime.block_on(old.peripheral.disconnect()) {
                log::warn!("Failed to disconnect from {}: {e}", old.label);
            }
        }
        Ok(())
    }

    fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        let (peripheral, rx) = self.rx_characteristic()?;
        self.runtime
            .block_on(peripheral.write(&rx, payload, WriteType::WithResponse))
            .map_err(|e| SendError::Write(Box::new(e)))?;
        log::debug!("Wrote {} bytes", payload.len());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock_link().is_some()
    }
}

/// Drop a link that connected but cannot be used.
async fn release(peripheral: &Peripheral, label: &str) {
    if let Err(e) = peripheral.disconnect().await {
        log::warn!("Failed to disconnect from {label}: {e}");
    }
}

fn has_uart_service(mut services: impl Iterator<Item = uuid::Uuid>) -> bool {
    services.any(|uuid| uuid == UART_SERVICE_UUID)
}

fn ble_error(e: btleplug::Error) -> ConnectionError {
    ConnectionError::Ble(Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_connect_is_not_connected() {
        let transport = BleUartTransport::new(DeviceSelector::Advertising).unwrap();
        assert!(matches!(
            transport.send(b"1.00,2.00"),
            Err(SendError::NotConnected)
        ));
        assert!(!transport.is_connected());
        assert!(transport.device_label().is_none());
    }

    #[test]
    fn test_has_uart_service() {
        let other = uuid::Uuid::from_u128(0x180d);
        assert!(has_uart_service([other, UART_SERVICE_UUID].into_iter()));
        assert!(!has_uart_service([other].into_iter()));
        assert!(!has_uart_service(std::iter::empty()));
    }

    #[test]
    fn test_scan_duration_override() {
        let transport = BleUartTransport::new(DeviceSelector::Advertising)
            .unwrap()
            .with_scan_duration(Duration::from_millis(250));
        assert_eq!(transport.scan_duration, Duration::from_millis(250));
    }
}
