use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,
    #[error("no matching device found while scanning")]
    NoDeviceChosen,
    #[error("connection to {device} was rejected: {source}")]
    Rejected {
        device: String,
        #[source]
        source: BoxError,
    },
    #[error("device {device} does not expose the UART service")]
    ServiceAbsent { device: String },
    #[error("Bluetooth error: {0}")]
    Ble(#[source] BoxError),
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("not connected to a device")]
    NotConnected,
    #[error("device has no UART write characteristic")]
    CharacteristicMissing,
    #[error("write was rejected: {0}")]
    Write(#[source] BoxError),
}

/// How a connect attempt picks a peripheral out of the scan results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// First peripheral advertising the UART service.
    #[default]
    Advertising,
    /// First peripheral whose advertised name starts with the prefix.
    NamePrefix(String),
    /// Peripheral with this address, compared case-insensitively.
    Address(String),
}

impl DeviceSelector {
    pub fn matches(
        &self,
        name: Option<&str>,
        address: &str,
        services: &[Uuid],
        service: Uuid,
    ) -> bool {
        match self {
            Self::Advertising => services.contains(&service),
            Self::NamePrefix(prefix) => name.is_some_and(|n| n.starts_with(prefix.as_str())),
            Self::Address(wanted) => wanted.eq_ignore_ascii_case(address),
        }
    }
}

/// Link to a single peripheral exposing one writable characteristic.
///
/// Blocking API, callable from any worker thread. Overlapping sends are
/// allowed and unordered.
pub trait Transport: Send + Sync {
    /// Scan, choose a peripheral, connect and resolve the UART service.
    /// Replaces any existing link.
    fn connect(&self) -> Result<(), ConnectionError>;

    /// One write-with-response of `payload`. No retry, no chunking.
    fn send(&self, payload: &[u8]) -> Result<(), SendError>;

    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::UART_SERVICE_UUID;
    use rstest::rstest;

    const ADDR: &str = "C4:DE:E2:11:22:33";

    #[rstest]
    #[case::advertising(DeviceSelector::Advertising, true)]
    #[case::name_prefix(DeviceSelector::NamePrefix("Face".into()), true)]
    #[case::wrong_prefix(DeviceSelector::NamePrefix("Watch".into()), false)]
    #[case::address(DeviceSelector::Address("c4:de:e2:11:22:33".into()), true)]
    #[case::other_address(DeviceSelector::Address("00:00:00:00:00:01".into()), false)]
    fn test_selector_matches(#[case] selector: DeviceSelector, #[case] expected: bool) {
        let services = [UART_SERVICE_UUID];
        assert_eq!(
            selector.matches(Some("FaceBoard"), ADDR, &services, UART_SERVICE_UUID),
            expected
        );
    }

    #[test]
    fn test_advertising_requires_service() {
        assert!(!DeviceSelector::Advertising.matches(
            Some("FaceBoard"),
            ADDR,
            &[],
            UART_SERVICE_UUID
        ));
    }

    #[test]
    fn test_name_prefix_requires_name() {
        let selector = DeviceSelector::NamePrefix("Face".into());
        assert!(!selector.matches(None, ADDR, &[UART_SERVICE_UUID], UART_SERVICE_UUID));
    }

    #[test]
    fn test_default_is_advertising() {
        assert_eq!(DeviceSelector::default(), DeviceSelector::Advertising);
    }
}
