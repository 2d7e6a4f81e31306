use std::time::Duration;

pub const BLUEZ_SERVICE_NAME: &str = "org.bluez";

pub const ADAPTER_IFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_IFACE: &str = "org.bluez.Device1";

pub const LE_ADVERTISING_MANAGER_IFACE: &str = "org.bluez.LEAdvertisingManager1";
pub const LE_ADVERTISEMENT_IFACE: &str = "org.bluez.LEAdvertisement1";

pub const GATT_SERVICE_IFACE: &str = "org.bluez.GattService1";
pub const GATT_CHARACTERISTIC_IFACE: &str = "org.bluez.GattCharacteristic1";
pub const GATT_GATT_MANAGER_IFACE: &str = "org.bluez.GattManager1";

/// Interfaces an adapter must implement to host a peripheral session.
pub const REQUIRED_ADAPTER_IFACES: [&str; 2] = [GATT_GATT_MANAGER_IFACE, LE_ADVERTISING_MANAGER_IFACE];

/// Namespace of every object BlueZ exports.
pub const BLUEZ_PATH_NAMESPACE: &str = "/org/bluez";

pub const BLUEZ_ERROR_FAILED: &str = "org.bluez.Error.Failed";
pub const BLUEZ_ERROR_INVALID_OFFSET: &str = "org.bluez.Error.InvalidOffset";
pub const BLUEZ_ERROR_INVALID_VALUE_LENGTH: &str = "org.bluez.Error.InvalidValueLength";
pub const BLUEZ_ERROR_NOT_PERMITTED: &str = "org.bluez.Error.NotPermitted";

pub const ADVERTISEMENT_TYPE: &str = "peripheral";

pub const PATH_BASE: &str = "/org/bluez/bluenet";

pub const BLUEZ_DBUS_TIMEOUT: Duration = Duration::from_secs(30);
