use std::time::Duration;

use crate::peripheral::bluez::constants::{BLUEZ_DBUS_TIMEOUT, PATH_BASE};

/// Settings for one [`Peripheral`](crate::Peripheral).
#[derive(Debug, Clone)]
pub struct PeripheralConfig {
    /// Name the adapter is given and the advertisement carries.
    pub alias: String,
    /// Adapter name such as `hci0`. When unset the first capable adapter wins.
    pub adapter: Option<String>,
    /// Stop the event loop on Ctrl-C.
    pub handle_interrupt: bool,
    /// Root under which the advertisement and the GATT application are exported.
    pub object_path_base: String,
    pub bus_timeout: Duration,
}

impl PeripheralConfig {
    pub fn new<T: Into<String>>(alias: T) -> Self {
        PeripheralConfig {
            alias: alias.into(),
            adapter: None,
            handle_interrupt: true,
            object_path_base: PATH_BASE.to_owned(),
            bus_timeout: BLUEZ_DBUS_TIMEOUT,
        }
    }

    pub fn adapter<T: Into<String>>(mut self, adapter: T) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn handle_interrupt(mut self, handle_interrupt: bool) -> Self {
        self.handle_interrupt = handle_interrupt;
        self
    }

    pub fn object_path_base<T: Into<String>>(mut self, base: T) -> Self {
        self.object_path_base = base.into();
        self
    }

    pub fn bus_timeout(mut self, timeout: Duration) -> Self {
        self.bus_timeout = timeout;
        self
    }

    pub(crate) fn advertisement_path(&self) -> String {
        format!("{}/advertisement{:04}", self.object_path_base, 0)
    }
}
