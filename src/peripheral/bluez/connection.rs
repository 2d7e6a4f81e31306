use log::error;
use std::{fmt, sync::Arc, time::Duration};

use dbus::{
    nonblock::{Proxy, SyncConnection},
    Path,
};

use super::constants::BLUEZ_SERVICE_NAME;
use crate::Error;

pub struct Connection {
    pub default: Arc<SyncConnection>,
    timeout: Duration,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Connection")
    }
}

impl<'a> Connection {
    /// Opens a system bus connection and drives it on the current tokio
    /// runtime. `on_lost` runs once the connection is gone.
    pub fn new<F>(timeout: Duration, on_lost: F) -> Result<Self, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let (resource, default) = dbus_tokio::connection::new_system_sync()?;
        tokio::spawn(async move {
            let err = resource.await;
            error!("Lost connection to D-Bus: {}", err);
            on_lost();
        });

        Ok(Connection { default, timeout })
    }

    pub fn get_bluez_proxy(&'a self, path: &'a Path) -> Proxy<'a, &'a SyncConnection> {
        Proxy::new(BLUEZ_SERVICE_NAME, path, self.timeout, &*self.default)
    }
}
