use dbus::Path;
use log::{debug, info, warn};
use std::sync::Arc;

use super::bluez::constants::{ADAPTER_IFACE, DEVICE_IFACE, REQUIRED_ADAPTER_IFACES};
use crate::{
    bus::{object_name, AdapterProperty, AdapterPropertyKind, ManagementBus, PropertyValue},
    Error, ErrorType,
};

/// The local radio adapter and the configuration it is held to.
#[derive(Clone)]
pub struct AdapterController {
    pub object_path: Path<'static>,
    alias: String,
    bus: Arc<dyn ManagementBus>,
}

impl std::fmt::Debug for AdapterController {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AdapterController")
            .field("object_path", &self.object_path)
            .field("alias", &self.alias)
            .finish()
    }
}

fn mismatch(kind: AdapterPropertyKind, answer: AdapterProperty) -> Error {
    Error::new(
        format!("{}.{}", ADAPTER_IFACE, kind.name()),
        format!("Bus answered with {:?}", answer),
        ErrorType::Policy,
    )
}

impl AdapterController {
    /// Returns the first object implementing every interface in `required`.
    ///
    /// The bus does not define an enumeration order, so with several capable
    /// adapters the pick can differ between hosts. Pass a `hint` to pin one.
    pub async fn discover(
        bus: &Arc<dyn ManagementBus>,
        required: &[&str],
        hint: Option<&str>,
    ) -> Result<Path<'static>, Error> {
        let managed_objects = bus.managed_objects().await?;
        for object in managed_objects.iter() {
            if let Some(hint) = hint {
                if object.name() != hint {
                    continue;
                }
            }
            if object.implements_all(required) {
                return Ok(object.path.clone());
            }
        }

        let wanted = match hint {
            Some(hint) => format!("Adapter {} does not implement {}", hint, required.join(" + ")),
            None => format!("No adapter implementing {} found", required.join(" + ")),
        };
        Err(Error::new("AdapterNotFound", wanted, ErrorType::AdapterNotFound))
    }

    pub async fn new<T: Into<String>>(
        bus: Arc<dyn ManagementBus>,
        alias: T,
        hint: Option<&str>,
    ) -> Result<Self, Error> {
        let object_path = AdapterController::discover(&bus, &REQUIRED_ADAPTER_IFACES, hint).await?;
        info!("Using adapter {}", object_name(&object_path));
        Ok(AdapterController {
            object_path,
            alias: alias.into(),
            bus,
        })
    }

    pub fn name(&self) -> &str {
        object_name(&self.object_path)
    }

    /// The values [`enforce`](AdapterController::enforce) drives the adapter to.
    pub fn policy(&self) -> [AdapterProperty; 4] {
        [
            AdapterProperty::Alias(self.alias.clone()),
            AdapterProperty::Powered(true),
            AdapterProperty::Discoverable(true),
            AdapterProperty::DiscoverableTimeout(0),
        ]
    }

    /// Whether a reported value differs from the policy.
    pub fn is_drift(&self, property: &AdapterProperty) -> bool {
        !self.policy().contains(property)
    }

    pub async fn enforce(&self) -> Result<(), Error> {
        for property in self.policy().iter().cloned() {
            debug!("Setting {} on {}: {:?}", property.kind().name(), self.name(), property);
            self.bus.set_adapter_property(&self.object_path, property).await?;
        }
        Ok(())
    }

    async fn get(&self, kind: AdapterPropertyKind) -> Result<AdapterProperty, Error> {
        self.bus.adapter_property(&self.object_path, kind).await
    }

    pub async fn alias(&self) -> Result<String, Error> {
        match self.get(AdapterPropertyKind::Alias).await? {
            AdapterProperty::Alias(alias) => Ok(alias),
            other => Err(mismatch(AdapterPropertyKind::Alias, other)),
        }
    }

    pub async fn set_alias<T: Into<String>>(&self, alias: T) -> Result<(), Error> {
        self.bus
            .set_adapter_property(&self.object_path, AdapterProperty::Alias(alias.into()))
            .await
    }

    pub async fn is_powered(&self) -> Result<bool, Error> {
        match self.get(AdapterPropertyKind::Powered).await? {
            AdapterProperty::Powered(on) => Ok(on),
            other => Err(mismatch(AdapterPropertyKind::Powered, other)),
        }
    }

    pub async fn set_powered(&self, on: bool) -> Result<(), Error> {
        self.bus
            .set_adapter_property(&self.object_path, AdapterProperty::Powered(on))
            .await
    }

    pub async fn is_discoverable(&self) -> Result<bool, Error> {
        match self.get(AdapterPropertyKind::Discoverable).await? {
            AdapterProperty::Discoverable(on) => Ok(on),
            other => Err(mismatch(AdapterPropertyKind::Discoverable, other)),
        }
    }

    pub async fn set_discoverable(&self, on: bool) -> Result<(), Error> {
        self.bus
            .set_adapter_property(&self.object_path, AdapterProperty::Discoverable(on))
            .await
    }

    pub async fn discoverable_timeout(&self) -> Result<u32, Error> {
        match self.get(AdapterPropertyKind::DiscoverableTimeout).await? {
            AdapterProperty::DiscoverableTimeout(secs) => Ok(secs),
            other => Err(mismatch(AdapterPropertyKind::DiscoverableTimeout, other)),
        }
    }

    pub async fn set_discoverable_timeout(&self, secs: u32) -> Result<(), Error> {
        self.bus
            .set_adapter_property(&self.object_path, AdapterProperty::DiscoverableTimeout(secs))
            .await
    }

    /// Whether any remote device attached to this adapter is connected.
    pub async fn is_connected(&self) -> Result<bool, Error> {
        let managed_objects = self.bus.managed_objects().await?;
        Ok(managed_objects.iter().any(|object| {
            object.path.starts_with(&format!("{}/", self.object_path))
                && object.property(DEVICE_IFACE, "Connected") == Some(&PropertyValue::Bool(true))
        }))
    }

    /// Disconnects every connected remote device. An attached central keeps
    /// BlueZ from accepting a new advertisement.
    pub async fn disconnect_all(&self) -> Result<usize, Error> {
        let managed_objects = self.bus.managed_objects().await?;
        let mut disconnected = 0;
        for object in managed_objects.iter() {
            if object.property(DEVICE_IFACE, "Connected") != Some(&PropertyValue::Bool(true)) {
                continue;
            }
            let name = match object.property(DEVICE_IFACE, "Name") {
                Some(PropertyValue::Str(name)) => name.as_str(),
                _ => "unknown",
            };
            info!("Disconnecting from device: {}", name);
            match self.bus.disconnect_device(&object.path).await {
                Ok(()) => disconnected += 1,
                Err(err) => warn!("Couldn't disconnect {}: {}", object.path, err),
            }
        }
        Ok(disconnected)
    }
}
