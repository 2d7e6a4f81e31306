//! The management bus the peripheral is driven through.
//!
//! [`ManagementBus`] is everything the lifecycle needs from the host radio
//! stack: object enumeration, typed adapter property access, registration of
//! the advertisement and the GATT application, and property-change
//! subscriptions. [`BluezBus`](crate::BluezBus) implements it over the system
//! D-Bus.

use async_trait::async_trait;
use dbus::Path;
use futures::channel::mpsc::UnboundedReceiver;
use std::collections::HashMap;

use crate::{
    peripheral::{advertisement::Advertisement, application::Application},
    Error,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    U32(u32),
    Other,
}

pub type PropertyMap = HashMap<String, PropertyValue>;

/// One object as reported by the bus object manager.
#[derive(Debug, Clone)]
pub struct ManagedObject {
    pub path: Path<'static>,
    pub interfaces: HashMap<String, PropertyMap>,
}

impl ManagedObject {
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }

    pub fn implements_all(&self, interfaces: &[&str]) -> bool {
        interfaces.iter().all(|interface| self.implements(interface))
    }

    pub fn property(&self, interface: &str, name: &str) -> Option<&PropertyValue> {
        self.interfaces.get(interface)?.get(name)
    }

    /// Last path segment, `hci0` for `/org/bluez/hci0`.
    pub fn name(&self) -> &str {
        object_name(&self.path)
    }
}

pub fn object_name<'a>(path: &'a Path<'static>) -> &'a str {
    path.rsplit('/').next().unwrap_or("")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterPropertyKind {
    Alias,
    Powered,
    Discoverable,
    DiscoverableTimeout,
}

impl AdapterPropertyKind {
    pub fn name(self) -> &'static str {
        match self {
            AdapterPropertyKind::Alias => "Alias",
            AdapterPropertyKind::Powered => "Powered",
            AdapterPropertyKind::Discoverable => "Discoverable",
            AdapterPropertyKind::DiscoverableTimeout => "DiscoverableTimeout",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Alias" => Some(AdapterPropertyKind::Alias),
            "Powered" => Some(AdapterPropertyKind::Powered),
            "Discoverable" => Some(AdapterPropertyKind::Discoverable),
            "DiscoverableTimeout" => Some(AdapterPropertyKind::DiscoverableTimeout),
            _ => None,
        }
    }
}

/// A managed adapter property together with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterProperty {
    Alias(String),
    Powered(bool),
    Discoverable(bool),
    /// Seconds, 0 disables the timeout.
    DiscoverableTimeout(u32),
}

impl AdapterProperty {
    pub fn kind(&self) -> AdapterPropertyKind {
        match self {
            AdapterProperty::Alias(_) => AdapterPropertyKind::Alias,
            AdapterProperty::Powered(_) => AdapterPropertyKind::Powered,
            AdapterProperty::Discoverable(_) => AdapterPropertyKind::Discoverable,
            AdapterProperty::DiscoverableTimeout(_) => AdapterPropertyKind::DiscoverableTimeout,
        }
    }

    /// Pairs an untyped bus value with the property it was read from.
    /// Returns `None` when the value does not have the property's type.
    pub fn from_value(kind: AdapterPropertyKind, value: &PropertyValue) -> Option<Self> {
        match (kind, value) {
            (AdapterPropertyKind::Alias, PropertyValue::Str(alias)) => {
                Some(AdapterProperty::Alias(alias.clone()))
            }
            (AdapterPropertyKind::Powered, PropertyValue::Bool(on)) => {
                Some(AdapterProperty::Powered(*on))
            }
            (AdapterPropertyKind::Discoverable, PropertyValue::Bool(on)) => {
                Some(AdapterProperty::Discoverable(*on))
            }
            (AdapterPropertyKind::DiscoverableTimeout, PropertyValue::U32(secs)) => {
                Some(AdapterProperty::DiscoverableTimeout(*secs))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFilter {
    /// `PropertiesChanged` on local adapters.
    Adapter,
    /// `PropertiesChanged` on remote devices.
    Device,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    Adapter {
        path: Path<'static>,
        changed: Vec<AdapterProperty>,
    },
    Device {
        path: Path<'static>,
        connected: Option<bool>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub usize);

#[derive(Debug)]
pub struct Subscription {
    pub token: SubscriptionToken,
    pub events: UnboundedReceiver<PropertyChange>,
}

#[async_trait]
pub trait ManagementBus: Send + Sync {
    /// Every object the radio stack exposes, in the order the bus reports them.
    async fn managed_objects(&self) -> Result<Vec<ManagedObject>, Error>;

    async fn adapter_property(
        &self,
        adapter: &Path<'static>,
        kind: AdapterPropertyKind,
    ) -> Result<AdapterProperty, Error>;

    async fn set_adapter_property(
        &self,
        adapter: &Path<'static>,
        value: AdapterProperty,
    ) -> Result<(), Error>;

    async fn disconnect_device(&self, device: &Path<'static>) -> Result<(), Error>;

    async fn register_advertisement(
        &self,
        adapter: &Path<'static>,
        advertisement: Advertisement,
    ) -> Result<(), Error>;

    async fn unregister_advertisement(
        &self,
        adapter: &Path<'static>,
        advertisement: &Path<'static>,
    ) -> Result<(), Error>;

    async fn register_application(
        &self,
        adapter: &Path<'static>,
        application: Application,
    ) -> Result<(), Error>;

    async fn unregister_application(
        &self,
        adapter: &Path<'static>,
        application: &Path<'static>,
    ) -> Result<(), Error>;

    async fn subscribe(&self, filter: SignalFilter) -> Result<Subscription, Error>;

    async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), Error>;
}
