use dbus::{
    arg::{cast, prop_cast, PropMap, RefArg, Variant},
    blocking::stdintf::org_freedesktop_dbus::PropertiesPropertiesChanged,
    message::{MatchRule, SignalArgs},
    Path,
};
use dbus_crossroads::Crossroads;

use super::constants::{ADAPTER_IFACE, BLUEZ_PATH_NAMESPACE, BLUEZ_SERVICE_NAME, DEVICE_IFACE};
use crate::bus::{
    AdapterProperty, AdapterPropertyKind, PropertyChange, PropertyMap, PropertyValue, SignalFilter,
};

pub type Tree = Crossroads;

pub fn property_value(value: &Variant<Box<dyn RefArg>>) -> PropertyValue {
    let inner: &dyn RefArg = &*value.0;
    if let Some(on) = cast::<bool>(inner) {
        PropertyValue::Bool(*on)
    } else if let Some(number) = cast::<u32>(inner) {
        PropertyValue::U32(*number)
    } else if let Some(text) = inner.as_str() {
        PropertyValue::Str(text.to_owned())
    } else {
        PropertyValue::Other
    }
}

pub fn property_map(props: &PropMap) -> PropertyMap {
    props
        .iter()
        .map(|(name, value)| (name.clone(), property_value(value)))
        .collect()
}

/// The managed adapter properties among `changed`, typed. Everything else
/// is dropped.
pub fn adapter_changes(changed: &PropMap) -> Vec<AdapterProperty> {
    changed
        .iter()
        .filter_map(|(name, value)| {
            let kind = AdapterPropertyKind::from_name(name)?;
            AdapterProperty::from_value(kind, &property_value(value))
        })
        .collect()
}

/// `PropertiesChanged` from BlueZ's objects. Every subscription installs
/// this same rule, so the connection must run in match-all signal mode.
pub fn signal_rule() -> MatchRule<'static> {
    PropertiesPropertiesChanged::match_rule(None, None)
        .with_sender(BLUEZ_SERVICE_NAME)
        .with_namespaced_path(BLUEZ_PATH_NAMESPACE)
        .static_clone()
}

/// What a `PropertiesChanged` on `interface` means to a subscriber of
/// `filter`, if anything.
pub fn property_change(
    filter: SignalFilter,
    interface: &str,
    path: Path<'static>,
    changed: &PropMap,
) -> Option<PropertyChange> {
    match filter {
        SignalFilter::Adapter if interface == ADAPTER_IFACE => Some(PropertyChange::Adapter {
            path,
            changed: adapter_changes(changed),
        }),
        SignalFilter::Device if interface == DEVICE_IFACE => Some(PropertyChange::Device {
            path,
            connected: prop_cast::<bool>(changed, "Connected").copied(),
        }),
        _ => None,
    }
}
