use dbus::Path;
use uuid::Uuid;

use crate::peripheral::bluez::constants::ADVERTISEMENT_TYPE;

/// The LE advertisement a session registers with the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub object_path: Path<'static>,
    pub kind: &'static str,
    pub local_name: Option<String>,
    uuids: Vec<Uuid>,
}

impl Advertisement {
    pub fn new(object_path: Path<'static>) -> Self {
        Advertisement {
            object_path,
            kind: ADVERTISEMENT_TYPE,
            local_name: None,
            uuids: Vec::new(),
        }
    }

    pub fn add_name<T: Into<String>>(&mut self, name: T) {
        self.local_name.replace(name.into());
    }

    /// Adds a UUID to the advertised service list. Re-adding one is a no-op.
    pub fn add_service_uuid(&mut self, uuid: Uuid) {
        if !self.uuids.contains(&uuid) {
            self.uuids.push(uuid);
        }
    }

    pub fn service_uuids(&self) -> &[Uuid] {
        &self.uuids
    }
}
