use std::fmt;
use uuid::Uuid;

use super::characteristic::Characteristic;

/// A GATT service hosted by the peripheral's application.
///
/// The service declares its characteristics; the peripheral exports them
/// with the service and tells the service when the connected central went
/// away.
pub trait Service: fmt::Debug + Send + Sync {
    fn uuid(&self) -> Uuid;

    fn primary(&self) -> bool {
        true
    }

    fn characteristics(&self) -> Vec<Characteristic> {
        Vec::new()
    }

    /// Called once each time a remote device reports `Connected = false`.
    fn remote_disconnected(&self);
}
