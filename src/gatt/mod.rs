/// Generic Attributes (GATT)
pub mod characteristic;
pub mod event;
pub mod service;
