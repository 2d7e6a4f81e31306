use dbus::Path;
use std::{fmt, sync::Arc};

use crate::gatt::service::Service;

/// The GATT application: an object manager root and the services below it.
#[derive(Clone)]
pub struct Application {
    pub object_path: Path<'static>,
    services: Vec<Arc<dyn Service>>,
}

impl Application {
    pub fn new(object_path: Path<'static>) -> Self {
        Application {
            object_path,
            services: Vec::new(),
        }
    }

    pub fn add_service(&mut self, service: Arc<dyn Service>) {
        self.services.push(service);
    }

    pub fn services(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    /// Object path of the `index`th service, `<root>/service0000` and up.
    pub fn service_path(&self, index: usize) -> String {
        format!("{}/service{:04}", self.object_path, index)
    }

    pub fn characteristic_path(&self, service: usize, index: usize) -> String {
        format!("{}/char{:04}", self.service_path(service), index)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Application")
            .field("object_path", &self.object_path)
            .field("services", &self.services)
            .finish()
    }
}
