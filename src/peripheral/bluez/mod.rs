//! [`ManagementBus`] over the system D-Bus, talking to BlueZ.

mod advertisement;
mod application;
mod common;
mod connection;
pub mod constants;
mod error;

use async_trait::async_trait;
use dbus::{
    arg::PropMap,
    blocking::stdintf::org_freedesktop_dbus::PropertiesPropertiesChanged,
    channel::MatchingReceiver,
    message::MatchRule,
    nonblock::{
        stdintf::org_freedesktop_dbus::{ObjectManager, Properties},
        MsgMatch,
    },
    Message, Path,
};
use dbus_crossroads::IfaceToken;
use futures::channel::mpsc;
use log::{debug, warn};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use self::{
    advertisement::AdvertisementData,
    application::{CharacteristicData, ServiceData},
    connection::Connection,
    constants::{ADAPTER_IFACE, DEVICE_IFACE, GATT_GATT_MANAGER_IFACE, LE_ADVERTISING_MANAGER_IFACE},
};
use crate::{
    bus::{
        AdapterProperty, AdapterPropertyKind, ManagedObject, ManagementBus, SignalFilter,
        Subscription, SubscriptionToken,
    },
    peripheral::{advertisement::Advertisement, application::Application},
    Error, ErrorType,
};

struct Ifaces {
    advertisement: IfaceToken<AdvertisementData>,
    service: IfaceToken<ServiceData>,
    characteristic: IfaceToken<CharacteristicData>,
    object_manager: IfaceToken<()>,
}

/// BlueZ on the system bus. Exports the advertisement and application
/// objects BlueZ calls back into while they are registered.
pub struct BluezBus {
    connection: Connection,
    tree: Arc<Mutex<common::Tree>>,
    ifaces: Ifaces,
    subscriptions: Arc<Mutex<HashMap<usize, MsgMatch>>>,
    // Application root to the service and characteristic paths exported below it.
    exported: Mutex<HashMap<Path<'static>, Vec<Path<'static>>>>,
}

impl std::fmt::Debug for BluezBus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BluezBus")
            .field("connection", &self.connection)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BluezBus {
    /// Connects to the system bus. Must be called from within a tokio
    /// runtime, which then drives the connection.
    pub fn connect(timeout: Duration) -> Result<Self, Error> {
        let subscriptions = Arc::new(Mutex::new(HashMap::new()));
        let connection = {
            let subscriptions = Arc::clone(&subscriptions);
            // Dropping the matches closes every subscriber's stream.
            Connection::new(timeout, move || lock(&subscriptions).clear())?
        };
        connection.default.set_signal_match_mode(true);

        let mut tree = common::Tree::new();
        tree.set_async_support(Some((
            connection.default.clone(),
            Box::new(|future| {
                tokio::spawn(future);
            }),
        )));
        let ifaces = Ifaces {
            advertisement: advertisement::register_iface(&mut tree),
            service: application::register_service_iface(&mut tree),
            characteristic: application::register_characteristic_iface(&mut tree),
            object_manager: tree.object_manager(),
        };
        let tree = Arc::new(Mutex::new(tree));

        {
            let tree = Arc::clone(&tree);
            connection.default.start_receive(
                MatchRule::new_method_call(),
                Box::new(move |msg, conn| {
                    if lock(&tree).handle_message(msg, conn).is_err() {
                        warn!("Couldn't handle incoming method call");
                    }
                    true
                }),
            );
        }

        Ok(BluezBus {
            connection,
            tree,
            ifaces,
            subscriptions,
            exported: Mutex::new(HashMap::new()),
        })
    }

    fn export_advertisement(&self, advertisement: &Advertisement) {
        let mut tree = lock(&self.tree);
        tree.remove::<AdvertisementData>(&advertisement.object_path);
        tree.insert(
            advertisement.object_path.clone(),
            std::iter::once(&self.ifaces.advertisement),
            AdvertisementData::from(advertisement),
        );
    }

    fn export_application(&self, application: &Application) -> Result<(), Error> {
        let exports = application::exports(application)
            .map_err(|reason| Error::new("InvalidObjectPath", reason, ErrorType::Config))?;

        self.withdraw_application(&application.object_path);
        let mut paths = Vec::new();
        {
            let mut tree = lock(&self.tree);
            tree.insert(
                application.object_path.clone(),
                std::iter::once(&self.ifaces.object_manager),
                (),
            );
            for export in exports {
                tree.insert(export.path.clone(), std::iter::once(&self.ifaces.service), export.service);
                paths.push(export.path);
                for (path, characteristic) in export.characteristics {
                    tree.insert(path.clone(), std::iter::once(&self.ifaces.characteristic), characteristic);
                    paths.push(path);
                }
            }
        }
        lock(&self.exported).insert(application.object_path.clone(), paths);
        Ok(())
    }

    fn withdraw_application(&self, root: &Path<'static>) {
        let paths = lock(&self.exported).remove(root).unwrap_or_default();
        let mut tree = lock(&self.tree);
        for path in paths.iter().rev() {
            tree.remove::<()>(path);
        }
        tree.remove::<()>(root);
    }
}

#[async_trait]
impl ManagementBus for BluezBus {
    async fn managed_objects(&self) -> Result<Vec<ManagedObject>, Error> {
        let root = Path::from("/");
        let proxy = self.connection.get_bluez_proxy(&root);
        let managed_objects = proxy.get_managed_objects().await?;
        Ok(managed_objects
            .into_iter()
            .map(|(path, interfaces)| ManagedObject {
                path,
                interfaces: interfaces
                    .iter()
                    .map(|(interface, props)| (interface.clone(), common::property_map(props)))
                    .collect(),
            })
            .collect())
    }

    async fn adapter_property(
        &self,
        adapter: &Path<'static>,
        kind: AdapterPropertyKind,
    ) -> Result<AdapterProperty, Error> {
        let proxy = self.connection.get_bluez_proxy(adapter);
        let name = kind.name();
        Ok(match kind {
            AdapterPropertyKind::Alias => AdapterProperty::Alias(proxy.get(ADAPTER_IFACE, name).await?),
            AdapterPropertyKind::Powered => AdapterProperty::Powered(proxy.get(ADAPTER_IFACE, name).await?),
            AdapterPropertyKind::Discoverable => {
                AdapterProperty::Discoverable(proxy.get(ADAPTER_IFACE, name).await?)
            }
            AdapterPropertyKind::DiscoverableTimeout => {
                AdapterProperty::DiscoverableTimeout(proxy.get(ADAPTER_IFACE, name).await?)
            }
        })
    }

    async fn set_adapter_property(&self, adapter: &Path<'static>, value: AdapterProperty) -> Result<(), Error> {
        let proxy = self.connection.get_bluez_proxy(adapter);
        let name = value.kind().name();
        match value {
            AdapterProperty::Alias(alias) => proxy.set(ADAPTER_IFACE, name, alias).await?,
            AdapterProperty::Powered(on) => proxy.set(ADAPTER_IFACE, name, on).await?,
            AdapterProperty::Discoverable(on) => proxy.set(ADAPTER_IFACE, name, on).await?,
            AdapterProperty::DiscoverableTimeout(secs) => proxy.set(ADAPTER_IFACE, name, secs).await?,
        }
        Ok(())
    }

    async fn disconnect_device(&self, device: &Path<'static>) -> Result<(), Error> {
        let proxy = self.connection.get_bluez_proxy(device);
        let reply = proxy.method_call(DEVICE_IFACE, "Disconnect", ());
        let _: () = reply.await?;
        Ok(())
    }

    async fn register_advertisement(
        &self,
        adapter: &Path<'static>,
        advertisement: Advertisement,
    ) -> Result<(), Error> {
        self.export_advertisement(&advertisement);

        let proxy = self.connection.get_bluez_proxy(adapter);
        let reply = proxy.method_call(
            LE_ADVERTISING_MANAGER_IFACE,
            "RegisterAdvertisement",
            (&advertisement.object_path, PropMap::new()),
        );
        let _: () = reply.await?;
        Ok(())
    }

    async fn unregister_advertisement(
        &self,
        adapter: &Path<'static>,
        advertisement: &Path<'static>,
    ) -> Result<(), Error> {
        let proxy = self.connection.get_bluez_proxy(adapter);
        let reply = proxy.method_call(
            LE_ADVERTISING_MANAGER_IFACE,
            "UnregisterAdvertisement",
            (advertisement,),
        );
        let result: Result<(), _> = reply.await;
        lock(&self.tree).remove::<AdvertisementData>(advertisement);
        Ok(result?)
    }

    async fn register_application(
        &self,
        adapter: &Path<'static>,
        application: Application,
    ) -> Result<(), Error> {
        self.export_application(&application)?;

        let proxy = self.connection.get_bluez_proxy(adapter);
        let reply = proxy.method_call(
            GATT_GATT_MANAGER_IFACE,
            "RegisterApplication",
            (&application.object_path, PropMap::new()),
        );
        let _: () = reply.await?;
        Ok(())
    }

    async fn unregister_application(
        &self,
        adapter: &Path<'static>,
        application: &Path<'static>,
    ) -> Result<(), Error> {
        let proxy = self.connection.get_bluez_proxy(adapter);
        let reply = proxy.method_call(GATT_GATT_MANAGER_IFACE, "UnregisterApplication", (application,));
        let result: Result<(), _> = reply.await;
        self.withdraw_application(application);
        Ok(result?)
    }

    async fn subscribe(&self, filter: SignalFilter) -> Result<Subscription, Error> {
        let (sender, events) = mpsc::unbounded();

        let msg_match = self.connection.default.add_match(common::signal_rule()).await?.cb(
            move |msg: Message, signal: PropertiesPropertiesChanged| {
                let path = match msg.path() {
                    Some(path) => path.into_static(),
                    None => return true,
                };
                let change = common::property_change(
                    filter,
                    &signal.interface_name,
                    path,
                    &signal.changed_properties,
                );
                if let Some(change) = change {
                    // The match stays installed until unsubscribed.
                    let _ = sender.unbounded_send(change);
                }
                true
            },
        );

        let token = msg_match.token();
        lock(&self.subscriptions).insert(token.0, msg_match);
        debug!("Watching {:?} PropertiesChanged", filter);
        Ok(Subscription {
            token: SubscriptionToken(token.0),
            events,
        })
    }

    async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), Error> {
        let removed = lock(&self.subscriptions).remove(&token.0);
        if let Some(msg_match) = removed {
            self.connection.default.remove_match(msg_match.token()).await?;
        }
        Ok(())
    }
}
