#![allow(dead_code)]

use async_trait::async_trait;
use bluenet::{
    bus::{
        AdapterProperty, AdapterPropertyKind, ManagedObject, ManagementBus, PropertyChange, PropertyMap,
        PropertyValue, SignalFilter, Subscription, SubscriptionToken,
    },
    gatt::service::Service,
    peripheral::{advertisement::Advertisement, application::Application},
    Error, ErrorType, PeripheralConfig,
};
use dbus::Path;
use futures::channel::{
    mpsc::{self, UnboundedSender},
    oneshot,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use uuid::Uuid;

pub const GATT_MANAGER: &str = "org.bluez.GattManager1";
pub const LE_ADVERTISING_MANAGER: &str = "org.bluez.LEAdvertisingManager1";
pub const ADAPTER: &str = "org.bluez.Adapter1";
pub const DEVICE: &str = "org.bluez.Device1";

pub type Journal = Arc<Mutex<Vec<String>>>;

type Reply = oneshot::Receiver<Result<(), Error>>;

#[derive(Default)]
struct State {
    objects: Vec<ManagedObject>,
    adapters: HashMap<String, HashMap<AdapterPropertyKind, AdapterProperty>>,
    advertisement_reply: Option<Reply>,
    application_reply: Option<Reply>,
    advertisements: HashSet<String>,
    applications: HashSet<String>,
    subscribers: Vec<(SubscriptionToken, SignalFilter, UnboundedSender<PropertyChange>)>,
    next_token: usize,
    reject_subscriptions: bool,
    read_only: bool,
}

/// In-memory management bus. Every call lands in the journal.
pub struct MockBus {
    state: Mutex<State>,
    journal: Journal,
}

pub fn object(path: &str, interfaces: Vec<(&str, PropertyMap)>) -> ManagedObject {
    ManagedObject {
        path: Path::new(path.to_owned()).unwrap(),
        interfaces: interfaces
            .into_iter()
            .map(|(interface, props)| (interface.to_owned(), props))
            .collect(),
    }
}

pub fn adapter_path(name: &str) -> Path<'static> {
    Path::new(format!("/org/bluez/{}", name)).unwrap()
}

pub fn config() -> PeripheralConfig {
    let _ = pretty_env_logger::try_init();
    PeripheralConfig::new("Senic Hub").handle_interrupt(false)
}

pub fn bluez_error(name: &str, message: &str) -> Error {
    Error::new(name, message, ErrorType::Bluez)
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            state: Mutex::new(State::default()),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(&self, object: ManagedObject) {
        self.state.lock().unwrap().objects.push(object);
    }

    /// A radio implementing both managers, configured off-policy.
    pub fn with_adapter(self, name: &str) -> Self {
        let path = format!("/org/bluez/{}", name);
        let mut props = PropertyMap::new();
        props.insert("Alias".to_owned(), PropertyValue::Str("BlueZ 5.50".to_owned()));
        props.insert("Powered".to_owned(), PropertyValue::Bool(false));
        self.push(object(
            &path,
            vec![
                (ADAPTER, props),
                (GATT_MANAGER, PropertyMap::new()),
                (LE_ADVERTISING_MANAGER, PropertyMap::new()),
            ],
        ));
        let mut adapter = HashMap::new();
        for property in vec![
            AdapterProperty::Alias("BlueZ 5.50".to_owned()),
            AdapterProperty::Powered(false),
            AdapterProperty::Discoverable(false),
            AdapterProperty::DiscoverableTimeout(180),
        ] {
            adapter.insert(property.kind(), property);
        }
        self.state.lock().unwrap().adapters.insert(path, adapter);
        self
    }

    /// A classic-only radio: no LE advertising manager.
    pub fn with_classic_adapter(self, name: &str) -> Self {
        self.push(object(
            &format!("/org/bluez/{}", name),
            vec![(ADAPTER, PropertyMap::new()), (GATT_MANAGER, PropertyMap::new())],
        ));
        self
    }

    pub fn with_device(self, adapter: &str, address: &str, name: &str, connected: bool) -> Self {
        let mut props = PropertyMap::new();
        props.insert("Name".to_owned(), PropertyValue::Str(name.to_owned()));
        props.insert("Connected".to_owned(), PropertyValue::Bool(connected));
        self.push(object(
            &format!("/org/bluez/{}/dev_{}", adapter, address),
            vec![(DEVICE, props)],
        ));
        self
    }

    pub fn reject_subscriptions(self) -> Self {
        self.state.lock().unwrap().reject_subscriptions = true;
        self
    }

    /// Every adapter property write fails, from the first one on.
    pub fn reject_writes(self) -> Self {
        self.set_writable(false);
        self
    }

    pub fn set_writable(&self, writable: bool) {
        self.state.lock().unwrap().read_only = !writable;
    }

    /// The bus dropping every signal stream, as when the connection is lost.
    pub fn close_subscriptions(&self) {
        self.record("close_subscriptions".to_owned());
        self.state.lock().unwrap().subscribers.clear();
    }

    /// Holds the advertisement registration until the returned sender fires.
    pub fn script_advertisement(&self) -> oneshot::Sender<Result<(), Error>> {
        let (sender, receiver) = oneshot::channel();
        self.state.lock().unwrap().advertisement_reply = Some(receiver);
        sender
    }

    /// Holds the application registration until the returned sender fires.
    pub fn script_application(&self) -> oneshot::Sender<Result<(), Error>> {
        let (sender, receiver) = oneshot::channel();
        self.state.lock().unwrap().application_reply = Some(receiver);
        sender
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    pub fn entries(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|entry| entry.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry.starts_with(prefix))
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }

    pub fn adapter_value(&self, name: &str, kind: AdapterPropertyKind) -> Option<AdapterProperty> {
        let state = self.state.lock().unwrap();
        state
            .adapters
            .get(&format!("/org/bluez/{}", name))
            .and_then(|adapter| adapter.get(&kind).cloned())
    }

    pub fn emit(&self, change: PropertyChange) {
        let filter = match change {
            PropertyChange::Adapter { .. } => SignalFilter::Adapter,
            PropertyChange::Device { .. } => SignalFilter::Device,
        };
        let state = self.state.lock().unwrap();
        for (_, subscribed, sender) in state.subscribers.iter() {
            if *subscribed == filter {
                sender.unbounded_send(change.clone()).unwrap();
            }
        }
    }

    /// Another process changing the adapter behind the peripheral's back.
    pub fn external_set(&self, name: &str, property: AdapterProperty) {
        let path = adapter_path(name);
        self.record(format!("external {:?}", property));
        self.state
            .lock()
            .unwrap()
            .adapters
            .entry(path.to_string())
            .or_default()
            .insert(property.kind(), property.clone());
        self.emit(PropertyChange::Adapter {
            path,
            changed: vec![property],
        });
    }

    pub fn disconnect_signal(&self, adapter: &str, address: &str) {
        self.emit(PropertyChange::Device {
            path: Path::new(format!("/org/bluez/{}/dev_{}", adapter, address)).unwrap(),
            connected: Some(false),
        });
    }

    async fn reply(receiver: Option<Reply>) -> Result<(), Error> {
        match receiver {
            Some(receiver) => match receiver.await {
                Ok(result) => result,
                Err(_) => futures::future::pending().await,
            },
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ManagementBus for MockBus {
    async fn managed_objects(&self) -> Result<Vec<ManagedObject>, Error> {
        self.record("managed_objects".to_owned());
        Ok(self.state.lock().unwrap().objects.clone())
    }

    async fn adapter_property(
        &self,
        adapter: &Path<'static>,
        kind: AdapterPropertyKind,
    ) -> Result<AdapterProperty, Error> {
        self.record(format!("get {}", kind.name()));
        let state = self.state.lock().unwrap();
        state
            .adapters
            .get(&adapter.to_string())
            .and_then(|props| props.get(&kind).cloned())
            .ok_or_else(|| bluez_error("org.freedesktop.DBus.Error.UnknownProperty", kind.name()))
    }

    async fn set_adapter_property(&self, adapter: &Path<'static>, value: AdapterProperty) -> Result<(), Error> {
        self.record(format!("set {:?}", value));
        {
            let mut state = self.state.lock().unwrap();
            if state.read_only {
                return Err(bluez_error("org.bluez.Error.Failed", "Not Ready"));
            }
            state
                .adapters
                .entry(adapter.to_string())
                .or_default()
                .insert(value.kind(), value);
        }
        // Leaves room for other tasks to run between writes.
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn disconnect_device(&self, device: &Path<'static>) -> Result<(), Error> {
        self.record(format!("disconnect {}", device));
        let mut state = self.state.lock().unwrap();
        for object in state.objects.iter_mut() {
            if &object.path == device {
                if let Some(props) = object.interfaces.get_mut(DEVICE) {
                    props.insert("Connected".to_owned(), PropertyValue::Bool(false));
                }
            }
        }
        Ok(())
    }

    async fn register_advertisement(
        &self,
        _adapter: &Path<'static>,
        advertisement: Advertisement,
    ) -> Result<(), Error> {
        self.record(format!("register_advertisement {}", advertisement.object_path));
        let receiver = self.state.lock().unwrap().advertisement_reply.take();
        MockBus::reply(receiver).await?;
        self.state
            .lock()
            .unwrap()
            .advertisements
            .insert(advertisement.object_path.to_string());
        Ok(())
    }

    async fn unregister_advertisement(
        &self,
        _adapter: &Path<'static>,
        advertisement: &Path<'static>,
    ) -> Result<(), Error> {
        self.record(format!("unregister_advertisement {}", advertisement));
        if self.state.lock().unwrap().advertisements.remove(&advertisement.to_string()) {
            Ok(())
        } else {
            Err(bluez_error("org.bluez.Error.DoesNotExist", "Does Not Exist"))
        }
    }

    async fn register_application(
        &self,
        _adapter: &Path<'static>,
        application: Application,
    ) -> Result<(), Error> {
        self.record(format!(
            "register_application {} services={}",
            application.object_path,
            application.services().len()
        ));
        let receiver = self.state.lock().unwrap().application_reply.take();
        MockBus::reply(receiver).await?;
        self.state
            .lock()
            .unwrap()
            .applications
            .insert(application.object_path.to_string());
        Ok(())
    }

    async fn unregister_application(
        &self,
        _adapter: &Path<'static>,
        application: &Path<'static>,
    ) -> Result<(), Error> {
        self.record(format!("unregister_application {}", application));
        if self.state.lock().unwrap().applications.remove(&application.to_string()) {
            Ok(())
        } else {
            Err(bluez_error("org.bluez.Error.DoesNotExist", "Does Not Exist"))
        }
    }

    async fn subscribe(&self, filter: SignalFilter) -> Result<Subscription, Error> {
        self.record(format!("subscribe {:?}", filter));
        let mut state = self.state.lock().unwrap();
        if state.reject_subscriptions {
            return Err(bluez_error(
                "org.freedesktop.DBus.Error.AccessDenied",
                "Rejected send message",
            ));
        }
        state.next_token += 1;
        let token = SubscriptionToken(state.next_token);
        let (sender, events) = mpsc::unbounded();
        state.subscribers.push((token, filter, sender));
        Ok(Subscription { token, events })
    }

    async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), Error> {
        self.record(format!("unsubscribe {}", token.0));
        self.state
            .lock()
            .unwrap()
            .subscribers
            .retain(|(subscribed, _, _)| *subscribed != token);
        Ok(())
    }
}

/// Counts disconnect notifications and journals them.
#[derive(Debug)]
pub struct RecordingService {
    pub name: &'static str,
    uuid: Uuid,
    journal: Journal,
    disconnects: AtomicUsize,
}

impl RecordingService {
    pub fn new(name: &'static str, uuid: &str, journal: Journal) -> Arc<Self> {
        Arc::new(RecordingService {
            name,
            uuid: Uuid::parse_str(uuid).unwrap(),
            journal,
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Service for RecordingService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn remote_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.journal
            .lock()
            .unwrap()
            .push(format!("remote_disconnected {}", self.name));
    }
}

/// A service with a defect in its disconnect handler.
#[derive(Debug)]
pub struct PanickingService;

impl Service for PanickingService {
    fn uuid(&self) -> Uuid {
        Uuid::parse_str("0000180a-0000-1000-8000-00805f9b34fb").unwrap()
    }

    fn remote_disconnected(&self) {
        panic!("service state corrupted");
    }
}

/// Yields to other tasks until `condition` holds.
pub async fn until<F: Fn() -> bool>(condition: F) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
