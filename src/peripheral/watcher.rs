use futures::{
    channel::mpsc::UnboundedReceiver,
    stream::{SelectAll, StreamExt},
};
use log::{debug, info, warn};
use std::sync::Arc;

use super::adapter::AdapterController;
use crate::{
    bus::{AdapterProperty, ManagementBus, PropertyChange, SignalFilter, SubscriptionToken},
    gatt::service::Service,
    Error, ErrorType,
};

/// Keeps the adapter on policy and tells services about disconnects, driven
/// by the bus' property-change signals.
#[derive(Debug, Default)]
pub struct SignalWatcher {
    tokens: Vec<SubscriptionToken>,
    events: SelectAll<UnboundedReceiver<PropertyChange>>,
}

impl SignalWatcher {
    pub fn new() -> Self {
        SignalWatcher::default()
    }

    pub fn is_subscribed(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Subscribes to device and adapter property changes. A subscription
    /// that did go through before a failure is kept, so `unsubscribe` still
    /// removes it.
    pub async fn subscribe(&mut self, bus: &Arc<dyn ManagementBus>) -> Result<(), Error> {
        for filter in [SignalFilter::Device, SignalFilter::Adapter].iter() {
            let subscription = bus
                .subscribe(*filter)
                .await
                .map_err(|err| err.with_type(ErrorType::Subscription))?;
            debug!("Subscribed to {:?} property changes", filter);
            self.tokens.push(subscription.token);
            self.events.push(subscription.events);
        }
        Ok(())
    }

    /// Next signal from either subscription. Pends forever while nothing is
    /// subscribed, and yields `None` once the bus has closed every stream.
    pub async fn next_change(&mut self) -> Option<PropertyChange> {
        if self.events.is_empty() {
            futures::future::pending::<()>().await;
        }
        self.events.next().await
    }

    /// Reacts to one signal. Every correction and notification it causes has
    /// finished when this returns.
    pub async fn dispatch(
        &self,
        change: PropertyChange,
        adapter: &AdapterController,
        services: &[Arc<dyn Service>],
    ) -> Result<(), Error> {
        match change {
            PropertyChange::Device { connected: Some(false), path } => {
                info!("Remote device {} was disconnected.", path);
                for service in services.iter() {
                    service.remote_disconnected();
                }
            }
            PropertyChange::Device { .. } => {}
            PropertyChange::Adapter { path, changed } => {
                if path != adapter.object_path {
                    return Ok(());
                }
                let drifted = changed
                    .iter()
                    .filter(|property| !matches!(property, AdapterProperty::Alias(_)))
                    .find(|property| adapter.is_drift(property));
                if let Some(property) = drifted {
                    info!(
                        "Adapter {} drifted to {:?}, restoring policy",
                        adapter.name(),
                        property
                    );
                    adapter.enforce().await?;
                }
            }
        }
        Ok(())
    }

    /// Removes every subscription. Safe to call when none were made.
    pub async fn unsubscribe(&mut self, bus: &Arc<dyn ManagementBus>) {
        for token in self.tokens.drain(..) {
            if let Err(err) = bus.unsubscribe(token).await {
                warn!("Couldn't remove signal subscription {:?}: {}", token, err);
            }
        }
        self.events = SelectAll::new();
    }
}
