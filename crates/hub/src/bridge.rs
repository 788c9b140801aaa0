// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge & Engage wiring (§4.9). A bridge plugin relays the Store's
//! rendered state to an external surface (a wall panel, a voice assistant,
//! a remote API); an engage plugin does the same but also turns an inbound
//! interaction from that surface into a Store action. Both register as a
//! single handler under one `id`, but concretely become *two* plugins — an
//! ingest-side producer at `id.ingest` and a notify-side subscriber at
//! `id.notify` — registered ingest-first through the real
//! [`crate::ingest::IngestHost`]/[`crate::notify::NotifyHost`], with the
//! already-registered half rolled back if the other fails.

use std::collections::HashSet;
use std::sync::Arc;

use crate::actions::ActionCtx;
use crate::constants::NotificationEvent;
use crate::error::HubError;
use crate::ingest::{IngestCtx, IngestHost, ProducerPlugin};
use crate::notify::{NotifyCtx, NotifyHost, NotifyPlugin};
use crate::platform::PlatformApi;
use crate::renderer::RenderedView;
use crate::store::StoreHandle;

/// A bridge plugin: observes the Store's rendered views and relays them
/// outward. `on_register` is an optional ingest-side setup hook (e.g. to
/// subscribe to a foreign-state pattern); `on_notify` is where it actually
/// relays.
pub trait BridgePlugin: Send + Sync {
    fn id(&self) -> &str;

    fn on_register(&self, _ctx: IngestCtx) {}
    fn on_notify(&self, _event: NotificationEvent, _messages: &[RenderedView], _ctx: &NotifyCtx) {}
}

/// An engage plugin: the same shape as [`BridgePlugin`], except its
/// notify-side registration carries an [`ActionCtx`] (§4.9), so `on_notify`
/// can turn an inbound interaction into a Store mutation via
/// `ctx.action()`.
pub trait EngagePlugin: Send + Sync {
    fn id(&self) -> &str;

    fn on_register(&self, _ctx: IngestCtx) {}
    fn on_notify(&self, _event: NotificationEvent, _messages: &[RenderedView], _ctx: &NotifyCtx) {}
}

struct BridgeIngestAdapter {
    id: String,
    inner: Arc<dyn BridgePlugin>,
}

impl ProducerPlugin for BridgeIngestAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_register(&self, ctx: IngestCtx) {
        self.inner.on_register(ctx);
    }
}

struct BridgeNotifyAdapter {
    id: String,
    inner: Arc<dyn BridgePlugin>,
}

impl NotifyPlugin for BridgeNotifyAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_notify(&self, event: NotificationEvent, messages: &[RenderedView], ctx: &NotifyCtx) {
        self.inner.on_notify(event, messages, ctx);
    }
}

struct EngageIngestAdapter {
    id: String,
    inner: Arc<dyn EngagePlugin>,
}

impl ProducerPlugin for EngageIngestAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_register(&self, ctx: IngestCtx) {
        self.inner.on_register(ctx);
    }
}

struct EngageNotifyAdapter {
    id: String,
    inner: Arc<dyn EngagePlugin>,
}

impl NotifyPlugin for EngageNotifyAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_notify(&self, event: NotificationEvent, messages: &[RenderedView], ctx: &NotifyCtx) {
        self.inner.on_notify(event, messages, ctx);
    }
}

/// Returned by a successful `register_bridge`/`register_engage` call. Holds
/// the two concrete ids the handler was split across, and the means to
/// unregister both halves together.
pub struct BridgeRegistration {
    base: String,
    ingest_id: String,
    notify_id: String,
}

impl BridgeRegistration {
    pub fn ingest_id(&self) -> &str {
        &self.ingest_id
    }

    pub fn notify_id(&self) -> &str {
        &self.notify_id
    }

    /// Unregisters both the ingest-side and notify-side halves and frees
    /// the base id for reuse.
    pub fn unregister(self, host: &mut BridgeHost, ingest: &mut IngestHost, notify: &mut NotifyHost) {
        ingest.unregister(&self.ingest_id);
        notify.unregister(&self.notify_id);
        host.registered_ids.remove(&self.base);
    }
}

/// Reserves the shared `id.ingest`/`id.notify` namespace bridge and engage
/// plugins register under, and drives the dual registration through the
/// real ingest/notify hosts.
pub struct BridgeHost {
    store: StoreHandle,
    #[allow(dead_code)]
    platform: Arc<dyn PlatformApi>,
    registered_ids: HashSet<String>,
}

impl BridgeHost {
    pub fn new(store: StoreHandle, platform: Arc<dyn PlatformApi>) -> Self {
        Self { store, platform, registered_ids: HashSet::new() }
    }

    /// Registers a bridge plugin as `id.ingest` (through `ingest`) then
    /// `id.notify` (through `notify`). If the notify-side registration
    /// panics, the ingest-side registration is rolled back so the base id
    /// is free for a retry.
    pub fn register_bridge(
        &mut self,
        plugin: Arc<dyn BridgePlugin>,
        ingest: &mut IngestHost,
        notify: &mut NotifyHost,
    ) -> Result<BridgeRegistration, HubError> {
        let base = plugin.id().to_string();
        if !self.registered_ids.insert(base.clone()) {
            return Err(HubError::Validation(format!("bridge/engage id '{base}' already registered")));
        }

        let ingest_id = format!("{base}.ingest");
        let notify_id = format!("{base}.notify");

        let ingest_adapter = Arc::new(BridgeIngestAdapter { id: ingest_id.clone(), inner: plugin.clone() });
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ingest.register(ingest_adapter))).is_err() {
            self.registered_ids.remove(&base);
            return Err(HubError::Action(format!("bridge plugin '{base}' failed ingest-side registration")));
        }

        let notify_adapter = Arc::new(BridgeNotifyAdapter { id: notify_id.clone(), inner: plugin });
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| notify.register(notify_adapter))).is_err() {
            ingest.unregister(&ingest_id);
            self.registered_ids.remove(&base);
            return Err(HubError::Action(format!("bridge plugin '{base}' failed notify-side registration")));
        }

        tracing::info!(plugin_id = %base, "bridge plugin registered");
        Ok(BridgeRegistration { base, ingest_id, notify_id })
    }

    /// Same dual registration as [`Self::register_bridge`], except the
    /// notify-side half is registered with an [`ActionCtx`] wired to this
    /// host's Store (§4.9), so the handler's `on_notify` can act on what it
    /// sees.
    pub fn register_engage(
        &mut self,
        plugin: Arc<dyn EngagePlugin>,
        ingest: &mut IngestHost,
        notify: &mut NotifyHost,
    ) -> Result<BridgeRegistration, HubError> {
        let base = plugin.id().to_string();
        if !self.registered_ids.insert(base.clone()) {
            return Err(HubError::Validation(format!("bridge/engage id '{base}' already registered")));
        }

        let ingest_id = format!("{base}.ingest");
        let notify_id = format!("{base}.notify");

        let ingest_adapter = Arc::new(EngageIngestAdapter { id: ingest_id.clone(), inner: plugin.clone() });
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ingest.register(ingest_adapter))).is_err() {
            self.registered_ids.remove(&base);
            return Err(HubError::Action(format!("engage plugin '{base}' failed ingest-side registration")));
        }

        let notify_adapter = Arc::new(EngageNotifyAdapter { id: notify_id.clone(), inner: plugin });
        let action = ActionCtx::new(self.store.clone());
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| notify.register_with_action(notify_adapter, action)))
            .is_err()
        {
            ingest.unregister(&ingest_id);
            self.registered_ids.remove(&base);
            return Err(HubError::Action(format!("engage plugin '{base}' failed notify-side registration")));
        }

        tracing::info!(plugin_id = %base, "engage plugin registered");
        Ok(BridgeRegistration { base, ingest_id, notify_id })
    }

    pub fn registered_ids(&self) -> Vec<&str> {
        self.registered_ids.iter().map(String::as_str).collect()
    }
}
