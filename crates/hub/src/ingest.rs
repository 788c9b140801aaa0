// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingest Host (§5, §6): the only door producer plugins have into the
//! Store, and the dispatch surface that carries inbound foreign-state and
//! object changes back out to them. Registration hands each plugin an
//! [`IngestCtx`] — a thin, cloneable wrapper over [`StoreHandle`] — the
//! same shape `coopmux` hands its session drivers a scoped view of
//! `MuxState` rather than the whole thing.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::factory::CreateInput;
use crate::patch::MessagePatch;
use crate::platform::PlatformApi;
use crate::store::StoreHandle;

/// What a producer plugin gets on every call into it. Nothing here exposes
/// `full_list`, the archive, or a [`crate::token::CoreToken`] — only the
/// mutation surface a producer is allowed to drive, the platform
/// capabilities (§6 `ctx.api.iobroker`/`log`/`i18n`) the host supplies, and
/// `ctx.meta.running`/`extras` (§4.8) describing the call that produced it.
#[derive(Clone)]
pub struct IngestCtx {
    store: StoreHandle,
    platform: Arc<dyn PlatformApi>,
    running: bool,
    extras: Value,
}

impl IngestCtx {
    pub async fn add_message(&self, input: CreateInput) -> bool {
        self.store.add_message(input).await
    }

    pub async fn update_message(&self, ref_: impl Into<String>, patch: MessagePatch) -> bool {
        self.store.update_message(ref_, patch, false).await
    }

    pub async fn add_or_update_message(&self, input: CreateInput) -> bool {
        self.store.add_or_update_message(input).await
    }

    pub async fn remove_message(&self, ref_: impl Into<String>, actor: Option<String>) -> bool {
        self.store.remove_message(ref_, actor).await
    }

    pub fn platform(&self) -> &dyn PlatformApi {
        self.platform.as_ref()
    }

    /// Whether the Ingest Host is currently started (§4.8).
    pub fn running(&self) -> bool {
        self.running
    }

    /// Call-specific extra data (§4.8); `Value::Null` outside a dispatch.
    pub fn extras(&self) -> &Value {
        &self.extras
    }
}

/// A foreign-state change forwarded through [`IngestHost::dispatch_state_change`]
/// (§4.8): the raw `{val, ack}` pair plus the reporting/last-changed
/// timestamps a producer may use to drive a freshness rule.
#[derive(Debug, Clone)]
pub struct StatePayload {
    pub val: Value,
    pub ack: Option<bool>,
    pub ts: Option<i64>,
    pub lc: Option<i64>,
}

/// A producer plugin: something that observes the outside world (a sensor
/// poll, a calendar sync, a manual import) and turns it into Store
/// mutations through its [`IngestCtx`]. Only `on_register` is required; the
/// rest are the optional handler hooks §6 names (`start`/`stop` and the
/// state/object change callbacks), each a no-op by default.
pub trait ProducerPlugin: Send + Sync {
    fn id(&self) -> &str;

    /// Called once at registration with the plugin's scoped context. A
    /// plugin that drives itself off a timer or external event source
    /// typically clones the context and spawns its own task here.
    fn on_register(&self, ctx: IngestCtx);

    fn start(&self, _ctx: &IngestCtx) {}
    fn stop(&self, _ctx: &IngestCtx) {}
    fn on_state_change(&self, _id: &str, _state: &StatePayload, _ctx: &IngestCtx) {}
    fn on_object_change(&self, _id: &str, _object: &Value, _ctx: &IngestCtx) {}
}

/// Holds every registered producer plugin and forwards inbound state/object
/// changes to them. Registering under an id already in use stops and
/// drops the previous plugin at that id first (§4.8), and the host's own
/// running state is replayed to a plugin that registers while it's
/// already started.
pub struct IngestHost {
    store: StoreHandle,
    platform: Arc<dyn PlatformApi>,
    plugins: Vec<(String, Arc<dyn ProducerPlugin>)>,
    running: bool,
}

impl IngestHost {
    pub fn new(store: StoreHandle, platform: Arc<dyn PlatformApi>) -> Self {
        Self { store, platform, plugins: Vec::new(), running: false }
    }

    fn make_ctx(&self, extras: Value) -> IngestCtx {
        IngestCtx { store: self.store.clone(), platform: self.platform.clone(), running: self.running, extras }
    }

    pub fn register(&mut self, plugin: Arc<dyn ProducerPlugin>) {
        let id = plugin.id().to_string();
        self.unregister(&id);

        let ctx = self.make_ctx(Value::Null);
        plugin.on_register(ctx.clone());
        if self.running {
            plugin.start(&ctx);
        }
        tracing::info!(plugin_id = %id, "producer plugin registered");
        self.plugins.push((id, plugin));
    }

    /// Stops (if the host is running) and removes the plugin at `id`.
    /// Returns whether one was found.
    pub fn unregister(&mut self, id: &str) -> bool {
        let Some(pos) = self.plugins.iter().position(|(existing, _)| existing == id) else {
            return false;
        };
        let (_, plugin) = self.plugins.remove(pos);
        if self.running {
            plugin.stop(&self.make_ctx(Value::Null));
        }
        true
    }

    pub fn registered_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Starts every registered plugin and marks the host running; a plugin
    /// registered afterward is started immediately instead (§4.8).
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        let ctx = self.make_ctx(Value::Null);
        for (_, plugin) in &self.plugins {
            plugin.start(&ctx);
        }
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        let ctx = self.make_ctx(Value::Null);
        for (_, plugin) in &self.plugins {
            plugin.stop(&ctx);
        }
        self.running = false;
    }

    /// Forwards a foreign-state change to every registered plugin's
    /// `on_state_change`, each with its own fresh `ctx`, isolating a
    /// panicking plugin from the rest. Returns the number of plugins
    /// dispatched to.
    pub fn dispatch_state_change(&self, id: &str, state: StatePayload, extras: Value) -> usize {
        let mut attempted = 0;
        for (_, plugin) in &self.plugins {
            attempted += 1;
            let ctx = self.make_ctx(extras.clone());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                plugin.on_state_change(id, &state, &ctx);
            }));
            if outcome.is_err() {
                tracing::error!(plugin_id = %plugin.id(), state_id = id, "producer plugin panicked handling a state change");
            }
        }
        attempted
    }

    /// Forwards an object-metadata change to every registered plugin's
    /// `on_object_change`, with the same per-plugin ctx and panic
    /// isolation as [`Self::dispatch_state_change`].
    pub fn dispatch_object_change(&self, id: &str, object: Value, extras: Value) -> usize {
        let mut attempted = 0;
        for (_, plugin) in &self.plugins {
            attempted += 1;
            let ctx = self.make_ctx(extras.clone());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                plugin.on_object_change(id, &object, &ctx);
            }));
            if outcome.is_err() {
                tracing::error!(plugin_id = %plugin.id(), object_id = id, "producer plugin panicked handling an object change");
            }
        }
        attempted
    }
}
