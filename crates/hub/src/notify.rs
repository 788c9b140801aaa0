// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notify Host (§6): fans each [`crate::store::NotifyDispatch`] broadcast
//! out to every registered notify plugin, each with its own fresh `ctx`.
//! Runs as its own cancellable task, the same shape as the Store's own
//! scheduler loop, but as a pure subscriber — it never talks back to the
//! Store except through the `ctx.api.action` an Engage plugin is given.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::actions::ActionCtx;
use crate::constants::NotificationEvent;
use crate::platform::PlatformApi;
use crate::renderer::RenderedView;
use crate::store::{NotifyDispatch, StoreHandle};

/// What a notify plugin's handler gets on every dispatch (§6 `ctx.api`):
/// read-only store access and the platform capabilities every plugin kind
/// shares, plus — only for a plugin registered through
/// [`crate::bridge::BridgeHost::register_engage`] — the action-execution
/// surface that closes the interaction loop back into the Store.
#[derive(Clone)]
pub struct NotifyCtx {
    store: StoreHandle,
    platform: Arc<dyn PlatformApi>,
    action: Option<ActionCtx>,
}

impl NotifyCtx {
    pub async fn get_messages(&self) -> Vec<RenderedView> {
        self.store.get_messages().await
    }

    pub fn platform(&self) -> &dyn PlatformApi {
        self.platform.as_ref()
    }

    /// `Some` only for a plugin registered via `register_engage`.
    pub fn action(&self) -> Option<&ActionCtx> {
        self.action.as_ref()
    }
}

/// A sink for rendered notification batches: a push endpoint, a TTS queue, a
/// dashboard feed. Implementations must not block; slow work belongs on a
/// task the plugin spawns for itself.
pub trait NotifyPlugin: Send + Sync {
    fn id(&self) -> &str;

    fn on_notify(&self, event: NotificationEvent, messages: &[RenderedView], ctx: &NotifyCtx);
}

/// Holds the registered notify plugins and drives the broadcast subscription
/// loop. A plugin registered through [`Self::register_with_action`] carries
/// an [`ActionCtx`] that's threaded into its [`NotifyCtx`] on every call.
pub struct NotifyHost {
    store: StoreHandle,
    platform: Arc<dyn PlatformApi>,
    plugins: Vec<(Arc<dyn NotifyPlugin>, Option<ActionCtx>)>,
}

impl NotifyHost {
    pub fn new(store: StoreHandle, platform: Arc<dyn PlatformApi>) -> Self {
        Self { store, platform, plugins: Vec::new() }
    }

    pub fn register(&mut self, plugin: Arc<dyn NotifyPlugin>) {
        tracing::info!(plugin_id = %plugin.id(), "notify plugin registered");
        self.plugins.push((plugin, None));
    }

    /// Registers a plugin with an action-execution surface wired into its
    /// `ctx.api.action` (used by [`crate::bridge::BridgeHost::register_engage`]).
    pub fn register_with_action(&mut self, plugin: Arc<dyn NotifyPlugin>, action: ActionCtx) {
        tracing::info!(plugin_id = %plugin.id(), "notify plugin registered with action executor");
        self.plugins.push((plugin, Some(action)));
    }

    /// Removes a previously registered plugin. Returns whether one was
    /// found.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.plugins.len();
        self.plugins.retain(|(plugin, _)| plugin.id() != id);
        self.plugins.len() != before
    }

    pub fn registered_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|(p, _)| p.id()).collect()
    }

    /// Consumes the host and spawns its subscription loop. Lag is logged and
    /// skipped rather than treated as fatal — a slow notify plugin should
    /// not bring the Store's dispatch channel to a halt.
    pub fn spawn(
        self,
        mut rx: broadcast::Receiver<NotifyDispatch>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => {
                        match received {
                            Ok(dispatch) => self.fan_out(dispatch),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "notify host lagged behind the store's dispatch channel");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        })
    }

    fn fan_out(&self, dispatch: NotifyDispatch) {
        for (plugin, action) in &self.plugins {
            let ctx = NotifyCtx { store: self.store.clone(), platform: self.platform.clone(), action: action.clone() };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                plugin.on_notify(dispatch.event, &dispatch.messages, &ctx);
            }));
            if outcome.is_err() {
                tracing::error!(
                    plugin_id = %plugin.id(),
                    event = %dispatch.event,
                    "notify plugin panicked handling a dispatch"
                );
            }
        }
    }
}
