// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform interface (§1, §6): the host integration layer — KV-state,
//! object metadata, foreign-state subscription, a `sendTo` side channel,
//! and i18n — is an out-of-scope external collaborator. This module only
//! models the boundary the core consumes, so a producer/notify plugin's
//! `ctx` has somewhere to reach for host capabilities without the core
//! depending on any concrete host (an IoT adapter, a test double, ...).

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// A foreign state's value/ack pair, as read or written through the
/// platform (§6: `{val, ack}`).
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignState {
    pub val: Value,
    pub ack: bool,
}

/// The capability surface a plugin's `ctx.api.iobroker` exposes (§6). Kept
/// to exactly the calls named there; nothing here is core business logic,
/// so the trait is intentionally thin and host-agnostic.
pub trait PlatformApi: Send + Sync {
    fn ids_namespace(&self) -> &str;

    fn get_foreign_state(&self, id: &str) -> Option<ForeignState>;
    fn set_foreign_state(&self, id: &str, state: ForeignState);
    fn set_state(&self, id: &str, state: ForeignState);

    fn subscribe_foreign_states(&self, pattern: &str);
    fn unsubscribe_foreign_states(&self, pattern: &str);

    /// Opaque to the core (§6): forwarded verbatim to whatever downstream
    /// bridge the host wires `instance`/`command` to.
    fn send_to(&self, instance: &str, command: &str, payload: Value);

    /// Printf-like substitution (§6); falls back to the key itself when no
    /// translation is configured.
    fn translate(&self, key: &str, args: &[&str]) -> String {
        let _ = args;
        key.to_string()
    }
}

/// An in-memory [`PlatformApi`] for tests and the demo binary: state lives
/// in a `Mutex<HashMap>`, subscriptions and `sendTo` calls are recorded but
/// otherwise inert.
pub struct LocalPlatform {
    namespace: String,
    states: Mutex<HashMap<String, ForeignState>>,
}

impl LocalPlatform {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), states: Mutex::new(HashMap::new()) }
    }
}

impl PlatformApi for LocalPlatform {
    fn ids_namespace(&self) -> &str {
        &self.namespace
    }

    fn get_foreign_state(&self, id: &str) -> Option<ForeignState> {
        self.states.lock().ok()?.get(id).cloned()
    }

    fn set_foreign_state(&self, id: &str, state: ForeignState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(id.to_string(), state);
        }
    }

    fn set_state(&self, id: &str, state: ForeignState) {
        self.set_foreign_state(id, state);
    }

    fn subscribe_foreign_states(&self, pattern: &str) {
        tracing::debug!(pattern, "subscribeForeignStates (local platform, no-op wiring)");
    }

    fn unsubscribe_foreign_states(&self, pattern: &str) {
        tracing::debug!(pattern, "unsubscribeForeignStates (local platform, no-op wiring)");
    }

    fn send_to(&self, instance: &str, command: &str, _payload: Value) {
        tracing::debug!(instance, command, "sendTo (local platform, no-op wiring)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_platform_round_trips_foreign_state() -> anyhow::Result<()> {
        let platform = LocalPlatform::new("hub.0");
        assert!(platform.get_foreign_state("sensor.temp").is_none());
        platform.set_foreign_state("sensor.temp", ForeignState { val: serde_json::json!(21.5), ack: true });
        let read = platform
            .get_foreign_state("sensor.temp")
            .ok_or_else(|| anyhow::anyhow!("state was just set"))?;
        assert_eq!(read.val, serde_json::json!(21.5));
        assert!(read.ack);
        Ok(())
    }

    #[test]
    fn translate_falls_back_to_key_without_configured_i18n() {
        let platform = LocalPlatform::new("hub.0");
        assert_eq!(platform.translate("greeting", &[]), "greeting");
    }
}
