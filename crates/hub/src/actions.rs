// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action Executor & View Policy (§4.6). Translates a plugin- or
//! Engage-initiated action into the patch the Store applies through
//! `updateMessage`, and splits a rendered view's `actions` into the
//! executable and inactive sets for the message's current lifecycle state.

use indexmap::IndexMap;

use crate::constants::LifecycleState;
use crate::error::HubError;
use crate::message::{ActionDef, Message};
use crate::patch::{LifecyclePatch, MessagePatch, Patch, TimingPatch};
use crate::renderer::RenderedView;
use crate::store::StoreHandle;

/// Request accepted by [`plan`]. Mirrors the `execute({...})` call shape in
/// §4.6.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub ref_: String,
    pub action_id: String,
    pub actor: Option<String>,
    pub snooze_for_ms: Option<i64>,
    pub link_payload: Option<serde_json::Value>,
    pub custom_payload: Option<serde_json::Value>,
}

/// What the Store should do in response to an executed action.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Apply this patch via `updateMessage(ref, patch, stealth=false,
    /// coreToken=LIFECYCLE)`.
    Patch(MessagePatch),
    /// Soft-delete via `removeMessage`.
    Remove,
    /// No store mutation; the side effect is the caller's responsibility
    /// (`link`) or a plugin-defined handler (`custom`).
    NoMutation,
}

/// Resolves `request.action_id` against `msg.actions` and translates it
/// into the patch/outcome the Store applies.
pub fn plan(msg: &Message, request: &ActionRequest, now: i64) -> Result<ActionOutcome, HubError> {
    let action = msg
        .actions
        .get(&request.action_id)
        .ok_or_else(|| HubError::Action(format!("unknown action id '{}'", request.action_id)))?;

    if !is_action_valid(&action.action_type, msg.lifecycle.state) {
        return Err(HubError::Action(format!(
            "action '{}' not valid for lifecycle state {:?}",
            action.action_type, msg.lifecycle.state
        )));
    }

    match action.action_type.as_str() {
        "ack" => Ok(ActionOutcome::Patch(MessagePatch {
            lifecycle: Patch::Set(LifecyclePatch {
                state: Some(LifecycleState::Acked),
                state_changed_by: request.actor.clone().map(Patch::Set).unwrap_or(Patch::Keep),
            }),
            timing: Some(TimingPatch { notify_at: Patch::Clear, ..Default::default() }),
            ..Default::default()
        })),
        "close" => Ok(ActionOutcome::Patch(MessagePatch {
            lifecycle: Patch::Set(LifecyclePatch {
                state: Some(LifecycleState::Closed),
                state_changed_by: request.actor.clone().map(Patch::Set).unwrap_or(Patch::Keep),
            }),
            ..Default::default()
        })),
        "open" => Ok(ActionOutcome::Patch(MessagePatch {
            lifecycle: Patch::Set(LifecyclePatch {
                state: Some(LifecycleState::Open),
                state_changed_by: request.actor.clone().map(Patch::Set).unwrap_or(Patch::Keep),
            }),
            ..Default::default()
        })),
        "delete" => Ok(ActionOutcome::Remove),
        "snooze" => {
            let snooze_for = request
                .snooze_for_ms
                .ok_or_else(|| HubError::Action("snooze action requires snoozeForMs".into()))?;
            Ok(ActionOutcome::Patch(MessagePatch {
                lifecycle: Patch::Set(LifecyclePatch {
                    state: Some(LifecycleState::Snoozed),
                    state_changed_by: request.actor.clone().map(Patch::Set).unwrap_or(Patch::Keep),
                }),
                timing: Some(TimingPatch {
                    notify_at: Patch::Set(now + snooze_for),
                    ..Default::default()
                }),
                ..Default::default()
            }))
        }
        "link" => Ok(ActionOutcome::NoMutation),
        "custom" => Ok(ActionOutcome::NoMutation),
        other => Err(HubError::Action(format!("unsupported action type '{other}'"))),
    }
}

/// Whether `action_type` may be invoked while the message is in
/// `state` (§4.6: e.g. no "ack" once already `acked`).
fn is_action_valid(action_type: &str, state: LifecycleState) -> bool {
    match action_type {
        "ack" => matches!(state, LifecycleState::Open | LifecycleState::Snoozed),
        "close" => !matches!(state, LifecycleState::Deleted | LifecycleState::Expired | LifecycleState::Closed),
        "open" => matches!(state, LifecycleState::Acked | LifecycleState::Snoozed | LifecycleState::Closed),
        "delete" => !matches!(state, LifecycleState::Deleted),
        "snooze" => matches!(state, LifecycleState::Open | LifecycleState::Acked),
        "link" | "custom" => !matches!(state, LifecycleState::Deleted | LifecycleState::Expired),
        _ => false,
    }
}

/// The action-execution surface handed to an Engage plugin's notify-side
/// [`crate::notify::NotifyCtx`] (§6 `ctx.api.action`) — the only path by
/// which a notification handler can turn an interaction back into a Store
/// mutation.
#[derive(Clone)]
pub struct ActionCtx {
    store: StoreHandle,
}

impl ActionCtx {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn execute(&self, request: ActionRequest) -> Result<bool, HubError> {
        self.store.execute_action(request).await
    }
}

/// Splits `view.actions` into the executable set (kept in place) and the
/// view-only `actions_inactive` set, based on the message's current
/// lifecycle state.
pub fn split_actions_by_lifecycle(view: &mut RenderedView) {
    let mut active = IndexMap::new();
    let mut inactive = IndexMap::new();
    for (id, action) in view.actions.drain(..) {
        if is_action_valid(&action.action_type, view.lifecycle_state) {
            active.insert(id, action);
        } else {
            inactive.insert(id, action);
        }
    }
    view.actions = active;
    view.actions_inactive = inactive;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{Kind, Level, OriginType};
    use crate::message::{ActionDef, Lifecycle, Origin, Timing};

    fn msg_with_actions(state: LifecycleState) -> Message {
        let mut actions = IndexMap::new();
        actions.insert("ack1".to_string(), ActionDef { action_type: "ack".into(), payload: None });
        actions.insert("snooze1".to_string(), ActionDef { action_type: "snooze".into(), payload: None });
        Message {
            ref_: "manual.task.r1".into(),
            title: "t".into(),
            text: "t".into(),
            icon: None,
            level: Level::Notice,
            kind: Kind::Task,
            origin: Origin { origin_type: OriginType::Manual, system: None, id: None },
            lifecycle: Lifecycle { state, state_changed_at: None, state_changed_by: None },
            timing: Timing { created_at: 0, updated_at: 0, ..Default::default() },
            details: None,
            metrics: Default::default(),
            attachments: Vec::new(),
            list_items: Default::default(),
            actions,
            progress: None,
            audience: None,
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn ack_action_sets_acked_and_clears_notify_at() -> anyhow::Result<()> {
        let msg = msg_with_actions(LifecycleState::Open);
        let request = ActionRequest {
            ref_: msg.ref_.clone(),
            action_id: "ack1".into(),
            actor: Some("user".into()),
            snooze_for_ms: None,
            link_payload: None,
            custom_payload: None,
        };
        let outcome = plan(&msg, &request, 1_000)?;
        let ActionOutcome::Patch(patch) = outcome else {
            return Err(anyhow::anyhow!("expected a patch outcome"));
        };
        assert!(matches!(
            patch.lifecycle,
            Patch::Set(LifecyclePatch { state: Some(LifecycleState::Acked), .. })
        ));
        Ok(())
    }

    #[test]
    fn ack_action_invalid_once_already_acked() {
        let msg = msg_with_actions(LifecycleState::Acked);
        let request = ActionRequest {
            ref_: msg.ref_.clone(),
            action_id: "ack1".into(),
            actor: None,
            snooze_for_ms: None,
            link_payload: None,
            custom_payload: None,
        };
        let result = plan(&msg, &request, 1_000);
        assert!(matches!(result, Err(HubError::Action(_))));
    }

    #[test]
    fn unknown_action_id_is_rejected() {
        let msg = msg_with_actions(LifecycleState::Open);
        let request = ActionRequest {
            ref_: msg.ref_.clone(),
            action_id: "nope".into(),
            actor: None,
            snooze_for_ms: None,
            link_payload: None,
            custom_payload: None,
        };
        let result = plan(&msg, &request, 1_000);
        assert!(matches!(result, Err(HubError::Action(_))));
    }

    #[test]
    fn snooze_requires_duration() {
        let msg = msg_with_actions(LifecycleState::Open);
        let request = ActionRequest {
            ref_: msg.ref_.clone(),
            action_id: "snooze1".into(),
            actor: None,
            snooze_for_ms: None,
            link_payload: None,
            custom_payload: None,
        };
        let result = plan(&msg, &request, 1_000);
        assert!(matches!(result, Err(HubError::Action(_))));
    }

    #[test]
    fn view_policy_splits_active_and_inactive_actions() {
        let msg = msg_with_actions(LifecycleState::Acked);
        let mut view = crate::renderer::render(&msg);
        split_actions_by_lifecycle(&mut view);
        assert!(!view.actions.contains_key("ack1"));
        assert!(view.actions_inactive.contains_key("ack1"));
        assert!(view.actions.contains_key("snooze1"));
    }
}
