// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Store (§4.7): the single serialized scheduler every public mutation
//! posts to (§5). Runs as one background task owning `full_list` directly —
//! no lock, no `RwLock<Vec<Message>>` — the way `coopmux`'s background
//! pollers are driven by a cancellable loop that owns its state outright.
//! Callers only ever see a cloneable [`StoreHandle`] that posts commands
//! over an `mpsc` channel and awaits a `oneshot` reply.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionOutcome, ActionRequest};
use crate::archive::Archive;
use crate::config::HubConfig;
use crate::constants::{LifecycleState, NotificationEvent};
use crate::error::HubError;
use crate::factory::CreateInput;
use crate::message::Message;
use crate::patch::{
    AttachmentsPatch, LifecyclePatch, ListPatch, MapPatch, MessagePatch, Patch, ProgressPatch,
    TimingPatch,
};
use crate::query::{Query, StateFilter};
use crate::renderer::RenderedView;
use crate::storage::Storage;
use crate::token::CoreToken;

pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// One event dispatched to the Notify Host (§6): always carries an array of
/// rendered views, even for a single-message event.
#[derive(Debug, Clone)]
pub struct NotifyDispatch {
    pub event: NotificationEvent,
    pub messages: Vec<RenderedView>,
}

#[derive(Debug)]
pub struct QueryOutput {
    pub total: usize,
    pub pages: usize,
    pub items: Vec<RenderedView>,
}

enum Command {
    Add(CreateInput, oneshot::Sender<bool>),
    Update(String, MessagePatch, bool, oneshot::Sender<bool>),
    AddOrUpdate(CreateInput, oneshot::Sender<bool>),
    Remove(String, Option<String>, oneshot::Sender<bool>),
    GetByRef(String, StateFilter, oneshot::Sender<Option<RenderedView>>),
    GetAll(oneshot::Sender<Vec<RenderedView>>),
    QueryMessages(Query, oneshot::Sender<QueryOutput>),
    ExecuteAction(ActionRequest, oneshot::Sender<Result<bool, HubError>>),
    RunPrune(bool, oneshot::Sender<()>),
    RunClosedCleanup(bool, oneshot::Sender<()>),
    RunHardDelete(bool, oneshot::Sender<()>),
    RunNotifications(bool, oneshot::Sender<()>),
    FlushPending(oneshot::Sender<()>),
}

/// Cheap, cloneable front door to the Store actor.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
}

impl StoreHandle {
    pub async fn add_message(&self, input: CreateInput) -> bool {
        self.call(|reply| Command::Add(input, reply)).await.unwrap_or(false)
    }

    pub async fn update_message(&self, ref_: impl Into<String>, patch: MessagePatch, stealth: bool) -> bool {
        self.call(|reply| Command::Update(ref_.into(), patch, stealth, reply)).await.unwrap_or(false)
    }

    pub async fn add_or_update_message(&self, input: CreateInput) -> bool {
        self.call(|reply| Command::AddOrUpdate(input, reply)).await.unwrap_or(false)
    }

    pub async fn remove_message(&self, ref_: impl Into<String>, actor: Option<String>) -> bool {
        self.call(|reply| Command::Remove(ref_.into(), actor, reply)).await.unwrap_or(false)
    }

    pub async fn get_message_by_ref(&self, ref_: impl Into<String>, filter: StateFilter) -> Option<RenderedView> {
        self.call(|reply| Command::GetByRef(ref_.into(), filter, reply)).await.flatten()
    }

    pub async fn get_messages(&self) -> Vec<RenderedView> {
        self.call(Command::GetAll).await.unwrap_or_default()
    }

    pub async fn query_messages(&self, query: Query) -> QueryOutput {
        self.call(|reply| Command::QueryMessages(query, reply))
            .await
            .unwrap_or(QueryOutput { total: 0, pages: 0, items: Vec::new() })
    }

    pub async fn execute_action(&self, request: ActionRequest) -> Result<bool, HubError> {
        self.call(|reply| Command::ExecuteAction(request, reply))
            .await
            .unwrap_or_else(|| Err(HubError::Storage("store unavailable".into())))
    }

    /// Forces an immediate maintenance pass regardless of cadence; used by
    /// integration tests and manual operator intervention.
    pub async fn force_prune(&self) {
        let _ = self.call(|reply| Command::RunPrune(true, reply)).await;
    }

    pub async fn force_closed_cleanup(&self) {
        let _ = self.call(|reply| Command::RunClosedCleanup(true, reply)).await;
    }

    pub async fn force_hard_delete(&self) {
        let _ = self.call(|reply| Command::RunHardDelete(true, reply)).await;
    }

    pub async fn force_notifications(&self) {
        let _ = self.call(|reply| Command::RunNotifications(true, reply)).await;
    }

    pub async fn flush_pending(&self) {
        let _ = self.call(Command::FlushPending).await;
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(make(reply_tx)).await.is_err() {
            return None;
        }
        reply_rx.await.ok()
    }
}

pub struct Store {
    config: HubConfig,
    full_list: Vec<Message>,
    ref_counter: AtomicU64,
    storage: Storage,
    archive: Archive,
    notify_tx: broadcast::Sender<NotifyDispatch>,
    started_at: i64,
    last_prune_at: i64,
    last_closed_cleanup_at: i64,
    last_hard_delete_at: i64,
    last_notifier_poll_at: i64,
}

impl Store {
    /// Loads the persisted list, spawns the Storage/Archive writers, and
    /// starts the store scheduler task. Returns the public handle, a
    /// subscription to notification events, and the task's join handle.
    pub fn spawn(config: HubConfig) -> (StoreHandle, broadcast::Receiver<NotifyDispatch>, tokio::task::JoinHandle<()>) {
        let now = epoch_ms();
        let full_list = Storage::read_json(&config.storage_path, Vec::new());
        let storage = Storage::spawn(config.storage_path.clone());
        let archive = Archive::spawn(config.archive_dir.clone(), std::time::Duration::from_secs(5));
        let (notify_tx, notify_rx) = broadcast::channel(256);

        let store = Store {
            config,
            full_list,
            ref_counter: AtomicU64::new(0),
            storage,
            archive,
            notify_tx,
            started_at: now,
            last_prune_at: 0,
            last_closed_cleanup_at: 0,
            last_hard_delete_at: 0,
            last_notifier_poll_at: 0,
        };

        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(store.run(rx, cancel));
        (StoreHandle { tx }, notify_rx, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let mut notifier_timer = tokio::time::interval(self.config.notifier_poll_interval());
        notifier_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut prune_timer = tokio::time::interval(self.config.prune_interval());
        prune_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut closed_timer = tokio::time::interval(self.config.closed_cleanup_interval());
        closed_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut hard_delete_timer = tokio::time::interval(self.config.hard_delete_interval());
        hard_delete_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notifier_timer.tick() => self.maybe_initiate_notifications(epoch_ms(), false),
                _ = prune_timer.tick() => self.maybe_prune_old_messages(epoch_ms(), false),
                _ = closed_timer.tick() => self.maybe_delete_closed_messages(epoch_ms(), false),
                _ = hard_delete_timer.tick() => self.maybe_hard_delete_messages(epoch_ms(), false),
                cmd = rx.recv() => {
                    match cmd {
                        None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
            }
        }

        self.storage.flush_pending().await;
        self.archive.flush_pending().await;
    }

    async fn handle_command(&mut self, cmd: Command) {
        let now = epoch_ms();
        match cmd {
            Command::Add(input, reply) => {
                let _ = reply.send(self.add_message(input, now));
            }
            Command::Update(ref_, patch, stealth, reply) => {
                let _ = reply.send(self.update_message(&ref_, patch, stealth, now));
            }
            Command::AddOrUpdate(input, reply) => {
                let _ = reply.send(self.add_or_update_message(input, now));
            }
            Command::Remove(ref_, actor, reply) => {
                let _ = reply.send(self.remove_message(&ref_, actor, now));
            }
            Command::GetByRef(ref_, filter, reply) => {
                let result = self
                    .full_list
                    .iter()
                    .find(|m| m.ref_ == ref_ && filter.matches(m.lifecycle.state))
                    .map(crate::renderer::render);
                let _ = reply.send(result);
            }
            Command::GetAll(reply) => {
                let views = self
                    .full_list
                    .iter()
                    .filter(|m| !m.is_expired_or_deleted())
                    .map(crate::renderer::render)
                    .collect();
                let _ = reply.send(views);
            }
            Command::QueryMessages(query, reply) => {
                let result = crate::query::run(&self.full_list, &query);
                let _ = reply.send(QueryOutput {
                    total: result.total,
                    pages: result.pages,
                    items: result.items.into_iter().map(crate::renderer::render).collect(),
                });
            }
            Command::ExecuteAction(request, reply) => {
                let result = self.execute_action(request, now);
                let _ = reply.send(result);
            }
            Command::RunPrune(force, reply) => {
                self.maybe_prune_old_messages(now, force);
                let _ = reply.send(());
            }
            Command::RunClosedCleanup(force, reply) => {
                self.maybe_delete_closed_messages(now, force);
                let _ = reply.send(());
            }
            Command::RunHardDelete(force, reply) => {
                self.maybe_hard_delete_messages(now, force);
                let _ = reply.send(());
            }
            Command::RunNotifications(force, reply) => {
                self.maybe_initiate_notifications(now, force);
                let _ = reply.send(());
            }
            Command::FlushPending(reply) => {
                self.storage.flush_pending().await;
                self.archive.flush_pending().await;
                let _ = reply.send(());
            }
        }
    }

    fn persist(&self) {
        self.storage.write_json(Arc::new(self.full_list.clone()));
    }

    fn dispatch(&self, event: NotificationEvent, mut messages: Vec<RenderedView>) {
        if messages.is_empty() {
            return;
        }
        for view in &mut messages {
            crate::actions::split_actions_by_lifecycle(view);
        }
        let _ = self.notify_tx.send(NotifyDispatch { event, messages });
    }

    /// Applies a factory patch in place at `idx`, persisting and archiving
    /// on success. Returns the pre/post snapshots so the caller can decide
    /// what (if anything) to dispatch. Never dispatches itself.
    fn apply_patch_raw(
        &mut self,
        idx: usize,
        patch: MessagePatch,
        stealth: bool,
        core_token: Option<&CoreToken>,
        now: i64,
    ) -> Option<(Message, Message)> {
        let existing = self.full_list[idx].clone();
        match crate::factory::apply_patch(&existing, patch, stealth, core_token, now) {
            Ok(updated) => {
                self.full_list[idx] = updated.clone();
                self.persist();
                self.archive.append(
                    &updated.ref_,
                    now,
                    "patch",
                    serde_json::json!({
                        "pre": crate::renderer::render(&existing),
                        "post": crate::renderer::render(&updated),
                    }),
                );
                Some((existing, updated))
            }
            Err(err) => {
                tracing::warn!(ref_ = %existing.ref_, %err, "patch rejected");
                None
            }
        }
    }

    fn after_update_dispatch(&mut self, pre: Message, post: Message, stealth: bool, now: i64) {
        let touched_visible = post.timing.updated_at != pre.timing.updated_at;
        if stealth || !touched_visible {
            return;
        }
        let view = crate::renderer::render(&post);
        if post.lifecycle.state == LifecycleState::Deleted && pre.lifecycle.state != LifecycleState::Deleted {
            self.dispatch(NotificationEvent::Deleted, vec![view]);
        } else if post.lifecycle.state == LifecycleState::Expired && pre.lifecycle.state != LifecycleState::Expired {
            self.dispatch(NotificationEvent::Expired, vec![view]);
        } else {
            self.dispatch(NotificationEvent::Updated, vec![view]);
            if post.timing.notify_at.is_none()
                && post.lifecycle.state == LifecycleState::Open
                && !post.is_expired_or_deleted()
            {
                self.dispatch_due_for(&post.ref_, now);
            }
        }
    }

    fn add_message(&mut self, input: CreateInput, now: i64) -> bool {
        let msg = match crate::factory::create_message(input, now, &self.ref_counter) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(%err, "addMessage rejected");
                return false;
            }
        };

        let existing_idxs: Vec<usize> = self
            .full_list
            .iter()
            .enumerate()
            .filter(|(_, m)| m.ref_ == msg.ref_)
            .map(|(i, _)| i)
            .collect();

        let (event, recovered) = if existing_idxs.is_empty() {
            (NotificationEvent::Added, false)
        } else {
            if !existing_idxs.iter().all(|&i| self.full_list[i].is_quasi_deleted()) {
                tracing::warn!(ref_ = %msg.ref_, "addMessage rejected: duplicate ref in a non-terminal state");
                return false;
            }
            let prev_deleted_at = match existing_idxs
                .iter()
                .map(|&i| &self.full_list[i])
                .max_by_key(|m| m.lifecycle.state_changed_at.unwrap_or(m.timing.updated_at))
            {
                Some(m) => m.lifecycle.state_changed_at.unwrap_or(m.timing.updated_at),
                None => return false,
            };
            let cooldown = msg.timing.cooldown.unwrap_or(0);
            let recovered = now.saturating_sub(prev_deleted_at) <= cooldown;

            for &i in existing_idxs.iter().rev() {
                let old = self.full_list.remove(i);
                self.archive.append(
                    &old.ref_,
                    now,
                    "delete",
                    serde_json::json!({"event": "purgeOnRecreate", "snapshot": old}),
                );
            }
            (if recovered { NotificationEvent::Recovered } else { NotificationEvent::Recreated }, recovered)
        };

        self.archive.append(
            &msg.ref_,
            now,
            "create",
            serde_json::to_value(&msg).unwrap_or(serde_json::Value::Null),
        );
        self.full_list.push(msg.clone());
        self.persist();
        self.dispatch(event, vec![crate::renderer::render(&msg)]);

        if msg.timing.notify_at.is_none() && msg.lifecycle.state == LifecycleState::Open && !recovered {
            self.dispatch_due_for(&msg.ref_, now);
        }
        true
    }

    fn update_message(&mut self, ref_: &str, patch: MessagePatch, stealth: bool, now: i64) -> bool {
        let Some(idx) = self.full_list.iter().position(|m| m.ref_ == ref_) else {
            tracing::warn!(ref_ = %ref_, "updateMessage: not found");
            return false;
        };
        let Some((pre, post)) = self.apply_patch_raw(idx, patch, stealth, None, now) else {
            return false;
        };
        self.after_update_dispatch(pre, post, stealth, now);
        true
    }

    fn add_or_update_message(&mut self, input: CreateInput, now: i64) -> bool {
        let Some(raw_ref) = input.ref_.clone() else {
            return self.add_message(input, now);
        };
        let normalized_ref = match crate::factory::normalize_ref(&raw_ref) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(%err, "addOrUpdateMessage: invalid ref");
                return false;
            }
        };
        let existing_idx =
            self.full_list.iter().position(|m| m.ref_ == normalized_ref && !m.is_quasi_deleted());

        match existing_idx {
            Some(idx) => {
                let patch = match create_input_to_patch(&input) {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::warn!(%err, "addOrUpdateMessage: invalid patch");
                        return false;
                    }
                };
                let Some((pre, post)) = self.apply_patch_raw(idx, patch, false, None, now) else {
                    return false;
                };
                self.after_update_dispatch(pre, post, false, now);
                true
            }
            None => self.add_message(input, now),
        }
    }

    fn remove_message(&mut self, ref_: &str, actor: Option<String>, now: i64) -> bool {
        let Some(idx) = self.full_list.iter().position(|m| m.ref_ == ref_) else {
            return false;
        };
        let token = CoreToken::issue();
        let patch = MessagePatch {
            lifecycle: Patch::Set(LifecyclePatch {
                state: Some(LifecycleState::Deleted),
                state_changed_by: actor.map(Patch::Set).unwrap_or(Patch::Keep),
            }),
            timing: Some(TimingPatch { notify_at: Patch::Clear, ..Default::default() }),
            ..Default::default()
        };
        match self.apply_patch_raw(idx, patch, false, Some(&token), now) {
            Some((_pre, post)) => {
                self.dispatch(NotificationEvent::Deleted, vec![crate::renderer::render(&post)]);
                true
            }
            None => false,
        }
    }

    fn execute_action(&mut self, request: ActionRequest, now: i64) -> Result<bool, HubError> {
        let Some(idx) = self.full_list.iter().position(|m| m.ref_ == request.ref_) else {
            return Err(HubError::NotFound(format!("no message with ref '{}'", request.ref_)));
        };
        let outcome = crate::actions::plan(&self.full_list[idx], &request, now)?;
        match outcome {
            ActionOutcome::Patch(patch) => {
                let token = CoreToken::issue();
                match self.apply_patch_raw(idx, patch, false, Some(&token), now) {
                    Some((pre, post)) => {
                        self.after_update_dispatch(pre, post, false, now);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            ActionOutcome::Remove => Ok(self.remove_message(&request.ref_, request.actor, now)),
            ActionOutcome::NoMutation => Ok(true),
        }
    }

    /// Evaluates and applies notification policy for one `ref`, returning
    /// the view to dispatch if the `due` event actually fires.
    fn evaluate_and_apply_due(&mut self, ref_: &str, now: i64) -> Option<RenderedView> {
        let idx = self.full_list.iter().position(|m| m.ref_ == ref_)?;
        let quiet = self.config.quiet_hours.clone();
        let decision = crate::policy::evaluate_due(&self.full_list[idx], now, &quiet);

        if let Some(pre_patch) = decision.pre_patch {
            let _ = self.apply_patch_raw(idx, pre_patch, true, None, now);
        }

        if decision.dispatch {
            let view = crate::renderer::render(&self.full_list[idx]);
            self.full_list[idx]
                .timing
                .notified_at
                .insert(NotificationEvent::Due.as_str().to_string(), now);
            self.persist();
            let after_patch = crate::policy::after_due_dispatch(&self.full_list[idx], now);
            let _ = self.apply_patch_raw(idx, after_patch, true, None, now);
            Some(view)
        } else {
            if let Some(suppress_patch) = decision.suppress_patch {
                let _ = self.apply_patch_raw(idx, suppress_patch, true, None, now);
            }
            None
        }
    }

    fn dispatch_due_for(&mut self, ref_: &str, now: i64) {
        if let Some(view) = self.evaluate_and_apply_due(ref_, now) {
            self.dispatch(NotificationEvent::Due, vec![view]);
        }
    }

    fn maybe_initiate_notifications(&mut self, now: i64, force: bool) {
        if !force && now - self.last_notifier_poll_at < self.config.notifier_poll_ms as i64 {
            return;
        }
        self.last_notifier_poll_at = now;

        let refs: Vec<String> = self
            .full_list
            .iter()
            .filter(|m| m.timing.notify_at.is_some_and(|t| t <= now))
            .filter(|m| matches!(m.lifecycle.state, LifecycleState::Open | LifecycleState::Snoozed))
            .filter(|m| !m.is_expired_or_deleted())
            .map(|m| m.ref_.clone())
            .collect();

        let mut views = Vec::new();
        for ref_ in &refs {
            if let Some(view) = self.evaluate_and_apply_due(ref_, now) {
                views.push(view);
            }
        }
        self.dispatch(NotificationEvent::Due, views);
    }

    fn maybe_prune_old_messages(&mut self, now: i64, force: bool) {
        if !force && now - self.last_prune_at < self.config.prune_interval_ms as i64 {
            return;
        }
        self.last_prune_at = now;

        let refs: Vec<String> = self
            .full_list
            .iter()
            .filter(|m| m.timing.expires_at.is_some_and(|e| e < now) && !m.is_expired_or_deleted())
            .map(|m| m.ref_.clone())
            .collect();

        let token = CoreToken::issue();
        let mut views = Vec::new();
        for ref_ in &refs {
            let Some(idx) = self.full_list.iter().position(|m| &m.ref_ == ref_) else { continue };
            let patch = MessagePatch {
                lifecycle: Patch::Set(LifecyclePatch {
                    state: Some(LifecycleState::Expired),
                    state_changed_by: Patch::Keep,
                }),
                timing: Some(TimingPatch { notify_at: Patch::Clear, ..Default::default() }),
                ..Default::default()
            };
            if let Some((_pre, post)) = self.apply_patch_raw(idx, patch, true, Some(&token), now) {
                views.push(crate::renderer::render(&post));
            }
        }
        self.dispatch(NotificationEvent::Expired, views);
    }

    fn maybe_delete_closed_messages(&mut self, now: i64, force: bool) {
        if !force && now - self.last_closed_cleanup_at < self.config.closed_cleanup_interval_ms as i64 {
            return;
        }
        self.last_closed_cleanup_at = now;

        let grace = self.config.closed_grace_ms as i64;
        let refs: Vec<String> = self
            .full_list
            .iter()
            .filter(|m| m.lifecycle.state == LifecycleState::Closed)
            .filter(|m| now - m.lifecycle.state_changed_at.unwrap_or(m.timing.updated_at) >= grace)
            .map(|m| m.ref_.clone())
            .collect();

        for ref_ in refs {
            self.remove_message(&ref_, None, now);
        }
    }

    fn maybe_hard_delete_messages(&mut self, now: i64, force: bool) {
        if !force && now - self.last_hard_delete_at < self.config.hard_delete_interval_ms as i64 {
            return;
        }
        if !force && now < self.started_at + self.config.hard_delete_startup_grace_ms as i64 {
            return;
        }
        self.last_hard_delete_at = now;

        let retention = self.config.hard_delete_retention_ms as i64;
        let batch_size = self.config.hard_delete_batch_size;

        let mut candidates: Vec<usize> = self
            .full_list
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_quasi_deleted())
            .filter(|(_, m)| now - m.lifecycle.state_changed_at.unwrap_or(m.timing.updated_at) >= retention)
            .map(|(i, _)| i)
            .collect();
        candidates.sort_unstable_by_key(|&i| {
            self.full_list[i].lifecycle.state_changed_at.unwrap_or(self.full_list[i].timing.updated_at)
        });

        let backlog = candidates.len() > batch_size;
        candidates.truncate(batch_size);
        candidates.sort_unstable_by(|a, b| b.cmp(a));

        for idx in candidates {
            let removed = self.full_list.remove(idx);
            self.archive.append(
                &removed.ref_,
                now,
                "delete",
                serde_json::json!({"event": "purge", "snapshot": removed}),
            );
        }
        self.persist();

        if backlog {
            tracing::info!("hard-delete backlog remains, will continue next pass");
            self.last_hard_delete_at = 0;
        }
    }
}

fn create_input_to_patch(input: &CreateInput) -> Result<MessagePatch, HubError> {
    use crate::constants::Level;
    use crate::patch::AudiencePatch;

    let level = Level::from_i32(input.level)
        .ok_or_else(|| HubError::Validation(format!("invalid level {}", input.level)))?;

    Ok(MessagePatch {
        title: Some(input.title.clone()),
        text: Some(input.text.clone()),
        level: Some(level),
        icon: input.icon.clone().map(Patch::Set).unwrap_or(Patch::Keep),
        details: Patch::Keep,
        audience: input
            .audience
            .clone()
            .map(|a| Patch::Set(AudiencePatch { tags: a.tags.map(Patch::Set).unwrap_or(Patch::Keep), channels: None }))
            .unwrap_or(Patch::Keep),
        lifecycle: Patch::Keep,
        timing: Some(TimingPatch {
            expires_at: input.timing.expires_at.map(Patch::Set).unwrap_or(Patch::Keep),
            notify_at: input.timing.notify_at.map(Patch::Set).unwrap_or(Patch::Keep),
            remind_every: input.timing.remind_every.map(Patch::Set).unwrap_or(Patch::Keep),
            time_budget: input.timing.time_budget.map(Patch::Set).unwrap_or(Patch::Keep),
            cooldown: input.timing.cooldown.map(Patch::Set).unwrap_or(Patch::Keep),
            due_at: input.timing.due_at.map(Patch::Set).unwrap_or(Patch::Keep),
            start_at: input.timing.start_at.map(Patch::Set).unwrap_or(Patch::Keep),
            end_at: input.timing.end_at.map(Patch::Set).unwrap_or(Patch::Keep),
        }),
        metrics: Some(MapPatch::Replace(input.metrics.clone())),
        attachments: Some(AttachmentsPatch::Replace(input.attachments.clone())),
        list_items: Some(MapPatch::Replace(input.list_items.clone())),
        actions: Some(MapPatch::Replace(input.actions.clone())),
        dependencies: Some(ListPatch::Replace(input.dependencies.clone())),
        progress: input
            .progress_percentage
            .map(|p| Patch::Set(ProgressPatch { percentage: Some(p) }))
            .unwrap_or(Patch::Keep),
    })
}
