// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalization and validation gate (§4.1). `create_message` and
//! `apply_patch` are the only two ways a [`crate::message::Message`] is
//! ever produced or mutated — the Store never constructs or edits one by
//! hand.
//!
//! The factory holds no state of its own (§3 "Ownership"): the monotonic
//! ref-disambiguation counter is owned by the Store and passed in
//! explicitly, exactly the way `coopmux`'s background tasks are handed a
//! `config`/`cancel` rather than reaching into ambient globals.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::constants::{Kind, Level, LifecycleState, OriginType};
use crate::error::HubError;
use crate::message::{
    is_plausible_timestamp, ActionDef, Attachment, Audience, AudienceChannels, Details, ListItem,
    Message, Metric, MetricValue, Origin, Progress, Timing,
};
use crate::patch::{
    AttachmentsPatch, ListPatch, MapPatch, MessagePatch, Patch, ProgressPatch,
};
use crate::token::CoreToken;

/// Input accepted by [`create_message`]. Core-managed fields
/// (`lifecycle.stateChangedAt`, `progress.startedAt/finishedAt`,
/// `timing.createdAt/updatedAt`, and the terminal lifecycle states) simply
/// have no place in this type, so a producer cannot supply them even by
/// mistake — the factory doesn't need to strip what the shape never
/// accepted.
#[derive(Debug, Clone, Default)]
pub struct CreateInput {
    pub ref_: Option<String>,
    pub title: String,
    pub text: String,
    pub icon: Option<String>,
    pub level: i32,
    pub kind: Kind,
    pub origin: Origin,
    /// Initial lifecycle state; only non-terminal states are accepted.
    pub initial_state: Option<LifecycleState>,
    pub timing: CreateTiming,
    pub details: Option<Details>,
    pub metrics: IndexMap<String, Metric>,
    pub attachments: Vec<Attachment>,
    pub list_items: IndexMap<String, ListItem>,
    pub actions: IndexMap<String, ActionDef>,
    pub progress_percentage: Option<u8>,
    pub audience: Option<Audience>,
    pub dependencies: Vec<String>,
}

impl Default for Origin {
    fn default() -> Self {
        Self { origin_type: OriginType::Manual, system: None, id: None }
    }
}

/// The subset of [`crate::message::Timing`] a producer may set on create.
#[derive(Debug, Clone, Default)]
pub struct CreateTiming {
    pub expires_at: Option<i64>,
    pub notify_at: Option<i64>,
    pub remind_every: Option<i64>,
    pub time_budget: Option<i64>,
    pub cooldown: Option<i64>,
    pub due_at: Option<i64>,
    pub start_at: Option<i64>,
    pub end_at: Option<i64>,
}

/// §3: deterministic up to the monotonic sub-ms token.
pub fn generate_ref(origin: &Origin, kind: Kind, title: &str, counter: &AtomicU64) -> String {
    let origin_type = match origin.origin_type {
        OriginType::Manual => "manual",
        OriginType::Import => "import",
        OriginType::Automation => "automation",
    };
    let kind_str = match kind {
        Kind::Task => "task",
        Kind::Status => "status",
        Kind::Appointment => "appointment",
        Kind::ShoppingList => "shoppinglist",
        Kind::InventoryList => "inventorylist",
    };
    let system = origin.system.as_deref().unwrap_or("");
    let disambiguator = origin.id.clone().unwrap_or_else(|| slugify(title));
    let token = counter.fetch_add(1, Ordering::Relaxed);
    let base = format!("{origin_type}.{kind_str}.{system}.{disambiguator}");
    format!("{}-{token}", percent_encode_ascii(&base))
}

fn slugify(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// Percent-encode everything outside the URL-safe unreserved set
/// (`A-Za-z0-9-_.~`); dots between segments are left alone so refs stay
/// legible.
fn percent_encode_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Normalize a producer-supplied `ref`: non-empty, printable-ASCII,
/// URL-safe.
pub(crate) fn normalize_ref(raw: &str) -> Result<String, HubError> {
    if raw.is_empty() {
        return Err(HubError::Validation("ref must not be empty".into()));
    }
    if !raw.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Err(HubError::Validation("ref must be printable ASCII".into()));
    }
    Ok(percent_encode_ascii(raw))
}

/// §4.1 `createMessage`.
pub fn create_message(
    input: CreateInput,
    now: i64,
    ref_counter: &AtomicU64,
) -> Result<Message, HubError> {
    if input.title.is_empty() {
        return Err(HubError::Validation("title must not be empty".into()));
    }
    if input.text.is_empty() {
        return Err(HubError::Validation("text must not be empty".into()));
    }
    let level = Level::from_i32(input.level)
        .ok_or_else(|| HubError::Validation(format!("invalid level {}", input.level)))?;

    let state = input.initial_state.unwrap_or(LifecycleState::Open);
    if state.is_terminal() {
        return Err(HubError::Validation(
            "producers may not set a terminal lifecycle state on create".into(),
        ));
    }

    let ref_ = match input.ref_ {
        Some(r) => normalize_ref(&r)?,
        None => generate_ref(&input.origin, input.kind, &input.title, ref_counter),
    };

    for ts in [
        input.timing.expires_at,
        input.timing.notify_at,
        input.timing.due_at,
        input.timing.start_at,
        input.timing.end_at,
    ]
    .into_iter()
    .flatten()
    {
        if !is_plausible_timestamp(ts) {
            return Err(HubError::Validation(format!("implausible timestamp {ts}")));
        }
    }
    for dur in [input.timing.remind_every, input.timing.time_budget, input.timing.cooldown]
        .into_iter()
        .flatten()
    {
        if dur < 0 {
            return Err(HubError::Validation("durations must be non-negative".into()));
        }
    }

    for metric in input.metrics.values() {
        validate_metric(metric)?;
    }

    let progress = input.progress_percentage.map(|p| {
        if p > 0 {
            Progress { percentage: p, started_at: Some(now), finished_at: finished_at_for(p, now) }
        } else {
            Progress { percentage: 0, started_at: None, finished_at: None }
        }
    });
    if let Some(ref p) = progress {
        if p.percentage > 100 {
            return Err(HubError::Validation("progress.percentage must be <= 100".into()));
        }
    }

    let details = input.details.filter(|d| !d.is_empty());

    Ok(Message {
        ref_,
        title: input.title,
        text: input.text,
        icon: input.icon,
        level,
        kind: input.kind,
        origin: input.origin,
        lifecycle: crate::message::Lifecycle { state, state_changed_at: None, state_changed_by: None },
        timing: Timing {
            created_at: now,
            updated_at: now,
            expires_at: input.timing.expires_at,
            notify_at: input.timing.notify_at,
            remind_every: input.timing.remind_every,
            time_budget: input.timing.time_budget,
            cooldown: input.timing.cooldown,
            due_at: input.timing.due_at,
            start_at: input.timing.start_at,
            end_at: input.timing.end_at,
            notified_at: IndexMap::new(),
        },
        details,
        metrics: input.metrics,
        attachments: input.attachments,
        list_items: input.list_items,
        actions: input.actions,
        progress,
        audience: input.audience,
        dependencies: dedup_preserve_order(input.dependencies),
    })
}

fn finished_at_for(percentage: u8, now: i64) -> Option<i64> {
    if percentage == 100 {
        Some(now)
    } else {
        None
    }
}

fn validate_metric(metric: &Metric) -> Result<(), HubError> {
    if !metric.val.is_plausible() {
        return Err(HubError::Validation("metric value must be finite".into()));
    }
    if metric.unit.is_empty() {
        return Err(HubError::Validation("metric unit must not be empty".into()));
    }
    if !is_plausible_timestamp(metric.ts) {
        return Err(HubError::Validation(format!("implausible metric timestamp {}", metric.ts)));
    }
    if let Some(lc) = metric.lc {
        if !is_plausible_timestamp(lc) {
            return Err(HubError::Validation(format!("implausible metric lc timestamp {lc}")));
        }
    }
    Ok(())
}

fn dedup_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// §4.1 `applyPatch`. `core_token` must be `Some` to reach `deleted` or
/// `expired`; `stealth` suppresses the `updatedAt` bump and is only ever
/// requested by the Store itself (never by a plugin).
pub fn apply_patch(
    existing: &Message,
    patch: MessagePatch,
    stealth: bool,
    core_token: Option<&CoreToken>,
    now: i64,
) -> Result<Message, HubError> {
    let mut m = existing.clone();
    let mut touched_visible = false;

    if let Some(title) = patch.title {
        if title.is_empty() {
            return Err(HubError::Validation("title must not be empty".into()));
        }
        m.title = title;
        touched_visible = true;
    }
    if let Some(text) = patch.text {
        if text.is_empty() {
            return Err(HubError::Validation("text must not be empty".into()));
        }
        m.text = text;
        touched_visible = true;
    }
    if let Some(level) = patch.level {
        m.level = level;
        touched_visible = true;
    }
    match patch.icon {
        Patch::Keep => {}
        Patch::Clear => {
            m.icon = None;
            touched_visible = true;
        }
        Patch::Set(v) => {
            m.icon = Some(v);
            touched_visible = true;
        }
    }

    apply_details_patch(&mut m, patch.details, &mut touched_visible)?;
    apply_audience_patch(&mut m, patch.audience, &mut touched_visible);
    apply_lifecycle_patch(&mut m, patch.lifecycle, core_token, now, &mut touched_visible)?;
    if let Some(tp) = patch.timing {
        apply_timing_patch(&mut m, tp, &mut touched_visible)?;
    }
    if let Some(mp) = patch.metrics {
        apply_metrics_patch(&mut m, mp)?;
    }
    if let Some(ap) = patch.attachments {
        apply_attachments_patch(&mut m, ap);
        touched_visible = true;
    }
    if let Some(lp) = patch.list_items {
        apply_map_patch(&mut m.list_items, lp);
        touched_visible = true;
    }
    if let Some(ap) = patch.actions {
        apply_map_patch(&mut m.actions, ap);
        touched_visible = true;
    }
    if let Some(dp) = patch.dependencies {
        apply_dependencies_patch(&mut m, dp);
        touched_visible = true;
    }
    apply_progress_patch(&mut m, patch.progress, now, &mut touched_visible)?;

    if !stealth && touched_visible {
        m.timing.updated_at = now;
    }

    Ok(m)
}

fn apply_details_patch(
    m: &mut Message,
    patch: Patch<crate::patch::DetailsPatch>,
    touched: &mut bool,
) -> Result<(), HubError> {
    match patch {
        Patch::Keep => Ok(()),
        Patch::Clear => {
            m.details = None;
            *touched = true;
            Ok(())
        }
        Patch::Set(dp) => {
            let mut details = m.details.clone().unwrap_or_default();
            apply_scalar(&mut details.location, dp.location);
            apply_scalar(&mut details.task, dp.task);
            apply_scalar(&mut details.reason, dp.reason);
            apply_scalar(&mut details.tools, dp.tools);
            apply_scalar(&mut details.consumables, dp.consumables);
            m.details = if details.is_empty() { None } else { Some(details) };
            *touched = true;
            Ok(())
        }
    }
}

fn apply_scalar<T>(slot: &mut Option<T>, patch: Patch<T>) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => *slot = None,
        Patch::Set(v) => *slot = Some(v),
    }
}

fn apply_audience_patch(
    m: &mut Message,
    patch: Patch<crate::patch::AudiencePatch>,
    touched: &mut bool,
) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => {
            m.audience = None;
            *touched = true;
        }
        Patch::Set(ap) => {
            let mut audience = m.audience.clone().unwrap_or_default();
            apply_scalar(&mut audience.tags, ap.tags);
            if let Some(cp) = ap.channels {
                apply_scalar(&mut audience.channels.include, cp.include);
                apply_scalar(&mut audience.channels.exclude, cp.exclude);
            }
            m.audience = Some(audience);
            *touched = true;
        }
    }
}

fn apply_lifecycle_patch(
    m: &mut Message,
    patch: Patch<crate::patch::LifecyclePatch>,
    core_token: Option<&CoreToken>,
    now: i64,
    touched: &mut bool,
) -> Result<(), HubError> {
    match patch {
        Patch::Keep => Ok(()),
        Patch::Clear => {
            if m.lifecycle.state != LifecycleState::Open {
                m.lifecycle.state = LifecycleState::Open;
                m.lifecycle.state_changed_at = Some(now);
            }
            m.lifecycle.state_changed_by = None;
            *touched = true;
            Ok(())
        }
        Patch::Set(lp) => {
            if let Some(new_state) = lp.state {
                if new_state != m.lifecycle.state {
                    if new_state.is_terminal() && core_token.is_none() {
                        return Err(HubError::Validation(format!(
                            "lifecycle state {new_state:?} requires a core token"
                        )));
                    }
                    if !m.lifecycle.state.can_transition_to(new_state) {
                        return Err(HubError::Validation(format!(
                            "illegal lifecycle transition {:?} -> {new_state:?}",
                            m.lifecycle.state
                        )));
                    }
                    m.lifecycle.state = new_state;
                    m.lifecycle.state_changed_at = Some(now);
                }
            }
            apply_scalar(&mut m.lifecycle.state_changed_by, lp.state_changed_by);
            *touched = true;
            Ok(())
        }
    }
}

fn apply_timing_patch(
    m: &mut Message,
    patch: crate::patch::TimingPatch,
    touched: &mut bool,
) -> Result<(), HubError> {
    apply_timestamp_field(&mut m.timing.expires_at, patch.expires_at, touched)?;
    apply_timestamp_field(&mut m.timing.notify_at, patch.notify_at, touched)?;
    apply_timestamp_field(&mut m.timing.due_at, patch.due_at, touched)?;
    apply_timestamp_field(&mut m.timing.start_at, patch.start_at, touched)?;
    apply_timestamp_field(&mut m.timing.end_at, patch.end_at, touched)?;
    apply_duration_field(&mut m.timing.remind_every, patch.remind_every, touched)?;
    apply_duration_field(&mut m.timing.time_budget, patch.time_budget, touched)?;
    apply_duration_field(&mut m.timing.cooldown, patch.cooldown, touched)?;
    Ok(())
}

fn apply_timestamp_field(
    slot: &mut Option<i64>,
    patch: Patch<i64>,
    touched: &mut bool,
) -> Result<(), HubError> {
    match patch {
        Patch::Keep => Ok(()),
        Patch::Clear => {
            *slot = None;
            *touched = true;
            Ok(())
        }
        Patch::Set(v) => {
            if !is_plausible_timestamp(v) {
                return Err(HubError::Validation(format!("implausible timestamp {v}")));
            }
            *slot = Some(v);
            *touched = true;
            Ok(())
        }
    }
}

fn apply_duration_field(
    slot: &mut Option<i64>,
    patch: Patch<i64>,
    touched: &mut bool,
) -> Result<(), HubError> {
    match patch {
        Patch::Keep => Ok(()),
        Patch::Clear => {
            *slot = None;
            *touched = true;
            Ok(())
        }
        Patch::Set(v) => {
            if v < 0 {
                return Err(HubError::Validation("durations must be non-negative".into()));
            }
            *slot = Some(v);
            *touched = true;
            Ok(())
        }
    }
}

fn apply_metrics_patch(m: &mut Message, patch: MapPatch<Metric>) -> Result<(), HubError> {
    match patch {
        MapPatch::Replace(map) => {
            for metric in map.values() {
                validate_metric(metric)?;
            }
            m.metrics = map;
        }
        MapPatch::SetDelete { set, delete } => {
            for metric in set.values() {
                validate_metric(metric)?;
            }
            for (k, v) in set {
                m.metrics.insert(k, v);
            }
            for k in delete {
                m.metrics.shift_remove(&k);
            }
        }
    }
    Ok(())
}

fn apply_attachments_patch(m: &mut Message, patch: AttachmentsPatch) {
    match patch {
        AttachmentsPatch::Replace(v) => m.attachments = v,
        AttachmentsPatch::SetDelete { set, mut delete } => {
            for (idx, attachment) in set {
                if idx < m.attachments.len() {
                    m.attachments[idx] = attachment;
                } else {
                    m.attachments.push(attachment);
                }
            }
            // Descending order so earlier removals don't shift later indices.
            delete.sort_unstable_by(|a, b| b.cmp(a));
            delete.dedup();
            for idx in delete {
                if idx < m.attachments.len() {
                    m.attachments.remove(idx);
                }
            }
        }
    }
}

fn apply_map_patch<V: Clone>(target: &mut IndexMap<String, V>, patch: MapPatch<V>) {
    match patch {
        MapPatch::Replace(map) => *target = map,
        MapPatch::SetDelete { set, delete } => {
            for (k, v) in set {
                target.insert(k, v);
            }
            for k in delete {
                target.shift_remove(&k);
            }
        }
    }
}

fn apply_dependencies_patch(m: &mut Message, patch: ListPatch<String>) {
    match patch {
        ListPatch::Replace(v) => m.dependencies = dedup_preserve_order(v),
        ListPatch::SetDelete { set, delete } => {
            let mut deps = m.dependencies.clone();
            deps.extend(set);
            deps.retain(|d| !delete.contains(d));
            m.dependencies = dedup_preserve_order(deps);
        }
    }
}

fn apply_progress_patch(
    m: &mut Message,
    patch: Patch<ProgressPatch>,
    now: i64,
    touched: &mut bool,
) -> Result<(), HubError> {
    match patch {
        Patch::Keep => Ok(()),
        Patch::Clear => {
            let started_at = m.progress.as_ref().and_then(|p| p.started_at);
            m.progress = Some(Progress { percentage: 0, started_at, finished_at: None });
            *touched = true;
            Ok(())
        }
        Patch::Set(pp) => {
            let Some(pct) = pp.percentage else { return Ok(()) };
            if pct > 100 {
                return Err(HubError::Validation("progress.percentage must be <= 100".into()));
            }
            let mut progress = m.progress.clone().unwrap_or_default();
            if pct > 0 && progress.started_at.is_none() {
                progress.started_at = Some(now);
            }
            progress.finished_at = if pct == 100 { Some(now) } else { None };
            progress.percentage = pct;
            m.progress = Some(progress);
            *touched = true;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OriginType;

    fn base_input() -> CreateInput {
        CreateInput {
            ref_: None,
            title: "Take out trash".into(),
            text: "bins go out tonight".into(),
            level: 10,
            kind: Kind::Task,
            origin: Origin { origin_type: OriginType::Manual, system: None, id: None },
            ..Default::default()
        }
    }

    #[test]
    fn create_rejects_empty_title() {
        let mut input = base_input();
        input.title = String::new();
        let counter = AtomicU64::new(0);
        let result = create_message(input, 1_700_000_000_000, &counter);
        assert!(matches!(result, Err(HubError::Validation(_))));
    }

    #[test]
    fn create_rejects_invalid_level() {
        let mut input = base_input();
        input.level = 15;
        let counter = AtomicU64::new(0);
        let result = create_message(input, 1_700_000_000_000, &counter);
        assert!(matches!(result, Err(HubError::Validation(_))));
    }

    #[test]
    fn create_rejects_terminal_initial_state() {
        let mut input = base_input();
        input.initial_state = Some(LifecycleState::Deleted);
        let counter = AtomicU64::new(0);
        let result = create_message(input, 1_700_000_000_000, &counter);
        assert!(matches!(result, Err(HubError::Validation(_))));
    }

    #[test]
    fn auto_ref_shares_base_but_disambiguates_by_token() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let a = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let b = create_message(base_input(), 1_700_000_000_000, &counter)?;
        assert_ne!(a.ref_, b.ref_);
        let a_base = a.ref_.rsplit_once('-').map(|(base, _)| base.to_owned());
        let b_base = b.ref_.rsplit_once('-').map(|(base, _)| base.to_owned());
        assert_eq!(a_base, b_base);
        Ok(())
    }

    #[test]
    fn explicit_ref_is_normalized() -> anyhow::Result<()> {
        let mut input = base_input();
        input.ref_ = Some("my ref".into());
        let counter = AtomicU64::new(0);
        let msg = create_message(input, 1_700_000_000_000, &counter)?;
        assert_eq!(msg.ref_, "my%20ref");
        Ok(())
    }

    #[test]
    fn patch_title_bumps_updated_at() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let msg = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let patch = MessagePatch { title: Some("Take out recycling".into()), ..Default::default() };
        let updated = apply_patch(&msg, patch, false, None, 1_700_000_060_000)?;
        assert_eq!(updated.title, "Take out recycling");
        assert_eq!(updated.timing.updated_at, 1_700_000_060_000);
        Ok(())
    }

    #[test]
    fn stealth_patch_never_bumps_updated_at() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let msg = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let patch = MessagePatch { title: Some("Renamed".into()), ..Default::default() };
        let updated = apply_patch(&msg, patch, true, None, 1_700_000_060_000)?;
        assert_eq!(updated.timing.updated_at, msg.timing.updated_at);
        Ok(())
    }

    #[test]
    fn metrics_only_patch_does_not_bump_updated_at() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let msg = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let mut metrics = IndexMap::new();
        metrics.insert(
            "temp".to_string(),
            Metric { val: MetricValue::Number(21.0), unit: "C".into(), ts: 1_700_000_060_000, lc: None },
        );
        let patch = MessagePatch {
            metrics: Some(MapPatch::Replace(metrics)),
            ..Default::default()
        };
        let updated = apply_patch(&msg, patch, false, None, 1_700_000_060_000)?;
        assert_eq!(updated.timing.updated_at, msg.timing.updated_at);
        Ok(())
    }

    #[test]
    fn deleted_state_requires_core_token() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let msg = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let patch = MessagePatch {
            lifecycle: Patch::Set(crate::patch::LifecyclePatch {
                state: Some(LifecycleState::Deleted),
                state_changed_by: Patch::Keep,
            }),
            ..Default::default()
        };
        let result = apply_patch(&msg, patch.clone(), false, None, 1_700_000_060_000);
        assert!(matches!(result, Err(HubError::Validation(_))));

        let token = CoreToken::issue();
        let updated = apply_patch(&msg, patch, false, Some(&token), 1_700_000_060_000)?;
        assert_eq!(updated.lifecycle.state, LifecycleState::Deleted);
        assert_eq!(updated.lifecycle.state_changed_at, Some(1_700_000_060_000));
        Ok(())
    }

    #[test]
    fn closed_message_can_be_soft_deleted_with_core_token() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let msg = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let close = MessagePatch {
            lifecycle: Patch::Set(crate::patch::LifecyclePatch {
                state: Some(LifecycleState::Closed),
                state_changed_by: Patch::Keep,
            }),
            ..Default::default()
        };
        let token = CoreToken::issue();
        let closed = apply_patch(&msg, close, false, Some(&token), 1_700_000_060_000)?;
        assert_eq!(closed.lifecycle.state, LifecycleState::Closed);

        let delete = MessagePatch {
            lifecycle: Patch::Set(crate::patch::LifecyclePatch {
                state: Some(LifecycleState::Deleted),
                state_changed_by: Patch::Keep,
            }),
            ..Default::default()
        };
        let deleted = apply_patch(&closed, delete, false, Some(&token), 1_700_000_120_000)?;
        assert_eq!(deleted.lifecycle.state, LifecycleState::Deleted);
        Ok(())
    }

    #[test]
    fn progress_transition_sets_started_and_finished() -> anyhow::Result<()> {
        let counter = AtomicU64::new(0);
        let msg = create_message(base_input(), 1_700_000_000_000, &counter)?;
        let patch = MessagePatch {
            progress: Patch::Set(ProgressPatch { percentage: Some(50) }),
            ..Default::default()
        };
        let updated = apply_patch(&msg, patch, false, None, 1_700_000_060_000)?;
        let progress = updated.progress.clone().ok_or_else(|| anyhow::anyhow!("missing progress"))?;
        assert_eq!(progress.percentage, 50);
        assert_eq!(progress.started_at, Some(1_700_000_060_000));
        assert_eq!(progress.finished_at, None);

        let patch2 = MessagePatch {
            progress: Patch::Set(ProgressPatch { percentage: Some(100) }),
            ..Default::default()
        };
        let done = apply_patch(&updated, patch2, false, None, 1_700_000_120_000)?;
        let progress = done.progress.ok_or_else(|| anyhow::anyhow!("missing progress"))?;
        assert_eq!(progress.started_at, Some(1_700_000_060_000));
        assert_eq!(progress.finished_at, Some(1_700_000_120_000));
        Ok(())
    }

    #[test]
    fn attachment_delete_applies_in_descending_order() -> anyhow::Result<()> {
        let mut input = base_input();
        input.attachments = vec![
            Attachment { attachment_type: "photo".into(), value: serde_json::json!("a") },
            Attachment { attachment_type: "photo".into(), value: serde_json::json!("b") },
            Attachment { attachment_type: "photo".into(), value: serde_json::json!("c") },
        ];
        let counter = AtomicU64::new(0);
        let msg = create_message(input, 1_700_000_000_000, &counter)?;
        let patch = MessagePatch {
            attachments: Some(AttachmentsPatch::SetDelete { set: vec![], delete: vec![0, 2] }),
            ..Default::default()
        };
        let updated = apply_patch(&msg, patch, false, None, 1_700_000_060_000)?;
        assert_eq!(updated.attachments.len(), 1);
        assert_eq!(updated.attachments[0].value, serde_json::json!("b"));
        Ok(())
    }
}
