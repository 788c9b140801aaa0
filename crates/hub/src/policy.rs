// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification Policy (§4.5): runs per-message immediately before a `due`
//! dispatch. Snooze elapses, quiet hours are enforced for repeat dues, and
//! the reminder cadence is rescheduled after a successful dispatch.
//!
//! Every adjustment here is applied as a stealth patch by the Store — the
//! policy itself never touches storage or the message list directly.

use rand::Rng;

use crate::config::QuietHoursConfig;
use crate::constants::{LifecycleState, NotificationEvent};
use crate::message::Message;
use crate::patch::{LifecyclePatch, MessagePatch, Patch, TimingPatch};

/// What the Store should do with a message about to be dispatched for
/// `due`.
#[derive(Debug, Clone, Default)]
pub struct DueDecision {
    /// Stealth patch to apply before evaluating whether to dispatch (snooze
    /// elapse). `None` if nothing changes.
    pub pre_patch: Option<MessagePatch>,
    /// Whether the event should actually go out to the Notify Host.
    pub dispatch: bool,
    /// Stealth patch to apply when `dispatch` is `false` (quiet-hours
    /// reschedule).
    pub suppress_patch: Option<MessagePatch>,
}

/// Evaluates the due-dispatch rules against `msg` at `now`.
pub fn evaluate_due(msg: &Message, now: i64, quiet: &QuietHoursConfig) -> DueDecision {
    let mut decision = DueDecision { dispatch: true, ..Default::default() };

    if msg.lifecycle.state == LifecycleState::Snoozed {
        decision.pre_patch = Some(MessagePatch {
            lifecycle: Patch::Set(LifecyclePatch {
                state: Some(LifecycleState::Open),
                state_changed_by: Patch::Keep,
            }),
            ..Default::default()
        });
    }

    let is_repeat = msg.timing.notified_at.contains_key(NotificationEvent::Due.as_str());
    if is_repeat
        && quiet.enabled
        && msg.level.as_i32() <= quiet.max_level
        && is_in_quiet_window(minute_of_day(now), quiet.start_min, quiet.end_min)
    {
        let spread = if quiet.spread_ms > 0 { rand::rng().random_range(0..=quiet.spread_ms) } else { 0 };
        let reschedule_at = next_window_end_ms(now, quiet.end_min) + spread as i64;
        decision.dispatch = false;
        decision.suppress_patch = Some(MessagePatch {
            timing: Some(TimingPatch { notify_at: Patch::Set(reschedule_at), ..Default::default() }),
            ..Default::default()
        });
    }

    decision
}

/// After a successful `due` dispatch: reschedule for the next reminder, or
/// clear `notifyAt` for a one-shot message (§4.5).
pub fn after_due_dispatch(msg: &Message, now: i64) -> MessagePatch {
    let notify_at = match msg.timing.remind_every {
        Some(interval) if interval > 0 => Patch::Set(now + interval),
        _ => Patch::Clear,
    };
    MessagePatch { timing: Some(TimingPatch { notify_at, ..Default::default() }), ..Default::default() }
}

fn minute_of_day(ms: i64) -> u32 {
    (ms.rem_euclid(86_400_000) / 60_000) as u32
}

/// Whether `minute` falls inside `[start, end)`, wrapping across midnight
/// when `start > end`.
fn is_in_quiet_window(minute: u32, start: u32, end: u32) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        (start..end).contains(&minute)
    } else {
        minute >= start || minute < end
    }
}

/// The next epoch-ms instant at or after `now` at which the quiet window
/// ends (`end_min` minutes past UTC midnight, rolling to the next day if
/// that instant has already passed today).
fn next_window_end_ms(now: i64, end_min: u32) -> i64 {
    let day_start = now - now.rem_euclid(86_400_000);
    let end_today = day_start + end_min as i64 * 60_000;
    if end_today > now {
        end_today
    } else {
        end_today + 86_400_000
    }
}
