// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin generic rule runtime (§9 open question: "should a rule layer ship
//! in the core?" — answered yes, minimally; see `DESIGN.md`). A [`Rule`] is
//! a pure function from the current rendered view set to at most one Store
//! mutation; [`RuleTimer`] is the only thing that knows how to poll the
//! Store and apply what a rule decides. Two concrete rules ship as
//! reference implementations: [`threshold`] and [`freshness`].

pub mod freshness;
pub mod threshold;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::factory::CreateInput;
use crate::patch::MessagePatch;
use crate::renderer::RenderedView;
use crate::store::StoreHandle;

/// What a rule wants done this tick, if anything.
pub enum RuleAction {
    None,
    Create(CreateInput),
    Update(String, MessagePatch),
}

/// A pure evaluator: given the current view set, decide on a mutation. A
/// rule must not hold its own Store handle — that would let it bypass the
/// timer's poll cadence and defeat the point of a shared evaluation pass.
pub trait Rule: Send + Sync {
    fn id(&self) -> &str;

    fn evaluate(&self, now: i64, views: &[RenderedView]) -> RuleAction;
}

/// Polls the Store on a fixed interval, runs every registered rule against
/// the same snapshot, and applies whatever each one decides. Rules run in
/// registration order against the *same* snapshot; a rule never sees
/// another rule's mutation from the same tick.
pub struct RuleTimer {
    store: StoreHandle,
    rules: Vec<Box<dyn Rule>>,
    interval: Duration,
}

impl RuleTimer {
    pub fn new(store: StoreHandle, interval: Duration) -> Self {
        Self { store, rules: Vec::new(), interval }
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.run_once().await,
                }
            }
        })
    }

    async fn run_once(&self) {
        let views = self.store.get_messages().await;
        let now = crate::store::epoch_ms();
        for rule in &self.rules {
            match rule.evaluate(now, &views) {
                RuleAction::None => {}
                RuleAction::Create(input) => {
                    self.store.add_message(input).await;
                }
                RuleAction::Update(ref_, patch) => {
                    self.store.update_message(ref_, patch, false).await;
                }
            }
        }
    }
}

/// Shared helper used by both reference rules: is there already a
/// quasi-open alert at `ref_`?
fn has_open_alert(views: &[RenderedView], ref_: &str) -> bool {
    views.iter().any(|v| v.ref_ == ref_ && v.lifecycle_state.is_quasi_open())
}

/// Shared helper: the patch that closes an alert once its condition clears.
fn close_alert_patch() -> MessagePatch {
    use crate::constants::LifecycleState;
    use crate::patch::{LifecyclePatch, Patch};
    MessagePatch {
        lifecycle: Patch::Set(LifecyclePatch { state: Some(LifecycleState::Closed), state_changed_by: Patch::Keep }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timer_runs_registered_rules_against_a_snapshot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (handle, _rx, _join) = crate::store::Store::spawn(crate::config::HubConfig {
            storage_path: dir.path().join("messages.json"),
            archive_dir: dir.path().join("archive"),
            ..Default::default()
        });

        let mut timer = RuleTimer::new(handle.clone(), Duration::from_millis(10));
        timer.add_rule(Box::new(threshold::ThresholdRule::new(threshold::ThresholdConfig {
            id: "temp-high".into(),
            metric_ref: "sensor.status.attic".into(),
            metric_key: "tempC".into(),
            mode: threshold::ThresholdMode::Gt(30.0),
            hysteresis: None,
            min_duration_ms: None,
            alert_ref: "rule.status.attic_hot".into(),
            alert_title: "Attic too hot".into(),
            alert_level: crate::constants::Level::Warning,
        })));

        let cancel = CancellationToken::new();
        let join = timer.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(25)).await;
        cancel.cancel();
        join.await?;

        // No sensor message exists yet, so the rule should have found
        // nothing to evaluate and created no alert.
        assert_eq!(handle.get_messages().await.len(), 0);
        Ok(())
    }
}
