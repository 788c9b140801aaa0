// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A staleness rule: flags a metric that hasn't been refreshed in
//! `max_age_ms` with a companion alert, and clears the alert once a fresh
//! reading arrives. A metric can be driven by either its report timestamp
//! (`ts`) or its last-changed timestamp (`lc`), whichever the metric's
//! producer actually updates on a fresh reading.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::constants::{Kind, Level, OriginType};
use crate::factory::CreateInput;
use crate::message::{Metric, MetricValue, Origin};
use crate::patch::{MessagePatch, MetricsPatch};
use crate::renderer::RenderedView;

use super::{close_alert_patch, has_open_alert, Rule, RuleAction};

/// Which timestamp on the watched metric drives staleness.
#[derive(Debug, Clone, Copy)]
pub enum FreshnessDriver {
    Ts,
    Lc,
}

pub struct FreshnessConfig {
    pub id: String,
    pub metric_ref: String,
    pub metric_key: String,
    pub driver: FreshnessDriver,
    pub max_age_ms: i64,
    pub alert_ref: String,
    pub alert_title: String,
}

struct FreshnessState {
    /// `(ts, lc)` of the metric reading last published to the alert, so a
    /// tick that sees the same reading again doesn't re-publish identical
    /// metrics.
    last_published: Option<(i64, Option<i64>)>,
}

/// Watches `metric_key`'s driving timestamp on the message at `metric_ref`.
/// If it is older than `max_age_ms`, opens an alert at `alert_ref`; a fresh
/// reading closes it exactly once per recovery.
pub struct FreshnessRule {
    config: FreshnessConfig,
    state: Mutex<FreshnessState>,
}

impl FreshnessRule {
    pub fn new(config: FreshnessConfig) -> Self {
        Self { config, state: Mutex::new(FreshnessState { last_published: None }) }
    }

    fn publish_metrics(&self, metric: &Metric, now: i64, recovered_at: Option<i64>) -> IndexMap<String, Metric> {
        let mut metrics = IndexMap::new();
        metrics.insert("state-ts".to_string(), Metric { val: MetricValue::Number(metric.ts as f64), unit: String::new(), ts: now, lc: None });
        if let Some(lc) = metric.lc {
            metrics.insert("state-lc".to_string(), Metric { val: MetricValue::Number(lc as f64), unit: String::new(), ts: now, lc: None });
        }
        metrics.insert("state-value".to_string(), Metric { val: metric.val.clone(), unit: String::new(), ts: now, lc: None });
        metrics.insert(
            "state-name".to_string(),
            Metric { val: MetricValue::Text(self.config.metric_key.clone()), unit: String::new(), ts: now, lc: None },
        );
        if let Some(recovered_at) = recovered_at {
            metrics.insert(
                "state-recovered-at".to_string(),
                Metric { val: MetricValue::Number(recovered_at as f64), unit: String::new(), ts: now, lc: None },
            );
        }
        metrics
    }
}

impl Rule for FreshnessRule {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn evaluate(&self, now: i64, views: &[RenderedView]) -> RuleAction {
        let Some(source) = views.iter().find(|v| v.ref_ == self.config.metric_ref) else {
            return RuleAction::None;
        };
        let Some(metric) = source.metrics.get(&self.config.metric_key) else {
            return RuleAction::None;
        };

        let driven_at = match self.config.driver {
            FreshnessDriver::Ts => metric.ts,
            FreshnessDriver::Lc => metric.lc.unwrap_or(metric.ts),
        };
        let age = now - driven_at;
        let stale = age > self.config.max_age_ms;
        let open = has_open_alert(views, &self.config.alert_ref);

        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        let reading = (metric.ts, metric.lc);
        let changed = state.last_published != Some(reading);

        match (stale, open) {
            (true, false) => {
                state.last_published = Some(reading);
                RuleAction::Create(CreateInput {
                    ref_: Some(self.config.alert_ref.clone()),
                    title: self.config.alert_title.clone(),
                    text: format!("{} has not reported in {age}ms", self.config.metric_key),
                    level: Level::Warning.as_i32(),
                    kind: Kind::Status,
                    origin: Origin { origin_type: OriginType::Automation, system: Some("rules".into()), id: Some(self.config.id.clone()) },
                    metrics: self.publish_metrics(metric, now, None),
                    ..Default::default()
                })
            }
            (true, true) if changed => {
                state.last_published = Some(reading);
                let patch = MessagePatch {
                    metrics: Some(MetricsPatch::SetDelete { set: self.publish_metrics(metric, now, None), delete: Vec::new() }),
                    ..Default::default()
                };
                RuleAction::Update(self.config.alert_ref.clone(), patch)
            }
            (false, true) => {
                state.last_published = Some(reading);
                let mut patch = close_alert_patch();
                patch.metrics =
                    Some(MetricsPatch::SetDelete { set: self.publish_metrics(metric, now, Some(now)), delete: Vec::new() });
                RuleAction::Update(self.config.alert_ref.clone(), patch)
            }
            _ => RuleAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Kind as MsgKind;
    use crate::message::{Lifecycle, Message, Metric as MsgMetric, Origin as MsgOrigin, Timing};

    fn sensor_view(ts: i64, lc: Option<i64>) -> RenderedView {
        let mut metrics = IndexMap::new();
        metrics.insert("battery".to_string(), MsgMetric { val: MetricValue::Number(80.0), unit: "%".into(), ts, lc });
        let msg = Message {
            ref_: "sensor.status.frontdoor".into(),
            title: "Front door".into(),
            text: "".into(),
            icon: None,
            level: Level::None,
            kind: MsgKind::Status,
            origin: MsgOrigin { origin_type: OriginType::Automation, system: Some("sensors".into()), id: None },
            lifecycle: Lifecycle::default(),
            timing: Timing { created_at: 0, updated_at: 0, ..Default::default() },
            details: None,
            metrics,
            attachments: Vec::new(),
            list_items: Default::default(),
            actions: Default::default(),
            progress: None,
            audience: None,
            dependencies: Vec::new(),
        };
        crate::renderer::render(&msg)
    }

    fn rule(driver: FreshnessDriver) -> FreshnessRule {
        FreshnessRule::new(FreshnessConfig {
            id: "frontdoor-stale".into(),
            metric_ref: "sensor.status.frontdoor".into(),
            metric_key: "battery".into(),
            driver,
            max_age_ms: 60_000,
            alert_ref: "rule.status.frontdoor_stale".into(),
            alert_title: "Front door sensor offline".into(),
        })
    }

    #[test]
    fn stale_reading_creates_alert() {
        let views = vec![sensor_view(0, None)];
        let action = rule(FreshnessDriver::Ts).evaluate(120_000, &views);
        assert!(matches!(action, RuleAction::Create(ref input) if input.metrics.contains_key("state-ts")));
    }

    #[test]
    fn fresh_reading_is_a_no_op() {
        let views = vec![sensor_view(119_000, None)];
        let action = rule(FreshnessDriver::Ts).evaluate(120_000, &views);
        assert!(matches!(action, RuleAction::None));
    }

    #[test]
    fn fresh_reading_closes_open_alert_with_recovered_at() -> anyhow::Result<()> {
        let mut alert = sensor_view(119_000, None);
        alert.ref_ = "rule.status.frontdoor_stale".into();
        let views = vec![sensor_view(119_000, None), alert];
        let action = rule(FreshnessDriver::Ts).evaluate(120_000, &views);
        let RuleAction::Update(ref_, patch) = action else {
            return Err(anyhow::anyhow!("expected an update"));
        };
        assert_eq!(ref_, "rule.status.frontdoor_stale");
        let Some(MetricsPatch::SetDelete { set, .. }) = patch.metrics else {
            return Err(anyhow::anyhow!("expected a metrics patch"));
        };
        assert!(set.contains_key("state-recovered-at"));
        Ok(())
    }

    #[test]
    fn lc_driver_uses_last_changed_instead_of_report_time() {
        // Reported recently (ts is fresh) but hasn't actually changed value
        // in a long time (lc is stale): the lc driver must flag it.
        let views = vec![sensor_view(119_999, Some(0))];
        let action = rule(FreshnessDriver::Lc).evaluate(120_000, &views);
        assert!(matches!(action, RuleAction::Create(_)));
    }

    #[test]
    fn missing_source_message_is_a_no_op() {
        let action = rule(FreshnessDriver::Ts).evaluate(0, &[]);
        assert!(matches!(action, RuleAction::None));
    }
}
