// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A metric-threshold rule: watches one metric on one message and
//! opens/closes a companion alert message as the value crosses a
//! configured bound. Publishes the metric's current value and the
//! configured bound(s) onto the alert itself so a notify plugin can
//! render them without re-reading the source message.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::constants::{Kind, Level, OriginType};
use crate::factory::CreateInput;
use crate::message::{Metric, MetricValue, Origin};
use crate::patch::{MessagePatch, MetricsPatch};
use crate::renderer::RenderedView;

use super::{close_alert_patch, has_open_alert, Rule, RuleAction};

/// The comparison a threshold rule opens an alert on. `Lt`/`Gt` carry the
/// single bound being checked; `Inside`/`Outside` carry a `[min, max]`
/// range. `Truthy`/`Falsy` treat the metric as a boolean regardless of its
/// stored representation.
#[derive(Debug, Clone, Copy)]
pub enum ThresholdMode {
    Lt(f64),
    Gt(f64),
    Inside(f64, f64),
    Outside(f64, f64),
    Truthy,
    Falsy,
}

pub struct ThresholdConfig {
    pub id: String,
    pub metric_ref: String,
    pub metric_key: String,
    pub mode: ThresholdMode,
    /// Widens the boundary an already-open alert must cross back over to
    /// be considered recovered, so a value oscillating right at the edge
    /// doesn't flap the alert open and closed.
    pub hysteresis: Option<f64>,
    /// A breach must persist continuously for this long before the alert
    /// actually opens. Has no effect on closing once open.
    pub min_duration_ms: Option<i64>,
    pub alert_ref: String,
    pub alert_title: String,
    pub alert_level: Level,
}

struct ThresholdState {
    violation_since: Option<i64>,
    last_published: Option<MetricValue>,
}

/// Watches `metric_key` on the message at `metric_ref` against `mode`'s
/// condition and opens/closes a companion alert at `alert_ref`.
pub struct ThresholdRule {
    config: ThresholdConfig,
    state: Mutex<ThresholdState>,
}

impl ThresholdRule {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config, state: Mutex::new(ThresholdState { violation_since: None, last_published: None }) }
    }

    fn publish_metrics(&self, value: &MetricValue, now: i64) -> IndexMap<String, Metric> {
        let num_metric = |n: f64| Metric { val: MetricValue::Number(n), unit: String::new(), ts: now, lc: None };
        let mut metrics = IndexMap::new();
        metrics.insert("state-value".to_string(), Metric { val: value.clone(), unit: String::new(), ts: now, lc: None });
        metrics.insert(
            "state-name".to_string(),
            Metric { val: MetricValue::Text(self.config.metric_key.clone()), unit: String::new(), ts: now, lc: None },
        );
        match self.config.mode {
            ThresholdMode::Lt(x) => {
                metrics.insert("state-min".to_string(), num_metric(x));
            }
            ThresholdMode::Gt(x) => {
                metrics.insert("state-max".to_string(), num_metric(x));
            }
            ThresholdMode::Inside(min, max) | ThresholdMode::Outside(min, max) => {
                metrics.insert("state-min".to_string(), num_metric(min));
                metrics.insert("state-max".to_string(), num_metric(max));
            }
            ThresholdMode::Truthy | ThresholdMode::Falsy => {}
        }
        metrics
    }
}

fn is_truthy(value: &MetricValue) -> bool {
    match value {
        MetricValue::Bool(b) => *b,
        MetricValue::Number(n) => *n != 0.0,
        MetricValue::Text(s) => !s.is_empty(),
        MetricValue::Null => false,
    }
}

/// Plain breach check, used to decide whether to open a closed alert.
fn is_breached(mode: ThresholdMode, value: f64) -> bool {
    match mode {
        ThresholdMode::Lt(x) => value < x,
        ThresholdMode::Gt(x) => value > x,
        ThresholdMode::Inside(min, max) => (min..=max).contains(&value),
        ThresholdMode::Outside(min, max) => value < min || value > max,
        ThresholdMode::Truthy | ThresholdMode::Falsy => unreachable!("handled by caller"),
    }
}

/// Whether an already-open alert has recovered, with the boundary widened
/// by `hysteresis` so it must cross back further than it breached by.
fn is_recovered(mode: ThresholdMode, value: f64, hysteresis: f64) -> bool {
    match mode {
        ThresholdMode::Lt(x) => value >= x + hysteresis,
        ThresholdMode::Gt(x) => value <= x - hysteresis,
        ThresholdMode::Inside(min, max) => value < min - hysteresis || value > max + hysteresis,
        ThresholdMode::Outside(min, max) => value >= min + hysteresis && value <= max - hysteresis,
        ThresholdMode::Truthy | ThresholdMode::Falsy => unreachable!("handled by caller"),
    }
}

impl Rule for ThresholdRule {
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
        let value = metric.val.clone();
        let open = has_open_alert(views, &self.config.alert_ref);
        let hysteresis = self.config.hysteresis.unwrap_or(0.0);

        let breached = match self.config.mode {
            ThresholdMode::Truthy => is_truthy(&value),
            ThresholdMode::Falsy => !is_truthy(&value),
            mode => {
                let MetricValue::Number(n) = value else {
                    return RuleAction::None;
                };
                if open {
                    !is_recovered(mode, n, hysteresis)
                } else {
                    is_breached(mode, n)
                }
            }
        };

        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        if breached {
            state.violation_since.get_or_insert(now);
        } else {
            state.violation_since = None;
        }
        let waited_long_enough = match self.config.min_duration_ms {
            Some(min_dur) => state.violation_since.is_some_and(|since| now - since >= min_dur),
            None => true,
        };
        let changed = state.last_published.as_ref() != Some(&value);

        match (breached, open, waited_long_enough) {
            (true, false, true) => {
                state.last_published = Some(value.clone());
                RuleAction::Create(CreateInput {
                    ref_: Some(self.config.alert_ref.clone()),
                    title: self.config.alert_title.clone(),
                    text: format!("{} crossed its configured threshold", self.config.metric_key),
                    level: self.config.alert_level.as_i32(),
                    kind: Kind::Status,
                    origin: Origin { origin_type: OriginType::Automation, system: Some("rules".into()), id: Some(self.config.id.clone()) },
                    metrics: self.publish_metrics(&value, now),
                    ..Default::default()
                })
            }
            (true, true, _) if changed => {
                state.last_published = Some(value.clone());
                let patch = MessagePatch {
                    metrics: Some(MetricsPatch::SetDelete { set: self.publish_metrics(&value, now), delete: Vec::new() }),
                    ..Default::default()
                };
                RuleAction::Update(self.config.alert_ref.clone(), patch)
            }
            (false, true, _) => {
                state.last_published = Some(value.clone());
                let mut patch = close_alert_patch();
                patch.metrics = Some(MetricsPatch::SetDelete { set: self.publish_metrics(&value, now), delete: Vec::new() });
                RuleAction::Update(self.config.alert_ref.clone(), patch)
            }
            _ => RuleAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{Kind as MsgKind, OriginType as MsgOriginType};
    use crate::message::{Lifecycle, Message, Metric as MsgMetric, Origin as MsgOrigin, Timing};

    fn sensor_view(value: f64) -> RenderedView {
        let mut metrics = IndexMap::new();
        metrics.insert("tempC".to_string(), MsgMetric { val: MetricValue::Number(value), unit: "C".into(), ts: 0, lc: None });
        let msg = Message {
            ref_: "sensor.status.attic".into(),
            title: "Attic".into(),
            text: "".into(),
            icon: None,
            level: Level::None,
            kind: MsgKind::Status,
            origin: MsgOrigin { origin_type: MsgOriginType::Automation, system: Some("sensors".into()), id: None },
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

    fn rule(mode: ThresholdMode) -> ThresholdRule {
        ThresholdRule::new(ThresholdConfig {
            id: "attic-heat".into(),
            metric_ref: "sensor.status.attic".into(),
            metric_key: "tempC".into(),
            mode,
            hysteresis: None,
            min_duration_ms: None,
            alert_ref: "rule.status.attic_hot".into(),
            alert_title: "Attic too hot".into(),
            alert_level: Level::Warning,
        })
    }

    #[test]
    fn breach_with_no_existing_alert_creates_one() {
        let views = vec![sensor_view(35.0)];
        let action = rule(ThresholdMode::Gt(30.0)).evaluate(0, &views);
        assert!(matches!(action, RuleAction::Create(ref input) if input.metrics.contains_key("state-value")));
    }

    #[test]
    fn in_range_with_no_alert_does_nothing() {
        let views = vec![sensor_view(20.0)];
        let action = rule(ThresholdMode::Gt(30.0)).evaluate(0, &views);
        assert!(matches!(action, RuleAction::None));
    }

    #[test]
    fn recovery_closes_the_open_alert() {
        let mut alert = sensor_view(20.0);
        alert.ref_ = "rule.status.attic_hot".into();
        let views = vec![sensor_view(20.0), alert];
        let action = rule(ThresholdMode::Gt(30.0)).evaluate(0, &views);
        assert!(matches!(action, RuleAction::Update(ref_, _) if ref_ == "rule.status.attic_hot"));
    }

    #[test]
    fn missing_source_message_is_a_no_op() {
        let action = rule(ThresholdMode::Gt(30.0)).evaluate(0, &[]);
        assert!(matches!(action, RuleAction::None));
    }

    #[test]
    fn min_duration_holds_off_the_first_open() {
        let r = ThresholdRule::new(ThresholdConfig {
            id: "attic-heat".into(),
            metric_ref: "sensor.status.attic".into(),
            metric_key: "tempC".into(),
            mode: ThresholdMode::Gt(30.0),
            hysteresis: None,
            min_duration_ms: Some(1_000),
            alert_ref: "rule.status.attic_hot".into(),
            alert_title: "Attic too hot".into(),
            alert_level: Level::Warning,
        });
        let views = vec![sensor_view(35.0)];
        assert!(matches!(r.evaluate(0, &views), RuleAction::None));
        assert!(matches!(r.evaluate(500, &views), RuleAction::None));
        assert!(matches!(r.evaluate(1_001, &views), RuleAction::Create(_)));
    }

    #[test]
    fn hysteresis_keeps_the_alert_open_past_the_plain_boundary() {
        let r = rule(ThresholdMode::Gt(30.0));
        let views_breach = vec![sensor_view(35.0)];
        assert!(matches!(r.evaluate(0, &views_breach), RuleAction::Create(_)));

        let mut alert = sensor_view(29.0);
        alert.ref_ = "rule.status.attic_hot".into();
        let views_near = vec![sensor_view(29.0), alert];
        let r_hyst = ThresholdRule::new(ThresholdConfig {
            id: "attic-heat".into(),
            metric_ref: "sensor.status.attic".into(),
            metric_key: "tempC".into(),
            mode: ThresholdMode::Gt(30.0),
            hysteresis: Some(2.0),
            min_duration_ms: None,
            alert_ref: "rule.status.attic_hot".into(),
            alert_title: "Attic too hot".into(),
            alert_level: Level::Warning,
        });
        // 29 is below 30 but within the 2-degree hysteresis band, so the
        // alert must stay open (a republish, not a close).
        let action = r_hyst.evaluate(0, &views_near);
        assert!(matches!(action, RuleAction::Update(ref r, _) if r == "rule.status.attic_hot"));
    }

    #[test]
    fn truthy_mode_opens_on_nonzero_value() {
        let r = rule(ThresholdMode::Truthy);
        let views = vec![sensor_view(1.0)];
        assert!(matches!(r.evaluate(0, &views), RuleAction::Create(_)));
    }
}
