// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure view transformation (§4.4). Takes a canonical [`Message`] and
//! returns a rendered copy with `{{m.key}}` / `{{t.tsKey|datetime}}`
//! templates expanded against the message's own metrics and timing. No I/O,
//! no mutation, no dependency on a template-engine or regex crate — the
//! substitution grammar is small enough to scan by hand.

use indexmap::IndexMap;
use serde::Serialize;

use crate::archive::civil_from_days;
use crate::constants::{Kind, Level, LifecycleState, OriginType};
use crate::message::{
    ActionDef, Attachment, Audience, Details, ListItem, Message, Metric, MetricValue, Progress,
};

/// Rendered, display-ready copy of a [`Message`]. Same shape as the stored
/// entity except `title`/`text`/`details` have had their templates expanded.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedView {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub title: String,
    pub text: String,
    pub icon: Option<String>,
    pub level: Level,
    pub kind: Kind,
    pub origin_type: OriginType,
    pub lifecycle_state: LifecycleState,
    pub created_at: i64,
    pub updated_at: i64,
    pub due_at: Option<i64>,
    pub notify_at: Option<i64>,
    pub details: Option<Details>,
    pub metrics: IndexMap<String, Metric>,
    pub attachments: Vec<Attachment>,
    pub list_items: IndexMap<String, ListItem>,
    pub actions: IndexMap<String, ActionDef>,
    /// Populated by the action executor's view policy (§4.6); empty until
    /// then.
    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub actions_inactive: IndexMap<String, ActionDef>,
    pub progress: Option<Progress>,
    pub audience: Option<Audience>,
    pub dependencies: Vec<String>,
}

/// Expands every `{{...}}` placeholder in `template` against `msg`.
pub fn expand_templates(template: &str, msg: &Message) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find("{{") {
            None => {
                output.push_str(rest);
                break;
            }
            Some(start) => {
                output.push_str(&rest[..start]);
                let after = &rest[start + 2..];
                match after.find("}}") {
                    None => {
                        // Unmatched opener: treat the rest as literal text.
                        output.push_str("{{");
                        output.push_str(after);
                        break;
                    }
                    Some(end) => {
                        let expr = after[..end].trim();
                        output.push_str(&resolve_expr(expr, msg));
                        rest = &after[end + 2..];
                    }
                }
            }
        }
    }
    output
}

fn resolve_expr(expr: &str, msg: &Message) -> String {
    let mut pipe_parts = expr.splitn(2, '|');
    let path = pipe_parts.next().unwrap_or("").trim();
    let filter = pipe_parts.next().map(str::trim);

    let mut path_parts = path.splitn(2, '.');
    let namespace = path_parts.next().unwrap_or("");
    let key = path_parts.next().unwrap_or("");

    match namespace {
        "m" => msg.metrics.get(key).map(|m| format_metric_value(&m.val)).unwrap_or_default(),
        "t" => timing_field(msg, key)
            .map(|ms| if filter == Some("datetime") { format_datetime(ms) } else { ms.to_string() })
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn timing_field(msg: &Message, key: &str) -> Option<i64> {
    let t = &msg.timing;
    match key {
        "createdAt" | "created_at" => Some(t.created_at),
        "updatedAt" | "updated_at" => Some(t.updated_at),
        "expiresAt" | "expires_at" => t.expires_at,
        "notifyAt" | "notify_at" => t.notify_at,
        "remindEvery" | "remind_every" => t.remind_every,
        "timeBudget" | "time_budget" => t.time_budget,
        "cooldown" => t.cooldown,
        "dueAt" | "due_at" => t.due_at,
        "startAt" | "start_at" => t.start_at,
        "endAt" | "end_at" => t.end_at,
        _ => None,
    }
}

fn format_metric_value(value: &MetricValue) -> String {
    match value {
        MetricValue::Number(n) => format_number(*n),
        MetricValue::Text(s) => s.clone(),
        MetricValue::Bool(b) => b.to_string(),
        MetricValue::Null => String::new(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Formats an epoch-millisecond timestamp as `YYYY-MM-DD HH:MM:SS` UTC.
fn format_datetime(ms: i64) -> String {
    let days = ms.div_euclid(86_400_000);
    let time_ms = ms.rem_euclid(86_400_000);
    let (year, month, day) = civil_from_days(days);
    let secs = time_ms / 1000;
    let hour = secs / 3600;
    let minute = (secs % 3600) / 60;
    let second = secs % 60;
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}

fn render_details(details: &Details, msg: &Message) -> Details {
    Details {
        location: details.location.as_deref().map(|s| expand_templates(s, msg)),
        task: details.task.as_deref().map(|s| expand_templates(s, msg)),
        reason: details.reason.as_deref().map(|s| expand_templates(s, msg)),
        tools: details.tools.clone(),
        consumables: details.consumables.clone(),
    }
}

/// Produces the rendered view of a canonical message (§4.4).
pub fn render(msg: &Message) -> RenderedView {
    RenderedView {
        ref_: msg.ref_.clone(),
        title: expand_templates(&msg.title, msg),
        text: expand_templates(&msg.text, msg),
        icon: msg.icon.clone(),
        level: msg.level,
        kind: msg.kind,
        origin_type: msg.origin.origin_type,
        lifecycle_state: msg.lifecycle.state,
        created_at: msg.timing.created_at,
        updated_at: msg.timing.updated_at,
        due_at: msg.timing.due_at,
        notify_at: msg.timing.notify_at,
        details: msg.details.as_ref().map(|d| render_details(d, msg)),
        metrics: msg.metrics.clone(),
        attachments: msg.attachments.clone(),
        list_items: msg.list_items.clone(),
        actions: msg.actions.clone(),
        actions_inactive: IndexMap::new(),
        progress: msg.progress.clone(),
        audience: msg.audience.clone(),
        dependencies: msg.dependencies.clone(),
    }
}
