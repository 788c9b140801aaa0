// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical `Message` entity (§3) and its sub-structures.
//!
//! Everything here is the *stored* shape. Patch input shapes (with their
//! unset/keep/clear tri-state) live in [`crate::patch`]; the factory is the
//! only code allowed to turn one into the other.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{Kind, Level, LifecycleState, OriginType};

/// A finite metric reading: number, string, boolean, or explicit null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl MetricValue {
    /// §3 invariant 5: numbers must be finite.
    pub fn is_plausible(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub val: MetricValue,
    pub unit: String,
    pub ts: i64,
    /// Last-changed timestamp: when `val` actually moved, as distinct from
    /// `ts` (when it was last reported). A freshness rule may watch either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lc: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub attachment_type: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_unit: Option<String>,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudienceChannels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Audience {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub channels: AudienceChannels,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Details {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumables: Option<Vec<String>>,
}

impl Details {
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.task.is_none()
            && self.reason.is_none()
            && self.tools.is_none()
            && self.consumables.is_none()
    }
}

/// Immutable provenance (§3). `origin_type`/`system`/`id` never change once
/// the message has been created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Origin {
    #[serde(rename = "type")]
    pub origin_type: OriginType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lifecycle {
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_changed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_changed_by: Option<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: LifecycleState::Open, state_changed_at: None, state_changed_by: None }
    }
}

/// Timestamps and scheduling (§3). All values are UTC epoch milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timing {
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remind_every: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<i64>,
    /// event name -> last dispatch timestamp, core-managed.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub notified_at: IndexMap<String, i64>,
}

/// The canonical, stored message (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub level: Level,
    pub kind: Kind,
    pub origin: Origin,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub timing: Timing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metrics: IndexMap<String, Metric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub list_items: IndexMap<String, ListItem>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub actions: IndexMap<String, ActionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Message {
    pub fn is_quasi_open(&self) -> bool {
        self.lifecycle.state.is_quasi_open()
    }

    pub fn is_quasi_deleted(&self) -> bool {
        self.lifecycle.state.is_quasi_deleted()
    }

    pub fn is_expired_or_deleted(&self) -> bool {
        matches!(self.lifecycle.state, LifecycleState::Deleted | LifecycleState::Expired)
    }
}

/// §3 invariant 4: plausible timestamp bounds, 2000-01-01 .. 2100-01-01.
pub const TIMESTAMP_MIN_MS: i64 = 946_684_800_000;
pub const TIMESTAMP_MAX_MS: i64 = 4_102_444_800_000;

pub fn is_plausible_timestamp(ms: i64) -> bool {
    (TIMESTAMP_MIN_MS..=TIMESTAMP_MAX_MS).contains(&ms)
}
