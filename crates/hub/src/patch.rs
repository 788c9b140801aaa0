// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The open "patch" shape (§9 redesign notes): a field that is *absent*
//! from a patch is left alone, one that is explicitly `null` clears the
//! stored value, and one with a value replaces it. Rust has no ambient
//! `undefined` vs `null` distinction the way the source's JSON input did,
//! so [`Patch<T>`] makes the three states explicit instead of collapsing
//! them into `Option<T>`.

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::Serialize;

use crate::constants::{Level, LifecycleState};
use crate::message::{ActionDef, Attachment, ListItem, Metric};

/// Unset (keep existing) / explicit clear / replace-with-value.
#[derive(Debug, Clone, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // A missing key never reaches this impl (callers must wrap the
        // field in `#[serde(default)]`); `null` and a value both do.
        let value: Option<T> = Option::deserialize(deserializer)?;
        Ok(match value {
            None => Self::Clear,
            Some(v) => Self::Set(v),
        })
    }
}

/// Replace the whole collection, or apply targeted set/delete operations.
/// Deletes are applied after sets (§4.1: "deletions applied after
/// upserts"), and are order-independent within one call.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MapPatch<V> {
    Replace(IndexMap<String, V>),
    SetDelete {
        #[serde(default)]
        set: IndexMap<String, V>,
        #[serde(default)]
        delete: Vec<String>,
    },
}

/// Attachments are positional, not id-keyed; `set` upserts at an index,
/// `delete` removes by index (applied highest-first, §4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AttachmentsPatch {
    Replace(Vec<Attachment>),
    SetDelete {
        #[serde(default)]
        set: Vec<(usize, Attachment)>,
        #[serde(default)]
        delete: Vec<usize>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListPatch<T: PartialEq> {
    Replace(Vec<T>),
    SetDelete {
        #[serde(default)]
        set: Vec<T>,
        #[serde(default)]
        delete: Vec<T>,
    },
}

pub type MetricsPatch = MapPatch<Metric>;
pub type ListItemsPatch = MapPatch<ListItem>;
pub type ActionsPatch = MapPatch<ActionDef>;
pub type DependenciesPatch = ListPatch<String>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimingPatch {
    #[serde(default)]
    pub expires_at: Patch<i64>,
    #[serde(default)]
    pub notify_at: Patch<i64>,
    #[serde(default)]
    pub remind_every: Patch<i64>,
    #[serde(default)]
    pub time_budget: Patch<i64>,
    #[serde(default)]
    pub cooldown: Patch<i64>,
    #[serde(default)]
    pub due_at: Patch<i64>,
    #[serde(default)]
    pub start_at: Patch<i64>,
    #[serde(default)]
    pub end_at: Patch<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecyclePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<LifecycleState>,
    #[serde(default)]
    pub state_changed_by: Patch<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailsPatch {
    #[serde(default)]
    pub location: Patch<String>,
    #[serde(default)]
    pub task: Patch<String>,
    #[serde(default)]
    pub reason: Patch<String>,
    #[serde(default)]
    pub tools: Patch<Vec<String>>,
    #[serde(default)]
    pub consumables: Patch<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudienceChannelsPatch {
    #[serde(default)]
    pub include: Patch<Vec<String>>,
    #[serde(default)]
    pub exclude: Patch<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudiencePatch {
    #[serde(default)]
    pub tags: Patch<Vec<String>>,
    #[serde(default)]
    pub channels: Option<AudienceChannelsPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
}

/// Full patch envelope accepted by [`crate::factory::apply_patch`]. Every
/// top-level field is optional/absent-means-keep; nested objects use their
/// own merge semantics (§4.1).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default)]
    pub icon: Patch<String>,
    #[serde(default)]
    pub details: Patch<DetailsPatch>,
    #[serde(default)]
    pub audience: Patch<AudiencePatch>,
    #[serde(default)]
    pub lifecycle: Patch<LifecyclePatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<AttachmentsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_items: Option<ListItemsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<ActionsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependenciesPatch>,
    #[serde(default)]
    pub progress: Patch<ProgressPatch>,
}

impl Serialize for MessagePatch {
    // Patches are an input-only shape; the factory never needs to persist
    // one, but the Store logs a redacted summary, so a minimal impl keeps
    // `#[derive(Serialize)]` off the tri-state types while letting callers
    // that do need JSON (tests, archive raw-patch capture) opt in via
    // `serde_json::to_value` on the fields they construct themselves.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("<patch>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_field_is_keep() -> anyhow::Result<()> {
        let patch: MessagePatch = serde_json::from_str("{}")?;
        assert!(patch.icon.is_keep());
        assert!(patch.timing.is_none());
        Ok(())
    }

    #[test]
    fn null_field_is_clear() -> anyhow::Result<()> {
        let patch: MessagePatch = serde_json::from_str(r#"{"icon": null}"#)?;
        assert!(matches!(patch.icon, Patch::Clear));
        Ok(())
    }

    #[test]
    fn value_field_is_set() -> anyhow::Result<()> {
        let patch: MessagePatch = serde_json::from_str(r#"{"icon": "bell"}"#)?;
        assert!(matches!(patch.icon, Patch::Set(s) if s == "bell"));
        Ok(())
    }

    #[test]
    fn lifecycle_null_means_reset() -> anyhow::Result<()> {
        let patch: MessagePatch = serde_json::from_str(r#"{"lifecycle": null}"#)?;
        assert!(matches!(patch.lifecycle, Patch::Clear));
        Ok(())
    }
}
