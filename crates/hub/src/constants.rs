// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enum values and lifecycle predicates shared across the core.

use serde::{Deserialize, Serialize};

/// Message severity. Ordered so `level <= max_level` comparisons (quiet
/// hours, §4.5) work directly on the numeric repr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum Level {
    None = 0,
    Notice = 10,
    Warning = 20,
    Error = 30,
}

impl Level {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            10 => Some(Self::Notice),
            20 => Some(Self::Warning),
            30 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Message classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Task,
    Status,
    Appointment,
    #[serde(rename = "shoppinglist")]
    ShoppingList,
    #[serde(rename = "inventorylist")]
    InventoryList,
}

impl Kind {
    pub fn is_list(self) -> bool {
        matches!(self, Self::ShoppingList | Self::InventoryList)
    }
}

impl Default for Kind {
    fn default() -> Self {
        Self::Task
    }
}

/// Provenance of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    Manual,
    Import,
    Automation,
}

/// Lifecycle state. `Deleted` and `Expired` are terminal and core-managed
/// (§3 invariant 3); producers may never set them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Open,
    Acked,
    Snoozed,
    Closed,
    Deleted,
    Expired,
}

impl LifecycleState {
    /// Whether the given transition is permitted by §3 invariant 3.
    ///
    /// `deleted`/`expired` are only reachable with a core token, which is
    /// enforced by the factory separately — this predicate only encodes
    /// the state graph shape.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        use LifecycleState::*;
        match self {
            Open => matches!(next, Acked | Snoozed | Closed | Deleted | Expired),
            Acked => matches!(next, Open | Closed | Deleted | Expired),
            Snoozed => matches!(next, Open | Closed | Deleted | Expired),
            Closed => matches!(next, Deleted | Expired),
            Deleted | Expired => false,
        }
    }

    /// §Glossary: quasi-open states are eligible for notification.
    pub fn is_quasi_open(self) -> bool {
        matches!(self, Self::Open | Self::Acked | Self::Snoozed)
    }

    /// §Glossary: quasi-deleted states are hidden from default queries.
    pub fn is_quasi_deleted(self) -> bool {
        matches!(self, Self::Closed | Self::Deleted | Self::Expired)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Expired)
    }
}

/// Notification event names dispatched to the Notify Host (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    Added,
    Recreated,
    Recovered,
    Updated,
    Due,
    Deleted,
    Expired,
}

impl NotificationEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Recreated => "recreated",
            Self::Recovered => "recovered",
            Self::Updated => "updated",
            Self::Due => "due",
            Self::Deleted => "deleted",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
