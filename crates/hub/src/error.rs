// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (§7).
//!
//! `ValidationError`/`NotFoundError` are returned to the caller as `false`
//! by the Store; `StorageError` never reaches the mutator at all (logged
//! and retried); `PluginFailure` is isolated at the dispatch boundary;
//! `ActionError` is returned from the action executor only.

use std::fmt;

/// Factory/store-level error. Mirrors `coopmux::error::MuxError`'s shape
/// (an enum carrying a human message, rendered via `Display`) but has no
/// HTTP surface since the core exposes no network API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    Validation(String),
    NotFound(String),
    Storage(String),
    Action(String),
}

impl HubError {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "STORAGE",
            Self::Action(_) => "ACTION",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::NotFound(m) | Self::Storage(m) | Self::Action(m) => m,
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_code(), self.message())
    }
}

impl std::error::Error for HubError {}

/// A plugin handler threw. Caught at the dispatch boundary (§5, §7); never
/// propagated past the Ingest/Notify host.
#[derive(Debug, Clone)]
pub struct PluginFailure {
    pub plugin_id: String,
    pub event: String,
    pub message: String,
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin {} failed on {}: {}", self.plugin_id, self.event, self.message)
    }
}
