// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-list JSON persistence (§4.2).
//!
//! Writes are serialized through a single background task; a new snapshot
//! enqueued while a write is in flight supersedes the one still queued, so
//! the writer never falls behind a bursty caller. Durability failures never
//! surface to the mutator (§7 StorageError) — they are logged and the next
//! write retries from scratch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::message::Message;

/// Single-writer, coalescing JSON persistence for the canonical message list.
///
/// Grounded on `credential::persist`'s write-tmp-then-rename atomicity,
/// wrapped in a `watch`-channel writer task the way the upstream pollers
/// (`upstream::poller`) are driven by a cancellable background loop.
pub struct Storage {
    path: PathBuf,
    tx: watch::Sender<Option<Arc<Vec<Message>>>>,
    flushed: Arc<Notify>,
    task: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl Storage {
    /// Spawns the background writer task. `path`'s parent directory is
    /// created eagerly so the first write doesn't race directory creation.
    pub fn spawn(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), %err, "failed to create storage directory");
            }
        }

        let (tx, mut rx) = watch::channel(None::<Arc<Vec<Message>>>);
        let flushed = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let task_path = path.clone();
        let task_flushed = Arc::clone(&flushed);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    result = rx.changed() => {
                        if result.is_err() {
                            break;
                        }
                    }
                }

                let snapshot = rx.borrow_and_update().clone();
                if let Some(list) = snapshot {
                    write_once(&task_path, &list).await;
                }
                task_flushed.notify_waiters();
            }
        });

        Self { path, tx, flushed, task, cancel }
    }

    /// Enqueues a full-list snapshot. Supersedes any snapshot still queued
    /// (§4.2: "coalesced flush").
    pub fn write_json(&self, list: Arc<Vec<Message>>) {
        // `watch::Sender::send` drops the previously-held value if the
        // receiver hasn't observed it yet, which is exactly the coalescing
        // behavior the contract asks for.
        let _ = self.tx.send(Some(list));
    }

    /// Reads the previous snapshot synchronously, returning `fallback` on
    /// absence or parse error (§4.2).
    pub fn read_json(path: &Path, fallback: Vec<Message>) -> Vec<Message> {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(list) => list,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "storage snapshot unparseable, using fallback");
                    fallback
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => fallback,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "storage snapshot unreadable, using fallback");
                fallback
            }
        }
    }

    /// Blocks until the most recently enqueued snapshot is durable.
    pub async fn flush_pending(&self) {
        let notified = self.flushed.notified();
        // If nothing is queued there's nothing to wait for.
        if self.tx.borrow().is_none() {
            return;
        }
        notified.await;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops the writer task after completing any in-flight write.
    pub async fn shutdown(self) {
        self.flush_pending().await;
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn write_once(path: &Path, list: &[Message]) {
    let json = match serde_json::to_string_pretty(list) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(%err, "failed to serialize message list");
            return;
        }
    };

    let tmp_path = path.with_extension("tmp");
    if let Err(err) = tokio::fs::write(&tmp_path, &json).await {
        tracing::warn!(path = %tmp_path.display(), %err, "storage write failed");
        return;
    }
    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        tracing::warn!(path = %path.display(), %err, "storage rename failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{Kind, Level, OriginType};
    use crate::message::{Lifecycle, Origin, Timing};

    fn sample_message(ref_: &str) -> Message {
        Message {
            ref_: ref_.to_string(),
            title: "Take out trash".into(),
            text: "bins".into(),
            icon: None,
            level: Level::Notice,
            kind: Kind::Task,
            origin: Origin { origin_type: OriginType::Manual, system: None, id: None },
            lifecycle: Lifecycle::default(),
            timing: Timing { created_at: 1, updated_at: 1, ..Default::default() },
            details: None,
            metrics: Default::default(),
            attachments: Vec::new(),
            list_items: Default::default(),
            actions: Default::default(),
            progress: None,
            audience: None,
            dependencies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("messages.json");
        let storage = Storage::spawn(path.clone());
        storage.write_json(Arc::new(vec![sample_message("r1")]));
        storage.flush_pending().await;

        let list = Storage::read_json(&path, Vec::new());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].ref_, "r1");
        storage.shutdown().await;
        Ok(())
    }

    #[test]
    fn read_missing_file_returns_fallback() {
        let path = PathBuf::from("/nonexistent/hub-storage-test/messages.json");
        let list = Storage::read_json(&path, vec![sample_message("fallback")]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].ref_, "fallback");
    }
}
