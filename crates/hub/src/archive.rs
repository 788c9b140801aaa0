// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-ref, per-week event log (§4.3, §6).
//!
//! Writes are buffered per file and flushed periodically or on demand;
//! lossy on crash by design. The writer runs as its own background task in
//! the same cancellable-loop shape as [`crate::storage::Storage`] and the
//! upstream pollers it's grounded on.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub kind: String,
    pub ts: i64,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub data: serde_json::Value,
}

enum Command {
    Append(PathBuf, ArchiveRecord),
    Flush(oneshot::Sender<()>),
}

pub struct Archive {
    root: PathBuf,
    tx: mpsc::UnboundedSender<Command>,
    task: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl Archive {
    pub fn spawn(root: PathBuf, flush_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut writers: HashMap<PathBuf, BufWriter<File>> = HashMap::new();
            let mut interval = tokio::time::interval(flush_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        flush_all(&mut writers);
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            None => break,
                            Some(Command::Append(path, record)) => append_record(&mut writers, &path, &record),
                            Some(Command::Flush(reply)) => {
                                flush_all(&mut writers);
                                let _ = reply.send(());
                            }
                        }
                    }
                }
            }
            flush_all(&mut writers);
        });

        Self { root, tx, task, cancel }
    }

    /// Enqueues an archive record for `ref_`. Never blocks the store
    /// scheduler (§5).
    pub fn append(&self, ref_: &str, ts: i64, kind: &str, data: serde_json::Value) {
        let path = self.record_path(ref_, ts);
        let record = ArchiveRecord { kind: kind.to_string(), ts, ref_: ref_.to_string(), data };
        if self.tx.send(Command::Append(path, record)).is_err() {
            tracing::warn!(ref_ = %ref_, "archive writer task gone, dropping record");
        }
    }

    pub async fn flush_pending(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub async fn shutdown(self) {
        self.flush_pending().await;
        self.cancel.cancel();
        let _ = self.task.await;
    }

    fn record_path(&self, ref_: &str, ts: i64) -> PathBuf {
        let mut path = self.root.clone();
        for segment in ref_path_segments(ref_) {
            path.push(segment);
        }
        path.push(format!("{}.jsonl", iso_week_key(ts)));
        path
    }

    /// Replays every record in the archive file covering `ts`'s week for
    /// `ref_`. Not part of the original contract; added so tooling and
    /// tests can verify what the writer actually persisted.
    pub fn read_week(&self, ref_: &str, ts: i64) -> Vec<ArchiveRecord> {
        read_records(&self.record_path(ref_, ts))
    }
}

fn append_record(writers: &mut HashMap<PathBuf, BufWriter<File>>, path: &Path, record: &ArchiveRecord) {
    let writer = match writers.entry(path.to_path_buf()) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(e) => {
            if let Some(parent) = path.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), %err, "failed to create archive directory");
                    return;
                }
            }
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to open archive file");
                    return;
                }
            };
            e.insert(BufWriter::new(file))
        }
    };

    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(err) => {
            tracing::warn!(%err, "failed to serialize archive record");
            return;
        }
    };
    if let Err(err) = writeln!(writer, "{line}") {
        tracing::warn!(path = %path.display(), %err, "archive append failed");
    }
}

fn flush_all(writers: &mut HashMap<PathBuf, BufWriter<File>>) {
    for (path, writer) in writers.iter_mut() {
        if let Err(err) = writer.flush() {
            tracing::warn!(path = %path.display(), %err, "archive flush failed");
        }
    }
}

fn read_records(path: &Path) -> Vec<ArchiveRecord> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };
    contents.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
}

/// Splits a `ref` into archive directory segments (§6): dots become path
/// separators, except a leading `<name>.<digits>` plugin-instance pair,
/// which stays joined as a single segment.
fn ref_path_segments(ref_: &str) -> Vec<String> {
    let parts: Vec<&str> = ref_.split('.').collect();
    let is_instance_pair = parts.len() >= 2 && !parts[1].is_empty() && parts[1].bytes().all(|b| b.is_ascii_digit());
    if is_instance_pair {
        let mut segments = vec![format!("{}.{}", parts[0], parts[1])];
        segments.extend(parts[2..].iter().map(|s| s.to_string()));
        segments
    } else {
        parts.iter().map(|s| s.to_string()).collect()
    }
}

/// ISO-8601 week key (`YYYY-Www`) for an epoch-millisecond timestamp,
/// computed with pure integer arithmetic (no calendar crate in the
/// dependency stack).
fn iso_week_key(ms: i64) -> String {
    let days = ms.div_euclid(86_400_000);
    let weekday = iso_weekday(days); // 1=Mon .. 7=Sun
    let thursday = days + (4 - weekday as i64);
    let (iso_year, _, _) = civil_from_days(thursday);

    let jan4 = days_from_civil(iso_year, 1, 4);
    let jan4_weekday = iso_weekday(jan4);
    let week1_monday = jan4 - (jan4_weekday as i64 - 1);
    let week = (thursday - (4 - 1) - week1_monday) / 7 + 1;

    format!("{iso_year:04}-W{week:02}")
}

fn iso_weekday(days_since_epoch: i64) -> i64 {
    (((days_since_epoch % 7 + 7) % 7) + 3) % 7 + 1
}

/// Converts a day count since 1970-01-01 into a proleptic-Gregorian
/// (year, month, day) triple. Howard Hinnant's `civil_from_days`.
pub(crate) fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

/// Inverse of [`civil_from_days`].
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if m > 2 { m - 3 } else { m + 9 } as i64;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
