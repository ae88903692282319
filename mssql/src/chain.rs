//! Restore chain resolution over a set of backup headers.
//!
//! A chain starts from a full backup, optionally continues with one
//! differential taken against that full, and is extended by transaction
//! log backups whose LSN ranges follow on from each other. Among competing
//! candidates the one finishing last wins, then the one with the greater
//! last LSN (finish dates only have second precision).

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

use crate::types::{BackupHeader, BackupType, Lsn};

/// A break in the log chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LsnGap {
    /// Last LSN the chain reaches
    pub after: Lsn,
    /// First LSN of the earliest log backup past the break
    pub next: Lsn,
}

/// Log backups following a full or differential backup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogChain {
    pub logs: Vec<BackupHeader>,
    pub gap: Option<LsnGap>,
}

/// Ordered backups needed to restore one database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreChain {
    pub full: BackupHeader,
    pub differential: Option<BackupHeader>,
    pub logs: Vec<BackupHeader>,
    pub gap: Option<LsnGap>,
}

impl RestoreChain {
    /// Backups in restore order.
    pub fn backups(&self) -> impl Iterator<Item = &BackupHeader> {
        std::iter::once(&self.full)
            .chain(self.differential.as_ref())
            .chain(self.logs.iter())
    }

    /// Last LSN the chain restores to.
    pub fn last_lsn(&self) -> Lsn {
        self.backups().last().map_or(self.full.last_lsn, |h| h.last_lsn)
    }
}

fn recency(header: &BackupHeader) -> (NaiveDateTime, Lsn) {
    (header.finish_date, header.last_lsn)
}

/// Answers restore questions for one server's backups.
///
/// Headers are matched on database name only; they are expected to come
/// from a single server's catalog.
pub struct ChainResolver<'a> {
    headers: &'a [BackupHeader],
}

impl<'a> ChainResolver<'a> {
    pub fn new(headers: &'a [BackupHeader]) -> Self {
        Self { headers }
    }

    /// Most recent full backup of `database`.
    pub fn latest_full(&self, server: &str, database: &str) -> Option<BackupHeader> {
        debug!("Resolving latest full backup of {database} on {server}");
        let candidates = self.candidates(database, None);
        latest_full(&candidates).cloned()
    }

    /// The most recent differential together with the full it is based on,
    /// full first.
    ///
    /// A differential belongs to the full whose LSN range contains its base
    /// LSN, which need not be the latest full. Without any usable
    /// differential the result is the latest full alone, or empty when the
    /// database has no full backup.
    pub fn latest_diff_with_full(&self, server: &str, database: &str) -> Vec<BackupHeader> {
        debug!("Resolving latest differential chain of {database} on {server}");
        let candidates = self.candidates(database, None);
        diff_with_full(&candidates)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Log backups continuing from `base`.
    ///
    /// Each log must start at or before the LSN reached so far and end past
    /// it. With `until`, the chain stops at the first log finishing at or
    /// after that time, since it holds the transactions up to the target.
    pub fn log_chain(
        &self,
        database: &str,
        base: &BackupHeader,
        until: Option<NaiveDateTime>,
    ) -> LogChain {
        let logs: Vec<&BackupHeader> = self
            .candidates(database, None)
            .into_iter()
            .filter(|h| h.backup_type == BackupType::Log)
            .collect();
        let reached = |h: &BackupHeader| until.is_some_and(|target| h.finish_date >= target);

        let mut chain: Vec<&BackupHeader> = Vec::new();
        let mut lsn = base.last_lsn;
        let mut gap = None;

        while !reached(chain.last().copied().unwrap_or(base)) {
            let next = logs
                .iter()
                .copied()
                .filter(|log| log.first_lsn <= lsn && lsn < log.last_lsn)
                .max_by_key(|log| recency(log));

            match next {
                Some(log) => {
                    lsn = log.last_lsn;
                    chain.push(log);
                }
                None => {
                    gap = logs
                        .iter()
                        .filter(|log| log.first_lsn > lsn)
                        .map(|log| log.first_lsn)
                        .min()
                        .map(|next| LsnGap { after: lsn, next });
                    break;
                }
            }
        }

        if let Some(gap) = &gap {
            debug!(
                "Log chain of {database} breaks after LSN {}; next log starts at {}",
                gap.after, gap.next
            );
        }

        LogChain {
            logs: chain.into_iter().cloned().collect(),
            gap,
        }
    }

    /// Full chain to restore `database` to its latest point, or to `until`.
    ///
    /// Only full and differential backups finished by `until` can serve as
    /// the base; the base reaching the greater LSN is chosen and extended
    /// with log backups.
    pub fn restore_chain(
        &self,
        server: &str,
        database: &str,
        until: Option<NaiveDateTime>,
    ) -> Option<RestoreChain> {
        debug!("Resolving restore chain of {database} on {server}, target {until:?}");
        let candidates = self.candidates(database, until);

        let full = latest_full(&candidates)?;
        let (full, differential) = match diff_with_full(&candidates).as_slice() {
            [diff_full, diff] if diff.last_lsn > full.last_lsn => (*diff_full, Some(*diff)),
            _ => (full, None),
        };

        let log_chain = self.log_chain(database, differential.unwrap_or(full), until);
        Some(RestoreChain {
            full: full.clone(),
            differential: differential.cloned(),
            logs: log_chain.logs,
            gap: log_chain.gap,
        })
    }

    fn candidates(&self, database: &str, until: Option<NaiveDateTime>) -> Vec<&'a BackupHeader> {
        self.headers
            .iter()
            .filter(|h| h.database_name == database)
            .filter(|h| until.map_or(true, |target| h.finish_date <= target))
            .collect()
    }
}

fn of_type<'c, 'h>(
    candidates: &'c [&'h BackupHeader],
    backup_type: BackupType,
) -> impl Iterator<Item = &'h BackupHeader> + 'c {
    candidates
        .iter()
        .copied()
        .filter(move |h| h.backup_type == backup_type)
}

fn latest_full<'h>(candidates: &[&'h BackupHeader]) -> Option<&'h BackupHeader> {
    of_type(candidates, BackupType::Full).max_by_key(|h| recency(h))
}

fn diff_with_full<'h>(candidates: &[&'h BackupHeader]) -> Vec<&'h BackupHeader> {
    // Newest first; exact ties go to the later record, as with max_by_key
    let mut diffs: Vec<&BackupHeader> = of_type(candidates, BackupType::Differential).collect();
    diffs.reverse();
    diffs.sort_by_key(|h| std::cmp::Reverse(recency(h)));

    for diff in diffs {
        let base = of_type(candidates, BackupType::Full)
            .filter(|full| full.covers(diff.base_lsn()))
            .max_by_key(|full| recency(full));
        match base {
            Some(full) => return vec![full, diff],
            None => debug!(
                "Differential {} finished {} has no full backup covering LSN {}",
                diff.backup_name,
                diff.finish_date,
                diff.base_lsn()
            ),
        }
    }

    latest_full(candidates).into_iter().collect()
}
