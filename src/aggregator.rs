//! In-memory store of the latest findings per ecosystem and check kind.
//!
//! The [`Aggregator`] owns one [`Snapshot`] per `(Ecosystem, CheckKind)`
//! pair. A snapshot is immutable once stored; a refresh swaps in a new
//! `Arc<Snapshot>` under a write lock, so readers holding the old one keep
//! a consistent view and never see a mix of old and new packages.
//!
//! Checks for the same pair may overlap. Each check takes a [`Ticket`]
//! before it runs, and a completion is only stored if no newer ticket has
//! already been committed for that pair. The snapshot left behind is
//! therefore always from the most recently *requested* run among those that
//! completed.

use crate::model::{CheckKind, Ecosystem, Findings};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// Permission to store the result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub ecosystem: Ecosystem,
    pub kind: CheckKind,
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The stored result of one successful check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub ecosystem: Ecosystem,
    pub findings: Findings,
    pub generation: u64,
    pub completed_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn kind(&self) -> CheckKind {
        self.findings.kind()
    }
}

type Key = (Ecosystem, CheckKind);

pub struct Aggregator {
    snapshots: RwLock<HashMap<Key, Arc<Snapshot>>>,
    generations: AtomicU64,
    revision: watch::Sender<u64>,
}

impl Aggregator {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            snapshots: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
            revision,
        }
    }

    /// Issues a ticket newer than every ticket issued before it.
    pub fn begin(&self, ecosystem: Ecosystem, kind: CheckKind) -> Ticket {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            ecosystem,
            kind,
            generation,
        }
    }

    /// Replaces the snapshot for the ticket's pair with `findings`.
    ///
    /// Returns `false`, storing nothing, when a newer ticket has already
    /// been committed for the pair or when `findings` belong to another
    /// check kind.
    pub fn commit(&self, ticket: Ticket, findings: Findings) -> bool {
        if findings.kind() != ticket.kind {
            debug!(
                ecosystem = %ticket.ecosystem,
                expected = %ticket.kind,
                got = %findings.kind(),
                "findings do not match ticket"
            );
            return false;
        }

        {
            let mut snapshots = self
                .snapshots
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let key = (ticket.ecosystem, ticket.kind);

            if let Some(current) = snapshots.get(&key) {
                if current.generation > ticket.generation {
                    debug!(
                        ecosystem = %ticket.ecosystem,
                        kind = %ticket.kind,
                        stale = ticket.generation,
                        current = current.generation,
                        "discarding stale completion"
                    );
                    return false;
                }
            }

            snapshots.insert(
                key,
                Arc::new(Snapshot {
                    ecosystem: ticket.ecosystem,
                    findings,
                    generation: ticket.generation,
                    completed_at: Utc::now(),
                }),
            );
        }

        self.bump();
        true
    }

    /// Takes a ticket and commits `findings` with it immediately.
    pub fn store(&self, ecosystem: Ecosystem, findings: Findings) -> bool {
        let ticket = self.begin(ecosystem, findings.kind());
        self.commit(ticket, findings)
    }

    pub fn query(&self, ecosystem: Ecosystem, kind: CheckKind) -> Option<Arc<Snapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(ecosystem, kind))
            .cloned()
    }

    /// Every stored snapshot, ordered by ecosystem then kind.
    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = snapshots.values().cloned().collect();
        all.sort_by_key(|s| (s.ecosystem, s.kind()));
        all
    }

    /// Drops every snapshot.
    ///
    /// Checks already in flight still store their results when they
    /// complete.
    pub fn reset(&self) {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("all snapshots cleared");
        self.bump();
    }

    /// Subscribes to the revision counter, bumped on every store and reset.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
