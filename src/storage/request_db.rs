// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded request store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `requests`: request id → serialized DelegateRequest (JSON)
//! - `creation_order`: sequence → request id
//! - `request_sequence`: request id → sequence
//! - `status_index`: (status ordinal, sequence) → request id
//! - `signer_index`: (signer, sequence) → status ordinal
//! - `relay_state`: key → counter
//!
//! Every request gets a monotonically increasing sequence number at insert
//! time. The sequence is the store's creation order and is what the
//! sequencer walks, so it never depends on wall-clock timestamps.
//!
//! redb serializes write transactions, so a conditional update that reads
//! and writes inside one write transaction is atomic with respect to every
//! other writer. The database file is exclusively locked by the process
//! that opened it.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::request::{DelegateRequest, RequestStatus};

// =============================================================================
// Table Definitions
// =============================================================================

const REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("requests");

const CREATION_ORDER: TableDefinition<u64, &str> = TableDefinition::new("creation_order");

const REQUEST_SEQ: TableDefinition<&str, u64> = TableDefinition::new("request_sequence");

const STATUS_INDEX: TableDefinition<(u8, u64), &str> = TableDefinition::new("status_index");

const SIGNER_INDEX: TableDefinition<(&str, u64), u8> = TableDefinition::new("signer_index");

const RELAY_STATE: TableDefinition<&str, u64> = TableDefinition::new("relay_state");

const NEXT_SEQUENCE_KEY: &str = "next_sequence";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RequestDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request already exists: {0}")]
    AlreadyExists(String),

    #[error("no creation sequence recorded for request {0}")]
    MissingSequence(String),

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },
}

pub type RequestDbResult<T> = Result<T, RequestDbError>;

// =============================================================================
// Query results
// =============================================================================

/// Entry of the sequencer's queue.
#[derive(Debug, Clone)]
pub enum QueuedRequest {
    Known { sequence: u64, request: DelegateRequest },
    /// Indexed but its document is missing or does not parse.
    Unreadable { sequence: u64, id: String, reason: String },
}

/// Result of a conditional update.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Updated(DelegateRequest),
    NotFound,
    /// The stored status did not match the expected one.
    StatusMismatch(RequestStatus),
    /// The signer already has this many requests in the capped statuses.
    PendingLimitReached(usize),
}

/// Per-signer cap checked inside the same write as the update.
#[derive(Debug, Clone, Copy)]
pub struct PendingCap<'a> {
    pub statuses: &'a [RequestStatus],
    pub limit: usize,
}

// =============================================================================
// RequestDatabase
// =============================================================================

/// Embedded ACID request store.
pub struct RequestDatabase {
    db: Database,
}

impl RequestDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> RequestDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(REQUESTS)?;
            let _ = write_txn.open_table(CREATION_ORDER)?;
            let _ = write_txn.open_table(REQUEST_SEQ)?;
            let _ = write_txn.open_table(STATUS_INDEX)?;
            let _ = write_txn.open_table(SIGNER_INDEX)?;
            let _ = write_txn.open_table(RELAY_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Insert / lookup
    // =========================================================================

    /// Insert a new request. Returns its creation sequence.
    pub fn insert(&self, request: &DelegateRequest) -> RequestDbResult<u64> {
        let json = serde_json::to_vec(request)?;
        let id = request.id.as_str();

        let write_txn = self.db.begin_write()?;
        let sequence = {
            let mut requests = write_txn.open_table(REQUESTS)?;
            if requests.get(id)?.is_some() {
                return Err(RequestDbError::AlreadyExists(request.id.clone()));
            }

            let mut state = write_txn.open_table(RELAY_STATE)?;
            let sequence = state
                .get(NEXT_SEQUENCE_KEY)?
                .map(|v| v.value())
                .unwrap_or(0);
            state.insert(NEXT_SEQUENCE_KEY, sequence + 1)?;

            requests.insert(id, json.as_slice())?;
            write_txn.open_table(CREATION_ORDER)?.insert(sequence, id)?;
            write_txn.open_table(REQUEST_SEQ)?.insert(id, sequence)?;
            write_txn
                .open_table(STATUS_INDEX)?
                .insert((request.status.ordinal(), sequence), id)?;
            write_txn
                .open_table(SIGNER_INDEX)?
                .insert((request.signer.as_str(), sequence), request.status.ordinal())?;
            sequence
        };
        write_txn.commit()?;
        Ok(sequence)
    }

    /// Look up a request by id.
    pub fn get(&self, id: &str) -> RequestDbResult<Option<DelegateRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a request that has not expired at `now`.
    pub fn find_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> RequestDbResult<Option<DelegateRequest>> {
        Ok(self.get(id)?.filter(|r| !r.is_expired_at(now)))
    }

    /// Number of the signer's requests currently in one of `statuses`.
    pub fn count_by_signer(
        &self,
        signer: &str,
        statuses: &[RequestStatus],
    ) -> RequestDbResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SIGNER_INDEX)?;
        count_signer_entries(&table, signer, statuses)
    }

    /// Most recently created request with the given status.
    ///
    /// Unreadable documents are skipped.
    pub fn last_with_status(
        &self,
        status: RequestStatus,
    ) -> RequestDbResult<Option<(u64, DelegateRequest)>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(STATUS_INDEX)?;
        let requests = read_txn.open_table(REQUESTS)?;

        let ordinal = status.ordinal();
        for entry in index.range((ordinal, 0u64)..=(ordinal, u64::MAX))?.rev() {
            let (key, id) = entry?;
            let (_, sequence) = key.value();
            let id = id.value().to_string();
            let Some(bytes) = requests.get(id.as_str())? else {
                tracing::warn!(request_id = %id, "Status index points at missing request");
                continue;
            };
            match serde_json::from_slice::<DelegateRequest>(bytes.value()) {
                Ok(request) => return Ok(Some((sequence, request))),
                Err(e) => {
                    tracing::warn!(request_id = %id, error = %e, "Skipping unreadable request");
                }
            }
        }
        Ok(None)
    }

    /// Requests in any of `statuses` created at or after `from_sequence`,
    /// in creation order.
    pub fn queue_from(
        &self,
        from_sequence: u64,
        statuses: &[RequestStatus],
    ) -> RequestDbResult<Vec<QueuedRequest>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(STATUS_INDEX)?;
        let requests = read_txn.open_table(REQUESTS)?;

        let mut entries: Vec<(u64, String)> = Vec::new();
        for status in statuses {
            let ordinal = status.ordinal();
            for entry in index.range((ordinal, from_sequence)..=(ordinal, u64::MAX))? {
                let (key, id) = entry?;
                entries.push((key.value().1, id.value().to_string()));
            }
        }
        entries.sort_by_key(|(sequence, _)| *sequence);

        let mut queue = Vec::with_capacity(entries.len());
        for (sequence, id) in entries {
            let parsed = match requests.get(id.as_str())? {
                Some(bytes) => serde_json::from_slice::<DelegateRequest>(bytes.value())
                    .map_err(|e| e.to_string()),
                None => Err("document missing".to_string()),
            };
            queue.push(match parsed {
                Ok(request) => QueuedRequest::Known { sequence, request },
                Err(reason) => QueuedRequest::Unreadable {
                    sequence,
                    id,
                    reason,
                },
            });
        }
        Ok(queue)
    }

    // =========================================================================
    // Conditional update
    // =========================================================================

    /// Apply `update` only if the stored status equals `expected`.
    ///
    /// When `cap` is given, the signer's count of requests in the capped
    /// statuses is checked in the same write transaction and the update is
    /// refused once the limit is reached. The id, signer, creation time and
    /// composed context of a request cannot be changed by `update`.
    pub fn compare_and_update<F>(
        &self,
        id: &str,
        expected: RequestStatus,
        cap: Option<PendingCap<'_>>,
        update: F,
    ) -> RequestDbResult<UpdateOutcome>
    where
        F: FnOnce(&mut DelegateRequest),
    {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut requests = write_txn.open_table(REQUESTS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = match requests.get(id)? {
                Some(existing) => existing.value().to_vec(),
                None => return Ok(UpdateOutcome::NotFound),
            };
            let current: DelegateRequest = serde_json::from_slice(&existing_bytes)?;
            if current.status != expected {
                return Ok(UpdateOutcome::StatusMismatch(current.status));
            }

            let mut signer_index = write_txn.open_table(SIGNER_INDEX)?;
            if let Some(cap) = cap {
                let pending = count_signer_entries(&signer_index, &current.signer, cap.statuses)?;
                if pending >= cap.limit {
                    return Ok(UpdateOutcome::PendingLimitReached(pending));
                }
            }

            let mut updated = current.clone();
            update(&mut updated);
            updated.id = current.id.clone();
            updated.signer = current.signer.clone();
            updated.context = current.context.clone();
            updated.signature_options = current.signature_options.clone();
            updated.created_at = current.created_at;
            updated.updated_at = Utc::now();

            if updated.status != current.status && !current.status.can_transition_to(updated.status)
            {
                return Err(RequestDbError::InvalidTransition {
                    id: id.to_string(),
                    from: current.status.name(),
                    to: updated.status.name(),
                });
            }

            let json = serde_json::to_vec(&updated)?;
            requests.insert(id, json.as_slice())?;

            if updated.status != current.status {
                let sequence = write_txn
                    .open_table(REQUEST_SEQ)?
                    .get(id)?
                    .map(|v| v.value())
                    .ok_or_else(|| RequestDbError::MissingSequence(id.to_string()))?;
                let mut status_index = write_txn.open_table(STATUS_INDEX)?;
                status_index.remove((current.status.ordinal(), sequence))?;
                status_index.insert((updated.status.ordinal(), sequence), id)?;
                signer_index.insert((current.signer.as_str(), sequence), updated.status.ordinal())?;
            }

            UpdateOutcome::Updated(updated)
        };
        write_txn.commit()?;
        Ok(outcome)
    }
}

fn count_signer_entries(
    table: &impl ReadableTable<(&'static str, u64), u8>,
    signer: &str,
    statuses: &[RequestStatus],
) -> RequestDbResult<usize> {
    let mut count = 0;
    for entry in table.range((signer, 0u64)..=(signer, u64::MAX))? {
        let (_, status) = entry?;
        let ordinal = status.value();
        if statuses.iter().any(|s| s.ordinal() == ordinal) {
            count += 1;
        }
    }
    Ok(count)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_request;
    use std::sync::Arc;

    fn temp_db() -> (RequestDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = RequestDatabase::open(&dir.path().join("requests.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_and_get_request() {
        let (db, _dir) = temp_db();
        let request = sample_request("r1", "0xaaaa");
        assert_eq!(db.insert(&request).unwrap(), 0);

        let loaded = db.get("r1").unwrap().unwrap();
        assert_eq!(loaded, request);
        assert!(db.get("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let (db, _dir) = temp_db();
        let request = sample_request("r1", "0xaaaa");
        db.insert(&request).unwrap();
        assert!(matches!(
            db.insert(&request),
            Err(RequestDbError::AlreadyExists(_))
        ));
    }

    #[test]
    fn sequences_follow_insert_order() {
        let (db, _dir) = temp_db();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(db.insert(&sample_request(id, "0xaaaa")).unwrap(), i as u64);
        }
    }

    #[test]
    fn find_active_hides_expired_requests() {
        let (db, _dir) = temp_db();
        let request = sample_request("r1", "0xaaaa");
        db.insert(&request).unwrap();

        let before = request.request_expires_at - chrono::Duration::seconds(1);
        let after = request.request_expires_at + chrono::Duration::seconds(1);
        assert!(db.find_active("r1", before).unwrap().is_some());
        assert!(db.find_active("r1", request.request_expires_at).unwrap().is_some());
        assert!(db.find_active("r1", after).unwrap().is_none());
    }

    #[test]
    fn compare_and_update_guards_on_status() {
        let (db, _dir) = temp_db();
        db.insert(&sample_request("r1", "0xaaaa")).unwrap();

        let first = db
            .compare_and_update("r1", RequestStatus::New, None, |r| {
                r.status = RequestStatus::Confirmed;
                r.signature = Some("0x01".to_string());
            })
            .unwrap();
        assert!(matches!(first, UpdateOutcome::Updated(ref r) if r.status == RequestStatus::Confirmed));

        let second = db
            .compare_and_update("r1", RequestStatus::New, None, |r| {
                r.status = RequestStatus::Confirmed;
            })
            .unwrap();
        assert!(matches!(
            second,
            UpdateOutcome::StatusMismatch(RequestStatus::Confirmed)
        ));

        assert!(matches!(
            db.compare_and_update("nope", RequestStatus::New, None, |_| {}).unwrap(),
            UpdateOutcome::NotFound
        ));
    }

    #[test]
    fn invalid_transition_is_an_error() {
        let (db, _dir) = temp_db();
        db.insert(&sample_request("r1", "0xaaaa")).unwrap();
        let result = db.compare_and_update("r1", RequestStatus::New, None, |r| {
            r.status = RequestStatus::Mined;
        });
        assert!(matches!(result, Err(RequestDbError::InvalidTransition { .. })));
        assert_eq!(db.get("r1").unwrap().unwrap().status, RequestStatus::New);
    }

    #[test]
    fn context_is_write_once() {
        let (db, _dir) = temp_db();
        db.insert(&sample_request("r1", "0xaaaa")).unwrap();
        db.compare_and_update("r1", RequestStatus::New, None, |r| {
            r.context.function_name = "tampered".to_string();
            r.signature_options.clear();
        })
        .unwrap();

        let stored = db.get("r1").unwrap().unwrap();
        assert_eq!(stored.context.function_name, "transfer");
        assert!(!stored.signature_options.is_empty());
    }

    #[test]
    fn status_index_follows_updates() {
        let (db, _dir) = temp_db();
        for id in ["a", "b", "c"] {
            db.insert(&sample_request(id, "0xaaaa")).unwrap();
        }
        for id in ["a", "c"] {
            db.compare_and_update(id, RequestStatus::New, None, |r| {
                r.status = RequestStatus::Confirmed;
            })
            .unwrap();
        }

        let queue = db
            .queue_from(0, &[RequestStatus::Confirmed, RequestStatus::Mining])
            .unwrap();
        let ids: Vec<_> = queue
            .iter()
            .map(|q| match q {
                QueuedRequest::Known { request, .. } => request.id.clone(),
                QueuedRequest::Unreadable { id, .. } => id.clone(),
            })
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        let later = db.queue_from(1, &[RequestStatus::Confirmed]).unwrap();
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn queue_merges_statuses_in_creation_order() {
        let (db, _dir) = temp_db();
        for id in ["a", "b", "c"] {
            db.insert(&sample_request(id, "0xaaaa")).unwrap();
            db.compare_and_update(id, RequestStatus::New, None, |r| {
                r.status = RequestStatus::Confirmed;
            })
            .unwrap();
        }
        db.compare_and_update("b", RequestStatus::Confirmed, None, |r| {
            r.status = RequestStatus::Mining;
        })
        .unwrap();

        let queue = db
            .queue_from(0, &[RequestStatus::Mining, RequestStatus::Confirmed])
            .unwrap();
        let sequences: Vec<u64> = queue
            .iter()
            .map(|q| match q {
                QueuedRequest::Known { sequence, .. } | QueuedRequest::Unreadable { sequence, .. } => {
                    *sequence
                }
            })
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn last_with_status_uses_creation_order() {
        let (db, _dir) = temp_db();
        assert!(db.last_with_status(RequestStatus::Mined).unwrap().is_none());

        for id in ["a", "b"] {
            db.insert(&sample_request(id, "0xaaaa")).unwrap();
        }
        let (sequence, request) = db.last_with_status(RequestStatus::New).unwrap().unwrap();
        assert_eq!(sequence, 1);
        assert_eq!(request.id, "b");
    }

    #[test]
    fn pending_cap_is_checked_atomically() {
        let (db, _dir) = temp_db();
        let capped = [RequestStatus::Confirmed, RequestStatus::Mining];
        for id in ["a", "b", "c"] {
            db.insert(&sample_request(id, "0xaaaa")).unwrap();
        }
        db.insert(&sample_request("other", "0xbbbb")).unwrap();

        let cap = PendingCap {
            statuses: &capped,
            limit: 2,
        };
        for id in ["a", "b"] {
            let outcome = db
                .compare_and_update(id, RequestStatus::New, Some(cap), |r| {
                    r.status = RequestStatus::Confirmed;
                })
                .unwrap();
            assert!(matches!(outcome, UpdateOutcome::Updated(_)));
        }

        let refused = db
            .compare_and_update("c", RequestStatus::New, Some(cap), |r| {
                r.status = RequestStatus::Confirmed;
            })
            .unwrap();
        assert!(matches!(refused, UpdateOutcome::PendingLimitReached(2)));
        assert_eq!(db.get("c").unwrap().unwrap().status, RequestStatus::New);

        // Another signer is unaffected
        let other = db
            .compare_and_update("other", RequestStatus::New, Some(cap), |r| {
                r.status = RequestStatus::Confirmed;
            })
            .unwrap();
        assert!(matches!(other, UpdateOutcome::Updated(_)));
        assert_eq!(db.count_by_signer("0xaaaa", &capped).unwrap(), 2);
    }

    #[test]
    fn concurrent_promotions_succeed_once() {
        let (db, _dir) = temp_db();
        db.insert(&sample_request("r1", "0xaaaa")).unwrap();
        let db = Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    db.compare_and_update("r1", RequestStatus::New, None, |r| {
                        r.status = RequestStatus::Confirmed;
                    })
                    .unwrap()
                })
            })
            .collect();

        let updated = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, UpdateOutcome::Updated(_)))
            .count();
        assert_eq!(updated, 1);
    }

    #[test]
    fn database_file_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.redb");
        let _db = RequestDatabase::open(&path).unwrap();
        assert!(RequestDatabase::open(&path).is_err());
    }
}
