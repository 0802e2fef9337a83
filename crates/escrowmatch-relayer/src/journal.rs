//! Durable payout journal: the relayer's idempotency record.
//!
//! After a transfer succeeds the relayer writes `{obligation -> tx ref}`
//! here and fsyncs it *before* acknowledging the payment on the ledger. On
//! restart, an obligation that is still pending on the ledger but present
//! in the journal is acknowledged with the recorded ref instead of being
//! transferred again.
//!
//! [`FileJournal`] stores one JSON record per line. Replay on open tolerates
//! a torn final line (a crash before fsync completed, so the effect was
//! never relied upon) and truncates it. Unparseable lines anywhere else, and
//! records contradicting earlier ones, fail closed with
//! [`EscrowError::JournalCorrupt`]. A failed append is cut back off the file
//! before the error is returned.
//!
//! Lookups return an error rather than "not found" when the journal cannot
//! be read: treating an unreadable journal as empty would pay twice.

use std::{
    collections::{HashMap, HashSet},
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use escrowmatch_types::{Address, EscrowError, LedgerSeq, ObligationId, Result};
use fs2::FileExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JournalRecord {
    /// The external transfer completed with `external_tx_ref`.
    Transferred {
        obligation_id: ObligationId,
        recipient: Address,
        amount: Decimal,
        external_tx_ref: String,
        recorded_at: DateTime<Utc>,
    },
    /// The ledger recorded the payment. `ledger_seq` is `None` when the
    /// obligation was found already paid and reconciled without a new entry.
    Acknowledged {
        obligation_id: ObligationId,
        ledger_seq: Option<LedgerSeq>,
        recorded_at: DateTime<Utc>,
    },
}

impl JournalRecord {
    #[must_use]
    pub fn obligation_id(&self) -> ObligationId {
        match self {
            Self::Transferred { obligation_id, .. } | Self::Acknowledged { obligation_id, .. } => {
                *obligation_id
            }
        }
    }
}

/// Durable `{obligation -> tx ref}` store.
pub trait PayoutJournal: Send + Sync {
    /// The recorded transfer ref for `id`, if a transfer completed.
    ///
    /// # Errors
    /// [`EscrowError::JournalUnavailable`] if the journal cannot be read.
    fn tx_ref(&self, id: &ObligationId) -> Result<Option<String>>;

    /// Whether the payment of `id` was acknowledged on the ledger.
    fn is_acknowledged(&self, id: &ObligationId) -> Result<bool>;

    /// Durably append `record`. Returns only once it is on stable storage.
    ///
    /// # Errors
    /// Fails if the record cannot be persisted, or if it would record a
    /// second, different transfer for the same obligation.
    fn record(&self, record: JournalRecord) -> Result<()>;
}

impl<J: PayoutJournal + ?Sized> PayoutJournal for std::sync::Arc<J> {
    fn tx_ref(&self, id: &ObligationId) -> Result<Option<String>> {
        (**self).tx_ref(id)
    }

    fn is_acknowledged(&self, id: &ObligationId) -> Result<bool> {
        (**self).is_acknowledged(id)
    }

    fn record(&self, record: JournalRecord) -> Result<()> {
        (**self).record(record)
    }
}

// ---------------------------------------------------------------------------
// Index shared by both implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct JournalIndex {
    transferred: HashMap<ObligationId, String>,
    acknowledged: HashSet<ObligationId>,
}

impl JournalIndex {
    /// Reject records that contradict what is already journaled.
    fn check(&self, record: &JournalRecord) -> std::result::Result<(), String> {
        if let JournalRecord::Transferred {
            obligation_id,
            external_tx_ref,
            ..
        } = record
        {
            if let Some(existing) = self.transferred.get(obligation_id) {
                if existing != external_tx_ref {
                    return Err(format!(
                        "{obligation_id} already transferred as {existing}, refusing {external_tx_ref}"
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Transferred {
                obligation_id,
                external_tx_ref,
                ..
            } => {
                self.transferred
                    .entry(*obligation_id)
                    .or_insert_with(|| external_tx_ref.clone());
            }
            JournalRecord::Acknowledged { obligation_id, .. } => {
                self.acknowledged.insert(*obligation_id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FileJournal
// ---------------------------------------------------------------------------

struct FileJournalInner {
    file: File,
    index: JournalIndex,
    /// Set when a failed append could not be cut back off the file.
    broken: bool,
}

impl FileJournalInner {
    fn append(&mut self, line: &[u8]) -> Result<()> {
        self.append_with(|file| {
            file.write_all(line)?;
            file.sync_all()
        })
    }

    /// Run `write` against the file. If it fails, truncate back to the
    /// length before the write so no partial record remains.
    fn append_with(&mut self, write: impl FnOnce(&mut File) -> io::Result<()>) -> Result<()> {
        if self.broken {
            return Err(EscrowError::JournalUnavailable(
                "an earlier append could not be rolled back".into(),
            ));
        }
        let len = self.file.metadata()?.len();
        let Err(err) = write(&mut self.file) else {
            return Ok(());
        };
        match self.file.set_len(len).and_then(|()| self.file.sync_all()) {
            Ok(()) => {
                tracing::warn!(error = %err, len, "Rolled back failed payout journal append");
                Err(err.into())
            }
            Err(rollback) => {
                self.broken = true;
                tracing::error!(
                    error = %err,
                    rollback_error = %rollback,
                    "Payout journal append failed and could not be rolled back"
                );
                Err(EscrowError::JournalUnavailable(format!(
                    "append failed ({err}) and rollback failed ({rollback})"
                )))
            }
        }
    }
}

/// Append-only JSON-lines journal on disk.
///
/// Holds an exclusive advisory lock on the file for its whole lifetime, so
/// a second relayer on the same host cannot open the same journal.
pub struct FileJournal {
    path: PathBuf,
    inner: Mutex<FileJournalInner>,
}

impl FileJournal {
    /// Open (creating if absent), lock, and replay the journal at `path`.
    ///
    /// # Errors
    /// - [`EscrowError::Io`] if the file cannot be opened or is locked by
    ///   another process.
    /// - [`EscrowError::JournalCorrupt`] on an unparseable record that is
    ///   not the final line, or on a record that contradicts an earlier one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .truncate(false)
            .append(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|e| {
            EscrowError::Io(format!(
                "payout journal {} is locked by another process: {e}",
                path.display()
            ))
        })?;

        let mut index = JournalIndex::default();
        let mut keep_len: u64 = 0;
        let mut torn = false;
        {
            let mut replay = file.try_clone()?;
            replay.seek(SeekFrom::Start(0))?;
            let lines: Vec<String> = BufReader::new(&mut replay)
                .lines()
                .collect::<std::io::Result<_>>()?;
            let last = lines.len().saturating_sub(1);

            for (idx, line) in lines.iter().enumerate() {
                let line_len = line.len() as u64 + 1;
                if line.trim().is_empty() {
                    keep_len += line_len;
                    continue;
                }
                let record = match serde_json::from_str::<JournalRecord>(line) {
                    Ok(record) => record,
                    Err(err) if idx == last => {
                        tracing::warn!(
                            line = idx + 1,
                            reason = %err,
                            path = %path.display(),
                            "Truncating torn tail record from payout journal"
                        );
                        torn = true;
                        break;
                    }
                    Err(err) => {
                        return Err(EscrowError::JournalCorrupt {
                            line: idx + 1,
                            reason: err.to_string(),
                        });
                    }
                };
                index
                    .check(&record)
                    .map_err(|reason| EscrowError::JournalCorrupt {
                        line: idx + 1,
                        reason,
                    })?;
                index.apply(&record);
                keep_len += line_len;
            }
        }

        let actual_len = file.metadata()?.len();
        if torn {
            file.set_len(keep_len)?;
            file.sync_all()?;
        } else if keep_len > actual_len {
            // Last record is intact but lost its newline; restore it so the
            // next append starts on a fresh line.
            file.write_all(b"\n")?;
            file.sync_all()?;
        }

        tracing::info!(
            path = %path.display(),
            transferred = index.transferred.len(),
            acknowledged = index.acknowledged.len(),
            "Payout journal opened"
        );
        Ok(Self {
            path,
            inner: Mutex::new(FileJournalInner {
                file,
                index,
                broken: false,
            }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, FileJournalInner>> {
        self.inner
            .lock()
            .map_err(|_| EscrowError::JournalUnavailable("journal lock poisoned".into()))
    }
}

impl PayoutJournal for FileJournal {
    fn tx_ref(&self, id: &ObligationId) -> Result<Option<String>> {
        Ok(self.lock()?.index.transferred.get(id).cloned())
    }

    fn is_acknowledged(&self, id: &ObligationId) -> Result<bool> {
        Ok(self.lock()?.index.acknowledged.contains(id))
    }

    fn record(&self, record: JournalRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .index
            .check(&record)
            .map_err(EscrowError::Internal)?;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        // Write to durable storage before updating the in-memory index.
        inner.append(&line)?;
        inner.index.apply(&record);
        Ok(())
    }
}

impl std::fmt::Debug for FileJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJournal")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MemoryJournal
// ---------------------------------------------------------------------------

/// Volatile journal for tests and single-run tooling.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    inner: Mutex<(Vec<JournalRecord>, JournalIndex)>,
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far, in order.
    pub fn records(&self) -> Result<Vec<JournalRecord>> {
        Ok(self.lock()?.0.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, (Vec<JournalRecord>, JournalIndex)>> {
        self.inner
            .lock()
            .map_err(|_| EscrowError::JournalUnavailable("journal lock poisoned".into()))
    }
}

impl PayoutJournal for MemoryJournal {
    fn tx_ref(&self, id: &ObligationId) -> Result<Option<String>> {
        Ok(self.lock()?.1.transferred.get(id).cloned())
    }

    fn is_acknowledged(&self, id: &ObligationId) -> Result<bool> {
        Ok(self.lock()?.1.acknowledged.contains(id))
    }

    fn record(&self, record: JournalRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner.1.check(&record).map_err(EscrowError::Internal)?;
        inner.1.apply(&record);
        inner.0.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use escrowmatch_types::MatchId;

    use super::*;

    fn ob(n: u64) -> ObligationId {
        ObligationId::deterministic(&MatchId::new("m1"), LedgerSeq(n))
    }

    fn transferred(n: u64, tx: &str) -> JournalRecord {
        JournalRecord::Transferred {
            obligation_id: ob(n),
            recipient: Address::dummy(1),
            amount: Decimal::new(100, 0),
            external_tx_ref: tx.into(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        {
            let j = FileJournal::open(&path).unwrap();
            j.record(transferred(1, "tx-1")).unwrap();
            j.record(JournalRecord::Acknowledged {
                obligation_id: ob(1),
                ledger_seq: Some(LedgerSeq(9)),
                recorded_at: Utc::now(),
            })
            .unwrap();
            j.record(transferred(2, "tx-2")).unwrap();
        }
        let j = FileJournal::open(&path).unwrap();
        assert_eq!(j.tx_ref(&ob(1)).unwrap().as_deref(), Some("tx-1"));
        assert_eq!(j.tx_ref(&ob(2)).unwrap().as_deref(), Some("tx-2"));
        assert!(j.is_acknowledged(&ob(1)).unwrap());
        assert!(!j.is_acknowledged(&ob(2)).unwrap());
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let valid = serde_json::to_string(&transferred(1, "tx-1")).unwrap();
        let torn = &serde_json::to_string(&transferred(2, "tx-2")).unwrap()[..20];
        std::fs::write(&path, format!("{valid}\n{torn}")).unwrap();

        let j = FileJournal::open(&path).unwrap();
        assert_eq!(j.tx_ref(&ob(1)).unwrap().as_deref(), Some("tx-1"));
        assert!(j.tx_ref(&ob(2)).unwrap().is_none());
        drop(j);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{valid}\n"));
    }

    #[test]
    fn mid_file_corruption_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let valid = serde_json::to_string(&transferred(1, "tx-1")).unwrap();
        std::fs::write(&path, format!("not json\n{valid}\n")).unwrap();

        let err = FileJournal::open(&path).unwrap_err();
        assert!(matches!(err, EscrowError::JournalCorrupt { line: 1, .. }));
    }

    #[test]
    fn missing_final_newline_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let valid = serde_json::to_string(&transferred(1, "tx-1")).unwrap();
        std::fs::write(&path, &valid).unwrap();

        let j = FileJournal::open(&path).unwrap();
        j.record(transferred(2, "tx-2")).unwrap();
        drop(j);
        let j = FileJournal::open(&path).unwrap();
        assert_eq!(j.tx_ref(&ob(1)).unwrap().as_deref(), Some("tx-1"));
        assert_eq!(j.tx_ref(&ob(2)).unwrap().as_deref(), Some("tx-2"));
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let _held = FileJournal::open(&path).unwrap();
        let err = FileJournal::open(&path).unwrap_err();
        assert!(matches!(err, EscrowError::Io(_)));
    }

    #[test]
    fn conflicting_transfer_refused() {
        let j = MemoryJournal::new();
        j.record(transferred(1, "tx-1")).unwrap();
        assert!(j.record(transferred(1, "tx-other")).is_err());
        // Re-recording the same ref is harmless.
        j.record(transferred(1, "tx-1")).unwrap();
        assert_eq!(j.tx_ref(&ob(1)).unwrap().as_deref(), Some("tx-1"));
        assert_eq!(j.records().unwrap().len(), 2);
    }

    #[test]
    fn conflicting_final_record_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let first = serde_json::to_string(&transferred(1, "tx-1")).unwrap();
        let conflict = serde_json::to_string(&transferred(1, "tx-9")).unwrap();
        std::fs::write(&path, format!("{first}\n{conflict}\n")).unwrap();

        let err = FileJournal::open(&path).unwrap_err();
        assert!(matches!(err, EscrowError::JournalCorrupt { line: 2, .. }));
        // Nothing was truncated.
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{first}\n{conflict}\n")
        );
    }

    #[test]
    fn failed_append_leaves_no_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let j = FileJournal::open(&path).unwrap();
        j.record(transferred(1, "tx-1")).unwrap();

        let err = j
            .lock()
            .unwrap()
            .append_with(|file| {
                file.write_all(br#"{"kind":"transferred","obligat"#)?;
                Err(io::Error::other("no space left on device"))
            })
            .unwrap_err();
        assert!(matches!(err, EscrowError::Io(_)));

        // Later appends land on a clean line and the file still replays.
        j.record(transferred(2, "tx-2")).unwrap();
        drop(j);
        let j = FileJournal::open(&path).unwrap();
        assert_eq!(j.tx_ref(&ob(1)).unwrap().as_deref(), Some("tx-1"));
        assert_eq!(j.tx_ref(&ob(2)).unwrap().as_deref(), Some("tx-2"));
    }

    #[test]
    fn unreadable_journal_is_an_error_not_a_miss() {
        let j = std::sync::Arc::new(MemoryJournal::new());
        j.record(transferred(1, "tx-1")).unwrap();

        let poisoner = std::sync::Arc::clone(&j);
        let handle = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the journal lock");
        });
        assert!(handle.join().is_err());

        let err = j.tx_ref(&ob(1)).unwrap_err();
        assert!(matches!(err, EscrowError::JournalUnavailable(_)));
        assert!(j.is_acknowledged(&ob(1)).is_err());
        assert!(j.record(transferred(2, "tx-2")).is_err());
    }

    #[test]
    fn record_wire_format_is_tagged() {
        let json = serde_json::to_value(transferred(1, "tx-1")).unwrap();
        assert_eq!(json["kind"], "transferred");
        assert_eq!(json["externalTxRef"], "tx-1");
        assert_eq!(json["amount"], "100");
    }
}
