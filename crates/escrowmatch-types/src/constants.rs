//! System-wide constants for EscrowMatch.

/// Upper bound on `capacity` accepted by `createMatch`.
pub const MAX_MATCH_CAPACITY: u32 = 1_024;

/// Maximum length of a match id in bytes.
pub const MAX_MATCH_ID_LEN: usize = 128;

/// Maximum length of a deposit or external transaction reference.
pub const MAX_EXTERNAL_REF_LEN: usize = 256;

/// Maximum number of metadata entries on a match.
pub const MAX_METADATA_ENTRIES: usize = 32;

/// Default relayer poll period in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default wait for a transfer broadcast acknowledgement in milliseconds.
pub const DEFAULT_BROADCAST_TIMEOUT_MS: u64 = 30_000;

/// Default payout journal file name.
pub const DEFAULT_JOURNAL_FILE: &str = "payout-journal.jsonl";

/// Maximum number of entries an in-process ledger will hold.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000_000;

/// Times a submitter re-signs with a fresh nonce after losing a nonce race
/// to another submitter holding the same key.
pub const MAX_NONCE_RETRIES: u32 = 3;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "EscrowMatch";
