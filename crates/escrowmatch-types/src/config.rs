//! Configuration types for the ledger and the settlement relayer.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{constants, EscrowError, Genesis, Result};

/// Configuration for an in-process ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Deployment parameters of the contract the ledger hosts.
    pub genesis: Genesis,
    /// Refuse submissions once the log holds this many entries.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_max_log_entries() -> usize {
    constants::DEFAULT_MAX_LOG_ENTRIES
}

impl LedgerConfig {
    #[must_use]
    pub fn new(genesis: Genesis) -> Self {
        Self {
            genesis,
            max_log_entries: constants::DEFAULT_MAX_LOG_ENTRIES,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.genesis.custodial_account.trim().is_empty() {
            return Err(EscrowError::Configuration(
                "custodial_account must not be empty".into(),
            ));
        }
        if self.max_log_entries == 0 {
            return Err(EscrowError::Configuration(
                "max_log_entries must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the settlement relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Period of the poll loop.
    pub poll_interval: Duration,
    /// How long to wait for a transfer broadcast acknowledgement before the
    /// attempt counts as failed.
    pub broadcast_timeout: Duration,
    /// Path of the durable payout journal.
    pub journal_path: PathBuf,
    /// The custodial account transfers are drawn from. Must match the
    /// contract's `custodial_account`.
    pub custodial_account: String,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            broadcast_timeout: Duration::from_millis(constants::DEFAULT_BROADCAST_TIMEOUT_MS),
            journal_path: PathBuf::from(constants::DEFAULT_JOURNAL_FILE),
            custodial_account: String::new(),
        }
    }
}

impl RelayerConfig {
    /// Parse a JSON config document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| EscrowError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(EscrowError::Configuration(
                "poll_interval must be > 0".into(),
            ));
        }
        if self.broadcast_timeout.is_zero() {
            return Err(EscrowError::Configuration(
                "broadcast_timeout must be > 0".into(),
            ));
        }
        if self.custodial_account.trim().is_empty() {
            return Err(EscrowError::Configuration(
                "custodial_account must not be empty".into(),
            ));
        }
        Ok(())
    }
}
