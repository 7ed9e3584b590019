//! Error types for the ledger

use crate::types::{Address, TransactionId};
use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a transfer an address was looked up for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    /// Account being debited
    Payer,
    /// Account being credited
    Receiver,
    /// Account queried directly
    Holder,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Payer => f.write_str("payer"),
            AccountRole::Receiver => f.write_str("receiver"),
            AccountRole::Holder => f.write_str("account"),
        }
    }
}

/// Invariant checked by `Ledger::validate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityCheck {
    /// Stored previous hash does not match the recomputed predecessor hash
    PreviousHash,
    /// Stored block hash does not match a fresh recomputation
    BlockHash,
    /// Balances do not sum to the total money supply
    Supply,
    /// Block does not hold exactly `capacity` transactions
    TransactionCount,
}

impl fmt::Display for IntegrityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntegrityCheck::PreviousHash => "previous hash",
            IntegrityCheck::BlockHash => "block hash",
            IntegrityCheck::Supply => "money supply",
            IntegrityCheck::TransactionCount => "transaction count",
        };
        f.write_str(name)
    }
}

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed input or a construction-time rule violation
    #[error("{reason}")]
    Validation {
        /// Attempted action
        action: &'static str,
        /// Violated rule
        reason: String,
    },

    /// Address already present in the open block
    #[error("account address {0} already exists")]
    DuplicateAccount(Address),

    /// Transaction id already pending or committed
    #[error("transaction id {0} was already used")]
    DuplicateTransactionId(TransactionId),

    /// Payer cannot cover amount + fee
    #[error("{payer} does not have enough funds (balance {available}, required {required})")]
    InsufficientFunds {
        /// Paying account
        payer: Address,
        /// Amount + fee
        required: i128,
        /// Payer balance at the time of settlement
        available: i64,
    },

    /// Address missing from the relevant balance snapshot
    #[error("{role} {address} does not exist")]
    UnknownAccount {
        /// Lookup context
        role: AccountRole,
        /// Missing address
        address: Address,
    },

    /// No block has been committed yet
    #[error("no block has been committed yet")]
    NoCommittedBlock {
        /// Attempted action
        action: &'static str,
    },

    /// Block number never committed
    #[error("block number {0} does not exist")]
    UnknownBlock(u64),

    /// Transaction id never committed
    #[error("transaction {0} does not exist")]
    UnknownTransaction(TransactionId),

    /// Attempt to mutate a frozen block
    #[error("block {0} has already been committed to the ledger")]
    AlreadyCommitted(u64),

    /// Broken chain invariant found by `validate`
    #[error("block {block} failed {check} check: {detail}")]
    LedgerCorruption {
        /// Failing block number
        block: u64,
        /// Violated invariant
        check: IntegrityCheck,
        /// Human-readable detail
        detail: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Actor mailbox or reply channel closed
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// IO error (config files, scripts)
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(action: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            action,
            reason: reason.into(),
        }
    }

    /// The action that was being attempted when the error occurred
    pub fn action(&self) -> &'static str {
        match self {
            Error::Validation { action, .. } | Error::NoCommittedBlock { action } => action,
            Error::DuplicateAccount(_) => "create account",
            Error::DuplicateTransactionId(_) | Error::AlreadyCommitted(_) => {
                "process transaction"
            }
            Error::InsufficientFunds { .. } => "validate transaction",
            Error::UnknownAccount { role, .. } => match role {
                AccountRole::Holder => "get account balance",
                _ => "validate transaction",
            },
            Error::UnknownBlock(_) => "get block",
            Error::UnknownTransaction(_) => "get transaction",
            Error::LedgerCorruption { .. } => "blockchain validation",
            Error::Config(_) => "load configuration",
            Error::Concurrency(_) => "reach ledger actor",
            Error::Metrics(_) => "register metrics",
            Error::Io(_) => "read input",
        }
    }

    /// Read-side "not settled yet" conditions that callers should retry later
    pub fn is_not_yet_available(&self) -> bool {
        matches!(
            self,
            Error::NoCommittedBlock { .. } | Error::UnknownBlock(_) | Error::UnknownTransaction(_)
        )
    }

    /// Errors that indicate a broken state machine or tampered chain
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Error::AlreadyCommitted(_) | Error::LedgerCorruption { .. }
        )
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
