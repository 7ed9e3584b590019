//! Core types for the ledger
//!
//! All types have value semantics: cloning an `Account` or a `Transaction`
//! yields an independent copy, which is how blocks snapshot balances without
//! aliasing.

use crate::config::LedgerConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Account address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger-assigned transaction identifier, strictly increasing from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// First id handed out by a fresh ledger
    pub const FIRST: TransactionId = TransactionId(1);

    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The id that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim().parse::<u64>().map(Self).map_err(|_| {
            Error::validation("get transaction", format!("{} is not a valid transaction id", s))
        })
    }
}

/// Balance cell bound to an address
///
/// `deposit` and `withdraw` do no bounds checking; sufficiency is enforced
/// by batch validation before any balance is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    address: Address,
    balance: i64,
}

impl Account {
    /// Zero-balance account
    pub fn new(address: Address) -> Self {
        Self::with_balance(address, 0)
    }

    /// Account seeded with an initial balance (genesis master account)
    pub fn with_balance(address: Address, balance: i64) -> Self {
        Self { address, balance }
    }

    /// Account address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current balance
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Credit the account
    pub fn deposit(&mut self, amount: i64) {
        self.balance += amount;
    }

    /// Debit the account
    pub fn withdraw(&mut self, amount: i64) {
        self.balance -= amount;
    }
}

/// Immutable value-transfer record
///
/// Construction validates amount, fee and note length; payer/receiver
/// existence and funds are only checked when the owning block settles.
/// Only a `Ledger` mints transactions, so every id comes from its counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    id: TransactionId,
    amount: i64,
    fee: i64,
    note: String,
    payer: Address,
    receiver: Address,
}

impl Transaction {
    /// Validate the transfer rules and build the transaction
    ///
    /// Rules are checked in order: non-negative amount, minimum fee, maximum
    /// note length (in characters).
    pub(crate) fn new(
        id: TransactionId,
        amount: i64,
        fee: i64,
        note: impl Into<String>,
        payer: Address,
        receiver: Address,
        rules: &LedgerConfig,
    ) -> Result<Self> {
        let note = note.into();

        if amount < 0 {
            return Err(Error::validation(
                "create transaction",
                "amount must be non-negative",
            ));
        }

        if fee < rules.min_fee {
            return Err(Error::validation(
                "create transaction",
                format!("the fee must be at least {} units", rules.min_fee),
            ));
        }

        if note.chars().count() > rules.max_note_len {
            return Err(Error::validation(
                "create transaction",
                format!("note length exceeds {} characters", rules.max_note_len),
            ));
        }

        Ok(Self {
            id,
            amount,
            fee,
            note,
            payer,
            receiver,
        })
    }

    /// Transaction id
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Amount moved from payer to receiver
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Fee credited to the master account
    pub fn fee(&self) -> i64 {
        self.fee
    }

    /// Free-form note
    pub fn note(&self) -> &str {
        &self.note
    }

    /// Debited account
    pub fn payer(&self) -> &Address {
        &self.payer
    }

    /// Credited account
    pub fn receiver(&self) -> &Address {
        &self.receiver
    }

    /// Amount + fee, widened so it cannot overflow
    pub fn total_debit(&self) -> i128 {
        i128::from(self.amount) + i128::from(self.fee)
    }

    #[cfg(test)]
    pub(crate) fn note_mut(&mut self) -> &mut String {
        &mut self.note
    }
}

/// Canonical text form; this is the Merkle leaf content, so it must stay stable
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction ID: {} Payer: {} Receiver: {} Amount: {} Fee: {} Note: {}",
            self.id, self.payer, self.receiver, self.amount, self.fee, self.note
        )
    }
}
