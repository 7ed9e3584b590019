//! Block Ledger
//!
//! Single-writer transactional ledger that groups value transfers into
//! hash-chained blocks.
//!
//! # Architecture
//!
//! - **Batches**: Transactions queue in one open block; the block settles
//!   once it holds `block_capacity` transactions
//! - **Hash chain**: Each committed block links to its predecessor's hash
//! - **Merkle Tree**: Block hashes commit to their transactions, with inclusion proofs
//! - **Single Writer**: `Ledger` is synchronous; `actor` serializes async callers
//!
//! # Invariants
//!
//! - Money conservation: balances of every committed block sum to the total supply
//! - Atomic batches: a block commits all of its transactions or none of them
//! - Append-only: committed blocks are never modified
//! - Linearizable: transaction ids strictly increase in assignment order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod block;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod merkle;
pub mod metrics;
pub mod script;
pub mod types;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use block::Block;
pub use config::{Config, LedgerConfig};
pub use error::{Error, Result};
pub use ledger::{Ledger, Rejection};
pub use merkle::{MerkleProof, MerkleTree};
pub use script::{Command, Outcome, ScriptSession};
pub use types::{Account, Address, Transaction, TransactionId};
