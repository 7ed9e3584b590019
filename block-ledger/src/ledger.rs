//! Main ledger orchestration layer
//!
//! The ledger owns the committed chain, exactly one open block, the
//! transaction index and the id counter. Every operation runs to completion
//! synchronously; a block commits as a side effect of the transaction that
//! fills it.
//!
//! # Example
//!
//! ```
//! use block_ledger::Ledger;
//!
//! # fn main() -> block_ledger::Result<()> {
//! let mut ledger = Ledger::new("test", "example ledger", "x")?;
//! ledger.create_account("alice")?;
//!
//! for _ in 0..10 {
//!     let txn = ledger.create_transaction("100", "10", "funding", "master", "alice")?;
//!     ledger.process_transaction(txn)?;
//! }
//!
//! assert_eq!(ledger.get_account_balance("alice")?, 1000);
//! ledger.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::{
    block::{Balances, Block, TransactionIndex},
    config::LedgerConfig,
    crypto::hash_str,
    error::{AccountRole, IntegrityCheck},
    merkle::MerkleProof,
    metrics::Metrics,
    types::{Account, Address, Transaction, TransactionId},
    Error, Result,
};
use std::collections::{BTreeMap, HashSet};

/// Transaction dropped from its batch during settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Dropped transaction (its id stays consumed)
    pub transaction: Transaction,
    /// Why it was dropped
    pub error: Error,
}

/// Single-writer block ledger
#[derive(Debug)]
pub struct Ledger {
    name: String,
    description: String,
    seed: String,
    config: LedgerConfig,
    master: Address,

    /// Block currently accepting transactions
    open_block: Block,

    /// Committed chain keyed by block number
    blocks: BTreeMap<u64, Block>,

    /// Every committed transaction
    index: TransactionIndex,

    next_transaction_id: TransactionId,
    /// Rejections since the last drain or commit
    rejections: Vec<Rejection>,
    metrics: Metrics,
}

impl Ledger {
    /// Create a ledger with the default rules
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        seed: impl Into<String>,
    ) -> Result<Self> {
        Self::with_config(LedgerConfig::default(), name, description, seed)
    }

    /// Create a ledger: genesis block linked to `Hasher(seed)`, master account funded
    pub fn with_config(
        config: LedgerConfig,
        name: impl Into<String>,
        description: impl Into<String>,
        seed: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;

        let seed = seed.into();
        let master = Address::new(config.master_address.clone());

        let mut ledger = Self {
            name: name.into(),
            description: description.into(),
            open_block: Block::genesis(&seed),
            seed,
            master: master.clone(),
            blocks: BTreeMap::new(),
            index: TransactionIndex::new(),
            next_transaction_id: TransactionId::FIRST,
            rejections: Vec::new(),
            metrics: Metrics::new()?,
            config,
        };

        let supply = ledger.config.total_supply;
        ledger
            .open_block
            .add_account(Account::with_balance(master, supply))?;

        tracing::info!("Ledger {} created successfully", ledger.name);
        Ok(ledger)
    }

    /// Ledger name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ledger description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Seed hashed into the genesis block's previous hash
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Active rules
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Fee sink address
    pub fn master_address(&self) -> &Address {
        &self.master
    }

    /// Metrics for this ledger
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of committed blocks (also the last committed block number)
    pub fn committed_height(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Block currently accepting transactions
    pub fn open_block(&self) -> &Block {
        &self.open_block
    }

    /// Transactions waiting in the open block
    pub fn pending_transactions(&self) -> &[Transaction] {
        self.open_block.transactions()
    }

    /// Add a zero-balance account to the open block's snapshot
    pub fn create_account(&mut self, address: &str) -> Result<Address> {
        if address.trim().is_empty() {
            return Err(Error::validation(
                "create account",
                "account address must not be empty",
            ));
        }

        let address = Address::new(address);
        if self.open_block.balances().contains_key(&address) {
            return Err(Error::DuplicateAccount(address));
        }

        self.open_block.add_account(Account::new(address.clone()))?;
        tracing::info!("Account created for {}", address);
        Ok(address)
    }

    /// Parse textual fields and build a validated transaction
    ///
    /// Does not touch ledger state apart from consuming an id.
    pub fn create_transaction(
        &mut self,
        amount: &str,
        fee: &str,
        note: &str,
        payer: &str,
        receiver: &str,
    ) -> Result<Transaction> {
        let amount = parse_integer(amount)?;
        let fee = parse_integer(fee)?;
        self.new_transaction(amount, fee, note, payer, receiver)
    }

    /// Build a validated transaction from typed fields
    ///
    /// The id counter only advances when validation succeeds.
    pub fn new_transaction(
        &mut self,
        amount: i64,
        fee: i64,
        note: &str,
        payer: &str,
        receiver: &str,
    ) -> Result<Transaction> {
        let txn = Transaction::new(
            self.next_transaction_id,
            amount,
            fee,
            note,
            Address::new(payer),
            Address::new(receiver),
            &self.config,
        )?;
        self.next_transaction_id = self.next_transaction_id.next();
        Ok(txn)
    }

    /// Append a transaction to the open block, settling the batch once it is full
    ///
    /// Only ids this ledger has already handed out are accepted.
    pub fn process_transaction(&mut self, txn: Transaction) -> Result<TransactionId> {
        let id = txn.id();
        if id >= self.next_transaction_id {
            return Err(Error::validation(
                "process transaction",
                format!("transaction id {} was not issued by this ledger", id),
            ));
        }

        self.open_block.add_transaction(txn, &self.index)?;
        self.metrics.record_transaction_received();
        tracing::debug!("Received transaction {}", id);

        if self.open_block.len() >= self.config.block_capacity {
            self.settle_open_block()?;
        }

        Ok(id)
    }

    /// Validate the full batch in submission order against a working copy of balances
    fn settle_open_block(&mut self) -> Result<()> {
        let mut working = self.open_block.balances().clone();
        let mut rejected = Vec::new();

        for txn in self.open_block.transactions() {
            if let Err(error) = settle_transaction(txn, &mut working, &self.master) {
                tracing::warn!("Transaction {} rejected: {}", txn.id(), error);
                rejected.push(Rejection {
                    transaction: txn.clone(),
                    error,
                });
            }
        }

        if !rejected.is_empty() {
            let ids: HashSet<TransactionId> =
                rejected.iter().map(|r| r.transaction.id()).collect();
            self.open_block.remove_transactions(&ids)?;
            self.metrics.record_batch_rejected(rejected.len());
            self.rejections.extend(rejected);

            tracing::info!(
                "Block {} stays open with {} of {} transactions",
                self.open_block.number(),
                self.open_block.len(),
                self.config.block_capacity
            );
            return Ok(());
        }

        if !self.rejections.is_empty() {
            tracing::debug!(
                "Discarding {} undrained rejections at commit",
                self.rejections.len()
            );
            self.rejections.clear();
        }

        let hash = self.open_block.commit(working, &mut self.index)?;
        let number = self.open_block.number();

        let next = Block::open(number + 1, hash.clone(), self.open_block.balances().clone());
        let committed = std::mem::replace(&mut self.open_block, next);
        self.blocks.insert(number, committed);

        self.metrics.record_block_committed(number);
        tracing::info!("Block {} committed successfully: {}", number, hash);
        Ok(())
    }

    /// Take the rejections recorded since the last drain
    ///
    /// The buffer only holds rejections from the batches of the current open
    /// block: it is cleared whenever a block commits, so callers that care
    /// must drain after each `process_transaction`.
    pub fn drain_rejections(&mut self) -> Vec<Rejection> {
        std::mem::take(&mut self.rejections)
    }

    fn last_committed(&self, action: &'static str) -> Result<&Block> {
        self.blocks
            .values()
            .next_back()
            .ok_or(Error::NoCommittedBlock { action })
    }

    /// Balance as of the last committed block
    pub fn get_account_balance(&self, address: &str) -> Result<i64> {
        self.last_committed("get account balance")?
            .balance(address)
            .ok_or_else(|| Error::UnknownAccount {
                role: AccountRole::Holder,
                address: Address::new(address),
            })
    }

    /// Every balance as of the last committed block
    pub fn get_account_balances(&self) -> Result<BTreeMap<Address, i64>> {
        Ok(self
            .last_committed("get account balances")?
            .balances()
            .iter()
            .map(|(address, account)| (address.clone(), account.balance()))
            .collect())
    }

    /// Copy of a committed block
    pub fn get_block(&self, number: u64) -> Result<Block> {
        self.blocks
            .get(&number)
            .cloned()
            .ok_or(Error::UnknownBlock(number))
    }

    /// Copy of a committed transaction
    pub fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.index
            .get(id)
            .map(|entry| entry.transaction.clone())
            .ok_or(Error::UnknownTransaction(id))
    }

    /// Number of the block that committed a transaction
    pub fn transaction_block(&self, id: TransactionId) -> Result<u64> {
        self.index
            .get(id)
            .map(|entry| entry.block_number)
            .ok_or(Error::UnknownTransaction(id))
    }

    /// Merkle inclusion proof for a committed transaction
    pub fn transaction_proof(&self, id: TransactionId) -> Result<MerkleProof> {
        let number = self.transaction_block(id)?;
        self.blocks
            .get(&number)
            .and_then(|block| block.transaction_proof(id))
            .ok_or(Error::UnknownTransaction(id))
    }

    /// Walk the committed chain and check every invariant
    ///
    /// Per block, in order: link to predecessor (or to the seed for block 1),
    /// stored hash, money supply, transaction count. Stops at the first
    /// failure.
    pub fn validate(&self) -> Result<()> {
        let supply = i128::from(self.config.total_supply);
        let mut previous: Option<&Block> = None;

        for (&number, block) in &self.blocks {
            match previous {
                None => {
                    if block.previous_hash() != hash_str(&self.seed) {
                        return Err(corruption(
                            number,
                            IntegrityCheck::PreviousHash,
                            "genesis block is not linked to the ledger seed".to_string(),
                        ));
                    }
                }
                Some(prev) => {
                    if prev.compute_hash() != block.previous_hash() {
                        return Err(corruption(
                            number,
                            IntegrityCheck::PreviousHash,
                            format!(
                                "hash values in blocks {} & {} don't match",
                                number,
                                prev.number()
                            ),
                        ));
                    }
                }
            }

            let recomputed = block.compute_hash();
            if block.hash() != Some(recomputed.as_str()) {
                return Err(corruption(
                    number,
                    IntegrityCheck::BlockHash,
                    "stored hash does not match block contents".to_string(),
                ));
            }

            let total = block.total_balance();
            if total != supply {
                return Err(corruption(
                    number,
                    IntegrityCheck::Supply,
                    format!("sum of account balances is {}", total),
                ));
            }

            if block.len() != self.config.block_capacity {
                return Err(corruption(
                    number,
                    IntegrityCheck::TransactionCount,
                    format!(
                        "number of transactions is {}, expected {}",
                        block.len(),
                        self.config.block_capacity
                    ),
                ));
            }

            tracing::debug!("Block {} validated", number);
            previous = Some(block);
        }

        tracing::info!(
            "Validation of {} committed blocks completed successfully",
            self.blocks.len()
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn committed_block_mut(&mut self, number: u64) -> Option<&mut Block> {
        self.blocks.get_mut(&number)
    }
}

/// Apply one transfer to the working balances, or explain why it cannot settle
fn settle_transaction(txn: &Transaction, balances: &mut Balances, master: &Address) -> Result<()> {
    let available = balances
        .get(txn.payer())
        .map(Account::balance)
        .ok_or_else(|| Error::UnknownAccount {
            role: AccountRole::Payer,
            address: txn.payer().clone(),
        })?;

    if !balances.contains_key(txn.receiver()) {
        return Err(Error::UnknownAccount {
            role: AccountRole::Receiver,
            address: txn.receiver().clone(),
        });
    }

    if i128::from(available) < txn.total_debit() {
        return Err(Error::InsufficientFunds {
            payer: txn.payer().clone(),
            required: txn.total_debit(),
            available,
        });
    }

    // amount + fee <= available <= i64::MAX, so the sum cannot overflow
    let debit = txn.amount() + txn.fee();
    if let Some(payer) = balances.get_mut(txn.payer()) {
        payer.withdraw(debit);
    }
    if let Some(receiver) = balances.get_mut(txn.receiver()) {
        receiver.deposit(txn.amount());
    }
    if let Some(sink) = balances.get_mut(master) {
        sink.deposit(txn.fee());
    }

    Ok(())
}

fn parse_integer(text: &str) -> Result<i64> {
    text.trim().parse::<i64>().map_err(|_| {
        Error::validation(
            "create transaction",
            format!("{} cannot be parsed as an integer", text),
        )
    })
}

fn corruption(block: u64, check: IntegrityCheck, detail: String) -> Error {
    tracing::error!("Blockchain validation failed at block {}: {}", block, detail);
    Error::LedgerCorruption {
        block,
        check,
        detail,
    }
}
