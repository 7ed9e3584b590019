//! Blocks and the ledger-wide transaction index
//!
//! A block starts OPEN: it accepts transactions and carries a working
//! balance snapshot inherited from its predecessor. `commit` moves it to
//! COMMITTED exactly once, after which every mutator fails with
//! `Error::AlreadyCommitted`.

use crate::crypto::{hash_concat, hash_str};
use crate::merkle::{MerkleProof, MerkleTree};
use crate::types::{Account, Address, Transaction, TransactionId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Balance snapshot keyed by address
pub type Balances = BTreeMap<Address, Account>;

/// Committed transaction together with the block that holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedTransaction {
    /// Owning block number
    pub block_number: u64,
    /// The committed transaction
    pub transaction: Transaction,
}

/// Lookup table of every committed transaction
#[derive(Debug, Clone, Default)]
pub struct TransactionIndex {
    entries: HashMap<TransactionId, IndexedTransaction>,
}

impl TransactionIndex {
    /// Create empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the id belongs to a committed transaction
    pub fn contains(&self, id: TransactionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Look up a committed transaction
    pub fn get(&self, id: TransactionId) -> Option<&IndexedTransaction> {
        self.entries.get(&id)
    }

    /// Number of committed transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, block_number: u64, transaction: Transaction) {
        self.entries.insert(
            transaction.id(),
            IndexedTransaction {
                block_number,
                transaction,
            },
        );
    }
}

/// Ordered batch of transactions plus the balance snapshot after they apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    number: u64,
    previous_hash: String,
    hash: Option<String>,
    transactions: Vec<Transaction>,
    balances: Balances,
    committed_at: Option<DateTime<Utc>>,
}

impl Block {
    /// Open a block that inherits `balances` from its predecessor
    pub fn open(number: u64, previous_hash: impl Into<String>, balances: Balances) -> Self {
        Self {
            number,
            previous_hash: previous_hash.into(),
            hash: None,
            transactions: Vec::new(),
            balances,
            committed_at: None,
        }
    }

    /// Genesis block: number 1, linked to the hash of the seed
    pub fn genesis(seed: &str) -> Self {
        Self::open(1, hash_str(seed), Balances::new())
    }

    /// Block number (genesis = 1)
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Hash of the predecessor (or of the seed for genesis)
    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// Block hash, set once committed
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Whether the block is frozen
    pub fn is_committed(&self) -> bool {
        self.hash.is_some()
    }

    /// Commit timestamp (not part of the hash)
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.committed_at
    }

    /// Transactions in submission order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions held
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if no transaction has been added
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Balance snapshot
    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    /// Balance of one address in this snapshot
    pub fn balance(&self, address: &str) -> Option<i64> {
        self.balances.get(address).map(Account::balance)
    }

    /// Sum of every balance in the snapshot
    pub fn total_balance(&self) -> i128 {
        self.balances
            .values()
            .map(|account| i128::from(account.balance()))
            .sum()
    }

    /// Whether an id is already pending in this block
    pub fn contains_transaction(&self, id: TransactionId) -> bool {
        self.transactions.iter().any(|txn| txn.id() == id)
    }

    /// Register a new account in the working snapshot
    pub(crate) fn add_account(&mut self, account: Account) -> Result<()> {
        self.ensure_open()?;
        self.balances.insert(account.address().clone(), account);
        Ok(())
    }

    /// Append a transaction to the open batch
    pub fn add_transaction(&mut self, txn: Transaction, index: &TransactionIndex) -> Result<()> {
        self.ensure_open()?;

        if index.contains(txn.id()) || self.contains_transaction(txn.id()) {
            return Err(Error::DuplicateTransactionId(txn.id()));
        }

        self.transactions.push(txn);
        Ok(())
    }

    /// Drop transactions rejected during batch validation
    pub(crate) fn remove_transactions(&mut self, rejected: &HashSet<TransactionId>) -> Result<()> {
        self.ensure_open()?;
        self.transactions.retain(|txn| !rejected.contains(&txn.id()));
        Ok(())
    }

    /// Freeze the block with its validated balances and index its transactions
    ///
    /// Returns the new block hash.
    pub fn commit(
        &mut self,
        final_balances: Balances,
        index: &mut TransactionIndex,
    ) -> Result<String> {
        self.ensure_open()?;

        self.balances = final_balances;
        let hash = self.compute_hash();

        for txn in &self.transactions {
            index.insert(self.number, txn.clone());
        }

        self.hash = Some(hash.clone());
        self.committed_at = Some(Utc::now());

        Ok(hash)
    }

    /// `H(H(number) ++ previous_hash ++ merkle_root)`
    pub fn compute_hash(&self) -> String {
        let number_hash = hash_str(&self.number.to_string());
        hash_concat(&[&number_hash, &self.previous_hash, &self.merkle_root()])
    }

    /// Merkle root over the canonical form of each transaction
    pub fn merkle_root(&self) -> String {
        self.merkle_tree().root()
    }

    /// Inclusion proof for one of this block's transactions
    pub fn transaction_proof(&self, id: TransactionId) -> Option<MerkleProof> {
        let position = self.transactions.iter().position(|txn| txn.id() == id)?;
        self.merkle_tree().generate_proof(position)
    }

    fn merkle_tree(&self) -> MerkleTree {
        MerkleTree::from_items(self.transactions.iter().map(ToString::to_string))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_committed() {
            return Err(Error::AlreadyCommitted(self.number));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }

    #[cfg(test)]
    pub(crate) fn balances_mut(&mut self) -> &mut Balances {
        &mut self.balances
    }

    #[cfg(test)]
    pub(crate) fn reseal(&mut self) {
        self.hash = Some(self.compute_hash());
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<22}: {}", "Block", self.number)?;
        writeln!(f, "{:<22}: {}", "Hash", self.hash.as_deref().unwrap_or("(open)"))?;
        writeln!(f, "{:<22}: {}", "Previous Block's Hash", self.previous_hash)?;
        writeln!(f)?;
        writeln!(f, "TRANSACTIONS")?;
        for txn in &self.transactions {
            writeln!(f, "{}", txn)?;
        }
        writeln!(f)?;
        writeln!(f, "{:<15}{:<15}", "ACCOUNT", "BALANCE")?;
        for (address, account) in &self.balances {
            writeln!(f, "{:<15}{:<15}", address, account.balance())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;

    fn txn(id: u64) -> Transaction {
        Transaction::new(
            TransactionId::new(id),
            1,
            10,
            format!("note {}", id),
            Address::new("master"),
            Address::new("alice"),
            &LedgerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_genesis_links_to_seed() {
        let block = Block::genesis("x");
        assert_eq!(block.number(), 1);
        assert_eq!(block.previous_hash(), hash_str("x"));
        assert!(!block.is_committed());
        assert!(block.balances().is_empty());
    }

    #[test]
    fn test_add_transaction_preserves_order() {
        let index = TransactionIndex::new();
        let mut block = Block::genesis("seed");

        for id in [3, 1, 2] {
            block.add_transaction(txn(id), &index).unwrap();
        }

        let ids: Vec<u64> = block.transactions().iter().map(|t| t.id().get()).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_duplicate_id_in_block_rejected() {
        let index = TransactionIndex::new();
        let mut block = Block::genesis("seed");

        block.add_transaction(txn(1), &index).unwrap();
        let err = block.add_transaction(txn(1), &index).unwrap_err();
        assert_eq!(err, Error::DuplicateTransactionId(TransactionId::new(1)));
    }

    #[test]
    fn test_duplicate_id_in_index_rejected() {
        let mut index = TransactionIndex::new();
        let mut first = Block::genesis("seed");
        first.add_transaction(txn(1), &index).unwrap();
        first.commit(Balances::new(), &mut index).unwrap();

        let mut second = Block::open(2, first.hash().unwrap(), Balances::new());
        let err = second.add_transaction(txn(1), &index).unwrap_err();
        assert!(matches!(err, Error::DuplicateTransactionId(_)));
    }

    #[test]
    fn test_commit_sets_hash_and_indexes() {
        let mut index = TransactionIndex::new();
        let mut block = Block::genesis("seed");
        block.add_transaction(txn(1), &index).unwrap();
        block.add_transaction(txn(2), &index).unwrap();

        let mut balances = Balances::new();
        balances.insert(
            Address::new("master"),
            Account::with_balance(Address::new("master"), 42),
        );

        let hash = block.commit(balances, &mut index).unwrap();

        assert!(block.is_committed());
        assert_eq!(block.hash(), Some(hash.as_str()));
        assert_eq!(block.balance("master"), Some(42));
        assert!(block.committed_at().is_some());
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(TransactionId::new(2)).unwrap().block_number, 1);
    }

    #[test]
    fn test_hash_formula() {
        let index = TransactionIndex::new();
        let mut block = Block::open(7, "prev", Balances::new());
        block.add_transaction(txn(1), &index).unwrap();

        let root = crate::merkle::root_hash([txn(1).to_string()]);
        let expected = hash_str(&format!("{}{}{}", hash_str("7"), "prev", root));
        assert_eq!(block.compute_hash(), expected);
    }

    #[test]
    fn test_committed_block_is_frozen() {
        let mut index = TransactionIndex::new();
        let mut block = Block::genesis("seed");
        block.add_transaction(txn(1), &index).unwrap();
        block.commit(Balances::new(), &mut index).unwrap();

        assert_eq!(
            block.add_transaction(txn(2), &index).unwrap_err(),
            Error::AlreadyCommitted(1)
        );
        assert_eq!(
            block.commit(Balances::new(), &mut index).unwrap_err(),
            Error::AlreadyCommitted(1)
        );
        assert!(block
            .add_account(Account::new(Address::new("late")))
            .is_err());
        assert!(block.remove_transactions(&HashSet::new()).is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let index = TransactionIndex::new();
        let mut block = Block::genesis("seed");
        block.add_transaction(txn(1), &index).unwrap();

        let mut copy = block.clone();
        copy.add_transaction(txn(2), &index).unwrap();

        assert_eq!(block.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn test_transaction_proof() {
        let index = TransactionIndex::new();
        let mut block = Block::genesis("seed");
        for id in 1..=5 {
            block.add_transaction(txn(id), &index).unwrap();
        }

        let proof = block.transaction_proof(TransactionId::new(4)).unwrap();
        assert_eq!(proof.root_hash, block.merkle_root());
        assert!(proof.proves(&txn(4).to_string()));
        assert!(block.transaction_proof(TransactionId::new(9)).is_none());
    }

    #[test]
    fn test_display_lists_accounts() {
        let mut block = Block::genesis("seed");
        block
            .add_account(Account::with_balance(Address::new("alice"), 5))
            .unwrap();

        let text = block.to_string();
        assert!(text.contains("Previous Block's Hash"));
        assert!(text.contains("TRANSACTIONS"));
        assert!(text.lines().any(|line| line.starts_with("alice") && line.contains('5')));
    }
}
