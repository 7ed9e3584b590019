//! Actor-based access to a ledger
//!
//! The ledger itself is a synchronous single-writer state machine. This
//! module puts it behind a Tokio task so many async callers can share it:
//! every request goes through one bounded mailbox and is applied in arrival
//! order, which keeps id assignment and batch settlement linearizable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │        owns Ledger, replies over oneshot             │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    block::Block,
    ledger::{Ledger, Rejection},
    types::{Address, Transaction, TransactionId},
    Error, Result,
};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

/// Mailbox depth; senders wait once it is full
const MAILBOX_CAPACITY: usize = 1000;

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Register a zero-balance account
    CreateAccount {
        address: String,
        response: oneshot::Sender<Result<Address>>,
    },

    /// Build a transaction from typed fields
    CreateTransaction {
        amount: i64,
        fee: i64,
        note: String,
        payer: String,
        receiver: String,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Submit a transaction to the open block
    ProcessTransaction {
        transaction: Transaction,
        response: oneshot::Sender<Result<TransactionId>>,
    },

    /// Committed balance of one account
    GetAccountBalance {
        address: String,
        response: oneshot::Sender<Result<i64>>,
    },

    /// Every committed balance
    GetAccountBalances {
        response: oneshot::Sender<Result<BTreeMap<Address, i64>>>,
    },

    /// Copy of a committed block
    GetBlock {
        number: u64,
        response: oneshot::Sender<Result<Block>>,
    },

    /// Copy of a committed transaction
    GetTransaction {
        id: TransactionId,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Number of committed blocks
    CommittedHeight {
        response: oneshot::Sender<u64>,
    },

    /// Rejections recorded since the last drain
    DrainRejections {
        response: oneshot::Sender<Vec<Rejection>>,
    },

    /// Walk the chain
    Validate {
        response: oneshot::Sender<Result<()>>,
    },

    /// Stop the actor and hand the ledger back
    Shutdown {
        response: oneshot::Sender<Ledger>,
    },
}

/// Actor that owns the ledger
#[derive(Debug)]
pub struct LedgerActor {
    ledger: Ledger,
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Ledger, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { ledger, mailbox }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!("Ledger actor for {} started", self.ledger.name());

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown { response } => {
                    tracing::info!("Ledger actor for {} shutting down", self.ledger.name());
                    // Caller may have given up waiting; the ledger is dropped then
                    let _ = response.send(self.ledger);
                    return;
                }
                msg => self.handle_message(msg),
            }
        }

        tracing::info!("Ledger actor for {} stopped: all handles dropped", self.ledger.name());
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreateAccount { address, response } => {
                let _ = response.send(self.ledger.create_account(&address));
            }

            LedgerMessage::CreateTransaction {
                amount,
                fee,
                note,
                payer,
                receiver,
                response,
            } => {
                let result = self
                    .ledger
                    .new_transaction(amount, fee, &note, &payer, &receiver);
                let _ = response.send(result);
            }

            LedgerMessage::ProcessTransaction {
                transaction,
                response,
            } => {
                let _ = response.send(self.ledger.process_transaction(transaction));
            }

            LedgerMessage::GetAccountBalance { address, response } => {
                let _ = response.send(self.ledger.get_account_balance(&address));
            }

            LedgerMessage::GetAccountBalances { response } => {
                let _ = response.send(self.ledger.get_account_balances());
            }

            LedgerMessage::GetBlock { number, response } => {
                let _ = response.send(self.ledger.get_block(number));
            }

            LedgerMessage::GetTransaction { id, response } => {
                let _ = response.send(self.ledger.get_transaction(id));
            }

            LedgerMessage::CommittedHeight { response } => {
                let _ = response.send(self.ledger.committed_height());
            }

            LedgerMessage::DrainRejections { response } => {
                let _ = response.send(self.ledger.drain_rejections());
            }

            LedgerMessage::Validate { response } => {
                let _ = response.send(self.ledger.validate());
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Register a zero-balance account
    pub async fn create_account(&self, address: impl Into<String>) -> Result<Address> {
        let address = address.into();
        self.request(|response| LedgerMessage::CreateAccount { address, response })
            .await?
    }

    /// Build a validated transaction
    pub async fn create_transaction(
        &self,
        amount: i64,
        fee: i64,
        note: impl Into<String>,
        payer: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Result<Transaction> {
        let (note, payer, receiver) = (note.into(), payer.into(), receiver.into());
        self.request(|response| LedgerMessage::CreateTransaction {
            amount,
            fee,
            note,
            payer,
            receiver,
            response,
        })
        .await?
    }

    /// Submit a transaction
    pub async fn process_transaction(&self, transaction: Transaction) -> Result<TransactionId> {
        self.request(|response| LedgerMessage::ProcessTransaction {
            transaction,
            response,
        })
        .await?
    }

    /// Build and submit a transaction in one call
    pub async fn transfer(
        &self,
        amount: i64,
        fee: i64,
        note: impl Into<String>,
        payer: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Result<TransactionId> {
        let txn = self
            .create_transaction(amount, fee, note, payer, receiver)
            .await?;
        self.process_transaction(txn).await
    }

    /// Committed balance of one account
    pub async fn get_account_balance(&self, address: impl Into<String>) -> Result<i64> {
        let address = address.into();
        self.request(|response| LedgerMessage::GetAccountBalance { address, response })
            .await?
    }

    /// Every committed balance
    pub async fn get_account_balances(&self) -> Result<BTreeMap<Address, i64>> {
        self.request(|response| LedgerMessage::GetAccountBalances { response })
            .await?
    }

    /// Copy of a committed block
    pub async fn get_block(&self, number: u64) -> Result<Block> {
        self.request(|response| LedgerMessage::GetBlock { number, response })
            .await?
    }

    /// Copy of a committed transaction
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.request(|response| LedgerMessage::GetTransaction { id, response })
            .await?
    }

    /// Number of committed blocks
    pub async fn committed_height(&self) -> Result<u64> {
        self.request(|response| LedgerMessage::CommittedHeight { response })
            .await
    }

    /// Rejections recorded since the last drain
    pub async fn drain_rejections(&self) -> Result<Vec<Rejection>> {
        self.request(|response| LedgerMessage::DrainRejections { response })
            .await
    }

    /// Walk the chain
    pub async fn validate(&self) -> Result<()> {
        self.request(|response| LedgerMessage::Validate { response })
            .await?
    }

    /// Stop the actor and take the ledger back
    pub async fn shutdown(&self) -> Result<Ledger> {
        self.request(|response| LedgerMessage::Shutdown { response })
            .await
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(ledger: Ledger) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY); // Bounded channel for backpressure
    let actor = LedgerActor::new(ledger, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
