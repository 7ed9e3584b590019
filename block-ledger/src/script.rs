//! Line-oriented command scripts
//!
//! A script is plain text with one command per line. Blank lines and lines
//! starting with `#` are skipped. Tokens are separated by whitespace;
//! double-quoted strings form a single token. Only the command keyword is
//! case-insensitive.
//!
//! ```text
//! create-ledger test description "test ledger" seed "harvard"
//! create-account alice
//! process-transaction 1 amount 1000 fee 10 note "hello" payer master receiver alice
//! get-account-balance alice
//! get-block 1
//! get-transaction 1
//! validate
//! ```

use crate::{
    block::Block,
    config::LedgerConfig,
    ledger::Ledger,
    types::{Address, Transaction, TransactionId},
    Error,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

/// Failure of one script line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Line could not be turned into a command
    #[error("{reason}")]
    Parse {
        /// Attempted action
        action: &'static str,
        /// What was wrong with the line
        reason: String,
    },

    /// Command needs a ledger but none was created yet
    #[error("No ledger found")]
    NoLedger {
        /// Attempted action
        action: &'static str,
    },

    /// Ledger rejected the operation
    #[error(transparent)]
    Ledger(#[from] Error),
}

impl ScriptError {
    fn parse(action: &'static str, reason: impl Into<String>) -> Self {
        ScriptError::Parse {
            action,
            reason: reason.into(),
        }
    }

    /// The action that was being attempted
    pub fn action(&self) -> &'static str {
        match self {
            ScriptError::Parse { action, .. } | ScriptError::NoLedger { action } => action,
            ScriptError::Ledger(err) => err.action(),
        }
    }
}

/// One parsed script command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `create-ledger <name> description <text> seed <text>`
    CreateLedger {
        name: String,
        description: String,
        seed: String,
    },
    /// `create-account <address>`
    CreateAccount { address: String },
    /// `process-transaction <ref> amount <n> fee <n> note <text> payer <addr> receiver <addr>`
    ///
    /// Amount and fee stay textual so the ledger reports parse failures.
    ProcessTransaction {
        amount: String,
        fee: String,
        note: String,
        payer: String,
        receiver: String,
    },
    /// `get-account-balance <address>`
    GetAccountBalance { address: String },
    /// `get-account-balances`
    GetAccountBalances,
    /// `get-block <number>`
    GetBlock { number: u64 },
    /// `get-transaction <id>`
    GetTransaction { id: TransactionId },
    /// `validate`
    Validate,
}

impl Command {
    /// Parse one line; `Ok(None)` for blank lines and comments
    pub fn parse(line: &str) -> Result<Option<Self>, ScriptError> {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            return Ok(None);
        }

        let mut tokens = tokenize(line);
        let Some(keyword) = tokens.first_mut() else {
            return Ok(None);
        };
        *keyword = keyword.to_lowercase();
        let (keyword, rest) = tokens.split_at(1);
        let keyword = keyword[0].as_str();

        let args = match keyword {
            "create-ledger" | "create-account" | "get-account-balance" | "get-block"
            | "get-transaction" => Arguments::with_positional(rest),
            // Leading reference token is optional and ignored
            "process-transaction" if rest.len() % 2 == 1 => Arguments::pairs(&rest[1..]),
            _ => Arguments::pairs(rest),
        };

        let command = match keyword {
            "create-ledger" => Command::CreateLedger {
                name: args.positional(keyword)?,
                description: args.get("description")?,
                seed: args.get("seed")?,
            },
            "create-account" => Command::CreateAccount {
                address: args.positional(keyword)?,
            },
            "process-transaction" => Command::ProcessTransaction {
                amount: args.get("amount")?,
                fee: args.get("fee")?,
                note: args.get("note")?,
                payer: args.get("payer")?,
                receiver: args.get("receiver")?,
            },
            "get-account-balance" => Command::GetAccountBalance {
                address: args.positional(keyword)?,
            },
            "get-account-balances" => Command::GetAccountBalances,
            "get-block" => {
                let number = args.positional(keyword)?;
                Command::GetBlock {
                    number: number.parse().map_err(|_| {
                        ScriptError::parse("get block", "Block number must be an integer")
                    })?,
                }
            }
            "get-transaction" => Command::GetTransaction {
                id: args.positional(keyword)?.parse()?,
            },
            "validate" => Command::Validate,
            _ => return Err(ScriptError::parse("find command", "Invalid command")),
        };

        Ok(Some(command))
    }

    /// Action name used in error reports
    pub fn action(&self) -> &'static str {
        match self {
            Command::CreateLedger { .. } => "create ledger",
            Command::CreateAccount { .. } => "create account",
            Command::ProcessTransaction { .. } => "process transaction",
            Command::GetAccountBalance { .. } => "get account balance",
            Command::GetAccountBalances => "get account balances",
            Command::GetBlock { .. } => "get block",
            Command::GetTransaction { .. } => "get transaction",
            Command::Validate => "validate ledger",
        }
    }
}

/// Command arguments: an optional positional value, then `key value` pairs
struct Arguments<'a> {
    positional: Option<&'a String>,
    pairs: Vec<(&'a str, &'a String)>,
}

impl<'a> Arguments<'a> {
    fn pairs(tokens: &'a [String]) -> Self {
        Self {
            positional: None,
            pairs: tokens
                .chunks_exact(2)
                .map(|pair| (pair[0].as_str(), &pair[1]))
                .collect(),
        }
    }

    fn with_positional(tokens: &'a [String]) -> Self {
        match tokens.split_first() {
            Some((first, rest)) => Self {
                positional: Some(first),
                ..Self::pairs(rest)
            },
            None => Self::pairs(tokens),
        }
    }

    fn positional(&self, keyword: &str) -> Result<String, ScriptError> {
        self.positional
            .cloned()
            .ok_or_else(|| missing_argument(keyword))
    }

    fn get(&self, key: &str) -> Result<String, ScriptError> {
        self.pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| (*value).clone())
            .ok_or_else(|| missing_argument(key))
    }
}

fn missing_argument(key: &str) -> ScriptError {
    ScriptError::parse("get command arguments", format!("Missing argument: {}", key))
}

/// Split on whitespace, keeping double-quoted segments whole
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for (i, segment) in line.split('"').enumerate() {
        if i % 2 == 1 {
            tokens.push(segment.to_string());
        } else {
            tokens.extend(segment.split_whitespace().map(str::to_string));
        }
    }
    tokens
}

/// Transaction dropped from a batch, as reported to script users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedTransaction {
    /// Dropped transaction id
    pub id: TransactionId,
    /// Why it was dropped
    pub reason: String,
}

/// Successful result of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// New ledger replaced any previous one
    LedgerCreated {
        name: String,
    },
    /// Account registered in the open block
    AccountCreated {
        address: Address,
    },
    /// Transaction appended to the open block
    TransactionProcessed {
        id: TransactionId,
        /// Set when this submission committed a block
        committed_block: Option<u64>,
        rejected: Vec<RejectedTransaction>,
    },
    /// Committed balance of one account
    Balance {
        address: Address,
        balance: i64,
    },
    /// Every committed balance
    Balances {
        balances: BTreeMap<Address, i64>,
    },
    /// Committed block
    Block {
        block: Box<Block>,
    },
    /// Committed transaction
    Transaction {
        transaction: Transaction,
    },
    /// Chain passed validation
    Validated {
        blocks: u64,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::LedgerCreated { name } => write!(f, "Ledger {} created", name),
            Outcome::AccountCreated { address } => write!(f, "Account {} created", address),
            Outcome::TransactionProcessed {
                id,
                committed_block,
                rejected,
            } => {
                write!(f, "Transaction {} accepted", id)?;
                if let Some(number) = committed_block {
                    write!(f, "\nBlock {} committed", number)?;
                }
                for rejection in rejected {
                    write!(f, "\nTransaction {} rejected: {}", rejection.id, rejection.reason)?;
                }
                Ok(())
            }
            Outcome::Balance { address, balance } => {
                write!(f, "{} has a balance of {}", address, balance)
            }
            Outcome::Balances { balances } => {
                let mut first = true;
                for (address, balance) in balances {
                    if !first {
                        writeln!(f)?;
                    }
                    write!(f, "{}: {}", address, balance)?;
                    first = false;
                }
                Ok(())
            }
            Outcome::Block { block } => write!(f, "{}", block),
            Outcome::Transaction { transaction } => write!(f, "{}", transaction),
            Outcome::Validated { blocks } => {
                write!(f, "Ledger is valid ({} committed blocks)", blocks)
            }
        }
    }
}

/// Result of one non-blank script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReport {
    /// 1-based line number
    pub line: usize,
    /// Command text as written
    pub command: String,
    /// What happened
    pub result: Result<Outcome, ScriptError>,
}

impl LineReport {
    /// Machine-readable form
    pub fn to_json(&self) -> serde_json::Value {
        match &self.result {
            Ok(outcome) => serde_json::json!({
                "line": self.line,
                "command": self.command,
                "result": outcome,
            }),
            Err(err) => serde_json::json!({
                "line": self.line,
                "command": self.command,
                "error": {
                    "action": err.action(),
                    "reason": err.to_string(),
                },
            }),
        }
    }
}

impl fmt::Display for LineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(outcome) => write!(f, "{}", outcome),
            Err(err) => {
                writeln!(f, "{:<20} : {}", "ERROR AT LINE NUMBER", self.line)?;
                writeln!(f, "{:<20} : {}", "FAILED COMMAND", self.command)?;
                writeln!(f, "{:<20} : {}", "ACTION", err.action())?;
                write!(f, "{:<20} : {}", "REASON", err)
            }
        }
    }
}

/// Executes commands against at most one ledger
#[derive(Debug, Default)]
pub struct ScriptSession {
    rules: LedgerConfig,
    ledger: Option<Ledger>,
}

impl ScriptSession {
    /// Session whose ledgers use `rules`
    pub fn new(rules: LedgerConfig) -> Self {
        Self {
            rules,
            ledger: None,
        }
    }

    /// Current ledger, if one was created
    pub fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref()
    }

    /// Take the ledger out of the session
    pub fn into_ledger(self) -> Option<Ledger> {
        self.ledger
    }

    fn ledger_mut(&mut self, action: &'static str) -> Result<&mut Ledger, ScriptError> {
        self.ledger
            .as_mut()
            .ok_or(ScriptError::NoLedger { action })
    }

    /// Run one command
    pub fn execute(&mut self, command: Command) -> Result<Outcome, ScriptError> {
        let action = command.action();

        match command {
            Command::CreateLedger {
                name,
                description,
                seed,
            } => {
                if let Some(previous) = &self.ledger {
                    tracing::warn!("Replacing ledger {} with {}", previous.name(), name);
                }
                let ledger = Ledger::with_config(self.rules.clone(), name.clone(), description, seed)?;
                self.ledger = Some(ledger);
                Ok(Outcome::LedgerCreated { name })
            }

            Command::CreateAccount { address } => {
                let address = self.ledger_mut(action)?.create_account(&address)?;
                Ok(Outcome::AccountCreated { address })
            }

            Command::ProcessTransaction {
                amount,
                fee,
                note,
                payer,
                receiver,
            } => {
                let ledger = self.ledger_mut(action)?;
                let height = ledger.committed_height();

                let txn = ledger.create_transaction(&amount, &fee, &note, &payer, &receiver)?;
                let id = ledger.process_transaction(txn)?;

                let committed_block =
                    (ledger.committed_height() > height).then(|| ledger.committed_height());
                let rejected = ledger
                    .drain_rejections()
                    .into_iter()
                    .map(|r| RejectedTransaction {
                        id: r.transaction.id(),
                        reason: r.error.to_string(),
                    })
                    .collect();

                Ok(Outcome::TransactionProcessed {
                    id,
                    committed_block,
                    rejected,
                })
            }

            Command::GetAccountBalance { address } => {
                let balance = self.ledger_mut(action)?.get_account_balance(&address)?;
                Ok(Outcome::Balance {
                    address: Address::new(address),
                    balance,
                })
            }

            Command::GetAccountBalances => Ok(Outcome::Balances {
                balances: self.ledger_mut(action)?.get_account_balances()?,
            }),

            Command::GetBlock { number } => Ok(Outcome::Block {
                block: Box::new(self.ledger_mut(action)?.get_block(number)?),
            }),

            Command::GetTransaction { id } => Ok(Outcome::Transaction {
                transaction: self.ledger_mut(action)?.get_transaction(id)?,
            }),

            Command::Validate => {
                let ledger = self.ledger_mut(action)?;
                ledger.validate()?;
                Ok(Outcome::Validated {
                    blocks: ledger.committed_height(),
                })
            }
        }
    }

    /// Parse and run one line; `None` for blank lines and comments
    pub fn run_line(&mut self, line_number: usize, line: &str) -> Option<LineReport> {
        let result = match Command::parse(line) {
            Ok(None) => return None,
            Ok(Some(command)) => self.execute(command),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            tracing::debug!("Line {} failed: {}", line_number, err);
        }

        Some(LineReport {
            line: line_number,
            command: line.trim().to_string(),
            result,
        })
    }

    /// Run every line of a script; failed commands do not stop the script
    pub fn run<R: BufRead>(&mut self, reader: R) -> crate::Result<Vec<LineReport>> {
        let mut reports = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            if let Some(report) = self.run_line(index + 1, &line?) {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Run a script file
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> crate::Result<Vec<LineReport>> {
        let path = path.as_ref();
        tracing::info!("Running script {}", path.display());
        let file = std::fs::File::open(path)?;
        self.run(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FUND_ALICE: &str =
        "process-transaction 1 amount 100 fee 10 note \"fund alice\" payer master receiver alice";

    #[test]
    fn test_tokenize_keeps_quotes() {
        assert_eq!(
            tokenize("create-ledger test description \"a b  c\" seed x"),
            vec!["create-ledger", "test", "description", "a b  c", "seed", "x"]
        );
        assert_eq!(tokenize("note \"\" payer"), vec!["note", "", "payer"]);
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(Command::parse("# create-account bob").unwrap(), None);
    }

    #[test]
    fn test_parse_keyword_arguments() {
        let command = Command::parse(FUND_ALICE).unwrap().unwrap();
        assert_eq!(
            command,
            Command::ProcessTransaction {
                amount: "100".to_string(),
                fee: "10".to_string(),
                note: "fund alice".to_string(),
                payer: "master".to_string(),
                receiver: "alice".to_string(),
            }
        );

        // Keyword is case-insensitive, values are not
        let command = Command::parse("CREATE-ACCOUNT Bob").unwrap().unwrap();
        assert_eq!(
            command,
            Command::CreateAccount {
                address: "Bob".to_string()
            }
        );
    }

    #[test]
    fn test_values_matching_keywords() {
        let line = "process-transaction 7 amount 5 fee 10 note payer payer master receiver alice";
        let command = Command::parse(line).unwrap().unwrap();
        assert_eq!(
            command,
            Command::ProcessTransaction {
                amount: "5".to_string(),
                fee: "10".to_string(),
                note: "payer".to_string(),
                payer: "master".to_string(),
                receiver: "alice".to_string(),
            }
        );

        // Reference token is optional
        let line = "process-transaction amount 5 fee 10 note n payer master receiver note";
        let command = Command::parse(line).unwrap().unwrap();
        assert!(matches!(
            command,
            Command::ProcessTransaction { ref receiver, .. } if receiver == "note"
        ));

        let command = Command::parse("create-ledger seed description seed seed description")
            .unwrap()
            .unwrap();
        assert_eq!(
            command,
            Command::CreateLedger {
                name: "seed".to_string(),
                description: "seed".to_string(),
                seed: "description".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = Command::parse("create-ledger test seed x").unwrap_err();
        assert_eq!(err.to_string(), "Missing argument: description");
        assert_eq!(err.action(), "get command arguments");

        let err = Command::parse("get-block one").unwrap_err();
        assert_eq!(err.to_string(), "Block number must be an integer");

        let err = Command::parse("delete-ledger test").unwrap_err();
        assert_eq!(err.action(), "find command");

        assert!(Command::parse("get-transaction abc").is_err());
    }

    #[test]
    fn test_no_ledger() {
        let mut session = ScriptSession::default();
        let err = session
            .execute(Command::CreateAccount {
                address: "alice".to_string(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            ScriptError::NoLedger {
                action: "create account"
            }
        );
        assert_eq!(err.to_string(), "No ledger found");
    }

    #[test]
    fn test_run_script() {
        let mut script = String::from(
            "# setup\ncreate-ledger test description \"unit test\" seed \"harvard\"\ncreate-account alice\n\n",
        );
        for _ in 0..10 {
            script.push_str(FUND_ALICE);
            script.push('\n');
        }
        script.push_str("get-account-balance alice\nget-account-balance bob\nvalidate\n");

        let mut session = ScriptSession::default();
        let reports = session.run(script.as_bytes()).unwrap();

        assert_eq!(reports.len(), 15);
        assert_eq!(reports[0].line, 2);

        match &reports[11].result {
            Ok(Outcome::TransactionProcessed {
                committed_block, ..
            }) => assert_eq!(*committed_block, Some(1)),
            other => panic!("unexpected result {:?}", other),
        }

        assert_eq!(reports[12].to_string(), "alice has a balance of 1000");

        let failure = &reports[13];
        assert!(failure.result.is_err());
        let text = failure.to_string();
        assert!(text.contains("ERROR AT LINE NUMBER : 16"));
        assert!(text.contains("FAILED COMMAND       : get-account-balance bob"));
        assert!(text.contains("account bob does not exist"));

        assert_eq!(
            reports[14].result,
            Ok(Outcome::Validated { blocks: 1 })
        );
    }

    #[test]
    fn test_rejections_reported() {
        let mut session = ScriptSession::default();
        let mut script = String::from("create-ledger t description d seed s\ncreate-account bob\n");
        for _ in 0..9 {
            script.push_str("process-transaction 1 amount 1 fee 10 note n payer master receiver bob\n");
        }
        script.push_str("process-transaction 1 amount 1 fee 10 note n payer ghost receiver bob\n");

        let reports = session.run(script.as_bytes()).unwrap();
        match &reports.last().unwrap().result {
            Ok(Outcome::TransactionProcessed {
                id,
                committed_block,
                rejected,
            }) => {
                assert_eq!(*committed_block, None);
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].id, *id);
                assert_eq!(rejected[0].reason, "payer ghost does not exist");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_json_report() {
        let mut session = ScriptSession::default();
        let report = session
            .run_line(1, "create-ledger t description d seed s")
            .unwrap();
        let json = report.to_json();
        assert_eq!(json["result"]["outcome"], "ledger_created");
        assert_eq!(json["result"]["name"], "t");

        let report = session.run_line(2, "get-block 3").unwrap();
        let json = report.to_json();
        assert_eq!(json["error"]["action"], "get block");
    }

    #[test]
    fn test_run_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "create-ledger t description d seed s").unwrap();
        writeln!(file, "create-account alice").unwrap();
        writeln!(file, "get-account-balances").unwrap();

        let mut session = ScriptSession::default();
        let reports = session.run_file(file.path()).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports[2].result.as_ref().unwrap_err().to_string().contains("no block"));
        assert_eq!(session.ledger().unwrap().name(), "t");
    }

    #[test]
    fn test_missing_file() {
        let mut session = ScriptSession::default();
        assert!(matches!(
            session.run_file("/nonexistent/script.txt"),
            Err(Error::Io(_))
        ));
    }
}
