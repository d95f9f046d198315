use crate::error::WorkflowError;
use crate::workflow::AccountReport;
use async_trait::async_trait;
use serde::Serialize;

/// A confirmed transaction: hash plus the block it landed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub tx_hash: String,
    pub block_number: u64,
}

/// What a successful step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A transaction was submitted and confirmed.
    Confirmed(TransactionOutcome),
    /// The step's effect already holds on-chain, nothing was sent.
    AlreadySatisfied { detail: String },
    /// Read-only or off-chain work finished.
    Done { detail: String },
}

impl StepOutcome {
    pub fn satisfied(detail: impl Into<String>) -> Self {
        StepOutcome::AlreadySatisfied {
            detail: detail.into(),
        }
    }

    pub fn done(detail: impl Into<String>) -> Self {
        StepOutcome::Done {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StepOutcome::Confirmed(_) => "confirmed",
            StepOutcome::AlreadySatisfied { .. } => "already_satisfied",
            StepOutcome::Done { .. } => "done",
        }
    }

    pub fn transaction(&self) -> Option<&TransactionOutcome> {
        match self {
            StepOutcome::Confirmed(tx) => Some(tx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Skip { reason: String },
}

impl GateDecision {
    pub fn skip(reason: impl Into<String>) -> Self {
        GateDecision::Skip {
            reason: reason.into(),
        }
    }
}

/// One ordered unit of a workflow.
#[async_trait]
pub trait Step<Ctx: Sync>: Send + Sync {
    /// Returns the name of the step
    fn name(&self) -> &str;

    /// Value-moving steps get a randomized pause between them.
    fn moves_value(&self) -> bool {
        false
    }

    /// Optional steps log their failure and let the workflow continue.
    fn optional(&self) -> bool {
        false
    }

    /// Executes the step
    async fn run(&self, ctx: &Ctx) -> Result<StepOutcome, WorkflowError>;
}

/// Eligibility check evaluated before any step of a workflow runs.
#[async_trait]
pub trait Gate<Ctx: Sync>: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &Ctx) -> Result<GateDecision, WorkflowError>;
}

/// Runs every workflow for one account. The scheduler's unit of work.
#[async_trait]
pub trait AccountProcessor: Send + Sync {
    type Account: Send + Sync;

    async fn process(&self, account: &Self::Account) -> AccountReport;
}
