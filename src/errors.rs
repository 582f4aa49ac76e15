use thiserror::Error;
use uuid::Uuid;

use crate::processor::ProcessorError;
use crate::types::LoanStatus;

#[derive(Error, Debug)]
pub enum LoanError {
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: LoanStatus, to: LoanStatus },

    #[error("funding requires fully_signed status, loan is {status:?}")]
    FundingNotAllowed { status: LoanStatus },

    #[error("loan already funded")]
    AlreadyFunded,

    #[error("loan already terminal: {status:?}")]
    AlreadyTerminal { status: LoanStatus },

    #[error("status moved concurrently: expected {expected:?}, found {actual:?}")]
    StatusConflict {
        expected: LoanStatus,
        actual: LoanStatus,
    },

    #[error("loan not found: {id}")]
    LoanNotFound { id: Uuid },

    #[error("borrower not found: {id}")]
    BorrowerNotFound { id: Uuid },

    #[error("no payer identity provisioned for loan {loan_id}")]
    MissingPayerIdentity { loan_id: Uuid },

    #[error("free-text note required when termination reason is 'other'")]
    MissingTerminationNote,

    #[error("invalid loan terms: {message}")]
    InvalidTerms { message: String },

    #[error("usage quantity must be positive")]
    InvalidUsageQuantity,

    #[error("no billing subscription for organization {organization_id}")]
    SubscriptionNotFound { organization_id: Uuid },

    #[error("payment processor failure during {step}: {source}")]
    Processor {
        step: &'static str,
        #[source]
        source: ProcessorError,
    },
}

impl LoanError {
    /// wrap a processor failure with the step it occurred in
    pub fn processor(step: &'static str, source: ProcessorError) -> Self {
        LoanError::Processor { step, source }
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;
