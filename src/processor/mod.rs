pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{InvoiceState, LoanId, SubscriptionStatus, TerminationKind};

pub use memory::InMemoryProcessor;

/// failures surfaced by the payment processor
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("{object} not found: {id}")]
    NotFound { object: &'static str, id: String },

    #[error("invoice {invoice_id} is {state:?}, operation requires {required:?}")]
    InvalidInvoiceState {
        invoice_id: String,
        state: InvoiceState,
        required: InvoiceState,
    },

    #[error("request rejected: {message}")]
    Rejected { message: String },

    #[error("processor unavailable: {message}")]
    Unavailable { message: String },

    #[error("missing credentials: {message}")]
    Unauthorized { message: String },
}

pub type ProcResult<T> = std::result::Result<T, ProcessorError>;

/// credential source for processor clients
///
/// Injected at client construction and scoped per process; clients hold no
/// ambient global token state.
pub trait CredentialProvider: Send + Sync {
    /// current api key, refreshed by the provider as needed
    fn api_key(&self) -> ProcResult<String>;
}

/// fixed api key, for clients without a refresh lifecycle
pub struct StaticCredentials {
    api_key: String,
}

impl StaticCredentials {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> ProcResult<String> {
        if self.api_key.is_empty() {
            return Err(ProcessorError::Unauthorized {
                message: "empty api key".to_string(),
            });
        }
        Ok(self.api_key.clone())
    }
}

/// billable customer record held by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

/// new-customer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
}

/// recurring price scoped to one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub product_id: String,
    pub unit_amount_minor: i64,
    pub interval: RecurringInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringInterval {
    Weekly,
}

/// one invoice line item, amount in minor units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub amount_minor: i64,
}

/// typed invoice metadata
///
/// Carries enough context that reconciliation can recover the loan and
/// sequence position without a local join. A typed enum rather than a
/// free-form string map, so producer and consumer cannot drift on key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvoiceMetadata {
    /// one scheduled installment
    Installment {
        loan_id: LoanId,
        payment_number: u32,
        total_payments: u32,
    },
    /// the single final-balance invoice at termination
    FinalBalance {
        loan_id: LoanId,
        termination: TerminationKind,
        reason: String,
    },
}

impl InvoiceMetadata {
    pub fn loan_id(&self) -> LoanId {
        match self {
            InvoiceMetadata::Installment { loan_id, .. } => *loan_id,
            InvoiceMetadata::FinalBalance { loan_id, .. } => *loan_id,
        }
    }
}

/// new-invoice request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub customer_id: String,
    /// finalize and advance automatically when the finalization time arrives
    pub auto_advance: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub automatically_finalizes_at: Option<DateTime<Utc>>,
    pub metadata: InvoiceMetadata,
}

/// invoice as held by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub state: InvoiceState,
    pub lines: Vec<InvoiceLine>,
    pub due_date: Option<DateTime<Utc>>,
    pub automatically_finalizes_at: Option<DateTime<Utc>>,
    pub metadata: InvoiceMetadata,
}

impl Invoice {
    /// total across line items, minor units
    pub fn total_minor(&self) -> i64 {
        self.lines.iter().map(|l| l.amount_minor).sum()
    }
}

/// metered billing subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// subscription line carrying the metered price
    pub item_id: String,
    pub customer_id: String,
    pub price_id: String,
    pub status: SubscriptionStatus,
}

/// one emitted metered usage event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: String,
    pub customer_id: String,
    pub event_name: String,
    pub quantity: u32,
    pub recorded_at: DateTime<Utc>,
}

/// external payment processor capability
///
/// Calls are synchronous and blocking from the caller's perspective; no
/// retry wrapper is provided here, retries are the caller's responsibility.
pub trait PaymentProcessor {
    fn create_customer(&self, request: &CustomerRequest) -> ProcResult<Customer>;

    fn retrieve_customer(&self, customer_id: &str) -> ProcResult<Customer>;

    fn create_product(&self, name: &str) -> ProcResult<Product>;

    fn create_weekly_price(&self, product_id: &str, unit_amount_minor: i64) -> ProcResult<Price>;

    fn create_invoice(&self, request: &InvoiceRequest) -> ProcResult<Invoice>;

    fn add_invoice_line(&self, invoice_id: &str, line: InvoiceLine) -> ProcResult<()>;

    /// draft -> open
    fn finalize_invoice(&self, invoice_id: &str) -> ProcResult<Invoice>;

    /// open -> void
    fn void_invoice(&self, invoice_id: &str) -> ProcResult<()>;

    /// draft invoices only
    fn delete_draft_invoice(&self, invoice_id: &str) -> ProcResult<()>;

    fn list_invoices(&self, customer_id: &str) -> ProcResult<Vec<Invoice>>;

    fn create_subscription(&self, customer_id: &str, price_id: &str) -> ProcResult<Subscription>;

    fn cancel_subscription(&self, subscription_id: &str) -> ProcResult<Subscription>;

    fn record_metered_usage(
        &self,
        customer_id: &str,
        event_name: &str,
        quantity: u32,
    ) -> ProcResult<UsageEvent>;
}
