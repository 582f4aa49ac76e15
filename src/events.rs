use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{LoanId, LoanStatus, OrganizationId, TerminationKind};

/// domain events emitted by the lifecycle engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },
    PayerIdentityCreated {
        loan_id: LoanId,
        customer_id: String,
    },
    ScheduleGenerated {
        loan_id: LoanId,
        entry_count: u32,
    },
    InvoiceIssued {
        loan_id: LoanId,
        invoice_id: String,
        payment_number: u32,
    },
    LoanFunded {
        loan_id: LoanId,
        invoice_count: u32,
        funded_at: DateTime<Utc>,
    },
    InvoiceVoided {
        loan_id: LoanId,
        invoice_id: String,
    },
    InvoiceDeleted {
        loan_id: LoanId,
        invoice_id: String,
    },
    InvoiceCancellationFailed {
        loan_id: LoanId,
        invoice_id: String,
    },
    FinalInvoiceIssued {
        loan_id: LoanId,
        invoice_id: String,
        amount: Money,
        kind: TerminationKind,
    },
    LoanTerminated {
        loan_id: LoanId,
        kind: TerminationKind,
        remaining_balance: Money,
        timestamp: DateTime<Utc>,
    },
    UsageRecorded {
        organization_id: OrganizationId,
        verification_id: String,
        reported_externally: bool,
    },
    SubscriptionActivated {
        organization_id: OrganizationId,
        subscription_id: String,
    },
    SubscriptionCanceled {
        organization_id: OrganizationId,
        subscription_id: String,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
