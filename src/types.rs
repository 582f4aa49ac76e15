use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a borrower
pub type BorrowerId = Uuid;

/// unique identifier for an organization
pub type OrganizationId = Uuid;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// application drafted, nothing sent yet
    Draft,
    /// application sent to the borrower
    ApplicationSent,
    /// borrower completed the application
    ApplicationCompleted,
    /// approved by the ipay platform
    IpayApproved,
    /// approved by the dealer
    DealerApproved,
    /// all signing parties have signed
    FullySigned,
    /// signing declined or voided, back under review
    Review,
    /// billing provisioned, invoices issued
    Funded,
    /// funded and performing
    Active,
    /// held for review before derogatory marking
    PendingDerogatoryReview,
    /// closed by an operator, possibly balance-waived
    Closed,
    /// fully paid off
    Settled,
    /// written off as derogatory
    Derogatory,
}

impl LoanStatus {
    /// terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Closed | LoanStatus::Settled | LoanStatus::Derogatory
        )
    }

    /// statuses on the signing track, eligible for decline/void routing
    pub fn is_signing_track(&self) -> bool {
        matches!(
            self,
            LoanStatus::ApplicationSent
                | LoanStatus::ApplicationCompleted
                | LoanStatus::IpayApproved
                | LoanStatus::DealerApproved
                | LoanStatus::FullySigned
        )
    }

    /// statuses with billing live, eligible for the derogatory sidestep
    pub fn is_active_style(&self) -> bool {
        matches!(
            self,
            LoanStatus::Funded | LoanStatus::Active | LoanStatus::PendingDerogatoryReview
        )
    }
}

/// how a loan was terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    Closure,
    Derogatory,
}

/// operator-selected reason for closing or derogatory-marking a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    PaidOff,
    Repossession,
    TotalLoss,
    Refinanced,
    ChargeOff,
    /// requires a free-text note
    Other,
}

/// per-entry status in the payment schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Paid,
    Overdue,
}

/// lifecycle state of an external invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    /// created, not yet finalized or sent
    Draft,
    /// finalized, awaiting payment
    Open,
    Paid,
    Void,
    Deleted,
}

/// per-organization metered billing subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Inactive,
    Active,
    Canceled,
}

/// vehicle collateral descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDescriptor {
    pub year: u16,
    pub make: String,
    pub model: String,
    pub vin: String,
}
