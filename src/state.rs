use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{
    BorrowerId, LoanId, LoanStatus, TerminationKind, TerminationReason, VehicleDescriptor,
};

/// loan record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,

    // terms
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_weeks: u32,
    pub weekly_payment: Money,
    pub vehicle: VehicleDescriptor,

    // lifecycle
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
    pub remaining_balance: Money,
    pub derogatory_status: bool,
    pub termination: Option<TerminationRecord>,

    // external billing references
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    pub invoice_ids: Vec<String>,
}

impl Loan {
    /// create a new draft loan
    pub fn new(
        borrower_id: BorrowerId,
        principal: Money,
        annual_rate: Rate,
        term_weeks: u32,
        weekly_payment: Money,
        vehicle: VehicleDescriptor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            loan_id: Uuid::new_v4(),
            borrower_id,
            principal,
            annual_rate,
            term_weeks,
            weekly_payment,
            vehicle,
            status: LoanStatus::Draft,
            created_at,
            funded_at: None,
            remaining_balance: principal,
            derogatory_status: false,
            termination: None,
            product_id: None,
            price_id: None,
            invoice_ids: Vec::new(),
        }
    }

    /// schedule origin: funding date if known, else creation date
    pub fn origination_date(&self) -> DateTime<Utc> {
        self.funded_at.unwrap_or(self.created_at)
    }

    /// check if the loan accepts no further lifecycle operations
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// update status in place
    pub fn update_status(&mut self, new_status: LoanStatus) {
        self.status = new_status;
    }
}

/// borrower, owner of the payer identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Borrower {
    pub borrower_id: BorrowerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// external billing customer, created lazily on first funding
    pub payer_customer_id: Option<String>,
}

impl Borrower {
    pub fn new(name: &str, email: &str, phone: &str) -> Self {
        Self {
            borrower_id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            address_line: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            payer_customer_id: None,
        }
    }
}

/// terminal resolution metadata persisted on the loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationRecord {
    pub kind: TerminationKind,
    pub reason: TerminationReason,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// acting user reference
    pub actor: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vehicle() -> VehicleDescriptor {
        VehicleDescriptor {
            year: 2018,
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            vin: "2HGFC2F59JH000000".to_string(),
        }
    }

    #[test]
    fn test_new_loan_starts_in_draft() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let loan = Loan::new(
            Uuid::new_v4(),
            Money::from_major(2_968),
            Rate::from_percentage(26),
            16,
            Money::from_str_exact("185.50").unwrap(),
            vehicle(),
            created,
        );

        assert_eq!(loan.status, LoanStatus::Draft);
        assert_eq!(loan.remaining_balance, loan.principal);
        assert!(!loan.is_terminal());
        assert!(loan.invoice_ids.is_empty());
    }

    #[test]
    fn test_origination_date_prefers_funding_date() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let funded = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();

        let mut loan = Loan::new(
            Uuid::new_v4(),
            Money::from_major(1_000),
            Rate::from_percentage(20),
            10,
            Money::from_major(105),
            vehicle(),
            created,
        );
        assert_eq!(loan.origination_date(), created);

        loan.funded_at = Some(funded);
        assert_eq!(loan.origination_date(), funded);
    }

    #[test]
    fn test_loan_survives_json_round_trip() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let loan = Loan::new(
            Uuid::new_v4(),
            Money::from_major(2_968),
            Rate::from_percentage(26),
            16,
            Money::from_str_exact("185.50").unwrap(),
            vehicle(),
            created,
        );

        let json = serde_json::to_string(&loan).unwrap();
        let back: Loan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.loan_id, loan.loan_id);
        assert_eq!(back.status, loan.status);
        assert_eq!(back.weekly_payment, loan.weekly_payment);
        assert_eq!(back.vehicle, loan.vehicle);
    }
}
