use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{LoanError, Result};
use crate::metering::{BillingSubscription, VerificationUsageRecord};
use crate::schedule::PaymentScheduleEntry;
use crate::state::{Borrower, Loan};
use crate::types::{BorrowerId, LoanId, LoanStatus, OrganizationId};

/// loan persistence
pub trait LoanStore {
    fn get(&self, id: LoanId) -> Result<Loan>;

    fn insert(&self, loan: Loan) -> Result<()>;

    /// guarded whole-record write: commits only if the stored status still
    /// equals `expected_status`, otherwise fails with `StatusConflict` and
    /// leaves the record untouched. This is the serialization point for
    /// concurrent funding/termination of the same loan.
    fn update_checked(&self, loan: Loan, expected_status: LoanStatus) -> Result<()>;
}

/// borrower persistence
pub trait BorrowerStore {
    fn get(&self, id: BorrowerId) -> Result<Borrower>;

    fn insert(&self, borrower: Borrower) -> Result<()>;

    fn update(&self, borrower: Borrower) -> Result<()>;
}

/// payment schedule persistence
pub trait ScheduleStore {
    /// transactional delete-then-insert: readers see the old entries or the
    /// new ones, never a mix
    fn replace(&self, loan_id: LoanId, entries: Vec<PaymentScheduleEntry>) -> Result<()>;

    fn entries(&self, loan_id: LoanId) -> Result<Vec<PaymentScheduleEntry>>;
}

/// usage records and billing subscriptions
pub trait MeteringStore {
    /// insert keyed uniquely by verification id; returns false without
    /// writing when a record for that verification already exists
    fn insert_usage(&self, record: VerificationUsageRecord) -> Result<bool>;

    fn usage_record(&self, verification_id: &str) -> Result<Option<VerificationUsageRecord>>;

    fn subscription(&self, organization_id: OrganizationId) -> Result<Option<BillingSubscription>>;

    fn upsert_subscription(&self, subscription: BillingSubscription) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    loans: HashMap<LoanId, Loan>,
    borrowers: HashMap<BorrowerId, Borrower>,
    schedules: HashMap<LoanId, Vec<PaymentScheduleEntry>>,
    usage: HashMap<String, VerificationUsageRecord>,
    subscriptions: HashMap<OrganizationId, BillingSubscription>,
}

/// in-memory store backing tests and examples
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LoanStore for MemoryStore {
    fn get(&self, id: LoanId) -> Result<Loan> {
        self.tables()
            .loans
            .get(&id)
            .cloned()
            .ok_or(LoanError::LoanNotFound { id })
    }

    fn insert(&self, loan: Loan) -> Result<()> {
        self.tables().loans.insert(loan.loan_id, loan);
        Ok(())
    }

    fn update_checked(&self, loan: Loan, expected_status: LoanStatus) -> Result<()> {
        let mut tables = self.tables();
        let stored = tables
            .loans
            .get(&loan.loan_id)
            .ok_or(LoanError::LoanNotFound { id: loan.loan_id })?;
        if stored.status != expected_status {
            return Err(LoanError::StatusConflict {
                expected: expected_status,
                actual: stored.status,
            });
        }
        tables.loans.insert(loan.loan_id, loan);
        Ok(())
    }
}

impl BorrowerStore for MemoryStore {
    fn get(&self, id: BorrowerId) -> Result<Borrower> {
        self.tables()
            .borrowers
            .get(&id)
            .cloned()
            .ok_or(LoanError::BorrowerNotFound { id })
    }

    fn insert(&self, borrower: Borrower) -> Result<()> {
        self.tables()
            .borrowers
            .insert(borrower.borrower_id, borrower);
        Ok(())
    }

    fn update(&self, borrower: Borrower) -> Result<()> {
        let mut tables = self.tables();
        if !tables.borrowers.contains_key(&borrower.borrower_id) {
            return Err(LoanError::BorrowerNotFound {
                id: borrower.borrower_id,
            });
        }
        tables.borrowers.insert(borrower.borrower_id, borrower);
        Ok(())
    }
}

impl ScheduleStore for MemoryStore {
    fn replace(&self, loan_id: LoanId, entries: Vec<PaymentScheduleEntry>) -> Result<()> {
        // single map write under the lock, old and new never interleave
        self.tables().schedules.insert(loan_id, entries);
        Ok(())
    }

    fn entries(&self, loan_id: LoanId) -> Result<Vec<PaymentScheduleEntry>> {
        Ok(self
            .tables()
            .schedules
            .get(&loan_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl MeteringStore for MemoryStore {
    fn insert_usage(&self, record: VerificationUsageRecord) -> Result<bool> {
        let mut tables = self.tables();
        if tables.usage.contains_key(&record.verification_id) {
            return Ok(false);
        }
        tables.usage.insert(record.verification_id.clone(), record);
        Ok(true)
    }

    fn usage_record(&self, verification_id: &str) -> Result<Option<VerificationUsageRecord>> {
        Ok(self.tables().usage.get(verification_id).cloned())
    }

    fn subscription(&self, organization_id: OrganizationId) -> Result<Option<BillingSubscription>> {
        Ok(self.tables().subscriptions.get(&organization_id).cloned())
    }

    fn upsert_subscription(&self, subscription: BillingSubscription) -> Result<()> {
        self.tables()
            .subscriptions
            .insert(subscription.organization_id, subscription);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::types::VehicleDescriptor;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample_loan() -> Loan {
        Loan::new(
            Uuid::new_v4(),
            Money::from_major(2_000),
            Rate::from_percentage(22),
            12,
            Money::from_major(180),
            VehicleDescriptor {
                year: 2017,
                make: "Ford".to_string(),
                model: "Focus".to_string(),
                vin: "1FADP3F20HL000000".to_string(),
            },
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_update_checked_commits_on_matching_status() {
        let store = MemoryStore::new();
        let mut loan = sample_loan();
        LoanStore::insert(&store, loan.clone()).unwrap();

        loan.update_status(LoanStatus::ApplicationSent);
        store.update_checked(loan.clone(), LoanStatus::Draft).unwrap();

        assert_eq!(
            LoanStore::get(&store, loan.loan_id).unwrap().status,
            LoanStatus::ApplicationSent
        );
    }

    #[test]
    fn test_update_checked_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let mut loan = sample_loan();
        LoanStore::insert(&store, loan.clone()).unwrap();

        loan.update_status(LoanStatus::Funded);
        let result = store.update_checked(loan.clone(), LoanStatus::FullySigned);
        assert!(matches!(
            result,
            Err(LoanError::StatusConflict {
                expected: LoanStatus::FullySigned,
                actual: LoanStatus::Draft,
            })
        ));

        // stored record untouched
        assert_eq!(
            LoanStore::get(&store, loan.loan_id).unwrap().status,
            LoanStatus::Draft
        );
    }

    #[test]
    fn test_usage_insert_is_unique_by_verification_id() {
        let store = MemoryStore::new();
        let record = VerificationUsageRecord {
            verification_id: "vs_123".to_string(),
            organization_id: Uuid::new_v4(),
            usage_report_id: Some("usage_1".to_string()),
            quantity: 1,
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        };

        assert!(store.insert_usage(record.clone()).unwrap());
        assert!(!store.insert_usage(record.clone()).unwrap());

        let stored = store.usage_record("vs_123").unwrap().unwrap();
        assert_eq!(stored.usage_report_id.as_deref(), Some("usage_1"));
    }
}
