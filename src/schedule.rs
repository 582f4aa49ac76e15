use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::InterestPolicy;
use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::state::Loan;
use crate::store::ScheduleStore;
use crate::types::{EntryStatus, LoanId};

/// one projected installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentScheduleEntry {
    pub loan_id: LoanId,
    /// 1-based sequence number
    pub payment_number: u32,
    pub due_date: DateTime<Utc>,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub total_payment: Money,
    pub remaining_balance: Money,
    pub status: EntryStatus,
}

impl PaymentScheduleEntry {
    pub fn mark_paid(&mut self) {
        self.status = EntryStatus::Paid;
    }

    pub fn mark_overdue(&mut self) {
        self.status = EntryStatus::Overdue;
    }
}

/// generate the amortization table for a loan
///
/// Pure and deterministic: starting balance is the principal; each week
/// accrues interest at effective annual rate / 52, the rest of the fixed
/// weekly payment retires principal, and the balance floors at zero. Every
/// amount is rounded to cents per entry, not in aggregate. The interest
/// policy is applied here at generation time and never stored, so toggling
/// it retroactively changes schedules only when they are regenerated.
///
/// Known limitation: per-entry rounding can leave a small non-zero residual
/// on the final entry. The last entry reports `max(0, balance)` as-is; the
/// final payment amount is not trued up.
pub fn generate(loan: &Loan, policy: InterestPolicy) -> Result<Vec<PaymentScheduleEntry>> {
    if loan.term_weeks == 0 {
        return Err(LoanError::InvalidTerms {
            message: "term must be at least one week".to_string(),
        });
    }
    if !loan.weekly_payment.is_positive() {
        return Err(LoanError::InvalidTerms {
            message: format!("weekly payment must be positive, got {}", loan.weekly_payment),
        });
    }

    let origin = loan.origination_date();
    let weekly_rate = policy.effective_rate(loan.annual_rate).weekly_rate();

    let mut entries = Vec::with_capacity(loan.term_weeks as usize);
    let mut balance = loan.principal;

    for i in 1..=loan.term_weeks {
        let interest_portion = Money::from_decimal(balance.as_decimal() * weekly_rate.as_decimal());
        let principal_portion = loan.weekly_payment - interest_portion;
        balance = (balance - principal_portion).max(Money::ZERO);

        entries.push(PaymentScheduleEntry {
            loan_id: loan.loan_id,
            payment_number: i,
            due_date: origin + Duration::days(7 * i as i64),
            principal_portion,
            interest_portion,
            total_payment: loan.weekly_payment,
            remaining_balance: balance,
            status: EntryStatus::Pending,
        });
    }

    Ok(entries)
}

/// regenerate and persist the schedule for a loan
///
/// Replacement is transactional delete-then-insert through the store: a
/// concurrent reader sees either the old entries or the new ones, never a
/// mix. Regenerating with unchanged terms is idempotent.
pub fn regenerate(
    store: &dyn ScheduleStore,
    loan: &Loan,
    policy: InterestPolicy,
) -> Result<Vec<PaymentScheduleEntry>> {
    let entries = generate(loan, policy)?;
    store.replace(loan.loan_id, entries.clone())?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::store::MemoryStore;
    use crate::types::VehicleDescriptor;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn test_loan(principal: Money, rate: Rate, term: u32, payment: Money) -> Loan {
        Loan::new(
            Uuid::new_v4(),
            principal,
            rate,
            term,
            payment,
            VehicleDescriptor {
                year: 2019,
                make: "Toyota".to_string(),
                model: "Corolla".to_string(),
                vin: "5YFBURHE0KP000000".to_string(),
            },
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_schedule_has_term_entries_seven_days_apart() {
        let loan = test_loan(
            Money::from_major(2_968),
            Rate::from_percentage(26),
            16,
            Money::from_str_exact("185.50").unwrap(),
        );

        let entries = generate(&loan, InterestPolicy::Standard).unwrap();
        assert_eq!(entries.len(), 16);

        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.payment_number, i as u32 + 1);
            assert_eq!(
                entry.due_date,
                loan.created_at + Duration::days(7 * (i as i64 + 1))
            );
            assert!(!entry.remaining_balance.is_negative());
            assert_eq!(entry.status, EntryStatus::Pending);
            assert_eq!(entry.total_payment, loan.weekly_payment);
        }

        // each entry splits the fixed payment between principal and interest
        for entry in &entries {
            assert_eq!(
                entry.principal_portion + entry.interest_portion,
                entry.total_payment
            );
        }
    }

    #[test]
    fn test_interest_declines_as_balance_falls() {
        let loan = test_loan(
            Money::from_major(5_000),
            Rate::from_percentage(20),
            26,
            Money::from_str_exact("202.00").unwrap(),
        );

        let entries = generate(&loan, InterestPolicy::Standard).unwrap();
        for pair in entries.windows(2) {
            assert!(pair[1].interest_portion <= pair[0].interest_portion);
            assert!(pair[1].remaining_balance <= pair[0].remaining_balance);
        }
    }

    #[test]
    fn test_interest_free_policy_zeroes_interest() {
        let loan = test_loan(
            Money::from_major(1_600),
            Rate::from_percentage(26),
            16,
            Money::from_major(100),
        );

        let entries = generate(&loan, InterestPolicy::InterestFree).unwrap();
        for entry in &entries {
            assert!(entry.interest_portion.is_zero());
            assert_eq!(entry.principal_portion, loan.weekly_payment);
        }
        // even division reaches exactly zero
        assert!(entries.last().unwrap().remaining_balance.is_zero());
        // stored rate on the loan is untouched
        assert_eq!(loan.annual_rate, Rate::from_percentage(26));
    }

    #[test]
    fn test_rounding_residual_is_reported_not_corrected() {
        // payment deliberately too small to fully amortize
        let loan = test_loan(
            Money::from_major(1_000),
            Rate::from_percentage(26),
            4,
            Money::from_major(100),
        );

        let entries = generate(&loan, InterestPolicy::Standard).unwrap();
        let last = entries.last().unwrap();
        assert!(last.remaining_balance.is_positive());
        // payment amount stays the configured fixed payment
        assert_eq!(last.total_payment, loan.weekly_payment);
    }

    #[test]
    fn test_regeneration_is_idempotent_replace() {
        let store = MemoryStore::new();
        let loan = test_loan(
            Money::from_major(2_968),
            Rate::from_percentage(26),
            16,
            Money::from_str_exact("185.50").unwrap(),
        );

        let first = regenerate(&store, &loan, InterestPolicy::Standard).unwrap();
        let second = regenerate(&store, &loan, InterestPolicy::Standard).unwrap();

        assert_eq!(first, second);
        // replaced, not appended
        let stored = store.entries(loan.loan_id).unwrap();
        assert_eq!(stored.len(), 16);
        assert_eq!(stored, second);
    }

    #[test]
    fn test_zero_term_rejected() {
        let loan = test_loan(
            Money::from_major(1_000),
            Rate::from_percentage(10),
            0,
            Money::from_major(100),
        );
        assert!(matches!(
            generate(&loan, InterestPolicy::Standard),
            Err(LoanError::InvalidTerms { .. })
        ));
    }
}
