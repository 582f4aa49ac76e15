use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::lifecycle::ensure_fundable;
use crate::processor::{
    CustomerRequest, InvoiceLine, InvoiceMetadata, InvoiceRequest, PaymentProcessor,
    ProcessorError,
};
use crate::schedule;
use crate::state::Borrower;
use crate::store::{BorrowerStore, LoanStore, ScheduleStore};
use crate::types::{LoanId, LoanStatus};

/// result of a successful funding run
#[derive(Debug, Clone)]
pub struct FundingOutcome {
    pub funded_at: DateTime<Utc>,
    pub product_id: String,
    pub price_id: String,
    pub invoice_ids: Vec<String>,
}

/// funds a fully-signed loan: provisions the payer identity, the billable
/// product and weekly price, and one invoice per schedule entry
pub struct FundingOrchestrator<'a> {
    loans: &'a dyn LoanStore,
    borrowers: &'a dyn BorrowerStore,
    schedules: &'a dyn ScheduleStore,
    processor: &'a dyn PaymentProcessor,
    config: &'a EngineConfig,
}

impl<'a> FundingOrchestrator<'a> {
    pub fn new(
        loans: &'a dyn LoanStore,
        borrowers: &'a dyn BorrowerStore,
        schedules: &'a dyn ScheduleStore,
        processor: &'a dyn PaymentProcessor,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            loans,
            borrowers,
            schedules,
            processor,
            config,
        }
    }

    /// fund a loan
    ///
    /// Failure policy: any processor failure aborts the whole operation and
    /// the status is left at fully_signed, so the call is retryable.
    /// Invoices already created before the failure are not rolled back; a
    /// retry can leave duplicates that an operator must reconcile manually.
    pub fn fund(
        &self,
        loan_id: LoanId,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<FundingOutcome> {
        let mut loan = self.loans.get(loan_id)?;
        ensure_fundable(loan.status)?;
        let mut borrower = self.borrowers.get(loan.borrower_id)?;

        let now = time_provider.now();
        loan.funded_at = Some(now);

        // schedule anchored on the funding date drives the invoice loop;
        // persisted only once every invoice exists, so an aborted attempt
        // leaves no schedule from a funding that never committed
        let entries = schedule::generate(&loan, self.config.interest_policy)?;

        let customer_id = self.resolve_payer_identity(&mut borrower, loan_id, events)?;

        let product = self
            .processor
            .create_product(&format!("loan {}", loan_id))
            .map_err(|e| fail(loan_id, "create product", e))?;
        let price = self
            .processor
            .create_weekly_price(&product.id, loan.weekly_payment.to_minor())
            .map_err(|e| fail(loan_id, "create price", e))?;

        let total_payments = loan.term_weeks;
        let mut invoice_ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            let k = entry.payment_number;
            let request = InvoiceRequest {
                customer_id: customer_id.clone(),
                auto_advance: true,
                due_date: Some(entry.due_date),
                // first invoice is finalized immediately below; the k-th
                // auto-finalizes one week before its due date
                automatically_finalizes_at: if k == 1 {
                    None
                } else {
                    Some(now + Duration::days(7 * (k as i64 - 1)))
                },
                metadata: InvoiceMetadata::Installment {
                    loan_id,
                    payment_number: k,
                    total_payments,
                },
            };

            let invoice = self
                .processor
                .create_invoice(&request)
                .map_err(|e| fail(loan_id, "create invoice", e))?;
            self.processor
                .add_invoice_line(
                    &invoice.id,
                    InvoiceLine {
                        description: format!("weekly payment {} of {}", k, total_payments),
                        amount_minor: entry.total_payment.to_minor(),
                    },
                )
                .map_err(|e| fail(loan_id, "add payment line", e))?;
            self.processor
                .add_invoice_line(
                    &invoice.id,
                    InvoiceLine {
                        description: "convenience fee".to_string(),
                        amount_minor: self.config.convenience_fee.to_minor(),
                    },
                )
                .map_err(|e| fail(loan_id, "add fee line", e))?;
            if k == 1 {
                self.processor
                    .finalize_invoice(&invoice.id)
                    .map_err(|e| fail(loan_id, "finalize first invoice", e))?;
            }

            events.emit(Event::InvoiceIssued {
                loan_id,
                invoice_id: invoice.id.clone(),
                payment_number: k,
            });
            invoice_ids.push(invoice.id);
        }

        // all invoices exist, persist the schedule and commit the status flip
        self.schedules
            .replace(loan_id, entries.clone())?;
        events.emit(Event::ScheduleGenerated {
            loan_id,
            entry_count: entries.len() as u32,
        });

        loan.product_id = Some(product.id.clone());
        loan.price_id = Some(price.id.clone());
        loan.invoice_ids = invoice_ids.clone();
        loan.remaining_balance = loan.weekly_payment * Decimal::from(loan.term_weeks);
        loan.update_status(LoanStatus::Funded);
        self.loans.update_checked(loan, LoanStatus::FullySigned)?;

        events.emit(Event::StatusChanged {
            loan_id,
            old_status: LoanStatus::FullySigned,
            new_status: LoanStatus::Funded,
            timestamp: now,
        });
        events.emit(Event::LoanFunded {
            loan_id,
            invoice_count: total_payments,
            funded_at: now,
        });
        info!(%loan_id, invoices = total_payments, "loan funded");

        Ok(FundingOutcome {
            funded_at: now,
            product_id: product.id,
            price_id: price.id,
            invoice_ids,
        })
    }

    /// reuse the borrower's payer identity or create it on first funding
    fn resolve_payer_identity(
        &self,
        borrower: &mut Borrower,
        loan_id: LoanId,
        events: &mut EventStore,
    ) -> Result<String> {
        if let Some(customer_id) = &borrower.payer_customer_id {
            return Ok(customer_id.clone());
        }

        let customer = self
            .processor
            .create_customer(&CustomerRequest {
                name: borrower.name.clone(),
                email: borrower.email.clone(),
                phone: borrower.phone.clone(),
                address_line: borrower.address_line.clone(),
                city: borrower.city.clone(),
                state: borrower.state.clone(),
                postal_code: borrower.postal_code.clone(),
            })
            .map_err(|e| fail(loan_id, "create customer", e))?;

        borrower.payer_customer_id = Some(customer.id.clone());
        self.borrowers.update(borrower.clone())?;
        events.emit(Event::PayerIdentityCreated {
            loan_id,
            customer_id: customer.id.clone(),
        });
        Ok(customer.id)
    }
}

fn fail(loan_id: LoanId, step: &'static str, source: ProcessorError) -> LoanError {
    error!(%loan_id, step, error = %source, "payment processor call failed");
    LoanError::processor(step, source)
}
