use chrono::Duration;
use hourglass_rs::SafeTimeProvider;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::lifecycle::ensure_terminable;
use crate::processor::{
    InvoiceLine, InvoiceMetadata, InvoiceRequest, PaymentProcessor, ProcessorError,
};
use crate::state::TerminationRecord;
use crate::store::{BorrowerStore, LoanStore};
use crate::types::{InvoiceState, LoanId, LoanStatus, TerminationKind, TerminationReason};

/// closure request, voluntary termination
#[derive(Debug, Clone)]
pub struct ClosureRequest {
    pub reason: TerminationReason,
    /// required when reason is `Other`
    pub note: Option<String>,
    /// acting user reference
    pub actor: String,
    /// waive the remaining balance instead of invoicing it
    pub waive_balance: bool,
}

/// derogatory marking request; the final balance is never waivable
#[derive(Debug, Clone)]
pub struct DerogatoryRequest {
    pub reason: TerminationReason,
    pub note: Option<String>,
    pub actor: String,
}

/// result of a termination run
#[derive(Debug, Clone)]
pub struct TerminationOutcome {
    pub payments_made: u32,
    pub payments_remaining: u32,
    pub remaining_balance: Money,
    pub final_invoice_id: Option<String>,
    pub canceled_invoices: u32,
    pub cancellation_failures: u32,
}

/// terminates a funded loan: cancels outstanding invoices and settles the
/// final balance, for both closure and derogatory marking
pub struct TerminationReconciler<'a> {
    loans: &'a dyn LoanStore,
    borrowers: &'a dyn BorrowerStore,
    processor: &'a dyn PaymentProcessor,
    config: &'a EngineConfig,
}

impl<'a> TerminationReconciler<'a> {
    pub fn new(
        loans: &'a dyn LoanStore,
        borrowers: &'a dyn BorrowerStore,
        processor: &'a dyn PaymentProcessor,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            loans,
            borrowers,
            processor,
            config,
        }
    }

    /// close a loan, optionally waiving the remaining balance
    pub fn close(
        &self,
        loan_id: LoanId,
        request: ClosureRequest,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TerminationOutcome> {
        self.terminate(
            loan_id,
            TerminationKind::Closure,
            request.reason,
            request.note,
            request.actor,
            request.waive_balance,
            time_provider,
            events,
        )
    }

    /// mark a loan derogatory; the final balance invoice is mandatory
    pub fn mark_derogatory(
        &self,
        loan_id: LoanId,
        request: DerogatoryRequest,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TerminationOutcome> {
        self.terminate(
            loan_id,
            TerminationKind::Derogatory,
            request.reason,
            request.note,
            request.actor,
            false,
            time_provider,
            events,
        )
    }

    /// shared closure/derogatory path
    ///
    /// Invoice cancellation is best-effort: a failure on one invoice is
    /// logged and skipped so it cannot block the rest. A failure creating
    /// the mandatory final invoice is fatal, the loan is not marked
    /// terminal without it.
    #[allow(clippy::too_many_arguments)]
    fn terminate(
        &self,
        loan_id: LoanId,
        kind: TerminationKind,
        reason: TerminationReason,
        note: Option<String>,
        actor: String,
        waive_balance: bool,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TerminationOutcome> {
        let mut loan = self.loans.get(loan_id)?;
        ensure_terminable(loan.status, kind)?;
        if reason == TerminationReason::Other && note.as_deref().unwrap_or("").trim().is_empty() {
            return Err(LoanError::MissingTerminationNote);
        }

        let borrower = self.borrowers.get(loan.borrower_id)?;
        let customer_id = borrower
            .payer_customer_id
            .ok_or(LoanError::MissingPayerIdentity { loan_id })?;

        let invoices: Vec<_> = self
            .processor
            .list_invoices(&customer_id)
            .map_err(|e| fail(loan_id, "list invoices", e))?
            .into_iter()
            .filter(|i| i.metadata.loan_id() == loan_id)
            .collect();

        let mut canceled = 0u32;
        let mut failures = 0u32;
        for invoice in &invoices {
            let result = match invoice.state {
                InvoiceState::Open => self.processor.void_invoice(&invoice.id).map(|()| {
                    events.emit(Event::InvoiceVoided {
                        loan_id,
                        invoice_id: invoice.id.clone(),
                    });
                }),
                InvoiceState::Draft => self.processor.delete_draft_invoice(&invoice.id).map(|()| {
                    events.emit(Event::InvoiceDeleted {
                        loan_id,
                        invoice_id: invoice.id.clone(),
                    });
                }),
                _ => continue,
            };
            match result {
                Ok(()) => canceled += 1,
                Err(e) => {
                    // one bad invoice must not block the rest
                    warn!(%loan_id, invoice_id = %invoice.id, error = %e, "invoice cancellation failed, skipping");
                    events.emit(Event::InvoiceCancellationFailed {
                        loan_id,
                        invoice_id: invoice.id.clone(),
                    });
                    failures += 1;
                }
            }
        }

        let payments_made = invoices
            .iter()
            .filter(|i| i.state == InvoiceState::Paid)
            .count() as u32;
        let payments_remaining = loan.term_weeks.saturating_sub(payments_made);
        // minor-unit arithmetic, no decimal drift
        let remaining_minor = payments_remaining as i64 * loan.weekly_payment.to_minor();
        let mut remaining_balance = Money::from_minor(remaining_minor);

        let waived = kind == TerminationKind::Closure && waive_balance;
        if waived {
            remaining_balance = Money::ZERO;
        }

        let now = time_provider.now();
        let mut final_invoice_id = None;
        if remaining_balance.is_positive() {
            let reason_text = reason_text(reason, note.as_deref());
            let invoice = self
                .processor
                .create_invoice(&InvoiceRequest {
                    customer_id: customer_id.clone(),
                    auto_advance: true,
                    due_date: Some(now + Duration::days(self.config.final_invoice_due_days)),
                    automatically_finalizes_at: None,
                    metadata: InvoiceMetadata::FinalBalance {
                        loan_id,
                        termination: kind,
                        reason: reason_text.clone(),
                    },
                })
                .map_err(|e| fail(loan_id, "create final invoice", e))?;
            self.processor
                .add_invoice_line(
                    &invoice.id,
                    InvoiceLine {
                        description: format!("final balance: {}", reason_text),
                        amount_minor: remaining_balance.to_minor(),
                    },
                )
                .map_err(|e| fail(loan_id, "add final balance line", e))?;
            self.processor
                .finalize_invoice(&invoice.id)
                .map_err(|e| fail(loan_id, "finalize final invoice", e))?;

            events.emit(Event::FinalInvoiceIssued {
                loan_id,
                invoice_id: invoice.id.clone(),
                amount: remaining_balance,
                kind,
            });
            final_invoice_id = Some(invoice.id);
        }

        // single guarded update carries status, reason, timestamp, actor,
        // and final balance together
        let prior_status = loan.status;
        let new_status = match kind {
            TerminationKind::Closure => LoanStatus::Closed,
            TerminationKind::Derogatory => LoanStatus::Derogatory,
        };
        loan.remaining_balance = remaining_balance;
        loan.derogatory_status = kind == TerminationKind::Derogatory;
        loan.termination = Some(TerminationRecord {
            kind,
            reason,
            note,
            occurred_at: now,
            actor,
        });
        loan.update_status(new_status);
        self.loans.update_checked(loan, prior_status)?;

        events.emit(Event::StatusChanged {
            loan_id,
            old_status: prior_status,
            new_status,
            timestamp: now,
        });
        events.emit(Event::LoanTerminated {
            loan_id,
            kind,
            remaining_balance,
            timestamp: now,
        });
        info!(
            %loan_id,
            ?kind,
            %remaining_balance,
            canceled,
            failures,
            "loan terminated"
        );

        Ok(TerminationOutcome {
            payments_made,
            payments_remaining,
            remaining_balance,
            final_invoice_id,
            canceled_invoices: canceled,
            cancellation_failures: failures,
        })
    }
}

/// human-readable reason carried on the final invoice
fn reason_text(reason: TerminationReason, note: Option<&str>) -> String {
    match reason {
        TerminationReason::PaidOff => "paid off".to_string(),
        TerminationReason::Repossession => "repossession".to_string(),
        TerminationReason::TotalLoss => "total loss".to_string(),
        TerminationReason::Refinanced => "refinanced".to_string(),
        TerminationReason::ChargeOff => "charge-off".to_string(),
        TerminationReason::Other => note.unwrap_or("other").to_string(),
    }
}

fn fail(loan_id: LoanId, step: &'static str, source: ProcessorError) -> LoanError {
    error!(%loan_id, step, error = %source, "payment processor call failed");
    LoanError::processor(step, source)
}
