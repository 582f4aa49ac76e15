use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{
    Customer, CustomerRequest, Invoice, InvoiceLine, InvoiceRequest, PaymentProcessor, Price,
    ProcResult, ProcessorError, Product, RecurringInterval, Subscription, UsageEvent,
};
use crate::types::{InvoiceState, SubscriptionStatus};

#[derive(Default)]
struct Inner {
    customers: HashMap<String, Customer>,
    products: HashMap<String, Product>,
    prices: HashMap<String, Price>,
    invoices: HashMap<String, Invoice>,
    subscriptions: HashMap<String, Subscription>,
    usage_events: Vec<UsageEvent>,
    next_id: u64,
    request_count: usize,
    fail_invoice_creation_after: Option<usize>,
    fail_cancellation_of: Vec<String>,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

/// in-memory payment processor for tests
///
/// Deterministic ids, a request counter so callers can assert that no
/// external calls were made, and failure injection for the partial-failure
/// paths in funding and termination.
#[derive(Default)]
pub struct InMemoryProcessor {
    inner: Mutex<Inner>,
}

impl InMemoryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// total processor calls made
    pub fn request_count(&self) -> usize {
        self.inner().request_count
    }

    /// make invoice creation fail once this many invoices exist
    pub fn fail_invoice_creation_after(&self, count: usize) {
        self.inner().fail_invoice_creation_after = Some(count);
    }

    /// make void/delete fail for a specific invoice
    pub fn fail_cancellation_of(&self, invoice_id: &str) {
        self.inner()
            .fail_cancellation_of
            .push(invoice_id.to_string());
    }

    /// test helper: settle an open invoice
    pub fn mark_invoice_paid(&self, invoice_id: &str) {
        if let Some(invoice) = self.inner().invoices.get_mut(invoice_id) {
            invoice.state = InvoiceState::Paid;
        }
    }

    pub fn invoice(&self, invoice_id: &str) -> Option<Invoice> {
        self.inner().invoices.get(invoice_id).cloned()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self.inner().invoices.values().cloned().collect();
        invoices.sort_by(|a, b| a.id.cmp(&b.id));
        invoices
    }

    pub fn usage_events(&self) -> Vec<UsageEvent> {
        self.inner().usage_events.clone()
    }
}

impl PaymentProcessor for InMemoryProcessor {
    fn create_customer(&self, request: &CustomerRequest) -> ProcResult<Customer> {
        let mut inner = self.inner();
        inner.request_count += 1;
        let id = inner.next_id("cus");
        let customer = Customer {
            id: id.clone(),
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            address_line: request.address_line.clone(),
            city: request.city.clone(),
            state: request.state.clone(),
            postal_code: request.postal_code.clone(),
        };
        inner.customers.insert(id, customer.clone());
        Ok(customer)
    }

    fn retrieve_customer(&self, customer_id: &str) -> ProcResult<Customer> {
        let mut inner = self.inner();
        inner.request_count += 1;
        inner
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| ProcessorError::NotFound {
                object: "customer",
                id: customer_id.to_string(),
            })
    }

    fn create_product(&self, name: &str) -> ProcResult<Product> {
        let mut inner = self.inner();
        inner.request_count += 1;
        let id = inner.next_id("prod");
        let product = Product {
            id: id.clone(),
            name: name.to_string(),
        };
        inner.products.insert(id, product.clone());
        Ok(product)
    }

    fn create_weekly_price(&self, product_id: &str, unit_amount_minor: i64) -> ProcResult<Price> {
        let mut inner = self.inner();
        inner.request_count += 1;
        if !inner.products.contains_key(product_id) {
            return Err(ProcessorError::NotFound {
                object: "product",
                id: product_id.to_string(),
            });
        }
        let id = inner.next_id("price");
        let price = Price {
            id: id.clone(),
            product_id: product_id.to_string(),
            unit_amount_minor,
            interval: RecurringInterval::Weekly,
        };
        inner.prices.insert(id, price.clone());
        Ok(price)
    }

    fn create_invoice(&self, request: &InvoiceRequest) -> ProcResult<Invoice> {
        let mut inner = self.inner();
        inner.request_count += 1;
        if let Some(limit) = inner.fail_invoice_creation_after {
            if inner.invoices.len() >= limit {
                return Err(ProcessorError::Unavailable {
                    message: "injected invoice creation failure".to_string(),
                });
            }
        }
        if !inner.customers.contains_key(&request.customer_id) {
            return Err(ProcessorError::NotFound {
                object: "customer",
                id: request.customer_id.clone(),
            });
        }
        let id = inner.next_id("in");
        let invoice = Invoice {
            id: id.clone(),
            customer_id: request.customer_id.clone(),
            state: InvoiceState::Draft,
            lines: Vec::new(),
            due_date: request.due_date,
            automatically_finalizes_at: request.automatically_finalizes_at,
            metadata: request.metadata.clone(),
        };
        inner.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    fn add_invoice_line(&self, invoice_id: &str, line: InvoiceLine) -> ProcResult<()> {
        let mut inner = self.inner();
        inner.request_count += 1;
        let invoice =
            inner
                .invoices
                .get_mut(invoice_id)
                .ok_or_else(|| ProcessorError::NotFound {
                    object: "invoice",
                    id: invoice_id.to_string(),
                })?;
        if invoice.state != InvoiceState::Draft {
            return Err(ProcessorError::InvalidInvoiceState {
                invoice_id: invoice_id.to_string(),
                state: invoice.state,
                required: InvoiceState::Draft,
            });
        }
        invoice.lines.push(line);
        Ok(())
    }

    fn finalize_invoice(&self, invoice_id: &str) -> ProcResult<Invoice> {
        let mut inner = self.inner();
        inner.request_count += 1;
        let invoice =
            inner
                .invoices
                .get_mut(invoice_id)
                .ok_or_else(|| ProcessorError::NotFound {
                    object: "invoice",
                    id: invoice_id.to_string(),
                })?;
        if invoice.state != InvoiceState::Draft {
            return Err(ProcessorError::InvalidInvoiceState {
                invoice_id: invoice_id.to_string(),
                state: invoice.state,
                required: InvoiceState::Draft,
            });
        }
        invoice.state = InvoiceState::Open;
        Ok(invoice.clone())
    }

    fn void_invoice(&self, invoice_id: &str) -> ProcResult<()> {
        let mut inner = self.inner();
        inner.request_count += 1;
        if inner.fail_cancellation_of.iter().any(|id| id == invoice_id) {
            return Err(ProcessorError::Unavailable {
                message: "injected cancellation failure".to_string(),
            });
        }
        let invoice =
            inner
                .invoices
                .get_mut(invoice_id)
                .ok_or_else(|| ProcessorError::NotFound {
                    object: "invoice",
                    id: invoice_id.to_string(),
                })?;
        if invoice.state != InvoiceState::Open {
            return Err(ProcessorError::InvalidInvoiceState {
                invoice_id: invoice_id.to_string(),
                state: invoice.state,
                required: InvoiceState::Open,
            });
        }
        invoice.state = InvoiceState::Void;
        Ok(())
    }

    fn delete_draft_invoice(&self, invoice_id: &str) -> ProcResult<()> {
        let mut inner = self.inner();
        inner.request_count += 1;
        if inner.fail_cancellation_of.iter().any(|id| id == invoice_id) {
            return Err(ProcessorError::Unavailable {
                message: "injected cancellation failure".to_string(),
            });
        }
        let invoice =
            inner
                .invoices
                .get_mut(invoice_id)
                .ok_or_else(|| ProcessorError::NotFound {
                    object: "invoice",
                    id: invoice_id.to_string(),
                })?;
        if invoice.state != InvoiceState::Draft {
            return Err(ProcessorError::InvalidInvoiceState {
                invoice_id: invoice_id.to_string(),
                state: invoice.state,
                required: InvoiceState::Draft,
            });
        }
        invoice.state = InvoiceState::Deleted;
        Ok(())
    }

    fn list_invoices(&self, customer_id: &str) -> ProcResult<Vec<Invoice>> {
        let mut inner = self.inner();
        inner.request_count += 1;
        let mut invoices: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(invoices)
    }

    fn create_subscription(&self, customer_id: &str, price_id: &str) -> ProcResult<Subscription> {
        let mut inner = self.inner();
        inner.request_count += 1;
        if !inner.customers.contains_key(customer_id) {
            return Err(ProcessorError::NotFound {
                object: "customer",
                id: customer_id.to_string(),
            });
        }
        let id = inner.next_id("sub");
        let item_id = inner.next_id("si");
        let subscription = Subscription {
            id: id.clone(),
            item_id,
            customer_id: customer_id.to_string(),
            price_id: price_id.to_string(),
            status: SubscriptionStatus::Active,
        };
        inner.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    fn cancel_subscription(&self, subscription_id: &str) -> ProcResult<Subscription> {
        let mut inner = self.inner();
        inner.request_count += 1;
        let subscription = inner.subscriptions.get_mut(subscription_id).ok_or_else(|| {
            ProcessorError::NotFound {
                object: "subscription",
                id: subscription_id.to_string(),
            }
        })?;
        subscription.status = SubscriptionStatus::Canceled;
        Ok(subscription.clone())
    }

    fn record_metered_usage(
        &self,
        customer_id: &str,
        event_name: &str,
        quantity: u32,
    ) -> ProcResult<UsageEvent> {
        let mut inner = self.inner();
        inner.request_count += 1;
        if !inner.customers.contains_key(customer_id) {
            return Err(ProcessorError::NotFound {
                object: "customer",
                id: customer_id.to_string(),
            });
        }
        let id = inner.next_id("usage");
        let event = UsageEvent {
            id,
            customer_id: customer_id.to_string(),
            event_name: event_name.to_string(),
            quantity,
            recorded_at: Utc::now(),
        };
        inner.usage_events.push(event.clone());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::InvoiceMetadata;
    use uuid::Uuid;

    fn customer_request() -> CustomerRequest {
        CustomerRequest {
            name: "Ada Borrower".to_string(),
            email: "ada@example.com".to_string(),
            phone: "555-0100".to_string(),
            address_line: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
        }
    }

    #[test]
    fn test_invoice_lifecycle() {
        let processor = InMemoryProcessor::new();
        let customer = processor.create_customer(&customer_request()).unwrap();

        let invoice = processor
            .create_invoice(&InvoiceRequest {
                customer_id: customer.id.clone(),
                auto_advance: true,
                due_date: None,
                automatically_finalizes_at: None,
                metadata: InvoiceMetadata::Installment {
                    loan_id: Uuid::new_v4(),
                    payment_number: 1,
                    total_payments: 16,
                },
            })
            .unwrap();
        assert_eq!(invoice.state, InvoiceState::Draft);

        processor
            .add_invoice_line(
                &invoice.id,
                InvoiceLine {
                    description: "weekly payment".to_string(),
                    amount_minor: 18550,
                },
            )
            .unwrap();

        let finalized = processor.finalize_invoice(&invoice.id).unwrap();
        assert_eq!(finalized.state, InvoiceState::Open);
        assert_eq!(finalized.total_minor(), 18550);

        // open invoices void, they cannot be deleted
        assert!(matches!(
            processor.delete_draft_invoice(&invoice.id),
            Err(ProcessorError::InvalidInvoiceState { .. })
        ));
        processor.void_invoice(&invoice.id).unwrap();
        assert_eq!(
            processor.invoice(&invoice.id).unwrap().state,
            InvoiceState::Void
        );
    }

    #[test]
    fn test_request_counter_and_failure_injection() {
        let processor = InMemoryProcessor::new();
        assert_eq!(processor.request_count(), 0);

        let customer = processor.create_customer(&customer_request()).unwrap();
        assert_eq!(processor.request_count(), 1);

        processor.fail_invoice_creation_after(0);
        let result = processor.create_invoice(&InvoiceRequest {
            customer_id: customer.id,
            auto_advance: false,
            due_date: None,
            automatically_finalizes_at: None,
            metadata: InvoiceMetadata::Installment {
                loan_id: Uuid::new_v4(),
                payment_number: 1,
                total_payments: 1,
            },
        });
        assert!(matches!(result, Err(ProcessorError::Unavailable { .. })));
        // failed calls still count as requests
        assert_eq!(processor.request_count(), 2);
    }

    #[test]
    fn test_subscription_cancel() {
        let processor = InMemoryProcessor::new();
        let customer = processor.create_customer(&customer_request()).unwrap();
        let subscription = processor
            .create_subscription(&customer.id, "price_meter")
            .unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Active);

        let canceled = processor.cancel_subscription(&subscription.id).unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
    }
}
