use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::processor::{PaymentProcessor, ProcessorError};
use crate::store::MeteringStore;
use crate::types::{OrganizationId, SubscriptionStatus};

/// append-only usage record, keyed uniquely by verification id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationUsageRecord {
    pub verification_id: String,
    pub organization_id: OrganizationId,
    /// identifier returned by the processor, when usage was forwarded
    pub usage_report_id: Option<String>,
    pub quantity: u32,
    pub recorded_at: DateTime<Utc>,
}

/// per-organization metered billing subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSubscription {
    pub organization_id: OrganizationId,
    pub status: SubscriptionStatus,
    pub billing_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_item_id: Option<String>,
    pub metered_price_id: Option<String>,
}

impl BillingSubscription {
    /// inactive placeholder for an organization with no subscription yet
    pub fn inactive(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            status: SubscriptionStatus::Inactive,
            billing_customer_id: None,
            subscription_id: None,
            subscription_item_id: None,
            metered_price_id: None,
        }
    }
}

/// outcome of a usage report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageOutcome {
    /// a record for this verification already existed; nothing was done
    AlreadyRecorded,
    Recorded {
        reported_externally: bool,
        usage_report_id: Option<String>,
    },
}

/// records completed verification events exactly once and forwards them to
/// the metered subscription while one is active
pub struct UsageBillingReporter<'a> {
    store: &'a dyn MeteringStore,
    processor: &'a dyn PaymentProcessor,
    config: &'a EngineConfig,
}

impl<'a> UsageBillingReporter<'a> {
    pub fn new(
        store: &'a dyn MeteringStore,
        processor: &'a dyn PaymentProcessor,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    /// report one completed verification
    ///
    /// Ordering is deliberate: check for an existing record, then forward
    /// externally only while the subscription is active, then always insert
    /// the local record. Local usage history stays complete even for
    /// organizations without an active subscription, and the external call
    /// never fires twice for the same verification id.
    pub fn report_verification(
        &self,
        organization_id: OrganizationId,
        verification_id: &str,
        quantity: u32,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<UsageOutcome> {
        if quantity == 0 {
            return Err(LoanError::InvalidUsageQuantity);
        }

        // idempotency boundary, evaluated before any external call
        if self.store.usage_record(verification_id)?.is_some() {
            info!(%organization_id, verification_id, "usage already recorded, skipping");
            return Ok(UsageOutcome::AlreadyRecorded);
        }

        let subscription = self.store.subscription(organization_id)?;
        let mut usage_report_id = None;
        if let Some(subscription) = &subscription {
            if subscription.status == SubscriptionStatus::Active {
                if let Some(customer_id) = &subscription.billing_customer_id {
                    let event = self
                        .processor
                        .record_metered_usage(
                            customer_id,
                            &self.config.metered_event_name,
                            quantity,
                        )
                        .map_err(|e| fail(verification_id, "record metered usage", e))?;
                    usage_report_id = Some(event.id);
                }
            }
        }

        let reported_externally = usage_report_id.is_some();
        let inserted = self.store.insert_usage(VerificationUsageRecord {
            verification_id: verification_id.to_string(),
            organization_id,
            usage_report_id: usage_report_id.clone(),
            quantity,
            recorded_at: time_provider.now(),
        })?;
        if !inserted {
            // concurrent duplicate won the insert; treat as a no-op
            warn!(%organization_id, verification_id, "usage record raced a duplicate insert");
            return Ok(UsageOutcome::AlreadyRecorded);
        }

        events.emit(Event::UsageRecorded {
            organization_id,
            verification_id: verification_id.to_string(),
            reported_externally,
        });

        Ok(UsageOutcome::Recorded {
            reported_externally,
            usage_report_id,
        })
    }

    /// activate the organization's metered subscription, creating it on the
    /// first activation request
    pub fn activate_subscription(
        &self,
        organization_id: OrganizationId,
        billing_customer_id: &str,
        metered_price_id: &str,
        events: &mut EventStore,
    ) -> Result<BillingSubscription> {
        if let Some(existing) = self.store.subscription(organization_id)? {
            if existing.status == SubscriptionStatus::Active {
                return Ok(existing);
            }
        }

        let created = self
            .processor
            .create_subscription(billing_customer_id, metered_price_id)
            .map_err(|e| {
                error!(%organization_id, error = %e, "subscription activation failed");
                LoanError::processor("create subscription", e)
            })?;

        let subscription = BillingSubscription {
            organization_id,
            status: SubscriptionStatus::Active,
            billing_customer_id: Some(billing_customer_id.to_string()),
            subscription_id: Some(created.id.clone()),
            subscription_item_id: Some(created.item_id),
            metered_price_id: Some(metered_price_id.to_string()),
        };
        self.store.upsert_subscription(subscription.clone())?;
        events.emit(Event::SubscriptionActivated {
            organization_id,
            subscription_id: created.id,
        });
        Ok(subscription)
    }

    /// cancel the organization's metered subscription; local usage keeps
    /// accumulating, it just stops being forwarded
    pub fn cancel_subscription(
        &self,
        organization_id: OrganizationId,
        events: &mut EventStore,
    ) -> Result<BillingSubscription> {
        let mut subscription = self
            .store
            .subscription(organization_id)?
            .ok_or(LoanError::SubscriptionNotFound { organization_id })?;
        let subscription_id =
            subscription
                .subscription_id
                .clone()
                .ok_or(LoanError::SubscriptionNotFound {
                    organization_id,
                })?;

        self.processor
            .cancel_subscription(&subscription_id)
            .map_err(|e| {
                error!(%organization_id, error = %e, "subscription cancellation failed");
                LoanError::processor("cancel subscription", e)
            })?;

        subscription.status = SubscriptionStatus::Canceled;
        self.store.upsert_subscription(subscription.clone())?;
        events.emit(Event::SubscriptionCanceled {
            organization_id,
            subscription_id,
        });
        Ok(subscription)
    }
}

fn fail(verification_id: &str, step: &'static str, source: ProcessorError) -> LoanError {
    error!(verification_id, step, error = %source, "payment processor call failed");
    LoanError::processor(step, source)
}
