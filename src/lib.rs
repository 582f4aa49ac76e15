pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod funding;
pub mod lifecycle;
pub mod metering;
pub mod processor;
pub mod schedule;
pub mod state;
pub mod store;
pub mod termination;
pub mod types;

// re-export key types
pub use config::{EngineConfig, InterestPolicy};
pub use decimal::{Money, Rate};
pub use errors::{LoanError, Result};
pub use events::{Event, EventStore};
pub use funding::{FundingOrchestrator, FundingOutcome};
pub use lifecycle::{
    ensure_fundable, ensure_terminable, route_signing_event, validate_transition, SigningEvent,
};
pub use metering::{
    BillingSubscription, UsageBillingReporter, UsageOutcome, VerificationUsageRecord,
};
pub use processor::{
    CredentialProvider, InMemoryProcessor, Invoice, InvoiceLine, InvoiceMetadata, PaymentProcessor,
    ProcessorError, StaticCredentials,
};
pub use schedule::PaymentScheduleEntry;
pub use state::{Borrower, Loan, TerminationRecord};
pub use store::{BorrowerStore, LoanStore, MemoryStore, MeteringStore, ScheduleStore};
pub use termination::{
    ClosureRequest, DerogatoryRequest, TerminationOutcome, TerminationReconciler,
};
pub use types::{
    EntryStatus, InvoiceState, LoanId, LoanStatus, OrganizationId, SubscriptionStatus,
    TerminationKind, TerminationReason, VehicleDescriptor,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
