pub mod audit;
pub mod booking;
pub mod config;
pub mod domain;
pub mod errors;
pub mod forms;

pub use audit::{
    AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink, TracingAuditSink,
};
pub use booking::lifecycle::{BookingActor, BookingStateMachine, TransitionRequest};
pub use booking::orchestrator::{
    BookingOrchestrator, BookingPorts, BookingReceipt, SideEffect, SideEffectFailure,
};
pub use booking::pricing::{DeterministicPricingCalculator, PricingBreakdown, PricingCalculator};
pub use booking::retry::RetryPolicy;
pub use booking::{validate_and_price, BookingEngine, BookingQuote, Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::booking::{Booking, BookingDetails, BookingId, BookingStatus};
pub use domain::conversation::{Conversation, ConversationId, Message};
pub use domain::service::{DeliveryType, PriceTier, Service, ServiceId, ServiceType};
pub use domain::user::{CurrentUser, UserId};
pub use errors::{ApplicationError, BookingError, DomainError, InterfaceError, PersistenceError};
pub use forms::{
    default_form_configuration, AnswerValue, BookingSubmission, FieldError, FieldErrorReason,
    ServiceFormConfiguration,
};
