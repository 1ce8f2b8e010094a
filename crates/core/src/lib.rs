pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod parser;
pub mod period;
pub mod queue;
pub mod report;
pub mod store;
pub mod validator;
pub mod workflow;

pub use cache::TtlCache;
pub use catalog::{TokenCatalog, TokenDefinition};
pub use domain::grant::{Grant, GrantContext, GrantFollowUp, GrantId, StoredGrant};
pub use errors::{
    ApplicationError, DeliveryError, GrantError, GrantField, GrantRuleViolation, InterfaceError,
    StoreError, ValidationError,
};
pub use notify::{
    ChatDelivery, DeliveryOutcome, DeliveryStatus, DeliveryTarget, FanoutReport,
    NotificationFanout, OutboundMessage, ReportSink, SinkRecord,
};
pub use parser::parse_grant;
pub use period::{OrgCalendar, QuotaPeriod};
pub use queue::BackgroundQueue;
pub use report::{PersonalSummary, PublicReport, ReportService};
pub use store::GrantStore;
pub use validator::GrantValidator;
pub use workflow::{GrantOutcome, GrantService};
