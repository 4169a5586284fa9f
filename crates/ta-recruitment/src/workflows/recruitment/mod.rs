//! Teaching-assistant recruitment: rounds of modules advertising TA positions, the
//! apply-for-TA allocation protocol, lecturer requirement edits and decisions, and the
//! administrator phases that close a round out.
//!
//! Storage is reached through the [`repository`] traits; [`memory`] carries the
//! mutex-backed implementation used by the API binary and the tests.

pub mod admin;
pub mod allocation;
pub mod catalog;
pub mod decisions;
pub mod domain;
pub mod memory;
pub mod repository;
pub mod requirements;
pub mod router;
pub mod service;
pub mod status;

#[cfg(test)]
mod tests;

pub use allocation::ApplyRequest;
pub use catalog::{parse_catalog, CatalogEntry, CatalogImportError};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, BudgetId, CounterPair, DocumentStatus,
    HourBudget, Module, ModuleId, ModuleStatus, NewModule, NewRound, RecruitmentRound,
    RequirementChange, RoundId, RoundSchedule, RoundStatus, TaCategory, UserId,
};
pub use memory::{
    InMemoryRecruitmentStore, RecordingNotifier, StaticDocumentStatus, StaticMailingLists,
};
pub use repository::{
    ApplicationRepository, BudgetRepository, DirectoryError, DocumentError, DocumentGateway,
    MailingListDirectory, ModuleRepository, Notification, Notifier, NotifyError,
    RecruitmentStore, RepositoryError, RoundRepository,
};
pub use requirements::apply_requirement_change;
pub use router::recruitment_router;
pub use service::{
    Advertisement, AllocationReceipt, ErrorKind, RecruitmentError, RecruitmentService,
};
pub use status::{IllegalTransition, ModuleEvent};
