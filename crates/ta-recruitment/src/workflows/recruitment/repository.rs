use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, DocumentStatus, HourBudget, Module, ModuleId,
    RecruitmentRound, RoundId, TaCategory, UserId,
};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("stored record is inconsistent: {0}")]
    Inconsistent(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub trait RoundRepository: Send + Sync {
    fn insert_round(&self, round: RecruitmentRound) -> Result<RecruitmentRound, RepositoryError>;
    fn fetch_round(&self, id: &RoundId) -> Result<Option<RecruitmentRound>, RepositoryError>;
    fn update_round(&self, round: RecruitmentRound) -> Result<(), RepositoryError>;
    fn rounds(&self) -> Result<Vec<RecruitmentRound>, RepositoryError>;
}

/// Module storage. Counters are embedded in the module record so that a slot can be
/// claimed with a single conditional update.
pub trait ModuleRepository: Send + Sync {
    fn insert_module(&self, module: Module) -> Result<Module, RepositoryError>;
    fn fetch_module(&self, id: &ModuleId) -> Result<Option<Module>, RepositoryError>;
    fn modules_in_round(&self, round: &RoundId) -> Result<Vec<Module>, RepositoryError>;

    /// Compare-and-swap: stores `module` only if the stored version still equals
    /// `module.version`, returning the stored copy with its version bumped.
    fn replace_module(&self, module: Module) -> Result<Module, RepositoryError>;

    /// Atomically claim one slot: matches an `advertised` module whose `category` is open
    /// with `remaining > 0`, decrements `remaining`, increments `applied`, and reconciles
    /// the status in the same write. `Ok(None)` when nothing matched.
    fn reserve_slot(
        &self,
        id: &ModuleId,
        category: TaCategory,
    ) -> Result<Option<Module>, RepositoryError>;

    /// Give back a slot taken by [`ModuleRepository::reserve_slot`] whose application was
    /// never persisted.
    fn release_slot(&self, id: &ModuleId, category: TaCategory) -> Result<Module, RepositoryError>;
}

pub trait ApplicationRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the student already has an
    /// application for the module.
    fn insert_application(&self, application: Application)
        -> Result<Application, RepositoryError>;
    fn fetch_application(&self, id: &ApplicationId)
        -> Result<Option<Application>, RepositoryError>;
    fn find_application(
        &self,
        student: &UserId,
        module: &ModuleId,
    ) -> Result<Option<Application>, RepositoryError>;
    fn applications_for_student(&self, student: &UserId)
        -> Result<Vec<Application>, RepositoryError>;
    fn applications_for_module(&self, module: &ModuleId)
        -> Result<Vec<Application>, RepositoryError>;

    /// Conditional status change; `Ok(None)` when the stored status is not `from`.
    fn transition_application(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        decided_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Application>, RepositoryError>;
}

pub trait BudgetRepository: Send + Sync {
    fn fetch_budget(
        &self,
        student: &UserId,
        round: &RoundId,
    ) -> Result<Option<HourBudget>, RepositoryError>;

    /// Insert `budget` unless the (student, round) pair already has one; returns the
    /// stored record either way.
    fn open_budget(&self, budget: HourBudget) -> Result<HourBudget, RepositoryError>;

    /// Subtract `hours` and append `application` if enough hours remain. `Ok(None)` when
    /// the budget would go negative.
    fn charge_budget(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) -> Result<Option<HourBudget>, RepositoryError>;

    /// Return `hours` charged for `application`. A refund for an application that is not
    /// on the budget is a no-op.
    fn refund_budget(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) -> Result<HourBudget, RepositoryError>;
}

/// Everything the recruitment service persists.
pub trait RecruitmentStore:
    RoundRepository + ModuleRepository + ApplicationRepository + BudgetRepository
{
}

impl<T> RecruitmentStore for T where
    T: RoundRepository + ModuleRepository + ApplicationRepository + BudgetRepository
{
}

/// Outbound e-mail hook. Delivery is fire-and-forget from the core's point of view.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub recipients: Vec<UserId>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Resolves the members of the round mailing-list groups.
pub trait MailingListDirectory: Send + Sync {
    fn members(&self, list: &str) -> Result<Vec<UserId>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("mailing list '{0}' does not exist")]
    UnknownList(String),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the onboarding document store.
pub trait DocumentGateway: Send + Sync {
    fn uploaded_document_status(&self, student: &UserId) -> Result<DocumentStatus, DocumentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}
