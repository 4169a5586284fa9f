use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, BudgetId, HourBudget, Module, ModuleId, RecruitmentRound,
    RoundId, TaCategory, UserId,
};
use super::repository::{
    DocumentGateway, MailingListDirectory, Notification, Notifier, RecruitmentStore,
    RepositoryError,
};
use super::status::IllegalTransition;
use crate::config::RecruitmentConfig;

/// Service composing the store with the notification, directory, and document
/// collaborators. Handlers share one instance behind an `Arc`.
pub struct RecruitmentService<S, N> {
    pub(super) store: Arc<S>,
    pub(super) notifier: Arc<N>,
    pub(super) directory: Arc<dyn MailingListDirectory>,
    pub(super) documents: Arc<dyn DocumentGateway>,
    pub(super) config: RecruitmentConfig,
}

static ROUND_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static MODULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static BUDGET_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(super) fn next_round_id() -> RoundId {
    let id = ROUND_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RoundId(format!("round-{id:04}"))
}

pub(super) fn next_module_id() -> ModuleId {
    let id = MODULE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ModuleId(format!("mod-{id:05}"))
}

pub(super) fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

pub(super) fn next_budget_id() -> BudgetId {
    let id = BUDGET_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BudgetId(format!("budget-{id:06}"))
}

impl<S, N> RecruitmentService<S, N>
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        directory: Arc<dyn MailingListDirectory>,
        documents: Arc<dyn DocumentGateway>,
        config: RecruitmentConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
            documents,
            config,
        }
    }

    pub fn config(&self) -> &RecruitmentConfig {
        &self.config
    }

    pub fn get_round(&self, id: &RoundId) -> Result<RecruitmentRound, RecruitmentError> {
        self.store
            .fetch_round(id)?
            .ok_or_else(|| RecruitmentError::not_found("round", id))
    }

    pub fn get_module(&self, id: &ModuleId) -> Result<Module, RecruitmentError> {
        self.store
            .fetch_module(id)?
            .ok_or_else(|| RecruitmentError::not_found("module", id))
    }

    pub fn get_application(&self, id: &ApplicationId) -> Result<Application, RecruitmentError> {
        self.store
            .fetch_application(id)?
            .ok_or_else(|| RecruitmentError::not_found("application", id))
    }

    pub fn list_round_modules(&self, round: &RoundId) -> Result<Vec<Module>, RecruitmentError> {
        self.get_round(round)?;
        Ok(self.store.modules_in_round(round)?)
    }

    pub fn list_module_applications(
        &self,
        module: &ModuleId,
    ) -> Result<Vec<Application>, RecruitmentError> {
        self.get_module(module)?;
        Ok(self.store.applications_for_module(module)?)
    }

    pub fn get_budget(
        &self,
        student: &UserId,
        round: &RoundId,
    ) -> Result<Option<HourBudget>, RecruitmentError> {
        Ok(self.store.fetch_budget(student, round)?)
    }

    /// Read-modify-write a module with compare-and-swap, re-running `mutate` on a fresh
    /// copy after every version conflict until the retry budget runs out.
    pub(super) fn update_module<T, F>(
        &self,
        id: &ModuleId,
        mut mutate: F,
    ) -> Result<(Module, T), RecruitmentError>
    where
        F: FnMut(&mut Module) -> Result<T, RecruitmentError>,
    {
        let mut attempt = 1;
        loop {
            let mut module = self.get_module(id)?;
            let outcome = mutate(&mut module)?;
            match self.store.replace_module(module) {
                Ok(stored) => return Ok((stored, outcome)),
                Err(RepositoryError::VersionConflict { expected, actual })
                    if attempt < self.config.conflict_retries =>
                {
                    debug!(module = %id, attempt, expected, actual, "module write raced, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub(super) fn dispatch(&self, template: &str, recipients: Vec<UserId>, details: Details) {
        if recipients.is_empty() {
            return;
        }
        let notification = Notification {
            template: template.to_string(),
            recipients,
            details,
        };
        if let Err(err) = self.notifier.notify(notification) {
            warn!(template, error = %err, "notification dispatch failed");
        }
    }
}

pub(super) type Details = BTreeMap<String, String>;

pub(super) fn details<const N: usize>(pairs: [(&str, String); N]) -> Details {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

pub(super) fn authorize_coordinator(module: &Module, user: &UserId) -> Result<(), RecruitmentError> {
    if module.is_coordinated_by(user) {
        Ok(())
    } else {
        Err(RecruitmentError::Forbidden {
            user: user.clone(),
            module: module.id.clone(),
        })
    }
}

/// Successful allocation result.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationReceipt {
    pub application: Application,
    pub remaining_hours: u32,
}

/// Outcome of advertising a module.
#[derive(Debug, Clone, Serialize)]
pub struct Advertisement {
    pub module: Module,
    pub recipients: Vec<UserId>,
}

/// Closed set of failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AlreadyApplied,
    InsufficientHours,
    PositionsFilled,
    InvalidRole,
    Forbidden,
    NotFound,
    NotEditable,
    GuardViolation,
    AlreadyProcessed,
    Internal,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::AlreadyApplied => "ALREADY_APPLIED",
            Self::InsufficientHours => "INSUFFICIENT_HOURS",
            Self::PositionsFilled => "POSITIONS_FILLED",
            Self::InvalidRole => "INVALID_ROLE",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::NotEditable => "NOT_EDITABLE",
            Self::GuardViolation => "GUARD_VIOLATION",
            Self::AlreadyProcessed => "ALREADY_PROCESSED",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Error raised by the recruitment service.
#[derive(Debug, thiserror::Error)]
pub enum RecruitmentError {
    #[error("student has already applied to module {module}")]
    AlreadyApplied { module: ModuleId },
    #[error("not enough weekly hours left: {available} available, {required} required")]
    InsufficientHours { available: u32, required: u32 },
    #[error("no {category} positions left on module {module}")]
    PositionsFilled {
        module: ModuleId,
        category: TaCategory,
    },
    #[error("'{0}' is not a student category (expected undergraduate or postgraduate)")]
    InvalidRole(String),
    #[error("user {user} does not coordinate module {module}")]
    Forbidden { user: UserId, module: ModuleId },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{subject} in status '{status}' cannot {action}")]
    NotEditable {
        subject: String,
        status: &'static str,
        action: &'static str,
    },
    #[error("Cannot reduce {category} TA count to {requested} because {applied} students have already applied.")]
    GuardViolation {
        category: TaCategory,
        requested: u32,
        applied: u32,
    },
    #[error("application {application} has already been {status}")]
    AlreadyProcessed {
        application: ApplicationId,
        status: ApplicationStatus,
    },
    #[error(transparent)]
    Internal(#[from] RepositoryError),
}

impl RecruitmentError {
    pub(super) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyApplied { .. } => ErrorKind::AlreadyApplied,
            Self::InsufficientHours { .. } => ErrorKind::InsufficientHours,
            Self::PositionsFilled { .. } => ErrorKind::PositionsFilled,
            Self::InvalidRole(_) => ErrorKind::InvalidRole,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotEditable { .. } => ErrorKind::NotEditable,
            Self::GuardViolation { .. } => ErrorKind::GuardViolation,
            Self::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<IllegalTransition> for RecruitmentError {
    fn from(value: IllegalTransition) -> Self {
        Self::NotEditable {
            subject: "module".to_string(),
            status: value.from.label(),
            action: value.event.label(),
        }
    }
}
