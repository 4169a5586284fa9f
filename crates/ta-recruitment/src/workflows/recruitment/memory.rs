//! Mutex-backed store and collaborator doubles used by the API binary, the demo, and tests.
//!
//! Each conditional update runs under the lock that guards its collection, which gives
//! the same single-record atomicity a document store provides.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, DocumentStatus, HourBudget, Module, ModuleId,
    ModuleStatus, RecruitmentRound, RoundId, TaCategory, UserId,
};
use super::repository::{
    ApplicationRepository, BudgetRepository, DirectoryError, DocumentError, DocumentGateway,
    MailingListDirectory, ModuleRepository, Notification, Notifier, NotifyError, RepositoryError,
    RoundRepository,
};
use super::status;

#[derive(Default)]
struct ApplicationTable {
    records: HashMap<ApplicationId, Application>,
    by_student_module: HashMap<(UserId, ModuleId), ApplicationId>,
}

#[derive(Default, Clone)]
pub struct InMemoryRecruitmentStore {
    rounds: Arc<Mutex<HashMap<RoundId, RecruitmentRound>>>,
    modules: Arc<Mutex<HashMap<ModuleId, Module>>>,
    applications: Arc<Mutex<ApplicationTable>>,
    budgets: Arc<Mutex<HashMap<(UserId, RoundId), HourBudget>>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{what} lock poisoned")))
}

impl RoundRepository for InMemoryRecruitmentStore {
    fn insert_round(&self, round: RecruitmentRound) -> Result<RecruitmentRound, RepositoryError> {
        let mut guard = lock(&self.rounds, "round")?;
        if guard.contains_key(&round.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(round.id.clone(), round.clone());
        Ok(round)
    }

    fn fetch_round(&self, id: &RoundId) -> Result<Option<RecruitmentRound>, RepositoryError> {
        Ok(lock(&self.rounds, "round")?.get(id).cloned())
    }

    fn update_round(&self, round: RecruitmentRound) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.rounds, "round")?;
        match guard.get_mut(&round.id) {
            Some(stored) => {
                *stored = round;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn rounds(&self) -> Result<Vec<RecruitmentRound>, RepositoryError> {
        let guard = lock(&self.rounds, "round")?;
        let mut rounds: Vec<RecruitmentRound> = guard.values().cloned().collect();
        rounds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rounds)
    }
}

impl ModuleRepository for InMemoryRecruitmentStore {
    fn insert_module(&self, module: Module) -> Result<Module, RepositoryError> {
        let mut guard = lock(&self.modules, "module")?;
        if guard.contains_key(&module.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(module.id.clone(), module.clone());
        Ok(module)
    }

    fn fetch_module(&self, id: &ModuleId) -> Result<Option<Module>, RepositoryError> {
        Ok(lock(&self.modules, "module")?.get(id).cloned())
    }

    fn modules_in_round(&self, round: &RoundId) -> Result<Vec<Module>, RepositoryError> {
        let guard = lock(&self.modules, "module")?;
        let mut modules: Vec<Module> = guard
            .values()
            .filter(|module| &module.round_id == round)
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.id.cmp(&b.id)));
        Ok(modules)
    }

    fn replace_module(&self, mut module: Module) -> Result<Module, RepositoryError> {
        let mut guard = lock(&self.modules, "module")?;
        let stored = guard.get_mut(&module.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != module.version {
            return Err(RepositoryError::VersionConflict {
                expected: module.version,
                actual: stored.version,
            });
        }
        module.version += 1;
        *stored = module.clone();
        Ok(module)
    }

    fn reserve_slot(
        &self,
        id: &ModuleId,
        category: TaCategory,
    ) -> Result<Option<Module>, RepositoryError> {
        let mut guard = lock(&self.modules, "module")?;
        let Some(module) = guard.get_mut(id) else {
            return Ok(None);
        };
        if module.status != ModuleStatus::Advertised {
            return Ok(None);
        }
        let claimed = module
            .counters_mut(category)
            .map(|counters| counters.claim())
            .unwrap_or(false);
        if !claimed {
            return Ok(None);
        }
        status::reconcile(module);
        module.version += 1;
        Ok(Some(module.clone()))
    }

    fn release_slot(&self, id: &ModuleId, category: TaCategory) -> Result<Module, RepositoryError> {
        let mut guard = lock(&self.modules, "module")?;
        let module = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let counters = module.counters_mut(category).ok_or_else(|| {
            RepositoryError::Inconsistent(format!("{category} counters missing on module {id}"))
        })?;
        counters.unclaim();
        status::reconcile(module);
        module.version += 1;
        Ok(module.clone())
    }
}

impl ApplicationRepository for InMemoryRecruitmentStore {
    fn insert_application(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.applications, "application")?;
        let key = (application.student.clone(), application.module_id.clone());
        if guard.records.contains_key(&application.id) || guard.by_student_module.contains_key(&key)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.by_student_module.insert(key, application.id.clone());
        guard
            .records
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(lock(&self.applications, "application")?
            .records
            .get(id)
            .cloned())
    }

    fn find_application(
        &self,
        student: &UserId,
        module: &ModuleId,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = lock(&self.applications, "application")?;
        Ok(guard
            .by_student_module
            .get(&(student.clone(), module.clone()))
            .and_then(|id| guard.records.get(id))
            .cloned())
    }

    fn applications_for_student(
        &self,
        student: &UserId,
    ) -> Result<Vec<Application>, RepositoryError> {
        let guard = lock(&self.applications, "application")?;
        let mut applications: Vec<Application> = guard
            .records
            .values()
            .filter(|application| &application.student == student)
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.id.cmp(&b.id)));
        Ok(applications)
    }

    fn applications_for_module(
        &self,
        module: &ModuleId,
    ) -> Result<Vec<Application>, RepositoryError> {
        let guard = lock(&self.applications, "application")?;
        let mut applications: Vec<Application> = guard
            .records
            .values()
            .filter(|application| &application.module_id == module)
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.id.cmp(&b.id)));
        Ok(applications)
    }

    fn transition_application(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        decided_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Application>, RepositoryError> {
        let mut guard = lock(&self.applications, "application")?;
        let application = guard.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if application.status != from {
            return Ok(None);
        }
        application.status = to;
        application.decided_at = decided_at;
        Ok(Some(application.clone()))
    }
}

impl BudgetRepository for InMemoryRecruitmentStore {
    fn fetch_budget(
        &self,
        student: &UserId,
        round: &RoundId,
    ) -> Result<Option<HourBudget>, RepositoryError> {
        Ok(lock(&self.budgets, "budget")?
            .get(&(student.clone(), round.clone()))
            .cloned())
    }

    fn open_budget(&self, budget: HourBudget) -> Result<HourBudget, RepositoryError> {
        let mut guard = lock(&self.budgets, "budget")?;
        let stored = guard
            .entry((budget.student.clone(), budget.round_id.clone()))
            .or_insert(budget);
        Ok(stored.clone())
    }

    fn charge_budget(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) -> Result<Option<HourBudget>, RepositoryError> {
        let mut guard = lock(&self.budgets, "budget")?;
        let budget = guard
            .get_mut(&(student.clone(), round.clone()))
            .ok_or(RepositoryError::NotFound)?;
        if budget.available_hours < hours {
            return Ok(None);
        }
        budget.available_hours -= hours;
        budget.applications.push(application.clone());
        Ok(Some(budget.clone()))
    }

    fn refund_budget(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) -> Result<HourBudget, RepositoryError> {
        let mut guard = lock(&self.budgets, "budget")?;
        let budget = guard
            .get_mut(&(student.clone(), round.clone()))
            .ok_or(RepositoryError::NotFound)?;
        if let Some(position) = budget.applications.iter().position(|id| id == application) {
            budget.applications.remove(position);
            budget.available_hours += hours;
        }
        Ok(budget.clone())
    }
}

/// Notifier that keeps every notification in memory.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|_| NotifyError::Transport("recording notifier poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

/// Fixed mailing-list membership keyed by group name.
#[derive(Default, Clone)]
pub struct StaticMailingLists {
    lists: BTreeMap<String, Vec<UserId>>,
}

impl StaticMailingLists {
    pub fn with_list(mut self, name: impl Into<String>, members: Vec<UserId>) -> Self {
        self.lists.insert(name.into(), members);
        self
    }
}

impl MailingListDirectory for StaticMailingLists {
    fn members(&self, list: &str) -> Result<Vec<UserId>, DirectoryError> {
        self.lists
            .get(list)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownList(list.to_string()))
    }
}

/// Document statuses set by hand; students not listed are `pending`.
#[derive(Default, Clone)]
pub struct StaticDocumentStatus {
    submitted: Arc<Mutex<Vec<UserId>>>,
}

impl StaticDocumentStatus {
    pub fn mark_submitted(&self, student: UserId) {
        if let Ok(mut guard) = self.submitted.lock() {
            if !guard.contains(&student) {
                guard.push(student);
            }
        }
    }
}

impl DocumentGateway for StaticDocumentStatus {
    fn uploaded_document_status(&self, student: &UserId) -> Result<DocumentStatus, DocumentError> {
        let guard = self
            .submitted
            .lock()
            .map_err(|_| DocumentError::Unavailable("document status poisoned".to_string()))?;
        Ok(if guard.contains(student) {
            DocumentStatus::Submitted
        } else {
            DocumentStatus::Pending
        })
    }
}
