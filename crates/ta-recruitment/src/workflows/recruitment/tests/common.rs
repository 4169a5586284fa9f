use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::config::RecruitmentConfig;
use crate::workflows::recruitment::{
    recruitment_router, AllocationReceipt, Application, ApplicationId, ApplicationRepository,
    ApplicationStatus, ApplyRequest, BudgetRepository, HourBudget, InMemoryRecruitmentStore,
    Module, ModuleId, ModuleRepository, ModuleStatus, NewModule, NewRound, RecordingNotifier,
    RecruitmentError, RecruitmentRound, RecruitmentService, RecruitmentStore, RepositoryError,
    RequirementChange, RoundId, RoundRepository, StaticDocumentStatus, StaticMailingLists,
    TaCategory, UserId,
};

pub(crate) const COORDINATOR: &str = "lect-ada";
pub(crate) const UNDERGRADUATE_LIST: &str = "ta-undergraduates";
pub(crate) const POSTGRADUATE_LIST: &str = "ta-postgraduates";

pub(crate) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(crate) fn lecturer() -> UserId {
    UserId::new(COORDINATOR)
}

pub(crate) fn student(id: &str) -> UserId {
    UserId::new(id)
}

/// Bare module record with no open categories, for pure state tests.
pub(crate) fn module_fixture(status: ModuleStatus) -> Module {
    Module {
        id: ModuleId::new("mod-fixture"),
        round_id: RoundId::new("round-fixture"),
        code: "COMP2300".to_string(),
        name: "Computer Organisation".to_string(),
        semester: "S1".to_string(),
        coordinators: vec![lecturer()],
        application_due: date(2026, 3, 1),
        document_due: date(2026, 3, 15),
        required_ta_hours: 4,
        requirements: String::new(),
        status,
        undergraduate: None,
        postgraduate: None,
        version: 0,
    }
}

pub(crate) fn new_round() -> NewRound {
    NewRound {
        name: "2026 Semester 1".to_string(),
        application_due: date(2026, 3, 1),
        document_due: date(2026, 3, 15),
        undergraduate_hours: None,
        postgraduate_hours: None,
        undergraduate_list: UNDERGRADUATE_LIST.to_string(),
        postgraduate_list: POSTGRADUATE_LIST.to_string(),
    }
}

pub(crate) fn requirement_change(hours: u32, undergraduate: u32, postgraduate: u32) -> RequirementChange {
    RequirementChange {
        required_ta_hours: hours,
        required_undergraduate_ta_count: undergraduate,
        required_postgraduate_ta_count: postgraduate,
        requirements: "Run weekly labs".to_string(),
    }
}

pub(crate) struct Harness<S> {
    pub(crate) service: Arc<RecruitmentService<S, RecordingNotifier>>,
    pub(crate) store: Arc<S>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) documents: StaticDocumentStatus,
}

pub(crate) fn harness() -> Harness<InMemoryRecruitmentStore> {
    harness_with(Arc::new(InMemoryRecruitmentStore::default()))
}

pub(crate) fn harness_with<S>(store: Arc<S>) -> Harness<S>
where
    S: RecruitmentStore + 'static,
{
    let notifier = Arc::new(RecordingNotifier::default());
    let documents = StaticDocumentStatus::default();
    let lists = StaticMailingLists::default()
        .with_list(
            UNDERGRADUATE_LIST,
            vec![student("stu-u2"), student("stu-u1")],
        )
        .with_list(
            POSTGRADUATE_LIST,
            vec![student("stu-p1"), student("stu-u1")],
        );
    let service = RecruitmentService::new(
        store.clone(),
        notifier.clone(),
        Arc::new(lists),
        Arc::new(documents.clone()),
        RecruitmentConfig::default(),
    );
    Harness {
        service: Arc::new(service),
        store,
        notifier,
        documents,
    }
}

impl<S> Harness<S>
where
    S: RecruitmentStore + 'static,
{
    pub(crate) fn active_round(&self) -> RecruitmentRound {
        let round = self.service.create_round(new_round()).expect("round created");
        self.service.activate_round(&round.id).expect("round activated")
    }

    pub(crate) fn draft_module(&self, round: &RoundId, code: &str) -> Module {
        self.service
            .create_module(NewModule {
                round_id: round.clone(),
                code: code.to_string(),
                name: format!("{code} module"),
                semester: "S1".to_string(),
                coordinators: vec![lecturer()],
                application_due: None,
                document_due: None,
            })
            .expect("module created")
    }

    /// Module walked through request, edit, and advertise.
    pub(crate) fn advertised_module(
        &self,
        round: &RoundId,
        code: &str,
        hours: u32,
        undergraduate: u32,
        postgraduate: u32,
    ) -> Module {
        let module = self.draft_module(round, code);
        self.service
            .request_changes(&module.id)
            .expect("changes requested");
        self.service
            .edit_requirements(
                &lecturer(),
                &module.id,
                requirement_change(hours, undergraduate, postgraduate),
            )
            .expect("requirements saved");
        self.service
            .advertise(&module.id)
            .expect("module advertised")
            .module
    }

    pub(crate) fn apply(
        &self,
        student_id: &str,
        category: &str,
        module: &Module,
    ) -> Result<AllocationReceipt, RecruitmentError> {
        self.service.apply_for_ta(ApplyRequest {
            student: student(student_id),
            category: category.to_string(),
            module_id: module.id.clone(),
            round_id: module.round_id.clone(),
            ta_hours: None,
        })
    }

    pub(crate) fn module(&self, id: &ModuleId) -> Module {
        self.service.get_module(id).expect("module exists")
    }

    pub(crate) fn templates(&self) -> Vec<String> {
        self.notifier
            .events()
            .into_iter()
            .map(|notification| notification.template)
            .collect()
    }
}

/// In-memory store whose budget, application, or module writes can be made to fail, and whose
/// next budget charge can be held open.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub(crate) inner: InMemoryRecruitmentStore,
    pub(crate) fail_budget_charges: AtomicBool,
    pub(crate) fail_budget_refunds: AtomicBool,
    pub(crate) fail_application_writes: AtomicBool,
    pub(crate) fail_module_writes: AtomicBool,
    charge_gate: Mutex<Option<Arc<ChargeGate>>>,
}

/// Pauses one budget charge: the charging thread waits at `reached`, then at `resume`.
pub(crate) struct ChargeGate {
    pub(crate) reached: Barrier,
    pub(crate) resume: Barrier,
}

impl FlakyStore {
    pub(crate) fn hold_next_charge(&self) -> Arc<ChargeGate> {
        let gate = Arc::new(ChargeGate {
            reached: Barrier::new(2),
            resume: Barrier::new(2),
        });
        *self.charge_gate.lock().expect("gate lock") = Some(gate.clone());
        gate
    }
}

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

impl RoundRepository for FlakyStore {
    fn insert_round(&self, round: RecruitmentRound) -> Result<RecruitmentRound, RepositoryError> {
        self.inner.insert_round(round)
    }

    fn fetch_round(&self, id: &RoundId) -> Result<Option<RecruitmentRound>, RepositoryError> {
        self.inner.fetch_round(id)
    }

    fn update_round(&self, round: RecruitmentRound) -> Result<(), RepositoryError> {
        self.inner.update_round(round)
    }

    fn rounds(&self) -> Result<Vec<RecruitmentRound>, RepositoryError> {
        self.inner.rounds()
    }
}

impl ModuleRepository for FlakyStore {
    fn insert_module(&self, module: Module) -> Result<Module, RepositoryError> {
        self.inner.insert_module(module)
    }

    fn fetch_module(&self, id: &ModuleId) -> Result<Option<Module>, RepositoryError> {
        self.inner.fetch_module(id)
    }

    fn modules_in_round(&self, round: &RoundId) -> Result<Vec<Module>, RepositoryError> {
        self.inner.modules_in_round(round)
    }

    fn replace_module(&self, module: Module) -> Result<Module, RepositoryError> {
        if self.fail_module_writes.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.inner.replace_module(module)
    }

    fn reserve_slot(
        &self,
        id: &ModuleId,
        category: TaCategory,
    ) -> Result<Option<Module>, RepositoryError> {
        self.inner.reserve_slot(id, category)
    }

    fn release_slot(&self, id: &ModuleId, category: TaCategory) -> Result<Module, RepositoryError> {
        self.inner.release_slot(id, category)
    }
}

impl ApplicationRepository for FlakyStore {
    fn insert_application(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        if self.fail_application_writes.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.inner.insert_application(application)
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.fetch_application(id)
    }

    fn find_application(
        &self,
        student: &UserId,
        module: &ModuleId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_application(student, module)
    }

    fn applications_for_student(
        &self,
        student: &UserId,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.inner.applications_for_student(student)
    }

    fn applications_for_module(
        &self,
        module: &ModuleId,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.inner.applications_for_module(module)
    }

    fn transition_application(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        decided_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.transition_application(id, from, to, decided_at)
    }
}

impl BudgetRepository for FlakyStore {
    fn fetch_budget(
        &self,
        student: &UserId,
        round: &RoundId,
    ) -> Result<Option<HourBudget>, RepositoryError> {
        self.inner.fetch_budget(student, round)
    }

    fn open_budget(&self, budget: HourBudget) -> Result<HourBudget, RepositoryError> {
        self.inner.open_budget(budget)
    }

    fn charge_budget(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) -> Result<Option<HourBudget>, RepositoryError> {
        if self.fail_budget_charges.load(Ordering::SeqCst) {
            return Err(offline());
        }
        let gate = self.charge_gate.lock().expect("gate lock").take();
        if let Some(gate) = gate {
            gate.reached.wait();
            gate.resume.wait();
        }
        self.inner.charge_budget(student, round, hours, application)
    }

    fn refund_budget(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) -> Result<HourBudget, RepositoryError> {
        if self.fail_budget_refunds.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.inner.refund_budget(student, round, hours, application)
    }
}

pub(crate) fn router_for(harness: &Harness<InMemoryRecruitmentStore>) -> axum::Router {
    recruitment_router(harness.service.clone())
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
