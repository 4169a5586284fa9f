//! Administrator operations: rounds, the module catalog, and the phase changes that
//! drive a module from `initialised` to `closed`.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::domain::{
    ApplicationStatus, DocumentStatus, Module, ModuleId, ModuleStatus, NewModule, NewRound,
    RecruitmentRound, RoundId, RoundSchedule, RoundStatus, TaCategory, UserId,
};
use super::repository::{Notifier, RecruitmentStore, RepositoryError};
use super::service::{
    details, next_module_id, next_round_id, Advertisement, RecruitmentError, RecruitmentService,
};
use super::status::{self, ModuleEvent};

impl<S, N> RecruitmentService<S, N>
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn create_round(&self, new_round: NewRound) -> Result<RecruitmentRound, RecruitmentError> {
        let round = RecruitmentRound {
            id: next_round_id(),
            name: new_round.name,
            application_due: new_round.application_due,
            document_due: new_round.document_due,
            undergraduate_hours: new_round
                .undergraduate_hours
                .unwrap_or(self.config.undergraduate_hours),
            postgraduate_hours: new_round
                .postgraduate_hours
                .unwrap_or(self.config.postgraduate_hours),
            undergraduate_list: new_round.undergraduate_list,
            postgraduate_list: new_round.postgraduate_list,
            status: RoundStatus::Initialised,
        };
        let round = self.store.insert_round(round)?;
        info!(round = %round.id, name = %round.name, "recruitment round created");
        Ok(round)
    }

    pub fn activate_round(&self, id: &RoundId) -> Result<RecruitmentRound, RecruitmentError> {
        let mut round = self.get_round(id)?;
        if round.status != RoundStatus::Initialised {
            return Err(round_not_editable(&round, "be activated"));
        }
        round.status = RoundStatus::Active;
        self.store.update_round(round.clone())?;
        info!(round = %round.id, "recruitment round activated");
        Ok(round)
    }

    /// Archiving is terminal and idempotent.
    pub fn archive_round(&self, id: &RoundId) -> Result<RecruitmentRound, RecruitmentError> {
        let mut round = self.get_round(id)?;
        if round.status == RoundStatus::Archived {
            return Ok(round);
        }
        round.status = RoundStatus::Archived;
        self.store.update_round(round.clone())?;
        info!(round = %round.id, "recruitment round archived");
        Ok(round)
    }

    /// Dates and hour limits are frozen once students have seen a module of the round.
    pub fn update_round_schedule(
        &self,
        id: &RoundId,
        schedule: RoundSchedule,
    ) -> Result<RecruitmentRound, RecruitmentError> {
        let mut round = self.get_round(id)?;
        if round.status == RoundStatus::Archived
            || self
                .store
                .modules_in_round(id)?
                .iter()
                .any(|module| module.status.is_published())
        {
            return Err(round_not_editable(&round, "change its schedule"));
        }

        round.application_due = schedule.application_due;
        round.document_due = schedule.document_due;
        round.undergraduate_hours = schedule.undergraduate_hours;
        round.postgraduate_hours = schedule.postgraduate_hours;
        self.store.update_round(round.clone())?;
        info!(round = %round.id, "recruitment round schedule updated");
        Ok(round)
    }

    pub fn create_module(&self, new_module: NewModule) -> Result<Module, RecruitmentError> {
        let round = self.get_round(&new_module.round_id)?;
        if round.status == RoundStatus::Archived {
            return Err(round_not_editable(&round, "take new modules"));
        }

        let module = Module {
            id: next_module_id(),
            round_id: round.id,
            code: new_module.code,
            name: new_module.name,
            semester: new_module.semester,
            coordinators: new_module.coordinators,
            application_due: new_module.application_due.unwrap_or(round.application_due),
            document_due: new_module.document_due.unwrap_or(round.document_due),
            required_ta_hours: 0,
            requirements: String::new(),
            status: ModuleStatus::Initialised,
            undergraduate: None,
            postgraduate: None,
            version: 0,
        };
        let module = self.store.insert_module(module)?;
        info!(module = %module.id, code = %module.code, round = %module.round_id, "module created");
        Ok(module)
    }

    /// Ask the coordinators to (re)submit requirements.
    pub fn request_changes(&self, id: &ModuleId) -> Result<Module, RecruitmentError> {
        let module = self.advance_module(id, ModuleEvent::RequestChanges)?;
        self.dispatch(
            "requirements_requested",
            module.coordinators.clone(),
            details([
                ("module_code", module.code.clone()),
                ("module_name", module.name.clone()),
                ("application_due", module.application_due.to_string()),
            ]),
        );
        Ok(module)
    }

    /// Publish a module to students and mail the category lists of its open positions.
    pub fn advertise(&self, id: &ModuleId) -> Result<Advertisement, RecruitmentError> {
        let current = self.get_module(id)?;
        let round = self.get_round(&current.round_id)?;
        if round.status != RoundStatus::Active {
            return Err(round_not_editable(&round, "advertise modules"));
        }

        let (module, _) = self.update_module(id, |module| {
            let from = module.status;
            status::apply(module, ModuleEvent::Advertise)?;
            if TaCategory::ordered()
                .into_iter()
                .all(|category| !module.open_for(category))
            {
                return Err(RecruitmentError::NotEditable {
                    subject: format!("module {}", module.id),
                    status: from.label(),
                    action: "be advertised without open positions",
                });
            }
            status::reconcile(module);
            Ok(())
        })?;

        let recipients = self.advertisement_recipients(&module, &round);
        info!(
            module = %module.id,
            recipients = recipients.len(),
            status = %module.status,
            "module advertised"
        );
        self.dispatch(
            "module_advertised",
            recipients.clone(),
            details([
                ("module_code", module.code.clone()),
                ("module_name", module.name.clone()),
                ("ta_hours", module.required_ta_hours.to_string()),
                ("application_due", module.application_due.to_string()),
            ]),
        );

        Ok(Advertisement { module, recipients })
    }

    pub fn open_document_collection(&self, id: &ModuleId) -> Result<Module, RecruitmentError> {
        self.advance_module(id, ModuleEvent::OpenDocuments)
    }

    /// Close a module; whoever has submitted their paperwork is appointed.
    pub fn close_module(&self, id: &ModuleId) -> Result<Module, RecruitmentError> {
        self.advance_module(id, ModuleEvent::Close)
    }

    /// Move every module of the round whose due dates have passed on `today`.
    /// Returns the modules that changed status.
    pub fn advance_round_phases(
        &self,
        round: &RoundId,
        today: NaiveDate,
    ) -> Result<Vec<Module>, RecruitmentError> {
        self.get_round(round)?;

        let mut advanced = Vec::new();
        for module in self.store.modules_in_round(round)? {
            let mut latest = None;
            if matches!(module.status, ModuleStatus::Advertised | ModuleStatus::Full)
                && today > module.application_due
            {
                latest = Some(self.advance_module(&module.id, ModuleEvent::OpenDocuments)?);
            }
            let reached = latest.as_ref().map_or(module.status, |module| module.status);
            if reached == ModuleStatus::GettingDocuments && today > module.document_due {
                latest = Some(self.advance_module(&module.id, ModuleEvent::Close)?);
            }
            advanced.extend(latest);
        }

        if !advanced.is_empty() {
            info!(round = %round, %today, modules = advanced.len(), "round phases advanced");
        }
        Ok(advanced)
    }

    /// Re-count accepted applicants whose onboarding documents are in.
    pub fn refresh_documents(&self, id: &ModuleId) -> Result<Module, RecruitmentError> {
        let current = self.get_module(id)?;
        if current.status != ModuleStatus::GettingDocuments {
            return Err(RecruitmentError::NotEditable {
                subject: format!("module {id}"),
                status: current.status.label(),
                action: ModuleEvent::OpenDocuments.label(),
            });
        }

        let mut submitted = [0_u32; 2];
        for application in self.store.applications_for_module(id)? {
            if application.status != ApplicationStatus::Accepted {
                continue;
            }
            let paperwork = self
                .documents
                .uploaded_document_status(&application.student)
                .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
            if paperwork == DocumentStatus::Submitted {
                submitted[category_index(application.category)] += 1;
            }
        }

        let (module, _) = self.update_module(id, |module| {
            for category in TaCategory::ordered() {
                if let Some(counters) = module.counters_mut(category) {
                    counters.doc_submitted = submitted[category_index(category)];
                }
            }
            Ok(())
        })?;
        info!(
            module = %module.id,
            undergraduate = submitted[0],
            postgraduate = submitted[1],
            "document submissions refreshed"
        );
        Ok(module)
    }

    fn advance_module(&self, id: &ModuleId, event: ModuleEvent) -> Result<Module, RecruitmentError> {
        let (module, previous) = self.update_module(id, |module| {
            let previous = module.status;
            status::apply(module, event)?;
            if event == ModuleEvent::Close {
                for category in TaCategory::ordered() {
                    if let Some(counters) = module.counters_mut(category) {
                        counters.appointed = counters.doc_submitted;
                    }
                }
            }
            Ok(previous)
        })?;
        info!(module = %module.id, from = %previous, to = %module.status, "module status changed");
        Ok(module)
    }

    fn advertisement_recipients(&self, module: &Module, round: &RecruitmentRound) -> Vec<UserId> {
        let mut recipients = BTreeSet::new();
        for category in TaCategory::ordered() {
            if !module.open_for(category) {
                continue;
            }
            let list = match category {
                TaCategory::Undergraduate => &round.undergraduate_list,
                TaCategory::Postgraduate => &round.postgraduate_list,
            };
            match self.directory.members(list) {
                Ok(members) => recipients.extend(members),
                Err(err) => {
                    warn!(module = %module.id, list = %list, error = %err, "mailing list lookup failed")
                }
            }
        }
        recipients.into_iter().collect()
    }
}

fn round_not_editable(round: &RecruitmentRound, action: &'static str) -> RecruitmentError {
    RecruitmentError::NotEditable {
        subject: format!("round {}", round.id),
        status: round.status.label(),
        action,
    }
}

const fn category_index(category: TaCategory) -> usize {
    match category {
        TaCategory::Undergraduate => 0,
        TaCategory::Postgraduate => 1,
    }
}
