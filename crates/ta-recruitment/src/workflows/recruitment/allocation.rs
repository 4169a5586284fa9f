//! Apply-for-TA protocol.
//!
//! The slot claim is a single conditional write on the module record. The budget is
//! charged next under the application's id, and only then is the application stored.
//! A failing step compensates the earlier writes in reverse order, so a stored
//! application always holds both its slot and its hours.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, HourBudget, Module, ModuleId, ModuleStatus,
    RoundId, RoundStatus, TaCategory, UserId,
};
use super::repository::{Notifier, RecruitmentStore, RepositoryError};
use super::service::{
    next_application_id, next_budget_id, AllocationReceipt, RecruitmentError, RecruitmentService,
};

/// Caller input for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub student: UserId,
    /// Raw category string from the identity provider.
    pub category: String,
    pub module_id: ModuleId,
    pub round_id: RoundId,
    /// Hours the client believes the module needs. Only used for diagnostics; the
    /// module record is authoritative.
    #[serde(default)]
    pub ta_hours: Option<u32>,
}

impl<S, N> RecruitmentService<S, N>
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn apply_for_ta(
        &self,
        request: ApplyRequest,
    ) -> Result<AllocationReceipt, RecruitmentError> {
        let ApplyRequest {
            student,
            category,
            module_id,
            round_id,
            ta_hours,
        } = request;

        let category =
            TaCategory::parse(&category).ok_or_else(|| RecruitmentError::InvalidRole(category))?;

        let module = self.get_module(&module_id)?;
        if module.round_id != round_id {
            return Err(RecruitmentError::not_found(
                "module",
                format!("{module_id} in round {round_id}"),
            ));
        }
        let round = self.get_round(&round_id)?;

        let hours = module.required_ta_hours;
        if let Some(claimed) = ta_hours.filter(|claimed| *claimed != hours) {
            warn!(module = %module_id, claimed, hours, "ignoring client-supplied TA hours");
        }

        if self.store.find_application(&student, &module_id)?.is_some() {
            return Err(RecruitmentError::AlreadyApplied { module: module_id });
        }

        if round.status != RoundStatus::Active {
            return Err(RecruitmentError::PositionsFilled {
                module: module_id,
                category,
            });
        }

        let budget = match self.store.fetch_budget(&student, &round_id)? {
            Some(budget) => budget,
            None => self.store.open_budget(HourBudget {
                id: next_budget_id(),
                student: student.clone(),
                round_id: round_id.clone(),
                available_hours: round.hour_limit(category),
                applications: Vec::new(),
            })?,
        };

        if budget.available_hours < hours {
            return Err(RecruitmentError::InsufficientHours {
                available: budget.available_hours,
                required: hours,
            });
        }

        if self.store.reserve_slot(&module_id, category)?.is_none() {
            return Err(RecruitmentError::PositionsFilled {
                module: module_id,
                category,
            });
        }

        let application_id = next_application_id();
        let charged = self
            .store
            .charge_budget(&student, &round_id, hours, &application_id);
        let budget = match charged {
            Ok(Some(budget)) => budget,
            Ok(None) => {
                self.release_reserved_slot(&module_id, category);
                if self.store.find_application(&student, &module_id)?.is_some() {
                    return Err(RecruitmentError::AlreadyApplied { module: module_id });
                }
                let available = self
                    .store
                    .fetch_budget(&student, &round_id)?
                    .map(|budget| budget.available_hours)
                    .unwrap_or_default();
                return Err(RecruitmentError::InsufficientHours {
                    available,
                    required: hours,
                });
            }
            Err(err) => {
                self.release_reserved_slot(&module_id, category);
                return Err(err.into());
            }
        };

        let application = Application {
            id: application_id.clone(),
            student: student.clone(),
            category,
            module_id: module_id.clone(),
            round_id: round_id.clone(),
            hours,
            status: ApplicationStatus::Pending,
            applied_at: Utc::now(),
            decided_at: None,
        };

        let application = match self.store.insert_application(application) {
            Ok(application) => application,
            Err(err) => {
                self.withdraw_charge(&student, &round_id, hours, &application_id);
                self.release_reserved_slot(&module_id, category);
                return Err(match err {
                    RepositoryError::Conflict => {
                        RecruitmentError::AlreadyApplied { module: module_id }
                    }
                    other => other.into(),
                });
            }
        };

        info!(
            application = %application.id,
            module = %module_id,
            student = %student,
            %category,
            remaining_hours = budget.available_hours,
            "TA application recorded"
        );

        Ok(AllocationReceipt {
            application,
            remaining_hours: budget.available_hours,
        })
    }

    /// Advertised modules in active rounds the student could still apply to.
    pub fn list_available_modules(
        &self,
        student: &UserId,
        category: TaCategory,
    ) -> Result<Vec<Module>, RecruitmentError> {
        let applied: HashSet<ModuleId> = self
            .store
            .applications_for_student(student)?
            .into_iter()
            .map(|application| application.module_id)
            .collect();

        let mut available = Vec::new();
        for round in self.store.rounds()? {
            if round.status != RoundStatus::Active {
                continue;
            }
            let hours_left = self
                .store
                .fetch_budget(student, &round.id)?
                .map(|budget| budget.available_hours)
                .unwrap_or_else(|| round.hour_limit(category));

            available.extend(
                self.store
                    .modules_in_round(&round.id)?
                    .into_iter()
                    .filter(|module| module.status == ModuleStatus::Advertised)
                    .filter(|module| {
                        module
                            .counters(category)
                            .is_some_and(|counters| counters.remaining > 0)
                    })
                    .filter(|module| module.required_ta_hours <= hours_left)
                    .filter(|module| !applied.contains(&module.id)),
            );
        }

        Ok(available)
    }

    fn release_reserved_slot(&self, module: &ModuleId, category: TaCategory) {
        if let Err(err) = self.store.release_slot(module, category) {
            error!(%module, %category, error = %err, "failed to release reserved slot");
        }
    }

    fn withdraw_charge(
        &self,
        student: &UserId,
        round: &RoundId,
        hours: u32,
        application: &ApplicationId,
    ) {
        if let Err(err) = self.store.refund_budget(student, round, hours, application) {
            error!(%application, %student, error = %err, "failed to refund uncommitted charge");
        }
    }
}
