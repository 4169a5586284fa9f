use chrono::Utc;
use tracing::{error, info};

use super::domain::{Application, ApplicationId, ApplicationStatus, Module, UserId};
use super::repository::{Notifier, RecruitmentStore, RepositoryError};
use super::service::{authorize_coordinator, details, RecruitmentError, RecruitmentService};
use super::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
}

impl Decision {
    const fn outcome(self) -> ApplicationStatus {
        match self {
            Self::Accept => ApplicationStatus::Accepted,
            Self::Reject => ApplicationStatus::Rejected,
        }
    }

    const fn template(self) -> &'static str {
        match self {
            Self::Accept => "application_accepted",
            Self::Reject => "application_rejected",
        }
    }
}

impl<S, N> RecruitmentService<S, N>
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn accept_application(
        &self,
        lecturer: &UserId,
        application_id: &ApplicationId,
    ) -> Result<Application, RecruitmentError> {
        self.decide(lecturer, application_id, Decision::Accept)
    }

    /// Rejection hands the slot back to the module and refunds the student's hours.
    pub fn reject_application(
        &self,
        lecturer: &UserId,
        application_id: &ApplicationId,
    ) -> Result<Application, RecruitmentError> {
        self.decide(lecturer, application_id, Decision::Reject)
    }

    fn decide(
        &self,
        lecturer: &UserId,
        application_id: &ApplicationId,
        decision: Decision,
    ) -> Result<Application, RecruitmentError> {
        let application = self.get_application(application_id)?;
        if application.status != ApplicationStatus::Pending {
            return Err(RecruitmentError::AlreadyProcessed {
                application: application.id,
                status: application.status,
            });
        }

        let module = self.get_module(&application.module_id)?;
        authorize_coordinator(&module, lecturer)?;

        let decided = self
            .store
            .transition_application(
                application_id,
                ApplicationStatus::Pending,
                decision.outcome(),
                Some(Utc::now()),
            )?
            .ok_or_else(|| self.already_processed(application_id))?;

        if let Err(err) = self.record_decision(&decided, decision) {
            self.revert_decision(&decided);
            return Err(err);
        }

        if decision == Decision::Reject {
            if let Err(err) = self.store.refund_budget(
                &decided.student,
                &decided.round_id,
                decided.hours,
                &decided.id,
            ) {
                error!(
                    application = %decided.id,
                    student = %decided.student,
                    error = %err,
                    "rejected application could not refund hours"
                );
                self.withdraw_rejection(&decided);
                self.revert_decision(&decided);
                return Err(err.into());
            }
        }

        info!(
            application = %decided.id,
            module = %decided.module_id,
            lecturer = %lecturer,
            status = decided.status.label(),
            "application decided"
        );

        self.dispatch(
            decision.template(),
            vec![decided.student.clone()],
            details([
                ("module_code", module.code.clone()),
                ("module_name", module.name.clone()),
                ("application_id", decided.id.to_string()),
            ]),
        );

        Ok(decided)
    }

    fn record_decision(
        &self,
        application: &Application,
        decision: Decision,
    ) -> Result<Module, RecruitmentError> {
        let category = application.category;
        let (module, _) = self.update_module(&application.module_id, |module| {
            let module_id = module.id.clone();
            let counters = module.counters_mut(category).ok_or_else(|| {
                RepositoryError::Inconsistent(format!(
                    "{category} counters missing on module {module_id}"
                ))
            })?;
            match decision {
                Decision::Accept => counters.record_acceptance(),
                Decision::Reject => counters.record_rejection(),
            }
            status::reconcile(module);
            Ok(())
        })?;
        Ok(module)
    }

    /// Take the slot back from a rejection that could not be completed.
    fn withdraw_rejection(&self, application: &Application) {
        let category = application.category;
        let withdrawn = self.update_module(&application.module_id, |module| {
            if let Some(counters) = module.counters_mut(category) {
                counters.withdraw_rejection();
            }
            status::reconcile(module);
            Ok(())
        });
        if let Err(err) = withdrawn {
            error!(
                application = %application.id,
                module = %application.module_id,
                error = %err,
                "failed to withdraw rejection from module counters"
            );
        }
    }

    fn revert_decision(&self, application: &Application) {
        let reverted = self.store.transition_application(
            &application.id,
            application.status,
            ApplicationStatus::Pending,
            None,
        );
        if let Err(err) = reverted {
            error!(application = %application.id, error = %err, "failed to revert decision");
        }
    }

    fn already_processed(&self, application_id: &ApplicationId) -> RecruitmentError {
        match self.store.fetch_application(application_id) {
            Ok(Some(current)) => RecruitmentError::AlreadyProcessed {
                application: current.id,
                status: current.status,
            },
            Ok(None) => RecruitmentError::not_found("application", application_id),
            Err(err) => err.into(),
        }
    }
}
