use tracing::info;

use super::domain::{
    CounterPair, Module, ModuleId, ModuleStatus, RequirementChange, TaCategory, UserId,
};
use super::repository::{Notifier, RecruitmentStore};
use super::service::{authorize_coordinator, RecruitmentError, RecruitmentService};
use super::status::{self, ModuleEvent};

impl<S, N> RecruitmentService<S, N>
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    /// Lecturer requirement edit. The guard is evaluated against the counters read in
    /// the same compare-and-swap attempt that writes the change.
    pub fn edit_requirements(
        &self,
        lecturer: &UserId,
        module_id: &ModuleId,
        change: RequirementChange,
    ) -> Result<Module, RecruitmentError> {
        let (module, previous) = self.update_module(module_id, |module| {
            authorize_coordinator(module, lecturer)?;
            let previous = module.status;
            apply_requirement_change(module, &change)?;
            Ok(previous)
        })?;

        info!(
            module = %module.id,
            lecturer = %lecturer,
            from = %previous,
            to = %module.status,
            undergraduate = change.required_undergraduate_ta_count,
            postgraduate = change.required_postgraduate_ta_count,
            "module requirements updated"
        );

        Ok(module)
    }
}

/// Validate `change` against the module's current counters and apply it in place.
/// Leaves the module untouched on error.
pub fn apply_requirement_change(
    module: &mut Module,
    change: &RequirementChange,
) -> Result<(), RecruitmentError> {
    let next = status::transition(module.status, ModuleEvent::SubmitChanges)?;

    if module.status == ModuleStatus::Advertised {
        for category in TaCategory::ordered() {
            let requested = change.required_count(category);
            let applied = module.counters(category).map_or(0, |counters| counters.applied);
            if requested < applied {
                return Err(RecruitmentError::GuardViolation {
                    category,
                    requested,
                    applied,
                });
            }
        }
    }

    module.required_ta_hours = change.required_ta_hours;
    module.requirements = change.requirements.clone();
    for category in TaCategory::ordered() {
        retarget_category(module, category, change.required_count(category));
    }
    module.status = next;
    status::reconcile(module);

    Ok(())
}

fn retarget_category(module: &mut Module, category: TaCategory, required: u32) {
    let slot = module.counters_slot(category);
    *slot = match slot.take() {
        Some(counters) if required == 0 && counters.applied == 0 => None,
        Some(mut counters) => {
            counters.retarget(required);
            Some(counters)
        }
        None if required > 0 => Some(CounterPair::open(required)),
        None => None,
    };
}
