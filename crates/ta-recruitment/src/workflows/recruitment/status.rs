//! Module lifecycle as an explicit `(status, event) -> status` table.
//!
//! Every status change in the crate goes through [`transition`]; the derived
//! `advertised <-> full` flip is computed only by [`reconcile`].

use serde::{Deserialize, Serialize};

use super::domain::{Module, ModuleStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleEvent {
    /// Administrator asks the coordinators for (new) requirements.
    RequestChanges,
    /// Lecturer saves requirements through the editor.
    SubmitChanges,
    Advertise,
    SlotsExhausted,
    SlotsReleased,
    OpenDocuments,
    Close,
}

impl ModuleEvent {
    pub const fn label(self) -> &'static str {
        match self {
            Self::RequestChanges => "request changes",
            Self::SubmitChanges => "edit requirements",
            Self::Advertise => "advertise",
            Self::SlotsExhausted => "mark full",
            Self::SlotsReleased => "reopen slots",
            Self::OpenDocuments => "collect documents",
            Self::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("module in status '{from}' cannot {}", .event.label())]
pub struct IllegalTransition {
    pub from: ModuleStatus,
    pub event: ModuleEvent,
}

pub fn transition(from: ModuleStatus, event: ModuleEvent) -> Result<ModuleStatus, IllegalTransition> {
    use ModuleEvent as E;
    use ModuleStatus as S;

    let next = match (from, event) {
        (S::Initialised | S::ChangesSubmitted, E::RequestChanges) => S::PendingChanges,
        (S::PendingChanges | S::ChangesSubmitted, E::SubmitChanges) => S::ChangesSubmitted,
        (S::Advertised, E::SubmitChanges) => S::Advertised,
        (S::ChangesSubmitted, E::Advertise) => S::Advertised,
        (S::Advertised, E::SlotsExhausted) => S::Full,
        (S::Full, E::SlotsReleased) => S::Advertised,
        (S::Advertised | S::Full, E::OpenDocuments) => S::GettingDocuments,
        (S::GettingDocuments, E::Close) => S::Closed,
        _ => return Err(IllegalTransition { from, event }),
    };

    Ok(next)
}

/// Whether the requirement editor may touch a module in this status.
pub fn accepts_requirement_edits(status: ModuleStatus) -> bool {
    transition(status, ModuleEvent::SubmitChanges).is_ok()
}

/// Apply `event` to the module in place.
pub fn apply(module: &mut Module, event: ModuleEvent) -> Result<ModuleStatus, IllegalTransition> {
    module.status = transition(module.status, event)?;
    Ok(module.status)
}

/// Align `advertised`/`full` with the counters. Returns the event applied, if any.
pub fn reconcile(module: &mut Module) -> Option<ModuleEvent> {
    let event = match module.status {
        ModuleStatus::Advertised if module.slots_exhausted() => ModuleEvent::SlotsExhausted,
        ModuleStatus::Full if !module.slots_exhausted() => ModuleEvent::SlotsReleased,
        _ => return None,
    };

    apply(module, event).ok().map(|_| event)
}
