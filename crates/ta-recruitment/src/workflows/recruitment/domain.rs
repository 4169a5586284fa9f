use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identity handed over by the authentication collaborator (students and lecturers alike).
    UserId
);
identifier!(RoundId);
identifier!(ModuleId);
identifier!(ApplicationId);
identifier!(BudgetId);

/// Student category; each has its own slots on a module and its own weekly hour limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaCategory {
    Undergraduate,
    Postgraduate,
}

impl TaCategory {
    pub const fn ordered() -> [Self; 2] {
        [Self::Undergraduate, Self::Postgraduate]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Undergraduate => "undergraduate",
            Self::Postgraduate => "postgraduate",
        }
    }

    /// Accepts the category strings supplied by the identity provider.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "undergraduate" => Some(Self::Undergraduate),
            "postgraduate" => Some(Self::Postgraduate),
            _ => None,
        }
    }
}

impl fmt::Display for TaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-category slot accounting embedded in a module.
///
/// `remaining` is the allocation gate. It always equals `required - held`, where `held`
/// counts applicants that still occupy a slot (pending or accepted). `applied` is a
/// running tally that rejected applicants never leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterPair {
    pub required: u32,
    pub remaining: u32,
    pub applied: u32,
    pub reviewed: u32,
    pub accepted: u32,
    pub doc_submitted: u32,
    pub appointed: u32,
}

impl CounterPair {
    pub fn open(required: u32) -> Self {
        Self {
            required,
            remaining: required,
            ..Self::default()
        }
    }

    pub fn rejected(&self) -> u32 {
        self.reviewed.saturating_sub(self.accepted)
    }

    /// Applicants currently holding a slot.
    pub fn held(&self) -> u32 {
        self.applied.saturating_sub(self.rejected())
    }

    pub fn pending(&self) -> u32 {
        self.applied.saturating_sub(self.reviewed)
    }

    /// Change the required count and recompute `remaining` from the held slots.
    pub fn retarget(&mut self, required: u32) {
        self.required = required;
        self.remaining = required.saturating_sub(self.held());
    }

    pub(crate) fn claim(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.applied += 1;
        true
    }

    /// Undo a `claim` whose application was never persisted.
    pub(crate) fn unclaim(&mut self) {
        self.applied = self.applied.saturating_sub(1);
        self.remaining = self.required.saturating_sub(self.held());
    }

    pub(crate) fn record_acceptance(&mut self) {
        self.reviewed += 1;
        self.accepted += 1;
    }

    pub(crate) fn record_rejection(&mut self) {
        self.reviewed += 1;
        self.remaining = self.required.saturating_sub(self.held());
    }

    /// Undo a `record_rejection` whose refund could not be written.
    pub(crate) fn withdraw_rejection(&mut self) {
        self.reviewed = self.reviewed.saturating_sub(1);
        self.remaining = self.required.saturating_sub(self.held());
    }
}

/// Lifecycle phases of a module. Transitions are defined in [`super::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Initialised,
    PendingChanges,
    ChangesSubmitted,
    Advertised,
    Full,
    GettingDocuments,
    Closed,
}

impl ModuleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initialised => "initialised",
            Self::PendingChanges => "pending changes",
            Self::ChangesSubmitted => "changes submitted",
            Self::Advertised => "advertised",
            Self::Full => "full",
            Self::GettingDocuments => "getting-documents",
            Self::Closed => "closed",
        }
    }

    /// Whether students have been able to see the module.
    pub const fn is_published(self) -> bool {
        matches!(
            self,
            Self::Advertised | Self::Full | Self::GettingDocuments | Self::Closed
        )
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub round_id: RoundId,
    pub code: String,
    pub name: String,
    pub semester: String,
    pub coordinators: Vec<UserId>,
    pub application_due: NaiveDate,
    pub document_due: NaiveDate,
    pub required_ta_hours: u32,
    pub requirements: String,
    pub status: ModuleStatus,
    pub undergraduate: Option<CounterPair>,
    pub postgraduate: Option<CounterPair>,
    /// Bumped by the store on every write; used for compare-and-swap.
    pub version: u64,
}

impl Module {
    pub fn counters(&self, category: TaCategory) -> Option<&CounterPair> {
        match category {
            TaCategory::Undergraduate => self.undergraduate.as_ref(),
            TaCategory::Postgraduate => self.postgraduate.as_ref(),
        }
    }

    pub fn counters_mut(&mut self, category: TaCategory) -> Option<&mut CounterPair> {
        match category {
            TaCategory::Undergraduate => self.undergraduate.as_mut(),
            TaCategory::Postgraduate => self.postgraduate.as_mut(),
        }
    }

    pub(crate) fn counters_slot(&mut self, category: TaCategory) -> &mut Option<CounterPair> {
        match category {
            TaCategory::Undergraduate => &mut self.undergraduate,
            TaCategory::Postgraduate => &mut self.postgraduate,
        }
    }

    pub fn open_for(&self, category: TaCategory) -> bool {
        self.counters(category).is_some()
    }

    pub fn open_for_undergraduates(&self) -> bool {
        self.open_for(TaCategory::Undergraduate)
    }

    pub fn open_for_postgraduates(&self) -> bool {
        self.open_for(TaCategory::Postgraduate)
    }

    pub fn is_coordinated_by(&self, user: &UserId) -> bool {
        self.coordinators.iter().any(|coordinator| coordinator == user)
    }

    /// True when at least one category is open and every open category has no slot left.
    pub fn slots_exhausted(&self) -> bool {
        let open: Vec<&CounterPair> = TaCategory::ordered()
            .into_iter()
            .filter_map(|category| self.counters(category))
            .collect();
        !open.is_empty() && open.iter().all(|counters| counters.remaining == 0)
    }
}

/// Administrator input for a new module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewModule {
    pub round_id: RoundId,
    pub code: String,
    pub name: String,
    pub semester: String,
    pub coordinators: Vec<UserId>,
    #[serde(default)]
    pub application_due: Option<NaiveDate>,
    #[serde(default)]
    pub document_due: Option<NaiveDate>,
}

/// Lecturer input for the requirement editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementChange {
    pub required_ta_hours: u32,
    pub required_undergraduate_ta_count: u32,
    pub required_postgraduate_ta_count: u32,
    pub requirements: String,
}

impl RequirementChange {
    pub fn required_count(&self, category: TaCategory) -> u32 {
        match category {
            TaCategory::Undergraduate => self.required_undergraduate_ta_count,
            TaCategory::Postgraduate => self.required_postgraduate_ta_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub student: UserId,
    pub category: TaCategory,
    pub module_id: ModuleId,
    pub round_id: RoundId,
    /// Weekly hours charged against the student's budget when the application was made.
    pub hours: u32,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// A student's weekly-hour allowance for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBudget {
    pub id: BudgetId,
    pub student: UserId,
    pub round_id: RoundId,
    pub available_hours: u32,
    pub applications: Vec<ApplicationId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Initialised,
    Active,
    Archived,
}

impl RoundStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initialised => "initialised",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitmentRound {
    pub id: RoundId,
    pub name: String,
    pub application_due: NaiveDate,
    pub document_due: NaiveDate,
    pub undergraduate_hours: u32,
    pub postgraduate_hours: u32,
    /// Mailing-list groups notified when a module in the round is advertised.
    pub undergraduate_list: String,
    pub postgraduate_list: String,
    pub status: RoundStatus,
}

impl RecruitmentRound {
    pub fn hour_limit(&self, category: TaCategory) -> u32 {
        match category {
            TaCategory::Undergraduate => self.undergraduate_hours,
            TaCategory::Postgraduate => self.postgraduate_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRound {
    pub name: String,
    pub application_due: NaiveDate,
    pub document_due: NaiveDate,
    #[serde(default)]
    pub undergraduate_hours: Option<u32>,
    #[serde(default)]
    pub postgraduate_hours: Option<u32>,
    pub undergraduate_list: String,
    pub postgraduate_list: String,
}

/// Mutable scheduling fields of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSchedule {
    pub application_due: NaiveDate,
    pub document_due: NaiveDate,
    pub undergraduate_hours: u32,
    pub postgraduate_hours: u32,
}

/// Onboarding paperwork state reported by the document-storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Submitted,
    Pending,
}
