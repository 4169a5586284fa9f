use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use super::domain::{Module, NewModule, RoundId, UserId};
use super::repository::{Notifier, RecruitmentStore};
use super::service::{RecruitmentError, RecruitmentService};

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingCoordinators { code: String },
    Recruitment(RecruitmentError),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read module catalog: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid module catalog CSV: {}", err),
            CatalogImportError::MissingCoordinators { code } => {
                write!(f, "module {} has no coordinators", code)
            }
            CatalogImportError::Recruitment(err) => {
                write!(f, "could not create catalog module: {}", err)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::MissingCoordinators { .. } => None,
            CatalogImportError::Recruitment(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RecruitmentError> for CatalogImportError {
    fn from(err: RecruitmentError) -> Self {
        Self::Recruitment(err)
    }
}

/// One row of the module catalog export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: String,
    pub name: String,
    pub semester: String,
    pub coordinators: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Semester", default, deserialize_with = "empty_string_as_none")]
    semester: Option<String>,
    #[serde(
        rename = "Coordinators",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    coordinators: Option<String>,
}

/// Parse every row up front so a bad row aborts the import before anything is written.
pub fn parse_catalog<R: Read>(reader: R) -> Result<Vec<CatalogEntry>, CatalogImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut entries = Vec::new();

    for record in csv_reader.deserialize::<CatalogRow>() {
        let row = record?;
        let coordinators: Vec<UserId> = row
            .coordinators
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(UserId::new)
            .collect();
        if coordinators.is_empty() {
            return Err(CatalogImportError::MissingCoordinators { code: row.code });
        }

        entries.push(CatalogEntry {
            code: row.code,
            name: row.name,
            semester: row.semester.unwrap_or_default(),
            coordinators,
        });
    }

    Ok(entries)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

impl<S, N> RecruitmentService<S, N>
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    pub fn import_modules_from_path<P: AsRef<Path>>(
        &self,
        round: &RoundId,
        path: P,
    ) -> Result<Vec<Module>, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        self.import_modules(round, file)
    }

    /// Create a module for each catalog row. Codes already present in the round are
    /// skipped, so re-importing the same export is harmless.
    pub fn import_modules<R: Read>(
        &self,
        round: &RoundId,
        reader: R,
    ) -> Result<Vec<Module>, CatalogImportError> {
        let entries = parse_catalog(reader)?;
        let mut known: HashSet<String> = self
            .list_round_modules(round)?
            .into_iter()
            .map(|module| module.code)
            .collect();

        let mut created = Vec::new();
        for entry in entries {
            if !known.insert(entry.code.clone()) {
                debug!(round = %round, code = %entry.code, "catalog module already present");
                continue;
            }
            created.push(self.create_module(NewModule {
                round_id: round.clone(),
                code: entry.code,
                name: entry.name,
                semester: entry.semester,
                coordinators: entry.coordinators,
                application_due: None,
                document_due: None,
            })?);
        }

        info!(round = %round, created = created.len(), "module catalog imported");
        Ok(created)
    }
}
