//! Master data validation.
//!
//! Checks every `.ron` file under a data directory. Files are classified by
//! name: stems containing `personalit` hold a list of personalities, stems
//! containing `config` hold a [`BattleConfig`], everything else is a
//! [`RosterData`].
//!
//! Personalities and config are loaded first so that rosters can be checked
//! against them.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use mech_core::ai::{PersonalityData, PersonalityRegistry};
use mech_core::components::PartKey;
use mech_core::config::BattleConfig;
use mech_core::data::RosterData;

/// Errors that stop validation from running at all.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The path is not a directory.
    #[error("Not a data directory: {0}")]
    NotADirectory(PathBuf),
    /// A directory or file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// What a data file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataKind {
    /// A list of [`PersonalityData`].
    Personalities,
    /// A [`BattleConfig`].
    Config,
    /// A [`RosterData`].
    Roster,
}

impl DataKind {
    /// Classify a file by its name.
    #[must_use]
    pub fn of(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if stem.contains("personalit") {
            DataKind::Personalities
        } else if stem.contains("config") {
            DataKind::Config
        } else {
            DataKind::Roster
        }
    }
}

/// One problem found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// File the problem is in.
    pub path: PathBuf,
    /// Description.
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Result of validating a directory.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Files that were checked.
    pub files_checked: usize,
    /// Everything that was wrong.
    pub problems: Vec<Problem>,
}

impl ValidationReport {
    /// Whether no problems were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    fn push(&mut self, path: &Path, message: impl Into<String>) {
        self.problems.push(Problem {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }
}

// ============================================================================
// Per-kind Checks
// ============================================================================

/// Problems in a personality list.
#[must_use]
pub fn check_personalities(entries: &[PersonalityData]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = BTreeSet::new();
    for entry in entries {
        if entry.key.trim().is_empty() {
            problems.push("personality with an empty key".to_string());
        }
        if !seen.insert(entry.key.as_str()) {
            problems.push(format!("duplicate personality '{}'", entry.key));
        }
        if entry.routines.is_empty() {
            problems.push(format!("personality '{}' has no routines", entry.key));
        }
        for key in entry.unknown_keys() {
            problems.push(format!(
                "personality '{}': unknown strategy key '{key}'",
                entry.key
            ));
        }
    }
    problems
}

/// Problems in a battle config.
#[must_use]
pub fn check_config(config: &BattleConfig, personalities: &PersonalityRegistry) -> Vec<String> {
    let mut problems = Vec::new();
    if config.clone().sanitized() != *config {
        problems.push("config has values that would be replaced by defaults".to_string());
    }
    if !personalities.contains(&config.fallback_personality) {
        problems.push(format!(
            "fallback personality '{}' is not registered",
            config.fallback_personality
        ));
    }
    problems
}

/// Problems in a roster, including stats beyond the config's limits and
/// personality keys the registry does not know.
#[must_use]
pub fn check_roster(
    roster: &RosterData,
    config: &BattleConfig,
    personalities: &PersonalityRegistry,
) -> Vec<String> {
    let mut problems = roster.validate();
    problems.extend(roster.unknown_personalities(personalities));
    for member in roster.teams.iter().flat_map(|t| t.members.iter()) {
        for key in PartKey::ALL {
            let part = member.part(key);
            if part.stats.might > config.max_might {
                problems.push(format!(
                    "{}: {key:?} might {} exceeds max_might {}",
                    member.name, part.stats.might, config.max_might
                ));
            }
            if part.stats.success > config.max_success {
                problems.push(format!(
                    "{}: {key:?} success {} exceeds max_success {}",
                    member.name, part.stats.success, config.max_success
                ));
            }
        }
    }
    problems
}

// ============================================================================
// Directory Walk
// ============================================================================

fn collect_ron_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ValidationError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ValidationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ValidationError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_ron_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "ron") {
            files.push(path);
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, ValidationError> {
    std::fs::read_to_string(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate all RON data files in a directory.
///
/// Returns an error only when the directory cannot be read. Parse failures
/// and rule violations are collected in the report.
pub fn validate_data_directory(path: &Path) -> Result<ValidationReport, ValidationError> {
    if !path.is_dir() {
        return Err(ValidationError::NotADirectory(path.to_path_buf()));
    }
    let mut files = Vec::new();
    collect_ron_files(path, &mut files)?;
    files.sort_by_key(|f| (DataKind::of(f), f.clone()));

    let mut report = ValidationReport::default();
    let mut personalities = PersonalityRegistry::builtin();
    let mut config = BattleConfig::default();

    for file in &files {
        let kind = DataKind::of(file);
        debug!(file = %file.display(), ?kind, "checking");
        let source = read(file)?;
        report.files_checked += 1;
        let label = file.display().to_string();

        match kind {
            DataKind::Personalities => match ron::from_str::<Vec<PersonalityData>>(&source) {
                Ok(entries) => {
                    for problem in check_personalities(&entries) {
                        report.push(file, problem);
                    }
                    for entry in &entries {
                        personalities.register(entry.build());
                    }
                }
                Err(e) => report.push(file, format!("parse error: {e}")),
            },
            DataKind::Config => match BattleConfig::from_ron_str(&source) {
                Ok(loaded) => {
                    for problem in check_config(&loaded, &personalities) {
                        report.push(file, problem);
                    }
                    config = loaded;
                }
                Err(e) => report.push(file, e.to_string()),
            },
            DataKind::Roster => match RosterData::from_ron_str(&source, &label) {
                Ok(roster) => {
                    for problem in check_roster(&roster, &config, &personalities) {
                        report.push(file, problem);
                    }
                }
                Err(e) => report.push(file, e.to_string()),
            },
        }
    }

    info!(
        files = report.files_checked,
        problems = report.problems.len(),
        "validation finished"
    );
    Ok(report)
}
