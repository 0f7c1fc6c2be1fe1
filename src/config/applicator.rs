//! Patch application with per-rule reporting.
//!
//! Rules are grouped by target file; each file is read once, every rule's
//! edits are located against that pre-run content, and the whole batch is
//! spliced in memory and written back in a single atomic store. A rule whose
//! anchor is missing is reported, not silently skipped, and one bad rule
//! never leaves a file half-patched.

use crate::config::schema::{Occurrence, Operation, PatchConfig, PatchDefinition, Query};
use crate::config::version::{matches_requirement, VersionError};
use crate::edit::{self, Edit, EditOutcome};
use crate::safety::WorkspaceGuard;
use crate::scan::{self, ScanError};
use crate::source::SourceFile;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result of one patch rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// The rule's edits were applied (or would be, in check mode)
    Applied { file: PathBuf },
    /// The file already carries the rule's outcome
    AlreadyApplied { file: PathBuf },
    /// The patch set's version gate excluded this workspace
    SkippedVersion { reason: String },
    /// The rule could not be applied
    Failed { file: PathBuf, reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file } => write!(f, "applied to {}", file.display()),
            PatchResult::AlreadyApplied { file } => {
                write!(f, "already applied to {}", file.display())
            }
            PatchResult::SkippedVersion { reason } => write!(f, "skipped (version): {}", reason),
            PatchResult::Failed { file, reason } => {
                write!(f, "failed on {}: {}", file.display(), reason)
            }
        }
    }
}

/// Errors locating a rule's anchor.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("version gate error: {0}")]
    Version(#[from] VersionError),

    #[error("anchor not found in {file}{}", hint_suffix(.nearest))]
    NoMatch {
        file: PathBuf,
        nearest: Option<String>,
    },

    #[error("anchor matched {count} locations in {file} (expected exactly 1)")]
    AmbiguousAnchor { file: PathBuf, count: usize },

    #[error("balanced-delimiter scan failed in {file}: {source}")]
    Scan { file: PathBuf, source: ScanError },

    #[error("invalid regex pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
}

fn hint_suffix(nearest: &Option<String>) -> String {
    match nearest {
        Some(line) => format!(" (closest line: {line:?})"),
        None => String::new(),
    }
}

/// Apply a patch set to a workspace. One `(rule id, result)` pair per rule,
/// in declaration order.
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_patches(config, workspace_root, workspace_version, Mode::Apply)
}

/// Evaluate a patch set without writing anything. `Applied` means "would
/// apply"; the result semantics otherwise mirror [`apply_patches`].
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_patches(config, workspace_root, workspace_version, Mode::Check)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    Check,
}

/// What a rule contributed to its file's batch.
enum RuleEdits {
    Edits(Vec<Edit>),
    AlreadyApplied,
}

fn run_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
    mode: Mode,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    // Version gate first: a gated-out set touches nothing.
    match matches_requirement(workspace_version, config.meta.version_range.as_deref()) {
        Ok(true) => {}
        Ok(false) => {
            let req = config.meta.version_range.as_deref().unwrap_or("").trim();
            let reason =
                format!("workspace version {workspace_version} does not satisfy version_range {req}");
            return config
                .patches
                .iter()
                .map(|patch| {
                    (
                        patch.id.clone(),
                        Ok(PatchResult::SkippedVersion {
                            reason: reason.clone(),
                        }),
                    )
                })
                .collect();
        }
        Err(e) => {
            return config
                .patches
                .iter()
                .map(|patch| (patch.id.clone(), Err(ApplicationError::Version(e.clone()))))
                .collect();
        }
    }

    let guard = WorkspaceGuard::new(workspace_root);

    // Group rules by resolved target file, preserving declaration order.
    let mut groups: Vec<(PathBuf, Vec<(usize, &PatchDefinition)>)> = Vec::new();
    for (idx, patch) in config.patches.iter().enumerate() {
        let file = if config.meta.workspace_relative {
            workspace_root.join(&patch.file)
        } else {
            PathBuf::from(&patch.file)
        };
        match groups.iter_mut().find(|(path, _)| *path == file) {
            Some((_, rules)) => rules.push((idx, patch)),
            None => groups.push((file, vec![(idx, patch)])),
        }
    }

    let mut results: Vec<(usize, String, Result<PatchResult, ApplicationError>)> = Vec::new();

    for (file_path, rules) in groups {
        // File-level problems fan out to every rule of the file.
        let fail_all = |results: &mut Vec<_>, reason: String| {
            for (idx, patch) in &rules {
                results.push((
                    *idx,
                    patch.id.clone(),
                    Ok(PatchResult::Failed {
                        file: file_path.clone(),
                        reason: reason.clone(),
                    }),
                ));
            }
        };

        if !file_path.exists() {
            fail_all(&mut results, "target file does not exist".to_string());
            continue;
        }

        let file_path = match &guard {
            Ok(guard) => match guard.validate_path(&file_path) {
                Ok(canonical) => canonical,
                Err(e) => {
                    fail_all(&mut results, format!("refusing to edit: {e}"));
                    continue;
                }
            },
            Err(e) => {
                fail_all(&mut results, format!("workspace guard unavailable: {e}"));
                continue;
            }
        };

        let source = match SourceFile::load(&file_path) {
            Ok(source) => source,
            Err(e) => {
                fail_all(&mut results, e.to_string());
                continue;
            }
        };
        let content = source.content();

        // Locate every rule's edits against the pre-run content.
        let computed: Vec<(usize, &PatchDefinition, Result<RuleEdits, ApplicationError>)> = rules
            .iter()
            .map(|&(idx, patch)| (idx, patch, compute_rule(patch, &file_path, content)))
            .collect();

        // Flatten into one batch, remembering which slice belongs to which rule.
        let mut batch: Vec<Edit> = Vec::new();
        let mut slices: Vec<Option<std::ops::Range<usize>>> = Vec::with_capacity(computed.len());
        for (_, _, outcome) in &computed {
            match outcome {
                Ok(RuleEdits::Edits(edits)) => {
                    let start = batch.len();
                    batch.extend(edits.iter().cloned());
                    slices.push(Some(start..batch.len()));
                }
                _ => slices.push(None),
            }
        }

        match edit::apply_all(content, &batch) {
            Ok((new_content, outcomes)) => {
                let mut file_results: Vec<(usize, String, Result<PatchResult, ApplicationError>)> =
                    Vec::with_capacity(computed.len());
                let mut any_applied = false;

                for ((idx, patch, outcome), slice) in computed.into_iter().zip(slices) {
                    let result = match outcome {
                        Err(e) => Err(e),
                        Ok(RuleEdits::AlreadyApplied) => Ok(PatchResult::AlreadyApplied {
                            file: file_path.clone(),
                        }),
                        Ok(RuleEdits::Edits(_)) => {
                            let range = slice.unwrap_or(0..0);
                            let applied = outcomes[range]
                                .iter()
                                .any(|o| matches!(o, EditOutcome::Applied { .. }));
                            if applied {
                                any_applied = true;
                                Ok(PatchResult::Applied {
                                    file: file_path.clone(),
                                })
                            } else {
                                Ok(PatchResult::AlreadyApplied {
                                    file: file_path.clone(),
                                })
                            }
                        }
                    };
                    file_results.push((idx, patch.id.clone(), result));
                }

                if mode == Mode::Apply && any_applied {
                    if let Err(e) = source.store(&new_content) {
                        // The splice succeeded but the write-back did not:
                        // downgrade every would-be-applied rule.
                        let reason = e.to_string();
                        for (_, _, result) in file_results.iter_mut() {
                            if matches!(result, Ok(PatchResult::Applied { .. })) {
                                *result = Ok(PatchResult::Failed {
                                    file: file_path.clone(),
                                    reason: reason.clone(),
                                });
                            }
                        }
                    }
                }

                results.extend(file_results);
            }
            Err(e) => {
                // A rejected batch applies nothing; rules that contributed
                // edits all fail, rules that erred or were already applied
                // keep their own result.
                let reason = format!("edit batch rejected: {e}");
                for (idx, patch, outcome) in computed {
                    let result = match outcome {
                        Err(err) => Err(err),
                        Ok(RuleEdits::AlreadyApplied) => Ok(PatchResult::AlreadyApplied {
                            file: file_path.clone(),
                        }),
                        Ok(RuleEdits::Edits(_)) => Ok(PatchResult::Failed {
                            file: file_path.clone(),
                            reason: reason.clone(),
                        }),
                    };
                    results.push((idx, patch.id.clone(), result));
                }
            }
        }
    }

    results.sort_by_key(|(idx, _, _)| *idx);
    results
        .into_iter()
        .map(|(_, id, result)| (id, result))
        .collect()
}

fn compute_rule(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
) -> Result<RuleEdits, ApplicationError> {
    // Idempotency guard wins over everything else.
    if let Some(marker) = patch
        .guard
        .as_ref()
        .and_then(|g| g.skip_if_present.as_deref())
    {
        if content.contains(marker) {
            return Ok(RuleEdits::AlreadyApplied);
        }
    }

    match &patch.query {
        Query::Text { search, occurrence } => {
            compute_text_rule(patch, file_path, content, search, *occurrence)
        }
        Query::Regex {
            pattern,
            occurrence,
        } => compute_regex_rule(patch, file_path, content, pattern, *occurrence),
        Query::FunctionEnd { anchor } => {
            compute_function_end_rule(patch, file_path, content, anchor)
        }
    }
}

fn compute_text_rule(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    search: &str,
    occurrence: Occurrence,
) -> Result<RuleEdits, ApplicationError> {
    let starts: Vec<usize> = content.match_indices(search).map(|(i, _)| i).collect();

    if starts.is_empty() {
        // The anchor may be gone because a previous run consumed it.
        if content.contains(patch.operation.text()) {
            return Ok(RuleEdits::AlreadyApplied);
        }
        return Err(ApplicationError::NoMatch {
            file: file_path.to_path_buf(),
            nearest: nearest_line(content, search),
        });
    }

    let targets: &[usize] = match occurrence {
        Occurrence::Sole if starts.len() > 1 => {
            return Err(ApplicationError::AmbiguousAnchor {
                file: file_path.to_path_buf(),
                count: starts.len(),
            });
        }
        Occurrence::Sole | Occurrence::First => &starts[..1],
        Occurrence::All => &starts,
    };

    let edits = targets
        .iter()
        .map(|&start| {
            let end = start + search.len();
            match &patch.operation {
                Operation::Replace { text } => Edit::replace(start, end, text.clone(), search),
                Operation::InsertAfter { text } => Edit::insert(end, text.clone()),
                Operation::InsertBefore { text } => Edit::insert(start, text.clone()),
            }
        })
        .collect();

    Ok(RuleEdits::Edits(edits))
}

fn compute_regex_rule(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    pattern: &str,
    occurrence: Occurrence,
) -> Result<RuleEdits, ApplicationError> {
    let re = Regex::new(pattern).map_err(|source| ApplicationError::Regex {
        pattern: pattern.to_string(),
        source,
    })?;

    let caps: Vec<regex::Captures> = re.captures_iter(content).collect();

    if caps.is_empty() {
        // Replacement templates with capture references cannot be checked for
        // presence literally; everything else can.
        let idempotent = match &patch.operation {
            Operation::Replace { text } => !text.contains('$') && content.contains(text.as_str()),
            op => content.contains(op.text()),
        };
        if idempotent {
            return Ok(RuleEdits::AlreadyApplied);
        }
        return Err(ApplicationError::NoMatch {
            file: file_path.to_path_buf(),
            nearest: None,
        });
    }

    let targets: &[regex::Captures] = match occurrence {
        Occurrence::Sole if caps.len() > 1 => {
            return Err(ApplicationError::AmbiguousAnchor {
                file: file_path.to_path_buf(),
                count: caps.len(),
            });
        }
        Occurrence::Sole | Occurrence::First => &caps[..1],
        Occurrence::All => &caps,
    };

    let mut edits = Vec::with_capacity(targets.len());
    for cap in targets {
        let Some(whole) = cap.get(0) else { continue };
        let edit = match &patch.operation {
            Operation::Replace { text } => {
                let mut expanded = String::new();
                cap.expand(text, &mut expanded);
                Edit::replace(whole.start(), whole.end(), expanded, whole.as_str())
            }
            Operation::InsertAfter { text } => Edit::insert(whole.end(), text.clone()),
            Operation::InsertBefore { text } => Edit::insert(whole.start(), text.clone()),
        };
        edits.push(edit);
    }

    Ok(RuleEdits::Edits(edits))
}

fn compute_function_end_rule(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    anchor: &str,
) -> Result<RuleEdits, ApplicationError> {
    let starts: Vec<usize> = content.match_indices(anchor).map(|(i, _)| i).collect();

    if starts.is_empty() {
        if content.contains(patch.operation.text()) {
            return Ok(RuleEdits::AlreadyApplied);
        }
        return Err(ApplicationError::NoMatch {
            file: file_path.to_path_buf(),
            nearest: nearest_line(content, anchor),
        });
    }
    if starts.len() > 1 {
        return Err(ApplicationError::AmbiguousAnchor {
            file: file_path.to_path_buf(),
            count: starts.len(),
        });
    }

    let point = scan::insertion_point_after_body(content, starts[0]).map_err(|source| {
        ApplicationError::Scan {
            file: file_path.to_path_buf(),
            source,
        }
    })?;

    // Schema validation pins function-end queries to insert-after.
    Ok(RuleEdits::Edits(vec![Edit::insert(
        point,
        patch.operation.text().to_string(),
    )]))
}

/// Closest line in the file to the first non-blank line of a missing anchor,
/// so the operator can see what the file holds instead.
fn nearest_line(content: &str, wanted: &str) -> Option<String> {
    let probe = wanted.lines().find(|l| !l.trim().is_empty())?.trim();

    let mut best: Option<(f64, &str)> = None;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let score = strsim::normalized_levenshtein(probe, trimmed);
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, trimmed));
        }
    }

    // A hint below this similarity is noise, not help.
    best.filter(|(score, _)| *score >= 0.5)
        .map(|(_, line)| line.to_string())
}
