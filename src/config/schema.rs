use serde::Deserialize;
use std::fmt;

/// One patch set: shared metadata plus an ordered list of rules.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement against the front end's package.json version
    #[serde(default)]
    pub version_range: Option<String>,
    /// Resolve rule file paths against the workspace root
    #[serde(default)]
    pub workspace_relative: bool,
}

/// One (anchor, operation, guard) unit applied to a target file.
#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    pub query: Query,
    pub operation: Operation,
    #[serde(default)]
    pub guard: Option<Guard>,
}

/// Anchor locator for a rule.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Query {
    /// Exact substring match
    Text {
        search: String,
        #[serde(default)]
        occurrence: Occurrence,
    },
    /// Regular-expression match
    Regex {
        pattern: String,
        #[serde(default)]
        occurrence: Occurrence,
    },
    /// Balanced-delimiter scan: locate the end of the function body opening
    /// at the (exact) anchor text
    FunctionEnd { anchor: String },
}

/// How many anchor occurrences a rule acts on.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Occurrence {
    /// Exactly one occurrence expected; more than one is an error
    #[default]
    Sole,
    /// Act on the first occurrence, tolerate the rest
    First,
    /// Act on every occurrence
    All,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Replace the located span. Under a regex query, `text` is a template
    /// where `$1`/`${name}` expand to captures and `$$` is a literal dollar.
    Replace { text: String },
    /// Keep the located span and insert `text` (literal) right after it
    InsertAfter { text: String },
    /// Keep the located span and insert `text` (literal) right before it
    InsertBefore { text: String },
}

impl Operation {
    pub fn text(&self) -> &str {
        match self {
            Operation::Replace { text }
            | Operation::InsertAfter { text }
            | Operation::InsertBefore { text } => text,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(
            self,
            Operation::InsertAfter { .. } | Operation::InsertBefore { .. }
        )
    }
}

/// Idempotency guard: skip the rule when a marker is already in the file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Guard {
    #[serde(default)]
    pub skip_if_present: Option<String>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            let id = || Some(patch.id.clone());

            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id(),
                    field: "file",
                });
            }

            match &patch.query {
                Query::Text { search, occurrence } => {
                    if search.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id(),
                            field: "query.search",
                        });
                    }
                    if *occurrence == Occurrence::All && patch.operation.is_insert() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id(),
                            message: "occurrence = \"all\" only combines with replace".to_string(),
                        });
                    }
                }
                Query::Regex {
                    pattern,
                    occurrence,
                } => {
                    if pattern.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id(),
                            field: "query.pattern",
                        });
                    } else if let Err(e) = regex::Regex::new(pattern) {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id(),
                            message: format!("query.pattern does not compile: {e}"),
                        });
                    }
                    if *occurrence == Occurrence::All && patch.operation.is_insert() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id(),
                            message: "occurrence = \"all\" only combines with replace".to_string(),
                        });
                    }
                }
                Query::FunctionEnd { anchor } => {
                    if anchor.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id(),
                            field: "query.anchor",
                        });
                    }
                    if !matches!(patch.operation, Operation::InsertAfter { .. }) {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id(),
                            message: "function-end queries require an insert-after operation"
                                .to_string(),
                        });
                    }
                }
            }

            if patch.operation.text().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id(),
                    field: "operation.text",
                });
            }

            // Inserts re-apply on every run unless guarded; require the guard
            // so a patch set stays idempotent as a whole.
            if patch.operation.is_insert() {
                let guarded = patch
                    .guard
                    .as_ref()
                    .and_then(|g| g.skip_if_present.as_deref())
                    .is_some_and(|m| !m.trim().is_empty());
                if !guarded {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id(),
                        message: "insert operations require guard.skip_if_present".to_string(),
                    });
                }
            }

            if let Some(guard) = &patch.guard {
                if let Some(marker) = &guard.skip_if_present {
                    if marker.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id(),
                            field: "guard.skip_if_present",
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
