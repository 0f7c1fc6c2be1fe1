use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: a verified byte-span replacement against
/// in-memory source text.
///
/// Every patch rule (exact substring, regex, balanced-delimiter scan) compiles
/// down to one or more of these. Intelligence lives in span acquisition, not
/// in application: an `Edit` only knows where it goes, what it inserts, and
/// what it expects to find there first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an Edit does nothing until passed to apply_all()"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive); equal to `byte_start` for insertions
    pub byte_end: usize,
    /// Replacement text for `[byte_start, byte_end)`
    pub new_text: String,
    /// What the span must currently contain for the edit to be safe
    pub expected: Expected,
}

/// Expected-before check for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Exact text match required
    Text(String),
    /// xxh3 digest of the expected text (for large spans)
    Digest(u64),
}

impl Expected {
    /// Build a check from known span text, digesting anything over 1 KiB.
    pub fn of(text: &str) -> Self {
        if text.len() > 1024 {
            Expected::Digest(xxh3_64(text.as_bytes()))
        } else {
            Expected::Text(text.to_string())
        }
    }

    /// Does `found` satisfy the check?
    pub fn matches(&self, found: &str) -> bool {
        match self {
            Expected::Text(expected) => found == expected,
            Expected::Digest(expected) => xxh3_64(found.as_bytes()) == *expected,
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("span {byte_start}..{byte_end} no longer contains the expected text (found {found:?})")]
    ExpectedMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("span {byte_start}..{byte_end} is out of bounds for content of length {len}")]
    OutOfBounds {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("span {byte_start}..{byte_end} does not fall on character boundaries")]
    NotCharBoundary { byte_start: usize, byte_end: usize },

    #[error("edits overlap: span starting at {lower_start} runs into span starting at {upper_start}")]
    Overlap {
        lower_start: usize,
        upper_start: usize,
    },
}

/// Outcome of one edit inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The span was replaced
    Applied { bytes_changed: usize },
    /// The span already held `new_text`; nothing was done
    AlreadyApplied,
}

impl Edit {
    /// Replace `[byte_start, byte_end)`, expecting it to hold `expected_text`.
    pub fn replace(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_text: &str,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected: Expected::of(expected_text),
        }
    }

    /// Insert `new_text` at `at` without consuming anything.
    pub fn insert(at: usize, new_text: impl Into<String>) -> Self {
        Self {
            byte_start: at,
            byte_end: at,
            new_text: new_text.into(),
            expected: Expected::Text(String::new()),
        }
    }

    /// Validate this edit against `content` without applying it.
    fn check(&self, content: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::OutOfBounds {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }

        if !content.is_char_boundary(self.byte_start) || !content.is_char_boundary(self.byte_end) {
            return Err(EditError::NotCharBoundary {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
            });
        }

        let current = &content[self.byte_start..self.byte_end];

        // Already applied is never an error
        if current == self.new_text {
            return Ok(());
        }

        if !self.expected.matches(current) {
            return Err(EditError::ExpectedMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: preview(current),
            });
        }

        Ok(())
    }
}

/// Apply a batch of edits to `content` in one pass.
///
/// Every edit is validated (bounds, character boundaries, expected-before
/// text) and the batch is checked for overlapping spans before anything is
/// spliced, so a rejected batch leaves nothing half-applied. Splicing runs
/// bottom-to-top so earlier offsets stay valid. Outcomes are returned in the
/// caller's order.
pub fn apply_all(content: &str, edits: &[Edit]) -> Result<(String, Vec<EditOutcome>), EditError> {
    if edits.is_empty() {
        return Ok((content.to_string(), Vec::new()));
    }

    // Sort indices descending by start so splices never invalidate offsets,
    // while outcomes still line up with the input order.
    let mut order: Vec<usize> = (0..edits.len()).collect();
    order.sort_by(|&a, &b| {
        edits[b]
            .byte_start
            .cmp(&edits[a].byte_start)
            .then(edits[b].byte_end.cmp(&edits[a].byte_end))
    });

    for &i in &order {
        edits[i].check(content)?;
    }

    // In descending order, each later (lower-offset) edit must end at or
    // before the earlier one starts.
    for pair in order.windows(2) {
        let upper = &edits[pair[0]];
        let lower = &edits[pair[1]];
        if lower.byte_end > upper.byte_start {
            return Err(EditError::Overlap {
                lower_start: lower.byte_start,
                upper_start: upper.byte_start,
            });
        }
    }

    let mut out = content.to_string();
    let mut outcomes = vec![EditOutcome::AlreadyApplied; edits.len()];

    for &i in &order {
        let edit = &edits[i];
        if &out[edit.byte_start..edit.byte_end] == edit.new_text {
            continue;
        }
        out.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
        outcomes[i] = EditOutcome::Applied {
            bytes_changed: edit.new_text.len(),
        };
    }

    Ok((out, outcomes))
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
