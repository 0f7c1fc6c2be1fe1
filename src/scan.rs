//! Balanced-delimiter scanning over unparsed source text.
//!
//! Locates the end of a function body by counting `{`/`}` depth forward from
//! an anchor, without parsing. The scan is bounded: the opening delimiter
//! must appear within [`MAX_HEADER_GAP`] bytes of the anchor, and running out
//! of input before the depth returns to zero is a hard error rather than a
//! silently wrong insertion point.
//!
//! The scan does not skip string literals or comments; a brace inside either
//! still counts. Known targets keep braces balanced inside bodies, so the
//! trade-off holds there.

use thiserror::Error;

/// How far past the anchor the opening `{` may sit. Function headers are a
/// single line; anything farther means the anchor matched something else.
pub const MAX_HEADER_GAP: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("no opening delimiter within {limit} bytes of the anchor")]
    MissingOpenDelimiter { limit: usize },

    #[error("delimiters never rebalance: depth still {depth} at end of input")]
    Unbalanced { depth: usize },
}

/// Byte offset at which text may be inserted immediately after the function
/// body that opens at or shortly after `anchor_start`.
///
/// The returned offset sits just past the end of the line containing the
/// closing delimiter (past its newline, or at end of input), so inserted text
/// starts on its own line after the body.
pub fn insertion_point_after_body(source: &str, anchor_start: usize) -> Result<usize, ScanError> {
    let bytes = source.as_bytes();
    debug_assert!(anchor_start <= bytes.len());

    // Locate the opening delimiter, bounded.
    let gap_limit = anchor_start.saturating_add(MAX_HEADER_GAP).min(bytes.len());
    let open = bytes[anchor_start..gap_limit]
        .iter()
        .position(|&b| b == b'{')
        .map(|i| anchor_start + i)
        .ok_or(ScanError::MissingOpenDelimiter {
            limit: MAX_HEADER_GAP,
        })?;

    // Depth-count to the matching close. Braces are ASCII, so byte scanning
    // is UTF-8 safe.
    let mut depth = 0usize;
    let mut close = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.ok_or(ScanError::Unbalanced { depth })?;

    // Step to just past the end of the closing delimiter's line.
    let mut pos = close + 1;
    while pos < bytes.len() && bytes[pos] != b'\n' {
        pos += 1;
    }
    if pos < bytes.len() {
        pos += 1;
    }
    Ok(pos)
}
