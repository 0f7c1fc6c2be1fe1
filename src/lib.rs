//! Frontend Patcher: idempotent, anchor-guarded patching for web front-end
//! source files.
//!
//! Replaces a pile of one-shot fix-up scripts with declarative patch sets:
//! each set is a TOML file of ordered rules, each rule an anchor (exact
//! substring, regex, or balanced-delimiter scan), an operation (replace or
//! insert), and an optional idempotency guard.
//!
//! # Architecture
//!
//! Every rule compiles down to a single primitive: [`Edit`], a verified
//! byte-span replacement applied against in-memory text. Each target file is
//! read once, all of its rules' edits are located against that pre-run
//! content, and the batch is spliced and written back in one atomic store.
//!
//! # Safety
//!
//! - Edits verify expected before-text (exact or xxh3 digest)
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement (no node_modules, no build output)
//! - Re-running a patch set on a patched file is a reported no-op
//! - Missing anchors are reported per rule, never silently skipped
//!
//! # Example
//!
//! ```no_run
//! use frontend_patcher::{apply_patches, load_from_path};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_from_path("patches/landing-config.toml")?;
//! for (rule_id, result) in apply_patches(&config, Path::new("/srv/frontend"), "2.0.0") {
//!     match result {
//!         Ok(outcome) => println!("{rule_id}: {outcome}"),
//!         Err(e) => eprintln!("{rule_id}: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod edit;
pub mod safety;
pub mod scan;
pub mod source;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, matches_requirement,
    read_package_version, ApplicationError, ConfigError, PatchConfig, PatchResult, VersionError,
};
pub use edit::{apply_all, Edit, EditError, EditOutcome, Expected};
pub use safety::{SafetyError, WorkspaceGuard};
pub use scan::{insertion_point_after_body, ScanError};
pub use source::{SourceError, SourceFile};
