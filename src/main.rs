use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use frontend_patcher::config::{
    apply_patches, check_patches, load_from_path, read_package_version, ApplicationError,
    PatchResult,
};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "frontend-patcher")]
#[command(about = "Idempotent patching for web front-end source files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to a front-end workspace
    Apply {
        /// Path to the workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Evaluate rules without modifying any file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report which rules are applied / not applied, without writing
    Status {
        /// Path to the workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Check that every rule is already applied; exit non-zero otherwise
    Verify {
        /// Path to the workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// List discovered patch sets
    List {
        /// Path to the workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            patches,
            dry_run,
            diff,
        } => cmd_apply(workspace, patches, dry_run, diff),

        Commands::Status { workspace } => cmd_status(workspace),

        Commands::Verify { workspace } => cmd_verify(workspace),

        Commands::List { workspace } => cmd_list(workspace),
    }
}

/// Discover .toml patch files, workspace-local patches/ first, then ./patches
/// relative to the current directory.
fn discover_patch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let workspace_patches_dir = workspace.join("patches");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(workspace_patches_dir)
        .chain(cwd_patches_dir)
        .collect();

    for patches_dir in candidate_dirs {
        if !patches_dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml patch files found in either ./patches or {}/patches",
        workspace.display()
    )
}

/// Resolve the front-end workspace root.
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. FRONTEND_WORKSPACE environment variable
/// 3. Ancestor walk from the current directory for a package.json next to an
///    app/ directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var("FRONTEND_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: FRONTEND_WORKSPACE is set but path doesn't exist: {env_path}")
                .yellow()
        );
    }

    if let Some(path) = auto_detect_workspace() {
        println!(
            "{}",
            format!("Auto-detected workspace: {}", path.display()).dimmed()
        );
        return Ok(path);
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "Could not find the front-end workspace.".red(),
        "Try one of:".bold(),
        "1. cd into the front-end checkout and re-run",
        "2. Specify explicitly: frontend-patcher apply --workspace /path/to/frontend",
        "3. Set environment variable: export FRONTEND_WORKSPACE=/path/to/frontend"
    )
}

/// Walk up from the current directory looking for a front-end root: a
/// package.json with an app/ router directory next to it.
fn auto_detect_workspace() -> Option<PathBuf> {
    let current = env::current_dir().ok()?;

    for ancestor in current.ancestors() {
        if ancestor.join("package.json").exists() && ancestor.join("app").is_dir() {
            return Some(ancestor.to_path_buf());
        }
    }

    None
}

/// Front-end version for patch-set gating, with a loud fallback.
fn workspace_version(workspace: &Path) -> String {
    read_package_version(workspace).unwrap_or_else(|e| {
        eprintln!(
            "{}",
            format!("Warning: could not read workspace version ({e}), using 0.0.0").yellow()
        );
        "0.0.0".to_string()
    })
}

/// Show unified diff between original and modified content.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    let patch_files = if let Some(path) = patches {
        vec![path]
    } else {
        discover_patch_files(&workspace)?
    };

    let version = workspace_version(&workspace);

    println!("Workspace: {}", workspace.display());
    println!("Version: {}", version);
    println!();

    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_skipped = 0;
    let mut total_failed = 0;

    for patch_file in patch_files {
        println!("Loading patches from {}...", patch_file.display());

        let config = load_from_path(&patch_file)?;

        // Capture target contents before applying, for diff output. Only the
        // files this set touches.
        let mut contents_before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff && !dry_run {
            let target_files: std::collections::HashSet<PathBuf> = config
                .patches
                .iter()
                .map(|p| {
                    if config.meta.workspace_relative {
                        workspace.join(&p.file)
                    } else {
                        PathBuf::from(&p.file)
                    }
                })
                .collect();
            for file_path in target_files {
                // Key by canonical path; results report canonical paths too.
                let key = file_path.canonicalize().unwrap_or(file_path);
                if let Ok(content) = fs::read_to_string(&key) {
                    contents_before.insert(key, content);
                }
            }
        }

        let results = if dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
            check_patches(&config, &workspace, &version)
        } else {
            apply_patches(&config, &workspace, &version)
        };

        for (rule_id, result) in results {
            match result {
                Ok(PatchResult::Applied { ref file }) => {
                    let verb = if dry_run { "Would apply to" } else { "Applied to" };
                    println!("{} {}: {} {}", "✓".green(), rule_id, verb, file.display());
                    total_applied += 1;

                    if show_diff && !dry_run {
                        if let Some(before) = contents_before.get(file.as_path()) {
                            if let Ok(after) = fs::read_to_string(file) {
                                if *before != after {
                                    display_diff(file, before, &after);
                                }
                            }
                        }
                        // One diff per file, not one per rule
                        contents_before.remove(file.as_path());
                    }
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        rule_id,
                        file.display()
                    );
                    total_already_applied += 1;
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), rule_id, reason);
                    total_skipped += 1;
                }
                Ok(PatchResult::Failed { file, reason }) => {
                    eprintln!("{} {}: Failed - {}", "✗".red(), rule_id, reason);
                    eprintln!("  File: {}", file.display());
                    total_failed += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), rule_id, e);
                    total_failed += 1;

                    match &e {
                        ApplicationError::NoMatch { file, .. } => {
                            eprintln!("  {}", "CONFLICT: anchor matched nothing".red());
                            eprintln!("  File: {}", file.display());
                            eprintln!("  Possible causes:");
                            eprintln!("    - The target was reworked upstream");
                            eprintln!("    - The rule was already superseded by a manual edit");
                        }
                        ApplicationError::AmbiguousAnchor { file, count } => {
                            eprintln!(
                                "  {}",
                                format!("CONFLICT: anchor matched {count} locations").red()
                            );
                            eprintln!("  File: {}", file.display());
                            eprintln!("  Action: lengthen the anchor or set occurrence explicitly");
                        }
                        _ => {}
                    }
                }
            }
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_files = discover_patch_files(&workspace)?;
    let version = workspace_version(&workspace);

    println!("{}", "Patch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!("Version: {}", version);
    println!();

    let mut applied = Vec::new();
    let mut not_applied = Vec::new();
    let mut skipped = Vec::new();

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        let results = check_patches(&config, &workspace, &version);

        for (rule_id, result) in results {
            match result {
                Ok(PatchResult::Applied { .. }) => {
                    // Anchor found; the rule has not been applied yet.
                    not_applied.push((rule_id, "anchor found, not applied".to_string()));
                }
                Ok(PatchResult::AlreadyApplied { .. }) => {
                    applied.push(rule_id);
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    skipped.push((rule_id, reason));
                }
                Ok(PatchResult::Failed { ref reason, .. }) => {
                    not_applied.push((rule_id, reason.clone()));
                }
                Err(ref e) => {
                    not_applied.push((rule_id, e.to_string()));
                }
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} rules)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !not_applied.is_empty() {
        println!(
            "{} {} ({} rules)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            not_applied.len()
        );
        for (id, reason) in &not_applied {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    if !skipped.is_empty() {
        println!(
            "{} {} ({} rules)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            skipped.len()
        );
        for (id, reason) in &skipped {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_verify(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_files = discover_patch_files(&workspace)?;
    let version = workspace_version(&workspace);

    println!("{}", "Verifying patches...".bold());
    println!("Workspace: {}", workspace.display());
    println!("Version: {}", version);
    println!();

    let mut verified = 0;
    let mut mismatch = 0;
    let mut skipped = 0;

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        let results = check_patches(&config, &workspace, &version);

        for (rule_id, result) in results {
            match result {
                Ok(PatchResult::AlreadyApplied { .. }) => {
                    println!("{} {}: Verified (already applied)", "✓".green(), rule_id);
                    verified += 1;
                }
                Ok(PatchResult::Applied { file }) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), rule_id);
                    eprintln!("  Expected: rule already applied");
                    eprintln!("  Found: rule not yet applied");
                    eprintln!("  Location: {}", file.display());
                    mismatch += 1;
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), rule_id, reason);
                    skipped += 1;
                }
                Ok(PatchResult::Failed {
                    ref file,
                    ref reason,
                }) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), rule_id);
                    eprintln!("  Error: {}", reason);
                    eprintln!("  Location: {}", file.display());
                    mismatch += 1;
                }
                Err(ref e) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), rule_id);
                    eprintln!("  Error: {}", e);
                    mismatch += 1;
                }
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());
    println!("  {} skipped", format!("{}", skipped).cyan());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_files = discover_patch_files(&workspace)?;

    println!("{}", "Available patch sets".bold());
    println!();

    for patch_file in patch_files {
        match load_from_path(&patch_file) {
            Ok(config) => {
                println!(
                    "{} ({} rules)",
                    config.meta.name.bold(),
                    config.patches.len()
                );
                println!("  File: {}", patch_file.display());
                if let Some(description) = &config.meta.description {
                    println!("  {}", description);
                }
                if let Some(range) = &config.meta.version_range {
                    println!("  Versions: {}", range);
                }
                let mut targets: Vec<&str> =
                    config.patches.iter().map(|p| p.file.as_str()).collect();
                targets.dedup();
                for target in targets {
                    println!("  Target: {}", target);
                }
            }
            Err(e) => {
                eprintln!(
                    "{} {}: {}",
                    "✗".red(),
                    patch_file.display(),
                    format!("{e}").red()
                );
            }
        }
        println!();
    }

    Ok(())
}
