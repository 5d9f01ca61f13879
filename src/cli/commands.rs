//! Command dispatch
//!
//! Read-only commands print and return. Mutating commands show the planned
//! old -> new values, ask for confirmation (unless `--yes`), apply, then print
//! an itemized summary.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::is_batch_safe;
use crate::application::ItemReport;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::traversal::MAX_UPLINE_DEPTH;
use crate::domain::{find_upline, DomainError, Downline, GraphIndex};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see --help".to_string(),
        ));
    };

    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => cmd_config(cli, command),
        _ => {
            let container = build_container(cli)?;
            dispatch(cli, command, &container)
        }
    }
}

fn dispatch(cli: &Cli, command: &Commands, container: &ServiceContainer) -> CliResult<()> {
    match command {
        Commands::Analyze => cmd_analyze(container),
        Commands::Suggest { id } => cmd_suggest(container, id),
        Commands::Fix { issue } => cmd_fix(cli, container, *issue),
        Commands::FixBatch => cmd_fix_batch(cli, container),
        Commands::Rename { old, new } => cmd_rename(cli, container, old, new),
        Commands::Upline { id, depth } => cmd_upline(container, id, *depth),
        Commands::Quote { buyer, sku } => cmd_quote(container, buyer, sku.as_deref()),
        Commands::Tree { id, depth } => cmd_tree(container, id, *depth),
        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}

fn local_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.dir {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir()
            .map_err(|e| CliError::Infra(InfraError::io("determine current directory", e))),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let dir = local_dir(cli)?;
    let mut settings = Settings::load(Some(&dir))?;
    if let Some(store) = &cli.store {
        settings.store_path = store.clone();
    }
    debug!("load_settings: store_path={}", settings.store_path.display());
    Ok(settings)
}

fn build_container(cli: &Cli) -> CliResult<ServiceContainer> {
    Ok(ServiceContainer::new(load_settings(cli)?))
}

/// Ask for a yes/no answer; `--yes` answers yes.
fn confirm(cli: &Cli, question: &str) -> CliResult<()> {
    if cli.yes {
        return Ok(());
    }
    output::prompt(&format!("{question} [y/N]"));
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| CliError::Infra(InfraError::io("read confirmation", e)))?;
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(CliError::Aborted),
    }
}

fn print_steps(steps: &[ItemReport]) {
    for step in steps {
        output::step(step);
    }
}

fn report_remaining(container: &ServiceContainer) -> CliResult<()> {
    let analysis = container.integrity.analyze()?;
    if analysis.is_clean() {
        output::success("graph is consistent");
    } else {
        output::action("Remaining", &format!("{} issues", analysis.issues.len()));
    }
    Ok(())
}

// ============================================================
// Read-only commands
// ============================================================

#[instrument(skip(container))]
fn cmd_analyze(container: &ServiceContainer) -> CliResult<()> {
    let analysis = container.integrity.analyze()?;
    if analysis.is_clean() {
        output::success(&format!(
            "{} nodes, no issues found",
            analysis.snapshot.len()
        ));
        return Ok(());
    }

    output::header(&format!(
        "{} issues in {} nodes",
        analysis.issues.len(),
        analysis.snapshot.len()
    ));
    for (i, issue) in analysis.issues.iter().enumerate() {
        output::info(&format!(
            "{:>3}. {} {} {}: {}",
            i + 1,
            output::severity(issue.severity),
            issue.kind.name(),
            issue.node_id,
            issue.description
        ));
    }
    Ok(())
}

#[instrument(skip(container))]
fn cmd_suggest(container: &ServiceContainer, id: &str) -> CliResult<()> {
    let suggestion = container.integrity.suggest(id)?;
    match &suggestion.candidate {
        Some(candidate) => output::action(
            "Suggested sponsor",
            &format!("{candidate} ({} confidence)", suggestion.confidence),
        ),
        None => output::warning(&format!("no sponsor suggestion for {id}")),
    }
    output::detail(&suggestion.reason);
    Ok(())
}

#[instrument(skip(container))]
fn cmd_upline(container: &ServiceContainer, id: &str, depth: usize) -> CliResult<()> {
    let snapshot = container.integrity.snapshot()?;
    if !GraphIndex::new(&snapshot).contains(id) {
        return Err(DomainError::NodeNotFound(id.to_string()).into());
    }
    let chain = find_upline(id, &snapshot, depth.clamp(1, MAX_UPLINE_DEPTH));
    if chain.is_empty() {
        output::info(&format!("{id} has no sponsor chain"));
        return Ok(());
    }
    output::info(&format!("{id} <- {}", chain.join(" <- ")));
    Ok(())
}

#[instrument(skip(container))]
fn cmd_quote(container: &ServiceContainer, buyer: &str, sku: Option<&str>) -> CliResult<()> {
    let sku = sku.unwrap_or(&container.settings.commission.default_sku);
    let quoted = container.orders.quote(buyer, sku, None)?;
    let quote = &quoted.quote;

    let kind = if quoted.request.buyer_is_partner {
        "partner"
    } else {
        "guest"
    };
    output::header(&format!("{sku} for {buyer} ({kind})"));
    output::action("Price", &quote.price);
    if quote.payouts.is_empty() {
        output::detail("no commissions payable");
    }
    for payout in &quote.payouts {
        output::detail(&format!(
            "{:<3} {:<20} {:>8}",
            payout.level, payout.recipient_id, payout.amount
        ));
    }
    output::action("Total commission", &quote.total_commission());
    output::action("Fingerprint", &quote.fingerprint());
    Ok(())
}

fn to_termtree(node: &Downline) -> termtree::Tree<String> {
    termtree::Tree::new(node.id.clone()).with_leaves(node.children.iter().map(to_termtree))
}

#[instrument(skip(container))]
fn cmd_tree(container: &ServiceContainer, id: &str, depth: usize) -> CliResult<()> {
    let snapshot = container.integrity.snapshot()?;
    let downline = GraphIndex::new(&snapshot)
        .downline(id, depth)
        .ok_or_else(|| DomainError::NodeNotFound(id.to_string()))?;
    output::info(&to_termtree(&downline));
    output::detail(&format!("{} nodes below {id}", downline.size()));
    Ok(())
}

// ============================================================
// Mutating commands
// ============================================================

#[instrument(skip(cli, container))]
fn cmd_fix(cli: &Cli, container: &ServiceContainer, number: usize) -> CliResult<()> {
    let analysis = container.integrity.analyze()?;
    let issue = analysis.issue(number).ok_or_else(|| {
        CliError::InvalidArgs(format!(
            "no issue #{number}, analysis found {}",
            analysis.issues.len()
        ))
    })?;

    output::info(issue);
    let plan = container.repair.plan_fix(issue, &analysis.snapshot);
    if !plan.is_automatic() {
        output::warning(&plan);
        return Ok(());
    }
    output::action("Plan", &plan);
    let team = plan.team_at_stake(&analysis.snapshot);
    if team > 0 {
        output::warning(&format!(
            "{} has a team of {team}, the whole subtree is affected",
            issue.node_id
        ));
    }
    confirm(cli, "Apply this fix?")?;

    let report = container.repair.execute(issue, plan);
    print_steps(&report.steps);
    report_remaining(container)?;

    let failed = report.steps.iter().filter(|s| s.is_failed()).count();
    if failed > 0 {
        return Err(CliError::Incomplete {
            failed,
            total: report.steps.len(),
        });
    }
    Ok(())
}

#[instrument(skip(cli, container))]
fn cmd_fix_batch(cli: &Cli, container: &ServiceContainer) -> CliResult<()> {
    let analysis = container.integrity.analyze()?;
    let eligible: Vec<_> = analysis
        .issues
        .iter()
        .filter(|issue| is_batch_safe(issue, &analysis.snapshot))
        .cloned()
        .collect();
    if eligible.is_empty() {
        output::info(&format!(
            "nothing safe to fix automatically ({} issues need review)",
            analysis.issues.len()
        ));
        return Ok(());
    }

    output::header(&format!("{} fixes planned", eligible.len()));
    for issue in &eligible {
        output::detail(&container.repair.plan_fix(issue, &analysis.snapshot));
    }
    confirm(cli, "Apply these fixes?")?;

    let report = container.repair.apply_batch(&eligible, &analysis.snapshot);
    for fix in &report.fixes {
        output::info(&fix.issue);
        print_steps(&fix.steps);
    }
    output::action(
        "Batch",
        &format!(
            "{} succeeded, {} failed (run {})",
            report.succeeded(),
            report.failed(),
            report.run_id
        ),
    );
    report_remaining(container)?;

    if report.failed() > 0 {
        return Err(CliError::Incomplete {
            failed: report.failed(),
            total: report.fixes.len(),
        });
    }
    Ok(())
}

#[instrument(skip(cli, container))]
fn cmd_rename(cli: &Cli, container: &ServiceContainer, old: &str, new: &str) -> CliResult<()> {
    container.rename.check(old, new)?;
    let snapshot = container.integrity.snapshot()?;
    let referencing = snapshot
        .iter()
        .filter(|n| n.id != old && (n.sponsor_id.as_deref() == Some(old) || n.lists(old)))
        .count();

    output::header("Rename");
    output::diff_remove(old);
    output::diff_add(new);
    output::detail(&format!("{referencing} nodes reference {old}"));
    confirm(cli, "Rename?")?;

    let report = container.rename.rename_id(old, new)?;
    print_steps(&report.steps);
    if report.is_complete() {
        output::success(&format!("renamed {old} -> {new} (run {})", report.run_id));
        Ok(())
    } else {
        output::warning(&format!(
            "rename incomplete, re-run analyze to find references to {old} (run {})",
            report.run_id
        ));
        Err(CliError::Incomplete {
            failed: report.failed(),
            total: report.steps.len(),
        })
    }
}

// ============================================================
// Config
// ============================================================

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("cannot determine global config directory".into())
                })?
            } else {
                local_config_path(&local_dir(cli)?)
            };
            write_template(&path)?;
            output::action("Created", &path.display());
            Ok(())
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(p) => output::action("Global", &p.display()),
                None => output::action("Global", "(unavailable)"),
            }
            output::action("Local", &local_config_path(&local_dir(cli)?).display());
            Ok(())
        }
    }
}

fn write_template(path: &Path) -> CliResult<()> {
    if path.exists() {
        return Err(CliError::Usage(format!(
            "config already exists: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CliError::Infra(InfraError::io(format!("create {}", parent.display()), e))
        })?;
    }
    std::fs::write(path, Settings::template())
        .map_err(|e| CliError::Infra(InfraError::io(format!("write {}", path.display()), e)))
}
