//! archscan command-line entry point.
//!
//! Usage:
//!   archscan scan --name <n> --ruleset <key> <archive>...
//!   archscan list
//!   archscan show <id>
//!   archscan json <id>
//!   archscan delete <id>
//!   archscan rulesets

mod cli;
mod logging;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{info, warn};

use archscan::scanner::result::severity_counts;
use archscan::{
    load_config_or_default, normalize, parse_id, Config, Database, PoolOptions, Ruleset, Scan,
    ScanOutcome, ScanReportView, ScanService, SystemRunner, WorkerPool,
};

use cli::{Cli, Commands};
use progress::{short_id, ConsoleProgress};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.json) {
        eprintln!("Error: {e:?}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config_or_default(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Scan {
            name,
            ruleset,
            archives,
        } => run_scan(&config, &name, &ruleset, &archives),
        Commands::List => run_list(&read_only_service(&config)?),
        Commands::Show { id } => run_show(&read_only_service(&config)?, &id),
        Commands::Json { id } => run_json(&read_only_service(&config)?, &id),
        Commands::Delete { id } => {
            let service = read_only_service(&config)?;
            let id = parse_id(&id)?;
            service.delete(id)?;
            println!("Deleted scan {}", id);
            Ok(())
        }
        Commands::Rulesets => {
            for ruleset in Ruleset::ALL {
                println!("{:<16} {}", ruleset.as_str(), ruleset.config_arg());
            }
            Ok(())
        }
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config
        .resolved_database_path()
        .context("cannot determine database path: no home directory and no databasePath set")?;
    Database::open(&path).with_context(|| format!("failed to open database {}", path.display()))
}

fn read_only_service(config: &Config) -> Result<ScanService> {
    Ok(ScanService::new(
        open_database(config)?,
        config.resolved_temp_directory(),
    ))
}

/// Submits every archive, then stops the pool and reports each outcome.
fn run_scan(config: &Config, name: &str, ruleset: &str, archives: &[PathBuf]) -> Result<()> {
    // Fail on a bad key before the scanner is even checked.
    ruleset.parse::<Ruleset>()?;

    let db = open_database(config)?;
    let options = PoolOptions::from_config(config)?;
    let pool = Arc::new(WorkerPool::start_with_progress(
        options,
        Arc::new(SystemRunner),
        Arc::new(db.clone()),
        Arc::new(ConsoleProgress),
    )?);
    let service =
        ScanService::new(db, config.resolved_temp_directory()).with_pool(Arc::clone(&pool));

    let interrupts = Arc::new(AtomicUsize::new(0));
    {
        let interrupts = Arc::clone(&interrupts);
        ctrlc::set_handler(move || match on_interrupt(&interrupts) {
            Interrupt::Finish => {
                eprintln!("Finishing running scans, press Ctrl-C again to abort them");
            }
            Interrupt::Abort => {
                eprintln!("Aborted, running scans are left unfinished");
                std::process::exit(130);
            }
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let mut submitted = Vec::with_capacity(archives.len());
    let mut rejected = 0usize;
    for archive in archives {
        if interrupts.load(Ordering::SeqCst) > 0 {
            warn!("Interrupted, not submitting the remaining archives");
            break;
        }
        match service.submit_file(name, ruleset, archive) {
            Ok(scan) => {
                eprintln!("[{}] submitted {}", short_id(scan.id), archive.display());
                submitted.push(scan.id);
            }
            Err(e) => {
                eprintln!("{}: {}", archive.display(), e);
                rejected += 1;
            }
        }
    }

    info!(
        "Waiting for {} running scan(s) of {} submitted",
        pool.busy_workers(),
        submitted.len()
    );
    pool.stop();
    info!(
        "{} scan(s) completed by {} worker(s)",
        pool.completed_scans(),
        pool.worker_count()
    );

    let mut failed = 0usize;
    for id in submitted {
        let scan = service.get(id)?;
        if matches!(scan.outcome(), ScanOutcome::Failed(_)) {
            failed += 1;
        }
        println!("{}", describe(&scan));
    }

    if rejected > 0 || failed > 0 {
        bail!("{} archive(s) rejected, {} scan(s) failed", rejected, failed);
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Stop submitting and let running scans finish.
    Finish,
    /// Exit now.
    Abort,
}

fn on_interrupt(presses: &AtomicUsize) -> Interrupt {
    if presses.fetch_add(1, Ordering::SeqCst) == 0 {
        Interrupt::Finish
    } else {
        Interrupt::Abort
    }
}

/// `<id>  <name>  <outcome>` for the end-of-run summary.
fn describe(scan: &Scan) -> String {
    let outcome = match scan.outcome() {
        ScanOutcome::Pending => "pending".to_string(),
        ScanOutcome::Failed(error) => format!("failed: {}", error),
        ScanOutcome::Succeeded(output) => match normalize(output) {
            Ok(findings) => {
                let counts = severity_counts(&findings)
                    .into_iter()
                    .map(|(severity, n)| format!("{} {}", n, severity.to_lowercase()))
                    .collect::<Vec<_>>();
                if counts.is_empty() {
                    "no findings".to_string()
                } else {
                    format!("{} finding(s): {}", findings.len(), counts.join(", "))
                }
            }
            Err(e) => format!("unreadable report: {}", e),
        },
    };
    format!("{}  {}  {}", scan.id, scan.name, outcome)
}

fn state_label(scan: &Scan) -> &'static str {
    match scan.outcome() {
        ScanOutcome::Pending => "pending",
        ScanOutcome::Failed(_) => "failed",
        ScanOutcome::Succeeded(_) => "done",
    }
}

fn run_list(service: &ScanService) -> Result<()> {
    let scans = service.list()?;
    if scans.is_empty() {
        println!("No scans.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<24}  {:<14}  {:<8}  SUBMITTED",
        "ID", "NAME", "RULESET", "STATE"
    );
    for scan in &scans {
        println!(
            "{:<36}  {:<24}  {:<14}  {:<8}  {}",
            scan.id,
            truncate(&scan.name, 24),
            scan.ruleset.as_str(),
            state_label(scan),
            scan.submitted_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
    }

    let pending = service.pending_count()?;
    if pending > 0 {
        println!();
        println!("{} scan(s) pending", pending);
    }
    Ok(())
}

fn run_show(service: &ScanService, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let scan = service.get(id)?;
    println!("Scan {} ({}, ruleset {})", scan.id, scan.name, scan.ruleset);

    match service.results(id)? {
        ScanReportView::Failed { error } => {
            println!("Scan failed: {}", error);
        }
        ScanReportView::Findings(findings) => {
            for finding in &findings {
                let severity = finding.extra.severity.as_deref().unwrap_or("INFO");
                println!();
                println!("{:<8} {}", severity, finding.check_id);
                println!("         {}", finding.location());
                if !finding.extra.message.is_empty() {
                    println!("         {}", finding.extra.message.trim());
                }
                let metadata = &finding.extra.metadata;
                if !metadata.cwe.is_empty() {
                    println!("         CWE: {}", join(metadata.cwe.iter()));
                }
                if !metadata.owasp.is_empty() {
                    println!("         OWASP: {}", join(metadata.owasp.iter()));
                }
            }
            println!();
            println!("{} finding(s)", findings.len());
        }
    }
    Ok(())
}

fn run_json(service: &ScanService, id: &str) -> Result<()> {
    let raw = service.raw_output(parse_id(id)?)?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", raw),
    }
    Ok(())
}

fn join<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values.map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}
