//! payloadctl - Main entry point
//!
//! Runs software selection checks against JSON repository metadata outside
//! of an installation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use anaconda_payloads::cli::{Cli, Commands};
use anaconda_payloads::{
    MetadataResolver, PackagesSelectionData, PayloadConfig, Resolver, SelectionCache,
    SelectionResolutionTask, TaskRegistry, TaskRunner, get_software_selection_status,
    is_software_selection_complete,
};

/// Initialize the logger with appropriate settings
fn init_logger() {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    let config = match &cli.config {
        Some(path) => PayloadConfig::load_from_file(path)?,
        None => PayloadConfig::default(),
    };

    match cli.command {
        Commands::Check {
            metadata,
            selection,
            json,
        } => run_check(&config, &metadata, &selection, json),
        Commands::Groups {
            metadata,
            selection,
        } => run_groups(&metadata, selection.as_deref()),
        Commands::Status {
            metadata,
            selection,
            kickstarted,
        } => run_status(&metadata, &selection, kickstarted),
        Commands::ValidateConfig { file } => run_validate_config(&file),
    }
}

fn load_selection(path: &Path) -> Result<PackagesSelectionData> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read software selection from {:?}", path))?;

    serde_json::from_str(&content).context("Failed to parse software selection JSON")
}

fn load_resolver(path: &Path) -> Result<Arc<MetadataResolver>> {
    info!("Loading repository metadata from: {:?}", path);
    Ok(Arc::new(MetadataResolver::from_file(path)?))
}

fn run_check(config: &PayloadConfig, metadata: &Path, selection: &Path, json: bool) -> Result<()> {
    config.validate()?;
    let resolver = load_resolver(metadata)?;
    let selection = load_selection(selection)?;

    let task = SelectionResolutionTask::new(resolver, selection, config);
    let handle = TaskRegistry::new().spawn(task, TaskRunner::new())?;

    if !handle.wait(Some(config.check_timeout())) {
        anyhow::bail!(
            "The software selection check didn't finish in {} seconds",
            config.check_timeout_secs
        );
    }
    let report = handle.join()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for message in &report.error_messages {
            println!("error: {}", message);
        }
        for message in &report.warning_messages {
            println!("warning: {}", message);
        }
        if report.is_empty() {
            println!("✓ The software selection is valid");
        }
    }

    if !report.is_valid() {
        error!("The software selection has {} errors", report.error_messages.len());
        std::process::exit(1);
    }

    Ok(())
}

fn run_groups(metadata: &Path, selection: Option<&Path>) -> Result<()> {
    let resolver = load_resolver(metadata)?;
    let mut cache = SelectionCache::new(resolver.clone());

    match selection {
        Some(path) => cache.apply_selection_data(&load_selection(path)?),
        None => {
            let default_environment = resolver.default_environment().unwrap_or_default();
            cache.select_environment(&default_environment)?;
        }
    }

    if cache.environment().is_empty() {
        println!("No environment selected");
        return Ok(());
    }

    println!("Environment: {}", cache.environment());
    for group in cache.available_groups() {
        let mark = if cache.is_group_selected(&group) { "x" } else { " " };
        let name = resolver
            .get_group_data(&group)
            .map(|data| data.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| group.clone());

        println!("  [{}] {} ({})", mark, name, group);
    }

    Ok(())
}

fn run_status(metadata: &Path, selection: &Path, kickstarted: bool) -> Result<()> {
    let resolver = load_resolver(metadata)?;
    let selection = load_selection(selection)?;

    let status = get_software_selection_status(resolver.as_ref(), &selection, kickstarted);
    let complete = is_software_selection_complete(resolver.as_ref(), &selection, kickstarted);

    println!("{}", status);
    println!("Complete: {}", if complete { "yes" } else { "no" });
    Ok(())
}

fn run_validate_config(path: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", path);

    let config = PayloadConfig::load_from_file(path)?;
    match config.validate() {
        Ok(()) => {
            info!("Configuration validation successful");
            println!("✓ Configuration file is valid: {:?}", path);
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }
}
