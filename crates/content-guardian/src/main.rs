//! `cguard` - CLI for content-guardian
//!
//! This binary runs the filtering engine over JSON document trees and inspects
//! profiles, rules and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use content_guardian::cli::{
    CheckCommand, Cli, Command, ConfigCommand, ProfileCommand, ScanCommand, WatchCommand,
};
use content_guardian::engine::ScanReport;
use content_guardian::rule::Action;
use content_guardian::tree::Selector;
use content_guardian::{
    init_logging, Config, Engine, FileRuleSource, KeywordMatcher, MemoryTree, ProfileResolver,
    RuleSnapshot, SharedTree,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // Config commands report validation problems themselves.
    let config = if matches!(cli.command, Command::Config(_)) {
        Config::load_unvalidated(cli.config.clone())
    } else {
        Config::load_from(cli.config.clone())
    }
    .context("loading configuration")?;

    match cli.command {
        Command::Scan(cmd) => handle_scan(&config, cmd).await,
        Command::Watch(cmd) => handle_watch(&config, cmd).await,
        Command::Profile(cmd) => handle_profile(&config, &cmd),
        Command::Check(cmd) => handle_check(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn rules_path(config: &Config, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| config.rules_path())
}

fn load_document(path: &Path) -> Result<MemoryTree> {
    MemoryTree::load(path).with_context(|| format!("loading document {}", path.display()))
}

async fn handle_scan(config: &Config, cmd: ScanCommand) -> Result<()> {
    let tree = load_document(&cmd.document)?;
    let source = FileRuleSource::new(rules_path(config, cmd.rules));

    let mut engine = Engine::new(config, &cmd.host, tree, source)?;
    let report = engine.start().await?;

    if cmd.json {
        let mut output = serde_json::json!({
            "host": engine.host_name(),
            "profiles": engine.profile().names,
            "rules": engine.snapshot().rules.len(),
            "report": report,
        });
        if cmd.emit_tree {
            output["document"] = serde_json::to_value(engine.tree().to_document())?;
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&engine.profile().names, engine.snapshot().rules.len(), &report);
        if cmd.emit_tree {
            println!();
            println!(
                "{}",
                serde_json::to_string_pretty(&engine.tree().to_document())?
            );
        }
    }
    Ok(())
}

fn print_report(profiles: &[String], rules: usize, report: &ScanReport) {
    println!("Scan Report");
    println!("===========");
    println!("Profiles:          {}", profiles.join(", "));
    println!("Rules:             {rules}");
    println!("Candidates:        {}", report.candidates);
    println!("Matched:           {}", report.matched);
    println!("Filtered:          {}", report.filtered);
    println!("Already processed: {}", report.skipped_processed);
    for action in Action::ALL {
        println!("  {:<16} {}", action.to_string(), report.by_action.get(action));
    }
}

async fn handle_watch(config: &Config, cmd: WatchCommand) -> Result<()> {
    let tree = SharedTree::new(load_document(&cmd.document)?);
    let source = FileRuleSource::new(rules_path(config, cmd.rules));
    let _watcher = source.spawn_watcher(config.rules_poll_interval());

    let mut engine = Engine::new(config, &cmd.host, tree, source.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received"),
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!(
        document = %cmd.document.display(),
        rules = %source.path().display(),
        "Watching; press Ctrl-C to stop"
    );
    engine.run(shutdown_rx).await?;

    println!(
        "Stopped after {} scans; {} containers filtered",
        engine.scan_count(),
        engine.filtered_count()
    );
    Ok(())
}

fn handle_profile(config: &Config, cmd: &ProfileCommand) -> Result<()> {
    let profile = ProfileResolver::with_custom(&config.profiles)?.resolve(&cmd.host);
    let selectors: Vec<&str> = profile.selectors.iter().map(Selector::as_str).collect();

    if cmd.json {
        let output = serde_json::json!({
            "host": cmd.host,
            "profiles": profile.names,
            "site_tags": profile.site_tags,
            "selectors": selectors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Profiles:  {}", profile.names.join(", "));
        println!(
            "Site tags: {}",
            if profile.site_tags.is_empty() {
                "(none)".to_string()
            } else {
                profile.site_tags.join(", ")
            }
        );
        println!("Selectors:");
        for selector in selectors {
            println!("  {selector}");
        }
    }
    Ok(())
}

fn handle_check(config: &Config, cmd: &CheckCommand) -> Result<()> {
    let path = rules_path(config, cmd.rules.clone());
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading rules file {}", path.display()))?;
    let snapshot = RuleSnapshot::from_json(&contents)?;
    let matcher = KeywordMatcher::new(&snapshot.rules);

    match matcher.find(&cmd.text) {
        Some(rule) => println!(
            "Matched rule {} \"{}\" ({}, category {})",
            rule.id, rule.keyword, rule.action, rule.category
        ),
        None => println!("No match among {} active rules", matcher.len()),
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Engine]");
                println!("  Scan debounce (ms):     {}", config.engine.scan_debounce_ms);
                println!(
                    "  Host poll interval (ms): {}",
                    config.engine.host_poll_interval_ms
                );
                println!(
                    "  Host wait timeout (ms):  {}",
                    config.engine.host_wait_timeout_ms
                );
                println!();
                println!("[Container]");
                println!("  Max depth:              {}", config.container.max_depth);
                println!("  Min height:             {}", config.container.min_height);
                println!("  Min width:              {}", config.container.min_width);
                println!();
                println!("[Rules]");
                println!("  Path:                   {}", config.rules_path().display());
                println!("  Poll interval (ms):     {}", config.rules.poll_interval_ms);
                println!();
                println!("[Profiles]");
                println!("  Custom profiles:        {}", config.profiles.len());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
