//! `scenesync` command line
//!
//! - `check`: parse and validate declaration files
//! - `simulate`: sync declarations against an in-memory remote and print the
//!   requests a live remote would have received

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use scenesync_core::simulator::RecordedCall;
use scenesync_core::{CleanReport, MemoryGateway, Session, SyncConfig};
use scenesync_model::SceneDeclaration;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("scenesync")
        .version(scenesync_core::VERSION)
        .about("Declarative scene graph reconciliation")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("check")
                .about("Parse and validate declaration files")
                .arg(
                    Arg::new("declarations")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML or JSON scene declarations"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Sync declarations against an in-memory remote")
                .arg(
                    Arg::new("declarations")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML or JSON scene declarations, synced in order"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Sync configuration (TOML)"),
                )
                .arg(
                    Arg::new("clean")
                        .long("clean")
                        .action(ArgAction::SetTrue)
                        .help("Run garbage collection after syncing"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_declaration(path: &Path) -> Result<SceneDeclaration> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let declaration = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => SceneDeclaration::from_json_str(&source),
        _ => SceneDeclaration::from_yaml_str(&source),
    }
    .with_context(|| format!("failed to parse {}", path.display()))?;
    declaration
        .validate()
        .with_context(|| format!("invalid declaration in {}", path.display()))?;
    Ok(declaration)
}

fn paths(args: &ArgMatches) -> Vec<PathBuf> {
    args.get_many::<PathBuf>("declarations")
        .into_iter()
        .flatten()
        .cloned()
        .collect()
}

fn check(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let declaration = load_declaration(path)?;
        println!("{}: scene {}", path.display(), declaration.name);
        println!("  Scenes: {}", declaration.scenes().len());
        println!("  Inputs: {}", declaration.inputs().len());
        for (key, item) in &declaration.items {
            println!("  - {} -> {}", key, item.source.name());
        }
    }
    Ok(())
}

/// Result of syncing one declaration file
struct Outcome {
    scene: String,
    errors: Vec<String>,
}

fn call_json(call: &RecordedCall) -> Value {
    json!({ "method": call.method, "params": call.params })
}

fn report_json(report: &CleanReport) -> Value {
    json!({
        "removedItems": report.removed_items,
        "removedFilters": report.removed_filters,
        "removedInputs": report.removed_inputs,
        "removedScenes": report.removed_scenes,
        "failures": report
            .failures
            .iter()
            .map(|f| json!({ "object": f.object, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
    })
}

fn print_text(outcomes: &[Outcome], report: Option<&CleanReport>, calls: &[RecordedCall]) {
    println!("Requests:");
    for call in calls {
        println!("  {} {}", call.method, call.params);
    }
    println!();
    for outcome in outcomes {
        if outcome.errors.is_empty() {
            println!("Scene {}: in sync", outcome.scene);
        } else {
            println!("Scene {}: {} error(s)", outcome.scene, outcome.errors.len());
            for error in &outcome.errors {
                println!("  {error}");
            }
        }
    }
    if let Some(report) = report {
        println!();
        println!("Clean:");
        println!("  Items removed: {}", report.removed_items.len());
        println!("  Filters removed: {}", report.removed_filters.len());
        println!("  Inputs removed: {}", report.removed_inputs.len());
        println!("  Scenes removed: {}", report.removed_scenes.len());
        for failure in &report.failures {
            println!("  Failed: {} ({})", failure.object, failure.error);
        }
    }
}

/// Returns false if any sync or deletion failed
async fn simulate(paths: &[PathBuf], config: Option<&PathBuf>, clean: bool, json: bool) -> Result<bool> {
    let config = match config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SyncConfig::default(),
    };
    let declarations = paths
        .iter()
        .map(|p| load_declaration(p))
        .collect::<Result<Vec<_>>>()?;

    let gateway = Arc::new(MemoryGateway::new());
    let mut session = Session::new(gateway.clone(), config);

    let mut outcomes = Vec::new();
    for declaration in &declarations {
        let errors = match session.sync(declaration).await {
            Ok(_) => Vec::new(),
            Err(e) => e.flatten().iter().map(ToString::to_string).collect(),
        };
        outcomes.push(Outcome {
            scene: declaration.name.clone(),
            errors,
        });
    }

    let report = if clean {
        Some(session.clean().await.context("clean failed")?)
    } else {
        None
    };
    let calls = gateway.calls();
    tracing::info!("Simulation issued {} request(s)", calls.len());

    if json {
        let output = json!({
            "syncs": outcomes
                .iter()
                .map(|o| json!({ "scene": o.scene, "errors": o.errors }))
                .collect::<Vec<_>>(),
            "clean": report.as_ref().map(report_json),
            "calls": calls.iter().map(call_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&outcomes, report.as_ref(), &calls);
    }

    let synced = outcomes.iter().all(|o| o.errors.is_empty());
    Ok(synced && report.map_or(true, |r| r.is_clean()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_count("verbose"), matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("check", args)) => check(&paths(args)),
        Some(("simulate", args)) => {
            let ok = simulate(
                &paths(args),
                args.get_one::<PathBuf>("config"),
                args.get_flag("clean"),
                args.get_flag("json"),
            )
            .await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Some((other, _)) => bail!("unknown subcommand {other}"),
        None => bail!("no subcommand given"),
    }
}
