mod config;
mod serve;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;

use caseflow_engine::timeline::{self, Timeline};
use caseflow_engine::{AncillaryEvent, StepCatalog, StepProgress, StepTemplate, TimelineStep};
use caseflow_graph::Routing;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::{ServeConfig, ServeFlags};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Case workflow catalogs, timelines and the workflow HTTP API.
#[derive(Parser)]
#[command(name = "caseflow", version, about = "Case workflow progression engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a step catalog against the JSON Schema and the graph rules
    Validate {
        /// Path to the catalog JSON file
        catalog: PathBuf,
    },

    /// List the steps of one world in order, with their routing
    Steps {
        /// Path to the catalog JSON file
        catalog: PathBuf,
        /// World to list
        #[arg(long)]
        world: String,
    },

    /// Assemble a case timeline from exported progress rows and events
    Timeline {
        /// Path to the catalog JSON file
        catalog: PathBuf,
        /// Path to a JSON array of progress rows
        #[arg(long)]
        progress: PathBuf,
        /// Path to a JSON object of ancillary events keyed by case id
        #[arg(long)]
        events: Option<PathBuf>,
        /// Case to assemble (required when the rows span several cases)
        #[arg(long)]
        case: Option<String>,
    },

    /// Start the HTTP JSON API server
    Serve {
        /// Port to listen on (default 8080)
        #[arg(long)]
        port: Option<u16>,
        /// Path to the catalog JSON file
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Path to a JSON object of ancillary events keyed by case id
        #[arg(long)]
        events: Option<PathBuf>,
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Validate { catalog } => {
            cmd_validate(&catalog, cli.output, cli.quiet);
        }
        Commands::Steps { catalog, world } => {
            cmd_steps(&catalog, &world, cli.output, cli.quiet);
        }
        Commands::Timeline {
            catalog,
            progress,
            events,
            case,
        } => {
            cmd_timeline(
                &catalog,
                &progress,
                events.as_deref(),
                case.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Serve {
            port,
            catalog,
            events,
            config,
        } => {
            let file = match config {
                Some(path) => match config::read_serve_config(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        report_error(&format!("error: {}", e), cli.output, cli.quiet);
                        process::exit(1);
                    }
                },
                None => ServeConfig::default(),
            };
            let flags = ServeFlags {
                port,
                catalog,
                events,
            };
            let settings = match config::resolve(flags, |k| std::env::var(k).ok(), file) {
                Ok(s) => s,
                Err(e) => {
                    report_error(&format!("error: {}", e), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(settings)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
    }
}

/// Log to stderr so stdout stays machine-readable.
///
/// The filter comes from `CASEFLOW_LOG`, then `RUST_LOG`, then `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("CASEFLOW_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Loading ───────────────────────────────────────────────────────────────────

static CATALOG_SCHEMA_STR: &str = include_str!("../../../docs/catalog-schema.json");

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("error parsing JSON in '{}': {}", path.display(), e))
}

/// Check a catalog document against the embedded schema.
///
/// Returns every violation as a separate message; empty when valid.
fn schema_errors(doc: &serde_json::Value) -> Result<Vec<String>, String> {
    let schema: serde_json::Value = serde_json::from_str(CATALOG_SCHEMA_STR)
        .map_err(|e| format!("internal error: failed to parse embedded catalog schema: {}", e))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| format!("internal error: failed to compile schema: {}", e))?;
    Ok(validator
        .iter_errors(doc)
        .map(|e| format!("{}", e))
        .collect())
}

/// Read, schema-check and load a catalog file.
pub(crate) fn load_catalog(path: &Path) -> Result<StepCatalog, String> {
    let doc = read_json(path)?;
    let errors = schema_errors(&doc)?;
    if let Some(first) = errors.first() {
        return Err(format!("invalid catalog '{}': {}", path.display(), first));
    }
    StepCatalog::from_json(&doc).map_err(|e| format!("invalid catalog '{}': {}", path.display(), e))
}

/// Read an events file: a JSON object mapping case ids to event arrays.
pub(crate) fn read_events_file(path: &Path) -> Result<HashMap<String, Vec<AncillaryEvent>>, String> {
    let doc = read_json(path)?;
    serde_json::from_value(doc)
        .map_err(|e| format!("invalid events file '{}': {}", path.display(), e))
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_validate(catalog_path: &Path, output: OutputFormat, quiet: bool) {
    let doc = match read_json(catalog_path) {
        Ok(v) => v,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let mut errors = match schema_errors(&doc) {
        Ok(errors) => errors,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    // Graph rules only make sense once the document has the right shape.
    let catalog = if errors.is_empty() {
        match StepCatalog::from_json(&doc) {
            Ok(c) => Some(c),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        }
    } else {
        None
    };

    match catalog {
        Some(catalog) => {
            if quiet {
                return;
            }
            let worlds = catalog.worlds().count();
            let steps = catalog.step_count();
            match output {
                OutputFormat::Text => println!("valid ({} worlds, {} steps)", worlds, steps),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({"valid": true, "worlds": worlds, "steps": steps})
                ),
            }
        }
        None => {
            match output {
                OutputFormat::Text => {
                    if !quiet {
                        eprintln!("invalid catalog");
                        for err in &errors {
                            eprintln!("  - {}", err);
                        }
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "valid": false,
                        "errors": errors
                    });
                    eprintln!(
                        "{}",
                        serde_json::to_string_pretty(&json).unwrap_or_default()
                    );
                }
            }
            process::exit(1);
        }
    }
}

fn cmd_steps(catalog_path: &Path, world_id: &str, output: OutputFormat, quiet: bool) {
    let catalog = match load_catalog(catalog_path) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let world = match catalog.world(world_id) {
        Ok(w) => w,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "world": world.id(),
                "name": world.name(),
                "steps": world.steps(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            println!("{} ({})", world.name(), world.id());
            for step in world.steps() {
                println!("{}", describe_step(step));
            }
        }
    }
}

fn describe_step(step: &StepTemplate) -> String {
    let mut flags = vec![step.step_type.as_str()];
    if step.is_optional {
        flags.push("optional");
    }
    if step.can_loop_back {
        flags.push("loops");
    }
    let routing = match step.routing() {
        Routing::Linear { next: Some(next) } => format!("-> {}", next),
        Routing::Linear { next: None } => "-> (end)".to_string(),
        Routing::Decision { yes, no } => format!(
            "yes -> {}, no -> {}",
            yes.unwrap_or("(end)"),
            no.unwrap_or("(end)")
        ),
    };
    format!(
        "{:>3}. {:<16} {:<28} [{}] {}",
        step.order,
        step.id,
        step.name,
        flags.join(", "),
        routing
    )
}

fn cmd_timeline(
    catalog_path: &Path,
    progress_path: &Path,
    events_path: Option<&Path>,
    case_id: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) {
    let timeline = match offline_timeline(catalog_path, progress_path, events_path, case_id) {
        Ok(t) => t.recent_first(),
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&timeline).unwrap_or_default()
        ),
        OutputFormat::Text => print_timeline(&timeline),
    }
}

fn offline_timeline(
    catalog_path: &Path,
    progress_path: &Path,
    events_path: Option<&Path>,
    case_id: Option<&str>,
) -> Result<Timeline, String> {
    let catalog = load_catalog(catalog_path)?;

    let rows: Vec<StepProgress> = serde_json::from_value(read_json(progress_path)?)
        .map_err(|e| format!("invalid progress file '{}': {}", progress_path.display(), e))?;

    let case_id = match case_id {
        Some(id) => id.to_string(),
        None => {
            let mut cases: Vec<&str> = rows.iter().map(|r| r.case_id.as_str()).collect();
            cases.sort_unstable();
            cases.dedup();
            match cases.as_slice() {
                [only] => only.to_string(),
                [] => return Err("progress file has no rows; pass --case".to_string()),
                _ => {
                    return Err(format!(
                        "progress file spans {} cases; pass --case",
                        cases.len()
                    ))
                }
            }
        }
    };
    let rows: Vec<StepProgress> = rows.into_iter().filter(|r| r.case_id == case_id).collect();

    let events = match events_path {
        Some(path) => read_events_file(path)?
            .remove(&case_id)
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let steps = match rows.first() {
        Some(first) => {
            let world = catalog
                .world_of(&first.step_id)
                .map_err(|e| format!("error: {}", e))?;
            TimelineStep::from_world(world, rows).map_err(|e| format!("error: {}", e))?
        }
        None => Vec::new(),
    };
    Ok(timeline::assemble(steps, events))
}

fn print_timeline(timeline: &Timeline) {
    for entry in &timeline.entries {
        let started = entry
            .progress
            .started_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "not started".to_string());
        println!(
            "{:>3}. {} [{}] {}",
            entry.position, entry.step_name, entry.progress.status, started
        );
        for event in &entry.events {
            println!("       {} {} {}", event.created_at(), event.kind(), event.id());
        }
    }
    if !timeline.unassigned.is_empty() {
        println!("unassigned:");
        for event in &timeline.unassigned {
            println!("       {} {} {}", event.created_at(), event.kind(), event.id());
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
