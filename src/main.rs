//! RocotoViewer CLI Entry Point
//!
//! Loads Rocoto workflows, prints a summary, and optionally follows the
//! workflow files and their logs.
//!
//! # Usage
//!
//! ```bash
//! # Summarize a workflow
//! rocotoviewer gfs.xml
//!
//! # Dump the parsed workflow as JSON
//! rocotoviewer gfs.xml --json
//!
//! # Re-parse on change and follow a log file
//! rocotoviewer gfs.xml --watch --tail log/gfs.log
//!
//! # Use an explicit config file
//! rocotoviewer --config rocotoviewer.yaml
//! ```

use std::collections::HashMap;
use std::env;
use std::fs::OpenOptions;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info, warn};

use rocotoviewer::config::Config;
use rocotoviewer::events::{EventBus, FILE_CHANGED, LOG_LINE_ADDED};
use rocotoviewer::logs::LogLevel;
use rocotoviewer::monitoring::FileMonitor;
use rocotoviewer::state::{StateManager, WorkflowStats};
use rocotoviewer::workflow::{Workflow, WorkflowParser};
use rocotoviewer::{APP_NAME, VERSION};

/// Command-line options parsed from arguments.
#[derive(Debug, Default)]
struct Cli {
    workflow_files: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    json: bool,
    watch: bool,
    tail_files: Vec<PathBuf>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(config: &Config, verbose: bool) -> io::Result<()> {
    let level = if verbose { "debug" } else { config.log_filter() };

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        use std::io::Write;

        match record.level() {
            log::Level::Warn | log::Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        }
    });

    if let Some(path) = &config.logging.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Rocoto Workflow Viewer");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: rocotoviewer [OPTIONS] <WORKFLOW_FILE>...");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>...  Rocoto workflow XML files");
    println!();
    println!("Options:");
    println!("  --config PATH       Configuration file (default: $ROCOTOVIEWER_CONFIG)");
    println!("  --json              Print parsed workflows as JSON");
    println!("  --watch             Re-parse workflows when their files change");
    println!("  --tail LOGFILE      Follow a log file (repeatable, implies --watch)");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  rocotoviewer gfs.xml");
    println!("  rocotoviewer gfs.xml --json");
    println!("  rocotoviewer gfs.xml --watch --tail log/gfs.log");
}

/// Parses command-line arguments into a Cli struct.
fn parse_arguments(args: &[String]) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--json" => {
                cli.json = true;
            }
            "--watch" | "-w" => {
                cli.watch = true;
            }
            "--verbose" | "-v" => {
                cli.verbose = true;
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                cli.config_path = Some(PathBuf::from(&args[i]));
            }
            "--tail" | "-t" => {
                i += 1;
                if i >= args.len() {
                    return Err("--tail requires a log file argument".to_string());
                }
                cli.tail_files.push(PathBuf::from(&args[i]));
                cli.watch = true;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                cli.workflow_files.push(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    Ok(cli)
}

/// Prints a one-workflow summary.
fn print_summary(workflow: &Workflow) {
    let stats = WorkflowStats::from_workflow(workflow);

    println!("{} {}", "Workflow:".bold(), workflow.name.cyan());
    if !workflow.description.is_empty() {
        println!("  {}", workflow.description);
    }
    println!("  Source:       {}", workflow.source_file);
    println!(
        "  Tasks:        {} ({} dependencies, {} cycle definitions)",
        stats.total_tasks,
        workflow.dependencies.len(),
        workflow.cycles.len()
    );
    println!(
        "  Status:       {} succeeded, {} failed, {} running, {} queued",
        stats.successful_tasks.to_string().green(),
        stats.failed_tasks.to_string().red(),
        stats.running_tasks.to_string().yellow(),
        stats.queued_tasks.to_string().blue()
    );
    println!("  Complete:     {:.1}%", stats.completion_percentage);

    if let (Some(start), Some(end)) = (workflow.timeline.earliest_start, workflow.timeline.latest_end) {
        println!(
            "  Timeline:     {} -> {} ({:.0}s)",
            start.to_rfc3339(),
            end.to_rfc3339(),
            workflow.timeline.total_duration
        );
    }

    for group in &workflow.task_groups {
        println!("  [{}] {}", group.name, group.tasks.join(", "));
    }
    println!();
}

/// Prints one tailed log line, colored by level.
fn print_log_line(file: &str, line: &str, level: LogLevel) {
    let name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    let line = match level {
        LogLevel::Error => line.red(),
        LogLevel::Warning => line.yellow(),
        LogLevel::Debug => line.dimmed(),
        LogLevel::Info => line.normal(),
    };
    println!("{} {}", format!("{}:", name).bold(), line);
}

/// Loads every requested workflow into the state manager. Returns the
/// workflows that parsed, keyed by source path.
fn load_workflows(
    files: &[PathBuf],
    parser: WorkflowParser,
    state: &StateManager,
) -> Vec<(PathBuf, Workflow)> {
    let mut loaded = Vec::new();

    for path in files {
        info!("Loading workflow: {}", path.display());
        match parser.parse(path) {
            Some(workflow) => {
                state.update_workflow(&workflow.id, workflow.clone());
                loaded.push((path.clone(), workflow));
            }
            None => error!("Could not load workflow from '{}'", path.display()),
        }
    }

    loaded
}

/// Follows workflow files and log files until stdin receives a line or EOF.
fn watch(
    config: &Config,
    loaded: &[(PathBuf, Workflow)],
    tail_files: &[PathBuf],
    parser: WorkflowParser,
    state: Arc<StateManager>,
    bus: Arc<EventBus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let monitor = FileMonitor::new(config, Arc::clone(&state), Some(Arc::clone(&bus)));

    let sources: HashMap<PathBuf, String> = loaded
        .iter()
        .map(|(path, workflow)| {
            let path = path.canonicalize().unwrap_or_else(|_| path.clone());
            (path, workflow.id.clone())
        })
        .collect();

    for path in sources.keys() {
        monitor.add_path(path);
    }
    for path in tail_files {
        if !monitor.add_log_file_for_tailing(path) {
            warn!("Not following {}", path.display());
        }
    }

    bus.subscribe(LOG_LINE_ADDED, |event| {
        let file = event.data["file_path"].as_str().unwrap_or_default();
        let line = event.data["line"].as_str().unwrap_or_default();
        let level = serde_json::from_value(event.data["level"].clone()).unwrap_or_default();
        print_log_line(file, line, level);
        Ok(())
    });

    let reload_state = Arc::clone(&state);
    bus.subscribe(FILE_CHANGED, move |event| {
        if event.data["event_type"] == "deleted" {
            return Ok(());
        }
        let path = PathBuf::from(event.data["path"].as_str().unwrap_or_default());
        let Some(id) = sources.get(&path) else {
            return Ok(());
        };

        if let Some(workflow) = parser.parse(&path) {
            info!("Reloaded workflow '{}' ({} tasks)", id, workflow.tasks.len());
            reload_state.update_workflow(id, workflow);
        }
        Ok(())
    });

    monitor.start()?;
    println!(
        "Watching {} workflow files and {} log files. Press Enter to stop.",
        loaded.len(),
        monitor.tailed_files().len()
    );

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    monitor.stop();
    state.save_state(None);
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let cli = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Load and check configuration
    let config = Config::load(cli.config_path.as_deref())?;
    config.validate()?;

    setup_logging(&config, cli.verbose)?;

    if !cli.json {
        print_banner();
    }

    let mut files = cli.workflow_files.clone();
    files.extend(config.workflows.iter().map(|w| w.path.clone()));
    if files.is_empty() {
        print_usage();
        return Err("No workflow files given".into());
    }

    let bus = Arc::new(EventBus::new());
    let state = Arc::new(StateManager::new(&config).with_event_bus(Arc::clone(&bus)));
    let parser = WorkflowParser::from_config(&config);

    let loaded = load_workflows(&files, parser, &state);
    if loaded.is_empty() {
        return Err("No workflow could be loaded".into());
    }

    if cli.json {
        let workflows: Vec<&Workflow> = loaded.iter().map(|(_, w)| w).collect();
        println!("{}", serde_json::to_string_pretty(&workflows)?);
    } else {
        for (_, workflow) in &loaded {
            print_summary(workflow);
        }
    }

    if cli.watch {
        if !config.monitor.enabled {
            warn!("Monitoring is disabled in the configuration");
            return Ok(());
        }
        watch(&config, &loaded, &cli.tail_files, parser, state, bus)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
