//! EventRunner CLI Entry Point
//!
//! Starts a worker with the middleware demo registered, pushes one
//! `user:create:middleware` event and shuts down once the run finishes
//! or Ctrl-C is pressed.
//!
//! # Usage
//!
//! ```bash
//! # Run the demo with default settings
//! eventrunner
//!
//! # Load worker settings from YAML
//! eventrunner --config worker.yaml
//!
//! # Show debug output from the dispatch loop
//! eventrunner --verbose
//! ```

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use eventrunner::config::{load_config, WorkerConfig};
use eventrunner::demo::{register_middleware_demo, UserCreateEvent, DEMO_EVENT};
use eventrunner::execution::Worker;
use eventrunner::monitoring::{
    ChannelObserver, ExecutionTimeline, LogObserver, RunEvent, RunEventKind,
};
use eventrunner::{APP_NAME, VERSION};

/// Command-line options parsed from arguments.
#[derive(Debug, Default)]
struct Options {
    config_path: Option<String>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Event-Driven Workflow Worker");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: eventrunner [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config PATH       Load worker settings from a YAML file");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  eventrunner");
    println!("  eventrunner --config worker.yaml --verbose");
}

/// Parses command-line arguments into Options.
fn parse_arguments(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
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
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                options.config_path = Some(args[i].clone());
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => return Err(format!("Unexpected argument: {}", arg)),
        }
        i += 1;
    }

    Ok(options)
}

/// Waits for the first run to finish.
async fn wait_for_run(runs: &mut UnboundedReceiver<RunEvent>) -> Option<RunEvent> {
    while let Some(event) = runs.recv().await {
        if event.is_terminal() {
            return Some(event);
        }
    }
    None
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let options = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(options.verbose);
    print_banner();

    let config = match options.config_path {
        Some(ref path) => load_config(path)?,
        None => WorkerConfig::default().with_name("eventrunner"),
    };

    let timeline = Arc::new(ExecutionTimeline::new());
    let (tx, mut runs) = unbounded_channel();

    let mut worker = Worker::new(config)?;
    worker
        .add_observer(Arc::new(LogObserver))
        .add_observer(timeline.clone())
        .add_observer(Arc::new(ChannelObserver::new(tx)));
    register_middleware_demo(&mut worker)?;

    let events = worker.event_sender();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.start(shutdown.clone()));

    info!("Pushing '{}'", DEMO_EVENT);
    events.push(DEMO_EVENT, UserCreateEvent::sample()).await?;

    let finished = tokio::select! {
        finished = wait_for_run(&mut runs) => finished,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            None
        }
    };

    shutdown.cancel();
    handle.await??;

    println!();
    println!("{}", timeline.gantt_chart());

    match finished.map(|event| event.kind) {
        Some(RunEventKind::RunCompleted { output, elapsed }) => {
            info!("Run completed in {:?}", elapsed);
            if let Some(output) = output {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Ok(())
        }
        Some(RunEventKind::RunFailed { error, .. }) => {
            error!("Run failed: {}", error);
            Err(error.into())
        }
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
