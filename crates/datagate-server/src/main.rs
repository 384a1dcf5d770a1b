//! Datagate operator binary
//!
//! Starts or advances pipeline runs (the scheduler tick), delivers
//! approval decisions arriving from the callback front door, and can sit
//! in a watch loop that polls every non-terminal run.

use anyhow::{anyhow, bail};
use clap::{Arg, Command};
use datagate_core::{
    Decision, FsObjectStore, HttpScanClient, PipelineConfig, RunId, RunState, WebhookNotifier,
    WorkflowEngine,
};
use std::sync::Arc;
use std::time::Duration;

type Engine = WorkflowEngine<FsObjectStore, HttpScanClient, WebhookNotifier>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("datagate-server")
        .version("1.0.0")
        .about("Sensitive-data scan pipeline orchestrator")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/app/config/datagate.json"),
        )
        .arg(
            Arg::new("run-dir")
                .long("run-dir")
                .value_name("DIR")
                .help("Directory for persisted run records")
                .default_value("/data/runs"),
        )
        .arg(
            Arg::new("objects-dir")
                .long("objects-dir")
                .value_name("DIR")
                .help("Root directory of the filesystem object store")
                .default_value("/data/objects"),
        )
        .arg(
            Arg::new("run-id")
                .long("run-id")
                .value_name("ID")
                .help("Start or advance the run with this id"),
        )
        .arg(
            Arg::new("new-run")
                .long("new-run")
                .help("Start a run with a freshly minted id")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("resume")
                .long("resume")
                .value_name("TOKEN")
                .help("Deliver an approval decision for the given token"),
        )
        .arg(
            Arg::new("decision")
                .long("decision")
                .value_name("allow|deny")
                .help("Decision to deliver with --resume"),
        )
        .arg(
            Arg::new("watch")
                .long("watch")
                .help("Poll all non-terminal runs until interrupted")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("watch-interval")
                .long("watch-interval")
                .value_name("SECONDS")
                .help("Seconds between watch loop sweeps")
                .default_value("5"),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").unwrap();
    let config = PipelineConfig::from_file(config_path)?;
    log::info!("Loaded configuration from {}", config_path);

    // Wire the collaborators into the engine
    let objects_dir = matches.get_one::<String>("objects-dir").unwrap();
    let objects = Arc::new(FsObjectStore::new(objects_dir)?);
    log::info!("Using object store root: {}", objects_dir);

    let scanner = Arc::new(HttpScanClient::new(config.scan_service.clone()));
    let notifier = Arc::new(WebhookNotifier::new(&config.approval));

    let run_dir = matches.get_one::<String>("run-dir").unwrap();
    let engine = Arc::new(Engine::new(
        config,
        run_dir,
        objects,
        scanner,
        notifier,
    )?);
    log::info!("Using run directory: {}", run_dir);

    if let Some(token) = matches.get_one::<String>("resume") {
        let decision = match matches.get_one::<String>("decision").map(String::as_str) {
            Some("allow") => Decision::Allow,
            Some("deny") => Decision::Deny,
            other => bail!("--resume requires --decision allow|deny (got {:?})", other),
        };

        let confirmation = engine.resume(token, decision).await?;
        println!("{}", serde_json::to_string(&confirmation)?);
        return Ok(());
    }

    if let Some(id) = matches.get_one::<String>("run-id") {
        let run_id = RunId::from_string(id).map_err(|e| anyhow!("Invalid run id: {}", e))?;
        let state = engine.tick(&run_id).await?;
        log::info!("Run {} is now {}", run_id, state);
        return Ok(());
    }

    if matches.get_flag("new-run") {
        let run_id = RunId::new();
        let state = engine.tick(&run_id).await?;
        log::info!("Started run {} (now {})", run_id, state);
        println!("{}", run_id);
        return Ok(());
    }

    if matches.get_flag("watch") {
        let interval: u64 = matches
            .get_one::<String>("watch-interval")
            .unwrap()
            .parse()
            .map_err(|e| anyhow!("Invalid watch interval: {}", e))?;
        watch_loop(engine, Duration::from_secs(interval)).await;
        return Ok(());
    }

    bail!("Nothing to do: pass --run-id, --new-run, --resume or --watch")
}

/// Sweep every non-terminal run on a fixed cadence. Gating runs are left
/// suspended; scanning runs get one poll per sweep.
async fn watch_loop(engine: Arc<Engine>, interval: Duration) {
    log::info!("Watching active runs (sweep every {:?})", interval);

    loop {
        match engine.runs().list_active() {
            Ok(records) => {
                for record in records {
                    if record.state == RunState::Gating {
                        continue;
                    }

                    match engine.tick(&record.run_id).await {
                        Ok(state) => {
                            log::debug!("Run {} advanced to {}", record.run_id, state)
                        }
                        Err(e) => {
                            log::error!("Failed to advance run {}: {}", record.run_id, e)
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to list active runs: {}", e);
            }
        }

        tokio::time::sleep(interval).await;
    }
}
