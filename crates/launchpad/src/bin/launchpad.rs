//! Launchpad CLI
//!
//! Usage:
//!   launchpad
//!   launchpad profiles.json -p Streaming
//!   launchpad profiles.json --dry-run

use std::sync::Arc;
use std::time::Duration;

use launchpad::{
    EventBus, LaunchArgs, LaunchEvent, LaunchPlan, LaunchSequence, OsSpawner, ProcessRegistry,
    Profile, ProfileStore, SequenceStateChange, Severity,
};
use tokio::sync::{broadcast, watch};

/// How often to check whether every launched program has exited
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    let env = env_logger::Env::default().default_filter_or(args.log_level.as_str());
    env_logger::init_from_env(env);

    let Some(store_path) = args.store_path() else {
        log::error!("No profile store given and no config directory available");
        std::process::exit(1);
    };

    log::info!("Loading profile store: {}", store_path.display());
    let store = match ProfileStore::load_or_default(&store_path) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to load profile store: {}", e);
            std::process::exit(1);
        }
    };

    if args.list {
        for name in store.display_names() {
            println!("{}", name);
        }
        return;
    }

    let profile = match &args.profile {
        Some(name) => store.profile(name),
        None => store.current(),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    if args.validate {
        let plan = LaunchPlan::from_profile(&profile);
        println!("Profile store '{}' is valid", store_path.display());
        println!("  Version: {}", store.version);
        println!("  Profiles: {}", store.profiles.len());
        println!(
            "  Profile '{}': {} launchable, {} skipped",
            profile.name,
            plan.steps.len(),
            plan.skipped.len()
        );
        return;
    }

    if args.dry_run {
        println!("{}", LaunchPlan::from_profile(&profile));
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    {
        let shutdown_tx = shutdown_tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            let _ = shutdown_tx.send(());
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
            std::process::exit(1);
        }
    }

    let events = EventBus::new();
    let registry = ProcessRegistry::new(events.clone());
    let _monitor = registry.monitor();
    tokio::spawn(log_events(events.subscribe()));

    let code = run(&profile, &registry, shutdown_rx).await;

    if args.detach {
        log::info!("Detaching, {} programs left running", registry.len());
    } else {
        let summary = registry.close_all().await;
        if !summary.failed.is_empty() {
            log::warn!("Failed to close: {}", summary.failed.join(", "));
        }
    }

    log::info!("Launchpad exiting");
    if code != 0 {
        std::process::exit(code);
    }
}

/// Run the sequence until it finishes and every program exits, or until shutdown
async fn run(profile: &Profile, registry: &ProcessRegistry, mut shutdown_rx: watch::Receiver<()>) -> i32 {
    let sequence = LaunchSequence::new(registry.clone(), Arc::new(OsSpawner));
    let mut task = match sequence.start_profile(profile) {
        Ok(task) => task,
        Err(e) => {
            log::error!("{}", e);
            return 1;
        }
    };

    let mut finished = false;
    let mut check = tokio::time::interval(IDLE_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if !finished {
                    task.abort();
                }
                return 0;
            }
            result = &mut task, if !finished => {
                finished = true;
                if let Err(e) = result {
                    log::error!("Launch sequence failed: {}", e);
                    return 1;
                }
            }
            _ = check.tick(), if finished => {
                registry.reap_exited();
                if registry.is_empty() {
                    log::info!("All programs have exited");
                    return 0;
                }
            }
        }
    }
}

/// Render every bus event as a log line
async fn log_events(mut rx: broadcast::Receiver<LaunchEvent>) {
    loop {
        match rx.recv().await {
            Ok(LaunchEvent::StatusMessage(msg)) => match msg.severity {
                Severity::Error => log::error!("{}", msg.text),
                Severity::Warning => log::warn!("{}", msg.text),
                _ => log::info!("{}", msg.text),
            },
            Ok(LaunchEvent::SequenceStateChanged(SequenceStateChange::Started)) => {
                log::debug!("Sequence started");
            }
            Ok(LaunchEvent::SequenceStateChanged(SequenceStateChange::Finished {
                launched_count,
                total_count,
            })) => {
                log::debug!("Sequence finished: {}/{}", launched_count, total_count);
            }
            Ok(LaunchEvent::ProcessListChanged) => log::debug!("Process list changed"),
            Ok(LaunchEvent::EntryStatusChanged { name, status, .. }) => {
                log::debug!("[{}] {:?}", name, status);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::debug!("Event log skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
