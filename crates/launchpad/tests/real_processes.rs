//! Launch and close real child processes
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use launchpad::{
    CloseOutcome, Entry, EventBus, LaunchSequence, OsSpawner, ProcessRegistry, Spawner,
};
use tempfile::TempDir;

// Writing an executable while another test forks can fail the exec with ETXTBSY
static SERIAL: Mutex<()> = Mutex::new(());

fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn track(registry: &ProcessRegistry, path: &Path, name: &str) -> u32 {
    let handle = OsSpawner.spawn(path, path.parent()).unwrap();
    let pid = handle.id().unwrap();
    registry.track(path.to_path_buf(), name, handle);
    pid
}

#[tokio::test]
async fn test_close_graceful() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = TempDir::new().unwrap();
    let sleeper = script(&dir, "sleeper.sh", "exec sleep 30");

    let registry = ProcessRegistry::new(EventBus::new());
    track(&registry, &sleeper, "Sleeper");
    assert!(registry.is_running(&sleeper));

    assert_eq!(registry.close(&sleeper).await, CloseOutcome::Closed);
    assert!(registry.is_empty());
    assert_eq!(registry.close(&sleeper).await, CloseOutcome::NotRunning);
}

#[tokio::test]
async fn test_close_escalates_to_kill() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = TempDir::new().unwrap();
    let stubborn = script(&dir, "stubborn.sh", "trap '' TERM\nwhile :; do sleep 0.1; done");

    let registry = ProcessRegistry::new(EventBus::new());
    track(&registry, &stubborn, "Stubborn");
    // Let the shell install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(registry.close(&stubborn).await, CloseOutcome::Closed);
    assert!(!registry.is_running(&stubborn));
}

#[tokio::test]
async fn test_exit_code_reaped() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = TempDir::new().unwrap();
    let quitter = script(&dir, "quitter.sh", "exit 3");

    let registry = ProcessRegistry::new(EventBus::new());
    track(&registry, &quitter, "Quitter");

    let mut reaped = Vec::new();
    for _ in 0..50 {
        reaped = registry.reap_exited();
        if !reaped.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(reaped, vec![(quitter, Some(3))]);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_sequence_launches_and_closes_all() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = TempDir::new().unwrap();
    let entries = vec![
        Entry::new("First", script(&dir, "first.sh", "exec sleep 30")),
        Entry::new("Missing", dir.path().join("missing.sh")),
        Entry::new("Second", script(&dir, "second.sh", "exec sleep 30")).with_custom_delay(0),
    ];

    let registry = ProcessRegistry::new(EventBus::new());
    let sequence = LaunchSequence::new(registry.clone(), Arc::new(OsSpawner));
    let summary = sequence.start(&entries, 0).unwrap().await.unwrap();

    assert_eq!(summary.launched_count, 2);
    assert_eq!(summary.total_count, 2);
    assert!(summary.entries.iter().all(|e| e.pid.is_some()));
    assert_eq!(registry.running().len(), 2);

    let closed = registry.close_all().await;
    assert_eq!(closed.closed_count, 2);
    assert!(closed.failed.is_empty());
    assert!(registry.is_empty());
}
