//! End-to-end runs on the local backend.
//!
//! A fake distribution (a `domain.sh` that exits with a chosen code) and a
//! fake `jbyarn` binary (records its arguments) stand in for the real
//! artifacts, so the full launch command chain runs under `sh -c`.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jbyarn_core::constants::SERVER_VERSION;
use jbyarn_core::{FinalStatus, LocalBackendConfig, MasterConfig};
use jbyarn_master::local::{LocalNodeAgent, LocalResourceManager};
use jbyarn_master::{DemandController, EventChannel, LocalArtifactStore, RunReport};

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Lay out artifacts under `root` and return a config pointing at them.
fn fixture(root: &Path, domain_exit: i32, containers: u32) -> MasterConfig {
    let dist = root.join("dist");
    let bin = dist.join(SERVER_VERSION).join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_script(&bin.join("domain.sh"), &format!("exit {domain_exit}"));

    let app = root.join("jbyarn-bin");
    write_script(&app, r#"echo "$@" > configure.args"#);

    MasterConfig {
        app_id: "application_local_0001".to_string(),
        num_containers: containers,
        app_artifact: Some(app.display().to_string()),
        dist_artifact: dist.display().to_string(),
        local_dir: root.join("local"),
        user: "yarn".to_string(),
        join_timeout_secs: 2,
        local: LocalBackendConfig {
            hostname: "127.0.0.1".to_string(),
            ..LocalBackendConfig::default()
        },
        ..MasterConfig::default()
    }
}

async fn run(config: MasterConfig) -> RunReport {
    let channel = EventChannel::new();
    let rm = LocalResourceManager::new(config.local.clone(), &config.app_id, channel.sender());
    let agent = LocalNodeAgent::new(&config.local_dir, &config.user, &config.app_id, channel.sender());
    let controller = DemandController::new(
        config,
        Arc::new(rm),
        Arc::new(agent),
        Arc::new(LocalArtifactStore),
        channel,
    )
    .unwrap();

    tokio::time::timeout(Duration::from_secs(30), controller.run())
        .await
        .expect("run did not finish")
        .unwrap()
}

#[tokio::test]
async fn local_run_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), 0, 2);
    let appcache = config
        .local_dir
        .join("usercache/yarn/appcache/application_local_0001");

    let report = run(config).await;
    assert_eq!(report.status, FinalStatus::Succeeded);
    assert_eq!(report.state.completed, 2);

    let mut offsets = Vec::new();
    for entry in std::fs::read_dir(&appcache).unwrap() {
        let args = std::fs::read_to_string(entry.unwrap().path().join("configure.args")).unwrap();
        assert!(args.starts_with("configure --home "));
        assert!(args.contains("--domain-controller 127.0.0.1 --host 127.0.0.1"));
        let offset = args
            .split_whitespace()
            .skip_while(|arg| *arg != "--port-offset")
            .nth(1)
            .unwrap()
            .to_string();
        offsets.push(offset);
    }
    offsets.sort();
    assert_eq!(offsets, ["0", "150"]);
}

#[tokio::test]
async fn local_run_reports_server_failure() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(fixture(dir.path(), 1, 1)).await;

    assert_eq!(report.status, FinalStatus::Failed);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.state.failed, 1);
}

#[tokio::test]
async fn local_run_with_missing_distribution_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture(dir.path(), 0, 1);
    config.dist_artifact = dir.path().join("nowhere").display().to_string();

    let report = run(config).await;
    assert_eq!(report.status, FinalStatus::Failed);
    assert_eq!(report.state.completed, 1);
    assert_eq!(report.state.failed, 1);
}

#[tokio::test]
async fn local_run_with_unreadable_archive_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture(dir.path(), 0, 1);
    let archive = dir.path().join("jboss.tar.gz");
    std::fs::write(&archive, "not an archive").unwrap();
    config.dist_artifact = archive.display().to_string();

    let report = run(config).await;
    assert_eq!(report.status, FinalStatus::Failed);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.state.completed, 1);
    assert_eq!(report.state.failed, 1);
    assert_eq!(report.state.allocated, 1);
}
