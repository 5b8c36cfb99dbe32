// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the provisioning state machine.

#[cfg(test)]
mod tests {
    use crate::allocator::PoolLock;
    use crate::config::{JailSettings, ReplicatorConfig, SnapshotSettings, VerificationSettings};
    use crate::errors::ReplicationError;
    use crate::executor::fake::FakeExecutor;
    use crate::executor::Output;
    use crate::replicator::{ProvisionState, Replicator};
    use crate::report::Reporter;
    use crate::request::ReplicationRequest;
    use crate::verifier::VerificationOutcome;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    // =====================================================
    // Helper Functions
    // =====================================================

    fn config(dir: &TempDir) -> ReplicatorConfig {
        ReplicatorConfig {
            jails: JailSettings {
                jails_root: dir.path().join("jails"),
                lock_file: None,
                ..JailSettings::default()
            },
            snapshot: SnapshotSettings {
                snapshot_dir: dir.path().join("snapshots"),
                ..SnapshotSettings::default()
            },
            verification: VerificationSettings {
                settle_secs: 0,
                ..VerificationSettings::default()
            },
            ..ReplicatorConfig::default()
        }
    }

    fn stage_local_snapshot(dir: &TempDir, name: &str) {
        let snapshots = dir.path().join("snapshots");
        std::fs::create_dir_all(&snapshots).unwrap();
        std::fs::write(snapshots.join(format!("{name}.zfs")), b"stream").unwrap();
        std::fs::write(
            snapshots.join(format!("{name}.meta")),
            "mysql-bin.000007\n4821\n10.1.1.5\nprimary\n",
        )
        .unwrap();
    }

    fn replicator(
        fake: &Arc<FakeExecutor>,
        dir: &TempDir,
        from: &str,
        force: bool,
        dry_run: bool,
    ) -> (Replicator, Reporter) {
        let request =
            ReplicationRequest::new(from, "localhost:replica1", force, dry_run, true, None)
                .unwrap();
        let reporter = Reporter::new();
        let replicator = Replicator::new(
            request,
            config(dir),
            fake.clone().as_executor(),
            reporter.clone(),
        );
        (replicator, reporter)
    }

    // =====================================================
    // Transitions
    // =====================================================

    #[tokio::test]
    async fn test_existing_target_without_force_aborts_first() {
        let dir = TempDir::new().unwrap();
        let fake = FakeExecutor::new();
        fake.set_handler(Box::new(|_| Output::with_stdout("primary\nreplica1\n")));
        let (mut replicator, reporter) =
            replicator(&fake, &dir, "10.1.1.5:primary", false, false);

        let err = replicator.run().await.unwrap_err();

        match err {
            ReplicationError::TargetExists { container } => assert_eq!(container, "replica1"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            replicator.history(),
            &[ProvisionState::Requested, ProvisionState::Failed]
        );
        assert_eq!(fake.calls().len(), 1);
        assert!(!dir.path().join("jails").exists());
        assert_eq!(reporter.steps(), vec!["Checking whether jail 'replica1' exists"]);
    }

    #[tokio::test]
    async fn test_pool_lock_is_taken_after_snapshot_is_received() {
        let dir = TempDir::new().unwrap();
        stage_local_snapshot(&dir, "primary_1");
        let mut config = config(&dir);
        config.jails.lock_timeout_secs = 0;
        let held = PoolLock::acquire(&config.jails.lock_path(), Duration::from_secs(5))
            .await
            .unwrap();
        let fake = FakeExecutor::new();
        let request = ReplicationRequest::new(
            "localhost:primary_1",
            "localhost:replica1",
            false,
            false,
            true,
            None,
        )
        .unwrap();
        let mut replicator =
            Replicator::new(request, config, fake.clone().as_executor(), Reporter::new());

        let err = replicator.run().await.unwrap_err();

        assert!(matches!(err, ReplicationError::LockFailed { .. }));
        assert_eq!(
            replicator.history(),
            &[
                ProvisionState::Requested,
                ProvisionState::JailChecked,
                ProvisionState::SnapshotReady,
                ProvisionState::Failed,
            ]
        );
        assert_eq!(fake.count_containing("zfs receive -F"), 1);
        assert_eq!(fake.count_containing("iocage start"), 0);
        drop(held);
    }

    #[tokio::test]
    async fn test_missing_root_after_import_fails() {
        let dir = TempDir::new().unwrap();
        stage_local_snapshot(&dir, "primary_1");
        let fake = FakeExecutor::new();
        let (mut replicator, _) =
            replicator(&fake, &dir, "localhost:primary_1", false, false);

        let err = replicator.run().await.unwrap_err();

        assert!(matches!(err, ReplicationError::RootMissing { .. }));
        assert_eq!(
            replicator.history(),
            &[
                ProvisionState::Requested,
                ProvisionState::JailChecked,
                ProvisionState::SnapshotReady,
                ProvisionState::Failed,
            ]
        );
        assert_eq!(replicator.state(), ProvisionState::Failed);
    }

    #[tokio::test]
    async fn test_missing_local_snapshot_fails_before_receive() {
        let dir = TempDir::new().unwrap();
        let fake = FakeExecutor::new();
        let (mut replicator, _) =
            replicator(&fake, &dir, "localhost:primary_1", false, false);

        let err = replicator.run().await.unwrap_err();

        assert!(matches!(err, ReplicationError::SnapshotNotFound { .. }));
        assert_eq!(fake.count_containing("zfs receive"), 0);
    }

    #[tokio::test]
    async fn test_dry_run_walks_every_state_with_only_the_existence_query() {
        let dir = TempDir::new().unwrap();
        let fake = FakeExecutor::new();
        let (mut replicator, reporter) =
            replicator(&fake, &dir, "10.1.1.5:primary", true, true);

        let report = replicator.run().await.unwrap();

        assert_eq!(
            replicator.history(),
            &[
                ProvisionState::Requested,
                ProvisionState::JailChecked,
                ProvisionState::SnapshotReady,
                ProvisionState::ContainerConfigured,
                ProvisionState::ContainerRunning,
                ProvisionState::CertificatesTransferred,
                ProvisionState::DatabaseConfigured,
                ProvisionState::Verified,
            ]
        );
        assert_eq!(fake.rendered_calls(), vec!["iocage list -H -q"]);
        assert_eq!(report.server_id, None);
        assert_eq!(report.metadata.source_container, "primary");
        assert_eq!(
            report.verification,
            VerificationOutcome::Skipped("dry-run".to_string())
        );
        assert!(reporter.steps().len() > 10);
        assert!(!dir.path().join("jails").exists());
        assert!(!dir.path().join("snapshots").exists());
    }
}
