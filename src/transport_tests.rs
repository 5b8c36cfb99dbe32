// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for host addressing and the dry-run shell.

#[cfg(test)]
mod tests {
    use crate::executor::fake::FakeExecutor;
    use crate::executor::{CommandLine, Output};
    use crate::transport::{Host, Shell};
    use std::path::{Path, PathBuf};

    fn shell(fake: &std::sync::Arc<FakeExecutor>, dry_run: bool) -> Shell {
        Shell::new(
            fake.clone().as_executor(),
            Some(PathBuf::from("/root/.ssh/id_jailrep")),
            dry_run,
        )
    }

    #[test]
    fn test_host_parse() {
        assert_eq!(Host::parse("localhost"), Host::Local);
        assert_eq!(Host::parse("127.0.0.1"), Host::Local);
        assert_eq!(
            Host::parse("10.1.1.5"),
            Host::Remote("10.1.1.5".to_string())
        );
        assert_eq!(Host::parse("db1.example.com").address(), "db1.example.com");
        assert_eq!(Host::Local.address(), "localhost");
    }

    #[tokio::test]
    async fn test_remote_command_is_wrapped_in_ssh() {
        let fake = FakeExecutor::new();
        let shell = shell(&fake, false);

        shell
            .run(
                &Host::Remote("10.1.1.5".to_string()),
                CommandLine::new("iocage")
                    .args(["exec", "primary", "mysql", "-N", "-B", "-e", "SHOW MASTER STATUS"]),
            )
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "ssh");
        assert_eq!(
            calls[0].args,
            vec![
                "-i",
                "/root/.ssh/id_jailrep",
                "-o",
                "BatchMode=yes",
                "10.1.1.5",
                "--",
                "iocage exec primary mysql -N -B -e 'SHOW MASTER STATUS'",
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_redirect_moves_into_remote_shell() {
        let fake = FakeExecutor::new();
        let shell = shell(&fake, false);

        shell
            .run(
                &Host::Remote("10.1.1.5".to_string()),
                CommandLine::new("zfs")
                    .args(["send", "-R", "zroot/iocage/jails/primary@1"])
                    .stdout_to("/var/tmp/jailrep/primary_1.zfs"),
            )
            .await
            .unwrap();

        let call = &fake.calls()[0];
        assert!(call.stdout.is_none());
        assert!(call
            .args
            .last()
            .unwrap()
            .ends_with("> /var/tmp/jailrep/primary_1.zfs"));
    }

    #[tokio::test]
    async fn test_local_command_runs_unwrapped() {
        let fake = FakeExecutor::new();
        let shell = shell(&fake, false);

        shell
            .run(&Host::Local, CommandLine::new("iocage").args(["start", "replica1"]))
            .await
            .unwrap();

        assert_eq!(fake.rendered_calls(), vec!["iocage start replica1"]);
    }

    #[tokio::test]
    async fn test_copy_from_remote_uses_scp() {
        let fake = FakeExecutor::new();
        let shell = shell(&fake, false);

        shell
            .copy_from(
                &Host::Remote("10.1.1.5".to_string()),
                Path::new("/var/tmp/jailrep/primary_1.meta"),
                Path::new("/var/tmp/jailrep/primary_1.meta"),
            )
            .await
            .unwrap();

        let call = &fake.calls()[0];
        assert_eq!(call.program, "scp");
        assert!(call.has_arg("10.1.1.5:/var/tmp/jailrep/primary_1.meta"));
    }

    #[tokio::test]
    async fn test_file_exists_maps_failure_to_false() {
        let fake = FakeExecutor::new();
        fake.set_handler(Box::new(|command| {
            if command.has_arg("/missing") {
                Output::failure()
            } else {
                Output::success()
            }
        }));
        let shell = shell(&fake, false);

        assert!(shell
            .file_exists(&Host::Local, Path::new("/present"))
            .await
            .unwrap());
        assert!(!shell
            .file_exists(&Host::Local, Path::new("/missing"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_never_reaches_executor() {
        let fake = FakeExecutor::new();
        let shell = shell(&fake, true);

        let output = shell
            .run(&Host::Local, CommandLine::new("iocage").args(["destroy", "-f", "replica1"]))
            .await
            .unwrap();

        assert!(output.is_success());
        assert!(output.stdout.is_empty());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_query_runs_during_dry_run() {
        let fake = FakeExecutor::new();
        fake.set_handler(Box::new(|_| Output::with_stdout("primary\n")));
        let shell = shell(&fake, true);

        let output = shell
            .query(&Host::Local, CommandLine::new("iocage").args(["list", "-H", "-q"]))
            .await
            .unwrap();

        assert_eq!(output.stdout, "primary\n");
        assert_eq!(fake.rendered_calls(), vec!["iocage list -H -q"]);
    }
}
