use runhost_exec::{
    CancelHandle, CommandRunner, ExecError, LocalExecutor, OutputSink, PlatformPrefix,
    RemoteExecutor,
};

fn shell() -> LocalExecutor {
    if cfg!(windows) {
        LocalExecutor::new()
    } else {
        LocalExecutor::with_prefix(PlatformPrefix::posix_shell())
    }
}

#[tokio::test]
async fn test_mkdir_rmdir_report_both_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let executor = shell();

    assert_eq!(executor.run_in("mkdir testdir", dir.path()).await.unwrap(), 0);
    assert!(dir.path().join("testdir").is_dir());
    assert_ne!(executor.run_in("mkdir testdir", dir.path()).await.unwrap(), 0);

    assert_eq!(executor.run_in("rmdir testdir", dir.path()).await.unwrap(), 0);
    assert!(!dir.path().join("testdir").exists());
    assert_ne!(executor.run_in("rmdir testdir", dir.path()).await.unwrap(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_all_output_drained_before_return() {
    let (sink, captured) = OutputSink::memory();
    let status = shell()
        .execute(
            "seq 1 20000; seq 1 20000 >&2",
            None,
            Some(sink),
            false,
        )
        .await
        .unwrap();

    assert_eq!(status, 0);
    assert_eq!(captured.lines().len(), 40000);
}

#[cfg(unix)]
#[tokio::test]
async fn test_large_discarded_output_does_not_block() {
    // Far more than a pipe buffer on both streams
    let status = shell()
        .run("head -c 1000000 /dev/zero; head -c 1000000 /dev/zero >&2")
        .await
        .unwrap();
    assert_eq!(status, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_redirect_creates_file_in_folder() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _captured) = OutputSink::memory();

    let status = shell()
        .execute("ls -a > listing.txt", Some(dir.path()), Some(sink), true)
        .await
        .unwrap();

    assert_eq!(status, 0);
    assert!(dir.path().join("listing.txt").exists());
}

fn ssh_settings() -> Option<(String, u16, String, String)> {
    let host = std::env::var("RUNHOST_TEST_HOST").ok()?;
    let port = std::env::var("RUNHOST_TEST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(22);
    let user = std::env::var("RUNHOST_TEST_USER").ok()?;
    let password = std::env::var("RUNHOST_TEST_PASSWORD").ok()?;
    Some((host, port, user, password))
}

#[tokio::test]
#[ignore = "requires SSH server (RUNHOST_TEST_HOST, RUNHOST_TEST_USER, RUNHOST_TEST_PASSWORD)"]
async fn test_remote_mkdir_rmdir() {
    let Some((host, port, user, password)) = ssh_settings() else {
        return;
    };
    let mut executor = RemoteExecutor::new();
    assert!(!executor.is_connected());

    executor.connect(&host, port, &user, &password).await.unwrap();
    assert!(executor.is_connected());

    let folder = "RemoteExecutorTestFolder";
    let _ = executor.execute(&format!("rmdir {folder}"), None, false, None).await;

    assert_eq!(executor.execute(&format!("mkdir {folder}"), None, false, None).await.unwrap(), 0);
    assert_ne!(executor.execute(&format!("mkdir {folder}"), None, false, None).await.unwrap(), 0);
    assert_eq!(executor.execute(&format!("rmdir {folder}"), None, false, None).await.unwrap(), 0);
    assert_ne!(executor.execute(&format!("rmdir {folder}"), None, false, None).await.unwrap(), 0);

    let (sink, captured) = OutputSink::memory();
    let status = executor.run("echo one; echo two", Some(sink), true).await.unwrap();
    assert_eq!(status, 0);
    assert_eq!(captured.lines(), vec!["one", "two"]);
    assert!(captured.is_closed());

    executor.disconnect().await.unwrap();
    assert!(!executor.is_connected());
}

#[tokio::test]
#[ignore = "requires SSH server (RUNHOST_TEST_HOST, RUNHOST_TEST_USER, RUNHOST_TEST_PASSWORD)"]
async fn test_remote_reconnect_and_cancel() {
    let Some((host, port, user, password)) = ssh_settings() else {
        return;
    };
    let mut executor = RemoteExecutor::new();
    executor.connect(&host, port, &user, &password).await.unwrap();

    // Connecting again replaces the previous session
    executor.connect(&host, port, &user, &password).await.unwrap();
    assert!(executor.is_connected());

    let cancel = CancelHandle::new();
    cancel.cancel();
    let status = executor
        .execute("sleep 30", None, false, Some(&cancel))
        .await
        .unwrap();
    assert_eq!(status, runhost_exec::UNKNOWN_STATUS);

    let wrong = executor.connect(&host, port, &user, "definitely-wrong").await;
    assert!(matches!(
        wrong,
        Err(ExecError::AuthenticationFailed(_) | ExecError::PasswordReprompted)
    ));
    assert!(!executor.is_connected());
}
