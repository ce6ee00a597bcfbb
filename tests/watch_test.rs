//! Sync session tests
//!
//! Feeds file events through the filter and dispatcher, and runs one loop
//! against a real recursive watcher.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::time::timeout;

use jcrsync::repository::MemoryRepository;
use jcrsync::watch::{FileEvent, FileEventKind, SyncSession};
use jcrsync::{Config, DispatchOutcome, SyncError};

fn config_for(base: &Path) -> Config {
	Config { base: base.to_path_buf(), ..Config::default() }
}

#[tokio::test]
async fn test_session_dispatches_accepted_events() {
	let local = TempDir::new().unwrap();
	fs::create_dir_all(local.path().join("apps/site")).unwrap();
	fs::write(local.path().join("apps/site/page.html"), "<p/>").unwrap();
	let repo = Arc::new(MemoryRepository::new());
	let session = SyncSession::new(&config_for(local.path()), repo.clone()).unwrap();

	let handle = session
		.handle(FileEvent::new(FileEventKind::Create, "apps/site/page.html"))
		.await
		.expect("event was rejected");
	let outcome = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();

	assert_eq!(outcome, DispatchOutcome::Uploaded);
	assert!(repo.contains("/apps/site/page.html"));
}

#[tokio::test]
async fn test_session_rejects_excluded_missing_and_directories() {
	let local = TempDir::new().unwrap();
	fs::create_dir_all(local.path().join("apps/.git")).unwrap();
	fs::write(local.path().join("apps/.git/HEAD"), "ref").unwrap();
	fs::write(local.path().join("apps/build.tmp"), "tmp").unwrap();
	let repo = Arc::new(MemoryRepository::new());
	let mut config = config_for(local.path());
	config.exclude_patterns = vec!["**/*.tmp".to_string()];
	let session = SyncSession::new(&config, repo.clone()).unwrap();

	for (kind, relative) in &[
		(FileEventKind::Modify, "apps/.git/HEAD"),
		(FileEventKind::Modify, "apps/build.tmp"),
		(FileEventKind::Create, "apps"),
		(FileEventKind::Rename, "apps/old-name.html"),
	] {
		assert!(session.handle(FileEvent::new(*kind, *relative)).await.is_none(), "{}", relative);
	}

	assert!(session.filter().was_missing(Path::new("apps/old-name.html")));
	assert!(repo.operations().is_empty());
}

#[tokio::test]
async fn test_missing_base_is_an_error() {
	let local = TempDir::new().unwrap();
	let result = SyncSession::new(&config_for(&local.path().join("nope")), Arc::new(MemoryRepository::new()));
	assert!(matches!(result, Err(SyncError::LocalIoFailed { .. })));
}

#[tokio::test]
async fn test_invalid_exclude_pattern_is_rejected() {
	let local = TempDir::new().unwrap();
	let mut config = config_for(local.path());
	config.exclude_patterns = vec!["[".to_string()];
	let result = SyncSession::new(&config, Arc::new(MemoryRepository::new()));
	assert!(matches!(result, Err(SyncError::InvalidConfig { .. })));
}

#[tokio::test]
async fn test_watch_loop_uploads_written_files() {
	let local = TempDir::new().unwrap();
	fs::create_dir_all(local.path().join("apps")).unwrap();
	let repo = Arc::new(MemoryRepository::new());
	let session = Arc::new(SyncSession::new(&config_for(local.path()), repo.clone()).unwrap());
	let watcher = session.watch().unwrap();

	let (stop_tx, stop_rx) = oneshot::channel::<()>();
	let running = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.run_until(watcher, stop_rx).await }
	});

	fs::write(local.path().join("apps/hello.txt"), "hello").unwrap();

	timeout(Duration::from_secs(10), async {
		loop {
			let uploaded = repo.node("/apps/hello.txt").and_then(|node| node.content);
			if uploaded.as_deref() == Some(b"hello".as_ref()) {
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await
	.expect("file was never uploaded");

	stop_tx.send(()).unwrap();
	timeout(Duration::from_secs(5), running).await.unwrap().unwrap().unwrap();
}

// vim: ts=4
