//! Dispatcher integration tests
//!
//! Runs whole pipelines against the in-memory repository, using gates to
//! hold one pipeline mid-flight while others proceed.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

use jcrsync::repository::{MemoryRepository, OpKind};
use jcrsync::{DispatchOutcome, Dispatcher, PathLockCoordinator, RepositoryPath, SyncError};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_file(dir: &Path, name: &str, content: &str) {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(&path, content).unwrap();
}

fn setup(repo: &Arc<MemoryRepository>, root: &Path) -> Arc<Dispatcher> {
	Arc::new(Dispatcher::new(repo.clone(), Arc::new(PathLockCoordinator::new()), root))
}

fn spawn_dispatch(
	dispatcher: &Arc<Dispatcher>,
	relative: &'static str,
) -> tokio::task::JoinHandle<Result<DispatchOutcome, SyncError>> {
	let dispatcher = Arc::clone(dispatcher);
	tokio::spawn(async move { dispatcher.dispatch(Path::new(relative)).await })
}

/// Collects formatted log output
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
	fn contents(&self) -> String {
		String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
	}
}

impl io::Write for LogBuffer {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
	timeout(Duration::from_secs(5), async {
		while !condition() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("condition never held");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_plain_file_creates_missing_folders() {
	let local = TempDir::new().unwrap();
	create_file(local.path(), "etc/designs/site/logo.png", "png");
	let repo = Arc::new(MemoryRepository::new());

	let outcome = setup(&repo, local.path()).dispatch(Path::new("etc/designs/site/logo.png")).await.unwrap();

	assert_eq!(outcome, DispatchOutcome::Uploaded);
	for folder in &["/etc", "/etc/designs", "/etc/designs/site"] {
		assert_eq!(repo.node(folder).unwrap().primary_type, "nt:folder");
	}
	let logo = repo.node("/etc/designs/site/logo.png").unwrap();
	assert_eq!(logo.mime_type.as_deref(), Some("application/octet-stream"));
}

#[tokio::test]
async fn test_folder_properties_update_the_folder_itself() {
	let local = TempDir::new().unwrap();
	create_file(
		local.path(),
		"apps/site/.content.xml",
		r#"<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="sling:Folder" jcr:title="Site"/>"#,
	);
	let repo = Arc::new(MemoryRepository::new());

	setup(&repo, local.path()).dispatch(Path::new("apps/site/.content.xml")).await.unwrap();

	let site = repo.node("/apps/site").unwrap();
	assert_eq!(site.primary_type, "sling:Folder");
	assert!(site.properties.contains_key("jcr:title"));
}

#[tokio::test]
async fn test_folder_properties_edit_keeps_uploaded_files() {
	let local = TempDir::new().unwrap();
	create_file(local.path(), "apps/site/page.html", "<html/>");
	create_file(
		local.path(),
		"apps/site/.content.xml",
		r#"<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="sling:Folder" jcr:title="Site"/>"#,
	);
	let repo = Arc::new(MemoryRepository::new());
	let dispatcher = setup(&repo, local.path());

	dispatcher.dispatch(Path::new("apps/site/page.html")).await.unwrap();
	assert!(repo.contains("/apps/site/page.html"));
	repo.clear_operations();

	let outcome = dispatcher.dispatch(Path::new("apps/site/.content.xml")).await.unwrap();

	assert_eq!(outcome, DispatchOutcome::Uploaded);
	assert!(repo.contains("/apps/site/page.html"));
	assert!(repo.mutations().iter().all(|op| op.kind() == OpKind::SetProperties));
	let site = repo.node("/apps/site").unwrap();
	// Created by the first upload from the same local descriptor
	assert_eq!(site.primary_type, "sling:Folder");
	assert!(site.properties.contains_key("jcr:title"));
}

#[tokio::test]
async fn test_late_waiter_does_not_race_pending_folder_create() {
	let local = TempDir::new().unwrap();
	create_file(local.path(), "apps/x/a.txt", "a");
	create_file(local.path(), "apps/y/b.txt", "b");
	let repo = Arc::new(MemoryRepository::new());
	let gate = repo.gate(OpKind::Create, "/apps");
	let dispatcher = setup(&repo, local.path());

	let first = spawn_dispatch(&dispatcher, "apps/x/a.txt");
	wait_until(|| repo.operations().iter().any(|op| op.kind() == OpKind::Create && op.path() == "/apps")).await;

	// /apps was announced but its create has not returned yet
	let second = spawn_dispatch(&dispatcher, "apps/y/b.txt");
	let coordinator = Arc::clone(dispatcher.coordinator());
	wait_until(|| coordinator.waiting_on(&RepositoryPath::parse("/apps/x/a.txt").unwrap()) == 1).await;

	gate.notify_one();
	let first = timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
	let second = timeout(Duration::from_secs(5), second).await.unwrap().unwrap();

	assert_eq!(first.unwrap(), DispatchOutcome::Uploaded);
	assert_eq!(second.unwrap(), DispatchOutcome::Uploaded);
	let apps_creates =
		repo.mutations().iter().filter(|op| op.kind() == OpKind::Create && op.path() == "/apps").count();
	assert_eq!(apps_creates, 1);
	assert!(repo.contains("/apps/x/a.txt"));
	assert!(repo.contains("/apps/y/b.txt"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unclassifiable_path_is_logged() {
	use std::ffi::OsStr;
	use std::os::unix::ffi::OsStrExt;

	let buffer = LogBuffer::default();
	let subscriber = tracing_subscriber::fmt()
		.with_writer({
			let buffer = buffer.clone();
			move || buffer.clone()
		})
		.with_ansi(false)
		.finish();
	let _guard = tracing::subscriber::set_default(subscriber);

	let local = TempDir::new().unwrap();
	let repo = Arc::new(MemoryRepository::new());
	let dispatcher = setup(&repo, local.path());
	let relative = Path::new("apps").join(OsStr::from_bytes(b"bad\xff.txt"));

	let result = dispatcher.dispatch(&relative).await;

	assert!(matches!(result, Err(SyncError::InvalidPath { .. })));
	assert!(repo.operations().is_empty());
	let logged = buffer.contents();
	assert!(logged.contains("ERROR"), "{}", logged);
	assert!(logged.contains("Cannot sync apps/bad"), "{}", logged);
}

#[tokio::test]
async fn test_disjoint_upload_overtakes_held_pipeline() {
	let local = TempDir::new().unwrap();
	create_file(local.path(), "apps/x/y.txt", "held");
	create_file(local.path(), "other/z.txt", "free");
	let repo = Arc::new(MemoryRepository::new());
	let gate = repo.gate(OpKind::Upload, "/apps/x/y.txt");
	let dispatcher = setup(&repo, local.path());

	let held = spawn_dispatch(&dispatcher, "apps/x/y.txt");
	let coordinator = Arc::clone(dispatcher.coordinator());
	wait_until(|| coordinator.is_live(&RepositoryPath::parse("/apps/x/y.txt").unwrap())).await;

	// Only the root is shared; creating /apps settles it
	let free = timeout(Duration::from_secs(5), spawn_dispatch(&dispatcher, "other/z.txt"))
		.await
		.expect("disjoint upload was blocked")
		.unwrap()
		.unwrap();
	assert_eq!(free, DispatchOutcome::Uploaded);
	assert!(repo.contains("/other/z.txt"));
	assert!(!repo.contains("/apps/x/y.txt"));

	gate.notify_one();
	let held = timeout(Duration::from_secs(5), held).await.unwrap().unwrap().unwrap();
	assert_eq!(held, DispatchOutcome::Uploaded);
	assert!(dispatcher.coordinator().live_paths().is_empty());
}

#[tokio::test]
async fn test_failure_is_reported_and_next_event_proceeds() {
	let local = TempDir::new().unwrap();
	create_file(local.path(), "apps/a.txt", "a");
	create_file(local.path(), "apps/b.txt", "b");
	let repo = Arc::new(MemoryRepository::new());
	repo.fail_on(OpKind::Upload, "/apps/a.txt");
	let dispatcher = setup(&repo, local.path());

	let failed = dispatcher.dispatch(Path::new("apps/a.txt")).await;
	match failed {
		Err(SyncError::RemoteOperationFailed { operation, path, .. }) => {
			assert_eq!(operation, "file upload");
			assert_eq!(path, "/apps/a.txt");
		}
		other => panic!("expected a remote failure, got {:?}", other),
	}

	let next = dispatcher.dispatch(Path::new("apps/b.txt")).await.unwrap();
	assert_eq!(next, DispatchOutcome::Uploaded);
	assert!(dispatcher.coordinator().live_paths().is_empty());
}

#[tokio::test]
async fn test_vanished_descriptor_is_ignored() {
	let local = TempDir::new().unwrap();
	let repo = Arc::new(MemoryRepository::new());

	let outcome = setup(&repo, local.path()).dispatch(Path::new("apps/gone.xml")).await.unwrap();

	assert_eq!(outcome, DispatchOutcome::Ignored);
	assert!(repo.operations().is_empty());
}

// vim: ts=4
