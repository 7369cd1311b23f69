//! End-to-end flows through the pipe: a real controller serving a real
//! mirror over temp directories.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use viewfinder::SessionError;
use viewfinder::file_handle::DirectoryHandle;
use viewfinder::host::{DirectoryPicker, NullHostDelegate};
use viewfinder::mirror::Mirror;
use viewfinder::pipe::PipeEnd;
use viewfinder::protocol::RenameResult;
use viewfinder::session::{LaunchEvent, SessionController, SortOrder};

struct Harness {
    mirror: Mirror,
    launch_tx: mpsc::UnboundedSender<LaunchEvent>,
    _session: JoinHandle<()>,
    _pump: JoinHandle<()>,
}

async fn start(picker_dir: &Path, sort_order: SortOrder) -> Harness {
    let (host_end, guest_end) = PipeEnd::pair();
    let (launch_tx, launch_rx) = mpsc::unbounded_channel();
    let controller = SessionController::new(
        host_end,
        Box::new(DirectoryPicker::new(DirectoryHandle::new(
            picker_dir.to_path_buf(),
        ))),
        Box::new(NullHostDelegate),
        sort_order,
    );
    let session = tokio::spawn(controller.serve(launch_rx));
    let (mirror, pump) = Mirror::attach(guest_end).await.unwrap();
    let pump = tokio::spawn(pump.run());
    Harness {
        mirror,
        launch_tx,
        _session: session,
        _pump: pump,
    }
}

fn launch(harness: &Harness, dir: &Path, focus: &str) {
    let directory = DirectoryHandle::new(dir.to_path_buf());
    let focus = directory.file_handle(focus);
    harness
        .launch_tx
        .send(LaunchEvent::Directory { directory, focus })
        .unwrap();
}

fn write_files(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(name), format!("contents of {name}")).unwrap();
    }
}

async fn wait_until(mirror: &Mirror, what: &str, predicate: impl Fn(&Mirror) -> bool) {
    for _ in 0..200 {
        if predicate(mirror) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn names(mirror: &Mirror) -> Vec<String> {
    mirror.files().iter().map(|f| f.name().to_string()).collect()
}

#[tokio::test]
async fn launch_shows_the_focus_file_then_grows_the_ring() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["bird.jpg", "c.jpg", "a.jpg", "b.jpg", "notes.txt"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "bird.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 4).await;

    assert_eq!(names(&harness.mirror), ["bird.jpg", "c.jpg", "a.jpg", "b.jpg"]);
    assert_eq!(harness.mirror.current_index(), 0);
    // Only the focus file carried bytes in the snapshot.
    let current = harness.mirror.current().unwrap();
    assert_eq!(current.bytes(), Some(b"contents of bird.jpg".as_slice()));
    assert!(current.capabilities().delete);
}

#[tokio::test]
async fn navigate_wraps_backwards_to_the_tail() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg", "b.jpg", "c.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 3).await;

    harness.mirror.navigate(-1).await.unwrap();
    wait_until(&harness.mirror, "the cursor", |m| m.current_index() == 2).await;
    assert_eq!(harness.mirror.current().unwrap().name(), "c.jpg");
}

#[tokio::test]
async fn non_focus_bytes_are_re_requested_on_demand() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg", "b.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 2).await;

    let other = harness.mirror.files()[1].clone();
    assert_eq!(other.name(), "b.jpg");
    assert!(other.bytes().is_none());
    assert_eq!(
        other.read_contents().await.unwrap(),
        b"contents of b.jpg"
    );
}

#[tokio::test]
async fn rename_collision_is_reported_as_a_value() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg", "b.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 2).await;

    let current = harness.mirror.current().unwrap();
    let result = current.rename_original("b.jpg").await.unwrap();
    assert_eq!(result, RenameResult::FileExists);
    assert!(tmp.path().join("a.jpg").exists());
    assert!(tmp.path().join("b.jpg").exists());
}

#[tokio::test]
async fn delete_removes_the_file_and_fills_the_gap() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg", "b.jpg", "c.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 3).await;

    harness
        .mirror
        .current()
        .unwrap()
        .delete_original()
        .await
        .unwrap();
    wait_until(&harness.mirror, "the shrunk ring", |m| m.len() == 2).await;

    assert!(!tmp.path().join("a.jpg").exists());
    assert_eq!(harness.mirror.current().unwrap().name(), "b.jpg");
}

#[tokio::test]
async fn zero_byte_overwrite_is_rejected_over_the_pipe() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the launch", |m| !m.is_empty()).await;

    let current = harness.mirror.current().unwrap();
    match current.overwrite_original(Vec::new()).await {
        Err(SessionError::Rejected(shape)) => assert_eq!(shape.name, "EmptyWrite"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(tmp.path().join("a.jpg")).unwrap(),
        b"contents of a.jpg"
    );
}

#[tokio::test]
async fn overwrite_replaces_the_contents_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the launch", |m| !m.is_empty()).await;

    let current = harness.mirror.current().unwrap();
    let result = current.overwrite_original(b"new".to_vec()).await.unwrap();
    assert!(result.renamed_to.is_none());
    assert!(result.error_name.is_none());
    assert_eq!(std::fs::read(tmp.path().join("a.jpg")).unwrap(), b"new");
}

#[tokio::test]
async fn save_as_inserts_the_copy_and_reissues_the_old_token() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg", "b.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "a.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 2).await;

    let original = harness.mirror.current().unwrap();
    let old_token = original.token();
    let saved = original
        .save_as(b"saved copy".to_vec(), "copy.jpg", "image/jpeg")
        .await
        .unwrap();
    assert_eq!(saved.as_deref(), Some("copy.jpg"));
    assert_eq!(std::fs::read(tmp.path().join("copy.jpg")).unwrap(), b"saved copy");

    wait_until(&harness.mirror, "the save-as snapshot", |m| m.len() == 3).await;
    assert_eq!(names(&harness.mirror), ["a.jpg", "copy.jpg", "b.jpg"]);
    assert_eq!(harness.mirror.current_index(), 1);
    // The copy is the current file; the old entry lives on under a fresh
    // token.
    let files = harness.mirror.files();
    assert_ne!(files[1].token(), old_token);
    assert_ne!(files[0].token(), old_token);
}

#[tokio::test]
async fn a_newer_launch_always_wins_over_an_in_flight_scan() {
    let tmp_a = tempfile::tempdir().unwrap();
    write_files(tmp_a.path(), &["a1.jpg", "a2.jpg", "a3.jpg", "a4.jpg"]);
    let tmp_b = tempfile::tempdir().unwrap();
    write_files(tmp_b.path(), &["b1.jpg", "b2.jpg"]);
    let harness = start(tmp_a.path(), SortOrder::AFirst).await;

    launch(&harness, tmp_a.path(), "a1.jpg");
    launch(&harness, tmp_b.path(), "b1.jpg");

    wait_until(&harness.mirror, "the superseding launch", |m| {
        m.current()
            .map(|f| f.name() == "b1.jpg")
            .unwrap_or(false)
    })
    .await;
    wait_until(&harness.mirror, "b's sibling scan", |m| m.len() == 2).await;
    // Give any stale commit from the first scan time to be discarded.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(names(&harness.mirror), ["b1.jpg", "b2.jpg"]);
}

#[tokio::test]
async fn picker_relaunch_replaces_the_ring_and_drops_capabilities() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["a.jpg", "b.jpg"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "b.jpg");
    wait_until(&harness.mirror, "the sibling scan", |m| m.len() == 2).await;
    assert!(harness.mirror.current().unwrap().capabilities().delete);

    harness
        .mirror
        .open_files_with_picker(Vec::new(), false)
        .await
        .unwrap();
    wait_until(&harness.mirror, "the relaunch", |m| {
        m.current_index() == 0 && m.current().map(|f| f.name() == "a.jpg").unwrap_or(false)
    })
    .await;

    // Picker-opened files have no launch directory behind them, so delete
    // and rename are not offered.
    let current = harness.mirror.current().unwrap();
    assert!(!current.capabilities().delete);
    assert!(matches!(
        current.delete_original().await,
        Err(SessionError::NotCapable)
    ));
}

#[tokio::test]
async fn video_launch_carries_its_subtitle_sidecar() {
    let tmp = tempfile::tempdir().unwrap();
    write_files(tmp.path(), &["clip.mp4", "clip.vtt"]);
    let harness = start(tmp.path(), SortOrder::AFirst).await;

    launch(&harness, tmp.path(), "clip.mp4");
    wait_until(&harness.mirror, "the launch", |m| !m.is_empty()).await;

    let sidecar = harness.mirror.sidecar().expect("sidecar");
    assert_eq!(sidecar.name(), "clip.vtt");
    assert_eq!(sidecar.bytes(), Some(b"contents of clip.vtt".as_slice()));
    // And it never shows up in the ring itself.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(names(&harness.mirror), ["clip.mp4"]);
}
