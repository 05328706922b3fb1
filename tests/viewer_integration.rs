use spotlight_capture::cache::ImageCache;
use spotlight_capture::config::Configuration;
use spotlight_capture::events::{PreparedImage, ViewerCommand, ViewerUpdate};
use spotlight_capture::platform::{Launcher, Mailer, Notifier};
use spotlight_capture::settings::{MemoryStore, Settings, SettingsService};
use spotlight_capture::tasks::loader::ImageLoader;
use spotlight_capture::tasks::viewer::{self, Collaborators, Viewer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Blank;

impl ImageLoader for Blank {
    fn load(&self, path: &Path) -> spotlight_capture::Result<PreparedImage> {
        Ok(PreparedImage {
            path: path.to_path_buf(),
            width: 4,
            height: 3,
            pixels: vec![0; 48],
        })
    }
}

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<(String, String)>>,
    opened: Mutex<Vec<PathBuf>>,
}

impl Notifier for Recorder {
    fn show_message(&self, body: &str, title: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((body.to_string(), title.to_string()));
    }
}

impl Launcher for Recorder {
    fn open(&self, path: &Path) -> spotlight_capture::Result<()> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

impl Mailer for Recorder {
    fn compose(&self, _attachment: &Path) -> spotlight_capture::Result<()> {
        Err(spotlight_capture::Error::Launch {
            program: "mail".into(),
            reason: "no mail client".into(),
        })
    }
}

fn cfg_in(root: &Path) -> Configuration {
    Configuration {
        app_data_dir: root.join("app"),
        asset_cache_dir: root.join("assets"),
        working_dir: root.join("work"),
        settings_file: root.join("app").join("settings.yaml"),
        default_save_dir: root.join("saved"),
        default_log_dir: root.join("logs"),
        fallback_extension: "jpg".into(),
    }
}

fn viewer_for(cfg: &Configuration, recorder: &Arc<Recorder>) -> (Viewer<Blank>, SettingsService) {
    let settings = SettingsService::new(Arc::new(MemoryStore::new()), Settings::defaults(cfg));
    let viewer = Viewer::new(
        ImageCache::new(Blank),
        cfg.clone(),
        settings.clone(),
        Collaborators {
            notifier: recorder.clone(),
            launcher: recorder.clone(),
            mailer: recorder.clone(),
        },
    );
    (viewer, settings)
}

async fn next_update(rx: &mut mpsc::Receiver<ViewerUpdate>) -> ViewerUpdate {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for viewer update")
        .expect("viewer closed update channel")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_shows_first_image_and_serves_commands() {
    let tmp = tempdir().unwrap();
    let cfg = cfg_in(tmp.path());
    fs::create_dir_all(&cfg.asset_cache_dir).unwrap();
    fs::write(cfg.asset_cache_dir.join("aaa"), b"x").unwrap();
    fs::write(cfg.asset_cache_dir.join("bbb"), b"y").unwrap();

    let recorder = Arc::new(Recorder::default());
    let (viewer, _settings) = viewer_for(&cfg, &recorder);
    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let (upd_tx, mut upd_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(viewer::run(viewer, cmd_rx, upd_tx, cancel.clone()));

    let first = match next_update(&mut upd_rx).await {
        ViewerUpdate::Loaded {
            count: 2,
            showing: Some(shown),
        } => shown,
        other => panic!("expected loaded gallery, got {other:?}"),
    };
    assert_eq!(first.index, 0);
    assert_eq!(first.image.as_ref().map(|i| (i.width, i.height)), Some((4, 3)));

    cmd_tx.send(ViewerCommand::Next).await.unwrap();
    match next_update(&mut upd_rx).await {
        ViewerUpdate::Showing(shown) => assert_eq!(shown.index, 1),
        other => panic!("expected second image, got {other:?}"),
    }

    cmd_tx.send(ViewerCommand::Open).await.unwrap();
    match next_update(&mut upd_rx).await {
        ViewerUpdate::Opened(path) => assert!(path.starts_with(&cfg.working_dir)),
        other => panic!("expected open, got {other:?}"),
    }
    assert_eq!(recorder.opened.lock().unwrap().len(), 1);

    cmd_tx.send(ViewerCommand::Save).await.unwrap();
    match next_update(&mut upd_rx).await {
        ViewerUpdate::Saved(path) => {
            assert!(path.starts_with(&cfg.default_save_dir));
            assert!(path.is_file());
        }
        other => panic!("expected save, got {other:?}"),
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(recorder.messages.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_actions_notify_and_keep_running() {
    let tmp = tempdir().unwrap();
    let cfg = cfg_in(tmp.path());
    fs::create_dir_all(&cfg.asset_cache_dir).unwrap();
    fs::write(cfg.asset_cache_dir.join("aaa"), b"x").unwrap();

    let recorder = Arc::new(Recorder::default());
    let (mut viewer, settings) = viewer_for(&cfg, &recorder);
    let blocker = tmp.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();
    settings.set_save_dir(&blocker.join("inside")).unwrap();

    assert!(matches!(
        viewer.reload().await,
        ViewerUpdate::Loaded {
            count: 1,
            showing: Some(_)
        }
    ));

    let update = viewer.handle(ViewerCommand::Save).await;
    assert!(matches!(update, ViewerUpdate::Failed(ViewerCommand::Save)));
    let update = viewer.handle(ViewerCommand::Share).await;
    assert!(matches!(update, ViewerUpdate::Failed(ViewerCommand::Share)));

    {
        let messages = recorder.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].1, "IoError - Could Not Save Image");
        assert!(messages[0].0.starts_with("We could not save this image."));
        assert_eq!(messages[1].1, "LaunchError - Could Not Share Image");
        assert!(messages[1].0.contains("no mail client"));
    }

    // The session continues after failures.
    assert!(matches!(
        viewer.handle(ViewerCommand::Next).await,
        ViewerUpdate::Showing(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_asset_cache_reports_no_images() {
    let tmp = tempdir().unwrap();
    let cfg = cfg_in(tmp.path());
    let recorder = Arc::new(Recorder::default());
    let (mut viewer, _settings) = viewer_for(&cfg, &recorder);

    assert!(matches!(
        viewer.reload().await,
        ViewerUpdate::Loaded {
            count: 0,
            showing: None
        }
    ));
    assert!(matches!(
        viewer.handle(ViewerCommand::Next).await,
        ViewerUpdate::Nothing
    ));
    let update = viewer.handle(ViewerCommand::Open).await;
    assert!(matches!(update, ViewerUpdate::Failed(ViewerCommand::Open)));
    let messages = recorder.messages.lock().unwrap();
    assert_eq!(messages[0].1, "NoCurrentImage - Could Not Open Image");
}
