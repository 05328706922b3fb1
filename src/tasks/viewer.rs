use crate::cache::ImageCache;
use crate::config::Configuration;
use crate::enumerate::enumerate_async;
use crate::error::Error;
use crate::events::{Direction, ViewerCommand, ViewerUpdate};
use crate::platform::{Launcher, Mailer, Notifier};
use crate::settings::SettingsService;
use crate::tasks::loader::ImageLoader;
use anyhow::Result;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub launcher: Arc<dyn Launcher>,
    pub mailer: Arc<dyn Mailer>,
}

/// Maps front-end commands onto the cache and the desktop collaborators.
/// User-action failures become a message and never end the session.
pub struct Viewer<L: ImageLoader> {
    cache: ImageCache<L>,
    cfg: Configuration,
    settings: SettingsService,
    collaborators: Collaborators,
}

impl<L: ImageLoader> Viewer<L> {
    pub fn new(
        cache: ImageCache<L>,
        cfg: Configuration,
        settings: SettingsService,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            cache,
            cfg,
            settings,
            collaborators,
        }
    }

    pub fn cache(&self) -> &ImageCache<L> {
        &self.cache
    }

    pub async fn handle(&mut self, command: ViewerCommand) -> ViewerUpdate {
        debug!(?command, "viewer command");
        match command {
            ViewerCommand::Next => self.page(Direction::Forward).await,
            ViewerCommand::Previous => self.page(Direction::Backward).await,
            ViewerCommand::Reload => self.reload().await,
            ViewerCommand::Open => {
                match self.cache.open_externally(self.collaborators.launcher.as_ref()) {
                    Ok(path) => ViewerUpdate::Opened(path),
                    Err(err) => self.fail(command, &err),
                }
            }
            ViewerCommand::Share => match self.cache.share(self.collaborators.mailer.as_ref()) {
                Ok(path) => ViewerUpdate::Shared(path),
                Err(err) => self.fail(command, &err),
            },
            ViewerCommand::Save => {
                let dir = self.settings.save_dir();
                match self.cache.save_to(&dir).await {
                    Ok(path) => ViewerUpdate::Saved(path),
                    Err(err) => self.fail(command, &err),
                }
            }
        }
    }

    async fn page(&mut self, direction: Direction) -> ViewerUpdate {
        match self.cache.advance(direction).await {
            Some(shown) => ViewerUpdate::Showing(shown),
            None => ViewerUpdate::Nothing,
        }
    }

    /// Enumerate the asset cache again, install the new list and show the
    /// first image.
    pub async fn reload(&mut self) -> ViewerUpdate {
        let images = match enumerate_async(&self.cfg).await {
            Ok(images) => images,
            Err(err) => return self.fail(ViewerCommand::Reload, &err),
        };
        let count = images.len();
        self.cache.load(images);
        info!(count, "gallery reloaded");
        let showing = self.cache.advance(Direction::Forward).await;
        ViewerUpdate::Loaded { count, showing }
    }

    fn fail(&self, command: ViewerCommand, err: &Error) -> ViewerUpdate {
        warn!(?command, error = %err, "user action failed");
        let (body, title) = failure_message(command, err);
        self.collaborators.notifier.show_message(&body, &title);
        ViewerUpdate::Failed(command)
    }
}

/// Body and title of the message shown when `command` fails.
pub fn failure_message(command: ViewerCommand, err: &Error) -> (String, String) {
    let (verb, title) = match command {
        ViewerCommand::Open => ("open this image", "Could Not Open Image"),
        ViewerCommand::Save => ("save this image", "Could Not Save Image"),
        ViewerCommand::Share => ("share this image via email", "Could Not Share Image"),
        ViewerCommand::Reload => ("load the Spotlight images", "Could Not Load Images"),
        ViewerCommand::Next | ViewerCommand::Previous => ("show this image", "Could Not Show Image"),
    };
    (
        format!("We could not {verb}. Please try again.\n\nError message: {err}"),
        format!("{} - {title}", err.category()),
    )
}

/// Loads the gallery, then serves commands until cancelled or the command
/// channel closes.
pub async fn run<L: ImageLoader>(
    mut viewer: Viewer<L>,
    mut commands: Receiver<ViewerCommand>,
    updates: Sender<ViewerUpdate>,
    cancel: CancellationToken,
) -> Result<()> {
    let first = viewer.reload().await;
    if updates.send(first).await.is_err() {
        return Ok(());
    }
    loop {
        select! {
            _ = cancel.cancelled() => break,
            maybe_cmd = commands.recv() => {
                let Some(command) = maybe_cmd else {
                    debug!("command channel closed; viewer exiting");
                    break;
                };
                let update = viewer.handle(command).await;
                if updates.send(update).await.is_err() {
                    warn!("front-end dropped update channel");
                    break;
                }
            }
        }
    }
    Ok(())
}
