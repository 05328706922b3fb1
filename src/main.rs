use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use spotlight_capture::bootstrap;
use spotlight_capture::cache::ImageCache;
use spotlight_capture::config::Configuration;
use spotlight_capture::events::{Displayed, ViewerCommand, ViewerUpdate};
use spotlight_capture::logging::{SessionLog, init_tracing};
use spotlight_capture::platform::Notifier;
use spotlight_capture::platform::shell::{
    MailtoMailer, ShellLauncher, TerminalNotifier, TerminalPicker,
};
use spotlight_capture::settings::{LogLevel, Settings, SettingsService, YamlFileStore};
use spotlight_capture::tasks::loader::RgbaDecoder;
use spotlight_capture::tasks::viewer::{self, Collaborators, Viewer};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(
    name = "spotlight-capture",
    version,
    about = "Browse, save and share Windows Spotlight images"
)]
struct Args {
    /// Optional YAML configuration overriding the default locations
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Read assets from this directory instead of the Spotlight cache
    #[arg(long, value_name = "DIR")]
    source: Option<PathBuf>,
    /// Increase console log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Viewer(ViewerCommand),
    PickSaveDir,
    PickLogDir,
    Logging(bool),
    Level(LogLevel),
    Help,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let head = words.next()?;
    let arg = words.next();
    let input = match (head, arg) {
        ("n" | "next", None) => Input::Viewer(ViewerCommand::Next),
        ("p" | "prev", None) => Input::Viewer(ViewerCommand::Previous),
        ("o" | "open", None) => Input::Viewer(ViewerCommand::Open),
        ("s" | "save", None) => Input::Viewer(ViewerCommand::Save),
        ("e" | "email", None) => Input::Viewer(ViewerCommand::Share),
        ("r" | "reload", None) => Input::Viewer(ViewerCommand::Reload),
        ("save-dir", None) => Input::PickSaveDir,
        ("log-dir", None) => Input::PickLogDir,
        ("log", Some("on")) => Input::Logging(true),
        ("log", Some("off")) => Input::Logging(false),
        ("log-level", Some(tag)) => Input::Level(LogLevel::from_tag(tag)?),
        ("h" | "help" | "?", None) => Input::Help,
        ("q" | "quit", None) => Input::Quit,
        _ => return None,
    };
    Some(input)
}

const HELP: &str = "commands: n(ext) p(rev) o(pen) s(ave) e(mail) r(eload) \
save-dir log-dir log on|off log-level <verbose|information|warning|error|critical> q(uit)";

fn print_shown(shown: &Displayed) {
    match &shown.image {
        Some(image) => println!(
            "[{}] {} ({}x{})",
            shown.index,
            shown.path.display(),
            image.width,
            image.height
        ),
        None => println!("[{}] {} (unreadable)", shown.index, shown.path.display()),
    }
}

fn print_update(update: &ViewerUpdate) {
    match update {
        ViewerUpdate::Loaded { count, showing } => {
            println!("{count} images available");
            match showing {
                Some(shown) => print_shown(shown),
                None => println!("no Spotlight images to show"),
            }
        }
        ViewerUpdate::Showing(shown) => print_shown(shown),
        ViewerUpdate::Nothing => println!("no Spotlight images to show"),
        ViewerUpdate::Saved(path) => println!("saved to {}", path.display()),
        ViewerUpdate::Opened(path) => println!("opened {}", path.display()),
        ViewerUpdate::Shared(path) => println!("composing email for {}", path.display()),
        ViewerUpdate::Failed(_) => {}
    }
}

/// Blocking stdin loop. Settings changes are handled here so that folder
/// prompts read from the same thread as commands.
fn read_commands(
    to_viewer: mpsc::Sender<ViewerCommand>,
    settings: SettingsService,
    session: SessionLog,
    cancel: CancellationToken,
) {
    let picker = TerminalPicker;
    let stdin = io::stdin();
    let mut line = String::new();
    while !cancel.is_cancelled() {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                tracing::info!("stdin closed; initiating shutdown");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("stdin reader failed: {err}");
                break;
            }
        }
        let Some(input) = parse_input(&line) else {
            if !line.trim().is_empty() {
                eprintln!("{HELP}");
            }
            continue;
        };
        let outcome = match input {
            Input::Viewer(command) => {
                if to_viewer.blocking_send(command).is_err() {
                    break;
                }
                Ok(())
            }
            Input::PickSaveDir => settings.pick_save_dir(&picker).map(|_| ()),
            Input::PickLogDir => settings.pick_log_dir(&picker).map(|_| ()),
            Input::Logging(enabled) => settings.set_logging_enabled(enabled),
            Input::Level(level) => settings.set_logging_level(level),
            Input::Help => {
                eprintln!("{HELP}");
                Ok(())
            }
            Input::Quit => break,
        };
        if let Err(err) = outcome {
            tracing::warn!(error = %err, "settings change failed");
            TerminalNotifier.show_message(
                &format!("We could not update this setting.\n\nError message: {err}"),
                &format!("{} - Could Not Save Setting", err.category()),
            );
        }
        session.apply(&settings.current().logging);
    }
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        source,
        verbose,
    } = Args::parse();

    let mut cfg = match &config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(source) = source {
        cfg.asset_cache_dir = source;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;

    let notifier = Arc::new(TerminalNotifier);
    let store = YamlFileStore::open(&cfg.settings_file)
        .with_context(|| format!("failed to open settings {}", cfg.settings_file.display()))?;
    let settings = SettingsService::new(Arc::new(store), Settings::defaults(&cfg));

    let session = SessionLog::new(&settings.current().logging);
    init_tracing(verbose, &session)?;
    tracing::debug!("Loaded configuration:\n{:#?}", cfg);

    let outcome = match bootstrap::initialize(&cfg, &settings) {
        Ok(outcome) => outcome,
        Err(err) => {
            let (body, title) = bootstrap::failure_message(&err);
            notifier.show_message(&body, &title);
            return Err(err).context("first-run setup failed");
        }
    };
    if outcome.first_launch {
        notifier.show_message(
            &format!(
                "Images you save go to {}.\nType `help` for commands.",
                settings.save_dir().display()
            ),
            "Welcome",
        );
    }
    session.apply(&settings.current().logging);

    // Channels (small/bounded)
    let (command_tx, command_rx) = mpsc::channel::<ViewerCommand>(16); // Stdin -> Viewer
    let (update_tx, mut update_rx) = mpsc::channel::<ViewerUpdate>(16); // Viewer -> Stdout

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Viewer
    tasks.spawn({
        let viewer = Viewer::new(
            ImageCache::new(RgbaDecoder),
            cfg.clone(),
            settings.clone(),
            Collaborators {
                notifier: notifier.clone(),
                launcher: Arc::new(ShellLauncher),
                mailer: Arc::new(MailtoMailer),
            },
        );
        let cancel = cancel.clone();
        async move {
            viewer::run(viewer, command_rx, update_tx, cancel)
                .await
                .context("viewer task failed")
        }
    });

    // Output
    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe_update = update_rx.recv() => match maybe_update {
                        Some(update) => print_update(&update),
                        None => break,
                    }
                }
            }
            Ok(())
        }
    });

    // Detached OS thread: it may stay parked in `read_line` after shutdown,
    // and the runtime would wait on a blocking-pool task.
    {
        let settings = settings.clone();
        let session = session.clone();
        let cancel = cancel.clone();
        std::thread::Builder::new()
            .name("stdin-commands".into())
            .spawn(move || read_commands(command_tx, settings, session, cancel))
            .context("failed to start stdin reader")?;
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("task error: {err:?}"),
            Err(err) => tracing::error!("join error: {err}"),
        }
        cancel.cancel();
    }

    match session.flush() {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "session log written"),
        Ok(None) => {}
        Err(err) => notifier.show_message(
            &format!(
                "We could not save the log file to the specified directory.\n\nError message: {err}"
            ),
            &format!("{} - Could Not Save Log File", err.category()),
        ),
    }
    Ok(())
}
