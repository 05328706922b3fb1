//! Default collaborators backed by the terminal and the OS shell.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info, warn};

use super::{FolderPicker, Launcher, Mailer, Notifier, PickerLocation};
use crate::error::{Error, Result};

/// Unreserved characters (RFC 3986) stay literal in mailto header values.
const MAILTO_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Hands files to the platform's default handler.
#[derive(Debug, Default, Clone)]
pub struct ShellLauncher;

impl ShellLauncher {
    fn command_for(target: &str) -> Command {
        if cfg!(target_os = "windows") {
            Self::windows_command(target)
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(target);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(target);
            cmd
        }
    }

    /// The protocol handler takes the target as one argument, so `&` and `%`
    /// in paths and mailto links never reach a `cmd` parser.
    fn windows_command(target: &str) -> Command {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler").arg(target);
        cmd
    }

    fn spawn(target: &str) -> Result<()> {
        let mut cmd = Self::command_for(target);
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        debug!(program = %program, target, "spawning external handler");
        cmd.spawn().map(|_| ()).map_err(|err| Error::Launch {
            program,
            reason: err.to_string(),
        })
    }
}

impl Launcher for ShellLauncher {
    fn open(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::Launch {
                program: "viewer".into(),
                reason: format!("{} no longer exists", path.display()),
            });
        }
        Self::spawn(&path.to_string_lossy())
    }
}

/// Composes mail through a `mailto:` link. Attachments are not part of the
/// mailto scheme, so the image path is placed in the body.
#[derive(Debug, Default, Clone)]
pub struct MailtoMailer;

impl MailtoMailer {
    pub fn link_for(attachment: &Path) -> String {
        let body = format!("Spotlight image: {}", attachment.display());
        format!(
            "mailto:?subject={}&body={}",
            utf8_percent_encode("Windows Spotlight image", MAILTO_COMPONENT),
            utf8_percent_encode(&body, MAILTO_COMPONENT)
        )
    }
}

impl Mailer for MailtoMailer {
    fn compose(&self, attachment: &Path) -> Result<()> {
        ShellLauncher::spawn(&Self::link_for(attachment))
    }
}

/// Prints messages to stderr; the terminal stands in for a modal dialog.
#[derive(Debug, Default, Clone)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn show_message(&self, body: &str, title: &str) {
        info!(title, "message shown");
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "== {title} ==\n{body}\n");
    }
}

/// Reads a folder path from stdin. An empty line cancels.
#[derive(Debug, Default, Clone)]
pub struct TerminalPicker;

impl FolderPicker for TerminalPicker {
    fn pick_folder(&self, suggested: PickerLocation) -> Option<PathBuf> {
        let hint = suggested
            .resolve()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        eprint!("folder [{hint}] (empty to cancel): ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut line) {
            warn!("folder prompt failed: {err}");
            return None;
        }
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(PathBuf::from(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailto_link_is_escaped() {
        let link = MailtoMailer::link_for(Path::new("/tmp/a b.jpg"));
        assert!(link.starts_with("mailto:?subject=Windows%20Spotlight%20image&body="));
        assert!(link.contains("%2Ftmp%2Fa%20b.jpg"));
    }

    #[test]
    fn windows_handler_gets_link_as_single_argument() {
        let link = MailtoMailer::link_for(Path::new(r"C:\A&B\x.jpg"));
        let cmd = ShellLauncher::windows_command(&link);
        assert_eq!(cmd.get_program(), "rundll32");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], "url.dll,FileProtocolHandler");
        assert_eq!(args[1], link.as_str());
        assert_eq!(link.matches('&').count(), 1);
        assert!(link.contains("A%26B"));
    }

    #[test]
    fn launcher_rejects_missing_file() {
        let err = ShellLauncher
            .open(Path::new("/definitely/not/here.jpg"))
            .unwrap_err();
        assert_eq!(err.category(), "LaunchError");
    }
}
