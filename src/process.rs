//! Subprocess helpers shared by the yt-dlp and ffmpeg runners.

use std::{
    ffi::OsStr,
    io,
    process::{Output, Stdio},
};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How a cancellable subprocess ended
#[derive(Debug)]
pub enum Finished {
    Exited(Output),
    Cancelled,
}

/// Runs `command` to completion with captured output. If `cancel` fires
/// first the child is killed and [`Finished::Cancelled`] is returned.
pub async fn run_cancellable(mut command: Command, cancel: &CancellationToken) -> io::Result<Finished> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!("spawning {:?}", command.as_std());
    let child = command.spawn()?;

    tokio::select! {
        output = child.wait_with_output() => output.map(Finished::Exited),
        _ = cancel.cancelled() => Ok(Finished::Cancelled),
    }
}

/// Last meaningful stderr line, used as the short reason in error messages.
pub fn summarize_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "Conversion failed!")
        .next_back()
        .map(str::to_string)
        .unwrap_or_else(|| "no error output".to_string())
}

/// Renders a command line for logs.
pub fn display_command<I, S>(program: &OsStr, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    std::iter::once(program.to_string_lossy().into_owned())
        .chain(args.into_iter().map(|a| quote(&a.as_ref().to_string_lossy())))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(value: &str) -> String {
    if value.is_empty() {
        "''".to_string()
    } else if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || "-_./:+@=?".contains(ch))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}
