use crate::command::{Delegation, ExitCode, Invocation};
use crate::error::LaunchError;
use crate::profile::masked;
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::ExitStatus;
use tracing::info;

/// Replace the launcher with the delegated program.
///
/// Only returns when the replacement could not happen. On targets without
/// `exec` this behaves like [`Spawn`].
pub struct Exec;

impl Delegation for Exec {
    fn delegate(self: Box<Self>, invocation: Invocation) -> Result<ExitCode> {
        exec(invocation)
    }
}

#[cfg(unix)]
fn exec(invocation: Invocation) -> Result<ExitCode> {
    use std::os::unix::process::CommandExt;
    info!(program = %invocation.program.display(), args = invocation.args.len(), "exec");
    let source = invocation.command().exec();
    Err(LaunchError::Exec {
        program: invocation.program.display().to_string(),
        source,
    }
    .into())
}

#[cfg(not(unix))]
fn exec(invocation: Invocation) -> Result<ExitCode> {
    Box::new(Spawn).delegate(invocation)
}

/// Run the delegated program as a child, wait for it, and pass its exit code on.
pub struct Spawn;

impl Delegation for Spawn {
    fn delegate(self: Box<Self>, invocation: Invocation) -> Result<ExitCode> {
        info!(program = %invocation.program.display(), args = invocation.args.len(), "spawn");
        let mut child = invocation
            .command()
            .spawn()
            .map_err(|source| LaunchError::Exec {
                program: invocation.program.display().to_string(),
                source,
            })?;
        let exit_status = child
            .wait()
            .with_context(|| format!("waiting for {}", invocation.program.display()))?;
        Ok(exit_code(exit_status))
    }
}

/// Describe the invocation as a shell script instead of running it.
///
/// Secrets are masked, so the output is safe to paste into logs or tickets.
pub struct DryRun<W> {
    out: W,
}

impl<W: Write> DryRun<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Delegation for DryRun<W> {
    fn delegate(mut self: Box<Self>, invocation: Invocation) -> Result<ExitCode> {
        for (name, value) in &invocation.exports {
            writeln!(self.out, "export {}={}", name, shell_quote(masked(name, value)))?;
        }
        writeln!(
            self.out,
            "cd {}",
            shell_quote(&invocation.env.current_dir.to_string_lossy())
        )?;
        let mut line = format!("exec {}", shell_quote(&invocation.program.to_string_lossy()));
        for arg in &invocation.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(0)
    }
}

/// Quote `s` for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Exit code a shell would report for `exit_status`.
pub fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve the program to delegate to the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returned if it names a file.
/// - Single path component (no separators): each directory in `search_paths`
///   (the child's PATH) is tried in order and the first file found wins.
/// - Anything else (`./foo`, `bin/python`): resolved against `current_dir`, the
///   directory the child will start in.
/// - Empty path: `None`.
pub fn find_command_path(
    search_paths: &OsStr,
    current_dir: &Path,
    path: &Path,
) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(Component::Normal(name)), None) => find_in_path(search_paths, name),
        _ => find_by_path(&current_dir.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        if let Some(path) = find_by_path(&dir.join(cmd)) {
            return Some(path);
        }
        let suffix = std::env::consts::EXE_SUFFIX;
        if !suffix.is_empty() {
            let mut with_suffix = OsString::from(cmd);
            with_suffix.push(suffix);
            if let Some(path) = find_by_path(&dir.join(with_suffix)) {
                return Some(path);
            }
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        None
    }
}
