use crate::env::Environment;
use anyhow::Result;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// A fully prepared call of the delegated program.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Resolved path of the program to run.
    pub program: PathBuf,
    /// Arguments forwarded verbatim from the launcher's own command line.
    pub args: Vec<String>,
    /// The complete environment and working directory of the child.
    pub env: Environment,
    /// Assignments made from the profile, in order, for display.
    pub exports: Vec<(String, String)>,
}

impl Invocation {
    /// Build a `std::process::Command` that reproduces this invocation exactly.
    ///
    /// The child sees `env.passthrough` and `env.vars`, the latter winning on a
    /// name clash; nothing else leaks in from the launcher.
    pub fn command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(self.env.passthrough.iter().map(|(k, v)| (k, v)))
            .envs(self.env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.env.current_dir);
        cmd
    }
}

/// Object-safe strategy for handing an [`Invocation`] over to the delegated program.
///
/// Implemented by [`Exec`](crate::external::Exec), [`Spawn`](crate::external::Spawn)
/// and [`DryRun`](crate::external::DryRun).
pub trait Delegation {
    /// Hand over the invocation and report the exit code to finish with.
    fn delegate(self: Box<Self>, invocation: Invocation) -> Result<ExitCode>;
}
