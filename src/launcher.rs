use crate::command::{Delegation, ExitCode, Invocation};
use crate::env::Environment;
use crate::error::LaunchError;
use crate::external::find_command_path;
use crate::profile::LaunchProfile;
use anyhow::Result;
use std::path::Path;
use tracing::debug;

/// Prepares the environment described by a [`LaunchProfile`] and hands the
/// forwarded arguments to its interpreter.
///
/// Example
/// ```no_run
/// use env_launcher::{Launcher, LaunchProfile};
/// use env_launcher::external::Spawn;
///
/// let profile = LaunchProfile::load("launcher.toml").unwrap();
/// let args = vec!["-m".to_string(), "crawler".to_string()];
/// let code = Launcher::from_process(profile).run(args, Box::new(Spawn)).unwrap();
/// std::process::exit(code);
/// ```
pub struct Launcher {
    profile: LaunchProfile,
    env: Environment,
}

impl Launcher {
    /// Launch on top of an explicitly provided environment.
    pub fn new(profile: LaunchProfile, env: Environment) -> Self {
        Self { profile, env }
    }

    /// Launch on top of the current process environment.
    pub fn from_process(profile: LaunchProfile) -> Self {
        Self::new(profile, Environment::new())
    }

    pub fn profile(&self) -> &LaunchProfile {
        &self.profile
    }

    /// Apply the profile and resolve the interpreter, without starting anything.
    ///
    /// The interpreter is looked up on the PATH of the prepared environment, so a
    /// profile that changes PATH through `extra` is honoured.
    pub fn prepare(mut self, args: Vec<String>) -> Result<Invocation, LaunchError> {
        let exports = self.profile.apply(&mut self.env)?;

        if !self.env.current_dir.is_dir() {
            return Err(LaunchError::WorkingDirNotFound {
                path: self.env.current_dir,
            });
        }

        let program = &self.profile.interpreter.program;
        let search_paths = self.env.get_var_os("PATH").unwrap_or_default();
        let resolved = find_command_path(
            search_paths,
            &self.env.current_dir,
            Path::new(program),
        )
        .ok_or_else(|| LaunchError::InterpreterNotFound {
            program: program.clone(),
        })?;
        debug!(program = %program, resolved = %resolved.display(), "interpreter");

        Ok(Invocation {
            program: resolved,
            args,
            env: self.env,
            exports,
        })
    }

    /// Prepare the invocation and hand it to `delegation`.
    pub fn run(self, args: Vec<String>, delegation: Box<dyn Delegation + '_>) -> Result<ExitCode> {
        let invocation = self.prepare(args)?;
        delegation.delegate(invocation)
    }

    /// The profile's assignments after expansion, in export order.
    ///
    /// Nothing is resolved or started; the interpreter need not exist.
    pub fn exports(mut self) -> Result<Vec<(String, String)>, LaunchError> {
        self.profile.apply(&mut self.env)
    }
}
