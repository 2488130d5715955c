use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// The environment a delegated program will be started with.
///
/// The environment contains:
/// - `vars`: every variable the child will see, inherited ones included.
/// - `passthrough`: inherited variables whose name or value is not unicode. The
///   profile cannot read them, but the child still receives them unchanged.
/// - `current_dir`: the working directory the child starts in.
///
/// Fields are public so callers can seed an environment by hand in tests or
/// embedders; the launcher itself only goes through the methods below.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, PYTHONPATH).
    pub vars: HashMap<String, String>,
    /// Non-unicode inherited variables, handed to the child as is.
    pub passthrough: Vec<(OsString, OsString)>,
    /// The working directory for the delegated program.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment`.
    ///
    /// Variables whose name or value is not valid unicode go to `passthrough`.
    pub fn new() -> Self {
        Self::from_vars_os(
            stdenv::vars_os(),
            stdenv::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        )
    }

    /// Build an environment from raw `(name, value)` pairs.
    pub fn from_vars_os(
        vars_os: impl IntoIterator<Item = (OsString, OsString)>,
        current_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut env = Self::empty(current_dir);
        for (k, v) in vars_os {
            match (k.into_string(), v.into_string()) {
                (Ok(k), Ok(v)) => {
                    env.vars.insert(k, v);
                }
                (k, v) => {
                    let k = k.map_or_else(|s| s, OsString::from);
                    let v = v.map_or_else(|s| s, OsString::from);
                    env.passthrough.push((k, v));
                }
            }
        }
        env
    }

    /// An environment with no variables at all, rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            passthrough: Vec::new(),
            current_dir: current_dir.into(),
        }
    }

    /// Get the value of a variable as the child would see it.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Like [`get_var`](Self::get_var), but also sees non-unicode variables.
    pub fn get_var_os(&self, key: &str) -> Option<&OsStr> {
        if let Some(v) = self.vars.get(key) {
            return Some(OsStr::new(v));
        }
        self.passthrough
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Set or override a variable whose value may not be unicode.
    pub fn set_var_os(&mut self, key: impl Into<String>, val: OsString) {
        let key = key.into();
        self.passthrough.retain(|(k, _)| k != key.as_str());
        match val.into_string() {
            Ok(val) => {
                self.vars.insert(key, val);
            }
            Err(val) => {
                self.vars.remove(&key);
                self.passthrough.push((key.into(), val));
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
