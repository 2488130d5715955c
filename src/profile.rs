//! Launch profiles: the values exported to the delegated program.
//!
//! A profile is a TOML document. Each section maps onto a fixed group of
//! environment variables; see [`LaunchProfile::exports`] for the order they are
//! assigned in.

use crate::env::Environment;
use crate::error::LaunchError;
use crate::expand::expand;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Separator used when joining entries of a search path variable.
pub const SEARCH_PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

const MASK: &str = "********";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LaunchProfile {
    /// Exported as `DEBUG`, rendered `True` or `False`.
    pub debug: Option<bool>,
    pub secret_key: Option<String>,
    /// External configuration directory, exported as `CONF_PATH`.
    pub conf_path: Option<String>,
    pub database: Option<Database>,
    pub redis: Option<Endpoint>,
    pub pika: Option<Endpoint>,
    pub rabbitmq: Option<RabbitMq>,
    pub influxdb: Option<InfluxDb>,
    #[serde(default)]
    pub interpreter: Interpreter,
    /// Additional variables, exported verbatim after the fixed ones.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Database {
    pub user: String,
    pub password: String,
    pub host: String,
    pub name: String,
}

/// A plain `ip:port` endpoint, used for Redis and Pika.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RabbitMq {
    pub ip: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InfluxDb {
    pub host: String,
    pub udp_port: u16,
    pub database: String,
}

/// Which program receives the forwarded arguments, and how its module search
/// path is extended.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Interpreter {
    pub program: String,
    pub search_path_var: String,
    /// Appended after the inherited value of `search_path_var`, in order.
    pub search_paths: Vec<String>,
    pub working_dir: Option<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            search_path_var: "PYTHONPATH".to_string(),
            search_paths: Vec::new(),
            working_dir: None,
        }
    }
}

impl LaunchProfile {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Read and parse the profile at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LaunchError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LaunchError::ProfileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_toml_str(&raw).map_err(|source| LaunchError::ProfileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The literal assignments this profile makes, in export order.
    ///
    /// Values are not expanded yet, and the search path variable is not
    /// included since it depends on the inherited environment.
    pub fn exports(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        let mut push = |name: &str, value: String| out.push((name.to_string(), value));

        if let Some(debug) = self.debug {
            push("DEBUG", if debug { "True" } else { "False" }.to_string());
        }
        if let Some(db) = &self.database {
            push("DB_USER", db.user.clone());
            push("DB_PASSWORD", db.password.clone());
            push("DB_HOST", db.host.clone());
            push("DB_NAME", db.name.clone());
        }
        if let Some(key) = &self.secret_key {
            push("SECRET_KEY", key.clone());
        }
        if let Some(redis) = &self.redis {
            push("REDIS_IP", redis.ip.clone());
            push("REDIS_PORT", redis.port.to_string());
        }
        if let Some(pika) = &self.pika {
            push("PIKA_IP", pika.ip.clone());
            push("PIKA_PORT", pika.port.to_string());
        }
        if let Some(mq) = &self.rabbitmq {
            push("RABBITMQ_IP", mq.ip.clone());
            push("RABBITMQ_PORT", mq.port.to_string());
            push("RABBITMQ_USERNAME", mq.username.clone());
            push("RABBITMQ_PASSWORD", mq.password.clone());
        }
        if let Some(influx) = &self.influxdb {
            push("INFLUXDB_UDP_PORT", influx.udp_port.to_string());
            push("INFLUXDB_HOST", influx.host.clone());
            push("INFLUXDB_DATABASE", influx.database.clone());
        }
        if let Some(conf) = &self.conf_path {
            push("CONF_PATH", conf.clone());
        }
        for (name, value) in &self.extra {
            push(name.as_str(), value.clone());
        }
        out
    }

    /// Assign every export into `env`, then extend the search path.
    ///
    /// Each value is expanded against `env` as it stands at that point, so a
    /// later value may refer to an earlier one. Returns the assignments made,
    /// in order, with expanded values.
    pub fn apply(&self, env: &mut Environment) -> Result<Vec<(String, String)>, LaunchError> {
        let mut applied = Vec::new();
        for (name, raw) in self.exports() {
            let value = expand(&raw, env).into_owned();
            debug!(var = %name, value = %masked(&name, &value), "export");
            env.set_var(name.clone(), value.clone());
            applied.push((name, value));
        }

        if let Some(value) = self.search_path_value(env)? {
            let var = self.interpreter.search_path_var.clone();
            let shown = value.to_string_lossy().into_owned();
            debug!(var = %var, value = %shown, "search path");
            env.set_var_os(var.clone(), value);
            applied.push((var, shown));
        }

        if let Some(dir) = &self.interpreter.working_dir {
            env.current_dir = PathBuf::from(expand(dir, env).into_owned());
        }
        Ok(applied)
    }

    /// The inherited value, which may not be unicode, followed by the expanded entries.
    fn search_path_value(&self, env: &Environment) -> Result<Option<OsString>, LaunchError> {
        let interp = &self.interpreter;
        if interp.search_paths.is_empty() {
            return Ok(None);
        }

        let mut value = env
            .get_var_os(&interp.search_path_var)
            .map(|v| v.to_os_string())
            .unwrap_or_default();
        for raw in &interp.search_paths {
            let path = expand(raw, env).into_owned();
            if path.contains(SEARCH_PATH_SEPARATOR) {
                return Err(LaunchError::InvalidSearchPath {
                    var: interp.search_path_var.clone(),
                    path,
                });
            }
            if !value.is_empty() {
                value.push(SEARCH_PATH_SEPARATOR.encode_utf8(&mut [0; 4]));
            }
            value.push(path);
        }
        Ok(Some(value))
    }
}

/// Whether the value of `name` should be hidden from printed output.
pub fn is_secret(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    ["PASSWORD", "SECRET", "TOKEN"]
        .iter()
        .any(|needle| upper.contains(needle))
}

/// `value`, or a fixed mask if `name` holds a secret.
pub fn masked<'a>(name: &str, value: &'a str) -> &'a str {
    if is_secret(name) { MASK } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
debug = true
secret_key = "s3cr3t"
conf_path = "$HOME/conf"

[database]
user = "crawler"
password = "hunter2"
host = "db.internal"
name = "crawl"

[redis]
ip = "10.0.0.5"
port = 6379

[pika]
ip = "10.0.0.6"
port = 9221

[rabbitmq]
ip = "10.0.0.7"
port = 5672
username = "guest"
password = "guestpw"

[influxdb]
host = "10.0.0.8"
udp_port = 8089
database = "metrics"

[interpreter]
search_paths = ["/srv/repos/a", "$HOME/repos/b"]

[extra]
API_TOKEN = "tok"
WORKERS = "4"
"#;

    fn names(pairs: &[(String, String)]) -> Vec<&str> {
        pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn parses_full_profile() {
        let profile = LaunchProfile::from_toml_str(FULL).unwrap();
        assert_eq!(profile.debug, Some(true));
        assert_eq!(profile.redis.as_ref().unwrap().port, 6379);
        assert_eq!(profile.influxdb.as_ref().unwrap().udp_port, 8089);
        assert_eq!(profile.interpreter.program, "python3");
        assert_eq!(profile.interpreter.search_path_var, "PYTHONPATH");
        assert_eq!(profile.extra.len(), 2);
    }

    #[test]
    fn exports_follow_fixed_order() {
        let profile = LaunchProfile::from_toml_str(FULL).unwrap();
        let exports = profile.exports();
        assert_eq!(
            names(&exports),
            vec![
                "DEBUG",
                "DB_USER",
                "DB_PASSWORD",
                "DB_HOST",
                "DB_NAME",
                "SECRET_KEY",
                "REDIS_IP",
                "REDIS_PORT",
                "PIKA_IP",
                "PIKA_PORT",
                "RABBITMQ_IP",
                "RABBITMQ_PORT",
                "RABBITMQ_USERNAME",
                "RABBITMQ_PASSWORD",
                "INFLUXDB_UDP_PORT",
                "INFLUXDB_HOST",
                "INFLUXDB_DATABASE",
                "CONF_PATH",
                "API_TOKEN",
                "WORKERS",
            ]
        );
        assert_eq!(exports[0].1, "True");
        assert_eq!(exports[7].1, "6379");
        // literal, not yet expanded
        assert_eq!(exports[17].1, "$HOME/conf");
    }

    #[test]
    fn empty_profile_exports_nothing() {
        let profile = LaunchProfile::from_toml_str("").unwrap();
        assert!(profile.exports().is_empty());

        let mut env = Environment::empty("/");
        assert!(profile.apply(&mut env).unwrap().is_empty());
        assert!(env.vars.is_empty());
    }

    #[test]
    fn debug_false_is_rendered() {
        let profile = LaunchProfile::from_toml_str("debug = false").unwrap();
        assert_eq!(profile.exports(), vec![("DEBUG".to_string(), "False".to_string())]);
    }

    #[test]
    fn rejects_bad_port() {
        let err = LaunchProfile::from_toml_str("[redis]\nip = \"x\"\nport = 70000\n");
        assert!(err.is_err());
        let err = LaunchProfile::from_toml_str("[redis]\nip = \"x\"\nport = \"6379\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(LaunchProfile::from_toml_str("debgu = true").is_err());
        assert!(LaunchProfile::from_toml_str("[pika]\nip = \"x\"\nport = 1\nhost = \"y\"\n").is_err());
    }

    #[test]
    fn rejects_incomplete_section() {
        assert!(LaunchProfile::from_toml_str("[database]\nuser = \"u\"\n").is_err());
    }

    #[test]
    fn apply_expands_against_environment() {
        let profile = LaunchProfile::from_toml_str(FULL).unwrap();
        let mut env = Environment::empty("/");
        env.set_var("HOME", "/home/crawler");

        profile.apply(&mut env).unwrap();

        assert_eq!(env.get_var("CONF_PATH"), Some("/home/crawler/conf"));
        assert_eq!(env.get_var("DB_PASSWORD"), Some("hunter2"));
        assert_eq!(env.get_var("RABBITMQ_PORT"), Some("5672"));
        assert_eq!(env.get_var("HOME"), Some("/home/crawler"));
    }

    #[test]
    fn later_values_see_earlier_exports() {
        let raw = "[database]\nuser = \"u\"\npassword = \"p\"\nhost = \"db\"\nname = \"n\"\n\n[extra]\nDSN = \"${DB_USER}@${DB_HOST}/${DB_NAME}\"\n";
        let profile = LaunchProfile::from_toml_str(raw).unwrap();
        let mut env = Environment::empty("/");
        profile.apply(&mut env).unwrap();
        assert_eq!(env.get_var("DSN"), Some("u@db/n"));
    }

    #[cfg(unix)]
    #[test]
    fn search_path_appends_after_inherited_value() {
        let profile = LaunchProfile::from_toml_str(FULL).unwrap();
        let mut env = Environment::empty("/");
        env.set_var("HOME", "/home/crawler");
        env.set_var("PYTHONPATH", "/usr/lib/site");

        let applied = profile.apply(&mut env).unwrap();

        assert_eq!(
            env.get_var("PYTHONPATH"),
            Some("/usr/lib/site:/srv/repos/a:/home/crawler/repos/b")
        );
        assert_eq!(applied.last().unwrap().0, "PYTHONPATH");
    }

    #[cfg(unix)]
    #[test]
    fn search_path_without_inherited_value() {
        let profile =
            LaunchProfile::from_toml_str("[interpreter]\nsearch_paths = [\"/a\", \"/b\"]\n").unwrap();
        let mut env = Environment::empty("/");
        env.set_var("PYTHONPATH", "");
        profile.apply(&mut env).unwrap();
        assert_eq!(env.get_var("PYTHONPATH"), Some("/a:/b"));
    }

    #[cfg(unix)]
    #[test]
    fn search_path_keeps_non_unicode_inherited_value() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let inherited = OsStr::from_bytes(b"/opt/caf\xe9").to_os_string();
        let mut env = Environment::from_vars_os(
            vec![(OsString::from("PYTHONPATH"), inherited)],
            "/",
        );
        let profile =
            LaunchProfile::from_toml_str("[interpreter]\nsearch_paths = [\"/srv/a\"]\n").unwrap();

        let applied = profile.apply(&mut env).unwrap();

        assert_eq!(
            env.get_var_os("PYTHONPATH"),
            Some(OsStr::from_bytes(b"/opt/caf\xe9:/srv/a"))
        );
        assert_eq!(applied, vec![("PYTHONPATH".to_string(), "/opt/caf\u{fffd}:/srv/a".to_string())]);
    }

    #[test]
    fn empty_search_paths_leave_variable_alone() {
        let profile = LaunchProfile::from_toml_str("[interpreter]\nprogram = \"python\"\n").unwrap();
        let mut env = Environment::empty("/");
        env.set_var("PYTHONPATH", "/keep");
        profile.apply(&mut env).unwrap();
        assert_eq!(env.get_var("PYTHONPATH"), Some("/keep"));
    }

    #[test]
    fn custom_search_path_variable() {
        let profile = LaunchProfile::from_toml_str(
            "[interpreter]\nprogram = \"ruby\"\nsearch_path_var = \"RUBYLIB\"\nsearch_paths = [\"/lib/ruby\"]\n",
        )
        .unwrap();
        let mut env = Environment::empty("/");
        profile.apply(&mut env).unwrap();
        assert_eq!(env.get_var("RUBYLIB"), Some("/lib/ruby"));
        assert_eq!(env.get_var("PYTHONPATH"), None);
    }

    #[test]
    fn search_path_entry_with_separator_is_rejected() {
        let raw = format!(
            "[interpreter]\nsearch_paths = [\"/a{}/b\"]\n",
            SEARCH_PATH_SEPARATOR
        );
        let profile = LaunchProfile::from_toml_str(&raw).unwrap();
        let mut env = Environment::empty("/");
        let err = profile.apply(&mut env).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidSearchPath { .. }));
    }

    #[test]
    fn working_dir_is_expanded() {
        let profile =
            LaunchProfile::from_toml_str("[interpreter]\nworking_dir = \"$HOME/app\"\n").unwrap();
        let mut env = Environment::empty("/");
        env.set_var("HOME", "/home/crawler");
        profile.apply(&mut env).unwrap();
        assert_eq!(env.current_dir, PathBuf::from("/home/crawler/app"));
    }

    #[test]
    fn secrets_are_masked() {
        assert!(is_secret("DB_PASSWORD"));
        assert!(is_secret("RABBITMQ_PASSWORD"));
        assert!(is_secret("SECRET_KEY"));
        assert!(is_secret("api_token"));
        assert!(!is_secret("DB_USER"));
        assert_eq!(masked("SECRET_KEY", "abc"), MASK);
        assert_eq!(masked("DB_HOST", "db"), "db");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LaunchProfile::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, LaunchError::ProfileNotFound { .. }));
    }

    #[test]
    fn load_reports_parse_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[redis]\nport = \"nope\"\n").unwrap();
        let err = LaunchProfile::load(&path).unwrap_err();
        match err {
            LaunchError::ProfileParse { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn example_profile_parses() {
        let profile =
            LaunchProfile::from_toml_str(include_str!("../launcher.example.toml")).unwrap();
        assert_eq!(profile.exports().len(), 18);
        assert_eq!(profile.interpreter.search_paths.len(), 2);
    }

    #[test]
    fn load_reads_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher.toml");
        std::fs::write(&path, FULL).unwrap();
        let profile = LaunchProfile::load(&path).unwrap();
        assert_eq!(profile.database.unwrap().name, "crawl");
    }
}
