use anyhow::{Context, Result};
use argh::FromArgs;
use env_launcher::command::ExitCode;
use env_launcher::external::{DryRun, Exec, Spawn};
use env_launcher::profile::masked;
use env_launcher::{LaunchProfile, Launcher};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROFILE_ENV: &str = "ENV_LAUNCHER_PROFILE";
const DEFAULT_PROFILE: &str = "launcher.toml";

#[derive(FromArgs, Debug)]
/// export the variables of a launch profile, then hand the remaining arguments to its interpreter
struct Args {
    #[argh(option, short = 'p')]
    /// profile to load. Defaults to $ENV_LAUNCHER_PROFILE, then ./launcher.toml
    profile: Option<PathBuf>,

    #[argh(switch)]
    /// print the exported variables, secrets masked, and exit.
    print_env: bool,

    #[argh(switch)]
    /// print what would be executed as a shell script, and exit.
    dry_run: bool,

    #[argh(switch)]
    /// run the interpreter as a child and wait for it instead of replacing this process.
    wait: bool,

    #[argh(positional, greedy)]
    /// arguments forwarded verbatim to the interpreter. Use `--` before ones starting with `-`.
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "env_launcher=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Args = argh::from_env();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let path = profile_path(args.profile, std::env::var_os(PROFILE_ENV).map(PathBuf::from));
    let profile = LaunchProfile::load(&path)?;
    info!(profile = %path.display(), "profile loaded");

    let launcher = Launcher::from_process(profile);
    info!(interpreter = %launcher.profile().interpreter.program, args = args.args.len(), "launching");

    if args.print_env {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for (name, value) in launcher.exports()? {
            writeln!(out, "{}={}", name, masked(&name, &value)).context("writing to stdout")?;
        }
        return Ok(0);
    }

    if args.dry_run {
        launcher.run(args.args, Box::new(DryRun::new(std::io::stdout().lock())))
    } else if args.wait {
        launcher.run(args.args, Box::new(Spawn))
    } else {
        launcher.run(args.args, Box::new(Exec))
    }
}

/// Explicit flag first, then the environment variable, then the working directory.
fn profile_path(explicit: Option<PathBuf>, from_env: Option<PathBuf>) -> PathBuf {
    explicit
        .or(from_env.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE))
}
