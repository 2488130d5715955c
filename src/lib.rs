//! A launcher that prepares a process environment and delegates to an interpreter.
//!
//! A [`LaunchProfile`] names the values to export (database credentials, queue and
//! cache endpoints, a metrics sink, a secret key, a configuration directory) and
//! the search path entries to add for the interpreter. [`Launcher`] applies the
//! profile on top of the inherited [`Environment`](env::Environment), resolves the
//! interpreter and hands the invocation to a [`Delegation`](command::Delegation):
//! replace the current process, spawn and wait, or just describe it.
//!
//! The launcher never interprets the values beyond rendering them as strings, and
//! forwards its own positional arguments to the interpreter unmodified.

pub mod command;
pub mod env;
pub mod error;
pub mod expand;
pub mod external;
mod launcher;
pub mod profile;

pub use error::LaunchError;
pub use launcher::Launcher;
pub use profile::LaunchProfile;
