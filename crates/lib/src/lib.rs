//! packsmith-lib: profile execution for content-pack projects
//!
//! This crate runs a project's build profiles:
//! - `Profile`: the ordered preShell, filter and postShell steps of a build
//! - `Engine`: runs a profile step by step, carrying the environment between
//!   shell steps, and exports the packs
//! - `ShellRunner`: runs one command in the host shell and captures the
//!   environment it leaves behind
//! - `export`: copies pack directories under the build root with stable names

pub mod cancel;
pub mod engine;
pub mod env;
pub mod export;
pub mod filter;
pub mod platform;
pub mod profile;
pub mod project;
pub mod shell;
pub mod util;

pub use cancel::CancelToken;
pub use engine::{Engine, EngineConfig, RunError, RunReport, RunState};
pub use env::Environment;
pub use profile::{Phase, Profile};
