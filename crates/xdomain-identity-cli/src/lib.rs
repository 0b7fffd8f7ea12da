//! xdomain CLI — plays the browser for cross-domain identity propagation.

pub mod browser;
pub mod config;
pub mod error;
pub mod pages;
pub mod profile;

pub use browser::{Browser, ClickReport, Hop, PageVisit, MAX_JOURNEY_HOPS};
pub use config::{load_config, resolve_profile_dir};
pub use error::{CliError, CliResult};
pub use profile::BrowserProfile;
