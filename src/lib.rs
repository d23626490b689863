pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;
pub use config::toml_config::AppConfig;

pub use adapters::storage::{FileCredentialStore, MemoryCredentialStore};
pub use core::{
    refresh::TokenRefresher,
    session::{QuickAddSession, SessionOptions},
    submission::SubmissionController,
    timer::{AutoSubmitTimer, CountdownSchedule, TimerState},
};
pub use domain::model::{Credentials, Outcome, Submitted, TaskRequest};
pub use domain::ports::{AutoSubmitListener, CredentialStore, NoopListener};
pub use utils::error::{QuickAddError, Result, SubmitError};
