pub mod refresh;
pub mod session;
pub mod submission;
pub mod timer;

pub use crate::domain::model::{Credentials, Outcome, SharedCredentials, Submitted, TaskRequest};
pub use crate::domain::ports::{AutoSubmitListener, CredentialStore};
pub use crate::utils::error::{Result, SubmitError};
