pub mod core;
pub mod services;
pub mod utils;

pub use crate::core::config::Config;
pub use crate::core::error::{WizardError, WizardResult};
pub use crate::services::wizard::{Outcome, WizardController};
