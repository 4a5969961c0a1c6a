//! Appraisal order intake automation
//!
//! Drives the remote order intake form end to end: open a session, populate
//! the ordered chain of form fields, then resolve the lender fee the form
//! renders. Every run yields one [`RunReport`].

use std::sync::Arc;

pub mod artifacts;
pub mod config;
pub mod duration_parser;
pub mod errors;
pub mod fee;
pub mod form;
pub mod locator;
pub mod mapping;
pub mod pipeline;
pub mod platforms;
pub mod report;
pub mod selector;
pub mod session;

pub use config::{Credentials, RunConfig};
pub use errors::{AutomationError, ConfigError, ExtractionError, FieldError, SessionError};
pub use fee::{FeeExtractionResult, FeeResolver, Strategy};
pub use form::{ControlKind, FieldStep, FormDefinition};
pub use locator::Locator;
pub use mapping::{map_value, MappedValue, MappingId, MappingSource};
pub use pipeline::{FieldOutcome, FieldPipeline, FieldStatus};
pub use platforms::{ChromeLauncher, DocumentEngine, EngineLauncher, TextChannel};
pub use report::{OutcomeCounts, RunReport, RunStatus};
pub use selector::Selector;
pub use session::SessionController;

/// Run the appraisal order form once in a browser configured from `config`.
pub async fn run_order(config: &RunConfig) -> RunReport {
    let launcher = Arc::new(ChromeLauncher::new(config.browser_options()));
    SessionController::new(launcher, FormDefinition::appraisal_order())
        .run(config)
        .await
}
