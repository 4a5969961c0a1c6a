use crate::config::RunConfig;
use crate::errors::{AutomationError, FieldError};
use crate::form::{ControlKind, FieldStep};
use crate::locator::Locator;
use crate::mapping::{map_value, MappingSource};
use crate::platforms::DocumentEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Filled,
    Skipped,
    Failed,
}

/// What happened to one step. Exactly one per step, in step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub step_id: String,
    pub status: FieldStatus,
    /// The text or option code written to the control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_source: Option<MappingSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldOutcome {
    fn skipped(step: &FieldStep) -> Self {
        Self {
            step_id: step.id.clone(),
            status: FieldStatus::Skipped,
            value: None,
            mapping_source: None,
            error: None,
            required: step.required,
        }
    }

    fn failed(step: &FieldStep, error: FieldError) -> Self {
        Self {
            step_id: step.id.clone(),
            status: FieldStatus::Failed,
            value: None,
            mapping_source: None,
            error: Some(error.to_string()),
            required: step.required,
        }
    }

    fn filled(step: &FieldStep, value: String, mapping_source: Option<MappingSource>) -> Self {
        Self {
            step_id: step.id.clone(),
            status: FieldStatus::Filled,
            value: Some(value),
            mapping_source,
            error: None,
            required: step.required,
        }
    }
}

/// Runs field steps strictly in order against one document.
pub struct FieldPipeline {
    engine: Arc<dyn DocumentEngine>,
    steps: Vec<FieldStep>,
}

impl FieldPipeline {
    pub fn new(engine: Arc<dyn DocumentEngine>, steps: Vec<FieldStep>) -> Self {
        Self { engine, steps }
    }

    /// Execute every step, collecting outcomes.
    pub async fn execute(&self, config: &RunConfig) -> Vec<FieldOutcome> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        self.execute_into(config, &mut outcomes).await;
        outcomes
    }

    /// Execute every step, appending each outcome to `outcomes` as soon as it
    /// is known. Outcomes already pushed survive if this future is dropped.
    #[instrument(level = "info", skip_all, fields(steps = self.steps.len()))]
    pub async fn execute_into(&self, config: &RunConfig, outcomes: &mut Vec<FieldOutcome>) {
        for step in &self.steps {
            let started = Instant::now();
            let outcome = self.execute_step(step, config).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match outcome.status {
                FieldStatus::Failed => warn!(
                    step = %step.id,
                    elapsed_ms,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "Step failed"
                ),
                status => info!(step = %step.id, ?status, elapsed_ms, "Step finished"),
            }
            outcomes.push(outcome);
        }
    }

    /// One step. Never returns an error: every failure becomes the outcome.
    pub async fn execute_step(&self, step: &FieldStep, config: &RunConfig) -> FieldOutcome {
        let value = match config.value_for(step.keys.as_slice()) {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => {
                debug!(step = %step.id, "No value configured, skipping");
                return FieldOutcome::skipped(step);
            }
        };

        let locator =
            Locator::new(self.engine.clone(), step.selector.clone()).set_default_timeout(step.timeout);
        if let Err(source) = locator.wait(None).await {
            return FieldOutcome::failed(
                step,
                FieldError::ControlMissing {
                    selector: step.selector.to_string(),
                    source,
                },
            );
        }

        let (applied, mapping_source) = match step.mapping {
            Some(id) => {
                let mapped = map_value(id, &value);
                (mapped.code, Some(mapped.source))
            }
            None => (value.clone(), None),
        };

        let result = match step.kind {
            ControlKind::Text => locator.fill(&applied).await,
            ControlKind::Select => locator.select_option(&applied).await,
        };
        if let Err(source) = result {
            let error = match (source, step.mapping) {
                (AutomationError::OptionNotAvailable(_), Some(mapping)) => {
                    FieldError::MappingUnresolved {
                        mapping: mapping.to_string(),
                        value,
                    }
                }
                (source, _) => FieldError::ApplyFailed {
                    selector: step.selector.to_string(),
                    source,
                },
            };
            return FieldOutcome::failed(step, error);
        }

        if !step.settle.is_zero() {
            tokio::time::sleep(step.settle).await;
        }
        // Selections may post back and re-render the form.
        if step.kind == ControlKind::Select {
            if let Err(e) = self.engine.wait_until_ready(step.timeout).await {
                debug!(step = %step.id, "Document did not settle after selection: {}", e);
            }
        }

        FieldOutcome::filled(step, applied, mapping_source)
    }
}
