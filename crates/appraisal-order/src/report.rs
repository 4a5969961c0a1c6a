use crate::artifacts::Artifact;
use crate::errors::{ExtractionError, SessionError};
use crate::fee::FeeExtractionResult;
use crate::pipeline::{FieldOutcome, FieldStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Fee resolved
    Success,
    /// Pipeline completed, fee unresolved
    Partial,
    /// Session could not be established, or the run timed out
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub filled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn tally(outcomes: &[FieldOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut counts, o| {
            match o.status {
                FieldStatus::Filled => counts.filled += 1,
                FieldStatus::Skipped => counts.skipped += 1,
                FieldStatus::Failed => counts.failed += 1,
            }
            counts
        })
    }
}

/// The single object a run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: Uuid,
    pub status: RunStatus,
    /// Normalized fee, when resolved.
    pub fee: Option<String>,
    pub fee_result: Option<FeeExtractionResult>,
    pub fields: Vec<FieldOutcome>,
    pub counts: OutcomeCounts,
    /// Required steps that did not end up filled.
    pub missing_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Process exit status for supervisors: only `error` is a failure.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success | RunStatus::Partial => 0,
            RunStatus::Error => 1,
        }
    }

    pub fn outcome(&self, step_id: &str) -> Option<&FieldOutcome> {
        self.fields.iter().find(|o| o.step_id == step_id)
    }
}

/// Everything collected during a run, turned into a [`RunReport`] at the end.
#[derive(Debug)]
pub struct RunRecord {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<FieldOutcome>,
    /// `None` when the resolver never ran.
    pub fee: Option<Result<FeeExtractionResult, ExtractionError>>,
    pub session_error: Option<SessionError>,
    pub artifacts: Vec<Artifact>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecord {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            fee: None,
            session_error: None,
            artifacts: Vec::new(),
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.session_error.is_some() {
            RunStatus::Error
        } else if matches!(self.fee, Some(Ok(_))) {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }

    pub fn finish(self) -> RunReport {
        let status = self.status();
        let finished_at = Utc::now();
        let duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;

        let (fee_result, fee_error) = match self.fee {
            Some(Ok(result)) => (Some(result), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };
        let missing_required = self
            .outcomes
            .iter()
            .filter(|o| o.required && o.status != FieldStatus::Filled)
            .map(|o| o.step_id.clone())
            .collect();

        RunReport {
            session_id: self.session_id,
            status,
            fee: fee_result.as_ref().and_then(|r| r.normalized.clone()),
            fee_result,
            counts: OutcomeCounts::tally(&self.outcomes),
            fields: self.outcomes,
            missing_required,
            error: self.session_error.map(|e| e.to_string()),
            fee_error,
            artifacts: self.artifacts,
            started_at: self.started_at,
            finished_at,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::Strategy;

    fn outcome(id: &str, status: FieldStatus, required: bool) -> FieldOutcome {
        FieldOutcome {
            step_id: id.to_string(),
            status,
            value: None,
            mapping_source: None,
            error: None,
            required,
        }
    }

    fn resolved() -> FeeExtractionResult {
        FeeExtractionResult {
            strategy: Strategy::S1,
            raw: "\"42\"".to_string(),
            normalized: Some("$42".to_string()),
        }
    }

    #[test]
    fn test_status_success_when_fee_resolved() {
        let mut record = RunRecord::new();
        record.outcomes.push(outcome("zip", FieldStatus::Failed, false));
        record.fee = Some(Ok(resolved()));
        let report = record.finish();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.fee.as_deref(), Some("$42"));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_status_partial_when_fee_unresolved() {
        let mut record = RunRecord::new();
        record.fee = Some(Err(ExtractionError::NoStrategyMatched));
        let report = record.finish();
        assert_eq!(report.status, RunStatus::Partial);
        assert!(report.fee.is_none());
        assert!(report.fee_error.is_some());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_status_error_on_session_error() {
        let mut record = RunRecord::new();
        record.session_error = Some(SessionError::Authentication("rejected".into()));
        let report = record.finish();
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(report.exit_code(), 1);
        assert!(report.error.unwrap().contains("rejected"));
    }

    #[test]
    fn test_counts_and_missing_required() {
        let mut record = RunRecord::new();
        record.outcomes = vec![
            outcome("transaction_type", FieldStatus::Filled, true),
            outcome("loan_number", FieldStatus::Skipped, false),
            outcome("property_zip", FieldStatus::Skipped, true),
            outcome("product", FieldStatus::Failed, true),
        ];
        let report = record.finish();
        assert_eq!(
            report.counts,
            OutcomeCounts {
                filled: 1,
                skipped: 2,
                failed: 1
            }
        );
        assert_eq!(report.missing_required, ["property_zip", "product"]);
        assert_eq!(report.outcome("loan_number").unwrap().status, FieldStatus::Skipped);
    }

    #[test]
    fn test_report_json_shape() {
        let mut record = RunRecord::new();
        record.fee = Some(Ok(resolved()));
        let json = serde_json::to_value(record.finish()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["fee"], "$42");
        assert_eq!(json["fee_result"]["strategy"], "S1");
        assert!(json.get("error").is_none());
        assert!(json["started_at"].is_string());
    }
}
