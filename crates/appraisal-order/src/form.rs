//! Declarative description of the order intake form.
//!
//! Steps are listed in the order the remote form renders them: later controls
//! may only appear once earlier selections have been applied.

use crate::mapping::MappingId;
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);
const SELECT_SETTLE: Duration = Duration::from_millis(500);
const TEXT_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Free text entry
    Text,
    /// Categorical `<select>`
    Select,
}

/// One unit of work in the pipeline: a control and how to derive its value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStep {
    pub id: String,
    /// Config keys consulted in order; the first present one wins.
    pub keys: Vec<String>,
    pub selector: Selector,
    pub kind: ControlKind,
    pub mapping: Option<MappingId>,
    pub timeout: Duration,
    pub required: bool,
    /// Pause after applying, for the remote form to re-render dependents.
    pub settle: Duration,
}

impl FieldStep {
    fn new(id: &str, selector: &str, kind: ControlKind, settle: Duration) -> Self {
        Self {
            id: id.to_string(),
            keys: vec![id.to_string()],
            selector: Selector::from(selector),
            kind,
            mapping: None,
            timeout: DEFAULT_STEP_TIMEOUT,
            required: false,
            settle,
        }
    }

    pub fn text(id: &str, selector: &str) -> Self {
        Self::new(id, selector, ControlKind::Text, TEXT_SETTLE)
    }

    pub fn select(id: &str, selector: &str) -> Self {
        Self::new(id, selector, ControlKind::Select, SELECT_SETTLE)
    }

    /// Additional config keys accepted for this step, after the id itself.
    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.keys.extend(aliases.iter().map(|a| a.to_string()));
        self
    }

    pub fn mapped(mut self, mapping: MappingId) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginControls {
    pub username: Selector,
    pub password: Selector,
    pub submit: Selector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormDefinition {
    pub login: LoginControls,
    /// Dashboard control that opens a blank order, when login lands there.
    pub new_order: Option<Selector>,
    /// Control whose presence means the order form is usable.
    pub form_ready: Selector,
    pub fee_display: Selector,
    pub steps: Vec<FieldStep>,
}

impl FormDefinition {
    /// The appraisal order intake form.
    pub fn appraisal_order() -> Self {
        Self {
            login: LoginControls {
                username: Selector::from("#ctl00_cphBody_Login1_UserName"),
                password: Selector::from("#ctl00_cphBody_Login1_Password"),
                submit: Selector::from("#ctl00_cphBody_Login1_LoginButton"),
            },
            new_order: Some(Selector::from("#ctl00_cphBody_btnAddAppraisal")),
            form_ready: Selector::from("#ctl00_cphBody_drpTransactionType"),
            fee_display: Selector::from("#ctl00_cphBody_lblLenderAppraisalFee"),
            steps: vec![
                FieldStep::select("transaction_type", "#ctl00_cphBody_drpTransactionType")
                    .aliases(&["transactionType"])
                    .mapped(MappingId::TransactionType)
                    .required(),
                FieldStep::select("loan_type", "#ctl00_cphBody_drpLoanType")
                    .aliases(&["loanType"])
                    .mapped(MappingId::LoanType),
                FieldStep::text("loan_number", "#ctl00_cphBody_txtLoanNumber")
                    .aliases(&["loanNumber"]),
                FieldStep::text("borrower", "#ctl00_cphBody_txtBorrowerName")
                    .aliases(&["borrower_name", "borrowerName"]),
                FieldStep::select("property_type", "#ctl00_cphBody_drpPropertyType")
                    .aliases(&["propertyType"])
                    .mapped(MappingId::PropertyType)
                    .required(),
                FieldStep::text("property_address", "#ctl00_cphBody_txtPropertyAddress")
                    .aliases(&["propertyAddress", "address"]),
                FieldStep::text("property_city", "#ctl00_cphBody_txtPropertyCity")
                    .aliases(&["propertyCity", "city"]),
                FieldStep::select("property_state", "#ctl00_cphBody_drpPropertyState")
                    .aliases(&["propertyState", "state"])
                    .mapped(MappingId::PropertyState),
                // Zip drives the fee lookup on the remote side; give it longer to settle.
                FieldStep::text("property_zip", "#ctl00_cphBody_txtPropertyZip")
                    .aliases(&["propertyZip", "zip"])
                    .required()
                    .settle(Duration::from_secs(1)),
                FieldStep::select("occupancy_type", "#ctl00_cphBody_drpOccupiedBy")
                    .aliases(&["occupancyType", "occupancy"])
                    .mapped(MappingId::Occupancy),
                FieldStep::select("contact_person", "#ctl00_cphBody_drpAppointmentContact")
                    .aliases(&["contactPerson"])
                    .mapped(MappingId::AppointmentContact),
                FieldStep::text("access_instructions", "#ctl00_cphBody_txtAccessInformation")
                    .aliases(&["other_access_instructions", "accessInstructions"]),
                FieldStep::text("agent_name", "#ctl00_cphBody_txtAgentName")
                    .aliases(&["agentName"]),
                // Product codes are catalog ids supplied by the caller.
                FieldStep::select("product", "#ctl00_cphBody_drpAppraisalType")
                    .aliases(&["appraisal_type", "appraisalType"])
                    .required()
                    .settle(Duration::from_secs(1)),
                FieldStep::text("date_needed", "#ctl00_cphBody_txtDateNeeded")
                    .aliases(&["date_appraisal_needed", "dateNeeded"]),
            ],
        }
    }

    pub fn step(&self, id: &str) -> Option<&FieldStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Keep only the named steps, in canonical order regardless of `ids` order.
    pub fn subset(&self, ids: &[&str]) -> Self {
        Self {
            steps: self
                .steps
                .iter()
                .filter(|s| ids.contains(&s.id.as_str()))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// Override every step's control-appearance timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        for step in &mut self.steps {
            step.timeout = timeout;
        }
        self
    }

    /// Override every step's settle delay.
    pub fn with_step_settle(mut self, settle: Duration) -> Self {
        for step in &mut self.steps {
            step.settle = settle;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ids_are_unique() {
        let form = FormDefinition::appraisal_order();
        let mut ids: Vec<_> = form.steps.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), form.steps.len());
    }

    #[test]
    fn test_transaction_type_comes_first() {
        let form = FormDefinition::appraisal_order();
        assert_eq!(form.steps[0].id, "transaction_type");
        assert_eq!(form.steps[0].selector, form.form_ready);
    }

    #[test]
    fn test_select_steps_with_mapping() {
        let form = FormDefinition::appraisal_order();
        for step in &form.steps {
            if step.mapping.is_some() {
                assert_eq!(step.kind, ControlKind::Select, "{}", step.id);
            }
        }
        assert!(form.step("product").unwrap().mapping.is_none());
    }

    #[test]
    fn test_subset_keeps_canonical_order() {
        let form = FormDefinition::appraisal_order();
        let subset = form.subset(&["occupancy_type", "property_zip", "transaction_type"]);
        let ids: Vec<_> = subset.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["transaction_type", "property_zip", "occupancy_type"]);
        assert_eq!(subset.fee_display, form.fee_display);
    }

    #[test]
    fn test_camel_case_aliases() {
        let form = FormDefinition::appraisal_order();
        assert!(form.step("loan_number").unwrap().keys.contains(&"loanNumber".to_string()));
        assert!(form.step("property_zip").unwrap().keys.contains(&"zip".to_string()));
        assert_eq!(form.step("occupancy_type").unwrap().keys[0], "occupancy_type");
    }

    #[test]
    fn test_with_step_timeout_applies_to_all() {
        let form = FormDefinition::appraisal_order().with_step_timeout(Duration::from_secs(2));
        assert!(form.steps.iter().all(|s| s.timeout == Duration::from_secs(2)));
    }

    #[test]
    fn test_settle_defaults_and_override() {
        let form = FormDefinition::appraisal_order();
        assert_eq!(form.step("loan_type").unwrap().settle, SELECT_SETTLE);
        assert_eq!(form.step("borrower").unwrap().settle, TEXT_SETTLE);
        assert_eq!(form.step("property_zip").unwrap().settle, Duration::from_secs(1));

        let form = form.with_step_settle(Duration::ZERO);
        assert!(form.steps.iter().all(|s| s.settle.is_zero()));
    }
}
