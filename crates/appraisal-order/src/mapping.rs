//! Label → internal code tables for the order form's categorical fields.
//!
//! The remote catalog drifts (options get renamed or added), so a lookup never
//! fails: unknown labels resolve to a per-field default. Callers that already
//! hold internal codes can pass them straight through.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingId {
    TransactionType,
    LoanType,
    PropertyType,
    PropertyState,
    Occupancy,
    AppointmentContact,
}

impl MappingId {
    pub const ALL: [MappingId; 6] = [
        MappingId::TransactionType,
        MappingId::LoanType,
        MappingId::PropertyType,
        MappingId::PropertyState,
        MappingId::Occupancy,
        MappingId::AppointmentContact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingId::TransactionType => "transaction_type",
            MappingId::LoanType => "loan_type",
            MappingId::PropertyType => "property_type",
            MappingId::PropertyState => "property_state",
            MappingId::Occupancy => "occupancy",
            MappingId::AppointmentContact => "appointment_contact",
        }
    }
}

impl std::fmt::Display for MappingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a value was turned into the code that got applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// Matched a human-readable label
    Label,
    /// Was already one of the table's codes
    Code,
    /// Numeric identifier not in the table, forwarded unchanged
    PassThrough,
    /// Unrecognized; the field's default code was used
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedValue {
    pub code: String,
    pub source: MappingSource,
}

#[derive(Debug)]
pub struct CategoricalMapping {
    pub field: MappingId,
    pub entries: &'static [(&'static str, &'static str)],
    pub default_code: &'static str,
}

impl CategoricalMapping {
    pub fn lookup(&self, value: &str) -> MappedValue {
        let trimmed = value.trim();
        let wanted = normalize_label(trimmed);

        if let Some((_, code)) = self
            .entries
            .iter()
            .find(|(label, _)| normalize_label(label) == wanted)
        {
            return MappedValue {
                code: (*code).to_string(),
                source: MappingSource::Label,
            };
        }

        if let Some((_, code)) = self
            .entries
            .iter()
            .find(|(_, code)| code.eq_ignore_ascii_case(trimmed))
        {
            return MappedValue {
                code: (*code).to_string(),
                source: MappingSource::Code,
            };
        }

        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return MappedValue {
                code: trimmed.to_string(),
                source: MappingSource::PassThrough,
            };
        }

        warn!(
            mapping = %self.field,
            value = %trimmed,
            default = self.default_code,
            "Unrecognized label, using default code"
        );
        MappedValue {
            code: self.default_code.to_string(),
            source: MappingSource::Default,
        }
    }
}

fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const TRANSACTION_TYPES: &[(&str, &str)] = &[
    ("Acquisition", "27"),
    ("Construction", "23"),
    ("FHA", "21"),
    ("HELOC", "34"),
    ("Home Equity Line of Credit", "18"),
    ("Investment Property", "9"),
    ("List Price Determination", "17"),
    ("Market Value", "15"),
    ("Market Value for Lender Purposes", "19"),
    ("Other", "14"),
    ("Purchase", "1"),
    ("Refinance", "2"),
    ("Reverse Mortgage", "16"),
    ("Second Mortgage", "24"),
];

const LOAN_TYPES: &[(&str, &str)] = &[
    ("Conventional", "1"),
    ("ConvInsured", "15"),
    ("FHA", "3"),
    ("FHA 203K", "12"),
    ("HARP 2", "7"),
    ("Home Equity", "8"),
    ("Home Ownership Accelerator", "9"),
    ("Homestyle Renovation", "13"),
    ("Jumbo", "10"),
    ("List Price Determination", "6"),
    ("Non QM", "16"),
    ("Non-Conforming", "18"),
    ("Other (please specify)", "5"),
    ("Prime Jumbo", "17"),
    ("Public And Indian Housing", "14"),
    ("Reverse Mortgage", "11"),
    ("USDA / Rural Housing Service", "4"),
    ("VA", "2"),
];

const PROPERTY_TYPES: &[(&str, &str)] = &[
    ("Attached", "2"),
    ("Co-Operative (Co-Op)", "5"),
    ("Commercial Condo", "19"),
    ("Commercial/Non-residential", "15"),
    ("Condominium", "3"),
    ("Detached", "1"),
    ("Detached Condo", "8"),
    ("High-rise Condo", "6"),
    ("Land", "16"),
    ("Manufactured Home", "7"),
    ("Manufactured Home: Condo/PUD/Co-Op", "9"),
    ("MH Select", "10"),
    ("Mixed Use", "11"),
    ("Mobile Home", "18"),
    ("Multi Family - 2 Family", "12"),
    ("Multi Family - 3 Family", "20"),
    ("Multi Family - 4 Family", "21"),
    ("Planned Unit Development (PUD)", "4"),
    ("Rural", "14"),
    ("Single Family Residential", "13"),
    ("Townhome", "17"),
];

const STATES: &[(&str, &str)] = &[
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("District of Columbia", "DC"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
];

// The remote select uses the option text as its value.
const OCCUPANCY: &[(&str, &str)] = &[
    ("Investment", "Investment"),
    ("Owner", "Owner"),
    ("Owner Occupied", "Owner"),
    ("Primary Residence", "Primaryresidence"),
    ("Secondary Residence", "Secondaryresidence"),
    ("Second Home", "Secondaryresidence"),
    ("Tenant", "Tenant"),
    ("Vacant", "Vacant"),
];

const APPOINTMENT_CONTACTS: &[(&str, &str)] = &[
    ("Borrower", "borrower"),
    ("Agent", "agent"),
    ("Other", "other"),
];

static REGISTRY: Lazy<HashMap<MappingId, CategoricalMapping>> = Lazy::new(|| {
    [
        CategoricalMapping {
            field: MappingId::TransactionType,
            entries: TRANSACTION_TYPES,
            default_code: "1",
        },
        CategoricalMapping {
            field: MappingId::LoanType,
            entries: LOAN_TYPES,
            default_code: "5",
        },
        CategoricalMapping {
            field: MappingId::PropertyType,
            entries: PROPERTY_TYPES,
            default_code: "13",
        },
        CategoricalMapping {
            field: MappingId::PropertyState,
            entries: STATES,
            default_code: "NJ",
        },
        CategoricalMapping {
            field: MappingId::Occupancy,
            entries: OCCUPANCY,
            default_code: "Investment",
        },
        CategoricalMapping {
            field: MappingId::AppointmentContact,
            entries: APPOINTMENT_CONTACTS,
            default_code: "agent",
        },
    ]
    .into_iter()
    .map(|m| (m.field, m))
    .collect()
});

/// The registered table for `id`.
pub fn mapping(id: MappingId) -> &'static CategoricalMapping {
    // Every MappingId variant is registered above.
    &REGISTRY[&id]
}

/// Translate a caller-supplied value into the code the remote form expects.
pub fn map_value(id: MappingId, value: &str) -> MappedValue {
    mapping(id).lookup(value)
}
