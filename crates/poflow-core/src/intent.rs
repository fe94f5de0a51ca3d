use std::fmt;

use serde::{Deserialize, Serialize};

pub const LABEL_NEW_PO: &str = "po process/new purchase order";
pub const LABEL_REFERENCE_PO: &str = "reference po";
pub const LABEL_PO_CHANGE: &str = "PO Change";
pub const LABEL_PO_CANCELLATION: &str = "PO Cancellation";
pub const LABEL_OTHER: &str = "other";

/// Classified purpose of an inbound email. Configured labels outside the
/// built-ins are carried verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    NewPo,
    ReferencePo,
    PoChange,
    PoCancellation,
    Other,
    Custom(String),
}

impl Intent {
    pub fn label(&self) -> &str {
        match self {
            Intent::NewPo => LABEL_NEW_PO,
            Intent::ReferencePo => LABEL_REFERENCE_PO,
            Intent::PoChange => LABEL_PO_CHANGE,
            Intent::PoCancellation => LABEL_PO_CANCELLATION,
            Intent::Other => LABEL_OTHER,
            Intent::Custom(label) => label,
        }
    }

    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        [
            Intent::NewPo,
            Intent::ReferencePo,
            Intent::PoChange,
            Intent::PoCancellation,
            Intent::Other,
        ]
        .into_iter()
        .find(|i| i.label().eq_ignore_ascii_case(trimmed))
        .unwrap_or_else(|| Intent::Custom(trimmed.to_string()))
    }

    /// Emails with this intent go through extraction and reconciliation.
    /// `Other` is included so an unlabelled order email is still looked at.
    pub fn is_order(&self) -> bool {
        matches!(self, Intent::NewPo | Intent::ReferencePo | Intent::Other)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for Intent {
    fn from(label: String) -> Self {
        Intent::from_label(&label)
    }
}

impl From<Intent> for String {
    fn from(intent: Intent) -> Self {
        intent.label().to_string()
    }
}
