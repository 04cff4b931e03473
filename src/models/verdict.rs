use rust_decimal::Decimal;
use serde::Serialize;

/// A fully validated expense read out of free text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseCandidate {
    pub category: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
    pub description: String,
}

/// Outcome of interpreting one chat message. `Rejected` is a normal
/// answer ("this is not an expense"), not a failure.
#[derive(Clone, Debug, PartialEq)]
pub enum InterpretationVerdict {
    Expense(ExpenseCandidate),
    Rejected { reason: String },
}

impl InterpretationVerdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        InterpretationVerdict::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, InterpretationVerdict::Expense(_))
    }
}
