use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::expenses::{positive_amount, MAX_DESCRIPTION};
use crate::models::verdict::{ExpenseCandidate, InterpretationVerdict};

pub mod gemini;

const UNREADABLE_RESPONSE: &str = "Sorry, I could not understand that message.";
const DEFAULT_REJECTION: &str = "That message does not look like an expense.";

#[derive(Debug, thiserror::Error)]
pub enum InterpretationError {
    #[error("interpretation service unavailable: {0}")]
    Unavailable(String),
}

/// Turns free chat text into an expense verdict. Implementations own all
/// validation of the upstream answer; callers trust the verdict as-is.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, text: &str) -> Result<InterpretationVerdict, InterpretationError>;
}

/// Normalizes raw model output into a verdict.
///
/// The output may wrap the JSON object in prose or markdown fences, use any
/// key casing, and send booleans or numbers as strings.
pub fn normalize_verdict(raw: &str) -> InterpretationVerdict {
    let fields = match extract_object(raw) {
        Some(fields) => fields,
        None => {
            log::warn!("Unparseable interpretation response: {}", raw);
            return InterpretationVerdict::rejected(UNREADABLE_RESPONSE);
        }
    };

    let valid = match fields.get("valid") {
        Some(Value::Bool(valid)) => *valid,
        Some(Value::String(flag)) if flag.trim().eq_ignore_ascii_case("true") => true,
        Some(Value::String(flag)) if flag.trim().eq_ignore_ascii_case("false") => false,
        _ => {
            log::warn!("Interpretation response without a usable `valid` flag: {}", raw);
            return InterpretationVerdict::rejected(UNREADABLE_RESPONSE);
        }
    };

    if !valid {
        let reason = match fields.get("reason") {
            Some(Value::String(reason)) if !reason.trim().is_empty() => reason.trim().to_string(),
            _ => DEFAULT_REJECTION.to_string(),
        };
        return InterpretationVerdict::Rejected { reason };
    }

    let amount = match fields.get("amount").and_then(positive_amount) {
        Some(amount) => amount,
        None => return InterpretationVerdict::rejected("The expense amount must be a positive number."),
    };

    let category = match fields.get("category") {
        Some(Value::String(category)) if !category.trim().is_empty() => category.trim().to_string(),
        _ => return InterpretationVerdict::rejected("The expense category is missing."),
    };

    let description = match fields.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(description)) => {
            let description: String = description.trim().chars().take(MAX_DESCRIPTION).collect();
            description.trim_end().to_string()
        }
        Some(_) => return InterpretationVerdict::rejected("The expense description must be text."),
    };

    InterpretationVerdict::Expense(ExpenseCandidate {
        category,
        amount,
        description,
    })
}

fn extract_object(raw: &str) -> Option<HashMap<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&raw[start..=end]).ok()? {
        Value::Object(object) => {
            let mut fields = HashMap::with_capacity(object.len());
            for (key, value) in object {
                fields.entry(key.to_lowercase()).or_insert(value);
            }
            Some(fields)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn expense(category: &str, amount: Decimal, description: &str) -> InterpretationVerdict {
        InterpretationVerdict::Expense(ExpenseCandidate {
            category: category.to_string(),
            amount,
            description: description.to_string(),
        })
    }

    #[test]
    fn accepts_well_formed_expense() {
        let verdict = normalize_verdict(
            r#"{"valid": true, "category": "Food", "amount": 25, "description": "groceries"}"#,
        );
        assert_eq!(verdict, expense("Food", Decimal::new(25, 0), "groceries"));
    }

    #[test]
    fn tolerates_fences_casing_and_stringly_values() {
        let raw = "```json\n{\"Valid\": \"TRUE\", \"CATEGORY\": \" Travel \", \"Amount\": \"120.50\"}\n```";
        assert_eq!(
            normalize_verdict(raw),
            expense("Travel", Decimal::new(12050, 2), "")
        );
    }

    #[test]
    fn passes_through_rejection_reason() {
        let verdict = normalize_verdict(r#"{"valid": false, "reason": "That is a greeting."}"#);
        assert_eq!(verdict, InterpretationVerdict::rejected("That is a greeting."));
    }

    #[test]
    fn supplies_reason_when_upstream_omits_it() {
        let verdict = normalize_verdict(r#"{"valid": false}"#);
        assert_eq!(verdict, InterpretationVerdict::rejected(DEFAULT_REJECTION));
    }

    #[test]
    fn rejects_unusable_amounts() {
        for amount in [r#"0"#, r#"-4"#, r#""abc""#, r#"null"#, r#"[1]"#] {
            let raw = format!(r#"{{"valid": true, "category": "Food", "amount": {amount}}}"#);
            let verdict = normalize_verdict(&raw);
            assert!(!verdict.is_valid(), "amount {amount} should be rejected");
        }
    }

    #[test]
    fn rejects_blank_category_and_non_text_description() {
        assert!(!normalize_verdict(r#"{"valid": true, "category": "  ", "amount": 3}"#).is_valid());
        assert!(!normalize_verdict(r#"{"valid": true, "amount": 3}"#).is_valid());
        assert!(!normalize_verdict(
            r#"{"valid": true, "category": "Food", "amount": 3, "description": 42}"#
        )
        .is_valid());
    }

    #[test]
    fn long_description_is_cut_to_column_width() {
        let long = "a".repeat(MAX_DESCRIPTION + 45);
        let raw = format!(r#"{{"valid": true, "category": "Food", "amount": 3, "description": "{long}"}}"#);

        match normalize_verdict(&raw) {
            InterpretationVerdict::Expense(candidate) => {
                assert_eq!(candidate.description.chars().count(), MAX_DESCRIPTION)
            }
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn rejects_non_json_and_missing_flag() {
        assert_eq!(
            normalize_verdict("I think this is an expense"),
            InterpretationVerdict::rejected(UNREADABLE_RESPONSE)
        );
        assert_eq!(
            normalize_verdict(r#"{"category": "Food", "amount": 3}"#),
            InterpretationVerdict::rejected(UNREADABLE_RESPONSE)
        );
        assert_eq!(
            normalize_verdict("} backwards {"),
            InterpretationVerdict::rejected(UNREADABLE_RESPONSE)
        );
    }
}
