//! Data validation for cells
//!
//! Rules are bound to ranges. Committed ("finished") text is checked against
//! the rule covering the cell and the outcome is kept in a per-sheet error
//! set, which is what `Sheet::validate` reports on.
//!
//! ## Case Sensitivity
//!
//! List matching is case-sensitive after trimming. "Yes" != "yes".

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::range::{Axis, CellRange, SpanEdit};

// ============================================================================
// Core Types
// ============================================================================

/// A validation rule that constrains cell input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// The type of validation to apply.
    pub rule_type: ValidationType,
    /// If true, empty/blank values are always valid.
    #[serde(default = "default_true")]
    pub ignore_blank: bool,
    /// Message reported when validation fails. None = generated reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ValidationRule {
    /// Create a new validation rule with the given type.
    pub fn new(rule_type: ValidationType) -> Self {
        Self {
            rule_type,
            ignore_blank: true,
            error_message: None,
        }
    }

    /// Set ignore_blank option. `false` makes the cell required.
    pub fn with_ignore_blank(mut self, ignore: bool) -> Self {
        self.ignore_blank = ignore;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Create a list validation rule from inline values.
    pub fn list(values: Vec<String>) -> Self {
        Self::new(ValidationType::List(values))
    }

    /// Create a whole number validation rule.
    pub fn whole_number(constraint: NumericConstraint) -> Self {
        Self::new(ValidationType::WholeNumber(constraint))
    }

    /// Create a decimal validation rule.
    pub fn decimal(constraint: NumericConstraint) -> Self {
        Self::new(ValidationType::Decimal(constraint))
    }

    /// Create a text length validation rule.
    pub fn text_length(constraint: NumericConstraint) -> Self {
        Self::new(ValidationType::TextLength(constraint))
    }

    /// Check `text` against this rule.
    pub fn validate(&self, text: &str) -> ValidationResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return if self.ignore_blank {
                ValidationResult::Valid
            } else {
                self.invalid("A value is required")
            };
        }

        let outcome = match &self.rule_type {
            ValidationType::AnyValue => Ok(()),
            ValidationType::WholeNumber(c) => check_numeric(trimmed, false, c),
            ValidationType::Decimal(c) => check_numeric(trimmed, true, c),
            ValidationType::TextLength(c) => {
                let len = trimmed.chars().count() as f64;
                if c.eval(len) {
                    Ok(())
                } else {
                    Err(format!("Text length must be {}", c.describe()))
                }
            }
            ValidationType::List(items) => {
                if items.iter().any(|item| item.trim() == trimmed) {
                    Ok(())
                } else {
                    Err(format!("Value must be one of: {}", items.join(", ")))
                }
            }
            ValidationType::Email => {
                if is_email(trimmed) {
                    Ok(())
                } else {
                    Err("Value must be an email address".to_string())
                }
            }
            ValidationType::Phone => {
                if is_phone(trimmed) {
                    Ok(())
                } else {
                    Err("Value must be a phone number".to_string())
                }
            }
        };

        match outcome {
            Ok(()) => ValidationResult::Valid,
            Err(reason) => self.invalid(reason),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ValidationResult {
        ValidationResult::Invalid {
            reason: self.error_message.clone().unwrap_or_else(|| reason.into()),
        }
    }
}

/// The type of validation to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    /// No validation (accept any value).
    AnyValue,
    /// Restrict to integers within bounds.
    WholeNumber(NumericConstraint),
    /// Restrict to decimals within bounds.
    Decimal(NumericConstraint),
    /// Restrict to a list of allowed values.
    List(Vec<String>),
    /// Restrict text to character count bounds.
    TextLength(NumericConstraint),
    Email,
    Phone,
}

/// Numeric constraint for validation (used by WholeNumber, Decimal, TextLength).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericConstraint {
    /// The comparison operator.
    pub operator: ComparisonOperator,
    /// First value (required for all operators).
    pub value1: f64,
    /// Second value (required for Between/NotBetween).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<f64>,
}

impl NumericConstraint {
    /// Create a "between" constraint.
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            operator: ComparisonOperator::Between,
            value1: min,
            value2: Some(max),
        }
    }

    /// Create a "not between" constraint.
    pub fn not_between(min: f64, max: f64) -> Self {
        Self {
            operator: ComparisonOperator::NotBetween,
            value1: min,
            value2: Some(max),
        }
    }

    /// Create a single-value constraint.
    pub fn compare(operator: ComparisonOperator, value: f64) -> Self {
        Self {
            operator,
            value1: value,
            value2: None,
        }
    }

    pub fn eval(&self, x: f64) -> bool {
        eval_numeric_constraint(x, self.operator, self.value1, self.value2)
    }

    fn describe(&self) -> String {
        let max = self.value2.unwrap_or(self.value1);
        match self.operator {
            ComparisonOperator::Between => format!("between {} and {}", self.value1, max),
            ComparisonOperator::NotBetween => format!("not between {} and {}", self.value1, max),
            ComparisonOperator::EqualTo => format!("equal to {}", self.value1),
            ComparisonOperator::NotEqualTo => format!("not equal to {}", self.value1),
            ComparisonOperator::GreaterThan => format!("greater than {}", self.value1),
            ComparisonOperator::LessThan => format!("less than {}", self.value1),
            ComparisonOperator::GreaterThanOrEqual => format!("at least {}", self.value1),
            ComparisonOperator::LessThanOrEqual => format!("at most {}", self.value1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Between,
    NotBetween,
    EqualTo,
    NotEqualTo,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericParseError {
    Empty,
    InvalidFormat,
    FractionalNotAllowed,
}

/// Parse user input as a number for validation.
///
/// # Rules
/// - Whitespace is trimmed
/// - Leading `+` is allowed
/// - Decimal point allowed only if `allow_decimal` is true
/// - For WholeNumber: rejects any fractional input (including `3.0`, `3.`,
///   and exponent forms such as `1e-1`)
///
/// # Examples
/// ```
/// use xsheet_engine::validation::parse_numeric_input;
///
/// assert!(parse_numeric_input("3.14", true).is_ok());
/// assert!(parse_numeric_input("3.0", false).is_err());
/// assert!(parse_numeric_input("3", false).is_ok());
/// ```
pub fn parse_numeric_input(value: &str, allow_decimal: bool) -> Result<f64, NumericParseError> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(NumericParseError::Empty);
    }

    let normalized = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if normalized.is_empty() {
        return Err(NumericParseError::InvalidFormat);
    }

    if !allow_decimal && normalized.contains('.') {
        return Err(NumericParseError::FractionalNotAllowed);
    }

    let n = normalized
        .parse::<f64>()
        .map_err(|_| NumericParseError::InvalidFormat)?;
    if !n.is_finite() {
        return Err(NumericParseError::InvalidFormat);
    }
    // Exponent forms like "1e-1" carry no '.', so check the value too
    if !allow_decimal && n.fract() != 0.0 {
        return Err(NumericParseError::FractionalNotAllowed);
    }
    Ok(n)
}

/// Evaluate a numeric constraint.
///
/// `Between(a, b)` is inclusive: `a <= x <= b`.
/// `NotBetween(a, b)` holds when `x < a || x > b`.
pub fn eval_numeric_constraint(x: f64, operator: ComparisonOperator, a: f64, b: Option<f64>) -> bool {
    match operator {
        ComparisonOperator::Between => {
            let max = b.unwrap_or(a);
            x >= a && x <= max
        }
        ComparisonOperator::NotBetween => {
            let max = b.unwrap_or(a);
            x < a || x > max
        }
        ComparisonOperator::EqualTo => (x - a).abs() < f64::EPSILON,
        ComparisonOperator::NotEqualTo => (x - a).abs() >= f64::EPSILON,
        ComparisonOperator::GreaterThan => x > a,
        ComparisonOperator::LessThan => x < a,
        ComparisonOperator::GreaterThanOrEqual => x >= a,
        ComparisonOperator::LessThanOrEqual => x <= a,
    }
}

fn check_numeric(text: &str, allow_decimal: bool, constraint: &NumericConstraint) -> Result<(), String> {
    let n = parse_numeric_input(text, allow_decimal).map_err(|e| match e {
        NumericParseError::FractionalNotAllowed => "Value must be a whole number".to_string(),
        NumericParseError::Empty | NumericParseError::InvalidFormat => "Value must be a number".to_string(),
    })?;
    if constraint.eval(n) {
        Ok(())
    } else {
        Err(format!("Value must be {}", constraint.describe()))
    }
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
        && !text.chars().any(char::is_whitespace)
}

fn is_phone(text: &str) -> bool {
    let digits = text.chars().filter(char::is_ascii_digit).count();
    digits >= 7
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
}

// ============================================================================
// Validation Result
// ============================================================================

/// Result of validating a cell input.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid,
    Invalid { reason: String },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }
}

// ============================================================================
// Validation Store (per-sheet storage)
// ============================================================================

/// Validation rules of a sheet plus the current error set.
///
/// Uses a BTreeMap for deterministic ordering. When looking up a validation rule
/// for a cell, we find the first rule whose range contains the cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationStore {
    rules: BTreeMap<CellRange, ValidationRule>,
    errors: FxHashMap<(usize, usize), String>,
}

impl ValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a validation rule for a range, replacing one for the exact same range.
    pub fn set(&mut self, range: CellRange, rule: ValidationRule) {
        self.rules.insert(range, rule);
    }

    /// Remove the rule for an exact range and forget errors it produced.
    pub fn remove(&mut self, range: &CellRange) -> Option<ValidationRule> {
        let removed = self.rules.remove(range);
        if removed.is_some() {
            self.clear_errors_in(range);
        }
        removed
    }

    /// Get the validation rule that applies to a cell.
    ///
    /// If multiple rules cover the cell, returns the first one (by range order).
    pub fn get(&self, row: usize, col: usize) -> Option<&ValidationRule> {
        self.rules
            .iter()
            .find(|(range, _)| range.contains(row, col))
            .map(|(_, rule)| rule)
    }

    /// Validate committed text for a cell and record the outcome.
    /// Cells without a rule are always valid.
    pub fn validate_cell(&mut self, row: usize, col: usize, text: &str) -> ValidationResult {
        let result = match self.get(row, col) {
            Some(rule) => rule.validate(text),
            None => ValidationResult::Valid,
        };
        match &result {
            ValidationResult::Valid => {
                self.errors.remove(&(row, col));
            }
            ValidationResult::Invalid { reason } => {
                self.errors.insert((row, col), reason.clone());
            }
        }
        result
    }

    pub fn clear_errors_in(&mut self, range: &CellRange) {
        self.errors.retain(|(r, c), _| !range.contains(*r, *c));
    }

    pub fn error(&self, row: usize, col: usize) -> Option<&str> {
        self.errors.get(&(row, col)).map(String::as_str)
    }

    /// Current errors, sorted by position.
    pub fn errors(&self) -> Vec<((usize, usize), &str)> {
        let mut errors: Vec<_> = self.errors.iter().map(|(pos, msg)| (*pos, msg.as_str())).collect();
        errors.sort_by_key(|(pos, _)| *pos);
        errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Iterate over all (range, rule) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&CellRange, &ValidationRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Shift rules and errors for `count` rows/cols inserted at `at`.
    pub fn inserted(&mut self, axis: Axis, at: usize, count: usize) {
        let rules = std::mem::take(&mut self.rules);
        self.rules = rules
            .into_iter()
            .map(|(range, rule)| (range.inserted(axis, at, count), rule))
            .collect();

        let errors = std::mem::take(&mut self.errors);
        self.errors = errors
            .into_iter()
            .map(|((r, c), msg)| {
                let moved = CellRange::single(r, c).inserted(axis, at, count);
                ((moved.start_row, moved.start_col), msg)
            })
            .collect();
    }

    /// Apply deletion of the band `first..=last`: rules inside the band go
    /// away, rules straddling it shrink, later rules and errors move back.
    pub fn deleted(&mut self, axis: Axis, first: usize, last: usize) {
        let rules = std::mem::take(&mut self.rules);
        self.rules = rules
            .into_iter()
            .filter_map(|(range, rule)| match range.deleted(axis, first, last) {
                SpanEdit::Unchanged(r) | SpanEdit::Moved(r) | SpanEdit::Truncated(r) => Some((r, rule)),
                SpanEdit::Removed => None,
            })
            .collect();

        let errors = std::mem::take(&mut self.errors);
        self.errors = errors
            .into_iter()
            .filter_map(|((r, c), msg)| match CellRange::single(r, c).deleted(axis, first, last) {
                SpanEdit::Unchanged(p) | SpanEdit::Moved(p) => Some(((p.start_row, p.start_col), msg)),
                SpanEdit::Truncated(_) | SpanEdit::Removed => None,
            })
            .collect();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_validation_case_sensitive() {
        let rule = ValidationRule::list(vec!["Yes".into(), " No ".into()]);
        assert!(rule.validate("Yes").is_valid());
        assert!(rule.validate(" No").is_valid());
        assert!(rule.validate("yes").is_invalid());
        assert!(rule.validate("").is_valid());
    }

    #[test]
    fn test_required_rule_rejects_blank() {
        let rule = ValidationRule::new(ValidationType::AnyValue).with_ignore_blank(false);
        assert!(rule.validate("   ").is_invalid());
        assert!(rule.validate("x").is_valid());
    }

    #[test]
    fn test_numeric_rules() {
        let whole = ValidationRule::whole_number(NumericConstraint::between(1.0, 10.0));
        assert!(whole.validate("5").is_valid());
        assert!(whole.validate("5.0").is_invalid());
        assert!(whole.validate("11").is_invalid());
        assert!(whole.validate("abc").is_invalid());

        // Exponent notation is judged by value
        let unit = ValidationRule::whole_number(NumericConstraint::between(0.0, 1.0));
        assert!(unit.validate("1e-1").is_invalid());
        assert!(unit.validate("1E0").is_valid());
        assert_eq!(parse_numeric_input("2.5e0", false), Err(NumericParseError::FractionalNotAllowed));

        let decimal = ValidationRule::decimal(NumericConstraint::compare(ComparisonOperator::GreaterThan, 0.0));
        assert!(decimal.validate("0.5").is_valid());
        assert!(decimal.validate("0").is_invalid());
    }

    #[test]
    fn test_text_length_and_formats() {
        let rule = ValidationRule::text_length(NumericConstraint::compare(ComparisonOperator::LessThanOrEqual, 3.0));
        assert!(rule.validate("abc").is_valid());
        assert!(rule.validate("abcd").is_invalid());

        let email = ValidationRule::new(ValidationType::Email);
        assert!(email.validate("a@b.co").is_valid());
        assert!(email.validate("a@b").is_invalid());
        assert!(email.validate("a b@c.d").is_invalid());

        let phone = ValidationRule::new(ValidationType::Phone);
        assert!(phone.validate("+1 (555) 123-4567").is_valid());
        assert!(phone.validate("12-34").is_invalid());
    }

    #[test]
    fn test_custom_error_message() {
        let rule = ValidationRule::list(vec!["a".into()]).with_error_message("pick a");
        assert_eq!(
            rule.validate("b"),
            ValidationResult::Invalid { reason: "pick a".into() }
        );
    }

    #[test]
    fn test_store_tracks_errors() {
        let mut store = ValidationStore::new();
        store.set(CellRange::new(0, 0, 9, 0), ValidationRule::list(vec!["ok".into()]));

        assert!(store.validate_cell(1, 0, "bad").is_invalid());
        assert_eq!(store.error_count(), 1);
        assert!(store.error(1, 0).is_some());

        assert!(store.validate_cell(1, 0, "ok").is_valid());
        assert_eq!(store.error_count(), 0);

        // No rule for column 1
        assert!(store.validate_cell(1, 1, "anything").is_valid());

        store.validate_cell(2, 0, "bad");
        store.remove(&CellRange::new(0, 0, 9, 0));
        assert_eq!(store.error_count(), 0);
        assert!(store.get(2, 0).is_none());
    }

    #[test]
    fn test_store_shifts_on_row_edits() {
        let mut store = ValidationStore::new();
        store.set(CellRange::new(2, 0, 5, 0), ValidationRule::list(vec!["x".into()]));
        store.set(CellRange::new(8, 0, 8, 0), ValidationRule::list(vec!["y".into()]));
        store.validate_cell(8, 0, "bad");

        store.inserted(Axis::Row, 0, 2);
        assert!(store.get(4, 0).is_some());
        assert!(store.get(2, 0).is_none());
        assert_eq!(store.error(10, 0).map(|_| ()), Some(()));

        // Delete rows 3..=5: the first rule (now 4..=7) shrinks to 3..=4
        store.deleted(Axis::Row, 3, 5);
        let ranges: Vec<CellRange> = store.iter().map(|(r, _)| *r).collect();
        assert_eq!(ranges, vec![CellRange::new(3, 0, 4, 0), CellRange::new(7, 0, 7, 0)]);
        assert!(store.error(7, 0).is_some());

        store.deleted(Axis::Row, 7, 7);
        assert_eq!(store.len(), 1);
        assert_eq!(store.error_count(), 0);
    }

    #[test]
    fn test_parse_numeric_input() {
        assert_eq!(parse_numeric_input("  +5 ", true), Ok(5.0));
        assert_eq!(parse_numeric_input("", true), Err(NumericParseError::Empty));
        assert_eq!(parse_numeric_input("+", true), Err(NumericParseError::InvalidFormat));
        assert_eq!(parse_numeric_input("3.", false), Err(NumericParseError::FractionalNotAllowed));
        assert_eq!(parse_numeric_input("inf", true), Err(NumericParseError::InvalidFormat));
    }

    #[test]
    fn test_eval_numeric_constraint_between_inclusive() {
        assert!(eval_numeric_constraint(1.0, ComparisonOperator::Between, 1.0, Some(100.0)));
        assert!(eval_numeric_constraint(100.0, ComparisonOperator::Between, 1.0, Some(100.0)));
        assert!(!eval_numeric_constraint(0.0, ComparisonOperator::Between, 1.0, Some(100.0)));
        assert!(eval_numeric_constraint(0.0, ComparisonOperator::NotBetween, 1.0, Some(100.0)));
    }
}
