//! Declarative multi-step form framework shared by every wizard.
//!
//! A [`FormDescriptor`] lists ordered [`StepDescriptor`]s, each owning a set
//! of [`FieldDescriptor`]s and the rule table that validates them. Rules are
//! pure functions of the [`FormState`], so validating the same state twice
//! always yields the same [`ValidationErrors`].

pub mod session;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use session::{StepEvent, UnknownField, WizardSession};

/// A single form value as entered by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Blank means "nothing entered": whitespace-only text or an empty list.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Number(_) => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(flag) => write!(f, "{}", if *flag { "yes" } else { "no" }),
            FieldValue::Number(value) => write!(f, "{}", value),
            FieldValue::Text(text) => write!(f, "{}", text),
            FieldValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

/// Current values of one wizard instance, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    values: BTreeMap<String, FieldValue>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Text content of `name`, or `""` when unset or not textual.
    pub fn text(&self, name: &str) -> &str {
        self.values
            .get(name)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    /// Boolean flag `name`; unset flags read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }
}

/// Field name to human-readable message. Empty means the step is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    entries: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.entries.insert(field.into(), message.into());
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut errors = ValidationErrors::new();
        for (field, message) in iter {
            errors.insert(field, message);
        }
        errors
    }
}

/// Supported data kinds for form fields; drives prompting in the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    LongText,
    Secret,
    Number,
    Flag,
    Choice(Vec<&'static str>),
}

type PredicateCallback = dyn Fn(&FormState) -> bool + Send + Sync;

/// Predicates a field value must satisfy.
///
/// `Required`, `RequiredUnless`, and `Numeric` judge blank values; the
/// shape rules (`MinLength`, `MaxLength`, `Pattern`, `OneOf`) only inspect
/// non-blank text and leave emptiness to `Required`.
#[derive(Clone)]
pub enum Rule {
    Required,
    /// Required unless the named flag is set.
    RequiredUnless(&'static str),
    /// Non-negative decimal number; skipped when `waived_by` is set.
    Numeric { waived_by: Option<&'static str> },
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    OneOf(Vec<&'static str>),
    Custom(Arc<PredicateCallback>),
}

impl Rule {
    pub fn custom(predicate: impl Fn(&FormState) -> bool + Send + Sync + 'static) -> Self {
        Rule::Custom(Arc::new(predicate))
    }

    fn passes(&self, field: &str, state: &FormState) -> bool {
        let value = state.get(field);
        let blank = value.map(FieldValue::is_blank).unwrap_or(true);
        let text = state.text(field).trim();
        match self {
            Rule::Required => !blank,
            Rule::RequiredUnless(flag) => state.flag(flag) || !blank,
            Rule::Numeric { waived_by } => {
                if waived_by.map(|flag| state.flag(flag)).unwrap_or(false) {
                    return true;
                }
                match value {
                    Some(FieldValue::Number(number)) => number.is_finite() && *number >= 0.0,
                    _ => text
                        .parse::<f64>()
                        .map(|number| number.is_finite() && number >= 0.0)
                        .unwrap_or(false),
                }
            }
            Rule::MinLength(min) => blank || text.chars().count() >= *min,
            Rule::MaxLength(max) => blank || text.chars().count() <= *max,
            Rule::Pattern(pattern) => blank || pattern.is_match(text),
            Rule::OneOf(options) => blank || options.iter().any(|option| *option == text),
            Rule::Custom(predicate) => predicate(state),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => write!(f, "Required"),
            Rule::RequiredUnless(flag) => write!(f, "RequiredUnless({})", flag),
            Rule::Numeric { waived_by } => write!(f, "Numeric({:?})", waived_by),
            Rule::MinLength(min) => write!(f, "MinLength({})", min),
            Rule::MaxLength(max) => write!(f, "MaxLength({})", max),
            Rule::Pattern(pattern) => write!(f, "Pattern({})", pattern.as_str()),
            Rule::OneOf(options) => write!(f, "OneOf({:?})", options),
            Rule::Custom(_) => write!(f, "Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub rule: Rule,
    pub message: String,
}

/// Declarative description of a single form field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub help: Option<&'static str>,
    pub default: Option<FieldValue>,
    pub rules: Vec<FieldRule>,
}

impl FieldDescriptor {
    pub fn new(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            help: None,
            default: None,
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule, message: impl Into<String>) -> Self {
        self.rules.push(FieldRule {
            rule,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules
            .iter()
            .any(|entry| matches!(entry.rule, Rule::Required | Rule::RequiredUnless(_)))
    }

    /// Message of the first failing rule, if any.
    pub fn check(&self, state: &FormState) -> Option<&str> {
        self.rules
            .iter()
            .find(|entry| !entry.rule.passes(self.key, state))
            .map(|entry| entry.message.as_str())
    }
}

/// One page of a wizard: its fields and an optional step-level banner.
#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub fields: Vec<FieldDescriptor>,
    pub banner: Option<&'static str>,
}

impl StepDescriptor {
    pub fn new(name: &'static str, title: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name,
            title,
            fields,
            banner: None,
        }
    }

    /// Message shown in the banner whenever this step refuses to advance.
    pub fn with_banner(mut self, banner: &'static str) -> Self {
        self.banner = Some(banner);
        self
    }

    pub fn owns(&self, key: &str) -> bool {
        self.fields.iter().any(|field| field.key == key)
    }

    pub fn validate(&self, state: &FormState) -> ValidationErrors {
        self.fields
            .iter()
            .filter_map(|field| field.check(state).map(|message| (field.key, message)))
            .collect()
    }
}

/// Metadata describing a full wizard, including step order.
#[derive(Debug, Clone)]
pub struct FormDescriptor {
    pub name: &'static str,
    pub steps: Vec<StepDescriptor>,
}

impl FormDescriptor {
    pub fn new(name: &'static str, steps: Vec<StepDescriptor>) -> Self {
        Self { name, steps }
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.steps
            .iter()
            .flat_map(|step| step.fields.iter())
            .find(|field| field.key == key)
    }

    /// Form state seeded with each field's declared default.
    pub fn initial_state(&self) -> FormState {
        let mut state = FormState::new();
        for field in self.steps.iter().flat_map(|step| step.fields.iter()) {
            if let Some(default) = &field.default {
                state.set(field.key, default.clone());
            }
        }
        state
    }
}
