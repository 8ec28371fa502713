//! Per-session form state.
//!
//! Holds the current value of every field between re-renders. Yes/no
//! questions are kept as a three-way [`Choice`] (the pair of "Sim"/"Não"
//! boxes on screen) and only collapse to a `bool` in [`FormState::to_record`].

use std::collections::HashMap;

use crate::schema::{self, FieldKind, FieldValue, IDENTIFIER_LABEL, ResponseRecord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Choice {
    #[default]
    Unset,
    Yes,
    No,
}

impl Choice {
    /// Parse the value posted by the form's yes/no inputs.
    pub fn from_form(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sim" | "yes" => Choice::Yes,
            "nao" | "não" | "no" => Choice::No,
            _ => Choice::Unset,
        }
    }

    pub fn to_bool(self) -> bool {
        matches!(self, Choice::Yes)
    }
}

impl From<bool> for Choice {
    fn from(value: bool) -> Self {
        if value { Choice::Yes } else { Choice::No }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldInput {
    Text(String),
    Choice(Choice),
}

impl From<FieldValue> for FieldInput {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(text) => FieldInput::Text(text),
            FieldValue::Flag(flag) => FieldInput::Choice(flag.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormState {
    inputs: HashMap<&'static str, FieldInput>,
}

impl Default for FormState {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FormState {
    pub fn with_defaults() -> Self {
        let inputs = schema::fields()
            .map(|def| (def.label, def.default_value().into()))
            .collect();
        FormState { inputs }
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Self::with_defaults();
    }

    /// Back to defaults, but keep whatever identifier is currently typed.
    pub fn reset_keeping_identifier(&mut self) {
        let identifier = self.identifier();
        self.reset_to_defaults();
        self.set_text(IDENTIFIER_LABEL, &identifier);
    }

    pub fn input(&self, label: &str) -> Option<&FieldInput> {
        self.inputs.get(label)
    }

    /// Trimmed identifier as currently entered.
    pub fn identifier(&self) -> String {
        match self.inputs.get(IDENTIFIER_LABEL) {
            Some(FieldInput::Text(text)) => text.trim().to_string(),
            _ => String::new(),
        }
    }

    /// Returns `false` if the label is unknown or not a text field.
    pub fn set_text(&mut self, label: &str, value: &str) -> bool {
        match schema::field(label) {
            Some(def) if def.kind() == FieldKind::Text => {
                self.inputs
                    .insert(def.label, FieldInput::Text(value.to_string()));
                true
            }
            _ => false,
        }
    }

    /// Returns `false` if the label is unknown or not a yes/no field.
    pub fn set_choice(&mut self, label: &str, choice: Choice) -> bool {
        match schema::field(label) {
            Some(def) if def.kind() == FieldKind::Flag => {
                self.inputs.insert(def.label, FieldInput::Choice(choice));
                true
            }
            _ => false,
        }
    }

    /// Overwrite fields with the values in `record`. Labels the schema does
    /// not know, or values of the wrong kind, are ignored.
    pub fn merge(&mut self, record: &ResponseRecord) {
        for (label, value) in record {
            match value {
                FieldValue::Text(text) => {
                    self.set_text(label, text);
                }
                FieldValue::Flag(flag) => {
                    self.set_choice(label, Choice::from(*flag));
                }
            }
        }
    }

    pub fn to_record(&self) -> ResponseRecord {
        schema::fields()
            .map(|def| {
                let value = match self.inputs.get(def.label) {
                    Some(FieldInput::Text(text)) => FieldValue::Text(text.clone()),
                    Some(FieldInput::Choice(choice)) => FieldValue::Flag(choice.to_bool()),
                    None => def.default_value(),
                };
                (def.label.to_string(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAK: &str = "Existem vazamentos no sistema?";

    #[test]
    fn seeded_with_schema_defaults() {
        let form = FormState::with_defaults();
        assert_eq!(
            form.input("Modelo:"),
            Some(&FieldInput::Text("DC13".to_string()))
        );
        assert_eq!(form.input(LEAK), Some(&FieldInput::Choice(Choice::No)));
        assert_eq!(form.identifier(), "");
    }

    #[test]
    fn rejects_wrong_kind_and_unknown_labels() {
        let mut form = FormState::with_defaults();
        assert!(!form.set_text(LEAK, "sim"));
        assert!(!form.set_choice("Modelo:", Choice::Yes));
        assert!(!form.set_text("Campo inexistente", "x"));
        assert!(form.set_text("Modelo:", "DC16"));
    }

    #[test]
    fn reset_keeps_identifier_only() {
        let mut form = FormState::with_defaults();
        form.set_text(IDENTIFIER_LABEL, " 1234 ");
        form.set_text("Frota:", "F-09");
        form.set_choice(LEAK, Choice::Yes);

        form.reset_keeping_identifier();

        assert_eq!(form.identifier(), "1234");
        assert_eq!(form.input("Frota:"), Some(&FieldInput::Text(String::new())));
        assert_eq!(form.input(LEAK), Some(&FieldInput::Choice(Choice::No)));
    }

    #[test]
    fn merge_then_record() {
        let mut form = FormState::with_defaults();
        let mut fetched = ResponseRecord::new();
        fetched.insert("Frota:".to_string(), FieldValue::Text("F-10".to_string()));
        fetched.insert(LEAK.to_string(), FieldValue::Flag(true));
        fetched.insert("Desconhecido".to_string(), FieldValue::Text("x".to_string()));
        form.merge(&fetched);

        let record = form.to_record();
        assert_eq!(record["Frota:"], FieldValue::Text("F-10".to_string()));
        assert_eq!(record[LEAK], FieldValue::Flag(true));
        assert!(!record.contains_key("Desconhecido"));
        assert_eq!(record.len(), schema::fields().count());
    }

    #[test]
    fn unset_choice_records_false() {
        let mut form = FormState::with_defaults();
        form.set_choice(LEAK, Choice::from_form(""));
        assert_eq!(form.input(LEAK), Some(&FieldInput::Choice(Choice::Unset)));
        assert_eq!(form.to_record()[LEAK], FieldValue::Flag(false));
        assert_eq!(Choice::from_form("Sim"), Choice::Yes);
        assert_eq!(Choice::from_form("nao"), Choice::No);
    }
}
