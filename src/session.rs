//! Per-user session: form contents plus what the sheet told us about the
//! current sample.

use log::{info, warn};
use serde::Serialize;

use crate::error::{Error, ValidationError};
use crate::form::FormState;
use crate::reconcile::{Extras, Lookup, SampleReconciler};
use crate::report::{DocumentRenderer, report_file_name};
use crate::schema::{FORM_SCHEMA, IDENTIFIER_LABEL};
use crate::store::TabularStore;

/// Where the session stands with respect to the sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LookupState {
    /// No sample number entered.
    Empty,
    /// Sample number not in the sheet; submitting creates a row.
    New,
    /// Bound to an existing row; submitting overwrites it.
    Loaded { row: u32, match_count: usize },
    /// The last lookup failed.
    Error { message: String },
}

#[derive(Clone, Debug)]
pub struct Report {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub identifier: String,
    pub row: u32,
    /// `true` when an existing row was overwritten.
    pub updated: bool,
}

#[derive(Debug)]
pub struct SessionContext {
    form: FormState,
    state: LookupState,
    bound_row: Option<u32>,
    extras: Extras,
    /// Identifier the bound row and extras were resolved for, by a lookup
    /// or a save. `None` until the typed identifier has been looked up.
    resolved: Option<String>,
    report: Option<Report>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        SessionContext {
            form: FormState::with_defaults(),
            state: LookupState::Empty,
            bound_row: None,
            extras: Extras::new(),
            resolved: None,
            report: None,
        }
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    /// Edits to non-identifier fields. The identifier goes through
    /// [`SessionContext::edit_identifier`] or is picked up at submit.
    pub fn form_mut(&mut self) -> &mut FormState {
        &mut self.form
    }

    pub fn state(&self) -> &LookupState {
        &self.state
    }

    pub fn bound_row(&self) -> Option<u32> {
        self.bound_row
    }

    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    fn unbind(&mut self) {
        self.bound_row = None;
        self.extras.clear();
        self.resolved = None;
    }

    /// The user typed a new sample number: look it up and refresh the form.
    pub fn edit_identifier<S: TabularStore>(
        &mut self,
        engine: &SampleReconciler<S>,
        text: &str,
    ) -> &LookupState {
        let identifier = text.trim().to_string();
        if identifier != self.form.identifier() {
            self.unbind();
        }

        if identifier.is_empty() {
            self.form.reset_to_defaults();
            self.state = LookupState::Empty;
            return &self.state;
        }

        match engine.lookup(&identifier) {
            Ok(Lookup::NotFound) => {
                self.form.set_text(IDENTIFIER_LABEL, &identifier);
                self.form.reset_keeping_identifier();
                self.unbind();
                self.resolved = Some(identifier);
                self.state = LookupState::New;
            }
            Ok(Lookup::Found(result)) => {
                self.form.merge(&result.values);
                self.form.set_text(IDENTIFIER_LABEL, &identifier);
                self.bound_row = Some(result.row_index);
                self.extras = result.extras;
                self.resolved = Some(identifier);
                self.state = LookupState::Loaded {
                    row: result.row_index,
                    match_count: result.match_count,
                };
            }
            Err(e) => {
                warn!("lookup of sample {} failed: {}", identifier, e);
                self.form.set_text(IDENTIFIER_LABEL, &identifier);
                self.unbind();
                self.state = LookupState::Error {
                    message: e.to_string(),
                };
            }
        }
        &self.state
    }

    /// Bind to the sheet row of an identifier that was typed but never
    /// looked up. The form keeps what the user entered.
    fn resolve<S: TabularStore>(
        &mut self,
        engine: &SampleReconciler<S>,
        identifier: &str,
    ) -> Result<(), Error> {
        self.unbind();
        match engine.lookup(identifier) {
            Ok(Lookup::NotFound) => {
                self.state = LookupState::New;
            }
            Ok(Lookup::Found(result)) => {
                self.bound_row = Some(result.row_index);
                self.extras = result.extras;
                self.state = LookupState::Loaded {
                    row: result.row_index,
                    match_count: result.match_count,
                };
            }
            Err(e) => {
                warn!("lookup of sample {} failed: {}", identifier, e);
                self.state = LookupState::Error {
                    message: e.to_string(),
                };
                return Err(e.into());
            }
        }
        self.resolved = Some(identifier.to_string());
        Ok(())
    }

    /// Save the form to the sheet and render its report.
    ///
    /// An identifier that has not been looked up yet is looked up first, so
    /// an existing sample is updated rather than appended twice.
    pub fn submit<S: TabularStore, R: DocumentRenderer>(
        &mut self,
        engine: &SampleReconciler<S>,
        renderer: &R,
    ) -> Result<SubmitOutcome, Error> {
        let identifier = self.form.identifier();
        if identifier.is_empty() {
            return Err(ValidationError::MissingField(IDENTIFIER_LABEL).into());
        }
        self.form.set_text(IDENTIFIER_LABEL, &identifier);
        if self.resolved.as_deref() != Some(identifier.as_str()) {
            self.resolve(engine, &identifier)?;
        }

        let record = self.form.to_record();
        let existing = self.bound_row;
        let row = engine.persist(&record, existing, &self.extras)?;

        let match_count = match &self.state {
            LookupState::Loaded { match_count, .. } if existing.is_some() => *match_count,
            _ => 1,
        };
        self.bound_row = Some(row);
        self.resolved = Some(identifier.clone());
        self.state = LookupState::Loaded { row, match_count };
        info!("sample {} saved at row {}", identifier, row);

        let bytes = renderer.render(FORM_SCHEMA, &record)?;
        self.report = Some(Report {
            file_name: report_file_name(&identifier),
            bytes,
        });

        Ok(SubmitOutcome {
            identifier,
            row,
            updated: existing.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RenderError, ReconcileError};
    use crate::form::{Choice, FieldInput};
    use crate::schema::{IDENTIFIER_HEADER, ResponseRecord, Section};
    use crate::testing::{Call, RecordingStore};

    struct StubRenderer;

    impl DocumentRenderer for StubRenderer {
        fn render(&self, _: &[Section], record: &ResponseRecord) -> Result<Vec<u8>, RenderError> {
            Ok(record[IDENTIFIER_LABEL].to_cell().into_bytes())
        }
    }

    fn engine() -> SampleReconciler<RecordingStore> {
        let engine = SampleReconciler::new(RecordingStore::new(), "Geral");
        engine.store().seed_row(
            57,
            &[
                (IDENTIFIER_HEADER, "1234"),
                ("Frota", "F-1"),
                ("Existem vazamentos no sistema", "Sim"),
                ("Status", "Aberto"),
                ("Data Status", "01/01/2024"),
            ],
        );
        engine.store().clear_calls();
        engine
    }

    fn text(session: &SessionContext, label: &str) -> String {
        match session.form().input(label) {
            Some(FieldInput::Text(text)) => text.clone(),
            other => panic!("{label}: {other:?}"),
        }
    }

    #[test]
    fn empty_identifier_resets_without_query() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.form_mut().set_text("Frota:", "F-9");

        assert_eq!(session.edit_identifier(&engine, "  "), &LookupState::Empty);
        assert_eq!(text(&session, "Frota:"), "");
        assert!(engine.store().calls().is_empty());
    }

    #[test]
    fn unknown_identifier_starts_new_record() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        assert_eq!(text(&session, "Frota:"), "F-1");

        assert_eq!(session.edit_identifier(&engine, "555"), &LookupState::New);
        assert_eq!(session.form().identifier(), "555");
        assert_eq!(text(&session, "Frota:"), "");
        assert_eq!(session.bound_row(), None);
        assert!(session.extras().is_empty());
    }

    #[test]
    fn known_identifier_loads_row() {
        let engine = engine();
        let mut session = SessionContext::new();

        let state = session.edit_identifier(&engine, " 1234 ").clone();
        assert_eq!(
            state,
            LookupState::Loaded {
                row: 57,
                match_count: 1
            }
        );
        assert_eq!(session.bound_row(), Some(57));
        assert_eq!(session.extras()["Status"], "Aberto");
        assert_eq!(
            session.form().input("Existem vazamentos no sistema?"),
            Some(&FieldInput::Choice(Choice::Yes))
        );
    }

    #[test]
    fn lookup_failure_keeps_fields_and_clears_binding() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        *engine.store().fail_reads.lock().unwrap() = true;

        let state = session.edit_identifier(&engine, "1234").clone();
        assert!(matches!(state, LookupState::Error { ref message } if message.contains("503")));
        assert_eq!(text(&session, "Frota:"), "F-1");
        assert_eq!(session.bound_row(), None);
    }

    #[test]
    fn submit_requires_identifier() {
        let engine = engine();
        let mut session = SessionContext::new();
        let err = session.submit(&engine, &StubRenderer).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField(IDENTIFIER_LABEL))
        ));
        assert!(engine.store().calls().is_empty());
        assert!(session.report().is_none());
    }

    #[test]
    fn submit_updates_loaded_row() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        session.form_mut().set_text("Frota:", "F-2");

        let outcome = session.submit(&engine, &StubRenderer).unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome {
                identifier: "1234".to_string(),
                row: 57,
                updated: true
            }
        );
        assert_eq!(engine.store().cell(57, "Frota"), "F-2");
        assert_eq!(engine.store().cell(57, "Status"), "Aberto");
        assert_eq!(engine.store().cell(57, "Data Status"), "01/01/2024");

        let report = session.report().unwrap();
        assert_eq!(report.file_name, "amostra_1234.pdf");
        assert_eq!(report.bytes, b"1234");
    }

    #[test]
    fn retyped_unknown_identifier_submits_as_new_record() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        // Typed into the field but never looked up.
        session.form_mut().set_text(IDENTIFIER_LABEL, "9999");
        engine.store().clear_calls();

        let outcome = session.submit(&engine, &StubRenderer).unwrap();
        assert!(!outcome.updated);
        assert_eq!(outcome.row, 58);
        let calls = engine.store().calls();
        assert!(matches!(calls[0], Call::Read(..)));
        assert!(matches!(calls[1], Call::Append(..)));
        assert_eq!(engine.store().cell(57, IDENTIFIER_HEADER), "1234");
        assert_eq!(engine.store().cell(58, "Status"), "");
    }

    #[test]
    fn typed_existing_identifier_updates_its_row() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.form_mut().set_text(IDENTIFIER_LABEL, "1234");
        session.form_mut().set_text("Frota:", "F-7");

        let outcome = session.submit(&engine, &StubRenderer).unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome {
                identifier: "1234".to_string(),
                row: 57,
                updated: true
            }
        );
        assert_eq!(engine.store().cell(57, "Frota"), "F-7");
        assert_eq!(engine.store().cell(57, "Status"), "Aberto");
        assert_eq!(engine.store().inner.rows().len(), 57);
        assert_eq!(session.extras()["Data Status"], "01/01/2024");
    }

    #[test]
    fn retyping_a_loaded_identifier_rebinds_on_submit() {
        let engine = engine();
        engine.store().seed_row(60, &[(IDENTIFIER_HEADER, "42"), ("Status", "Fechado")]);
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        session.form_mut().set_text(IDENTIFIER_LABEL, "42");

        let outcome = session.submit(&engine, &StubRenderer).unwrap();
        assert_eq!(outcome.row, 60);
        assert!(outcome.updated);
        assert_eq!(engine.store().cell(60, "Status"), "Fechado");
        assert_eq!(engine.store().cell(57, "Frota"), "F-1");
    }

    #[test]
    fn looked_up_identifier_is_not_queried_again() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        engine.store().clear_calls();

        session.submit(&engine, &StubRenderer).unwrap();
        assert!(matches!(engine.store().calls()[0], Call::Update(..)));
    }

    #[test]
    fn lookup_failure_at_submit_writes_nothing() {
        let engine = engine();
        *engine.store().fail_reads.lock().unwrap() = true;
        let mut session = SessionContext::new();
        session.form_mut().set_text(IDENTIFIER_LABEL, "1234");

        let err = session.submit(&engine, &StubRenderer).unwrap_err();
        assert!(matches!(err, Error::Reconcile(ReconcileError::Store(_))));
        assert_eq!(engine.store().calls().len(), 1);
        assert!(matches!(session.state(), LookupState::Error { .. }));
        assert!(session.report().is_none());
    }

    #[test]
    fn new_and_failed_lookups_drop_the_previous_binding() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "1234");
        assert_eq!(session.resolved.as_deref(), Some("1234"));

        session.edit_identifier(&engine, "555");
        assert_eq!(session.resolved.as_deref(), Some("555"));
        assert_eq!(session.bound_row(), None);

        *engine.store().fail_reads.lock().unwrap() = true;
        session.edit_identifier(&engine, "1234");
        assert_eq!(session.resolved, None);
        assert!(session.extras().is_empty());
    }

    #[test]
    fn second_submit_updates_the_appended_row() {
        let engine = engine();
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "777");
        let first = session.submit(&engine, &StubRenderer).unwrap();
        assert!(!first.updated);

        session.form_mut().set_text("Modelo:", "DC16");
        let second = session.submit(&engine, &StubRenderer).unwrap();
        assert!(second.updated);
        assert_eq!(second.row, first.row);
        assert_eq!(engine.store().cell(first.row, "Modelo"), "DC16");
    }

    #[test]
    fn failed_append_reports_parse_error() {
        let engine = engine();
        *engine.store().append_reply.lock().unwrap() = Some("???".to_string());
        let mut session = SessionContext::new();
        session.edit_identifier(&engine, "31");

        let err = session.submit(&engine, &StubRenderer).unwrap_err();
        assert!(matches!(
            err,
            Error::Reconcile(ReconcileError::RowIndexParse(_))
        ));
        assert_eq!(session.bound_row(), None);
        assert_eq!(session.state(), &LookupState::New);
    }
}
