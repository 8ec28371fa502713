/*!
# Oil Sample Intake

A web form for recording oil-sample collections, backed by a spreadsheet.

## Overview

Field staff fill in a questionnaire about an oil sample (origin, equipment,
oil, contact). On submit the record is written to a Google Sheet and a
printable A4 PDF is produced, carrying the sample number as a QR code and a
Code128 barcode so the bottle can be scanned at the lab.

Typing a sample number that already exists loads that row back into the form.
Submitting then overwrites the row in place, keeping the lab's status columns
(`Status`, `Data Status`) exactly as they were.

## Architecture

### Store Layer
- **store**: `TabularStore` trait, A1 range addressing
- **sheets**: Google Sheets v4 client with OAuth token refresh
- **local_store**: gzip + bincode sheet file for development and tests

### Core
- **schema**: form sections, defaults, and the sheet column layout
- **form**: per-session field values (yes/no questions are tri-state)
- **reconcile**: sample lookup (last match wins) and append/update
- **session**: per-user state machine (empty / new / loaded / error)
- **report**: PDF rendering with QR and barcode

### Front Ends
- **app**: axum server with handlebars form page, one session per cookie
- `cli` binary: interactive prompt over the same session flow

## Sheet Layout

Columns A..AG hold the form fields plus `Status` and `Data Status`; column AH
holds the service order (O.S.). New records are appended over A..AG and the
O.S. cell is filled right after.

## HTTP Endpoints

- `GET /` - The form
- `POST /lookup` - Look up the typed sample number
- `POST /submit` - Save and render the PDF
- `POST /reset` - Start over
- `GET /report.pdf` - Download the last PDF
- `GET /api/session` - Session state as JSON
*/

pub mod config;
pub mod error;
pub mod form;
pub mod local_store;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod session;
pub mod sheets;
pub mod store;

#[cfg(feature = "web")]
pub mod app;

#[cfg(test)]
mod testing;

pub use error::{ConfigError, Error, ReconcileError, RenderError, StoreError, ValidationError};
pub use form::{Choice, FormState};
pub use local_store::LocalStore;
pub use reconcile::{Extras, Lookup, ReconciliationResult, SampleReconciler};
pub use report::{DocumentRenderer, PdfReport};
pub use schema::{FieldValue, ResponseRecord};
pub use session::{LookupState, SessionContext, SubmitOutcome};
pub use sheets::SheetsClient;
pub use store::{SheetRange, TabularStore};
