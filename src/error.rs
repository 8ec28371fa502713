use thiserror::Error;

/// Failures talking to the tabular store (remote sheet or local file).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request to the sheet failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheet API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not authorize with the sheet API: {0}")]
    Auth(String),

    #[error("local sheet I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Missing or unusable settings. Fatal for the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Google credentials missing: provide a token file or set GOOGLE_OAUTH_TOKEN"
    )]
    MissingCredentials,

    #[error("Google credentials invalid: {0}")]
    InvalidCredentials(String),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("column '{0}' not found in the sheet header")]
    MissingIdentifierColumn(String),

    #[error("could not detect the inserted row from '{0}'")]
    RowIndexParse(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("QR code: {0}")]
    Qr(String),

    #[error("barcode: {0}")]
    Barcode(String),

    #[error("PDF: {0}")]
    Pdf(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("fill in the required field '{0}'")]
    MissingField(&'static str),
}

/// Everything a single user interaction can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
