//! Error types for MOLGENIS API operations.

use thiserror::Error;

/// Errors that can occur during MOLGENIS API operations.
#[derive(Debug, Error)]
pub enum MolgenisError {
    /// The server answered with a non-2xx status.
    ///
    /// The message is the status line, followed by the server-provided
    /// `errors[0].message` when the body carried one.
    #[error("{message}")]
    RequestError {
        message: String,
        status_code: Option<u16>,
    },

    /// Login was rejected.
    #[error("Authentication failed: {message}")]
    Authentication {
        message: String,
        status_code: Option<u16>,
    },

    /// A filter was supplied in a structured form instead of RSQL.
    #[error("Please specify your query in the RSQL format, got: {0}")]
    InvalidQueryFormat(String),

    /// A referenced entity type does not declare exactly one identifier attribute.
    #[error(
        "Attribute '{attribute}' references '{ref_entity}', which declares {found} identifier attributes (expected exactly one)"
    )]
    AmbiguousReferenceIdentifier {
        attribute: String,
        ref_entity: String,
        found: usize,
    },

    /// An embedded reference object does not contain its identifier.
    #[error("Reference in attribute '{attribute}' has no value for identifier '{id_attribute}'")]
    MissingReferenceIdentifier {
        attribute: String,
        id_attribute: String,
    },

    /// An import run ended with status FAILED.
    #[error("Import failed: {0}")]
    ImportFailed(String),

    /// Unknown import action string.
    #[error("Unknown import action '{0}'")]
    InvalidAction(String),

    /// A row contains a column that the table's metadata does not declare.
    #[error("Row for table '{table}' has column '{column}' which is not in the table's metadata")]
    UnknownColumn { table: String, column: String },

    /// The response was successful but not shaped as expected.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// CSV writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Zip archive error.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MolgenisError {
    /// HTTP status code for errors that came from a server response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RequestError { status_code, .. } | Self::Authentication { status_code, .. } => {
                *status_code
            }
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for MOLGENIS operations.
pub type Result<T> = core::result::Result<T, MolgenisError>;
