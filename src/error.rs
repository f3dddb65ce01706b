// SPDX-License-Identifier: MIT

use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    AddrParse(std::net::AddrParseError),
    Snapshot(String), // Contains the serialization failure
    NotFound,
    BadRequest,
    MethodNotAllowed,
    InternalServerError(String),
    PayloadTooLarge(u64), // Contains the maximum allowed size
    // Contact-book errors
    ContactNotFound(usize),   // Contains the positional identifier that missed
    InvalidContactId(String), // Contains the rejected identifier text
    InvalidConfiguration(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "IO error: {err}"),
            AppError::AddrParse(err) => write!(f, "Address parse error: {err}"),
            AppError::Snapshot(msg) => write!(f, "Snapshot error: {msg}"),
            AppError::NotFound => write!(f, "Not Found"),
            AppError::BadRequest => write!(f, "Bad request"),
            AppError::MethodNotAllowed => write!(f, "Method not allowed"),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {msg}"),
            AppError::PayloadTooLarge(max_size) => {
                write!(
                    f,
                    "Request payload too large. Maximum allowed size: {max_size} bytes"
                )
            }
            AppError::ContactNotFound(id) => write!(f, "No contact with id {id}"),
            AppError::InvalidContactId(raw) => write!(f, "Invalid contact id '{raw}'"),
            AppError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(err: std::net::AddrParseError) -> Self {
        AppError::AddrParse(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Snapshot(err.to_string())
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Creates a ContactNotFound error for a positional identifier
    pub fn contact_not_found(id: usize) -> Self {
        AppError::ContactNotFound(id)
    }

    /// Creates an InvalidContactId error
    pub fn invalid_contact_id<S: Into<String>>(raw: S) -> Self {
        AppError::InvalidContactId(raw.into())
    }

    /// HTTP status code and reason phrase for this error.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            AppError::NotFound | AppError::ContactNotFound(_) => (404, "Not Found"),
            AppError::BadRequest | AppError::InvalidContactId(_) => (400, "Bad Request"),
            AppError::MethodNotAllowed => (405, "Method Not Allowed"),
            AppError::PayloadTooLarge(_) => (413, "Payload Too Large"),
            _ => (500, "Internal Server Error"),
        }
    }

    /// Checks if the error came from looking up a contact by identifier
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            AppError::ContactNotFound(_) | AppError::InvalidContactId(_)
        )
    }
}
