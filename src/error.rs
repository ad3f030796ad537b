//! Errors surfaced to clients as ERR packets.

use crate::errorcodes::ErrorKind;
use thiserror::Error;

/// An error destined for the client, carrying the MySQL error number and
/// SQLSTATE that end up on the wire.
///
/// Collaborators return this for anything the client should see; transport
/// failures use `std::io::Error` instead and tear the connection down.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("ERROR {code} ({sqlstate}): {message}")]
pub struct SqlError {
    /// MySQL error number.
    pub code: u16,
    /// Five-character SQLSTATE.
    pub sqlstate: String,
    /// Human-readable message, sent verbatim in the ERR packet.
    pub message: String,
}

impl SqlError {
    /// An error for a well-known MySQL error number.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        SqlError {
            code: kind.into(),
            sqlstate: String::from_utf8_lossy(kind.sqlstate()).into_owned(),
            message: message.into(),
        }
    }

    /// An error with an explicit code and SQLSTATE, for relaying backend
    /// errors the dispatcher has no name for.
    pub fn with_code(code: u16, sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        SqlError {
            code,
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }

    /// SQLSTATE bytes for the ERR packet, padded or replaced by `HY000`
    /// when malformed.
    pub(crate) fn sqlstate_bytes(&self) -> [u8; 5] {
        let b = self.sqlstate.as_bytes();
        if b.len() == 5 {
            let mut out = [0; 5];
            out.copy_from_slice(b);
            out
        } else {
            *b"HY000"
        }
    }
}

impl From<ErrorKind> for SqlError {
    fn from(kind: ErrorKind) -> Self {
        SqlError::new(kind, format!("{:?}", kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_state() {
        let e = SqlError::new(ErrorKind::ER_BAD_DB_ERROR, "Unknown database 'x'");
        assert_eq!(e.to_string(), "ERROR 1049 (42000): Unknown database 'x'");
    }

    #[test]
    fn bad_sqlstate_falls_back() {
        let e = SqlError::with_code(1105, "bogus", "oops");
        assert_eq!(&e.sqlstate_bytes(), b"HY000");
    }
}
