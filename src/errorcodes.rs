//! MySQL error numbers and their SQL states.
//!
//! Only the codes the dispatcher itself surfaces, plus the ones proxy
//! backends commonly relay, are listed here; anything else can be carried
//! through [`SqlError::with_code`](crate::SqlError::with_code).

/// A MySQL error number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(non_camel_case_types)]
#[repr(u16)]
pub enum ErrorKind {
    /// Access denied for user.
    ER_ACCESS_DENIED_ERROR = 1045,
    /// Access denied to database for user.
    ER_DBACCESS_DENIED_ERROR = 1044,
    /// Unknown database.
    ER_BAD_DB_ERROR = 1049,
    /// No database selected.
    ER_NO_DB_ERROR = 1046,
    /// Unknown command.
    ER_UNKNOWN_COM_ERROR = 1047,
    /// Column cannot be null.
    ER_BAD_NULL_ERROR = 1048,
    /// Duplicate entry for key.
    ER_DUP_ENTRY = 1062,
    /// Syntax error.
    ER_PARSE_ERROR = 1064,
    /// Unknown error.
    ER_UNKNOWN_ERROR = 1105,
    /// Table doesn't exist.
    ER_NO_SUCH_TABLE = 1146,
    /// Lock wait timeout exceeded.
    ER_LOCK_WAIT_TIMEOUT = 1205,
    /// Deadlock found when trying to get lock.
    ER_LOCK_DEADLOCK = 1213,
    /// Feature not supported yet.
    ER_NOT_SUPPORTED_YET = 1235,
    /// Unknown prepared statement handler.
    ER_UNKNOWN_STMT_HANDLER = 1243,
    /// The statement the server is running prevents this operation.
    ER_OPTION_PREVENTS_STATEMENT = 1290,
    /// Query execution was interrupted.
    ER_QUERY_INTERRUPTED = 1317,
    /// Data too long for column.
    ER_DATA_TOO_LONG = 1406,
    /// Malformed communication packet.
    ER_MALFORMED_PACKET = 1835,
}

impl ErrorKind {
    /// SQLSTATE for this error, as sent after the `#` marker of an ERR
    /// packet when `CLIENT_PROTOCOL_41` is in effect.
    pub fn sqlstate(&self) -> &'static [u8; 5] {
        use self::ErrorKind::*;
        match *self {
            ER_ACCESS_DENIED_ERROR => b"28000",
            ER_DBACCESS_DENIED_ERROR | ER_BAD_DB_ERROR | ER_PARSE_ERROR | ER_NOT_SUPPORTED_YET => {
                b"42000"
            }
            ER_NO_DB_ERROR => b"3D000",
            ER_UNKNOWN_COM_ERROR => b"08S01",
            ER_BAD_NULL_ERROR | ER_DUP_ENTRY => b"23000",
            ER_NO_SUCH_TABLE => b"42S02",
            ER_LOCK_DEADLOCK => b"40001",
            ER_QUERY_INTERRUPTED => b"70100",
            ER_DATA_TOO_LONG => b"22001",
            ER_UNKNOWN_ERROR
            | ER_LOCK_WAIT_TIMEOUT
            | ER_UNKNOWN_STMT_HANDLER
            | ER_OPTION_PREVENTS_STATEMENT
            | ER_MALFORMED_PACKET => b"HY000",
        }
    }
}

impl From<ErrorKind> for u16 {
    fn from(e: ErrorKind) -> Self {
        e as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_states() {
        assert_eq!(u16::from(ErrorKind::ER_BAD_DB_ERROR), 1049);
        assert_eq!(ErrorKind::ER_BAD_DB_ERROR.sqlstate(), b"42000");
        assert_eq!(u16::from(ErrorKind::ER_UNKNOWN_COM_ERROR), 1047);
        assert_eq!(ErrorKind::ER_UNKNOWN_COM_ERROR.sqlstate(), b"08S01");
        assert_eq!(u16::from(ErrorKind::ER_BAD_NULL_ERROR), 1048);
    }
}
