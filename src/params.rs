//! COM_STMT_EXECUTE payload decoding.
//!
//! Layout after the command byte: statement id (u32), flags (u8), iteration
//! count (u32). Statements with parameters follow up with a NULL bitmap,
//! the new-params-bound flag, optionally `2 * params_count` bytes of types,
//! and the non-NULL values back-to-back in binary encoding.

use crate::error::SqlError;
use crate::errorcodes::ErrorKind;
use crate::myc::constants::ColumnType;
use crate::myc::value::Value;
use crate::stmt::{Statement, StatementRegistry};
use crate::value;
use byteorder::{LittleEndian, ReadBytesExt};
use std::sync::Arc;

/// A decoded execute command: the looked-up descriptor with its bind
/// variables already populated.
#[derive(Debug)]
pub(crate) struct ExecuteRequest {
    pub stmt: Arc<Statement>,
    #[allow(dead_code)]
    pub flags: u8,
}

fn malformed() -> SqlError {
    SqlError::new(ErrorKind::ER_MALFORMED_PACKET, "malformed COM_STMT_EXECUTE packet")
}

/// Decode an execute payload, filling the statement's parameter types on
/// first bind and replacing its bind variables.
pub(crate) fn parse_stmt_execute(
    registry: &StatementRegistry,
    mut input: &[u8],
) -> Result<ExecuteRequest, SqlError> {
    let stmt_id = input.read_u32::<LittleEndian>().map_err(|_| malformed())?;
    let flags = input.read_u8().map_err(|_| malformed())?;
    let _iterations = input.read_u32::<LittleEndian>().map_err(|_| malformed())?;

    let stmt = registry.load(stmt_id).ok_or_else(|| {
        SqlError::new(
            ErrorKind::ER_UNKNOWN_STMT_HANDLER,
            format!("Unknown prepared statement handler ({}) given to EXECUTE", stmt_id),
        )
    })?;

    let n = stmt.params_count() as usize;
    if n > 0 {
        let mut state = stmt.bind_state();

        let nullmap_len = (n + 7) / 8;
        if input.len() < nullmap_len {
            return Err(malformed());
        }
        let (nullmap, rest) = input.split_at(nullmap_len);
        input = rest;

        let new_params_bound = input.read_u8().map_err(|_| malformed())? != 0;
        if new_params_bound {
            if input.len() < 2 * n {
                return Err(malformed());
            }
            let (typmap, rest) = input.split_at(2 * n);
            input = rest;
            for (i, slot) in state.params_type.iter_mut().enumerate() {
                let ct = ColumnType::try_from(typmap[2 * i]).map_err(|_| malformed())?;
                *slot = (ct, (typmap[2 * i + 1] & 0x80) != 0);
            }
        }

        let mut vars = std::collections::HashMap::with_capacity(n);
        for i in 0..n {
            let key = format!("v{}", i + 1);
            if (nullmap[i / 8] & (1 << (i % 8))) != 0 {
                vars.insert(key, Value::NULL);
                continue;
            }
            let (ct, unsigned) = state.params_type[i];
            let v = value::decode_binary(&mut input, ct, unsigned).map_err(|_| malformed())?;
            vars.insert(key, v);
        }
        state.bind_vars = vars;
    }

    Ok(ExecuteRequest { stmt, flags })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParsedStatement;

    struct Bare;
    impl ParsedStatement for Bare {
        fn hints(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn registry_with(sql: &str) -> (StatementRegistry, u32) {
        let reg = StatementRegistry::new();
        let id = reg.next_id();
        reg.store(Statement::new(id, sql.to_owned(), Vec::new(), Box::new(Bare)));
        (reg, id)
    }

    fn execute_payload(id: u32, tail: &[u8]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&id.to_le_bytes());
        p.push(0x00); // flags
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(tail);
        p
    }

    #[test]
    fn unknown_statement_is_an_error() {
        let (reg, _) = registry_with("SELECT 1");
        let p = execute_payload(99, &[]);
        let e = parse_stmt_execute(&reg, &p).unwrap_err();
        assert_eq!(e.code, u16::from(ErrorKind::ER_UNKNOWN_STMT_HANDLER));
    }

    #[test]
    fn binds_typed_values() {
        let (reg, id) = registry_with("SELECT ? + ?");
        let tail = [
            0x00, // nullmap
            0x01, // new params bound
            ColumnType::MYSQL_TYPE_LONGLONG as u8,
            0x00,
            ColumnType::MYSQL_TYPE_VAR_STRING as u8,
            0x00,
            0x2a, 0, 0, 0, 0, 0, 0, 0, // 42
            0x02, b'h', b'i',
        ];
        let p = execute_payload(id, &tail);
        let req = parse_stmt_execute(&reg, &p).unwrap();

        let state = req.stmt.bind_state();
        assert_eq!(state.params_type[0].0, ColumnType::MYSQL_TYPE_LONGLONG);
        assert_eq!(state.bind_vars["v1"], Value::Int(42));
        assert_eq!(state.bind_vars["v2"], Value::Bytes(b"hi".to_vec()));
    }

    #[test]
    fn null_bitmap_binds_null() {
        let (reg, id) = registry_with("SELECT ?");
        let tail = [
            0x01, // param 0 is NULL
            0x01, // new params bound
            ColumnType::MYSQL_TYPE_LONGLONG as u8,
            0x00,
        ];
        let p = execute_payload(id, &tail);
        let req = parse_stmt_execute(&reg, &p).unwrap();
        assert_eq!(req.stmt.bind_state().bind_vars["v1"], Value::NULL);
    }

    #[test]
    fn short_payload_is_malformed() {
        let (reg, id) = registry_with("SELECT ?");
        let p = execute_payload(id, &[]);
        let e = parse_stmt_execute(&reg, &p).unwrap_err();
        assert_eq!(e.code, u16::from(ErrorKind::ER_MALFORMED_PACKET));
    }
}
