//! Turns executor results into response packet sequences.
//!
//! The streamer writes exactly one of {ERR, OK, fields + rows + end} per
//! emitted result and never decides `has_more` itself; the dispatcher's
//! one-result lookahead does.

use crate::conn::Conn;
use crate::errorcodes::ErrorKind;
use crate::myc::constants::StatusFlags;
use crate::value::ToMysqlValue;
use crate::writers;
use crate::{Dataset, QueryItem};
use byteorder::WriteBytesExt;
use std::io::{self, Read, Write};
use tracing::error;

/// Row encoding for a result set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RowEncoding {
    /// Lenenc-text rows (COM_QUERY).
    Text,
    /// Binary rows with a NULL bitmap (COM_STMT_EXECUTE).
    Binary,
}

/// Write the response for one emitted result.
pub(crate) fn write_query_result<R: Read, W: Write>(
    conn: &mut Conn<R, W>,
    item: QueryItem,
    has_more: bool,
    enc: RowEncoding,
) -> io::Result<()> {
    let caps = conn.capabilities();

    let outcome = match item {
        Err(e) => {
            error!(conn = conn.connection_id(), error = %e, "executor returned an error result");
            return writers::write_err_from(&e, &mut conn.writer, caps);
        }
        Ok(outcome) => outcome,
    };

    let mut result = match outcome.result {
        None => {
            error!(conn = conn.connection_id(), "executor produced no result");
            return writers::write_err(
                ErrorKind::ER_BAD_NULL_ERROR,
                b"query produced no result",
                &mut conn.writer,
                caps,
            );
        }
        Some(r) => r,
    };

    let dataset = match result.dataset() {
        Err(e) => {
            error!(conn = conn.connection_id(), error = %e, "result has no usable dataset");
            return writers::write_err_from(&e, &mut conn.writer, caps);
        }
        Ok(d) => d,
    };

    let mut status = conn.status_flags();
    status.set(StatusFlags::SERVER_MORE_RESULTS_EXISTS, has_more);

    match dataset {
        None => {
            // A write-only result: no packets beyond OK, but the affected
            // rows and insert id must still reach the client.
            writers::write_ok_packet(
                &mut conn.writer,
                result.rows_affected(),
                result.last_insert_id(),
                status,
                outcome.warnings,
            )
        }
        Some(mut ds) => {
            stream_dataset(conn, &mut *ds, enc)?;
            write_end_result(conn, status, outcome.warnings)
        }
    }
}

fn stream_dataset<R: Read, W: Write>(
    conn: &mut Conn<R, W>,
    ds: &mut dyn Dataset,
    enc: RowEncoding,
) -> io::Result<()> {
    let caps = conn.capabilities();
    let deprecate_eof = conn.deprecate_eof();
    let fields = ds.fields().to_vec();
    writers::column_definitions(&fields, &mut conn.writer, deprecate_eof)?;

    let bitmap_len = (fields.len() + 7 + 2) / 8;
    let mut data = Vec::new();
    loop {
        let row = match ds.next_row() {
            Err(e) => {
                // the result ends here; ERR is a valid terminator mid-stream
                error!(conn = conn.connection_id(), error = %e, "row fetch failed");
                return writers::write_err_from(&e, &mut conn.writer, caps);
            }
            Ok(None) => return Ok(()),
            Ok(Some(row)) => row,
        };

        if row.len() != fields.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "row does not match field specification",
            ));
        }

        match enc {
            RowEncoding::Text => {
                for cell in &row {
                    cell.to_mysql_text(&mut conn.writer)?;
                }
            }
            RowEncoding::Binary => {
                let mut nullmap = vec![0u8; bitmap_len];
                data.clear();
                for (i, cell) in row.iter().enumerate() {
                    if cell.is_null() {
                        nullmap[(i + 2) / 8] |= 1 << ((i + 2) % 8);
                    } else {
                        cell.to_mysql_bin(&mut data, &fields[i])?;
                    }
                }
                conn.writer.write_u8(0x00)?;
                conn.writer.write_all(&nullmap)?;
                conn.writer.write_all(&data)?;
            }
        }
        conn.writer.end_packet()?;
    }
}

/// End-of-result marker: EOF, or an OK in EOF clothing when the client set
/// `CLIENT_DEPRECATE_EOF`.
pub(crate) fn write_end_result<R: Read, W: Write>(
    conn: &mut Conn<R, W>,
    status: StatusFlags,
    warnings: u16,
) -> io::Result<()> {
    if conn.deprecate_eof() {
        writers::write_ok_as_eof(&mut conn.writer, status, warnings)
    } else {
        writers::write_eof_packet(&mut conn.writer, status, warnings)
    }
}
