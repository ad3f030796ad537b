//! Builders for the server-side response packets.

use crate::errorcodes::ErrorKind;
use crate::error::SqlError;
use crate::myc::constants::{CapabilityFlags, ColumnFlags, ColumnType, StatusFlags, UTF8_GENERAL_CI};
use crate::myc::io::WriteMysqlExt;
use crate::packet::PacketWriter;
use crate::Column;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

pub(crate) fn write_ok_packet<W: Write>(
    w: &mut PacketWriter<W>,
    rows: u64,
    last_insert_id: u64,
    status: StatusFlags,
    warnings: u16,
) -> io::Result<()> {
    w.write_u8(0x00)?; // OK packet type
    w.write_lenenc_int(rows)?;
    w.write_lenenc_int(last_insert_id)?;
    w.write_u16::<LittleEndian>(status.bits())?;
    w.write_u16::<LittleEndian>(warnings)?;
    w.end_packet()
}

/// OK packet in EOF clothing, used as end-of-result when the client set
/// `CLIENT_DEPRECATE_EOF`.
pub(crate) fn write_ok_as_eof<W: Write>(
    w: &mut PacketWriter<W>,
    status: StatusFlags,
    warnings: u16,
) -> io::Result<()> {
    w.write_u8(0xFE)?;
    w.write_lenenc_int(0)?;
    w.write_lenenc_int(0)?;
    w.write_u16::<LittleEndian>(status.bits())?;
    w.write_u16::<LittleEndian>(warnings)?;
    w.end_packet()
}

pub(crate) fn write_eof_packet<W: Write>(
    w: &mut PacketWriter<W>,
    status: StatusFlags,
    warnings: u16,
) -> io::Result<()> {
    w.write_u8(0xFE)?; // EOF packet type
    w.write_u16::<LittleEndian>(warnings)?;
    w.write_u16::<LittleEndian>(status.bits())?;
    w.end_packet()
}

pub(crate) fn write_err_packet<W: Write>(
    w: &mut PacketWriter<W>,
    code: u16,
    sqlstate: &[u8; 5],
    msg: &[u8],
    capabilities: CapabilityFlags,
) -> io::Result<()> {
    w.write_u8(0xFF)?; // ERR packet type
    w.write_u16::<LittleEndian>(code)?;
    if capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        w.write_u8(b'#')?;
        w.write_all(sqlstate)?;
    }
    w.write_all(msg)?;
    w.end_packet()
}

pub(crate) fn write_err<W: Write>(
    kind: ErrorKind,
    msg: &[u8],
    w: &mut PacketWriter<W>,
    capabilities: CapabilityFlags,
) -> io::Result<()> {
    write_err_packet(w, kind.into(), kind.sqlstate(), msg, capabilities)
}

pub(crate) fn write_err_from<W: Write>(
    e: &SqlError,
    w: &mut PacketWriter<W>,
    capabilities: CapabilityFlags,
) -> io::Result<()> {
    write_err_packet(w, e.code, &e.sqlstate_bytes(), e.message.as_bytes(), capabilities)
}

pub(crate) fn write_column_definition<W: Write>(
    c: &Column,
    w: &mut PacketWriter<W>,
) -> io::Result<()> {
    w.write_lenenc_str(b"def")?;
    w.write_lenenc_str(b"")?; // schema
    w.write_lenenc_str(c.table.as_bytes())?;
    w.write_lenenc_str(b"")?; // org_table
    w.write_lenenc_str(c.column.as_bytes())?;
    w.write_lenenc_str(b"")?; // org_name
    w.write_lenenc_int(0x0C)?;
    w.write_u16::<LittleEndian>(UTF8_GENERAL_CI)?;
    w.write_u32::<LittleEndian>(1024)?;
    w.write_u8(c.coltype as u8)?;
    w.write_u16::<LittleEndian>(c.colflags.bits())?;
    w.write_u8(0x00)?; // decimals
    w.write_all(&[0x00, 0x00])?; // filler
    w.end_packet()
}

/// The head of a result set: column count, definitions, and the separating
/// EOF unless the client deprecates it.
pub(crate) fn column_definitions<W: Write>(
    cols: &[Column],
    w: &mut PacketWriter<W>,
    deprecate_eof: bool,
) -> io::Result<()> {
    w.write_lenenc_int(cols.len() as u64)?;
    w.end_packet()?;
    for c in cols {
        write_column_definition(c, w)?;
    }
    if deprecate_eof {
        Ok(())
    } else {
        write_eof_packet(w, StatusFlags::empty(), 0)
    }
}

/// COM_STMT_PREPARE response: header packet, then a placeholder definition
/// per parameter. Column count is always zero here; the proxy does not know
/// result shapes at prepare time.
pub(crate) fn write_prepare_ok<W: Write>(
    id: u32,
    params_count: u16,
    w: &mut PacketWriter<W>,
    deprecate_eof: bool,
) -> io::Result<()> {
    w.write_u8(0x00)?;
    w.write_u32::<LittleEndian>(id)?;
    w.write_u16::<LittleEndian>(0)?; // no columns
    w.write_u16::<LittleEndian>(params_count)?;
    w.write_u8(0x00)?; // filler
    w.write_u16::<LittleEndian>(0)?; // warnings
    w.end_packet()?;

    if params_count > 0 {
        let placeholder = Column {
            table: String::new(),
            column: "?".to_owned(),
            coltype: ColumnType::MYSQL_TYPE_VAR_STRING,
            colflags: ColumnFlags::empty(),
        };
        for _ in 0..params_count {
            write_column_definition(&placeholder, w)?;
        }
        if !deprecate_eof {
            write_eof_packet(w, StatusFlags::empty(), 0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(out: &mut Vec<u8>) -> PacketWriter<&mut Vec<u8>> {
        let mut w = PacketWriter::new(out);
        w.set_seq(1);
        w
    }

    #[test]
    fn ok_packet_layout() {
        let mut out = Vec::new();
        let mut w = writer(&mut out);
        write_ok_packet(&mut w, 2, 5, StatusFlags::SERVER_STATUS_AUTOCOMMIT, 1).unwrap();
        drop(w);
        // header, then: type, rows, insert id, status, warnings
        assert_eq!(out, vec![0x07, 0, 0, 1, 0x00, 2, 5, 0x02, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn eof_packet_layout() {
        let mut out = Vec::new();
        let mut w = writer(&mut out);
        write_eof_packet(&mut w, StatusFlags::empty(), 3).unwrap();
        drop(w);
        assert_eq!(out, vec![0x05, 0, 0, 1, 0xFE, 3, 0, 0, 0]);
    }

    #[test]
    fn err_packet_carries_sqlstate_under_41() {
        let mut out = Vec::new();
        let mut w = writer(&mut out);
        write_err(
            ErrorKind::ER_BAD_DB_ERROR,
            b"Unknown database 'x'",
            &mut w,
            CapabilityFlags::CLIENT_PROTOCOL_41,
        )
        .unwrap();
        drop(w);
        assert_eq!(out[4], 0xFF);
        assert_eq!(u16::from_le_bytes([out[5], out[6]]), 1049);
        assert_eq!(out[7], b'#');
        assert_eq!(&out[8..13], b"42000");
        assert_eq!(&out[13..], b"Unknown database 'x'");
    }

    #[test]
    fn err_packet_omits_sqlstate_without_41() {
        let mut out = Vec::new();
        let mut w = writer(&mut out);
        write_err(
            ErrorKind::ER_UNKNOWN_COM_ERROR,
            b"nope",
            &mut w,
            CapabilityFlags::empty(),
        )
        .unwrap();
        drop(w);
        assert_eq!(&out[4..], &[0xFF, 0x17, 0x04, b'n', b'o', b'p', b'e'][..]);
    }

    #[test]
    fn prepare_ok_header() {
        let mut out = Vec::new();
        let mut w = writer(&mut out);
        write_prepare_ok(7, 3, &mut w, true).unwrap();
        drop(w);
        // first packet: 12 payload bytes
        assert_eq!(&out[..4], &[0x0C, 0, 0, 1]);
        assert_eq!(out[4], 0x00);
        assert_eq!(u32::from_le_bytes([out[5], out[6], out[7], out[8]]), 7);
        assert_eq!(u16::from_le_bytes([out[9], out[10]]), 0); // columns
        assert_eq!(u16::from_le_bytes([out[11], out[12]]), 3); // params
    }
}
