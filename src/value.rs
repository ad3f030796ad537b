//! Cell-level codec for the MySQL wire protocol.
//!
//! Bind variables arrive in the binary protocol and are decoded into owned
//! [`Value`]s so they can outlive the read buffer. Row cells go out either
//! lenenc-text or binary, driven by [`ToMysqlValue`].

use crate::myc::constants::ColumnType;
use crate::myc::io::{ReadMysqlExt, WriteMysqlExt};
use crate::myc::value::Value;
use crate::Column;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::io::{self, Write};

fn take<'a>(input: &mut &'a [u8], len: usize) -> io::Result<&'a [u8]> {
    if len > input.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "EOF while reading length-encoded value",
        ));
    }
    let (bits, rest) = input.split_at(len);
    *input = rest;
    Ok(bits)
}

/// Decode one binary-protocol value of the given column type, advancing
/// `input` past it.
pub(crate) fn decode_binary(input: &mut &[u8], ct: ColumnType, unsigned: bool) -> io::Result<Value> {
    match ct {
        ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_SET
        | ColumnType::MYSQL_TYPE_ENUM
        | ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL
        | ColumnType::MYSQL_TYPE_BIT
        | ColumnType::MYSQL_TYPE_GEOMETRY
        | ColumnType::MYSQL_TYPE_JSON => {
            let len = input.read_lenenc_int()?;
            Ok(Value::Bytes(take(input, len as usize)?.to_vec()))
        }
        ColumnType::MYSQL_TYPE_TINY => {
            if unsigned {
                Ok(Value::UInt(u64::from(input.read_u8()?)))
            } else {
                Ok(Value::Int(i64::from(input.read_i8()?)))
            }
        }
        ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                Ok(Value::UInt(u64::from(input.read_u16::<LittleEndian>()?)))
            } else {
                Ok(Value::Int(i64::from(input.read_i16::<LittleEndian>()?)))
            }
        }
        ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
            if unsigned {
                Ok(Value::UInt(u64::from(input.read_u32::<LittleEndian>()?)))
            } else {
                Ok(Value::Int(i64::from(input.read_i32::<LittleEndian>()?)))
            }
        }
        ColumnType::MYSQL_TYPE_LONGLONG => {
            if unsigned {
                Ok(Value::UInt(input.read_u64::<LittleEndian>()?))
            } else {
                Ok(Value::Int(input.read_i64::<LittleEndian>()?))
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT => Ok(Value::Float(input.read_f32::<LittleEndian>()?)),
        ColumnType::MYSQL_TYPE_DOUBLE => Ok(Value::Double(input.read_f64::<LittleEndian>()?)),
        ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATE => {
            let len = input.read_u8()?;
            let mut v = take(input, len as usize)?;
            match len {
                0 => Ok(Value::Date(0, 0, 0, 0, 0, 0, 0)),
                4 => Ok(Value::Date(
                    v.read_u16::<LittleEndian>()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    0,
                    0,
                    0,
                    0,
                )),
                7 => Ok(Value::Date(
                    v.read_u16::<LittleEndian>()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    0,
                )),
                11 => Ok(Value::Date(
                    v.read_u16::<LittleEndian>()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u32::<LittleEndian>()?,
                )),
                n => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad temporal encoding length {}", n),
                )),
            }
        }
        ColumnType::MYSQL_TYPE_TIME => {
            let len = input.read_u8()?;
            let mut v = take(input, len as usize)?;
            match len {
                0 => Ok(Value::Time(false, 0, 0, 0, 0, 0)),
                8 => Ok(Value::Time(
                    v.read_u8()? != 0,
                    v.read_u32::<LittleEndian>()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    0,
                )),
                12 => Ok(Value::Time(
                    v.read_u8()? != 0,
                    v.read_u32::<LittleEndian>()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u8()?,
                    v.read_u32::<LittleEndian>()?,
                )),
                n => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad duration encoding length {}", n),
                )),
            }
        }
        ColumnType::MYSQL_TYPE_NULL => Ok(Value::NULL),
        ct => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported parameter type {:?}", ct),
        )),
    }
}

/// Something that can be written as a result-row cell.
pub trait ToMysqlValue {
    /// Encode this value in the text protocol (lenenc string, `0xFB` for
    /// NULL).
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()>;

    /// Encode this value in the binary protocol. NULL cells are recorded in
    /// the row's NULL bitmap instead and must not reach this method.
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()>;

    /// Whether the cell goes into the binary row's NULL bitmap.
    fn is_null(&self) -> bool {
        false
    }
}

fn bad_cell(c: &Column) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("cell does not match column type {:?}", c.coltype),
    )
}

impl ToMysqlValue for u8 {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        u64::from(*self).to_mysql_bin(w, c)
    }
}

impl ToMysqlValue for i8 {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        i64::from(*self).to_mysql_bin(w, c)
    }
}

macro_rules! mysql_widening_impl {
    ($t:ty => $via:ty) => {
        impl ToMysqlValue for $t {
            fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
                w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
            }
            fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
                <$via>::from(*self).to_mysql_bin(w, c)
            }
        }
    };
}

mysql_widening_impl!(u16 => u64);
mysql_widening_impl!(u32 => u64);
mysql_widening_impl!(i16 => i64);
mysql_widening_impl!(i32 => i64);

impl ToMysqlValue for u64 {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_TINY => w.write_u8(*self as u8),
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                w.write_u16::<LittleEndian>(*self as u16)
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                w.write_u32::<LittleEndian>(*self as u32)
            }
            ColumnType::MYSQL_TYPE_LONGLONG => w.write_u64::<LittleEndian>(*self),
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for i64 {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_TINY => w.write_i8(*self as i8),
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                w.write_i16::<LittleEndian>(*self as i16)
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                w.write_i32::<LittleEndian>(*self as i32)
            }
            ColumnType::MYSQL_TYPE_LONGLONG => w.write_i64::<LittleEndian>(*self),
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for f32 {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_FLOAT => w.write_f32::<LittleEndian>(*self),
            ColumnType::MYSQL_TYPE_DOUBLE => w.write_f64::<LittleEndian>(f64::from(*self)),
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for f64 {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self.to_string().as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_DOUBLE => w.write_f64::<LittleEndian>(*self),
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for str {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.as_bytes().to_mysql_text(w)
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        self.as_bytes().to_mysql_bin(w, c)
    }
}

impl ToMysqlValue for &str {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (**self).to_mysql_text(w)
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        (**self).to_mysql_bin(w, c)
    }
}

impl ToMysqlValue for String {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.as_str().to_mysql_text(w)
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        self.as_str().to_mysql_bin(w, c)
    }
}

impl ToMysqlValue for [u8] {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(self).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_BIT
            | ColumnType::MYSQL_TYPE_GEOMETRY
            | ColumnType::MYSQL_TYPE_JSON => w.write_lenenc_str(self).map(|_| ()),
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for &[u8] {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (**self).to_mysql_text(w)
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        (**self).to_mysql_bin(w, c)
    }
}

impl ToMysqlValue for Vec<u8> {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.as_slice().to_mysql_text(w)
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        self.as_slice().to_mysql_bin(w, c)
    }
}

impl<T: ToMysqlValue> ToMysqlValue for Option<T> {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match *self {
            Some(ref v) => v.to_mysql_text(w),
            None => w.write_u8(0xFB),
        }
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match *self {
            Some(ref v) => v.to_mysql_bin(w, c),
            // recorded in the NULL bitmap by the row writer
            None => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "NULL cell reached binary encoding",
            )),
        }
    }
    fn is_null(&self) -> bool {
        self.is_none()
    }
}

impl ToMysqlValue for NaiveDate {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_lenenc_str(
            format!("{:04}-{:02}-{:02}", self.year(), self.month(), self.day()).as_bytes(),
        )
        .map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_DATE => {
                w.write_u8(4)?;
                w.write_u16::<LittleEndian>(self.year() as u16)?;
                w.write_u8(self.month() as u8)?;
                w.write_u8(self.day() as u8)
            }
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for NaiveDateTime {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let us = self.nanosecond() / 1_000;
        let s = if us != 0 {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                self.year(),
                self.month(),
                self.day(),
                self.hour(),
                self.minute(),
                self.second(),
                us
            )
        } else {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                self.year(),
                self.month(),
                self.day(),
                self.hour(),
                self.minute(),
                self.second()
            )
        };
        w.write_lenenc_str(s.as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                let us = self.nanosecond() / 1_000;
                w.write_u8(if us != 0 { 11 } else { 7 })?;
                w.write_u16::<LittleEndian>(self.year() as u16)?;
                w.write_u8(self.month() as u8)?;
                w.write_u8(self.day() as u8)?;
                w.write_u8(self.hour() as u8)?;
                w.write_u8(self.minute() as u8)?;
                w.write_u8(self.second() as u8)?;
                if us != 0 {
                    w.write_u32::<LittleEndian>(us)?;
                }
                Ok(())
            }
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for std::time::Duration {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let s = self.as_secs();
        let us = self.subsec_micros();
        let text = if us != 0 {
            format!("{:02}:{:02}:{:02}.{:06}", s / 3600, (s % 3600) / 60, s % 60, us)
        } else {
            format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
        };
        w.write_lenenc_str(text.as_bytes()).map(|_| ())
    }
    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match c.coltype {
            ColumnType::MYSQL_TYPE_TIME => {
                let s = self.as_secs();
                let us = self.subsec_micros();
                w.write_u8(if us != 0 { 12 } else { 8 })?;
                w.write_u8(0)?;
                w.write_u32::<LittleEndian>((s / 86_400) as u32)?;
                w.write_u8(((s % 86_400) / 3_600) as u8)?;
                w.write_u8(((s % 3_600) / 60) as u8)?;
                w.write_u8((s % 60) as u8)?;
                if us != 0 {
                    w.write_u32::<LittleEndian>(us)?;
                }
                Ok(())
            }
            _ => Err(bad_cell(c)),
        }
    }
}

impl ToMysqlValue for Value {
    fn to_mysql_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match *self {
            Value::NULL => w.write_u8(0xFB),
            Value::Bytes(ref b) => w.write_lenenc_str(&b[..]).map(|_| ()),
            Value::Int(n) => n.to_mysql_text(w),
            Value::UInt(n) => n.to_mysql_text(w),
            Value::Float(f) => f.to_mysql_text(w),
            Value::Double(f) => f.to_mysql_text(w),
            Value::Date(y, mo, d, h, mi, s, us) => {
                let text = if h == 0 && mi == 0 && s == 0 && us == 0 {
                    format!("{:04}-{:02}-{:02}", y, mo, d)
                } else if us == 0 {
                    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s)
                } else {
                    format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                        y, mo, d, h, mi, s, us
                    )
                };
                w.write_lenenc_str(text.as_bytes()).map(|_| ())
            }
            Value::Time(neg, d, h, mi, s, us) => {
                let sign = if neg { "-" } else { "" };
                let hours = u64::from(d) * 24 + u64::from(h);
                let text = if us == 0 {
                    format!("{}{:02}:{:02}:{:02}", sign, hours, mi, s)
                } else {
                    format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us)
                };
                w.write_lenenc_str(text.as_bytes()).map(|_| ())
            }
        }
    }

    fn to_mysql_bin<W: Write>(&self, w: &mut W, c: &Column) -> io::Result<()> {
        match *self {
            Value::NULL => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "NULL cell reached binary encoding",
            )),
            Value::Bytes(ref b) => b.to_mysql_bin(w, c),
            Value::Int(n) => n.to_mysql_bin(w, c),
            Value::UInt(n) => n.to_mysql_bin(w, c),
            Value::Float(f) => f.to_mysql_bin(w, c),
            Value::Double(f) => f.to_mysql_bin(w, c),
            Value::Date(y, mo, d, h, mi, s, us) => {
                if us != 0 {
                    w.write_u8(11)?;
                } else if h != 0 || mi != 0 || s != 0 {
                    w.write_u8(7)?;
                } else if y != 0 || mo != 0 || d != 0 {
                    w.write_u8(4)?;
                } else {
                    return w.write_u8(0);
                }
                w.write_u16::<LittleEndian>(y)?;
                w.write_u8(mo)?;
                w.write_u8(d)?;
                if h != 0 || mi != 0 || s != 0 || us != 0 {
                    w.write_u8(h)?;
                    w.write_u8(mi)?;
                    w.write_u8(s)?;
                    if us != 0 {
                        w.write_u32::<LittleEndian>(us)?;
                    }
                }
                Ok(())
            }
            Value::Time(neg, d, h, mi, s, us) => {
                if d == 0 && h == 0 && mi == 0 && s == 0 && us == 0 {
                    return w.write_u8(0);
                }
                w.write_u8(if us != 0 { 12 } else { 8 })?;
                w.write_u8(u8::from(neg))?;
                w.write_u32::<LittleEndian>(d)?;
                w.write_u8(h)?;
                w.write_u8(mi)?;
                w.write_u8(s)?;
                if us != 0 {
                    w.write_u32::<LittleEndian>(us)?;
                }
                Ok(())
            }
        }
    }

    fn is_null(&self) -> bool {
        matches!(*self, Value::NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::myc::constants::ColumnFlags;

    fn col(ct: ColumnType) -> Column {
        Column {
            table: String::new(),
            column: "c".to_owned(),
            coltype: ct,
            colflags: ColumnFlags::empty(),
        }
    }

    #[test]
    fn decodes_longlong() {
        let mut raw = &[0x2a, 0, 0, 0, 0, 0, 0, 0][..];
        let v = decode_binary(&mut raw, ColumnType::MYSQL_TYPE_LONGLONG, false).unwrap();
        assert_eq!(v, Value::Int(42));
        assert!(raw.is_empty());
    }

    #[test]
    fn decodes_lenenc_string() {
        let mut raw = &[0x03, b'f', b'o', b'o', 0xff][..];
        let v = decode_binary(&mut raw, ColumnType::MYSQL_TYPE_VAR_STRING, false).unwrap();
        assert_eq!(v, Value::Bytes(b"foo".to_vec()));
        assert_eq!(raw, &[0xff]);
    }

    #[test]
    fn decodes_datetime() {
        let mut raw = &[7, 0xe7, 0x07, 8, 2, 13, 30, 5][..];
        let v = decode_binary(&mut raw, ColumnType::MYSQL_TYPE_DATETIME, false).unwrap();
        assert_eq!(v, Value::Date(2023, 8, 2, 13, 30, 5, 0));
    }

    #[test]
    fn text_encoding_is_lenenc() {
        let mut out = Vec::new();
        42u32.to_mysql_text(&mut out).unwrap();
        assert_eq!(out, vec![0x02, b'4', b'2']);

        out.clear();
        Value::NULL.to_mysql_text(&mut out).unwrap();
        assert_eq!(out, vec![0xFB]);
    }

    #[test]
    fn bin_encoding_follows_column_type() {
        let mut out = Vec::new();
        Value::Int(7).to_mysql_bin(&mut out, &col(ColumnType::MYSQL_TYPE_LONG)).unwrap();
        assert_eq!(out, vec![7, 0, 0, 0]);

        out.clear();
        assert!(Value::Int(7)
            .to_mysql_bin(&mut out, &col(ColumnType::MYSQL_TYPE_DATE))
            .is_err());
    }
}
