use crate::myc::constants::Command as CommandByte;

/// A decoded command packet, borrowing its payload from the read buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `COM_INIT_DB`: switch to the named schema.
    InitDb(&'a [u8]),
    /// `COM_QUERY`: execute SQL text.
    Query(&'a [u8]),
    /// `COM_FIELD_LIST`: column definitions for a table.
    ListFields(&'a [u8]),
    /// `COM_STMT_PREPARE`: prepare SQL text.
    Prepare(&'a [u8]),
    /// `COM_STMT_EXECUTE`: execute a prepared statement. The payload after
    /// the command byte is kept whole; bind decoding owns its layout.
    Execute(&'a [u8]),
    /// `COM_STMT_CLOSE`: drop a prepared statement.
    Close(u32),
    /// `COM_STMT_RESET`: clear a prepared statement's bind variables.
    /// `None` when the id is missing from the packet.
    StmtReset(Option<u32>),
    /// `COM_SET_OPTION`: toggle multi-statement support.
    /// `None` when the operation bytes are missing.
    SetOption(Option<u16>),
    /// `COM_PING`.
    Ping,
    /// `COM_QUIT`.
    Quit,
}

pub fn parse(i: &[u8]) -> nom::IResult<&[u8], Command<'_>> {
    use nom::bytes::complete::tag;
    use nom::combinator::{map, opt, rest};
    use nom::number::complete::{le_u16, le_u32};
    use nom::sequence::preceded;
    nom::branch::alt((
        map(
            preceded(tag(&[CommandByte::COM_INIT_DB as u8]), rest),
            Command::InitDb,
        ),
        map(
            preceded(tag(&[CommandByte::COM_QUERY as u8]), rest),
            Command::Query,
        ),
        map(
            preceded(tag(&[CommandByte::COM_FIELD_LIST as u8]), rest),
            Command::ListFields,
        ),
        map(
            preceded(tag(&[CommandByte::COM_STMT_PREPARE as u8]), rest),
            Command::Prepare,
        ),
        map(
            preceded(tag(&[CommandByte::COM_STMT_EXECUTE as u8]), rest),
            Command::Execute,
        ),
        map(
            preceded(tag(&[CommandByte::COM_STMT_CLOSE as u8]), le_u32),
            Command::Close,
        ),
        map(
            preceded(tag(&[CommandByte::COM_STMT_RESET as u8]), opt(le_u32)),
            Command::StmtReset,
        ),
        map(
            preceded(tag(&[CommandByte::COM_SET_OPTION as u8]), opt(le_u16)),
            Command::SetOption,
        ),
        map(tag(&[CommandByte::COM_PING as u8]), |_| Command::Ping),
        map(tag(&[CommandByte::COM_QUIT as u8]), |_| Command::Quit),
    ))(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_init_db() {
        let (_, cmd) = parse(b"\x02app").unwrap();
        assert_eq!(cmd, Command::InitDb(&b"app"[..]));
    }

    #[test]
    fn it_parses_query() {
        let (_, cmd) = parse(b"\x03select @@version_comment limit 1").unwrap();
        assert_eq!(cmd, Command::Query(&b"select @@version_comment limit 1"[..]));
    }

    #[test]
    fn it_parses_field_list() {
        let (_, cmd) = parse(b"\x04t1\x00").unwrap();
        assert_eq!(cmd, Command::ListFields(&b"t1\x00"[..]));
    }

    #[test]
    fn it_parses_execute_payload_whole() {
        let (_, cmd) = parse(&[0x17, 0x05, 0, 0, 0, 0x00, 0x01, 0, 0, 0]).unwrap();
        assert_eq!(cmd, Command::Execute(&[0x05, 0, 0, 0, 0x00, 0x01, 0, 0, 0][..]));
    }

    #[test]
    fn it_parses_stmt_reset() {
        let (_, cmd) = parse(&[0x1a, 0x07, 0, 0, 0]).unwrap();
        assert_eq!(cmd, Command::StmtReset(Some(7)));
        let (_, cmd) = parse(&[0x1a]).unwrap();
        assert_eq!(cmd, Command::StmtReset(None));
    }

    #[test]
    fn it_parses_set_option() {
        let (_, cmd) = parse(&[0x1b, 0x01, 0x00]).unwrap();
        assert_eq!(cmd, Command::SetOption(Some(1)));
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(parse(&[0x1f]).is_err());
    }
}
