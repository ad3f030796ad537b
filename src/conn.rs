//! Per-connection state for the command phase.

use crate::myc::constants::{CapabilityFlags, StatusFlags};
use crate::packet::{PacketReader, PacketWriter};
use std::io::{self, Read, Write};
use tracing::error;

/// Initial state for a connection entering the command phase, as established
/// by the (out-of-scope) handshake and authentication exchange.
#[derive(Clone, Debug)]
pub struct ConnOptions {
    /// Server-assigned connection id, used in log lines.
    pub connection_id: u32,
    /// The authenticated tenant. Immutable for the connection's lifetime.
    pub tenant: String,
    /// Capabilities negotiated with the client.
    pub capabilities: CapabilityFlags,
    /// Initial server status flags.
    pub status_flags: StatusFlags,
}

impl Default for ConnOptions {
    fn default() -> Self {
        ConnOptions {
            connection_id: 0,
            tenant: String::new(),
            capabilities: CapabilityFlags::CLIENT_PROTOCOL_41
                | CapabilityFlags::CLIENT_MULTI_RESULTS,
            status_flags: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
        }
    }
}

/// One client connection in the command phase.
///
/// The dispatcher task is the single writer of every field; nothing here is
/// shared across connections.
pub struct Conn<R, W> {
    pub(crate) reader: PacketReader<R>,
    pub(crate) writer: PacketWriter<W>,
    id: u32,
    tenant: String,
    schema: Option<String>,
    capabilities: CapabilityFlags,
    status_flags: StatusFlags,
}

impl<R: Read, W: Write> Conn<R, W> {
    /// Wrap a connected, authenticated stream pair.
    pub fn new(reader: R, writer: W, opts: ConnOptions) -> Self {
        Conn {
            reader: PacketReader::new(reader),
            writer: PacketWriter::new(writer),
            id: opts.connection_id,
            tenant: opts.tenant,
            schema: None,
            capabilities: opts.capabilities,
            status_flags: opts.status_flags,
        }
    }

    /// The server-assigned connection id.
    pub fn connection_id(&self) -> u32 {
        self.id
    }

    /// The authenticated tenant.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The currently selected schema, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Capabilities in effect for this connection.
    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    /// Current server status flags.
    pub fn status_flags(&self) -> StatusFlags {
        self.status_flags
    }

    pub(crate) fn set_schema(&mut self, schema: String) {
        self.schema = Some(schema);
    }

    pub(crate) fn set_capability(&mut self, cap: CapabilityFlags, on: bool) {
        self.capabilities.set(cap, on);
    }

    pub(crate) fn deprecate_eof(&self) -> bool {
        self.capabilities
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    /// Return the read buffer so the next command can be read off the socket
    /// while downstream calls are in flight. Every handler calls this
    /// exactly once, before its first blocking collaborator call.
    pub(crate) fn recycle_read_packet(&mut self) {
        self.reader.recycle();
    }

    /// Run `f` with response buffering on.
    ///
    /// The buffer is flushed on every exit path; a flush failure takes
    /// precedence over the handler's own success but not over its error.
    pub(crate) fn buffered<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> io::Result<T>,
    ) -> io::Result<T> {
        self.writer.start_buffering();
        let res = f(self);
        match self.writer.end_buffering() {
            Ok(()) => res,
            Err(e) => {
                error!(conn = self.id, error = %e, "response flush failed");
                res.and(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn conn(input: Vec<u8>) -> Conn<Cursor<Vec<u8>>, Vec<u8>> {
        Conn::new(Cursor::new(input), Vec::new(), ConnOptions::default())
    }

    #[test]
    fn buffered_flushes_on_success_and_error() {
        let mut c = conn(Vec::new());
        c.buffered(|c| {
            use std::io::Write;
            c.writer.write_all(&[0x01])?;
            c.writer.end_packet()
        })
        .unwrap();

        let failed: io::Result<()> = c.buffered(|c| {
            use std::io::Write;
            c.writer.write_all(&[0x02])?;
            c.writer.end_packet()?;
            Err(io::Error::new(io::ErrorKind::Other, "handler failed"))
        });
        assert!(failed.is_err());
    }

    #[test]
    fn recycle_allows_next_read() {
        let mut c = conn(vec![0x01, 0, 0, 0, 0x0e, 0x01, 0, 0, 0, 0x01]);
        assert_eq!(c.reader.next().unwrap(), Some(0));
        assert_eq!(c.reader.payload(), &[0x0e]);
        c.recycle_read_packet();
        assert_eq!(c.reader.next().unwrap(), Some(0));
        assert_eq!(c.reader.payload(), &[0x01]);
    }
}
