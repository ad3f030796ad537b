use byteorder::{ByteOrder, LittleEndian};
use std::io;
use std::io::prelude::*;

pub(crate) const U24_MAX: usize = 16_777_215;

/// Reads length-prefixed MySQL packets off a stream into a buffer that is
/// reused across commands.
///
/// [`next`](PacketReader::next) fills the buffer with the next command's
/// payload (continuation frames concatenated); [`recycle`](PacketReader::recycle)
/// returns the buffer so the following command can be read. Handlers copy
/// what they need out of [`payload`](PacketReader::payload) and recycle
/// before their first blocking downstream call.
pub struct PacketReader<R> {
    r: R,
    payload: Vec<u8>,
    live: bool,
}

impl<R: Read> PacketReader<R> {
    pub fn new(r: R) -> Self {
        PacketReader {
            r,
            payload: Vec::new(),
            live: false,
        }
    }

    /// Read the next packet, returning the sequence number of its last
    /// frame, or `None` on a clean end-of-stream between packets.
    pub fn next(&mut self) -> io::Result<Option<u8>> {
        debug_assert!(!self.live, "previous packet was not recycled");
        self.payload.clear();

        let mut seq;
        loop {
            let first = self.payload.is_empty();
            let mut header = [0u8; 4];
            let mut at = 0;
            while at < header.len() {
                let n = self.r.read(&mut header[at..])?;
                if n == 0 {
                    if at == 0 && first {
                        return Ok(None);
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "truncated packet header",
                    ));
                }
                at += n;
            }

            let len = LittleEndian::read_u24(&header[..3]) as usize;
            seq = header[3];

            let end = self.payload.len();
            self.payload.resize(end + len, 0);
            self.r.read_exact(&mut self.payload[end..])?;

            if len < U24_MAX {
                break;
            }
        }

        self.live = true;
        Ok(Some(seq))
    }

    /// The payload of the packet most recently returned by `next`.
    pub fn payload(&self) -> &[u8] {
        debug_assert!(self.live, "no packet pending");
        &self.payload
    }

    /// Return the read buffer, allowing the next packet to be read while
    /// downstream calls are still in flight.
    pub fn recycle(&mut self) {
        self.payload.clear();
        self.live = false;
    }
}

/// Frames written bytes into MySQL packets, with an explicit per-response
/// buffering mode.
///
/// While buffering, finished packets accumulate and reach the underlying
/// stream only on [`end_buffering`](PacketWriter::end_buffering), which is
/// the one flush of a response. Payloads at the 2^24-1 boundary are split
/// into continuation frames automatically.
pub struct PacketWriter<W> {
    w: W,
    // current packet, 4 bytes of header space up front
    packet: Vec<u8>,
    // finished frames held back while buffering
    pending: Vec<u8>,
    buffering: bool,
    seq: u8,
}

impl<W: Write> Write for PacketWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::cmp::min;
        let left = min(buf.len(), U24_MAX - (self.packet.len() - 4));
        self.packet.extend_from_slice(&buf[..left]);

        if self.packet.len() - 4 == U24_MAX {
            self.end_packet()?;
        }
        Ok(left)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.end_packet()?;
        self.write_out()?;
        self.w.flush()
    }
}

impl<W: Write> PacketWriter<W> {
    pub fn new(w: W) -> Self {
        PacketWriter {
            w,
            packet: vec![0, 0, 0, 0],
            pending: Vec::new(),
            buffering: false,
            seq: 0,
        }
    }

    /// Reset the sequence counter at the start of a new command cycle.
    pub fn set_seq(&mut self, seq: u8) {
        self.seq = seq;
    }

    /// Finish the packet under construction, if any.
    pub fn end_packet(&mut self) -> io::Result<()> {
        let len = self.packet.len() - 4;
        if len == 0 {
            return Ok(());
        }

        LittleEndian::write_u24(&mut self.packet[..3], len as u32);
        self.packet[3] = self.seq;
        self.seq = self.seq.wrapping_add(1);

        if self.buffering {
            self.pending.extend_from_slice(&self.packet);
        } else {
            self.w.write_all(&self.packet)?;
        }
        self.packet.truncate(4);
        Ok(())
    }

    fn write_out(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.w.write_all(&self.pending)?;
            self.pending.clear();
        }
        Ok(())
    }

    /// Begin holding finished packets back until `end_buffering`.
    pub fn start_buffering(&mut self) {
        debug_assert!(!self.buffering, "response buffering does not nest");
        self.buffering = true;
    }

    /// Release held packets to the stream and flush it. This is the only
    /// flush of a buffered response and runs on every exit path.
    pub fn end_buffering(&mut self) -> io::Result<()> {
        self.end_packet()?;
        self.buffering = false;
        self.write_out()?;
        self.w.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_one_packet() {
        let mut r = PacketReader::new(Cursor::new(vec![0x01, 0, 0, 0x2a, 0x10]));
        let seq = r.next().unwrap().unwrap();
        assert_eq!(seq, 0x2a);
        assert_eq!(r.payload(), &[0x10]);
        r.recycle();
        assert!(r.next().unwrap().is_none());
    }

    #[test]
    fn read_continuation_frames() {
        let mut data = vec![0xff, 0xff, 0xff, 0];
        data.extend(std::iter::repeat(0u8).take(U24_MAX));
        data.extend([0x01, 0x00, 0x00, 1, 0x10]);

        let mut r = PacketReader::new(Cursor::new(data));
        let seq = r.next().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(r.payload().len(), U24_MAX + 1);
        assert_eq!(r.payload()[U24_MAX], 0x10);
    }

    #[test]
    fn truncated_header_is_an_error() {
        let mut r = PacketReader::new(Cursor::new(vec![0x01, 0]));
        assert_eq!(r.next().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn write_frames_and_sequences() {
        let mut out = Vec::new();
        {
            let mut w = PacketWriter::new(&mut out);
            w.set_seq(1);
            w.write_all(&[0xaa, 0xbb]).unwrap();
            w.end_packet().unwrap();
            w.write_all(&[0xcc]).unwrap();
            w.flush().unwrap();
        }
        assert_eq!(out, vec![0x02, 0, 0, 1, 0xaa, 0xbb, 0x01, 0, 0, 2, 0xcc]);
    }

    #[test]
    fn buffering_holds_until_end() {
        let mut out = Vec::new();
        {
            let mut w = PacketWriter::new(&mut out);
            w.start_buffering();
            w.write_all(&[0x01]).unwrap();
            w.end_packet().unwrap();
            assert!(!w.pending.is_empty());
            w.end_buffering().unwrap();
        }
        assert_eq!(out, vec![0x01, 0, 0, 0, 0x01]);
    }
}
