//! CRLF line framing for `tokio_util::codec::Framed`.
//!
//! Reads are UTF-8 first; a line that is not valid UTF-8 is decoded as
//! ISO-8859-1 instead (every byte maps to one char, so this never fails)
//! and the fallback is logged. A partial line that outgrows
//! [`MAX_PARTIAL_LINE`] is dropped up to its next terminator so one runaway
//! peer line cannot pin unbounded memory.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::error::ProtocolError;

/// High-water mark for a buffered, unterminated line.
pub const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// Line codec used on the uplink socket.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of the next byte to scan for `\n`.
    next_index: usize,
    max_len: usize,
    /// Set while skipping the tail of an oversize line.
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Codec with the default high-water mark.
    pub fn new() -> Self {
        Self::with_max_len(MAX_PARTIAL_LINE)
    }

    /// Codec with a custom high-water mark.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    fn decode_bytes(raw: &[u8]) -> String {
        match std::str::from_utf8(raw) {
            Ok(s) => s.to_owned(),
            Err(e) => {
                debug!(
                    valid_up_to = e.valid_up_to(),
                    "line is not utf-8, decoding as latin-1"
                );
                raw.iter().map(|&b| b as char).collect()
            }
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    warn!(
                        buffered = src.len(),
                        limit = self.max_len,
                        "discarding oversize partial line"
                    );
                    src.clear();
                    self.discarding = true;
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let body = line
                .strip_suffix(b"\n")
                .map(|b| b.strip_suffix(b"\r").unwrap_or(b))
                .unwrap_or(&line[..]);
            if body.is_empty() {
                continue;
            }
            return Ok(Some(Self::decode_bytes(body)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }
        let rest = src.split();
        self.next_index = 0;
        let body = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
        Ok(Some(Self::decode_bytes(body)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        // A stray CR/LF inside an outbound line would let the tail be read
        // as a second command by the peer.
        let end = msg.find(['\r', '\n']).unwrap_or(msg.len());
        dst.reserve(end + 2);
        dst.put_slice(&msg.as_bytes()[..end]);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn splits_crlf_and_bare_lf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :a\r\nPONG :b\nNOTICE"[..]);
        assert_eq!(drain(&mut codec, &mut buf), vec!["PING :a", "PONG :b"]);
        buf.extend_from_slice(b" x :tail\r\n");
        assert_eq!(drain(&mut codec, &mut buf), vec!["NOTICE x :tail"]);
    }

    #[test]
    fn skips_blank_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\r\n\r\nEOS\r\n"[..]);
        assert_eq!(drain(&mut codec, &mut buf), vec!["EOS"]);
    }

    #[test]
    fn latin1_fallback() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #x :caf\xe9\r\n"[..]);
        assert_eq!(drain(&mut codec, &mut buf), vec!["PRIVMSG #x :caf\u{e9}"]);
    }

    #[test]
    fn oversize_partial_is_dropped_until_terminator() {
        let mut codec = LineCodec::with_max_len(16);
        let mut buf = BytesMut::from(&[b'a'; 40][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
        buf.extend_from_slice(b"still junk\r\nPING :ok\r\n");
        assert_eq!(drain(&mut codec, &mut buf), vec!["PING :ok"]);
    }

    #[test]
    fn eof_flushes_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"SQUIT x :bye"[..]);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("SQUIT x :bye")
        );
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encoder_terminates_and_truncates_injection() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec.encode("PRIVMSG #a :hi".to_owned(), &mut dst).unwrap();
        codec
            .encode("PRIVMSG #a :x\r\nQUIT".to_owned(), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"PRIVMSG #a :hi\r\nPRIVMSG #a :x\r\n");
    }
}
