//! Wrapper line framing
//!
//! Splits the shell byte stream on `\n`. The wrapper and the remote tty are
//! not guaranteed to produce UTF-8 or bounded lines, so decoding never fails:
//! invalid sequences become U+FFFD and a line longer than the limit is
//! skipped up to its terminating newline.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

pub struct WrapperLineCodec {
    max_length: usize,
    /// Bytes already searched for a newline
    next_index: usize,
    /// Inside an overlong line, dropping until the next newline
    discarding: bool,
}

impl WrapperLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

impl Decoder for WrapperLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            if self.discarding {
                match buf.iter().position(|b| *b == b'\n') {
                    Some(offset) => {
                        buf.advance(offset + 1);
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        buf.clear();
                        return Ok(None);
                    }
                }
            }

            let read_to = buf.len().min(self.max_length.saturating_add(1));
            match buf[self.next_index..read_to].iter().position(|b| *b == b'\n') {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);
                    return Ok(Some(decode_line(&line[..end])));
                }
                None if buf.len() > self.max_length => {
                    warn!(
                        "Discarding input line longer than {} bytes",
                        self.max_length
                    );
                    buf.advance(read_to);
                    self.next_index = 0;
                    self.discarding = true;
                }
                None => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        Ok(Some(decode_line(&rest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut WrapperLineCodec, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_crlf_and_lf_terminators() {
        let mut codec = WrapperLineCodec::new(64);
        assert_eq!(
            decode_all(&mut codec, b">00> OK\r\n>02> x\n\r\n"),
            vec![">00> OK", ">02> x", ""]
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = WrapperLineCodec::new(64);
        assert_eq!(
            decode_all(&mut codec, b">02> caf\xE9\n"),
            vec![">02> caf\u{FFFD}"]
        );
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut codec = WrapperLineCodec::new(64);
        let mut buf = BytesMut::from(&b">02> OpenVPN"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" 2.6\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some(">02> OpenVPN 2.6")
        );
    }

    #[test]
    fn test_overlong_line_skipped_across_reads() {
        let mut codec = WrapperLineCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"ghij\nshort\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("short"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_line_at_limit_is_kept() {
        let mut codec = WrapperLineCodec::new(8);
        assert_eq!(
            decode_all(&mut codec, b"01234567\n012345678\nok\n"),
            vec!["01234567", "ok"]
        );
    }

    #[test]
    fn test_eof_flushes_unterminated_line() {
        let mut codec = WrapperLineCodec::new(64);
        let mut buf = BytesMut::from(&b">00> OK\r\n.00. bye"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some(">00> OK"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some(".00. bye"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
