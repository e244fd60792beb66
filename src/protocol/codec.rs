//! # Line codec for handshake messages.
//!
//! [`MessageCodec`] frames each [`Message`] as one `\n`-terminated token.
//!
//! ## Rules
//! - Empty lines and a trailing `\r` are tolerated.
//! - Unknown tokens are **skipped** (logged), the stream stays usable.
//! - A frame longer than [`MAX_FRAME_LEN`] is a hard error: the peer is not
//!   speaking this protocol.
//! - At EOF an unterminated final token is still decoded.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{error::ProtocolError, protocol::Message};

/// Maximum accepted token length in bytes (terminator excluded).
pub const MAX_FRAME_LEN: usize = 64;

/// Newline-delimited codec for [`Message`].
#[derive(Debug, Default, Clone)]
pub struct MessageCodec {
    /// Bytes already searched for a terminator.
    scanned: usize,
}

impl MessageCodec {
    /// Creates a new codec.
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_line(line: &[u8]) -> Option<Message> {
        let Ok(text) = std::str::from_utf8(line) else {
            tracing::warn!(len = line.len(), "dropping non-utf8 control frame");
            return None;
        };
        let token = text.trim();
        if token.is_empty() {
            return None;
        }
        match Message::parse(token) {
            Ok(msg) => Some(msg),
            Err(err) => {
                tracing::warn!(error = %err, "dropping unrecognized control frame");
                None
            }
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            let newline = buf[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if buf.len() > MAX_FRAME_LEN {
                    return Err(ProtocolError::FrameTooLong { max: MAX_FRAME_LEN });
                }
                self.scanned = buf.len();
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            if end > MAX_FRAME_LEN {
                return Err(ProtocolError::FrameTooLong { max: MAX_FRAME_LEN });
            }

            let line = buf.split_to(end + 1);
            if let Some(msg) = Self::decode_line(&line[..end]) {
                return Ok(Some(msg));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if let Some(msg) = self.decode(buf)? {
            return Ok(Some(msg));
        }
        self.scanned = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Self::decode_line(rest.chunk()))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let token = msg.to_string();
        buf.reserve(token.len() + 1);
        buf.put_slice(token.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut MessageCodec, buf: &mut BytesMut) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(buf).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn decodes_several_frames_from_one_read() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("ready\nrestart\r\n\nexit:4\n");
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![Message::Ready, Message::Restart, Message::Exit { code: 4 }]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_the_terminator_across_reads() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("ser");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"ve\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::Serve));
    }

    #[test]
    fn skips_unknown_tokens() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("hello\nexit:oops\nready\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec![Message::Ready]);
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(vec![b'x'; MAX_FRAME_LEN + 1].as_slice());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLong { .. })
        ));
    }

    #[test]
    fn decodes_unterminated_token_at_eof() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from("ready\nexit:2");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Message::Ready));
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Message::Exit { code: 2 })
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn encodes_one_line_per_message() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::Serve, &mut buf).unwrap();
        codec.encode(Message::Exit { code: 7 }, &mut buf).unwrap();
        assert_eq!(&buf[..], b"serve\nexit:7\n");
    }
}
