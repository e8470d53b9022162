use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::smtp::{CRLF, Response};

/// Tokio codec that frames CRLF-terminated lines in and writes responses out.
///
/// Decoding buffers bytes across reads and yields everything before each
/// `\r\n` as one line, in arrival order. Lines have no length limit.
#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    // Bytes before this offset are known not to start a terminator, except
    // possibly the last one (a CR waiting for its LF)
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.next_index.saturating_sub(1).min(src.len());
        let found = src[start..]
            .windows(CRLF.len())
            .position(|w| w == CRLF.as_bytes());

        let Some(offset) = found else {
            self.next_index = src.len();
            return Ok(None);
        };

        self.next_index = 0;
        let line = src.split_to(start + offset);
        src.advance(CRLF.len());
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                // An unterminated tail is never a line
                src.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Response> for LineCodec {
    type Error = crate::Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.to_string().as_bytes());
        Ok(())
    }
}
