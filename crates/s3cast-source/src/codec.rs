use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Splits a byte stream on `\n`, yielding each line with its terminator.
///
/// Line content is passed through untouched (no UTF-8 check, `\r` kept). A trailing
/// fragment without a terminator is completed with `\n` at end of stream.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    next_index: usize,
    max_length: Option<usize>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length: Some(max_length.max(1)),
        }
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    fn check_length(&self, content_len: usize) -> Result<(), io::Error> {
        match self.max_length {
            Some(max) if content_len > max => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {max} bytes"),
            )),
            _ => Ok(()),
        }
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let scan_from = self.next_index.min(src.len());
        let Some(offset) = src[scan_from..].iter().position(|byte| *byte == b'\n') else {
            self.check_length(src.len())?;
            self.next_index = src.len();
            return Ok(None);
        };

        let end = scan_from + offset + 1;
        self.next_index = 0;
        self.check_length(end - 1)?;
        Ok(Some(src.split_to(end).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }

        self.next_index = 0;
        let mut line = src.split_to(src.len());
        line.extend_from_slice(b"\n");
        Ok(Some(line.freeze()))
    }
}
