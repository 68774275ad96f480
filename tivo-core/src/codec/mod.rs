//! Line codec for the TCP control channel.
//!
//! Outbound items are written as their `Display` text followed by a bare
//! carriage return. Inbound bytes are split at `\r` or `\n`; bytes that
//! arrive without any terminator are yielded as one message, because the
//! emulator and some firmware send unterminated status lines.

use std::fmt;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TivoError;
use crate::protocol::{COMMAND_TERMINATOR, MAX_MESSAGE_SIZE};

#[derive(Debug, Default, Clone, Copy)]
pub struct ControlCodec;

impl Decoder for ControlCodec {
    type Item = String;
    type Error = TivoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            let line = match src.iter().position(|b| *b == b'\r' || *b == b'\n') {
                Some(end) => {
                    let line = src.split_to(end);
                    src.advance(1);
                    line
                }
                None => src.split_to(src.len().min(MAX_MESSAGE_SIZE)),
            };

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
}

impl<T: fmt::Display> Encoder<T> for ControlCodec {
    type Error = TivoError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_string();
        if line.contains(['\r', '\n']) {
            return Err(TivoError::InvalidCommand(format!(
                "embedded line break in {line:?}"
            )));
        }
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(&[COMMAND_TERMINATOR]);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
