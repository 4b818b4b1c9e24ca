//! Predictor-1 compression
//!
//! An adaptive byte-guess compressor: a 65536-entry table maps a rolling
//! hash of recent bytes to the byte most recently seen in that context.
//! Payloads are walked in groups of eight; each group emits one flag byte
//! (bit set = the table's guess was right, byte omitted) followed by the
//! mispredicted bytes. Both sides update their tables identically, so the
//! tables converge without any explicit dictionary exchange.
//!
//! The hash recurrence and group size are wire-compatibility critical and
//! must not change.

use tracing::debug;

use crate::hdlc::fcs::Fcs;

use super::{inner_protocol_bytes, parse_inner_protocol, Decoder, Desync, Encoder};

const TABLE_SIZE: usize = 1 << 16;

/// Rolling guess table shared by the compress/decompress/sync walks.
struct GuessTable {
    hash: u16,
    dict: Box<[u8; TABLE_SIZE]>,
}

impl GuessTable {
    fn new() -> Self {
        Self {
            hash: 0,
            dict: Box::new([0u8; TABLE_SIZE]),
        }
    }

    fn reset(&mut self) {
        self.hash = 0;
        self.dict.fill(0);
    }

    fn advance(&mut self, byte: u8) {
        self.hash = (self.hash << 4) ^ byte as u16;
    }

    /// Compress `source`, returning the flag-byte groups.
    fn compress(&mut self, source: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(source.len() + source.len() / 8 + 1);
        for group in source.chunks(8) {
            let flag_at = out.len();
            out.push(0u8);
            let mut flags = 0u8;
            for (i, &byte) in group.iter().enumerate() {
                if self.dict[self.hash as usize] == byte {
                    flags |= 1 << i;
                } else {
                    self.dict[self.hash as usize] = byte;
                    out.push(byte);
                }
                self.advance(byte);
            }
            out[flag_at] = flags;
        }
        out
    }

    /// Decompress flag-byte groups.
    fn decompress(&mut self, mut source: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(source.len() * 2);
        while let Some((&flags, rest)) = source.split_first() {
            source = rest;
            for i in 0..8 {
                let byte = if flags & (1 << i) != 0 {
                    self.dict[self.hash as usize]
                } else {
                    // A clear bit with no literal left means the final
                    // partial group is done.
                    let Some((&literal, rest)) = source.split_first() else {
                        break;
                    };
                    source = rest;
                    self.dict[self.hash as usize] = literal;
                    literal
                };
                out.push(byte);
                self.advance(byte);
            }
        }
        out
    }

    /// Walk plain bytes through the table without producing output.
    fn sync(&mut self, source: &[u8]) {
        for &byte in source {
            if self.dict[self.hash as usize] != byte {
                self.dict[self.hash as usize] = byte;
            }
            self.advance(byte);
        }
    }
}

/// Wrap a body in the Predictor-1 frame: length header (top bit flags a
/// compressed body), body, FCS of header-plus-original-data.
fn wrap(inner: &[u8], table: &mut GuessTable) -> Vec<u8> {
    let orglen = inner.len() as u16;
    let header = orglen.to_be_bytes();

    // The FCS covers the length header with the flag bit clear, plus the
    // uncompressed data.
    let mut fcs = Fcs::new();
    fcs.update(&header);
    fcs.update(inner);
    let trailer = fcs.trailer();

    let body = table.compress(inner);
    let mut out = Vec::with_capacity(4 + body.len().min(inner.len()));
    if body.len() < inner.len() {
        out.push(header[0] | 0x80);
        out.push(header[1]);
        out.extend_from_slice(&body);
    } else {
        // Compression did not pay; the table was still updated above and
        // the receiver re-synchronizes from the plain bytes.
        out.extend_from_slice(&header);
        out.extend_from_slice(inner);
    }
    out.extend_from_slice(&trailer);
    out
}

/// Transmit-side Predictor-1 state.
pub struct Predictor1Encoder {
    table: GuessTable,
}

impl Predictor1Encoder {
    pub fn new() -> Self {
        Self {
            table: GuessTable::new(),
        }
    }
}

impl Default for Predictor1Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for Predictor1Encoder {
    fn reset(&mut self) {
        self.table.reset();
    }

    fn encode(&mut self, proto: u16, payload: &[u8]) -> Option<Vec<u8>> {
        let mut inner = inner_protocol_bytes(proto);
        inner.extend_from_slice(payload);
        if inner.len() > 0x7fff {
            return None;
        }
        Some(wrap(&inner, &mut self.table))
    }

    fn feed(&mut self, proto: u16, payload: &[u8]) {
        let mut inner = inner_protocol_bytes(proto);
        inner.extend_from_slice(payload);
        self.table.sync(&inner);
    }
}

/// Receive-side Predictor-1 state.
pub struct Predictor1Decoder {
    table: GuessTable,
}

impl Predictor1Decoder {
    pub fn new() -> Self {
        Self {
            table: GuessTable::new(),
        }
    }
}

impl Default for Predictor1Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Predictor1Decoder {
    fn reset(&mut self) {
        self.table.reset();
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(u16, Vec<u8>), Desync> {
        if payload.len() < 4 {
            return Err(Desync::Truncated);
        }
        let header = u16::from_be_bytes([payload[0], payload[1]]);
        let compressed = header & 0x8000 != 0;
        let orglen = (header & 0x7fff) as usize;
        let body = &payload[2..payload.len() - 2];

        let inner = if compressed {
            let inner = self.table.decompress(body);
            if inner.len() != orglen {
                debug!(
                    got = inner.len(),
                    expected = orglen,
                    "predictor length mismatch"
                );
                return Err(Desync::BadCheck);
            }
            inner
        } else {
            if body.len() != orglen {
                return Err(Desync::BadCheck);
            }
            self.table.sync(body);
            body.to_vec()
        };

        let mut fcs = Fcs::new();
        fcs.update(&(orglen as u16).to_be_bytes());
        fcs.update(&inner);
        fcs.update(&payload[payload.len() - 2..]);
        if !fcs.is_good() {
            return Err(Desync::BadCheck);
        }

        let (proto, used) = parse_inner_protocol(&inner)?;
        Ok((proto, inner[used..].to_vec()))
    }

    fn feed(&mut self, proto: u16, payload: &[u8]) {
        let mut inner = inner_protocol_bytes(proto);
        inner.extend_from_slice(payload);
        self.table.sync(&inner);
    }
}
