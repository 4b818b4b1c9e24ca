//! Deflate compression - RFC 1979 framing
//!
//! Wraps raw deflate/inflate streams. Every compressed frame carries a
//! 16-bit sequence number and is flushed to a byte boundary; the four-byte
//! empty stored block the sync flush emits is stripped before transmit and
//! replayed into the decompressor after each frame, keeping the sliding
//! windows on both ends identical. Frames that travel uncompressed are fed
//! through both dictionaries as stored data for the same reason.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::{debug, warn};

use crate::fsm::ReqJudgement;
use crate::protocol::cp::encode_option;
use crate::protocol::cp::ccp_options;

use super::{inner_protocol_bytes, parse_inner_protocol, Decoder, Desync, Encoder};

/// Largest window size the option encoding can carry.
pub const MAX_WINDOW_BITS: u8 = 15;

/// Smallest window size we accept.
pub const MIN_WINDOW_BITS: u8 = 8;

/// The empty stored block emitted by a sync flush.
const SYNC_MARKER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Option data bytes: window bits packed into the high nibble, fixed
/// method nibble 8, then a zero method byte.
pub fn option_data(window_bits: u8) -> Vec<u8> {
    let w = window_bits.clamp(MIN_WINDOW_BITS, MAX_WINDOW_BITS);
    vec![((w - 8) << 4) | 8, 0]
}

/// Extract the window size from option data, defaulting when absent.
pub fn window_from_option(data: &[u8]) -> u8 {
    match data.first() {
        Some(b) => ((b >> 4) + 8).clamp(MIN_WINDOW_BITS, MAX_WINDOW_BITS),
        None => MAX_WINDOW_BITS,
    }
}

/// Judge a peer-proposed Deflate option.
pub fn judge_option(data: &[u8]) -> ReqJudgement {
    if data.len() != 2 || data[0] & 0x0f != 8 || data[1] != 0 {
        return ReqJudgement::Rej(Vec::new());
    }
    let window = (data[0] >> 4) + 8;
    if window > MAX_WINDOW_BITS {
        return ReqJudgement::Nak(encode_option(
            ccp_options::DEFLATE,
            &option_data(MAX_WINDOW_BITS),
        ));
    }
    ReqJudgement::Ack
}

fn run_compress(z: &mut Compress, input: &[u8], out: &mut Vec<u8>) -> Result<(), String> {
    let start = z.total_in();
    loop {
        out.reserve(input.len() / 2 + 64);
        let status = z
            .compress_vec(&input[(z.total_in() - start) as usize..], out, FlushCompress::Sync)
            .map_err(|e| e.to_string())?;
        let consumed = (z.total_in() - start) as usize;
        // Spare capacity left over means the flush is complete.
        if consumed == input.len() && out.len() < out.capacity() {
            return Ok(());
        }
        if status == Status::StreamEnd {
            return Ok(());
        }
    }
}

fn run_decompress(z: &mut Decompress, input: &[u8], out: &mut Vec<u8>) -> Result<(), Desync> {
    let start = z.total_in();
    loop {
        out.reserve(input.len() * 2 + 64);
        let status = z
            .decompress_vec(
                &input[(z.total_in() - start) as usize..],
                out,
                FlushDecompress::Sync,
            )
            .map_err(|e| Desync::Stream(e.to_string()))?;
        let consumed = (z.total_in() - start) as usize;
        if consumed == input.len() && out.len() < out.capacity() {
            return Ok(());
        }
        if status == Status::StreamEnd {
            return Ok(());
        }
    }
}

/// Transmit-side Deflate state.
pub struct DeflateEncoder {
    stream: Compress,
    seq: u16,
}

impl DeflateEncoder {
    /// Window bits only affect the negotiated option byte; the raw stream
    /// always runs the full window.
    pub fn new(_window_bits: u8) -> Self {
        Self {
            stream: Compress::new(Compression::default(), false),
            seq: 0,
        }
    }
}

impl Encoder for DeflateEncoder {
    fn reset(&mut self) {
        self.stream.reset();
        self.seq = 0;
    }

    fn encode(&mut self, proto: u16, payload: &[u8]) -> Option<Vec<u8>> {
        let mut inner = inner_protocol_bytes(proto);
        inner.extend_from_slice(payload);

        let mut out = self.seq.to_be_bytes().to_vec();
        self.seq = self.seq.wrapping_add(1);

        if let Err(e) = run_compress(&mut self.stream, &inner, &mut out) {
            // The stream is undefined after a compress error; a reset
            // exchange will rebuild both sides.
            warn!(error = %e, "deflate compress failed");
            return None;
        }

        // The sync flush always ends with the empty stored block; the
        // decompressor replays it locally.
        if out.ends_with(&SYNC_MARKER) {
            out.truncate(out.len() - SYNC_MARKER.len());
        }

        if out.len() >= inner.len() + 2 {
            // Did not pay; the data is already in our window, transmit
            // plain and let the peer feed its dictionary.
            return None;
        }
        Some(out)
    }

    fn feed(&mut self, proto: u16, payload: &[u8]) {
        let mut inner = inner_protocol_bytes(proto);
        inner.extend_from_slice(payload);
        let mut scratch = Vec::new();
        if run_compress(&mut self.stream, &inner, &mut scratch).is_err() {
            warn!("deflate dictionary feed failed");
        }
        self.seq = self.seq.wrapping_add(1);
    }
}

/// Receive-side Deflate state.
pub struct DeflateDecoder {
    stream: Decompress,
    seq: u16,
    /// Tolerate an unexpected first sequence number right after a reset,
    /// when the peer may have transmitted before seeing our Reset-Ack.
    resyncing: bool,
}

impl DeflateDecoder {
    pub fn new(_window_bits: u8) -> Self {
        Self {
            stream: Decompress::new(false),
            seq: 0,
            resyncing: true,
        }
    }
}

impl Decoder for DeflateDecoder {
    fn reset(&mut self) {
        self.stream.reset(false);
        self.seq = 0;
        self.resyncing = true;
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(u16, Vec<u8>), Desync> {
        if payload.len() < 2 {
            return Err(Desync::Truncated);
        }
        let seq = u16::from_be_bytes([payload[0], payload[1]]);
        if seq != self.seq {
            if self.resyncing {
                // Known-dodgy startup window: adopt the peer's counter
                // once rather than forcing another reset.
                debug!(got = seq, expected = self.seq, "adopting peer sequence");
                self.seq = seq;
            } else {
                return Err(Desync::BadSequence {
                    expected: self.seq,
                    got: seq,
                });
            }
        }
        self.resyncing = false;
        self.seq = self.seq.wrapping_add(1);

        let mut inner = Vec::new();
        run_decompress(&mut self.stream, &payload[2..], &mut inner)?;
        run_decompress(&mut self.stream, &SYNC_MARKER, &mut Vec::new())?;

        let (proto, used) = parse_inner_protocol(&inner)?;
        Ok((proto, inner[used..].to_vec()))
    }

    fn feed(&mut self, proto: u16, payload: &[u8]) {
        let mut inner = inner_protocol_bytes(proto);
        inner.extend_from_slice(payload);

        // Replay the frame as a stored block so the window sees the same
        // bytes the compressor's did.
        let len = inner.len() as u16;
        let mut block = vec![0x00];
        block.extend_from_slice(&len.to_le_bytes());
        block.extend_from_slice(&(!len).to_le_bytes());
        block.extend_from_slice(&inner);

        if run_decompress(&mut self.stream, &block, &mut Vec::new()).is_err() {
            warn!("deflate dictionary replay failed");
        }
        self.seq = self.seq.wrapping_add(1);
        self.resyncing = false;
    }
}
