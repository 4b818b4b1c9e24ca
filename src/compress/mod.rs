//! CCP compression plug-ins
//!
//! Each algorithm provides one encoder (transmit side) and one decoder
//! (receive side); exactly one of each is active per link, selected by CCP
//! negotiation. Working state is allocated on construction and freed on
//! drop; `reset` re-synchronizes both peers after a Reset-Request/Ack
//! exchange.

pub mod deflate;
pub mod predictor;

use crate::fsm::ReqJudgement;
use crate::protocol::cp::ccp_options;

/// The implemented CCP algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    /// Predictor type 1
    Predictor1,
    /// Deflate with a negotiated window size
    Deflate,
}

impl AlgorithmKind {
    /// CCP option type byte for this algorithm.
    pub fn option_type(&self) -> u8 {
        match self {
            AlgorithmKind::Predictor1 => ccp_options::PREDICTOR1,
            AlgorithmKind::Deflate => ccp_options::DEFLATE,
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::Predictor1 => "predictor1",
            AlgorithmKind::Deflate => "deflate",
        }
    }
}

/// Receive-side failure requiring a dictionary resynchronization.
///
/// Surfaced to the link, which answers with a CCP Reset-Request; never a
/// process-level error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Desync {
    #[error("compressed frame truncated")]
    Truncated,
    #[error("embedded check failed")]
    BadCheck,
    #[error("sequence number {got} where {expected} expected")]
    BadSequence { expected: u16, got: u16 },
    #[error("inflate error: {0}")]
    Stream(String),
}

/// Transmit-side compression state.
pub trait Encoder {
    /// Re-synchronize after a CCP reset exchange.
    fn reset(&mut self);

    /// Compress one frame (protocol field plus payload).
    ///
    /// Returns the complete compressed payload for the COMPD protocol, or
    /// `None` when compression does not pay and the frame must go out
    /// under its own protocol number. A `None` frame has already been
    /// folded into the dictionary; [`Encoder::feed`] is only for frames
    /// never offered to `encode`.
    fn encode(&mut self, proto: u16, payload: &[u8]) -> Option<Vec<u8>>;

    /// Account an uncompressed frame into the dictionary.
    fn feed(&mut self, proto: u16, payload: &[u8]);
}

/// Receive-side decompression state.
pub trait Decoder {
    /// Re-synchronize after a CCP reset exchange.
    fn reset(&mut self);

    /// Decompress one COMPD payload into protocol number and payload.
    fn decode(&mut self, payload: &[u8]) -> Result<(u16, Vec<u8>), Desync>;

    /// Account a frame that arrived uncompressed into the dictionary.
    fn feed(&mut self, proto: u16, payload: &[u8]);
}

/// Encode the protocol field the way it rides inside a compressed frame:
/// one byte when the high byte is zero.
pub(crate) fn inner_protocol_bytes(proto: u16) -> Vec<u8> {
    if proto < 0x100 {
        vec![proto as u8]
    } else {
        proto.to_be_bytes().to_vec()
    }
}

/// Decode an inner protocol field; returns protocol and consumed length.
pub(crate) fn parse_inner_protocol(data: &[u8]) -> Result<(u16, usize), Desync> {
    let first = *data.first().ok_or(Desync::Truncated)?;
    if first & 1 != 0 {
        Ok((first as u16, 1))
    } else {
        let second = *data.get(1).ok_or(Desync::Truncated)?;
        Ok((u16::from_be_bytes([first, second]), 2))
    }
}

/// Negotiation-side parameters for the active algorithms.
#[derive(Debug, Clone, Copy)]
pub struct CompressConfig {
    /// Deflate window size in bits (8..=15)
    pub deflate_window: u8,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self { deflate_window: 15 }
    }
}

/// TLV data bytes for our Configure-Request option of `kind`.
pub fn option_data(kind: AlgorithmKind, cfg: &CompressConfig) -> Vec<u8> {
    match kind {
        AlgorithmKind::Predictor1 => Vec::new(),
        AlgorithmKind::Deflate => deflate::option_data(cfg.deflate_window),
    }
}

/// Judge a peer-proposed option for `kind`.
pub fn judge_option(kind: AlgorithmKind, data: &[u8]) -> ReqJudgement {
    match kind {
        AlgorithmKind::Predictor1 => {
            if data.is_empty() {
                ReqJudgement::Ack
            } else {
                ReqJudgement::Rej(Vec::new())
            }
        }
        AlgorithmKind::Deflate => deflate::judge_option(data),
    }
}

/// Instantiate the transmit side of a negotiated algorithm.
pub fn make_encoder(kind: AlgorithmKind, option_data: &[u8]) -> Box<dyn Encoder + Send> {
    match kind {
        AlgorithmKind::Predictor1 => Box::new(predictor::Predictor1Encoder::new()),
        AlgorithmKind::Deflate => Box::new(deflate::DeflateEncoder::new(
            deflate::window_from_option(option_data),
        )),
    }
}

/// Instantiate the receive side of a negotiated algorithm.
pub fn make_decoder(kind: AlgorithmKind, option_data: &[u8]) -> Box<dyn Decoder + Send> {
    match kind {
        AlgorithmKind::Predictor1 => Box::new(predictor::Predictor1Decoder::new()),
        AlgorithmKind::Deflate => Box::new(deflate::DeflateDecoder::new(
            deflate::window_from_option(option_data),
        )),
    }
}
