//! HDLC codec - RFC 1662
//!
//! Converts between logical frames (protocol number + payload) and the
//! on-the-wire encapsulation: address/control bytes, an optionally
//! compressed protocol field, the FCS trailer, and in asynchronous mode
//! flag delimiters with byte stuffing.

mod deframer;
pub mod fcs;

pub use deframer::{Deframer, MAX_FRAME_SIZE};

use crate::buffer::FrameBuf;
use crate::protocol::ppp::{encode_protocol, framing, protocols};
use fcs::Fcs;

/// Wire discipline of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingMode {
    /// Byte-stuffed, flag-delimited, software FCS
    #[default]
    Async,
    /// Frames pass through whole; FCS handled by the line hardware
    Sync,
}

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than the minimum viable header
    Runt,
    /// FCS residue check failed
    BadFcs,
    /// Unexpected address byte without ACFC
    BadAddress,
    /// Unexpected control byte
    BadControl,
    /// Protocol field could not be decoded
    BadProtocol,
}

/// A deframed logical frame.
#[derive(Debug)]
pub struct LogicalFrame {
    /// PPP protocol number
    pub protocol: u16,
    /// Payload with all framing stripped
    pub payload: FrameBuf,
}

/// Per-link HDLC codec with negotiated framing state.
///
/// The compression flags are split by direction: `tx_*` reflect what the
/// peer agreed to accept, `rx_*` what we agreed to accept.
#[derive(Debug, Default)]
pub struct HdlcCodec {
    /// Wire discipline
    pub mode: FramingMode,
    /// Async control character map for transmit (peer's receive map)
    pub tx_accm: u32,
    /// Protocol field compression on transmit
    pub tx_pfc: bool,
    /// Address/control field compression on transmit
    pub tx_acfc: bool,
    /// Accept compressed address/control on receive
    pub rx_acfc: bool,
}

impl HdlcCodec {
    /// Create a codec with nothing negotiated (async, escape all controls).
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            tx_accm: 0xffff_ffff,
            ..Self::default()
        }
    }

    /// Reset negotiated state to the pre-negotiation defaults.
    pub fn reset(&mut self) {
        self.tx_accm = 0xffff_ffff;
        self.tx_pfc = false;
        self.tx_acfc = false;
        self.rx_acfc = false;
    }

    fn must_escape(&self, byte: u8, proto: u16) -> bool {
        match byte {
            framing::FLAG | framing::ESCAPE => true,
            b if b < 0x20 => {
                // LCP traffic always escapes control characters; the peer
                // may not have applied the negotiated map yet.
                proto == protocols::LCP || self.tx_accm & (1 << b) != 0
            }
            _ => false,
        }
    }

    /// Encode a logical frame into wire bytes.
    pub fn frame(&self, proto: u16, payload: &[u8]) -> Vec<u8> {
        let mut logical = Vec::with_capacity(payload.len() + 6);

        // Address/control are never compressed away on LCP frames.
        if !(self.tx_acfc && proto != protocols::LCP) {
            logical.push(framing::ADDRESS);
            logical.push(framing::CONTROL);
        }
        logical.extend_from_slice(&encode_protocol(proto, self.tx_pfc));
        logical.extend_from_slice(payload);

        match self.mode {
            FramingMode::Sync => logical,
            FramingMode::Async => {
                let mut fcs = Fcs::new();
                fcs.update(&logical);
                logical.extend_from_slice(&fcs.trailer());

                let mut wire = Vec::with_capacity(logical.len() + 2);
                wire.push(framing::FLAG);
                for byte in logical {
                    if self.must_escape(byte, proto) {
                        wire.push(framing::ESCAPE);
                        wire.push(byte ^ framing::ESCAPE_XOR);
                    } else {
                        wire.push(byte);
                    }
                }
                wire.push(framing::FLAG);
                wire
            }
        }
    }

    /// Decode an unstuffed frame into protocol number and payload.
    pub fn deframe(&self, mut frame: FrameBuf) -> Result<LogicalFrame, FrameError> {
        // Minimum: one protocol byte plus, in async mode, the FCS trailer.
        let min = match self.mode {
            FramingMode::Async => 3,
            FramingMode::Sync => 1,
        };
        if frame.len() < min {
            return Err(FrameError::Runt);
        }

        if self.mode == FramingMode::Async {
            let mut fcs = Fcs::new();
            for byte in frame.iter() {
                fcs.push(byte);
            }
            if !fcs.is_good() {
                return Err(FrameError::BadFcs);
            }
            frame.truncate_tail(2);
        }

        // Address/control, possibly compressed away.
        if frame.peek(0) == Some(framing::ADDRESS) {
            if frame.peek(1) != Some(framing::CONTROL) {
                return Err(FrameError::BadControl);
            }
            frame.consume(2);
        } else if !self.rx_acfc {
            return Err(FrameError::BadAddress);
        }

        // Protocol field: low bit of the final byte is set, so an even
        // first byte means a two-byte field.
        let first = frame.read_u8().ok_or(FrameError::Runt)?;
        let protocol = if first & 1 != 0 {
            first as u16
        } else {
            let second = frame.read_u8().ok_or(FrameError::Runt)?;
            if second & 1 == 0 {
                return Err(FrameError::BadProtocol);
            }
            u16::from_be_bytes([first, second])
        };

        Ok(LogicalFrame {
            protocol,
            payload: frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(codec_tx: &HdlcCodec, codec_rx: &HdlcCodec, proto: u16, payload: &[u8]) {
        let wire = codec_tx.frame(proto, payload);
        let frame = match codec_tx.mode {
            FramingMode::Async => {
                let mut d = Deframer::new();
                let mut frames = d.input(&wire);
                assert_eq!(frames.len(), 1);
                frames.remove(0)
            }
            FramingMode::Sync => FrameBuf::from_vec(wire),
        };
        let logical = codec_rx.deframe(frame).unwrap();
        assert_eq!(logical.protocol, proto);
        assert_eq!(logical.payload.to_vec(), payload);
    }

    #[test]
    fn test_roundtrip_async_default() {
        let codec = HdlcCodec::new(FramingMode::Async);
        roundtrip(&codec, &codec, protocols::LCP, &[0x01, 0x01, 0x00, 0x04]);
        roundtrip(&codec, &codec, protocols::IP, b"\x45\x00\x00\x14");
        roundtrip(&codec, &codec, protocols::IP, &[0x7e, 0x7d, 0x03, 0x13]);
    }

    #[test]
    fn test_roundtrip_sync() {
        let codec = HdlcCodec::new(FramingMode::Sync);
        roundtrip(&codec, &codec, protocols::CCP, &[0x0e, 0x01, 0x00, 0x04]);
    }

    #[test]
    fn test_roundtrip_with_field_compression() {
        let mut tx = HdlcCodec::new(FramingMode::Async);
        tx.tx_pfc = true;
        tx.tx_acfc = true;
        tx.tx_accm = 0;
        let mut rx = HdlcCodec::new(FramingMode::Async);
        rx.rx_acfc = true;

        roundtrip(&tx, &rx, protocols::IP, b"payload");
        // LCP keeps address/control and the full protocol field.
        roundtrip(&tx, &rx, protocols::LCP, &[0x09, 0x01, 0x00, 0x08, 1, 2, 3, 4]);
    }

    #[test]
    fn test_lcp_always_escapes_control_chars() {
        let mut codec = HdlcCodec::new(FramingMode::Async);
        codec.tx_accm = 0;
        let wire = codec.frame(protocols::LCP, &[0x01, 0x13]);
        // 0x01 and 0x13 appear only escaped between the flags.
        let inner = &wire[1..wire.len() - 1];
        for win in inner.windows(2) {
            if win[1] == 0x01 || win[1] == 0x13 {
                assert_eq!(win[0], framing::ESCAPE);
            }
        }
    }

    #[test]
    fn test_accm_controls_data_escaping() {
        let mut codec = HdlcCodec::new(FramingMode::Async);
        codec.tx_accm = 1 << 0x11; // XON only
        let wire = codec.frame(protocols::IP, &[0x11, 0x12]);
        let inner = &wire[1..wire.len() - 1];
        assert!(inner.contains(&0x12));
        assert!(!inner.contains(&0x11));
        assert!(inner.windows(2).any(|w| w == [framing::ESCAPE, 0x31]));
    }

    #[test]
    fn test_bad_fcs_rejected() {
        let codec = HdlcCodec::new(FramingMode::Async);
        let wire = codec.frame(protocols::IP, b"data");
        let mut d = Deframer::new();
        let mut frames = d.input(&wire);
        let mut raw = frames.remove(0).to_vec();
        raw[2] ^= 0xff;
        assert_eq!(
            codec.deframe(FrameBuf::from_vec(raw)).unwrap_err(),
            FrameError::BadFcs
        );
    }

    #[test]
    fn test_missing_address_without_acfc() {
        let mut tx = HdlcCodec::new(FramingMode::Sync);
        tx.tx_acfc = true;
        let rx = HdlcCodec::new(FramingMode::Sync);
        let wire = tx.frame(protocols::IP, b"x");
        assert_eq!(
            rx.deframe(FrameBuf::from_vec(wire)).unwrap_err(),
            FrameError::BadAddress
        );
    }

    #[test]
    fn test_runt_frame() {
        let codec = HdlcCodec::new(FramingMode::Async);
        assert_eq!(
            codec.deframe(FrameBuf::from_vec(vec![0x21])).unwrap_err(),
            FrameError::Runt
        );
    }
}
