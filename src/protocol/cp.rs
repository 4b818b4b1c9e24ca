//! Control-protocol packets - RFC 1661 section 5
//!
//! LCP and CCP share one packet layout: a one-byte code, a one-byte
//! identifier, a two-byte big-endian length covering the whole packet, and
//! code-specific data (TLV options for the Configure family).

use crate::{Error, Result};

/// Header size (code + identifier + length)
pub const CP_HEADER_SIZE: usize = 4;

/// Control-protocol packet codes
pub mod codes {
    /// Configure-Request
    pub const CONFIGURE_REQUEST: u8 = 1;
    /// Configure-Ack
    pub const CONFIGURE_ACK: u8 = 2;
    /// Configure-Nak
    pub const CONFIGURE_NAK: u8 = 3;
    /// Configure-Reject
    pub const CONFIGURE_REJECT: u8 = 4;
    /// Terminate-Request
    pub const TERMINATE_REQUEST: u8 = 5;
    /// Terminate-Ack
    pub const TERMINATE_ACK: u8 = 6;
    /// Code-Reject
    pub const CODE_REJECT: u8 = 7;
    /// Protocol-Reject (LCP only)
    pub const PROTOCOL_REJECT: u8 = 8;
    /// Echo-Request (LCP only)
    pub const ECHO_REQUEST: u8 = 9;
    /// Echo-Reply (LCP only)
    pub const ECHO_REPLY: u8 = 10;
    /// Discard-Request (LCP only)
    pub const DISCARD_REQUEST: u8 = 11;
    /// Reset-Request (CCP only)
    pub const RESET_REQUEST: u8 = 14;
    /// Reset-Ack (CCP only)
    pub const RESET_ACK: u8 = 15;
}

/// LCP option types
pub mod lcp_options {
    /// Maximum-Receive-Unit
    pub const MRU: u8 = 1;
    /// Async-Control-Character-Map
    pub const ACCM: u8 = 2;
    /// Authentication-Protocol
    pub const AUTH_PROTOCOL: u8 = 3;
    /// Quality-Protocol
    pub const QUALITY_PROTOCOL: u8 = 4;
    /// Magic-Number
    pub const MAGIC_NUMBER: u8 = 5;
    /// Protocol-Field-Compression
    pub const PFC: u8 = 7;
    /// Address-and-Control-Field-Compression
    pub const ACFC: u8 = 8;
}

/// CCP algorithm option types
pub mod ccp_options {
    /// Vendor-specific (OUI)
    pub const OUI: u8 = 0;
    /// Predictor type 1
    pub const PREDICTOR1: u8 = 1;
    /// Predictor type 2 (unimplemented)
    pub const PREDICTOR2: u8 = 2;
    /// Deflate
    pub const DEFLATE: u8 = 18;
    /// BSD Compress
    pub const BSD_COMPRESS: u8 = 21;
}

/// Parsed control-protocol packet (zero-copy reference)
#[derive(Debug)]
pub struct CpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> CpPacket<'a> {
    /// Parse a control-protocol packet from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < CP_HEADER_SIZE {
            return Err(Error::Parse("control packet too short".into()));
        }

        let packet = Self { buffer };

        let length = packet.length() as usize;
        if length < CP_HEADER_SIZE {
            return Err(Error::Parse("control packet length too small".into()));
        }
        if buffer.len() < length {
            return Err(Error::Parse("control packet truncated".into()));
        }

        Ok(packet)
    }

    /// Code field
    pub fn code(&self) -> u8 {
        self.buffer[0]
    }

    /// Identifier field (for matching requests and responses)
    pub fn identifier(&self) -> u8 {
        self.buffer[1]
    }

    /// Length field (total packet length including header)
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Data (options for Configure-*, opaque payload for Echo-*)
    pub fn data(&self) -> &'a [u8] {
        let len = self.length() as usize;
        &self.buffer[CP_HEADER_SIZE..len]
    }

    /// Iterate over options (for the Configure family)
    pub fn iter_options(&self) -> OptionIterator<'a> {
        OptionIterator {
            data: self.data(),
            offset: 0,
        }
    }

    /// Get the raw packet bytes
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.length() as usize;
        &self.buffer[..len]
    }
}

/// One TLV option during iteration
#[derive(Debug, Clone)]
pub struct CpOption<'a> {
    /// Option type
    pub opt_type: u8,
    /// Option data (excluding type and length bytes)
    pub data: &'a [u8],
}

impl CpOption<'_> {
    /// Re-encode the option as raw TLV bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        out.push(self.opt_type);
        out.push((2 + self.data.len()) as u8);
        out.extend_from_slice(self.data);
        out
    }
}

/// Encode a single TLV option.
pub fn encode_option(opt_type: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + data.len());
    out.push(opt_type);
    out.push((2 + data.len()) as u8);
    out.extend_from_slice(data);
    out
}

/// Iterator over TLV options
pub struct OptionIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> OptionIterator<'a> {
    /// Iterate over a bare option list (no packet header).
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for OptionIterator<'a> {
    type Item = CpOption<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Need at least 2 bytes for option header (type + length)
        if self.offset + 2 > self.data.len() {
            return None;
        }

        let opt_type = self.data[self.offset];
        let opt_len = self.data[self.offset + 1] as usize;

        // Option length includes type and length bytes
        if opt_len < 2 || self.offset + opt_len > self.data.len() {
            return None;
        }

        let data_start = self.offset + 2;
        let data_end = self.offset + opt_len;

        let opt = CpOption {
            opt_type,
            data: &self.data[data_start..data_end],
        };

        self.offset = data_end;
        Some(opt)
    }
}

/// Builder for control-protocol packets
#[derive(Debug, Default)]
pub struct CpBuilder {
    code: u8,
    identifier: u8,
    data: Vec<u8>,
}

impl CpBuilder {
    /// Create a new builder
    pub fn new(code: u8, identifier: u8) -> Self {
        Self {
            code,
            identifier,
            data: Vec::new(),
        }
    }

    /// Add a TLV option
    pub fn add_option(mut self, opt_type: u8, data: &[u8]) -> Self {
        let opt_len = (2 + data.len()) as u8;
        self.data.push(opt_type);
        self.data.push(opt_len);
        self.data.extend_from_slice(data);
        self
    }

    /// Set raw data (echo payloads, copied option lists)
    pub fn raw_data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    /// Build the packet
    pub fn build(self) -> Vec<u8> {
        let length = (CP_HEADER_SIZE + self.data.len()) as u16;
        let mut packet = Vec::with_capacity(length as usize);

        packet.push(self.code);
        packet.push(self.identifier);
        packet.extend_from_slice(&length.to_be_bytes());
        packet.extend_from_slice(&self.data);

        packet
    }
}
