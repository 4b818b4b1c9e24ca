//! PPP protocol numbers - RFC 1661 / RFC 1662
//!
//! The protocol field follows the HDLC address/control bytes. On the wire
//! it is one or two bytes: the low bit of the final byte is always set, so
//! an even first byte means a two-byte field.

/// PPP protocol numbers
pub mod protocols {
    /// Internet Protocol version 4
    pub const IP: u16 = 0x0021;
    /// Van Jacobson compressed TCP/IP
    pub const VJ_COMPRESSED: u16 = 0x002d;
    /// Van Jacobson uncompressed TCP/IP (explicit connection id)
    pub const VJ_UNCOMPRESSED: u16 = 0x002f;
    /// Compressed datagram (CCP payload)
    pub const COMPRESSED: u16 = 0x00fd;
    /// Internet Protocol Control Protocol
    pub const IPCP: u16 = 0x8021;
    /// Compression Control Protocol
    pub const CCP: u16 = 0x80fd;
    /// Link Control Protocol
    pub const LCP: u16 = 0xc021;
    /// Password Authentication Protocol
    pub const PAP: u16 = 0xc023;
    /// Link Quality Report
    pub const LQR: u16 = 0xc025;
    /// Challenge Handshake Authentication Protocol
    pub const CHAP: u16 = 0xc223;
}

/// HDLC framing constants
pub mod framing {
    /// Frame delimiter
    pub const FLAG: u8 = 0x7e;
    /// Escape byte
    pub const ESCAPE: u8 = 0x7d;
    /// XOR applied to an escaped byte
    pub const ESCAPE_XOR: u8 = 0x20;
    /// All-stations address
    pub const ADDRESS: u8 = 0xff;
    /// Unnumbered-information control field
    pub const CONTROL: u8 = 0x03;
}

/// True for protocols whose payload may be handed to a CCP compressor.
///
/// Control traffic is never compressed; neither is an already-compressed
/// datagram.
pub fn is_compressible(proto: u16) -> bool {
    matches!(
        proto,
        protocols::IP | protocols::VJ_COMPRESSED | protocols::VJ_UNCOMPRESSED
    )
}

/// Encode a protocol field, one byte when compression is allowed.
///
/// Protocol field compression only ever applies to values below 0x100,
/// whose high byte would be zero.
pub fn encode_protocol(proto: u16, compress: bool) -> Vec<u8> {
    if compress && proto < 0x100 {
        vec![proto as u8]
    } else {
        proto.to_be_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressible_classification() {
        assert!(is_compressible(protocols::IP));
        assert!(is_compressible(protocols::VJ_COMPRESSED));
        assert!(!is_compressible(protocols::LCP));
        assert!(!is_compressible(protocols::COMPRESSED));
    }

    #[test]
    fn test_encode_protocol() {
        assert_eq!(encode_protocol(protocols::LCP, true), vec![0xc0, 0x21]);
        assert_eq!(encode_protocol(protocols::IP, true), vec![0x21]);
        assert_eq!(encode_protocol(protocols::IP, false), vec![0x00, 0x21]);
    }
}
