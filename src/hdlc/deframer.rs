//! Async HDLC receive state machine
//!
//! Accumulates raw line bytes into frames before any framing is known.
//! Starts hunting for a flag byte; within a frame, an escape byte flags the
//! next byte for unescaping. Oversized frames are discarded and the decoder
//! returns to hunting.

use tracing::debug;

use crate::buffer::FrameBuf;
use crate::protocol::ppp::framing;

/// Largest frame the decoder will accumulate (MRU plus header slack).
pub const MAX_FRAME_SIZE: usize = 1500 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a flag byte to synchronize on
    Hunt,
    /// Accumulating frame bytes
    Frame,
}

/// Byte-stream to frame decoder for asynchronous lines.
#[derive(Debug)]
pub struct Deframer {
    state: State,
    escaped: bool,
    accum: Vec<u8>,
    max_frame: usize,
}

impl Deframer {
    /// Create a decoder hunting for its first flag.
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_SIZE)
    }

    /// Create a decoder with a specific frame size limit.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            state: State::Hunt,
            escaped: false,
            accum: Vec::new(),
            max_frame,
        }
    }

    /// Feed raw line bytes; returns each completed frame in arrival order.
    pub fn input(&mut self, bytes: &[u8]) -> Vec<FrameBuf> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if byte == framing::FLAG {
                self.escaped = false;
                match self.state {
                    State::Hunt => self.state = State::Frame,
                    State::Frame => {
                        // Empty accumulation between flags is a keepalive,
                        // discarded.
                        if !self.accum.is_empty() {
                            frames.push(FrameBuf::from_vec(std::mem::take(&mut self.accum)));
                        }
                    }
                }
                continue;
            }

            if self.state == State::Hunt {
                continue;
            }

            if byte == framing::ESCAPE {
                self.escaped = true;
                continue;
            }

            let byte = if self.escaped {
                self.escaped = false;
                byte ^ framing::ESCAPE_XOR
            } else {
                byte
            };

            if self.accum.len() >= self.max_frame {
                debug!(len = self.accum.len(), "oversized frame discarded");
                self.accum.clear();
                self.state = State::Hunt;
                self.escaped = false;
                continue;
            }
            self.accum.push(byte);
        }
        frames
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut d = Deframer::new();
        let frames = d.input(&[0x7e, 0x01, 0x02, 0x03, 0x7e]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_vec(), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_leading_noise_ignored_until_flag() {
        let mut d = Deframer::new();
        let frames = d.input(&[0xaa, 0xbb, 0x7e, 0x01, 0x7e]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_vec(), vec![0x01]);
    }

    #[test]
    fn test_unescape() {
        let mut d = Deframer::new();
        // 0x7d 0x5e -> 0x7e, 0x7d 0x5d -> 0x7d, 0x7d 0x21 -> 0x01
        let frames = d.input(&[0x7e, 0x7d, 0x5e, 0x7d, 0x5d, 0x7d, 0x21, 0x7e]);
        assert_eq!(frames[0].to_vec(), vec![0x7e, 0x7d, 0x01]);
    }

    #[test]
    fn test_empty_frame_discarded() {
        let mut d = Deframer::new();
        let frames = d.input(&[0x7e, 0x7e, 0x7e, 0x01, 0x7e]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_vec(), vec![0x01]);
    }

    #[test]
    fn test_split_across_calls() {
        let mut d = Deframer::new();
        assert!(d.input(&[0x7e, 0x01, 0x02]).is_empty());
        let frames = d.input(&[0x03, 0x7e]);
        assert_eq!(frames[0].to_vec(), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_escape_split_across_calls() {
        let mut d = Deframer::new();
        assert!(d.input(&[0x7e, 0x7d]).is_empty());
        let frames = d.input(&[0x5e, 0x7e]);
        assert_eq!(frames[0].to_vec(), vec![0x7e]);
    }

    #[test]
    fn test_oversized_frame_resets_to_hunt() {
        let mut d = Deframer::with_max_frame(4);
        let frames = d.input(&[0x7e, 1, 2, 3, 4, 5, 6, 0x7e, 0x01, 0x7e]);
        // The oversized frame is dropped; after the reset the next flag
        // resynchronizes and the short frame survives.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_vec(), vec![0x01]);
    }
}
