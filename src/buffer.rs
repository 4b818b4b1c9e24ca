//! Frame buffer - chained byte segments
//!
//! Frames move between the link layers as a chain of byte segments so the
//! codecs can strip headers and trailers without copying the whole frame.
//! Each segment tracks how many bytes have already been consumed; a fully
//! consumed segment is dropped from the chain.

use std::collections::VecDeque;

/// One segment of a frame: backing bytes plus a consumed-offset.
#[derive(Debug, Clone)]
struct Segment {
    data: Vec<u8>,
    offset: usize,
}

impl Segment {
    fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    fn len(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// An owned chain of byte segments with consume-from-front semantics.
#[derive(Debug, Clone, Default)]
pub struct FrameBuf {
    segments: VecDeque<Segment>,
}

impl FrameBuf {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame buffer owning a single segment.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let mut buf = Self::new();
        buf.push_segment(data);
        buf
    }

    /// Append a segment to the end of the chain.
    pub fn push_segment(&mut self, data: Vec<u8>) {
        if !data.is_empty() {
            self.segments.push_back(Segment { data, offset: 0 });
        }
    }

    /// Prepend a segment to the front of the chain (header insertion).
    pub fn prepend(&mut self, data: Vec<u8>) {
        if !data.is_empty() {
            self.segments.push_front(Segment { data, offset: 0 });
        }
    }

    /// Append bytes, extending the last segment when possible.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        match self.segments.back_mut() {
            Some(seg) => seg.data.extend_from_slice(bytes),
            None => self.push_segment(bytes.to_vec()),
        }
    }

    /// Total remaining length across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// True when no bytes remain.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.len() == 0)
    }

    /// Consume `n` bytes from the front, dropping exhausted segments.
    ///
    /// Consuming more than is available empties the chain.
    pub fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let Some(seg) = self.segments.front_mut() else {
                return;
            };
            let avail = seg.len();
            if n < avail {
                seg.offset += n;
                return;
            }
            n -= avail;
            self.segments.pop_front();
        }
    }

    /// Peek at the byte at logical position `pos` without consuming.
    pub fn peek(&self, mut pos: usize) -> Option<u8> {
        for seg in &self.segments {
            let rem = seg.remaining();
            if pos < rem.len() {
                return Some(rem[pos]);
            }
            pos -= rem.len();
        }
        None
    }

    /// Read and consume one byte from the front.
    pub fn read_u8(&mut self) -> Option<u8> {
        let b = self.peek(0)?;
        self.consume(1);
        Some(b)
    }

    /// Drop `n` bytes from the tail of the chain (trailer removal).
    pub fn truncate_tail(&mut self, n: usize) {
        let keep = self.len().saturating_sub(n);
        let mut taken = 0;
        let mut idx = 0;
        while idx < self.segments.len() {
            let seg_len = self.segments[idx].len();
            if taken + seg_len >= keep {
                let within = keep - taken;
                let seg = &mut self.segments[idx];
                seg.data.truncate(seg.offset + within);
                self.segments.truncate(idx + 1);
                if within == 0 {
                    self.segments.truncate(idx);
                }
                return;
            }
            taken += seg_len;
            idx += 1;
        }
    }

    /// Coalesce all remaining bytes into a single vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for seg in &self.segments {
            out.extend_from_slice(seg.remaining());
        }
        out
    }

    /// Iterate over the remaining bytes.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.segments
            .iter()
            .flat_map(|s| s.remaining().iter().copied())
    }
}
