//! Per-document byte arenas
//!
//! Arenas are append-only byte buffers addressed by [`Span`]s. Resetting an
//! arena rewinds its length; capacity is kept unless it grew past the
//! configured high-watermark.

use std::ops::Range;

/// Offset/length pair into an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset
    pub off: u32,
    /// Byte length
    pub len: u32,
}

impl Span {
    /// The empty span at offset 0
    pub const EMPTY: Span = Span { off: 0, len: 0 };

    /// Create a span from `usize` bounds
    pub fn new(off: usize, len: usize) -> Self {
        Self {
            off: off as u32,
            len: len as u32,
        }
    }

    /// Span covering `start..end`
    pub fn between(start: usize, end: usize) -> Self {
        Self::new(start, end.saturating_sub(start))
    }

    /// Byte range covered by this span
    pub fn range(&self) -> Range<usize> {
        self.off as usize..self.end()
    }

    /// End offset (exclusive)
    pub fn end(&self) -> usize {
        self.off as usize + self.len as usize
    }

    /// Whether the span is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Linear byte arena
#[derive(Debug, Default, Clone)]
pub struct ByteArena {
    buf: Vec<u8>,
}

impl ByteArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length, usable as a rewind mark
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written since the last rewind
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Allocated capacity
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Append bytes, returning their span
    pub fn push(&mut self, bytes: &[u8]) -> Span {
        let off = self.buf.len();
        self.buf.extend_from_slice(bytes);
        Span::new(off, bytes.len())
    }

    /// Append a single byte
    pub fn push_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Span from `mark` to the current end
    pub fn span_from(&self, mark: usize) -> Span {
        Span::between(mark, self.buf.len())
    }

    /// Bytes covered by `span`
    pub fn get(&self, span: Span) -> &[u8] {
        &self.buf[span.range()]
    }

    /// Whole arena contents
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable access for in-place writers
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Copy an existing span to the end of the arena
    pub fn copy_within(&mut self, span: Span) -> Span {
        let off = self.buf.len();
        self.buf.extend_from_within(span.range());
        Span::new(off, span.len as usize)
    }

    /// Rewind to `mark`
    pub fn truncate(&mut self, mark: usize) {
        self.buf.truncate(mark);
    }

    /// Rewind to empty
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Clear and release the buffer when its capacity exceeds `limit`
    ///
    /// Returns whether memory was released.
    pub fn reset_with_limit(&mut self, limit: usize) -> bool {
        self.buf.clear();
        if self.buf.capacity() > limit {
            self.buf = Vec::new();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut arena = ByteArena::new();
        let a = arena.push(b"hello");
        let b = arena.push(b" world");
        assert_eq!(arena.get(a), b"hello");
        assert_eq!(arena.get(b), b" world");
        assert_eq!(arena.span_from(0).len, 11);
    }

    #[test]
    fn test_truncate_and_copy() {
        let mut arena = ByteArena::new();
        let a = arena.push(b"abc");
        let mark = arena.len();
        arena.push(b"zzz");
        arena.truncate(mark);
        let copy = arena.copy_within(a);
        assert_eq!(arena.get(copy), b"abc");
        assert_eq!(arena.len(), 6);
    }

    #[test]
    fn test_reset_with_limit() {
        let mut arena = ByteArena::new();
        arena.push(&[0u8; 4096]);
        assert!(arena.reset_with_limit(1024));
        assert_eq!(arena.capacity(), 0);

        arena.push(&[0u8; 16]);
        assert!(!arena.reset_with_limit(1024));
        assert!(arena.capacity() >= 16);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_span_helpers() {
        let span = Span::between(4, 10);
        assert_eq!(span.range(), 4..10);
        assert_eq!(span.end(), 10);
        assert!(Span::EMPTY.is_empty());
    }
}
