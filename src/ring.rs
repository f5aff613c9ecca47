//! Byte ring buffers
//!
//! Each serial channel owns two rings, one per direction. The producer only
//! moves `head`, the consumer only moves `tail`; neither ever swaps roles.

use crate::Error;

/// A fixed-capacity, single-producer single-consumer byte queue.
///
/// The backing array holds `C` bytes, but the ring only ever stores `C - 1`:
/// one slot is sacrificed so that `head == tail` always means "empty".
///
/// ```
/// use usbfs_cdc::ring::RingBuffer;
///
/// let mut ring = RingBuffer::<8>::new();
/// assert_eq!(ring.write(b"hello"), 5);
///
/// let mut buf = [0; 8];
/// assert_eq!(ring.read(&mut buf), 5);
/// assert_eq!(&buf[..5], b"hello");
/// ```
pub struct RingBuffer<const C: usize> {
    buffer: [u8; C],
    /// Next slot to write. Producer-owned.
    head: usize,
    /// Next slot to read. Consumer-owned.
    tail: usize,
    overflow: bool,
}

impl<const C: usize> Default for RingBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> RingBuffer<C> {
    const CAPACITY_CHECK: () = assert!(C >= 2, "A ring buffer needs at least two slots");

    /// Create an empty ring.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;
        RingBuffer {
            buffer: [0; C],
            head: 0,
            tail: 0,
            overflow: false,
        }
    }

    /// The number of bytes the ring can hold.
    pub const fn capacity(&self) -> usize {
        C - 1
    }

    /// The number of bytes ready to read.
    pub fn available(&self) -> usize {
        (self.head + C - self.tail) % C
    }

    /// The number of bytes that can be written.
    pub fn free(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Indicates if there's nothing to read.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Indicates if a write didn't fit since the last [`clear()`](Self::clear).
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Append all of `bytes`, or nothing.
    ///
    /// Returns the number of bytes written. If `bytes` doesn't fit in the free
    /// space, nothing is written, the call returns `0`, and the overflow flag
    /// is set. Existing data is never disturbed.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if bytes.len() > self.free() {
            self.overflow = true;
            return 0;
        }
        let first = bytes.len().min(C - self.head);
        self.buffer[self.head..self.head + first].copy_from_slice(&bytes[..first]);
        self.buffer[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.head = (self.head + bytes.len()) % C;
        bytes.len()
    }

    /// Append every slice in `parts`, or nothing.
    ///
    /// Behaves like [`write()`](Self::write) on the concatenation of `parts`.
    pub fn write_parts(&mut self, parts: &[&[u8]]) -> usize {
        let total: usize = parts.iter().map(|part| part.len()).sum();
        if total > self.free() {
            self.overflow = true;
            return 0;
        }
        for part in parts {
            self.write(part);
        }
        total
    }

    /// Copy bytes into `buf` without consuming them.
    ///
    /// Returns the number of bytes copied.
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.available());
        let first = count.min(C - self.tail);
        buf[..first].copy_from_slice(&self.buffer[self.tail..self.tail + first]);
        buf[first..count].copy_from_slice(&self.buffer[..count - first]);
        count
    }

    /// Consume up to `buf.len()` bytes into `buf`.
    ///
    /// Returns the number of bytes read, which is zero if the ring is empty.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = self.peek(buf);
        self.consume(count);
        count
    }

    /// Consume one line, ending in `delimiter`, into `buf`.
    ///
    /// On success, `buf` receives the line without its delimiter, and the
    /// call returns the line length. The delimiter is consumed.
    ///
    /// Returns `Ok(None)` if the delimiter hasn't arrived yet; nothing is
    /// consumed. Returns [`Error::LineTooLong`] if the line can never complete:
    /// either the ring is full without a delimiter, or more than `buf.len()`
    /// bytes precede the delimiter. The caller should [`clear()`](Self::clear)
    /// the ring to recover.
    pub fn read_until(&mut self, delimiter: u8, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        let available = self.available();
        let window = available.min(buf.len() + 1);
        let position = (0..window).find(|&i| self.buffer[(self.tail + i) % C] == delimiter);

        match position {
            Some(length) => {
                let copied = self.peek(&mut buf[..length]);
                debug_assert_eq!(copied, length);
                self.consume(length + 1);
                Ok(Some(length))
            }
            None if available > buf.len() || available == self.capacity() => {
                Err(Error::LineTooLong)
            }
            None => Ok(None),
        }
    }

    /// Drop everything, and reset the overflow flag.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.overflow = false;
    }

    fn consume(&mut self, count: usize) {
        self.tail = (self.tail + count) % C;
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;
    use crate::Error;

    #[test]
    fn fifo_order_across_wraparound() {
        let mut ring = RingBuffer::<8>::new();
        let mut out = [0; 8];
        let mut expected = 0u8;
        let mut next = 0u8;
        for round in 0..20 {
            let chunk: [u8; 3] = [next, next.wrapping_add(1), next.wrapping_add(2)];
            assert_eq!(ring.write(&chunk[..1 + round % 3]), 1 + round % 3);
            next = next.wrapping_add(1 + (round % 3) as u8);

            let read = ring.read(&mut out[..1 + (round + 1) % 3]);
            for byte in &out[..read] {
                assert_eq!(*byte, expected);
                expected = expected.wrapping_add(1);
            }
            assert!(ring.available() <= ring.capacity());
        }
        let read = ring.read(&mut out);
        for byte in &out[..read] {
            assert_eq!(*byte, expected);
            expected = expected.wrapping_add(1);
        }
        assert_eq!(expected, next);
        assert!(ring.is_empty());
    }

    #[test]
    fn write_parts_as_one() {
        let mut ring = RingBuffer::<8>::new();
        assert_eq!(ring.write_parts(&[&b"ok"[..], &b"\r\n"[..]]), 4);
        assert_eq!(ring.write_parts(&[&b"abc"[..], &b"\r\n"[..]]), 0);
        assert!(ring.overflowed());
        assert_eq!(ring.available(), 4);

        let mut out = [0; 8];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out[..4], b"ok\r\n");
    }

    #[test]
    fn fills_to_capacity_minus_one() {
        let mut ring = RingBuffer::<16>::new();
        assert_eq!(ring.capacity(), 15);
        assert_eq!(ring.write(&[0xAA; 15]), 15);
        assert_eq!(ring.available(), 15);
        assert_eq!(ring.free(), 0);
        assert!(!ring.overflowed());

        let mut out = [0; 15];
        assert_eq!(ring.read(&mut out), 15);
        assert_eq!(out, [0xAA; 15]);
    }

    #[test]
    fn overflow_is_all_or_nothing_and_sticky() {
        let mut ring = RingBuffer::<8>::new();
        assert_eq!(ring.write(b"abcde"), 5);
        assert_eq!(ring.write(b"fgh"), 0);
        assert!(ring.overflowed());
        assert_eq!(ring.available(), 5);

        // Still set after a write that fits, and after reads.
        assert_eq!(ring.write(b"fg"), 2);
        let mut out = [0; 7];
        assert_eq!(ring.read(&mut out), 7);
        assert_eq!(&out, b"abcdefg");
        assert!(ring.overflowed());

        ring.clear();
        assert!(!ring.overflowed());
        assert!(ring.is_empty());
    }

    #[test]
    fn read_from_empty() {
        let mut ring = RingBuffer::<4>::new();
        let mut out = [0; 4];
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn read_line() {
        let mut ring = RingBuffer::<32>::new();
        let mut line = [0; 16];

        ring.write(b"status");
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(None));
        assert_eq!(ring.available(), 6, "Pending lines aren't consumed");

        ring.write(b"\nnext");
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(Some(6)));
        assert_eq!(&line[..6], b"status");
        assert_eq!(ring.available(), 4);

        ring.write(b"\n\n");
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(Some(4)));
        assert_eq!(&line[..4], b"next");
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(Some(0)));
        assert!(ring.is_empty());
    }

    #[test]
    fn line_exactly_fills_caller_buffer() {
        let mut ring = RingBuffer::<16>::new();
        let mut line = [0; 4];
        ring.write(b"abcd\n");
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(Some(4)));
        assert_eq!(&line, b"abcd");
    }

    #[test]
    fn line_too_long_for_caller() {
        let mut ring = RingBuffer::<32>::new();
        let mut line = [0; 4];
        ring.write(b"abcde");
        assert_eq!(ring.read_until(b'\n', &mut line), Err(Error::LineTooLong));
        assert_eq!(ring.available(), 5, "Caller decides when to clear");
    }

    #[test]
    fn line_too_long_for_ring() {
        let mut ring = RingBuffer::<8>::new();
        let mut line = [0; 64];
        ring.write(b"1234567");
        assert_eq!(ring.read_until(b'\n', &mut line), Err(Error::LineTooLong));
        ring.clear();
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(None));
    }

    #[test]
    fn line_across_wraparound() {
        let mut ring = RingBuffer::<8>::new();
        let mut scratch = [0; 8];
        ring.write(b"xxxxx");
        ring.read(&mut scratch[..5]);
        ring.write(b"ab\ncd");
        let mut line = [0; 8];
        assert_eq!(ring.read_until(b'\n', &mut line), Ok(Some(2)));
        assert_eq!(&line[..2], b"ab");
        assert_eq!(ring.read(&mut scratch), 2);
        assert_eq!(&scratch[..2], b"cd");
    }
}
