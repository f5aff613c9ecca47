//! Packet memory buffers
//!
//! The packet memory area (PMA) is a small region shared by the CPU and the
//! USB peripheral. It starts with the buffer descriptor table, one entry per
//! endpoint register, followed by the endpoint buffers. Offsets are byte
//! offsets as the peripheral sees them.

use crate::Error;
use usb_device::UsbDirection;

/// Number of endpoint registers, and buffer descriptor table entries.
pub const ENDPOINT_COUNT: usize = 8;

/// Size of one buffer descriptor table entry, in bytes.
const DESCRIPTOR_SIZE: u16 = 8;

/// Size of the buffer descriptor table, in bytes.
pub const BTABLE_SIZE: u16 = ENDPOINT_COUNT as u16 * DESCRIPTOR_SIZE;

/// Largest receive buffer that `COUNTn_RX` can describe.
const MAX_RX_CAPACITY: u16 = 1024;

/// `COUNTn_RX` fields.
#[allow(non_snake_case, non_upper_case_globals)]
pub mod COUNT_RX {
    pub mod BL_SIZE {
        pub const offset: u16 = 15;
        pub const mask: u16 = 1 << offset;
    }
    pub mod NUM_BLOCK {
        pub const offset: u16 = 10;
        pub const mask: u16 = 0x1F << offset;
    }
    pub mod COUNT {
        pub const offset: u16 = 0;
        pub const mask: u16 = 0x3FF << offset;
    }
}

/// Offsets of one endpoint's buffer descriptor table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub addr_tx: u16,
    pub count_tx: u16,
    pub addr_rx: u16,
    pub count_rx: u16,
}

/// Returns the buffer descriptor table entry for endpoint register `index`.
pub fn descriptor(index: usize) -> Descriptor {
    let base = index as u16 * DESCRIPTOR_SIZE;
    Descriptor {
        addr_tx: base,
        count_tx: base + 2,
        addr_rx: base + 4,
        count_rx: base + 6,
    }
}

/// A buffer inside the packet memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buffer {
    offset: u16,
    capacity: u16,
}

impl Buffer {
    /// The buffer's byte offset in packet memory.
    pub fn offset(&self) -> u16 {
        self.offset
    }
    /// The buffer's size, in bytes.
    pub fn capacity(&self) -> u16 {
        self.capacity
    }
    /// The first byte past the buffer.
    fn end(&self) -> u16 {
        self.offset + self.capacity
    }
}

/// Round a receive buffer size up to something `COUNTn_RX` can encode.
///
/// Up to 62 bytes, the hardware counts 2-byte blocks. Beyond that, it counts
/// 32-byte blocks. Returns `None` if the size can't be described.
pub fn rx_capacity(size: u16) -> Option<u16> {
    match size {
        0 => None,
        1..=62 => Some((size + 1) & !1),
        63..=MAX_RX_CAPACITY => Some((size + 31) & !31),
        _ => None,
    }
}

/// Round a transmit buffer size up to a halfword.
fn tx_capacity(size: u16) -> Option<u16> {
    (size != 0).then_some(size.checked_add(1)? & !1)
}

/// Encode the block size and block count of a receive buffer.
///
/// `capacity` should come from [`rx_capacity()`].
pub fn rx_count_field(capacity: u16) -> u16 {
    use COUNT_RX::{BL_SIZE, NUM_BLOCK};
    if capacity > 62 {
        let blocks = capacity / 32 - 1;
        BL_SIZE::mask | ((blocks << NUM_BLOCK::offset) & NUM_BLOCK::mask)
    } else {
        let blocks = capacity / 2;
        (blocks << NUM_BLOCK::offset) & NUM_BLOCK::mask
    }
}

/// Extract the received byte count from `COUNTn_RX`.
pub fn rx_count(field: u16) -> u16 {
    (field & COUNT_RX::COUNT::mask) >> COUNT_RX::COUNT::offset
}

/// Packet memory allocator
///
/// Hands out buffers from the low end of the packet memory, after the buffer
/// descriptor table. Buffers are never freed individually; the allocator
/// rewinds to a checkpoint when endpoints are torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocator {
    next: u16,
    end: u16,
}

impl Allocator {
    /// Create an allocator for a packet memory of `size` bytes.
    pub const fn new(size: u16) -> Self {
        Allocator {
            next: BTABLE_SIZE,
            end: size,
        }
    }

    /// Allocates a buffer of at least `size` bytes for `direction`.
    ///
    /// Receive buffers are rounded up to the hardware block size. Returns
    /// `None` if the memory is exhausted; in that case, nothing is allocated.
    pub fn allocate(&mut self, direction: UsbDirection, size: u16) -> Option<Buffer> {
        let capacity = match direction {
            UsbDirection::Out => rx_capacity(size)?,
            UsbDirection::In => tx_capacity(size)?,
        };
        let buffer = Buffer {
            offset: self.next,
            capacity,
        };
        let end = self.next.checked_add(capacity)?;
        if end > self.end {
            None
        } else {
            self.next = buffer.end();
            Some(buffer)
        }
    }

    /// Returns the position of the next allocation.
    pub fn checkpoint(&self) -> u16 {
        self.next
    }

    /// Release everything allocated after `checkpoint`.
    pub fn rewind(&mut self, checkpoint: u16) {
        self.next = checkpoint.clamp(BTABLE_SIZE, self.end);
    }

    /// Release every buffer.
    pub fn reset(&mut self) {
        self.next = BTABLE_SIZE;
    }

    /// Bytes still available.
    pub fn remaining(&self) -> u16 {
        self.end - self.next
    }
}

/// One buffer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub endpoint: u8,
    pub direction: UsbDirection,
    pub size: u16,
}

/// Assign buffers to every request, in order.
///
/// Either every request receives a buffer in `buffers`, or the call fails and
/// `allocator` is left untouched. Fails with [`Error::EndpointOverflow`] if
/// there are more requests than `buffers`.
pub fn plan(
    allocator: &mut Allocator,
    requests: &[Request],
    buffers: &mut [Buffer],
) -> Result<(), Error> {
    if requests.len() > buffers.len() {
        return Err(Error::EndpointOverflow);
    }
    let mut scratch = *allocator;
    for (request, buffer) in requests.iter().zip(buffers.iter_mut()) {
        *buffer = scratch
            .allocate(request.direction, request.size)
            .ok_or(Error::EndpointMemoryOverflow)?;
    }
    *allocator = scratch;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IN: UsbDirection = UsbDirection::In;
    const OUT: UsbDirection = UsbDirection::Out;

    #[test]
    fn rx_rounding() {
        assert_eq!(rx_capacity(0), None);
        assert_eq!(rx_capacity(1), Some(2));
        assert_eq!(rx_capacity(8), Some(8));
        assert_eq!(rx_capacity(61), Some(62));
        assert_eq!(rx_capacity(62), Some(62));
        assert_eq!(rx_capacity(63), Some(64));
        assert_eq!(rx_capacity(64), Some(64));
        assert_eq!(rx_capacity(65), Some(96));
        assert_eq!(rx_capacity(1024), Some(1024));
        assert_eq!(rx_capacity(1025), None);
    }

    #[test]
    fn count_rx_encoding() {
        // 64 bytes: BL_SIZE = 1, NUM_BLOCK = 1
        assert_eq!(rx_count_field(64), 0x8400);
        // 8 bytes: BL_SIZE = 0, NUM_BLOCK = 4
        assert_eq!(rx_count_field(8), 0x1000);
        // 62 bytes: BL_SIZE = 0, NUM_BLOCK = 31
        assert_eq!(rx_count_field(62), 0x7C00);
        // 1024 bytes: BL_SIZE = 1, NUM_BLOCK = 31
        assert_eq!(rx_count_field(1024), 0xFC00);

        assert_eq!(rx_count(0x8400 | 17), 17);
    }

    #[test]
    fn allocate_entire_memory() {
        let mut alloc = Allocator::new(BTABLE_SIZE + 128);
        let tx = alloc.allocate(IN, 64).unwrap();
        assert_eq!(tx.offset(), BTABLE_SIZE);
        let rx = alloc.allocate(OUT, 64).unwrap();
        assert_eq!(rx.offset(), BTABLE_SIZE + 64);
        assert_eq!(alloc.remaining(), 0);
        assert!(alloc.allocate(IN, 2).is_none());
    }

    #[test]
    fn allocations_never_overlap() {
        let mut alloc = Allocator::new(512);
        let mut previous: Option<Buffer> = None;
        for (dir, size) in [(IN, 7), (OUT, 7), (OUT, 63), (IN, 64), (OUT, 8)] {
            let buffer = alloc.allocate(dir, size).unwrap();
            assert!(buffer.capacity() >= size);
            assert_eq!(buffer.offset() % 2, 0);
            if let Some(previous) = previous {
                assert!(previous.end() <= buffer.offset());
            }
            previous = Some(buffer);
        }
    }

    #[test]
    fn failed_allocation_allocates_nothing() {
        let mut alloc = Allocator::new(BTABLE_SIZE + 100);
        assert!(alloc.allocate(OUT, 64).is_some());
        // 63 rounds to 64, which doesn't fit in the remaining 36 bytes.
        assert!(alloc.allocate(OUT, 63).is_none());
        assert_eq!(alloc.remaining(), 36);
        assert!(alloc.allocate(IN, 36).is_some());
    }

    #[test]
    fn checkpoint_and_rewind() {
        let mut alloc = Allocator::new(512);
        alloc.allocate(IN, 64).unwrap();
        let checkpoint = alloc.checkpoint();
        let first = alloc.allocate(OUT, 64).unwrap();
        alloc.rewind(checkpoint);
        let again = alloc.allocate(OUT, 64).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn plan_is_all_or_nothing() {
        let requests = [
            Request { endpoint: 0, direction: IN, size: 64 },
            Request { endpoint: 0, direction: OUT, size: 64 },
            Request { endpoint: 1, direction: IN, size: 64 },
            Request { endpoint: 1, direction: OUT, size: 64 },
        ];
        let mut buffers = [Buffer::default(); 4];

        let mut small = Allocator::new(BTABLE_SIZE + 200);
        assert_eq!(
            plan(&mut small, &requests, &mut buffers),
            Err(Error::EndpointMemoryOverflow)
        );
        assert_eq!(small.checkpoint(), BTABLE_SIZE);

        let mut large = Allocator::new(512);
        plan(&mut large, &requests, &mut buffers).unwrap();
        assert_eq!(buffers[3].offset(), BTABLE_SIZE + 192);
        assert_eq!(large.remaining(), 512 - BTABLE_SIZE - 256);

        assert_eq!(
            plan(&mut large, &requests, &mut buffers[..2]),
            Err(Error::EndpointOverflow)
        );
    }

    #[test]
    fn descriptor_offsets() {
        assert_eq!(
            descriptor(3),
            Descriptor {
                addr_tx: 24,
                count_tx: 26,
                addr_rx: 28,
                count_rx: 30
            }
        );
    }
}
