//! # Memory Channel Rings
//!
//! A channel moves fixed-size messages in one direction between two cores
//! through two shared pages:
//!
//! ```text
//! data page (written by the producer only)
//! ┌───────────┬───────────┬───────────┬─────┬───────────────┐
//! │ RingHead  │ slot 1    │ slot 2    │ ... │ slot max      │
//! │ (slot 0)  │ message 0 │ message 1 │     │ message max-1 │
//! └───────────┴───────────┴───────────┴─────┴───────────────┘
//! feedback page (written by the consumer only)
//! ┌───────────┐
//! │ RingHead  │
//! └───────────┘
//! ```
//!
//! Both heads hold a ring index in `0..max` where `max = PAGE / message_size - 1`.
//! The producer's head says where the next message goes, the consumer's head
//! says which message it reads next; equal heads mean empty, and one slot is
//! always left free so a full ring is distinguishable from an empty one.

use crate::message::Message;
use crate::phys_mapper::PhysMapper;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, Size4K};

/// Head record at the start of both channel pages.
#[repr(C)]
struct RingHead {
    index: AtomicU32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("message size {0} is outside the supported range")]
    InvalidMessageSize(usize),
    #[error("channel page {0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("channel page {0} is not mapped")]
    Unmapped(PhysicalAddress),
    #[error("channel is full")]
    Full,
    #[error("ring head {index} is outside a ring of {max} messages")]
    Corrupt { index: u32, max: u32 },
}

/// The shared state of one channel as seen from one side.
struct Ring<'m, T> {
    data: NonNull<u8>,
    feedback: NonNull<u8>,
    max: u32,
    /// Our own copy of the head we publish.
    index: u32,
    _memory: PhantomData<&'m mut [u8]>,
    _message: PhantomData<T>,
}

impl<'m, T: Message> Ring<'m, T> {
    const MESSAGE_SIZE: usize = size_of::<T>();

    fn new<M: PhysMapper>(
        mapper: &'m M,
        data: PhysicalAddress,
        feedback: PhysicalAddress,
    ) -> Result<Self, ChannelError> {
        #[allow(clippy::cast_possible_truncation)]
        let page = PAGE_SIZE as usize;
        if Self::MESSAGE_SIZE < size_of::<RingHead>() || Self::MESSAGE_SIZE > page / 2 {
            return Err(ChannelError::InvalidMessageSize(Self::MESSAGE_SIZE));
        }

        let data_ptr = Self::map_page(mapper, data)?;
        let feedback_ptr = Self::map_page(mapper, feedback)?;

        #[allow(clippy::cast_possible_truncation)]
        let max = (page / Self::MESSAGE_SIZE - 1) as u32;
        log::trace!("Attached ring data={data} feedback={feedback} ({max} slots of {} bytes)", Self::MESSAGE_SIZE);
        Ok(Self {
            data: data_ptr,
            feedback: feedback_ptr,
            max,
            index: 0,
            _memory: PhantomData,
            _message: PhantomData,
        })
    }

    fn map_page<M: PhysMapper>(mapper: &M, pa: PhysicalAddress) -> Result<NonNull<u8>, ChannelError> {
        if !pa.is_aligned::<Size4K>() {
            return Err(ChannelError::Unaligned(pa));
        }
        let ptr = NonNull::new(mapper.phys_to_ptr(pa)).ok_or(ChannelError::Unmapped(pa))?;
        if !ptr.as_ptr().cast::<RingHead>().is_aligned() {
            return Err(ChannelError::Unaligned(pa));
        }
        Ok(ptr)
    }

    fn head(page: NonNull<u8>) -> &'m AtomicU32 {
        // SAFETY: `page` is aligned, valid for a full page for 'm (PhysMapper
        // contract), and the head is only ever accessed atomically.
        unsafe { &(*page.as_ptr().cast::<RingHead>()).index }
    }

    const fn next(&self, index: u32) -> u32 {
        (index + 1) % self.max
    }

    fn check(&self, index: u32) -> Result<u32, ChannelError> {
        if index < self.max {
            Ok(index)
        } else {
            Err(ChannelError::Corrupt { index, max: self.max })
        }
    }

    fn slot(&self, index: u32) -> *mut u8 {
        let offset = (index as usize + 1) * Self::MESSAGE_SIZE;
        // SAFETY: index < max, so the slot ends within the data page.
        unsafe { self.data.as_ptr().add(offset) }
    }
}

/// The sending end of a channel.
pub struct Producer<'m, T> {
    ring: Ring<'m, T>,
}

impl<'m, T: Message> Producer<'m, T> {
    /// Attach to the channel whose pages start at `data` and `feedback`.
    ///
    /// No shared memory is touched; both heads are expected to read zero
    /// until the first message is exchanged.
    ///
    /// # Errors
    /// [`ChannelError`] if the message size does not fit the ring or a page is
    /// unaligned or unmapped.
    pub fn new<M: PhysMapper>(
        mapper: &'m M,
        data: PhysicalAddress,
        feedback: PhysicalAddress,
    ) -> Result<Self, ChannelError> {
        Ring::new(mapper, data, feedback).map(|ring| Self { ring })
    }

    /// Messages the ring holds at most.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.ring.max - 1
    }

    /// Append `message` to the ring.
    ///
    /// # Errors
    /// [`ChannelError::Full`] if the consumer has not caught up, or
    /// [`ChannelError::Corrupt`] if its head is outside the ring.
    pub fn write(&mut self, message: &T) -> Result<(), ChannelError> {
        let reader = Ring::<T>::head(self.ring.feedback).load(Ordering::Acquire);
        let reader = self.ring.check(reader)?;

        let next = self.ring.next(self.ring.index);
        if next == reader {
            log::trace!("Ring full at index {}", self.ring.index);
            return Err(ChannelError::Full);
        }

        // SAFETY: slot lies within the data page, which only we write.
        unsafe {
            ptr::copy_nonoverlapping(
                ptr::from_ref(message).cast::<u8>(),
                self.ring.slot(self.ring.index),
                Ring::<T>::MESSAGE_SIZE,
            );
        }

        self.ring.index = next;
        Ring::<T>::head(self.ring.data).store(next, Ordering::Release);
        Ok(())
    }
}

/// The receiving end of a channel.
pub struct Consumer<'m, T> {
    ring: Ring<'m, T>,
}

impl<'m, T: Message> Consumer<'m, T> {
    /// Attach to the channel whose pages start at `data` and `feedback`.
    ///
    /// # Errors
    /// [`ChannelError`] if the message size does not fit the ring or a page is
    /// unaligned or unmapped.
    pub fn new<M: PhysMapper>(
        mapper: &'m M,
        data: PhysicalAddress,
        feedback: PhysicalAddress,
    ) -> Result<Self, ChannelError> {
        Ring::new(mapper, data, feedback).map(|ring| Self { ring })
    }

    /// Take the next message if one is available.
    ///
    /// # Errors
    /// [`ChannelError::Corrupt`] if the producer's head is outside the ring.
    pub fn try_read(&mut self) -> Result<Option<T>, ChannelError> {
        let writer = Ring::<T>::head(self.ring.data).load(Ordering::Acquire);
        let writer = self.ring.check(writer)?;
        if writer == self.ring.index {
            return Ok(None);
        }

        let mut message = MaybeUninit::<T>::uninit();
        // SAFETY: the slot was published by the Release store of the producer's
        // head; every bit pattern is a valid `T` (Message contract).
        let message = unsafe {
            ptr::copy_nonoverlapping(
                self.ring.slot(self.ring.index),
                message.as_mut_ptr().cast::<u8>(),
                Ring::<T>::MESSAGE_SIZE,
            );
            message.assume_init()
        };

        self.ring.index = self.ring.next(self.ring.index);
        Ring::<T>::head(self.ring.feedback).store(self.ring.index, Ordering::Release);
        Ok(Some(message))
    }

    /// Block until a message arrives.
    ///
    /// There is no timeout; a producer that never writes blocks the caller forever.
    ///
    /// # Errors
    /// [`ChannelError::Corrupt`] if the producer's head is outside the ring.
    pub fn read(&mut self) -> Result<T, ChannelError> {
        loop {
            if let Some(message) = self.try_read()? {
                return Ok(message);
            }
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CoreMessage;
    use kernel_info::cores::CoreId;

    const PAGE: usize = 4096;

    #[repr(C, align(4096))]
    struct Pages([u8; 4 * PAGE]);

    /// Maps physical `0..4 * PAGE` onto a boxed buffer.
    struct BufferMapper {
        base: *mut u8,
    }

    impl BufferMapper {
        fn new(pages: &mut Pages) -> Self {
            Self {
                base: pages.0.as_mut_ptr(),
            }
        }
    }

    unsafe impl PhysMapper for BufferMapper {
        fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
            let offset = usize::try_from(pa.as_u64()).unwrap();
            if offset >= 4 * PAGE {
                return ptr::null_mut();
            }
            unsafe { self.base.add(offset) }
        }
    }

    fn pages() -> Box<Pages> {
        Box::new(Pages([0; 4 * PAGE]))
    }

    fn pa(page: u64) -> PhysicalAddress {
        PhysicalAddress::new(page * PAGE_SIZE)
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let mut memory = pages();
        let mapper = BufferMapper::new(&mut memory);
        let mut tx = Producer::<CoreMessage>::new(&mapper, pa(0), pa(1)).unwrap();
        let mut rx = Consumer::<CoreMessage>::new(&mapper, pa(0), pa(1)).unwrap();

        assert_eq!(rx.try_read(), Ok(None));
        for id in 1..=5 {
            tx.write(&CoreMessage::ping(CoreId::new(id))).unwrap();
        }
        for id in 1..=5 {
            assert_eq!(rx.read().unwrap().core_id(), CoreId::new(id));
        }
        assert_eq!(rx.try_read(), Ok(None));
    }

    #[test]
    fn full_ring_rejects_until_the_consumer_catches_up() {
        let mut memory = pages();
        let mapper = BufferMapper::new(&mut memory);
        let mut tx = Producer::<CoreMessage>::new(&mapper, pa(2), pa(3)).unwrap();
        let mut rx = Consumer::<CoreMessage>::new(&mapper, pa(2), pa(3)).unwrap();

        // 4096 / 16 = 256 slots, one holds the head, one stays free.
        assert_eq!(tx.capacity(), 254);
        for _ in 0..tx.capacity() {
            tx.write(&CoreMessage::ping(CoreId::new(1))).unwrap();
        }
        assert_eq!(tx.write(&CoreMessage::ping(CoreId::new(1))), Err(ChannelError::Full));

        rx.read().unwrap();
        tx.write(&CoreMessage::ping(CoreId::new(2))).unwrap();
    }

    #[test]
    fn indices_wrap_around_the_ring() {
        let mut memory = pages();
        let mapper = BufferMapper::new(&mut memory);
        let mut tx = Producer::<CoreMessage>::new(&mapper, pa(0), pa(1)).unwrap();
        let mut rx = Consumer::<CoreMessage>::new(&mapper, pa(0), pa(1)).unwrap();

        for round in 0..600_u32 {
            tx.write(&CoreMessage::ping(CoreId::new(round))).unwrap();
            assert_eq!(rx.read().unwrap().core_id(), CoreId::new(round));
        }
    }

    #[test]
    fn producer_writes_only_the_data_page() {
        let mut memory = pages();
        let mapper = BufferMapper::new(&mut memory);
        let mut tx = Producer::<CoreMessage>::new(&mapper, pa(0), pa(1)).unwrap();
        tx.write(&CoreMessage::ping(CoreId::new(9))).unwrap();
        drop(tx);

        assert!(memory.0[PAGE..2 * PAGE].iter().all(|&b| b == 0));
        assert_eq!(memory.0[0..4], 1_u32.to_ne_bytes());
        assert_eq!(memory.0[16..32], CoreMessage::ping(CoreId::new(9)).to_bytes());
    }

    #[test]
    fn corrupt_heads_are_reported() {
        let mut memory = pages();
        memory.0[0..4].copy_from_slice(&1000_u32.to_ne_bytes());
        let mapper = BufferMapper::new(&mut memory);
        let mut rx = Consumer::<CoreMessage>::new(&mapper, pa(0), pa(1)).unwrap();
        assert_eq!(rx.try_read(), Err(ChannelError::Corrupt { index: 1000, max: 255 }));
    }

    #[test]
    fn rejects_unaligned_and_unmapped_pages() {
        let mut memory = pages();
        let mapper = BufferMapper::new(&mut memory);
        let odd = PhysicalAddress::new(0x10);
        assert_eq!(
            Producer::<CoreMessage>::new(&mapper, odd, pa(1)).err(),
            Some(ChannelError::Unaligned(odd))
        );
        assert_eq!(
            Consumer::<CoreMessage>::new(&mapper, pa(0), pa(8)).err(),
            Some(ChannelError::Unmapped(pa(8)))
        );
    }

    #[test]
    fn rejects_messages_that_do_not_fit() {
        #[derive(Copy, Clone)]
        #[repr(C)]
        struct Tiny(u16);
        unsafe impl Message for Tiny {}

        #[derive(Copy, Clone)]
        #[repr(C)]
        struct Huge([u8; 3000]);
        unsafe impl Message for Huge {}

        let mut memory = pages();
        let mapper = BufferMapper::new(&mut memory);
        assert_eq!(
            Producer::<Tiny>::new(&mapper, pa(0), pa(1)).err(),
            Some(ChannelError::InvalidMessageSize(2))
        );
        assert_eq!(
            Consumer::<Huge>::new(&mapper, pa(0), pa(1)).err(),
            Some(ChannelError::InvalidMessageSize(3000))
        );
    }
}
