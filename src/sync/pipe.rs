//! Bounded lock-free ring with asymmetric access.
//!
//! Each worker owns one pipe per priority. The owner pushes and pops at the
//! front, stack style, which keeps its working set hot in cache. Any number
//! of thieves pop at the back, queue style, so they take the oldest and
//! therefore coarsest pieces. All paths are lock-free; races between the
//! owner and thieves are resolved by a per-slot flag state machine instead
//! of locks.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

const PIPE_SIZE_LOG2: u32 = 8;
const PIPE_SIZE: usize = 1 << PIPE_SIZE_LOG2;
const INDEX_MASK: u32 = PIPE_SIZE as u32 - 1;

// Per-slot state machine: Free -> Allocated -> Stored -> Locked -> Free.
// The Allocated step keeps a lapped thief from locking a half-written slot,
// and Locked serialises the owner against thieves on the same slot.
const FLAG_FREE: u32 = 0;
const FLAG_ALLOCATED: u32 = 1;
const FLAG_STORED: u32 = 2;
const FLAG_LOCKED: u32 = 3;

/// Single-owner, multi-thief ring of `PIPE_SIZE` slots.
///
/// `write` and `read_count` are free-running; a slot address is
/// `index & INDEX_MASK`. `write - read_count` never exceeds `PIPE_SIZE`,
/// though a thief that loses a race briefly over-counts `read_count`, which
/// only errs toward "full" at the owner and "empty" at thieves.
///
/// Only the owning worker may call [`push_front`](Pipe::push_front) and
/// [`pop_front`](Pipe::pop_front); any thread may call
/// [`steal_back`](Pipe::steal_back).
pub(crate) struct Pipe<T> {
    write: CachePadded<AtomicU32>,
    read_count: CachePadded<AtomicU32>,
    flags: [AtomicU32; PIPE_SIZE],
    slots: [UnsafeCell<MaybeUninit<T>>; PIPE_SIZE],
}

// The flag machine hands each slot to exactly one thread at a time, so the
// UnsafeCell contents are never accessed concurrently.
unsafe impl<T: Send> Send for Pipe<T> {}
unsafe impl<T: Send> Sync for Pipe<T> {}

impl<T> Pipe<T> {
    pub(crate) fn new() -> Self {
        Self {
            write: CachePadded::new(AtomicU32::new(0)),
            read_count: CachePadded::new(AtomicU32::new(0)),
            flags: std::array::from_fn(|_| AtomicU32::new(FLAG_FREE)),
            slots: std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
        }
    }

    /// Owner-only: publish `item` at the front.
    ///
    /// Fails and hands the item back when the pipe is full, or when a thief
    /// is still mid-read on the slot from a previous lap. The caller treats
    /// both the same way: run a piece inline instead.
    pub(crate) fn push_front(&self, item: T) -> Result<(), T> {
        let write = self.write.load(Ordering::Relaxed);
        if write.wrapping_sub(self.read_count.load(Ordering::Acquire)) >= PIPE_SIZE as u32 {
            return Err(item);
        }

        let slot = (write & INDEX_MASK) as usize;
        if self.flags[slot]
            .compare_exchange(
                FLAG_FREE,
                FLAG_ALLOCATED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return Err(item);
        }

        unsafe { (*self.slots[slot].get()).write(item) };
        self.flags[slot].store(FLAG_STORED, Ordering::Release);
        self.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Owner-only: take back the most recently pushed item.
    ///
    /// Returns `None` when the pipe is empty or a thief already locked the
    /// last slot.
    pub(crate) fn pop_front(&self) -> Option<T> {
        let write = self.write.load(Ordering::Relaxed);
        if write == self.read_count.load(Ordering::Acquire) {
            return None;
        }

        let index = write.wrapping_sub(1);
        let slot = (index & INDEX_MASK) as usize;
        if self.flags[slot]
            .compare_exchange(FLAG_STORED, FLAG_LOCKED, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        // Safe to retreat now that the slot is locked; thieves that claimed
        // this index will fail their flag CAS and revert.
        self.write.store(index, Ordering::Relaxed);
        let item = unsafe { (*self.slots[slot].get()).assume_init_read() };
        self.flags[slot].store(FLAG_FREE, Ordering::Release);
        Some(item)
    }

    /// Steal the oldest item from the back. Any thread may call this.
    pub(crate) fn steal_back(&self) -> Option<T> {
        // Claim an index optimistically, then validate it. A failed claim is
        // reverted; the transient over-count only produces spurious
        // full/empty answers elsewhere, never an overrun.
        let index = self.read_count.fetch_add(1, Ordering::AcqRel);

        let write = self.write.load(Ordering::Acquire);
        if write.wrapping_sub(index) as i32 <= 0 {
            self.read_count.fetch_sub(1, Ordering::Release);
            return None;
        }

        let slot = (index & INDEX_MASK) as usize;
        if self.flags[slot]
            .compare_exchange(FLAG_STORED, FLAG_LOCKED, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // The owner popped this index first.
            self.read_count.fetch_sub(1, Ordering::Release);
            return None;
        }

        let item = unsafe { (*self.slots[slot].get()).assume_init_read() };
        self.flags[slot].store(FLAG_FREE, Ordering::Release);
        Some(item)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.write.load(Ordering::Acquire) == self.read_count.load(Ordering::Acquire)
    }
}

impl<T> Drop for Pipe<T> {
    fn drop(&mut self) {
        // Items still stored when the scheduler shuts down are discarded.
        for (slot, flag) in self.flags.iter().enumerate() {
            if flag.load(Ordering::Relaxed) == FLAG_STORED {
                unsafe { (*self.slots[slot].get()).assume_init_drop() };
            }
        }
    }
}
