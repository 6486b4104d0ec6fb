//! Replayable allocation workloads for comparing strategies.
//!
//! [`vector_fill()`] and [`map_churn()`] mimic what a growable sequence and a node-based map do
//! to their allocator, using nothing but [`ByteAllocator`] calls. [`typed_vector_fill()`] and
//! [`typed_map_churn()`] run the same workloads on real containers that allocate through a
//! [`SharedAllocator`].
//!
//! Every workload returns a checksum of the data it stored, so that runs can be checked for
//! identical results on every strategy, and the raw and typed variants of a workload agree.

use std::num::NonZero;
use std::ptr::{self, NonNull};

use hashbrown::HashMap;
use new_zealand::nz;

use crate::{ByteAllocator, Result, SharedAllocator};

/// Number of elements [`vector_fill()`] is usually run with.
pub const VECTOR_ELEMENTS: usize = 500;

/// Size of one sequence element.
pub const ELEMENT_SIZE: usize = size_of::<usize>();

/// Capacity of the sequence after its first growth.
const INITIAL_CAPACITY: usize = 4;

/// Keys [`map_churn()`] is usually run with are in `0..MAP_KEY_RANGE`.
pub const MAP_KEY_RANGE: u32 = 1000;

/// Size of one map node: a `u32` key, a `u32` value and room for the links a real map keeps.
pub const NODE_SIZE: usize = 16;

/// [`NODE_SIZE`] as a size class for a [`ReuseAllocator`][crate::ReuseAllocator] that serves map
/// nodes.
pub const NODE_SIZE_CLASS: NonZero<usize> = nz!(16);

const _: () = assert!(NODE_SIZE_CLASS.get() == NODE_SIZE);

const CHURN_STEPS: usize = 10;

const VALUE_OFFSET: usize = size_of::<u32>();

/// Pushes `elements` values onto a sequence that doubles its capacity whenever it is full.
///
/// Every growth allocates the new storage, copies the elements over and returns the old storage,
/// which is the traffic pattern of a growable vector.
///
/// # Errors
///
/// Returns the first error reported by `allocator`.
pub fn vector_fill<A: ByteAllocator>(allocator: &mut A, elements: usize) -> Result<usize> {
    if elements == 0 {
        return Ok(0);
    }

    let mut capacity = INITIAL_CAPACITY;
    let mut storage = allocator.allocate(byte_len(capacity))?;

    for len in 0..elements {
        if len == capacity {
            let grown_capacity = capacity.saturating_mul(2);
            let grown = allocator.allocate(byte_len(grown_capacity))?;

            // SAFETY: Both regions are live, distinct and hold at least `len` elements.
            unsafe {
                ptr::copy_nonoverlapping(storage.as_ptr(), grown.as_ptr(), byte_len(len));
            }

            // SAFETY: The old storage was allocated with exactly this size and is not used again.
            unsafe {
                allocator.deallocate(storage, byte_len(capacity));
            }

            storage = grown;
            capacity = grown_capacity;
        }

        // SAFETY: `len` is below the capacity of the storage.
        unsafe {
            element(storage, len).write_unaligned(len);
        }
    }

    let checksum = (0..elements).fold(0_usize, |sum, index| {
        // SAFETY: Every element below `elements` has been written above.
        let value = unsafe { element(storage, index).read_unaligned() };
        sum.wrapping_add(value)
    });

    // SAFETY: The storage was allocated with exactly this size.
    unsafe {
        allocator.deallocate(storage, byte_len(capacity));
    }

    Ok(checksum)
}

/// Churns a node-based map of keys in `0..key_range`.
///
/// Over ten steps, odd steps add to (or insert) every key that is a multiple of the step and even
/// steps remove every key that is a multiple of the step. After each step, the frequency of every
/// value is counted in a temporary map whose nodes never outlive the step, so the counting runs
/// inside a [scoped checkpoint][ByteAllocator::scoped_checkpoint].
///
/// # Errors
///
/// Returns the first error reported by `allocator`.
pub fn map_churn<A: ByteAllocator>(allocator: &mut A, key_range: u32) -> Result<u64> {
    let mut map: HashMap<u32, NonNull<u8>> = HashMap::new();
    let mut checksum = 0_u64;

    for step in 1..=CHURN_STEPS {
        let keys = (0..key_range).step_by(step);

        if step % 2 == 1 {
            for key in keys {
                if let Some(&node) = map.get(&key) {
                    // SAFETY: Nodes in the map are live and were fully written on insertion.
                    unsafe {
                        add_to_value(node, key);
                    }
                } else {
                    let node = allocator.allocate(NODE_SIZE)?;

                    // SAFETY: The node was just allocated with room for a key and a value.
                    unsafe {
                        write_node(node, key, key);
                    }

                    map.insert(key, node);
                }
            }
        } else {
            for key in keys {
                if let Some(node) = map.remove(&key) {
                    // SAFETY: Map nodes are allocated with exactly this size and just left the map.
                    unsafe {
                        allocator.deallocate(node, NODE_SIZE);
                    }
                }
            }
        }

        let mut scope = allocator.scoped_checkpoint();
        let mut frequencies: HashMap<u32, NonNull<u8>> = HashMap::new();

        for &node in map.values() {
            // SAFETY: Nodes in the map are live and were fully written on insertion.
            let value = unsafe { read_value(node) };

            if let Some(&counter) = frequencies.get(&value) {
                // SAFETY: Counters are live and were fully written on insertion.
                unsafe {
                    add_to_value(counter, 1);
                }
            } else {
                let counter = scope.allocate(NODE_SIZE)?;

                // SAFETY: The counter was just allocated with room for a key and a value.
                unsafe {
                    write_node(counter, value, 1);
                }

                frequencies.insert(value, counter);
            }
        }

        for counter in frequencies.into_values() {
            // SAFETY: Counters are live and were fully written on insertion.
            checksum = checksum.wrapping_add(u64::from(unsafe { read_value(counter) }));

            // SAFETY: Counters are allocated with exactly this size and are not used again.
            unsafe {
                scope.deallocate(counter, NODE_SIZE);
            }
        }
    }

    for node in map.into_values() {
        // SAFETY: Nodes in the map are live and were fully written on insertion.
        checksum = checksum.wrapping_add(u64::from(unsafe { read_value(node) }));

        // SAFETY: Map nodes are allocated with exactly this size and are not used again.
        unsafe {
            allocator.deallocate(node, NODE_SIZE);
        }
    }

    Ok(checksum)
}

/// Pushes `elements` values onto an [`allocator_api2::vec::Vec`] that allocates through
/// `allocator`.
///
/// Returns the same checksum as [`vector_fill()`] with the same element count.
///
/// # Panics
///
/// Like the standard containers, the vector treats running out of memory as fatal.
pub fn typed_vector_fill<B: ByteAllocator>(
    allocator: &SharedAllocator<B>,
    elements: usize,
) -> usize {
    let mut vector = allocator_api2::vec::Vec::new_in(allocator.clone());

    for value in 0..elements {
        vector.push(value);
    }

    vector.iter().fold(0_usize, |sum, &value| sum.wrapping_add(value))
}

/// Runs the [`map_churn()`] workload on a [`hashbrown::HashMap`] that allocates through
/// `allocator`.
///
/// The temporary frequency map of every step allocates through another clone of `allocator`
/// inside a [scoped checkpoint][ByteAllocator::scoped_checkpoint] and is dropped before the scope
/// ends. Returns the same checksum as [`map_churn()`] with the same key range.
///
/// # Panics
///
/// Like the standard containers, the maps treat running out of memory as fatal.
pub fn typed_map_churn<B: ByteAllocator>(
    allocator: &mut SharedAllocator<B>,
    key_range: u32,
) -> u64 {
    let mut map = HashMap::new_in(allocator.clone());
    let mut checksum = 0_u64;

    for step in 1..=CHURN_STEPS {
        let keys = (0..key_range).step_by(step);

        if step % 2 == 1 {
            for key in keys {
                let value = map.entry(key).or_insert(0_u32);
                *value = value.wrapping_add(key);
            }
        } else {
            for key in keys {
                map.remove(&key);
            }
        }

        let counters = allocator.clone();
        let _scope = allocator.scoped_checkpoint();

        // Declared after the scope, so it is dropped before the scope rewinds its memory.
        let mut frequencies = HashMap::new_in(counters);

        for &value in map.values() {
            let count = frequencies.entry(value).or_insert(0_u32);
            *count = count.wrapping_add(1);
        }

        checksum = frequencies
            .values()
            .fold(checksum, |sum, &count| sum.wrapping_add(u64::from(count)));
    }

    map.values()
        .fold(checksum, |sum, &value| sum.wrapping_add(u64::from(value)))
}

fn byte_len(elements: usize) -> usize {
    elements.saturating_mul(ELEMENT_SIZE)
}

fn element(storage: NonNull<u8>, index: usize) -> *mut usize {
    storage.as_ptr().wrapping_add(byte_len(index)).cast::<usize>()
}

/// # Safety
///
/// `node` must point to at least [`NODE_SIZE`] writable bytes.
unsafe fn write_node(node: NonNull<u8>, key: u32, value: u32) {
    // SAFETY: Forwarding the size guarantee from the caller.
    unsafe {
        node.as_ptr().cast::<u32>().write_unaligned(key);
    }

    // SAFETY: Forwarding the size guarantee from the caller.
    unsafe {
        node.as_ptr()
            .add(VALUE_OFFSET)
            .cast::<u32>()
            .write_unaligned(value);
    }
}

/// # Safety
///
/// `node` must point to a node written by [`write_node()`].
unsafe fn read_value(node: NonNull<u8>) -> u32 {
    // SAFETY: Forwarding the initialization guarantee from the caller.
    unsafe { node.as_ptr().add(VALUE_OFFSET).cast::<u32>().read_unaligned() }
}

/// # Safety
///
/// `node` must point to a node written by [`write_node()`].
unsafe fn add_to_value(node: NonNull<u8>, amount: u32) {
    // SAFETY: Forwarding the initialization guarantee from the caller.
    let value = unsafe { read_value(node) };

    // SAFETY: Forwarding the initialization guarantee from the caller.
    unsafe {
        node.as_ptr()
            .add(VALUE_OFFSET)
            .cast::<u32>()
            .write_unaligned(value.wrapping_add(amount));
    }
}
