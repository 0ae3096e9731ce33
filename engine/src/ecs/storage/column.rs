use std::{
    alloc::{Layout, alloc, dealloc, handle_alloc_error},
    any::TypeId,
    mem::ManuallyDrop,
    ptr::NonNull,
};

use crate::ecs::{component::Info, storage::Row};

/// Fixed-capacity, type-erased storage for one component type.
///
/// A column holds the values of a single component for every entity in a
/// chunk, packed contiguously in row order. The buffer is allocated exactly
/// once at construction and never grows; when a chunk fills, the owning
/// archetype opens a fresh one.
///
/// A column does not know which of its rows are initialized. The owning
/// chunk's entity list is the source of truth: rows `0..len` are live in
/// every column, and callers must drop values before vacating rows. The
/// column itself only releases the raw allocation.
pub struct Column {
    /// Raw storage for `capacity` values. Dangling for zero-sized types.
    data: NonNull<u8>,

    /// Component metadata: layout, drop glue, merge hook.
    info: Info,

    /// Number of rows the buffer holds. Fixed at construction.
    capacity: usize,
}

// SAFETY: the column exclusively owns its buffer, and the values it stores
// are required to be Send + Sync by the Component trait bounds.
unsafe impl Send for Column {}
// SAFETY: shared access hands out shared references only; writes require
// &mut Column or an aliasing argument made by the caller.
unsafe impl Sync for Column {}

impl Column {
    /// Allocate a column holding `capacity` rows of the component `info`
    /// describes.
    pub fn new(info: Info, capacity: usize) -> Self {
        let size = info.layout().size();
        let data = if size == 0 || capacity == 0 {
            // Zero-sized values occupy no memory, but reads and writes still
            // need a well-aligned non-null pointer. The alignment itself is a
            // valid address for that.
            //
            // SAFETY: alignments are non-zero powers of two.
            unsafe { NonNull::new_unchecked(info.layout().align() as *mut u8) }
        } else {
            let layout = Self::buffer_layout(info.layout(), capacity);
            // SAFETY: layout has non-zero size.
            let ptr = unsafe { alloc(layout) };
            match NonNull::new(ptr) {
                Some(ptr) => ptr,
                None => handle_alloc_error(layout),
            }
        };
        Self {
            data,
            info,
            capacity,
        }
    }

    /// Layout of the whole buffer. Element size is always a multiple of its
    /// alignment, so rows pack with no padding between them.
    fn buffer_layout(element: Layout, capacity: usize) -> Layout {
        Layout::from_size_align(element.size() * capacity, element.align())
            .expect("column layout overflow")
    }

    /// Get the component metadata for this column.
    #[inline]
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Get the number of rows the column can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw pointer to the slot at `row`, for reads.
    ///
    /// # Safety
    /// `row` must be within capacity. Whether the slot holds an initialized
    /// value is on the caller.
    #[inline]
    pub unsafe fn ptr_at(&self, row: Row) -> NonNull<u8> {
        debug_assert!(
            row.index() < self.capacity,
            "row {} out of capacity {}",
            row.index(),
            self.capacity
        );
        // SAFETY: offset stays within (or one past) the buffer per the row
        // bound above; the base pointer is never null.
        unsafe {
            NonNull::new_unchecked(self.data.as_ptr().add(row.index() * self.info.layout().size()))
        }
    }

    /// Raw pointer to the slot at `row`, for writes.
    ///
    /// # Safety
    /// Same contract as [`Self::ptr_at`].
    #[inline]
    pub unsafe fn ptr_at_mut(&mut self, row: Row) -> NonNull<u8> {
        // SAFETY: forwarded contract.
        unsafe { self.ptr_at(row) }
    }

    /// Base pointer of the buffer. View iteration offsets from this under the
    /// scheduler's aliasing guarantees.
    #[inline]
    pub fn data_ptr(&self) -> NonNull<u8> {
        self.data
    }

    /// Move `value` into the slot at `row` without reading prior contents.
    ///
    /// # Safety
    /// `row` must be within capacity and must not currently hold a live
    /// value (freshly allocated or moved-from).
    pub unsafe fn write<C: 'static>(&mut self, row: Row, value: C) {
        self.ensure_type::<C>();
        // SAFETY: slot is vacant and sized/aligned for C per ensure_type.
        unsafe { self.ptr_at_mut(row).cast::<C>().write(value) };
    }

    /// Shared reference to the value at `row`.
    ///
    /// # Safety
    /// `row` must hold an initialized value.
    pub unsafe fn get<C: 'static>(&self, row: Row) -> &C {
        self.ensure_type::<C>();
        // SAFETY: row is live per the caller's contract.
        unsafe { self.ptr_at(row).cast::<C>().as_ref() }
    }

    /// Exclusive reference to the value at `row`.
    ///
    /// # Safety
    /// `row` must hold an initialized value.
    pub unsafe fn get_mut<C: 'static>(&mut self, row: Row) -> &mut C {
        self.ensure_type::<C>();
        // SAFETY: row is live per the caller's contract.
        unsafe { self.ptr_at_mut(row).cast::<C>().as_mut() }
    }

    /// Copy the raw bytes of the value at `row` out of the column. The slot
    /// counts as moved-from afterwards; ownership of the value travels with
    /// the bytes.
    ///
    /// # Safety
    /// `row` must hold an initialized value, and the caller must hand the
    /// bytes to exactly one slot of the same component type (or drop the
    /// value through them).
    pub unsafe fn read_bytes(&self, row: Row) -> Vec<u8> {
        let size = self.info.layout().size();
        // SAFETY: row is live; the slice covers exactly one value.
        unsafe { std::slice::from_raw_parts(self.ptr_at(row).as_ptr(), size) }.to_vec()
    }

    /// Move raw bytes into the slot at `row` without reading prior contents.
    ///
    /// # Safety
    /// `bytes` must carry an initialized value of this column's component
    /// type, and `row` must be within capacity and vacant.
    pub unsafe fn write_bytes(&mut self, row: Row, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.info.layout().size());
        // SAFETY: disjoint buffers; destination is sized for the value.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr_at_mut(row).as_ptr(), bytes.len());
        }
    }

    /// Drop the value at `row` in place. The slot is vacant afterwards.
    ///
    /// # Safety
    /// `row` must hold an initialized value that nothing else references.
    pub unsafe fn drop_in_place(&mut self, row: Row) {
        // SAFETY: row is live per the caller's contract.
        unsafe { (self.info.drop_fn())(self.ptr_at_mut(row)) };
    }

    /// Merge `value` into the live value at `row`: the component's combine
    /// hook when it declares one, drop-and-replace otherwise.
    ///
    /// # Safety
    /// `row` must hold an initialized value.
    pub unsafe fn merge<C: 'static>(&mut self, row: Row, value: C) {
        self.ensure_type::<C>();
        let mut value = ManuallyDrop::new(value);
        // SAFETY: the value is alive and not dropped by this frame again.
        unsafe { self.merge_bytes(row, NonNull::from(&mut *value).cast::<u8>()) };
    }

    /// Byte-level merge into the live value at `row`. `incoming` is
    /// moved-from afterwards.
    ///
    /// # Safety
    /// `row` must hold an initialized value; `incoming` must point at an
    /// initialized value of this column's type that the caller will not read
    /// or drop again.
    pub unsafe fn merge_bytes(&mut self, row: Row, incoming: NonNull<u8>) {
        // SAFETY: row is live per the caller's contract.
        let existing = unsafe { self.ptr_at_mut(row) };
        match self.info.combine_fn() {
            // SAFETY: both pointers hold initialized values; combine reads
            // the incoming one out.
            Some(combine) => unsafe { combine(existing, incoming) },
            None => {
                // Later value wins; the old one is dropped first.
                //
                // SAFETY: existing is live, then overwritten by a move of
                // the incoming bytes.
                unsafe {
                    (self.info.drop_fn())(existing);
                    std::ptr::copy_nonoverlapping(
                        incoming.as_ptr(),
                        existing.as_ptr(),
                        self.info.layout().size(),
                    );
                }
            }
        }
    }

    /// Move the value at `from` over the vacant slot at `to` within this
    /// column. Used when a removal backfills a hole from the same chunk.
    ///
    /// # Safety
    /// `from` must hold an initialized value, `to` must be vacant, and the
    /// rows must differ.
    pub unsafe fn move_within(&mut self, from: Row, to: Row) {
        debug_assert_ne!(from, to);
        let size = self.info.layout().size();
        // SAFETY: distinct rows never overlap; `from` counts as moved-from
        // afterwards.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr_at(from).as_ptr(),
                self.ptr_at_mut(to).as_ptr(),
                size,
            );
        }
    }

    /// Move the value at `src_row` of `src` over the vacant `dst_row` of
    /// `dst`. Used when a removal backfills a hole from a later chunk.
    ///
    /// # Safety
    /// The columns must store the same component, `src_row` must hold an
    /// initialized value, and `dst_row` must be vacant.
    pub unsafe fn move_between(src: &mut Column, src_row: Row, dst: &mut Column, dst_row: Row) {
        debug_assert_eq!(src.info.type_id(), dst.info.type_id());
        let size = src.info.layout().size();
        // SAFETY: &mut receivers guarantee disjoint buffers; `src_row`
        // counts as moved-from afterwards.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.ptr_at(src_row).as_ptr(),
                dst.ptr_at_mut(dst_row).as_ptr(),
                size,
            );
        }
    }

    /// Assert that `C` is the type this column stores.
    fn ensure_type<C: 'static>(&self) {
        assert_eq!(
            TypeId::of::<C>(),
            self.info.type_id(),
            "Type mismatch: column stores {}",
            self.info.name()
        );
        assert_eq!(Layout::new::<C>(), self.info.layout());
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        let size = self.info.layout().size();
        if size != 0 && self.capacity != 0 {
            // SAFETY: allocated in `new` with this exact layout. Live values
            // were already dropped by the owning chunk.
            unsafe { dealloc(self.data.as_ptr(), Self::buffer_layout(self.info.layout(), self.capacity)) };
        }
    }
}
