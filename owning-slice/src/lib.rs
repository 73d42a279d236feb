//! In-place truncation of slice-like buffers, indexed by small integer types

#![deny(warnings)]
#![no_std]

mod sealed;
#[cfg(test)]
mod tests;

use core::slice;

/// Shortens a buffer, in place, to `len` elements
pub trait Truncate<I> {
    /// Truncates the buffer; a `len` at or past the end leaves it unchanged
    fn truncate(&mut self, len: I);
}

impl<'a, T, I> Truncate<I> for &'a [T]
where
    I: sealed::Index,
{
    fn truncate(&mut self, len: I) {
        let end = len.into();

        if end < self.len() {
            *self = &self[..end]
        }
    }
}

impl<'a, T, I> Truncate<I> for &'a mut [T]
where
    I: sealed::Index,
{
    fn truncate(&mut self, len: I) {
        let end = len.into();

        if end < self.len() {
            *self = unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), end) };
        }
    }
}
