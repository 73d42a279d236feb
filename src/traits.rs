use core::ops::{Range, RangeFrom, RangeTo};
#[cfg(not(debug_assertions))]
use core::slice;

/// IMPLEMENTATION DETAIL
#[allow(dead_code)]
pub trait UncheckedIndex {
    type T;

    // get_unchecked
    unsafe fn gu(&self, i: usize) -> &Self::T;
    // get_unchecked_mut
    unsafe fn gum(&mut self, i: usize) -> &mut Self::T;
    unsafe fn r(&self, r: Range<usize>) -> &Self;
    unsafe fn rm(&mut self, r: Range<usize>) -> &mut Self;
    unsafe fn rt(&self, r: RangeTo<usize>) -> &Self;
    unsafe fn rtm(&mut self, r: RangeTo<usize>) -> &mut Self;
    unsafe fn rf(&self, r: RangeFrom<usize>) -> &Self;
    unsafe fn rfm(&mut self, r: RangeFrom<usize>) -> &mut Self;
}

impl<T> UncheckedIndex for [T] {
    type T = T;

    unsafe fn gu(&self, at: usize) -> &T {
        debug_assert!(at < self.len());

        self.get_unchecked(at)
    }

    unsafe fn gum(&mut self, at: usize) -> &mut T {
        debug_assert!(at < self.len());

        self.get_unchecked_mut(at)
    }

    #[cfg(debug_assertions)]
    unsafe fn r(&self, r: Range<usize>) -> &[T] {
        &self[r]
    }

    #[cfg(not(debug_assertions))]
    unsafe fn r(&self, r: Range<usize>) -> &[T] {
        let o = r.start;
        let l = r.end - o;
        slice::from_raw_parts(self.as_ptr().add(o), l)
    }

    #[cfg(debug_assertions)]
    unsafe fn rm(&mut self, r: Range<usize>) -> &mut [T] {
        &mut self[r]
    }

    #[cfg(not(debug_assertions))]
    unsafe fn rm(&mut self, r: Range<usize>) -> &mut [T] {
        let o = r.start;
        let l = r.end - o;
        slice::from_raw_parts_mut(self.as_mut_ptr().add(o), l)
    }

    #[cfg(debug_assertions)]
    unsafe fn rt(&self, r: RangeTo<usize>) -> &[T] {
        &self[r]
    }

    #[cfg(not(debug_assertions))]
    unsafe fn rt(&self, r: RangeTo<usize>) -> &[T] {
        slice::from_raw_parts(self.as_ptr(), r.end)
    }

    #[cfg(debug_assertions)]
    unsafe fn rtm(&mut self, r: RangeTo<usize>) -> &mut [T] {
        &mut self[r]
    }

    #[cfg(not(debug_assertions))]
    unsafe fn rtm(&mut self, r: RangeTo<usize>) -> &mut [T] {
        slice::from_raw_parts_mut(self.as_mut_ptr(), r.end)
    }

    #[cfg(debug_assertions)]
    unsafe fn rf(&self, r: RangeFrom<usize>) -> &[T] {
        &self[r]
    }

    #[cfg(not(debug_assertions))]
    unsafe fn rf(&self, r: RangeFrom<usize>) -> &[T] {
        let o = r.start;
        let l = self.len() - o;
        slice::from_raw_parts(self.as_ptr().add(o), l)
    }

    #[cfg(debug_assertions)]
    unsafe fn rfm(&mut self, r: RangeFrom<usize>) -> &mut [T] {
        &mut self[r]
    }

    #[cfg(not(debug_assertions))]
    unsafe fn rfm(&mut self, r: RangeFrom<usize>) -> &mut [T] {
        let o = r.start;
        let l = self.len() - o;
        slice::from_raw_parts_mut(self.as_mut_ptr().add(o), l)
    }
}
