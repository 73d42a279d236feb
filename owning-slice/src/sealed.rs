pub trait Index: Copy + Into<usize> + PartialOrd {}

impl Index for u8 {}

impl Index for u16 {}
