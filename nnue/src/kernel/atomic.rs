use std::sync::atomic::{AtomicU32, Ordering};

/// f32 cell supporting lock-free accumulation through a CAS loop on its bits.
#[repr(transparent)]
pub struct AtomicF32(AtomicU32);

const _: () = assert!(std::mem::size_of::<AtomicF32>() == std::mem::size_of::<f32>());
const _: () = assert!(std::mem::align_of::<AtomicF32>() == std::mem::align_of::<f32>());

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline(always)]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Adds `value` and returns the previous contents.
    #[inline(always)]
    pub fn fetch_add(&self, value: f32) -> f32 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(previous) => return f32::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }

    /// Views an exclusively borrowed f32 buffer as atomic cells for the duration
    /// of the borrow.
    pub fn from_mut_slice(slice: &mut [f32]) -> &[AtomicF32] {
        // SAFETY: AtomicF32 is a transparent AtomicU32, which has the size and bit
        // validity of u32 (and so of f32); alignment is asserted equal above. The
        // exclusive borrow guarantees no non-atomic access while the view lives.
        unsafe { &*(slice as *mut [f32] as *const [AtomicF32]) }
    }
}
