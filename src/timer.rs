//! Count-down timer cells for the delay and sound timers.
//!
//! The `atomic` feature swaps in an `AtomicU8` cell so a host may tick
//! timers from a dedicated thread while another drives instructions.

pub mod racy {
    #[derive(Debug)]
    pub struct Timer(u8);

    impl Timer {
        pub fn new() -> Self {
            Self(0)
        }

        #[inline]
        pub fn store(&mut self, value: u8) {
            self.0 = value;
        }

        #[inline]
        pub fn load(&self) -> u8 {
            self.0
        }

        /// Count down by one, stopping at zero.
        #[inline]
        pub fn decrement(&mut self) {
            self.0 = self.0.saturating_sub(1);
        }
    }
}

#[cfg(feature = "atomic")]
pub mod atomic {
    use core::sync::atomic::{AtomicU8, Ordering};

    #[derive(Debug)]
    pub struct Timer(AtomicU8);

    impl Timer {
        pub fn new() -> Self {
            Self(AtomicU8::new(0))
        }

        #[inline]
        pub fn store(&mut self, value: u8) {
            self.0.store(value, Ordering::Release);
        }

        #[inline]
        pub fn load(&self) -> u8 {
            self.0.load(Ordering::Acquire)
        }

        /// Count down by one, stopping at zero.
        #[inline]
        pub fn decrement(&mut self) {
            let _ = self
                .0
                .fetch_update(Ordering::Release, Ordering::Relaxed, |value| {
                    Some(value.saturating_sub(1))
                });
        }
    }
}

#[cfg(feature = "atomic")]
pub use self::atomic::Timer;
#[cfg(not(feature = "atomic"))]
pub use self::racy::Timer;
