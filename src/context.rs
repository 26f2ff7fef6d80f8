//! Context for reaching the host platform the machine runs on.
//!
//! The interpreter itself never touches a window, a keyboard or an entropy
//! source; everything host-specific comes in through this trait, which
//! keeps the core deterministic under test and portable between hosted and
//! embedded drivers.

use crate::frame::FrameView;
use crate::keypad::Keypad;

/// Trait aggregating host collaborators
pub trait Context {
    /// Receive the framebuffer after a draw or clear changed it
    ///
    /// Called at most once per `step`, before the step returns
    fn on_frame(&mut self, frame: FrameView<'_>);
    /// Read-only view of the host-owned key latch
    ///
    /// The host's keyboard mapping writes the latch; the machine only
    /// ever reads it here
    fn keys(&mut self) -> &Keypad;
    /// Generate a random 8-bit number
    ///
    /// Consumed by the masked-random instruction
    fn gen_random(&mut self) -> u8;
}

#[cfg(test)]
pub mod testing {
    use super::*;

    use nanorand::{rand::pcg64::Pcg64 as Rng, RNG};

    use crate::frame::Frame;

    /// Deterministic context for unit tests: seeded randomness, a keypad
    /// poked directly, and the latest delivered frame kept for inspection.
    pub struct TestingContext {
        frame: Option<Frame>,
        frames_seen: usize,
        keypad: Keypad,
        rng: Rng,
    }

    impl TestingContext {
        pub fn new(seed: u128) -> Self {
            Self {
                frame: None,
                frames_seen: 0,
                keypad: Keypad::new(),
                rng: Rng::new_seed(seed),
            }
        }

        pub fn frame(&self) -> Option<&Frame> {
            self.frame.as_ref()
        }

        pub fn frames_seen(&self) -> usize {
            self.frames_seen
        }

        pub fn press(&mut self, key: u8) {
            self.keypad.set_down(key, true);
        }

        pub fn release(&mut self, key: u8) {
            self.keypad.set_down(key, false);
        }
    }

    impl Context for TestingContext {
        fn on_frame(&mut self, frame: FrameView<'_>) {
            self.frame = Some(frame.copy_frame());
            self.frames_seen += 1;
        }

        fn keys(&mut self) -> &Keypad {
            &self.keypad
        }

        fn gen_random(&mut self) -> u8 {
            self.rng.generate::<u8>()
        }
    }

    #[test]
    fn testing_context() {
        let mut ctx = TestingContext::new(0);
        assert!(ctx.frame().is_none());

        let mut frame = Frame::new();
        frame.xor_pixel(1, 2);
        ctx.on_frame(frame.view());
        assert_eq!(ctx.frames_seen(), 1);
        assert_eq!(ctx.frame().unwrap().view().get_bit(1, 2), Some(&true));

        ctx.press(0x1);
        ctx.press(0xF);
        assert!(ctx.keys().is_down(0x1) && ctx.keys().is_down(0xF));

        ctx.release(0xF);
        assert!(!ctx.keys().is_down(0xF));
    }
}
