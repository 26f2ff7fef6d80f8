#![no_std]

pub mod builder;
pub mod chip;
pub mod context;
pub mod fault;
pub mod frame;
pub mod keypad;
pub mod memory;
pub mod opcode;
pub mod registers;
pub mod timer;

#[cfg(feature = "embedded-graphics")]
pub use embedded_graphics;
pub use nb;

pub use builder::Builder;
pub use chip::Crisp8;
pub use context::Context;
pub use fault::Fault;
pub use frame::{Frame, FrameView};
pub use keypad::Keypad;
pub use opcode::OpCode;
