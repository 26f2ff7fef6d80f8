/// The sixteen-key input latch.
///
/// The host owns a `Keypad`, writes key transitions into it from its
/// keyboard-mapping layer, and hands the machine a read-only view through
/// `Context::keys`. Key indices are the hex digits 0x0-0xF; indices above
/// 0xF are never down (programs may probe with arbitrary register values).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Keypad([bool; 16]);

impl Keypad {
    pub fn new() -> Self {
        Self([false; 16])
    }

    pub fn is_down(&self, key: u8) -> bool {
        self.0.get(usize::from(key)).copied().unwrap_or(false)
    }

    pub fn set_down(&mut self, key: u8, pressed: bool) {
        if let Some(state) = self.0.get_mut(usize::from(key)) {
            *state = pressed;
        }
    }

    /// Lowest pressed key index, if any.
    pub fn first_down(&self) -> Option<u8> {
        self.0.iter().position(|&down| down).map(|key| key as u8)
    }
}
