use crate::chip::Crisp8;
use crate::context::Context;

/// Step-by-step construction of a configured machine.
///
/// Context and program are both required; the remaining knobs default to
/// the lenient, self-timed behavior most programs expect.
pub struct Builder<'a, C: Context> {
    context: Option<C>,
    program: Option<&'a [u8]>,
    strict: bool,
    coupled_timers: bool,
}

impl<'a, C: Context> Builder<'a, C> {
    pub fn new() -> Self {
        Self {
            context: None,
            program: None,
            strict: false,
            coupled_timers: true,
        }
    }

    pub fn with_context(mut self, ctx: C) -> Self {
        self.context = Some(ctx);
        self
    }

    pub fn with_program(mut self, prog: &'a [u8]) -> Self {
        self.program = Some(prog);
        self
    }

    /// Promote faults to hard `step` errors instead of logged no-ops.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Stop `step` from ticking the timers; the host drives `tick_timers`
    /// at its own cadence (conventionally 60 Hz).
    pub fn decoupled_timers(mut self) -> Self {
        self.coupled_timers = false;
        self
    }

    pub fn build(self) -> Result<Crisp8<C>, &'static str> {
        let context = self.context.ok_or("Context not provided")?;
        let program = self.program.ok_or("Program not provided")?;
        let mut chip = Crisp8::load(context, program);
        chip.strict = self.strict;
        chip.coupled_timers = self.coupled_timers;
        Ok(chip)
    }
}

impl<'a, C: Context> Default for Builder<'a, C> {
    fn default() -> Self {
        Self::new()
    }
}
