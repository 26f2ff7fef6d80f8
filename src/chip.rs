use core::convert::TryFrom;

use log::{trace, warn};

use crate::context::Context;
use crate::fault::Fault;
use crate::frame::{Frame, FrameView};
use crate::memory::Memory;
use crate::opcode::OpCode;
use crate::registers::Registers;

/// The machine: fetch, decode and execute over memory, registers and the
/// framebuffer, reaching the host through a [`Context`].
///
/// `step` is the only execution primitive; an external driver decides how
/// often to call it. The machine never blocks internally: a program
/// waiting on a keypress parks in an explicit suspended state and `step`
/// reports `nb::Error::WouldBlock` until the latch shows a key.
pub struct Crisp8<C: Context> {
    pub ctx: C,
    memory: Memory,
    regs: Registers,
    frame: Frame,
    /// Target register of a pending key wait.
    awaiting_key: Option<u8>,
    frame_changed: bool,
    pub(crate) strict: bool,
    pub(crate) coupled_timers: bool,
}

impl<C: Context> Crisp8<C> {
    fn new(ctx: C) -> Self {
        Self {
            ctx,
            memory: Memory::new(),
            regs: Registers::new(),
            frame: Frame::new(),
            awaiting_key: None,
            frame_changed: false,
            strict: false,
            coupled_timers: true,
        }
    }

    /// Build a fresh machine with `prog` loaded at 0x200.
    ///
    /// Loading a different program means building a new machine; the old
    /// one's memory, registers and framebuffer go down with it.
    pub fn load(ctx: C, prog: &[u8]) -> Self {
        let mut chip = Self::new(ctx);
        chip.memory.load_program(prog);
        chip
    }

    /// Execute a single machine step.
    ///
    /// One call performs exactly one of:
    /// - fetch/decode/execute of the instruction at PC,
    /// - completion of a pending key wait, or
    /// - only a timer tick, when the wait is still unsatisfied; the call
    ///   then returns `nb::Error::WouldBlock`.
    ///
    /// Faults surface as `nb::Error::Other` only on a machine built with
    /// `Builder::strict`; by default they are logged and execution
    /// continues.
    pub fn step(&mut self) -> nb::Result<(), Fault> {
        if self.coupled_timers {
            self.regs.tick_timers();
        }
        if let Some(x) = self.awaiting_key {
            return self.finish_key_wait(x);
        }

        let raw = self.fetch().map_err(nb::Error::Other)?;
        match OpCode::try_from(raw) {
            Ok(opcode) => {
                trace!("{:#05x}: {:?}", self.regs.pc(), opcode);
                self.execute(opcode).map_err(nb::Error::Other)?;
            }
            Err(fault) => {
                self.soften(fault).map_err(nb::Error::Other)?;
                self.regs.advance_pc();
            }
        }

        if self.frame_changed {
            self.frame_changed = false;
            self.ctx.on_frame(self.frame.view());
        }
        Ok(())
    }

    /// Count both timers down by one. Public for hosts that build with
    /// `Builder::decoupled_timers` and drive the cadence themselves.
    pub fn tick_timers(&mut self) {
        self.regs.tick_timers();
    }

    /// Whether the machine is parked on a key wait.
    ///
    /// A driver may skip `step` calls until its input layer reports a key,
    /// instead of collecting `WouldBlock`s.
    pub fn is_awaiting_key(&self) -> bool {
        self.awaiting_key.is_some()
    }

    /// Current program counter, for drivers and debuggers.
    pub fn pc(&self) -> u16 {
        self.regs.pc()
    }

    pub fn delay_timer(&self) -> u8 {
        self.regs.delay()
    }

    pub fn sound_timer(&self) -> u8 {
        self.regs.sound()
    }

    /// View of the current framebuffer, for hosts that render on their own
    /// cadence instead of per `Context::on_frame` notification.
    pub fn frame(&self) -> FrameView<'_> {
        self.frame.view()
    }

    /// Return registers, stack, timers, framebuffer and wait state to
    /// power-on. Memory keeps the glyph table and the loaded program, so
    /// the same program runs again from 0x200.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.frame.clear();
        self.frame_changed = false;
        self.awaiting_key = None;
    }

    /// Big-endian instruction word at PC.
    fn fetch(&mut self) -> Result<u16, Fault> {
        let hi = self.read_mem(self.regs.pc())?;
        let lo = self.read_mem(self.regs.pc().wrapping_add(1))?;
        Ok(u16::from(hi) << 8 | u16::from(lo))
    }

    fn finish_key_wait(&mut self, x: u8) -> nb::Result<(), Fault> {
        match self.ctx.keys().first_down() {
            Some(key) => {
                self.regs.set_v(x, key);
                self.awaiting_key = None;
                self.regs.advance_pc();
                Ok(())
            }
            None => Err(nb::Error::WouldBlock),
        }
    }

    /// Apply the fault policy: strict machines report, lenient machines
    /// log and carry on with the documented substitute behavior.
    fn soften(&self, fault: Fault) -> Result<(), Fault> {
        if self.strict {
            Err(fault)
        } else {
            warn!("{}", fault);
            Ok(())
        }
    }

    /// Memory read under the fault policy; lenient reads yield 0.
    fn read_mem(&self, addr: u16) -> Result<u8, Fault> {
        match self.memory.read(addr) {
            Ok(byte) => Ok(byte),
            Err(fault) => self.soften(fault).map(|_| 0),
        }
    }

    /// Memory write under the fault policy; lenient writes are dropped.
    fn write_mem(&mut self, addr: u16, value: u8) -> Result<(), Fault> {
        match self.memory.write(addr, value) {
            Ok(()) => Ok(()),
            Err(fault) => self.soften(fault),
        }
    }
}

// OpCodes impls
impl<C: Context> Crisp8<C> {
    #[rustfmt::skip]
    fn execute(&mut self, opcode: OpCode) -> Result<(), Fault> {
        match opcode {
            OpCode::_00E0             => self.clear_screen(),
            OpCode::_00EE             => return self.subroutine_return(),
            OpCode::_1NNN { nnn }     => return self.jump_to(nnn),
            OpCode::_2NNN { nnn }     => return self.exec_subroutine_at(nnn),
            OpCode::_3XNN { x, nn }   => self.skip_if_vx_eq_nn(x, nn),
            OpCode::_4XNN { x, nn }   => self.skip_if_vx_ne_nn(x, nn),
            OpCode::_5XY0 { x, y }    => self.skip_if_vx_eq_vy(x, y),
            OpCode::_6XNN { x, nn }   => self.assign_vx_nn(x, nn),
            OpCode::_7XNN { x, nn }   => self.assign_add_vx_nn(x, nn),
            OpCode::_8XY0 { x, y }    => self.assign_vx_vy(x, y),
            OpCode::_8XY1 { x, y }    => self.assign_or_vx_vy(x, y),
            OpCode::_8XY2 { x, y }    => self.assign_and_vx_vy(x, y),
            OpCode::_8XY3 { x, y }    => self.assign_xor_vx_vy(x, y),
            OpCode::_8XY4 { x, y }    => self.assign_add_vx_vy(x, y),
            OpCode::_8XY5 { x, y }    => self.assign_sub_vx_vy(x, y),
            OpCode::_8XY6 { x, y }    => self.assign_vx_vy_shifted_r(x, y),
            OpCode::_8XY7 { x, y }    => self.assign_vx_vy_sub_vx(x, y),
            OpCode::_8XYE { x, y }    => self.assign_vx_vy_shifted_l(x, y),
            OpCode::_9XY0 { x, y }    => self.skip_if_vx_ne_vy(x, y),
            OpCode::_ANNN { nnn }     => self.assign_i_nnn(nnn),
            OpCode::_BNNN { nnn }     => return self.jump_to_nnn_add_v0(nnn),
            OpCode::_CXNN { x, nn }   => self.assign_vx_random_and_nn(x, nn),
            OpCode::_DXYN { x, y, n } => self.draw_n_at_vx_vy(x, y, n),
            OpCode::_EX9E { x }       => self.skip_if_vx_in_keys(x),
            OpCode::_EXA1 { x }       => self.skip_if_vx_not_in_keys(x),
            OpCode::_FX07 { x }       => self.assign_vx_delay_t(x),
            OpCode::_FX0A { x }       => return self.begin_key_wait(x),
            OpCode::_FX15 { x }       => self.assign_delay_t_vx(x),
            OpCode::_FX18 { x }       => self.assign_sound_t_vx(x),
            OpCode::_FX1E { x }       => self.assign_add_i_vx(x),
            OpCode::_FX29 { x }       => self.assign_i_addr_of_sprite_vx(x),
            OpCode::_FX33 { x }       => self.assign_mem_at_i_bcd_of_vx(x),
            OpCode::_FX55 { x }       => self.assign_mem_at_i_v0_to_vx(x),
            OpCode::_FX65 { x }       => self.assign_v0_to_vx_mem_at_i(x),
        }?;
        self.regs.advance_pc();
        Ok(())
    }

    /// Clear the screen
    /// 00E0
    fn clear_screen(&mut self) -> Result<(), Fault> {
        self.frame.clear();
        self.frame_changed = true;
        Ok(())
    }

    /// Return from a subroutine
    /// 00EE
    fn subroutine_return(&mut self) -> Result<(), Fault> {
        let addr = self.regs.pop_return();
        self.regs.set_pc(addr);
        Ok(())
    }

    /// Jump to address NNN
    /// 1NNN
    fn jump_to(&mut self, nnn: u16) -> Result<(), Fault> {
        self.regs.set_pc(nnn);
        Ok(())
    }

    /// Execute subroutine starting at address NNN, saving the address of
    /// the following instruction
    /// 2NNN
    fn exec_subroutine_at(&mut self, nnn: u16) -> Result<(), Fault> {
        let ret = self.regs.pc().wrapping_add(2);
        if let Err(fault) = self.regs.push_return(ret) {
            self.soften(fault)?;
        }
        self.regs.set_pc(nnn);
        Ok(())
    }

    /// Skip the following instruction if VX equals NN
    /// 3XNN
    fn skip_if_vx_eq_nn(&mut self, x: u8, nn: u8) -> Result<(), Fault> {
        if self.regs.v(x) == nn {
            self.regs.advance_pc();
        }
        Ok(())
    }

    /// Skip the following instruction if VX is not equal to NN
    /// 4XNN
    fn skip_if_vx_ne_nn(&mut self, x: u8, nn: u8) -> Result<(), Fault> {
        if self.regs.v(x) != nn {
            self.regs.advance_pc();
        }
        Ok(())
    }

    /// Skip the following instruction if VX equals VY
    /// 5XY0
    fn skip_if_vx_eq_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        if self.regs.v(x) == self.regs.v(y) {
            self.regs.advance_pc();
        }
        Ok(())
    }

    /// Store number NN in register VX
    /// 6XNN
    fn assign_vx_nn(&mut self, x: u8, nn: u8) -> Result<(), Fault> {
        self.regs.set_v(x, nn);
        Ok(())
    }

    /// Add NN to VX. The carry flag is left alone
    /// 7XNN
    fn assign_add_vx_nn(&mut self, x: u8, nn: u8) -> Result<(), Fault> {
        let sum = self.regs.v(x).wrapping_add(nn);
        self.regs.set_v(x, sum);
        Ok(())
    }

    /// Store the value of register VY in register VX
    /// 8XY0
    fn assign_vx_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        self.regs.set_v(x, self.regs.v(y));
        Ok(())
    }

    /// Set VX to VX OR VY
    /// 8XY1
    fn assign_or_vx_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        self.regs.set_v(x, self.regs.v(x) | self.regs.v(y));
        Ok(())
    }

    /// Set VX to VX AND VY
    /// 8XY2
    fn assign_and_vx_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        self.regs.set_v(x, self.regs.v(x) & self.regs.v(y));
        Ok(())
    }

    /// Set VX to VX XOR VY
    /// 8XY3
    fn assign_xor_vx_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        self.regs.set_v(x, self.regs.v(x) ^ self.regs.v(y));
        Ok(())
    }

    /// Add VY to VX; VF reports the carry. The flag is written first, so
    /// with X = F the sum wins the register
    /// 8XY4
    fn assign_add_vx_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        let (sum, carry) = self.regs.v(x).overflowing_add(self.regs.v(y));
        self.regs.set_vf(if carry { 0x01 } else { 0x00 });
        self.regs.set_v(x, sum);
        Ok(())
    }

    /// Subtract VY from VX; VF clears on borrow
    /// 8XY5
    fn assign_sub_vx_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        let (diff, borrow) = self.regs.v(x).overflowing_sub(self.regs.v(y));
        self.regs.set_vf(if borrow { 0x00 } else { 0x01 });
        self.regs.set_v(x, diff);
        Ok(())
    }

    /// Store VY shifted right one bit in VX; VF takes VY's old low bit.
    /// Reading from VY is the historical behavior some programs depend on
    /// 8XY6
    fn assign_vx_vy_shifted_r(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        let value = self.regs.v(y);
        self.regs.set_vf(value & 0x01);
        self.regs.set_v(x, value >> 1);
        Ok(())
    }

    /// Set VX to VY minus VX; VF clears on borrow
    /// 8XY7
    fn assign_vx_vy_sub_vx(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        let (diff, borrow) = self.regs.v(y).overflowing_sub(self.regs.v(x));
        self.regs.set_vf(if borrow { 0x00 } else { 0x01 });
        self.regs.set_v(x, diff);
        Ok(())
    }

    /// Shift VY left one bit, storing the result in both VY and VX; VF
    /// takes VY's old high bit. The write-back to VY is historical too
    /// 8XYE
    fn assign_vx_vy_shifted_l(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        let value = self.regs.v(y);
        self.regs.set_vf(value >> 7);
        self.regs.set_v(y, value << 1);
        self.regs.set_v(x, value << 1);
        Ok(())
    }

    /// Skip the following instruction if VX is not equal to VY
    /// 9XY0
    fn skip_if_vx_ne_vy(&mut self, x: u8, y: u8) -> Result<(), Fault> {
        if self.regs.v(x) != self.regs.v(y) {
            self.regs.advance_pc();
        }
        Ok(())
    }

    /// Store memory address NNN in register I
    /// ANNN
    fn assign_i_nnn(&mut self, nnn: u16) -> Result<(), Fault> {
        self.regs.set_i(nnn);
        Ok(())
    }

    /// Jump to address NNN + V0
    /// BNNN
    fn jump_to_nnn_add_v0(&mut self, nnn: u16) -> Result<(), Fault> {
        self.regs.set_pc(nnn.wrapping_add(u16::from(self.regs.v(0))));
        Ok(())
    }

    /// Set VX to a random number masked with NN
    /// CXNN
    fn assign_vx_random_and_nn(&mut self, x: u8, nn: u8) -> Result<(), Fault> {
        let random = self.ctx.gen_random();
        self.regs.set_v(x, nn & random);
        Ok(())
    }

    /// Draw the N-row sprite at I to (VX, VY), xor-blitting row bytes most
    /// significant bit leftmost. VF reports whether any lit pixel went out
    /// DXYN
    fn draw_n_at_vx_vy(&mut self, x: u8, y: u8, n: u8) -> Result<(), Fault> {
        let origin_x = usize::from(self.regs.v(x));
        let origin_y = usize::from(self.regs.v(y));
        let mut collided = false;
        for row in 0..usize::from(n) {
            let byte = self.read_mem(self.regs.i().wrapping_add(row as u16))?;
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    collided |= self.frame.xor_pixel(origin_x + bit, origin_y + row);
                }
            }
        }
        self.regs.set_vf(if collided { 0x01 } else { 0x00 });
        self.frame_changed = true;
        Ok(())
    }

    /// Skip the following instruction if the key in VX is pressed
    /// EX9E
    fn skip_if_vx_in_keys(&mut self, x: u8) -> Result<(), Fault> {
        let key = self.regs.v(x);
        if self.ctx.keys().is_down(key) {
            self.regs.advance_pc();
        }
        Ok(())
    }

    /// Skip the following instruction if the key in VX is not pressed
    /// EXA1
    fn skip_if_vx_not_in_keys(&mut self, x: u8) -> Result<(), Fault> {
        let key = self.regs.v(x);
        if !self.ctx.keys().is_down(key) {
            self.regs.advance_pc();
        }
        Ok(())
    }

    /// Store the delay timer in register VX
    /// FX07
    fn assign_vx_delay_t(&mut self, x: u8) -> Result<(), Fault> {
        self.regs.set_v(x, self.regs.delay());
        Ok(())
    }

    /// Park the machine until a key is pressed, then store it in VX. PC
    /// stays on this instruction while the wait lasts; `step` resolves it
    /// FX0A
    fn begin_key_wait(&mut self, x: u8) -> Result<(), Fault> {
        self.awaiting_key = Some(x);
        Ok(())
    }

    /// Set the delay timer to VX
    /// FX15
    fn assign_delay_t_vx(&mut self, x: u8) -> Result<(), Fault> {
        self.regs.set_delay(self.regs.v(x));
        Ok(())
    }

    /// Set the sound timer to VX
    /// FX18
    fn assign_sound_t_vx(&mut self, x: u8) -> Result<(), Fault> {
        self.regs.set_sound(self.regs.v(x));
        Ok(())
    }

    /// Add VX to register I, wrapping at 16 bits
    /// FX1E
    fn assign_add_i_vx(&mut self, x: u8) -> Result<(), Fault> {
        let addr = self.regs.i().wrapping_add(u16::from(self.regs.v(x)));
        self.regs.set_i(addr);
        Ok(())
    }

    /// Point I at the glyph sprite for the digit in VX
    /// FX29
    fn assign_i_addr_of_sprite_vx(&mut self, x: u8) -> Result<(), Fault> {
        self.regs.set_i(Memory::glyph_addr(self.regs.v(x)));
        Ok(())
    }

    /// Store the binary-coded decimal of VX: hundreds at I, tens at I+1,
    /// ones at I+2
    /// FX33
    fn assign_mem_at_i_bcd_of_vx(&mut self, x: u8) -> Result<(), Fault> {
        let value = self.regs.v(x);
        let i = self.regs.i();
        self.write_mem(i, value / 100)?;
        self.write_mem(i.wrapping_add(1), (value / 10) % 10)?;
        self.write_mem(i.wrapping_add(2), value % 10)?;
        Ok(())
    }

    /// Store V0 to VX inclusive from address I on; I advances once per
    /// register written
    /// FX55
    fn assign_mem_at_i_v0_to_vx(&mut self, x: u8) -> Result<(), Fault> {
        for idx in 0..=x {
            self.write_mem(self.regs.i(), self.regs.v(idx))?;
            self.regs.set_i(self.regs.i().wrapping_add(1));
        }
        Ok(())
    }

    /// Fill V0 to VX inclusive from address I on; I advances once per
    /// register read
    /// FX65
    fn assign_v0_to_vx_mem_at_i(&mut self, x: u8) -> Result<(), Fault> {
        for idx in 0..=x {
            let byte = self.read_mem(self.regs.i())?;
            self.regs.set_v(idx, byte);
            self.regs.set_i(self.regs.i().wrapping_add(1));
        }
        Ok(())
    }
}
