use std::sync::Mutex;

use crossbeam_utils::thread;

use crisp8::{nb, Builder, Context, Crisp8, Fault, FrameView, Keypad};

/// A hosted stand-in for a real frontend: frames land in a printable
/// character grid, keys are poked straight into the latch.
struct HostContext {
    grid: Vec<String>,
    keypad: Keypad,
    frames: usize,
}

impl HostContext {
    fn new() -> Self {
        Self {
            grid: vec![".".repeat(64); 32],
            keypad: Keypad::new(),
            frames: 0,
        }
    }

    fn formatted(&self) -> String {
        self.grid.join("\n") + "\n"
    }
}

impl Context for HostContext {
    fn on_frame(&mut self, frame: FrameView<'_>) {
        self.grid = frame
            .iter_rows_as_bitslices()
            .map(|row| row.iter().map(|bit| if *bit { '#' } else { '.' }).collect())
            .collect();
        self.frames += 1;
    }

    fn keys(&mut self) -> &Keypad {
        &self.keypad
    }

    fn gen_random(&mut self) -> u8 {
        rand::random::<u8>()
    }
}

#[test]
fn clear_and_jump_program_loops_forever() {
    let _ = env_logger::builder().is_test(true).try_init();

    let prog = [0x00, 0xE0, 0x12, 0x00];
    let mut chip = Crisp8::load(HostContext::new(), &prog[..]);

    chip.step().unwrap();
    assert_eq!(chip.pc(), 0x202);
    assert_eq!(chip.ctx.frames, 1);

    chip.step().unwrap();
    assert_eq!(chip.pc(), 0x200);

    for _ in 0..10_000 {
        chip.step().unwrap();
    }
    assert!(chip.pc() == 0x200 || chip.pc() == 0x202);
    assert_eq!(chip.ctx.formatted().matches('#').count(), 0);
}

#[test]
fn draws_the_glyph_for_five() {
    let _ = env_logger::builder().is_test(true).try_init();

    // V0 = 5, I = glyph address for 5, draw 5 rows at (V0, V0)
    let prog = [0x60, 0x05, 0xF0, 0x29, 0xD0, 0x05];
    let mut chip = Crisp8::load(HostContext::new(), &prog[..]);
    for _ in 0..3 {
        chip.step().unwrap();
    }

    let glyph_rows = [0xF0u8, 0x80, 0xF0, 0x10, 0xF0];
    for (dy, &row) in glyph_rows.iter().enumerate() {
        for dx in 0..8 {
            let lit = row & (0x80 >> dx) != 0;
            assert_eq!(
                chip.frame().get_bit(5 + dx, 5 + dy),
                Some(&lit),
                "pixel ({}, {})",
                5 + dx,
                5 + dy,
            );
        }
    }
    assert_eq!(chip.ctx.frames, 1);
}

#[test]
fn key_wait_suspends_until_a_key_arrives() {
    // wait for a key into V1, then skip-if-V1-not-pressed
    let prog = [0xF1, 0x0A, 0xE1, 0xA1];
    let mut chip = Crisp8::load(HostContext::new(), &prog[..]);

    chip.step().unwrap();
    assert!(chip.is_awaiting_key());
    for _ in 0..5 {
        assert_eq!(chip.step(), Err(nb::Error::WouldBlock));
        assert_eq!(chip.pc(), 0x200);
    }

    chip.ctx.keypad.set_down(0x7, true);
    chip.step().unwrap();
    assert!(!chip.is_awaiting_key());
    assert_eq!(chip.pc(), 0x202);

    // EXA1 now probes the stored key: 7 is still held, so no skip
    chip.step().unwrap();
    assert_eq!(chip.pc(), 0x204);
}

#[test]
fn strict_machines_report_unknown_words() {
    let prog = [0xFF, 0xFF];
    let mut chip = Builder::new()
        .with_context(HostContext::new())
        .with_program(&prog)
        .strict()
        .build()
        .unwrap();
    match chip.step() {
        Err(nb::Error::Other(Fault::UnknownOpcode { raw })) => assert_eq!(raw, 0xFFFF),
        other => panic!("expected an unknown-opcode fault, got {:?}", other),
    }

    // the default build logs it and keeps going
    let mut chip = Crisp8::load(HostContext::new(), &prog[..]);
    chip.step().unwrap();
    assert_eq!(chip.pc(), 0x202);
}

#[test]
fn decoupled_timers_are_host_paced() {
    // VA = 5, delay := VA, then spin
    let prog = [0x6A, 0x05, 0xFA, 0x15, 0x12, 0x04];
    let mut chip = Builder::new()
        .with_context(HostContext::new())
        .with_program(&prog)
        .decoupled_timers()
        .build()
        .unwrap();
    for _ in 0..10 {
        chip.step().unwrap();
    }
    assert_eq!(chip.delay_timer(), 5);

    chip.tick_timers();
    assert_eq!(chip.delay_timer(), 4);
}

#[test]
fn masked_random_program_runs_clean() {
    // V5 = random & 0x0F, forever
    let prog = [0xC5, 0x0F, 0x12, 0x00];
    let mut chip = Crisp8::load(HostContext::new(), &prog[..]);
    for _ in 0..100 {
        chip.step().unwrap();
    }
    assert!(chip.pc() == 0x200 || chip.pc() == 0x202);
}

#[test]
fn key_wait_resolves_across_threads() {
    let _ = env_logger::builder().is_test(true).try_init();

    let prog = [0xF0, 0x0A];
    let chip = Mutex::new(
        Builder::new()
            .with_context(HostContext::new())
            .with_program(&prog)
            .decoupled_timers()
            .build()
            .unwrap(),
    );

    thread::scope(|s| {
        s.spawn(|_| loop {
            let resolved = {
                let mut chip = chip.lock().unwrap();
                chip.step().is_ok() && !chip.is_awaiting_key()
            };
            if resolved {
                break;
            }
            std::thread::yield_now();
        });
        s.spawn(|_| {
            chip.lock().unwrap().ctx.keypad.set_down(0xA, true);
        });
    })
    .unwrap();

    let chip = chip.lock().unwrap();
    assert_eq!(chip.pc(), 0x202);
    assert!(!chip.is_awaiting_key());
}
