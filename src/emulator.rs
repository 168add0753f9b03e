use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    config::Architecture,
    decode::OpCodes,
    display::FrameBuffer,
    error::ChipError,
    keyboard::{self, KeySource},
    memory::{Memory, Stack, TypeAddr, FONT_START, GLYPH_SIZE, PROGRAM_START},
    registers::{IndexRegister, ProgramCounter, Registers},
    timer::Timer,
};

/// What the driver does with the program counter after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Move on to the following instruction.
    Next,
    /// The instruction already set the program counter.
    Redirected,
    /// Run the same instruction again on the next slot (FX0A with no key).
    Reissue,
}

pub struct Emulator {
    fb: FrameBuffer,
    pub regs: Registers,
    pub mem: Memory,
    pub stack: Stack,
    pub pc: ProgramCounter,
    pub index: IndexRegister,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    arch: Architecture,
    rng: StdRng,
}

impl Emulator {
    pub fn new(arch: Architecture) -> Self {
        Self::with_rng(arch, StdRng::from_entropy())
    }

    /// Emulator whose CXNN results are reproducible.
    pub fn with_seed(arch: Architecture, seed: u64) -> Self {
        Self::with_rng(arch, StdRng::seed_from_u64(seed))
    }

    fn with_rng(arch: Architecture, rng: StdRng) -> Self {
        Self {
            fb: FrameBuffer::new(),
            regs: Registers::new(),
            mem: Memory::new(),
            stack: Stack::new(),
            pc: ProgramCounter::default(),
            index: IndexRegister::default(),
            delay_timer: Timer::default(),
            sound_timer: Timer::default(),
            arch,
            rng,
        }
    }

    pub fn load_program(&mut self, rom: &[u8]) -> Result<usize, ChipError> {
        let copied = self.mem.load_rom(rom)?;
        debug!("loaded {copied} bytes at {PROGRAM_START:#05x}");
        Ok(copied)
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.fb
    }

    /// True while the program counter points at a full instruction inside
    /// the loaded program.
    pub fn in_program(&self) -> bool {
        let end = PROGRAM_START as usize + self.mem.program_len();
        let pc = self.pc.0 as usize;
        pc >= PROGRAM_START as usize && pc + 1 < end
    }

    pub fn fetch(&self) -> u16 {
        self.mem.word(self.pc.0)
    }

    /// Runs one fetch-decode-execute cycle and applies the advance signal.
    pub fn step(&mut self, keys: &dyn KeySource) -> Result<Advance, ChipError> {
        let (pc, word) = (self.pc.0, self.fetch());
        let op = OpCodes::decode_raw(word, self.arch);
        trace!("{pc:03x}: {word:04x} {op:?}");
        let advance = self.execute_ins(op, keys)?;
        if advance == Advance::Next {
            self.pc.increment();
        }
        Ok(advance)
    }

    pub fn execute_ins(
        &mut self,
        ins: OpCodes,
        keys: &dyn KeySource,
    ) -> Result<Advance, ChipError> {
        match ins {
            OpCodes::ClearScreen => self.fb.clear_buffer(),
            OpCodes::PopSubroutine => {
                let addr = self.stack.pop()?;
                debug!("return to {addr:03x}");
                self.pc.set_addr(addr);
                return Ok(Advance::Redirected);
            }
            OpCodes::Jump(addr) => {
                self.pc.set_addr(addr);
                return Ok(Advance::Redirected);
            }
            OpCodes::PushSubroutine(addr) => {
                // store the instruction after the call to return back
                self.stack.push(self.pc.0.wrapping_add(2))?;
                debug!("call {addr:03x} from {:03x}", self.pc.0);
                self.pc.set_addr(addr);
                return Ok(Advance::Redirected);
            }
            OpCodes::SkipEqualConstant(vx, nn) => self.skip_if(self.regs.get(vx) == nn),
            OpCodes::SkipNotEqualConstant(vx, nn) => self.skip_if(self.regs.get(vx) != nn),
            OpCodes::SkipEqualRegister(vx, vy) => {
                self.skip_if(self.regs.get(vx) == self.regs.get(vy))
            }
            OpCodes::SkipNotEqualRegister(vx, vy) => {
                self.skip_if(self.regs.get(vx) != self.regs.get(vy))
            }
            OpCodes::SetRegister(vx, nn) => self.regs.set_register(vx, nn),
            OpCodes::AddToRegister(vx, nn) => self.regs.add_to_register(vx, nn),
            OpCodes::CopyRegister(vx, vy) => self.regs.set_register(vx, self.regs.get(vy)),
            OpCodes::Or(vx, vy) => self
                .regs
                .set_register(vx, self.regs.get(vx) | self.regs.get(vy)),
            OpCodes::And(vx, vy) => self
                .regs
                .set_register(vx, self.regs.get(vx) & self.regs.get(vy)),
            OpCodes::XOr(vx, vy) => self
                .regs
                .set_register(vx, self.regs.get(vx) ^ self.regs.get(vy)),
            OpCodes::Add(vx, vy) => {
                let (sum, carry) = self.regs.get(vx).overflowing_add(self.regs.get(vy));
                self.regs.set_register(vx, sum);
                self.regs.set_flag(carry);
            }
            OpCodes::SubtractForward(vx, vy) => {
                let (x, y) = (self.regs.get(vx), self.regs.get(vy));
                self.regs.set_register(vx, x.wrapping_sub(y));
                self.regs.set_flag(x >= y); // no borrow
            }
            OpCodes::SubtractBackward(vx, vy) => {
                let (x, y) = (self.regs.get(vx), self.regs.get(vy));
                self.regs.set_register(vx, y.wrapping_sub(x));
                self.regs.set_flag(y >= x); // no borrow
            }
            OpCodes::RightShift(vx, src) => {
                let value = self.regs.get(src);
                self.regs.set_register(vx, value >> 1);
                self.regs.set_flag(value & 1 == 1);
            }
            OpCodes::LeftShift(vx, src) => {
                let value = self.regs.get(src);
                self.regs.set_register(vx, value << 1);
                self.regs.set_flag(value >> 7 == 1);
            }
            OpCodes::SetIndexRegister(addr) => self.index.set_addr(addr),
            OpCodes::JumpWithOffset(addr, reg) => {
                let target = addr.wrapping_add(self.regs.get(reg) as TypeAddr) & 0x0FFF;
                self.pc.set_addr(target);
                return Ok(Advance::Redirected);
            }
            OpCodes::Random(vx, nn) => {
                let ransuu: u8 = self.rng.gen();
                self.regs.set_register(vx, ransuu & nn);
            }
            OpCodes::Display(reg_x, reg_y, height) => {
                let (x, y) = (self.regs.get(reg_x), self.regs.get(reg_y));
                let sprite: Vec<u8> = (0..height as TypeAddr)
                    .map(|row| self.mem.get(self.index.0.wrapping_add(row)))
                    .collect();
                let collision = self.fb.paint(x, y, &sprite);
                self.regs.set_flag(collision);
            }
            OpCodes::SkipIfPressed(vx) => {
                self.skip_if(keyboard::is_held(keys, self.regs.get(vx)))
            }
            OpCodes::SkipIfNotPressed(vx) => {
                self.skip_if(!keyboard::is_held(keys, self.regs.get(vx)))
            }
            OpCodes::CopyDelayToRegister(vx) => {
                self.regs.set_register(vx, self.delay_timer.count)
            }
            OpCodes::GetKey(vx) => match keyboard::poll_pressed(keys) {
                Some(key) => {
                    debug!("key {key:x} captured into v{vx:x}");
                    self.regs.set_register(vx, key);
                }
                None => return Ok(Advance::Reissue),
            },
            OpCodes::CopyRegisterToDelay(vx) => self.delay_timer.set(self.regs.get(vx)),
            OpCodes::CopyRegisterToSound(vx) => self.sound_timer.set(self.regs.get(vx)),
            OpCodes::AddToIndex(vx) => {
                let index = self.index.0.wrapping_add(self.regs.get(vx) as TypeAddr);
                self.index.set_addr(index);
                self.regs.set_flag(index >= 0x1000);
            }
            OpCodes::PointChar(vx) => {
                let glyph = (self.regs.get(vx) & 0xF) as TypeAddr;
                self.index.set_addr(FONT_START + glyph * GLYPH_SIZE);
            }
            OpCodes::ToDecimal(vx) => {
                let value = self.regs.get(vx);
                let digits = [value / 100, (value / 10) % 10, value % 10];
                for (i, digit) in digits.into_iter().enumerate() {
                    self.mem.set(self.index.0.wrapping_add(i as TypeAddr), digit);
                }
            }
            OpCodes::StoreRegisterToMemory(vx, bump_index) => {
                for reg in 0..=vx {
                    let addr = self.index.0.wrapping_add(reg as TypeAddr);
                    self.mem.set(addr, self.regs.get(reg));
                }
                if bump_index {
                    self.index.set_addr(self.index.0.wrapping_add(vx as TypeAddr + 1));
                }
            }
            OpCodes::LoadRegisterFromMemory(vx, bump_index) => {
                for reg in 0..=vx {
                    let addr = self.index.0.wrapping_add(reg as TypeAddr);
                    self.regs.set_register(reg, self.mem.get(addr));
                }
                if bump_index {
                    self.index.set_addr(self.index.0.wrapping_add(vx as TypeAddr + 1));
                }
            }
            OpCodes::Unimplemented(code) => {
                warn!("unknown instruction {code:04x} at {:03x}, skipping", self.pc.0)
            }
        }
        Ok(Advance::Next)
    }

    // the regular advance still follows, so a taken skip moves 4 bytes
    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc.increment();
        }
    }

    pub fn is_sound_active(&self) -> bool {
        self.sound_timer.is_active()
    }

    pub fn sync_timers(&mut self) {
        self.delay_timer.tick();
        self.sound_timer.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::fake::FakeKeys;
    use crate::memory::STACK_DEPTH;
    use minifb::Key;

    fn emu_with(rom: &[u8]) -> Emulator {
        let mut emu = Emulator::with_seed(Architecture::Chip, 7);
        emu.load_program(rom).unwrap();
        emu
    }

    fn run(emu: &mut Emulator, ins: u16) -> Advance {
        let op = OpCodes::decode_raw(ins, emu.arch());
        emu.execute_ins(op, &FakeKeys::default()).unwrap()
    }

    #[test]
    fn add_sets_carry_for_every_pair() {
        let mut emu = emu_with(&[]);
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                emu.regs.set_register(0x1, a);
                emu.regs.set_register(0x2, b);
                run(&mut emu, 0x8124);
                assert_eq!(emu.regs.get(0x1), a.wrapping_add(b));
                assert_eq!(emu.regs.flag(), (a as u16 + b as u16 > 255) as u8);
            }
        }
    }

    #[test]
    fn subtract_sets_no_borrow_for_every_pair() {
        let mut emu = emu_with(&[]);
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                emu.regs.set_register(0x1, a);
                emu.regs.set_register(0x2, b);
                run(&mut emu, 0x8125);
                assert_eq!(emu.regs.get(0x1), a.wrapping_sub(b));
                assert_eq!(emu.regs.flag(), (a >= b) as u8);

                emu.regs.set_register(0x1, a);
                run(&mut emu, 0x8127);
                assert_eq!(emu.regs.get(0x1), b.wrapping_sub(a));
                assert_eq!(emu.regs.flag(), (b >= a) as u8);
            }
        }
    }

    #[test]
    fn flag_register_as_operand_is_overwritten_by_flag() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0xF, 0xFF);
        emu.regs.set_register(0x1, 0x01);
        run(&mut emu, 0x8F14);
        assert_eq!(emu.regs.get(0xF), 1);
    }

    #[test]
    fn shifts_follow_architecture() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x1, 0b0000_0011);
        emu.regs.set_register(0x2, 0b1000_0000);
        run(&mut emu, 0x8126);
        assert_eq!(emu.regs.get(0x1), 0b0000_0001);
        assert_eq!(emu.regs.flag(), 1);
        run(&mut emu, 0x812E);
        assert_eq!(emu.regs.get(0x1), 0b0000_0010);
        assert_eq!(emu.regs.flag(), 0);

        let mut emu = Emulator::with_seed(Architecture::Cosmac, 7);
        emu.regs.set_register(0x1, 0b0000_0011);
        emu.regs.set_register(0x2, 0b1000_0001);
        run(&mut emu, 0x812E);
        assert_eq!(emu.regs.get(0x1), 0b0000_0010);
        assert_eq!(emu.regs.flag(), 1);
        run(&mut emu, 0x8126);
        assert_eq!(emu.regs.get(0x1), 0b0100_0000);
        assert_eq!(emu.regs.flag(), 1);
    }

    #[test]
    fn jump_with_offset_follows_architecture() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x0, 0x10);
        emu.regs.set_register(0x3, 0x04);
        assert_eq!(run(&mut emu, 0xB300), Advance::Redirected);
        assert_eq!(emu.pc.0, 0x304);

        let mut emu = Emulator::with_seed(Architecture::Cosmac, 7);
        emu.regs.set_register(0x0, 0x10);
        emu.regs.set_register(0x3, 0x04);
        run(&mut emu, 0xB300);
        assert_eq!(emu.pc.0, 0x310);
    }

    #[test]
    fn block_store_and_load() {
        let mut emu = emu_with(&[]);
        for r in 0..=3 {
            emu.regs.set_register(r, 0xA0 + r);
        }
        emu.index.set_addr(0x400);
        run(&mut emu, 0xF355);
        assert_eq!(&emu.mem.as_slice()[0x400..0x405], &[0xA0, 0xA1, 0xA2, 0xA3, 0]);
        assert_eq!(emu.index.0, 0x400);

        for r in 0..=3 {
            emu.regs.set_register(r, 0);
        }
        run(&mut emu, 0xF265);
        assert_eq!(&emu.regs.as_slice()[..4], &[0xA0, 0xA1, 0xA2, 0]);
        assert_eq!(emu.index.0, 0x400);
    }

    #[test]
    fn cosmac_block_ops_advance_index() {
        let mut emu = Emulator::with_seed(Architecture::Cosmac, 7);
        emu.index.set_addr(0x400);
        run(&mut emu, 0xF355);
        assert_eq!(emu.index.0, 0x404);
        run(&mut emu, 0xF065);
        assert_eq!(emu.index.0, 0x405);
    }

    #[test]
    fn bcd_writes_three_digits() {
        let mut emu = emu_with(&[]);
        emu.index.set_addr(0x300);
        for (value, digits) in [(254u8, [2, 5, 4]), (7, [0, 0, 7]), (40, [0, 4, 0])] {
            emu.regs.set_register(0x5, value);
            run(&mut emu, 0xF533);
            assert_eq!(&emu.mem.as_slice()[0x300..0x303], &digits);
        }
    }

    #[test]
    fn add_to_index_flags_past_address_space() {
        let mut emu = emu_with(&[]);
        emu.index.set_addr(0xFFE);
        emu.regs.set_register(0x1, 1);
        run(&mut emu, 0xF11E);
        assert_eq!(emu.index.0, 0xFFF);
        assert_eq!(emu.regs.flag(), 0);
        run(&mut emu, 0xF11E);
        assert_eq!(emu.index.0, 0x1000);
        assert_eq!(emu.regs.flag(), 1);
    }

    #[test]
    fn point_char_targets_font_glyph() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x2, 0xA);
        run(&mut emu, 0xF229);
        assert_eq!(emu.index.0, 0x50 + 50);
        assert_eq!(emu.mem.get(emu.index.0), 0xF0);
    }

    #[test]
    fn random_is_masked_by_nn() {
        let mut emu = emu_with(&[]);
        for _ in 0..64 {
            run(&mut emu, 0xC10F);
            assert_eq!(emu.regs.get(0x1) & 0xF0, 0);
        }
        run(&mut emu, 0xC100);
        assert_eq!(emu.regs.get(0x1), 0);
    }

    #[test]
    fn seeded_emulators_agree() {
        let (mut a, mut b) = (emu_with(&[]), emu_with(&[]));
        for _ in 0..16 {
            run(&mut a, 0xC1FF);
            run(&mut b, 0xC1FF);
            assert_eq!(a.regs.get(0x1), b.regs.get(0x1));
        }
    }

    #[test]
    fn timers_are_set_read_and_ticked() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x1, 2);
        run(&mut emu, 0xF115);
        run(&mut emu, 0xF118);
        assert!(emu.is_sound_active());
        emu.sync_timers();
        run(&mut emu, 0xF207);
        assert_eq!(emu.regs.get(0x2), 1);
        emu.sync_timers();
        emu.sync_timers();
        assert_eq!(emu.delay_timer.count, 0);
        assert!(!emu.is_sound_active());
    }

    #[test]
    fn key_skips_use_held_state() {
        let mut emu = emu_with(&[]);
        let keys = FakeKeys {
            down: vec![Key::W],
            ..Default::default()
        };
        emu.regs.set_register(0x1, 0x5);
        let op = OpCodes::decode_raw(0xE19E, emu.arch());
        emu.execute_ins(op, &keys).unwrap();
        assert_eq!(emu.pc.0, 0x202);
        let op = OpCodes::decode_raw(0xE1A1, emu.arch());
        emu.execute_ins(op, &keys).unwrap();
        assert_eq!(emu.pc.0, 0x202);
        emu.regs.set_register(0x1, 0x6);
        emu.execute_ins(op, &keys).unwrap();
        assert_eq!(emu.pc.0, 0x204);
    }

    #[test]
    fn draw_clears_flag_without_collision() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0xF, 1);
        emu.index.set_addr(0x50);
        run(&mut emu, 0xD015);
        assert_eq!(emu.regs.flag(), 0);
        assert_eq!(emu.frame_buffer().lit(), 14);
        run(&mut emu, 0xD015);
        assert_eq!(emu.regs.flag(), 1);
        assert_eq!(emu.frame_buffer().lit(), 0);
    }

    #[test]
    fn clear_then_draw_leaves_only_sprite() {
        let mut emu = emu_with(&[]);
        emu.index.set_addr(0x50);
        run(&mut emu, 0xD01F);
        run(&mut emu, 0x00E0);
        assert_eq!(emu.frame_buffer().lit(), 0);
        emu.regs.set_register(0x0, 60);
        emu.regs.set_register(0x1, 30);
        emu.index.set_addr(0x55);
        run(&mut emu, 0xD011);
        // glyph "1" top row 0x20 is a single pixel at column 2 of the sprite
        assert_eq!(emu.frame_buffer().lit(), 1);
        assert!(emu.frame_buffer().pixel(62, 30));
    }

    #[test]
    fn stack_faults_surface_as_errors() {
        let mut emu = emu_with(&[]);
        let keys = FakeKeys::default();
        assert_eq!(
            emu.execute_ins(OpCodes::PopSubroutine, &keys),
            Err(ChipError::StackUnderflow)
        );
        for _ in 0..STACK_DEPTH {
            emu.execute_ins(OpCodes::PushSubroutine(0x200), &keys).unwrap();
        }
        assert_eq!(
            emu.execute_ins(OpCodes::PushSubroutine(0x200), &keys),
            Err(ChipError::StackOverflow { addr: 0x202 })
        );
        assert_eq!(emu.stack.depth(), STACK_DEPTH);
    }

    // runs `ins` from 0x200 and reports how far the program counter moved
    fn pc_delta(emu: &mut Emulator, ins: u16) -> u16 {
        emu.pc.set_addr(0x200);
        emu.mem.set(0x200, (ins >> 8) as u8);
        emu.mem.set(0x201, ins as u8);
        emu.step(&FakeKeys::default()).unwrap();
        emu.pc.0 - 0x200
    }

    #[test]
    fn skips_move_four_when_taken_and_two_otherwise() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x1, 5);
        emu.regs.set_register(0x2, 5);

        assert_eq!(pc_delta(&mut emu, 0x3105), 4);
        assert_eq!(pc_delta(&mut emu, 0x3106), 2);
        assert_eq!(pc_delta(&mut emu, 0x4105), 2);
        assert_eq!(pc_delta(&mut emu, 0x4106), 4);
        assert_eq!(pc_delta(&mut emu, 0x5120), 4);
        assert_eq!(pc_delta(&mut emu, 0x9120), 2);

        emu.regs.set_register(0x2, 6);
        assert_eq!(pc_delta(&mut emu, 0x5120), 2);
        assert_eq!(pc_delta(&mut emu, 0x9120), 4);
    }

    #[test]
    fn register_skips_with_nonzero_low_nibble_just_advance() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x1, 5);
        emu.regs.set_register(0x2, 5);
        assert_eq!(pc_delta(&mut emu, 0x5121), 2);
        emu.regs.set_register(0x2, 6);
        assert_eq!(pc_delta(&mut emu, 0x9121), 2);
    }

    #[test]
    fn jump_sets_pc_without_advance() {
        let mut emu = emu_with(&[0x1A, 0xBC]);
        assert_eq!(emu.step(&FakeKeys::default()), Ok(Advance::Redirected));
        assert_eq!(emu.pc.0, 0xABC);
    }

    #[test]
    fn add_constant_wraps_and_leaves_flag() {
        let mut emu = emu_with(&[]);
        emu.regs.set_register(0x3, 0xF0);
        emu.regs.set_register(0xF, 0x7);
        run(&mut emu, 0x7320);
        assert_eq!(emu.regs.get(0x3), 0x10);
        assert_eq!(emu.regs.flag(), 0x7);
        run(&mut emu, 0x7301);
        assert_eq!(emu.regs.get(0x3), 0x11);
    }

    #[test]
    fn copy_and_bitwise_ops_leave_flag() {
        let mut emu = emu_with(&[]);
        let reset = |emu: &mut Emulator| {
            emu.regs.set_register(0x1, 0b1100_1010);
            emu.regs.set_register(0x2, 0b1010_0110);
            emu.regs.set_register(0xF, 0x42);
        };

        reset(&mut emu);
        run(&mut emu, 0x8120);
        assert_eq!(emu.regs.get(0x1), 0b1010_0110);
        assert_eq!(emu.regs.get(0x2), 0b1010_0110);
        assert_eq!(emu.regs.flag(), 0x42);

        reset(&mut emu);
        run(&mut emu, 0x8121);
        assert_eq!(emu.regs.get(0x1), 0b1110_1110);
        assert_eq!(emu.regs.flag(), 0x42);

        reset(&mut emu);
        run(&mut emu, 0x8122);
        assert_eq!(emu.regs.get(0x1), 0b1000_0010);
        assert_eq!(emu.regs.flag(), 0x42);

        reset(&mut emu);
        run(&mut emu, 0x8123);
        assert_eq!(emu.regs.get(0x1), 0b0110_1100);
        assert_eq!(emu.regs.get(0x2), 0b1010_0110);
        assert_eq!(emu.regs.flag(), 0x42);
    }

    #[test]
    fn unknown_instruction_advances() {
        let mut emu = emu_with(&[0x81, 0x2F, 0x00, 0x00]);
        let advance = emu.step(&FakeKeys::default()).unwrap();
        assert_eq!(advance, Advance::Next);
        assert_eq!(emu.pc.0, 0x202);
    }

    #[test]
    fn program_range_excludes_trailing_byte() {
        let mut emu = emu_with(&[0x60, 0x01, 0x61]);
        assert!(emu.in_program());
        emu.pc.set_addr(0x202);
        assert!(!emu.in_program());
        emu.pc.set_addr(0x1FE);
        assert!(!emu.in_program());
    }
}
