use rand::{SeedableRng, rngs::StdRng};

use super::{
    CYCLES_PER_TIMER_TICK, CallStack, Chip8Error, Chip8Signal, DISPLAY_X, DISPLAY_Y, Display, FONT,
    FONT_END_ADDRESS, FONT_START_ADDRESS, Opcode,
};
use crate::u4;

pub(crate) const ROM_START_ADDRESS: usize = 0x200;
pub(crate) const MEMORY_SIZE: usize = 4096;

/// CHIP-8 virtual machine state.
///
/// The machine is fully synchronous: `step()` applies exactly one
/// instruction's effects (including the timer cadence) before returning.
/// Drivers own all timing and I/O; they read the display and sound flag and
/// write key state between steps.
#[derive(Debug)]
pub struct Chip8 {
    /// 4KB memory array, font at the bottom, ROM from 0x200
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Display<bool>,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Bounded call stack for subroutine returns
    pub(crate) stack: CallStack,

    /// Delay timer: counts down to 0 on the cycle cadence
    pub(crate) delay_timer: u8,
    /// Sound timer: counts down on the cycle cadence, beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Register that receives the key delivered after an Fx0A suspension
    pub(crate) wait_key_target: Option<u4>,
    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],

    /// Total `step()` calls, drives the timer cadence
    pub(crate) cycle_count: u64,
    /// Owned random source for Cxnn, seedable for deterministic tests
    pub(crate) rng: StdRng,
}

impl Chip8 {
    /// Builds a machine with `rom` loaded at 0x200 and the font at the bottom
    /// of memory. Fails if the ROM does not fit.
    pub fn new(rom: &[u8]) -> Result<Self, Chip8Error> {
        Self::with_rng(rom, StdRng::from_os_rng())
    }

    /// Like [`Chip8::new`], but with a deterministic random source.
    pub fn with_seed(rom: &[u8], seed: u64) -> Result<Self, Chip8Error> {
        Self::with_rng(rom, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rom: &[u8], rng: StdRng) -> Result<Self, Chip8Error> {
        let mut memory = [0; MEMORY_SIZE];
        memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);

        let rom_end = ROM_START_ADDRESS + rom.len();
        memory
            .get_mut(ROM_START_ADDRESS..rom_end)
            .ok_or(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MEMORY_SIZE - ROM_START_ADDRESS,
            })?
            .copy_from_slice(rom);

        Ok(Chip8 {
            memory,
            display: [[false; DISPLAY_X]; DISPLAY_Y],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: CallStack::new(),
            delay_timer: 0,
            sound_timer: 0,
            wait_key_target: None,
            keypad: [false; 16],
            cycle_count: 0,
            rng,
        })
    }

    /// Executes a single instruction (fetch, timer cadence, decode, execute).
    ///
    /// Faults of the emulated program come back as `Err`; they are terminal
    /// for the program but deterministic, never a panic.
    pub fn step(&mut self) -> Result<Chip8Signal, Chip8Error> {
        let word = self.fetch()?;

        self.cycle_count += 1;
        if self.cycle_count % CYCLES_PER_TIMER_TICK == 0 {
            self.timers_tick();
        }

        self.execute(Opcode::decode(word))
    }

    /// Delivers the key that resolves an Fx0A suspension.
    ///
    /// Only meaningful right after `step()` returned [`Chip8Signal::AwaitKey`];
    /// a call with no pending wait does nothing.
    pub fn key_pressed(&mut self, key: u4) {
        if let Some(reg) = self.wait_key_target.take() {
            self.v[reg] = key.into();
        }
    }

    /// True while the machine is suspended on Fx0A.
    pub fn is_waiting_for_key(&self) -> bool {
        self.wait_key_target.is_some()
    }

    /// Returns true if the sound timer is non-zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    /// Read-only view of the display buffer.
    pub fn display(&self) -> &Display<bool> {
        &self.display
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.display[y][x]
    }

    fn timers_tick(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Fetches the 16-bit instruction word at the program counter, big-endian.
    fn fetch(&self) -> Result<u16, Chip8Error> {
        let high = self.mem_read(self.pc)?;
        let low = self.mem_read(self.pc.wrapping_add(1))?;

        Ok(u16::from_be_bytes([high, low]))
    }

    /// Bounds-checked single byte read.
    pub(crate) fn mem_read(&self, addr: u16) -> Result<u8, Chip8Error> {
        self.memory
            .get(addr as usize)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    /// Validates that `len` bytes starting at `addr` lie inside memory and
    /// returns the range start as an index.
    ///
    /// The whole range is checked before the caller touches any of it, so a
    /// faulting memory-indexed opcode leaves memory unmodified.
    pub(crate) fn mem_range(&self, addr: u16, len: usize) -> Result<usize, Chip8Error> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= MEMORY_SIZE => Ok(start),
            _ => Err(Chip8Error::MemoryOutOfBounds {
                address: addr.wrapping_add(len as u16).wrapping_sub(1),
            }),
        }
    }

    /// Builds a machine from instruction words, with a fixed seed.
    #[cfg(test)]
    pub(crate) fn from_words(words: &[u16]) -> Chip8 {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        Chip8::with_seed(&bytes, 0).unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn construction_loads_font_and_rom() {
        let chip8 = Chip8::with_seed(&[0xAB, 0xCD], 0).unwrap();

        assert_eq!(chip8.memory[FONT_START_ADDRESS..FONT_END_ADDRESS], FONT);
        assert_eq!(chip8.memory[ROM_START_ADDRESS], 0xAB);
        assert_eq!(chip8.memory[ROM_START_ADDRESS + 1], 0xCD);
        assert_eq!(chip8.pc, ROM_START_ADDRESS as u16);

        // Memory between the font and the ROM is zero
        assert!(chip8.memory[FONT_END_ADDRESS..ROM_START_ADDRESS].iter().all(|&b| b == 0));
    }

    #[test]
    fn construction_rejects_oversized_rom() {
        let rom = vec![0; MEMORY_SIZE - ROM_START_ADDRESS + 1];

        assert_eq!(
            Chip8::with_seed(&rom, 0).unwrap_err(),
            Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MEMORY_SIZE - ROM_START_ADDRESS,
            }
        );

        // The largest ROM that exactly fills memory is accepted
        let rom = vec![0; MEMORY_SIZE - ROM_START_ADDRESS];
        assert!(Chip8::with_seed(&rom, 0).is_ok());
    }

    #[test]
    fn load_immediate_end_to_end() {
        // 0x600A - load 0x0A into V0
        let mut chip8 = Chip8::from_words(&[0x600A]);

        let signal = chip8.step().unwrap();
        assert!(matches!(signal, Chip8Signal::Continue));
        assert_eq!(chip8.v[0], 0x0A);
        assert_eq!(chip8.pc, 0x202);
    }

    #[test]
    fn call_then_return_end_to_end() {
        // 0x200: call 0x204; 0x202: padding; 0x204: return
        let mut chip8 = Chip8::from_words(&[0x2204, 0x0000, 0x00EE]);

        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x204);
        assert_eq!(chip8.stack.entries(), &[0x200]);

        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x202);
        assert!(chip8.stack.is_empty());
    }

    #[test]
    fn fetch_past_end_of_memory_faults() {
        let mut chip8 = Chip8::from_words(&[]);
        chip8.pc = (MEMORY_SIZE - 2) as u16;

        // The last two bytes still fetch (0x0000 decodes to a machine code call)
        chip8.step().unwrap();
        assert_eq!(chip8.pc, MEMORY_SIZE as u16);

        // One step past the end always faults, deterministically
        assert_eq!(
            chip8.step().unwrap_err(),
            Chip8Error::MemoryOutOfBounds { address: MEMORY_SIZE as u16 }
        );
        assert_eq!(
            chip8.step().unwrap_err(),
            Chip8Error::MemoryOutOfBounds { address: MEMORY_SIZE as u16 }
        );
    }

    #[test]
    fn timers_tick_every_ninth_cycle() {
        // V0 = 3, delay timer = V0, then spin on a jump-to-self
        let mut chip8 = Chip8::from_words(&[0x6003, 0xF015, 0x1204]);

        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.delay_timer, 3);

        // Cycles 3..=8 leave the timer alone, cycle 9 decrements it
        for _ in 2..8 {
            chip8.step().unwrap();
            assert_eq!(chip8.delay_timer, 3);
        }
        chip8.step().unwrap();
        assert_eq!(chip8.delay_timer, 2);

        // Two more full periods reach zero, further periods stay at zero
        for _ in 0..CYCLES_PER_TIMER_TICK * 2 {
            chip8.step().unwrap();
        }
        assert_eq!(chip8.delay_timer, 0);
        for _ in 0..CYCLES_PER_TIMER_TICK {
            chip8.step().unwrap();
        }
        assert_eq!(chip8.delay_timer, 0);
    }

    #[test]
    fn sound_timer_drives_beep_flag() {
        let mut chip8 = Chip8::from_words(&[0x6001, 0xF018, 0x1204]);

        assert!(!chip8.should_beep());
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert!(chip8.should_beep());

        // Expires on the first cadence tick (cycle 9)
        for _ in 2..CYCLES_PER_TIMER_TICK {
            chip8.step().unwrap();
        }
        assert!(!chip8.should_beep());
    }
}
