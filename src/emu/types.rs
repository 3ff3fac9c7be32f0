/// Signal returned by a successful `step()`, telling the driver what to do next.
#[derive(Debug)]
pub enum Chip8Signal {
    /// Nothing to do, keep stepping.
    Continue,
    /// The display buffer changed and should be presented.
    Redraw,
    /// The machine recorded a wait-for-key target register. The driver must
    /// deliver exactly one key index via `Chip8::key_pressed` before stepping on.
    AwaitKey,
}

/// Fault conditions reported by the machine.
///
/// `RomTooLarge` is a construction-time caller error. Every other variant is a
/// run-time fault of the emulated program: `step()` reports it as a value and
/// the machine never panics on program misbehavior. Faults are deterministic,
/// so rerunning the same ROM reproduces the same fault at the same cycle.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: u16 },

    #[error("Call stack overflow: subroutine nesting deeper than {depth}", depth = super::STACK_DEPTH)]
    StackOverflow,

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Unknown opcode: {opcode:#06X}")]
    UnknownOpcode { opcode: u16 },

    #[error("Key index {key:#04X} out of range (register V{reg:X})")]
    InvalidKey { key: u8, reg: u8 },

    #[error("No font glyph for value {value:#04X}")]
    InvalidFontDigit { value: u8 },
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;

/// A type alias for the display buffer representation.
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];

/// Instruction clock rate. The original hardware-ish cadence the runner paces at.
pub const CLOCK_HZ: u32 = 540;
/// Timer tick rate. Both countdown timers decay at 60 Hz worth of cycles.
pub const TIMER_HZ: u32 = 60;
/// The delay and sound timers decrement once every this many `step()` calls.
pub const CYCLES_PER_TIMER_TICK: u64 = (CLOCK_HZ / TIMER_HZ) as u64;
