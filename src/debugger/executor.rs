use std::collections::HashSet;

use super::commands::{BreakpointAction, Command, CommandError, SetTarget};
use crate::emu::{Chip8Error, Chip8Runner, Chip8RunnerResult, Display, MEMORY_SIZE, Opcode};

pub enum CommandResult {
    Ok,
    Breakpoints(Vec<u16>),
    MemDump { data: Vec<u8>, offset: u16 },
    Disasm { instructions: Vec<(u16, Opcode)>, offset: u16 },
    Quit,
}

/// Executes debugger commands against a paused or running machine.
pub struct Executor {
    is_running: bool,
    runner: Chip8Runner,
    breakpoints: HashSet<u16>,
}

impl Executor {
    pub fn new(runner: Chip8Runner) -> Self {
        Self {
            is_running: false,
            runner,
            breakpoints: HashSet::new(),
        }
    }

    /// Advances the machine when in running mode. Faults and breakpoints both
    /// drop back to paused mode so the user can inspect state.
    pub fn poll(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        if !self.is_running {
            return Ok(Chip8RunnerResult::Ok);
        }

        let result = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(result, Err(_) | Ok(Chip8RunnerResult::HitBreakpoint)) {
            self.is_running = false;
        }

        result
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.run();
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.pause();
                Ok(CommandResult::Ok)
            }
            Command::Step => self.step(),
            Command::Breakpoint { action } => self.handle_breakpoint(action),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => Ok(self.handle_mem(start, len)),
            Command::Disasm { start, len } => Ok(self.handle_disasm(start, len)),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn run(&mut self) {
        self.is_running = true;
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    pub fn step(&mut self) -> Result<CommandResult, CommandError> {
        self.runner.chip8_mut().step()?;
        Ok(CommandResult::Ok)
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn get_display(&self) -> &Display<bool> {
        self.runner.chip8_ref().display()
    }

    pub fn get_pc(&self) -> u16 {
        self.runner.chip8_ref().pc
    }

    pub fn get_i(&self) -> u16 {
        self.runner.chip8_ref().i
    }

    pub fn get_v(&self) -> &[u8; 16] {
        &self.runner.chip8_ref().v
    }

    pub fn get_stack(&self) -> &[u16] {
        self.runner.chip8_ref().stack.entries()
    }

    pub fn get_delay_timer(&self) -> u8 {
        self.runner.chip8_ref().delay_timer
    }

    pub fn get_sound_timer(&self) -> u8 {
        self.runner.chip8_ref().sound_timer
    }

    pub fn get_keypad(&self) -> &[bool; 16] {
        &self.runner.chip8_ref().keypad
    }

    pub fn runner_mut(&mut self) -> &mut Chip8Runner {
        &mut self.runner
    }

    fn handle_breakpoint(
        &mut self,
        action: BreakpointAction,
    ) -> Result<CommandResult, CommandError> {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut breakpoints: Vec<u16> = self.breakpoints.iter().copied().collect();
                breakpoints.sort();
                return Ok(CommandResult::Breakpoints(breakpoints));
            }
        };

        Ok(CommandResult::Ok)
    }

    fn handle_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        let chip8 = self.runner.chip8_mut();

        match target {
            SetTarget::V(reg) => {
                let value = u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange)?;
                chip8.v[reg] = value;
            }
            SetTarget::I => {
                if value >= MEMORY_SIZE as u16 {
                    return Err(CommandError::ValueOutOfRange);
                }
                chip8.i = value;
            }
            SetTarget::Pc => {
                if value >= MEMORY_SIZE as u16 {
                    return Err(CommandError::ValueOutOfRange);
                }
                chip8.pc = value;
            }
        }

        Ok(CommandResult::Ok)
    }

    fn handle_mem(&self, start: u16, len: u16) -> CommandResult {
        let memory = &self.runner.chip8_ref().memory;
        let start = (start as usize).min(MEMORY_SIZE);
        let end = start.saturating_add(len as usize).min(MEMORY_SIZE);

        CommandResult::MemDump {
            data: memory[start..end].to_vec(),
            offset: start as u16,
        }
    }

    fn handle_disasm(&self, start: u16, len: u16) -> CommandResult {
        let memory = &self.runner.chip8_ref().memory;

        let instructions = (0..len as usize)
            .map_while(|idx| {
                let addr = (start as usize).checked_add(idx * 2)?;
                let bytes = memory.get(addr..addr + 2)?;
                let word = u16::from_be_bytes([bytes[0], bytes[1]]);
                Some((word, Opcode::decode(word)))
            })
            .collect();

        CommandResult::Disasm {
            instructions,
            offset: start,
        }
    }
}
