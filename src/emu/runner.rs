use std::collections::HashSet;

use super::{CLOCK_HZ, Chip8, Chip8Error, Chip8Signal};
use crate::u4;

const CPU_TIME_STEP: f32 = 1.0 / CLOCK_HZ as f32;

#[derive(Debug)]
pub enum Chip8RunnerResult {
    Ok,
    HitBreakpoint,
}

/// High-level emulator runner that manages timing.
///
/// The machine defines its timer cadence in instruction cycles; this layer
/// converts wall-clock delta time into `step()` calls at the fixed clock rate
/// and implements the driver side of the signal protocol: stop stepping for
/// the current frame on redraw, and suspend entirely while a key is awaited.
pub struct Chip8Runner {
    chip8: Chip8,
    dt_accumulator: f32,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8) -> Self {
        Self {
            chip8,
            dt_accumulator: 0.0,
        }
    }

    /// Advance the emulator by delta time.
    ///
    /// Runs as many CPU steps as the elapsed time `dt` covers. Returns early
    /// when a frame has to be rendered before the next step, or when the
    /// machine suspends waiting for a key (stepping stays paused until
    /// [`Chip8Runner::set_key`] delivers one).
    pub fn update(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but checks for breakpoints after each CPU step.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<Chip8RunnerResult, Chip8Error> {
        if self.chip8.is_waiting_for_key() {
            // Suspended on the key-wait protocol; the driver owns the clock
            return Ok(Chip8RunnerResult::Ok);
        }

        self.dt_accumulator += dt;

        while self.dt_accumulator >= CPU_TIME_STEP {
            self.dt_accumulator -= CPU_TIME_STEP;

            let signal = self.chip8.step()?;

            if let Some(breakpoints) = &breakpoints
                && breakpoints.contains(&self.chip8.pc)
            {
                self.dt_accumulator = 0.0;
                return Ok(Chip8RunnerResult::HitBreakpoint);
            }

            match signal {
                Chip8Signal::Redraw => {
                    // Stop executing until the frame is presented. We clear the
                    // accumulator to avoid "catching up" in the next frame.
                    self.dt_accumulator = 0.0;
                    break;
                }
                Chip8Signal::AwaitKey => {
                    self.dt_accumulator = 0.0;
                    break;
                }
                Chip8Signal::Continue => {}
            }
        }

        Ok(Chip8RunnerResult::Ok)
    }

    /// Set the state of a key on the keypad.
    ///
    /// A press also resolves a pending key wait, resuming execution on the
    /// next `update`.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed);

        if pressed && self.chip8.is_waiting_for_key() {
            self.chip8.key_pressed(key);
        }
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.chip8.get_display_pixel(y, x)
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn update_paces_steps_by_delta_time() {
        // Jump-to-self never redraws, so only dt limits stepping
        let mut runner = Chip8Runner::new(Chip8::from_words(&[0x1200]));

        runner.update(10.5 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 10);

        // Too little time for another step
        runner.update(0.4 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 10);

        // The fraction carries over
        runner.update(0.2 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 11);
    }

    #[test]
    fn redraw_stops_the_frame() {
        let mut runner = Chip8Runner::new(Chip8::from_words(&[0x00E0, 0x1202]));

        runner.update(5.0 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 1);

        // The next frame's budget starts fresh
        runner.update(2.5 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 3);
    }

    #[test]
    fn key_wait_suspends_until_key_press() {
        let mut runner = Chip8Runner::new(Chip8::from_words(&[0xF30A, 0x6942]));

        runner.update(2.5 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 1);

        // Suspended: time passes, nothing runs
        runner.update(100.0 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().cycle_count, 1);

        // Releases resolve nothing
        runner.set_key(u4::new(0xB), false);
        assert!(runner.chip8_ref().is_waiting_for_key());

        runner.set_key(u4::new(0xB), true);
        assert_eq!(runner.chip8_ref().v[3], 0xB);

        runner.update(1.5 * CPU_TIME_STEP).unwrap();
        assert_eq!(runner.chip8_ref().v[9], 0x42);
    }

    #[test]
    fn breakpoints_pause_execution() {
        let mut runner = Chip8Runner::new(Chip8::from_words(&[0x6001, 0x6102, 0x6203]));
        let breakpoints = HashSet::from([0x204u16]);

        let result = runner
            .update_with_breakpoints(10.0 * CPU_TIME_STEP, Some(&breakpoints))
            .unwrap();
        assert!(matches!(result, Chip8RunnerResult::HitBreakpoint));
        assert_eq!(runner.chip8_ref().pc, 0x204);
        assert_eq!(runner.chip8_ref().cycle_count, 2);
    }

    #[test]
    fn faults_surface_from_update() {
        let mut runner = Chip8Runner::new(Chip8::from_words(&[0x00EE]));

        assert_eq!(
            runner.update(CPU_TIME_STEP).unwrap_err(),
            Chip8Error::StackUnderflow
        );
    }
}
