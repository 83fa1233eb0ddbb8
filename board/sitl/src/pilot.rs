use std::{
    sync::mpsc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use assist::{RcInput, RcMapper};
use crossbeam::channel::Sender;
use hal::{ManualInput, ModeCommand, SnapshotWriter};

/// Timed stick positions and mode presses, replayed from the start of the run.
pub struct PilotScript {
    mapper: RcMapper,
    commands: Vec<(f32, ModeCommand)>,
    next_command: usize,
}

impl Default for PilotScript {
    fn default() -> Self {
        Self::new()
    }
}

impl PilotScript {
    pub fn new() -> Self {
        Self {
            mapper: RcMapper::new(),
            commands: vec![
                (1.0, ModeCommand::ToggleYawHold),
                (1.0, ModeCommand::ToggleCyclic),
                (8.0, ModeCommand::ToggleCyclic),
                (16.0, ModeCommand::Freeze),
                (16.5, ModeCommand::Unfreeze),
                (19.0, ModeCommand::ToggleCyclic),
            ],
            next_command: 0,
        }
    }

    /// Raw gamepad channels at `t` seconds into the run.
    pub fn rc_at(&self, t: f32) -> RcInput {
        let mut rc = RcInput::default();
        match t {
            t if (2.0..5.0).contains(&t) => rc.channels[self.mapper.cyclic_y_channel] = stick(0.4),
            t if (12.0..14.0).contains(&t) => rc.channels[self.mapper.yaw_channel] = stick(0.3),
            t if (14.0..15.0).contains(&t) => rc.channels[self.mapper.cyclic_x_channel] = stick(-0.2),
            _ => {}
        }
        rc
    }

    /// Stick positions at `t` seconds into the run.
    pub fn input_at(&self, t: f32) -> ManualInput {
        self.mapper.map(self.rc_at(t))
    }

    /// Commands due by `t` that have not been returned yet.
    pub fn due_commands(&mut self, t: f32) -> &[(f32, ModeCommand)] {
        let start = self.next_command;
        while self.next_command < self.commands.len() && self.commands[self.next_command].0 <= t {
            self.next_command += 1;
        }
        &self.commands[start..self.next_command]
    }
}

fn stick(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

pub enum PilotCommand {
    Stop,
}

/// Replays a [`PilotScript`] at 100 Hz.
pub struct Pilot {
    to_worker_tx: Option<mpsc::Sender<PilotCommand>>,
    worker_thread: Option<JoinHandle<()>>,
}

impl Pilot {
    pub fn start(mut script: PilotScript, input: SnapshotWriter<ManualInput>, commands: Sender<ModeCommand>) -> Self {
        let (to_worker_tx, to_worker_rx) = mpsc::channel();
        let worker_thread = std::thread::spawn(move || {
            let period = Duration::from_millis(1000 / 100); // 100 Hz
            let started = Instant::now();
            loop {
                match to_worker_rx.try_recv() {
                    Ok(PilotCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => return,
                    Err(mpsc::TryRecvError::Empty) => {}
                }
                let t = started.elapsed().as_secs_f32();
                input.publish(script.input_at(t));
                for (_, command) in script.due_commands(t) {
                    log::debug!("Pilot: {:?} at {:.2}s", command, t);
                    if commands.send(*command).is_err() {
                        return;
                    }
                }
                std::thread::sleep(period);
            }
        });
        Self {
            to_worker_tx: Some(to_worker_tx),
            worker_thread: Some(worker_thread),
        }
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.to_worker_tx.take() {
            let _ = tx.send(PilotCommand::Stop);
        }
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                log::error!("Pilot thread panicked");
            }
        }
    }
}

impl Drop for Pilot {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_fire_once() {
        let mut script = PilotScript::new();
        assert!(script.due_commands(0.5).is_empty());
        assert_eq!(script.due_commands(1.2).len(), 2);
        assert!(script.due_commands(1.5).is_empty(), "Commands should not repeat");
        assert_eq!(script.due_commands(100.0).len(), 4);
    }

    #[test]
    fn test_input_schedule() {
        let script = PilotScript::new();
        assert_eq!(script.input_at(0.0), ManualInput::default());
        assert!((script.input_at(3.0).cyclic_y - 0.4).abs() < 1e-4);
        assert!((script.input_at(13.0).yaw - 0.3).abs() < 1e-4);
        assert!((script.input_at(14.5).cyclic_x + 0.2).abs() < 1e-4);
        assert_eq!(script.rc_at(3.0).channels[1], stick(0.4), "Forward stick lands on the cyclic Y channel");
    }
}
