use std::time::{Duration, Instant};

use assist::{Assist, Resources};
use crossbeam::channel::{Receiver, TryRecvError};
use hal::{ManualInputSource, ModeCommand, OutputDevice, TelemetrySource};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoopStats {
    pub ticks: u64,
    pub overruns: u64,
    pub max_tick: Duration,
}

/// Fixed-period control loop. Runs until `duration` elapses or the command
/// channel disconnects.
///
/// Commands are drained at the top of each period, never during a tick.
pub fn run(
    assist: &mut Assist,
    resources: &mut Resources,
    commands: &Receiver<ModeCommand>,
    duration: Duration,
) -> LoopStats {
    let period = Duration::from_millis(u64::from(assist.config().period_ms));
    let mut stats = LoopStats::default();
    let started = Instant::now();
    let mut last_tick = started;
    let mut next_deadline = started + period;
    let mut last_status = started;

    if !resources.output.neutral_all() {
        log::warn!("Output device rejected the initial neutral write");
    }

    while started.elapsed() < duration {
        loop {
            match commands.try_recv() {
                Ok(command) => assist.apply_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::info!("Command channel closed, stopping control loop");
                    return stats;
                }
            }
        }

        let now = Instant::now();
        let dt = if stats.ticks == 0 {
            period.as_secs_f32()
        } else {
            now.duration_since(last_tick).as_secs_f32()
        };
        last_tick = now;

        let sample = resources.telemetry.latest_sample();
        let input = resources.input.latest_input();
        let output = assist.tick(&sample, input, dt);
        if !output.is_hold() && !resources.output.write_axes(&output) {
            log::warn!("Output device rejected write {:?}", output);
        }
        stats.ticks += 1;

        let busy = now.elapsed();
        stats.max_tick = stats.max_tick.max(busy);

        if now.duration_since(last_status) >= Duration::from_secs(1) {
            last_status = now;
            log::info!("{}", assist.status());
        }

        let after = Instant::now();
        if after > next_deadline {
            stats.overruns += 1;
            log::warn!("Control tick overran by {:?}", after - next_deadline);
            next_deadline = after + period;
        } else {
            std::thread::sleep(next_deadline - after);
            next_deadline += period;
        }
    }
    stats
}
