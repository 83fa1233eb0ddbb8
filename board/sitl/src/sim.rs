use std::{
    f32::consts::PI,
    sync::mpsc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use hal::{DeviceAxes, MotionSample, SnapshotReader, SnapshotWriter, TelemetryFrame, Vector3d};
use rand::{rngs::StdRng, Rng, SeedableRng};

const GRAVITY: f32 = 9.81;

// Angular response per unit of stick, rad/s²
const CYCLIC_AUTHORITY: f32 = 4.0;
const PEDAL_AUTHORITY: f32 = 3.0;
const ANGULAR_DAMPING: f32 = 2.0;
const YAW_DAMPING: f32 = 1.5;
// Pedal needed to cancel main rotor torque
const TORQUE_BIAS: f32 = 0.08;
const DRAG: f32 = 0.15;
const GUST_AMPLITUDE: f32 = 0.3;

/// Minimal helicopter model: stick drives angular acceleration, tilt drives
/// horizontal acceleration, heading-relative.
#[derive(Debug, Clone)]
pub struct SimHelicopter {
    state: MotionSample,
    rng: StdRng,
    frame_count: u64,
}

impl SimHelicopter {
    pub fn new(seed: u64) -> Self {
        let mut state = MotionSample::default();
        state.position = Vector3d::new(0.0, 50.0, 0.0);
        Self {
            state,
            rng: StdRng::seed_from_u64(seed),
            frame_count: 0,
        }
    }

    pub fn state(&self) -> &MotionSample {
        &self.state
    }

    pub fn step(&mut self, axes: &DeviceAxes, dt: f32) {
        let s = &mut self.state;

        let roll_acc = CYCLIC_AUTHORITY * axes.cyclic_x - ANGULAR_DAMPING * s.rates.roll;
        let pitch_acc = -CYCLIC_AUTHORITY * axes.cyclic_y - ANGULAR_DAMPING * s.rates.pitch;
        let yaw_acc = PEDAL_AUTHORITY * (axes.yaw - TORQUE_BIAS) - YAW_DAMPING * s.rates.yaw;

        s.rates.roll += roll_acc * dt;
        s.rates.pitch += pitch_acc * dt;
        s.rates.yaw += yaw_acc * dt;

        s.attitude.roll = (s.attitude.roll + s.rates.roll * dt).clamp(-0.8, 0.8);
        s.attitude.pitch = (s.attitude.pitch + s.rates.pitch * dt).clamp(-0.8, 0.8);
        s.attitude.yaw = wrap(s.attitude.yaw + s.rates.yaw * dt);

        let gust_forward = self.rng.gen_range(-GUST_AMPLITUDE..GUST_AMPLITUDE);
        let gust_right = self.rng.gen_range(-GUST_AMPLITUDE..GUST_AMPLITUDE);

        let (forward_v, right_v) = to_body(&s.velocity, s.attitude.yaw);
        let forward_acc = -GRAVITY * s.attitude.pitch.sin() - DRAG * forward_v + gust_forward;
        let right_acc = GRAVITY * s.attitude.roll.sin() - DRAG * right_v + gust_right;

        let (sy, cy) = s.attitude.yaw.sin_cos();
        s.acceleration = Vector3d::new(cy * forward_acc - sy * right_acc, 0.0, sy * forward_acc + cy * right_acc);
        s.velocity += s.acceleration * dt;
        s.position += s.velocity * dt;
        self.frame_count += 1;
    }

    /// Telemetry frame as an exporter would send it. Position is only
    /// refreshed every fifth frame.
    pub fn frame(&self) -> TelemetryFrame {
        let mut frame = TelemetryFrame::from_sample(&self.state);
        if self.frame_count % 5 != 0 {
            frame.x = None;
            frame.y = None;
            frame.z = None;
        }
        frame
    }
}

fn to_body(world: &Vector3d, yaw: f32) -> (f32, f32) {
    let (sy, cy) = yaw.sin_cos();
    (cy * world.x + sy * world.z, -sy * world.x + cy * world.z)
}

fn wrap(angle: f32) -> f32 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

pub enum SimCommand {
    Stop,
}

pub struct SimWorker;

impl SimWorker {
    pub fn run(
        mut heli: SimHelicopter,
        telemetry: SnapshotWriter<MotionSample>,
        mut axes: SnapshotReader<DeviceAxes>,
        to_worker_rx: mpsc::Receiver<SimCommand>,
    ) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let minimum_elapsed_duration = Duration::from_millis(1000 / 200); // 200 Hz
            let mut last_loop_time = Instant::now();
            loop {
                match to_worker_rx.try_recv() {
                    Ok(SimCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => {
                        log::debug!("Simulation stopped after {} frames", heli.frame_count);
                        return;
                    }
                    Err(mpsc::TryRecvError::Empty) => {}
                }
                let now = Instant::now();
                let dt = now.duration_since(last_loop_time);
                if dt < minimum_elapsed_duration {
                    std::thread::sleep(minimum_elapsed_duration - dt);
                    continue;
                }
                last_loop_time = now;

                // Controls reach the airframe through the joystick's integer range
                let controls = DeviceAxes::from_device(axes.latest().to_device());
                heli.step(&controls, dt.as_secs_f32());
                let frame = heli.frame();
                telemetry.update(|sample| sample.merge(&frame));
            }
        })
    }
}

/// Owns the simulation thread.
pub struct Simulation {
    to_worker_tx: Option<mpsc::Sender<SimCommand>>,
    worker_thread: Option<JoinHandle<()>>,
}

impl Simulation {
    pub fn start(
        heli: SimHelicopter,
        telemetry: SnapshotWriter<MotionSample>,
        axes: SnapshotReader<DeviceAxes>,
    ) -> Self {
        let (to_worker_tx, to_worker_rx) = mpsc::channel();
        let worker_thread = SimWorker::run(heli, telemetry, axes, to_worker_rx);
        Self {
            to_worker_tx: Some(to_worker_tx),
            worker_thread: Some(worker_thread),
        }
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.to_worker_tx.take() {
            let _ = tx.send(SimCommand::Stop);
        }
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                log::error!("Simulation thread panicked");
            }
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
    }
}
