/// Latest-value handoff between one producer task and one consumer task
use std::sync::Arc;

use parking_lot::RwLock;

use crate::input::{ManualInput, ManualInputSource};
use crate::output::{AxisOutput, DeviceAxes, OutputDevice};
use crate::telemetry::{MotionSample, TelemetrySource};

/// Create a connected writer/reader pair holding `initial`.
///
/// Consistency is relaxed on purpose: the reader never waits for the writer.
/// If the writer holds the lock at the moment of a read, the reader returns
/// its own copy from the previous read, so a value may be one publish stale.
/// It is never torn, since the value is copied out under the lock.
pub fn snapshot<T: Copy>(initial: T) -> (SnapshotWriter<T>, SnapshotReader<T>) {
    let shared = Arc::new(RwLock::new(initial));
    (
        SnapshotWriter { shared: shared.clone() },
        SnapshotReader { shared, cached: initial, stale_reads: 0 },
    )
}

/// Producer side. Not `Clone`: there is exactly one writer.
pub struct SnapshotWriter<T> {
    shared: Arc<RwLock<T>>,
}

impl<T: Copy> SnapshotWriter<T> {
    pub fn publish(&self, value: T) {
        *self.shared.write() = value;
    }

    /// Modify the current value in place (e.g. merge a partial frame).
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.shared.write();
        f(&mut *value);
    }

    pub fn current(&self) -> T {
        *self.shared.read()
    }
}

/// Consumer side. Not `Clone`: there is exactly one reader.
pub struct SnapshotReader<T> {
    shared: Arc<RwLock<T>>,
    cached: T,
    stale_reads: u64,
}

impl<T: Copy> SnapshotReader<T> {
    /// Most recent value without blocking.
    pub fn latest(&mut self) -> T {
        match self.shared.try_read() {
            Some(value) => self.cached = *value,
            None => self.stale_reads += 1,
        }
        self.cached
    }

    /// Number of reads that fell back to the cached copy.
    pub fn stale_reads(&self) -> u64 {
        self.stale_reads
    }
}

impl TelemetrySource for SnapshotReader<MotionSample> {
    fn latest_sample(&mut self) -> MotionSample {
        self.latest()
    }
}

impl ManualInputSource for SnapshotReader<ManualInput> {
    fn latest_input(&mut self) -> ManualInput {
        self.latest()
    }
}

impl OutputDevice for SnapshotWriter<DeviceAxes> {
    fn write_axes(&mut self, output: &AxisOutput) -> bool {
        if !output.is_hold() {
            self.update(|axes| output.apply_to(axes));
        }
        true
    }
}
