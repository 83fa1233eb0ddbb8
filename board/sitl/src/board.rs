use assist::Resources;
use hal::{snapshot, DeviceAxes, ManualInput, MotionSample, SnapshotReader, SnapshotWriter};

/// Simulator-facing ends of the board's snapshot cells.
pub struct SimEndpoints {
    pub telemetry: SnapshotWriter<MotionSample>,
    pub axes: SnapshotReader<DeviceAxes>,
    pub pilot: SnapshotWriter<ManualInput>,
}

pub struct SitlBoard {
    telemetry: SnapshotReader<MotionSample>,
    input: SnapshotReader<ManualInput>,
    output: SnapshotWriter<DeviceAxes>,
}

impl SitlBoard {
    pub fn new() -> (Self, SimEndpoints) {
        let (telemetry_writer, telemetry_reader) = snapshot(MotionSample::default());
        let (axes_writer, axes_reader) = snapshot(DeviceAxes::default());
        let (pilot_writer, pilot_reader) = snapshot(ManualInput::default());
        (
            SitlBoard {
                telemetry: telemetry_reader,
                input: pilot_reader,
                output: axes_writer,
            },
            SimEndpoints {
                telemetry: telemetry_writer,
                axes: axes_reader,
                pilot: pilot_writer,
            },
        )
    }
}

impl assist::Board for SitlBoard {
    fn name(&self) -> &str {
        "SITL"
    }

    fn split_resources(self) -> Resources {
        Resources {
            telemetry: Box::new(self.telemetry),
            input: Box::new(self.input),
            output: Box::new(self.output),
        }
    }
}
