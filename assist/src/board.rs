use hal::{ManualInputSource, OutputDevice, TelemetrySource};

pub trait Board
where
    Self: Sized,
{
    fn name(&self) -> &str;

    fn split_resources(self) -> Resources;
}

/// I/O endpoints the control loop runs against.
pub struct Resources {
    pub telemetry: Box<dyn TelemetrySource + Send>,
    pub input: Box<dyn ManualInputSource + Send>,
    pub output: Box<dyn OutputDevice + Send>,
}
