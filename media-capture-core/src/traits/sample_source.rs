use crate::channel::sample_channel::{ChannelOptions, SampleChannel};
use crate::models::error::CaptureError;
use crate::models::session::OutputKind;

/// Anything that can hand out channels of sample buffers: the hardware
/// capture session or the screen capture adapter.
pub trait SampleSource: Send + Sync {
    fn open_channel(&self, output: OutputKind, options: ChannelOptions) -> Result<SampleChannel, CaptureError>;
}
