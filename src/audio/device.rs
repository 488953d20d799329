//! Microphone access via `cpal`.
//!
//! [`AudioSource`] opens the input device for exactly one capture.  The
//! returned [`InputStream`] is a RAII guard: dropping it stops the cpal
//! stream and releases the device, so nothing holds the microphone between
//! turns.
//!
//! [`CpalMicrophone`] is the production source.  Tests substitute scripted
//! sources that count open/release pairs.

use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use thiserror::Error;

use super::resample::stereo_to_mono;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or reading the input device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    NotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio stream delivered no data for {0:?}")]
    Stalled(Duration),

    #[error("audio stream closed")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// InputStream / AudioSource
// ---------------------------------------------------------------------------

/// An open capture stream delivering mono `f32` chunks.
///
/// Dropping the stream releases the device.
pub trait InputStream {
    /// Native sample rate of the chunks in Hz.
    fn sample_rate(&self) -> u32;

    /// Wait up to `timeout` for the next chunk.
    ///
    /// `Ok(None)` means no chunk arrived in time; errors are device faults.
    fn read(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, DeviceError>;
}

/// Something that can open the microphone for one capture.
pub trait AudioSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn InputStream>, DeviceError>;
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Production [`AudioSource`] backed by a cpal input device.
///
/// The device is looked up again on every [`open`](AudioSource::open), so a
/// microphone that is unplugged and replugged between turns is picked up.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// `device_name` of `None` selects the system default input.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// Check that the configured device exists and reports a usable config.
    ///
    /// Called once at startup so a missing microphone fails initialisation
    /// instead of every turn.
    pub fn probe(&self) -> Result<(), DeviceError> {
        let device = self.find_device()?;
        let config = device.default_input_config()?;
        log::info!(
            "Input device: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_default(),
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );
        Ok(())
    }

    fn find_device(&self) -> Result<cpal::Device, DeviceError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(DeviceError::NoDevice),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().is_ok_and(|n| &n == wanted))
                .ok_or_else(|| DeviceError::NotFound(wanted.clone())),
        }
    }
}

impl AudioSource for CpalMicrophone {
    fn open(&self) -> Result<Box<dyn InputStream>, DeviceError> {
        let device = self.find_device()?;
        let supported = device.default_input_config()?;

        let sample_rate = supported.sample_rate().0;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let (tx, rx) = mpsc::channel();
        let stream = match format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, tx)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, tx)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, tx)?,
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        };
        stream.play()?;

        log::debug!("microphone acquired ({sample_rate} Hz)");
        Ok(Box::new(MicrophoneStream {
            _stream: stream,
            rx,
            sample_rate,
        }))
    }
}

type Chunk = Result<Vec<f32>, String>;

/// Build an input stream for sample type `T`, downmixing to mono `f32` in
/// the callback.  Stream errors are forwarded on the same channel.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<Chunk>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels;
    let err_tx = tx.clone();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            // The receiver is gone once the capture finished; nothing to do.
            let _ = tx.send(Ok(stereo_to_mono(&samples, channels)));
        },
        move |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
            let _ = err_tx.send(Err(err.to_string()));
        },
        None,
    )?;
    Ok(stream)
}

/// Live cpal capture.  Owns the stream; dropping it stops the hardware.
struct MicrophoneStream {
    _stream: cpal::Stream,
    rx: mpsc::Receiver<Chunk>,
    sample_rate: u32,
}

impl InputStream for MicrophoneStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<Vec<f32>>, DeviceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(chunk)) => Ok(Some(chunk)),
            Ok(Err(msg)) => Err(DeviceError::Stream(msg)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DeviceError::Disconnected),
        }
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        log::debug!("microphone released");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
