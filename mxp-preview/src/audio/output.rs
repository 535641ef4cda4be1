//! Audio output using cpal
//!
//! `AudioOutput` is the seam between the audio context and the sound device. The
//! context hands it a render callback that produces one stereo frame per call;
//! the output pulls frames at its own sample rate.
//!
//! `cpal::Stream` is not `Send`, so `CpalOutput` keeps the device and stream on a
//! dedicated thread and drives it through a command channel.

use crate::audio::types::AudioFrame;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sample rate requested from the device when it supports it
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Render callback invoked once per output frame on the audio thread
pub type RenderCallback = Box<dyn FnMut() -> AudioFrame + Send + 'static>;

/// A sink that pulls rendered frames from a callback.
pub trait AudioOutput: Send {
    /// Begin pulling frames from `callback`, replacing any running callback
    fn start(&mut self, callback: RenderCallback) -> Result<()>;

    /// Stop pulling frames; the output may be started again
    fn stop(&mut self) -> Result<()>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn device_name(&self) -> String;
}

/// Opens outputs on demand; the audio context is created lazily on first use.
pub trait OutputFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioOutput>>;
}

impl<F> OutputFactory for F
where
    F: Fn() -> Result<Box<dyn AudioOutput>> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn AudioOutput>> {
        self()
    }
}

/// Factory for `CpalOutput` on a named or default device
#[derive(Debug, Clone, Default)]
pub struct CpalOutputFactory {
    pub device: Option<String>,
    pub buffer_size: Option<u32>,
}

impl CpalOutputFactory {
    pub fn new(device: Option<String>, buffer_size: Option<u32>) -> Self {
        Self {
            device,
            buffer_size,
        }
    }
}

impl OutputFactory for CpalOutputFactory {
    fn open(&self) -> Result<Box<dyn AudioOutput>> {
        let output = CpalOutput::open(self.device.clone(), self.buffer_size)?;
        Ok(Box::new(output))
    }
}

enum Command {
    Start(RenderCallback, mpsc::SyncSender<Result<()>>),
    Stop(mpsc::SyncSender<Result<()>>),
    Shutdown,
}

struct DeviceInfo {
    name: String,
    sample_rate: u32,
    channels: u16,
}

/// Output on a cpal device, owned by a dedicated thread
pub struct CpalOutput {
    commands: mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
    info: DeviceInfo,
}

impl CpalOutput {
    /// Open `device_name` (or the default device) for output.
    ///
    /// A device that cannot be found falls back to the default device.
    pub fn open(device_name: Option<String>, buffer_size: Option<u32>) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<DeviceInfo>>(1);

        let thread = std::thread::Builder::new()
            .name("mxp-audio-output".to_string())
            .spawn(move || {
                let device = match DeviceStream::open(device_name, buffer_size) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(device.info()));
                device.run(command_rx);
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let info = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during setup".to_string()))??;

        info!(
            "Audio output ready: device={}, {}Hz, {} channels",
            info.name, info.sample_rate, info.channels
        );

        Ok(Self {
            commands: command_tx,
            thread: Some(thread),
            info,
        })
    }

    fn request(&self, make: impl FnOnce(mpsc::SyncSender<Result<()>>) -> Command) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| Error::AudioOutput("Output thread is not running".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread dropped the request".to_string()))?
    }
}

impl AudioOutput for CpalOutput {
    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        self.request(|reply| Command::Start(callback, reply))
    }

    fn stop(&mut self) -> Result<()> {
        self.request(Command::Stop)
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn channels(&self) -> u16 {
        self.info.channels
    }

    fn device_name(&self) -> String {
        self.info.name.clone()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
    }
}

/// Device state living on the output thread
struct DeviceStream {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl DeviceStream {
    fn open(device_name: Option<String>, buffer_size: Option<u32>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name.as_ref() {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(device) => {
                        info!("Found requested audio device: {}", name);
                        device
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let (mut config, sample_format) = Self::best_config(&device)?;
        if let Some(size) = buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Prefer 44.1kHz stereo f32, otherwise the device default
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            let config = config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let default = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((default.config(), default.sample_format()))
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self
                .device
                .name()
                .unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    fn run(mut self, commands: mpsc::Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Start(callback, reply) => {
                    let _ = reply.send(self.start(callback));
                }
                Command::Stop(reply) => {
                    let _ = reply.send(self.stop());
                }
                Command::Shutdown => break,
            }
        }

        if let Err(e) = self.stop() {
            warn!("Failed to stop stream on shutdown: {}", e);
        }
        debug!("Audio output thread exiting");
    }

    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        self.stop()?;

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(callback)?,
            SampleFormat::I16 => self.build_stream::<i16>(callback)?,
            SampleFormat::U16 => self.build_stream::<u16>(callback)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            debug!("Audio stream stopped");
        }
        Ok(())
    }

    fn build_stream<T>(&self, mut callback: RenderCallback) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let mut audio_frame = callback();
                        audio_frame.clamp();

                        frame[0] = T::from_sample(audio_frame.left);
                        if channels > 1 {
                            frame[1] = T::from_sample(audio_frame.right);
                        }
                        for extra in frame.iter_mut().skip(2) {
                            *extra = T::EQUILIBRIUM;
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}

/// List available audio output devices.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}
