use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::{
    SampleFormat, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use crate::controllers::NoteEvent;
use crate::settings::SynthSettings;
use crate::voice::{PolySynth, VoiceParams};

pub type SharedPipeline = Arc<Mutex<SynthPipeline>>;
pub type TapHandle = Arc<Mutex<WaveformTap>>;

const OUTPUT_LIMIT: f32 = 0.98;

pub struct SynthPipeline {
    synth: Option<PolySynth>,
    taps: Vec<TapHandle>,
    sample_rate: f32,
}

impl Default for SynthPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthPipeline {
    pub fn new() -> Self {
        Self {
            synth: None,
            taps: Vec::new(),
            sample_rate: 44_100.0,
        }
    }

    pub fn shared() -> SharedPipeline {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn set_sample_rate(&mut self, rate: f32) {
        self.sample_rate = rate.max(1.0);
        if let Some(synth) = self.synth.as_mut() {
            synth.set_sample_rate(self.sample_rate);
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn synth(&self) -> Option<&PolySynth> {
        self.synth.as_ref()
    }

    fn attach_synth(&mut self, mut synth: PolySynth) {
        synth.set_sample_rate(self.sample_rate);
        self.synth = Some(synth);
    }

    fn detach_synth(&mut self) -> Option<PolySynth> {
        self.synth.take()
    }

    pub fn attach_tap(&mut self, tap: TapHandle) {
        self.taps.push(tap);
    }

    pub fn detach_tap(&mut self, tap: &TapHandle) {
        self.taps.retain(|attached| !Arc::ptr_eq(attached, tap));
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    pub fn next_sample(&mut self) -> f32 {
        let sample = self
            .synth
            .as_mut()
            .map(PolySynth::next_sample)
            .unwrap_or(0.0)
            .clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);
        for tap in &self.taps {
            if let Ok(mut guard) = tap.lock() {
                guard.push(sample);
            }
        }
        sample
    }
}

pub struct WaveformTap {
    buffer: Vec<f32>,
    cursor: usize,
    filled: bool,
}

impl WaveformTap {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            cursor: 0,
            filled: false,
        }
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, value: f32) {
        if let Some(slot) = self.buffer.get_mut(self.cursor) {
            *slot = value;
        }
        self.cursor = (self.cursor + 1) % self.buffer.len();
        if self.cursor == 0 {
            self.filled = true;
        }
    }

    /// Oldest-first copy of the buffer, or `None` until it has filled once.
    pub fn snapshot(&self) -> Option<Vec<f32>> {
        if !self.filled {
            return None;
        }
        let mut data = Vec::with_capacity(self.buffer.len());
        data.extend_from_slice(&self.buffer[self.cursor..]);
        data.extend_from_slice(&self.buffer[..self.cursor]);
        Some(data)
    }
}

pub trait WaveformSource {
    fn latest(&self) -> Option<Vec<f32>>;

    /// Stops feeding the source; called once on teardown.
    fn release(&mut self);
}

pub struct WaveformSampler {
    tap: TapHandle,
    pipeline: SharedPipeline,
    attached: bool,
}

impl WaveformSampler {
    pub fn attach(pipeline: &SharedPipeline, size: usize) -> Self {
        let tap = Arc::new(Mutex::new(WaveformTap::new(size)));
        if let Ok(mut guard) = pipeline.lock() {
            guard.attach_tap(tap.clone());
        }
        tracing::debug!(size, "waveform tap attached");
        Self {
            tap,
            pipeline: pipeline.clone(),
            attached: true,
        }
    }
}

impl WaveformSource for WaveformSampler {
    fn latest(&self) -> Option<Vec<f32>> {
        self.tap.lock().ok().and_then(|tap| tap.snapshot())
    }

    fn release(&mut self) {
        if !self.attached {
            return;
        }
        if let Ok(mut guard) = self.pipeline.lock() {
            guard.detach_tap(&self.tap);
        }
        self.attached = false;
        tracing::debug!("waveform tap released");
    }
}

impl Drop for WaveformSampler {
    fn drop(&mut self) {
        self.release();
    }
}

/// Note events are dropped until `set_audio_ready` has been called.
pub struct VoiceDriver {
    pipeline: SharedPipeline,
    audio_ready: bool,
}

impl VoiceDriver {
    pub fn activate(pipeline: &SharedPipeline, settings: &SynthSettings) -> Self {
        if let Ok(mut guard) = pipeline.lock() {
            guard.attach_synth(PolySynth::new(settings));
        }
        tracing::info!(
            modulator = settings.modulator_type.label(),
            "voice driver activated"
        );
        Self {
            pipeline: pipeline.clone(),
            audio_ready: false,
        }
    }

    pub fn set_audio_ready(&mut self) {
        self.audio_ready = true;
    }

    pub fn is_audio_ready(&self) -> bool {
        self.audio_ready
    }

    pub fn configure(&self, settings: &SynthSettings) {
        let params = VoiceParams::from_settings(settings);
        if let Ok(mut guard) = self.pipeline.lock() {
            if let Some(synth) = guard.synth.as_mut() {
                synth.set(params);
            }
        }
    }

    pub fn handle(&self, event: NoteEvent) {
        if !self.audio_ready {
            tracing::debug!(note = event.note(), "audio not initialized, dropping note event");
            return;
        }
        let Ok(mut guard) = self.pipeline.lock() else {
            return;
        };
        let Some(synth) = guard.synth.as_mut() else {
            return;
        };
        match event {
            NoteEvent::On { note, frequency } => synth.trigger_attack(note, frequency),
            NoteEvent::Off { note } => synth.trigger_release(note),
        }
    }
}

impl Drop for VoiceDriver {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.pipeline.lock() {
            if let Some(mut synth) = guard.detach_synth() {
                synth.dispose();
            }
        }
        tracing::info!("voice driver disposed");
    }
}

pub struct AudioEngine {
    _stream: Stream,
    sample_rate: f32,
}

impl AudioEngine {
    pub fn start(pipeline: SharedPipeline) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default audio output"))?;
        let supported = device.default_output_config()?;
        let config = supported.config();
        let sample_rate = config.sample_rate.0 as f32;
        {
            let mut guard = pipeline
                .lock()
                .map_err(|_| anyhow!("audio pipeline lock poisoned"))?;
            guard.set_sample_rate(sample_rate);
        }
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream_f32(&device, &config, pipeline)?,
            SampleFormat::I16 => build_stream_i16(&device, &config, pipeline)?,
            SampleFormat::U16 => build_stream_u16(&device, &config, pipeline)?,
            _ => build_stream_f32(&device, &config, pipeline)?,
        };
        stream.play()?;
        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio output started"
        );
        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    pipeline: SharedPipeline,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [f32], _| {
            fill_output_buffer(output, channels, &pipeline, 0.0, |sample| sample);
        },
        move |err| tracing::error!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_stream_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    pipeline: SharedPipeline,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [i16], _| {
            fill_output_buffer(output, channels, &pipeline, 0, |sample| {
                (sample * i16::MAX as f32) as i16
            });
        },
        move |err| tracing::error!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_stream_u16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    pipeline: SharedPipeline,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [u16], _| {
            fill_output_buffer(output, channels, &pipeline, u16::MAX / 2, |sample| {
                let scaled = (sample * 0.5 + 0.5).clamp(0.0, 1.0);
                (scaled * u16::MAX as f32) as u16
            });
        },
        move |err| tracing::error!("audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn fill_output_buffer<T, F>(
    output: &mut [T],
    channels: usize,
    pipeline: &SharedPipeline,
    silence: T,
    mut convert: F,
) where
    F: FnMut(f32) -> T,
    T: Copy,
{
    let Ok(mut pipe) = pipeline.lock() else {
        output.fill(silence);
        return;
    };
    for frame in output.chunks_mut(channels.max(1)) {
        let value = convert(pipe.next_sample());
        for channel in frame {
            *channel = value;
        }
    }
}
