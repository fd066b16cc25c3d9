// src/audio/output.rs

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;

use super::synth::ClickBank;
use super::{AudioSink, ScheduledSound, SoundKind};
use crate::clock::SampleClock;
use crate::error::{CoreError, Result};

const COMMAND_CAPACITY: usize = 256;

/// Helper struct to hold output device info
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> anyhow::Result<OutputConfig> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("No output device available"))?;
    let supported_config = device.default_output_config()?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::info!(
        "🔊 Output device: channels: {}, sample_rate: {}",
        output_channels, output_sample_rate
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

enum SinkCommand {
    Play { kind: SoundKind, at_frame: u64 },
    CancelPending,
}

/// Keeps the cpal stream alive. Must stay on the thread that opened it;
/// dropping it silences the output and freezes the sample clock.
pub struct AudioOutput {
    _stream: Stream,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Sending half of the output: lives on the scheduler thread.
pub struct CpalSink {
    producer: HeapProd<SinkCommand>,
    clock: SampleClock,
}

impl AudioSink for CpalSink {
    fn schedule(&mut self, sound: ScheduledSound) {
        let cmd = SinkCommand::Play {
            kind: sound.kind,
            at_frame: self.clock.frame_at(sound.at),
        };
        if self.producer.try_push(cmd).is_err() {
            log::debug!("audio command queue full, dropped {:?}", sound.kind);
        }
    }

    fn cancel_pending(&mut self) {
        let _ = self.producer.try_push(SinkCommand::CancelPending);
    }
}

/// Open the default output. The returned clock counts frames actually
/// rendered by the device and is the time base for all scheduling.
pub fn open_output() -> Result<(AudioOutput, CpalSink, SampleClock)> {
    open_output_inner().map_err(|e| CoreError::AudioUnavailable(e.to_string()))
}

fn open_output_inner() -> anyhow::Result<(AudioOutput, CpalSink, SampleClock)> {
    let OutputConfig { device, config, sample_format, output_channels, output_sample_rate } =
        setup_output_device()?;

    let clock = SampleClock::new(output_sample_rate);
    let (producer, consumer) = HeapRb::<SinkCommand>::new(COMMAND_CAPACITY).split();

    let renderer = VoiceRenderer {
        commands: consumer,
        bank: ClickBank::new(output_sample_rate),
        voices: Vec::with_capacity(32),
        clock: clock.clone(),
        channels: output_channels,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer)?,
        other => anyhow::bail!("Unsupported sample format: {:?}", other),
    };
    stream.play()?;

    Ok((
        AudioOutput { _stream: stream, sample_rate: output_sample_rate, channels: output_channels },
        CpalSink { producer, clock: clock.clone() },
        clock,
    ))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, mut renderer: VoiceRenderer) -> anyhow::Result<Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
{
    let err_fn = |err| log::error!("Audio output error: {err}");
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
            err_fn,
            None,
        )
        .map_err(Into::into)
}

struct Voice {
    samples: Arc<[f32]>,
    start_frame: u64,
    pos: usize,
}

/// Owned strictly by the audio thread.
struct VoiceRenderer {
    commands: HeapCons<SinkCommand>,
    bank: ClickBank,
    voices: Vec<Voice>,
    clock: SampleClock,
    channels: usize,
}

impl VoiceRenderer {
    fn render<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        while let Some(cmd) = self.commands.try_pop() {
            match cmd {
                SinkCommand::Play { kind, at_frame } => self.voices.push(Voice {
                    samples: self.bank.get(kind),
                    start_frame: at_frame,
                    pos: 0,
                }),
                // voices already sounding keep ringing out
                SinkCommand::CancelPending => self.voices.retain(|v| v.pos > 0),
            }
        }

        let channels = self.channels.max(1);
        let frames = data.len() / channels;
        let block_start = self.clock.frames();

        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let now = block_start + i as u64;
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut() {
                // Late voices start right away; on-time ones start on their exact frame.
                if voice.start_frame <= now && voice.pos < voice.samples.len() {
                    mix += voice.samples[voice.pos];
                    voice.pos += 1;
                }
            }
            let out = T::from_sample(mix.clamp(-1.0, 1.0));
            for sample in frame.iter_mut() {
                *sample = out;
            }
        }

        self.voices.retain(|v| v.pos < v.samples.len());
        self.clock.advance(frames as u64);
    }
}
