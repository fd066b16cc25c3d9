// src/audio/synth.rs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use std::sync::Arc;

use super::SoundKind;

/// Pre-rendered mono one-shots, one per [`SoundKind`].
#[derive(Clone)]
pub struct ClickBank {
    voices: Vec<Arc<[f32]>>,
}

impl ClickBank {
    pub fn new(sample_rate: u32) -> Self {
        let voices = SoundKind::ALL
            .iter()
            .map(|kind| Arc::from(render(*kind, sample_rate)))
            .collect();
        Self { voices }
    }

    pub fn get(&self, kind: SoundKind) -> Arc<[f32]> {
        self.voices[kind.index()].clone()
    }
}

fn render(kind: SoundKind, sample_rate: u32) -> Vec<f32> {
    match kind {
        SoundKind::Accent => sine_burst(sample_rate, 1000.0, 0.015, 0.8),
        SoundKind::Tick => sine_burst(sample_rate, 800.0, 0.012, 0.5),
        SoundKind::Cue => sine_burst(sample_rate, 1320.0, 0.060, 0.4),
        SoundKind::Kick => kick(sample_rate),
        SoundKind::Snare => noise_burst(sample_rate, 0.080, 0.5, 25.0),
        SoundKind::HiHat => noise_burst(sample_rate, 0.030, 0.25, 90.0),
    }
}

/// Sine with an exponential decay envelope.
pub fn sine_burst(sample_rate: u32, freq: f32, duration: f32, gain: f32) -> Vec<f32> {
    let sr = sample_rate as f32;
    let len = (sr * duration) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sr;
            let envelope = (-t * 40.0).exp();
            (t * freq * TAU).sin() * envelope * gain
        })
        .collect()
}

fn kick(sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f32;
    let len = (sr * 0.120) as usize;
    let mut phase = 0.0f32;
    (0..len)
        .map(|i| {
            let t = i as f32 / sr;
            // pitch sweeps 150 Hz -> 50 Hz
            let freq = 50.0 + 100.0 * (-t * 30.0).exp();
            phase += freq / sr;
            (phase * TAU).sin() * (-t * 25.0).exp() * 0.9
        })
        .collect()
}

fn noise_burst(sample_rate: u32, duration: f32, gain: f32, decay: f32) -> Vec<f32> {
    // fixed seed so every run sounds the same
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let sr = sample_rate as f32;
    let len = (sr * duration) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sr;
            rng.random_range(-1.0f32..1.0) * (-t * decay).exp() * gain
        })
        .collect()
}
