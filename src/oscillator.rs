use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub const VALUES: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Waveform::Sine => "Sine",
            Waveform::Square => "Square",
            Waveform::Sawtooth => "Sawtooth",
            Waveform::Triangle => "Triangle",
        }
    }

    /// Sample at `phase` in [0, 1).
    pub fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * (phase - 0.5),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Phase accumulator shared by carrier and modulator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Phase(f32);

impl Phase {
    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0.0;
    }

    pub fn advance(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        let current = self.0;
        self.0 = (self.0 + frequency / sample_rate.max(1.0)).rem_euclid(1.0);
        current
    }
}
