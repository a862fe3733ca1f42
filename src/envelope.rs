/// Attack/decay/release are seconds, sustain is a level in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.2,
            sustain: 0.3,
            release: 0.5,
        }
    }
}

// Decay and release reach ~98% of their target after the configured time.
const TIME_CONSTANTS: f32 = 4.0;
const MIN_SEGMENT: f32 = 0.0001;
const SILENCE: f32 = 0.0001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Clone, Debug)]
pub struct AdsrEnvelope {
    value: f32,
    stage: EnvStage,
}

impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl AdsrEnvelope {
    pub fn new() -> Self {
        Self {
            value: 0.0,
            stage: EnvStage::Idle,
        }
    }

    pub fn stage(&self) -> EnvStage {
        self.stage
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.stage, EnvStage::Idle)
    }

    /// Restarts the attack from the current level.
    pub fn trigger(&mut self) {
        self.stage = EnvStage::Attack;
    }

    pub fn release(&mut self) {
        if !matches!(self.stage, EnvStage::Idle) {
            self.stage = EnvStage::Release;
        }
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.stage = EnvStage::Idle;
    }

    pub fn advance(&mut self, dt: f32, params: &EnvelopeParams) -> f32 {
        match self.stage {
            EnvStage::Idle => {
                self.value = 0.0;
            }
            EnvStage::Attack => {
                self.value += dt / params.attack.max(MIN_SEGMENT);
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.stage = EnvStage::Decay;
                }
            }
            EnvStage::Decay => {
                let step = (dt * TIME_CONSTANTS / params.decay.max(MIN_SEGMENT)).min(1.0);
                self.value += (params.sustain - self.value) * step;
                if (self.value - params.sustain).abs() < 0.001 {
                    self.value = params.sustain;
                    self.stage = EnvStage::Sustain;
                }
            }
            EnvStage::Sustain => {
                self.value = params.sustain;
            }
            EnvStage::Release => {
                let step = (dt * TIME_CONSTANTS / params.release.max(MIN_SEGMENT)).min(1.0);
                self.value -= self.value * step;
                if self.value <= SILENCE {
                    self.value = 0.0;
                    self.stage = EnvStage::Idle;
                }
            }
        }
        self.value.clamp(0.0, 1.0)
    }
}
