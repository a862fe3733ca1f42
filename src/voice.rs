use crate::envelope::{AdsrEnvelope, EnvelopeParams};
use crate::oscillator::{Phase, Waveform};
use crate::settings::SynthSettings;

pub const MAX_POLYPHONY: usize = 8;

// Keeps a full chord of voices below the output clamp.
const VOICE_HEADROOM: f32 = 0.25;

pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}

pub fn db_to_gain(db: f32) -> f32 {
    if db == f32::NEG_INFINITY {
        0.0
    } else {
        10.0f32.powf(db / 20.0)
    }
}

/// The modulator waveform is fixed when the synth is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceParams {
    pub harmonicity: f32,
    pub modulation_index: f32,
    pub volume_db: f32,
    pub envelope: EnvelopeParams,
    pub modulation_envelope: EnvelopeParams,
    pub carrier: Waveform,
}

impl VoiceParams {
    pub fn from_settings(settings: &SynthSettings) -> Self {
        let adsr = EnvelopeParams {
            attack: settings.attack,
            decay: settings.decay,
            sustain: settings.sustain,
            release: settings.release,
        };
        Self {
            harmonicity: settings.harmonicity,
            modulation_index: settings.modulation_index,
            volume_db: gain_to_db(settings.volume),
            envelope: adsr,
            modulation_envelope: adsr,
            carrier: settings.carrier_type,
        }
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self::from_settings(&SynthSettings::default())
    }
}

#[derive(Clone, Debug)]
struct FmVoice {
    note: Option<&'static str>,
    frequency: f32,
    held: bool,
    started: u64,
    carrier_phase: Phase,
    modulator_phase: Phase,
    amp_env: AdsrEnvelope,
    mod_env: AdsrEnvelope,
}

impl FmVoice {
    fn new() -> Self {
        Self {
            note: None,
            frequency: 0.0,
            held: false,
            started: 0,
            carrier_phase: Phase::default(),
            modulator_phase: Phase::default(),
            amp_env: AdsrEnvelope::new(),
            mod_env: AdsrEnvelope::new(),
        }
    }

    fn is_free(&self) -> bool {
        self.amp_env.is_idle()
    }

    fn start(&mut self, note: &'static str, frequency: f32, started: u64) {
        if self.is_free() {
            self.carrier_phase.reset();
            self.modulator_phase.reset();
        }
        self.note = Some(note);
        self.frequency = frequency;
        self.held = true;
        self.started = started;
        self.amp_env.trigger();
        self.mod_env.trigger();
    }

    fn stop(&mut self) {
        self.held = false;
        self.amp_env.release();
        self.mod_env.release();
    }

    fn silence(&mut self) {
        self.held = false;
        self.note = None;
        self.amp_env.reset();
        self.mod_env.reset();
    }

    fn sample(&mut self, params: &VoiceParams, modulator: Waveform, sample_rate: f32) -> f32 {
        let dt = 1.0 / sample_rate.max(1.0);
        let amp = self.amp_env.advance(dt, &params.envelope);
        let depth = self.mod_env.advance(dt, &params.modulation_envelope);

        let modulator_freq = self.frequency * params.harmonicity;
        let modulation = modulator.sample(self.modulator_phase.advance(modulator_freq, sample_rate));
        let deviation = modulation * params.modulation_index * self.frequency * depth;
        let carrier = params
            .carrier
            .sample(self.carrier_phase.advance(self.frequency + deviation, sample_rate));

        if self.amp_env.is_idle() {
            self.note = None;
        }
        carrier * amp
    }
}

pub struct PolySynth {
    voices: Vec<FmVoice>,
    params: VoiceParams,
    modulator: Waveform,
    sample_rate: f32,
    counter: u64,
}

impl PolySynth {
    pub fn new(settings: &SynthSettings) -> Self {
        Self {
            voices: (0..MAX_POLYPHONY).map(|_| FmVoice::new()).collect(),
            params: VoiceParams::from_settings(settings),
            modulator: settings.modulator_type,
            sample_rate: 44_100.0,
            counter: 0,
        }
    }

    pub fn set_sample_rate(&mut self, rate: f32) {
        self.sample_rate = rate.max(1.0);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn max_polyphony(&self) -> usize {
        self.voices.len()
    }

    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub fn modulator(&self) -> Waveform {
        self.modulator
    }

    pub fn set(&mut self, params: VoiceParams) {
        self.params = params;
    }

    pub fn trigger_attack(&mut self, note: &'static str, frequency: f32) {
        self.counter += 1;
        let started = self.counter;
        let index = match self.voices.iter().position(FmVoice::is_free) {
            Some(index) => index,
            None => {
                let oldest = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.started)
                    .map(|(index, _)| index)
                    .unwrap_or(0);
                tracing::debug!(note, stolen = ?self.voices[oldest].note, "stealing voice");
                oldest
            }
        };
        self.voices[index].start(note, frequency, started);
    }

    /// Releases the oldest held voice playing `note`. Unmatched releases are ignored.
    pub fn trigger_release(&mut self, note: &str) {
        if let Some(voice) = self
            .voices
            .iter_mut()
            .filter(|voice| voice.held && voice.note == Some(note))
            .min_by_key(|voice| voice.started)
        {
            voice.stop();
        }
    }

    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.stop();
        }
    }

    pub fn dispose(&mut self) {
        for voice in &mut self.voices {
            voice.silence();
        }
    }

    pub fn active_notes(&self) -> Vec<&'static str> {
        self.voices
            .iter()
            .filter(|voice| !voice.is_free())
            .filter_map(|voice| voice.note)
            .collect()
    }

    pub fn held_count(&self, note: &str) -> usize {
        self.voices
            .iter()
            .filter(|voice| voice.held && voice.note == Some(note))
            .count()
    }

    pub fn next_sample(&mut self) -> f32 {
        let params = self.params;
        let modulator = self.modulator;
        let sample_rate = self.sample_rate;
        let mixed: f32 = self
            .voices
            .iter_mut()
            .filter(|voice| !voice.is_free())
            .map(|voice| voice.sample(&params, modulator, sample_rate))
            .sum();
        mixed * VOICE_HEADROOM * db_to_gain(params.volume_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> SynthSettings {
        SynthSettings::default()
    }

    fn render(synth: &mut PolySynth, samples: usize) -> Vec<f32> {
        (0..samples).map(|_| synth.next_sample()).collect()
    }

    #[test]
    fn volume_maps_to_decibels_and_back() {
        assert_relative_eq!(gain_to_db(1.0), 0.0);
        assert_relative_eq!(gain_to_db(0.5), -6.0206, epsilon = 1e-3);
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
        assert_eq!(db_to_gain(f32::NEG_INFINITY), 0.0);
        assert_relative_eq!(db_to_gain(gain_to_db(0.3)), 0.3, epsilon = 1e-6);
    }

    #[test]
    fn params_share_adsr_between_envelopes_and_skip_modulator() {
        let snapshot = settings()
            .with(crate::settings::SettingsEdit::Attack(0.7))
            .with(crate::settings::SettingsEdit::ModulatorType(Waveform::Square))
            .with(crate::settings::SettingsEdit::CarrierType(Waveform::Triangle));
        let params = VoiceParams::from_settings(&snapshot);
        assert_eq!(params.envelope, params.modulation_envelope);
        assert_relative_eq!(params.envelope.attack, 0.7);
        assert_eq!(params.carrier, Waveform::Triangle);
    }

    #[test]
    fn modulator_waveform_is_fixed_at_construction() {
        let mut synth = PolySynth::new(&settings());
        let edited = settings().with(crate::settings::SettingsEdit::ModulatorType(Waveform::Sawtooth));
        synth.set(VoiceParams::from_settings(&edited));
        assert_eq!(synth.modulator(), Waveform::Sine);
    }

    #[test]
    fn note_on_produces_sound_and_release_decays_to_silence() {
        let mut synth = PolySynth::new(&settings());
        synth.trigger_attack("A4", 440.0);
        let held = render(&mut synth, 4_410);
        assert!(held.iter().any(|s| s.abs() > 0.01));

        synth.trigger_release("A4");
        render(&mut synth, 88_200);
        assert!(synth.active_notes().is_empty());
        assert!(render(&mut synth, 64).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn zero_volume_is_silent() {
        let quiet = settings().with(crate::settings::SettingsEdit::Volume(0.0));
        let mut synth = PolySynth::new(&quiet);
        synth.trigger_attack("C4", 261.63);
        assert!(render(&mut synth, 1_000).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn polyphony_is_capped_and_oldest_voice_is_stolen() {
        let mut synth = PolySynth::new(&settings());
        let notes = ["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5", "C#4"];
        for (index, note) in notes.iter().enumerate() {
            synth.trigger_attack(note, 200.0 + index as f32 * 20.0);
        }
        let active = synth.active_notes();
        assert_eq!(active.len(), MAX_POLYPHONY);
        assert!(!active.contains(&"C4"));
        assert!(active.contains(&"C#4"));
    }

    #[test]
    fn unmatched_release_is_tolerated() {
        let mut synth = PolySynth::new(&settings());
        synth.trigger_release("G4");
        synth.trigger_attack("G4", 392.0);
        synth.trigger_release("A4");
        assert_eq!(synth.held_count("G4"), 1);
        synth.trigger_release("G4");
        synth.trigger_release("G4");
        assert_eq!(synth.held_count("G4"), 0);
    }

    #[test]
    fn each_release_stops_one_voice_of_a_doubled_note() {
        let mut synth = PolySynth::new(&settings());
        synth.trigger_attack("C4", 261.63);
        synth.trigger_attack("C4", 261.63);
        assert_eq!(synth.held_count("C4"), 2);

        synth.trigger_release("C4");
        assert_eq!(synth.held_count("C4"), 1);
        let still_sounding = render(&mut synth, 44_100);
        assert!(still_sounding.iter().rev().take(100).any(|s| s.abs() > 1e-4));

        synth.trigger_release("C4");
        assert_eq!(synth.held_count("C4"), 0);
    }

    #[test]
    fn dispose_silences_everything() {
        let mut synth = PolySynth::new(&settings());
        synth.trigger_attack("E4", 329.63);
        synth.trigger_attack("B4", 493.88);
        synth.dispose();
        assert!(synth.active_notes().is_empty());
        assert_eq!(synth.next_sample(), 0.0);
    }
}
