use serde::{Deserialize, Serialize};

use crate::oscillator::Waveform;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthSettings {
    pub harmonicity: f32,
    pub modulation_index: f32,
    pub volume: f32,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub carrier_type: Waveform,
    pub modulator_type: Waveform,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            harmonicity: 3.0,
            modulation_index: 10.0,
            volume: 0.5,
            attack: 0.01,
            decay: 0.2,
            sustain: 0.3,
            release: 0.5,
            carrier_type: Waveform::Sine,
            modulator_type: Waveform::Sine,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettingsEdit {
    Harmonicity(f32),
    ModulationIndex(f32),
    Volume(f32),
    Attack(f32),
    Decay(f32),
    Sustain(f32),
    Release(f32),
    CarrierType(Waveform),
    ModulatorType(Waveform),
}

impl SynthSettings {
    pub fn with(self, edit: SettingsEdit) -> Self {
        match edit {
            SettingsEdit::Harmonicity(harmonicity) => Self {
                harmonicity,
                ..self
            },
            SettingsEdit::ModulationIndex(modulation_index) => Self {
                modulation_index,
                ..self
            },
            SettingsEdit::Volume(volume) => Self { volume, ..self },
            SettingsEdit::Attack(attack) => Self { attack, ..self },
            SettingsEdit::Decay(decay) => Self { decay, ..self },
            SettingsEdit::Sustain(sustain) => Self { sustain, ..self },
            SettingsEdit::Release(release) => Self { release, ..self },
            SettingsEdit::CarrierType(carrier_type) => Self {
                carrier_type,
                ..self
            },
            SettingsEdit::ModulatorType(modulator_type) => Self {
                modulator_type,
                ..self
            },
        }
    }

    pub fn value(&self, field: SettingsField) -> f32 {
        match field {
            SettingsField::Harmonicity => self.harmonicity,
            SettingsField::ModulationIndex => self.modulation_index,
            SettingsField::Volume => self.volume,
            SettingsField::Attack => self.attack,
            SettingsField::Decay => self.decay,
            SettingsField::Sustain => self.sustain,
            SettingsField::Release => self.release,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingsField {
    Harmonicity,
    ModulationIndex,
    Volume,
    Attack,
    Decay,
    Sustain,
    Release,
}

impl SettingsField {
    pub const OSCILLATOR: [SettingsField; 3] = [
        SettingsField::Harmonicity,
        SettingsField::ModulationIndex,
        SettingsField::Volume,
    ];

    pub const ENVELOPE: [SettingsField; 4] = [
        SettingsField::Attack,
        SettingsField::Decay,
        SettingsField::Sustain,
        SettingsField::Release,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::Harmonicity => "HARMONICITY",
            SettingsField::ModulationIndex => "MOD INDEX",
            SettingsField::Volume => "VOLUME",
            SettingsField::Attack => "ATTACK",
            SettingsField::Decay => "DECAY",
            SettingsField::Sustain => "SUSTAIN",
            SettingsField::Release => "RELEASE",
        }
    }

    pub fn range(&self) -> ControlRange {
        match self {
            SettingsField::Harmonicity => ControlRange::new(0.5, 8.0, 0.1),
            SettingsField::ModulationIndex => ControlRange::new(0.0, 50.0, 0.5),
            SettingsField::Volume => ControlRange::new(0.0, 1.0, 0.01),
            SettingsField::Attack => ControlRange::new(0.01, 2.0, 0.01),
            SettingsField::Decay => ControlRange::new(0.01, 2.0, 0.01),
            SettingsField::Sustain => ControlRange::new(0.0, 1.0, 0.01),
            SettingsField::Release => ControlRange::new(0.01, 3.0, 0.01),
        }
    }

    pub fn edit(&self, value: f32) -> SettingsEdit {
        match self {
            SettingsField::Harmonicity => SettingsEdit::Harmonicity(value),
            SettingsField::ModulationIndex => SettingsEdit::ModulationIndex(value),
            SettingsField::Volume => SettingsEdit::Volume(value),
            SettingsField::Attack => SettingsEdit::Attack(value),
            SettingsField::Decay => SettingsEdit::Decay(value),
            SettingsField::Sustain => SettingsEdit::Sustain(value),
            SettingsField::Release => SettingsEdit::Release(value),
        }
    }

    pub fn display(&self, value: f32) -> String {
        match self {
            SettingsField::Harmonicity => format!("{value:.2}"),
            SettingsField::ModulationIndex => format!("{value:.1}"),
            SettingsField::Volume => format!("{}%", (value * 100.0).round() as i32),
            SettingsField::Sustain => format!("{value:.2}"),
            SettingsField::Attack | SettingsField::Decay | SettingsField::Release => {
                format!("{value:.2}s")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl ControlRange {
    pub const fn new(min: f32, max: f32, step: f32) -> Self {
        Self { min, max, step }
    }

    /// Maps a knob position in [0, 1] onto the range, snapped to `step`.
    pub fn from_unit(&self, unit: f32) -> f32 {
        let raw = self.min + unit.clamp(0.0, 1.0) * (self.max - self.min);
        self.snap(raw)
    }

    pub fn to_unit(&self, value: f32) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    pub fn snap(&self, value: f32) -> f32 {
        let steps = ((value - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }
}

/// The revision bumps once per commit.
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: SynthSettings,
    revision: u64,
}

impl SettingsStore {
    pub fn new(initial: SynthSettings) -> Self {
        Self {
            current: initial,
            revision: 0,
        }
    }

    pub fn current(&self) -> SynthSettings {
        self.current
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn apply(&mut self, edit: SettingsEdit) -> SynthSettings {
        self.replace(self.current.with(edit))
    }

    pub fn replace(&mut self, settings: SynthSettings) -> SynthSettings {
        self.current = settings;
        self.revision += 1;
        tracing::trace!(revision = self.revision, "settings committed");
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn changed_fields(a: &SynthSettings, b: &SynthSettings) -> usize {
        let numeric = [
            a.harmonicity != b.harmonicity,
            a.modulation_index != b.modulation_index,
            a.volume != b.volume,
            a.attack != b.attack,
            a.decay != b.decay,
            a.sustain != b.sustain,
            a.release != b.release,
            a.carrier_type != b.carrier_type,
            a.modulator_type != b.modulator_type,
        ];
        numeric.iter().filter(|changed| **changed).count()
    }

    #[test]
    fn each_edit_changes_exactly_one_field() {
        let base = SynthSettings::default();
        let edits = [
            SettingsEdit::Harmonicity(7.5),
            SettingsEdit::ModulationIndex(42.0),
            SettingsEdit::Volume(0.9),
            SettingsEdit::Attack(1.2),
            SettingsEdit::Decay(1.7),
            SettingsEdit::Sustain(0.95),
            SettingsEdit::Release(2.5),
            SettingsEdit::CarrierType(Waveform::Square),
            SettingsEdit::ModulatorType(Waveform::Triangle),
        ];
        for edit in edits {
            let next = base.with(edit);
            assert_eq!(changed_fields(&base, &next), 1, "{edit:?}");
        }
    }

    #[test]
    fn store_commits_new_snapshot_and_keeps_old_value_intact() {
        let mut store = SettingsStore::default();
        let before = store.current();
        let after = store.apply(SettingsEdit::Volume(0.25));
        assert_eq!(before.volume, 0.5);
        assert_eq!(after.volume, 0.25);
        assert_eq!(store.revision(), 1);
        store.replace(before);
        assert_eq!(store.current(), before);
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn control_range_snaps_to_step() {
        let range = SettingsField::Harmonicity.range();
        assert_relative_eq!(range.from_unit(0.0), 0.5);
        assert_relative_eq!(range.from_unit(1.0), 8.0);
        assert_relative_eq!(range.snap(3.04), 3.0, epsilon = 1e-5);
        assert_relative_eq!(range.snap(100.0), 8.0);
        assert_relative_eq!(range.to_unit(range.from_unit(0.4)), 0.4, epsilon = 0.01);
    }

    #[test]
    fn field_edit_round_trips_through_value() {
        let settings = SynthSettings::default();
        for field in SettingsField::OSCILLATOR
            .iter()
            .chain(SettingsField::ENVELOPE.iter())
        {
            let edited = settings.with(field.edit(0.75));
            assert_relative_eq!(edited.value(*field), 0.75);
        }
    }

    #[test]
    fn displays_match_control_readouts() {
        assert_eq!(SettingsField::Volume.display(0.5), "50%");
        assert_eq!(SettingsField::Attack.display(0.01), "0.01s");
        assert_eq!(SettingsField::ModulationIndex.display(10.0), "10.0");
    }

    #[test]
    fn serializes_with_record_field_names() {
        let json = serde_json::to_value(SynthSettings::default()).unwrap();
        assert_eq!(json["modulationIndex"], 10.0);
        assert_eq!(json["carrierType"], "sine");
        assert!(json.get("modulation_index").is_none());
    }
}
