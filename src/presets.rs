use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::oscillator::Waveform;
use crate::oscillator::Waveform::{Sawtooth, Sine, Square, Triangle};
use crate::settings::SynthSettings;
use crate::storage::KeyValueStore;

pub const STORAGE_KEY: &str = "fm-synth-custom-presets";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub settings: SynthSettings,
}

impl Preset {
    pub fn new(name: impl Into<String>, settings: SynthSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

#[allow(clippy::too_many_arguments)]
const fn factory_settings(
    harmonicity: f32,
    modulation_index: f32,
    volume: f32,
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    carrier_type: Waveform,
    modulator_type: Waveform,
) -> SynthSettings {
    SynthSettings {
        harmonicity,
        modulation_index,
        volume,
        attack,
        decay,
        sustain,
        release,
        carrier_type,
        modulator_type,
    }
}

const FACTORY: [(&str, SynthSettings); 5] = [
    ("Bell", factory_settings(7.0, 12.0, 0.5, 0.01, 0.4, 0.1, 1.5, Sine, Sine)),
    ("Bass", factory_settings(1.0, 8.0, 0.6, 0.01, 0.1, 0.8, 0.3, Sine, Sine)),
    ("Pad", factory_settings(3.0, 5.0, 0.4, 0.5, 0.3, 0.7, 2.0, Sine, Triangle)),
    ("Brass", factory_settings(2.0, 15.0, 0.5, 0.02, 0.2, 0.6, 0.4, Sawtooth, Square)),
    ("E-Piano", factory_settings(4.0, 10.0, 0.5, 0.01, 0.3, 0.2, 0.8, Sine, Sine)),
];

pub fn factory_presets() -> Vec<Preset> {
    FACTORY
        .iter()
        .map(|(name, settings)| Preset::new(*name, *settings))
        .collect()
}

pub struct PresetCatalog {
    factory: Vec<Preset>,
    custom: Vec<Preset>,
    store: Box<dyn KeyValueStore>,
}

impl PresetCatalog {
    /// A missing, unreadable or malformed entry opens as an empty custom list.
    pub fn open(store: Box<dyn KeyValueStore>) -> Self {
        let custom = read_custom(store.as_ref());
        tracing::info!(count = custom.len(), "custom presets loaded");
        Self {
            factory: factory_presets(),
            custom,
            store,
        }
    }

    pub fn factory(&self) -> &[Preset] {
        &self.factory
    }

    pub fn custom(&self) -> &[Preset] {
        &self.custom
    }

    /// Factory presets first, then custom presets in insertion order.
    pub fn list(&self) -> Vec<&Preset> {
        self.factory.iter().chain(self.custom.iter()).collect()
    }

    /// The snapshot to commit; a copy, so later edits never touch the preset.
    pub fn load(&self, preset: &Preset) -> SynthSettings {
        tracing::debug!(name = %preset.name, "preset loaded");
        preset.settings
    }

    pub fn save(&mut self, name: &str, current: SynthSettings) -> Result<&Preset> {
        if name.trim().is_empty() {
            return Err(Error::BlankPresetName);
        }
        let mut updated = self.custom.clone();
        updated.push(Preset::new(name, current));
        self.persist(&updated)?;
        self.custom = updated;
        tracing::info!(name, "preset saved");
        Ok(&self.custom[self.custom.len() - 1])
    }

    /// `None` when `confirm` declines.
    pub fn delete<F>(&mut self, index: usize, confirm: F) -> Result<Option<Preset>>
    where
        F: FnOnce(&Preset) -> bool,
    {
        let preset = self.custom.get(index).ok_or(Error::PresetIndex(index))?;
        if !confirm(preset) {
            return Ok(None);
        }
        let mut updated = self.custom.clone();
        let removed = updated.remove(index);
        self.persist(&updated)?;
        self.custom = updated;
        tracing::info!(name = %removed.name, index, "preset deleted");
        Ok(Some(removed))
    }

    /// Surfaces a write the store failed after accepting it. The custom list
    /// is reread so it matches what is actually stored.
    pub fn sync_storage(&mut self) -> Result<()> {
        let Some(err) = self.store.take_error() else {
            return Ok(());
        };
        self.custom = read_custom(self.store.as_ref());
        tracing::warn!(count = self.custom.len(), "custom presets reloaded after a failed write");
        Err(err)
    }

    fn persist(&self, presets: &[Preset]) -> Result<()> {
        let encoded = serde_json::to_string(presets)?;
        self.store.set(STORAGE_KEY, &encoded)
    }
}

fn read_custom(store: &dyn KeyValueStore) -> Vec<Preset> {
    let text = match store.get(STORAGE_KEY) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(err) => {
            tracing::error!("Failed to load custom presets: {err}");
            return Vec::new();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|err| {
        tracing::error!("Failed to load custom presets: {err}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsEdit;
    use crate::storage::MemoryStore;
    use std::sync::{Arc, Mutex};

    struct Shared(Arc<MemoryStore>);

    /// Accepts every write, then reports it as failed without storing it.
    #[derive(Default)]
    struct Dropping {
        failure: Mutex<Option<String>>,
    }

    impl KeyValueStore for Dropping {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            *self.failure.lock().unwrap() = Some("disk full".to_string());
            Ok(())
        }

        fn take_error(&self) -> Option<Error> {
            self.failure.lock().unwrap().take().map(Error::WriteFailed)
        }
    }

    impl KeyValueStore for Shared {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.0.set(key, value)
        }
    }

    fn catalog(memory: &Arc<MemoryStore>) -> PresetCatalog {
        PresetCatalog::open(Box::new(Shared(memory.clone())))
    }

    fn names(presets: &[Preset]) -> Vec<&str> {
        presets.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn list_puts_factory_before_custom() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        catalog.save("Mine", SynthSettings::default()).unwrap();
        let listed: Vec<&str> = catalog.list().into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(listed, vec!["Bell", "Bass", "Pad", "Brass", "E-Piano", "Mine"]);
    }

    #[test]
    fn factory_constants_match_the_catalog() {
        let presets = factory_presets();
        let brass = &presets[3];
        assert_eq!(brass.name, "Brass");
        assert_eq!(brass.settings.carrier_type, Waveform::Sawtooth);
        assert_eq!(brass.settings.modulator_type, Waveform::Square);
        assert_eq!(presets[2].settings.release, 2.0);
    }

    #[test]
    fn loading_copies_the_preset_settings() {
        let memory = Arc::new(MemoryStore::new());
        let catalog = catalog(&memory);
        let bell = catalog.factory()[0].clone();
        let mut store = crate::settings::SettingsStore::default();
        store.replace(catalog.load(&bell));
        assert_eq!(store.current(), bell.settings);

        store.apply(SettingsEdit::Harmonicity(1.5));
        assert_eq!(catalog.factory()[0].settings.harmonicity, 7.0);
        assert_eq!(catalog.factory()[0], bell);
    }

    #[test]
    fn blank_names_are_rejected_without_changes() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        for name in ["", "   ", "\t\n"] {
            let err = catalog.save(name, SynthSettings::default()).unwrap_err();
            assert!(matches!(err, Error::BlankPresetName));
            assert_eq!(err.to_string(), "Please enter a preset name");
        }
        assert!(catalog.custom().is_empty());
        assert!(memory.get(STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn names_are_kept_as_typed_and_may_repeat() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        catalog.save(" Lead ", SynthSettings::default()).unwrap();
        catalog.save(" Lead ", SynthSettings::default()).unwrap();
        assert_eq!(names(catalog.custom()), vec![" Lead ", " Lead "]);
    }

    #[test]
    fn confirmed_delete_removes_only_that_entry() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        for name in ["A", "B", "C"] {
            catalog.save(name, SynthSettings::default()).unwrap();
        }
        let removed = catalog.delete(1, |preset| preset.name == "B").unwrap();
        assert_eq!(removed.map(|p| p.name), Some("B".to_string()));
        assert_eq!(names(catalog.custom()), vec!["A", "C"]);

        let reopened = self::catalog(&memory);
        assert_eq!(names(reopened.custom()), vec!["A", "C"]);
    }

    #[test]
    fn declined_delete_changes_nothing() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        catalog.save("Keep", SynthSettings::default()).unwrap();
        assert_eq!(catalog.delete(0, |_| false).unwrap(), None);
        assert_eq!(names(catalog.custom()), vec!["Keep"]);
    }

    #[test]
    fn delete_out_of_range_is_an_error() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        let err = catalog.delete(3, |_| true).unwrap_err();
        assert!(matches!(err, Error::PresetIndex(3)));
    }

    #[test]
    fn saved_presets_survive_reopening() {
        let memory = Arc::new(MemoryStore::new());
        let mut catalog = catalog(&memory);
        let tweaked = SynthSettings::default()
            .with(SettingsEdit::ModulationIndex(33.5))
            .with(SettingsEdit::CarrierType(Waveform::Triangle));
        catalog.save("Tweaked", tweaked).unwrap();
        catalog.save("Plain", SynthSettings::default()).unwrap();
        let before = catalog.custom().to_vec();

        let reopened = self::catalog(&memory);
        assert_eq!(reopened.custom(), before.as_slice());
    }

    #[test]
    fn failed_write_is_reported_and_the_list_reverts() {
        let mut catalog = PresetCatalog::open(Box::new(Dropping::default()));
        assert!(catalog.sync_storage().is_ok());

        catalog.save("Lost", SynthSettings::default()).unwrap();
        assert_eq!(names(catalog.custom()), vec!["Lost"]);

        let err = catalog.sync_storage().unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));
        assert!(catalog.custom().is_empty());
        assert!(catalog.sync_storage().is_ok());
    }

    #[test]
    fn malformed_storage_is_treated_as_empty() {
        let memory = Arc::new(MemoryStore::new());
        memory.set(STORAGE_KEY, "{not json").unwrap();
        let mut catalog = catalog(&memory);
        assert!(catalog.custom().is_empty());
        catalog.save("Fresh", SynthSettings::default()).unwrap();
        assert_eq!(names(self::catalog(&memory).custom()), vec!["Fresh"]);
    }

    #[test]
    fn reads_camel_case_records_with_integer_numbers() {
        let memory = Arc::new(MemoryStore::new());
        let stored = r#"[{"name":"Old","settings":{"harmonicity":2,"modulationIndex":4.5,
            "volume":0.7,"attack":0.1,"decay":0.2,"sustain":0.5,"release":1,
            "carrierType":"square","modulatorType":"sawtooth"}}]"#;
        memory.set(STORAGE_KEY, stored).unwrap();
        let catalog = catalog(&memory);
        let old = &catalog.custom()[0];
        assert_eq!(old.name, "Old");
        assert_eq!(old.settings.carrier_type, Waveform::Square);
        assert_eq!(old.settings.modulation_index, 4.5);
    }
}
