use std::collections::{HashMap, HashSet};

use macroquad::prelude::*;

pub const WHITE_KEY_WIDTH: f32 = 60.0;
pub const WHITE_KEY_HEIGHT: f32 = 200.0;
pub const BLACK_KEY_WIDTH: f32 = 40.0;
pub const BLACK_KEY_HEIGHT: f32 = 120.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyBinding {
    pub label: &'static str,
    pub keycode: KeyCode,
    pub note: &'static str,
    pub frequency: f32,
}

impl KeyBinding {
    const fn new(label: &'static str, keycode: KeyCode, note: &'static str, frequency: f32) -> Self {
        Self {
            label,
            keycode,
            note,
            frequency,
        }
    }

    pub fn is_black(&self) -> bool {
        self.note.contains('#')
    }
}

/// One chromatic octave from C4 plus the C above, on the A-K row.
pub const KEY_BINDINGS: [KeyBinding; 13] = [
    KeyBinding::new("A", KeyCode::A, "C4", 261.63),
    KeyBinding::new("W", KeyCode::W, "C#4", 277.18),
    KeyBinding::new("S", KeyCode::S, "D4", 293.66),
    KeyBinding::new("E", KeyCode::E, "D#4", 311.13),
    KeyBinding::new("D", KeyCode::D, "E4", 329.63),
    KeyBinding::new("F", KeyCode::F, "F4", 349.23),
    KeyBinding::new("T", KeyCode::T, "F#4", 369.99),
    KeyBinding::new("G", KeyCode::G, "G4", 392.00),
    KeyBinding::new("Y", KeyCode::Y, "G#4", 415.30),
    KeyBinding::new("H", KeyCode::H, "A4", 440.00),
    KeyBinding::new("U", KeyCode::U, "A#4", 466.16),
    KeyBinding::new("J", KeyCode::J, "B4", 493.88),
    KeyBinding::new("K", KeyCode::K, "C5", 523.25),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoteEvent {
    On {
        note: &'static str,
        frequency: f32,
    },
    Off {
        note: &'static str,
    },
}

impl NoteEvent {
    pub fn note(&self) -> &'static str {
        match self {
            NoteEvent::On { note, .. } | NoteEvent::Off { note } => note,
        }
    }
}

pub struct KeyboardController {
    lookup: HashMap<KeyCode, KeyBinding>,
    pressed: HashSet<KeyCode>,
    mouse_active: Option<KeyCode>,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardController {
    pub fn new() -> Self {
        let lookup = KEY_BINDINGS
            .iter()
            .map(|binding| (binding.keycode, *binding))
            .collect();
        Self {
            lookup,
            pressed: HashSet::new(),
            mouse_active: None,
        }
    }

    pub fn binding(&self, keycode: KeyCode) -> Option<&KeyBinding> {
        self.lookup.get(&keycode)
    }

    pub fn poll(&mut self) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        for binding in KEY_BINDINGS.iter() {
            if is_key_pressed(binding.keycode) {
                events.extend(self.press_key(binding.keycode));
            }
            if is_key_released(binding.keycode) {
                events.extend(self.release_key(binding.keycode));
            }
        }
        events
    }

    pub fn press_key(&mut self, keycode: KeyCode) -> Option<NoteEvent> {
        let binding = self.lookup.get(&keycode)?;
        if !self.pressed.insert(keycode) {
            return None;
        }
        Some(NoteEvent::On {
            note: binding.note,
            frequency: binding.frequency,
        })
    }

    /// Always emits a note-off for a bound key, held or not.
    pub fn release_key(&mut self, keycode: KeyCode) -> Option<NoteEvent> {
        let binding = self.lookup.get(&keycode)?;
        self.pressed.remove(&keycode);
        Some(NoteEvent::Off { note: binding.note })
    }

    pub fn release_held(&mut self) -> Vec<NoteEvent> {
        let held: Vec<KeyCode> = self.pressed.drain().collect();
        held.into_iter()
            .filter_map(|keycode| self.lookup.get(&keycode))
            .map(|binding| NoteEvent::Off { note: binding.note })
            .collect()
    }

    pub fn handle_mouse_keys(
        &mut self,
        hovered: Option<KeyCode>,
        mouse_pressed: bool,
        mouse_released: bool,
    ) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        if let Some(active) = self.mouse_active {
            if mouse_released || hovered != Some(active) {
                events.extend(self.mouse_off(active));
                self.mouse_active = None;
            }
        }
        if mouse_pressed {
            if let Some(binding) = hovered.and_then(|code| self.lookup.get(&code)) {
                self.mouse_active = Some(binding.keycode);
                events.push(NoteEvent::On {
                    note: binding.note,
                    frequency: binding.frequency,
                });
            }
        }
        events
    }

    fn mouse_off(&self, keycode: KeyCode) -> Option<NoteEvent> {
        self.lookup
            .get(&keycode)
            .map(|binding| NoteEvent::Off { note: binding.note })
    }

    /// Releases any mouse-held key without a button event (focus loss).
    pub fn reset_mouse(&mut self) -> Option<NoteEvent> {
        let active = self.mouse_active.take()?;
        self.mouse_off(active)
    }

    pub fn is_pressed(&self, keycode: KeyCode) -> bool {
        self.pressed.contains(&keycode) || self.mouse_active == Some(keycode)
    }

    pub fn held_keys(&self) -> usize {
        self.pressed.len()
    }

    pub fn white_keys(&self) -> impl Iterator<Item = &'static KeyBinding> {
        KEY_BINDINGS.iter().filter(|binding| !binding.is_black())
    }

    pub fn black_keys(&self) -> impl Iterator<Item = &'static KeyBinding> {
        KEY_BINDINGS.iter().filter(|binding| binding.is_black())
    }
}

pub fn black_key_offset(note: &str) -> f32 {
    let half_black = BLACK_KEY_WIDTH / 2.0;
    let seam = match note {
        "C#4" => 1.0,
        "D#4" => 2.0,
        "F#4" => 4.0,
        "G#4" => 5.0,
        "A#4" => 6.0,
        _ => return 0.0,
    };
    WHITE_KEY_WIDTH * seam - half_black
}

pub struct KeyVisual {
    pub rect: Rect,
    pub binding: KeyBinding,
}

pub struct KeyboardLayout {
    pub white: Vec<KeyVisual>,
    pub black: Vec<KeyVisual>,
}

impl KeyboardLayout {
    pub fn build(controller: &KeyboardController, origin: Vec2) -> Self {
        let white = controller
            .white_keys()
            .enumerate()
            .map(|(index, binding)| KeyVisual {
                rect: Rect::new(
                    origin.x + index as f32 * WHITE_KEY_WIDTH,
                    origin.y,
                    WHITE_KEY_WIDTH,
                    WHITE_KEY_HEIGHT,
                ),
                binding: *binding,
            })
            .collect();
        let black = controller
            .black_keys()
            .map(|binding| KeyVisual {
                rect: Rect::new(
                    origin.x + black_key_offset(binding.note),
                    origin.y,
                    BLACK_KEY_WIDTH,
                    BLACK_KEY_HEIGHT,
                ),
                binding: *binding,
            })
            .collect();
        Self { white, black }
    }

    pub fn width(&self) -> f32 {
        self.white.len() as f32 * WHITE_KEY_WIDTH
    }

    /// Black keys sit on top, so they win overlapping hits.
    pub fn hit_test(&self, point: Vec2) -> Option<KeyCode> {
        self.black
            .iter()
            .chain(self.white.iter())
            .find(|key| key.rect.contains(point))
            .map(|key| key.binding.keycode)
    }
}
