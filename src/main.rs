use fm_explorer::config::AppConfig;
use fm_explorer::controllers::{KeyboardController, KeyboardLayout, WHITE_KEY_HEIGHT};
use fm_explorer::oscillator::Waveform;
use fm_explorer::output::{AudioEngine, SharedPipeline, SynthPipeline, VoiceDriver, WaveformSampler};
use fm_explorer::presets::PresetCatalog;
use fm_explorer::settings::{SettingsEdit, SettingsField, SettingsStore, SynthSettings};
use fm_explorer::storage::{BackgroundStore, FileStore, KeyValueStore};
use fm_explorer::visualizer::{Schedule, Surface, Visualizer, bin_frequency, compute_spectrum};
use macroquad::{prelude::*, text::measure_text};
use tokio::runtime::Runtime;

const KNOB_SIZE: f32 = 70.0;
const KNOB_DRAG_RATE: f32 = 0.005;
const KNOB_WHEEL_RATE: f32 = 0.03;
const KEY_FONT_SIZE: u16 = 22;
const MAX_SPECTRUM_HZ: f32 = 10_000.0;
const MIN_SPECTRUM_DB: f32 = -80.0;
const MAX_SPECTRUM_DB: f32 = 0.0;
const FALLBACK_SAMPLE_RATE: f32 = 44_100.0;
const DELETE_PROMPT: &str = "Delete this preset?";
const CUSTOM_COLUMNS: usize = 4;
const CUSTOM_ROWS: usize = 3;

const AMBER: Color = Color {
    r: 0.98,
    g: 0.66,
    b: 0.12,
    a: 1.0,
};
const AMBER_DIM: Color = Color {
    r: 0.78,
    g: 0.52,
    b: 0.08,
    a: 0.4,
};
const BACKGROUND: Color = Color {
    r: 0.02,
    g: 0.02,
    b: 0.02,
    a: 1.0,
};
const PANEL: Color = Color {
    r: 0.05,
    g: 0.03,
    b: 0.02,
    a: 0.65,
};

#[macroquad::main(window_conf)]
async fn main() {
    let config = AppConfig::from_env();
    if let Err(err) = tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .try_init()
    {
        eprintln!("logging disabled: {err}");
    }

    let runtime = match Runtime::new() {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            tracing::warn!("tokio runtime unavailable, presets will be written inline: {err}");
            None
        }
    };
    let catalog = open_catalog(&config, runtime.as_ref());
    let mut explorer = Explorer::new(config, catalog);

    loop {
        clear_background(BACKGROUND);
        draw_text_ex(
            "FM SYNTHESIS EXPLORER",
            40.0,
            44.0,
            TextParams {
                font_size: 32,
                color: AMBER,
                ..Default::default()
            },
        );
        let mouse = mouse_position_vec();
        if explorer.driver.is_audio_ready() {
            explorer.synth_frame(mouse);
        } else {
            explorer.init_frame(mouse);
        }
        next_frame().await;
    }
}

fn window_conf() -> Conf {
    let config = AppConfig::from_env();
    Conf {
        window_title: "FM Synthesis Explorer".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: config.window_width,
        window_height: config.window_height,
        high_dpi: false,
        ..Default::default()
    }
}

fn open_catalog(config: &AppConfig, runtime: Option<&Runtime>) -> PresetCatalog {
    let files = FileStore::new(config.preset_dir.clone());
    tracing::info!(dir = %files.dir().display(), "preset storage");
    let store: Box<dyn KeyValueStore> = match runtime {
        Some(runtime) => Box::new(BackgroundStore::spawn(runtime.handle(), files)),
        None => Box::new(files),
    };
    PresetCatalog::open(store)
}

struct ScreenLayout {
    scope: Rect,
    spectrum_toggle: Rect,
    spectrum: Rect,
    presets: Rect,
    keyboard_origin: Vec2,
    info: Rect,
    oscillator: Rect,
    envelope: Rect,
}

impl ScreenLayout {
    fn new() -> Self {
        let keyboard_origin = vec2(40.0, 350.0);
        Self {
            scope: Rect::new(40.0, 70.0, 600.0, 150.0),
            spectrum_toggle: Rect::new(40.0, 228.0, 150.0, 26.0),
            spectrum: Rect::new(40.0, 262.0, 600.0, 70.0),
            presets: Rect::new(680.0, 70.0, 560.0, 262.0),
            keyboard_origin,
            info: Rect::new(560.0, keyboard_origin.y, 680.0, WHITE_KEY_HEIGHT),
            oscillator: Rect::new(40.0, 590.0, 600.0, 180.0),
            envelope: Rect::new(680.0, 590.0, 560.0, 180.0),
        }
    }

    fn oscillator_knobs(&self) -> [(SettingsField, Rect); 3] {
        let mut knobs = [(SettingsField::Harmonicity, Rect::new(0.0, 0.0, 0.0, 0.0)); 3];
        for (index, field) in SettingsField::OSCILLATOR.iter().enumerate() {
            let x = self.oscillator.x + 16.0 + index as f32 * (KNOB_SIZE + 22.0);
            knobs[index] = (*field, Rect::new(x, self.oscillator.y + 40.0, KNOB_SIZE, KNOB_SIZE));
        }
        knobs
    }

    fn envelope_knobs(&self) -> [(SettingsField, Rect); 4] {
        let mut knobs = [(SettingsField::Attack, Rect::new(0.0, 0.0, 0.0, 0.0)); 4];
        let spacing = (self.envelope.w - 32.0 - KNOB_SIZE * 4.0) / 3.0;
        for (index, field) in SettingsField::ENVELOPE.iter().enumerate() {
            let x = self.envelope.x + 16.0 + index as f32 * (KNOB_SIZE + spacing);
            knobs[index] = (*field, Rect::new(x, self.envelope.y + 40.0, KNOB_SIZE, KNOB_SIZE));
        }
        knobs
    }

    fn waveform_selector(&self, row: usize) -> [Rect; 4] {
        let x0 = self.oscillator.x + 300.0;
        let y = self.oscillator.y + 40.0 + row as f32 * 64.0;
        std::array::from_fn(|index| Rect::new(x0 + index as f32 * 72.0, y, 66.0, 26.0))
    }

    fn factory_button(&self, index: usize) -> Rect {
        Rect::new(
            self.presets.x + 12.0 + index as f32 * 108.0,
            self.presets.y + 24.0,
            100.0,
            30.0,
        )
    }

    /// Area below the factory row that holds the scrollable custom grid.
    fn custom_area(&self) -> Rect {
        Rect::new(
            self.presets.x + 12.0,
            self.presets.y + 80.0,
            self.presets.w - 24.0,
            CUSTOM_ROWS as f32 * 38.0,
        )
    }

    fn custom_button(&self, slot: usize) -> Rect {
        let area = self.custom_area();
        let (row, col) = (slot / CUSTOM_COLUMNS, slot % CUSTOM_COLUMNS);
        Rect::new(
            area.x + col as f32 * 136.0,
            area.y + row as f32 * 38.0,
            104.0,
            30.0,
        )
    }

    fn delete_button(&self, slot: usize) -> Rect {
        let button = self.custom_button(slot);
        Rect::new(button.x + button.w + 2.0, button.y + 3.0, 24.0, 24.0)
    }

    fn save_toggle(&self) -> Rect {
        Rect::new(
            self.presets.x + 12.0,
            self.presets.y + self.presets.h - 42.0,
            140.0,
            30.0,
        )
    }

    fn name_field(&self) -> Rect {
        let toggle = self.save_toggle();
        Rect::new(toggle.x, toggle.y, 250.0, toggle.h)
    }

    fn save_button(&self) -> Rect {
        let field = self.name_field();
        Rect::new(field.x + field.w + 10.0, field.y, 100.0, field.h)
    }

    fn cancel_button(&self) -> Rect {
        let save = self.save_button();
        Rect::new(save.x + save.w + 10.0, save.y, 100.0, save.h)
    }
}

fn max_custom_scroll(count: usize) -> usize {
    count.div_ceil(CUSTOM_COLUMNS).saturating_sub(CUSTOM_ROWS)
}

/// Indices into the custom list shown when the grid starts at `scroll` rows.
fn visible_custom(count: usize, scroll: usize) -> std::ops::Range<usize> {
    let start = (scroll.min(max_custom_scroll(count)) * CUSTOM_COLUMNS).min(count);
    start..(start + CUSTOM_COLUMNS * CUSTOM_ROWS).min(count)
}

#[derive(Default)]
struct KnobDragState {
    active_knob: Option<SettingsField>,
    origin_value: f32,
    origin_y: f32,
}

#[derive(Default)]
struct SaveForm {
    open: bool,
    focused: bool,
    name: String,
}

#[derive(Clone, Debug)]
enum Modal {
    Alert(String),
    ConfirmDelete { index: usize },
}

enum PresetAction {
    Load(usize),
    RequestDelete(usize),
    OpenForm,
    Focus,
    Save,
    Cancel,
}

struct Explorer {
    config: AppConfig,
    pipeline: SharedPipeline,
    settings: SettingsStore,
    pushed_revision: u64,
    driver: VoiceDriver,
    controller: KeyboardController,
    catalog: PresetCatalog,
    audio: Option<AudioEngine>,
    visualizer: Option<Visualizer<WaveformSampler>>,
    knob_drag: KnobDragState,
    save_form: SaveForm,
    modal: Option<Modal>,
    show_spectrum: bool,
    preset_scroll: usize,
    status: Option<String>,
}

impl Explorer {
    fn new(config: AppConfig, catalog: PresetCatalog) -> Self {
        let pipeline = SynthPipeline::shared();
        let settings = SettingsStore::new(SynthSettings::default());
        let driver = VoiceDriver::activate(&pipeline, &settings.current());
        Self {
            config,
            pushed_revision: settings.revision(),
            pipeline,
            settings,
            driver,
            controller: KeyboardController::new(),
            catalog,
            audio: None,
            visualizer: None,
            knob_drag: KnobDragState::default(),
            save_form: SaveForm::default(),
            modal: None,
            show_spectrum: false,
            preset_scroll: 0,
            status: None,
        }
    }

    fn init_frame(&mut self, mouse: Vec2) {
        let panel = Rect::new(340.0, 240.0, 600.0, 220.0);
        draw_rectangle(panel.x, panel.y, panel.w, panel.h, PANEL);
        draw_rectangle_lines(panel.x, panel.y, panel.w, panel.h, 4.0, AMBER);
        draw_centered_text(
            "CLICK THE BUTTON BELOW TO INITIALIZE AUDIO",
            Rect::new(panel.x, panel.y + 30.0, panel.w, 30.0),
            20,
        );
        let button = Rect::new(panel.x + panel.w * 0.5 - 130.0, panel.y + 90.0, 260.0, 60.0);
        draw_button(button, "Initialize Audio", false, button.contains(mouse));
        if let Some(status) = &self.status {
            draw_centered_text(status, Rect::new(panel.x, panel.y + 170.0, panel.w, 24.0), 16);
        }
        if is_mouse_button_pressed(MouseButton::Left) && button.contains(mouse) {
            self.initialize_audio();
        }
    }

    fn initialize_audio(&mut self) {
        match AudioEngine::start(self.pipeline.clone()) {
            Ok(engine) => {
                self.driver.set_audio_ready();
                self.visualizer = Some(Visualizer::new(WaveformSampler::attach(
                    &self.pipeline,
                    self.config.scope_size,
                )));
                self.audio = Some(engine);
                self.status = None;
            }
            Err(err) => {
                tracing::error!("audio initialization failed: {err:#}");
                self.status = Some(format!("Audio unavailable: {err}"));
            }
        }
    }

    fn sample_rate(&self) -> f32 {
        self.audio
            .as_ref()
            .map(AudioEngine::sample_rate)
            .unwrap_or(FALLBACK_SAMPLE_RATE)
    }

    fn synth_frame(&mut self, mouse: Vec2) {
        let layout = ScreenLayout::new();
        let keyboard = KeyboardLayout::build(&self.controller, layout.keyboard_origin);
        if let Err(err) = self.catalog.sync_storage() {
            self.status = Some(err.to_string());
        }
        let interactive = self.modal.is_none();
        if !interactive {
            self.handle_modal_input(mouse);
        }

        let mut notes = Vec::new();
        if interactive {
            if self.save_form.focused {
                self.handle_text_input();
            } else {
                while get_char_pressed().is_some() {}
                notes.extend(self.controller.poll());
            }
            notes.extend(self.controller.handle_mouse_keys(
                keyboard.hit_test(mouse),
                is_mouse_button_pressed(MouseButton::Left),
                is_mouse_button_released(MouseButton::Left),
            ));
        }

        draw_section(&layout.oscillator, "OSCILLATOR");
        draw_section(&layout.envelope, "ENVELOPE");
        draw_section(&layout.presets, "PRESETS");
        for (field, rect) in layout.oscillator_knobs() {
            draw_knob_widget(&mut self.knob_drag, field, rect, &mut self.settings, interactive);
        }
        for (field, rect) in layout.envelope_knobs() {
            draw_knob_widget(&mut self.knob_drag, field, rect, &mut self.settings, interactive);
        }
        let current = self.settings.current();
        let carrier = draw_waveform_selector(
            &layout.waveform_selector(0),
            "CARRIER",
            current.carrier_type,
            mouse,
            interactive,
        );
        if let Some(waveform) = carrier.filter(|w| *w != current.carrier_type) {
            self.settings.apply(SettingsEdit::CarrierType(waveform));
        }
        let modulator = draw_waveform_selector(
            &layout.waveform_selector(1),
            "MODULATOR",
            current.modulator_type,
            mouse,
            interactive,
        );
        if let Some(waveform) = modulator.filter(|w| *w != current.modulator_type) {
            self.settings.apply(SettingsEdit::ModulatorType(waveform));
        }
        self.scroll_presets(&layout, mouse, interactive);
        match self.draw_preset_panel(&layout, mouse, interactive) {
            Some(action) => self.apply_preset_action(action),
            None if interactive && is_mouse_button_pressed(MouseButton::Left) => {
                self.save_form.focused = false;
            }
            None => {}
        }

        self.push_settings();
        for event in notes {
            self.driver.handle(event);
        }

        self.draw_scope(&layout, mouse, interactive);
        draw_keyboard(&self.controller, &keyboard);
        self.draw_info(&layout);
        if let Some(modal) = &self.modal {
            draw_modal(modal, mouse);
        }
    }

    fn push_settings(&mut self) {
        if self.settings.revision() != self.pushed_revision {
            self.driver.configure(&self.settings.current());
            self.pushed_revision = self.settings.revision();
        }
    }

    fn release_input(&mut self) {
        let mut events = self.controller.release_held();
        events.extend(self.controller.reset_mouse());
        for event in events {
            self.driver.handle(event);
        }
        self.knob_drag.active_knob = None;
    }

    fn handle_text_input(&mut self) {
        while let Some(ch) = get_char_pressed() {
            if !ch.is_control() {
                self.save_form.name.push(ch);
            }
        }
        if is_key_pressed(KeyCode::Backspace) {
            self.save_form.name.pop();
        }
        if is_key_pressed(KeyCode::Enter) || is_key_pressed(KeyCode::KpEnter) {
            self.save_preset();
        } else if is_key_pressed(KeyCode::Escape) {
            self.save_form = SaveForm::default();
        }
    }

    fn save_preset(&mut self) {
        match self.catalog.save(&self.save_form.name, self.settings.current()) {
            Ok(_) => {
                self.save_form = SaveForm::default();
                self.preset_scroll = max_custom_scroll(self.catalog.custom().len());
            }
            Err(err @ fm_explorer::Error::BlankPresetName) => {
                self.open_modal(Modal::Alert(err.to_string()));
            }
            Err(err) => {
                tracing::error!("failed to save preset: {err}");
                self.status = Some(format!("Could not save preset: {err}"));
            }
        }
    }

    fn open_modal(&mut self, modal: Modal) {
        self.release_input();
        self.modal = Some(modal);
    }

    fn handle_modal_input(&mut self, mouse: Vec2) {
        let Some(modal) = self.modal.clone() else {
            return;
        };
        let (ok, cancel) = modal_buttons();
        let clicked = is_mouse_button_pressed(MouseButton::Left);
        let accepted = is_key_pressed(KeyCode::Enter) || (clicked && ok.contains(mouse));
        let declined = is_key_pressed(KeyCode::Escape) || (clicked && cancel.contains(mouse));
        match modal {
            // The alert's single button sits in the cancel slot.
            Modal::Alert(_) => {
                if is_key_pressed(KeyCode::Enter) || declined {
                    self.modal = None;
                }
            }
            Modal::ConfirmDelete { index } => {
                if accepted || declined {
                    self.modal = None;
                    self.delete_preset(index, accepted);
                }
            }
        }
    }

    fn delete_preset(&mut self, index: usize, confirmed: bool) {
        if let Err(err) = self.catalog.delete(index, |_| confirmed) {
            tracing::error!(index, "failed to delete preset: {err}");
            self.status = Some(format!("Could not delete preset: {err}"));
        }
    }

    fn scroll_presets(&mut self, layout: &ScreenLayout, mouse: Vec2, interactive: bool) {
        let max = max_custom_scroll(self.catalog.custom().len());
        let (_x, wheel) = mouse_wheel();
        if interactive && layout.custom_area().contains(mouse) {
            if wheel > 0.0 {
                self.preset_scroll = self.preset_scroll.saturating_sub(1);
            } else if wheel < 0.0 {
                self.preset_scroll += 1;
            }
        }
        self.preset_scroll = self.preset_scroll.min(max);
    }

    fn draw_preset_panel(
        &self,
        layout: &ScreenLayout,
        mouse: Vec2,
        interactive: bool,
    ) -> Option<PresetAction> {
        let clicked = interactive && is_mouse_button_pressed(MouseButton::Left);
        let current = self.settings.current();
        let mut action = None;
        draw_group_label("FACTORY", layout.presets.x + 12.0, layout.presets.y + 18.0);
        for (index, preset) in self.catalog.factory().iter().enumerate() {
            let rect = layout.factory_button(index);
            let hovered = interactive && rect.contains(mouse);
            draw_button(rect, &preset.name, preset.settings == current, hovered);
            if clicked && rect.contains(mouse) {
                action = Some(PresetAction::Load(index));
            }
        }

        let factory = self.catalog.factory().len();
        let custom = self.catalog.custom();
        let area = layout.custom_area();
        let visible = visible_custom(custom.len(), self.preset_scroll);
        let heading = if custom.len() > visible.len() {
            format!("CUSTOM  {}-{} OF {}", visible.start + 1, visible.end, custom.len())
        } else {
            "CUSTOM".to_string()
        };
        draw_group_label(&heading, area.x, area.y - 6.0);
        if custom.is_empty() {
            draw_centered_text_colored("NO CUSTOM PRESETS SAVED", area, 16, AMBER_DIM);
        }
        for (slot, index) in visible.enumerate() {
            let preset = &custom[index];
            let rect = layout.custom_button(slot);
            let hovered = interactive && rect.contains(mouse);
            draw_button(rect, &preset.name, preset.settings == current, hovered);
            if clicked && rect.contains(mouse) {
                action = Some(PresetAction::Load(factory + index));
            }
            let delete = layout.delete_button(slot);
            draw_button(delete, "X", false, interactive && delete.contains(mouse));
            if clicked && delete.contains(mouse) {
                action = Some(PresetAction::RequestDelete(index));
            }
        }

        if self.save_form.open {
            let field = layout.name_field();
            draw_text_field(field, &self.save_form.name, self.save_form.focused);
            let save = layout.save_button();
            let cancel = layout.cancel_button();
            draw_button(save, "SAVE", false, interactive && save.contains(mouse));
            draw_button(cancel, "CANCEL", false, interactive && cancel.contains(mouse));
            if clicked {
                if field.contains(mouse) {
                    action = Some(PresetAction::Focus);
                } else if save.contains(mouse) {
                    action = Some(PresetAction::Save);
                } else if cancel.contains(mouse) {
                    action = Some(PresetAction::Cancel);
                }
            }
        } else {
            let toggle = layout.save_toggle();
            draw_button(toggle, "SAVE CURRENT", false, interactive && toggle.contains(mouse));
            if clicked && toggle.contains(mouse) {
                action = Some(PresetAction::OpenForm);
            }
        }

        action
    }

    fn apply_preset_action(&mut self, action: PresetAction) {
        match action {
            PresetAction::Load(index) => {
                let loaded = self
                    .catalog
                    .list()
                    .get(index)
                    .map(|preset| self.catalog.load(preset));
                if let Some(settings) = loaded {
                    self.settings.replace(settings);
                }
                self.save_form.focused = false;
            }
            PresetAction::RequestDelete(index) => {
                self.save_form.focused = false;
                self.open_modal(Modal::ConfirmDelete { index });
            }
            PresetAction::OpenForm => {
                self.save_form.open = true;
                self.save_form.focused = true;
                self.release_input();
            }
            PresetAction::Focus => {
                if !self.save_form.focused {
                    self.save_form.focused = true;
                    self.release_input();
                }
            }
            PresetAction::Save => self.save_preset(),
            PresetAction::Cancel => self.save_form = SaveForm::default(),
        }
    }

    fn draw_scope(&mut self, layout: &ScreenLayout, mouse: Vec2, interactive: bool) {
        let scope = layout.scope;
        draw_rectangle(scope.x, scope.y, scope.w, scope.h, PANEL);
        let mut surface = ScreenSurface { rect: scope };
        let stopped = match self.visualizer.as_mut() {
            Some(visualizer) => visualizer.tick(&mut surface) == Schedule::Stopped,
            None => false,
        };
        if stopped {
            self.visualizer = None;
        }
        draw_rectangle_lines(scope.x, scope.y, scope.w, scope.h, 1.0, AMBER);

        let toggle = layout.spectrum_toggle;
        let label = if self.show_spectrum {
            "SPECTRUM ON"
        } else {
            "SPECTRUM OFF"
        };
        draw_button(toggle, label, self.show_spectrum, interactive && toggle.contains(mouse));
        if interactive && is_mouse_button_pressed(MouseButton::Left) && toggle.contains(mouse) {
            self.show_spectrum = !self.show_spectrum;
        }
        if self.show_spectrum {
            let spectrum = self
                .visualizer
                .as_ref()
                .map(|visualizer| compute_spectrum(visualizer.last_buffer()))
                .unwrap_or_default();
            draw_spectrum(layout.spectrum, &spectrum, self.sample_rate());
        }
    }

    fn draw_info(&self, layout: &ScreenLayout) {
        let rect = layout.info;
        let notes = self
            .pipeline
            .lock()
            .ok()
            .and_then(|bus| bus.synth().map(|synth| synth.active_notes()))
            .unwrap_or_default();
        let current = self.settings.current();
        draw_text_block(
            rect.x + 16.0,
            rect.y + 24.0,
            &format!(
                "PLAY  A W S E D F T G Y H U J K\nVOICES {}\nSOUNDING {}\nRATIO 1:{:.2}  INDEX {:.1}\nSAMPLE RATE {:.0} Hz",
                notes.len(),
                if notes.is_empty() {
                    "-".to_string()
                } else {
                    notes.join(" ")
                },
                current.harmonicity,
                current.modulation_index,
                self.sample_rate(),
            ),
        );
        if let Some(status) = &self.status {
            draw_text_block(rect.x + 16.0, rect.y + rect.h - 12.0, status);
        }
    }
}

struct ScreenSurface {
    rect: Rect,
}

impl Surface for ScreenSurface {
    fn width(&self) -> f32 {
        self.rect.w
    }

    fn height(&self) -> f32 {
        self.rect.h
    }

    fn clear(&mut self) {
        draw_rectangle(self.rect.x, self.rect.y, self.rect.w, self.rect.h, BACKGROUND);
    }

    fn polyline(&mut self, points: &[(f32, f32)], thickness: f32) {
        for pair in points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            draw_line(
                self.rect.x + x0,
                self.rect.y + y0,
                self.rect.x + x1,
                self.rect.y + y1,
                thickness,
                AMBER,
            );
        }
    }

    fn dashed_line(&mut self, from: (f32, f32), to: (f32, f32), dash: f32, gap: f32, thickness: f32) {
        let start = vec2(from.0, from.1);
        let end = vec2(to.0, to.1);
        let length = start.distance(end);
        if length <= 0.0 || dash <= 0.0 {
            return;
        }
        let direction = (end - start) / length;
        let mut offset = 0.0;
        while offset < length {
            let a = start + direction * offset;
            let b = start + direction * (offset + dash).min(length);
            draw_line(
                self.rect.x + a.x,
                self.rect.y + a.y,
                self.rect.x + b.x,
                self.rect.y + b.y,
                thickness,
                AMBER_DIM,
            );
            offset += dash + gap;
        }
    }
}

fn mouse_position_vec() -> Vec2 {
    let (x, y) = mouse_position();
    vec2(x, y)
}

fn draw_section(rect: &Rect, label: &str) {
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, PANEL);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    draw_text_ex(
        label,
        rect.x + 6.0,
        rect.y - 6.0,
        TextParams {
            font_size: 18,
            color: AMBER,
            ..Default::default()
        },
    );
}

fn draw_group_label(label: &str, x: f32, y: f32) {
    draw_text_ex(
        label,
        x,
        y,
        TextParams {
            font_size: 14,
            color: AMBER_DIM,
            ..Default::default()
        },
    );
}

fn draw_text_block(x: f32, mut y: f32, text: &str) {
    for line in text.lines() {
        draw_text_ex(
            line,
            x,
            y,
            TextParams {
                font_size: 18,
                color: AMBER,
                ..Default::default()
            },
        );
        y += 22.0;
    }
}

fn draw_centered_text(text: &str, rect: Rect, size: u16) {
    draw_centered_text_colored(text, rect, size, AMBER);
}

fn draw_centered_text_colored(text: &str, rect: Rect, size: u16, color: Color) {
    let measure = measure_text(text, None, size, 1.0);
    let x = rect.x + rect.w * 0.5 - measure.width * 0.5;
    let y = rect.y + rect.h * 0.5 + measure.height * 0.5;
    draw_text_ex(
        text,
        x,
        y,
        TextParams {
            font_size: size,
            color,
            ..Default::default()
        },
    );
}

fn draw_button(rect: Rect, label: &str, active: bool, hovered: bool) {
    let fill = if active {
        AMBER
    } else if hovered {
        Color::new(0.3, 0.2, 0.07, 0.9)
    } else {
        Color::new(0.08, 0.05, 0.03, 1.0)
    };
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, fill);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    let text = if active { BACKGROUND } else { AMBER };
    draw_centered_text_colored(label, rect, 16, text);
}

fn draw_text_field(rect: Rect, text: &str, focused: bool) {
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, BACKGROUND);
    let border = if focused { 2.0 } else { 1.0 };
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, border, AMBER);
    let size = 18;
    let visible = visible_tail(text, rect.w - 16.0, size);
    let shown = if focused && (get_time() * 2.0) as u64 % 2 == 0 {
        format!("{visible}_")
    } else {
        visible.to_string()
    };
    if text.is_empty() && !focused {
        draw_text_ex(
            "Preset name",
            rect.x + 8.0,
            rect.y + rect.h * 0.5 + 6.0,
            TextParams {
                font_size: size,
                color: AMBER_DIM,
                ..Default::default()
            },
        );
        return;
    }
    draw_text_ex(
        &shown,
        rect.x + 8.0,
        rect.y + rect.h * 0.5 + 6.0,
        TextParams {
            font_size: size,
            color: AMBER,
            ..Default::default()
        },
    );
}

/// Longest suffix of `text` that fits in `width`.
fn visible_tail(text: &str, width: f32, size: u16) -> &str {
    let mut start = 0;
    while start < text.len() && measure_text(&text[start..], None, size, 1.0).width > width {
        start += text[start..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    &text[start..]
}

fn draw_knob_widget(
    knob_drag: &mut KnobDragState,
    field: SettingsField,
    rect: Rect,
    settings: &mut SettingsStore,
    interactive: bool,
) {
    let range = field.range();
    let value = settings.current().value(field);
    if interactive {
        if let Some(unit) = handle_knob_drag(knob_drag, field, rect, range.to_unit(value)) {
            let next = range.from_unit(unit);
            if next != value {
                settings.apply(field.edit(next));
            }
        }
    }
    let value = settings.current().value(field);
    let center = vec2(rect.x + rect.w * 0.5, rect.y + rect.h * 0.5);
    let radius = rect.w.min(rect.h) * 0.35;
    draw_circle(center.x, center.y, radius + 6.0, Color::new(0.05, 0.03, 0.02, 1.0));
    draw_circle(center.x, center.y, radius, Color::new(0.12, 0.12, 0.12, 1.0));
    draw_circle(center.x, center.y, radius * 0.65, Color::new(0.2, 0.2, 0.2, 1.0));
    draw_circle_lines(center.x, center.y, radius + 6.0, 1.0, AMBER_DIM);
    let start_angle = -150.0f32.to_radians();
    let angle_range = 300.0f32.to_radians();
    let theta = start_angle + range.to_unit(value) * angle_range;
    let pointer = vec2(theta.cos(), theta.sin()) * radius * 0.8;
    draw_line(
        center.x,
        center.y,
        center.x + pointer.x,
        center.y + pointer.y,
        3.0,
        AMBER,
    );
    draw_centered_text(
        &field.display(value),
        Rect::new(rect.x, rect.y - 12.0, rect.w, 20.0),
        14,
    );
    draw_centered_text(
        field.label(),
        Rect::new(rect.x, rect.y + rect.h + 4.0, rect.w, 18.0),
        16,
    );
}

/// New knob position in [0, 1] when the knob is dragged or scrolled.
fn handle_knob_drag(
    knob_drag: &mut KnobDragState,
    field: SettingsField,
    rect: Rect,
    unit: f32,
) -> Option<f32> {
    let mouse = mouse_position_vec();
    let mut next = None;
    if is_mouse_button_pressed(MouseButton::Left) && rect.contains(mouse) {
        knob_drag.active_knob = Some(field);
        knob_drag.origin_value = unit;
        knob_drag.origin_y = mouse.y;
    }
    if knob_drag.active_knob == Some(field) {
        if is_mouse_button_down(MouseButton::Left) {
            let delta = (knob_drag.origin_y - mouse.y) * KNOB_DRAG_RATE;
            next = Some((knob_drag.origin_value + delta).clamp(0.0, 1.0));
        } else {
            knob_drag.active_knob = None;
        }
    }
    let (_x, wheel) = mouse_wheel();
    if rect.contains(mouse) && wheel.abs() > f32::EPSILON {
        next = Some((unit + wheel * KNOB_WHEEL_RATE).clamp(0.0, 1.0));
    }
    next
}

fn draw_waveform_selector(
    rects: &[Rect; 4],
    label: &str,
    selected: Waveform,
    mouse: Vec2,
    interactive: bool,
) -> Option<Waveform> {
    draw_text_ex(
        label,
        rects[0].x,
        rects[0].y - 6.0,
        TextParams {
            font_size: 14,
            color: AMBER_DIM,
            ..Default::default()
        },
    );
    let clicked = interactive && is_mouse_button_pressed(MouseButton::Left);
    let mut choice = None;
    for (rect, waveform) in rects.iter().zip(Waveform::VALUES) {
        let hovered = interactive && rect.contains(mouse);
        draw_button(*rect, waveform.label(), waveform == selected, hovered);
        if clicked && rect.contains(mouse) {
            choice = Some(waveform);
        }
    }
    choice
}

fn draw_keyboard(controller: &KeyboardController, layout: &KeyboardLayout) {
    for key in &layout.white {
        let active = controller.is_pressed(key.binding.keycode);
        let fill = if active {
            AMBER
        } else {
            Color::new(0.85, 0.82, 0.75, 1.0)
        };
        draw_rectangle(key.rect.x, key.rect.y, key.rect.w, key.rect.h, fill);
        draw_rectangle_lines(key.rect.x, key.rect.y, key.rect.w, key.rect.h, 2.0, BACKGROUND);
        draw_key_label(key.rect, key.binding.label, key.binding.note, BACKGROUND);
    }
    for key in &layout.black {
        let active = controller.is_pressed(key.binding.keycode);
        let fill = if active {
            AMBER
        } else {
            Color::new(0.08, 0.05, 0.03, 1.0)
        };
        draw_rectangle(key.rect.x, key.rect.y, key.rect.w, key.rect.h, fill);
        draw_rectangle_lines(key.rect.x, key.rect.y, key.rect.w, key.rect.h, 1.0, AMBER_DIM);
        let text = if active { BACKGROUND } else { AMBER };
        draw_key_label(key.rect, key.binding.label, key.binding.note, text);
    }
}

fn draw_key_label(rect: Rect, label: &str, note: &str, color: Color) {
    draw_centered_text_colored(
        label,
        Rect::new(rect.x, rect.y + rect.h - 48.0, rect.w, 20.0),
        KEY_FONT_SIZE,
        color,
    );
    draw_centered_text_colored(
        note,
        Rect::new(rect.x, rect.y + rect.h - 24.0, rect.w, 16.0),
        12,
        color,
    );
}

fn draw_spectrum(rect: Rect, spectrum: &[f32], sample_rate: f32) {
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, PANEL);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    let mut prev = None;
    for (bin, magnitude) in spectrum.iter().enumerate() {
        let freq = bin_frequency(bin, spectrum.len(), sample_rate);
        if freq > MAX_SPECTRUM_HZ {
            break;
        }
        let x = rect.x + (freq / MAX_SPECTRUM_HZ) * rect.w;
        let db = 20.0 * magnitude.max(1e-6).log10();
        let normalized =
            ((db - MIN_SPECTRUM_DB) / (MAX_SPECTRUM_DB - MIN_SPECTRUM_DB)).clamp(0.0, 1.0);
        let y = rect.y + rect.h - normalized * rect.h;
        if let Some((px, py)) = prev {
            draw_line(px, py, x, y, 1.5, AMBER);
        }
        prev = Some((x, y));
    }
    for freq in [0.0, 2_500.0, 5_000.0, 7_500.0, 10_000.0] {
        let x = rect.x + (freq / MAX_SPECTRUM_HZ) * rect.w;
        draw_line(x, rect.y, x, rect.y + rect.h, 0.5, AMBER_DIM);
        draw_text_ex(
            &format!("{:.1}k", freq / 1000.0),
            x + 2.0,
            rect.y + 12.0,
            TextParams {
                font_size: 12,
                color: AMBER_DIM,
                ..Default::default()
            },
        );
    }
}

fn modal_rect() -> Rect {
    Rect::new(440.0, 300.0, 400.0, 160.0)
}

fn modal_buttons() -> (Rect, Rect) {
    let rect = modal_rect();
    let y = rect.y + rect.h - 50.0;
    (
        Rect::new(rect.x + rect.w - 230.0, y, 100.0, 32.0),
        Rect::new(rect.x + rect.w - 120.0, y, 100.0, 32.0),
    )
}

fn draw_modal(modal: &Modal, mouse: Vec2) {
    draw_rectangle(0.0, 0.0, screen_width(), screen_height(), Color::new(0.0, 0.0, 0.0, 0.6));
    let rect = modal_rect();
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, BACKGROUND);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 2.0, AMBER);
    let (ok, cancel) = modal_buttons();
    let message = match modal {
        Modal::Alert(message) => message.as_str(),
        Modal::ConfirmDelete { .. } => DELETE_PROMPT,
    };
    draw_centered_text(message, Rect::new(rect.x, rect.y + 30.0, rect.w, 30.0), 20);
    match modal {
        Modal::Alert(_) => draw_button(cancel, "OK", false, cancel.contains(mouse)),
        Modal::ConfirmDelete { .. } => {
            draw_button(ok, "OK", false, ok.contains(mouse));
            draw_button(cancel, "CANCEL", false, cancel.contains(mouse));
        }
    }
}
