use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustfft::{FftPlanner, num_complex::Complex};

use crate::output::WaveformSource;

pub const WAVEFORM_LINE_WIDTH: f32 = 4.0;
pub const CENTERLINE_WIDTH: f32 = 2.0;
pub const CENTERLINE_DASH: f32 = 10.0;
pub const CENTERLINE_GAP: f32 = 5.0;

pub trait Surface {
    fn width(&self) -> f32;
    fn height(&self) -> f32;
    fn clear(&mut self);
    fn polyline(&mut self, points: &[(f32, f32)], thickness: f32);
    fn dashed_line(&mut self, from: (f32, f32), to: (f32, f32), dash: f32, gap: f32, thickness: f32);
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Pending,
    Drawing,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    Next,
    Stopped,
}

pub struct Visualizer<S: WaveformSource> {
    source: S,
    token: CancelToken,
    state: RenderState,
    last_buffer: Vec<f32>,
    passes: u64,
}

impl<S: WaveformSource> Visualizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            token: CancelToken::default(),
            state: RenderState::Pending,
            last_buffer: Vec::new(),
            passes: 0,
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn last_buffer(&self) -> &[f32] {
        &self.last_buffer
    }

    pub fn tick(&mut self, surface: &mut dyn Surface) -> Schedule {
        if self.token.is_cancelled() {
            self.stop();
            return Schedule::Stopped;
        }
        match self.source.latest() {
            Some(buffer) if !buffer.is_empty() => {
                self.state = RenderState::Drawing;
                draw_waveform(surface, &buffer);
                self.last_buffer = buffer;
                self.passes += 1;
            }
            _ => {}
        }
        if self.token.is_cancelled() {
            self.stop();
            return Schedule::Stopped;
        }
        Schedule::Next
    }

    /// Cancels the loop and releases the tap. There is no restart.
    pub fn teardown(&mut self) {
        self.token.cancel();
        self.stop();
    }

    fn stop(&mut self) {
        if self.state != RenderState::Stopped {
            self.source.release();
            self.state = RenderState::Stopped;
            tracing::debug!(passes = self.passes, "visualizer stopped");
        }
    }
}

impl<S: WaveformSource> Drop for Visualizer<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Polyline of `(s + 1) / 2` scaled to the surface, closed to the right
/// edge's midpoint, then a dashed centerline.
pub fn draw_waveform(surface: &mut dyn Surface, samples: &[f32]) {
    let width = surface.width();
    let height = surface.height();
    surface.clear();

    let slice = width / samples.len().max(1) as f32;
    let mut points: Vec<(f32, f32)> = samples
        .iter()
        .enumerate()
        .map(|(index, sample)| (index as f32 * slice, (sample + 1.0) / 2.0 * height))
        .collect();
    points.push((width, height / 2.0));
    surface.polyline(&points, WAVEFORM_LINE_WIDTH);

    surface.dashed_line(
        (0.0, height / 2.0),
        (width, height / 2.0),
        CENTERLINE_DASH,
        CENTERLINE_GAP,
        CENTERLINE_WIDTH,
    );
}

/// Magnitude spectrum of `samples`, one bin per entry up to Nyquist.
pub fn compute_spectrum(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let size = samples.len().next_power_of_two().max(8);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(size);
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (idx, value) in samples.iter().enumerate().take(size) {
        // Hann window
        let window = 0.5 - 0.5 * (std::f32::consts::TAU * idx as f32 / size as f32).cos();
        buffer[idx].re = *value * window;
    }
    fft.process(&mut buffer);
    buffer[..size / 2]
        .iter()
        .map(|c| c.norm() * 2.0 / size as f32)
        .collect()
}

pub fn bin_frequency(bin: usize, bins: usize, sample_rate: f32) -> f32 {
    if bins == 0 {
        return 0.0;
    }
    bin as f32 * sample_rate * 0.5 / bins as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct Recording {
        clears: usize,
        polylines: Vec<Vec<(f32, f32)>>,
        dashes: Vec<((f32, f32), (f32, f32), f32, f32)>,
    }

    impl Surface for Recording {
        fn width(&self) -> f32 {
            600.0
        }

        fn height(&self) -> f32 {
            150.0
        }

        fn clear(&mut self) {
            self.clears += 1;
        }

        fn polyline(&mut self, points: &[(f32, f32)], _thickness: f32) {
            self.polylines.push(points.to_vec());
        }

        fn dashed_line(&mut self, from: (f32, f32), to: (f32, f32), dash: f32, gap: f32, _: f32) {
            self.dashes.push((from, to, dash, gap));
        }
    }

    #[derive(Clone, Default)]
    struct FakeSource {
        buffers: Rc<RefCell<Vec<Option<Vec<f32>>>>>,
        released: Rc<Cell<usize>>,
    }

    impl FakeSource {
        fn queue(&self, buffer: Option<Vec<f32>>) {
            self.buffers.borrow_mut().push(buffer);
        }
    }

    impl WaveformSource for FakeSource {
        fn latest(&self) -> Option<Vec<f32>> {
            let mut buffers = self.buffers.borrow_mut();
            if buffers.is_empty() {
                None
            } else {
                buffers.remove(0)
            }
        }

        fn release(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    #[test]
    fn stays_pending_without_a_buffer_but_keeps_scheduling() {
        let source = FakeSource::default();
        let mut visualizer = Visualizer::new(source.clone());
        let mut surface = Recording::default();
        for _ in 0..3 {
            assert_eq!(visualizer.tick(&mut surface), Schedule::Next);
        }
        assert_eq!(visualizer.state(), RenderState::Pending);
        assert_eq!(surface.clears, 0);
        assert!(surface.polylines.is_empty());
    }

    #[test]
    fn one_pass_per_available_buffer() {
        let source = FakeSource::default();
        source.queue(Some(vec![0.0; 1024]));
        source.queue(None);
        source.queue(Some(vec![0.5; 1024]));
        let mut visualizer = Visualizer::new(source.clone());
        let mut surface = Recording::default();
        for _ in 0..4 {
            visualizer.tick(&mut surface);
        }
        assert_eq!(visualizer.passes(), 2);
        assert_eq!(surface.clears, 2);
        assert_eq!(surface.polylines.len(), 2);
        assert_eq!(surface.dashes.len(), 2);
        assert_eq!(visualizer.state(), RenderState::Drawing);
        assert_eq!(visualizer.last_buffer(), vec![0.5; 1024].as_slice());
    }

    #[test]
    fn polyline_maps_samples_across_the_surface() {
        let mut surface = Recording::default();
        let mut samples = vec![0.0; 1024];
        samples[0] = -1.0;
        samples[512] = 1.0;
        draw_waveform(&mut surface, &samples);

        let points = &surface.polylines[0];
        assert_eq!(points.len(), 1025);
        assert_eq!(points[0], (0.0, 0.0));
        assert_relative_eq!(points[512].0, 300.0);
        assert_relative_eq!(points[512].1, 150.0);
        assert_relative_eq!(points[1].1, 75.0);
        assert_eq!(points[1024], (600.0, 75.0));
        assert_eq!(surface.dashes[0], ((0.0, 75.0), (600.0, 75.0), 10.0, 5.0));
    }

    #[test]
    fn no_draws_after_teardown() {
        let source = FakeSource::default();
        let mut visualizer = Visualizer::new(source.clone());
        let mut surface = Recording::default();
        source.queue(Some(vec![0.1; 1024]));
        assert_eq!(visualizer.tick(&mut surface), Schedule::Next);

        visualizer.teardown();
        source.queue(Some(vec![0.2; 1024]));
        for _ in 0..3 {
            assert_eq!(visualizer.tick(&mut surface), Schedule::Stopped);
        }
        assert_eq!(surface.polylines.len(), 1);
        assert_eq!(visualizer.state(), RenderState::Stopped);
        assert_eq!(source.released.get(), 1);
    }

    #[test]
    fn external_cancel_stops_the_loop() {
        let source = FakeSource::default();
        let mut visualizer = Visualizer::new(source.clone());
        let token = visualizer.token();
        let mut surface = Recording::default();
        token.cancel();
        source.queue(Some(vec![0.0; 1024]));
        assert_eq!(visualizer.tick(&mut surface), Schedule::Stopped);
        assert!(surface.polylines.is_empty());
        drop(visualizer);
        assert_eq!(source.released.get(), 1);
    }

    #[test]
    fn spectrum_peaks_at_the_tone_bin() {
        let sample_rate = 1024.0;
        let samples: Vec<f32> = (0..1024)
            .map(|n| (std::f32::consts::TAU * 64.0 * n as f32 / sample_rate).sin())
            .collect();
        let spectrum = compute_spectrum(&samples);
        assert_eq!(spectrum.len(), 512);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();
        assert_eq!(peak, 64);
        assert_relative_eq!(bin_frequency(peak, spectrum.len(), sample_rate), 64.0);
    }
}
