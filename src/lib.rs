pub mod config;
pub mod controllers;
pub mod envelope;
pub mod error;
pub mod oscillator;
pub mod output;
pub mod presets;
pub mod settings;
pub mod storage;
pub mod visualizer;
pub mod voice;

pub use error::{Error, Result};
