use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preset encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Please enter a preset name")]
    BlankPresetName,

    #[error("No custom preset at index {0}")]
    PresetIndex(usize),

    #[error("Preset store writer is closed")]
    StoreClosed,

    /// A queued write failed after it was accepted.
    #[error("Preset write failed: {0}")]
    WriteFailed(String),
}
