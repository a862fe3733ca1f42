use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// A write that failed after `set` returned, if one is pending.
    fn take_error(&self) -> Option<Error> {
        None
    }
}

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Staged next to the target, then renamed over it.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

enum StoreCommand {
    Write { key: String, value: String },
    Flush(oneshot::Sender<()>),
}

/// Reads go straight to the inner store; writes are queued.
pub struct BackgroundStore<S> {
    inner: Arc<S>,
    commands: mpsc::UnboundedSender<StoreCommand>,
    failure: Arc<Mutex<Option<String>>>,
}

impl<S: KeyValueStore + 'static> BackgroundStore<S> {
    pub fn spawn(runtime: &Handle, inner: S) -> Self {
        let inner = Arc::new(inner);
        let (commands, mut rx) = mpsc::unbounded_channel();
        let writer = inner.clone();
        let failure = Arc::new(Mutex::new(None));
        let report = failure.clone();
        runtime.spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    StoreCommand::Write { key, value } => {
                        let store = writer.clone();
                        let bytes = value.len();
                        let result =
                            tokio::task::spawn_blocking(move || store.set(&key, &value)).await;
                        let message = match result {
                            Ok(Ok(())) => {
                                tracing::debug!(bytes, "presets written");
                                continue;
                            }
                            Ok(Err(err)) => err.to_string(),
                            Err(err) => err.to_string(),
                        };
                        tracing::error!("failed to write presets: {message}");
                        *report.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
                    }
                    StoreCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            tracing::debug!("preset writer stopped");
        });
        Self {
            inner,
            commands,
            failure,
        }
    }

    /// Resolves once every write queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(StoreCommand::Flush(ack))
            .map_err(|_| Error::StoreClosed)?;
        done.await.map_err(|_| Error::StoreClosed)
    }
}

impl<S: KeyValueStore + 'static> KeyValueStore for BackgroundStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.commands
            .send(StoreCommand::Write {
                key: key.to_string(),
                value: value.to_string(),
            })
            .map_err(|_| Error::StoreClosed)
    }

    fn take_error(&self) -> Option<Error> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(Error::WriteFailed)
    }
}
