use crate::AnchorDescriptor;
use std::fmt;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "store io error: {}", err),
            StoreError::Json(err) => write!(f, "store json error: {}", err),
            StoreError::Unavailable(message) => write!(f, "store unavailable: {}", message),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Json(err) => Some(err),
            StoreError::Unavailable(_) => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(value: io::Error) -> Self {
        StoreError::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Json(value)
    }
}

/// Persistence collaborator for anchor descriptors.
///
/// Records are partitioned by exact `url` match. `save` upserts by `id`.
pub trait AnnotationStore {
    fn save(&self, descriptor: &AnchorDescriptor) -> Result<(), StoreError>;
    fn get_all_for_url(&self, url: &str) -> Result<Vec<AnchorDescriptor>, StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

fn upsert(records: &mut Vec<AnchorDescriptor>, descriptor: &AnchorDescriptor) {
    if let Some(existing) = records.iter_mut().find(|d| d.id == descriptor.id) {
        *existing = descriptor.clone();
    } else {
        records.push(descriptor.clone());
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<AnchorDescriptor>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnnotationStore for MemoryStore {
    fn save(&self, descriptor: &AnchorDescriptor) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        upsert(&mut records, descriptor);
        Ok(())
    }

    fn get_all_for_url(&self, url: &str) -> Result<Vec<AnchorDescriptor>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(records.iter().filter(|d| d.url == url).cloned().collect())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        records.retain(|d| d.id != id);
        Ok(())
    }
}

/// Store backed by a single JSON array file. A missing file reads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<AnchorDescriptor>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("annotations.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    // Readers only ever see the old array or the new one: the records go to a
    // sibling file that is renamed over the store once fully written.
    fn write_all(&self, records: &[AnchorDescriptor]) -> Result<(), StoreError> {
        let staging = self.staging_path();
        let file = File::create(&staging)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn locked<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".to_string()))?;
        f(self)
    }
}

impl AnnotationStore for JsonFileStore {
    fn save(&self, descriptor: &AnchorDescriptor) -> Result<(), StoreError> {
        self.locked(|store| {
            let mut records = store.read_all()?;
            upsert(&mut records, descriptor);
            store.write_all(&records)
        })
    }

    fn get_all_for_url(&self, url: &str) -> Result<Vec<AnchorDescriptor>, StoreError> {
        self.locked(|store| {
            let records = store.read_all()?;
            Ok(records.into_iter().filter(|d| d.url == url).collect())
        })
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.locked(|store| {
            let mut records = store.read_all()?;
            let before = records.len();
            records.retain(|d| d.id != id);
            if records.len() == before {
                return Ok(());
            }
            store.write_all(&records)
        })
    }
}
