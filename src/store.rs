//! Contact book storage
//!
//! [`ContactBook`] keeps the ordered list of contacts in memory and writes the
//! whole list through a [`SnapshotStore`] backend. Contacts are addressed by
//! their position in the list, so removing one shifts every later id down by
//! one.
//!
//! Two backends are provided:
//! - [`FileSnapshot`]: JSON file on disk, replaced atomically on every save
//! - [`MemorySnapshot`]: in-process bytes, used for ephemeral runs and tests

use crate::contact::Contact;
use crate::error::AppError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SNAPSHOT_VERSION: u32 = 1;

/// Persistence backend for the full contact list.
pub trait SnapshotStore: Send {
    /// Read the last saved list. A backend that has never been written
    /// returns an empty list.
    fn read(&self) -> Result<Vec<Contact>, AppError>;

    /// Replace the saved list with `contacts`.
    fn write(&mut self, contacts: &[Contact]) -> Result<(), AppError>;

    /// Short human readable location, used in log lines.
    fn describe(&self) -> String;
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    contacts: &'a [Contact],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    contacts: Vec<Contact>,
}

fn encode(contacts: &[Contact]) -> Result<Vec<u8>, AppError> {
    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        contacts,
    };
    Ok(serde_json::to_vec_pretty(&snapshot)?)
}

fn decode(bytes: &[u8]) -> Result<Vec<Contact>, AppError> {
    let snapshot: Snapshot = serde_json::from_slice(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(AppError::Snapshot(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    Ok(snapshot.contacts)
}

/// JSON snapshot file.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "contacts".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshot {
    fn read(&self) -> Result<Vec<Contact>, AppError> {
        match fs::read(&self.path) {
            Ok(bytes) => decode(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", self.path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, contacts: &[Contact]) -> Result<(), AppError> {
        let bytes = encode(contacts)?;
        let temp = self.temp_path();

        let result = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp, &self.path));

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(
            "Wrote {} contacts ({} bytes) to {}",
            contacts.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process snapshot. Holds the serialized bytes of the last write so a
/// read goes through the same encoding as the file backend.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    bytes: Option<Vec<u8>>,
    fail_writes: bool,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with raw snapshot bytes, valid or not.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            fail_writes: false,
        }
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }
}

impl SnapshotStore for MemorySnapshot {
    fn read(&self) -> Result<Vec<Contact>, AppError> {
        match &self.bytes {
            Some(bytes) => decode(bytes),
            None => Ok(Vec::new()),
        }
    }

    fn write(&mut self, contacts: &[Contact]) -> Result<(), AppError> {
        if self.fail_writes {
            return Err(std::io::Error::other("memory snapshot is read-only").into());
        }
        self.bytes = Some(encode(contacts)?);
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

/// Ordered contact list bound to a snapshot backend.
pub struct ContactBook {
    contacts: Vec<Contact>,
    backend: Box<dyn SnapshotStore>,
}

/// Handle shared between request handlers.
pub type SharedBook = Arc<Mutex<ContactBook>>;

impl ContactBook {
    /// Load the saved list from `backend`. Any read failure is logged and the
    /// book starts empty.
    pub fn load(backend: Box<dyn SnapshotStore>) -> Self {
        let contacts = match backend.read() {
            Ok(contacts) => {
                info!(
                    "Loaded {} contacts from {}",
                    contacts.len(),
                    backend.describe()
                );
                contacts
            }
            Err(e) => {
                warn!(
                    "Could not load contacts from {}: {e}. Starting empty.",
                    backend.describe()
                );
                Vec::new()
            }
        };
        Self { contacts, backend }
    }

    /// Write the whole list. On failure the in-memory list is left as is.
    pub fn save(&mut self) -> Result<(), AppError> {
        self.backend.write(&self.contacts)
    }

    /// Append and return the new contact's id.
    pub fn append(&mut self, contact: Contact) -> usize {
        self.contacts.push(contact);
        self.contacts.len() - 1
    }

    pub fn remove_at(&mut self, id: usize) -> Result<Contact, AppError> {
        if id >= self.contacts.len() {
            return Err(AppError::contact_not_found(id));
        }
        Ok(self.contacts.remove(id))
    }

    pub fn get(&self, id: usize) -> Option<&Contact> {
        self.contacts.get(id)
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Contacts matching `query`, paired with their ids in the full list.
    pub fn search(&self, query: &str) -> Vec<(usize, &Contact)> {
        self.contacts
            .iter()
            .enumerate()
            .filter(|(_, contact)| contact.matches(query))
            .collect()
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Parse a textual contact id. Range is checked by the lookup itself.
    pub fn parse_id(raw: &str) -> Result<usize, AppError> {
        raw.trim()
            .parse::<usize>()
            .map_err(|_| AppError::invalid_contact_id(raw))
    }

    pub fn into_shared(self) -> SharedBook {
        Arc::new(Mutex::new(self))
    }
}

impl std::fmt::Debug for ContactBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactBook")
            .field("contacts", &self.contacts.len())
            .field("backend", &self.backend.describe())
            .finish()
    }
}
