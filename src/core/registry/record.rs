//! Registry record types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Stable identifier of a registered file.
///
/// Minted once when a path is first registered and never reused, so ids of
/// deleted files can never collide with ids of new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Mint a fresh random id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// One registered image file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: RecordId,
    /// Absolute path of the file
    pub path: PathBuf,
    /// Content digest taken when the path was registered
    pub digest: String,
}

impl ImageRecord {
    /// A new record with a freshly minted id
    pub fn new(path: PathBuf, digest: String) -> Self {
        Self::with_id(RecordId::new(), path, digest)
    }

    pub fn with_id(id: RecordId, path: PathBuf, digest: String) -> Self {
        Self { id, path, digest }
    }

    /// Whether both records hold byte-identical content
    pub fn same_content(&self, other: &ImageRecord) -> bool {
        self.digest == other.digest
    }
}
