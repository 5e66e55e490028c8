use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Context, Result};
use crate::records::DateSnapshot;

/// Bumped whenever the serialized snapshot shape changes incompatibly.
/// A store written under a different version is discarded on load.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
/// On-disk document holding everything the cache persists: the date-keyed
/// snapshot map and the last collection timestamp.
pub struct StoreDocument {
    pub schema_version: u32,
    pub snapshots: HashMap<NaiveDate, DateSnapshot>,
    pub last_collected_at: Option<DateTime<Local>>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            snapshots: HashMap::new(),
            last_collected_at: None,
        }
    }
}

/// Persist the full store document under `path`, creating parent
/// directories as needed.
pub fn save_store(path: &Path, document: &StoreDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create snapshot store directory")?;
        }
    }

    let json =
        serde_json::to_string_pretty(document).context("Failed to serialize snapshot store")?;
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create snapshot store {:?}", path))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write snapshot store {:?}", path))?;

    Ok(())
}

/// Load the store document, or an empty one when the file does not exist or
/// carries an incompatible schema version.
pub fn load_store(path: &Path) -> Result<StoreDocument> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot store {:?}", path))?;
    let document: StoreDocument = match serde_json::from_str(&data) {
        Ok(document) => document,
        Err(err) => {
            log::warn!("Snapshot store {:?} is unreadable ({}); starting empty", path, err);
            return Ok(StoreDocument::default());
        }
    };

    if document.schema_version != SCHEMA_VERSION {
        log::warn!(
            "Snapshot store {:?} has schema version {} (expected {}); starting empty",
            path,
            document.schema_version,
            SCHEMA_VERSION
        );
        return Ok(StoreDocument::default());
    }

    Ok(document)
}

/// Drop the persisted store in one explicit operation.
pub fn clear_store(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove snapshot store {:?}", path))?;
    }
    Ok(())
}
