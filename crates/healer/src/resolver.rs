//! Instance to VM resolution.
//!
//! The mapping from scrape target (`host:port`) to Proxmox VMID is loaded
//! once at startup and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info, warn};

/// Default location of the instance mapping file.
pub const DEFAULT_MAPPING_PATH: &str = "/opt/self-healing/vm_mapping.json";

/// Proxmox VM identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmId(pub u32);

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A managed VM an alert resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// Proxmox VMID
    pub id: VmId,
    /// Instance key the alert carried
    pub instance_key: String,
}

/// Static instance key to VM table.
#[derive(Debug, Clone, Default)]
pub struct VmMapping {
    entries: HashMap<String, VmId>,
}

impl VmMapping {
    /// Build a mapping from explicit entries.
    #[must_use]
    pub fn new(entries: HashMap<String, VmId>) -> Self {
        Self { entries }
    }

    /// Example mapping used when no mapping file is installed.
    #[must_use]
    pub fn example() -> Self {
        Self::new(HashMap::from([
            ("192.168.1.100:9100".to_string(), VmId(100)),
            ("192.168.1.101:9100".to_string(), VmId(101)),
            ("192.168.1.102:9100".to_string(), VmId(102)),
        ]))
    }

    /// Load the mapping from a JSON object of `"host:port": vmid` pairs.
    ///
    /// A missing file falls back to [`VmMapping::example`]; an unreadable or
    /// invalid file falls back to an empty mapping. Both are operator errors
    /// and never abort startup.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "VM mapping file not found, using example mapping"
                );
                return Self::example();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read VM mapping");
                return Self::default();
            }
        };

        match serde_json::from_str::<HashMap<String, VmId>>(&contents) {
            Ok(entries) => {
                info!(path = %path.display(), count = entries.len(), "Loaded VM mapping");
                Self::new(entries)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Invalid VM mapping file");
                Self::default()
            }
        }
    }

    /// Resolve an instance key to its managed target.
    #[must_use]
    pub fn resolve(&self, instance_key: &str) -> Option<Target> {
        self.entries.get(instance_key).map(|id| Target {
            id: *id,
            instance_key: instance_key.to_string(),
        })
    }

    /// Number of mapped instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no instance is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
