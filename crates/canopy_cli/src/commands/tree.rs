//! Tree files: whole stores as JSON.

use canopy_store::{ContentStore, MemoryStore, NodeTree};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Loads a tree file into a fresh in-memory store.
pub fn load_store(path: &Path) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    let tree: NodeTree = serde_json::from_slice(&bytes)?;
    let store = MemoryStore::new();
    store.import("/", tree)?;
    Ok(store)
}

/// Writes the whole store back to a tree file.
pub fn save_store(store: &dyn ContentStore, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let tree = store.export("/")?;
    std::fs::write(path, serde_json::to_vec_pretty(&tree)?)?;
    Ok(())
}

/// Reads an optional JSON configuration file, falling back to the default.
pub fn load_config<T>(path: Option<&Path>) -> Result<T, Box<dyn std::error::Error>>
where
    T: DeserializeOwned + Default,
{
    match path {
        None => Ok(T::default()),
        Some(path) => {
            let bytes =
                std::fs::read(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
            Ok(serde_json::from_slice(&bytes)?)
        }
    }
}
