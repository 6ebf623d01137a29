use crate::error::{VanityError, VanityResult};
use crate::tx::SearchResult;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory of search results, one JSON file per transaction hash
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a result is stored under
    pub fn path_for(&self, result: &SearchResult) -> PathBuf {
        self.dir.join(format!("{:x}.json", result.tx_hash))
    }

    /// Write `result`, creating the directory if needed
    pub fn save(&self, result: &SearchResult) -> VanityResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(result);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(result)?)?;
        fs::rename(&tmp, &path)?;

        info!("Saved search result for nonce {} to {:?}", result.nonce, path);
        Ok(path)
    }

    /// Read a result from any path, not only this store's directory
    pub fn load(path: &Path) -> VanityResult<SearchResult> {
        let bytes = fs::read(path)?;
        let result: SearchResult = serde_json::from_slice(&bytes)?;

        if result.signed_raw_tx.is_empty() {
            return Err(VanityError::ResultMismatch(format!(
                "{:?} holds no signed transaction",
                path
            )));
        }

        debug!("Loaded search result {:?} from {:?}", result.tx_hash, path);
        Ok(result)
    }

    /// Delete a submitted result; a missing file is not an error
    pub fn remove(path: &Path) -> VanityResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every result currently stored, oldest first
    pub fn list(&self) -> VanityResult<Vec<SearchResult>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                results.push(Self::load(&path)?);
            }
        }
        results.sort_by_key(|r| r.found_at);
        Ok(results)
    }
}
