//! Fingerprint computation and the incremental on-disk cache.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::PyscanError;
use crate::types::{Edge, FunctionRecord, UnresolvedCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    Stat,
    Sha1,
}

impl FromStr for HashMode {
    type Err = PyscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stat" => Ok(HashMode::Stat),
            "sha1" => Ok(HashMode::Sha1),
            other => Err(PyscanError::InvalidHashMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for HashMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashMode::Stat => write!(f, "stat"),
            HashMode::Sha1 => write!(f, "sha1"),
        }
    }
}

/// Computes a path's fingerprint. I/O failures degrade to a sentinel value
/// that will never match a cached entry, forcing a re-parse.
pub fn fingerprint(path: &Path, mode: HashMode) -> String {
    match mode {
        HashMode::Stat => match fs::metadata(path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                format!("{}:{}", mtime, meta.len())
            }
            Err(_) => {
                tracing::warn!(file = %path.display(), "stat failed, fingerprint forced to sentinel");
                "0:0".to_string()
            }
        },
        HashMode::Sha1 => match fs::File::open(path) {
            Ok(mut f) => {
                let mut hasher = Sha1::new();
                let mut buf = [0u8; 8192];
                loop {
                    match f.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => hasher.update(&buf[..n]),
                        Err(_) => {
                            tracing::warn!(file = %path.display(), "read failed mid-digest, fingerprint forced to sentinel");
                            return "0".to_string();
                        }
                    }
                }
                format!("{:x}", hasher.finalize())
            }
            Err(_) => {
                tracing::warn!(file = %path.display(), "open failed, fingerprint forced to sentinel");
                "0".to_string()
            }
        },
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheUnit {
    pub hash: String,
    pub functions: Vec<FunctionRecord>,
    pub edges: Vec<Edge>,
    pub unresolved_calls: Vec<UnresolvedCall>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheFile {
    pub hash_mode: Option<HashMode>,
    pub units: BTreeMap<String, CacheUnit>,
}

/// Loads a cache file, tolerating a missing file, unreadable JSON, or
/// per-record schema drift within a unit (bad records are dropped, the rest
/// of the unit is kept).
pub fn load_cache(path: &Path) -> CacheFile {
    let Ok(text) = fs::read_to_string(path) else {
        return CacheFile::default();
    };
    let Ok(root) = serde_json::from_str::<serde_json::Value>(&text) else {
        return CacheFile::default();
    };

    let hash_mode = root
        .get("hash_mode")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<HashMode>().ok());

    let mut units = BTreeMap::new();
    if let Some(raw_units) = root.get("cache_units").and_then(|v| v.as_object()) {
        for (relpath, raw_unit) in raw_units {
            let Some(hash) = raw_unit.get("hash").and_then(|v| v.as_str()) else {
                continue;
            };
            let functions = hydrate_array::<FunctionRecord>(raw_unit.get("functions"));
            let edges = hydrate_array::<Edge>(raw_unit.get("edges"));
            let unresolved_calls = hydrate_array::<UnresolvedCall>(raw_unit.get("unresolved_calls"));
            units.insert(
                relpath.clone(),
                CacheUnit {
                    hash: hash.to_string(),
                    functions,
                    edges,
                    unresolved_calls,
                },
            );
        }
    }

    CacheFile { hash_mode, units }
}

fn hydrate_array<T: for<'de> Deserialize<'de>>(value: Option<&serde_json::Value>) -> Vec<T> {
    let Some(serde_json::Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<T>(item.clone()).ok())
        .collect()
}

/// Writes the cache back to disk in one transaction. Failures are ignored —
/// the run still reports success.
pub fn save_cache(path: &Path, hash_mode: HashMode, units: &BTreeMap<String, CacheUnit>) {
    let body = serde_json::json!({
        "hash_mode": hash_mode.to_string(),
        "cache_units": units,
    });
    if let Ok(text) = serde_json::to_string(&body) {
        let _ = fs::write(path, text);
    }
}

/// True when a stored unit can be reused in place of re-parsing.
pub fn can_reuse(stored_hash: &str, fresh_fingerprint: &str, stored_mode: Option<HashMode>, current_mode: HashMode) -> bool {
    if stored_hash != fresh_fingerprint {
        return false;
    }
    match stored_mode {
        Some(mode) => mode == current_mode,
        None => current_mode == HashMode::Stat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn stat_fingerprint_changes_with_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        fs::write(&path, "a").unwrap();
        let fp1 = fingerprint(&path, HashMode::Stat);
        fs::write(&path, "ab").unwrap();
        let fp2 = fingerprint(&path, HashMode::Stat);
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn sha1_fingerprint_stable_for_same_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        fs::write(&path, "def f(): pass\n").unwrap();
        let fp1 = fingerprint(&path, HashMode::Sha1);
        let fp2 = fingerprint(&path, HashMode::Sha1);
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn missing_file_yields_sentinel() {
        let path = Path::new("/nonexistent/path/f.py");
        assert_eq!(fingerprint(path, HashMode::Stat), "0:0");
        assert_eq!(fingerprint(path, HashMode::Sha1), "0");
    }

    #[test]
    fn load_missing_cache_is_empty_default() {
        let cache = load_cache(Path::new("/nonexistent/cache.json"));
        assert!(cache.units.is_empty());
        assert!(cache.hash_mode.is_none());
    }

    #[test]
    fn schema_drift_drops_bad_records_keeps_good_ones() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"hash_mode":"stat","cache_units":{"a.py":{"hash":"1:2","functions":[{"id":"a.f","name":"f","qualname":"a.f","module":"a","kind":"function","lineno":1,"endlineno":1},{"bogus":true}],"edges":[],"unresolved_calls":[]}}}"#,
        )
        .unwrap();
        let cache = load_cache(&path);
        let unit = cache.units.get("a.py").unwrap();
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].qualname, "a.f");
    }

    #[test]
    fn reuse_policy_matches_hash_and_mode() {
        assert!(can_reuse("1:2", "1:2", Some(HashMode::Stat), HashMode::Stat));
        assert!(!can_reuse("1:2", "1:3", Some(HashMode::Stat), HashMode::Stat));
        assert!(!can_reuse("1:2", "1:2", Some(HashMode::Sha1), HashMode::Stat));
        assert!(can_reuse("1:2", "1:2", None, HashMode::Stat));
        assert!(!can_reuse("1:2", "1:2", None, HashMode::Sha1));
    }
}
