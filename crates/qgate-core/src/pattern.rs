//! Actionable pattern store.
//!
//! Layout:
//!   .qgate/patterns.json   : JSON array of pattern records
//!
//! Records are held in file order and mutated in place as outcomes are
//! recorded. Nothing is written back unless [`PatternStore::save`] is called.

use crate::error::{QgateError, Result};
use crate::io;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Pattern files above this size are refused.
pub const MAX_PATTERN_FILE_BYTES: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_applications: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub successful_applications: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub failed_applications: u64,
}

impl UsageStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.total_applications == 0 {
            0.0
        } else {
            self.successful_applications as f64 / self.total_applications as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    #[serde(default, deserialize_with = "lenient_usage")]
    pub usage_statistics: UsageStatistics,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    /// Estimated reliability of auto-applying this pattern, in [0.1, 0.95]
    /// once any outcome has been recorded.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_confidence"
    )]
    pub confidence_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_rate")]
    pub success_rate: f64,
    pub metadata: PatternMetadata,
    /// Fields this crate does not interpret, kept for write-back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pattern {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            confidence_score: None,
            success_rate: 0.0,
            metadata: PatternMetadata::default(),
            extra: Map::new(),
        }
    }

    pub fn usage(&self) -> &UsageStatistics {
        &self.metadata.usage_statistics
    }
}

// Field-level coercion. A record that passes [`validate_pattern`] always
// loads; ill-typed statistics fall back to their zero values.

fn lenient_count<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<u64, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(match value.as_u64() {
        Some(n) => n,
        None => match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => f as u64,
            _ => 0,
        },
    })
}

fn lenient_rate<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<f64, D::Error> {
    Ok(Value::deserialize(de)?.as_f64().unwrap_or(0.0))
}

fn lenient_confidence<'de, D: Deserializer<'de>>(
    de: D,
) -> std::result::Result<Option<f64>, D::Error> {
    Ok(Value::deserialize(de)?.as_f64())
}

fn lenient_usage<'de, D: Deserializer<'de>>(
    de: D,
) -> std::result::Result<UsageStatistics, D::Error> {
    let value = Value::deserialize(de)?;
    if !value.is_object() {
        return Ok(UsageStatistics::default());
    }
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Shallow schema check: `id` is a string and `metadata` is an object.
pub fn validate_pattern(record: &Value) -> bool {
    let Some(obj) = record.as_object() else {
        return false;
    };
    obj.get("id").is_some_and(Value::is_string)
        && obj.get("metadata").is_some_and(Value::is_object)
}

// ---------------------------------------------------------------------------
// PatternStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    path: Option<PathBuf>,
    patterns: Vec<Pattern>,
    index: HashMap<String, usize>,
}

impl PatternStore {
    /// Load every valid record from the JSON array at `path`.
    pub fn initialize(path: &Path) -> Result<Self> {
        let load_err = |reason: String| QgateError::Load {
            path: path.display().to_string(),
            reason,
        };

        let meta = std::fs::metadata(path).map_err(|e| load_err(e.to_string()))?;
        if meta.len() > MAX_PATTERN_FILE_BYTES {
            return Err(load_err(format!(
                "file exceeds {MAX_PATTERN_FILE_BYTES} bytes (size={})",
                meta.len()
            )));
        }
        let data = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let value: Value =
            serde_json::from_str(&data).map_err(|e| load_err(format!("invalid JSON: {e}")))?;
        let Value::Array(records) = value else {
            return Err(load_err("expected a JSON array of patterns".to_string()));
        };

        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };
        for (i, record) in records.into_iter().enumerate() {
            if !validate_pattern(&record) {
                tracing::warn!("skipping pattern #{i} in {}: failed validation", path.display());
                continue;
            }
            match serde_json::from_value::<Pattern>(record) {
                Ok(p) => store.put_pattern(p),
                Err(e) => {
                    tracing::warn!("skipping pattern #{i} in {}: {e}", path.display());
                }
            }
        }
        tracing::debug!("loaded {} pattern(s) from {}", store.len(), path.display());
        Ok(store)
    }

    /// A store with no backing file.
    pub fn in_memory(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        let mut store = Self::default();
        for p in patterns {
            store.put_pattern(p);
        }
        store
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn get_pattern(&self, id: &str) -> Option<&Pattern> {
        self.index.get(id).map(|&i| &self.patterns[i])
    }

    pub fn require_pattern(&self, id: &str) -> Result<&Pattern> {
        self.get_pattern(id)
            .ok_or_else(|| QgateError::PatternNotFound(id.to_string()))
    }

    /// Insert or overwrite by id. An overwrite keeps the original position.
    pub fn put_pattern(&mut self, pattern: Pattern) {
        match self.index.get(&pattern.id) {
            Some(&i) => self.patterns[i] = pattern,
            None => {
                self.index.insert(pattern.id.clone(), self.patterns.len());
                self.patterns.push(pattern);
            }
        }
    }

    /// Record one application outcome and return the stored record.
    pub fn update_pattern_stats(&mut self, id: &str, success: bool) -> Result<&mut Pattern> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| QgateError::PatternNotFound(id.to_string()))?;
        let pattern = &mut self.patterns[i];
        let stats = &mut pattern.metadata.usage_statistics;
        stats.total_applications += 1;
        if success {
            stats.successful_applications += 1;
        } else {
            stats.failed_applications += 1;
        }
        pattern.success_rate = stats.success_rate();
        Ok(pattern)
    }

    /// All records in load order.
    pub fn recommended_patterns(&self) -> Vec<&Pattern> {
        self.patterns.iter().collect()
    }

    /// Write every record back to the backing file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Err(QgateError::InvalidInput(
                "pattern store has no backing file".to_string(),
            ));
        };
        let data = serde_json::to_string_pretty(&self.patterns)?;
        io::atomic_write(path, data.as_bytes())?;
        tracing::debug!("saved {} pattern(s) to {}", self.len(), path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
