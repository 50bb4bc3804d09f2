//! Fingerprint-keyed, bounded cache of intermediate results.
pub mod local;

pub use local::{LocalCache, DEFAULT_CAPACITY};

use crate::hierarchy::LocationId;
use crate::plan::Stage;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identifies one stage's result for one location under one set of settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub location: LocationId,
    pub stage: Stage,
    pub fingerprint: u64,
}

impl CacheKey {
    pub fn new(location: LocationId, stage: Stage, fingerprint: u64) -> Self {
        Self { location, stage, fingerprint }
    }
}

/// Stable within one process: the hash of the value's JSON text.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Ok(hasher.finish())
}
