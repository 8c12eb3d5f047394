//! Preview synthesis cache
//!
//! Preview runs the same segment+backing-track render as the final export,
//! in memory, and caches the result keyed by the triggering effect
//! configuration, both gains, and a timeline revision counter. Any change
//! to those inputs must go through `invalidate` so a stale buffer is never
//! served.

use std::sync::Arc;

use crate::effect::EffectParams;
use crate::types::PcmBuffer;

/// Everything a cached preview depends on
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewKey {
    pub params: EffectParams,
    pub vocal_gain: f32,
    pub bgm_gain: f32,
    /// Timeline mutation counter — any edit makes cached audio stale
    pub timeline_rev: u64,
}

#[derive(Default)]
pub struct PreviewCache {
    entry: Option<(PreviewKey, Arc<PcmBuffer>)>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self { entry: None }
    }

    /// Look up a cached preview for exactly this key
    pub fn get(&self, key: &PreviewKey) -> Option<Arc<PcmBuffer>> {
        match &self.entry {
            Some((cached_key, buffer)) if cached_key == key => Some(Arc::clone(buffer)),
            _ => None,
        }
    }

    /// Store a freshly rendered preview
    pub fn insert(&mut self, key: PreviewKey, buffer: Arc<PcmBuffer>) {
        self.entry = Some((key, buffer));
    }

    /// Drop the cached buffer. Must be called whenever any parameter the
    /// key covers changes outside a lookup.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pitch: f32, rev: u64) -> PreviewKey {
        let mut params = EffectParams::default();
        params.pitch_semitones = pitch;
        PreviewKey {
            params,
            vocal_gain: 1.0,
            bgm_gain: 1.0,
            timeline_rev: rev,
        }
    }

    #[test]
    fn test_hit_requires_exact_key() {
        let mut cache = PreviewCache::new();
        cache.insert(key(0.0, 1), Arc::new(PcmBuffer::silence(16)));

        assert!(cache.get(&key(0.0, 1)).is_some());
        assert!(cache.get(&key(2.0, 1)).is_none(), "pitch change misses");
        assert!(cache.get(&key(0.0, 2)).is_none(), "timeline edit misses");
    }

    #[test]
    fn test_invalidate_clears() {
        let mut cache = PreviewCache::new();
        cache.insert(key(0.0, 1), Arc::new(PcmBuffer::silence(16)));
        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.get(&key(0.0, 1)).is_none());
    }
}
