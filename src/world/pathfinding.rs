use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::world::errors::WorldError;
use crate::world::position::Vector3;

/// Produces a walkable point list from `start` to `end`, both included.
pub trait Pathfinder {
    fn calculate_path(&mut self, start: Vector3, end: Vector3) -> Result<Vec<Vector3>, WorldError>;
}

/// Straight line split into segments no longer than `max_segment_length`.
#[derive(Debug, Clone, Copy)]
pub struct DirectPathfinder {
    pub max_segment_length: f32,
}

impl Default for DirectPathfinder {
    fn default() -> Self {
        Self {
            max_segment_length: 20.0,
        }
    }
}

impl Pathfinder for DirectPathfinder {
    fn calculate_path(&mut self, start: Vector3, end: Vector3) -> Result<Vec<Vector3>, WorldError> {
        let finite = |v: Vector3| v.x.is_finite() && v.y.is_finite() && v.z.is_finite();
        if !finite(start) || !finite(end) {
            return Err(WorldError::NoPath);
        }
        let length = start.distance(end);
        let segment = self.max_segment_length.max(1.0);
        let segments = (length / segment).ceil().max(1.0) as usize;
        let mut path = Vec::with_capacity(segments + 1);
        path.push(start);
        for step in 1..segments {
            path.push(start.lerp(end, step as f32 / segments as f32));
        }
        path.push(end);
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PathKey {
    start: (i32, i32, i32),
    end: (i32, i32, i32),
}

impl PathKey {
    /// Endpoints are bucketed to whole units so nearby queries share entries.
    fn new(start: Vector3, end: Vector3) -> Self {
        let bucket = |v: Vector3| (v.x.round() as i32, v.y.round() as i32, v.z.round() as i32);
        Self {
            start: bucket(start),
            end: bucket(end),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Memoizes the inner pathfinder. Cached paths keep their interior points
/// but get the exact requested endpoints.
pub struct CachedPathfinder<P> {
    inner: P,
    cache: LruCache<PathKey, Vec<Vector3>>,
    stats: PathCacheStats,
}

impl<P: Pathfinder> CachedPathfinder<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: LruCache::new(capacity),
            stats: PathCacheStats::default(),
        }
    }

    pub fn stats(&self) -> &PathCacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl<P: Pathfinder> Pathfinder for CachedPathfinder<P> {
    fn calculate_path(&mut self, start: Vector3, end: Vector3) -> Result<Vec<Vector3>, WorldError> {
        let key = PathKey::new(start, end);
        if let Some(path) = self.cache.get(&key) {
            self.stats.hits += 1;
            let mut path = path.clone();
            if let Some(first) = path.first_mut() {
                *first = start;
            }
            if let Some(last) = path.last_mut() {
                *last = end;
            }
            trace!(target: "mover", points = path.len(), "path cache hit");
            return Ok(path);
        }
        self.stats.misses += 1;
        let path = self.inner.calculate_path(start, end)?;
        self.cache.put(key, path.clone());
        Ok(path)
    }
}
