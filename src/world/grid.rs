//! Tile partition of a world instance used to bound visibility work.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::entities::unit::UnitId;
use crate::world::position::Vector3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    pub x: i32,
    pub y: i32,
}

impl TileIndex {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance in tiles.
    pub fn distance(self, other: TileIndex) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn is_in_sight(self, other: TileIndex, radius: i32) -> bool {
        self.distance(other) <= radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// Edge length of a tile in world units.
    pub tile_size: f32,
    /// World extent in units; coordinates span `[-map_size / 2, map_size / 2)`.
    pub map_size: f32,
    /// `PlayerZoneSight`: neighborhood radius in tiles.
    pub sight_radius: i32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            tile_size: 33.333_332,
            map_size: 34_133.332,
            sight_radius: 2,
        }
    }
}

/// Objects located in one tile and the watchers standing in it.
#[derive(Debug, Clone)]
pub struct VisibilityTile {
    index: TileIndex,
    objects: BTreeSet<UnitId>,
    watchers: BTreeSet<UnitId>,
}

impl VisibilityTile {
    pub fn new(index: TileIndex) -> Self {
        Self {
            index,
            objects: BTreeSet::new(),
            watchers: BTreeSet::new(),
        }
    }

    pub fn index(&self) -> TileIndex {
        self.index
    }

    pub fn objects(&self) -> &BTreeSet<UnitId> {
        &self.objects
    }

    pub fn watchers(&self) -> &BTreeSet<UnitId> {
        &self.watchers
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.watchers.is_empty()
    }
}

/// Who gains or loses sight when an object changes tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityDelta {
    /// Watchers that can now see the moved object.
    pub new_watchers: Vec<UnitId>,
    /// Watchers that lost sight of the moved object.
    pub lost_watchers: Vec<UnitId>,
    /// Objects the moved watcher can now see.
    pub spawned: Vec<UnitId>,
    /// Objects the moved watcher can no longer see.
    pub despawned: Vec<UnitId>,
}

impl VisibilityDelta {
    pub fn is_empty(&self) -> bool {
        self.new_watchers.is_empty()
            && self.lost_watchers.is_empty()
            && self.spawned.is_empty()
            && self.despawned.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityGrid {
    settings: GridSettings,
    tiles_per_side: i32,
    tiles: HashMap<TileIndex, VisibilityTile>,
}

impl VisibilityGrid {
    pub fn new(settings: GridSettings) -> Self {
        let tile_size = if settings.tile_size > 0.0 {
            settings.tile_size
        } else {
            GridSettings::default().tile_size
        };
        let tiles_per_side = (settings.map_size / tile_size).ceil().max(1.0) as i32;
        Self {
            settings: GridSettings {
                tile_size,
                ..settings
            },
            tiles_per_side,
            tiles: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn sight_radius(&self) -> i32 {
        self.settings.sight_radius
    }

    pub fn tiles_per_side(&self) -> i32 {
        self.tiles_per_side
    }

    pub fn contains(&self, index: TileIndex) -> bool {
        index.x >= 0 && index.y >= 0 && index.x < self.tiles_per_side && index.y < self.tiles_per_side
    }

    /// Tile a world location falls into, `None` outside the map.
    pub fn tile_position(&self, location: Vector3) -> Option<TileIndex> {
        if !location.x.is_finite() || !location.y.is_finite() {
            return None;
        }
        let half = self.settings.map_size / 2.0;
        let x = ((location.x + half) / self.settings.tile_size).floor();
        let y = ((location.y + half) / self.settings.tile_size).floor();
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let index = TileIndex::new(x as i32, y as i32);
        self.contains(index).then_some(index)
    }

    pub fn get_tile(&self, index: TileIndex) -> Option<&VisibilityTile> {
        self.tiles.get(&index)
    }

    /// Returns the tile, creating it on first access. `None` outside the map.
    pub fn require_tile(&mut self, index: TileIndex) -> Option<&mut VisibilityTile> {
        if !self.contains(index) {
            return None;
        }
        Some(
            self.tiles
                .entry(index)
                .or_insert_with(|| VisibilityTile::new(index)),
        )
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// In-bounds tile indices of the sight square around `center`.
    pub fn tiles_in_sight(&self, center: TileIndex) -> Vec<TileIndex> {
        let radius = self.settings.sight_radius;
        let mut indices = Vec::new();
        for y in (center.y - radius)..=(center.y + radius) {
            for x in (center.x - radius)..=(center.x + radius) {
                let index = TileIndex::new(x, y);
                if self.contains(index) {
                    indices.push(index);
                }
            }
        }
        indices
    }

    /// Registers an object in `index`. Returns false outside the map.
    pub fn add_object(&mut self, id: UnitId, index: TileIndex, is_watcher: bool) -> bool {
        let Some(tile) = self.require_tile(index) else {
            return false;
        };
        tile.objects.insert(id);
        if is_watcher {
            tile.watchers.insert(id);
        }
        true
    }

    pub fn remove_object(&mut self, id: UnitId, index: TileIndex) {
        if let Some(tile) = self.tiles.get_mut(&index) {
            tile.objects.remove(&id);
            tile.watchers.remove(&id);
        }
    }

    /// Watchers in sight of `center`, excluding `except`.
    pub fn watchers_in_sight(&self, center: TileIndex, except: Option<UnitId>) -> Vec<UnitId> {
        let mut watchers = Vec::new();
        for_each_subscriber_in_sight(self, center, |id| {
            if Some(id) != except {
                watchers.push(id);
            }
        });
        watchers
    }

    /// Objects in sight of `center`, excluding `except`.
    pub fn objects_in_sight(&self, center: TileIndex, except: Option<UnitId>) -> Vec<UnitId> {
        let mut objects = Vec::new();
        for_each_tile_in_sight(self, center, |tile| {
            objects.extend(tile.objects.iter().copied().filter(|id| Some(*id) != except));
        });
        objects
    }

    /// Moves an object between tiles and reports the visibility changes.
    /// Objects that stay in sight during the move appear in no list.
    pub fn move_object(
        &mut self,
        id: UnitId,
        from: TileIndex,
        to: TileIndex,
        is_watcher: bool,
    ) -> Option<VisibilityDelta> {
        if !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(VisibilityDelta::default());
        }
        self.remove_object(id, from);
        self.add_object(id, to, is_watcher);

        let mut delta = VisibilityDelta::default();
        for_each_tile_in_sight_without(self, from, to, |tile| {
            delta
                .lost_watchers
                .extend(tile.watchers.iter().copied().filter(|w| *w != id));
            if is_watcher {
                delta
                    .despawned
                    .extend(tile.objects.iter().copied().filter(|o| *o != id));
            }
        });
        for_each_tile_in_sight_without(self, to, from, |tile| {
            delta
                .new_watchers
                .extend(tile.watchers.iter().copied().filter(|w| *w != id));
            if is_watcher {
                delta
                    .spawned
                    .extend(tile.objects.iter().copied().filter(|o| *o != id));
            }
        });
        Some(delta)
    }
}

/// Calls `f` for every existing tile in the sight square of `center`.
pub fn for_each_tile_in_sight<F>(grid: &VisibilityGrid, center: TileIndex, mut f: F)
where
    F: FnMut(&VisibilityTile),
{
    for index in grid.tiles_in_sight(center) {
        if let Some(tile) = grid.get_tile(index) {
            f(tile);
        }
    }
}

/// Like [`for_each_tile_in_sight`] but skips tiles also in sight of `excluded`.
pub fn for_each_tile_in_sight_without<F>(
    grid: &VisibilityGrid,
    center: TileIndex,
    excluded: TileIndex,
    mut f: F,
) where
    F: FnMut(&VisibilityTile),
{
    let radius = grid.sight_radius();
    for index in grid.tiles_in_sight(center) {
        if index.is_in_sight(excluded, radius) {
            continue;
        }
        if let Some(tile) = grid.get_tile(index) {
            f(tile);
        }
    }
}

/// Calls `f` once per watcher standing in the sight square of `center`.
pub fn for_each_subscriber_in_sight<F>(grid: &VisibilityGrid, center: TileIndex, mut f: F)
where
    F: FnMut(UnitId),
{
    for_each_tile_in_sight(grid, center, |tile| {
        for watcher in tile.watchers.iter() {
            f(*watcher);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn grid() -> VisibilityGrid {
        VisibilityGrid::new(GridSettings {
            tile_size: 10.0,
            map_size: 200.0,
            sight_radius: 1,
        })
    }

    fn set(ids: &[UnitId]) -> BTreeSet<UnitId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn tile_position_maps_world_coordinates() {
        let grid = grid();
        assert_eq!(grid.tiles_per_side(), 20);
        assert_eq!(
            grid.tile_position(Vector3::new(-100.0, -100.0, 0.0)),
            Some(TileIndex::new(0, 0))
        );
        assert_eq!(
            grid.tile_position(Vector3::new(5.0, -5.0, 0.0)),
            Some(TileIndex::new(10, 9))
        );
        assert_eq!(grid.tile_position(Vector3::new(100.0, 0.0, 0.0)), None);
        assert_eq!(grid.tile_position(Vector3::new(-100.5, 0.0, 0.0)), None);
        assert_eq!(grid.tile_position(Vector3::new(f32::NAN, 0.0, 0.0)), None);
    }

    #[test]
    fn tiles_are_created_lazily() {
        let mut grid = grid();
        assert!(grid.get_tile(TileIndex::new(3, 3)).is_none());
        assert!(grid.require_tile(TileIndex::new(3, 3)).is_some());
        let tile = grid.get_tile(TileIndex::new(3, 3)).expect("tile");
        assert_eq!(tile.index(), TileIndex::new(3, 3));
        assert!(tile.is_empty());
        assert!(grid.require_tile(TileIndex::new(-1, 3)).is_none());
        assert_eq!(grid.tile_count(), 1);
    }

    #[test]
    fn sight_square_is_clipped_at_map_edge() {
        let grid = grid();
        assert_eq!(grid.tiles_in_sight(TileIndex::new(5, 5)).len(), 9);
        assert_eq!(grid.tiles_in_sight(TileIndex::new(0, 0)).len(), 4);
        assert_eq!(grid.tiles_in_sight(TileIndex::new(19, 10)).len(), 6);
    }

    #[test]
    fn sight_without_skips_shared_tiles() {
        let mut grid = grid();
        for x in 3..=8 {
            for y in 3..=8 {
                grid.require_tile(TileIndex::new(x, y));
            }
        }
        let mut visited = Vec::new();
        for_each_tile_in_sight_without(&grid, TileIndex::new(6, 5), TileIndex::new(5, 5), |tile| {
            visited.push(tile.index());
        });
        visited.sort();
        assert_eq!(
            visited,
            vec![TileIndex::new(7, 4), TileIndex::new(7, 5), TileIndex::new(7, 6)]
        );
    }

    #[test]
    fn subscribers_only_include_watchers() {
        let mut grid = grid();
        grid.add_object(UnitId(1), TileIndex::new(5, 5), true);
        grid.add_object(UnitId(2), TileIndex::new(6, 6), false);
        grid.add_object(UnitId(3), TileIndex::new(9, 9), true);
        let watchers = grid.watchers_in_sight(TileIndex::new(6, 6), None);
        assert_eq!(watchers, vec![UnitId(1)]);
        let objects = grid.objects_in_sight(TileIndex::new(6, 6), Some(UnitId(1)));
        assert_eq!(objects, vec![UnitId(2)]);
    }

    #[test]
    fn moving_watcher_delta_matches_set_difference() {
        let mut grid = grid();
        let mover = UnitId(100);
        let a = TileIndex::new(5, 5);
        let b = TileIndex::new(6, 5);
        let placements = [
            (UnitId(1), TileIndex::new(4, 5), true),
            (UnitId(2), TileIndex::new(5, 4), false),
            (UnitId(3), TileIndex::new(6, 6), true),
            (UnitId(4), TileIndex::new(7, 5), false),
            (UnitId(5), TileIndex::new(7, 6), true),
            (UnitId(6), TileIndex::new(3, 3), false),
        ];
        for (id, tile, watcher) in placements {
            grid.add_object(id, tile, watcher);
        }
        grid.add_object(mover, a, true);

        let before = set(&grid.objects_in_sight(a, Some(mover)));
        let delta = grid.move_object(mover, a, b, true).expect("in bounds");
        let after = set(&grid.objects_in_sight(b, Some(mover)));

        let expected_spawned: BTreeSet<_> = after.difference(&before).copied().collect();
        let expected_despawned: BTreeSet<_> = before.difference(&after).copied().collect();
        assert_eq!(set(&delta.spawned), expected_spawned);
        assert_eq!(set(&delta.despawned), expected_despawned);
        assert_eq!(set(&delta.spawned), set(&[UnitId(4), UnitId(5)]));
        assert_eq!(set(&delta.despawned), set(&[UnitId(1)]));
        assert_eq!(set(&delta.new_watchers), set(&[UnitId(5)]));
        assert_eq!(set(&delta.lost_watchers), set(&[UnitId(1)]));
        for stays in before.intersection(&after) {
            assert!(!delta.spawned.contains(stays));
            assert!(!delta.despawned.contains(stays));
        }
        assert!(grid.get_tile(b).expect("tile").watchers().contains(&mover));
        assert!(!grid.get_tile(a).expect("tile").objects().contains(&mover));
    }

    #[test]
    fn moving_plain_object_only_reports_watchers() {
        let mut grid = grid();
        grid.add_object(UnitId(1), TileIndex::new(2, 2), true);
        grid.add_object(UnitId(2), TileIndex::new(3, 2), false);
        let delta = grid
            .move_object(UnitId(2), TileIndex::new(3, 2), TileIndex::new(4, 2), false)
            .expect("in bounds");
        assert_eq!(delta.lost_watchers, vec![UnitId(1)]);
        assert!(delta.spawned.is_empty());
        assert!(delta.despawned.is_empty());
        assert!(grid
            .move_object(UnitId(2), TileIndex::new(4, 2), TileIndex::new(40, 2), false)
            .is_none());
    }
}
