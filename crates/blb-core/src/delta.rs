#![forbid(unsafe_code)]

//! Tile delta engine: diffing grid snapshots and flattening delta chains.
//!
//! A [`TileDelta`] records how to get from one grid to the next:
//! `added_tiles` are set (or overwritten), `removed_tiles` are cleared. The
//! two sets never share a position.
//!
//! # Reconciliation rule
//!
//! [`DeltaAccumulator`] merges a sequence of deltas into one:
//!
//! - adding a position clears any pending removal of it;
//! - removing a position clears any pending addition *and* records the
//!   removal, because the removal may shadow a tile placed even earlier in
//!   history that the pending addition had replaced.
//!
//! ```text
//! base:   (0,0)=Wall
//! d1:     add (0,0)=Coin          acc: add{(0,0)=Coin}
//! d2:     remove (0,0)            acc: remove{(0,0)}
//! result: (0,0) empty
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::level::LevelData;
use crate::tile::{Grid, Position, Tile, TileState};

/// Added and removed tiles relative to a preceding state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileDelta {
    pub added_tiles: Vec<Tile>,
    pub removed_tiles: BTreeSet<Position>,
}

impl TileDelta {
    /// True iff applying this delta changes anything.
    #[inline]
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.added_tiles.is_empty() || !self.removed_tiles.is_empty()
    }

    /// Number of touched positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added_tiles.len() + self.removed_tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }

    /// Apply this delta to `grid` in place.
    pub fn apply_to(&self, grid: &mut Grid) {
        for pos in &self.removed_tiles {
            grid.remove(pos);
        }
        for tile in &self.added_tiles {
            grid.insert(tile.position, tile.state.clone());
        }
    }

    /// True iff no position is both added and removed.
    #[must_use]
    pub fn is_disjoint(&self) -> bool {
        self.added_tiles
            .iter()
            .all(|t| !self.removed_tiles.contains(&t.position))
    }
}

/// Compute the delta that turns `old` into `new`.
///
/// Tiles present in both grids with equal state are skipped; tiles that
/// differ or are new land in `added_tiles`; positions of `old` not matched
/// by `new` land in `removed_tiles`.
#[must_use]
pub fn diff(old: &Grid, new: &Grid) -> TileDelta {
    let mut unmatched = old.clone();
    let mut added_tiles = Vec::new();

    for (pos, state) in new {
        match unmatched.remove(pos) {
            Some(previous) if previous == *state => {}
            _ => added_tiles.push(Tile::new(*pos, state.clone())),
        }
    }
    added_tiles.sort_by_key(|t| t.position);

    TileDelta {
        added_tiles,
        removed_tiles: unmatched.keys().copied().collect(),
    }
}

/// Merge two sequential deltas into one equivalent delta.
///
/// The result carries `second`'s metadata (version, id, name, thumbnail,
/// timestamp).
#[must_use]
pub fn flatten(first: &LevelData, second: &LevelData) -> LevelData {
    let mut acc = DeltaAccumulator::new();
    acc.apply(&first.delta);
    acc.apply(&second.delta);
    LevelData {
        delta: acc.into_delta(),
        ..second.clone()
    }
}

/// Running add-map / remove-set used to merge delta chains.
#[derive(Debug, Clone, Default)]
pub struct DeltaAccumulator {
    added: BTreeMap<Position, TileState>,
    removed: BTreeSet<Position>,
}

impl DeltaAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `tile` is set. Clears a pending removal at its position.
    pub fn add(&mut self, tile: &Tile) {
        self.removed.remove(&tile.position);
        self.added.insert(tile.position, tile.state.clone());
    }

    /// Record that `pos` is cleared. Clears a pending addition and always
    /// records the removal.
    pub fn remove(&mut self, pos: Position) {
        self.added.remove(&pos);
        self.removed.insert(pos);
    }

    /// Fold a whole delta in: its removals, then its additions.
    pub fn apply(&mut self, delta: &TileDelta) {
        for pos in &delta.removed_tiles {
            self.remove(*pos);
        }
        for tile in &delta.added_tiles {
            self.add(tile);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Snapshot the accumulated delta without resetting.
    #[must_use]
    pub fn to_delta(&self) -> TileDelta {
        TileDelta {
            added_tiles: self
                .added
                .iter()
                .map(|(pos, state)| Tile::new(*pos, state.clone()))
                .collect(),
            removed_tiles: self.removed.clone(),
        }
    }

    /// Take the accumulated delta, leaving the accumulator empty.
    pub fn take(&mut self) -> TileDelta {
        std::mem::take(self).into_delta()
    }

    #[must_use]
    pub fn into_delta(self) -> TileDelta {
        TileDelta {
            added_tiles: self
                .added
                .into_iter()
                .map(|(pos, state)| Tile::new(pos, state))
                .collect(),
            removed_tiles: self.removed,
        }
    }
}

/// Grid produced by applying `deltas` in order to an empty grid.
#[must_use]
pub fn replay<'a>(deltas: impl IntoIterator<Item = &'a TileDelta>) -> Grid {
    let mut grid = Grid::new();
    for delta in deltas {
        delta.apply_to(&mut grid);
    }
    grid
}
