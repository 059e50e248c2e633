#![forbid(unsafe_code)]

//! Version graph operations over [`FileData`].
//!
//! A file is a linear chain of manual saves, each a delta against the
//! previous one, plus autosaves that each hold a delta against the manual
//! save they branch from:
//!
//! ```text
//! manual:  (1,0) ──► (2,0) ──► (3,0)
//!            │         ├─ (2,1)
//!            └─ (1,1)  └─ (2,2)
//! ```
//!
//! # Value semantics
//!
//! Every mutating operation takes `&self` and returns a new [`FileData`].
//! A failed operation returns `Err` and the receiver is untouched, so no
//! caller can observe a chain with a gap or a dangling autosave.
//!
//! # Invariants (after every operation)
//!
//! 1. `manual_saves[i].version == (i + 1, 0)`.
//! 2. Every autosave branches from manual 0 or an existing manual save.
//! 3. Reconstructing any surviving version yields the same grid it did
//!    before the operation, except where the operation is defined to
//!    change it (deleting a version, promoting an autosave).
//! 4. Autosave deltas are relative to their branch manual's grid, never to
//!    an earlier autosave. [`FileData::promote_auto_save`] relies on this
//!    when it appends a promoted autosave without re-diffing.

use std::collections::BTreeSet;

use crate::delta::{DeltaAccumulator, TileDelta, diff, flatten, replay};
use crate::error::{BlbError, Result};
use crate::level::{FileData, LevelData, LevelMeta};
use crate::tile::Grid;
use crate::version::Version;

const TARGET: &str = "blb.graph";

/// Which chain a new entry is appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Manual,
    Auto,
}

/// Outcome of [`FileData::reconstruct`].
///
/// An autosave target that does not exist is not fatal: the manual-only
/// reconstruction has already been computed and is returned as the
/// fallback, tagged so the caller must decide what to tell the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstructed {
    Exact(Grid),
    ManualFallback { grid: Grid, missing: Version },
}

impl Reconstructed {
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        match self {
            Self::Exact(grid) | Self::ManualFallback { grid, .. } => grid,
        }
    }

    #[must_use]
    pub fn into_grid(self) -> Grid {
        match self {
            Self::Exact(grid) | Self::ManualFallback { grid, .. } => grid,
        }
    }

    /// The grid if the target resolved exactly, else `VersionNotFound`.
    pub fn exact(self) -> Result<Grid> {
        match self {
            Self::Exact(grid) => Ok(grid),
            Self::ManualFallback { missing, .. } => Err(BlbError::not_found(missing)),
        }
    }
}

impl FileData {
    // ====================================================================
    // Lookups
    // ====================================================================

    /// The stored record for `version`, if any.
    #[must_use]
    pub fn level(&self, version: Version) -> Option<&LevelData> {
        let chain = if version.is_manual() {
            &self.manual_saves
        } else {
            &self.auto_saves
        };
        chain.iter().find(|l| l.version == version)
    }

    /// Current version of the entry with the given id.
    #[must_use]
    pub fn version_of_id(&self, id: u32) -> Option<Version> {
        self.manual_saves
            .iter()
            .chain(&self.auto_saves)
            .find(|l| l.id == id)
            .map(|l| l.version)
    }

    /// Highest manual number, or 0 if there are no manual saves.
    #[must_use]
    pub fn last_manual_save_version(&self) -> u32 {
        self.manual_saves.last().map_or(0, |l| l.version.manual)
    }

    /// Highest autosave number under `manual`, or 0 if there are none.
    #[must_use]
    pub fn last_auto_save_version(&self, manual: u32) -> u32 {
        self.auto_saves
            .iter()
            .filter(|l| l.version.manual == manual)
            .map(|l| l.version.auto)
            .max()
            .unwrap_or(0)
    }

    /// The newest manual version, or [`Version::NONE`].
    #[must_use]
    pub fn newest_manual(&self) -> Version {
        Version::manual(self.last_manual_save_version())
    }

    /// Manual saves plus autosaves.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.manual_saves.len() + self.auto_saves.len()
    }

    /// All stored versions, newest first.
    #[must_use]
    pub fn versions(&self) -> Vec<Version> {
        let mut all: Vec<Version> = self
            .manual_saves
            .iter()
            .chain(&self.auto_saves)
            .map(|l| l.version)
            .collect();
        all.sort_by(|a, b| b.cmp(a));
        all
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manual_saves.is_empty() && self.auto_saves.is_empty()
    }

    /// Check the structural invariants. An empty list means the graph is
    /// consistent.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut ids = BTreeSet::new();

        for (i, level) in self.manual_saves.iter().enumerate() {
            let expected = Version::manual(u32::try_from(i + 1).unwrap_or(u32::MAX));
            if level.version != expected {
                errors.push(format!(
                    "manual save at index {i} has version {}, expected {expected}",
                    level.version
                ));
            }
        }
        for level in &self.auto_saves {
            if level.version.is_manual() {
                errors.push(format!("autosave list holds manual version {}", level.version));
            } else if level.version.manual > self.last_manual_save_version() {
                errors.push(format!(
                    "autosave {} branches from missing manual {}",
                    level.version, level.version.manual
                ));
            }
        }
        for level in self.manual_saves.iter().chain(&self.auto_saves) {
            if !ids.insert(level.id) {
                errors.push(format!("duplicate id {}", level.id));
            }
            if level.id > self.last_id {
                errors.push(format!("id {} exceeds lastId {}", level.id, self.last_id));
            }
            if !level.delta.is_disjoint() {
                errors.push(format!(
                    "version {} both adds and removes a position",
                    level.version
                ));
            }
        }
        errors
    }

    // ====================================================================
    // Reconstruction
    // ====================================================================

    /// Rebuild the grid at `target` (`None` means the newest manual save).
    ///
    /// Manual deltas are replayed in order until one exceeds the target's
    /// manual number. An autosave target then has its own delta applied on
    /// top.
    #[must_use]
    pub fn reconstruct(&self, target: Option<Version>) -> Reconstructed {
        let limit = target.map_or(u32::MAX, |v| v.manual);
        let grid = replay(
            self.manual_saves
                .iter()
                .take_while(|l| l.version.manual <= limit)
                .map(|l| &l.delta),
        );

        match target {
            Some(version) if version.is_auto() => match self.level(version) {
                Some(auto) => {
                    let mut grid = grid;
                    auto.delta.apply_to(&mut grid);
                    Reconstructed::Exact(grid)
                }
                None => {
                    tracing::warn!(
                        target: TARGET,
                        version = %version,
                        "autosave not found; falling back to manual reconstruction"
                    );
                    Reconstructed::ManualFallback {
                        grid,
                        missing: version,
                    }
                }
            },
            _ => Reconstructed::Exact(grid),
        }
    }

    // ====================================================================
    // Append / evict
    // ====================================================================

    /// Append `delta` as a new version.
    ///
    /// Autosaves branch from `cursor`'s manual number and take the next
    /// free autosave number under it; manual saves take the next manual
    /// number. Either way the entry gets `last_id + 1`.
    #[must_use]
    pub fn appended(
        &self,
        delta: TileDelta,
        meta: LevelMeta,
        kind: EntryKind,
        cursor: Version,
    ) -> (FileData, Version) {
        let mut next = self.clone();
        next.last_id += 1;

        let version = match kind {
            EntryKind::Auto => Version::new(
                cursor.manual,
                self.last_auto_save_version(cursor.manual) + 1,
            ),
            EntryKind::Manual => Version::manual(self.last_manual_save_version() + 1),
        };
        let level = LevelData::new(version, next.last_id, meta, delta);
        match kind {
            EntryKind::Auto => next.auto_saves.push(level),
            EntryKind::Manual => next.manual_saves.push(level),
        }

        tracing::debug!(target: TARGET, version = %version, id = next.last_id, "appended version");
        (next, version)
    }

    /// Drop oldest entries of `kind` until there is room for one more
    /// under `max`.
    #[must_use]
    pub fn with_room_for(&self, kind: EntryKind, max: usize) -> FileData {
        let mut data = self.clone();
        loop {
            let count = match kind {
                EntryKind::Manual => data.manual_saves.len(),
                EntryKind::Auto => data.auto_saves.len(),
            };
            if count == 0 || count < max {
                return data;
            }
            data = match kind {
                EntryKind::Manual => data.evict_oldest_manual(),
                EntryKind::Auto => data.evict_oldest_auto_save(),
            };
        }
    }

    /// Remove the oldest manual save, folding its delta into the next one.
    #[must_use]
    pub fn evict_oldest_manual(&self) -> FileData {
        if self.manual_saves.is_empty() {
            return self.clone();
        }
        tracing::debug!(target: TARGET, "evicting oldest manual save");
        self.without_manual(0)
    }

    /// Remove the oldest autosave (first in insertion order).
    #[must_use]
    pub fn evict_oldest_auto_save(&self) -> FileData {
        let mut data = self.clone();
        if !data.auto_saves.is_empty() {
            let evicted = data.auto_saves.remove(0);
            tracing::debug!(target: TARGET, version = %evicted.version, "evicting oldest autosave");
        }
        data
    }

    // ====================================================================
    // Delete
    // ====================================================================

    /// Delete one version.
    ///
    /// A manual save that is not the newest is flattened forward into its
    /// successor first, so later history still reconstructs. Autosaves
    /// branched from a deleted manual are deleted with it, and every later
    /// manual number shifts down by one.
    pub fn delete_version(&self, version: Version) -> Result<FileData> {
        if version.is_manual() {
            let index = self
                .manual_saves
                .iter()
                .position(|l| l.version == version)
                .ok_or_else(|| BlbError::not_found(version))?;
            Ok(self.without_manual(index))
        } else {
            let index = self
                .auto_saves
                .iter()
                .position(|l| l.version == version)
                .ok_or_else(|| BlbError::not_found(version))?;
            let mut data = self.clone();
            data.auto_saves.remove(index);
            tracing::debug!(target: TARGET, version = %version, "deleted autosave");
            Ok(data)
        }
    }

    /// Delete several versions and move `cursor` along with its entry.
    ///
    /// Autosaves go first, then manual saves newest-first, so no deletion
    /// invalidates the number of one still pending. If the cursor's entry
    /// is deleted, the cursor moves to the newest remaining manual save.
    pub fn delete_versions(
        &self,
        versions: &[Version],
        cursor: Version,
    ) -> Result<(FileData, Version)> {
        let cursor_id = self.level(cursor).map(|l| l.id);

        let mut autos: Vec<Version> = versions.iter().copied().filter(|v| v.is_auto()).collect();
        let mut manuals: Vec<Version> =
            versions.iter().copied().filter(|v| v.is_manual()).collect();
        autos.sort_by(|a, b| b.cmp(a));
        autos.dedup();
        manuals.sort_by(|a, b| b.cmp(a));
        manuals.dedup();

        let mut data = self.clone();
        for version in autos.into_iter().chain(manuals) {
            data = data.delete_version(version)?;
        }

        let cursor = match cursor_id {
            Some(id) => data.version_of_id(id).unwrap_or_else(|| data.newest_manual()),
            None => cursor,
        };
        Ok((data, cursor))
    }

    fn without_manual(&self, index: usize) -> FileData {
        let removed = &self.manual_saves[index];
        let number = removed.version.manual;

        let mut manual_saves = Vec::with_capacity(self.manual_saves.len().saturating_sub(1));
        for (i, level) in self.manual_saves.iter().enumerate() {
            if i < index {
                manual_saves.push(level.clone());
            } else if i > index {
                let mut shifted = if i == index + 1 {
                    flatten(removed, level)
                } else {
                    level.clone()
                };
                // The new head is relative to an empty grid.
                if i == 1 && index == 0 {
                    shifted.delta.removed_tiles.clear();
                }
                shifted.version.manual -= 1;
                manual_saves.push(shifted);
            }
        }

        let auto_saves = self
            .auto_saves
            .iter()
            .filter(|l| l.version.manual != number)
            .cloned()
            .map(|mut l| {
                if l.version.manual > number {
                    l.version.manual -= 1;
                }
                l
            })
            .collect();

        tracing::debug!(target: TARGET, version = %removed.version, "deleted manual save");
        FileData {
            manual_saves,
            auto_saves,
            last_id: self.last_id,
            description: self.description.clone(),
        }
    }

    // ====================================================================
    // Promote
    // ====================================================================

    /// Turn autosave `version` into a manual save placed right after its
    /// branch manual.
    ///
    /// If a manual save follows the insertion point, its delta is
    /// recomputed against the promoted state so it still reconstructs to
    /// the same grid. With `renumber`, the promoted entry becomes
    /// `(branch + 1, 0)` and every later manual save and every autosave of
    /// a later manual shifts up by one. Without it, later entries keep
    /// their numbers and the chain temporarily holds two entries numbered
    /// `branch + 1`; only callers that discard autosaves and renumber the
    /// chain themselves should do that.
    pub fn promote_auto_save(&self, version: Version, renumber: bool) -> Result<FileData> {
        if version.is_manual() {
            return Err(BlbError::state(format!(
                "version {version} is already a manual save"
            )));
        }
        let auto_index = self
            .auto_saves
            .iter()
            .position(|l| l.version == version)
            .ok_or_else(|| BlbError::not_found(version))?;
        let branch = version.manual;
        let insert_at = if branch == 0 {
            0
        } else {
            self.manual_saves
                .iter()
                .position(|l| l.version.manual == branch)
                .ok_or_else(|| BlbError::not_found(Version::manual(branch)))?
                + 1
        };

        let mut promoted = self.auto_saves[auto_index].clone();
        let mut manual_saves = self.manual_saves.clone();

        if let Some(next) = manual_saves.get_mut(insert_at) {
            let branch_grid = replay(self.manual_saves[..insert_at].iter().map(|l| &l.delta));
            let mut next_grid = branch_grid.clone();
            next.delta.apply_to(&mut next_grid);
            let mut promoted_grid = branch_grid;
            promoted.delta.apply_to(&mut promoted_grid);
            next.delta = diff(&promoted_grid, &next_grid);
        }

        promoted.version = Version::manual(branch + 1);
        if renumber {
            for level in &mut manual_saves[insert_at..] {
                level.version.manual += 1;
            }
        }
        manual_saves.insert(insert_at, promoted);

        let mut auto_saves = self.auto_saves.clone();
        auto_saves.remove(auto_index);
        if renumber {
            for level in auto_saves.iter_mut().filter(|l| l.version.manual > branch) {
                level.version.manual += 1;
            }
        }

        tracing::debug!(
            target: TARGET,
            from = %version,
            to = %Version::manual(branch + 1),
            "promoted autosave"
        );
        Ok(FileData {
            manual_saves,
            auto_saves,
            last_id: self.last_id,
            description: self.description.clone(),
        })
    }

    /// Promote every autosave in `versions`, newest first. Manual versions
    /// in the list are ignored.
    pub fn promote_auto_saves(&self, versions: &[Version]) -> Result<FileData> {
        let mut autos: Vec<Version> = versions.iter().copied().filter(|v| v.is_auto()).collect();
        autos.sort_by(|a, b| b.cmp(a));
        autos.dedup();

        let mut data = self.clone();
        for version in autos {
            data = data.promote_auto_save(version, true)?;
        }
        Ok(data)
    }

    // ====================================================================
    // Extract / export
    // ====================================================================

    /// Build a file containing only `versions`, each as a manual save.
    ///
    /// Selected autosaves are promoted first, then all autosaves are
    /// dropped. Deltas of unselected manual saves are folded into the next
    /// surviving one, so each survivor reconstructs to the same grid it
    /// had in the original history. Survivors are renumbered from 1.
    pub fn extract_selected(&self, versions: &[Version]) -> Result<FileData> {
        let mut selected = BTreeSet::new();
        for &version in versions {
            let level = self
                .level(version)
                .ok_or_else(|| BlbError::not_found(version))?;
            selected.insert(level.id);
        }

        let promoted = self.promote_auto_saves(versions)?;
        let mut acc = DeltaAccumulator::new();
        let mut manual_saves = Vec::with_capacity(selected.len());
        let mut number = 0;
        for level in &promoted.manual_saves {
            acc.apply(&level.delta);
            if selected.contains(&level.id) {
                number += 1;
                let mut delta = acc.take();
                if number == 1 {
                    delta.removed_tiles.clear();
                }
                manual_saves.push(LevelData {
                    version: Version::manual(number),
                    delta,
                    ..level.clone()
                });
            }
        }

        tracing::debug!(target: TARGET, kept = manual_saves.len(), "extracted versions");
        Ok(FileData {
            manual_saves,
            auto_saves: Vec::new(),
            last_id: promoted.last_id,
            description: promoted.description,
        })
    }

    /// A file holding just `version`, as manual save 1.
    pub fn single_version(&self, version: Version) -> Result<FileData> {
        self.extract_selected(&[version])
    }

    /// Collapse the whole history into the newest manual save.
    #[must_use]
    pub fn flattened(&self) -> FileData {
        match self.extract_selected(&[self.newest_manual()]) {
            Ok(data) => data,
            Err(_) => FileData {
                description: self.description.clone(),
                ..FileData::default()
            },
        }
    }

    /// A fresh single-version file whose only manual save is `grid`.
    #[must_use]
    pub fn from_grid(grid: &Grid, meta: LevelMeta, description: impl Into<String>) -> FileData {
        let empty = FileData {
            description: description.into(),
            ..FileData::default()
        };
        let (data, _) = empty.appended(
            diff(&Grid::new(), grid),
            meta,
            EntryKind::Manual,
            Version::NONE,
        );
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::grid_of;

    fn meta(name: &str) -> LevelMeta {
        LevelMeta {
            name: name.into(),
            ..LevelMeta::default()
        }
    }

    /// Save `grid` the way the pipeline does: manual saves diff against the
    /// newest manual, autosaves against their branch manual.
    fn save(data: &FileData, grid: &Grid, kind: EntryKind, cursor: Version) -> (FileData, Version) {
        let base = match kind {
            EntryKind::Manual => data.reconstruct(None).into_grid(),
            EntryKind::Auto => data.reconstruct(Some(cursor.branch())).into_grid(),
        };
        data.appended(diff(&base, grid), meta("v"), kind, cursor)
    }

    fn chain(grids: &[Grid]) -> FileData {
        let mut data = FileData::default();
        for grid in grids {
            data = save(&data, grid, EntryKind::Manual, Version::NONE).0;
        }
        data
    }

    #[test]
    fn scenario_manual_then_autosave_then_delete() {
        let (data, v1) = save(
            &FileData::default(),
            &grid_of([(0, 0, "Wall")]),
            EntryKind::Manual,
            Version::NONE,
        );
        assert_eq!(v1, Version::manual(1));
        assert_eq!(data.manual_saves[0].delta.added_tiles.len(), 1);
        assert!(data.manual_saves[0].delta.removed_tiles.is_empty());

        let (data, a1) = save(
            &data,
            &grid_of([(0, 0, "Wall"), (1, 0, "Coin")]),
            EntryKind::Auto,
            v1,
        );
        assert_eq!(a1, Version::new(1, 1));
        let auto = data.level(a1).unwrap();
        assert_eq!(auto.delta.added_tiles.len(), 1);
        assert_eq!(auto.delta.added_tiles[0].state.kind, "Coin");

        let data = data.delete_version(v1).unwrap();
        assert!(data.manual_saves.is_empty());
        assert!(data.auto_saves.is_empty());
        assert_eq!(data.last_id, 2);
    }

    #[test]
    fn ids_are_monotonic() {
        let data = chain(&[grid_of([(0, 0, "A")]), grid_of([(0, 0, "B")])]);
        assert_eq!(data.manual_saves[0].id, 1);
        assert_eq!(data.manual_saves[1].id, 2);
        assert_eq!(data.last_id, 2);
    }

    #[test]
    fn deleting_middle_manual_preserves_later_state() {
        let g3 = grid_of([(2, 2, "Gem")]);
        let data = chain(&[
            grid_of([(0, 0, "Wall")]),
            grid_of([(0, 0, "Coin"), (1, 1, "Wall")]),
            g3.clone(),
        ]);
        let after = data.delete_version(Version::manual(2)).unwrap();

        assert!(after.validate().is_empty(), "{:?}", after.validate());
        assert_eq!(after.manual_saves.len(), 2);
        assert_eq!(after.reconstruct(None).into_grid(), g3);
        assert_eq!(
            after.reconstruct(Some(Version::manual(1))).into_grid(),
            grid_of([(0, 0, "Wall")])
        );
    }

    #[test]
    fn deleting_manual_renumbers_later_autosaves() {
        let data = chain(&[grid_of([(0, 0, "A")]), grid_of([(0, 0, "B")])]);
        let g = grid_of([(0, 0, "B"), (9, 9, "X")]);
        let (data, auto) = save(&data, &g, EntryKind::Auto, Version::manual(2));
        assert_eq!(auto, Version::new(2, 1));

        let after = data.delete_version(Version::manual(1)).unwrap();
        assert!(after.validate().is_empty());
        let moved = Version::new(1, 1);
        assert_eq!(after.reconstruct(Some(moved)), Reconstructed::Exact(g));
    }

    #[test]
    fn deleting_missing_versions_fails_without_change() {
        let data = chain(&[grid_of([(0, 0, "A")])]);
        assert!(matches!(
            data.delete_version(Version::new(1, 4)),
            Err(BlbError::VersionNotFound { .. })
        ));
        assert!(matches!(
            data.delete_version(Version::manual(7)),
            Err(BlbError::VersionNotFound { .. })
        ));
        assert_eq!(data.manual_saves.len(), 1);
    }

    #[test]
    fn missing_autosave_falls_back_to_manual_grid() {
        let g1 = grid_of([(0, 0, "A")]);
        let data = chain(&[g1.clone()]);
        match data.reconstruct(Some(Version::new(1, 3))) {
            Reconstructed::ManualFallback { grid, missing } => {
                assert_eq!(grid, g1);
                assert_eq!(missing, Version::new(1, 3));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn promotion_matches_autosave_grid_and_keeps_later_history() {
        let g1 = grid_of([(0, 0, "A")]);
        let g2 = grid_of([(0, 0, "B"), (1, 0, "B")]);
        let g3 = grid_of([(5, 5, "C")]);
        let data = chain(&[g1.clone(), g2.clone(), g3.clone()]);
        let ga = grid_of([(0, 0, "A"), (7, 7, "Auto")]);
        let (data, auto) = save(&data, &ga, EntryKind::Auto, Version::manual(1));

        let promoted = data.promote_auto_save(auto, true).unwrap();
        assert!(promoted.validate().is_empty(), "{:?}", promoted.validate());
        assert_eq!(promoted.manual_saves.len(), 4);
        assert!(promoted.auto_saves.is_empty());
        assert_eq!(
            promoted.reconstruct(Some(Version::manual(2))).into_grid(),
            ga
        );
        assert_eq!(
            promoted.reconstruct(Some(Version::manual(3))).into_grid(),
            g2
        );
        assert_eq!(promoted.reconstruct(None).into_grid(), g3);
    }

    #[test]
    fn promoting_autosave_of_newest_manual_appends() {
        let data = chain(&[grid_of([(0, 0, "A")])]);
        let ga = grid_of([(0, 0, "A"), (1, 1, "B")]);
        let (data, auto) = save(&data, &ga, EntryKind::Auto, Version::manual(1));
        let stored_delta = data.level(auto).unwrap().delta.clone();

        let promoted = data.promote_auto_save(auto, true).unwrap();
        assert_eq!(promoted.manual_saves[1].version, Version::manual(2));
        assert_eq!(promoted.manual_saves[1].delta, stored_delta);
        assert_eq!(promoted.reconstruct(None).into_grid(), ga);
    }

    #[test]
    fn promoting_shifts_autosaves_of_later_manuals_only() {
        let data = chain(&[grid_of([(0, 0, "A")]), grid_of([(0, 0, "B")])]);
        let (data, a1) = save(&data, &grid_of([(1, 0, "X")]), EntryKind::Auto, Version::manual(1));
        let (data, a1b) = save(&data, &grid_of([(2, 0, "Y")]), EntryKind::Auto, Version::manual(1));
        let g2a = grid_of([(0, 0, "B"), (3, 0, "Z")]);
        let (data, a2) = save(&data, &g2a, EntryKind::Auto, Version::manual(2));

        let promoted = data.promote_auto_save(a1, true).unwrap();
        assert!(promoted.validate().is_empty());
        assert!(promoted.level(a1b).is_some(), "sibling autosave keeps its branch");
        assert!(promoted.level(a2).is_none());
        assert_eq!(
            promoted.reconstruct(Some(Version::new(3, 1))),
            Reconstructed::Exact(g2a)
        );
    }

    #[test]
    fn promote_multiple_processes_newest_first() {
        let g1 = grid_of([(0, 0, "A")]);
        let g2 = grid_of([(0, 0, "B")]);
        let data = chain(&[g1, g2.clone()]);
        let ga = grid_of([(0, 0, "A"), (1, 0, "x")]);
        let gb = grid_of([(0, 0, "A"), (2, 0, "y")]);
        let gc = grid_of([(0, 0, "B"), (3, 0, "z")]);
        let (data, a) = save(&data, &ga, EntryKind::Auto, Version::manual(1));
        let (data, b) = save(&data, &gb, EntryKind::Auto, Version::manual(1));
        let (data, c) = save(&data, &gc, EntryKind::Auto, Version::manual(2));

        let promoted = data.promote_auto_saves(&[a, c, b]).unwrap();
        assert!(promoted.validate().is_empty(), "{:?}", promoted.validate());
        let grids: Vec<Grid> = (1..=5)
            .map(|m| promoted.reconstruct(Some(Version::manual(m))).into_grid())
            .collect();
        assert_eq!(grids[1], ga);
        assert_eq!(grids[2], gb);
        assert_eq!(grids[3], g2);
        assert_eq!(grids[4], gc);
    }

    #[test]
    fn promoting_a_manual_version_is_a_state_error() {
        let data = chain(&[grid_of([(0, 0, "A")])]);
        assert!(matches!(
            data.promote_auto_save(Version::manual(1), true),
            Err(BlbError::State { .. })
        ));
    }

    #[test]
    fn extract_keeps_selected_points_in_history() {
        let g1 = grid_of([(0, 0, "A")]);
        let g2 = grid_of([(0, 0, "B"), (1, 0, "B")]);
        let g3 = grid_of([(1, 0, "C")]);
        let data = chain(&[g1, g2.clone(), g3.clone()]);
        let ga = grid_of([(0, 0, "B"), (4, 4, "auto")]);
        let (data, auto) = save(&data, &ga, EntryKind::Auto, Version::manual(2));

        let extracted = data
            .extract_selected(&[Version::manual(3), auto, Version::manual(2)])
            .unwrap();
        assert!(extracted.validate().is_empty(), "{:?}", extracted.validate());
        assert!(extracted.auto_saves.is_empty());
        assert_eq!(extracted.manual_saves.len(), 3);
        assert_eq!(extracted.reconstruct(Some(Version::manual(1))).into_grid(), g2);
        assert_eq!(extracted.reconstruct(Some(Version::manual(2))).into_grid(), ga);
        assert_eq!(extracted.reconstruct(Some(Version::manual(3))).into_grid(), g3);
    }

    #[test]
    fn single_version_export_is_relative_to_empty() {
        let g2 = grid_of([(0, 0, "B"), (1, 0, "B")]);
        let data = chain(&[grid_of([(0, 0, "A"), (9, 9, "gone")]), g2.clone()]);
        let single = data.single_version(Version::manual(2)).unwrap();
        assert_eq!(single.manual_saves.len(), 1);
        assert!(single.manual_saves[0].delta.removed_tiles.is_empty());
        assert_eq!(single.reconstruct(None).into_grid(), g2);
    }

    #[test]
    fn delete_versions_moves_cursor_with_its_entry() {
        let data = chain(&[
            grid_of([(0, 0, "A")]),
            grid_of([(0, 0, "B")]),
            grid_of([(0, 0, "C")]),
        ]);
        let (after, cursor) = data
            .delete_versions(&[Version::manual(1)], Version::manual(3))
            .unwrap();
        assert_eq!(cursor, Version::manual(2));
        assert_eq!(after.reconstruct(Some(cursor)).into_grid(), grid_of([(0, 0, "C")]));

        let (after, cursor) = data
            .delete_versions(&[Version::manual(2), Version::manual(3)], Version::manual(3))
            .unwrap();
        assert_eq!(cursor, Version::manual(1));
        assert_eq!(after.manual_saves.len(), 1);
    }

    #[test]
    fn delete_versions_with_autosave_and_its_manual() {
        let data = chain(&[grid_of([(0, 0, "A")]), grid_of([(0, 0, "B")])]);
        let (data, auto) = save(&data, &grid_of([(3, 3, "Q")]), EntryKind::Auto, Version::manual(1));
        let (after, cursor) = data
            .delete_versions(&[Version::manual(1), auto], auto)
            .unwrap();
        assert!(after.auto_saves.is_empty());
        assert_eq!(cursor, Version::manual(1));
        assert_eq!(after.reconstruct(None).into_grid(), grid_of([(0, 0, "B")]));
    }

    #[test]
    fn fifo_eviction_keeps_newest_state() {
        let grids = [
            grid_of([(0, 0, "A")]),
            grid_of([(0, 0, "B"), (1, 1, "B")]),
            grid_of([(1, 1, "C")]),
        ];
        let data = chain(&grids);
        let trimmed = data.with_room_for(EntryKind::Manual, 2);
        assert_eq!(trimmed.manual_saves.len(), 1);
        assert!(trimmed.validate().is_empty());
        assert_eq!(trimmed.reconstruct(None).into_grid(), grids[2]);

        let mut autos = data.clone();
        for i in 0..3 {
            autos = save(&autos, &grid_of([(i, 0, "x")]), EntryKind::Auto, Version::manual(3)).0;
        }
        let trimmed = autos.with_room_for(EntryKind::Auto, 2);
        assert_eq!(trimmed.auto_saves.len(), 1);
        assert_eq!(trimmed.auto_saves[0].version, Version::new(3, 3));
    }

    #[test]
    fn versions_sorted_newest_first() {
        let data = chain(&[grid_of([(0, 0, "A")]), grid_of([(0, 0, "B")])]);
        let (data, _) = save(&data, &grid_of([(1, 1, "x")]), EntryKind::Auto, Version::manual(2));
        assert_eq!(
            data.versions(),
            vec![Version::manual(2), Version::new(2, 1), Version::manual(1)]
        );
        assert_eq!(data.entry_count(), 3);
        assert_eq!(data.last_auto_save_version(2), 1);
        assert_eq!(data.last_auto_save_version(1), 0);
        assert_eq!(data.last_manual_save_version(), 2);
        assert_eq!(FileData::default().last_manual_save_version(), 0);
    }

    #[test]
    fn flattened_collapses_to_newest() {
        let g = grid_of([(4, 4, "Z")]);
        let data = chain(&[grid_of([(0, 0, "A")]), g.clone()]);
        let flat = data.flattened();
        assert_eq!(flat.manual_saves.len(), 1);
        assert_eq!(flat.reconstruct(None).into_grid(), g);
        assert!(FileData::default().flattened().is_empty());
    }
}
