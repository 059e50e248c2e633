#![forbid(unsafe_code)]

//! Tile grid primitives shared by the delta engine and the version graph.
//!
//! The editor owns the live grid; this crate only sees it as a mapping from
//! [`Position`] to [`TileState`]. [`Grid`] is an `im::HashMap` so that
//! snapshotting the live grid before a background save is a pointer copy.

use serde::{Deserialize, Serialize};

/// A cell coordinate on the level grid.
///
/// Ordered by `x`, then `y`, so sets of positions serialize
/// deterministically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Facing of directional tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Everything the editor stores about one occupied cell.
///
/// Equality is strict structural equality. In particular a tile with
/// `path: Some(vec![])` is *not* equal to one with `path: None`, and that
/// distinction is preserved through serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileState {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Position>>,
}

impl TileState {
    /// A plain tile of the given kind with no color, direction or path.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            color: None,
            direction: None,
            path: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<Position>) -> Self {
        self.path = Some(path);
        self
    }
}

/// A positioned tile as stored in a delta's `addedTiles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    #[serde(flatten)]
    pub position: Position,
    #[serde(flatten)]
    pub state: TileState,
}

impl Tile {
    #[must_use]
    pub fn new(position: Position, state: TileState) -> Self {
        Self { position, state }
    }
}

/// Snapshot of a level: occupied positions and their tile state.
pub type Grid = im::HashMap<Position, TileState>;

/// Build a grid from `(x, y, kind)` triples. Mostly useful in tests and tools.
#[must_use]
pub fn grid_of<'a>(tiles: impl IntoIterator<Item = (i32, i32, &'a str)>) -> Grid {
    tiles
        .into_iter()
        .map(|(x, y, kind)| (Position::new(x, y), TileState::new(kind)))
        .collect()
}

/// The tiles of a grid sorted by position.
#[must_use]
pub fn sorted_tiles(grid: &Grid) -> Vec<Tile> {
    let mut tiles: Vec<Tile> = grid
        .iter()
        .map(|(pos, state)| Tile::new(*pos, state.clone()))
        .collect();
    tiles.sort_by_key(|t| t.position);
    tiles
}
