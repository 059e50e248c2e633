#![forbid(unsafe_code)]

//! Persisted records: per-version deltas, the per-file version graph, and
//! the file header.
//!
//! Field names follow the on-disk JSON (`camelCase`).

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::delta::TileDelta;
use crate::version::Version;

/// Tag written into every header by this build.
pub const EDITOR_VERSION_TAG: &str = concat!("blb-", env!("CARGO_PKG_VERSION"));

/// Ticks (100 ns) between 1601-01-01 and 1970-01-01.
const FILE_TIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;
const FILE_TIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Current wall-clock time as a platform file-time integer
/// (100 ns ticks since 1601-01-01 UTC).
#[must_use]
pub fn file_time_now() -> i64 {
    file_time_from_datetime(Utc::now())
}

#[must_use]
pub fn file_time_from_datetime(at: DateTime<Utc>) -> i64 {
    at.timestamp() * FILE_TIME_TICKS_PER_SEC
        + i64::from(at.timestamp_subsec_nanos() / 100)
        + FILE_TIME_UNIX_EPOCH
}

/// Inverse of [`file_time_from_datetime`]; `None` if out of range.
#[must_use]
pub fn file_time_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    let since_unix = ticks.checked_sub(FILE_TIME_UNIX_EPOCH)?;
    let secs = since_unix.div_euclid(FILE_TIME_TICKS_PER_SEC);
    let nanos = since_unix.rem_euclid(FILE_TIME_TICKS_PER_SEC) * 100;
    Utc.timestamp_opt(secs, u32::try_from(nanos).ok()?).single()
}

/// Opaque encoded thumbnail. Serialized as a base64 string.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Thumbnail(pub Vec<u8>);

impl Thumbnail {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thumbnail({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Thumbnail {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Thumbnail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Thumbnail {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Thumbnail)
            .map_err(serde::de::Error::custom)
    }
}

/// Metadata the caller supplies for a new version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LevelMeta {
    pub name: String,
    pub thumbnail: Thumbnail,
    pub time_stamp: i64,
}

impl LevelMeta {
    /// Metadata stamped with the current time.
    #[must_use]
    pub fn now(name: impl Into<String>, thumbnail: Thumbnail) -> Self {
        Self {
            name: name.into(),
            thumbnail,
            time_stamp: file_time_now(),
        }
    }
}

/// One stored version: a delta against the preceding state in its chain.
///
/// For a manual save the preceding state is the previous manual save; for
/// an autosave it is the manual save it branches from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelData {
    pub version: Version,
    pub name: String,
    pub id: u32,
    pub thumbnail: Thumbnail,
    pub time_stamp: i64,
    #[serde(flatten)]
    pub delta: TileDelta,
}

impl LevelData {
    #[must_use]
    pub fn new(version: Version, id: u32, meta: LevelMeta, delta: TileDelta) -> Self {
        Self {
            version,
            name: meta.name,
            id,
            thumbnail: meta.thumbnail,
            time_stamp: meta.time_stamp,
            delta,
        }
    }

    /// The metadata half of this record.
    #[must_use]
    pub fn meta(&self) -> LevelMeta {
        LevelMeta {
            name: self.name.clone(),
            thumbnail: self.thumbnail.clone(),
            time_stamp: self.time_stamp,
        }
    }
}

/// The complete version graph of one file.
///
/// # Invariants
///
/// 1. `manual_saves[i].version == (i + 1, 0)`: strictly increasing,
///    1-based, contiguous.
/// 2. Every autosave's `version.manual` is 0 or names an entry in
///    `manual_saves`.
/// 3. `id`s are unique and all `<= last_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub manual_saves: Vec<LevelData>,
    pub auto_saves: Vec<LevelData>,
    pub last_id: u32,
    #[serde(default)]
    pub description: String,
}

/// First line of every `.blb` file. Never compressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    pub editor_version_tag: String,
    pub is_compressed: bool,
}

impl FileHeader {
    /// Header stamped with this build's editor tag.
    #[must_use]
    pub fn current(is_compressed: bool) -> Self {
        Self {
            editor_version_tag: EDITOR_VERSION_TAG.to_string(),
            is_compressed,
        }
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::current(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{Position, Tile, TileState};

    #[test]
    fn thumbnail_is_base64_in_json() {
        let thumb = Thumbnail(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&thumb).unwrap();
        assert_eq!(json, "\"3q2+7w==\"");
        let back: Thumbnail = serde_json::from_str(&json).unwrap();
        assert_eq!(back, thumb);
    }

    #[test]
    fn level_data_uses_wire_field_names() {
        let mut delta = TileDelta::default();
        delta
            .added_tiles
            .push(Tile::new(Position::new(1, 0), TileState::new("Coin")));
        delta.removed_tiles.insert(Position::new(4, 4));
        let level = LevelData::new(
            Version::new(1, 2),
            7,
            LevelMeta {
                name: "draft".into(),
                thumbnail: Thumbnail::default(),
                time_stamp: 42,
            },
            delta,
        );

        let json = serde_json::to_value(&level).unwrap();
        assert_eq!(json["version"]["manual"], 1);
        assert_eq!(json["version"]["auto"], 2);
        assert_eq!(json["timeStamp"], 42);
        assert_eq!(json["addedTiles"][0]["type"], "Coin");
        assert_eq!(json["removedTiles"][0]["x"], 4);

        let back: LevelData = serde_json::from_value(json).unwrap();
        assert_eq!(back, level);
    }

    #[test]
    fn file_time_round_trips_through_chrono() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let ticks = file_time_from_datetime(at);
        assert_eq!(file_time_to_datetime(ticks), Some(at));
    }

    #[test]
    fn unix_epoch_file_time() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(file_time_from_datetime(epoch), FILE_TIME_UNIX_EPOCH);
    }

    #[test]
    fn header_field_names() {
        let json = serde_json::to_string(&FileHeader::current(false)).unwrap();
        assert!(json.contains("\"editorVersionTag\""));
        assert!(json.contains("\"isCompressed\":false"));
    }
}
