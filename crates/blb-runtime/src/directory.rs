#![forbid(unsafe_code)]

//! Project directory and the single mounted file.
//!
//! At most one [`FileInfo`] is mounted at a time. The mount and the
//! "last loaded version" cursor are only ever written on the owning
//! thread; the save worker receives copies.
//!
//! Temp files are named `~<uuid>.<ext>` and live in the project directory
//! until the first manual save gives the level a real name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use blb_core::{
    BlbError, FileData, FileHeader, FormatWarning, Grid, Reconstructed, Result, Version,
};

use crate::config::SaveConfig;

const TARGET: &str = "blb.mount";
const TEMP_PREFIX: char = '~';

/// A file's header and version graph plus where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub is_temp: bool,
    pub header: FileHeader,
    pub data: FileData,
}

impl FileInfo {
    /// An empty file that has not been written yet.
    #[must_use]
    pub fn empty(path: PathBuf, is_temp: bool, header: FileHeader) -> Self {
        Self {
            path,
            is_temp,
            header,
            data: FileData::default(),
        }
    }

    /// Display name: the file stem.
    #[must_use]
    pub fn name(&self) -> String {
        display_name(&self.path)
    }
}

/// One row of [`FileDirectory::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_temp: bool,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct FileDirectory {
    root: PathBuf,
    extension: String,
    editor_version_tag: String,
    mounted: Option<FileInfo>,
    cursor: Version,
}

impl FileDirectory {
    #[must_use]
    pub fn new(config: &SaveConfig) -> Self {
        Self {
            root: config.project_dir.clone(),
            extension: config.extension.clone(),
            editor_version_tag: config.editor_version_tag.clone(),
            mounted: None,
            cursor: Version::NONE,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the level called `name`, with the extension appended unless
    /// already present.
    ///
    /// Names are plain file names: empty names, path separators and a
    /// leading `~` (reserved for temp files) are rejected.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let name = name.trim();
        if name.is_empty()
            || name.starts_with(TEMP_PREFIX)
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(BlbError::state(format!("invalid file name {name:?}")));
        }
        let suffix = format!(".{}", self.extension);
        let file_name = if name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        };
        Ok(self.root.join(file_name))
    }

    /// A fresh, unused temp file path.
    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.root
            .join(format!("{TEMP_PREFIX}{token}.{}", self.extension))
    }

    /// True iff `path`'s file name marks it as a temp file.
    #[must_use]
    pub fn is_temp_path(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(TEMP_PREFIX))
    }

    /// Level files in the project directory, newest first.
    pub fn list(&self) -> io::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str())
            {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            entries.push(FileEntry {
                name: display_name(&path),
                is_temp: Self::is_temp_path(&path),
                path,
                modified,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    #[must_use]
    pub fn mounted(&self) -> Option<&FileInfo> {
        self.mounted.as_ref()
    }

    /// True iff `path` is the mounted file.
    #[must_use]
    pub fn is_mounted_path(&self, path: &Path) -> bool {
        self.mounted.as_ref().is_some_and(|m| m.path == path)
    }

    #[must_use]
    pub fn cursor(&self) -> Version {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Version) {
        if let Some(info) = &self.mounted
            && cursor != Version::NONE
            && info.data.level(cursor).is_none()
        {
            tracing::error!(target: TARGET, version = %cursor, "cursor points at a missing version");
        }
        self.cursor = cursor;
    }

    /// Mount `info`, replacing any current mount. Returns the old mount.
    pub fn mount(&mut self, info: FileInfo, cursor: Version) -> Option<FileInfo> {
        tracing::debug!(target: TARGET, path = %info.path.display(), cursor = %cursor, "mount");
        self.cursor = cursor;
        self.mounted.replace(info)
    }

    /// Unmount without touching the disk.
    pub fn unmount(&mut self) -> Option<FileInfo> {
        self.cursor = Version::NONE;
        let old = self.mounted.take();
        if let Some(info) = &old {
            tracing::debug!(target: TARGET, path = %info.path.display(), "unmount");
        }
        old
    }

    /// Decode and mount the file at `path`, returning its newest manual
    /// grid. On any failure nothing is left mounted.
    pub fn open(&mut self, path: &Path) -> Result<(Grid, Vec<FormatWarning>)> {
        self.unmount();
        let decoded = blb_core::read_file_with_tag(path, &self.editor_version_tag)?;
        let cursor = decoded.data.newest_manual();
        let grid = decoded.data.reconstruct(None).into_grid();
        self.mount(
            FileInfo {
                path: path.to_path_buf(),
                is_temp: Self::is_temp_path(path),
                header: decoded.header,
                data: decoded.data,
            },
            cursor,
        );
        Ok((grid, decoded.warnings))
    }

    /// Reconstruct `version` of the mounted file and move the cursor to
    /// whatever was actually loaded.
    pub fn load(&mut self, version: Version) -> Result<Reconstructed> {
        let info = self
            .mounted
            .as_ref()
            .ok_or_else(|| BlbError::state("no file is open"))?;
        if version.is_manual() && version != Version::NONE && info.data.level(version).is_none() {
            return Err(BlbError::not_found(version));
        }
        let result = info.data.reconstruct(Some(version));
        self.cursor = match &result {
            Reconstructed::Exact(_) => version,
            Reconstructed::ManualFallback { .. } => version.branch(),
        };
        Ok(result)
    }

    /// Unmount and delete the file if it was a temp file.
    pub fn close(&mut self) -> Result<Option<FileInfo>> {
        let old = self.unmount();
        if let Some(info) = &old
            && info.is_temp
        {
            remove_temp_file(&info.path)?;
        }
        Ok(old)
    }
}

/// Delete a temp file; already gone is fine.
pub fn remove_temp_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(target: TARGET, path = %path.display(), "removed temp file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blb_core::{EntryKind, LevelMeta, diff, grid_of, write_file};

    fn dir_in(tmp: &tempfile::TempDir) -> FileDirectory {
        FileDirectory::new(&SaveConfig::in_dir(tmp.path()))
    }

    #[test]
    fn path_for_appends_extension_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = dir_in(&tmp);
        assert_eq!(dir.path_for("castle").unwrap(), tmp.path().join("castle.blb"));
        assert_eq!(dir.path_for("castle.blb").unwrap(), tmp.path().join("castle.blb"));
    }

    #[test]
    fn path_for_rejects_bad_names() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = dir_in(&tmp);
        for bad in ["", "  ", "a/b", "~sneaky", ".."] {
            assert!(dir.path_for(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn temp_paths_are_unique_and_recognized() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = dir_in(&tmp);
        let a = dir.temp_path();
        let b = dir.temp_path();
        assert_ne!(a, b);
        assert!(FileDirectory::is_temp_path(&a));
        assert!(!FileDirectory::is_temp_path(&tmp.path().join("castle.blb")));
    }

    #[test]
    fn list_filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.blb"), b"x").unwrap();
        fs::write(tmp.path().join("~tmp.blb"), b"x").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(tmp.path().join("dir.blb")).unwrap();

        let mut entries = dir_in(&tmp).list().unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<(&str, bool)> = entries.iter().map(|e| (e.name.as_str(), e.is_temp)).collect();
        assert_eq!(names, vec![("a", false), ("~tmp", true)]);
        assert!(entries.iter().all(|e| e.modified.is_some()));
    }

    #[test]
    fn open_mounts_newest_manual() {
        let tmp = tempfile::tempdir().unwrap();
        let g = grid_of([(0, 0, "Wall")]);
        let (data, _) = FileData::default().appended(
            diff(&Grid::new(), &g),
            LevelMeta::default(),
            EntryKind::Manual,
            Version::NONE,
        );
        let path = tmp.path().join("lvl.blb");
        write_file(&path, &FileHeader::default(), &data).unwrap();

        let mut dir = dir_in(&tmp);
        let (grid, warnings) = dir.open(&path).unwrap();
        assert_eq!(grid, g);
        assert!(warnings.is_empty());
        assert_eq!(dir.cursor(), Version::manual(1));
        assert!(dir.is_mounted_path(&path));
    }

    #[test]
    fn failed_open_leaves_nothing_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.blb");
        write_file(&good, &FileHeader::default(), &FileData::default()).unwrap();
        let bad = tmp.path().join("bad.blb");
        fs::write(&bad, b"no separator").unwrap();

        let mut dir = dir_in(&tmp);
        dir.open(&good).unwrap();
        assert!(dir.open(&bad).is_err());
        assert!(dir.mounted().is_none());
        assert_eq!(dir.cursor(), Version::NONE);
    }

    #[test]
    fn close_deletes_temp_file_only() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dir = dir_in(&tmp);
        let temp = dir.temp_path();
        write_file(&temp, &FileHeader::default(), &FileData::default()).unwrap();
        dir.open(&temp).unwrap();
        dir.close().unwrap();
        assert!(!temp.exists());

        let kept = tmp.path().join("kept.blb");
        write_file(&kept, &FileHeader::default(), &FileData::default()).unwrap();
        dir.open(&kept).unwrap();
        dir.close().unwrap();
        assert!(kept.exists());
    }

    #[test]
    fn load_missing_autosave_moves_cursor_to_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let (data, _) = FileData::default().appended(
            diff(&Grid::new(), &grid_of([(1, 1, "Coin")])),
            LevelMeta::default(),
            EntryKind::Manual,
            Version::NONE,
        );
        let mut dir = dir_in(&tmp);
        dir.mount(
            FileInfo {
                path: tmp.path().join("x.blb"),
                is_temp: false,
                header: FileHeader::default(),
                data,
            },
            Version::manual(1),
        );
        let result = dir.load(Version::new(1, 5)).unwrap();
        assert!(!result.is_exact());
        assert_eq!(dir.cursor(), Version::manual(1));
        assert!(matches!(
            dir.load(Version::manual(4)),
            Err(BlbError::VersionNotFound { .. })
        ));
    }
}
