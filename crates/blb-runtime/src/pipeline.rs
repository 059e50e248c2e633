#![forbid(unsafe_code)]

//! Single-writer persistence pipeline.
//!
//! [`PersistenceService`] owns the mounted file, the version cursor and the
//! one background save worker. The owning thread builds a job from copies
//! (the grid snapshot, the thumbnail, a clone of the mounted [`FileInfo`]),
//! hands it to a named worker thread, and later applies the worker's result
//! in [`tick`](PersistenceService::tick).
//!
//! # State machine
//!
//! ```text
//!            request_save / graph edit
//!   Idle ─────────────────────────────► Saving
//!    ▲                                    │ worker: diff, evict, append,
//!    │                                    │         encode, write
//!    └──── tick(): mount, cursor, status ◄┘
//! ```
//!
//! A request made while `Saving` is dropped, not queued.
//!
//! # Suspension
//!
//! A manual save without a real file name returns
//! [`SaveOutcome::NeedsFileName`]; a write over an existing, unmounted file
//! returns [`SaveOutcome::NeedsOverwriteConfirmation`]. The caller resumes
//! with [`provide_file_name`](PersistenceService::provide_file_name),
//! [`confirm_overwrite`](PersistenceService::confirm_overwrite) or
//! [`cancel`](PersistenceService::cancel). The editor keeps running in the
//! meantime; the grid is only snapshotted once a request actually starts.

use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use blb_core::{
    BlbError, EntryKind, ErrorKind, FileData, FileHeader, Grid, LevelMeta, Reconstructed, Result,
    Thumbnail, Version, diff, write_file,
};

use crate::config::SaveConfig;
use crate::directory::{FileDirectory, FileEntry, FileInfo, remove_temp_file};
use crate::dispatcher::MainThreadDispatcher;
use crate::session::EditSession;
use crate::status::{Status, StatusSink};

const TARGET: &str = "blb.save";

/// The editor as seen by the pipeline.
pub trait LevelEditor {
    /// An owned snapshot of the live grid.
    fn live_grid(&self) -> Grid;

    /// Encode a thumbnail of `grid`. Only called on the owning thread.
    fn encode_thumbnail(&mut self, grid: &Grid) -> Thumbnail;
}

/// What the caller wants written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveRequest {
    /// Autosave branching from the cursor's manual save. Creates a temp
    /// file if nothing is mounted.
    AutoSave,
    /// New manual save of the mounted file. Asks for a name if the mount is
    /// a temp file or there is no mount.
    ManualSave,
    /// New manual save written to `name`, which becomes the mount.
    SaveAs { name: String },
    /// One version of the mounted file, as a new single-version file.
    ExportVersion { version: Version, name: String },
    /// Several versions of the mounted file, each as a manual save.
    ExportSelected { versions: Vec<Version>, name: String },
    /// The live grid as a new single-version file.
    FlattenToNewFile { name: String },
}

impl SaveRequest {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoSave => "autosave",
            Self::ManualSave => "save",
            Self::SaveAs { .. } => "save as",
            Self::ExportVersion { .. } => "export",
            Self::ExportSelected { .. } => "export selected",
            Self::FlattenToNewFile { .. } => "flatten",
        }
    }

    fn named(&self) -> Option<&str> {
        match self {
            Self::AutoSave | Self::ManualSave => None,
            Self::SaveAs { name }
            | Self::ExportVersion { name, .. }
            | Self::ExportSelected { name, .. }
            | Self::FlattenToNewFile { name } => Some(name),
        }
    }

    fn with_name(self, name: &str) -> Self {
        let name = name.to_string();
        match self {
            Self::AutoSave | Self::ManualSave | Self::SaveAs { .. } => Self::SaveAs { name },
            Self::ExportVersion { version, .. } => Self::ExportVersion { version, name },
            Self::ExportSelected { versions, .. } => Self::ExportSelected { versions, name },
            Self::FlattenToNewFile { .. } => Self::FlattenToNewFile { name },
        }
    }

    fn needs_grid(&self) -> bool {
        matches!(
            self,
            Self::AutoSave | Self::ManualSave | Self::SaveAs { .. } | Self::FlattenToNewFile { .. }
        )
    }

    fn needs_mount(&self) -> bool {
        matches!(self, Self::ExportVersion { .. } | Self::ExportSelected { .. })
    }
}

/// A request waiting on the caller for a file name or an overwrite
/// confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    request: SaveRequest,
    destination: Option<PathBuf>,
}

impl PendingSave {
    #[must_use]
    pub fn request(&self) -> &SaveRequest {
        &self.request
    }

    /// The existing file that would be overwritten, if that is what this
    /// request is waiting on.
    #[must_use]
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }
}

/// Immediate answer to a request. The final result arrives as a
/// [`Status`] after [`PersistenceService::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A worker is running.
    Started,
    /// Refused before starting; a status explains why.
    Rejected(ErrorKind),
    /// Another save was in flight.
    Dropped,
    NeedsFileName(PendingSave),
    NeedsOverwriteConfirmation(PendingSave),
}

// ---------------------------------------------------------------------------
// Owning-thread state
// ---------------------------------------------------------------------------

/// State touched by completion callbacks. Lives on the owning thread.
struct Shared {
    directory: FileDirectory,
    session: EditSession,
    sink: Box<dyn StatusSink>,
    in_flight: bool,
}

impl Shared {
    fn notify(&mut self, status: Status) {
        tracing::debug!(target: TARGET, level = ?status.level, message = %status.message, "status");
        self.sink.notify(status);
    }

    fn finish(&mut self, label: &'static str, result: Result<Completion>) {
        self.in_flight = false;
        match result {
            Ok(Completion::Saved {
                info,
                version,
                replaced_temp,
                generation,
            }) => {
                let name = info.name();
                self.directory.mount(info, version);
                if let Some(old) = replaced_temp
                    && let Err(e) = remove_temp_file(&old)
                {
                    tracing::warn!(target: TARGET, path = %old.display(), error = %e, "could not remove temp file");
                }
                self.session.mark_saved(generation, Instant::now());
                self.notify(Status::info(format!("Saved {name} (version {version})")));
            }
            Ok(Completion::NothingToSave { generation }) => {
                self.session.mark_saved(generation, Instant::now());
                self.notify(Status::info("Nothing to save"));
            }
            Ok(Completion::Exported { path, versions }) => {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.notify(Status::info(format!("Exported {versions} version(s) to {name}")));
            }
            Ok(Completion::Rewritten {
                info,
                cursor,
                message,
            }) => {
                self.directory.mount(info, cursor);
                self.notify(Status::info(message));
            }
            Err(e) => {
                tracing::error!(target: TARGET, kind = label, error = %e, "background job failed");
                let context = capitalized(label);
                self.notify(Status::from_error(&context, &e));
            }
        }
    }
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Worker jobs
// ---------------------------------------------------------------------------

/// What the worker reports back.
enum Completion {
    Saved {
        info: FileInfo,
        version: Version,
        replaced_temp: Option<PathBuf>,
        generation: u64,
    },
    NothingToSave {
        generation: u64,
    },
    Exported {
        path: PathBuf,
        versions: usize,
    },
    Rewritten {
        info: FileInfo,
        cursor: Version,
        message: String,
    },
}

/// Append a new version to a copy of a file.
struct AppendJob {
    kind: EntryKind,
    base: FileInfo,
    destination: PathBuf,
    is_temp: bool,
    in_place: bool,
    grid: Grid,
    meta: LevelMeta,
    cursor: Version,
    max_entries: usize,
    header: FileHeader,
    replaced_temp: Option<PathBuf>,
    generation: u64,
}

enum ExportSource {
    Version(Version),
    Selected(Vec<Version>),
    Grid { grid: Grid, meta: LevelMeta },
}

/// Write a new file derived from a copy; the mount is untouched.
struct ExportJob {
    data: FileData,
    source: ExportSource,
    destination: PathBuf,
    header: FileHeader,
}

enum GraphEdit {
    Delete(Vec<Version>),
    Promote(Vec<Version>),
    Describe(String),
}

/// Rewrite the mounted file after a graph edit.
struct RewriteJob {
    info: FileInfo,
    cursor: Version,
    edit: GraphEdit,
    header: FileHeader,
}

enum Job {
    Append(AppendJob),
    Export(ExportJob),
    Rewrite(RewriteJob),
}

impl Job {
    fn run(self) -> Result<Completion> {
        match self {
            Self::Append(job) => job.run(),
            Self::Export(job) => job.run(),
            Self::Rewrite(job) => job.run(),
        }
    }
}

impl AppendJob {
    fn run(self) -> Result<Completion> {
        // The no-op check is against the version on screen; the stored delta
        // is against the newest manual or the autosave's branch manual.
        if self.in_place {
            let last_known = self.base.data.reconstruct(Some(self.cursor)).into_grid();
            if !diff(&last_known, &self.grid).has_changes() {
                tracing::debug!(target: TARGET, cursor = %self.cursor, "no changes since last save");
                return Ok(Completion::NothingToSave {
                    generation: self.generation,
                });
            }
        }

        let base_grid = match self.kind {
            EntryKind::Manual => self.base.data.reconstruct(None),
            EntryKind::Auto => self.base.data.reconstruct(Some(self.cursor.branch())),
        }
        .into_grid();
        let delta = diff(&base_grid, &self.grid);

        let data = self.base.data.with_room_for(self.kind, self.max_entries);
        let (data, version) = data.appended(delta, self.meta, self.kind, self.cursor);
        write_file(&self.destination, &self.header, &data)?;
        tracing::Span::current().record("version", tracing::field::display(version));

        Ok(Completion::Saved {
            info: FileInfo {
                path: self.destination,
                is_temp: self.is_temp,
                header: self.header,
                data,
            },
            version,
            replaced_temp: self.replaced_temp,
            generation: self.generation,
        })
    }
}

impl ExportJob {
    fn run(self) -> Result<Completion> {
        let data = match self.source {
            ExportSource::Version(version) => self.data.single_version(version)?,
            ExportSource::Selected(versions) => self.data.extract_selected(&versions)?,
            ExportSource::Grid { grid, meta } => {
                FileData::from_grid(&grid, meta, self.data.description.clone())
            }
        };
        write_file(&self.destination, &self.header, &data)?;
        Ok(Completion::Exported {
            path: self.destination,
            versions: data.manual_saves.len(),
        })
    }
}

impl RewriteJob {
    fn run(self) -> Result<Completion> {
        let data = &self.info.data;
        let (data, cursor, message) = match self.edit {
            GraphEdit::Delete(versions) => {
                let (next, cursor) = data.delete_versions(&versions, self.cursor)?;
                let deleted = data.entry_count().saturating_sub(next.entry_count());
                (next, cursor, format!("Deleted {deleted} version(s)"))
            }
            GraphEdit::Promote(versions) => {
                let cursor_id = data.level(self.cursor).map(|l| l.id);
                let next = data.promote_auto_saves(&versions)?;
                let cursor = cursor_id
                    .and_then(|id| next.version_of_id(id))
                    .unwrap_or(self.cursor);
                let promoted = next.manual_saves.len().saturating_sub(data.manual_saves.len());
                (next, cursor, format!("Promoted {promoted} autosave(s)"))
            }
            GraphEdit::Describe(description) => (
                FileData {
                    description,
                    ..data.clone()
                },
                self.cursor,
                "Updated description".to_string(),
            ),
        };
        write_file(&self.info.path, &self.header, &data)?;
        Ok(Completion::Rewritten {
            info: FileInfo {
                data,
                header: self.header,
                ..self.info
            },
            cursor,
            message,
        })
    }
}

// ---------------------------------------------------------------------------
// PersistenceService
// ---------------------------------------------------------------------------

/// Owns the mount, the cursor, the edit session and the save worker.
///
/// Call [`tick`](Self::tick) once per frame on the owning thread.
pub struct PersistenceService {
    config: SaveConfig,
    shared: Shared,
    dispatcher: MainThreadDispatcher<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl PersistenceService {
    pub fn new(config: SaveConfig, sink: impl StatusSink + 'static) -> Self {
        let session = EditSession::new(
            Duration::from_secs(config.autosave_interval_secs),
            Instant::now(),
        );
        Self {
            shared: Shared {
                directory: FileDirectory::new(&config),
                session,
                sink: Box::new(sink),
                in_flight: false,
            },
            config,
            dispatcher: MainThreadDispatcher::new(),
            worker: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &FileDirectory {
        &self.shared.directory
    }

    #[must_use]
    pub fn mounted(&self) -> Option<&FileInfo> {
        self.shared.directory.mounted()
    }

    #[must_use]
    pub fn cursor(&self) -> Version {
        self.shared.directory.cursor()
    }

    #[must_use]
    pub fn session(&self) -> &EditSession {
        &self.shared.session
    }

    pub fn session_mut(&mut self) -> &mut EditSession {
        &mut self.shared.session
    }

    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.shared.in_flight
    }

    pub fn list_files(&self) -> io::Result<Vec<FileEntry>> {
        self.shared.directory.list()
    }

    /// Apply finished background work. Returns the number of callbacks run.
    pub fn tick(&mut self) -> usize {
        self.dispatcher.drain(&mut self.shared)
    }

    /// Wait for the in-flight worker, if any, and apply its result.
    pub fn flush(&mut self) {
        if let Some(handle) = self.worker.take() {
            join_worker(handle);
        }
        self.tick();
        if self.shared.in_flight {
            self.shared.finish(
                "save",
                Err(BlbError::state("save worker exited without reporting")),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Saving
    // -----------------------------------------------------------------------

    pub fn request_save(
        &mut self,
        request: SaveRequest,
        editor: &mut impl LevelEditor,
    ) -> SaveOutcome {
        self.begin(request, false, editor)
    }

    /// Resume a request that was waiting for a file name.
    pub fn provide_file_name(
        &mut self,
        pending: PendingSave,
        name: &str,
        editor: &mut impl LevelEditor,
    ) -> SaveOutcome {
        self.begin(pending.request.with_name(name), false, editor)
    }

    /// Resume a request that was waiting for overwrite confirmation.
    pub fn confirm_overwrite(
        &mut self,
        pending: PendingSave,
        editor: &mut impl LevelEditor,
    ) -> SaveOutcome {
        self.begin(pending.request, true, editor)
    }

    /// Abandon a suspended request.
    pub fn cancel(&mut self, pending: PendingSave) {
        tracing::debug!(target: TARGET, kind = pending.request.label(), "request cancelled");
        self.shared
            .notify(Status::info(format!("{} cancelled", capitalized(pending.request.label()))));
    }

    /// Start an autosave if the session says one is due and nothing is in
    /// flight.
    pub fn autosave_if_due(
        &mut self,
        now: Instant,
        editor: &mut impl LevelEditor,
    ) -> Option<SaveOutcome> {
        if self.shared.in_flight || !self.shared.session.autosave_due(now) {
            return None;
        }
        Some(self.request_save(SaveRequest::AutoSave, editor))
    }

    fn reject(&mut self, context: &str, err: BlbError) -> SaveOutcome {
        let kind = err.kind();
        tracing::debug!(target: TARGET, error = %err, "request rejected");
        self.shared.notify(Status::from_error(&capitalized(context), &err));
        SaveOutcome::Rejected(kind)
    }

    fn drop_request(&mut self, label: &str) -> SaveOutcome {
        tracing::debug!(target: TARGET, kind = label, "save already in flight; dropping request");
        self.shared
            .notify(Status::info("A save is already in progress"));
        SaveOutcome::Dropped
    }

    fn write_header(&self) -> FileHeader {
        FileHeader {
            editor_version_tag: self.config.editor_version_tag.clone(),
            is_compressed: self.config.compress,
        }
    }

    fn begin(
        &mut self,
        request: SaveRequest,
        overwrite_confirmed: bool,
        editor: &mut impl LevelEditor,
    ) -> SaveOutcome {
        let label = request.label();

        let grid = if request.needs_grid() {
            let grid = editor.live_grid();
            if grid.is_empty() {
                return self.reject(label, BlbError::EmptyLevel);
            }
            grid
        } else {
            Grid::new()
        };

        if self.shared.in_flight {
            return self.drop_request(label);
        }

        let mounted = self.shared.directory.mounted().cloned();
        if request.needs_mount() && mounted.is_none() {
            return self.reject(label, BlbError::state("no file is open"));
        }

        if matches!(request, SaveRequest::ManualSave)
            && mounted.as_ref().is_none_or(|info| info.is_temp)
        {
            return SaveOutcome::NeedsFileName(PendingSave {
                request,
                destination: None,
            });
        }

        let destination = match (request.named(), &mounted) {
            (Some(name), _) => match self.shared.directory.path_for(name) {
                Ok(path) => path,
                Err(e) => return self.reject(label, e),
            },
            (None, Some(info)) => info.path.clone(),
            (None, None) => self.shared.directory.temp_path(),
        };

        let in_place = self.shared.directory.is_mounted_path(&destination);
        if request.named().is_some() && !overwrite_confirmed && !in_place && destination.exists() {
            return SaveOutcome::NeedsOverwriteConfirmation(PendingSave {
                request,
                destination: Some(destination),
            });
        }

        // Everything below runs only once the request is definitely going
        // ahead: snapshot the level and encode its thumbnail here, on the
        // owning thread.
        let header = self.write_header();
        let job = match request {
            SaveRequest::AutoSave | SaveRequest::ManualSave | SaveRequest::SaveAs { .. } => {
                let kind = if matches!(request, SaveRequest::AutoSave) {
                    EntryKind::Auto
                } else {
                    EntryKind::Manual
                };
                let is_temp = match &mounted {
                    Some(info) if in_place => info.is_temp,
                    _ => FileDirectory::is_temp_path(&destination),
                };
                let replaced_temp = mounted
                    .as_ref()
                    .filter(|info| info.is_temp && !in_place)
                    .map(|info| info.path.clone());
                let base = mounted.unwrap_or_else(|| {
                    FileInfo::empty(destination.clone(), is_temp, header.clone())
                });
                let meta = LevelMeta::now(display_stem(&destination), editor.encode_thumbnail(&grid));
                Job::Append(AppendJob {
                    kind,
                    base,
                    destination: destination.clone(),
                    is_temp,
                    in_place,
                    grid,
                    meta,
                    cursor: self.shared.directory.cursor(),
                    max_entries: match kind {
                        EntryKind::Manual => self.config.max_manual_saves,
                        EntryKind::Auto => self.config.max_auto_saves,
                    },
                    header,
                    replaced_temp,
                    generation: self.shared.session.generation(),
                })
            }
            SaveRequest::FlattenToNewFile { .. } => {
                let meta = LevelMeta::now(display_stem(&destination), editor.encode_thumbnail(&grid));
                Job::Export(ExportJob {
                    data: mounted.map(|info| info.data).unwrap_or_default(),
                    source: ExportSource::Grid { grid, meta },
                    destination: destination.clone(),
                    header,
                })
            }
            SaveRequest::ExportVersion { version, .. } => Job::Export(ExportJob {
                data: mounted.map(|info| info.data).unwrap_or_default(),
                source: ExportSource::Version(version),
                destination: destination.clone(),
                header,
            }),
            SaveRequest::ExportSelected { versions, .. } => Job::Export(ExportJob {
                data: mounted.map(|info| info.data).unwrap_or_default(),
                source: ExportSource::Selected(versions),
                destination: destination.clone(),
                header,
            }),
        };

        self.spawn(label, &destination, job)
    }

    // -----------------------------------------------------------------------
    // Graph edits on the mounted file
    // -----------------------------------------------------------------------

    /// Delete versions of the mounted file in the background.
    pub fn delete_versions(&mut self, versions: &[Version]) -> SaveOutcome {
        self.rewrite("delete", GraphEdit::Delete(versions.to_vec()))
    }

    /// Promote autosaves of the mounted file in the background.
    pub fn promote_auto_saves(&mut self, versions: &[Version]) -> SaveOutcome {
        self.rewrite("promote", GraphEdit::Promote(versions.to_vec()))
    }

    pub fn update_description(&mut self, description: impl Into<String>) -> SaveOutcome {
        self.rewrite("update description", GraphEdit::Describe(description.into()))
    }

    fn rewrite(&mut self, label: &'static str, edit: GraphEdit) -> SaveOutcome {
        if self.shared.in_flight {
            return self.drop_request(label);
        }
        let Some(info) = self.shared.directory.mounted().cloned() else {
            return self.reject(label, BlbError::state("no file is open"));
        };
        let destination = info.path.clone();
        let job = Job::Rewrite(RewriteJob {
            info,
            cursor: self.shared.directory.cursor(),
            edit,
            header: self.write_header(),
        });
        self.spawn(label, &destination, job)
    }

    fn spawn(&mut self, label: &'static str, destination: &Path, job: Job) -> SaveOutcome {
        if let Some(previous) = self.worker.take() {
            // Its completion has already been applied; it is only exiting.
            join_worker(previous);
        }

        let span = tracing::info_span!(
            target: TARGET,
            "blb.save",
            kind = label,
            destination = %destination.display(),
            version = tracing::field::Empty,
        );
        let subscriber = tracing::dispatcher::get_default(Clone::clone);
        let dispatcher = self.dispatcher.clone();
        let spawned = thread::Builder::new()
            .name("blb-save".into())
            .spawn(move || {
                let result =
                    tracing::dispatcher::with_default(&subscriber, || span.in_scope(|| job.run()));
                dispatcher.enqueue(move |shared: &mut Shared| shared.finish(label, result));
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!(target: TARGET, kind = label, "worker started");
                self.shared.in_flight = true;
                self.worker = Some(handle);
                SaveOutcome::Started
            }
            Err(e) => self.reject(label, BlbError::Io(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Opening, loading, closing
    // -----------------------------------------------------------------------

    fn ensure_idle(&mut self, context: &str) -> Result<()> {
        if self.shared.in_flight {
            let err = BlbError::state("a save is in progress");
            self.shared
                .notify(Status::from_error(&capitalized(context), &err));
            return Err(err);
        }
        Ok(())
    }

    /// Open and mount `path`; returns its newest manual grid for the
    /// editor. A failed open leaves nothing mounted.
    pub fn open_file(&mut self, path: &Path) -> Result<Grid> {
        self.ensure_idle("open")?;
        match self.shared.directory.open(path) {
            Ok((grid, warnings)) => {
                self.shared.session.reset(Instant::now());
                let name = display_stem(path);
                let status = if warnings.is_empty() {
                    Status::info(format!("Opened {name}"))
                } else {
                    let details: Vec<String> = warnings.iter().map(ToString::to_string).collect();
                    Status::warning(format!("Opened {name}: {}", details.join("; ")))
                };
                self.shared.notify(status);
                Ok(grid)
            }
            Err(e) => {
                self.shared.notify(Status::from_error("Open", &e));
                Err(e)
            }
        }
    }

    /// Reconstruct `version` of the mounted file and move the cursor to it.
    ///
    /// A missing autosave falls back to its manual save; the cursor then
    /// points at the manual save and the status says so.
    pub fn load_version(&mut self, version: Version) -> Result<Grid> {
        self.ensure_idle("load")?;
        match self.shared.directory.load(version) {
            Ok(Reconstructed::Exact(grid)) => {
                self.shared.session.reset(Instant::now());
                self.shared
                    .notify(Status::info(format!("Loaded version {version}")));
                Ok(grid)
            }
            Ok(Reconstructed::ManualFallback { grid, missing }) => {
                self.shared.session.reset(Instant::now());
                self.shared.notify(Status::warning(format!(
                    "Autosave {missing} not found; loaded version {}",
                    missing.branch()
                )));
                Ok(grid)
            }
            Err(e) => {
                self.shared.notify(Status::from_error("Load", &e));
                Err(e)
            }
        }
    }

    /// Unmount the current file, deleting it if it was a temp file.
    pub fn close_file(&mut self) -> Result<()> {
        self.ensure_idle("close")?;
        match self.shared.directory.close() {
            Ok(Some(info)) => {
                self.shared
                    .notify(Status::info(format!("Closed {}", info.name())));
                Ok(())
            }
            Ok(None) => {
                self.shared.notify(Status::info("No file is open"));
                Ok(())
            }
            Err(e) => {
                self.shared.notify(Status::from_error("Close", &e));
                Err(e)
            }
        }
    }
}

impl Drop for PersistenceService {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            join_worker(handle);
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!(target: TARGET, "save worker panicked");
    }
}

fn display_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blb_core::grid_of;

    #[test]
    fn provided_name_turns_manual_save_into_save_as() {
        assert_eq!(
            SaveRequest::ManualSave.with_name("castle"),
            SaveRequest::SaveAs {
                name: "castle".into()
            }
        );
        assert_eq!(
            SaveRequest::ExportVersion {
                version: Version::manual(2),
                name: "old".into()
            }
            .with_name("new"),
            SaveRequest::ExportVersion {
                version: Version::manual(2),
                name: "new".into()
            }
        );
    }

    #[test]
    fn labels_capitalize() {
        assert_eq!(capitalized(SaveRequest::SaveAs { name: String::new() }.label()), "Save as");
        assert_eq!(capitalized(""), "");
    }

    #[test]
    fn panicked_worker_is_logged() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::SubscriberExt;

        struct Errors(Arc<Mutex<Vec<String>>>);
        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Errors {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::ERROR {
                    self.0.lock().unwrap().push(event.metadata().target().to_string());
                }
            }
        }

        let errors = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Errors(errors.clone()));
        let handle: JoinHandle<()> = thread::spawn(|| panic!("worker blew up"));
        tracing::subscriber::with_default(subscriber, || join_worker(handle));
        assert_eq!(*errors.lock().unwrap(), vec![TARGET.to_string()]);
    }

    #[test]
    fn append_job_skips_unchanged_in_place_save() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lvl.blb");
        let grid = grid_of([(0, 0, "Wall")]);
        let data = FileData::from_grid(&grid, LevelMeta::default(), "");
        let job = AppendJob {
            kind: EntryKind::Manual,
            base: FileInfo {
                path: path.clone(),
                is_temp: false,
                header: FileHeader::default(),
                data,
            },
            destination: path.clone(),
            is_temp: false,
            in_place: true,
            grid,
            meta: LevelMeta::default(),
            cursor: Version::manual(1),
            max_entries: 10,
            header: FileHeader::default(),
            replaced_temp: None,
            generation: 3,
        };
        assert!(matches!(
            job.run(),
            Ok(Completion::NothingToSave { generation: 3 })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn rewrite_job_keeps_cursor_on_promoted_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lvl.blb");
        let base = FileData::from_grid(&grid_of([(0, 0, "Wall")]), LevelMeta::default(), "");
        let (data, auto) = base.appended(
            diff(&grid_of([(0, 0, "Wall")]), &grid_of([(0, 0, "Wall"), (1, 0, "Coin")])),
            LevelMeta::default(),
            EntryKind::Auto,
            Version::manual(1),
        );
        let job = RewriteJob {
            info: FileInfo {
                path: path.clone(),
                is_temp: false,
                header: FileHeader::default(),
                data,
            },
            cursor: auto,
            edit: GraphEdit::Promote(vec![auto]),
            header: FileHeader::default(),
        };
        match job.run() {
            Ok(Completion::Rewritten { info, cursor, .. }) => {
                assert_eq!(cursor, Version::manual(2));
                assert_eq!(info.data.manual_saves.len(), 2);
                assert!(path.exists());
            }
            _ => panic!("promote rewrite failed"),
        }
    }
}
