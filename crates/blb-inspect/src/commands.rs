use std::io::Write;
use std::path::Path;

use serde::Serialize;

use blb_core::{
    BlbError, DecodedFile, FileData, FileHeader, file_time_to_datetime, read_file, sorted_tiles,
    write_file,
};

use crate::cli::{
    EditArgs, ExportArgs, ExtractArgs, FileArgs, FlattenArgs, ListArgs, OutputArgs, ShowArgs,
};
use crate::error::{InspectError, Result};

/// One row of `versions`.
#[derive(Debug, Serialize)]
struct VersionRow {
    version: String,
    kind: &'static str,
    id: u32,
    name: String,
    saved_at: Option<String>,
    added: usize,
    removed: usize,
}

fn open(path: &Path) -> Result<DecodedFile> {
    let decoded = read_file(path)?;
    for warning in &decoded.warnings {
        tracing::warn!(path = %path.display(), %warning, "decode warning");
    }
    Ok(decoded)
}

fn write_new(args: &OutputArgs, data: &FileData, out: &mut impl Write) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(InspectError::OutputExists {
            path: args.output.clone(),
        });
    }
    write_file(&args.output, &FileHeader::current(!args.plain), data)?;
    writeln!(
        out,
        "wrote {} ({} manual, {} auto)",
        args.output.display(),
        data.manual_saves.len(),
        data.auto_saves.len()
    )?;
    Ok(())
}

fn write_edited(
    args: &EditArgs,
    source: &FileHeader,
    data: &FileData,
    out: &mut impl Write,
) -> Result<()> {
    let target = args.output.as_deref().unwrap_or(&args.file);
    write_file(target, &FileHeader::current(source.is_compressed), data)?;
    writeln!(
        out,
        "wrote {} ({} manual, {} auto)",
        target.display(),
        data.manual_saves.len(),
        data.auto_saves.len()
    )?;
    Ok(())
}

pub fn header(args: &FileArgs, out: &mut impl Write) -> Result<()> {
    let decoded = open(&args.file)?;
    let data = &decoded.data;
    writeln!(out, "editor version: {}", decoded.header.editor_version_tag)?;
    writeln!(out, "compressed:     {}", decoded.header.is_compressed)?;
    writeln!(
        out,
        "history:        {} manual, {} auto (last id {})",
        data.manual_saves.len(),
        data.auto_saves.len(),
        data.last_id
    )?;
    if !data.description.is_empty() {
        writeln!(out, "description:    {}", data.description)?;
    }
    for warning in &decoded.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    Ok(())
}

pub fn versions(args: &ListArgs, out: &mut impl Write) -> Result<()> {
    let data = open(&args.file)?.data;
    let rows: Vec<VersionRow> = data
        .versions()
        .into_iter()
        .filter_map(|v| data.level(v))
        .map(|level| VersionRow {
            version: level.version.to_string(),
            kind: if level.version.is_manual() { "manual" } else { "auto" },
            id: level.id,
            name: level.name.clone(),
            saved_at: file_time_to_datetime(level.time_stamp).map(|t| t.to_rfc3339()),
            added: level.delta.added_tiles.len(),
            removed: level.delta.removed_tiles.len(),
        })
        .collect();

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &rows)?;
        writeln!(out)?;
        return Ok(());
    }
    for row in &rows {
        writeln!(
            out,
            "{:>8}  {:<6}  id={:<4} +{:<4} -{:<4} {}  {}",
            row.version,
            row.kind,
            row.id,
            row.added,
            row.removed,
            row.saved_at.as_deref().unwrap_or("-"),
            row.name
        )?;
    }
    Ok(())
}

pub fn show(args: &ShowArgs, out: &mut impl Write) -> Result<()> {
    let data = open(&args.file)?.data;
    let version = args.version.unwrap_or_else(|| data.newest_manual());
    if data.level(version).is_none() {
        return Err(BlbError::not_found(version).into());
    }
    let grid = data.reconstruct(Some(version)).exact()?;
    let tiles = sorted_tiles(&grid);

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &tiles)?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, "version {version}: {} tile(s)", tiles.len())?;
    for tile in &tiles {
        write!(
            out,
            "{:>5} {:>5}  {}",
            tile.position.x, tile.position.y, tile.state.kind
        )?;
        if let Some(color) = &tile.state.color {
            write!(out, " color={color}")?;
        }
        if let Some(direction) = &tile.state.direction {
            write!(out, " direction={direction:?}")?;
        }
        if let Some(path) = &tile.state.path {
            write!(out, " path={}", path.len())?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn validate(args: &FileArgs, out: &mut impl Write) -> Result<()> {
    let data = open(&args.file)?.data;
    let problems = data.validate();
    if problems.is_empty() {
        writeln!(out, "ok")?;
        return Ok(());
    }
    for problem in &problems {
        writeln!(out, "{problem}")?;
    }
    Err(InspectError::Inconsistent {
        count: problems.len(),
    })
}

pub fn export(args: &ExportArgs, out: &mut impl Write) -> Result<()> {
    let data = open(&args.file)?.data;
    let exported = data.single_version(args.version)?;
    write_new(&args.output, &exported, out)
}

pub fn extract(args: &ExtractArgs, out: &mut impl Write) -> Result<()> {
    let data = open(&args.file)?.data;
    let extracted = data.extract_selected(&args.versions)?;
    write_new(&args.output, &extracted, out)
}

pub fn flatten(args: &FlattenArgs, out: &mut impl Write) -> Result<()> {
    let data = open(&args.file)?.data;
    if data.manual_saves.is_empty() {
        return Err(InspectError::invalid("file has no manual saves to flatten"));
    }
    write_new(&args.output, &data.flattened(), out)
}

pub fn promote(args: &EditArgs, out: &mut impl Write) -> Result<()> {
    let decoded = open(&args.file)?;
    if let Some(manual) = args.versions.iter().find(|v| v.is_manual()) {
        return Err(InspectError::invalid(format!("{manual} is not an autosave")));
    }
    let data = decoded.data.promote_auto_saves(&args.versions)?;
    write_edited(args, &decoded.header, &data, out)
}

pub fn delete(args: &EditArgs, out: &mut impl Write) -> Result<()> {
    let decoded = open(&args.file)?;
    let cursor = decoded.data.newest_manual();
    let (data, _) = decoded.data.delete_versions(&args.versions, cursor)?;
    write_edited(args, &decoded.header, &data, out)
}
