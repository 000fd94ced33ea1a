//! Writing a registration plan.

use color_eyre::eyre::{Result, WrapErr};
use std::io::Write;
use std::path::{Path, PathBuf};
use weft_plan::{EntityMapping, MappingEntry};

/// File name of the entry at 1-based `position`: `<NN>_<name>_<kind>.json`
#[must_use]
pub fn file_name(position: usize, width: usize, entry: &MappingEntry) -> String {
    let name = entry
        .spec
        .identifier()
        .map_or(entry.name.as_str(), |id| id.name.as_str());
    format!("{position:0width$}_{name}_{}.json", entry.spec.kind())
}

/// Write every registrable entry as pretty JSON into `dir`
///
/// Returns the written paths in plan order.
///
/// # Errors
///
/// Returns error if the directory cannot be created or a file cannot be
/// written
pub fn write_plan(mapping: &EntityMapping, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("cannot create output directory {}", dir.display()))?;

    let entries: Vec<&MappingEntry> = mapping.registration_plan().collect();
    let width = entries.len().to_string().len().max(2);
    let mut written = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let path = dir.join(file_name(i + 1, width, entry));
        let json = serde_json::to_string_pretty(entry.spec.as_ref())?;
        std::fs::write(&path, json).wrap_err_with(|| format!("cannot write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "wrote plan entry");
        written.push(path);
    }
    Ok(written)
}

/// Print the registrable entries as one JSON array
///
/// # Errors
///
/// Returns error if writing fails
pub fn print_plan(mapping: &EntityMapping, out: &mut impl Write) -> Result<()> {
    let specs: Vec<_> = mapping
        .registration_plan()
        .map(|e| e.spec.as_ref())
        .collect();
    serde_json::to_writer_pretty(&mut *out, &specs)?;
    writeln!(out)?;
    Ok(())
}
