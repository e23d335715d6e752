//! JSON Lines file helpers shared by the outbox and the history log.
//!
//! None of these take locks; callers serialize on a sibling lock file so the
//! lock survives the rename done by `rewrite`.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// `path` with `suffix` appended to its file name
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Open (creating) the lock file `<path><suffix>`
pub(crate) fn open_lock(path: &Path, suffix: &str) -> Result<File> {
    ensure_parent_dir(path)?;
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(sibling(path, suffix))?;
    Ok(file)
}

/// Open `path` for appending, terminating a torn last line first
///
/// A crash mid-append can leave a final line without its newline. Appending
/// straight after it would glue the new record onto the broken one and both
/// would be skipped on read.
pub(crate) fn open_append(path: &Path) -> Result<File> {
    ensure_parent_dir(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let len = file.metadata()?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            tracing::warn!("Terminating torn last line of {:?}", path);
            file.write_all(b"\n")?;
        }
    }
    Ok(file)
}

/// Append one value as a line and fsync
pub(crate) fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = open_append(path)?;
    let mut writer = std::io::BufWriter::new(&file);
    writer.write_all(serde_json::to_string(value)?.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

/// Every parseable line of `path`; a missing file is empty
pub(crate) fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut values = Vec::new();
    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(value) => values.push(value),
            Err(e) => {
                tracing::warn!("Skipping line {} of {:?}: {}", line_num + 1, path, e);
            }
        }
    }
    Ok(values)
}

/// Replace the whole file with `values` via temp file and rename
pub(crate) fn rewrite<T: Serialize>(path: &Path, values: &[T]) -> Result<()> {
    ensure_parent_dir(path)?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        for value in values {
            writer.write_all(serde_json::to_string(value)?.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
