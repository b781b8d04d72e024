use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".{}.{seq}.tmp", std::process::id()));
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    Ok(())
}

/// Records of a line-delimited JSON file plus whether its tail needs repair.
#[derive(Debug)]
pub struct JsonlContents<T> {
    pub records: Vec<T>,
    /// The last line was unparseable or the file does not end in a newline.
    /// Appending to such a file would glue the next record onto the tail.
    pub torn_tail: bool,
}

/// Read every record of a line-delimited JSON file.
///
/// A missing file is an empty store. A malformed *last* line is treated as a
/// torn append and skipped; a malformed line anywhere else is structural
/// corruption and is returned as an error.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    Ok(load_jsonl(path)?.records)
}

/// Like [`read_jsonl`], but also reports a torn tail so writers can rewrite
/// the file instead of appending to it.
pub fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<JsonlContents<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(JsonlContents {
                records: Vec::new(),
                torn_tail: false,
            });
        }
        Err(error) => return Err(StoreError::io(path, error)),
    };

    let mut torn_tail = !contents.is_empty() && !contents.ends_with('\n');
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let last = lines.len().saturating_sub(1);

    let mut records = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(error) if idx == last => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "skipping torn trailing record"
                );
                torn_tail = true;
            }
            Err(error) => {
                return Err(StoreError::Malformed {
                    path: path.display().to_string(),
                    message: format!("line {}: {error}", idx + 1),
                });
            }
        }
    }
    Ok(JsonlContents { records, torn_tail })
}

/// Append one record as a single JSON line.
///
/// A trailing fragment left by an interrupted append is cut off first, so the
/// new record always starts on its own line.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    seal_tail(&mut file).map_err(|e| StoreError::io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| StoreError::io(path, e))
}

/// Ensure the file is empty or ends in a newline. A final line that is still
/// valid JSON only gets its newline; anything else after the last newline is
/// truncated.
fn seal_tail(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut contents = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    let line_start = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    let tail = &contents[line_start..];

    if serde_json::from_slice::<serde_json::Value>(tail).is_ok() {
        file.write_all(b"\n")
    } else {
        tracing::warn!(bytes = tail.len(), "truncating torn trailing record");
        file.set_len(line_start as u64)
    }
}

/// Replace the whole file with `records`, via temp file + rename.
pub fn write_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let mut buffer = String::new();
    for record in records {
        buffer.push_str(&serde_json::to_string(record)?);
        buffer.push('\n');
    }
    write_bytes_atomic(path, buffer.as_bytes())
}

/// Read a single JSON document. Missing or unparsable files yield `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to read state file");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring unparsable state file");
            None
        }
    }
}

/// Write a single pretty-printed JSON document atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &data)
}

fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let tmp = tmp_path_for(path);
    fs::write(&tmp, data).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
