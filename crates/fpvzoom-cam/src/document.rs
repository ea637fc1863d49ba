//! Line-preserving editor for the Majestic YAML file.
//!
//! This is not a YAML parser. It understands exactly one section header and
//! one field key inside it; every other line is carried through verbatim.

use std::collections::TryReserveError;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory buffering {path} ({len} bytes)")]
    OutOfMemory { path: PathBuf, len: u64 },

    #[error("section `{section}` not found")]
    SectionMissing { section: String },

    #[error("`{field}` not found inside `{section}`")]
    FieldMissing { section: String, field: String },

    #[error("cannot write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Section header plus the field we own beneath it, e.g. `video1` / `crop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    pub section: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(section: impl Into<String>, field: impl Into<String>) -> Self {
        Self { section: section.into(), field: field.into() }
    }
}

/// Row metadata derived from a scan. Stale after any mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub field_row: Option<usize>,
    pub insert_row: Option<usize>,
    pub section_indent: usize,
}

/// What `set_field` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Replaced { row: usize },
    Inserted { row: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<Vec<u8>>,
}

fn indent_width(line: &[u8]) -> usize {
    line.iter().take_while(|&&b| b == b' ' || b == b'\t').count()
}

fn is_blank(rest: &[u8]) -> bool {
    rest.iter().all(|b| b.is_ascii_whitespace())
}

/// `key:` followed only by whitespace or a comment. Inline values such as
/// `video1: &anchor` or `video1: {}` are not section headers.
fn is_header(rest: &[u8], key: &str) -> bool {
    let Some(after) = rest.strip_prefix(key.as_bytes()).and_then(|r| r.strip_prefix(b":")) else {
        return false;
    };
    match after.iter().position(|b| !b.is_ascii_whitespace()) {
        None => true,
        Some(i) => i > 0 && after[i] == b'#',
    }
}

fn is_field(rest: &[u8], key: &str) -> bool {
    rest.strip_prefix(key.as_bytes())
        .map_or(false, |r| r.starts_with(b":"))
}

/// Lines with their terminators, every allocation fallible.
fn split_lines(bytes: &[u8]) -> Result<Vec<Vec<u8>>, TryReserveError> {
    let mut lines = Vec::new();
    lines.try_reserve_exact(bytes.split_inclusive(|&b| b == b'\n').count())?;
    for chunk in bytes.split_inclusive(|&b| b == b'\n') {
        let mut line = Vec::new();
        line.try_reserve_exact(chunk.len())?;
        line.extend_from_slice(chunk);
        lines.push(line);
    }
    Ok(lines)
}

impl ConfigDocument {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let lines = bytes
            .split_inclusive(|&b| b == b'\n')
            .map(<[u8]>::to_vec)
            .collect();
        Self { lines }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)
            .map_err(|source| DocumentError::Open { path: path.to_owned(), source })?;
        let len = file
            .metadata()
            .map_err(|source| DocumentError::Read { path: path.to_owned(), source })?
            .len();

        let mut buf = Vec::new();
        buf.try_reserve_exact(len as usize)
            .map_err(|_| DocumentError::OutOfMemory { path: path.to_owned(), len })?;
        file.read_to_end(&mut buf)
            .map_err(|source| DocumentError::Read { path: path.to_owned(), source })?;

        let lines = split_lines(&buf)
            .map_err(|_| DocumentError::OutOfMemory { path: path.to_owned(), len })?;
        drop(buf);
        let doc = Self { lines };
        debug!(path = %path.display(), lines = doc.len(), "config loaded");
        Ok(doc)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, row: usize) -> Option<&[u8]> {
        self.lines.get(row).map(Vec::as_slice)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.lines.concat()
    }

    /// Scan for the first `key.section` header and, inside its indented
    /// block, the first `key.field` line.
    pub fn locate(&self, key: &FieldKey) -> Location {
        let mut loc = Location::default();
        let mut rows = self.lines.iter().enumerate();

        for (i, line) in rows.by_ref() {
            let indent = indent_width(line);
            if is_header(&line[indent..], &key.section) {
                loc.insert_row = Some(i + 1);
                loc.section_indent = indent;
                break;
            }
        }
        if loc.insert_row.is_none() {
            return loc;
        }

        for (i, line) in rows {
            let indent = indent_width(line);
            let rest = &line[indent..];
            if is_blank(rest) {
                continue;
            }
            if indent <= loc.section_indent {
                break;
            }
            if is_field(rest, &key.field) {
                loc.field_row = Some(i);
                break;
            }
        }
        loc
    }

    /// Current value of the field, trimmed, if present.
    pub fn field_value(&self, key: &FieldKey) -> Option<String> {
        let row = self.locate(key).field_row?;
        let line = &self.lines[row];
        let rest = &line[indent_width(line) + key.field.len() + 1..];
        Some(String::from_utf8_lossy(rest).trim().to_string())
    }

    /// Replace the field line in place, or insert it right after the header
    /// when `ensure_exists` is set. On error the document is unchanged.
    pub fn set_field(&mut self, key: &FieldKey, value: &str, ensure_exists: bool) -> Result<Edit, DocumentError> {
        let loc = self.locate(key);

        if let Some(row) = loc.field_row {
            let line = &self.lines[row];
            let mut replacement = line[..indent_width(line)].to_vec();
            replacement.extend_from_slice(format!("{}: {}\n", key.field, value).as_bytes());
            self.lines[row] = replacement;
            return Ok(Edit::Replaced { row });
        }

        match loc.insert_row {
            Some(row) if ensure_exists => {
                let mut inserted = vec![b' '; loc.section_indent + 2];
                inserted.extend_from_slice(format!("{}: {}\n", key.field, value).as_bytes());
                if let Some(header) = self.lines.get_mut(row - 1) {
                    if !header.ends_with(b"\n") {
                        header.push(b'\n');
                    }
                }
                self.lines.insert(row, inserted);
                Ok(Edit::Inserted { row })
            }
            Some(_) => Err(DocumentError::FieldMissing {
                section: key.section.clone(),
                field: key.field.clone(),
            }),
            None => Err(DocumentError::SectionMissing { section: key.section.clone() }),
        }
    }

    /// Write the whole document via a sibling temp file and rename, keeping
    /// the target's permissions. The target is untouched if any step fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        let write_err = |source| DocumentError::Write { path: path.to_owned(), source };

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".fpvzoom.tmp");
        let tmp = path.with_file_name(tmp_name);

        let result = (|| -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&self.to_bytes())?;
            f.sync_all()?;
            if let Ok(md) = fs::metadata(path) {
                fs::set_permissions(&tmp, md.permissions())?;
            }
            fs::rename(&tmp, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        debug!(path = %path.display(), lines = self.len(), "config saved");
        Ok(())
    }
}
