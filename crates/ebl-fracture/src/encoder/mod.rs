use crate::classify::Primitive;
use crate::error::EncodeError;
use crate::pipeline::CancelToken;
use crate::types::{ExposureFormat, FieldRect, FieldSpec, RegistrationMarks};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod cabl;
pub mod xenos;

pub use cabl::CablEncoder;
pub use xenos::XenosEncoder;

/// Classified primitives of one field, in partitioner order.
#[derive(Debug, Clone)]
pub struct FieldPrimitives {
    pub rect: FieldRect,
    pub primitives: Vec<Primitive>,
}

impl FieldPrimitives {
    /// Centre of the field in mm, the stage coordinate of the job files.
    pub fn center_mm(&self) -> (f64, f64) {
        let (x, y) = self.rect.center();
        (x / 1000.0, y / 1000.0)
    }
}

/// Everything an encoder needs to write one job.
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    /// Job name; the control file is `<name>.con` / `<name>.ctl`.
    pub name: &'a str,
    pub out_dir: &'a Path,
    pub field: FieldSpec,
    pub marks: Option<&'a RegistrationMarks>,
    /// Design the job was generated from.
    pub source_name: &'a str,
    pub beam_current: f64,
    /// Fields ordered by bottom, then left edge.
    pub fields: &'a [FieldPrimitives],
    pub cancel: &'a CancelToken,
}

/// Writes a job in one exposure format.
pub trait Encoder {
    fn format(&self) -> ExposureFormat;

    /// Write every file of the job and return their paths in write order.
    /// Existing files of this format in the output directory are removed first.
    fn encode(&self, job: &EncodeJob<'_>) -> Result<Vec<PathBuf>, EncodeError>;
}

/// Encoder for the configured format.
pub fn encoder_for(format: ExposureFormat) -> Box<dyn Encoder> {
    match format {
        ExposureFormat::Cabl => Box::new(CablEncoder),
        ExposureFormat::Xenos => Box::new(XenosEncoder),
    }
}

/// Name of the `index`-th field's files (`field_1`, `field_2`, ...).
pub fn field_name(index: usize) -> String {
    format!("field_{}", index + 1)
}

/// Job name derived from the output directory's own name.
pub fn job_name(out_dir: &Path) -> String {
    let resolved = fs::canonicalize(out_dir).unwrap_or_else(|_| out_dir.to_path_buf());
    resolved
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("job")
        .to_string()
}

/// Render a number the way the job files expect: shortest round-trip
/// decimal, always with a fractional part (`0.1`, `5.0`, `-2.5`).
pub fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// Remove every regular file in `dir` whose extension (case-insensitive) is
/// one of `extensions`.
pub fn clean_directory(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, EncodeError> {
    if !dir.is_dir() {
        return Err(EncodeError::MissingDirectory(dir.to_path_buf()));
    }
    let mut removed = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| EncodeError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| EncodeError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if matches {
            fs::remove_file(&path).map_err(|e| EncodeError::io(&path, e))?;
            debug!(path = %path.display(), "removed stale job file");
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<(), EncodeError> {
    fs::write(path, contents).map_err(|e| EncodeError::io(path, e))
}

/// Join lines with a trailing newline after each.
pub(crate) fn join_lines(lines: &[String]) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}
