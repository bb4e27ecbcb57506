use super::{
    clean_directory, field_name, format_float, join_lines, write_file, EncodeJob, Encoder,
    FieldPrimitives,
};
use crate::classify::Primitive;
use crate::error::EncodeError;
use crate::types::{ExposureFormat, FieldSpec};
use std::path::PathBuf;
use tracing::debug;

/// Width of the `.cbc` header region the file name is padded into.
const HEADER_WIDTH: usize = 24;
const FILLER: u8 = 0xCC;
const TRAILER_TAG: [u8; 4] = [0xFF, 0xFF, 0x13, 0x00];
const TRAILER_FILL: usize = 34;

/// Writes one `.con` placement file plus a `.ccc` listing and a `.cbc` pattern per field.
#[derive(Debug, Clone, Copy, Default)]
pub struct CablEncoder;

/// `CZ<size_mm>,<dots>` grid header.
pub fn grid_header(field: &FieldSpec) -> String {
    format!("CZ{},{}", format_float(field.size / 1000.0), field.dots)
}

/// Text of the `.con` placement file.
pub fn con_text(job: &EncodeJob<'_>) -> String {
    let file_name = format!("{}.con", job.name);
    let mut lines = vec![
        format!("/*--- {file_name} ---*/"),
        format!("{};", grid_header(&job.field)),
    ];
    if let Some([low, high]) = job.marks.and_then(|m| m.cabl_pair_mm()) {
        lines.push(format!(
            "R2 {},{}; {},{};",
            format_float(low.0),
            format_float(low.1),
            format_float(high.0),
            format_float(high.1)
        ));
    }
    for (index, field) in job.fields.iter().enumerate() {
        let name = field_name(index);
        let (x, y) = field.center_mm();
        let position = format!("{},{};", format_float(x), format_float(y));
        lines.push(format!("PC{name};"));
        lines.push(position.clone());
        lines.push(format!("PP{name};"));
        lines.push(position);
    }
    lines.push("!END".to_string());
    join_lines(&lines)
}

/// One `.ccc` pattern line.
pub fn pattern_line(primitive: &Primitive) -> String {
    format!(
        "{}({}{},{});3",
        primitive.kind,
        primitive.coordinate_text(),
        primitive.pitch,
        format_float(primitive.dose)
    )
}

/// Text of a field's `.ccc` listing.
pub fn ccc_text(name: &str, field_spec: &FieldSpec, field: &FieldPrimitives) -> String {
    let mut lines = vec![
        format!("/*--- {name}.ccc ---*/"),
        format!("/* {} */", grid_header(field_spec)),
        "PATTERN".to_string(),
    ];
    lines.extend(field.primitives.iter().map(pattern_line));
    lines.push("!END".to_string());
    join_lines(&lines)
}

/// Bytes of a field's `.cbc` binary pattern.
pub fn cbc_bytes(name: &str, field: &FieldPrimitives) -> Vec<u8> {
    let file_name = format!("{name}.cbc");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(file_name.as_bytes());
    bytes.extend_from_slice(b";1.1;");
    bytes.push(0x00);
    bytes.resize(
        bytes.len() + HEADER_WIDTH.saturating_sub(file_name.len()),
        FILLER,
    );
    for primitive in &field.primitives {
        bytes.extend_from_slice(&primitive.record.to_bytes());
    }
    bytes.extend_from_slice(&TRAILER_TAG);
    bytes.resize(bytes.len() + TRAILER_FILL, FILLER);
    bytes
}

impl Encoder for CablEncoder {
    fn format(&self) -> ExposureFormat {
        ExposureFormat::Cabl
    }

    fn encode(&self, job: &EncodeJob<'_>) -> Result<Vec<PathBuf>, EncodeError> {
        clean_directory(job.out_dir, self.format().extensions())?;

        let mut written = Vec::with_capacity(1 + 2 * job.fields.len());
        let con_path = job.out_dir.join(format!("{}.con", job.name));
        write_file(&con_path, con_text(job).as_bytes())?;
        written.push(con_path);

        for (index, field) in job.fields.iter().enumerate() {
            if job.cancel.is_cancelled() {
                return Err(EncodeError::Cancelled);
            }
            let name = field_name(index);

            let ccc_path = job.out_dir.join(format!("{name}.ccc"));
            write_file(&ccc_path, ccc_text(&name, &job.field, field).as_bytes())?;
            let cbc_path = job.out_dir.join(format!("{name}.cbc"));
            write_file(&cbc_path, &cbc_bytes(&name, field))?;

            debug!(field = %name, primitives = field.primitives.len(), "wrote cabl field");
            written.push(ccc_path);
            written.push(cbc_path);
        }
        Ok(written)
    }
}
