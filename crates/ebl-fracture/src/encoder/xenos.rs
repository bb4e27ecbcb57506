use super::{
    clean_directory, field_name, format_float, join_lines, write_file, EncodeJob, Encoder,
};
use crate::classify::Primitive;
use crate::error::EncodeError;
use crate::types::ExposureFormat;
use std::path::PathBuf;
use tracing::debug;

/// Writes a `.ctl` control script and one `.pat` file holding a section per field.
#[derive(Debug, Clone, Copy, Default)]
pub struct XenosEncoder;

/// Text of the `.ctl` control script.
pub fn ctl_text(job: &EncodeJob<'_>) -> String {
    let (cx, cy) = job.field.center;
    let mut lines = vec![
        format!("; {}.ctl", job.name),
        format!(
            "ORIGIN {},{}",
            format_float(cx / 1000.0),
            format_float(cy / 1000.0)
        ),
        format!("CURRENT {}", format_float(job.beam_current)),
        format!("FIELD {},{}", format_float(job.field.size), job.field.dots),
        format!("SOURCE {}", job.source_name),
    ];
    if let Some(marks) = job.marks {
        for (x, y) in marks.in_mm() {
            lines.push(format!("MARK {},{}", format_float(x), format_float(y)));
        }
    }
    for (index, field) in job.fields.iter().enumerate() {
        let (x, y) = field.center_mm();
        lines.push(format!("STAGE {},{}", format_float(x), format_float(y)));
        lines.push(format!("DRAW {}.pat,{}", job.name, field_name(index)));
    }
    lines.push("END".to_string());
    join_lines(&lines)
}

/// The three lines describing one primitive.
pub fn primitive_lines(primitive: &Primitive) -> [String; 3] {
    let shape = if primitive.is_axis_aligned_rectangle() {
        let (p0, p2) = (primitive.ring[0], primitive.ring[2]);
        format!("RECT {},{},{},{}", p0.0, p0.1, p2.0, p2.1)
    } else {
        let corners = primitive.corners();
        let coords: Vec<String> = corners.iter().map(|(x, y)| format!("{x},{y}")).collect();
        format!("XPOLY {},{}", corners.len(), coords.join(","))
    };
    [
        format!("DOSE {}", format_float(primitive.dose)),
        format!("PITCH {}", primitive.pitch),
        shape,
    ]
}

/// Text of the `.pat` pattern file.
pub fn pat_text(job: &EncodeJob<'_>) -> Result<String, EncodeError> {
    let mut lines = vec![format!("; {}.pat", job.name)];
    for (index, field) in job.fields.iter().enumerate() {
        if job.cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }
        let (x, y) = field.center_mm();
        lines.push(format!(
            "FIELD {} {},{}",
            field_name(index),
            format_float(x),
            format_float(y)
        ));
        for primitive in &field.primitives {
            lines.extend(primitive_lines(primitive));
        }
    }
    lines.push("END".to_string());
    Ok(join_lines(&lines))
}

impl Encoder for XenosEncoder {
    fn format(&self) -> ExposureFormat {
        ExposureFormat::Xenos
    }

    fn encode(&self, job: &EncodeJob<'_>) -> Result<Vec<PathBuf>, EncodeError> {
        clean_directory(job.out_dir, self.format().extensions())?;

        let ctl_path = job.out_dir.join(format!("{}.ctl", job.name));
        write_file(&ctl_path, ctl_text(job).as_bytes())?;

        let pat_path = job.out_dir.join(format!("{}.pat", job.name));
        write_file(&pat_path, pat_text(job)?.as_bytes())?;

        debug!(fields = job.fields.len(), "wrote xenos job");
        Ok(vec![ctl_path, pat_path])
    }
}
