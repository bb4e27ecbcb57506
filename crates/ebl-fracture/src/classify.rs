use crate::error::{Rejection, RejectionReason};
use crate::types::FieldRect;
use std::fmt;

/// Scan direction byte written into every binary record.
pub const DIRECTION: u8 = b'x';

/// Leading tag of a binary primitive record.
const RECORD_TAG: [u8; 4] = [0x01, 0x08, 0x13, 0x00];

/// Primitive vocabulary of the pattern format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Rectangle or parallelogram given by two opposite corners.
    Rectangle,
    /// Four-corner trapezoid with slanted sides.
    Trapezoid,
    /// Three-corner piece.
    Triangle,
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Rectangle => "DWSL",
            PrimitiveKind::Trapezoid => "DWTZL",
            PrimitiveKind::Triangle => "DWTL",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The packed parametric form of a primitive (`< 3i 3f 2i`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveRecord {
    pub x0: i32,
    pub y0: i32,
    /// Offset of the bottom-right corner from `x0`, or 1 when that corner is
    /// not on the start row.
    pub off2: i32,
    pub slope1: f32,
    pub pitch: f32,
    pub slope2: f32,
    /// Height in dots, counting both edge rows.
    pub height: i32,
    /// Dose in hundredths of a µs.
    pub dose: i32,
}

impl PrimitiveRecord {
    /// Encoded size of one record, tag and direction included.
    pub const SIZE: usize = 38;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&RECORD_TAG);
        bytes.push(DIRECTION);
        bytes.push(0x00);
        bytes.extend_from_slice(&self.x0.to_le_bytes());
        bytes.extend_from_slice(&self.y0.to_le_bytes());
        bytes.extend_from_slice(&self.off2.to_le_bytes());
        bytes.extend_from_slice(&self.slope1.to_le_bytes());
        bytes.extend_from_slice(&self.pitch.to_le_bytes());
        bytes.extend_from_slice(&self.slope2.to_le_bytes());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.dose.to_le_bytes());
        bytes
    }
}

/// A classified primitive in field-local dot coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    /// Canonical closed ring: starts and ends on the top-left-most corner.
    pub ring: Vec<(i64, i64)>,
    pub record: PrimitiveRecord,
    /// Dose in µs.
    pub dose: f64,
    pub pitch: u32,
}

impl Primitive {
    /// Corners without the closing point.
    pub fn corners(&self) -> &[(i64, i64)] {
        &self.ring[..self.ring.len() - 1]
    }

    /// Coordinate list of the pattern line, each value followed by a comma.
    /// Rectangles list two opposite corners, other kinds every corner.
    pub fn coordinate_text(&self) -> String {
        let points: Vec<(i64, i64)> = match self.kind {
            PrimitiveKind::Rectangle => vec![self.ring[0], self.ring[2]],
            _ => self.corners().to_vec(),
        };
        points
            .iter()
            .map(|(x, y)| format!("{x},{y},"))
            .collect()
    }

    /// Four corners joined by horizontal and vertical edges only.
    pub fn is_axis_aligned_rectangle(&self) -> bool {
        self.ring.len() == 5
            && self
                .ring
                .windows(2)
                .all(|w| w[0].0 == w[1].0 || w[0].1 == w[1].1)
    }
}

/// Half-up rounding on the shortest decimal rendering of `value`.
///
/// Anything below 0.5 (negatives included) becomes 0. Otherwise the integer
/// part is kept and bumped by one when the first fractional digit is above 4.
pub fn myround(value: f64) -> i64 {
    if !(value >= 0.5) {
        return 0;
    }
    let text = value.to_string();
    let (int_part, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let base = int_part.parse::<i64>().unwrap_or(value.trunc() as i64);
    match fraction.bytes().next() {
        Some(digit) if digit > b'4' => base + 1,
        _ => base,
    }
}

/// Twice the signed area with the pattern format's sign convention:
/// positive for rings running clockwise in local (y-down) coordinates.
pub fn signed_area(points: &[(i64, i64)]) -> i64 {
    let Some(&last) = points.last() else {
        return 0;
    };
    let mut prev = last;
    let mut area = 0;
    for &p in points {
        area += (p.0 - prev.0) * (p.1 + prev.1);
        prev = p;
    }
    area
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Field-local dot coordinates of an absolute point in µm, measured from the
/// field's top-left corner with y pointing down.
pub fn to_local(point: (f64, f64), field: &FieldRect, scale: f64) -> (i64, i64) {
    let (cx, cy) = field.center();
    let (hw, hh) = field.half_size();
    (
        myround((round3(point.0) - cx + hw) * scale),
        myround((cy + hh - round3(point.1)) * scale),
    )
}

/// Closed local ring without consecutive duplicates.
fn local_ring(points: &[(f64, f64)], field: &FieldRect, scale: f64) -> Vec<(i64, i64)> {
    let mut ring: Vec<(i64, i64)> = Vec::with_capacity(points.len() + 1);
    for &p in points.iter().chain(points.first()) {
        let local = to_local(p, field, scale);
        if ring.last() != Some(&local) {
            ring.push(local);
        }
    }
    ring
}

/// Classifies pieces of one job: dot scale and pitch are fixed per run.
///
/// A piece is moved into field-local dots, rotated to a canonical starting
/// corner and normalized to one winding before it is packed into a record.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    /// Dots per µm.
    scale: f64,
    pitch: u32,
}

impl Classifier {
    pub fn new(scale: f64, pitch: u32) -> Self {
        Self { scale, pitch }
    }

    /// Classify one piece (absolute µm ring, closed or open) inside `field`.
    pub fn classify(
        &self,
        points: &[(f64, f64)],
        field: &FieldRect,
        dose: f64,
    ) -> Result<Primitive, Rejection> {
        let reject = |reason| Rejection::new(reason, points.to_vec());

        let mut ring = local_ring(points, field, self.scale);
        if ring.len() < 4 {
            return Err(reject(RejectionReason::TooFewPoints));
        }
        let area = signed_area(&ring);
        if area == 0 {
            return Err(reject(RejectionReason::ZeroArea));
        }

        let start = ring
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| (p.1, p.0))
            .map(|(index, _)| index)
            .unwrap_or(0);
        let mut canonical = ring[start..].to_vec();
        canonical.extend_from_slice(&ring[1..=start]);
        ring = canonical;
        if area < 0 {
            ring.reverse();
        }

        let n = ring.len();
        let (p0, p1, p2, before_last) = (ring[0], ring[1], ring[2], ring[n - 2]);
        let dy = p1.1 - p0.1;
        if dy == 0 {
            return Err(reject(RejectionReason::ZeroHeight));
        }
        let dy_f = dy as f64;

        let slope1 = (p1.0 - p0.0) as f64 / dy_f;
        let off2 = if before_last.1 != p0.1 {
            1
        } else {
            before_last.0 - p0.0
        };
        let slope2 = if p2.1 != p1.1 {
            (1 - off2) as f64 / dy_f
        } else {
            (p2.0 - p1.0 - off2) as f64 / dy_f
        };

        let kind = if (slope1 != 0.0 || slope2 != 0.0) && n == 5 {
            PrimitiveKind::Trapezoid
        } else if n == 4 {
            PrimitiveKind::Triangle
        } else {
            PrimitiveKind::Rectangle
        };

        let record = PrimitiveRecord {
            x0: p0.0 as i32,
            y0: p0.1 as i32,
            off2: off2 as i32,
            slope1: slope1 as f32,
            pitch: self.pitch as f32,
            slope2: slope2 as f32,
            height: (dy + 1) as i32,
            dose: myround(dose * 100.0) as i32,
        };

        Ok(Primitive {
            kind,
            ring,
            record,
            dose,
            pitch: self.pitch,
        })
    }
}
