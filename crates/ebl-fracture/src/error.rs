use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a layout.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("failed to read layout {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse layout {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("instance refers to unknown cell '{0}'")]
    UnknownCell(String),

    #[error("instance hierarchy below '{0}' is recursive")]
    RecursiveHierarchy(String),
}

/// Errors raised while loading or validating a job configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Errors raised while writing job files.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("output directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding cancelled")]
    Cancelled,
}

impl EncodeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EncodeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fatal errors of a conversion run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No layout is open in the host; reported before any file is touched.
    #[error("no active layout, please open a layout first")]
    NoActiveLayout,

    /// Decomposition produced a piece with an interior ring.
    #[error("polygon with a hole was created during decomposition, hull: {hull:?}")]
    HoleInPrimitive { hull: Vec<(f64, f64)> },

    #[error("conversion cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Why a shape or primitive was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Fewer than four ring points survived rounding and deduplication.
    TooFewPoints,
    /// The rounded ring encloses no area.
    ZeroArea,
    /// The first edge of the canonical ring is horizontal.
    ZeroHeight,
    /// All vertices collapse onto one point.
    NotAPolygon,
    /// A field-layer shape that is not an axis-aligned rectangle.
    NotARectangle,
    /// Shape lies outside every explicit field.
    OutsideFields,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectionReason::TooFewPoints => "polygon collapsed by amount of points",
            RejectionReason::ZeroArea => "polygon collapsed by zero area",
            RejectionReason::ZeroHeight => "polygon collapsed by zero height",
            RejectionReason::NotAPolygon => "not a polygon",
            RejectionReason::NotARectangle => "field layer shape is not a rectangle",
            RejectionReason::OutsideFields => "object lies outside every field",
        };
        f.write_str(text)
    }
}

/// A skipped shape or primitive with the coordinates it had before rejection.
/// Rejections are logged and collected; the run continues past them.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}. Points: {}", format_points(.points))]
pub struct Rejection {
    pub reason: RejectionReason,
    pub points: Vec<(f64, f64)>,
}

impl Rejection {
    pub fn new(reason: RejectionReason, points: Vec<(f64, f64)>) -> Self {
        Self { reason, points }
    }
}

fn format_points(points: &[(f64, f64)]) -> String {
    let inner = points
        .iter()
        .map(|(x, y)| format!("({x:.3}, {y:.3})"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{inner}]")
}
