mod classify;
mod config;
mod encoder;
mod error;
mod field_grid;
mod geometry;
mod partition;
mod pipeline;
mod types;

pub use classify::*;
pub use config::*;
pub use encoder::*;
pub use error::*;
pub use field_grid::*;
pub use geometry::*;
pub use partition::*;
pub use pipeline::*;
pub use types::*;
