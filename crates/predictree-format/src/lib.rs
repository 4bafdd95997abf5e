//! Result file formats: normalization, versioned parsing and change-set
//! serialization.

mod changes;
mod error;
mod normalize;
mod parse;
mod wire;

pub use changes::{WirePrediction, to_changes};
pub use error::FormatError;
pub use normalize::normalize;
pub use parse::{FileFormat, V1Format, V3Format, format_for, load, parse, read_version};
