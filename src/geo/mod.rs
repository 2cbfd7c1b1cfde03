pub mod table;

pub use table::GeoTable;

/// Column whose presence turns a result into a map
pub const GEOMETRY_COLUMN: &str = "geometry";
