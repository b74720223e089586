mod color;
pub use color::{ColorVolume, ColorVoxel};

mod integrate;

mod tsdf;
pub use tsdf::{TsdfVolume, TsdfVoxel, DIVISOR, MAX_WEIGHT};
