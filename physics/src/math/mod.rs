pub mod glam_ext;

pub use glam_ext::{Mat3Ext, QuatExt, Vec3Ext};

/// Squared lengths below this are treated as degenerate directions.
pub const DEGENERATE_EPSILON_SQ: f32 = 1e-12;
