pub mod curvature;
pub mod horizon;
pub mod sky_glow;
