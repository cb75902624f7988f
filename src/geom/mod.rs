mod bvh;
mod core;
mod metrics;
mod proximity;

pub use core::{BBox, Point3, Quat, Tolerance, Vec3};
pub use metrics::{RecorderMetrics, TimingBucket, TimingReport};
pub use proximity::{NearestHit, SurfaceIndex, VertexIndex, closest_point_on_triangle};

#[cfg(test)]
mod tests;
