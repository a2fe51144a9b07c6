//! Pinhole projection shared by the reprojection residuals.

use nalgebra::{RealField, Vector2, Vector3};

/// Epsilon added to depth for numerical stability.
pub const PROJECTION_EPS: f64 = 1.0e-9;

/// Project a camera-frame point with `K = [fx s cx; 0 fy cy; 0 0 1]`.
pub fn project_pinhole<T: RealField>(
    fx: T,
    fy: T,
    cx: T,
    cy: T,
    skew: T,
    pc: &Vector3<T>,
) -> Vector2<T> {
    let z = pc.z.clone() + super::constant::<T>(PROJECTION_EPS);
    let x = pc.x.clone() / z.clone();
    let y = pc.y.clone() / z;
    Vector2::new(fx * x.clone() + skew * y.clone() + cx, fy * y + cy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigloc_core::{synthetic, Pt3};

    #[test]
    fn matches_camera_intrinsics_projection() {
        let cam = synthetic::default_intrinsics();
        let p = Pt3::new(0.3, -0.2, 2.0);
        let uv = project_pinhole(cam.k.fx, cam.k.fy, cam.k.cx, cam.k.cy, 0.0, &p.coords);
        let expected = cam.project(&p).unwrap();
        assert!((uv - expected.coords).norm() < 1e-6);
    }
}
