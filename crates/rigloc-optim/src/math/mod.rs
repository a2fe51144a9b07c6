//! Generic (autodiff-friendly) geometry used by the residuals.

pub mod projection;
pub mod rotation;

use nalgebra::{RealField, Vector3};
use rigloc_core::{Iso3, Pt3};

/// Lift an `f64` constant into the scalar type of a residual.
#[inline]
pub fn constant<T: RealField>(v: f64) -> T {
    T::from_subset(&v)
}

/// Lift a point into the scalar type of a residual.
pub fn constant_point<T: RealField>(p: &Pt3) -> Vector3<T> {
    Vector3::new(constant(p.x), constant(p.y), constant(p.z))
}

/// Apply a fixed rigid transform to a generic point.
pub fn transform_constant<T: RealField>(iso: &Iso3, p: &Vector3<T>) -> Vector3<T> {
    let r = iso.rotation.to_rotation_matrix();
    let m = r.matrix();
    let t = iso.translation.vector;
    Vector3::from_fn(|i, _| {
        constant::<T>(m[(i, 0)]) * p.x.clone()
            + constant::<T>(m[(i, 1)]) * p.y.clone()
            + constant::<T>(m[(i, 2)]) * p.z.clone()
            + constant::<T>(t[i])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Translation3};

    #[test]
    fn transform_constant_matches_isometry() {
        let iso = Iso3::from_parts(
            Translation3::new(0.1, -0.2, 0.3),
            Rotation3::from_euler_angles(0.2, -0.1, 0.4).into(),
        );
        let p = Pt3::new(1.0, 2.0, -0.5);
        let got = transform_constant::<f64>(&iso, &p.coords);
        assert!((got - iso.transform_point(&p).coords).norm() < 1e-12);
    }
}
