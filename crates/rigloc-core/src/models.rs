use crate::{Iso3, Mat3, Mat34, Pt2, Pt3, Real, Vec3};
use nalgebra::{Matrix3, RealField, Vector2};
use serde::{Deserialize, Serialize};

/// Depth below which a camera-frame point is treated as not projectable.
pub const MIN_DEPTH: Real = 1e-9;

/// Intrinsics that map sensor-plane coordinates to pixel coordinates.
pub trait IntrinsicsModel<S: RealField + Copy> {
    /// Convert sensor-plane coordinates into pixel coordinates.
    fn sensor_to_pixel(&self, sensor: &Vector2<S>) -> Vector2<S>;
    /// Convert pixel coordinates into sensor-plane coordinates.
    fn pixel_to_sensor(&self, pixel: &Vector2<S>) -> Vector2<S>;
}

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew<S: RealField + Copy> {
    /// Focal length in pixels along X.
    pub fx: S,
    /// Focal length in pixels along Y.
    pub fy: S,
    /// Principal point X coordinate in pixels.
    pub cx: S,
    /// Principal point Y coordinate in pixels.
    pub cy: S,
    /// Skew term (typically 0).
    pub skew: S,
}

impl<S: RealField + Copy> FxFyCxCySkew<S> {
    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Matrix3<S> {
        Matrix3::new(
            self.fx,
            self.skew,
            self.cx,
            S::zero(),
            self.fy,
            self.cy,
            S::zero(),
            S::zero(),
            S::one(),
        )
    }
}

impl FxFyCxCySkew<Real> {
    /// Build intrinsics from an upper-triangular K, normalizing `K[2,2]` to 1.
    pub fn from_k_matrix(k: &Mat3) -> Option<Self> {
        let s = k[(2, 2)];
        if s.abs() <= Real::EPSILON {
            return None;
        }
        let k = k / s;
        if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
            return None;
        }
        Some(Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        })
    }
}

impl<S: RealField + Copy> IntrinsicsModel<S> for FxFyCxCySkew<S> {
    fn sensor_to_pixel(&self, sensor: &Vector2<S>) -> Vector2<S> {
        let u = self.fx * sensor.x + self.skew * sensor.y + self.cx;
        let v = self.fy * sensor.y + self.cy;
        Vector2::new(u, v)
    }

    fn pixel_to_sensor(&self, pixel: &Vector2<S>) -> Vector2<S> {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Vector2::new(sx, sy)
    }
}

/// Pinhole intrinsics bound to the image size they were calibrated for.
///
/// Marker positions are assumed undistorted, so no distortion stage exists.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Pinhole parameters.
    pub k: FxFyCxCySkew<Real>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(k: FxFyCxCySkew<Real>, width: u32, height: u32) -> Self {
        Self { k, width, height }
    }

    /// Project a camera-frame point to pixels; `None` behind the camera.
    pub fn project(&self, pc: &Pt3) -> Option<Pt2> {
        if pc.z <= MIN_DEPTH {
            return None;
        }
        let uv = self
            .k
            .sensor_to_pixel(&Vector2::new(pc.x / pc.z, pc.y / pc.z));
        Some(Pt2::new(uv.x, uv.y))
    }

    /// Unit bearing vector in the camera frame for a pixel.
    pub fn bearing(&self, pixel: &Pt2) -> Vec3 {
        let s = self.k.pixel_to_sensor(&Vector2::new(pixel.x, pixel.y));
        Vec3::new(s.x, s.y, 1.0).normalize()
    }

    /// Reprojection error in pixels of world point `pw` seen at `pixel` from `pose` (`T_C_W`).
    pub fn reprojection_error(&self, pose: &Iso3, pw: &Pt3, pixel: &Pt2) -> Real {
        match self.project(&pose.transform_point(pw)) {
            Some(uv) => (uv - pixel).norm(),
            None => Real::INFINITY,
        }
    }

    /// Camera matrix `P = K [R | t]` for a pose `T_C_W`.
    pub fn projection_matrix(&self, pose: &Iso3) -> Mat34 {
        let k = self.k.k_matrix();
        let r = pose.rotation.to_rotation_matrix();
        let mut p = Mat34::zeros();
        p.fixed_view_mut::<3, 3>(0, 0).copy_from(&(k * r.matrix()));
        p.set_column(3, &(k * pose.translation.vector));
        p
    }
}
