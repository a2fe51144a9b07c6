//! Numerical helpers shared by the linear solvers.
//!
//! - **Hartley normalization** of 2D and 3D point sets before DLT.
//! - **Real polynomial roots** up to degree four, used by P3P.
//!
//! Hartley & Zisserman, "Multiple View Geometry in Computer Vision", 2nd ed.,
//! Algorithm 4.2 (Normalized DLT).

use nalgebra::{DMatrix, Schur};
use rigloc_core::{Mat3, Mat34, Mat4, Pt2, Pt3, Real};

/// Two roots closer than this are merged.
const ROOT_DEDUP_EPS: Real = 1e-8;

/// Hartley normalization for 2D points.
///
/// Centers the points and scales them so the mean distance to the origin is
/// `√2`. Returns the normalized points and `T` with `p_norm = T * p`, or
/// `None` for an empty or fully coincident set.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as Real;
    let centroid = points.iter().fold(Pt2::origin().coords, |acc, p| acc + p.coords) / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<Real>()
        / n;

    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = (2.0 as Real).sqrt() / mean_dist;
    #[rustfmt::skip]
    let t = Mat3::new(
        scale, 0.0, -scale * centroid.x,
        0.0, scale, -scale * centroid.y,
        0.0, 0.0, 1.0,
    );

    let norm = points
        .iter()
        .map(|p| Pt2::from((p.coords - centroid) * scale))
        .collect();

    Some((norm, t))
}

/// Hartley normalization for 3D points (mean distance `√3`).
pub fn normalize_points_3d(points: &[Pt3]) -> Option<(Vec<Pt3>, Mat4)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as Real;
    let centroid = points.iter().fold(Pt3::origin().coords, |acc, p| acc + p.coords) / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<Real>()
        / n;

    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = (3.0 as Real).sqrt() / mean_dist;
    #[rustfmt::skip]
    let t = Mat4::new(
        scale, 0.0, 0.0, -scale * centroid.x,
        0.0, scale, 0.0, -scale * centroid.y,
        0.0, 0.0, scale, -scale * centroid.z,
        0.0, 0.0, 0.0, 1.0,
    );

    let norm = points
        .iter()
        .map(|p| Pt3::from((p.coords - centroid) * scale))
        .collect();

    Some((norm, t))
}

fn sort_dedup(mut roots: Vec<Real>) -> Vec<Real> {
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() < ROOT_DEDUP_EPS);
    roots
}

/// Real roots of `ax² + bx + c = 0`, ascending.
pub fn solve_quadratic_real(a: Real, b: Real, c: Real) -> Vec<Real> {
    let eps = 1e-12;
    if a.abs() < eps {
        if b.abs() < eps {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc.abs() < eps {
        return vec![-b / (2.0 * a)];
    }
    if disc < 0.0 {
        return Vec::new();
    }
    let sqrt_disc = disc.sqrt();
    sort_dedup(vec![(-b + sqrt_disc) / (2.0 * a), (-b - sqrt_disc) / (2.0 * a)])
}

/// Real roots of `ax³ + bx² + cx + d = 0` via Cardano's formula, ascending.
pub fn solve_cubic_real(a: Real, b: Real, c: Real, d: Real) -> Vec<Real> {
    let eps = 1e-12;
    if a.abs() < eps {
        return solve_quadratic_real(b, c, d);
    }

    let b = b / a;
    let c = c / a;
    let d = d / a;

    // Depressed cubic y³ + p y + q = 0 with x = y - b/3.
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let disc = (q * 0.5).powi(2) + (p / 3.0).powi(3);
    let shift = b / 3.0;

    let roots = if disc > eps {
        let sqrt_disc = disc.sqrt();
        vec![(-q * 0.5 + sqrt_disc).cbrt() + (-q * 0.5 - sqrt_disc).cbrt() - shift]
    } else if disc.abs() <= eps {
        let u = (-q * 0.5).cbrt();
        vec![2.0 * u - shift, -u - shift]
    } else {
        let r = (-p / 3.0).sqrt();
        let phi = ((-q * 0.5) / (r * r * r)).clamp(-1.0, 1.0).acos();
        let two_pi = 2.0 * std::f64::consts::PI;
        (0..3)
            .map(|k| 2.0 * r * ((phi + two_pi * k as Real) / 3.0).cos() - shift)
            .collect()
    };

    sort_dedup(roots)
}

/// Real roots of `ax⁴ + bx³ + cx² + dx + e = 0`, ascending.
///
/// Eigenvalues of the companion matrix through a Schur decomposition; roots
/// with an imaginary part below `1e-8` count as real.
pub fn solve_quartic_real(a: Real, b: Real, c: Real, d: Real, e: Real) -> Vec<Real> {
    if a.abs() < 1e-12 {
        return solve_cubic_real(b, c, d, e);
    }

    let mut comp = DMatrix::<Real>::zeros(4, 4);
    comp[(0, 0)] = -b / a;
    comp[(0, 1)] = -c / a;
    comp[(0, 2)] = -d / a;
    comp[(0, 3)] = -e / a;
    comp[(1, 0)] = 1.0;
    comp[(2, 1)] = 1.0;
    comp[(3, 2)] = 1.0;

    let eigvals = Schur::new(comp).complex_eigenvalues();
    sort_dedup(
        eigvals
            .iter()
            .filter(|v| v.im.abs() < 1e-8)
            .map(|v| v.re)
            .collect(),
    )
}

/// Reshape row `row_idx` of `V^T` (12 columns) into a 3x4 matrix, row-major.
pub fn mat34_from_svd_row(v_t: &DMatrix<Real>, row_idx: usize) -> Option<Mat34> {
    if v_t.ncols() != 12 || row_idx >= v_t.nrows() {
        return None;
    }
    Some(Mat34::from_fn(|r, c| v_t[(row_idx, 4 * r + c)]))
}
