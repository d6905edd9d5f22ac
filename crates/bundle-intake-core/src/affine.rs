use crate::{sample_bilinear_u8, GrayImage, GrayImageView};
use nalgebra::{Matrix2x3, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// 2D affine map `p' = A p + t`, stored as a 2×3 matrix `[A | t]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub m: Matrix2x3<f64>,
}

impl AffineTransform {
    pub fn new(m: Matrix2x3<f64>) -> Self {
        Self { m }
    }

    pub fn identity() -> Self {
        Self::new(Matrix2x3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        ))
    }

    pub fn from_array(rows: [[f64; 3]; 2]) -> Self {
        Self::new(Matrix2x3::new(
            rows[0][0], rows[0][1], rows[0][2], //
            rows[1][0], rows[1][1], rows[1][2],
        ))
    }

    pub fn to_array(&self) -> [[f64; 3]; 2] {
        [
            [self.m[(0, 0)], self.m[(0, 1)], self.m[(0, 2)]],
            [self.m[(1, 0)], self.m[(1, 1)], self.m[(1, 2)]],
        ]
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.m * Vector3::new(p.x as f64, p.y as f64, 1.0);
        Point2::new(v[0] as f32, v[1] as f32)
    }

    fn to_homogeneous(self) -> Matrix3<f64> {
        Matrix3::new(
            self.m[(0, 0)],
            self.m[(0, 1)],
            self.m[(0, 2)],
            self.m[(1, 0)],
            self.m[(1, 1)],
            self.m[(1, 2)],
            0.0,
            0.0,
            1.0,
        )
    }

    /// Inverse map, `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.to_homogeneous().try_inverse()?;
        Some(Self::new(inv.fixed_view::<2, 3>(0, 0).into_owned()))
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &AffineTransform) -> Self {
        let h = self.to_homogeneous() * other.to_homogeneous();
        Self::new(h.fixed_view::<2, 3>(0, 0).into_owned())
    }
}

/// Compute the affine map with `dst[k] = A src[k] + t` for three correspondences.
///
/// Returns `None` for collinear (degenerate) input.
pub fn affine_from_3pt(src: &[Point2<f32>; 3], dst: &[Point2<f32>; 3]) -> Option<AffineTransform> {
    // Unknowns: [a11 a12 tx a21 a22 ty]
    // x' = a11 x + a12 y + tx
    // y' = a21 x + a22 y + ty
    let mut a = SMatrix::<f64, 6, 6>::zeros();
    let mut b = SVector::<f64, 6>::zeros();

    for k in 0..3 {
        let x = src[k].x as f64;
        let y = src[k].y as f64;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        b[r0] = dst[k].x as f64;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        b[r1] = dst[k].y as f64;
    }

    let det = a.determinant();
    if det.abs() < 1e-9 {
        return None;
    }
    let x = a.lu().solve(&b)?;

    Some(AffineTransform::new(Matrix2x3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5],
    )))
}

/// Warp into an `out_w × out_h` raster: for each dst pixel, map back through
/// `dst_from_src⁻¹` and sample the source. A singular map yields a black raster.
pub fn warp_affine_gray(
    src: &GrayImageView<'_>,
    dst_from_src: &AffineTransform,
    out_w: usize,
    out_h: usize,
) -> GrayImage {
    let mut out = vec![0u8; out_w * out_h];
    let Some(src_from_dst) = dst_from_src.inverse() else {
        return GrayImage {
            width: out_w,
            height: out_h,
            data: out,
        };
    };

    for y in 0..out_h {
        for x in 0..out_w {
            let ps = src_from_dst.apply(Point2::new(x as f32, y as f32));
            out[y * out_w + x] = sample_bilinear_u8(src, ps.x, ps.y);
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}
