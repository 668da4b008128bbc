use nalgebra::{Matrix3, Matrix3x4, Rotation3, Vector3};

/// The factors of a projection matrix $P = K R \p{I | -C}$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionFactors {
    /// Upper triangular intrinsic matrix with a positive diagonal and `K[(2, 2)] == 1`.
    pub intrinsics: Matrix3<f64>,
    pub rotation: Rotation3<f64>,
    pub center: Vector3<f64>,
}

/// Decomposes a `3x4` projection matrix into intrinsics, rotation and camera center.
///
/// The projection matrix is only defined up to scale, so any nonzero multiple of `projection`
/// yields the same factors. Returns `None` if the left `3x3` block is singular.
///
/// # Method
///
/// With $M$ the left `3x3` block and $J$ the exchange matrix, a QR decomposition
/// $\p{J M}^T = Q U$ gives the RQ decomposition $M = \p{J U^T J} \p{J Q^T}$.
pub fn decompose_projection(projection: &Matrix3x4<f64>) -> Option<ProjectionFactors> {
    let m: Matrix3<f64> = projection.fixed_view::<3, 3>(0, 0).into_owned();
    let m_inv = m.try_inverse()?;
    let center = -(m_inv * projection.column(3));

    #[rustfmt::skip]
    let exchange = Matrix3::new(
        0.0, 0.0, 1.0,
        0.0, 1.0, 0.0,
        1.0, 0.0, 0.0,
    );
    let qr = (exchange * m).transpose().qr();
    let k = exchange * qr.r().transpose() * exchange;
    let r = exchange * qr.q().transpose();

    // Make the diagonal of K positive, compensating in R.
    let signs = Matrix3::from_diagonal(&k.diagonal().map(|v| if v < 0.0 { -1.0 } else { 1.0 }));
    let k = k * signs;
    let mut r = signs * r;
    // P is only known up to scale, so a reflection is removed by flipping the sign of the whole.
    if r.determinant() < 0.0 {
        r = -r;
    }

    Some(ProjectionFactors {
        intrinsics: k / k[(2, 2)],
        rotation: Rotation3::from_matrix_unchecked(r),
        center,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn projection() -> (Matrix3<f64>, Rotation3<f64>, Vector3<f64>, Matrix3x4<f64>) {
        #[rustfmt::skip]
        let k = Matrix3::new(
            800.0, 0.0, 319.5,
            0.0, 810.0, 239.5,
            0.0, 0.0, 1.0,
        );
        let r = Rotation3::new(Vector3::new(0.1, -0.2, 0.3));
        let c = Vector3::new(1.0, 2.0, -3.0);
        let mut pose = Matrix3x4::identity();
        pose.set_column(3, &-c);
        let p = k * r.matrix() * pose;
        (k, r, c, p)
    }

    #[test]
    fn recovers_factors() {
        let (k, r, c, p) = projection();
        let factors = decompose_projection(&(p * 2.5)).unwrap();
        assert_relative_eq!(factors.intrinsics, k, epsilon = 1e-8);
        assert_relative_eq!(factors.rotation.matrix(), r.matrix(), epsilon = 1e-10);
        assert_relative_eq!(factors.center, c, epsilon = 1e-10);
    }

    #[test]
    fn negative_scale() {
        let (k, r, c, p) = projection();
        let factors = decompose_projection(&-p).unwrap();
        assert_relative_eq!(factors.intrinsics, k, epsilon = 1e-8);
        assert_relative_eq!(factors.rotation.matrix(), r.matrix(), epsilon = 1e-10);
        assert_relative_eq!(factors.center, c, epsilon = 1e-10);
    }

    #[test]
    fn singular() {
        assert!(decompose_projection(&Matrix3x4::zeros()).is_none());
    }
}
