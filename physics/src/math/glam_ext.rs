use glam::{Mat3, Quat, Vec3};

pub trait QuatExt {
    /// First order integration of an angular velocity over `dt`. The result is not normalized.
    fn integrate(self, angular_velocity: Vec3, angular_factor: Vec3, dt: f32) -> Quat;

    /// Normalization using a single Newton step, only valid for quaternions close to unit length.
    fn normalize_fast(self) -> Quat;
}

impl QuatExt for Quat {
    fn integrate(self, angular_velocity: Vec3, angular_factor: Vec3, dt: f32) -> Quat {
        let a = angular_velocity * angular_factor;
        let half_dt = dt * 0.5;
        Quat::from_xyzw(
            self.x + half_dt * (a.x * self.w + a.y * self.z - a.z * self.y),
            self.y + half_dt * (a.y * self.w + a.z * self.x - a.x * self.z),
            self.z + half_dt * (a.z * self.w + a.x * self.y - a.y * self.x),
            self.w + half_dt * (-a.x * self.x - a.y * self.y - a.z * self.z),
        )
    }

    fn normalize_fast(self) -> Quat {
        let f = (3.0 - self.length_squared()) * 0.5;
        self * f
    }
}

pub trait Vec3Ext {
    /// Two unit tangents orthogonal to `self`, falling back to X and Y for a zero vector.
    fn tangents(self) -> (Vec3, Vec3);
}

impl Vec3Ext for Vec3 {
    fn tangents(self) -> (Vec3, Vec3) {
        match self.try_normalize() {
            Some(n) => n.any_orthonormal_pair(),
            None => (Vec3::X, Vec3::Y),
        }
    }
}

pub trait Mat3Ext {
    /// Rotate a body space tensor into world space, `R * I * R^T`.
    fn rotate_tensor(&self, orientation: Quat) -> Mat3;

    /// Parallel axis term for a point mass at `r`.
    fn parallel_axis(mass: f32, r: Vec3) -> Mat3;
}

impl Mat3Ext for Mat3 {
    fn rotate_tensor(&self, orientation: Quat) -> Mat3 {
        let rotation = Mat3::from_quat(orientation);
        rotation * *self * rotation.transpose()
    }

    fn parallel_axis(mass: f32, r: Vec3) -> Mat3 {
        let r2 = r.length_squared();
        Mat3::from_cols(
            Vec3::new(r2 - r.x * r.x, -r.x * r.y, -r.x * r.z),
            Vec3::new(-r.y * r.x, r2 - r.y * r.y, -r.y * r.z),
            Vec3::new(-r.z * r.x, -r.z * r.y, r2 - r.z * r.z),
        ) * mass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrate_matches_axis_angle() {
        let w = Vec3::new(0.0, 2.0, 0.0);
        let dt = 1.0 / 600.0;
        let mut q = Quat::IDENTITY;
        for _ in 0..300 {
            q = q.integrate(w, Vec3::ONE, dt).normalize();
        }
        let expected = Quat::from_rotation_y(1.0);
        assert!(q.abs_diff_eq(expected, 1e-3), "{} != {}", q, expected);
    }

    #[test]
    fn test_tangents_are_orthonormal() {
        for n in [Vec3::X, Vec3::new(0.3, -2.0, 1.0), Vec3::NEG_Z] {
            let (t1, t2) = n.tangents();
            let n = n.normalize();
            assert!(t1.dot(n).abs() < 1e-5);
            assert!(t2.dot(n).abs() < 1e-5);
            assert!(t1.dot(t2).abs() < 1e-5);
            assert!((t1.length() - 1.0).abs() < 1e-5);
        }
        assert_eq!(Vec3::ZERO.tangents(), (Vec3::X, Vec3::Y));
    }

    #[test]
    fn test_parallel_axis() {
        let m = Mat3::parallel_axis(2.0, Vec3::new(0.0, 3.0, 0.0));
        assert!(m.abs_diff_eq(Mat3::from_diagonal(Vec3::new(18.0, 0.0, 18.0)), 1e-6));
    }
}
