use std::f32::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::{Matrix4, Perspective3, Point3, Vector2, Vector3};

const MIN_POLAR: f32 = 0.01;
const MAX_POLAR: f32 = PI - 0.01;
const MIN_RADIUS: f32 = 0.5;
const MAX_RADIUS: f32 = 100.0;
const SETTLED: f32 = 1e-5;

#[derive(Debug, Clone)]
pub struct OrbitRig {
    pub target: Point3<f32>,
    pub radius: f32,
    /// Azimuth around +Y.
    pub theta: f32,
    /// Polar angle from +Y.
    pub phi: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    /// Fraction of the pending motion applied per update.
    pub damping: f32,
    pending_theta: f32,
    pending_phi: f32,
    pending_pan: Vector3<f32>,
}

impl Default for OrbitRig {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            radius: 5.0,
            theta: 0.0,
            phi: FRAC_PI_2,
            fov_y: 75_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            aspect: 1.0,
            damping: 0.05,
            pending_theta: 0.0,
            pending_phi: 0.0,
            pending_pan: Vector3::zeros(),
        }
    }
}

impl OrbitRig {
    pub fn eye(&self) -> Point3<f32> {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        self.target
            + self.radius * Vector3::new(sin_phi * sin_theta, cos_phi, sin_phi * cos_theta)
    }

    /// Keeps the projection in step with the drawing surface.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    /// Queues a rotation for a pointer drag of `delta` pixels in a viewport
    /// `height` pixels tall. A drag across the full height is one revolution.
    pub fn rotate(&mut self, delta: Vector2<f32>, height: f32) {
        let height = height.max(1.0);
        self.pending_theta -= TAU * delta.x / height;
        self.pending_phi -= TAU * delta.y / height;
    }

    /// Queues a pan that keeps the scene under the pointer.
    pub fn pan(&mut self, delta: Vector2<f32>, height: f32) {
        let height = height.max(1.0);
        let world_per_pixel = 2.0 * self.radius * (self.fov_y * 0.5).tan() / height;
        let forward = (self.target - self.eye()).normalize();
        let right = forward.cross(&Vector3::y()).normalize();
        let up = right.cross(&forward);
        self.pending_pan += (-right * delta.x + up * delta.y) * world_per_pixel;
    }

    /// Dollies toward (`steps > 0`) or away from the target. Applied at once.
    pub fn zoom(&mut self, steps: f32) {
        let factor = 0.95_f32.powf(steps);
        self.radius = (self.radius * factor).clamp(MIN_RADIUS, MAX_RADIUS);
    }

    /// Applies one frame of damped motion. Returns whether anything is still moving.
    pub fn update(&mut self) -> bool {
        let f = self.damping;
        self.theta += self.pending_theta * f;
        self.phi = (self.phi + self.pending_phi * f).clamp(MIN_POLAR, MAX_POLAR);
        self.target += self.pending_pan * f;

        self.pending_theta *= 1.0 - f;
        self.pending_phi *= 1.0 - f;
        self.pending_pan *= 1.0 - f;
        !self.is_settled()
    }

    /// Back to the default pose, dropping pending motion. Keeps the aspect ratio.
    pub fn reset(&mut self) {
        *self = Self {
            aspect: self.aspect,
            ..Self::default()
        };
    }

    pub fn is_settled(&self) -> bool {
        self.pending_theta.abs() < SETTLED
            && self.pending_phi.abs() < SETTLED
            && self.pending_pan.norm() < SETTLED
    }

    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.eye(), &self.target, &Vector3::y())
    }

    pub fn projection(&self) -> Matrix4<f32> {
        Perspective3::new(self.aspect, self.fov_y, self.near, self.far).to_homogeneous()
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection() * self.view()
    }
}
