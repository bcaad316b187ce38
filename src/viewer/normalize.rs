//! Framing: fit any model into a fixed-size box centred on the origin.

use std::f32::consts::PI;

use nalgebra::{Matrix4, Point3, Vector3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    /// Bounds of a point set, `None` when it is empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f32>>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in points {
            bounds.min = bounds.min.inf(&p);
            bounds.max = bounds.max.sup(&p);
        }
        Some(bounds)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max()
    }
}

/// Transform that scales the model uniformly so its largest dimension equals
/// `target_size`, moves its centre to the origin and turns it half a revolution
/// about +Y so its front faces a camera on +Z.
///
/// Degenerate (zero-size) bounds are only centred.
pub fn normalization(bounds: &Bounds, target_size: f32) -> Matrix4<f32> {
    let max_dim = bounds.max_dimension();
    let scale = if max_dim > f32::EPSILON {
        target_size / max_dim
    } else {
        1.0
    };
    let center = bounds.center().coords;

    Matrix4::from_axis_angle(&Vector3::y_axis(), PI)
        * Matrix4::new_scaling(scale)
        * Matrix4::new_translation(&-center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    fn sample_points() -> Vec<Point3<f32>> {
        vec![
            Point3::new(10.0, 4.0, -2.0),
            Point3::new(14.0, 5.0, 6.0),
            Point3::new(11.0, 12.0, 0.0),
            Point3::new(12.5, 7.0, 1.0),
        ]
    }

    #[test]
    fn bounds_of_points() {
        let bounds = Bounds::from_points(sample_points()).unwrap();
        assert_eq!(bounds.min, Point3::new(10.0, 4.0, -2.0));
        assert_eq!(bounds.max, Point3::new(14.0, 12.0, 6.0));
        assert_relative_eq!(bounds.max_dimension(), 8.0);
        assert!(Bounds::from_points(Vec::new()).is_none());
    }

    #[test]
    fn normalized_model_fits_target_and_is_centred() {
        let points = sample_points();
        let bounds = Bounds::from_points(points.iter().copied()).unwrap();
        let m = normalization(&bounds, 3.0);

        let normalized = Bounds::from_points(points.iter().map(|p| m.transform_point(p))).unwrap();
        assert_relative_eq!(normalized.max_dimension(), 3.0, epsilon = EPSILON);
        assert_relative_eq!(normalized.center().coords.norm(), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn renormalizing_keeps_size_and_centre() {
        let points = sample_points();
        let first = normalization(&Bounds::from_points(points.iter().copied()).unwrap(), 3.0);
        let once: Vec<_> = points.iter().map(|p| first.transform_point(p)).collect();

        let second = normalization(&Bounds::from_points(once.iter().copied()).unwrap(), 3.0);
        let twice = Bounds::from_points(once.iter().map(|p| second.transform_point(p))).unwrap();
        assert_relative_eq!(twice.max_dimension(), 3.0, epsilon = EPSILON);
        assert_relative_eq!(twice.center().coords.norm(), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn model_is_turned_to_face_the_camera() {
        let bounds = Bounds {
            min: Point3::new(-1.0, -1.0, -1.0),
            max: Point3::new(1.0, 1.0, 1.0),
        };
        let m = normalization(&bounds, 2.0);
        // a point on the model's +Z side ends up on -Z and vice versa
        let p = m.transform_point(&Point3::new(0.5, 0.0, 1.0));
        assert_relative_eq!(p, Point3::new(-0.5, 0.0, -1.0), epsilon = EPSILON);
    }

    #[test]
    fn single_point_is_only_centred() {
        let bounds = Bounds::from_points([Point3::new(2.0, 3.0, 4.0)]).unwrap();
        let m = normalization(&bounds, 3.0);
        let p = m.transform_point(&Point3::new(2.0, 3.0, 4.0));
        assert_relative_eq!(p.coords.norm(), 0.0, epsilon = EPSILON);
        assert!(m.iter().all(|v| v.is_finite()));
    }
}
