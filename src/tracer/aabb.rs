use std::f32;

use cgmath::prelude::*;

use super::shapes::{Point3f, Ray, Vector3f};

/// Axis-aligned bounding box given by its min and max corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3f,
    pub max: Point3f,
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::empty()
    }
}

impl Aabb {
    pub fn new(p0: Point3f, p1: Point3f) -> Self {
        Aabb {
            min: Point3f::new(p0.x.min(p1.x), p0.y.min(p1.y), p0.z.min(p1.z)),
            max: Point3f::new(p0.x.max(p1.x), p0.y.max(p1.y), p0.z.max(p1.z)),
        }
    }

    /// Identity of `extend`. An empty box is never hit by a ray.
    pub fn empty() -> Self {
        Aabb {
            min: Point3f::new(f32::MAX, f32::MAX, f32::MAX),
            max: Point3f::new(-f32::MAX, -f32::MAX, -f32::MAX),
        }
    }

    pub fn from_point(p: Point3f) -> Self {
        Aabb { min: p, max: p }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, other: &Aabb) {
        self.min = Point3f::new(
            self.min.x.min(other.min.x),
            self.min.y.min(other.min.y),
            self.min.z.min(other.min.z),
        );
        self.max = Point3f::new(
            self.max.x.max(other.max.x),
            self.max.y.max(other.max.y),
            self.max.z.max(other.max.z),
        );
    }

    pub fn extend_point(&mut self, p: Point3f) {
        self.extend(&Aabb::from_point(p));
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut result = *self;
        result.extend(other);
        result
    }

    /// Grows every face outwards by `delta`. Empty boxes stay empty.
    pub fn expanded(&self, delta: f32) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let delta = Vector3f::new(delta, delta, delta);
        Aabb { min: self.min - delta, max: self.max + delta }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..3).all(|axis| self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis])
    }

    pub fn extent(&self) -> Vector3f {
        if self.is_empty() {
            return Vector3f::zero();
        }
        self.max - self.min
    }

    pub fn center(&self) -> Point3f {
        self.min.midpoint(self.max)
    }

    /// Axis with the largest extent. Ties resolve in x, y, z order.
    pub fn max_extent_axis(&self) -> usize {
        let d = self.extent();
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.extent();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Slab test. Returns the entry distance along the ray, clamped to 0 when
    /// the origin is inside the box.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let mut tmin = -f32::INFINITY;
        let mut tmax = f32::INFINITY;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.dir[axis];
            if dir == 0.0 {
                // parallel to the slab
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t0 = (self.min[axis] - origin) * inv;
            let mut t1 = (self.max[axis] - origin) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return None;
            }
        }
        if tmax < 0.0 {
            return None;
        }
        Some(tmin.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box() -> Aabb {
        Aabb::new(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn extend_is_componentwise_union() {
        let mut a = unit_box();
        let b = Aabb::new(Point3f::new(-1.0, 0.5, 0.2), Point3f::new(0.5, 3.0, 0.8));
        a.extend(&b);
        assert_eq!(a.min, Point3f::new(-1.0, 0.0, 0.0));
        assert_eq!(a.max, Point3f::new(1.0, 3.0, 1.0));
    }

    #[test]
    fn empty_is_union_identity() {
        let mut a = Aabb::empty();
        assert!(a.is_empty());
        a.extend(&unit_box());
        assert_eq!(a, unit_box());
    }

    #[test]
    fn max_extent_axis_prefers_x_then_y_on_ties() {
        assert_eq!(unit_box().max_extent_axis(), 0);
        let yz = Aabb::new(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 2.0, 2.0));
        assert_eq!(yz.max_extent_axis(), 1);
        let z = Aabb::new(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 5.0));
        assert_eq!(z.max_extent_axis(), 2);
    }

    #[test]
    fn slab_hit_returns_entry_distance() {
        let ray = Ray::new(Point3f::new(-5.0, 0.5, 0.5), Vector3f::new(1.0, 0.0, 0.0));
        let t = unit_box().intersect(&ray).unwrap();
        assert_relative_eq!(t, 5.0);
    }

    #[test]
    fn origin_inside_gives_zero() {
        let ray = Ray::new(Point3f::new(0.5, 0.5, 0.5), Vector3f::new(0.3, -1.0, 0.2));
        assert_eq!(unit_box().intersect(&ray), Some(0.0));
    }

    #[test]
    fn box_behind_origin_is_missed() {
        let ray = Ray::new(Point3f::new(5.0, 0.5, 0.5), Vector3f::new(1.0, 0.0, 0.0));
        assert_eq!(unit_box().intersect(&ray), None);
    }

    #[test]
    fn axis_parallel_ray_outside_slab_is_missed() {
        let ray = Ray::new(Point3f::new(-5.0, 2.0, 0.5), Vector3f::new(1.0, 0.0, 0.0));
        assert_eq!(unit_box().intersect(&ray), None);
    }

    #[test]
    fn empty_box_is_never_hit() {
        let ray = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, 1.0));
        assert_eq!(Aabb::empty().intersect(&ray), None);
        assert!(Aabb::empty().expanded(1.0).is_empty());
    }

    #[test]
    fn surface_area_of_box_and_empty_box() {
        let b = Aabb::new(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 2.0, 3.0));
        assert_eq!(b.surface_area(), 22.0);
        assert_eq!(Aabb::empty().surface_area(), 0.0);
    }

    #[test]
    fn nan_ray_does_not_panic() {
        let ray = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, 0.0));
        let _ = unit_box().intersect(&ray);
    }

    #[test]
    fn contains_checks_every_axis() {
        let outer = unit_box().expanded(0.1);
        assert!(outer.contains(&unit_box()));
        assert!(!unit_box().contains(&outer));
    }
}
