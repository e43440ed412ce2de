use cgmath::prelude::*;
use cgmath::Point2;
use cgmath::Point3;
use cgmath::Vector3;

use super::aabb::Aabb;

pub type Point2f = Point2<f32>;
pub type Point3f = Point3<f32>;
pub type Vector3f = Vector3<f32>;
pub type Color = Vector3<f32>;

/// Hits closer than this are treated as self-intersections.
pub const HIT_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3f,
    /// Always unit length, so distances along the ray are world distances.
    pub dir: Vector3f,
}

impl Ray {
    pub fn new(origin: Point3f, dir: Vector3f) -> Self {
        Ray { origin, dir: dir.normalize() }
    }

    /// Ray from `from` towards `to`, together with the distance between them.
    pub fn between(from: Point3f, to: Point3f) -> (Self, f32) {
        let d = to - from;
        (Ray::new(from, d), d.magnitude())
    }

    pub fn at(&self, t: f32) -> Point3f {
        self.origin + self.dir * t
    }
}

/// What the acceleration structure needs to know about a primitive.
pub trait Object: Send + Sync {
    fn bounding_box(&self) -> Aabb;

    fn centroid(&self) -> Point3f {
        self.bounding_box().center()
    }

    /// Distance to the nearest intersection in front of the ray origin.
    fn intersect(&self, ray: &Ray) -> Option<f32>;
}

/// Shading-side view of a primitive.
pub trait Surface: Object {
    fn normal_at(&self, pos: Point3f) -> Vector3f;
    fn mat_id(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct Sphere {
    pub origin: Point3f,
    pub radius: f32,
    pub mat_id: usize,
}

impl Sphere {
    pub fn new(origin: Point3f, radius: f32, mat_id: usize) -> Self {
        Sphere { origin, radius, mat_id }
    }
}

impl Object for Sphere {
    fn bounding_box(&self) -> Aabb {
        let r = Vector3f::new(self.radius, self.radius, self.radius);
        Aabb::new(self.origin - r, self.origin + r)
    }

    fn centroid(&self) -> Point3f {
        self.origin
    }

    fn intersect(&self, ray: &Ray) -> Option<f32> {
        let disp = self.origin - ray.origin;
        let ip = ray.dir.dot(disp);
        let discriminant = ip * ip - disp.magnitude2() + self.radius * self.radius;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let tnear = ip - root;
        let tfar = ip + root;
        if tnear > HIT_EPSILON {
            Some(tnear)
        } else if tfar > HIT_EPSILON {
            Some(tfar)
        } else {
            None
        }
    }
}

impl Surface for Sphere {
    fn normal_at(&self, pos: Point3f) -> Vector3f {
        (pos - self.origin).normalize()
    }

    fn mat_id(&self) -> usize {
        self.mat_id
    }
}

#[derive(Clone, Debug)]
pub struct Vertex {
    pub pos: Point3f,
    pub normal: Vector3f,
    pub tex: Point2f,
}

impl Vertex {
    pub fn new(pos: Point3f, normal: Vector3f, tex: Point2f) -> Vertex {
        Vertex { pos, normal, tex }
    }

    pub fn from_pos(pos: Point3f) -> Vertex {
        Vertex { pos, normal: Vector3f::zero(), tex: Point2f::new(0.0, 0.0) }
    }
}

#[derive(Clone, Debug)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
    pub mat_id: usize,
}

impl Triangle {
    pub fn new(a: Vertex, b: Vertex, c: Vertex, mat_id: usize) -> Self {
        Triangle { vertices: [a, b, c], mat_id }
    }

    fn face_normal(&self) -> Vector3f {
        let edge1 = self.vertices[1].pos - self.vertices[0].pos;
        let edge2 = self.vertices[2].pos - self.vertices[0].pos;
        edge1.cross(edge2).normalize()
    }

    /// Barycentric weights of `pos` with respect to the three vertices.
    fn barycentric(&self, pos: Point3f) -> (f32, f32, f32) {
        let [a, b, c] = [self.vertices[0].pos, self.vertices[1].pos, self.vertices[2].pos];
        let total = (b - a).cross(c - a).magnitude();
        if total == 0.0 {
            return (1.0, 0.0, 0.0);
        }
        let wa = (b - pos).cross(c - pos).magnitude() / total;
        let wb = (c - pos).cross(a - pos).magnitude() / total;
        (wa, wb, 1.0 - wa - wb)
    }
}

impl Object for Triangle {
    fn bounding_box(&self) -> Aabb {
        let mut bbox = Aabb::from_point(self.vertices[0].pos);
        bbox.extend_point(self.vertices[1].pos);
        bbox.extend_point(self.vertices[2].pos);
        bbox
    }

    fn centroid(&self) -> Point3f {
        Point3f::centroid(&[self.vertices[0].pos, self.vertices[1].pos, self.vertices[2].pos])
    }

    // Moller-Trumbore
    fn intersect(&self, ray: &Ray) -> Option<f32> {
        const EPSILON: f32 = 0.0000001;
        let edge1 = self.vertices[1].pos - self.vertices[0].pos;
        let edge2 = self.vertices[2].pos - self.vertices[0].pos;
        let h = ray.dir.cross(edge2);
        let a = edge1.dot(h);
        if a > -EPSILON && a < EPSILON {
            return None;
        }
        let f = 1.0 / a;
        let s = ray.origin - self.vertices[0].pos;
        let u = f * s.dot(h);
        if u < 0.0 || u > 1.0 {
            return None;
        }
        let q = s.cross(edge1);
        let v = f * ray.dir.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = f * edge2.dot(q);
        if t > HIT_EPSILON { Some(t) } else { None }
    }
}

impl Surface for Triangle {
    fn normal_at(&self, pos: Point3f) -> Vector3f {
        let has_normals = self.vertices.iter().all(|v| v.normal != Vector3f::zero());
        if !has_normals {
            return self.face_normal();
        }
        let (wa, wb, wc) = self.barycentric(pos);
        (self.vertices[0].normal * wa + self.vertices[1].normal * wb + self.vertices[2].normal * wc)
            .normalize()
    }

    fn mat_id(&self) -> usize {
        self.mat_id
    }
}
