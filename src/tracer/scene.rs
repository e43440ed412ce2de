use std::path::Path;

use cgmath::prelude::*;
use lazy_static::lazy_static;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::aabb::Aabb;
use super::error::Result;
use super::loader::obj_to_triangles;
use super::shapes::*;

#[derive(Clone, Debug)]
pub struct Material {
    pub surface_color: Color,
    pub diffuse: f32,
    pub specular: f32,
    pub shininess: f32,
    pub reflectivity: f32,
}

impl Material {
    pub fn matte(surface_color: Color) -> Self {
        Material { surface_color, diffuse: 0.9, specular: 0.1, shininess: 8.0, reflectivity: 0.0 }
    }

    pub fn mirror(surface_color: Color, reflectivity: f32) -> Self {
        Material { surface_color, diffuse: 0.5, specular: 0.6, shininess: 64.0, reflectivity }
    }
}

lazy_static! {
    static ref DEFAULT_MATERIAL: Material = Material::matte(Color::new(0.8, 0.8, 0.8));
}

#[derive(Clone, Debug)]
pub struct Light {
    pub pos: Point3f,
    pub color: Color,
}

/// Pinhole camera looking from `eye` at `at`.
#[derive(Clone, Debug)]
pub struct Camera {
    pub eye: Point3f,
    pub at: Point3f,
    pub up: Vector3f,
    pub fov: f32,
}

impl Camera {
    /// Primary ray through the center of pixel `(i, j)`.
    pub fn primary_ray(&self, i: u32, j: u32, width: u32, height: u32) -> Ray {
        let n = (self.eye - self.at).normalize();
        let u = self.up.cross(n).normalize();
        let v = n.cross(u);
        let tangent = (self.fov / 2.0).to_radians().tan();
        let aspect_ratio = width as f32 / height as f32;
        let x = (2.0 * (i as f32 + 0.5) / width as f32 - 1.0) * tangent * aspect_ratio;
        let y = (1.0 - 2.0 * (j as f32 + 0.5) / height as f32) * tangent;
        Ray::new(self.eye, u * x + v * y - n)
    }
}

pub struct Scene {
    pub camera: Camera,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
    pub objects: Vec<Box<dyn Surface>>,
    pub background: Color,
}

impl Scene {
    const SPHERE_SPACING: f32 = 2.5;

    pub fn material(&self, id: usize) -> &Material {
        self.materials.get(id).unwrap_or(&*DEFAULT_MATERIAL)
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.objects.iter().fold(Aabb::empty(), |acc, o| acc.union(&o.bounding_box()))
    }

    /// Non-overlapping spheres jittered on a square grid, resting on a floor
    /// made of two triangles. The same seed always gives the same scene.
    pub fn random(count: usize, seed: u64) -> Scene {
        let mut rng = StdRng::seed_from_u64(seed);
        let side = (count as f32).sqrt().ceil().max(1.0) as usize;
        let half = side as f32 * Scene::SPHERE_SPACING / 2.0;

        let mut materials = vec![Material::matte(Color::new(0.6, 0.6, 0.6))];
        let mut objects: Vec<Box<dyn Surface>> = Vec::with_capacity(count + 2);

        let corner = |x: f32, z: f32| Vertex::new(Point3f::new(x, 0.0, z), Vector3f::unit_y(), Point2f::new(0.0, 0.0));
        let (a, b, c, d) = (corner(-half, -half), corner(half, -half), corner(half, half), corner(-half, half));
        objects.push(Box::new(Triangle::new(a.clone(), c.clone(), b, 0)));
        objects.push(Box::new(Triangle::new(a, d, c, 0)));

        for k in 0..count {
            let (row, col) = (k / side, k % side);
            let radius = rng.gen_range(0.3..1.0);
            let slack = Scene::SPHERE_SPACING / 2.0 - radius;
            let x = -half + (col as f32 + 0.5) * Scene::SPHERE_SPACING + rng.gen_range(-slack..=slack);
            let z = -half + (row as f32 + 0.5) * Scene::SPHERE_SPACING + rng.gen_range(-slack..=slack);
            let color = Color::new(rng.gen_range(0.1..1.0), rng.gen_range(0.1..1.0), rng.gen_range(0.1..1.0));
            let material = if rng.gen_bool(0.2) {
                Material::mirror(color, 0.6)
            } else {
                Material::matte(color)
            };
            materials.push(material);
            objects.push(Box::new(Sphere::new(Point3f::new(x, radius, z), radius, materials.len() - 1)));
        }

        let extent = half.max(2.0);
        let camera = Camera {
            eye: Point3f::new(0.0, extent * 1.2, extent * 2.2),
            at: Point3f::new(0.0, 0.0, 0.0),
            up: Vector3f::unit_y(),
            fov: 60.0,
        };
        let lights = vec![
            Light { pos: Point3f::new(-extent, extent * 2.0, extent), color: Color::new(0.7, 0.7, 0.7) },
            Light { pos: Point3f::new(extent, extent * 1.5, -extent), color: Color::new(0.4, 0.4, 0.5) },
        ];

        info!("random scene: {} spheres on a {}x{} grid (seed {})", count, side, side, seed);
        Scene { camera, materials, lights, objects, background: Color::new(0.1, 0.1, 0.15) }
    }

    /// Triangles of an OBJ file, framed by a camera on the +z side.
    pub fn from_obj(path: &Path) -> Result<Scene> {
        let triangles = obj_to_triangles(path, 0)?;
        let objects: Vec<Box<dyn Surface>> = triangles
            .into_iter()
            .map(|t| Box::new(t) as Box<dyn Surface>)
            .collect();

        let mut scene = Scene {
            camera: Camera {
                eye: Point3f::new(0.0, 0.0, 5.0),
                at: Point3f::new(0.0, 0.0, 0.0),
                up: Vector3f::unit_y(),
                fov: 60.0,
            },
            materials: vec![],
            lights: vec![],
            objects,
            background: Color::new(0.1, 0.1, 0.15),
        };

        let bounds = scene.bounds();
        if !bounds.is_empty() {
            let center = bounds.center();
            let radius = bounds.extent().magnitude().max(1e-3);
            scene.camera.at = center;
            scene.camera.eye = center + Vector3f::new(0.0, radius * 0.3, radius * 1.5);
            scene.lights.push(Light {
                pos: center + Vector3f::new(radius, radius * 2.0, radius * 2.0),
                color: Color::new(1.0, 1.0, 1.0),
            });
        }
        info!("loaded {} triangles from {}", scene.num_objects(), path.display());
        Ok(scene)
    }
}
