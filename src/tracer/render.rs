use std::sync::Mutex;

use cgmath::prelude::*;
use image::RgbImage;
use log::debug;
use pbr::ProgressBar;
use rayon::prelude::*;

use super::accel::{AccelKind, Accelerator};
use super::scene::Scene;
use super::shapes::*;

const GAMMA: f32 = 2.2;
const AMBIENT: f32 = 0.05;
/// Offset of secondary ray origins along the normal, against acne.
const SURFACE_BIAS: f32 = 1e-3;

fn gamma_encode(linear: f32) -> f32 {
    linear.max(0.0).powf(1.0 / GAMMA)
}

fn to_rgb(color: Color) -> [u8; 3] {
    let channel = |c: f32| (gamma_encode(c).min(1.0) * 255.0) as u8;
    [channel(color.x), channel(color.y), channel(color.z)]
}

fn reflect(dir: Vector3f, normal: Vector3f) -> Vector3f {
    (dir - 2.0 * dir.dot(normal) * normal).normalize()
}

/// Direct lighting with shadow rays plus mirror reflections.
pub struct Renderer<'a> {
    scene: &'a Scene,
    accel: Accelerator<'a>,
}

impl<'a> Renderer<'a> {
    pub const MAX_RAY_DEPTH: u32 = 4;

    pub fn new(scene: &'a Scene, kind: AccelKind, leaf_threshold: usize) -> Self {
        let accel = Accelerator::new(kind, &scene.objects, leaf_threshold);
        Renderer { scene, accel }
    }

    pub fn accelerator(&self) -> &Accelerator<'a> {
        &self.accel
    }

    pub fn trace(&self, ray: &Ray, depth: u32) -> Color {
        let hit = match self.accel.closest_hit(ray) {
            Some(hit) => hit,
            None => return self.scene.background,
        };

        let mat = self.scene.material(hit.object.mat_id());
        let mut normal = hit.object.normal_at(hit.point);
        if normal.dot(ray.dir) > 0.0 {
            normal = -normal;
        }
        let origin = hit.point + normal * SURFACE_BIAS;

        let mut color = mat.surface_color * AMBIENT;
        for light in &self.scene.lights {
            let to_light = (light.pos - hit.point).normalize();
            let cos_theta = normal.dot(to_light);
            if cos_theta <= 0.0 || self.accel.occluded_between(origin, light.pos) {
                continue;
            }
            let halfway = (to_light - ray.dir).normalize();
            let diffuse = light.color.mul_element_wise(mat.surface_color) * mat.diffuse * cos_theta;
            let specular = light.color * mat.specular * normal.dot(halfway).max(0.0).powf(mat.shininess);
            color += diffuse + specular;
        }

        if mat.reflectivity > 0.0 && depth < Self::MAX_RAY_DEPTH {
            let reflection_ray = Ray::new(origin, reflect(ray.dir, normal));
            color += self.trace(&reflection_ray, depth + 1) * mat.reflectivity;
        }
        color
    }

    /// Renders rows in parallel. Every worker traverses the shared
    /// accelerator with its own per-query stack.
    pub fn render(&self, width: u32, height: u32, show_progress: bool) -> RgbImage {
        let camera = &self.scene.camera;
        let progress = if show_progress {
            let mut pb = ProgressBar::new(height as u64);
            pb.message("rows ");
            Some(Mutex::new(pb))
        } else {
            None
        };

        let mut image = RgbImage::new(width, height);
        (*image)
            .par_chunks_mut(3 * width as usize)
            .enumerate()
            .for_each(|(j, row)| {
                for (i, pixel) in row.chunks_mut(3).enumerate() {
                    let ray = camera.primary_ray(i as u32, j as u32, width, height);
                    pixel.copy_from_slice(&to_rgb(self.trace(&ray, 0)));
                }
                if let Some(pb) = &progress {
                    if let Ok(mut pb) = pb.lock() {
                        pb.inc();
                    }
                }
            });

        if let Some(pb) = progress {
            if let Ok(mut pb) = pb.into_inner() {
                pb.finish_print("done");
            }
        }
        debug!("rendered {}x{} over {} objects", width, height, self.accel.num_objects());
        image
    }
}
