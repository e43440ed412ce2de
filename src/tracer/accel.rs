use std::fmt;
use std::str::FromStr;

use super::bvh::{Bvh, Hit};
use super::error::TracerError;
use super::shapes::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelKind {
    /// Test every object for every ray.
    None,
    Bvh,
}

impl FromStr for AccelKind {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "linear" => Ok(AccelKind::None),
            "bvh" => Ok(AccelKind::Bvh),
            other => Err(TracerError::InvalidConfig(format!("unknown accelerator `{}`", other))),
        }
    }
}

impl fmt::Display for AccelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccelKind::None => write!(f, "none"),
            AccelKind::Bvh => write!(f, "bvh"),
        }
    }
}

/// Ray queries over the scene, either brute force or through a BVH.
pub enum Accelerator<'a> {
    Linear(&'a [Box<dyn Surface>]),
    Bvh(Bvh<'a, dyn Surface>),
}

impl<'a> Accelerator<'a> {
    pub fn new(kind: AccelKind, objects: &'a [Box<dyn Surface>], leaf_threshold: usize) -> Self {
        match kind {
            AccelKind::None => Accelerator::Linear(objects),
            AccelKind::Bvh => Accelerator::Bvh(Bvh::build(objects.iter().map(|o| &**o), leaf_threshold)),
        }
    }

    pub fn num_objects(&self) -> usize {
        match self {
            Accelerator::Linear(objects) => objects.len(),
            Accelerator::Bvh(bvh) => bvh.num_objects(),
        }
    }

    pub fn closest_hit(&self, ray: &Ray) -> Option<Hit<'a, dyn Surface>> {
        match self {
            Accelerator::Linear(objects) => {
                let mut closest: Option<Hit<'a, dyn Surface>> = None;
                for object in objects.iter().map(|o| &**o) {
                    if let Some(t) = object.intersect(ray) {
                        if closest.map_or(true, |hit| t < hit.distance) {
                            closest = Some(Hit { object, distance: t, point: ray.at(t) });
                        }
                    }
                }
                closest
            }
            Accelerator::Bvh(bvh) => bvh.closest_hit(ray),
        }
    }

    pub fn occluded(&self, ray: &Ray, max_distance: f32) -> bool {
        match self {
            Accelerator::Linear(objects) => objects
                .iter()
                .any(|object| object.intersect(ray).map_or(false, |t| t < max_distance)),
            Accelerator::Bvh(bvh) => bvh.occluded(ray, max_distance),
        }
    }

    pub fn occluded_between(&self, from: Point3f, to: Point3f) -> bool {
        let (ray, distance) = Ray::between(from, to);
        self.occluded(&ray, distance)
    }
}
