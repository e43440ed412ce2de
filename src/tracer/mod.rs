pub mod aabb;
pub mod accel;
pub mod bvh;
pub mod error;
pub mod loader;
pub mod render;
pub mod scene;
pub mod shapes;

pub use self::aabb::Aabb;
pub use self::accel::{AccelKind, Accelerator};
pub use self::bvh::{Bvh, BvhAreas, BvhNode, BvhStats, Hit, NodeKind};
pub use self::error::TracerError;
pub use self::render::Renderer;
pub use self::scene::Scene;
pub use self::shapes::{Object, Ray, Sphere, Surface, Triangle};
