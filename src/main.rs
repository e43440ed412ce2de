use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use bvh_tracer::config::{self, Config, SceneSource};
use bvh_tracer::tracer::scene::Light;
use bvh_tracer::tracer::shapes::Color;
use bvh_tracer::tracer::{Accelerator, Renderer, Scene, TracerError};

fn load_scene(config: &Config) -> Result<Scene> {
    let mut scene = match &config.source {
        SceneSource::Random { spheres, seed } => Scene::random(*spheres, *seed),
        SceneSource::Obj(path) => Scene::from_obj(path)?,
    };
    if scene.num_objects() == 0 {
        return Err(TracerError::EmptyScene.into());
    }
    if let Some(fov) = config.fov {
        scene.camera.fov = fov;
    }
    if let Some(pos) = config.light {
        scene.lights = vec![Light { pos, color: Color::new(1.0, 1.0, 1.0) }];
    }
    Ok(scene)
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let matches = config::app().get_matches();
    let config = Config::from_matches(&matches).context("invalid command line")?;
    let scene = load_scene(&config).context("failed to set up the scene")?;

    let build_start = Local::now();
    let renderer = Renderer::new(&scene, config.accel, config.leaf_threshold);
    if let Accelerator::Bvh(bvh) = renderer.accelerator() {
        info!("{:?}", bvh.stats());
    }
    info!(
        "{} accelerator ready in {} ms",
        config.accel,
        (Local::now() - build_start).num_milliseconds()
    );

    let render_start = Local::now();
    let image = renderer.render(config.width, config.height, config.progress);
    let elapsed = Local::now() - render_start;
    info!(
        "rendered {}x{} in {:.2} s",
        config.width,
        config.height,
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    image
        .save(&config.output)
        .map_err(TracerError::from)
        .with_context(|| format!("could not save {}", config.output.display()))?;
    info!("saved {}", config.output.display());
    Ok(())
}
