use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};

use crate::tracer::bvh::DEFAULT_LEAF_THRESHOLD;
use crate::tracer::error::{Result, TracerError};
use crate::tracer::shapes::Point3f;
use crate::tracer::AccelKind;

#[derive(Clone, Debug, PartialEq)]
pub enum SceneSource {
    Random { spheres: usize, seed: u64 },
    Obj(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fov: Option<f32>,
    pub accel: AccelKind,
    pub leaf_threshold: usize,
    pub source: SceneSource,
    pub light: Option<Point3f>,
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: PathBuf::from("result.png"),
            width: 640,
            height: 480,
            fov: None,
            accel: AccelKind::Bvh,
            leaf_threshold: DEFAULT_LEAF_THRESHOLD,
            source: SceneSource::Random { spheres: 100, seed: 0 },
            light: None,
            progress: true,
        }
    }
}

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("bvh-tracer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Whitted-style ray tracer accelerated by a bounding volume hierarchy")
        .arg(Arg::with_name("output").short("o").long("output").takes_value(true).default_value("result.png"))
        .arg(Arg::with_name("width").long("width").takes_value(true).default_value("640"))
        .arg(Arg::with_name("height").long("height").takes_value(true).default_value("480"))
        .arg(Arg::with_name("fov").long("fov").takes_value(true).help("Vertical field of view in degrees"))
        .arg(
            Arg::with_name("accel")
                .short("a")
                .long("accel")
                .takes_value(true)
                .possible_values(&["none", "bvh"])
                .default_value("bvh"),
        )
        .arg(
            Arg::with_name("threshold")
                .short("t")
                .long("threshold")
                .takes_value(true)
                .help("Maximum number of objects per BVH leaf"),
        )
        .arg(
            Arg::with_name("obj")
                .long("obj")
                .takes_value(true)
                .conflicts_with("spheres")
                .help("Render the triangles of an OBJ file"),
        )
        .arg(Arg::with_name("spheres").short("n").long("spheres").takes_value(true).help("Random scene size"))
        .arg(Arg::with_name("seed").short("s").long("seed").takes_value(true).default_value("0"))
        .arg(
            Arg::with_name("light")
                .long("light")
                .takes_value(true)
                .number_of_values(3)
                .allow_hyphen_values(true)
                .value_names(&["X", "Y", "Z"])
                .help("Replace the scene lights by a single white light"),
        )
        .arg(Arg::with_name("quiet").short("q").long("quiet").help("Hide the progress bar"))
}

fn parse<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| TracerError::InvalidConfig(format!("invalid value `{}` for --{}", raw, name))),
        None => Ok(None),
    }
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Config> {
        let defaults = Config::default();
        let source = match matches.value_of("obj") {
            Some(path) => SceneSource::Obj(PathBuf::from(path)),
            None => SceneSource::Random {
                spheres: parse(matches, "spheres")?.unwrap_or(100),
                seed: parse(matches, "seed")?.unwrap_or(0),
            },
        };
        let light = match matches.values_of("light") {
            Some(values) => {
                let coords = values
                    .map(|v| {
                        v.parse::<f32>()
                            .map_err(|_| TracerError::InvalidConfig(format!("invalid light coordinate `{}`", v)))
                    })
                    .collect::<Result<Vec<f32>>>()?;
                Some(Point3f::new(coords[0], coords[1], coords[2]))
            }
            None => None,
        };

        let config = Config {
            output: matches.value_of("output").map(PathBuf::from).unwrap_or(defaults.output),
            width: parse(matches, "width")?.unwrap_or(defaults.width),
            height: parse(matches, "height")?.unwrap_or(defaults.height),
            fov: parse(matches, "fov")?,
            accel: parse(matches, "accel")?.unwrap_or(defaults.accel),
            leaf_threshold: parse(matches, "threshold")?.unwrap_or(defaults.leaf_threshold),
            source,
            light,
            progress: !matches.is_present("quiet"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TracerError::InvalidConfig(format!(
                "image size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.leaf_threshold == 0 {
            return Err(TracerError::InvalidConfig("leaf threshold must be at least 1".into()));
        }
        if let Some(fov) = self.fov {
            if !(fov > 0.0 && fov < 180.0) {
                return Err(TracerError::InvalidConfig(format!("field of view {} is out of range", fov)));
            }
        }
        Ok(())
    }
}
