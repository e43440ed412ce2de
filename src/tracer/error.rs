use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("failed to load OBJ file {path}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("failed to write image")]
    Image(#[from] image::ImageError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scene has no objects to render")]
    EmptyScene,
}

pub type Result<T> = std::result::Result<T, TracerError>;
