use std::path::Path;

use itertools::Itertools;
use log::{debug, warn};

use super::error::{Result, TracerError};
use super::shapes::*;

/// Loads every model of an OBJ file as a flat list of triangles.
/// Faces are triangulated on load; material ids are offset by `mat_offset`.
pub fn obj_to_triangles(path: &Path, mat_offset: usize) -> Result<Vec<Triangle>> {
    let options = tobj::LoadOptions { triangulate: true, single_index: true, ..Default::default() };
    let (models, materials) = tobj::load_obj(path, &options)
        .map_err(|source| TracerError::ObjLoad { path: path.to_path_buf(), source })?;
    if let Err(e) = materials {
        warn!("ignoring materials of {}: {}", path.display(), e);
    }

    let mut triangles = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        let mat_id = mat_offset + mesh.material_id.unwrap_or(0);
        let has_normals = !mesh.normals.is_empty();
        let has_texcoords = !mesh.texcoords.is_empty();
        debug!(
            "model `{}`: {} indices, normals: {}, texcoords: {}",
            model.name,
            mesh.indices.len(),
            has_normals,
            has_texcoords
        );

        let vertex = |i: u32| {
            let i = i as usize;
            let pos = Point3f::new(mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]);
            let normal = if has_normals {
                Vector3f::new(mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2])
            } else {
                Vector3f::new(0.0, 0.0, 0.0)
            };
            let tex = if has_texcoords {
                Point2f::new(mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1])
            } else {
                Point2f::new(0.0, 0.0)
            };
            Vertex::new(pos, normal, tex)
        };

        triangles.extend(
            mesh.indices
                .iter()
                .tuples()
                .map(|(&a, &b, &c)| Triangle::new(vertex(a), vertex(b), vertex(c), mat_id)),
        );
    }
    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_a_quad_as_two_triangles() {
        let dir = std::env::temp_dir().join(format!("bvh-tracer-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quad.obj");
        fs::write(
            &path,
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        )
        .unwrap();

        let triangles = obj_to_triangles(&path, 3).unwrap();
        assert_eq!(triangles.len(), 2);
        assert!(triangles.iter().all(|t| t.mat_id == 3));
        assert_eq!(triangles[0].vertices[0].pos, Point3f::new(0.0, 0.0, 0.0));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = obj_to_triangles(Path::new("/definitely/not/here.obj"), 0).unwrap_err();
        assert!(matches!(err, TracerError::ObjLoad { .. }));
    }
}
