//! Model loading collaborator: path in, `Model` out.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::ModelError;
use crate::model::{Model, SubMesh};

/// Anything that turns a file path into a `Model`.
pub trait ModelLoader {
    fn load(&self, path: &Path) -> Result<Model, ModelError>;
}

/// Path of a named primitive shape inside the primitives directory.
pub fn primitive_path(primitives_dir: &Path, name: &str) -> PathBuf {
    primitives_dir.join(name)
}

/// Wavefront OBJ loader. Faces are fan-triangulated; each `o`/`g` group
/// becomes its own sub-mesh. Vertices written as `v x y z r g b` carry
/// colours.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjLoader;

impl ModelLoader for ObjLoader {
    fn load(&self, path: &Path) -> Result<Model, ModelError> {
        if path.as_os_str().is_empty() {
            return Err(ModelError::EmptyPath);
        }
        let is_obj = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("obj"));
        if !is_obj {
            return Err(ModelError::UnsupportedFormat(path.to_path_buf()));
        }

        let file = File::open(path).map_err(|source| ModelError::Io { path: path.to_path_buf(), source })?;
        let meshes = parse_obj(BufReader::new(file)).map_err(|e| match e {
            ParseFailure::Io(source) => ModelError::Io { path: path.to_path_buf(), source },
            ParseFailure::Syntax { line, message } => ModelError::Parse { line, message },
        })?;

        let model = Model::new(path.to_path_buf(), meshes);
        if !model.is_valid() {
            return Err(ModelError::Empty(path.to_path_buf()));
        }
        tracing::info!(
            "loaded {:?}: {} meshes, bounds {:?}..{:?}",
            path,
            model.meshes.len(),
            model.bounds.min,
            model.bounds.max
        );
        Ok(model)
    }
}

enum ParseFailure {
    Io(std::io::Error),
    Syntax { line: usize, message: String },
}

/// Corner reference `v[/vt][/vn]` resolved to zero-based indices.
type Corner = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct MeshBuilder {
    mesh: SubMesh,
    corners: HashMap<Corner, u32>,
    all_normals: bool,
    all_uvs: bool,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    colors: Vec<[f32; 4]>,
}

impl MeshBuilder {
    fn new() -> Self {
        Self { all_normals: true, all_uvs: true, ..Default::default() }
    }

    fn is_empty(&self) -> bool {
        self.mesh.indices.is_empty()
    }

    fn finish(mut self, with_colors: bool) -> SubMesh {
        if self.all_normals {
            self.mesh.normals = Some(self.normals);
        }
        if self.all_uvs {
            self.mesh.uvs = Some(self.uvs);
        }
        if with_colors {
            self.mesh.colors = Some(self.colors);
        }
        self.mesh
    }
}

fn parse_floats<const N: usize>(parts: &[&str], line: usize) -> Result<[f32; N], ParseFailure> {
    let mut out = [0.0; N];
    for (slot, text) in out.iter_mut().zip(parts) {
        *slot = text.parse().map_err(|_| ParseFailure::Syntax {
            line,
            message: format!("invalid number {text:?}"),
        })?;
    }
    Ok(out)
}

/// Resolve a 1-based (or negative, relative) OBJ index.
fn resolve_index(text: &str, count: usize, line: usize) -> Result<usize, ParseFailure> {
    let raw: i64 = text.parse().map_err(|_| ParseFailure::Syntax {
        line,
        message: format!("invalid index {text:?}"),
    })?;
    let resolved = if raw < 0 { count as i64 + raw } else { raw - 1 };
    if resolved < 0 || resolved as usize >= count {
        return Err(ParseFailure::Syntax { line, message: format!("index {raw} out of range") });
    }
    Ok(resolved as usize)
}

fn parse_corner(text: &str, counts: (usize, usize, usize), line: usize) -> Result<Corner, ParseFailure> {
    let mut fields = text.split('/');
    let v = resolve_index(fields.next().unwrap_or(""), counts.0, line)?;
    let vt = match fields.next() {
        Some(t) if !t.is_empty() => Some(resolve_index(t, counts.1, line)?),
        _ => None,
    };
    let vn = match fields.next() {
        Some(n) if !n.is_empty() => Some(resolve_index(n, counts.2, line)?),
        _ => None,
    };
    Ok((v, vt, vn))
}

fn parse_obj(reader: impl BufRead) -> Result<Vec<SubMesh>, ParseFailure> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut colors: Vec<Option<[f32; 4]>> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();

    let mut finished: Vec<MeshBuilder> = Vec::new();
    let mut current = MeshBuilder::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(ParseFailure::Io)?;
        let number = number + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "v" if parts.len() >= 4 => {
                positions.push(parse_floats::<3>(&parts[1..4], number)?);
                colors.push(if parts.len() >= 7 {
                    let [r, g, b] = parse_floats::<3>(&parts[4..7], number)?;
                    Some([r, g, b, 1.0])
                } else {
                    None
                });
            }
            "vt" if parts.len() >= 3 => tex_coords.push(parse_floats::<2>(&parts[1..3], number)?),
            "vn" if parts.len() >= 4 => normals.push(parse_floats::<3>(&parts[1..4], number)?),
            "o" | "g" => {
                if !current.is_empty() {
                    finished.push(std::mem::replace(&mut current, MeshBuilder::new()));
                }
            }
            "f" if parts.len() >= 4 => {
                let counts = (positions.len(), tex_coords.len(), normals.len());
                let corners = parts[1..]
                    .iter()
                    .map(|c| parse_corner(c, counts, number))
                    .collect::<Result<Vec<_>, _>>()?;

                let mut face = Vec::with_capacity(corners.len());
                for corner in corners {
                    let index = match current.corners.get(&corner) {
                        Some(&i) => i,
                        None => {
                            let (v, vt, vn) = corner;
                            let i = current.mesh.positions.len() as u32;
                            current.mesh.positions.push(positions[v]);
                            current.colors.push(colors[v].unwrap_or([1.0; 4]));
                            match vt {
                                Some(t) => current.uvs.push(tex_coords[t]),
                                None => current.all_uvs = false,
                            }
                            match vn {
                                Some(n) => current.normals.push(normals[n]),
                                None => current.all_normals = false,
                            }
                            current.corners.insert(corner, i);
                            i
                        }
                    };
                    face.push(index);
                }

                // Fan triangulation for convex polygons
                for i in 1..face.len() - 1 {
                    current.mesh.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            "f" => {
                return Err(ParseFailure::Syntax { line: number, message: "face with fewer than 3 vertices".into() });
            }
            _ => {}
        }
    }
    if !current.is_empty() {
        finished.push(current);
    }

    let with_colors = colors.iter().any(Option::is_some);
    Ok(finished.into_iter().map(|b| b.finish(with_colors)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::io::Write;

    const QUAD: &str = "\
# unit quad
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn test_quad_is_fan_triangulated() {
        let meshes = parse_obj(QUAD.as_bytes()).ok().unwrap();
        assert_eq!(meshes.len(), 1);
        let mesh = &meshes[0];
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.normals.as_ref().map(Vec::len), Some(4));
        assert!(mesh.uvs.is_none());
        assert!(mesh.colors.is_none());
    }

    #[test]
    fn test_groups_become_sub_meshes() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\no a\nf 1 2 3\no b\nf -3 -2 -1\n";
        let meshes = parse_obj(src.as_bytes()).ok().unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[1].positions[2], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let src = "v 0 0 0\nf 1 2 3\n";
        match parse_obj(src.as_bytes()) {
            Err(ParseFailure::Syntax { line, .. }) => assert_eq!(line, 2),
            _ => panic!("expected syntax error"),
        }
    }

    #[test]
    fn test_load_from_disk_computes_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        File::create(&path).unwrap().write_all(QUAD.as_bytes()).unwrap();

        let model = ObjLoader.load(&path).unwrap();
        assert!(model.is_valid());
        assert_eq!(model.bounds.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(model.bounds.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_empty_path_and_other_formats_are_rejected() {
        assert!(matches!(ObjLoader.load(Path::new("")), Err(ModelError::EmptyPath)));
        assert!(matches!(
            ObjLoader.load(Path::new("mesh.fbx")),
            Err(ModelError::UnsupportedFormat(_))
        ));
    }
}
