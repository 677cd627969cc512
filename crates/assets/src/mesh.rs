//! Voxel model meshes.
//!
//! `<name>.model` files are OBJ text exported from a voxel editor: `v`, `vn`,
//! `vt` and `f` statements, every face corner carrying position, texcoord
//! and normal references. The palette image next to it is indexed by the
//! texcoord's `u` component, so `v` is dropped.

use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::path::Path;

/// Voxel editors export one unit per voxel; the renderer works in tenths.
pub const MODEL_SCALE: f32 = 10.0;

/// Errors from parsing or deduplicating a mesh.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("face corner {corner} has no position")]
    MissingPosition { corner: usize },
    #[error("face corner {corner} has no texcoord")]
    MissingTexcoord { corner: usize },
    #[error("face corner {corner} has no normal")]
    MissingNormal { corner: usize },
    #[error("face corner {corner} references {kind} {index}, but only {len} exist")]
    IndexOutOfRange {
        corner: usize,
        kind: &'static str,
        index: u32,
        len: usize,
    },
    #[error("mesh has {0} unique vertices, more than 16-bit indices can address")]
    TooManyVertices(usize),
    #[error("mesh has no faces")]
    Empty,
}

/// Zero-based references of one face corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjIndex {
    pub position: Option<u32>,
    pub texcoord: Option<u32>,
    pub normal: Option<u32>,
}

/// Raw attribute streams plus a triangle list of face corners.
#[derive(Debug, Clone, Default)]
pub struct ObjMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub indices: Vec<ObjIndex>,
}

impl ObjMesh {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let text = std::fs::read_to_string(path.as_ref()).inspect_err(|e| {
            tracing::error!("failed to read model {}: {e}", path.as_ref().display());
        })?;
        Self::parse(&text)
    }

    /// Parse OBJ text. Polygons are fan-triangulated; statements other than
    /// `v`, `vn`, `vt` and `f` are ignored.
    pub fn parse(text: &str) -> Result<Self, MeshError> {
        let mut mesh = Self::default();

        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let content = raw.split('#').next().unwrap_or_default();
            let mut parts = content.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };

            match keyword {
                "v" => mesh.positions.push(parse_floats(line, parts)?),
                "vn" => mesh.normals.push(parse_floats(line, parts)?),
                "vt" => {
                    // The optional `w` component is ignored.
                    let values: Vec<&str> = parts.take(2).collect();
                    mesh.texcoords.push(parse_floats(line, values.into_iter())?);
                }
                "f" => {
                    let corners = parts
                        .map(|corner| mesh.parse_corner(line, corner))
                        .collect::<Result<Vec<_>, _>>()?;
                    if corners.len() < 3 {
                        return Err(MeshError::Parse {
                            line,
                            message: format!("face has {} corners", corners.len()),
                        });
                    }
                    for k in 1..corners.len() - 1 {
                        mesh.indices
                            .extend_from_slice(&[corners[0], corners[k], corners[k + 1]]);
                    }
                }
                _ => {}
            }
        }

        Ok(mesh)
    }

    fn parse_corner(&self, line: usize, corner: &str) -> Result<ObjIndex, MeshError> {
        let mut fields = corner.split('/');
        let mut next = |len: usize| -> Result<Option<u32>, MeshError> {
            match fields.next() {
                None | Some("") => Ok(None),
                Some(field) => resolve_index(line, field, len).map(Some),
            }
        };
        Ok(ObjIndex {
            position: next(self.positions.len())?,
            texcoord: next(self.texcoords.len())?,
            normal: next(self.normals.len())?,
        })
    }
}

fn parse_floats<'a, const N: usize>(
    line: usize,
    parts: impl Iterator<Item = &'a str>,
) -> Result<[f32; N], MeshError> {
    let mut out = [0.0; N];
    let mut count = 0;
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| MeshError::Parse {
            line,
            message: format!("invalid number `{part}`"),
        })?;
        count += 1;
    }
    if count < N {
        return Err(MeshError::Parse {
            line,
            message: format!("expected {N} components, found {count}"),
        });
    }
    Ok(out)
}

/// OBJ indices are 1-based; negative values count back from the most
/// recently declared element.
fn resolve_index(line: usize, field: &str, len: usize) -> Result<u32, MeshError> {
    let value: i64 = field.parse().map_err(|_| MeshError::Parse {
        line,
        message: format!("invalid index `{field}`"),
    })?;
    let resolved = match value {
        0 => None,
        v if v > 0 => Some(v - 1),
        v => Some(len as i64 + v).filter(|r| *r >= 0),
    };
    resolved
        .and_then(|r| u32::try_from(r).ok())
        .ok_or_else(|| MeshError::Parse {
            line,
            message: format!("index `{field}` does not resolve"),
        })
}

/// One deduplicated model vertex, laid out for the vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VoxelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: f32,
}

impl VoxelVertex {
    fn key(&self) -> [u32; 7] {
        bytemuck::cast(*self)
    }
}

/// Vertex and index data ready for upload.
#[derive(Debug, Clone, Default)]
pub struct VoxelMesh {
    pub vertices: Vec<VoxelVertex>,
    pub indices: Vec<u16>,
}

/// Collapse identical face corners into shared vertices.
///
/// Two corners are identical when their scaled position, normal and
/// texcoord `u` match bit for bit.
pub fn deduplicate(mesh: &ObjMesh) -> Result<VoxelMesh, MeshError> {
    if mesh.indices.is_empty() {
        return Err(MeshError::Empty);
    }

    let mut out = VoxelMesh {
        vertices: Vec::new(),
        indices: Vec::with_capacity(mesh.indices.len()),
    };
    let mut lookup: HashMap<[u32; 7], u16> = HashMap::new();

    for (corner, index) in mesh.indices.iter().enumerate() {
        let p = index
            .position
            .ok_or(MeshError::MissingPosition { corner })?;
        let t = index
            .texcoord
            .ok_or(MeshError::MissingTexcoord { corner })?;
        let n = index.normal.ok_or(MeshError::MissingNormal { corner })?;

        let position = fetch(&mesh.positions, p, corner, "position")?;
        let texcoord = fetch(&mesh.texcoords, t, corner, "texcoord")?;
        let normal = fetch(&mesh.normals, n, corner, "normal")?;

        let vertex = VoxelVertex {
            position: position.map(|c| c * MODEL_SCALE),
            normal,
            texcoord: texcoord[0],
        };

        let next = out.vertices.len();
        let slot = match lookup.get(&vertex.key()) {
            Some(&existing) => existing,
            None => {
                let slot =
                    u16::try_from(next).map_err(|_| MeshError::TooManyVertices(next + 1))?;
                lookup.insert(vertex.key(), slot);
                out.vertices.push(vertex);
                slot
            }
        };
        out.indices.push(slot);
    }

    tracing::debug!(
        "deduplicated {} corners into {} vertices",
        out.indices.len(),
        out.vertices.len()
    );
    Ok(out)
}

fn fetch<T: Copy>(
    items: &[T],
    index: u32,
    corner: usize,
    kind: &'static str,
) -> Result<T, MeshError> {
    items
        .get(index as usize)
        .copied()
        .ok_or(MeshError::IndexOutOfRange {
            corner,
            kind,
            index,
            len: items.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# two triangles sharing an edge
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0.25 0.5
vn 0 0 1
f 1/1/1 2/1/1 3/1/1
f 1/1/1 3/1/1 4/1/1
";

    #[test]
    fn parse_counts_streams() {
        let mesh = ObjMesh::parse(QUAD).unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.texcoords.len(), 1);
        assert_eq!(mesh.normals.len(), 1);
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(
            mesh.indices[0],
            ObjIndex {
                position: Some(0),
                texcoord: Some(0),
                normal: Some(0),
            }
        );
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let mesh = ObjMesh::parse(QUAD).unwrap();
        let out = deduplicate(&mesh).unwrap();
        assert_eq!(out.vertices.len(), 4);
        assert_eq!(out.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn identical_corners_share_one_vertex() {
        let mut mesh = ObjMesh::parse(QUAD).unwrap();
        let corner = mesh.indices[0];
        mesh.indices = vec![corner, corner];
        let out = deduplicate(&mesh).unwrap();
        assert_eq!(out.vertices.len(), 1);
        assert_eq!(out.indices, vec![0, 0]);
    }

    #[test]
    fn positions_are_scaled_and_u_is_kept() {
        let out = deduplicate(&ObjMesh::parse(QUAD).unwrap()).unwrap();
        assert_eq!(out.vertices[2].position, [10.0, 10.0, 0.0]);
        assert_eq!(out.vertices[2].normal, [0.0, 0.0, 1.0]);
        assert_eq!(out.vertices[2].texcoord, 0.25);
    }

    #[test]
    fn differing_normal_breaks_sharing() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvn 0 0 1\nvn 0 0 -1\n\
                    f 1/1/1 2/1/1 3/1/1\nf 1/1/2 3/1/2 2/1/2\n";
        let out = deduplicate(&ObjMesh::parse(text).unwrap()).unwrap();
        assert_eq!(out.vertices.len(), 6);
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvn 0 0 1\n\
                    f 1/1/1 2/1/1 3/1/1 4/1/1\n";
        let mesh = ObjMesh::parse(text).unwrap();
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(deduplicate(&mesh).unwrap().indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn negative_indices_are_relative() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvn 0 0 1\nf -3/-1/-1 -2/-1/-1 -1/-1/-1\n";
        let mesh = ObjMesh::parse(text).unwrap();
        assert_eq!(mesh.indices[0].position, Some(0));
        assert_eq!(mesh.indices[2].position, Some(2));
    }

    #[test]
    fn missing_texcoord_fails() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        let err = deduplicate(&ObjMesh::parse(text).unwrap()).unwrap_err();
        assert!(matches!(err, MeshError::MissingTexcoord { corner: 0 }));
    }

    #[test]
    fn missing_normal_fails() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nf 1/1 2/1 3/1\n";
        let err = deduplicate(&ObjMesh::parse(text).unwrap()).unwrap_err();
        assert!(matches!(err, MeshError::MissingNormal { corner: 0 }));
    }

    #[test]
    fn out_of_range_reference_fails() {
        let text = "v 0 0 0\nvt 0 0\nvn 0 0 1\nf 1/1/1 2/1/1 3/1/1\n";
        let err = deduplicate(&ObjMesh::parse(text).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MeshError::IndexOutOfRange {
                corner: 1,
                kind: "position",
                ..
            }
        ));
    }

    #[test]
    fn malformed_lines_report_line_number() {
        let err = ObjMesh::parse("v 0 0 0\nv 1 x 0\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 2, .. }));

        let err = ObjMesh::parse("v 0 0 0\nf 1 1\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 2, .. }));

        let err = ObjMesh::parse("f 0/1/1 1/1/1 1/1/1\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 1, .. }));
    }

    #[test]
    fn empty_mesh_fails() {
        let err = deduplicate(&ObjMesh::parse("v 0 0 0\n").unwrap()).unwrap_err();
        assert!(matches!(err, MeshError::Empty));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.model");
        std::fs::write(&path, QUAD).unwrap();
        let mesh = ObjMesh::load(&path).unwrap();
        assert_eq!(mesh.indices.len(), 6);
    }
}
