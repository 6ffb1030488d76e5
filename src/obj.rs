use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;

use crate::mesh::{MeshData, Vertex};

/// Reads and parses a Wavefront OBJ file.
pub fn load_obj(path: impl AsRef<Path>) -> Result<MeshData> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read mesh {}", path.display()))?;
    load_obj_from_str(&contents).with_context(|| format!("failed to parse OBJ mesh {}", path.display()))
}

/// Parses OBJ text into an indexed triangle mesh.
///
/// Polygons are fan-triangulated, texture coordinates are ignored and
/// vertices lacking a normal get a smoothed face normal.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                // Relative indices count back from the vertices read so far.
                let polygon = parse_face(parts, positions.len(), normals.len())
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate(&polygon, &mut triangles);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let mut mesh = build_mesh(&positions, &normals, &triangles);
    if mesh.vertices.iter().any(|v| v.normal == [0.0; 3]) {
        fill_missing_normals(&mut mesh);
    }
    Ok(mesh)
}

/// A face corner with indices already resolved to zero-based slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FaceIndex {
    position: usize,
    normal: Option<usize>,
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_face<'a>(
    parts: impl Iterator<Item = &'a str>,
    position_count: usize,
    normal_count: usize,
) -> Result<Vec<FaceIndex>> {
    let mut polygon = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let raw = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let position = resolve_index(raw, position_count)
            .ok_or_else(|| anyhow!("vertex index {raw} out of range"))?;
        let _texcoord = segments.next();
        let normal = match segments.next() {
            Some(s) if !s.is_empty() => resolve_index(s.parse::<i32>()?, normal_count),
            _ => None,
        };
        polygon.push(FaceIndex { position, normal });
    }
    if polygon.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(polygon)
}

fn triangulate(polygon: &[FaceIndex], triangles: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

fn build_mesh(positions: &[Vec3], normals: &[Vec3], triangles: &[[FaceIndex; 3]]) -> MeshData {
    let mut lookup: HashMap<FaceIndex, u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for triangle in triangles {
        for &corner in triangle {
            let next_index = mesh.vertices.len() as u32;
            let index = *lookup.entry(corner).or_insert_with(|| {
                let normal = corner.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                mesh.vertices.push(Vertex::new(
                    positions[corner.position].to_array(),
                    normal.to_array(),
                ));
                next_index
            });
            mesh.indices.push(index);
        }
    }

    mesh
}

/// Converts a one-based (or negative, relative) OBJ index into a slice index.
fn resolve_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}

fn fill_missing_normals(mesh: &mut MeshData) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = Vec3::from(mesh.vertices[i0].position);
        let p1 = Vec3::from(mesh.vertices[i1].position);
        let p2 = Vec3::from(mesh.vertices[i2].position);
        let face = (p1 - p0).cross(p2 - p0);
        if face.length_squared() > f32::EPSILON {
            let face = face.normalize();
            accum[i0] += face;
            accum[i1] += face;
            accum[i2] += face;
        }
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        if vertex.normal == [0.0; 3] {
            vertex.normal = normal.normalize_or_zero().to_array();
        }
    }
}
