//! Wavefront OBJ reading and writing (`v` and `f` records only)

use super::Mesh;
use crate::error::{ExploreError, Result};
use crate::types::Vec3;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Load a shape model from an OBJ file.
///
/// Polygons are fan-triangulated; texture/normal indices (`a/b/c`) and all
/// other record types are ignored.
pub fn load_obj(path: impl AsRef<Path>) -> Result<Mesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExploreError::FileNotFound(path.to_path_buf()),
        _ => ExploreError::Io(e),
    })?;
    let mesh = parse_obj(BufReader::new(file))?;
    log::info!(
        "Loaded {} ({} vertices, {} faces)",
        path.display(),
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(mesh)
}

/// Parse OBJ text from any buffered reader
pub fn parse_obj<R: BufRead>(reader: R) -> Result<Mesh> {
    let mut vertices: Vec<Vec3> = Vec::new();
    let mut faces: Vec<[usize; 3]> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let mut fields = line.split_whitespace();

        match fields.next() {
            Some("v") => {
                let coords = fields
                    .take(3)
                    .map(|f| f.parse::<f64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| parse_error(line_no, format!("bad vertex coordinate: {e}")))?;
                if coords.len() != 3 {
                    return Err(parse_error(line_no, "vertex needs 3 coordinates".into()));
                }
                vertices.push(Vec3::new(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                let corners = fields
                    .map(|f| resolve_index(f, vertices.len(), line_no))
                    .collect::<Result<Vec<_>>>()?;
                if corners.len() < 3 {
                    return Err(parse_error(line_no, "face needs at least 3 vertices".into()));
                }
                for i in 1..corners.len() - 1 {
                    faces.push([corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    Mesh::new(vertices, faces)
}

/// Write a mesh as OBJ (1-based indices)
pub fn write_obj(mesh: &Mesh, path: impl AsRef<Path>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path.as_ref())?);
    for v in mesh.vertices() {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for f in mesh.faces() {
        writeln!(out, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    out.flush()?;
    Ok(())
}

/// Turn an OBJ face corner (`7`, `7/1`, `7//3`, `-1`) into a 0-based vertex index
fn resolve_index(field: &str, vertex_count: usize, line_no: usize) -> Result<usize> {
    let raw = field.split('/').next().unwrap_or(field);
    let value: i64 = raw
        .parse()
        .map_err(|_| parse_error(line_no, format!("bad face index '{field}'")))?;

    let resolved = if value > 0 {
        value - 1
    } else if value < 0 {
        vertex_count as i64 + value
    } else {
        -1
    };

    if resolved < 0 || resolved as usize >= vertex_count {
        return Err(parse_error(
            line_no,
            format!("face index {value} out of range ({vertex_count} vertices so far)"),
        ));
    }
    Ok(resolved as usize)
}

fn parse_error(line: usize, message: String) -> ExploreError {
    ExploreError::Parse { line, message }
}
