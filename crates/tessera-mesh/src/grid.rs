//! Multi-resolution icosahedral tessellation of the unit sphere.
//!
//! Level 0 is the icosahedron (12 vertices, 20 triangles). Each further level
//! splits every triangle of the previous level into four, adding the edge
//! midpoints projected back onto the sphere. Vertices are shared across
//! levels: the vertices of level `k` are a prefix of those of level `k + 1`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::codec;
use crate::error::MeshError;

/// Magic prefix of a standalone grid file.
const MAGIC: &[u8; 8] = b"TESSGRID";

/// Grid file format version.
const VERSION: u32 = 1;

/// Deepest subdivision accepted by [`TessellatedGrid::icosahedral`].
pub const MAX_SUBDIVISIONS: u32 = 9;

/// A unit vector on the sphere.
pub type UnitVector = [f64; 3];

/// A triangle as three vertex indices.
pub type Triangle = [u32; 3];

/// Triangulated sphere with one triangle list per resolution level.
#[derive(Debug, Clone, PartialEq)]
pub struct TessellatedGrid {
    vertices: Vec<UnitVector>,
    levels: Vec<Vec<Triangle>>,
}

impl TessellatedGrid {
    /// Build an icosahedral grid refined `subdivisions` times.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidTessellation`] above [`MAX_SUBDIVISIONS`].
    pub fn icosahedral(subdivisions: u32) -> Result<Self, MeshError> {
        if subdivisions > MAX_SUBDIVISIONS {
            return Err(MeshError::InvalidTessellation(format!(
                "{subdivisions} subdivisions exceeds the maximum of {MAX_SUBDIVISIONS}"
            )));
        }

        let phi = (1.0 + 5.0_f64.sqrt()) * 0.5;
        let mut vertices: Vec<UnitVector> = [
            [-1.0, phi, 0.0],
            [1.0, phi, 0.0],
            [-1.0, -phi, 0.0],
            [1.0, -phi, 0.0],
            [0.0, -1.0, phi],
            [0.0, 1.0, phi],
            [0.0, -1.0, -phi],
            [0.0, 1.0, -phi],
            [phi, 0.0, -1.0],
            [phi, 0.0, 1.0],
            [-phi, 0.0, -1.0],
            [-phi, 0.0, 1.0],
        ]
        .into_iter()
        .map(normalize)
        .collect();

        let base: Vec<Triangle> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        let mut levels = vec![base];
        for _ in 0..subdivisions {
            let previous = levels.last().map_or(&[][..], Vec::as_slice);
            let next = subdivide(&mut vertices, previous)?;
            levels.push(next);
        }

        Ok(Self { vertices, levels })
    }

    /// Build a grid from explicit vertices and per-level triangles.
    ///
    /// Vertices are normalised onto the unit sphere.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidTessellation`] for an empty grid, a
    /// zero-length vertex, or a triangle referencing a missing vertex.
    pub fn from_parts(vertices: Vec<UnitVector>, levels: Vec<Vec<Triangle>>) -> Result<Self, MeshError> {
        if vertices.is_empty() {
            return Err(MeshError::InvalidTessellation(String::from("no vertices")));
        }
        if vertices.iter().any(|v| norm(*v) <= f64::EPSILON || v.iter().any(|c| !c.is_finite())) {
            return Err(MeshError::InvalidTessellation(String::from(
                "vertex is not a finite non-zero vector",
            )));
        }
        let count = vertices.len();
        let out_of_range = levels
            .iter()
            .flatten()
            .flatten()
            .any(|&idx| usize::try_from(idx).map_or(true, |i| i >= count));
        if out_of_range {
            return Err(MeshError::InvalidTessellation(String::from(
                "triangle references a missing vertex",
            )));
        }
        Ok(Self {
            vertices: vertices.into_iter().map(normalize).collect(),
            levels,
        })
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of resolution levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Triangles of one resolution level.
    pub fn triangles(&self, level: usize) -> Option<&[Triangle]> {
        self.levels.get(level).map(Vec::as_slice)
    }

    /// Unit vector of a vertex.
    pub fn vertex(&self, index: usize) -> Option<UnitVector> {
        self.vertices.get(index).copied()
    }

    /// All vertices.
    pub fn vertices(&self) -> &[UnitVector] {
        &self.vertices
    }

    /// Latitude and longitude of a vertex, in degrees.
    pub fn lat_lon(&self, index: usize) -> Option<(f64, f64)> {
        self.vertex(index).map(vector_to_lat_lon)
    }

    /// Stable identifier derived from the vertex coordinates and topology.
    pub fn grid_id(&self) -> String {
        let mut hasher = Sha256::new();
        for v in &self.vertices {
            for c in v {
                hasher.update(c.to_le_bytes());
            }
        }
        for level in &self.levels {
            hasher.update((level.len() as u64).to_le_bytes());
            for tri in level {
                for idx in tri {
                    hasher.update(idx.to_le_bytes());
                }
            }
        }
        let digest = hasher.finalize();
        digest
            .iter()
            .take(16)
            .fold(String::with_capacity(32), |mut acc, b| {
                acc.push_str(&format!("{b:02X}"));
                acc
            })
    }

    // -----------------------------------------------------------------------
    // Binary I/O
    // -----------------------------------------------------------------------

    /// Write the grid body (no magic) to a binary stream.
    pub fn write_binary(&self, out: &mut dyn Write) -> Result<(), MeshError> {
        codec::write_count(out, self.vertices.len())?;
        for v in &self.vertices {
            for c in v {
                codec::write_f64(out, *c)?;
            }
        }
        codec::write_count(out, self.levels.len())?;
        for level in &self.levels {
            codec::write_count(out, level.len())?;
            for tri in level {
                for idx in tri {
                    codec::write_u32(out, *idx)?;
                }
            }
        }
        Ok(())
    }

    /// Read a grid body written by [`write_binary`](Self::write_binary).
    pub fn read_binary(input: &mut dyn Read) -> Result<Self, MeshError> {
        let n_vertices = codec::read_count(input)?;
        let mut vertices = Vec::with_capacity(n_vertices.min(1 << 20));
        for _ in 0..n_vertices {
            vertices.push([codec::read_f64(input)?, codec::read_f64(input)?, codec::read_f64(input)?]);
        }
        let n_levels = codec::read_count(input)?;
        let mut levels = Vec::with_capacity(n_levels.min(64));
        for _ in 0..n_levels {
            let n_tris = codec::read_count(input)?;
            let mut tris = Vec::with_capacity(n_tris.min(1 << 20));
            for _ in 0..n_tris {
                tris.push([codec::read_u32(input)?, codec::read_u32(input)?, codec::read_u32(input)?]);
            }
            levels.push(tris);
        }
        Self::from_parts_exact(vertices, levels)
    }

    /// Save as a standalone grid file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MeshError> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(MAGIC)?;
        codec::write_u32(&mut out, VERSION)?;
        self.write_binary(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Load a standalone grid file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MeshError> {
        let mut input = BufReader::new(File::open(path)?);
        codec::expect_magic(&mut input, MAGIC, "grid")?;
        let version = codec::read_u32(&mut input)?;
        if version != VERSION {
            return Err(MeshError::UnsupportedVersion {
                what: "grid",
                found: version,
                supported: VERSION,
            });
        }
        Self::read_binary(&mut input)
    }

    // -----------------------------------------------------------------------
    // Text I/O
    // -----------------------------------------------------------------------

    /// Write the grid body as text.
    pub fn write_text(&self, out: &mut dyn Write) -> Result<(), MeshError> {
        writeln!(out, "vertices {}", self.vertices.len())?;
        for [x, y, z] in &self.vertices {
            writeln!(out, "{x} {y} {z}")?;
        }
        writeln!(out, "levels {}", self.levels.len())?;
        for level in &self.levels {
            writeln!(out, "triangles {}", level.len())?;
            for [a, b, c] in level {
                writeln!(out, "{a} {b} {c}")?;
            }
        }
        Ok(())
    }

    /// Read a grid body written by [`write_text`](Self::write_text).
    pub fn read_text(reader: &mut codec::TextReader<'_>) -> Result<Self, MeshError> {
        let header = reader.keyword("vertices")?;
        let n_vertices: usize = reader.parse(header, "vertex count")?;
        let mut vertices = Vec::with_capacity(n_vertices.min(1 << 20));
        for _ in 0..n_vertices {
            let line = reader.next_line()?;
            vertices.push(reader.parse_fields::<f64, 3>(line, "coordinate")?);
        }
        let header = reader.keyword("levels")?;
        let n_levels: usize = reader.parse(header, "level count")?;
        let mut levels = Vec::with_capacity(n_levels.min(64));
        for _ in 0..n_levels {
            let header = reader.keyword("triangles")?;
            let n_tris: usize = reader.parse(header, "triangle count")?;
            let mut tris = Vec::with_capacity(n_tris.min(1 << 20));
            for _ in 0..n_tris {
                let line = reader.next_line()?;
                tris.push(reader.parse_fields::<u32, 3>(line, "vertex index")?);
            }
            levels.push(tris);
        }
        Self::from_parts_exact(vertices, levels)
    }

    /// Like [`from_parts`](Self::from_parts) but keeps vertex bits as given,
    /// so a read grid hashes to the same id as the written one.
    fn from_parts_exact(vertices: Vec<UnitVector>, levels: Vec<Vec<Triangle>>) -> Result<Self, MeshError> {
        let checked = Self::from_parts(vertices.clone(), levels)?;
        Ok(Self {
            vertices,
            levels: checked.levels,
        })
    }
}

/// Latitude and longitude, in degrees, of a unit vector.
pub fn vector_to_lat_lon(v: UnitVector) -> (f64, f64) {
    let [x, y, z] = v;
    (z.clamp(-1.0, 1.0).asin().to_degrees(), y.atan2(x).to_degrees())
}

/// Unit vector of a latitude and longitude in degrees.
pub fn lat_lon_to_vector(latitude: f64, longitude: f64) -> UnitVector {
    let (phi, lambda) = (latitude.to_radians(), longitude.to_radians());
    [phi.cos() * lambda.cos(), phi.cos() * lambda.sin(), phi.sin()]
}

fn norm([x, y, z]: UnitVector) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

fn normalize(v: UnitVector) -> UnitVector {
    let n = norm(v);
    let [x, y, z] = v;
    [x / n, y / n, z / n]
}

/// Split every triangle into four, appending new midpoint vertices.
fn subdivide(vertices: &mut Vec<UnitVector>, triangles: &[Triangle]) -> Result<Vec<Triangle>, MeshError> {
    let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
    let mut midpoint = |a: u32, b: u32| -> Result<u32, MeshError> {
        let key = (a.min(b), a.max(b));
        if let Some(&idx) = midpoints.get(&key) {
            return Ok(idx);
        }
        let fetch = |i: u32| {
            usize::try_from(i)
                .ok()
                .and_then(|i| vertices.get(i).copied())
                .ok_or_else(|| MeshError::InvalidTessellation(format!("missing vertex {i}")))
        };
        let (va, vb) = (fetch(a)?, fetch(b)?);
        let mid = normalize([va[0] + vb[0], va[1] + vb[1], va[2] + vb[2]]);
        let idx = u32::try_from(vertices.len())
            .map_err(|err| MeshError::InvalidTessellation(format!("too many vertices: {err}")))?;
        vertices.push(mid);
        midpoints.insert(key, idx);
        Ok(idx)
    };

    let mut out = Vec::with_capacity(triangles.len().saturating_mul(4));
    for &[a, b, c] in triangles {
        let ab = midpoint(a, b)?;
        let bc = midpoint(b, c)?;
        let ca = midpoint(c, a)?;
        out.push([a, ab, ca]);
        out.push([b, bc, ab]);
        out.push([c, ca, bc]);
        out.push([ab, bc, ca]);
    }
    Ok(out)
}
