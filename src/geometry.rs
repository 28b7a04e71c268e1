//! Mesh file loading.
//!
//! Geometry is read into a [`RawGeometry`] on the CPU, scaled once at load,
//! and then either rasterized directly or uploaded as a [`Mesh`]. Every
//! triangle owns its three vertices and they all carry the face normal, which
//! gives flat shading with no extra work downstream.
//!
//! # Supported Formats
//!
//! | Format | Extensions      | Notes |
//! |--------|-----------------|-------|
//! | OBJ    | `.obj`          | Polygons triangulated, materials ignored |
//! | STL    | `.stl`          | Binary and ASCII |
//! | glTF   | `.gltf`, `.glb` | Triangle primitives, node transforms applied |
//!
//! ```no_run
//! use overlay3d::RawGeometry;
//!
//! let mut part = RawGeometry::load("assembly_stiffener_stp.obj")?;
//! part.scale(0.05);
//! println!("{} triangles", part.triangle_count());
//! # Ok::<(), overlay3d::GeometryError>(())
//! ```

use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Vertex3d};
use glam::{Mat4, Vec3};
use std::path::Path;

/// Errors that can occur when loading geometry.
#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown geometry format: '{0}'")]
    UnknownFormat(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Flat-shaded triangle soup on the CPU.
#[derive(Clone, Debug, Default)]
pub struct RawGeometry {
    pub vertices: Vec<Vertex3d>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
}

impl RawGeometry {
    /// Builds flat-shaded geometry from triangle corner positions, computing
    /// each face normal from the winding (counter-clockwise is front).
    pub fn from_triangles(triangles: impl IntoIterator<Item = [Vec3; 3]>) -> Self {
        let mut geometry = Self::default();
        for [a, b, c] in triangles {
            let normal = (b - a).cross(c - a).normalize_or_zero();
            geometry.push_triangle([a, b, c], normal);
        }
        geometry
    }

    fn push_triangle(&mut self, corners: [Vec3; 3], normal: Vec3) {
        let base = self.vertices.len() as u32;
        for p in corners {
            self.vertices.push(Vertex3d::new(p.into(), normal.into()));
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    /// True when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.len() < 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates over the triangles as vertex triples.
    pub fn triangles(&self) -> impl Iterator<Item = [Vertex3d; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertices[tri[0] as usize],
                self.vertices[tri[1] as usize],
                self.vertices[tri[2] as usize],
            ]
        })
    }

    /// Computes the axis-aligned bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    /// Scales all vertices uniformly around the origin.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            v.position[0] *= factor;
            v.position[1] *= factor;
            v.position[2] *= factor;
        }
    }

    /// Uploads this geometry to the GPU as a [`Mesh`].
    pub fn upload(&self, gpu: &GpuContext) -> Mesh {
        Mesh::new(gpu, &self.vertices, &self.indices)
    }

    /// Loads geometry from a file, detecting the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GeometryError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "obj" => {
                let file = std::fs::File::open(path)?;
                let mut reader = std::io::BufReader::new(file);
                Self::parse_obj(&mut reader)
            }
            "stl" => {
                let file = std::fs::File::open(path)?;
                let mut reader = std::io::BufReader::new(file);
                Self::parse_stl(&mut reader)
            }
            "gltf" | "glb" => {
                let (document, buffers, _) = gltf::import(path).map_err(gltf_error)?;
                Ok(Self::from_gltf(&document, &buffers))
            }
            _ => Err(GeometryError::UnknownFormat(ext)),
        }
    }

    /// Parses Wavefront OBJ text from memory.
    pub fn from_obj_bytes(bytes: &[u8]) -> Result<Self, GeometryError> {
        let mut reader = std::io::BufReader::new(bytes);
        Self::parse_obj(&mut reader)
    }

    /// Parses STL (binary or ASCII) from memory.
    pub fn from_stl_bytes(bytes: &[u8]) -> Result<Self, GeometryError> {
        let mut cursor = std::io::Cursor::new(bytes);
        Self::parse_stl(&mut cursor)
    }

    /// Parses a `.glb` or self-contained `.gltf` from memory.
    pub fn from_gltf_bytes(bytes: &[u8]) -> Result<Self, GeometryError> {
        let (document, buffers, _) = gltf::import_slice(bytes).map_err(gltf_error)?;
        Ok(Self::from_gltf(&document, &buffers))
    }

    fn parse_stl<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<Self, GeometryError> {
        let stl = stl_io::read_stl(reader)
            .map_err(|e| GeometryError::Parse(format!("STL parse error: {}", e)))?;

        let mut geometry = Self::default();
        for face in &stl.faces {
            let mut corners = [Vec3::ZERO; 3];
            for (corner, &vertex_idx) in corners.iter_mut().zip(&face.vertices) {
                let vertex = stl.vertices.get(vertex_idx).ok_or_else(|| {
                    GeometryError::Parse(format!("STL face references vertex {}", vertex_idx))
                })?;
                let position: [f32; 3] = (*vertex).into();
                *corner = Vec3::from(position);
            }

            // Facet normals in STL files are often zero or stale.
            let stored: [f32; 3] = face.normal.into();
            let computed = (corners[1] - corners[0])
                .cross(corners[2] - corners[0])
                .normalize_or_zero();
            let normal = if computed == Vec3::ZERO {
                Vec3::from(stored).normalize_or_zero()
            } else {
                computed
            };

            geometry.push_triangle(corners, normal);
        }

        Ok(geometry)
    }

    fn parse_obj<R: std::io::BufRead>(reader: &mut R) -> Result<Self, GeometryError> {
        // Only geometry is used; referenced material libraries are not opened.
        let (models, _) = tobj::load_obj_buf(reader, &tobj::GPU_LOAD_OPTIONS, |_| {
            Err(tobj::LoadError::GenericFailure)
        })
        .map_err(|e| GeometryError::Parse(format!("OBJ parse error: {}", e)))?;

        let mut geometry = Self::default();
        for model in &models {
            let mesh = &model.mesh;
            let corner = |index: u32| -> Result<Vec3, GeometryError> {
                let i = index as usize * 3;
                mesh.positions
                    .get(i..i + 3)
                    .map(Vec3::from_slice)
                    .ok_or_else(|| {
                        GeometryError::Parse(format!(
                            "OBJ face in '{}' references vertex {}",
                            model.name, index
                        ))
                    })
            };

            for tri in mesh.indices.chunks_exact(3) {
                let corners = [corner(tri[0])?, corner(tri[1])?, corner(tri[2])?];
                let normal = (corners[1] - corners[0])
                    .cross(corners[2] - corners[0])
                    .normalize_or_zero();
                geometry.push_triangle(corners, normal);
            }
        }

        Ok(geometry)
    }

    fn from_gltf(document: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Self {
        let mut geometry = Self::default();

        match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    geometry.append_gltf_node(&node, Mat4::IDENTITY, buffers);
                }
            }
            None => {
                for mesh in document.meshes() {
                    geometry.append_gltf_mesh(&mesh, Mat4::IDENTITY, buffers);
                }
            }
        }

        geometry
    }

    fn append_gltf_node(
        &mut self,
        node: &gltf::Node,
        parent: Mat4,
        buffers: &[gltf::buffer::Data],
    ) {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            self.append_gltf_mesh(&mesh, world, buffers);
        }
        for child in node.children() {
            self.append_gltf_node(&child, world, buffers);
        }
    }

    fn append_gltf_mesh(&mut self, mesh: &gltf::Mesh, world: Mat4, buffers: &[gltf::buffer::Data]) {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "skipping glTF primitive with mode {:?} in mesh {:?}",
                    primitive.mode(),
                    mesh.name()
                );
                continue;
            }

            let reader = primitive.reader(|buffer| {
                buffers.get(buffer.index()).map(|data| data.0.as_slice())
            });
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<Vec3> = positions
                .map(|p| world.transform_point3(Vec3::from(p)))
                .collect();

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            let triangles = indices.chunks_exact(3).filter_map(|tri| {
                Some([
                    *positions.get(tri[0] as usize)?,
                    *positions.get(tri[1] as usize)?,
                    *positions.get(tri[2] as usize)?,
                ])
            });
            for [a, b, c] in triangles {
                let normal = (b - a).cross(c - a).normalize_or_zero();
                self.push_triangle([a, b, c], normal);
            }
        }
    }
}

fn gltf_error(e: gltf::Error) -> GeometryError {
    match e {
        gltf::Error::Io(io) => GeometryError::Io(io),
        other => GeometryError::Parse(format!("glTF error: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_TETRA: &str = "solid tetra
facet normal 0 0 0
  outer loop
    vertex 0 0 0
    vertex 1 0 0
    vertex 0 1 0
  endloop
endfacet
facet normal 0 0 0
  outer loop
    vertex 0 0 0
    vertex 0 0 1
    vertex 1 0 0
  endloop
endfacet
endsolid tetra
";

    fn empty_binary_stl() -> Vec<u8> {
        let mut bytes = vec![0u8; 80];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes
    }

    #[test]
    fn ascii_stl_is_flat_shaded() {
        let geom = RawGeometry::from_stl_bytes(ASCII_TETRA.as_bytes()).unwrap();

        assert_eq!(geom.triangle_count(), 2);
        assert_eq!(geom.vertices.len(), 6);
        assert_eq!(geom.indices, vec![0, 1, 2, 3, 4, 5]);

        // Zero facet normals are replaced by the winding normal.
        let first = geom.triangles().next().unwrap();
        for v in first {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn obj_faces_are_triangulated_and_flat_shaded() {
        let obj = "o plate\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let geom = RawGeometry::from_obj_bytes(obj.as_bytes()).unwrap();

        assert_eq!(geom.triangle_count(), 2);
        assert_eq!(geom.vertices.len(), 6);
        assert!(geom.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn obj_file_loads_by_extension() {
        let path = std::env::temp_dir().join(format!("overlay3d-{}-part.obj", std::process::id()));
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let geom = RawGeometry::load(&path);
        let _ = std::fs::remove_file(&path);

        let geom = geom.unwrap();
        assert_eq!(geom.triangle_count(), 1);
        assert_eq!(geom.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn obj_without_faces_is_empty() {
        let geom = RawGeometry::from_obj_bytes(b"v 0 0 0\nv 1 0 0\n").unwrap();
        assert!(geom.is_empty());
    }

    /// One triangle (0,0,0) (1,0,0) (0,1,0) as an embedded buffer.
    const TRIANGLE_BUFFER: &str = r#"
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0, 0, 0],
            "max": [1, 1, 0]
        }]
    "#;

    fn gltf_document(body: &str) -> Vec<u8> {
        format!(
            r#"{{ "asset": {{ "version": "2.0" }}, {}, {} }}"#,
            TRIANGLE_BUFFER, body
        )
        .into_bytes()
    }

    #[test]
    fn gltf_applies_nested_node_transforms() {
        let gltf = gltf_document(
            r#"
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [
                { "translation": [0, 0, 1], "children": [1] },
                { "translation": [0, 0, 1], "mesh": 0 }
            ],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }]
            "#,
        );
        let geom = RawGeometry::from_gltf_bytes(&gltf).unwrap();

        assert_eq!(geom.triangle_count(), 1);
        let (min, max) = geom.bounds();
        assert!(min.abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
        assert!(max.abs_diff_eq(Vec3::new(1.0, 1.0, 2.0), 1e-6));
        assert_eq!(geom.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn gltf_skips_non_triangle_primitives() {
        let gltf = gltf_document(
            r#"
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{
                "primitives": [
                    { "attributes": { "POSITION": 0 }, "mode": 0 },
                    { "attributes": { "POSITION": 0 }, "mode": 1 },
                    { "attributes": { "POSITION": 0 }, "mode": 4 }
                ]
            }]
            "#,
        );
        let geom = RawGeometry::from_gltf_bytes(&gltf).unwrap();
        assert_eq!(geom.triangle_count(), 1);
    }

    #[test]
    fn gltf_without_meshes_is_empty() {
        let geom = RawGeometry::from_gltf_bytes(br#"{ "asset": { "version": "2.0" } }"#).unwrap();
        assert!(geom.is_empty());
    }

    #[test]
    fn empty_stl_parses_to_empty_geometry() {
        let geom = RawGeometry::from_stl_bytes(&empty_binary_stl()).unwrap();
        assert!(geom.is_empty());
        assert_eq!(geom.triangle_count(), 0);
    }

    #[test]
    fn scale_multiplies_positions() {
        let mut geom = RawGeometry::from_stl_bytes(ASCII_TETRA.as_bytes()).unwrap();
        geom.scale(0.05);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::ZERO);
        assert!(max.abs_diff_eq(Vec3::splat(0.05), 1e-7));
    }

    #[test]
    fn from_triangles_uses_ccw_normal() {
        let geom = RawGeometry::from_triangles([[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ]]);
        assert_eq!(geom.vertices[0].normal, [0.0, 0.0, -1.0]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = RawGeometry::load("model.xyz").unwrap_err();
        assert!(matches!(err, GeometryError::UnknownFormat(ext) if ext == "xyz"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RawGeometry::load("does/not/exist.stl").unwrap_err();
        assert!(matches!(err, GeometryError::Io(_)));
    }

    #[test]
    fn raw_geometry_bounds() {
        let geom = RawGeometry::from_triangles([[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-1.0, -1.0, -1.0),
        ]]);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
    }
}
