use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use gltf::image::Format;
use gltf::mesh::Mode;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use super::normalize::Bounds;

pub const GLB_MIME: &str = "model/gltf-binary";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("asset is not a readable glTF scene: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("asset contains no triangle geometry")]
    NoGeometry,
}

/// Decodes base64 text (optionally wrapped in a `data:` URL, whitespace
/// tolerated) back into the raw file bytes.
pub fn decode_payload(text: &str) -> Result<Arc<[u8]>, AssetError> {
    let body = match text.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => text,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(cleaned)?;
    Ok(Arc::from(bytes))
}

/// A whole scene flattened into one indexed triangle list, in world space.
#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    /// Linear RGB.
    pub colors: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl SceneMesh {
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.positions.iter().copied())
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// `[x y z nx ny nz r g b]` per vertex, ready for a vertex buffer.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len() * 9);
        for ((p, n), c) in self.positions.iter().zip(&self.normals).zip(&self.colors) {
            out.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z, c[0], c[1], c[2]]);
        }
        out
    }
}

/// Parses a binary glTF file into a [`SceneMesh`].
pub fn load_glb(bytes: &[u8]) -> Result<SceneMesh, AssetError> {
    let (document, buffers, images) = gltf::import_slice(bytes)?;
    let sources = Sources {
        buffers: &buffers,
        images: &images,
    };

    let mut mesh = SceneMesh::default();
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                visit(&node, &Matrix4::identity(), &sources, &mut mesh);
            }
        }
        None => {
            for gltf_mesh in document.meshes() {
                for primitive in gltf_mesh.primitives() {
                    append_primitive(&primitive, &Matrix4::identity(), &sources, &mut mesh);
                }
            }
        }
    }

    if mesh.indices.is_empty() {
        return Err(AssetError::NoGeometry);
    }
    log::debug!(
        "glb parsed: {} vertices, {} triangles, {} images",
        mesh.positions.len(),
        mesh.triangle_count(),
        images.len()
    );
    Ok(mesh)
}

struct Sources<'a> {
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
}

fn visit(node: &gltf::Node<'_>, parent: &Matrix4<f32>, sources: &Sources<'_>, out: &mut SceneMesh) {
    let world = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            append_primitive(&primitive, &world, sources, out);
        }
    }
    for child in node.children() {
        visit(&child, &world, sources, out);
    }
}

fn append_primitive(
    primitive: &gltf::Primitive<'_>,
    world: &Matrix4<f32>,
    sources: &Sources<'_>,
    out: &mut SceneMesh,
) {
    if primitive.mode() != Mode::Triangles {
        log::warn!("skipping primitive with mode {:?}", primitive.mode());
        return;
    }
    let reader = primitive.reader(|buffer| sources.buffers.get(buffer.index()).map(|data| data.0.as_slice()));
    let Some(positions) = reader.read_positions() else {
        return;
    };
    let positions: Vec<Point3<f32>> = positions
        .map(|p| world.transform_point(&Point3::from(p)))
        .collect();
    let count = positions.len();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..count as u32).collect(),
    };
    let indices: Vec<u32> = indices
        .chunks_exact(3)
        .filter(|tri| tri.iter().all(|&i| (i as usize) < count))
        .flatten()
        .copied()
        .collect();

    let normal_matrix = world
        .fixed_view::<3, 3>(0, 0)
        .into_owned()
        .try_inverse()
        .map(|m| m.transpose())
        .unwrap_or_else(Matrix3::identity);
    let normals: Vec<Vector3<f32>> = match reader.read_normals() {
        Some(normals) => normals
            .map(|n| (normal_matrix * Vector3::from(n)).try_normalize(1e-12).unwrap_or_else(Vector3::y))
            .collect(),
        None => Vec::new(),
    };
    let normals = if normals.len() == count {
        normals
    } else {
        smooth_normals(&positions, &indices)
    };

    let pbr = primitive.material().pbr_metallic_roughness();
    let factor = pbr.base_color_factor();
    let vertex_colors: Vec<[f32; 4]> = reader
        .read_colors(0)
        .map(|colors| colors.into_rgba_f32().collect())
        .unwrap_or_default();
    let texture = pbr.base_color_texture().and_then(|info| {
        let image = sources.images.get(info.texture().source().index())?;
        let uvs: Vec<[f32; 2]> = reader.read_tex_coords(info.tex_coord())?.into_f32().collect();
        Some((image, uvs))
    });

    let base = out.positions.len() as u32;
    for i in 0..count {
        let mut color = [factor[0], factor[1], factor[2]];
        if let Some(vc) = vertex_colors.get(i) {
            for (c, v) in color.iter_mut().zip(vc) {
                *c *= v;
            }
        }
        if let Some((image, uvs)) = &texture {
            if let Some(texel) = uvs.get(i).and_then(|uv| sample_nearest(image, *uv)) {
                for (c, t) in color.iter_mut().zip(texel) {
                    *c *= t;
                }
            }
        }
        out.colors.push(color);
    }
    out.positions.extend(positions);
    out.normals.extend(normals);
    out.indices.extend(indices.iter().map(|i| base + i));
}

/// Area-weighted vertex normals for meshes that ship without any.
fn smooth_normals(positions: &[Point3<f32>], indices: &[u32]) -> Vec<Vector3<f32>> {
    let mut normals = vec![Vector3::zeros(); positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let face = (positions[b] - positions[a]).cross(&(positions[c] - positions[a]));
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::y))
        .collect()
}

/// Linear RGB of the texel under `uv` (repeat wrapping, nearest filtering).
fn sample_nearest(image: &gltf::image::Data, uv: [f32; 2]) -> Option<[f32; 3]> {
    let channels = match image.format {
        Format::R8G8B8 => 3,
        Format::R8G8B8A8 => 4,
        _ => return None,
    };
    let (w, h) = (image.width as usize, image.height as usize);
    if w == 0 || h == 0 {
        return None;
    }
    let u = uv[0] - uv[0].floor();
    let v = uv[1] - uv[1].floor();
    let x = ((u * w as f32) as usize).min(w - 1);
    let y = ((v * h as f32) as usize).min(h - 1);
    let i = (y * w + x) * channels;
    let px = image.pixels.get(i..i + 3)?;
    Some([srgb_to_linear(px[0]), srgb_to_linear(px[1]), srgb_to_linear(px[2])])
}

fn srgb_to_linear(c: u8) -> f32 {
    (c as f32 / 255.0).powf(2.2)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Wraps a glTF JSON document and its binary buffer in a GLB container.
    pub fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    /// A box of the given size with its min corner at the origin, placed in the
    /// scene by a node `translation`. `mode` 4 is triangles, 0 is points.
    pub fn box_glb(size: [f32; 3], translation: [f32; 3], mode: u32) -> Vec<u8> {
        let [sx, sy, sz] = size;
        let corners: [[f32; 3]; 8] = [
            [0.0, 0.0, 0.0],
            [sx, 0.0, 0.0],
            [sx, sy, 0.0],
            [0.0, sy, 0.0],
            [0.0, 0.0, sz],
            [sx, 0.0, sz],
            [sx, sy, sz],
            [0.0, sy, sz],
        ];
        let indices: [u32; 36] = [
            0, 2, 1, 0, 3, 2, // back
            4, 5, 6, 4, 6, 7, // front
            0, 1, 5, 0, 5, 4, // bottom
            3, 7, 6, 3, 6, 2, // top
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ];

        let mut bin = Vec::new();
        for c in &corners {
            for v in c {
                bin.extend_from_slice(&v.to_le_bytes());
            }
        }
        let positions_len = bin.len();
        for i in &indices {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        let indices_len = bin.len() - positions_len;

        let json = format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [ {{ "nodes": [0] }} ],
  "nodes": [ {{ "mesh": 0, "translation": [{tx}, {ty}, {tz}] }} ],
  "meshes": [ {{ "primitives": [ {{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "mode": {mode} }} ] }} ],
  "buffers": [ {{ "byteLength": {total} }} ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": {positions_len} }},
    {{ "buffer": 0, "byteOffset": {positions_len}, "byteLength": {indices_len} }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [{sx}, {sy}, {sz}] }},
    {{ "bufferView": 1, "componentType": 5125, "count": 36, "type": "SCALAR" }}
  ]
}}"#,
            tx = translation[0],
            ty = translation[1],
            tz = translation[2],
            total = bin.len(),
        );
        glb(&json, &bin)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::box_glb;
    use super::*;
    use crate::viewer::normalize::normalization;
    use approx::assert_relative_eq;

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        assert_eq!(&*decode_payload("Z2xURg==").unwrap(), b"glTF");
        assert_eq!(&*decode_payload("Z2xU\nRg==").unwrap(), b"glTF");
        assert_eq!(
            &*decode_payload("data:model/gltf-binary;base64,Z2xURg==").unwrap(),
            b"glTF"
        );
    }

    #[test]
    fn malformed_base64_is_rejected() {
        assert!(matches!(decode_payload("not base64!!"), Err(AssetError::Encoding(_))));
    }

    #[test]
    fn loads_box_in_world_space() {
        let bytes = box_glb([2.0, 4.0, 6.0], [10.0, 0.0, 0.0], 4);
        let mesh = load_glb(&bytes).unwrap();

        assert_eq!(mesh.positions.len(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.min, Point3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(bounds.max, Point3::new(12.0, 4.0, 6.0));
    }

    #[test]
    fn missing_normals_are_generated_and_unit_length() {
        let mesh = load_glb(&box_glb([1.0, 1.0, 1.0], [0.0; 3], 4)).unwrap();
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        for n in &mesh.normals {
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-5);
        }
        // default material is opaque white
        assert!(mesh.colors.iter().all(|c| *c == [1.0, 1.0, 1.0]));
        assert_eq!(mesh.interleaved().len(), 8 * 9);
    }

    #[test]
    fn loaded_mesh_normalizes_to_target_size() {
        let mesh = load_glb(&box_glb([2.0, 4.0, 6.0], [10.0, -3.0, 1.0], 4)).unwrap();
        let m = normalization(&mesh.bounds().unwrap(), 3.0);
        let framed = Bounds::from_points(mesh.positions.iter().map(|p| m.transform_point(p))).unwrap();
        assert_relative_eq!(framed.max_dimension(), 3.0, epsilon = 1e-4);
        assert_relative_eq!(framed.center().coords.norm(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn point_clouds_have_no_geometry() {
        let bytes = box_glb([1.0, 1.0, 1.0], [0.0; 3], 0);
        assert!(matches!(load_glb(&bytes), Err(AssetError::NoGeometry)));
    }

    #[test]
    fn garbage_is_a_gltf_error() {
        assert!(matches!(load_glb(b"definitely not a model"), Err(AssetError::Gltf(_))));
    }
}
