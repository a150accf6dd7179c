//! `.hgl` strand asset format
//!
//! Little-endian layout:
//!
//! ```text
//! i32 guides_count
//! i32 segments_count
//! i32 triangles_count
//! guides_count * (segments_count + 1) * { f32 x, f32 y, f32 z }
//! triangles_count * { i32 a, i32 b, i32 c }
//! ```
//!
//! Triangle indices address guides (strand roots), not vertices.

use crate::AssetError;
use hair_math::{Vec3, Vec4};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const HEADER_SIZE: usize = 12;
const VERTEX_RECORD_SIZE: usize = 12;
const TRIANGLE_RECORD_SIZE: usize = 12;

/// Mask stored in `w` of every rest position: roots are pinned.
pub const ROOT_MASK: f32 = 0.0;
pub const FREE_MASK: f32 = 1.0;

/// Parsed strand asset, before preprocessing and upload.
#[derive(Clone, Debug, PartialEq)]
pub struct HairAssetData {
    pub guides_count: u32,
    pub segments_count: u32,
    /// `guides_count * (segments_count + 1)` positions, `w` is the mass mask.
    pub positions: Vec<Vec4>,
    /// Guide indices per growth mesh triangle; the fourth slot is padding.
    pub triangles: Vec<[u32; 4]>,
}

impl HairAssetData {
    /// Builds an asset from explicit strands. Every strand must have the same
    /// number of vertices (at least two).
    pub fn from_strands(strands: &[Vec<Vec3>], triangles: &[[u32; 3]]) -> Result<Self, AssetError> {
        let vertices_per_strand = strands.first().map_or(0, Vec::len);
        if !strands.is_empty() && vertices_per_strand < 2 {
            return Err(AssetError::InvalidHeader {
                guides: strands.len() as i64,
                segments: vertices_per_strand as i64 - 1,
                triangles: triangles.len() as i64,
            });
        }

        let mut positions = Vec::with_capacity(strands.len() * vertices_per_strand);
        for (strand, vertices) in strands.iter().enumerate() {
            if vertices.len() != vertices_per_strand {
                return Err(AssetError::StrandLength {
                    strand,
                    found: vertices.len(),
                    expected: vertices_per_strand,
                });
            }
            positions.extend(vertices.iter().enumerate().map(|(i, v)| v.extend(mask_for(i))));
        }

        let data = Self {
            guides_count: strands.len() as u32,
            segments_count: vertices_per_strand.saturating_sub(1) as u32,
            positions,
            triangles: triangles.iter().map(|[a, b, c]| [*a, *b, *c, 0]).collect(),
        };
        data.validate_triangles()?;
        Ok(data)
    }

    pub fn vertices_per_strand(&self) -> usize {
        self.segments_count as usize + 1
    }

    pub fn vertex_count(&self) -> usize {
        self.guides_count as usize * self.vertices_per_strand()
    }

    pub fn triangles_count(&self) -> u32 {
        self.triangles.len() as u32
    }

    /// Vertices of one strand.
    pub fn strand(&self, guide: usize) -> &[Vec4] {
        let n = self.vertices_per_strand();
        &self.positions[guide * n..(guide + 1) * n]
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| AssetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let data = Self::parse(BufReader::new(file))?;
        log::info!(
            "Read {}: {} guides, {} segments, {} triangles",
            path.display(),
            data.guides_count,
            data.segments_count,
            data.triangles.len()
        );
        Ok(data)
    }

    pub fn parse(mut reader: impl Read) -> Result<Self, AssetError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE {
            return Err(AssetError::Truncated {
                section: "header",
                expected: 3,
                read: bytes.len() / 4,
            });
        }
        let guides = read_i32(&bytes, 0);
        let segments = read_i32(&bytes, 4);
        let triangles = read_i32(&bytes, 8);
        let invalid = || AssetError::InvalidHeader {
            guides: guides as i64,
            segments: segments as i64,
            triangles: triangles as i64,
        };
        if guides < 0 || segments < 0 || triangles < 0 || (guides > 0 && segments == 0) {
            return Err(invalid());
        }

        let vertices_per_strand = segments as usize + 1;
        let vertex_count = (guides as usize)
            .checked_mul(vertices_per_strand)
            .ok_or_else(invalid)?;
        let mut cursor = &bytes[HEADER_SIZE..];

        let available = cursor.len() / VERTEX_RECORD_SIZE;
        if available < vertex_count {
            return Err(AssetError::Truncated {
                section: "vertices",
                expected: vertex_count,
                read: available,
            });
        }
        let positions = cursor[..vertex_count * VERTEX_RECORD_SIZE]
            .chunks_exact(VERTEX_RECORD_SIZE)
            .enumerate()
            .map(|(i, r)| {
                Vec4::new(
                    read_f32(r, 0),
                    read_f32(r, 4),
                    read_f32(r, 8),
                    mask_for(i % vertices_per_strand),
                )
            })
            .collect();
        cursor = &cursor[vertex_count * VERTEX_RECORD_SIZE..];

        let triangle_count = triangles as usize;
        let available = cursor.len() / TRIANGLE_RECORD_SIZE;
        if available < triangle_count {
            return Err(AssetError::Truncated {
                section: "triangles",
                expected: triangle_count,
                read: available,
            });
        }
        let mut triangle_records = Vec::with_capacity(triangle_count);
        for (t, r) in cursor[..triangle_count * TRIANGLE_RECORD_SIZE]
            .chunks_exact(TRIANGLE_RECORD_SIZE)
            .enumerate()
        {
            let mut record = [0u32; 4];
            for (k, slot) in record.iter_mut().take(3).enumerate() {
                let index = read_i32(r, k * 4);
                if index < 0 || index >= guides {
                    return Err(AssetError::InvalidTriangleIndex {
                        triangle: t,
                        index: index as i64,
                        guides: guides as u32,
                    });
                }
                *slot = index as u32;
            }
            triangle_records.push(record);
        }

        let trailing = cursor.len() - triangle_count * TRIANGLE_RECORD_SIZE;
        if trailing > 0 {
            log::warn!("Ignoring {} trailing bytes after hair asset data", trailing);
        }

        Ok(Self {
            guides_count: guides as u32,
            segments_count: segments as u32,
            positions,
            triangles: triangle_records,
        })
    }

    /// Writes the asset in the layout [`parse`](Self::parse) reads. Masks and
    /// triangle padding are not stored.
    pub fn write_to(&self, mut writer: impl Write) -> Result<(), AssetError> {
        writer.write_all(&(self.guides_count as i32).to_le_bytes())?;
        writer.write_all(&(self.segments_count as i32).to_le_bytes())?;
        writer.write_all(&(self.triangles.len() as i32).to_le_bytes())?;
        for p in &self.positions {
            for c in [p.x, p.y, p.z] {
                writer.write_all(&c.to_le_bytes())?;
            }
        }
        for t in &self.triangles {
            for index in &t[..3] {
                writer.write_all(&(*index as i32).to_le_bytes())?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| AssetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_to(BufWriter::new(file))
    }

    fn validate_triangles(&self) -> Result<(), AssetError> {
        for (triangle, t) in self.triangles.iter().enumerate() {
            if let Some(index) = t[..3].iter().find(|i| **i >= self.guides_count) {
                return Err(AssetError::InvalidTriangleIndex {
                    triangle,
                    index: *index as i64,
                    guides: self.guides_count,
                });
            }
        }
        Ok(())
    }
}

fn mask_for(index_in_strand: usize) -> f32 {
    if index_in_strand == 0 {
        ROOT_MASK
    } else {
        FREE_MASK
    }
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_guides() -> HairAssetData {
        HairAssetData::from_strands(
            &[
                vec![Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 2.0, 0.0)],
                vec![Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::new(1.0, 2.0, 0.5)],
            ],
            &[[0, 1, 1]],
        )
        .unwrap()
    }

    fn encode(data: &HairAssetData) -> Vec<u8> {
        let mut bytes = Vec::new();
        data.write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_vertex_count_and_masks() {
        let data = HairAssetData::parse(encode(&two_guides()).as_slice()).unwrap();
        assert_eq!(data.positions.len(), 2 * 3);
        assert_eq!(data.vertex_count(), data.positions.len());
        for (i, p) in data.positions.iter().enumerate() {
            let expected = if i % 3 == 0 { 0.0 } else { 1.0 };
            assert_eq!(p.w, expected, "vertex {i}");
        }
    }

    #[test]
    fn test_written_layout() {
        let bytes = encode(&two_guides());
        assert_eq!(bytes.len(), HEADER_SIZE + 6 * VERTEX_RECORD_SIZE + TRIANGLE_RECORD_SIZE);
        assert_eq!(read_i32(&bytes, 0), 2);
        assert_eq!(read_i32(&bytes, 4), 2);
        assert_eq!(read_i32(&bytes, 8), 1);
        // second vertex y
        assert_eq!(read_f32(&bytes, HEADER_SIZE + VERTEX_RECORD_SIZE + 4), 1.0);
    }

    #[test]
    fn test_parse_preserves_content() {
        let data = two_guides();
        let parsed = HairAssetData::parse(encode(&data).as_slice()).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(parsed.triangles, vec![[0, 1, 1, 0]]);
    }

    #[test]
    fn test_truncated_vertices() {
        let bytes = encode(&two_guides());
        let cut = &bytes[..HEADER_SIZE + 4 * VERTEX_RECORD_SIZE + 5];
        match HairAssetData::parse(cut) {
            Err(AssetError::Truncated { section, expected, read }) => {
                assert_eq!(section, "vertices");
                assert_eq!(expected, 6);
                assert_eq!(read, 4);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_triangles() {
        let bytes = encode(&two_guides());
        let cut = &bytes[..bytes.len() - 1];
        assert!(matches!(
            HairAssetData::parse(cut),
            Err(AssetError::Truncated { section: "triangles", .. })
        ));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            HairAssetData::parse(&[1u8, 0, 0, 0, 2][..]),
            Err(AssetError::Truncated { section: "header", .. })
        ));
    }

    #[test]
    fn test_invalid_headers() {
        let header = |g: i32, s: i32, t: i32| {
            let mut b = Vec::new();
            for v in [g, s, t] {
                b.extend_from_slice(&v.to_le_bytes());
            }
            b
        };
        assert!(matches!(
            HairAssetData::parse(header(-1, 2, 0).as_slice()),
            Err(AssetError::InvalidHeader { .. })
        ));
        assert!(matches!(
            HairAssetData::parse(header(3, 0, 0).as_slice()),
            Err(AssetError::InvalidHeader { .. })
        ));
        // A huge declared size fails on truncation instead of allocating.
        assert!(matches!(
            HairAssetData::parse(header(i32::MAX, i32::MAX, 0).as_slice()),
            Err(AssetError::Truncated { .. }) | Err(AssetError::InvalidHeader { .. })
        ));
        let empty = HairAssetData::parse(header(0, 0, 0).as_slice()).unwrap();
        assert_eq!(empty.vertex_count(), 0);
    }

    #[test]
    fn test_triangle_index_out_of_range() {
        let mut data = two_guides();
        data.triangles[0][2] = 2;
        let err = HairAssetData::parse(encode(&data).as_slice()).unwrap_err();
        assert!(matches!(err, AssetError::InvalidTriangleIndex { triangle: 0, index: 2, guides: 2 }));
    }

    #[test]
    fn test_from_strands_rejects_ragged_input() {
        let err = HairAssetData::from_strands(
            &[vec![Vec3::ZERO, Vec3::X], vec![Vec3::ZERO, Vec3::X, Vec3::Y]],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, AssetError::StrandLength { strand: 1, found: 3, expected: 2 }));
    }

    #[test]
    fn test_missing_file() {
        let err = HairAssetData::load("/nonexistent/dir/asset.hgl").unwrap_err();
        assert!(matches!(err, AssetError::Open { .. }));
        assert!(err.to_string().contains("asset.hgl"));
    }
}
