use std::path::PathBuf;
use thiserror::Error;

/// Failure to read or validate a hair asset. No partial asset is ever produced.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("cannot open hair asset {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("hair asset truncated in {section}: expected {expected} records, found {read}")]
    Truncated {
        section: &'static str,
        expected: usize,
        read: usize,
    },

    #[error("invalid hair asset header: {guides} guides, {segments} segments, {triangles} triangles")]
    InvalidHeader {
        guides: i64,
        segments: i64,
        triangles: i64,
    },

    #[error("triangle {triangle} references guide {index}, asset has {guides} guides")]
    InvalidTriangleIndex {
        triangle: usize,
        index: i64,
        guides: u32,
    },

    #[error("strand {strand} has {found} vertices, expected {expected}")]
    StrandLength {
        strand: usize,
        found: usize,
        expected: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
