//! Error types for progmesh

use thiserror::Error;

/// Main error type for progmesh operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Cell {cell} has {corners} corners; only triangles are supported")]
    NonTriangleCell { cell: usize, corners: usize },

    #[error("Array size mismatch: {what} has length {actual}, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Face {face} references vertex {index} but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        face: usize,
        index: usize,
        vertex_count: usize,
    },
}

/// Result type alias for progmesh operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NonTriangleCell { cell: 3, corners: 4 };
        assert!(format!("{err}").contains("4 corners"));

        let err = Error::IndexOutOfRange { face: 1, index: 9, vertex_count: 3 };
        let text = format!("{err}");
        assert!(text.contains("vertex 9"));
        assert!(text.contains("3 vertices"));
    }
}
