//! Decoded point cloud frames.

use bytemuck::{Pod, Zeroable};

/// Divisor mapping 8-bit color values into [0, 1].
pub const COLOR_SCALE: f32 = 255.0;

/// One point: position and normalized color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PointRecord {
    pub position: [f32; 3],
    /// RGB in [0, 1] for inputs in [0, 255]; out-of-range inputs are not clamped.
    pub color: [f32; 3],
}

impl PointRecord {
    pub fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    /// Build a record from raw color values in the [0, 255] range.
    pub fn from_raw(position: [f32; 3], rgb: [f32; 3]) -> Self {
        Self {
            position,
            color: rgb.map(|c| c / COLOR_SCALE),
        }
    }
}

/// A fully decoded frame.
///
/// The three arrays always have the same length, and `indices` is the
/// identity permutation: every point is drawn as its own primitive.
/// Frames hold at most `u32::MAX` points; frame headers declaring more are
/// rejected before decoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    vertices: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    indices: Vec<u32>,
}

impl Frame {
    /// Assemble a frame from records in draw order.
    pub fn from_records(records: &[PointRecord]) -> Self {
        let mut vertices = Vec::with_capacity(records.len());
        let mut colors = Vec::with_capacity(records.len());
        for record in records {
            vertices.push(record.position);
            colors.push(record.color);
        }

        Self {
            indices: identity_indices(records.len()),
            vertices,
            colors,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Point positions in draw order.
    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    /// Point colors in draw order.
    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    /// Identity index array `0..len`.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Point `i` as a record.
    pub fn record(&self, i: usize) -> Option<PointRecord> {
        Some(PointRecord::new(*self.vertices.get(i)?, *self.colors.get(i)?))
    }

    /// Iterate over points in draw order.
    pub fn records(&self) -> impl ExactSizeIterator<Item = PointRecord> + '_ {
        self.vertices
            .iter()
            .zip(self.colors.iter())
            .map(|(&position, &color)| PointRecord { position, color })
    }

    /// Positions as bytes, ready for a vertex buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Colors as bytes, ready for a vertex buffer upload.
    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    /// Indices as bytes, ready for an index buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

fn identity_indices(count: usize) -> Vec<u32> {
    (0..count as u32).collect()
}
