//! Loose rectilinear bounding boxes over array data.
//!
//! The optimizer reasons about "data width" (estimated bytes flowing out of
//! a plan node) to choose the cheapest point for a redistribution. A
//! [`PhysicalBoundaries`] is a coordinate box plus a density estimate, with
//! the algebra needed to push estimates through operators: union,
//! intersection, cross product, and reshaping between dimension sets.

use latticedb_core::{
    ArrayDesc, AttributeDesc, Coordinate, Coordinates, DimensionDesc, INFINITE_LENGTH,
    MAX_COORDINATE, MIN_COORDINATE,
};
use serde::{Deserialize, Serialize};

/// Estimated in-memory size of one string cell, used when a type has no
/// fixed size.
const STRING_SIZE_ESTIMATE_BYTES: u32 = 16;

/// A bounding box with a density estimate in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalBoundaries {
    start: Coordinates,
    end: Coordinates,
    density: f64,
}

impl Default for PhysicalBoundaries {
    fn default() -> Self {
        Self { start: Vec::new(), end: Vec::new(), density: 1.0 }
    }
}

impl PhysicalBoundaries {
    /// Creates a bounding box, clamping coordinates to the representable
    /// range.
    #[must_use]
    pub fn new(start: Coordinates, end: Coordinates, density: f64) -> Self {
        debug_assert_eq!(start.len(), end.len());
        debug_assert!((0.0..=1.0).contains(&density));
        let clamp = |cs: Coordinates| {
            cs.into_iter().map(|c| c.clamp(MIN_COORDINATE, MAX_COORDINATE)).collect()
        };
        Self { start: clamp(start), end: clamp(end), density }
    }

    /// Boundaries assuming the schema is fully dense.
    #[must_use]
    pub fn from_full_schema(schema: &ArrayDesc) -> Self {
        let start = schema.dimensions().iter().map(|d| d.start_min).collect();
        let end = schema.dimensions().iter().map(|d| d.end_max).collect();
        Self::new(start, end, 1.0)
    }

    /// Boundaries spanning `num_dimensions` dimensions but containing no
    /// cells.
    #[must_use]
    pub fn empty(num_dimensions: usize) -> Self {
        Self {
            start: vec![MAX_COORDINATE; num_dimensions],
            end: vec![MIN_COORDINATE; num_dimensions],
            density: 1.0,
        }
    }

    /// The upper-left coordinates.
    #[must_use]
    pub fn start_coords(&self) -> &[Coordinate] {
        &self.start
    }

    /// The lower-right coordinates.
    #[must_use]
    pub fn end_coords(&self) -> &[Coordinate] {
        &self.end
    }

    /// The fraction of the box occupied by data.
    #[must_use]
    pub const fn density(&self) -> f64 {
        self.density
    }

    /// True when the box encloses no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() || self.start.iter().zip(&self.end).any(|(s, e)| s > e)
    }

    /// Number of cells between `start` and `end` inclusive, saturating to
    /// [`INFINITE_LENGTH`] on unbounded coordinates or overflow.
    #[must_use]
    pub fn cell_count_between(start: &[Coordinate], end: &[Coordinate]) -> u64 {
        if Self::new(start.to_vec(), end.to_vec(), 1.0).is_empty() {
            return 0;
        }
        let mut result: u64 = 1;
        for (s, e) in start.iter().zip(end) {
            if *s <= MIN_COORDINATE || *e >= MAX_COORDINATE {
                return INFINITE_LENGTH;
            }
            if e >= s {
                let span = (e - s + 1) as u64;
                match result.checked_mul(span) {
                    Some(r) => result = r,
                    None => return INFINITE_LENGTH,
                }
            } else {
                result = 0;
            }
        }
        result
    }

    /// Number of cells enclosed by this box.
    #[must_use]
    pub fn num_cells(&self) -> u64 {
        Self::cell_count_between(&self.start, &self.end)
    }

    /// Maximum number of chunks of `dims` that may intersect this box.
    #[must_use]
    pub fn num_chunks(&self, dims: &[DimensionDesc]) -> u64 {
        debug_assert_eq!(self.start.len(), dims.len());
        if self.is_empty() {
            return 0;
        }
        let mut result: u64 = 1;
        for ((s, e), dim) in self.start.iter().zip(&self.end).zip(dims) {
            if *s <= MIN_COORDINATE || *e >= MAX_COORDINATE {
                return INFINITE_LENGTH;
            }
            let interval = dim.chunk_interval;
            if interval == 0 {
                return 0;
            }
            let chunks = ((e - dim.start_min + interval) / interval
                - (s - dim.start_min) / interval)
                .max(0) as u64;
            match result.checked_mul(chunks) {
                Some(r) => result = r,
                None => return INFINITE_LENGTH,
            }
        }
        result
    }

    /// Estimated size in bytes of one cell across all attributes.
    #[must_use]
    pub fn cell_size_bytes(attributes: &[AttributeDesc]) -> u32 {
        let mut total_bits = 0;
        for attr in attributes {
            let mut bits = attr.data_type.fixed_bit_size();
            if bits == 0 {
                bits = STRING_SIZE_ESTIMATE_BYTES * 8;
            }
            if attr.nullable {
                bits += 1;
            }
            total_bits += bits;
        }
        (total_bits + 7) / 8
    }

    /// Estimated total bytes an array shaped like `schema` occupies within
    /// this box. Every cell is assumed to live in a sparse chunk, so each
    /// carries its coordinates and a per-chunk header is added.
    #[must_use]
    pub fn size_estimate_bytes(&self, schema: &ArrayDesc) -> f64 {
        let num_cells = self.num_cells();
        let num_chunks = self.num_chunks(schema.dimensions());
        let num_dims = schema.dimensions().len();
        let num_attrs = schema.attributes().len();

        let mut cell_size = u64::from(Self::cell_size_bytes(schema.attributes()));
        cell_size += (num_attrs * (num_dims * 8 + 4)) as u64;

        let mut size = num_cells as f64 * cell_size as f64;
        size += num_chunks as f64 * num_attrs as f64;
        size * self.density
    }

    /// The intersection of two boxes, with the highest density either box
    /// could still support over the shared region.
    #[must_use]
    pub fn intersect_with(&self, other: &Self) -> Self {
        debug_assert_eq!(self.start.len(), other.start.len());
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.start.len());
        }
        let start: Coordinates =
            self.start.iter().zip(&other.start).map(|(a, b)| *a.max(b)).collect();
        let end: Coordinates =
            self.end.iter().zip(&other.end).map(|(a, b)| *a.min(b)).collect();

        let my_cells = self.num_cells() as f64;
        let other_cells = other.num_cells() as f64;
        let shared_cells = Self::cell_count_between(&start, &end) as f64;
        let mut density = 1.0;
        if shared_cells > 0.0 {
            let my_max = (self.density * my_cells / shared_cells).min(1.0);
            let other_max = (other.density * other_cells / shared_cells).min(1.0);
            density = my_max.min(other_max);
        }
        Self::new(start, end, density)
    }

    /// The union of two boxes, with the densest estimate the combined cell
    /// counts support.
    #[must_use]
    pub fn union_with(&self, other: &Self) -> Self {
        debug_assert_eq!(self.start.len(), other.start.len());
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let start: Coordinates =
            self.start.iter().zip(&other.start).map(|(a, b)| *a.min(b)).collect();
        let end: Coordinates =
            self.end.iter().zip(&other.end).map(|(a, b)| *a.max(b)).collect();

        let my_cells = self.num_cells() as f64;
        let other_cells = other.num_cells() as f64;
        let union_cells = Self::cell_count_between(&start, &end) as f64;
        let density = if union_cells > 0.0 {
            ((my_cells * self.density + other_cells * other.density) / union_cells).min(1.0)
        } else {
            1.0
        };
        Self::new(start, end, density)
    }

    /// The cartesian product of two boxes; densities multiply.
    #[must_use]
    pub fn cross_with(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.start.len() + other.start.len());
        }
        let mut start = self.start.clone();
        let mut end = self.end.clone();
        start.extend_from_slice(&other.start);
        end.extend_from_slice(&other.end);
        Self::new(start, end, self.density * other.density)
    }

    /// Wraps this box around a new dimension set, preserving row-major cell
    /// positions.
    #[must_use]
    pub fn reshape(&self, old_dims: &[DimensionDesc], new_dims: &[DimensionDesc]) -> Self {
        if self.is_empty() {
            return Self::empty(new_dims.len());
        }
        let mut start = Self::reshape_coordinates(&self.start, old_dims, new_dims);
        let mut end = Self::reshape_coordinates(&self.end, old_dims, new_dims);

        if new_dims.len() > old_dims.len() {
            let mut dimension_full = false;
            for i in 0..start.len() {
                if dimension_full {
                    start[i] = new_dims[i].start_min;
                    end[i] = new_dims[i].end_max;
                } else if end[i] > start[i] {
                    dimension_full = true;
                }
            }
        }
        Self::new(start, end, self.density)
    }

    /// Row-major cell number of `coords` within `dims`, saturating to
    /// [`INFINITE_LENGTH`].
    #[must_use]
    pub fn cell_number(coords: &[Coordinate], dims: &[DimensionDesc]) -> u64 {
        debug_assert_eq!(coords.len(), dims.len());
        let mut result: u64 = 0;
        for (c, dim) in coords.iter().zip(dims) {
            let length = dim.length();
            if length == 0 || length == INFINITE_LENGTH {
                return INFINITE_LENGTH;
            }
            let Some(scaled) = result.checked_mul(length) else {
                return INFINITE_LENGTH;
            };
            let offset = (c - dim.start_min).max(0) as u64;
            let Some(next) = scaled.checked_add(offset) else {
                return INFINITE_LENGTH;
            };
            result = next;
        }
        result
    }

    /// Coordinates of the `cell_num`-th row-major cell within `dims`.
    #[must_use]
    pub fn coordinates_of(mut cell_num: u64, dims: &[DimensionDesc]) -> Coordinates {
        let mut coords = vec![0; dims.len()];
        for (i, dim) in dims.iter().enumerate().rev() {
            let length = dim.length();
            if length == 0 || length == INFINITE_LENGTH {
                coords[i] = MAX_COORDINATE;
                continue;
            }
            coords[i] = dim.start_min + (cell_num % length) as Coordinate;
            cell_num /= length;
        }
        coords
    }

    /// Maps a position in `current_dims` onto the equivalent row-major
    /// position in `new_dims`. Unbounded inputs map to the maximum
    /// coordinate in every output dimension.
    #[must_use]
    pub fn reshape_coordinates(
        coords: &[Coordinate],
        current_dims: &[DimensionDesc],
        new_dims: &[DimensionDesc],
    ) -> Coordinates {
        let cell = Self::cell_number(coords, current_dims);
        if cell == INFINITE_LENGTH {
            return vec![MAX_COORDINATE; new_dims.len()];
        }
        Self::coordinates_of(cell, new_dims)
    }
}

#[cfg(test)]
mod tests {
    use latticedb_core::DataType;

    use super::*;

    fn dims_2d() -> Vec<DimensionDesc> {
        vec![DimensionDesc::new("x", 0, 99, 10), DimensionDesc::new("y", 0, 99, 10)]
    }

    fn schema_2d() -> ArrayDesc {
        ArrayDesc::new("a")
            .with_attribute(AttributeDesc::new("v", DataType::Double))
            .with_dimension(DimensionDesc::new("x", 0, 99, 10))
            .with_dimension(DimensionDesc::new("y", 0, 99, 10))
    }

    #[test]
    fn empty_boundaries_have_no_cells() {
        let b = PhysicalBoundaries::empty(2);
        assert!(b.is_empty());
        assert_eq!(b.num_cells(), 0);
        assert_eq!(b.num_chunks(&dims_2d()), 0);
    }

    #[test]
    fn full_schema_counts() {
        let b = PhysicalBoundaries::from_full_schema(&schema_2d());
        assert_eq!(b.num_cells(), 100 * 100);
        assert_eq!(b.num_chunks(&dims_2d()), 100);
    }

    #[test]
    fn unbounded_dimension_is_infinite() {
        let b = PhysicalBoundaries::new(vec![0], vec![MAX_COORDINATE], 1.0);
        assert_eq!(b.num_cells(), INFINITE_LENGTH);
    }

    #[test]
    fn intersection_and_union() {
        let a = PhysicalBoundaries::new(vec![0, 0], vec![49, 49], 1.0);
        let b = PhysicalBoundaries::new(vec![25, 25], vec![99, 99], 1.0);
        let i = a.intersect_with(&b);
        assert_eq!(i.start_coords(), &[25, 25]);
        assert_eq!(i.end_coords(), &[49, 49]);
        let u = a.union_with(&b);
        assert_eq!(u.start_coords(), &[0, 0]);
        assert_eq!(u.end_coords(), &[99, 99]);
    }

    #[test]
    fn cross_product_concatenates_dimensions() {
        let a = PhysicalBoundaries::new(vec![0], vec![9], 0.5);
        let b = PhysicalBoundaries::new(vec![10], vec![19], 0.5);
        let c = a.cross_with(&b);
        assert_eq!(c.start_coords(), &[0, 10]);
        assert_eq!(c.end_coords(), &[9, 19]);
        assert!((c.density() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn reshape_preserves_cell_positions() {
        // A 10x10 space flattened to 100 cells.
        let old_dims = dims_2d()
            .into_iter()
            .map(|mut d| {
                d.end_max = 9;
                d
            })
            .collect::<Vec<_>>();
        let new_dims = vec![DimensionDesc::new("i", 0, 99, 10)];
        let b = PhysicalBoundaries::new(vec![2, 3], vec![4, 5], 1.0);
        let r = b.reshape(&old_dims, &new_dims);
        assert_eq!(r.start_coords(), &[23]);
        assert_eq!(r.end_coords(), &[45]);
    }

    #[test]
    fn size_estimate_scales_with_density() {
        let schema = schema_2d();
        let dense = PhysicalBoundaries::from_full_schema(&schema);
        let sparse = PhysicalBoundaries::new(vec![0, 0], vec![99, 99], 0.1);
        assert!(sparse.size_estimate_bytes(&schema) < dense.size_estimate_bytes(&schema));
    }

    #[test]
    fn serde_round_trip() {
        let b = PhysicalBoundaries::new(vec![1, 2], vec![3, 4], 0.5);
        let json = serde_json::to_string(&b).expect("serialize");
        let back: PhysicalBoundaries = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(b, back);
    }
}
