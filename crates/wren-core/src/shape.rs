use std::fmt;

// Shape — N-dimensional shape of a buffer
//
// Dimensions are `usize`, so a shape is non-negative in every dimension by
// construction. Functions that accept shapes as type-erased `i64` arguments go
// through `Shape::from_i64_dims`, which rejects negative sizes.

/// N-dimensional shape of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Build a shape from signed dimensions, failing on any negative size.
    pub fn from_i64_dims(dims: &[i64]) -> crate::Result<Shape> {
        dims.iter()
            .map(|&d| {
                usize::try_from(d)
                    .map_err(|_| crate::Error::msg(format!("negative dimension {d} in shape {dims:?}")))
            })
            .collect::<crate::Result<Vec<_>>>()
            .map(Shape)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. A scalar shape [] has 1 element; any zero
    /// dimension gives 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Contiguous (row-major) strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::DimOutOfRange {
            dim: d as i64,
            rank: self.rank(),
        })
    }

    /// Resolve a possibly negative axis (`-1` is the last dimension).
    pub fn normalize_axis(&self, axis: i64) -> crate::Result<usize> {
        let rank = self.rank() as i64;
        let resolved = if axis < 0 { axis + rank } else { axis };
        if resolved < 0 || resolved >= rank {
            return Err(crate::Error::DimOutOfRange {
                dim: axis,
                rank: self.rank(),
            });
        }
        Ok(resolved as usize)
    }

    // Broadcasting

    /// Compute the broadcast output shape from two input shapes.
    ///
    /// NumPy-style rules: align from the right; sizes must be equal or one of
    /// them 1; missing leading dimensions count as 1.
    ///
    ///   [3, 4] and [4]       → [3, 4]
    ///   [2, 1] and [1, 3]    → [2, 3]
    ///   [3] and [4]          → Error
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> crate::Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else if rd == 1 {
                result.push(ld);
            } else {
                return Err(crate::Error::msg(format!(
                    "shapes {} and {} are not broadcast-compatible (dim {} from right: {} vs {})",
                    lhs, rhs, i, ld, rd
                )));
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// Strides that map an index of `target` back onto this shape.
    ///
    /// Broadcast dimensions (size 1 here, larger in `target`) and missing
    /// leading dimensions get stride 0.
    pub fn broadcast_strides(&self, target: &Shape) -> Vec<usize> {
        let self_dims = self.dims();
        let target_dims = target.dims();
        let self_strides = self.stride_contiguous();

        let mut result = vec![0usize; target_dims.len()];
        let offset = target_dims.len() - self_dims.len();

        for i in 0..self_dims.len() {
            if self_dims[i] == target_dims[i + offset] {
                result[i + offset] = self_strides[i];
            }
        }
        result
    }

    /// For every flat index of `target`, the flat index it reads from this
    /// shape. Returns `None` when no broadcasting happens (identity mapping).
    pub fn broadcast_index_map(&self, target: &Shape) -> Option<Vec<usize>> {
        if self == target {
            return None;
        }
        let strides = self.broadcast_strides(target);
        let dims = target.dims();
        let mut map = Vec::with_capacity(target.elem_count());
        let mut index = vec![0usize; dims.len()];
        for _ in 0..target.elem_count() {
            map.push(index.iter().zip(&strides).map(|(i, s)| i * s).sum());
            for d in (0..dims.len()).rev() {
                index[d] += 1;
                if index[d] < dims[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        Some(map)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.elem_count(), 1);
        assert!(s.stride_contiguous().is_empty());
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.stride_contiguous(), vec![12, 4, 1]);
        assert_eq!(s.elem_count(), 24);
    }

    #[test]
    fn test_from_i64_dims_rejects_negative() {
        assert_eq!(Shape::from_i64_dims(&[2, 0, 3]).unwrap().dims(), &[2, 0, 3]);
        assert!(Shape::from_i64_dims(&[2, -1]).is_err());
    }

    #[test]
    fn test_normalize_axis() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.normalize_axis(0).unwrap(), 0);
        assert_eq!(s.normalize_axis(-1).unwrap(), 2);
        assert!(s.normalize_axis(3).is_err());
        assert!(s.normalize_axis(-4).is_err());
    }

    #[test]
    fn test_broadcast_shape() {
        let a = Shape::from((2, 1));
        let b = Shape::from((1, 3));
        assert_eq!(Shape::broadcast_shape(&a, &b).unwrap(), Shape::from((2, 3)));
        assert!(Shape::broadcast_shape(&Shape::from(3), &Shape::from(4)).is_err());
    }

    #[test]
    fn test_broadcast_index_map() {
        let row = Shape::from(3);
        let target = Shape::from((2, 3));
        assert_eq!(row.broadcast_index_map(&target).unwrap(), vec![0, 1, 2, 0, 1, 2]);

        let col = Shape::from((2, 1));
        assert_eq!(col.broadcast_index_map(&target).unwrap(), vec![0, 0, 0, 1, 1, 1]);

        assert!(target.broadcast_index_map(&target).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::from((3, 4))), "[3, 4]");
    }
}
