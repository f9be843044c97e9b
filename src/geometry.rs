/// An axis-aligned bounding box in `D` dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox<const D: usize> {
    pub min: [f64; D],
    pub max: [f64; D],
}

impl<const D: usize> BoundingBox<D> {
    /// Creates an empty (inverted) bounding box, the neutral element of [`union`](Self::union).
    pub fn empty() -> Self {
        Self {
            min: [f64::MAX; D],
            max: [f64::MIN; D],
        }
    }

    /// Creates the smallest bounding box containing all the input points.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = [f64; D]>,
    {
        let mut bbox = Self::empty();
        for point in points {
            bbox.expand(&point);
        }
        bbox
    }

    /// Grows the box so that it contains `point`.
    pub fn expand(&mut self, point: &[f64; D]) {
        for axis in 0..D {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..D {
            min[axis] = min[axis].min(other.min[axis]);
            max[axis] = max[axis].max(other.max[axis]);
        }
        Self { min, max }
    }

    /// Returns a copy of the box grown by `margin` on every side.
    pub fn inflated(&self, margin: f64) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..D {
            min[axis] -= margin;
            max[axis] += margin;
        }
        Self { min, max }
    }

    /// Returns `true` if the point is inside the box or on its boundary.
    pub fn contains(&self, point: &[f64; D]) -> bool {
        (0..D).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    /// Returns `true` if the boxes have at least one point in common, boundaries included.
    pub fn intersects(&self, other: &Self) -> bool {
        (0..D).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }

    /// Returns `true` if the box contains no point at all.
    pub fn is_empty(&self) -> bool {
        (0..D).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(&self.max).all(|x| x.is_finite())
    }

    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// The axis along which the box is the longest (the first one in case of ties).
    pub fn longest_axis(&self) -> usize {
        (0..D).fold(0, |best, axis| {
            if self.extent(axis) > self.extent(best) {
                axis
            } else {
                best
            }
        })
    }

    pub fn center(&self) -> [f64; D] {
        std::array::from_fn(|axis| 0.5 * (self.min[axis] + self.max[axis]))
    }

    /// Length of the diagonal of the box, used as the characteristic size of what it contains.
    pub fn diagonal(&self) -> f64 {
        (0..D).map(|axis| self.extent(axis).powi(2)).sum::<f64>().sqrt()
    }

    /// Euclidean distance from the point to the box, `0` if the point is inside.
    pub fn distance(&self, point: &[f64; D]) -> f64 {
        (0..D)
            .map(|axis| {
                let d = (self.min[axis] - point[axis])
                    .max(point[axis] - self.max[axis])
                    .max(0.);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// Solves the dense linear system `a * x = b` with Gaussian elimination and partial pivoting.
///
/// Returns the solution together with the determinant of `a`, or [`None`] if `a` is singular.
pub(crate) fn solve<const D: usize>(
    mut a: [[f64; D]; D],
    mut b: [f64; D],
) -> Option<([f64; D], f64)> {
    let mut det = 1.;
    for col in 0..D {
        let pivot = (col..D).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col] == 0. || !a[pivot][col].is_finite() {
            return None;
        }
        if pivot != col {
            a.swap(pivot, col);
            b.swap(pivot, col);
            det = -det;
        }
        let pivot_row = a[col];
        det *= pivot_row[col];
        for row in col + 1..D {
            let factor = a[row][col] / pivot_row[col];
            for k in col..D {
                a[row][k] -= factor * pivot_row[k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.; D];
    for row in (0..D).rev() {
        let sum: f64 = (row + 1..D).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - sum) / a[row][row];
    }
    Some((x, det))
}

/// Euclidean distance between two points.
pub fn distance<const D: usize>(p: &[f64; D], q: &[f64; D]) -> f64 {
    p.iter()
        .zip(q)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
