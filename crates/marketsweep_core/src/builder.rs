//! Run specification builder.
//!
//! Expands a [`SweepSpace`] into the ordered Cartesian product of its axes.
//! Indices are generated in row-major order (last dimension varies fastest),
//! so the first declared axis varies slowest, followed by the engine variant
//! and finally the replicate index.

use crate::model::{Param, RunSpecification, SweepSpace};

/// Compute strides for row-major order
fn compute_strides(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return Vec::new();
    }
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len() - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Iterator over all multi-dimensional indices of a shape
pub struct GridIndices {
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl GridIndices {
    pub fn new(shape: Vec<usize>) -> Self {
        let done = shape.iter().any(|&n| n == 0);
        Self {
            current: vec![0; shape.len()],
            shape,
            done,
        }
    }
}

impl Iterator for GridIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current.clone();

        // Increment indices (row-major: last dimension varies fastest)
        if self.shape.is_empty() {
            self.done = true;
        }
        for i in (0..self.shape.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                break;
            }
            self.current[i] = 0;
            if i == 0 {
                self.done = true;
            }
        }

        Some(result)
    }
}

/// Builds run specifications from a sweep space
#[derive(Debug, Clone)]
pub struct SpecBuilder<'a> {
    space: &'a SweepSpace,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> SpecBuilder<'a> {
    pub fn new(space: &'a SweepSpace) -> Self {
        let shape = space.shape();
        let strides = compute_strides(&shape);
        Self {
            space,
            shape,
            strides,
        }
    }

    /// Number of specifications the sweep expands to
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, run_index: usize, indices: &[usize]) -> RunSpecification {
        let n_axes = self.space.axes.len();
        let params = self
            .space
            .axes
            .iter()
            .zip(indices)
            .map(|(axis, &i)| Param {
                name: axis.name.clone(),
                value: axis.values[i].clone(),
            })
            .collect();

        RunSpecification {
            run_index,
            params,
            variant: self.space.variants[indices[n_axes]],
            replicate: indices[n_axes + 1],
        }
    }

    /// Resolve the specification at a position of the builder order.
    ///
    /// Returns `None` when `run_index` is outside the sweep.
    pub fn get(&self, run_index: usize) -> Option<RunSpecification> {
        if run_index >= self.len() {
            return None;
        }
        let mut remaining = run_index;
        let indices: Vec<usize> = self
            .strides
            .iter()
            .map(|&stride| {
                let idx = remaining / stride;
                remaining %= stride;
                idx
            })
            .collect();
        Some(self.resolve(run_index, &indices))
    }

    /// Iterate over all specifications in builder order
    pub fn iter(&self) -> impl Iterator<Item = RunSpecification> + '_ {
        GridIndices::new(self.shape.clone())
            .enumerate()
            .map(|(run_index, indices)| self.resolve(run_index, &indices))
    }

    pub fn build(&self) -> Vec<RunSpecification> {
        self.iter().collect()
    }
}

/// Expand a sweep space into its ordered run specifications.
///
/// An empty axis (or zero variants or replicates) yields an empty vector.
pub fn build_specs(space: &SweepSpace) -> Vec<RunSpecification> {
    SpecBuilder::new(space).build()
}
