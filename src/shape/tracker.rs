use std::fmt::Display;

use rustc_hash::FxHashMap;
use tinyvec::ArrayVec;

use crate::shape::{Expression, Term, ToShape};

/// Tracks the logical dims and physical strides of one tensor.
///
/// Dims are symbolic so a dynamic dimension (e.g. an unbound row count) is
/// just a variable. Reshaping a matrix into warp tiles is a `split_dims` +
/// `permute`, after which `index_expression` yields the flat
/// logical-to-physical mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShapeTracker {
    pub dims: ArrayVec<[Expression; 10]>,
    pub strides: ArrayVec<[Expression; 10]>,
}

impl Display for ShapeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sh{:?} st{:?}", self.dims, self.strides)
    }
}

impl ShapeTracker {
    /// Make a new row-major shape tracker
    pub fn new(dims: impl ToShape) -> ShapeTracker {
        let mut s = Self::default();
        let mut stride = Expression::from(1);
        for d in dims.to_shape().into_iter().rev() {
            s.dims.insert(0, d.clone());
            s.strides.insert(0, stride.clone());
            stride *= d;
        }
        s
    }

    /// Add dim along a certain axis
    pub fn add_dim(
        &mut self,
        axis: usize,
        dim: impl Into<Expression>,
        stride: impl Into<Expression>,
    ) {
        self.dims.insert(axis, dim.into());
        self.strides.insert(axis, stride.into());
    }

    /// Add a broadcast (stride-0) dim along a certain axis
    pub fn expand_dim(&mut self, axis: usize, dim: impl Into<Expression>) {
        self.add_dim(axis, dim, 0);
    }

    /// Remove a dimension
    pub fn remove_dim(&mut self, axis: usize) -> Expression {
        self.strides.remove(axis);
        self.dims.remove(axis)
    }

    /// Permute the dimensions
    pub fn permute(&mut self, axes: &[usize]) {
        assert!(
            axes.len() == self.len(),
            "Permute axes ({}) doesn't match shape axes ({})",
            axes.len(),
            self.len()
        );
        self.dims = axes.iter().map(|i| self.dims[*i].clone()).collect();
        self.strides = axes.iter().map(|i| self.strides[*i].clone()).collect();
    }

    /// Split a dim into 2 dims, new dim is placed directly after original dim
    pub fn split_dims(&mut self, axis: usize, new_dim_size: impl Into<Expression>) {
        let new_dim_size = new_dim_size.into();
        self.dims.insert(axis + 1, new_dim_size.clone());
        self.strides.insert(axis + 1, self.strides[axis].clone());
        self.dims[axis] = (self.dims[axis].clone() / new_dim_size.clone()).simplify();
        self.strides[axis] = (self.strides[axis].clone() * new_dim_size).simplify();
    }

    /// Create an expression translating flat logical indexes into physical indexes
    pub fn index_expression(&self) -> Expression {
        if self.is_contiguous() {
            return 'z'.into();
        }
        let mut ind_expr = Expression::from(0);
        let mut current_elem_size = Expression::from(1);
        for (d, s) in self.dims.iter().zip(&self.strides).rev() {
            // Broadcast dimensions contribute nothing to the physical index
            if *s == 0 {
                current_elem_size *= d.clone();
                continue;
            }
            let dim_ind = (Expression::from('z') / current_elem_size.clone()) % d.clone();
            ind_expr += dim_ind * s.clone();
            current_elem_size *= d.clone();
        }
        ind_expr.simplify()
    }

    /// Check if contiguous (no permutes or broadcast dimensions)
    pub fn is_contiguous(&self) -> bool {
        self.dims
            .iter()
            .rev()
            .scan(Expression::from(1), |acc, d| {
                let r = acc.clone();
                *acc *= d.clone();
                Some(r)
            })
            .zip(self.strides.iter().rev())
            .all(|(a, b)| a == *b)
    }

    /// The number of elements in this tensor
    pub fn n_elements(&self) -> Expression {
        self.dims
            .iter()
            .product::<Expression>()
            .max(Expression::from(1))
    }

    /// The number of dimensions
    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Realize the true shape and convert it to usizes. All dyn dims must be replaced already
    pub fn shape_usize(&self) -> Vec<usize> {
        self.dims.iter().map(|e| e.to_usize().unwrap()).collect()
    }

    /// Given a dyn dim map, resolve dyn dims into known dims
    pub fn resolve_dyn_dims(&mut self, dyn_dim_map: &FxHashMap<char, usize>) {
        for d in self.dims.iter_mut().chain(self.strides.iter_mut()) {
            for t in d.terms.iter_mut() {
                if let Term::Var(v) = *t
                    && let Some(val) = dyn_dim_map.get(&v)
                {
                    *t = Term::Num(*val as i32);
                }
            }
            *d = d.simplify();
        }
    }
}
