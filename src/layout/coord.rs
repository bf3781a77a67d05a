use rustc_hash::FxHashMap;

use crate::shape::Expression;

/// A bidirectional mapping between logical and physical index tuples.
///
/// `initial_indices` names the input coordinates; `final_indices` holds one
/// output-coordinate expression per input coordinate. Maps are immutable
/// values: rewrites (e.g. packed-storage scaling) build a new map.
///
/// The fragment tables hand these out in forward/inverse pairs; within the
/// extent of one warp tile a valid map is a bijection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateMap {
    pub initial_indices: Vec<char>,
    pub final_indices: Vec<Expression>,
}

impl CoordinateMap {
    pub fn new(
        initial_indices: impl IntoIterator<Item = char>,
        final_indices: impl IntoIterator<Item = Expression>,
    ) -> Self {
        let map = Self {
            initial_indices: initial_indices.into_iter().collect(),
            final_indices: final_indices
                .into_iter()
                .map(|e| e.simplify())
                .collect(),
        };
        assert_eq!(
            map.initial_indices.len(),
            map.final_indices.len(),
            "coordinate maps keep their arity"
        );
        map
    }

    pub fn arity(&self) -> usize {
        self.initial_indices.len()
    }

    /// Substitute the given index expressions for this map's input
    /// variables, yielding the output-coordinate expressions. Substitution
    /// is simultaneous, so feeding a map its own variables reordered works.
    pub fn map_indices(&self, indices: &[Expression]) -> Vec<Expression> {
        assert_eq!(indices.len(), self.arity(), "index arity mismatch");
        let subs: Vec<(char, Expression)> = self
            .initial_indices
            .iter()
            .copied()
            .zip(indices.iter().cloned())
            .collect();
        self.final_indices
            .iter()
            .map(|e| e.substitute_all(&subs).simplify())
            .collect()
    }

    /// Evaluate the map at a concrete point.
    pub fn apply(&self, point: &[usize]) -> Option<Vec<usize>> {
        assert_eq!(point.len(), self.arity(), "index arity mismatch");
        let vars: FxHashMap<char, usize> = self
            .initial_indices
            .iter()
            .copied()
            .zip(point.iter().copied())
            .collect();
        self.final_indices.iter().map(|e| e.exec(&vars)).collect()
    }

    /// Exhaustively check that this map permutes the box `[0, extents)`.
    pub fn is_bijection(&self, extents: &[usize]) -> bool {
        assert_eq!(extents.len(), self.arity());
        let total: usize = extents.iter().product();
        let mut seen = vec![false; total];
        for flat in 0..total {
            let point = unravel(flat, extents);
            let Some(image) = self.apply(&point) else {
                return false;
            };
            if image.iter().zip(extents).any(|(c, e)| c >= e) {
                return false;
            }
            let slot = ravel(&image, extents);
            if std::mem::replace(&mut seen[slot], true) {
                return false;
            }
        }
        true
    }
}

pub(crate) fn unravel(mut flat: usize, extents: &[usize]) -> Vec<usize> {
    let mut point = vec![0; extents.len()];
    for (c, e) in point.iter_mut().zip(extents).rev() {
        *c = flat % e;
        flat /= e;
    }
    point
}

pub(crate) fn ravel(point: &[usize], extents: &[usize]) -> usize {
    point
        .iter()
        .zip(extents)
        .fold(0, |acc, (c, e)| acc * e + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap_map() -> CoordinateMap {
        CoordinateMap::new(['i', 'j'], [Expression::from('j'), Expression::from('i')])
    }

    #[test]
    fn test_map_indices_composes() {
        let m = swap_map();
        // composing swap with itself is the identity
        let twice = m.map_indices(&m.map_indices(&[
            Expression::from('i'),
            Expression::from('j'),
        ]));
        assert!(twice[0].is_var('i'));
        assert!(twice[1].is_var('j'));
    }

    #[test]
    fn test_apply_and_bijection() {
        let m = swap_map();
        assert_eq!(m.apply(&[3, 5]), Some(vec![5, 3]));
        assert!(m.is_bijection(&[4, 4]));
        // a collapsing map is not a bijection
        let collapse = CoordinateMap::new(
            ['i', 'j'],
            [Expression::from('i'), Expression::from('i')],
        );
        assert!(!collapse.is_bijection(&[4, 4]));
        // out-of-extent image is not a bijection either
        let shift = CoordinateMap::new(
            ['i', 'j'],
            [Expression::from('i') + 1, Expression::from('j')],
        );
        assert!(!shift.is_bijection(&[4, 4]));
    }
}
