use tinyvec::TinyVec;

use crate::model::VarId;

/// Sparse linear expression `sum(coeff * var)`.
///
/// Most rows of the deployment model have two or three terms, so up to four
/// terms are stored inline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinExpr {
    terms: TinyVec<[(VarId, f64); 4]>,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, var: VarId, coeff: f64) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }

    pub fn has_duplicates(&self) -> bool {
        let mut seen = self.terms.iter().map(|(v, _)| *v).collect::<Vec<_>>();
        seen.sort_unstable();
        seen.windows(2).any(|w| w[0] == w[1])
    }

    /// Sums the coefficients of repeated variables into a single term placed
    /// where the variable first occurred.
    pub fn merge_duplicates(&mut self) {
        if !self.has_duplicates() {
            return;
        }
        let mut merged: TinyVec<[(VarId, f64); 4]> = TinyVec::with_capacity(self.terms.len());
        for (var, coeff) in self.terms.iter() {
            match merged.iter_mut().find(|(v, _)| v == var) {
                Some((_, c)) => *c += coeff,
                None => merged.push((*var, *coeff)),
            }
        }
        self.terms = merged;
    }

    /// Value of the expression for a dense assignment indexed by `VarId`.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.idx()]).sum()
    }
}

impl FromIterator<(VarId, f64)> for LinExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        LinExpr { terms: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_occurrence_order() {
        let mut e = LinExpr::new();
        e.add_term(VarId(3), 1.0).add_term(VarId(1), 2.0).add_term(VarId(3), 0.5).add_term(VarId(7), -1.0);
        assert!(e.has_duplicates());
        e.merge_duplicates();
        assert!(!e.has_duplicates());
        assert_eq!(e.terms(), &[(VarId(3), 1.5), (VarId(1), 2.0), (VarId(7), -1.0)]);
    }

    #[test]
    fn merge_is_noop_without_duplicates() {
        let mut e = [(VarId(0), 1.0), (VarId(1), 1.0)].into_iter().collect::<LinExpr>();
        let before = e.clone();
        e.merge_duplicates();
        assert_eq!(e, before);
    }

    #[test]
    fn long_expressions_spill_to_heap() {
        let e = (0..50).map(|i| (VarId(i), i as f64)).collect::<LinExpr>();
        assert_eq!(e.len(), 50);
        let values = vec![2.0; 50];
        assert_eq!(e.eval(&values), 2.0 * (0..50).sum::<u32>() as f64);
    }
}
