//! Ownership of the column sets a run materializes.
//!
//! The encoded contrast, interaction and auxiliary columns are built once
//! and shared with every sub-model through `Arc`. The arena keeps the
//! owning handles and ends their lifetime in exactly one of two ways:
//! `release` drops them, or `retain` hands them to the caller as one
//! concatenated `TransformedColumns` matrix.

use std::sync::Arc;

use ndarray::{s, Array1, Array2};

use super::encoding::{ContrastColumnSet, InteractionColumnSet};

/// The transformed columns of a run, kept when the caller asks for them.
///
/// Columns are `A | B | A:B | weight | offset`, the auxiliary ones only
/// when configured.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedColumns {
    pub column_names: Vec<String>,
    pub values: Array2<f64>,
}

impl TransformedColumns {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ndarray::ArrayView1<'_, f64>> {
        let idx = self.column_names.iter().position(|n| n == name)?;
        Some(self.values.column(idx))
    }
}

#[derive(Debug)]
pub struct FrameArena {
    contrast_a: Arc<ContrastColumnSet>,
    contrast_b: Arc<ContrastColumnSet>,
    interaction: Arc<InteractionColumnSet>,
    auxiliary: Vec<(String, Arc<Array1<f64>>)>,
}

impl FrameArena {
    pub fn new(
        contrast_a: ContrastColumnSet,
        contrast_b: ContrastColumnSet,
        interaction: InteractionColumnSet,
    ) -> Self {
        Self {
            contrast_a: Arc::new(contrast_a),
            contrast_b: Arc::new(contrast_b),
            interaction: Arc::new(interaction),
            auxiliary: Vec::new(),
        }
    }

    /// Register a weight or offset vector; returns the shared handle.
    pub fn add_auxiliary(&mut self, name: impl Into<String>, values: Array1<f64>) -> Arc<Array1<f64>> {
        let handle = Arc::new(values);
        self.auxiliary.push((name.into(), Arc::clone(&handle)));
        handle
    }

    pub fn contrast_a(&self) -> &Arc<ContrastColumnSet> {
        &self.contrast_a
    }

    pub fn contrast_b(&self) -> &Arc<ContrastColumnSet> {
        &self.contrast_b
    }

    pub fn interaction(&self) -> &Arc<InteractionColumnSet> {
        &self.interaction
    }

    /// Names and reference counts of sets still shared outside the arena.
    pub fn outstanding(&self) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        let mut check = |name: &str, count: usize| {
            if count > 1 {
                out.push((name.to_string(), count - 1));
            }
        };
        check(self.contrast_a.predictor(), Arc::strong_count(&self.contrast_a));
        check(self.contrast_b.predictor(), Arc::strong_count(&self.contrast_b));
        check(self.interaction.effect(), Arc::strong_count(&self.interaction));
        for (name, values) in &self.auxiliary {
            check(name, Arc::strong_count(values));
        }
        out
    }

    /// Drop every set. Sets still referenced elsewhere are reported, not an error.
    pub fn release(self) {
        for (name, refs) in self.outstanding() {
            log::warn!(
                "Transformed columns '{}' still have {} outside reference(s) at release",
                name,
                refs
            );
        }
        log::debug!("Released transformed columns");
    }

    /// Concatenate every set into one matrix and give it to the caller.
    pub fn retain(self) -> TransformedColumns {
        let nrows = self.contrast_a.nrows();
        let mut column_names: Vec<String> = Vec::new();
        column_names.extend(self.contrast_a.names().iter().cloned());
        column_names.extend(self.contrast_b.names().iter().cloned());
        column_names.extend(self.interaction.names().iter().cloned());
        column_names.extend(self.auxiliary.iter().map(|(name, _)| name.clone()));

        let mut values = Array2::<f64>::zeros((nrows, column_names.len()));
        let mut at = 0;
        for block in [
            self.contrast_a.values(),
            self.contrast_b.values(),
            self.interaction.values(),
        ] {
            let width = block.ncols();
            values.slice_mut(s![.., at..at + width]).assign(block);
            at += width;
        }
        for (_, aux) in &self.auxiliary {
            values.column_mut(at).assign(&**aux);
            at += 1;
        }

        log::info!(
            "Retaining {} transformed columns over {} rows",
            column_names.len(),
            nrows
        );
        TransformedColumns { column_names, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anova::encoding::{compose_interaction, encode_contrasts};
    use crate::anova::dof::DegreeOfFreedomTable;
    use crate::anova::missing::Predictor;
    use ndarray::array;

    fn arena() -> FrameArena {
        let dom = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let dof = DegreeOfFreedomTable::new("A", 2, "B", 2, true);
        let a = encode_contrasts(&dof, Predictor::A, &dom(&["x", "y"]), &[0, 1, 1]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &dom(&["p", "q"]), &[1, 0, 1]).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();
        FrameArena::new(a, b, ab)
    }

    #[test]
    fn test_retain_concatenates_in_order() {
        let mut arena = arena();
        arena.add_auxiliary("w", array![1.0, 2.0, 3.0]);
        arena.add_auxiliary("off", array![0.5, 0.5, 0.5]);
        let kept = arena.retain();

        assert_eq!(kept.column_names, vec!["A_x", "B_p", "A_x_B_p", "w", "off"]);
        assert_eq!(kept.values.row(0).to_vec(), vec![1.0, -1.0, -1.0, 1.0, 0.5]);
        assert_eq!(kept.column("w").unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(kept.column("missing").is_none());
    }

    #[test]
    fn test_outstanding_tracks_shared_handles() {
        let mut arena = arena();
        let w = arena.add_auxiliary("w", array![1.0, 1.0, 1.0]);
        let a = Arc::clone(arena.contrast_a());

        let outstanding = arena.outstanding();
        assert_eq!(outstanding, vec![("A".to_string(), 1), ("w".to_string(), 1)]);

        drop(a);
        drop(w);
        assert!(arena.outstanding().is_empty());
        arena.release();
    }
}
