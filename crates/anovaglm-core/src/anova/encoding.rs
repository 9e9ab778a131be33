// =============================================================================
// Contrast Encoding and Interaction Columns
// =============================================================================
//
// SUM-TO-ZERO (DEVIATION) CODING
// ------------------------------
// A factor with k levels becomes k - 1 columns. For level index v:
//
//     column j (j in 0..k-1):   1   if v == j
//                              -1   if v == k - 1   (the last level)
//                               0   otherwise
//
// Example, A with levels {x, y, z}:
//
//     level   A_x   A_y
//     x        1     0
//     y        0     1
//     z       -1    -1
//
// Unlike treatment (dummy) coding, the coefficients are deviations from the
// grand mean and sum to zero across levels, which is what lets the nested
// sub-model deviances decompose into A, B and A:B effects.
//
// INTERACTION
// -----------
// Column (i, j) of A:B is A_i × B_j, with i outer and j inner. Names follow
// the same order: "<A column>_<B column>", e.g. "A_x_B_p".
//
// SIZING
// ------
// The degrees-of-freedom table is built first and is the single source of
// column counts and effect names: the encoders allocate exactly the widths
// it gives and refuse a domain that disagrees with it.
//
// PARALLELISM
// -----------
// Rows are cut into fixed-size chunks; each chunk is written independently
// into its own disjoint slice of the output matrix, so the result is in
// source row order with no merging step.
//
// =============================================================================

use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;

use crate::error::{AnovaGlmError, Result};

use super::dof::DegreeOfFreedomTable;
use super::missing::Predictor;

/// Rows handled per parallel task.
pub(crate) const CHUNK_ROWS: usize = 4096;

/// The k - 1 contrast columns of one categorical predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastColumnSet {
    predictor: String,
    names: Vec<String>,
    values: Array2<f64>,
}

impl ContrastColumnSet {
    /// Name of the predictor these columns encode.
    pub fn predictor(&self) -> &str {
        &self.predictor
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Row-major values, one row per kept source row.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn dof(&self) -> usize {
        self.values.ncols()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }
}

/// The dof(A) × dof(B) interaction columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionColumnSet {
    effect: String,
    names: Vec<String>,
    values: Array2<f64>,
}

impl InteractionColumnSet {
    /// Effect label, e.g. `"A:B"`.
    pub fn effect(&self) -> &str {
        &self.effect
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn dof(&self) -> usize {
        self.values.ncols()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }
}

/// `"<predictor>_<label>"` for the first `dof` labels, in domain order.
pub fn contrast_column_names(predictor: &str, domain: &[String], dof: usize) -> Vec<String> {
    domain[..dof.min(domain.len())]
        .iter()
        .map(|label| format!("{}_{}", predictor, label))
        .collect()
}

/// `"<A column>_<B column>"`, A outer, B inner.
pub fn interaction_column_names(names_a: &[String], names_b: &[String]) -> Vec<String> {
    names_a
        .iter()
        .flat_map(|a| names_b.iter().map(move |b| format!("{}_{}", a, b)))
        .collect()
}

/// Write the contrast vector of `level` into `row` (length dof = k - 1).
#[inline]
pub fn fill_contrast_row(mut row: ArrayViewMut1<f64>, level: u32, dof: usize) {
    let level = level as usize;
    for (j, value) in row.iter_mut().enumerate().take(dof) {
        *value = if level == j {
            1.0
        } else if level == dof {
            -1.0
        } else {
            0.0
        };
    }
}

/// Encode one predictor's resolved level indices into contrast columns.
///
/// The width and the column-name prefix come from `ledger`. `levels` must
/// come from `ResolvedRows::levels`, so missing values are already imputed
/// or their rows already dropped.
pub fn encode_contrasts(
    ledger: &DegreeOfFreedomTable,
    which: Predictor,
    domain: &[String],
    levels: &[u32],
) -> Result<ContrastColumnSet> {
    let predictor = ledger.predictor_name(which);
    let dof = ledger.dof(which);
    let k = domain.len();
    if k != dof + 1 {
        return Err(AnovaGlmError::DimensionMismatch(format!(
            "predictor '{}' has {} levels but {} degrees of freedom were allotted",
            predictor, k, dof
        )));
    }
    if k < 2 {
        return Err(AnovaGlmError::InvalidValue(format!(
            "predictor '{}' needs at least 2 levels to encode, found {}",
            predictor, k
        )));
    }
    if let Some(&bad) = levels.iter().find(|&&l| l as usize >= k) {
        return Err(AnovaGlmError::InvalidValue(format!(
            "level index {} out of range for predictor '{}' with {} levels",
            bad, predictor, k
        )));
    }

    let mut values = Array2::<f64>::zeros((levels.len(), dof));

    values
        .axis_chunks_iter_mut(Axis(0), CHUNK_ROWS)
        .into_par_iter()
        .zip(levels.par_chunks(CHUNK_ROWS))
        .for_each(|(mut block, chunk)| {
            for (row, &level) in block.rows_mut().into_iter().zip(chunk) {
                fill_contrast_row(row, level, dof);
            }
        });

    Ok(ContrastColumnSet {
        predictor: predictor.to_string(),
        names: contrast_column_names(predictor, domain, dof),
        values,
    })
}

/// Build the A:B interaction from two contrast sets over the same rows.
///
/// The width and effect label come from `ledger`.
pub fn compose_interaction(
    ledger: &DegreeOfFreedomTable,
    a: &ContrastColumnSet,
    b: &ContrastColumnSet,
) -> Result<InteractionColumnSet> {
    let width = ledger.dof_interaction();
    if a.dof() * b.dof() != width {
        return Err(AnovaGlmError::DimensionMismatch(format!(
            "'{}' and '{}' contrasts give {} interaction columns but {} were allotted",
            a.predictor(),
            b.predictor(),
            a.dof() * b.dof(),
            width
        )));
    }
    if a.nrows() != b.nrows() {
        return Err(AnovaGlmError::DimensionMismatch(format!(
            "contrast columns for '{}' have {} rows but '{}' has {}",
            a.predictor(),
            a.nrows(),
            b.predictor(),
            b.nrows()
        )));
    }

    let mut values = Array2::<f64>::zeros((a.nrows(), width));

    values
        .axis_chunks_iter_mut(Axis(0), CHUNK_ROWS)
        .into_par_iter()
        .zip(a.values.axis_chunks_iter(Axis(0), CHUNK_ROWS))
        .zip(b.values.axis_chunks_iter(Axis(0), CHUNK_ROWS))
        .for_each(|((mut block, block_a), block_b)| {
            for ((mut out, row_a), row_b) in block
                .rows_mut()
                .into_iter()
                .zip(block_a.rows())
                .zip(block_b.rows())
            {
                let mut col = 0;
                for &va in row_a.iter() {
                    for &vb in row_b.iter() {
                        out[col] = va * vb;
                        col += 1;
                    }
                }
            }
        });

    Ok(InteractionColumnSet {
        effect: ledger.interaction_name(),
        names: interaction_column_names(a.names(), b.names()),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn domain(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn ledger(levels_a: usize, levels_b: usize) -> DegreeOfFreedomTable {
        DegreeOfFreedomTable::new("A", levels_a, "B", levels_b, true)
    }

    #[test]
    fn test_three_level_contrasts() {
        let set = encode_contrasts(&ledger(3, 2), Predictor::A, &domain(&["x", "y", "z"]), &[0, 1, 2, 0]).unwrap();
        assert_eq!(set.names(), &["A_x", "A_y"]);
        assert_eq!(
            set.values(),
            &array![[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0], [1.0, 0.0]]
        );
    }

    #[test]
    fn test_every_row_is_one_hot_or_all_minus_one() {
        let k = 5;
        let levels: Vec<u32> = (0..10_000).map(|i| (i * 7 % k) as u32).collect();
        let dom: Vec<String> = (0..k).map(|i| format!("l{}", i)).collect();
        let set = encode_contrasts(&DegreeOfFreedomTable::new("F", k, "G", 2, true), Predictor::A, &dom, &levels)
            .unwrap();

        assert_eq!(set.dof(), k - 1);
        assert_eq!(set.nrows(), levels.len());
        for (row, &level) in set.values().rows().into_iter().zip(&levels) {
            if level as usize == k - 1 {
                assert!(row.iter().all(|&v| v == -1.0));
            } else {
                assert_eq!(row.iter().filter(|&&v| v == 1.0).count(), 1);
                assert_eq!(row.iter().filter(|&&v| v == 0.0).count(), k - 2);
                assert_eq!(row[level as usize], 1.0);
            }
        }
    }

    #[test]
    fn test_encode_rejects_single_level() {
        let err = encode_contrasts(&ledger(1, 2), Predictor::A, &domain(&["only"]), &[0, 0]).unwrap_err();
        assert!(matches!(err, AnovaGlmError::InvalidValue(_)));
    }

    #[test]
    fn test_domain_must_match_allotted_width() {
        let err = encode_contrasts(&ledger(3, 2), Predictor::B, &domain(&["p", "q", "r"]), &[0, 1]).unwrap_err();
        assert!(matches!(err, AnovaGlmError::DimensionMismatch(_)));

        let dof = ledger(3, 2);
        let a = encode_contrasts(&dof, Predictor::A, &domain(&["x", "y", "z"]), &[0, 1]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &domain(&["p", "q"]), &[0, 1]).unwrap();
        let err = compose_interaction(&ledger(3, 3), &a, &b).unwrap_err();
        assert!(matches!(err, AnovaGlmError::DimensionMismatch(_)));
    }

    #[test]
    fn test_two_by_two_interaction_is_product() {
        let dof = ledger(2, 2);
        let a = encode_contrasts(&dof, Predictor::A, &domain(&["a1", "a2"]), &[0, 1, 0, 1]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &domain(&["b1", "b2"]), &[0, 0, 1, 1]).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();

        assert_eq!(ab.dof(), 1);
        assert_eq!(ab.names(), &["A_a1_B_b1"]);
        assert_eq!(ab.effect(), "A:B");
        for r in 0..4 {
            assert_eq!(ab.values()[[r, 0]], a.values()[[r, 0]] * b.values()[[r, 0]]);
        }
    }

    #[test]
    fn test_interaction_column_order_is_a_outer_b_inner() {
        let dof = ledger(3, 3);
        let a = encode_contrasts(&dof, Predictor::A, &domain(&["x", "y", "z"]), &[0, 1, 2]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &domain(&["p", "q", "r"]), &[1, 2, 0]).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();

        assert_eq!(
            ab.names(),
            &["A_x_B_p", "A_x_B_q", "A_y_B_p", "A_y_B_q"]
        );
        // row 1: A = (0, 1), B = (-1, -1)
        assert_eq!(ab.values().row(1).to_vec(), vec![0.0, 0.0, -1.0, -1.0]);
        // row 2: A = (-1, -1), B = (1, 0)
        assert_eq!(ab.values().row(2).to_vec(), vec![-1.0, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_interaction_requires_aligned_rows() {
        let dof = ledger(2, 2);
        let a = encode_contrasts(&dof, Predictor::A, &domain(&["x", "y"]), &[0, 1, 0]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &domain(&["p", "q"]), &[0, 1]).unwrap();
        assert!(matches!(
            compose_interaction(&dof, &a, &b),
            Err(AnovaGlmError::DimensionMismatch(_))
        ));
    }
}
