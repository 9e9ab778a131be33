//! Weight and offset extraction onto the resolved rows.
//!
//! Row membership comes from the same `ResolvedRows` the encoders used, so
//! the extracted vectors line up with the contrast and interaction columns.
//! Kept rows with a missing weight get weight 0 and a missing offset gets 0.

use ndarray::Array1;

use super::frame::NumericColumn;
use super::missing::{ResolvedRows, MISSING_OFFSET_FILL, MISSING_WEIGHT_FILL};

/// Weight/offset vectors over the kept rows; `None` when not configured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryColumns {
    pub weights: Option<Array1<f64>>,
    pub offset: Option<Array1<f64>>,
}

impl AuxiliaryColumns {
    /// Column names in extraction order (weight first, then offset).
    pub fn names<'a>(&self, weights_name: Option<&'a str>, offset_name: Option<&'a str>) -> Vec<&'a str> {
        let mut names = Vec::new();
        if self.weights.is_some() {
            names.extend(weights_name);
        }
        if self.offset.is_some() {
            names.extend(offset_name);
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_none() && self.offset.is_none()
    }
}

/// Pull the optional weight and offset columns onto the kept rows.
pub fn extract_auxiliary(
    weights: Option<&NumericColumn>,
    offset: Option<&NumericColumn>,
    rows: &ResolvedRows,
) -> AuxiliaryColumns {
    AuxiliaryColumns {
        weights: weights.map(|w| Array1::from_vec(rows.gather(w, MISSING_WEIGHT_FILL))),
        offset: offset.map(|o| Array1::from_vec(rows.gather(o, MISSING_OFFSET_FILL))),
    }
}
