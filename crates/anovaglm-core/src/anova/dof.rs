//! Degrees-of-freedom bookkeeping for the two predictors and their interaction.
//!
//! A k-level factor is encoded in k - 1 contrast columns, so its degrees of
//! freedom are k - 1. The interaction of two factors has
//! dof(A) × dof(B) columns; the joint additive model has dof(A) + dof(B).
//! The table is pure data, recomputed from the domains on every run.

use super::missing::Predictor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegreeOfFreedomTable {
    names: [String; 2],
    dofs: [usize; 2],
    include_joint_model: bool,
}

impl DegreeOfFreedomTable {
    /// Build from predictor names and their domain sizes (level counts).
    pub fn new(
        name_a: impl Into<String>,
        levels_a: usize,
        name_b: impl Into<String>,
        levels_b: usize,
        include_joint_model: bool,
    ) -> Self {
        Self {
            names: [name_a.into(), name_b.into()],
            dofs: [levels_a.saturating_sub(1), levels_b.saturating_sub(1)],
            include_joint_model,
        }
    }

    pub fn predictor_name(&self, predictor: Predictor) -> &str {
        match predictor {
            Predictor::A => &self.names[0],
            Predictor::B => &self.names[1],
        }
    }

    pub fn dof(&self, predictor: Predictor) -> usize {
        match predictor {
            Predictor::A => self.dofs[0],
            Predictor::B => self.dofs[1],
        }
    }

    pub fn dof_interaction(&self) -> usize {
        self.dofs[0] * self.dofs[1]
    }

    /// dof of the additive A + B model; `None` unless it is fitted.
    pub fn dof_joint(&self) -> Option<usize> {
        self.include_joint_model.then_some(self.dofs[0] + self.dofs[1])
    }

    /// Effect label of the interaction, e.g. `"A:B"`.
    pub fn interaction_name(&self) -> String {
        format!("{}:{}", self.names[0], self.names[1])
    }

    /// Effect label of the joint additive model, e.g. `"A,B"`.
    pub fn joint_name(&self) -> String {
        format!("{},{}", self.names[0], self.names[1])
    }

    pub fn include_joint_model(&self) -> bool {
        self.include_joint_model
    }

    /// All (effect, dof) pairs in table order: A, B, A:B and, when fitted, A,B.
    pub fn entries(&self) -> Vec<(String, usize)> {
        let mut entries = vec![
            (self.names[0].clone(), self.dofs[0]),
            (self.names[1].clone(), self.dofs[1]),
            (self.interaction_name(), self.dof_interaction()),
        ];
        if let Some(joint) = self.dof_joint() {
            entries.push((self.joint_name(), joint));
        }
        entries
    }

    /// Look up an effect by label.
    pub fn get(&self, effect: &str) -> Option<usize> {
        self.entries()
            .into_iter()
            .find(|(name, _)| name == effect)
            .map(|(_, dof)| dof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_by_two() {
        let table = DegreeOfFreedomTable::new("A", 3, "B", 2, true);
        assert_eq!(table.dof(Predictor::A), 2);
        assert_eq!(table.dof(Predictor::B), 1);
        assert_eq!(table.dof_interaction(), 2);
        assert_eq!(table.dof_joint(), Some(3));
        assert_eq!(table.get("A:B"), Some(2));
        assert_eq!(table.get("A,B"), Some(3));
    }

    #[test]
    fn test_joint_entry_only_when_requested() {
        let table = DegreeOfFreedomTable::new("color", 4, "size", 3, false);
        assert_eq!(table.dof_joint(), None);
        let names: Vec<String> = table.entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["color", "size", "color:size"]);
        assert_eq!(table.get("color:size"), Some(6));
        assert_eq!(table.get("color,size"), None);
    }
}
