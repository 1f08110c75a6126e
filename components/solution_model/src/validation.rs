// components/solution_model/src/validation.rs
//! Load-time checks that keep the resolver's lookups satisfiable
//!
//! The resolver reads earlier steps' results without guarding each lookup,
//! so a solution that omits or reorders a prerequisite is refused here
//! instead of failing halfway through a run.

use crate::item::StepKind;
use crate::solution::{Solution, SOLUTION_FILE_TYPE};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file type '{found}' is not a solution configuration")]
    WrongFileType { found: String },

    #[error("item id '{0}' appears more than once")]
    DuplicateItemId(String),

    #[error("step type '{kind}' appears more than once (items '{first}' and '{second}')")]
    DuplicateStep {
        kind: StepKind,
        first: String,
        second: String,
    },

    #[error("item '{item_id}' ({kind}) requires a '{requires}' step, which the solution does not contain")]
    MissingPrerequisite {
        item_id: String,
        kind: StepKind,
        requires: StepKind,
    },

    #[error("item '{item_id}' ({kind}) must come after its '{requires}' step")]
    PrerequisiteOutOfOrder {
        item_id: String,
        kind: StepKind,
        requires: StepKind,
    },
}

impl Solution {
    /// Check the document can be deployed front to back
    ///
    /// Unrecognized item types are allowed through; the deployer reports
    /// them as a failed step when it reaches them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.file_type != SOLUTION_FILE_TYPE {
            return Err(ValidationError::WrongFileType {
                found: self.file_type.clone(),
            });
        }

        let mut ids = HashSet::new();
        for item in &self.config_items {
            if !ids.insert(item.id.as_str()) {
                return Err(ValidationError::DuplicateItemId(item.id.clone()));
            }
        }

        let mut positions: HashMap<StepKind, (usize, &str)> = HashMap::new();
        for (index, item) in self.config_items.iter().enumerate() {
            let Some(kind) = item.kind() else { continue };
            if let Some((_, first)) = positions.get(&kind) {
                return Err(ValidationError::DuplicateStep {
                    kind,
                    first: first.to_string(),
                    second: item.id.clone(),
                });
            }
            positions.insert(kind, (index, item.id.as_str()));
        }

        for (index, item) in self.config_items.iter().enumerate() {
            let Some(kind) = item.kind() else { continue };
            for &requires in kind.prerequisites() {
                match positions.get(&requires) {
                    None => {
                        return Err(ValidationError::MissingPrerequisite {
                            item_id: item.id.clone(),
                            kind,
                            requires,
                        })
                    }
                    Some((position, _)) if *position > index => {
                        return Err(ValidationError::PrerequisiteOutOfOrder {
                            item_id: item.id.clone(),
                            kind,
                            requires,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}
