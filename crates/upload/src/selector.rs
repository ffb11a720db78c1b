//! Part selection for the completion call.
//!
//! Selection builds a new list and never touches the completed set, so
//! verification always covers every uploaded part.

use std::collections::BTreeSet;

use crate::types::CompletedPart;

/// Which uploaded parts the final object references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PartSelection {
    /// Every uploaded part.
    #[default]
    All,
    /// Only the listed part numbers.
    Only(BTreeSet<u32>),
}

/// Outcome of [`PartSelection::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Ascending by part number.
    pub included: Vec<CompletedPart>,
    /// Ascending part numbers left out.
    pub skipped: Vec<u32>,
}

impl PartSelection {
    /// Builds a selection from an allow-list; an empty list means all parts.
    pub fn from_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        let set: BTreeSet<u32> = indices.into_iter().collect();
        if set.is_empty() {
            Self::All
        } else {
            Self::Only(set)
        }
    }

    pub fn includes(&self, part_number: u32) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&part_number),
        }
    }

    pub fn select(&self, completed: &[CompletedPart]) -> Selection {
        let mut sorted: Vec<&CompletedPart> = completed.iter().collect();
        sorted.sort_by_key(|p| p.part_number);

        let mut selection = Selection::default();
        for part in sorted {
            if self.includes(part.part_number) {
                selection.included.push(part.clone());
            } else {
                selection.skipped.push(part.part_number);
            }
        }
        selection
    }
}
