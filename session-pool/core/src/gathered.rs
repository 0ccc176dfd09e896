// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

/// Results of one `map`/`starmap` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gathered<U> {
    /// Every partition's results concatenated in partition-index order
    Flat(Vec<U>),
    /// One result list per partition, empty partitions included
    Grouped(Vec<Vec<U>>),
}

impl<U> Gathered<U> {
    pub fn from_partitions(partitions: Vec<Vec<U>>, flatten: bool) -> Self {
        if flatten {
            Gathered::Flat(partitions.into_iter().flatten().collect())
        } else {
            Gathered::Grouped(partitions)
        }
    }

    /// Results as one sequence; grouped results are concatenated
    pub fn into_flat(self) -> Vec<U> {
        match self {
            Gathered::Flat(values) => values,
            Gathered::Grouped(groups) => groups.into_iter().flatten().collect(),
        }
    }

    /// Results per partition; `None` when they were already flattened
    pub fn into_groups(self) -> Option<Vec<Vec<U>>> {
        match self {
            Gathered::Flat(_) => None,
            Gathered::Grouped(groups) => Some(groups),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Gathered::Flat(_))
    }

    /// Number of result entries, not groups
    pub fn len(&self) -> usize {
        match self {
            Gathered::Flat(values) => values.len(),
            Gathered::Grouped(groups) => groups.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
