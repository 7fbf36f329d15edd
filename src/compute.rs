use crate::{
    data::{Aggregate, GroupKey, RowError},
    read::LoanUser,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// This is where the aggregates are stored; they are created on the fly when reading
/// the loans. Entries keep the order in which their key was first seen, so the output
/// follows the input. Single-threaded, so no protections for MT.
#[derive(Debug, Default)]
pub(crate) struct AggregateTable {
    entries: Vec<(GroupKey, Aggregate)>,
    index: HashMap<GroupKey, usize>,
}

impl AggregateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn get(&self, key: &GroupKey) -> Option<&Aggregate> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &Aggregate)> {
        self.entries.iter().map(|(k, a)| (k, a))
    }

    /// `None` when the grand total does not fit, even if every group does.
    pub fn total_sum(&self) -> Option<Decimal> {
        self.entries
            .iter()
            .try_fold(Decimal::ZERO, |total, (_, a)| total.checked_add(a.sum))
    }

    pub fn total_count(&self) -> u64 {
        self.entries.iter().map(|(_, a)| a.count).sum()
    }
}

impl LoanUser for AggregateTable {
    fn use_loan(&mut self, key: GroupKey, amount: Decimal) -> Result<(), RowError> {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1.add(amount)?,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, Aggregate::new(amount)));
            }
        }
        Ok(())
    }
}
