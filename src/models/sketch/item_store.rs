//! Sparse store of static item features.
//!
//! Logically the store is a `(n_item + n_item_context) × n_item` matrix whose
//! column `s` is `[one-hot(s)][context of item s]`. Only the context
//! non-zeros are kept, in compressed-column form. The identity row of an
//! item is implied by its column, so adding an item inserts a new identity
//! row at the end of the identity block and appends a column without
//! rewriting any stored entry.
use crate::Slot;

/// Compressed sparse column storage of item context vectors.
#[derive(Clone, Debug, Default)]
pub struct ItemStore {
    num_context: usize,
    column_pointers: Vec<usize>,
    context_indices: Vec<usize>,
    values: Vec<f64>,
}

impl ItemStore {
    /// An empty store for items with `num_context` context features.
    pub fn new(num_context: usize) -> Self {
        ItemStore {
            num_context,
            column_pointers: vec![0],
            context_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Number of stored items.
    pub fn num_items(&self) -> usize {
        self.column_pointers.len() - 1
    }

    /// Logical `(rows, columns)` shape.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_items() + self.num_context, self.num_items())
    }

    /// Number of stored non-zeros, identity entries included.
    pub fn nnz(&self) -> usize {
        self.values.len() + self.num_items()
    }

    /// Add the next item and return its slot.
    pub fn push(&mut self, context: &[f64]) -> Slot {
        debug_assert_eq!(context.len(), self.num_context);

        for (idx, &value) in context.iter().enumerate() {
            if value != 0.0 {
                self.context_indices.push(idx);
                self.values.push(value);
            }
        }

        self.column_pointers.push(self.values.len());

        self.num_items() - 1
    }

    /// The non-zero context entries of item `slot` as
    /// `(context index, value)` pairs.
    pub fn context(&self, slot: Slot) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.column_pointers[slot];
        let stop = self.column_pointers[slot + 1];

        izip!(&self.context_indices[start..stop], &self.values[start..stop])
            .map(|(&idx, &value)| (idx, value))
    }

    /// Column `slot` of the logical matrix as `(row, value)` pairs, rows
    /// counted from the top of the item half of the feature vector.
    pub fn column(&self, slot: Slot) -> Vec<(usize, f64)> {
        let context_start = self.num_items();

        let mut column = vec![(slot, 1.0)];
        column.extend(
            self.context(slot)
                .map(|(idx, value)| (context_start + idx, value)),
        );

        column
    }

    /// Dense copy of the logical matrix, row-major.
    #[cfg(test)]
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let (rows, cols) = self.shape();
        let mut dense = vec![vec![0.0; cols]; rows];

        for slot in 0..cols {
            for (row, value) in self.column(slot) {
                dense[row][slot] = value;
            }
        }

        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_inserts_identity_row_and_column() {
        let mut store = ItemStore::new(2);

        assert_eq!(store.push(&[0.5, 0.0]), 0);
        assert_eq!(store.shape(), (3, 1));
        assert_eq!(store.to_dense(), vec![vec![1.0], vec![0.5], vec![0.0]]);

        assert_eq!(store.push(&[0.0, 2.0]), 1);
        assert_eq!(store.shape(), (4, 2));
        assert_eq!(
            store.to_dense(),
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.5, 0.0],
                vec![0.0, 2.0],
            ]
        );
        assert_eq!(store.nnz(), 4);
    }

    #[test]
    fn context_free_items() {
        let mut store = ItemStore::new(0);

        for _ in 0..3 {
            store.push(&[]);
        }

        assert_eq!(store.shape(), (3, 3));
        assert_eq!(store.column(2), vec![(2, 1.0)]);
    }
}
