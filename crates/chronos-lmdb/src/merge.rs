//! Row reconstruction from per-field column streams
//!
//! Every column iterator yields its entries newest first. [`RowMerger`]
//! keeps the head entry of each column, picks the greatest [`RowKey`] among
//! them, and emits one row with the values of the columns whose head sits at
//! exactly that key. Those columns advance; the others keep their head for a
//! later row. One forward pass, no buffering beyond one entry per column.

use chronos_core::{FieldValue, Result, SequenceNumber, Timestamp};

use crate::scan::{ColumnEntry, RowKey};

/// A composite row; `values[i]` comes from the i-th column
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: Timestamp,
    pub sequence_number: SequenceNumber,
    pub values: Vec<Option<FieldValue>>,
}

impl Row {
    pub fn key(&self) -> RowKey {
        RowKey {
            timestamp: self.timestamp,
            sequence_number: self.sequence_number,
        }
    }
}

pub struct RowMerger<I> {
    columns: Vec<I>,
    heads: Vec<Option<ColumnEntry>>,
    primed: bool,
    failed: bool,
}

impl<I> RowMerger<I>
where
    I: Iterator<Item = Result<ColumnEntry>>,
{
    pub fn new(columns: Vec<I>) -> Self {
        let heads = columns.iter().map(|_| None).collect();
        Self {
            columns,
            heads,
            primed: false,
            failed: false,
        }
    }

    fn advance(&mut self, column: usize) -> Result<()> {
        self.heads[column] = self.columns[column].next().transpose()?;
        Ok(())
    }

    fn prime(&mut self) -> Result<()> {
        for column in 0..self.columns.len() {
            self.advance(column)?;
        }
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if !self.primed {
            self.primed = true;
            self.prime()?;
        }

        let Some(key) = self.heads.iter().flatten().map(|e| e.key).max() else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(self.columns.len());
        for column in 0..self.columns.len() {
            let at_key = matches!(&self.heads[column], Some(head) if head.key == key);
            if at_key {
                values.push(self.heads[column].take().map(|e| e.value));
                self.advance(column)?;
            } else {
                values.push(None);
            }
        }

        Ok(Some(Row {
            timestamp: key.timestamp,
            sequence_number: key.sequence_number,
            values,
        }))
    }
}

impl<I> Iterator for RowMerger<I>
where
    I: Iterator<Item = Result<ColumnEntry>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_row() {
            Ok(row) => row.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
