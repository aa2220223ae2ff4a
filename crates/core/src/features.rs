//! Feature matrix handed to the inference oracle.

use crate::error::{DomainError, DomainResult};

/// An N×F numeric matrix: N rows in ascending timestamp order, F feature
/// columns in stable (schema) order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append one row; its width must match the column count.
    pub fn push_row(&mut self, row: Vec<f64>) -> DomainResult<()> {
        if row.len() != self.columns.len() {
            return Err(DomainError::validation(format!(
                "row width {} does not match {} feature columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one named column, oldest first.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_row_width() {
        let mut m = FeatureMatrix::new(vec!["a".into(), "b".into()]);
        assert!(m.push_row(vec![1.0]).is_err());
        assert!(m.push_row(vec![1.0, 2.0]).is_ok());
        assert_eq!(m.n_rows(), 1);
    }

    #[test]
    fn column_extraction_preserves_row_order() {
        let mut m = FeatureMatrix::new(vec!["a".into(), "b".into()]);
        m.push_row(vec![1.0, 10.0]).unwrap();
        m.push_row(vec![2.0, 20.0]).unwrap();
        assert_eq!(m.column("b").unwrap(), vec![10.0, 20.0]);
        assert!(m.column("c").is_none());
    }
}
