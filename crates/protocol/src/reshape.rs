//! Share matrix reshaping.
//!
//! Phase messages carry one server's values for every client, while the
//! verifier wants every server's values for one client. [`transpose`]
//! converts between the two layouts.

/// A matrix whose rows are not all the same length.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReshapeError {
    #[error("row {row} has {actual} entries, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Transpose an `outer x inner` matrix into `inner x outer`.
///
/// Elements are moved, not cloned. `inner` is given explicitly so an empty
/// `matrix` still yields `inner` empty rows.
pub fn transpose<T>(matrix: Vec<Vec<T>>, inner: usize) -> Result<Vec<Vec<T>>, ReshapeError> {
    if let Some((row, actual)) = matrix
        .iter()
        .map(Vec::len)
        .enumerate()
        .find(|(_, len)| *len != inner)
    {
        return Err(ReshapeError::Ragged {
            row,
            expected: inner,
            actual,
        });
    }

    let outer = matrix.len();
    let mut result: Vec<Vec<T>> = (0..inner).map(|_| Vec::with_capacity(outer)).collect();
    for row in matrix {
        for (column, value) in result.iter_mut().zip(row) {
            column.push(value);
        }
    }
    Ok(result)
}
