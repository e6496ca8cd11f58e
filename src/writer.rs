use std::{
    io::{self, Write},
    path::Path,
};

use serde::Serialize;

use crate::EnduroError;

/// Writes each item as one JSON line
pub fn write_results<T: Serialize>(file: &Path, results: &[T]) -> Result<(), EnduroError> {
    serde_jsonlines::write_json_lines(file, results)
        .map_err(|e| EnduroError::WriterError { source: e })
}

/// Pretty-prints the results as a JSON array
pub fn print_results<T: Serialize, W: Write>(
    out: &mut W,
    results: &[T],
) -> Result<(), EnduroError> {
    serde_json::to_writer_pretty(&mut *out, results).map_err(|e| EnduroError::WriterError {
        source: io::Error::other(e),
    })?;
    writeln!(out).map_err(|e| EnduroError::WriterError { source: e })
}
