//! Workbook decoding — the tabular-source collaborator.
//!
//! The rest of the crate only ever sees [`Workbook`]: named sheets of named
//! columns of cell text, in source order. The spreadsheet format itself
//! (`calamine`: xlsx / xls / xlsb / ods) stays contained in this module.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TabularError {
    #[error("could not read workbook: {0}")]
    Unreadable(String),
    #[error("could not read sheet '{name}': {message}")]
    Sheet { name: String, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Non-empty cell text in row order. Empty cells are dropped here.
    pub cells: Vec<String>,
}

/// Decode raw spreadsheet bytes into the workbook model.
pub fn parse_workbook(bytes: &[u8]) -> Result<Workbook, TabularError> {
    let cursor = Cursor::new(bytes);
    let mut source =
        open_workbook_auto_from_rs(cursor).map_err(|e| TabularError::Unreadable(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in source.sheet_names() {
        let range = source.worksheet_range(&name).map_err(|e| TabularError::Sheet {
            name: name.clone(),
            message: e.to_string(),
        })?;
        sheets.push(sheet_from_range(name, &range));
    }
    Ok(Workbook { sheets })
}

fn sheet_from_range(name: String, range: &Range<Data>) -> Sheet {
    let (rows, cols) = range.get_size();
    let mut columns = Vec::with_capacity(cols);
    for col in 0..cols {
        // First row is the header, as exported sheets conventionally are.
        let header =
            cell_text(range.get((0, col))).unwrap_or_else(|| format!("column {}", col + 1));
        let mut cells = Vec::new();
        for row in 1..rows {
            if let Some(text) = cell_text(range.get((row, col))) {
                cells.push(text);
            }
        }
        columns.push(Column { name: header, cells });
    }
    Sheet { name, columns }
}

fn cell_text(cell: Option<&Data>) -> Option<String> {
    let text = match cell? {
        Data::Empty => return None,
        Data::String(s) => s.clone(),
        other => other.to_string(),
    };
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_a_reportable_error() {
        let err = parse_workbook(b"definitely not a spreadsheet").unwrap_err();
        assert!(matches!(err, TabularError::Unreadable(_)));
        assert!(err.to_string().contains("could not read workbook"));
    }

    #[test]
    fn empty_input_is_a_reportable_error() {
        assert!(parse_workbook(&[]).is_err());
    }
}
