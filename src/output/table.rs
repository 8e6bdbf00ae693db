//! Plain-text tables for terminal output.

use std::fmt;

/// A bordered text table. Column widths grow to fit the widest cell,
/// measured in characters.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    widths: Vec<usize>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let widths = headers.iter().map(|h| h.chars().count()).collect();
        Self {
            headers,
            rows: Vec::new(),
            widths,
        }
    }

    /// Add a row. Short rows are padded with empty cells and long rows
    /// truncated to the header count.
    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells
            .into_iter()
            .take(self.headers.len())
            .map(Into::into)
            .collect();
        row.resize(self.headers.len(), String::new());

        for (width, cell) in self.widths.iter_mut().zip(&row) {
            *width = (*width).max(cell.chars().count());
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn write_separator(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("+")?;
        for width in &self.widths {
            write!(f, "{}+", "-".repeat(width + 2))?;
        }
        writeln!(f)
    }

    fn write_row(&self, f: &mut fmt::Formatter<'_>, cells: &[String]) -> fmt::Result {
        f.write_str("|")?;
        for (cell, width) in cells.iter().zip(&self.widths) {
            let padding = width - cell.chars().count();
            write!(f, " {}{} |", cell, " ".repeat(padding))?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "No data to display.");
        }

        self.write_separator(f)?;
        self.write_row(f, &self.headers)?;
        self.write_separator(f)?;
        for row in &self.rows {
            self.write_row(f, row)?;
        }
        self.write_separator(f)?;
        writeln!(f)?;
        writeln!(f, "Total: {} rows", self.rows.len())
    }
}
