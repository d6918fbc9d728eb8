/// Untyped table as delivered by an upstream source: a header row and text cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a table from string literals, mostly handy for fixtures.
    pub fn from_strs(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Renames columns by `(from, to)` pairs; unknown labels are left alone.
    pub fn rename_columns(&mut self, mapping: &[(&str, &str)]) {
        for column in self.columns.iter_mut() {
            if let Some((_, to)) = mapping.iter().find(|(from, _)| column.trim() == *from) {
                *column = to.to_string();
            }
        }
    }

    /// Appends the rows of `other`, aligning cells by column name.
    ///
    /// Columns that only exist in `other` are ignored; cells for columns it lacks
    /// are left empty.
    pub fn append(&mut self, other: RawTable) {
        if self.columns.is_empty() {
            *self = other;
            return;
        }
        if other.columns == self.columns {
            self.rows.extend(other.rows);
            return;
        }
        let positions: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();
        for row in other.rows {
            let aligned = positions
                .iter()
                .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                .collect();
            self.rows.push(aligned);
        }
    }

    pub fn records(&self) -> impl Iterator<Item = RawRecord<'_>> {
        self.rows.iter().map(move |cells| RawRecord { table: self, cells })
    }
}

/// One row of a [`RawTable`].
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    table: &'a RawTable,
    cells: &'a [String],
}

impl<'a> RawRecord<'a> {
    /// Trimmed cell text; `None` when the column or cell is absent or blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column_index(column)?;
        self.cells
            .get(idx)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}
