//! CSV and spreadsheet readers producing header-keyed rows.

use std::{io::Read, path::Path};

use calamine::{Data, Reader, Sheets, open_workbook_auto};

use super::IngestError;

/// Columns understood by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Display serial from the roll.
    Serial,
    /// Voter name.
    Name,
    /// Sex or sex/age.
    Sex,
    /// Voter identifier.
    VoterId,
    /// Contact number.
    Mobile,
}

impl Column {
    /// Normalized header spellings accepted for this column.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Serial => &["serial", "serialno", "srno"],
            Column::Name => &["name"],
            Column::Sex => &["sex", "sexage", "gender"],
            Column::VoterId => &["voterid"],
            Column::Mobile => &["mobile", "mobileno", "phone"],
        }
    }

    /// Whether `header` is a spelling of this column.
    pub fn matches(self, header: &str) -> bool {
        let key = normalize_header(header);
        self.aliases().contains(&key.as_str())
    }
}

/// Lowercases and drops spaces, underscores and hyphens.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// One data row: (header, cell) pairs with empty cells omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    /// Builds a row, trimming values and dropping empty ones.
    pub fn from_pairs<H, V>(pairs: impl IntoIterator<Item = (H, V)>) -> Self
    where
        H: Into<String>,
        V: Into<String>,
    {
        let mut row = Row::default();
        for (header, value) in pairs {
            row.push(header.into(), value.into());
        }
        row
    }

    fn push(&mut self, header: String, value: String) {
        let value = value.trim();
        if !value.is_empty() {
            self.cells.push((header, value.to_string()));
        }
    }

    /// First non-empty cell whose header resolves to `column`.
    pub fn get(&self, column: Column) -> Option<&str> {
        self.cells
            .iter()
            .find(|(header, _)| column.matches(header))
            .map(|(_, value)| value.as_str())
    }

    /// Cells in file order.
    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    /// True when every cell was blank.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Reads an upload, choosing the parser from the file extension.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<Row>, IngestError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => read_csv(std::fs::File::open(path)?),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path),
        _ => Err(IngestError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Reads comma-separated rows with a header line.
///
/// Input that is not valid UTF-8 is decoded as Windows-1252, which is what
/// Excel writes when exporting CSV on most desktop installs.
pub fn read_csv(mut reader: impl Read) -> Result<Vec<Row>, IngestError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            decoded.into_owned()
        }
    };
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record?;
        let row = Row::from_pairs(headers.iter().cloned().zip(record.iter()));
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn read_workbook(path: &Path) -> Result<Vec<Row>, IngestError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook.worksheet_range(&first)?;

    let mut lines = range.rows();
    let Some(header_cells) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_cells
        .iter()
        .map(|c| cell_text(c).unwrap_or_default())
        .collect();

    let mut rows = Vec::new();
    for cells in lines {
        let row = Row::from_pairs(
            headers
                .iter()
                .zip(cells)
                .filter_map(|(h, c)| cell_text(c).map(|text| (h.clone(), text))),
        );
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Text rendering of a cell; integral floats lose their fraction so that
/// phone numbers and serials read back as typed.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
        Data::Int(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
