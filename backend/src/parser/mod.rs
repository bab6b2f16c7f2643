//! Spreadsheet readers.
//!
//! Turns a workbook (via `calamine`) or a CSV export (via `csv`, with
//! encoding and delimiter auto-detection) into a header row plus cells.
//! No procedure-specific logic here; see [`crate::loader`] for that.

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use serde::Serialize;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::error::{DataSourceError, DataSourceResult};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Float(v) => Cell::Number(*v),
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Bool(v) => Cell::Text(v.to_string()),
            Data::String(v) => Cell::Text(v.clone()),
            Data::DateTime(v) => Cell::Number(v.as_f64()),
            Data::DateTimeIso(v) => Cell::Text(v.clone()),
            Data::DurationIso(v) => Cell::Text(v.clone()),
            Data::Error(v) => Cell::Text(format!("{v:?}")),
        }
    }
}

/// Recognized source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Xlsx,
    Xlsm,
    Xls,
    Ods,
    Csv,
}

impl SourceFormat {
    /// Guess the format from a file name's extension.
    pub fn from_name(name: &str) -> DataSourceResult<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" => Ok(SourceFormat::Xlsx),
            "xlsm" => Ok(SourceFormat::Xlsm),
            "xls" => Ok(SourceFormat::Xls),
            "ods" => Ok(SourceFormat::Ods),
            "csv" | "tsv" | "txt" => Ok(SourceFormat::Csv),
            _ => Err(DataSourceError::UnsupportedFormat(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Xlsx => "xlsx",
            SourceFormat::Xlsm => "xlsm",
            SourceFormat::Xls => "xls",
            SourceFormat::Ods => "ods",
            SourceFormat::Csv => "csv",
        }
    }
}

/// Result of reading a source, with metadata
#[derive(Debug, Clone, Serialize)]
pub struct ParsedSheet {
    pub format: SourceFormat,
    /// Worksheet name (spreadsheets only)
    pub sheet: Option<String>,
    /// Detected encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only)
    pub delimiter: Option<char>,
    /// Header row
    pub headers: Vec<String>,
    /// Data rows, blank rows removed; each paired with its 1-based source row
    pub rows: Vec<(usize, Vec<Cell>)>,
}

/// Read a spreadsheet or CSV file from disk.
pub fn read_path(path: &Path, sheet: Option<&str>) -> DataSourceResult<ParsedSheet> {
    if !path.exists() {
        return Err(DataSourceError::NotFound(path.display().to_string()));
    }

    let name = path.to_string_lossy();
    match SourceFormat::from_name(&name)? {
        SourceFormat::Csv => {
            let bytes = std::fs::read(path)?;
            parse_csv_bytes(&bytes)
        }
        format => {
            let mut workbook = open_workbook_auto(path)?;
            let (sheet_name, range) = pick_sheet(&mut workbook, sheet)?;
            sheet_from_range(format, sheet_name, &range)
        }
    }
}

/// Read an uploaded source from memory.
pub fn read_bytes(
    bytes: &[u8],
    format: SourceFormat,
    sheet: Option<&str>,
) -> DataSourceResult<ParsedSheet> {
    match format {
        SourceFormat::Csv => parse_csv_bytes(bytes),
        format => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
            let (sheet_name, range) = pick_sheet(&mut workbook, sheet)?;
            sheet_from_range(format, sheet_name, &range)
        }
    }
}

fn pick_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet: Option<&str>,
) -> DataSourceResult<(String, Range<Data>)> {
    let name = match sheet {
        Some(s) => s.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| DataSourceError::EmptySource("workbook has no sheets".into()))?,
    };

    let range = workbook.worksheet_range(&name)?;
    Ok((name, range))
}

fn sheet_from_range(
    format: SourceFormat,
    sheet_name: String,
    range: &Range<Data>,
) -> DataSourceResult<ParsedSheet> {
    let mut rows = range.rows().enumerate();

    // First non-blank row is the header
    let (header_idx, header_row) = rows
        .by_ref()
        .find(|(_, r)| r.iter().any(|c| !Cell::from(c).is_empty()))
        .ok_or_else(|| DataSourceError::EmptySource(format!("sheet '{}' has no header row", sheet_name)))?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|c| match Cell::from(c) {
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        })
        .collect();

    // Ranges start at the first used cell, not necessarily A1
    let row_offset = range.start().map(|(r, _)| r as usize).unwrap_or(0);

    let data_rows = rows
        .filter(|(_, r)| r.iter().any(|c| !Cell::from(c).is_empty()))
        .map(|(i, r)| (row_offset + i + 1, r.iter().map(Cell::from).collect()))
        .collect();

    tracing::debug!(
        sheet = %sheet_name,
        header_row = row_offset + header_idx + 1,
        "read worksheet"
    );

    Ok(ParsedSheet {
        format,
        sheet: Some(sheet_name),
        encoding: None,
        delimiter: None,
        headers,
        rows: data_rows,
    })
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    // chardet guesses poorly on short accented samples
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> DataSourceResult<String> {
    // Excel CSV exports often start with a BOM
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| DataSourceError::Encoding(e.to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.into_owned())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_csv_bytes(bytes: &[u8]) -> DataSourceResult<ParsedSheet> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    let mut sheet = parse_csv_str(&content, delimiter)?;
    sheet.encoding = Some(encoding);
    Ok(sheet)
}

/// Parse CSV text with an explicit delimiter.
///
/// Every cell is kept as text; numeric coercion happens in the loader.
pub fn parse_csv_str(content: &str, delimiter: char) -> DataSourceResult<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let headers: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(|h| h.trim().to_string()).collect(),
        None => return Err(DataSourceError::EmptySource("CSV file is empty".into())),
    };

    if headers.iter().all(|h| h.is_empty()) {
        return Err(DataSourceError::EmptySource("no headers found".into()));
    }

    let mut rows = Vec::new();
    for (idx, record) in records.enumerate() {
        let record = record?;
        let cells: Vec<Cell> = record
            .iter()
            .map(|v| {
                if v.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(v.to_string())
                }
            })
            .collect();

        if cells.iter().all(Cell::is_empty) {
            continue;
        }

        // +1 for 0-index, +1 for header
        rows.push((idx + 2, cells));
    }

    Ok(ParsedSheet {
        format: SourceFormat::Csv,
        sheet: None,
        encoding: None,
        delimiter: Some(delimiter),
        headers,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_simple_csv() {
        let sheet = parse_csv_str("Procedimento;Valor\nFacial;300\nCorporal;450", ';').unwrap();

        assert_eq!(sheet.headers, vec!["Procedimento", "Valor"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0], (2, vec![text("Facial"), text("300")]));
        assert_eq!(sheet.rows[1].1[1], text("450"));
    }

    #[test]
    fn test_quoted_values_keep_delimiter() {
        let sheet = parse_csv_str("a,b\n\"Peel, químico\",\"1.200,50\"", ',').unwrap();

        assert_eq!(sheet.rows[0].1[0], text("Peel, químico"));
        assert_eq!(sheet.rows[0].1[1], text("1.200,50"));
    }

    #[test]
    fn test_blank_lines_skipped_row_numbers_kept() {
        let sheet = parse_csv_str("a;b\n1;2\n;\n3;4\n", ';').unwrap();

        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].0, 4);
    }

    #[test]
    fn test_missing_values_are_empty() {
        let sheet = parse_csv_str("a;b;c\n1;;3", ';').unwrap();

        assert_eq!(sheet.rows[0].1[1], Cell::Empty);
        assert_eq!(sheet.rows[0].1[2], text("3"));
    }

    #[test]
    fn test_empty_csv_error() {
        let result = parse_csv_str("", ';');
        assert!(matches!(result, Err(DataSourceError::EmptySource(_))));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_auto_parse_strips_bom() {
        let bytes = b"\xEF\xBB\xBFProcedimento,Valor\nFacial,300";
        let sheet = parse_csv_bytes(bytes).unwrap();

        assert_eq!(sheet.delimiter, Some(','));
        assert_eq!(sheet.headers[0], "Procedimento");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Sessões" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x65, 0x73, 0x73, 0xF5, 0x65, 0x73];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Sessões");
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(SourceFormat::from_name("Clinica.XLSX").unwrap(), SourceFormat::Xlsx);
        assert_eq!(SourceFormat::from_name("export.csv").unwrap(), SourceFormat::Csv);
        assert!(matches!(
            SourceFormat::from_name("notes.pdf"),
            Err(DataSourceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = read_path(Path::new("/nonexistent/Clinica_Prospct.xlsx"), None);
        assert!(matches!(result, Err(DataSourceError::NotFound(_))));
    }

    #[test]
    fn test_workbook_cells_coerced() {
        assert_eq!(Cell::from(&Data::Int(42)), Cell::Number(42.0));
        assert_eq!(Cell::from(&Data::Float(0.35)), Cell::Number(0.35));
        assert_eq!(Cell::from(&Data::String("Peel".into())), Cell::Text("Peel".into()));
        assert_eq!(Cell::from(&Data::Empty), Cell::Empty);
        assert!(Cell::from(&Data::String("  ".into())).is_empty());
    }

    #[test]
    fn test_range_header_and_row_numbers() {
        // Used area starts at B3: header on sheet row 3, data on rows 4 and 6
        let mut range: Range<Data> = Range::new((2, 1), (5, 2));
        range.set_value((2, 1), Data::String("Procedimento".into()));
        range.set_value((2, 2), Data::String(" Valor ".into()));
        range.set_value((3, 1), Data::String("Facial".into()));
        range.set_value((3, 2), Data::Int(300));
        range.set_value((5, 1), Data::String("Corporal".into()));
        range.set_value((5, 2), Data::Float(200.5));

        let sheet = sheet_from_range(SourceFormat::Xlsx, "Precos".into(), &range).unwrap();

        assert_eq!(sheet.headers, vec!["Procedimento", "Valor"]);
        assert_eq!(sheet.sheet.as_deref(), Some("Precos"));
        let rows: Vec<usize> = sheet.rows.iter().map(|(r, _)| *r).collect();
        assert_eq!(rows, vec![4, 6]);
        assert_eq!(sheet.rows[0].1[1], Cell::Number(300.0));
        assert_eq!(sheet.rows[1].1[1], Cell::Number(200.5));
    }

    #[test]
    fn test_blank_range_is_empty_source() {
        let range: Range<Data> = Range::new((0, 0), (1, 1));
        assert!(matches!(
            sheet_from_range(SourceFormat::Xlsx, "Vazia".into(), &range),
            Err(DataSourceError::EmptySource(_))
        ));
    }

    #[test]
    fn test_garbage_workbook_is_spreadsheet_error() {
        let result = read_bytes(b"not a zip archive", SourceFormat::Xlsx, None);
        assert!(matches!(result, Err(DataSourceError::Spreadsheet(_))));
    }
}
