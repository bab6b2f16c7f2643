//! Record Loader: spreadsheet rows to a metric-augmented [`ProcedureTable`].
//!
//! The loader resolves the configured column headers, coerces cells to
//! labels and numbers, and hands the raw rows to the metric calculator.
//! Any missing column or unreadable cell is a [`DataSourceError`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::api::logs::{log_info, log_success};
use crate::config::{ColumnMap, LoaderOptions};
use crate::error::{DataSourceError, DataSourceResult};
use crate::models::{ProcedureTable, RawRecord, SourceInfo};
use crate::parser::{self, Cell, ParsedSheet, SourceFormat};
use crate::transform::metrics::derive_metrics;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static EMPTY_CELL: Cell = Cell::Empty;

/// Load and augment the table stored at `path`.
pub fn load_table(path: &Path, options: &LoaderOptions) -> DataSourceResult<ProcedureTable> {
    log_info(format!("Reading {}", path.display()));
    let sheet = parser::read_path(path, options.sheet.as_deref())?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("source")
        .to_string();
    table_from_sheet(sheet, name, options)
}

/// Load and augment an uploaded table. The format comes from `name`'s extension.
pub fn load_table_from_bytes(
    bytes: &[u8],
    name: &str,
    options: &LoaderOptions,
) -> DataSourceResult<ProcedureTable> {
    log_info(format!("Reading upload {} ({} bytes)", name, bytes.len()));
    let format = SourceFormat::from_name(name)?;
    let sheet = parser::read_bytes(bytes, format, options.sheet.as_deref())?;
    table_from_sheet(sheet, name.to_string(), options)
}

/// Turn a parsed sheet into a procedure table.
pub fn table_from_sheet(
    sheet: ParsedSheet,
    name: String,
    options: &LoaderOptions,
) -> DataSourceResult<ProcedureTable> {
    if let Some(enc) = &sheet.encoding {
        log_success(format!("Detected encoding: {}", enc));
    }
    if let Some(ws) = &sheet.sheet {
        log_success(format!("Worksheet: {}", ws));
    }

    let columns = ColumnIndex::resolve(&sheet.headers, &options.columns)?;
    let raw = raw_records(&sheet, &columns, &options.columns)?;
    let rows_read = raw.len();

    let records = derive_metrics(&raw, options.missing_values)?;
    log_success(format!("Loaded {} procedure rows", records.len()));

    let source = SourceInfo {
        name,
        format: sheet.format.as_str().to_string(),
        sheet: sheet.sheet,
        headers: sheet.headers,
        rows_read,
        rows_dropped: rows_read - records.len(),
    };

    Ok(ProcedureTable::new(source, records))
}

/// Normalize a header for matching: trim, collapse whitespace, lowercase.
pub fn normalize_header(header: &str) -> String {
    WHITESPACE.replace_all(header.trim(), " ").to_lowercase()
}

/// Position of each required column in the header row.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnIndex {
    procedure: usize,
    product: usize,
    charged_value: usize,
    margin_location_a: usize,
    margin_location_b: usize,
    margin_pct_location_a: usize,
    margin_pct_location_b: usize,
    unit_cost_location_a: usize,
    unit_cost_location_b: usize,
}

impl ColumnIndex {
    fn resolve(headers: &[String], map: &ColumnMap) -> DataSourceResult<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

        let find = |wanted: &str| -> DataSourceResult<usize> {
            let key = normalize_header(wanted);
            normalized
                .iter()
                .position(|h| *h == key)
                .ok_or_else(|| DataSourceError::MissingColumn(wanted.to_string()))
        };

        Ok(Self {
            procedure: find(&map.procedure)?,
            product: find(&map.product)?,
            charged_value: find(&map.charged_value)?,
            margin_location_a: find(&map.margin_location_a)?,
            margin_location_b: find(&map.margin_location_b)?,
            margin_pct_location_a: find(&map.margin_pct_location_a)?,
            margin_pct_location_b: find(&map.margin_pct_location_b)?,
            unit_cost_location_a: find(&map.unit_cost_location_a)?,
            unit_cost_location_b: find(&map.unit_cost_location_b)?,
        })
    }
}

fn raw_records(
    sheet: &ParsedSheet,
    idx: &ColumnIndex,
    map: &ColumnMap,
) -> DataSourceResult<Vec<RawRecord>> {
    let mut records = Vec::with_capacity(sheet.rows.len());

    for (row, cells) in &sheet.rows {
        let row = *row;
        let cell = |i: usize| cells.get(i).unwrap_or(&EMPTY_CELL);
        let number = |i: usize, column: &str| parse_number(cell(i), row, column);

        records.push(RawRecord {
            row,
            procedure: parse_label(cell(idx.procedure)),
            product: parse_label(cell(idx.product)),
            charged_value: number(idx.charged_value, &map.charged_value)?,
            margin_location_a: number(idx.margin_location_a, &map.margin_location_a)?,
            margin_location_b: number(idx.margin_location_b, &map.margin_location_b)?,
            margin_pct_location_a: number(idx.margin_pct_location_a, &map.margin_pct_location_a)?,
            margin_pct_location_b: number(idx.margin_pct_location_b, &map.margin_pct_location_b)?,
            unit_cost_location_a: number(idx.unit_cost_location_a, &map.unit_cost_location_a)?,
            unit_cost_location_b: number(idx.unit_cost_location_b, &map.unit_cost_location_b)?,
        });
    }

    Ok(records)
}

/// Read a label cell. Blank cells are `None`.
pub fn parse_label(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(s) => {
            let trimmed = WHITESPACE.replace_all(s.trim(), " ");
            (!trimmed.is_empty()).then(|| trimmed.into_owned())
        }
        Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        Cell::Number(n) => Some(n.to_string()),
    }
}

/// Read a numeric cell. Blank cells are `None`.
///
/// Text cells may carry a `R$` prefix, a `%` suffix (the value is divided
/// by 100), accounting parentheses for negatives, and either `1.234,56`
/// or `1,234.56` grouping. A lone comma is a decimal comma. A lone dot
/// followed by exactly three digits groups thousands (`1.500` is 1500)
/// unless the integer part is zero (`0.125` stays a fraction).
pub fn parse_number(cell: &Cell, row: usize, column: &str) -> DataSourceResult<Option<f64>> {
    let text = match cell {
        Cell::Empty => return Ok(None),
        Cell::Number(n) if n.is_finite() => return Ok(Some(*n)),
        Cell::Number(n) => n.to_string(),
        Cell::Text(s) => s.clone(),
    };

    let invalid = || DataSourceError::InvalidNumber {
        row,
        column: column.to_string(),
        value: text.clone(),
    };

    let mut s: String = text
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if s.is_empty() || s == "-" {
        return Ok(None);
    }

    let negative = s.starts_with('(') && s.ends_with(')');
    if negative {
        s = s[1..s.len() - 1].to_string();
    }

    let percent = s.ends_with('%');
    if percent {
        s.pop();
    }

    let s = normalize_separators(&s);
    let mut value: f64 = s.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }

    if percent {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }
    Ok(Some(value))
}

/// Rewrite grouping and decimal separators to plain `1234.56`.
fn normalize_separators(s: &str) -> String {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    match (last_dot, last_comma) {
        // Both present: the later one is the decimal separator
        (Some(d), Some(c)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if commas == 1 => s.replace(',', "."),
        (None, Some(_)) => s.replace(',', ""),
        (Some(_), None) if dots > 1 => s.replace('.', ""),
        (Some(d), None) if is_thousands_dot(s, d) => s.replace('.', ""),
        _ => s.to_string(),
    }
}

/// `1.500`, `-12.000`: three digits after the only dot, non-zero integer part.
fn is_thousands_dot(s: &str, dot: usize) -> bool {
    let (int_part, frac_part) = (&s[..dot], &s[dot + 1..]);
    let digits = int_part.trim_start_matches(['-', '+']);

    frac_part.len() == 3
        && frac_part.chars().all(|c| c.is_ascii_digit())
        && (1..=3).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.trim_start_matches('0').is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingValuePolicy;
    use std::io::Write;

    const HEADER: &str = "Procedimento;Produto / Ativo;Valor_Cobrado p/ Sessões à Vista_Cash;\
Margem de Lucro  (Tatuapé / Paulista);Margem de Lucro  (Perdizes);\
Margem %  (Tatuapé / Paulista);Margem %  (Perdizes);\
Custo_Unit_Sessões (Tatuapé / Paulista);Custo_Unit_Sessões (Perdizes)";

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn csv_table(body: &str, options: &LoaderOptions) -> DataSourceResult<ProcedureTable> {
        let sheet = parser::parse_csv_str(&format!("{}\n{}", HEADER, body), ';').unwrap();
        table_from_sheet(sheet, "test.csv".into(), options)
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(
            normalize_header("  Margem de Lucro  (Perdizes) "),
            "margem de lucro (perdizes)"
        );
        assert_eq!(normalize_header("Margem %\t(Perdizes)"), "margem % (perdizes)");
    }

    #[test]
    fn test_parse_number_formats() {
        let n = |s: &str| parse_number(&text(s), 2, "col").unwrap();

        assert_eq!(n("300"), Some(300.0));
        assert_eq!(n("R$ 1.234,56"), Some(1234.56));
        assert_eq!(n("1,234.56"), Some(1234.56));
        assert_eq!(n("0,35"), Some(0.35));
        assert_eq!(n("35%"), Some(0.35));
        assert_eq!(n("-120"), Some(-120.0));
        assert_eq!(n("(120)"), Some(-120.0));
        assert_eq!(n("1.000.000"), Some(1_000_000.0));
        assert_eq!(n("12.5"), Some(12.5));
        assert_eq!(n("   "), None);
        assert_eq!(parse_number(&Cell::Number(42.5), 2, "col").unwrap(), Some(42.5));
        assert_eq!(parse_number(&Cell::Empty, 2, "col").unwrap(), None);
    }

    #[test]
    fn test_lone_dot_grouping_agrees_with_comma_decimals() {
        let n = |s: &str| parse_number(&text(s), 2, "col").unwrap();

        assert_eq!(n("R$ 1.500"), Some(1500.0));
        assert_eq!(n("1.250"), n("1.250,00"));
        assert_eq!(n("-12.000"), Some(-12_000.0));
        assert_eq!(n("(1.500)"), Some(-1500.0));
        assert_eq!(n("0.125"), Some(0.125));
        assert_eq!(n("1234.567"), Some(1234.567));
        assert_eq!(n("1.25"), Some(1.25));
    }

    #[test]
    fn test_parse_number_rejects_text() {
        let err = parse_number(&text("sob consulta"), 5, "Valor").unwrap_err();
        match err {
            DataSourceError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 5);
                assert_eq!(column, "Valor");
                assert_eq!(value, "sob consulta");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label(&text("  Peel   químico ")), Some("Peel químico".into()));
        assert_eq!(parse_label(&Cell::Number(3.0)), Some("3".into()));
        assert_eq!(parse_label(&text("")), None);
    }

    #[test]
    fn test_load_scenario_row() {
        let table = csv_table(
            "Facial;Peel;300;100;120;0,3;0,35;50;60",
            &LoaderOptions::default(),
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        let r = &table.records()[0];
        assert_eq!(r.procedure, "Facial");
        assert_eq!(r.product, "Peel");
        assert!((r.avg_margin - 110.0).abs() < 1e-9);
        assert!((r.avg_margin_pct - 32.5).abs() < 1e-9);
        assert!((r.avg_unit_cost - 55.0).abs() < 1e-9);
        assert_eq!(table.source.format, "csv");
        assert_eq!(table.source.rows_dropped, 0);
    }

    #[test]
    fn test_headers_matched_loosely() {
        let header = HEADER.replace("Margem de Lucro  (Perdizes)", "margem de lucro (PERDIZES)");
        let sheet = parser::parse_csv_str(
            &format!("{}\nFacial;Peel;300;100;120;0,3;0,35;50;60", header),
            ';',
        )
        .unwrap();

        let table = table_from_sheet(sheet, "x.csv".into(), &LoaderOptions::default()).unwrap();
        assert_eq!(table.records()[0].margin_location_b, Some(120.0));
    }

    #[test]
    fn test_missing_column() {
        let sheet = parser::parse_csv_str("Procedimento;Produto / Ativo\nFacial;Peel", ';').unwrap();
        let err = table_from_sheet(sheet, "x.csv".into(), &LoaderOptions::default()).unwrap_err();

        assert!(matches!(
            err,
            DataSourceError::MissingColumn(ref c) if c == "Valor_Cobrado p/ Sessões à Vista_Cash"
        ));
    }

    #[test]
    fn test_blank_cell_rejected_by_default() {
        let err = csv_table("Facial;Peel;300;;120;0,3;0,35;50;60", &LoaderOptions::default())
            .unwrap_err();

        assert!(matches!(err, DataSourceError::MissingValue { row: 2, .. }));
    }

    #[test]
    fn test_drop_row_policy_counts_dropped() {
        let options = LoaderOptions {
            missing_values: MissingValuePolicy::DropRow,
            ..LoaderOptions::default()
        };
        let table = csv_table(
            "Facial;Peel;300;;120;0,3;0,35;50;60\nCorporal;Massagem;200;80;90;0,4;0,45;30;35",
            &options,
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].procedure, "Corporal");
        assert_eq!(table.source.rows_read, 2);
        assert_eq!(table.source.rows_dropped, 1);
    }

    #[test]
    fn test_load_table_from_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        writeln!(file, "Facial;Peel;300;100;120;0,3;0,35;50;60").unwrap();

        let table = load_table(file.path(), &LoaderOptions::default()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.source.headers.len(), 9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_table(Path::new("/nonexistent/precos.xlsx"), &LoaderOptions::default())
            .unwrap_err();
        assert!(matches!(err, DataSourceError::NotFound(_)));
    }

    #[test]
    fn test_load_from_bytes_requires_known_extension() {
        let err = load_table_from_bytes(b"a;b", "precos.pdf", &LoaderOptions::default())
            .unwrap_err();
        assert!(matches!(err, DataSourceError::UnsupportedFormat(_)));
    }
}
