//! Loading real `.xlsx` workbooks written with rust_xlsxwriter.

use std::path::{Path, PathBuf};

use clinica::{
    load_table, load_table_from_bytes, DataSourceError, LoaderOptions, MissingValuePolicy,
};
use rust_xlsxwriter::{Workbook, XlsxError};

const HEADERS: [&str; 9] = [
    "Procedimento",
    "Produto / Ativo",
    "Valor_Cobrado p/ Sessões à Vista_Cash",
    "Margem de Lucro  (Tatuapé / Paulista)",
    "Margem de Lucro  (Perdizes)",
    "Margem %  (Tatuapé / Paulista)",
    "Margem %  (Perdizes)",
    "Custo_Unit_Sessões (Tatuapé / Paulista)",
    "Custo_Unit_Sessões (Perdizes)",
];

/// Header on sheet row 3; rows 1 and 2 are left blank.
const HEADER_ROW: u32 = 2;

enum Value {
    Text(&'static str),
    Number(f64),
    Blank,
}

use Value::{Blank, Number, Text};

/// Writes a cover sheet "Resumo" first, then the price table on "Precos".
fn write_workbook(dir: &Path, rows: &[[Value; 9]]) -> Result<PathBuf, XlsxError> {
    let mut workbook = Workbook::new();

    let cover = workbook.add_worksheet();
    cover.set_name("Resumo")?;
    cover.write_string(0, 0, "Tabela de preços por unidade")?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("Precos")?;
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string(HEADER_ROW, col as u16, *header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = HEADER_ROW + 1 + i as u32;
        for (col, value) in row.iter().enumerate() {
            match value {
                Text(s) => {
                    sheet.write_string(r, col as u16, *s)?;
                }
                Number(n) => {
                    sheet.write_number(r, col as u16, *n)?;
                }
                Blank => {}
            }
        }
    }

    let path = dir.join("Clinica_Prospct.xlsx");
    workbook.save(&path)?;
    Ok(path)
}

fn precos() -> LoaderOptions {
    LoaderOptions {
        sheet: Some("Precos".to_string()),
        ..LoaderOptions::default()
    }
}

fn scenario_rows() -> Vec<[Value; 9]> {
    vec![
        [
            Text("Facial"),
            Text("Peel"),
            Number(300.0),
            Number(100.0),
            Number(120.0),
            Number(0.3),
            Number(0.35),
            Number(50.0),
            Number(60.0),
        ],
        [
            Text("Corporal"),
            Text("Massagem"),
            Text("R$ 1.500"),
            Number(80.0),
            Number(90.0),
            Text("40%"),
            Number(0.45),
            Number(30.0),
            Number(35.0),
        ],
    ]
}

#[test]
fn loads_named_sheet_with_numeric_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &scenario_rows()).unwrap();

    let table = load_table(&path, &precos()).unwrap();

    assert_eq!(table.source.format, "xlsx");
    assert_eq!(table.source.sheet.as_deref(), Some("Precos"));
    assert_eq!(table.source.headers.len(), 9);
    assert_eq!(table.len(), 2);

    let peel = &table.records()[0];
    assert_eq!(peel.procedure, "Facial");
    assert_eq!(peel.charged_value, 300.0);
    assert!((peel.avg_margin - 110.0).abs() < 1e-9);
    assert!((peel.avg_margin_pct - 32.5).abs() < 1e-9);
    assert!((peel.avg_unit_cost - 55.0).abs() < 1e-9);

    let massagem = &table.records()[1];
    assert_eq!(massagem.charged_value, 1500.0);
    assert!((massagem.avg_margin_pct - 42.5).abs() < 1e-9);
}

#[test]
fn uploaded_workbook_bytes_load_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &scenario_rows()).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let from_disk = load_table(&path, &precos()).unwrap();
    let uploaded = load_table_from_bytes(&bytes, "precos.xlsx", &precos()).unwrap();

    assert_eq!(uploaded.records(), from_disk.records());
    assert_eq!(uploaded.source.name, "precos.xlsx");
}

#[test]
fn first_sheet_is_used_without_a_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &scenario_rows()).unwrap();

    // "Resumo" has no price columns
    let err = load_table(&path, &LoaderOptions::default()).unwrap_err();
    assert!(matches!(err, DataSourceError::MissingColumn(ref c) if c == "Procedimento"));
}

#[test]
fn unknown_sheet_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &scenario_rows()).unwrap();

    let options = LoaderOptions {
        sheet: Some("Planilha9".to_string()),
        ..LoaderOptions::default()
    };
    assert!(matches!(
        load_table(&path, &options),
        Err(DataSourceError::Spreadsheet(_))
    ));
}

#[test]
fn row_numbers_follow_the_sheet() {
    let mut rows = scenario_rows();
    rows[1][4] = Blank;

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &rows).unwrap();

    // Header on sheet row 3, so the second data row is sheet row 5
    let err = load_table(&path, &precos()).unwrap_err();
    match err {
        DataSourceError::MissingValue { row, column } => {
            assert_eq!(row, 5);
            assert_eq!(column, "margin_location_b");
        }
        other => panic!("unexpected error: {other}"),
    }

    let options = LoaderOptions {
        missing_values: MissingValuePolicy::SkipMissing,
        ..precos()
    };
    let table = load_table(&path, &options).unwrap();
    let massagem = &table.records()[1];
    assert_eq!(massagem.margin_location_b, None);
    assert_eq!(massagem.avg_margin, 80.0);
}
