use calamine::{open_workbook, DataType, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, XlsxError};

use std::path::Path;

use fair_draw::builder::RosterBuilder;

use crate::draw::{
    io_common::{counter_from_float, parse_counter},
    *,
};

/// Reads names from column A and counters from column B of the first worksheet.
/// Row 1 is a header.
pub fn read_excel_roster(path: &Path) -> DrawResult<Roster> {
    let p = path.display().to_string();
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path: p.clone() })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu { path: p.clone() })?
        .context(OpeningExcelSnafu { path: p.clone() })?;

    // The range starts at the first non-empty cell, not at A1.
    let (first_row, first_col) = wrange
        .start()
        .context(MissingNameColumnSnafu { path: p.clone() })?;
    debug!(
        "read_excel_roster: cells from {:?} to {:?}",
        wrange.start(),
        wrange.end()
    );
    ensure!(first_col == 0, MissingNameColumnSnafu { path: p.clone() });

    let mut builder = RosterBuilder::new();
    for (idx, row) in wrange.rows().enumerate() {
        let sheet_row = first_row as usize + idx;
        if sheet_row == 0 {
            debug!("read_excel_roster: header: {:?}", row);
            continue;
        }
        let name = row.first().and_then(cell_name).unwrap_or_default();
        let counter = row.get(1).map(cell_counter).unwrap_or(0);
        if !builder.add(&name, counter) {
            debug!("read_excel_roster: row {}: skipping {:?}", sheet_row + 1, row);
        }
    }
    if builder.skipped() > 0 {
        info!("{}: skipped {} row(s) without a name", p, builder.skipped());
    }
    builder.build().ok().context(EmptyRosterSnafu { path: p })
}

// Missing and error cells have no name.
fn cell_name(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) => Some(s.clone()),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Float(f) => Some(f.to_string()),
        DataType::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cell_counter(cell: &DataType) -> u32 {
    match cell {
        DataType::Int(i) => counter_from_float(*i as f64),
        DataType::Float(f) => counter_from_float(*f),
        DataType::String(s) => parse_counter(s),
        _ => 0,
    }
}

/// Serializes the roster as a single-sheet workbook.
pub fn write_excel_roster(roster: &Roster) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, "Name")?;
    worksheet.write_string(0, 1, "Counter")?;
    for (idx, p) in roster.participants().iter().enumerate() {
        let row = (idx + 1) as u32;
        worksheet.write_string(row, 0, p.name.as_str())?;
        worksheet.write_number(row, 1, p.counter as f64)?;
    }
    workbook.save_to_buffer()
}
