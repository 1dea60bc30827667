// Primitives for reading and writing CSV rosters.

use std::fs;
use std::io::Write;
use std::path::Path;

use fair_draw::builder::RosterBuilder;

use crate::draw::{io_common::parse_counter, *};

const BOM: &str = "\u{feff}";

/// Semicolons win ties: spreadsheets in many locales export with `;`.
fn detect_delimiter(header: &str) -> u8 {
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons >= commas {
        b';'
    } else {
        b','
    }
}

pub fn read_csv_roster(path: &Path) -> DrawResult<Roster> {
    let p = path.display().to_string();
    let bytes = fs::read(path).context(OpeningCsvSnafu { path: p.clone() })?;
    let raw = String::from_utf8(bytes).context(CsvEncodingSnafu { path: p.clone() })?;
    let contents = raw.strip_prefix(BOM).unwrap_or(&raw);

    let header = contents.lines().next().unwrap_or("");
    debug!("read_csv_roster: header: {:?}", header);
    ensure!(
        !header.trim().is_empty(),
        MissingNameColumnSnafu { path: p.clone() }
    );
    let delimiter = detect_delimiter(header);

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());

    let mut builder = RosterBuilder::new();
    for (idx, record_r) in rdr.records().enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let record = record_r.context(CsvParseSnafu {
            path: p.clone(),
            lineno,
        })?;
        let name = record.get(0).unwrap_or("");
        let counter = record.get(1).map(parse_counter).unwrap_or(0);
        if !builder.add(name, counter) {
            debug!("read_csv_roster: line {}: skipping name {:?}", lineno, name);
        }
    }
    if builder.skipped() > 0 {
        info!("{}: skipped {} row(s) without a name", p, builder.skipped());
    }
    builder.build().ok().context(EmptyRosterSnafu { path: p })
}

/// Writes the roster as UTF-8 with a BOM, `;`-separated, CRLF line endings.
pub fn write_csv_roster<W: Write>(roster: &Roster, w: &mut W) -> std::io::Result<()> {
    w.write_all(BOM.as_bytes())?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::CRLF)
        .from_writer(w);
    wtr.write_record(["Name", "Counter"])?;
    for p in roster.participants() {
        wtr.write_record([p.name.as_str(), p.counter.to_string().as_str()])?;
    }
    wtr.flush()
}
