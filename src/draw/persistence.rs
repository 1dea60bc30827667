use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::draw::{
    io_common::RosterFormat, io_csv::write_csv_roster, io_excel::write_excel_roster, *,
};

/// Writes `destination` through a temporary file in the same directory, then renames it
/// over the destination.
///
/// If `write` fails, or the rename fails, the temporary file is deleted and the
/// destination keeps its previous content.
pub fn write_atomically<F>(destination: &Path, write: F) -> DrawResult<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let p = destination.display().to_string();
    let dir = match destination.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).context(WritingFileSnafu { path: p.clone() })?;
    debug!("write_atomically: staging {} in {:?}", p, tmp.path());
    write(tmp.as_file_mut()).context(WritingFileSnafu { path: p.clone() })?;
    tmp.as_file_mut()
        .sync_all()
        .context(WritingFileSnafu { path: p.clone() })?;
    tmp.persist(destination)
        .context(PersistTempSnafu { path: p })?;
    Ok(())
}

/// Saves the roster in the format given by the destination's extension.
pub fn save_roster(roster: &Roster, destination: &Path) -> DrawResult<()> {
    match RosterFormat::from_path(destination)? {
        RosterFormat::Csv => write_atomically(destination, |f| write_csv_roster(roster, f))?,
        RosterFormat::Excel => {
            let bytes = write_excel_roster(roster).context(WritingExcelSnafu {})?;
            write_atomically(destination, |f| f.write_all(&bytes))?
        }
    }
    info!(
        "Saved {} participant(s) to {}",
        roster.len(),
        destination.display()
    );
    Ok(())
}

/// Saves completed rounds back to the file the roster was loaded from.
#[derive(Debug, Clone)]
pub struct FileSink {
    destination: PathBuf,
}

impl FileSink {
    pub fn new(destination: &Path) -> FileSink {
        FileSink {
            destination: destination.to_path_buf(),
        }
    }
}

impl RosterSink for FileSink {
    fn save(&mut self, roster: &Roster) -> Result<(), Box<dyn std::error::Error>> {
        save_roster(roster, &self.destination)?;
        Ok(())
    }
}
