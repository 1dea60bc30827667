use log::{debug, info, warn};

use fair_draw::*;
use snafu::{prelude::*, Snafu};

use rand::rngs::StdRng;
use rand::SeedableRng;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::draw::config_reader::*;
use crate::draw::io_common::RosterFormat;
use crate::draw::persistence::FileSink;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
pub mod persistence;

#[derive(Debug, Snafu)]
pub enum DrawError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The workbook {path} has no worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("No name column found in {path}"))]
    MissingNameColumn { path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningCsv {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{path} is not UTF-8 encoded, save it as UTF-8 CSV"))]
    CsvEncoding {
        source: std::string::FromUtf8Error,
        path: String,
    },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("The file {path} contains no valid names"))]
    EmptyRoster { path: String },
    #[snafu(display("Unsupported roster file {path}: expected a .csv or .xlsx file"))]
    UnsupportedFormat { path: String },
    #[snafu(display("Error building the workbook"))]
    WritingExcel { source: rust_xlsxwriter::XlsxError },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error replacing {path}"))]
    PersistTemp {
        source: tempfile::PersistError,
        path: String,
    },
    #[snafu(display("Error opening settings file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing settings file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid value for setting {name}: {value}"))]
    InvalidSetting { name: String, value: f64 },
    #[snafu(display("{source}"))]
    Engine { source: DrawErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DrawResult<T> = Result<T, DrawError>;

/// Loads a roster, picking the reader from the file extension.
pub fn load_roster(path: &Path) -> DrawResult<Roster> {
    let roster = match RosterFormat::from_path(path)? {
        RosterFormat::Csv => io_csv::read_csv_roster(path)?,
        RosterFormat::Excel => io_excel::read_excel_roster(path)?,
    };
    info!(
        "Loaded {} participant(s) from {}",
        roster.len(),
        path.display()
    );
    Ok(roster)
}

/// What to draw and how, as given on the command line.
#[derive(Debug, Clone)]
pub struct DrawOptions {
    pub input: PathBuf,
    pub count: usize,
    pub config: Option<PathBuf>,
    pub seed: Option<u64>,
    pub save: bool,
    /// Play the animation without waiting in real time.
    pub instant: bool,
    pub normalize_on_load: bool,
}

/// The outcome of a completed round.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DrawSummary {
    pub winners: Vec<String>,
    pub roster: Roster,
}

pub fn run_draw(opts: &DrawOptions) -> DrawResult<DrawSummary> {
    let mut roster = load_roster(&opts.input)?;
    if opts.normalize_on_load {
        let m = normalize(&mut roster);
        debug!("run_draw: normalized loaded counters by {}", m);
    }

    let spin = match &opts.config {
        Some(p) => validate_spin_settings(&read_spin_settings(p)?)?,
        None => SpinConfig::DEFAULT,
    };

    let count = if opts.count > roster.len() {
        warn!(
            "Requested {} winner(s) but the roster only has {}; drawing {}",
            opts.count,
            roster.len(),
            roster.len()
        );
        roster.len()
    } else {
        opts.count
    };

    let rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut machine = DrawMachine::new(roster, spin, rng);
    if opts.save {
        machine = machine.with_sink(Box::new(FileSink::new(&opts.input)));
    }

    machine
        .start_round(DrawRequest::new(count))
        .context(EngineSnafu {})?;

    let started = Instant::now();
    let mut winners: Vec<String> = Vec::new();
    let mut save_failure: Option<String> = None;
    let mut aborted: Option<DrawErrors> = None;
    loop {
        for event in machine.drain_events() {
            render_event(&event, machine.roster());
            match event {
                DrawEvent::RoundCompleted { winners: ws } => {
                    winners = ws.into_iter().map(|(_, name)| name).collect();
                }
                DrawEvent::SaveFailed { message } => save_failure = Some(message),
                DrawEvent::RoundAborted { reason } => aborted = Some(reason),
                _ => {}
            }
        }
        if !machine.is_active() {
            break;
        }
        let due = match machine.next_due() {
            Some(d) => d,
            None => break,
        };
        if !opts.instant {
            let target = Duration::from_millis(due);
            let elapsed = started.elapsed();
            if target > elapsed {
                thread::sleep(target - elapsed);
            }
        }
        machine.advance_to(due);
    }

    if let Some(reason) = aborted {
        return Err(DrawError::Engine { source: reason });
    }
    if let Some(message) = save_failure {
        whatever!(
            "The draw completed but {} could not be saved: {}",
            opts.input.display(),
            message
        )
    }
    Ok(DrawSummary {
        winners,
        roster: machine.roster().clone(),
    })
}

fn render_event(event: &DrawEvent, roster: &Roster) {
    let name = |id: &ParticipantId| roster.name(*id).unwrap_or("?").to_string();
    let width = roster
        .participants()
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(0)
        + 8;
    match event {
        DrawEvent::RoundStarted { picks_total } => {
            println!("Drawing {} of {} ...", picks_total, roster.len());
        }
        DrawEvent::Scan { id } => {
            print!("\r  > {:<width$}", name(id), width = width);
        }
        DrawEvent::Reveal { id, highlighted } => {
            let shown = if *highlighted {
                format!("*** {} ***", name(id))
            } else {
                String::new()
            };
            print!("\r  {:<width$}", shown, width = width + 2);
        }
        DrawEvent::PickCommitted {
            name: winner,
            picks_done,
            picks_total,
            ..
        } => {
            println!(
                "\r{:<width$}",
                format!("Pick {}/{}: {}", picks_done, picks_total, winner),
                width = width + 4
            );
        }
        DrawEvent::RoundCompleted { winners } => {
            let names: Vec<&str> = winners.iter().map(|(_, n)| n.as_str()).collect();
            println!("Winners: {}", names.join(", "));
            for p in roster.participants() {
                println!("  {:<width$} {}", p.name, p.counter, width = width);
            }
        }
        DrawEvent::RoundCancelled { picks_done } => {
            println!("\rDraw cancelled after {} pick(s)", picks_done);
        }
        DrawEvent::RoundAborted { reason } => {
            println!("\rDraw aborted: {}", reason);
        }
        DrawEvent::SaveFailed { message } => {
            println!("Could not save the roster: {}", message);
        }
        DrawEvent::PickStarted { .. } | DrawEvent::Saved | DrawEvent::HighlightsCleared => {}
    }
    let _ = std::io::stdout().flush();
}
