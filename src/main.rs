mod args;
mod draw;

use clap::Parser;
use log::{debug, info, LevelFilter};
use snafu::ErrorCompat;

use std::path::PathBuf;

use crate::args::Args;
use crate::draw::{run_draw, DrawOptions};

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("args: {:?}", args);

    let opts = DrawOptions {
        input: PathBuf::from(&args.input),
        count: args.count,
        config: args.config.as_ref().map(PathBuf::from),
        seed: args.seed,
        save: !args.no_save,
        instant: args.instant,
        normalize_on_load: args.normalize_on_load,
    };

    match run_draw(&opts) {
        Ok(summary) => {
            info!(
                "Draw finished: {} winner(s), roster of {}",
                summary.winners.len(),
                summary.roster.len()
            );
        }
        Err(e) => {
            eprintln!("An error occured: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
