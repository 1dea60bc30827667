use clap::Parser;

/// Draws winners from a roster so that, over many draws, everybody wins equally often.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The roster, either a .csv or a .xlsx file. The first column holds the names,
    /// the optional second column the win counters. The first row is a header.
    /// The updated counters are written back to this file after the draw.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (default 1) How many winners to draw. Values larger than the roster are reduced to the
    /// roster size.
    #[clap(short = 'n', long, value_parser, default_value_t = 1)]
    pub count: usize,

    /// (file path, optional) A JSON file with the spin settings (fastDelayMs, slowDelayMs,
    /// growthFactor, fastRounds, rolloutFactor, blinkCount, blinkDelayMs).
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (integer, optional) Seed for the random generator, to replay a draw.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    /// If passed as an argument, the roster file is not updated.
    #[clap(long, takes_value = false)]
    pub no_save: bool,

    /// If passed as an argument, the animation is skipped.
    #[clap(long, takes_value = false)]
    pub instant: bool,

    /// If passed as an argument, the loaded counters are shifted so that the lowest one is 0
    /// before the draw starts.
    #[clap(long, takes_value = false)]
    pub normalize_on_load: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
