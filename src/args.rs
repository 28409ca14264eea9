use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrintMode {
    None,
    Newick,
    Ascii,
}

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = None,
    name = "argsim",
)]
pub struct Args {
    /// Path to settings (yaml file).
    #[clap(long)]
    pub settings: String,

    /// Length of the sequence; overrides the settings.
    #[clap(long)]
    pub sequence_length: Option<f64>,

    /// Number of replicates; overrides the settings.
    #[clap(short, long)]
    pub replicates: Option<usize>,

    /// Seed of the first replicate; replicate r uses seed + r.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// Replay uniform draws from a file with one float per line instead of
    /// seeding. Only valid for a single replicate.
    #[clap(long)]
    pub replay: Option<String>,

    /// Path to output (csv file).
    #[clap(long, short)]
    pub output: String,

    /// Print the local tree of every segment to stdout.
    #[clap(long, value_enum, default_value_t = PrintMode::None)]
    pub print: PrintMode,

    /// Path to log file.
    #[clap(long, default_value = "argsim.log")]
    pub log_file: String,

    /// Verbosity level, repeat for more output.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable the progress bar.
    #[clap(long)]
    pub disable_progress_bar: bool,

    /// Number of threads for parallel replicates.
    #[clap(long)]
    pub threads: Option<usize>,
}
