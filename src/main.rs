use argsim::args::Args;
use argsim::runner::Runner;
use clap::Parser;

fn main() {
    let args = Args::parse();
    let result = Runner::new(args).and_then(|runner| runner.start());
    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
