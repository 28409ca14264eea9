use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};

use crate::args::{Args, PrintMode};
use crate::config::{BreakpointScope, Settings};
use crate::core::Forest;
use crate::errors::{GenealogyError, Result};
use crate::random::{RandomSource, ReplayRandom, SeededRandom};
use crate::segment::SegmentEntry;

/// A segment together with its rendered local tree, if requested.
struct Segment {
    entry: SegmentEntry,
    tree: Option<String>,
}

pub struct Runner {
    args: Args,
    settings: Settings,
}

impl Runner {
    pub fn new(args: Args) -> Result<Runner> {
        Self::setup_logger(&args);
        #[cfg(feature = "parallel")]
        Self::setup_rayon(&args);

        let settings = Self::load_settings(&args.settings)?;
        Self::with_settings(args, settings)
    }

    /// Runner for already loaded settings; overrides from `args` are applied.
    pub fn with_settings(args: Args, mut settings: Settings) -> Result<Runner> {
        if let Some(sequence_length) = args.sequence_length {
            settings.sequence_length = sequence_length;
        }
        if let Some(replicates) = args.replicates {
            settings.replicates = replicates;
        }
        settings.model.validate()?;
        if !(settings.sequence_length > 0.) {
            return Err(GenealogyError::ConfigurationError(format!(
                "Sequence length must be positive, got {}",
                settings.sequence_length
            )));
        }
        if args.replay.is_some() && settings.replicates != 1 {
            return Err(GenealogyError::ConfigurationError(
                "Replaying draws requires a single replicate".to_string(),
            ));
        }
        Ok(Self { args, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn start(&self) -> Result<()> {
        let file = fs::File::create(&self.args.output)
            .map_err(|err| GenealogyError::WriteError(format!("{}: {err}", self.args.output)))?;
        let mut output = io::BufWriter::new(file);
        SegmentEntry::write_header(&mut output)?;

        let bar = self.progress_bar();
        self.run(&mut output, bar.as_ref())?;
        output
            .flush()
            .map_err(|err| GenealogyError::WriteError(err.to_string()))?;

        if let Some(bar) = bar {
            bar.finish_with_message("Done.");
        }
        log::info!("Finished simulation.");
        Ok(())
    }

    /// Setup logging level and file
    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    /// Setup rayon thread pool
    #[cfg(feature = "parallel")]
    fn setup_rayon(args: &Args) {
        if let Some(n_threads) = args.threads {
            println!("Setting number of threads to {}.", n_threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .unwrap_or_else(|_| {
                    eprintln!("Unable to set number of threads.");
                    std::process::exit(1);
                });
        }
    }

    /// Load settings from file
    fn load_settings(path: &str) -> Result<Settings> {
        let settings = Settings::read_from_file(path)
            .map_err(|err| GenealogyError::ReadError(format!("{path}: {err}")))?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        match self.args.disable_progress_bar {
            true => None,
            false => {
                let bar = ProgressBar::new(self.settings.replicates as u64);
                let style = ProgressStyle::default_bar().template(
                    "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                );
                match style {
                    Ok(style) => bar.set_style(style.progress_chars("=> ")),
                    Err(err) => log::warn!("Unable to style progress bar: {err}"),
                }
                Some(bar)
            }
        }
    }

    fn random_source(&self, replicate: usize) -> Result<Box<dyn RandomSource>> {
        match &self.args.replay {
            Some(path) => Ok(Box::new(ReplayRandom::read_from_file(path)?)),
            None => Ok(Box::new(SeededRandom::new(self.args.seed + replicate as u64))),
        }
    }

    fn write_segments(&self, output: &mut impl Write, segments: &[Segment]) -> Result<()> {
        for segment in segments {
            segment.entry.write(output)?;
            if let Some(tree) = &segment.tree {
                println!("{tree}");
            }
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn run(&self, output: &mut impl Write, bar: Option<&ProgressBar>) -> Result<()> {
        let replicates = (0..self.settings.replicates)
            .into_par_iter()
            .map(|replicate| {
                let mut rng = self.random_source(replicate)?;
                let segments = self.simulate_replicate(replicate, rng.as_mut());
                if let Some(bar) = bar {
                    bar.inc(1);
                }
                segments
            })
            .collect::<Result<Vec<Vec<Segment>>>>()?;
        for segments in replicates {
            self.write_segments(output, &segments)?;
        }
        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn run(&self, output: &mut impl Write, bar: Option<&ProgressBar>) -> Result<()> {
        for replicate in 0..self.settings.replicates {
            let mut rng = self.random_source(replicate)?;
            let segments = self.simulate_replicate(replicate, rng.as_mut())?;
            self.write_segments(output, &segments)?;
            if let Some(bar) = bar {
                bar.inc(1);
                bar.set_message(format!("{} segments", segments.len()));
            }
        }
        Ok(())
    }

    fn check_draws(rng: &dyn RandomSource, replicate: usize) -> Result<()> {
        match rng.exhausted() {
            true => Err(GenealogyError::ReadError(format!(
                "Replayed draws ran out in replicate {replicate}"
            ))),
            false => Ok(()),
        }
    }

    /// Walks one replicate along the sequence. The distance to the next
    /// recombination is exponential in the branch length eligible for
    /// breakpoints.
    fn simulate_replicate(
        &self,
        replicate: usize,
        rng: &mut dyn RandomSource,
    ) -> Result<Vec<Segment>> {
        let model = &self.settings.model;
        let sequence_length = self.settings.sequence_length;
        let mut forest = Forest::new(model, rng)?;
        Self::check_draws(rng, replicate)?;
        let mut segments = Vec::new();
        let mut position = 0.;

        loop {
            let branch_length = match model.breakpoint_scope {
                BreakpointScope::Forest => forest.forest_length(),
                BreakpointScope::LocalTree => forest.tree_length(),
            };
            let distance = rng.sample_expo(branch_length * model.recombination_rate);
            Self::check_draws(rng, replicate)?;
            let tree = match self.args.print {
                PrintMode::None => None,
                PrintMode::Newick => Some(forest.newick(0.)),
                PrintMode::Ascii => Some(forest.ascii()),
            };
            segments.push(Segment {
                entry: SegmentEntry {
                    replicate,
                    position,
                    length: distance.min(sequence_length - position),
                    tmrca: forest.tmrca(),
                    num_nodes: forest.num_nodes(),
                },
                tree,
            });

            position += distance;
            if position >= sequence_length {
                break;
            }
            let record = forest.step(model, rng)?;
            Self::check_draws(rng, replicate)?;
            log::debug!(
                "Replicate {replicate} at {position}: recombination in {} at {}, {} coalescences",
                record.recombination_branch,
                record.recombination_height,
                record.coalescences.len()
            );
        }
        log::info!(
            "Finished replicate {replicate} with {} segments",
            segments.len()
        );
        Ok(segments)
    }
}
