use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ntag_experiment::{SessionConfig, schedule_for};
use tracing::info;

mod app;
mod keyboard;

use app::SpellerApp;

const USAGE: &str = "\
speller [options]
  -p, --participant <N>   latin-square row selecting the condition order (0-5)
  -n, --trials <N>        override the number of trials per run
  -c, --config <PATH>     JSON session config overriding the defaults
  -h, --help              show this help";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut participant = 0usize;
    let mut trials: Option<usize> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-p" | "--participant" => {
                participant = args
                    .next()
                    .context("--participant needs a number")?
                    .parse()
                    .context("--participant must be an integer")?;
            }
            "-n" | "--trials" => {
                trials = Some(
                    args.next()
                        .context("--trials needs a number")?
                        .parse()
                        .context("--trials must be an integer")?,
                );
            }
            "-c" | "--config" => {
                config_path = Some(args.next().context("--config needs a path")?.into());
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }

    let mut config = match &config_path {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(n) = trials {
        config.n_trials = n;
    }

    let schedule = schedule_for(participant)?;
    info!(
        participant,
        runs = schedule.len(),
        trials = config.n_trials,
        platform = std::env::consts::OS,
        "starting speller session"
    );

    SpellerApp::new(config, schedule).run()
}
