use std::{path::PathBuf, process};

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Builder as LogBuilder;
use log::{error, info, LevelFilter};

use dumper_xtask::{
    dist, BuildDriver, CancelToken, Firmware, Objcopy, Pipeline, PipelineError,
};

#[derive(Parser)]
#[command(name = "xtask", about = "Build tasks for the firmware dumper")]
struct Args {
    /// More output, repeat for trace
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    task: Xtask,
}

#[derive(Subcommand)]
enum Xtask {
    /// Build the dumper and convert it into a flat binary image.
    Dist {
        /// Firmware version to build against
        #[arg(long, value_enum, default_value_t)]
        firmware: Firmware,

        /// Where to write the image (default: firmware-dumper.bin in the project root)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Build the dumper and print the path of the linked ELF.
    Build {
        #[arg(long, value_enum, default_value_t)]
        firmware: Firmware,
    },
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    LogBuilder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    if let Err(e) = run(args.task) {
        error!("{:#}", e);
        let code = e
            .downcast_ref::<PipelineError>()
            .map_or(2, PipelineError::exit_code);
        process::exit(code);
    }
}

fn run(task: Xtask) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    let _signals = cancel
        .watch_signals()
        .context("failed to install signal handlers")?;

    match task {
        Xtask::Dist { firmware, output } => {
            let objcopy = match output {
                Some(output) => Objcopy::rustup(output),
                None => Objcopy::default(),
            };
            let mut pipeline = Pipeline::new(BuildDriver::firmware(firmware), objcopy);

            let image = pipeline.run(&cancel)?;
            info!("wrote {}", image.display());
        }
        Xtask::Build { firmware } => {
            let outcome = BuildDriver::firmware(firmware).run(&cancel)?;
            let elf = dist::complete(outcome)?;
            println!("{}", elf.display());
        }
    }

    Ok(())
}
