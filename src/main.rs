#[macro_use]
extern crate log;

use std::fs::File;

use anyhow::Error;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use crate::program::Program;

mod danbooru;
mod program;

fn main() -> Result<(), Error> {
    initialize_logger();

    let program = Program::new();
    program.run()
}

/// Initializes the logger with preset filtering: info and above on the
/// terminal, everything from this crate into the log file.
fn initialize_logger() {
    let mut config = ConfigBuilder::new();
    config.add_filter_allow_str("artist_manager");

    let log_file = match File::create("artist_manager.log") {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to create log file: {e}. Logging will only output to terminal.");
            let _ = TermLogger::init(
                LevelFilter::Info,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            );
            return;
        }
    };

    if let Err(e) = CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::max(), config.build(), log_file),
    ]) {
        eprintln!("Failed to initialize combined logger: {e}. Falling back to terminal-only logging.");
        let _ = TermLogger::init(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    }
}
