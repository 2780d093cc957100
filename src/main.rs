use argh::FromArgs;
use log::LevelFilter;
use pipeshell::{Interpreter, ReplConfig, logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(FromArgs)]
/// Read command lines and run them as pipelines of processes.
struct Options {
    #[argh(option, short = 'c')]
    /// run this single line and exit with its status
    command: Option<String>,

    #[argh(option, default = "String::from(\"pipeshell> \")")]
    /// prompt shown before each line
    prompt: String,

    #[argh(option)]
    /// file to load line history from and save it to
    history: Option<PathBuf>,

    #[argh(option, default = "LevelFilter::Warn")]
    /// log verbosity on stderr: off, error, warn, info, debug or trace
    log_level: LevelFilter,
}

fn main() -> ExitCode {
    let options: Options = argh::from_env();
    logging::init(options.log_level);

    let mut sh = Interpreter::new();

    if let Some(line) = options.command {
        let status = sh.execute_line(&line).unwrap_or(0);
        return ExitCode::from(u8::try_from(status).unwrap_or(1));
    }

    let config = ReplConfig {
        prompt: options.prompt,
        history: options.history,
    };
    match sh.repl(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pipeshell: {}", e);
            ExitCode::FAILURE
        }
    }
}
