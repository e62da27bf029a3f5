//! # Glitch
//!
//! Streams an endless, beat-matched mix of a track catalog over HTTP, or
//! renders the whole catalog once to a file.

use log::error;

mod cli;
mod logging;
mod runner;
mod server;

fn main() {
    dotenv::dotenv().ok();
    let args = cli::args::build_cli().get_matches();
    let log_buffer = logging::init(args.get_one::<String>("log").map(String::as_str));

    let code = match runner::run(&args, log_buffer) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err.to_lowercase());
            1
        }
    };

    std::process::exit(code)
}
