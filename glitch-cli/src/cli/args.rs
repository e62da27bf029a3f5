//! CLI argument definitions for `glitch`.

use clap::{Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("glitch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Render an endless beat-matched broadcast from a track catalog")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .global(true)
                .help("JSON file with engine settings"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("LEVEL")
                .global(true)
                .help("Log level (error, warn, info, debug, trace); overrides RUST_LOG"),
        )
        .arg(
            Arg::new("transcoder")
                .long("transcoder")
                .value_name("PROGRAM")
                .global(true)
                .help("Encoder program fed raw PCM on stdin (default: ffmpeg)"),
        )
        .subcommand(
            Command::new("serve")
                .about("Stream the program to HTTP listeners")
                .arg(catalog_arg())
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("ADDR")
                        .default_value("0.0.0.0")
                        .help("Address to listen on"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_name("PORT")
                        .default_value("8889")
                        .help("Port to listen on"),
                )
                .arg(
                    Arg::new("no-pace")
                        .long("no-pace")
                        .action(ArgAction::SetTrue)
                        .help("Render as fast as possible instead of in real time"),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Render every catalog track once, in order, to a file")
                .arg(catalog_arg())
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("FILE")
                        .required(true)
                        .help("Destination for the encoded program"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit default JSON payloads")
                .subcommand(
                    Command::new("config").about("Print the default engine settings as JSON"),
                ),
        )
}

fn catalog_arg() -> Arg {
    Arg::new("catalog")
        .long("catalog")
        .value_name("DIR")
        .help("Directory of track descriptors (default: $GLITCH_CATALOG)")
}
