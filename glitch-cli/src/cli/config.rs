//! Engine settings from file, environment and flags.

use clap::ArgMatches;
use std::fs;
use std::path::PathBuf;

use glitch_lib::settings::EngineSettings;

/// Load settings from `--config` (or `$GLITCH_CONFIG`) and apply flag overrides.
pub fn load_settings(args: &ArgMatches) -> Result<EngineSettings, String> {
    let path = args
        .get_one::<String>("config")
        .cloned()
        .or_else(|| std::env::var("GLITCH_CONFIG").ok());

    let mut settings = match path {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .map_err(|err| format!("could not read config {}: {}", path, err))?;
            EngineSettings::from_json(&text)
                .map_err(|err| format!("invalid config {}: {}", path, err))?
        }
        None => EngineSettings::default(),
    };

    if let Some(program) = args.get_one::<String>("transcoder") {
        settings.transcoder.program = program.clone();
    }

    Ok(settings)
}

/// Catalog directory from `--catalog` or `$GLITCH_CATALOG`.
pub fn catalog_dir(args: &ArgMatches) -> Result<PathBuf, String> {
    args.get_one::<String>("catalog")
        .cloned()
        .or_else(|| std::env::var("GLITCH_CATALOG").ok())
        .map(PathBuf::from)
        .ok_or_else(|| "no catalog given; pass --catalog or set GLITCH_CATALOG".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::build_cli;

    #[test]
    fn config_file_and_flags_combine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glitch.json");
        fs::write(&path, r#"{"mixer": {"fade_out": 6.0}}"#).unwrap();

        let matches = build_cli()
            .try_get_matches_from([
                "glitch",
                "--config",
                path.to_str().unwrap(),
                "--transcoder",
                "lame",
                "serve",
            ])
            .unwrap();
        let settings = load_settings(&matches).unwrap();
        assert_eq!(settings.mixer.fade_out, 6.0);
        assert_eq!(settings.transcoder.program, "lame");
        assert_eq!(settings.mixer.transition_time, 30.0);
    }

    #[test]
    fn bad_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{").unwrap();
        let matches = build_cli()
            .try_get_matches_from(["glitch", "--config", path.to_str().unwrap(), "serve"])
            .unwrap();
        assert!(load_settings(&matches).unwrap_err().contains("invalid config"));
    }
}
