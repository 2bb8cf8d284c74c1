// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;

use config::{Config, File, FileFormat};
use tracing::debug;

mod engine;
mod error;

pub use engine::EngineConfig;
pub use error::ConfigError;

/// Loads an engine configuration from a YAML file.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = Config::builder()
        .add_source(File::new(&path.to_string_lossy(), FileFormat::Yaml))
        .build()?
        .try_deserialize()?;
    config.validate()?;
    debug!(path = %path.display(), "Loaded engine config");
    Ok(config)
}

/// Parses an engine configuration from a YAML string.
pub fn parse_engine_config(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_load_engine_config_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "device: mock\nmax_voices: 8\npoll_interval: 20ms").unwrap();

        let config = load_engine_config(file.path()).unwrap();
        assert_eq!(config.device(), "mock");
        assert_eq!(config.max_voices(), 8);
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_engine_config(Path::new("/nonexistent/wavebank.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_parse_rejects_bad_duration() {
        let result = parse_engine_config("poll_interval: soon");
        assert!(matches!(result, Err(ConfigError::Duration { .. })));
    }
}
