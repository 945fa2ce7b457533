//! The JSON configuration file, every key mirrors a command line argument and the
//! command line takes precedence per key.

use std::collections::BTreeMap;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::fs::File;

use uuid::Uuid;


/// Name of the configuration file looked up inside the game directory when no
/// explicit path is given.
pub const DEFAULT_CONFIG_NAME: &str = "micromc.json";

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
    pub game_dir: Option<PathBuf>,
    pub id: Option<String>,
    pub isolate_profile: Option<bool>,
    pub user: Option<String>,
    pub auth_uuid: Option<Uuid>,
    pub auth_access_token: Option<String>,
    pub user_type: Option<ConfigUserType>,
    pub java_path: Option<PathBuf>,
    #[serde(default)]
    pub env_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub jvm_args: Vec<String>,
    #[serde(default)]
    pub game_args: Vec<String>,
    pub resolver_processes: Option<usize>,
    pub write_profiles: Option<bool>,
    pub run_before: Option<String>,
    pub run_before_java: Option<u32>,
    #[serde(default)]
    pub delete_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigUserType {
    Msa,
    Legacy,
    Mojang,
}

impl ConfigUserType {

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigUserType::Msa => "msa",
            ConfigUserType::Legacy => "legacy",
            ConfigUserType::Mojang => "mojang",
        }
    }

}

/// The configuration could not be read or parsed.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unreadable config: {error} @ {file}")]
    Io {
        #[source]
        error: io::Error,
        file: Box<Path>,
    },
    #[error("malformed config: {error} @ {file}")]
    Json {
        #[source]
        error: serde_json::Error,
        file: Box<Path>,
    },
}

/// Load the configuration from the given file.
pub fn load(file: &Path) -> Result<Config, ConfigError> {

    let reader = File::open(file)
        .map(BufReader::new)
        .map_err(|error| ConfigError::Io { error, file: file.into() })?;

    serde_json::from_reader(reader)
        .map_err(|error| ConfigError::Json { error, file: file.into() })

}

/// Load the configuration from its default location inside the given game directory,
/// an absent file is an empty configuration, a malformed one is still an error.
pub fn load_default(game_dir: &Path) -> Result<Config, ConfigError> {
    let file = game_dir.join(DEFAULT_CONFIG_NAME);
    if file.is_file() {
        load(&file)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {

    use std::fs;

    use super::{load, load_default, ConfigError, ConfigUserType};

    #[test]
    fn full_config() {

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("micromc.json");
        fs::write(&file, r#"{
            "id": "1.18.2-forge-40.2.4",
            "isolate_profile": true,
            "user": "Steve",
            "user_type": "legacy",
            "env_variables": {"MESA_GL_VERSION_OVERRIDE": "4.5"},
            "jvm_args": ["-Xmx4G"],
            "resolver_processes": 8,
            "run_before": "java -jar installer.jar",
            "run_before_java": 17,
            "delete_files": ["logs/*.log"]
        }"#).unwrap();

        let config = load(&file).unwrap();
        assert_eq!(config.id.as_deref(), Some("1.18.2-forge-40.2.4"));
        assert_eq!(config.isolate_profile, Some(true));
        assert_eq!(config.user_type, Some(ConfigUserType::Legacy));
        assert_eq!(config.env_variables["MESA_GL_VERSION_OVERRIDE"], "4.5");
        assert_eq!(config.jvm_args, ["-Xmx4G"]);
        assert_eq!(config.resolver_processes, Some(8));
        assert_eq!(config.run_before_java, Some(17));
        assert_eq!(config.delete_files, ["logs/*.log"]);

    }

    #[test]
    fn default_config_absent_and_malformed() {

        let dir = tempfile::tempdir().unwrap();

        // Absent default config is empty.
        let config = load_default(dir.path()).unwrap();
        assert!(config.id.is_none());
        assert!(config.jvm_args.is_empty());

        // A malformed default config is a hard error.
        fs::write(dir.path().join("micromc.json"), "{ oops").unwrap();
        assert!(matches!(load_default(dir.path()), Err(ConfigError::Json { .. })));

    }

}
