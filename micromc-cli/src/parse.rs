//! Implementation of the command line parser, using clap struct derivation.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use uuid::Uuid;


/// Command line launcher for Minecraft, installing official versions and locally
/// installed modded versions (Forge, Fabric, ...) and launching them with pre-issued
/// credentials.
#[derive(Debug, Parser)]
#[command(name = "micromc", version, disable_help_subcommand = true, max_term_width = 140)]
pub struct CliArgs {
    /// The id of the version to launch.
    ///
    /// This can be any official release or snapshot id, or the id of a locally
    /// installed version under 'versions/<id>/<id>.json', such as versions written
    /// by Forge or Fabric installers. Official versions missing locally are fetched
    /// from the Mojang version manifest.
    pub id: Option<String>,
    /// Path to the JSON configuration file.
    ///
    /// Without this argument, a 'micromc.json' file inside the game directory is
    /// loaded when present. Every key of the configuration mirrors a command line
    /// argument and the command line takes precedence per key.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Set the game directory where versions, libraries, assets and runtimes are
    /// stored and where the game runs.
    ///
    /// This defaults to the standard Minecraft directory of your system.
    #[arg(short = 'd', long)]
    pub game_dir: Option<PathBuf>,
    /// List installed and official versions instead of launching, with their
    /// provenance and release time.
    #[arg(short = 'l', long)]
    pub list_versions: bool,
    /// The player name, for offline sessions it defaults to a name derived from the
    /// host name.
    #[arg(short = 'u', long)]
    pub user: Option<String>,
    /// The player UUID, defaults to a deterministic offline UUID derived from the
    /// player name.
    #[arg(long)]
    pub auth_uuid: Option<Uuid>,
    /// The pre-issued session access token, the launcher never authenticates itself.
    #[arg(long)]
    pub auth_access_token: Option<String>,
    /// The user type put on the command line.
    #[arg(long)]
    pub user_type: Option<UserType>,
    /// Isolate the profile: run the game inside 'versions/<id>' so its saves,
    /// options and logs don't mix with other versions'.
    #[arg(short = 'i', long)]
    pub isolate: bool,
    /// Use this Java executable verbatim instead of provisioning a Mojang runtime.
    #[arg(long)]
    pub java_path: Option<PathBuf>,
    /// Environment variables overlaid on the game process.
    ///
    /// This argument can be specified multiple times, variables given here win over
    /// the ones of the configuration file.
    #[arg(short = 'e', long = "env-variables", value_name = "KEY=VALUE", num_args = 1..)]
    pub env_variables: Vec<EnvVariable>,
    /// Extra JVM arguments, shell-split and appended after the version-defined ones.
    #[arg(short = 'j', long, value_name = "ARGS")]
    pub jvm_args: Option<String>,
    /// Extra game arguments, shell-split and appended after the version-defined ones.
    #[arg(short = 'g', long, value_name = "ARGS")]
    pub game_args: Option<String>,
    /// Number of resolver workers downloading concurrently.
    #[arg(long, value_name = "N")]
    pub resolver_processes: Option<usize>,
    /// Write a profile for the launched version into 'launcher_profiles.json', mod
    /// loader installers need this file to accept the game directory.
    #[arg(long)]
    pub write_profiles: bool,
    /// A command to run before resolving the version, shell-split. Its failure does
    /// not abort the launch.
    #[arg(long, value_name = "CMD")]
    pub run_before: Option<String>,
    /// Provision a Java runtime of this major version before running the pre-launch
    /// command, its 'bin' directory is prepended to the command's PATH.
    #[arg(long, value_name = "MAJOR", requires = "run_before")]
    pub run_before_java: Option<u32>,
    /// Glob patterns of files to delete before launching, relative to the game
    /// directory. Failures are warnings.
    ///
    /// This argument can be specified multiple times.
    #[arg(long, value_name = "GLOB", num_args = 1..)]
    pub delete_files: Vec<String>,
    /// Enable verbose output.
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UserType {
    /// Microsoft account session.
    Msa,
    /// Legacy Minecraft session.
    Legacy,
    /// Mojang account session.
    Mojang,
}

impl UserType {

    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Msa => "msa",
            UserType::Legacy => "legacy",
            UserType::Mojang => "mojang",
        }
    }

}

/// A `KEY=VALUE` environment variable pair.
#[derive(Debug, Clone)]
pub struct EnvVariable {
    pub key: String,
    pub value: String,
}

impl FromStr for EnvVariable {

    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {

        let Some((key, value)) = s.split_once('=') else {
            return Err("invalid environment variable syntax, expecting KEY=VALUE".to_string());
        };

        if key.is_empty() {
            return Err("invalid environment variable, empty key".to_string());
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })

    }

}

#[cfg(test)]
mod tests {

    use std::str::FromStr;
    use super::EnvVariable;

    #[test]
    fn env_variable_syntax() {
        let var = EnvVariable::from_str("JAVA_OPTS=-Xss4m").unwrap();
        assert_eq!(var.key, "JAVA_OPTS");
        assert_eq!(var.value, "-Xss4m");
        assert!(EnvVariable::from_str("JAVA_OPTS").is_err());
        assert!(EnvVariable::from_str("=value").is_err());
        assert_eq!(EnvVariable::from_str("EMPTY=").unwrap().value, "");
    }

}
