//! Writer for `launcher_profiles.json`, the file mod loader installers (Forge,
//! Fabric, ...) read to discover a valid game directory and register their versions.

use std::io::{self, BufReader, BufWriter};
use std::fs::File;

use chrono::{SecondsFormat, Utc};

use crate::store::GameDir;


/// Ensure that `launcher_profiles.json` under the game directory contains a profile
/// for the given version id, creating the file with minimal settings when absent.
/// Existing profiles for other ids are preserved.
pub fn write_profile(game: &GameDir, id: &str) -> io::Result<()> {

    let file = game.profiles_file();

    let mut profiles = match File::open(&file) {
        Ok(reader) => serde_json::from_reader(BufReader::new(reader))
            .unwrap_or_else(|_| serde::LauncherProfiles::default()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => serde::LauncherProfiles::default(),
        Err(e) => return Err(e),
    };

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let profile = profiles.profiles.entry(id.to_string())
        .or_insert_with(|| serde::Profile {
            name: id.to_string(),
            profile_type: "custom".to_string(),
            last_version_id: id.to_string(),
            created: now.clone(),
            last_used: String::new(),
        });

    profile.last_version_id = id.to_string();
    profile.last_used = now;

    let writer = BufWriter::new(File::create(&file)?);
    serde_json::to_writer_pretty(writer, &profiles)?;

    Ok(())

}

/// JSON schema of the `launcher_profiles.json` file, in the reference format the
/// installers expect.
mod serde {

    use std::collections::HashMap;

    #[derive(serde::Deserialize, serde::Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct LauncherProfiles {
        #[serde(default)]
        pub profiles: HashMap<String, Profile>,
        #[serde(default)]
        pub settings: Settings,
        pub version: u32,
        #[serde(default)]
        pub client_token: String,
    }

    impl Default for LauncherProfiles {
        fn default() -> Self {
            Self {
                profiles: HashMap::new(),
                settings: Settings::default(),
                version: 3,
                client_token: String::new(),
            }
        }
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Profile {
        pub name: String,
        #[serde(rename = "type")]
        pub profile_type: String,
        pub last_version_id: String,
        #[serde(default)]
        pub created: String,
        #[serde(default)]
        pub last_used: String,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub struct Settings {
        #[serde(default)]
        pub enable_snapshots: bool,
        #[serde(default)]
        pub keep_launcher_open: bool,
        #[serde(default)]
        pub show_game_log: bool,
    }

}

#[cfg(test)]
mod tests {

    use std::fs;

    use crate::store::GameDir;
    use super::write_profile;

    #[test]
    fn create_and_update() {

        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());

        write_profile(&game, "1.18.2").unwrap();

        let raw = fs::read_to_string(game.profiles_file()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["version"], 3);
        assert_eq!(doc["profiles"]["1.18.2"]["type"], "custom");
        assert_eq!(doc["profiles"]["1.18.2"]["lastVersionId"], "1.18.2");

        // A second profile is merged in without discarding the first.
        write_profile(&game, "1.18.2-forge-40.2.4").unwrap();
        let raw = fs::read_to_string(game.profiles_file()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["profiles"]["1.18.2"]["lastVersionId"], "1.18.2");
        assert_eq!(doc["profiles"]["1.18.2-forge-40.2.4"]["lastVersionId"], "1.18.2-forge-40.2.4");

    }

}
