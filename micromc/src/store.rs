//! Content store: deterministic mapping of logical artifact coordinates to their
//! location under the game root directory. The layout is compatible with the official
//! launcher so both can share an installation.

use std::path::{Path, PathBuf};

use crate::gav::Gav;


/// The game root directory, every path query below is derived from it. Queries never
/// touch the filesystem and never create directories, writers create the parent
/// directories they need on demand.
#[derive(Debug, Clone)]
pub struct GameDir {
    root: PathBuf,
}

impl GameDir {

    /// Create a new game directory rooted at the given path.
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Same as [`Self::new`] but using the default game directory on your system,
    /// returning none if there is no default game directory on your system.
    #[inline]
    pub fn new_with_default() -> Option<Self> {
        Some(Self::new(default_game_dir()?))
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    /// The directory of a version: `versions/<id>`.
    pub fn version_dir(&self, id: &str) -> PathBuf {
        let mut buf = self.versions_dir();
        buf.push(id);
        buf
    }

    /// The metadata file of a version: `versions/<id>/<id>.json`.
    pub fn version_metadata_file(&self, id: &str) -> PathBuf {
        file_with_extension(self.version_dir(id), id, "json")
    }

    /// The client JAR file of a version: `versions/<id>/<id>.jar`.
    pub fn version_client_file(&self, id: &str) -> PathBuf {
        file_with_extension(self.version_dir(id), id, "jar")
    }

    /// A fresh natives directory for a version, unique to the given run token:
    /// `versions/<id>/natives-<token>`.
    pub fn version_natives_dir(&self, id: &str, token: &str) -> PathBuf {
        let mut buf = self.version_dir(id);
        buf.push(format!("natives-{token}"));
        buf
    }

    /// The directory where libraries are stored, organized like a maven repository.
    #[inline]
    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    /// The file of a library below the libraries directory, derived from its GAV.
    #[inline]
    pub fn library_file(&self, gav: &Gav) -> PathBuf {
        gav.file(self.libraries_dir())
    }

    #[inline]
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    /// The file of an asset index: `assets/indexes/<id>.json`.
    pub fn asset_index_file(&self, index_id: &str) -> PathBuf {
        let mut buf = self.assets_dir();
        buf.push("indexes");
        file_with_extension(buf, index_id, "json")
    }

    /// The content-addressed file of an asset object: `assets/objects/<xx>/<hash>`,
    /// where `<xx>` is the first two characters of the lower hex SHA-1.
    pub fn asset_object_file(&self, hash: &str) -> PathBuf {
        let mut buf = self.assets_dir();
        buf.push("objects");
        buf.push(&hash[0..2]);
        buf.push(hash);
        buf
    }

    /// The directory where a virtual asset index is materialized:
    /// `assets/virtual/<id>`.
    pub fn asset_virtual_dir(&self, index_id: &str) -> PathBuf {
        let mut buf = self.assets_dir();
        buf.push("virtual");
        buf.push(index_id);
        buf
    }

    /// The directory where log configurations referenced by version metadata are
    /// stored: `assets/log_configs`.
    pub fn log_configs_dir(&self) -> PathBuf {
        let mut buf = self.assets_dir();
        buf.push("log_configs");
        buf
    }

    /// The resources directory used by map-to-resources asset indexes, below the
    /// game root because the running game reads it from its working directory.
    #[inline]
    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("resources")
    }

    /// The installation root of a Mojang-provided JVM component:
    /// `runtime/<component>/<platform>/<component>`.
    pub fn runtime_dir(&self, component: &str, platform: &str) -> PathBuf {
        let mut buf = self.root.join("runtime");
        buf.push(component);
        buf.push(platform);
        buf.push(component);
        buf
    }

    /// The manifest file tracking an installed JVM component:
    /// `runtime/<component>/<platform>/<component>.json`.
    pub fn runtime_manifest_file(&self, component: &str, platform: &str) -> PathBuf {
        let mut buf = self.root.join("runtime");
        buf.push(component);
        buf.push(platform);
        file_with_extension(buf, component, "json")
    }

    /// The `launcher_profiles.json` file read by mod loader installers.
    #[inline]
    pub fn profiles_file(&self) -> PathBuf {
        self.root.join("launcher_profiles.json")
    }

}

/// Build `<dir>/<name>.<extension>` in place, without formatting the file name into
/// an intermediate string.
fn file_with_extension(mut dir: PathBuf, name: &str, extension: &str) -> PathBuf {
    dir.push(name);
    let mut raw = dir.into_os_string();
    raw.push(".");
    raw.push(extension);
    PathBuf::from(raw)
}

/// Return the default game directory on the current system, the same directory the
/// official launcher uses, so called ".minecraft".
pub fn default_game_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_dir().map(|dir| dir.join(".minecraft"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|dir| dir.join("minecraft"))
    } else {
        dirs::home_dir().map(|dir| dir.join(".minecraft"))
    }
}

#[cfg(test)]
mod tests {

    use std::path::PathBuf;
    use std::str::FromStr;

    use crate::gav::Gav;
    use super::GameDir;

    fn p(parts: &[&str]) -> PathBuf {
        parts.iter().collect()
    }

    #[test]
    fn paths_correct() {

        let game = GameDir::new(p(&["root"]));

        assert_eq!(game.version_metadata_file("1.21"), p(&["root", "versions", "1.21", "1.21.json"]));
        assert_eq!(game.version_client_file("1.21"), p(&["root", "versions", "1.21", "1.21.jar"]));
        assert_eq!(game.asset_index_file("17"), p(&["root", "assets", "indexes", "17.json"]));
        assert_eq!(
            game.asset_object_file("5ff04807c356f1beed0b86ccf659b44b9983e3fa"),
            p(&["root", "assets", "objects", "5f", "5ff04807c356f1beed0b86ccf659b44b9983e3fa"]));
        assert_eq!(
            game.library_file(&Gav::from_str("com.mojang:authlib:2.2.30").unwrap()),
            p(&["root", "libraries", "com", "mojang", "authlib", "2.2.30", "authlib-2.2.30.jar"]));
        assert_eq!(
            game.runtime_dir("java-runtime-gamma", "linux"),
            p(&["root", "runtime", "java-runtime-gamma", "linux", "java-runtime-gamma"]));
        assert_eq!(
            game.runtime_manifest_file("java-runtime-gamma", "linux"),
            p(&["root", "runtime", "java-runtime-gamma", "linux", "java-runtime-gamma.json"]));

    }

}
