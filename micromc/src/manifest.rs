//! Official version manifest: fetching, per-run caching and merging with locally
//! installed versions for listing.

use std::io::{self, BufReader};
use std::fs::{self, File};

use chrono::{DateTime, FixedOffset};

use reqwest::Client;

use crate::launch::{Error, Result};
use crate::store::GameDir;
use crate::download;


/// Static URL to the version manifest provided by Mojang.
pub const VERSION_MANIFEST_URL: &str = "https://launchermeta.mojang.com/mc/game/version_manifest_v2.json";

/// Request the official version manifest with the given client, going through the
/// local HTTP cache so an unchanged manifest is not transferred again, and a
/// previously cached manifest is used when the network is unreachable.
pub fn request_manifest(client: &Client, handler: impl download::Handler) -> Result<serde::VersionManifest> {

    let single = download::single_cached(VERSION_MANIFEST_URL);
    let file = single.file().to_path_buf();
    single.download(client, handler)?;

    let reader = match File::open(&file) {
        Ok(reader) => BufReader::new(reader),
        Err(e) => return Err(Error::new_io_file(e, file)),
    };

    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let manifest: serde::VersionManifest = match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(obj) => obj,
        Err(e) => return Err(Error::new_json_file(e, file)),
    };

    Ok(manifest)

}

/// A per-run cache of the official manifest, it is fetched at most once per run and
/// only when actually needed.
#[derive(Debug, Default)]
pub struct ManifestCache {
    inner: Option<serde::VersionManifest>,
}

impl ManifestCache {

    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache already containing the given manifest, no request will ever be
    /// issued through it.
    #[inline]
    pub fn preloaded(manifest: serde::VersionManifest) -> Self {
        Self { inner: Some(manifest) }
    }

    /// Get the manifest, requesting it on first use.
    pub fn get(&mut self, client: &Client, handler: impl download::Handler) -> Result<&serde::VersionManifest> {
        if self.inner.is_none() {
            self.inner = Some(request_manifest(client, handler)?);
        }
        Ok(self.inner.as_ref().unwrap())
    }

    /// Get the manifest only if it has already been requested or preloaded.
    #[inline]
    pub fn get_if_loaded(&self) -> Option<&serde::VersionManifest> {
        self.inner.as_ref()
    }

}

/// One entry of a merged version listing.
#[derive(Debug, Clone)]
pub struct ListedVersion {
    pub id: String,
    /// True if the version is installed under the local `versions` directory.
    pub local: bool,
    pub r#type: Option<crate::version::serde::VersionType>,
    pub release_time: Option<DateTime<FixedOffset>>,
}

/// Merge the locally installed versions with the official manifest ones. A directory
/// under `versions/` only counts as installed when it contains its `<id>.json`
/// metadata file. Local versions come first, sorted by id, followed by the manifest
/// versions in manifest order (newest first). No assets are fetched.
pub fn list_versions(game: &GameDir, manifest: Option<&serde::VersionManifest>) -> io::Result<Vec<ListedVersion>> {

    let mut listed = Vec::new();
    let mut local_ids = std::collections::HashSet::new();

    match fs::read_dir(game.versions_dir()) {
        Ok(read_dir) => {
            for entry in read_dir {

                let entry = entry?;
                let Ok(id) = entry.file_name().into_string() else {
                    continue;
                };

                let metadata_file = game.version_metadata_file(&id);
                if !metadata_file.is_file() {
                    continue;
                }

                // Type and release time are informative, a bad metadata file still
                // lists the version.
                let metadata = File::open(&metadata_file).ok()
                    .and_then(|reader| serde_json::from_reader::<_, crate::version::serde::VersionMetadata>(BufReader::new(reader)).ok());

                local_ids.insert(id.clone());
                listed.push(ListedVersion {
                    id,
                    local: true,
                    r#type: metadata.as_ref().and_then(|m| m.r#type),
                    release_time: metadata.as_ref().and_then(|m| m.release_time),
                });

            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => (),
        Err(e) => return Err(e),
    }

    listed.sort_by(|a, b| a.id.cmp(&b.id));

    if let Some(manifest) = manifest {
        for version in &manifest.versions {
            if !local_ids.contains(&version.id) {
                listed.push(ListedVersion {
                    id: version.id.clone(),
                    local: false,
                    r#type: Some(version.r#type),
                    release_time: version.release_time,
                });
            }
        }
    }

    Ok(listed)

}

/// JSON schemas of the version manifest.
pub mod serde {

    use chrono::{DateTime, FixedOffset};

    use crate::version::serde::{Sha1Hash, VersionType};

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct VersionManifest {
        /// A map associating the latest versions.
        pub latest: VersionManifestLatest,
        /// List of all versions, newest first.
        pub versions: Vec<VersionManifestVersion>,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    pub struct VersionManifestLatest {
        pub release: Option<String>,
        pub snapshot: Option<String>,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct VersionManifestVersion {
        pub id: String,
        pub r#type: VersionType,
        /// URL of the version metadata file.
        pub url: String,
        pub release_time: Option<DateTime<FixedOffset>>,
        /// SHA-1 of the version metadata file, present in the v2 manifest.
        pub sha1: Option<Sha1Hash>,
    }

}

#[cfg(test)]
mod tests {

    use std::fs;

    use crate::store::GameDir;
    use super::list_versions;

    #[test]
    fn listing_merges_local_and_official() {

        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());

        // An installed version, a directory without metadata, and a stray file.
        fs::create_dir_all(game.version_dir("1.18.2-forge-40.2.4")).unwrap();
        fs::write(game.version_metadata_file("1.18.2-forge-40.2.4"), r#"{"id": "1.18.2-forge-40.2.4"}"#).unwrap();
        fs::create_dir_all(game.version_dir("broken")).unwrap();
        fs::write(game.versions_dir().join("stray.txt"), "").unwrap();

        let manifest: super::serde::VersionManifest = serde_json::from_str(r#"{
            "latest": {"release": "1.21", "snapshot": "24w33a"},
            "versions": [
                {"id": "1.21", "type": "release", "url": "https://example.com/1.21.json", "releaseTime": "2024-06-13T08:24:03+00:00"},
                {"id": "1.18.2-forge-40.2.4", "type": "release", "url": "https://example.com/ignored.json"}
            ]
        }"#).unwrap();

        let listed = list_versions(&game, Some(&manifest)).unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "1.18.2-forge-40.2.4");
        assert!(listed[0].local);
        assert_eq!(listed[1].id, "1.21");
        assert!(!listed[1].local);
        assert!(listed[1].release_time.is_some());

    }

    #[test]
    fn listing_without_versions_dir() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());
        assert!(list_versions(&game, None).unwrap().is_empty());
    }

}
