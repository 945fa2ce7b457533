//! Version graph: loading version metadata along `inheritsFrom` chains and flattening
//! a chain into a single merged descriptor.

pub mod serde;

use std::collections::{HashMap, HashSet};
use std::io::{self, BufReader};
use std::fs::File;
use std::path::Path;

use indexmap::IndexMap;

use reqwest::Client;

use crate::launch::{Error, Event, Handler, Result};
use crate::manifest::ManifestCache;
use crate::store::GameDir;
use crate::download;


/// A loaded version of a chain.
#[derive(Debug, Clone)]
pub struct Version {
    /// Identifier of this version.
    pub id: String,
    /// The loaded metadata of the version.
    pub metadata: serde::VersionMetadata,
}

/// Load the given version and all the versions it transitively inherits from. The
/// returned chain starts at the requested version and ends at the deepest ancestor.
///
/// Metadata files are loaded from `versions/<id>/<id>.json` under the game directory,
/// versions absent from disk but present in the official manifest are fetched into
/// place first. A version chain that revisits an id fails with
/// [`Error::CyclicInheritance`].
pub fn load_chain(
    game: &GameDir,
    root_id: &str,
    manifest: &mut ManifestCache,
    client: &Client,
    handler: &mut dyn Handler,
) -> Result<Vec<Version>> {

    if root_id.is_empty() {
        return Err(Error::VersionNotFound { id: String::new() });
    }

    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current_id = Some(root_id.to_string());

    while let Some(load_id) = current_id.take() {

        if !visited.insert(load_id.clone()) {
            return Err(Error::CyclicInheritance { id: load_id });
        }

        let version = load_version(game, load_id, manifest, client, handler)?;
        if let Some(next_id) = &version.metadata.inherits_from {
            current_id = Some(next_id.clone());
        }

        chain.push(version);

    }

    handler.handle_event(Event::ChainLoaded { chain: &chain });

    Ok(chain)

}

/// Load a single version from its metadata file, fetching it from the official
/// manifest when missing locally.
fn load_version(
    game: &GameDir,
    id: String,
    manifest: &mut ManifestCache,
    client: &Client,
    handler: &mut dyn Handler,
) -> Result<Version> {

    let file = game.version_metadata_file(&id);

    handler.handle_event(Event::VersionLoading { id: &id, file: &file });

    let reader = match File::open(&file) {
        Ok(reader) => BufReader::new(reader),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fetch_version(&id, &file, manifest, client, handler)?;
            let reader = File::open(&file)
                .map_err(|e| Error::new_io_file(e, file.clone()))?;
            BufReader::new(reader)
        }
        Err(e) => return Err(Error::new_io_file(e, file)),
    };

    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let metadata: serde::VersionMetadata = match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(obj) => obj,
        Err(e) => return Err(Error::new_json_file(e, file)),
    };

    handler.handle_event(Event::VersionLoaded { id: &id, file: &file });

    Ok(Version {
        id,
        metadata,
    })

}

/// Fetch a missing version metadata file from the official manifest, failing with
/// [`Error::VersionNotFound`] for ids the manifest doesn't know.
fn fetch_version(
    id: &str,
    file: &Path,
    manifest: &mut ManifestCache,
    client: &Client,
    handler: &mut dyn Handler,
) -> Result<()> {

    let manifest = manifest.get(client, &mut *handler)?;

    let Some(manifest_version) = manifest.versions.iter().find(|v| v.id == id) else {
        return Err(Error::VersionNotFound { id: id.to_string() });
    };

    handler.handle_event(Event::VersionFetching { id });

    let mut single = download::single(manifest_version.url.as_str(), file.to_path_buf());
    single.set_expected_sha1(manifest_version.sha1.as_deref().copied());
    single.download(client, &mut *handler)?;

    handler.handle_event(Event::VersionFetched { id });

    Ok(())

}

/// The result of flattening a version chain: a single merged metadata document plus
/// the id of the version owning the client JAR file.
#[derive(Debug, Clone)]
pub struct Flattened {
    /// The requested version id, the child-most of the chain.
    pub id: String,
    /// The id of the version that defined `downloads.client`, whose
    /// `versions/<id>/<id>.jar` is the entry point of the class path. For a modded
    /// version this is the vanilla version it inherits from.
    pub client_id: String,
    /// The merged metadata.
    pub metadata: serde::VersionMetadata,
}

/// Flatten a version chain by merging every child over its parent: scalars are
/// overridden by the child when present, `libraries` and structured arguments
/// concatenate child-after-parent. At most one library per `group:artifact[:classifier]`
/// survives, the child-most occurrence wins, keeping the position of the first one.
///
/// Flattening is deterministic and idempotent, flattening a chain of only the merged
/// metadata yields the merged metadata back.
pub fn flatten(chain: &[Version]) -> Result<Flattened> {

    let root = chain.first().expect("empty version chain");

    let mut metadata = serde::VersionMetadata {
        id: root.id.clone(),
        r#type: None,
        release_time: None,
        inherits_from: None,
        java_version: None,
        asset_index: None,
        assets: None,
        downloads: HashMap::new(),
        libraries: Vec::new(),
        main_class: None,
        legacy_arguments: None,
        arguments: None,
        logging: HashMap::new(),
    };

    let mut client_id = root.id.clone();
    let mut libraries = IndexMap::<String, serde::Library>::new();
    let mut arguments = None::<serde::VersionArguments>;

    // Deepest ancestor first, so children override and append after parents.
    for version in chain.iter().rev() {

        let m = &version.metadata;

        if let Some(r#type) = m.r#type {
            metadata.r#type = Some(r#type);
        }

        if let Some(release_time) = m.release_time {
            metadata.release_time = Some(release_time);
        }

        if let Some(java_version) = &m.java_version {
            metadata.java_version = Some(java_version.clone());
        }

        if let Some(asset_index) = &m.asset_index {
            metadata.asset_index = Some(asset_index.clone());
        }

        if let Some(assets) = &m.assets {
            metadata.assets = Some(assets.clone());
        }

        if let Some(main_class) = &m.main_class {
            metadata.main_class = Some(main_class.clone());
        }

        if let Some(legacy_arguments) = &m.legacy_arguments {
            metadata.legacy_arguments = Some(legacy_arguments.clone());
        }

        for (kind, download) in &m.downloads {
            if kind == "client" {
                client_id = version.id.clone();
            }
            metadata.downloads.insert(kind.clone(), download.clone());
        }

        for (kind, logging) in &m.logging {
            metadata.logging.insert(kind.clone(), logging.clone());
        }

        for library in &m.libraries {
            libraries.insert(library.name.unversioned_key(), library.clone());
        }

        if let Some(version_arguments) = &m.arguments {
            let arguments = arguments.get_or_insert_with(|| serde::VersionArguments {
                game: Vec::new(),
                jvm: Vec::new(),
            });
            arguments.jvm.extend_from_slice(&version_arguments.jvm);
            arguments.game.extend_from_slice(&version_arguments.game);
        }

    }

    metadata.libraries = libraries.into_values().collect();
    metadata.arguments = arguments;

    Ok(Flattened {
        id: root.id.clone(),
        client_id,
        metadata,
    })

}

#[cfg(test)]
mod tests {

    use super::{flatten, Version};

    fn version(id: &str, raw: &str) -> Version {
        Version {
            id: id.to_string(),
            metadata: serde_json::from_str(raw).unwrap(),
        }
    }

    /// A reduced modded-over-vanilla chain, child first like [`super::load_chain`]
    /// returns it.
    fn forge_like_chain() -> Vec<Version> {
        vec![
            version("1.18.2-forge-40.2.4", r#"{
                "id": "1.18.2-forge-40.2.4",
                "inheritsFrom": "1.18.2",
                "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                "libraries": [
                    {"name": "net.minecraftforge:forge:1.18.2-40.2.4"},
                    {"name": "org.apache.logging.log4j:log4j-core:2.17.2"}
                ],
                "arguments": {
                    "game": ["--launchTarget", "forgeclient"],
                    "jvm": ["-DignoreList=client.jar"]
                }
            }"#),
            version("1.18.2", r#"{
                "id": "1.18.2",
                "type": "release",
                "releaseTime": "2022-02-28T10:42:45+00:00",
                "mainClass": "net.minecraft.client.main.Main",
                "assets": "1.18",
                "javaVersion": {"component": "java-runtime-gamma", "majorVersion": 17},
                "downloads": {"client": {"url": "https://example.com/client.jar", "size": 4, "sha1": null}},
                "libraries": [
                    {"name": "com.mojang:blocklist:1.0.10"},
                    {"name": "org.apache.logging.log4j:log4j-core:2.17.0"}
                ],
                "arguments": {
                    "game": ["--username", "${auth_player_name}"],
                    "jvm": ["-cp", "${classpath}"]
                }
            }"#),
        ]
    }

    #[test]
    fn flatten_merges_child_over_parent() {

        let flattened = flatten(&forge_like_chain()).unwrap();

        assert_eq!(flattened.id, "1.18.2-forge-40.2.4");
        assert_eq!(flattened.client_id, "1.18.2");

        let m = &flattened.metadata;
        assert_eq!(m.main_class.as_deref(), Some("cpw.mods.bootstraplauncher.BootstrapLauncher"));
        assert_eq!(m.assets.as_deref(), Some("1.18"));
        assert_eq!(m.java_version.as_ref().unwrap().major_version, 17);

        // Parent libraries come first, child ones are appended, and the duplicated
        // log4j-core resolves to the child-most version at the parent's position.
        let names = m.libraries.iter().map(|l| l.name.to_string()).collect::<Vec<_>>();
        assert_eq!(names, [
            "com.mojang:blocklist:1.0.10",
            "org.apache.logging.log4j:log4j-core:2.17.2",
            "net.minecraftforge:forge:1.18.2-40.2.4",
        ]);

        // Arguments concatenate child-after-parent.
        let args = m.arguments.as_ref().unwrap();
        assert!(matches!(&args.jvm[0], super::serde::VersionArgument::Raw(s) if s == "-cp"));
        assert!(matches!(&args.jvm[2], super::serde::VersionArgument::Raw(s) if s == "-DignoreList=client.jar"));
        assert!(matches!(&args.game[0], super::serde::VersionArgument::Raw(s) if s == "--username"));
        assert!(matches!(&args.game[2], super::serde::VersionArgument::Raw(s) if s == "--launchTarget"));

    }

    #[test]
    fn flatten_deterministic_and_idempotent() {

        let chain = forge_like_chain();
        let once = flatten(&chain).unwrap();
        let again = flatten(&chain).unwrap();

        // Deterministic: two runs produce identical merged documents.
        assert_eq!(
            serde_json::to_value(&once.metadata).unwrap(),
            serde_json::to_value(&again.metadata).unwrap());

        // Idempotent: flattening the merged document alone yields it back.
        let rechain = vec![Version {
            id: once.id.clone(),
            metadata: once.metadata.clone(),
        }];
        let twice = flatten(&rechain).unwrap();
        assert_eq!(
            serde_json::to_value(&once.metadata).unwrap(),
            serde_json::to_value(&twice.metadata).unwrap());

    }

    #[test]
    fn flatten_legacy_arguments() {
        let chain = vec![version("1.8.9", r#"{
            "id": "1.8.9",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--username ${auth_player_name} --version ${version_name}"
        }"#)];
        let flattened = flatten(&chain).unwrap();
        assert!(flattened.metadata.arguments.is_none());
        assert_eq!(
            flattened.metadata.legacy_arguments.as_deref(),
            Some("--username ${auth_player_name} --version ${version_name}"));
    }

}
