//! Asset index resolution: turning the index referenced by a version into a concrete
//! plan of download and copy tasks.

use std::collections::HashSet;
use std::io::{self, BufReader};
use std::fmt::Write as _;
use std::fs::File;
use std::path::PathBuf;

use reqwest::Client;

use crate::download::{self, Batch};
use crate::launch::{Error, Event, Handler, Result};
use crate::store::GameDir;
use crate::version::{serde, Flattened};


/// Base URL for downloading the game's assets.
pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net/";

/// Resolved assets of a version.
#[derive(Debug)]
pub struct Assets {
    /// The asset index id.
    pub id: String,
    /// The parsed index.
    pub index: serde::AssetIndex,
    /// The directory where objects are materialized under their logical paths, only
    /// for `virtual` and `map_to_resources` indexes, substituted for `${game_assets}`.
    pub virtual_dir: Option<PathBuf>,
}

/// Resolve the asset index referenced by the flattened version, downloading the index
/// file itself if needed, and plan a download task for every missing object into the
/// given batch. A version without assets resolves to none.
///
/// Objects listed several times under different logical paths are planned only once.
/// Pre-1.7.3 indexes that materialize objects under logical paths are planned
/// separately, after objects exist, by [`plan_mapping_tasks`].
pub fn load_assets(
    game: &GameDir,
    flattened: &Flattened,
    client: &Client,
    batch: &mut Batch,
    handler: &mut dyn Handler,
) -> Result<Option<Assets>> {

    // Modern versions carry the index download information, legacy ones only its id.
    let (index_id, index_download) = match (&flattened.metadata.asset_index, &flattened.metadata.assets) {
        (Some(asset_index), _) => (asset_index.id.as_str(), Some(&asset_index.download)),
        (None, Some(assets_id)) => (assets_id.as_str(), None),
        (None, None) => return Ok(None),
    };

    handler.handle_event(Event::AssetsLoading { id: index_id });

    let index_file = game.asset_index_file(index_id);

    if let Some(dl) = index_download {
        if !download::check_file(&index_file, dl.size, dl.sha1.as_deref())
            .map_err(|e| Error::new_io_file(e, index_file.clone()))? {
            let mut single = download::single(dl.url.as_str(), index_file.clone());
            single.set_expected_size(dl.size);
            single.set_expected_sha1(dl.sha1.as_deref().copied());
            single.download(client, &mut *handler)?;
        }
    }

    let reader = match File::open(&index_file) {
        Ok(reader) => BufReader::new(reader),
        Err(e) if e.kind() == io::ErrorKind::NotFound =>
            return Err(Error::AssetsNotFound { id: index_id.to_string() }),
        Err(e) => return Err(Error::new_io_file(e, index_file)),
    };

    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let index: serde::AssetIndex = match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(obj) => obj,
        Err(e) => return Err(Error::new_json_file(e, index_file)),
    };

    let mut hash_name = String::new();
    let mut unique_hashes = HashSet::new();

    for object in index.objects.values() {

        // Several logical paths can point to the same object, plan it once.
        if !unique_hashes.insert(&*object.hash) {
            continue;
        }

        hash_name.clear();
        for byte in *object.hash {
            write!(hash_name, "{byte:02x}").unwrap();
        }

        let object_file = game.asset_object_file(&hash_name);

        // The file name is its own hash, so a size check is enough for files that
        // are already there, freshly downloaded ones are fully verified.
        if !download::check_file(&object_file, Some(object.size), None)
            .map_err(|e| Error::new_io_file(e, object_file.clone()))? {
            batch.push(format!("{RESOURCES_URL}{}/{hash_name}", &hash_name[0..2]), object_file)
                .set_expected_size(Some(object.size))
                .set_expected_sha1(Some(*object.hash));
        }

    }

    let assets = Assets {
        id: index_id.to_string(),
        virtual_dir: (index.r#virtual || index.map_to_resources)
            .then(|| game.asset_virtual_dir(index_id)),
        index,
    };

    handler.handle_event(Event::AssetsVerified {
        id: &assets.id,
        count: assets.index.objects.len(),
    });

    Ok(Some(assets))

}

/// Plan the copy tasks materializing a `virtual` or `map_to_resources` index: every
/// object is copied from its content-addressed file to its logical path below the
/// virtual directory, and additionally below `<game-root>/resources` for
/// map-to-resources indexes, whose objects the running game reads (and modifies) in
/// its working directory. Must run after the object downloads completed.
pub fn plan_mapping_tasks(game: &GameDir, assets: &Assets, batch: &mut Batch) {

    let Some(virtual_dir) = &assets.virtual_dir else {
        return;
    };

    let resources_dir = assets.index.map_to_resources
        .then(|| game.resources_dir());

    let mut hash_name = String::new();

    for (rel_path, object) in &assets.index.objects {

        hash_name.clear();
        for byte in *object.hash {
            write!(hash_name, "{byte:02x}").unwrap();
        }

        let object_file = game.asset_object_file(&hash_name);
        let rel_path: PathBuf = rel_path.split('/').collect();

        batch.push_copy(object_file.clone(), virtual_dir.join(&rel_path))
            .set_expected_size(Some(object.size));

        if let Some(resources_dir) = &resources_dir {
            batch.push_copy(object_file, resources_dir.join(&rel_path))
                .set_expected_size(Some(object.size));
        }

    }

}

#[cfg(test)]
mod tests {

    use std::fs;

    use crate::download::Batch;
    use crate::manifest::ManifestCache;
    use crate::store::GameDir;
    use crate::version::{flatten, load_chain};
    use super::{load_assets, plan_mapping_tasks};

    const LEGACY_INDEX: &str = r#"{
        "virtual": true,
        "objects": {
            "icons/icon_16x16.png": {"hash": "bdf48ef6b5d0d23bbb02e17d04865216179f510a", "size": 3665},
            "icons/icon_copy.png": {"hash": "bdf48ef6b5d0d23bbb02e17d04865216179f510a", "size": 3665},
            "sounds/click.ogg": {"hash": "5ff04807c356f1beed0b86ccf659b44b9983e3fa", "size": 2432}
        }
    }"#;

    #[test]
    fn legacy_index_plan() {

        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());

        fs::create_dir_all(game.version_dir("1.7.2")).unwrap();
        fs::write(game.version_metadata_file("1.7.2"), r#"{
            "id": "1.7.2",
            "mainClass": "net.minecraft.client.main.Main",
            "assets": "legacy"
        }"#).unwrap();
        fs::create_dir_all(game.asset_index_file("legacy").parent().unwrap()).unwrap();
        fs::write(game.asset_index_file("legacy"), LEGACY_INDEX).unwrap();

        let client = crate::http::new_client().unwrap();
        let mut manifest = ManifestCache::new();
        let chain = load_chain(&game, "1.7.2", &mut manifest, &client, &mut ()).unwrap();
        let flattened = flatten(&chain).unwrap();

        let mut batch = Batch::new();
        let assets = load_assets(&game, &flattened, &client, &mut batch, &mut ()).unwrap().unwrap();

        // Two unique hashes for three logical paths.
        assert_eq!(assets.id, "legacy");
        assert_eq!(batch.len(), 2);
        assert_eq!(assets.virtual_dir.as_deref(), Some(&*game.asset_virtual_dir("legacy")));

        // One copy per logical path for the virtual materialization.
        let mut mapping = Batch::new();
        plan_mapping_tasks(&game, &assets, &mut mapping);
        assert_eq!(mapping.len(), 3);

    }

    #[test]
    fn no_assets() {

        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());

        fs::create_dir_all(game.version_dir("custom")).unwrap();
        fs::write(game.version_metadata_file("custom"), r#"{"id": "custom", "mainClass": "a.B"}"#).unwrap();

        let client = crate::http::new_client().unwrap();
        let mut manifest = ManifestCache::new();
        let chain = load_chain(&game, "custom", &mut manifest, &client, &mut ()).unwrap();
        let flattened = flatten(&chain).unwrap();

        let mut batch = Batch::new();
        assert!(load_assets(&game, &flattened, &client, &mut batch, &mut ()).unwrap().is_none());
        assert!(batch.is_empty());

    }

}
