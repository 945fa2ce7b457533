//! Java runtime provisioning: selecting and installing a Mojang-provided JVM of the
//! major version required by the launched version.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::fs::File;
use std::env;

use reqwest::Client;

use crate::download::{self, Batch, CancelToken};
use crate::launch::{Error, Event, Handler, Result};
use crate::store::GameDir;
use crate::version::serde::JavaVersion;


/// The URL to the meta manifest for Mojang-provided JVMs.
pub const JVM_META_MANIFEST_URL: &str = "https://launchermeta.mojang.com/v1/products/java-runtime/2ec0cc96c44e5a76b9c8b7c39df7210883d12871/all.json";

/// A resolved JVM, to be finalized after its files have been downloaded.
#[derive(Debug)]
pub struct Jvm {
    /// Path to the JVM executable file.
    pub file: PathBuf,
    /// The JVM version, if known.
    pub version: Option<String>,
    /// Post-download work for Mojang-provided JVMs, none for a user-provided path.
    pub(crate) mojang: Option<MojangJvm>,
}

/// Files that need to be made executable and links that need to be created once the
/// runtime files are all on disk.
#[derive(Debug, Default)]
pub(crate) struct MojangJvm {
    /// Full paths to files that should be executable (relevant under Unix).
    executables: Vec<Box<Path>>,
    /// Links to create, as `(link_file, relative_target)`.
    links: Vec<(Box<Path>, Box<Path>)>,
}

/// Select the JVM used to launch the game and plan the download of its missing files
/// into the given batch.
///
/// A user-supplied path is accepted verbatim. Otherwise the Mojang `java-runtime`
/// meta manifest is consulted for a component matching the required major version on
/// the host platform, its installation is rooted at `runtime/<component>/<os>/<component>/`.
/// When neither works this fails with [`Error::JavaUnavailable`].
pub fn load_jvm(
    game: &GameDir,
    java_version: Option<&JavaVersion>,
    java_path: Option<&Path>,
    client: &Client,
    batch: &mut Batch,
    handler: &mut dyn Handler,
) -> Result<Jvm> {

    if let Some(java_path) = java_path {
        let jvm = Jvm {
            file: java_path.to_path_buf(),
            version: None,
            mojang: None,
        };
        handler.handle_event(Event::JvmLoaded { file: &jvm.file, version: None });
        return Ok(jvm);
    }

    // Java 8 is implied for old versions that don't specify anything.
    let major_version = java_version.map(|v| v.major_version).unwrap_or(8);

    handler.handle_event(Event::JvmLoading { major_version });

    let component = java_version
        .and_then(|v| v.component.as_deref())
        .or_else(|| Some(match major_version {
            ..=8 => "jre-legacy",
            16 => "java-runtime-alpha",
            17 => "java-runtime-gamma",
            21 => "java-runtime-delta",
            _ => return None,
        }))
        .ok_or(Error::JavaUnavailable { major_version })?;

    let Some(platform) = mojang_jvm_platform() else {
        return Err(Error::JavaUnavailable { major_version });
    };

    // Mojang-provided JVMs are linked against glibc, a static C runtime means no
    // suitable dynamic linker on this host.
    if cfg!(target_os = "linux") && cfg!(target_feature = "crt-static") {
        return Err(Error::JavaUnavailable { major_version });
    }

    let meta_manifest = {

        let single = download::single_cached(JVM_META_MANIFEST_URL);
        let meta_file = single.file().to_path_buf();
        single.download(client, &mut *handler)?;

        let reader = File::open(&meta_file)
            .map(BufReader::new)
            .map_err(|e| Error::new_io_file(e, meta_file.clone()))?;

        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        match serde_path_to_error::deserialize::<_, serde::JvmMetaManifest>(&mut deserializer) {
            Ok(obj) => obj,
            Err(e) => return Err(Error::new_json_file(e, meta_file)),
        }

    };

    let variant = meta_manifest.platforms.get(platform)
        .and_then(|platform| platform.components.get(component))
        .and_then(|variants| variants.first())
        .ok_or(Error::JavaUnavailable { major_version })?;

    let dir = game.runtime_dir(component, platform);
    let manifest_file = game.runtime_manifest_file(component, platform);

    // On macOS the JVM bundle structure is a bit different so different bin path.
    let bin_file = if cfg!(target_os = "macos") {
        dir.join("jre.bundle/Contents/Home/bin/java")
    } else {
        dir.join("bin").join(jvm_exec_name())
    };

    // Check the per-file manifest, download it if needed, read and parse it...
    let manifest = {

        let dl = &variant.manifest;
        if !download::check_file(&manifest_file, dl.size, dl.sha1.as_deref())
            .map_err(|e| Error::new_io_file(e, manifest_file.clone()))? {
            let mut single = download::single(dl.url.as_str(), manifest_file.clone());
            single.set_expected_size(dl.size);
            single.set_expected_sha1(dl.sha1.as_deref().copied());
            single.download(client, &mut *handler)?;
        }

        let reader = File::open(&manifest_file)
            .map(BufReader::new)
            .map_err(|e| Error::new_io_file(e, manifest_file.clone()))?;

        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        match serde_path_to_error::deserialize::<_, serde::JvmManifest>(&mut deserializer) {
            Ok(obj) => obj,
            Err(e) => return Err(Error::new_json_file(e, manifest_file)),
        }

    };

    let mut mojang = MojangJvm::default();

    for (rel_file, manifest_file) in &manifest.files {

        let file = dir.join(rel_file);

        match manifest_file {
            serde::JvmManifestFile::Directory => {
                std::fs::create_dir_all(&file)
                    .map_err(|e| Error::new_io_file(e, file))?;
            }
            serde::JvmManifestFile::File {
                executable,
                downloads,
            } => {

                if *executable {
                    mojang.executables.push(file.clone().into_boxed_path());
                }

                let dl = &downloads.raw;
                if !download::check_file(&file, dl.size, dl.sha1.as_deref())
                    .map_err(|e| Error::new_io_file(e, file.clone()))? {
                    batch.push(dl.url.as_str(), file)
                        .set_expected_size(dl.size)
                        .set_expected_sha1(dl.sha1.as_deref().copied());
                }

            }
            serde::JvmManifestFile::Link {
                target,
            } => {
                mojang.links.push((
                    file.into_boxed_path(),
                    PathBuf::from(target).into_boxed_path(),
                ));
            }
        }

    }

    let jvm = Jvm {
        file: bin_file,
        version: Some(variant.version.name.clone()),
        mojang: Some(mojang),
    };

    handler.handle_event(Event::JvmLoaded {
        file: &jvm.file,
        version: jvm.version.as_deref(),
    });

    Ok(jvm)

}

/// Finalize the setup of a Mojang-provided JVM, doing nothing for a user-provided
/// path: mark executables and create the links listed in the manifest.
pub fn finalize_jvm(jvm: &Jvm) -> Result<()> {

    let Some(mojang) = &jvm.mojang else {
        return Ok(());
    };

    // This is only relevant on unix where we can set the executable mode.
    #[cfg(unix)]
    for exec_file in &mojang.executables {

        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(exec_file, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| Error::new_io_file(e, exec_file.to_path_buf()))?;

    }

    #[cfg(not(unix))]
    let _ = &mojang.executables;

    for (file, target) in &mojang.links {
        link_file(file, target)?;
    }

    Ok(())

}

/// Plan, download and finalize a JVM of the given major version in one call, used for
/// pre-launch commands that need a Java runtime before the game itself is resolved.
pub fn provision(
    game: &GameDir,
    major_version: u32,
    concurrency: usize,
    cancel: &CancelToken,
    mut handler: impl Handler,
) -> Result<Jvm> {

    let java_version = JavaVersion {
        component: None,
        major_version,
    };

    let client = crate::http::new_client()?;

    let mut batch = Batch::new();
    let jvm = load_jvm(game, Some(&java_version), None, &client, &mut batch, handler.as_launch_dyn())?;

    if !batch.is_empty() {
        let result = batch.execute(&client, concurrency, cancel, &mut handler);
        if result.is_cancelled() {
            return Err(Error::Cancelled);
        } else if result.has_errors() {
            return Err(Error::Download { errors: result.into_errors() });
        }
    }

    finalize_jvm(&jvm)?;

    Ok(jvm)

}

/// Create a link file pointing to a target relative to the link's directory, using a
/// symlink where supported and a plain copy elsewhere. An already existing link is
/// left untouched.
fn link_file(file: &Path, target: &Path) -> Result<()> {

    let res;

    #[cfg(unix)] {
        // The relative target is resolved against the link's directory by the
        // filesystem itself.
        res = std::os::unix::fs::symlink(target, file);
    }

    #[cfg(not(unix))] {
        let source = file.parent().unwrap().join(target);
        res = std::fs::copy(&source, file).map(|_| ());
    }

    match res {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(Error::new_io_file(e, file.to_path_buf())),
    }

}

/// Return the JVM exec file name.
#[inline]
fn jvm_exec_name() -> &'static str {
    if cfg!(windows) { "javaw.exe" } else { "java" }
}

/// Return the platform name used by Mojang's JVM meta manifest for this host, none
/// if the host has no Mojang-provided JVMs.
#[inline]
fn mojang_jvm_platform() -> Option<&'static str> {
    Some(match (env::consts::OS, env::consts::ARCH) {
        ("macos", "x86_64") => "mac-os",
        ("macos", "aarch64") => "mac-os-arm64",
        ("linux", "x86") => "linux-i386",
        ("linux", "x86_64") => "linux",
        ("windows", "x86") => "windows-x86",
        ("windows", "x86_64") => "windows-x64",
        ("windows", "aarch64") => "windows-arm64",
        _ => return None,
    })
}

/// JSON schemas of the JVM meta manifest and per-component manifests.
pub mod serde {

    use std::collections::HashMap;

    use crate::version::serde::Download;

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    #[serde(transparent)]
    pub struct JvmMetaManifest {
        pub platforms: HashMap<String, JvmMetaPlatform>,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    #[serde(transparent)]
    pub struct JvmMetaPlatform {
        pub components: HashMap<String, Vec<JvmMetaVariant>>,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    pub struct JvmMetaVariant {
        pub manifest: Download,
        pub version: JvmMetaVariantVersion,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    pub struct JvmMetaVariantVersion {
        pub name: String,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    pub struct JvmManifest {
        pub files: HashMap<String, JvmManifestFile>,
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    #[serde(rename_all = "lowercase", tag = "type")]
    pub enum JvmManifestFile {
        Directory,
        File {
            #[serde(default)]
            executable: bool,
            downloads: JvmManifestFileDownloads,
        },
        Link {
            target: String,
        },
    }

    #[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
    pub struct JvmManifestFileDownloads {
        pub raw: Download,
        pub lzma: Option<Download>,
    }

}

#[cfg(test)]
mod tests {

    use super::serde::{JvmManifest, JvmManifestFile};

    #[test]
    fn manifest_file_kinds() {

        let manifest: JvmManifest = serde_json::from_str(r#"{
            "files": {
                "bin": {"type": "directory"},
                "bin/java": {
                    "type": "file",
                    "executable": true,
                    "downloads": {"raw": {"url": "https://example.com/java", "size": 12, "sha1": null}}
                },
                "lib/libjawt.so": {
                    "type": "file",
                    "downloads": {"raw": {"url": "https://example.com/libjawt.so", "size": 4, "sha1": null}}
                },
                "legal/java.base": {"type": "link", "target": "../conf"}
            }
        }"#).unwrap();

        assert!(matches!(manifest.files["bin"], JvmManifestFile::Directory));
        assert!(matches!(manifest.files["bin/java"], JvmManifestFile::File { executable: true, .. }));
        assert!(matches!(manifest.files["lib/libjawt.so"], JvmManifestFile::File { executable: false, .. }));
        assert!(matches!(manifest.files["legal/java.base"], JvmManifestFile::Link { ref target } if target == "../conf"));

    }

}
