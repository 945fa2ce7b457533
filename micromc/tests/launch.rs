//! End-to-end installation tests on temporary game directories, fully offline: the
//! metadata and artifacts are seeded on disk so no fetch task is ever planned.

use std::fs;

use micromc::launch::{Error, Launcher};
use micromc::manifest::ManifestCache;
use micromc::store::GameDir;
use micromc::version;


fn seed_version(game: &GameDir, id: &str, metadata: &str) {
    fs::create_dir_all(game.version_dir(id)).unwrap();
    fs::write(game.version_metadata_file(id), metadata).unwrap();
}

#[test]
fn offline_legacy_launch() {

    let dir = tempfile::tempdir().unwrap();
    let game = GameDir::new(dir.path());

    seed_version(&game, "custom", r#"{
        "id": "custom",
        "mainClass": "net.minecraft.client.main.Main",
        "minecraftArguments": "--username ${auth_player_name} --version ${version_name} --gameDir ${game_directory}"
    }"#);

    // The client JAR has no download information, it must pre-exist.
    fs::write(game.version_client_file("custom"), b"jar").unwrap();

    let mut launcher = Launcher::new(game.clone(), "custom");
    launcher.java_path("/opt/java/bin/java");
    launcher.username("Steve");
    launcher.isolate(true);

    let result = launcher.install(()).unwrap();

    // The user-provided JVM path is accepted verbatim.
    assert_eq!(result.jvm_file.as_os_str(), "/opt/java/bin/java");
    assert_eq!(result.main_class, "net.minecraft.client.main.Main");

    // Legacy versions get the synthesized JVM arguments.
    assert!(result.jvm_args.iter().any(|arg| arg.starts_with("-Djava.library.path=")));
    let cp_index = result.jvm_args.iter().position(|arg| arg == "-cp").unwrap();
    let classpath = &result.jvm_args[cp_index + 1];
    assert!(classpath.ends_with("custom.jar"), "classpath: {classpath}");

    // Substituted game arguments, the isolated game directory is the version's own.
    let work_dir = result.work_dir.display().to_string();
    assert!(work_dir.ends_with(&format!("versions{}custom", std::path::MAIN_SEPARATOR)));
    assert_eq!(result.game_args, [
        "--username", "Steve",
        "--version", "custom",
        "--gameDir", work_dir.as_str(),
    ]);

    // A fresh run-unique natives directory exists below the version directory.
    let natives = result.jvm_args.iter()
        .find_map(|arg| arg.strip_prefix("-Djava.library.path="))
        .unwrap();
    assert!(natives.contains("natives-"), "natives: {natives}");
    assert!(std::path::Path::new(natives).is_dir());

}

#[test]
fn offline_uuid_on_command_line() {

    let dir = tempfile::tempdir().unwrap();
    let game = GameDir::new(dir.path());

    seed_version(&game, "custom", r#"{
        "id": "custom",
        "mainClass": "net.minecraft.client.main.Main",
        "minecraftArguments": "--uuid ${auth_uuid} --accessToken ${auth_access_token}"
    }"#);
    fs::write(game.version_client_file("custom"), b"jar").unwrap();

    let mut launcher = Launcher::new(game, "custom");
    launcher.java_path("/opt/java/bin/java");
    launcher.username("Steve");

    let result = launcher.install(()).unwrap();

    let expected = micromc::launch::offline_player_uuid("Steve").as_simple().to_string();
    assert_eq!(result.game_args, ["--uuid", expected.as_str(), "--accessToken", ""]);

}

#[test]
fn inherited_version_resolution() {

    let dir = tempfile::tempdir().unwrap();
    let game = GameDir::new(dir.path());

    seed_version(&game, "base", r#"{
        "id": "base",
        "mainClass": "net.minecraft.client.main.Main",
        "minecraftArguments": "--version ${version_name}",
        "downloads": {"client": {"url": "https://example.com/client.jar", "size": 3, "sha1": null}}
    }"#);
    seed_version(&game, "modded", r#"{
        "id": "modded",
        "inheritsFrom": "base",
        "mainClass": "modloader.Main"
    }"#);

    // The client JAR belongs to the base version, which defines the client
    // download: the seeded file matches the expected size so nothing is fetched.
    fs::write(game.version_client_file("base"), b"jar").unwrap();

    let mut launcher = Launcher::new(game, "modded");
    launcher.java_path("/opt/java/bin/java");

    let result = launcher.install(()).unwrap();

    assert_eq!(result.main_class, "modloader.Main");
    assert_eq!(result.game_args, ["--version", "modded"]);

    let cp_index = result.jvm_args.iter().position(|arg| arg == "-cp").unwrap();
    assert!(result.jvm_args[cp_index + 1].ends_with("base.jar"));

}

#[test]
fn cyclic_inheritance_fails() {

    let dir = tempfile::tempdir().unwrap();
    let game = GameDir::new(dir.path());

    seed_version(&game, "a", r#"{"id": "a", "inheritsFrom": "b"}"#);
    seed_version(&game, "b", r#"{"id": "b", "inheritsFrom": "a"}"#);

    let client = micromc::http::new_client().unwrap();
    let mut manifest = ManifestCache::new();
    let res = version::load_chain(&game, "a", &mut manifest, &client, &mut ());
    assert!(matches!(res, Err(Error::CyclicInheritance { id }) if id == "a"));

}

#[test]
fn unknown_version_fails() {

    let dir = tempfile::tempdir().unwrap();
    let game = GameDir::new(dir.path());

    // A preloaded empty manifest means no network access and no known versions.
    let empty: micromc::manifest::serde::VersionManifest =
        serde_json::from_str(r#"{"latest": {}, "versions": []}"#).unwrap();
    let mut manifest = ManifestCache::preloaded(empty);

    let client = micromc::http::new_client().unwrap();
    let res = version::load_chain(&game, "1.99.0", &mut manifest, &client, &mut ());
    assert!(matches!(res, Err(Error::VersionNotFound { id }) if id == "1.99.0"));

}

#[test]
fn malformed_descriptor_fails() {

    let dir = tempfile::tempdir().unwrap();
    let game = GameDir::new(dir.path());

    seed_version(&game, "broken", r#"{"id": 42}"#);

    let client = micromc::http::new_client().unwrap();
    let mut manifest = ManifestCache::new();
    let res = version::load_chain(&game, "broken", &mut manifest, &client, &mut ());
    assert!(matches!(res, Err(Error::MalformedDescriptor { .. })));

}
