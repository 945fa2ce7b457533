//! Launch orchestration: resolving a version into a fully verified on-disk
//! installation and composing the final JVM command line.

use std::collections::HashSet;
use std::io::{self, Write as _};
use std::process::{Child, Command, ExitStatus};
use std::path::{Path, PathBuf};
use std::fs;

use uuid::Uuid;

use reqwest::Client;

use crate::assets::{self, Assets};
use crate::download::{self, Batch, CancelToken, TaskError};
use crate::gav::Gav;
use crate::jvm;
use crate::manifest::ManifestCache;
use crate::rule::{self, Host};
use crate::store::GameDir;
use crate::version::{self, serde, Flattened};


/// The default JVM arguments for versions that define none, such as legacy versions
/// with a flat `minecraftArguments` string.
const LEGACY_JVM_ARGS: &[&str] = &[
    "-Djava.library.path=${natives_directory}",
    "-Dminecraft.launcher.brand=${launcher_name}",
    "-Dminecraft.launcher.version=${launcher_version}",
    "-cp",
    "${classpath}",
];

/// The class path separator of the host.
const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Launcher handle configured once and used to install and launch a version, the
/// installation itself will not mutate this object.
#[derive(Debug, Clone)]
pub struct Launcher {
    game: GameDir,
    id: String,
    demo: bool,
    resolution: Option<(u32, u32)>,
    isolate: bool,
    java_path: Option<PathBuf>,
    concurrency: usize,
    extra_jvm_args: Vec<String>,
    extra_game_args: Vec<String>,
    env: Vec<(String, String)>,
    username: Option<String>,
    auth_uuid: Option<Uuid>,
    auth_token: Option<String>,
    user_type: String,
    launcher_name: Option<String>,
    launcher_version: Option<String>,
    cancel: CancelToken,
}

impl Launcher {

    /// Create a new launcher for the given version id inside the given game directory.
    pub fn new(game: GameDir, id: impl Into<String>) -> Self {
        Self {
            game,
            id: id.into(),
            demo: false,
            resolution: None,
            isolate: false,
            java_path: None,
            concurrency: download::DEFAULT_CONCURRENCY,
            extra_jvm_args: Vec::new(),
            extra_game_args: Vec::new(),
            env: Vec::new(),
            username: None,
            auth_uuid: None,
            auth_token: None,
            user_type: "msa".to_string(),
            launcher_name: None,
            launcher_version: None,
            cancel: CancelToken::new(),
        }
    }

    /// Set to true to enable the demo mode of the game.
    #[inline]
    pub fn demo(&mut self, demo: bool) -> &mut Self {
        self.demo = demo;
        self
    }

    /// Set an initial resolution for the game's window.
    #[inline]
    pub fn resolution(&mut self, width: u32, height: u32) -> &mut Self {
        self.resolution = Some((width, height));
        self
    }

    /// When enabled, the game's working directory is the version's own directory
    /// instead of the game root, so saves, options and logs of that version don't mix
    /// with other versions'.
    #[inline]
    pub fn isolate(&mut self, isolate: bool) -> &mut Self {
        self.isolate = isolate;
        self
    }

    /// Use the given JVM executable instead of resolving a Mojang-provided one, the
    /// path is accepted verbatim.
    #[inline]
    pub fn java_path(&mut self, java_path: impl Into<PathBuf>) -> &mut Self {
        self.java_path = Some(java_path.into());
        self
    }

    /// Number of resolver workers executing fetch tasks concurrently, defaults to 4.
    #[inline]
    pub fn concurrency(&mut self, concurrency: usize) -> &mut Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Extra JVM arguments, appended after the version-defined ones.
    #[inline]
    pub fn extra_jvm_args(&mut self, args: impl IntoIterator<Item = String>) -> &mut Self {
        self.extra_jvm_args.extend(args);
        self
    }

    /// Extra game arguments, appended after the version-defined ones.
    #[inline]
    pub fn extra_game_args(&mut self, args: impl IntoIterator<Item = String>) -> &mut Self {
        self.extra_game_args.extend(args);
        self
    }

    /// Environment variables overlaid on the game process' environment.
    #[inline]
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The player name. Without one, a name is derived from the host name.
    #[inline]
    pub fn username(&mut self, username: impl Into<String>) -> &mut Self {
        self.username = Some(username.into());
        self
    }

    /// The player UUID issued by the authentication service. Without one, a
    /// deterministic offline UUID is derived from the player name, see
    /// [`offline_player_uuid`].
    #[inline]
    pub fn auth_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.auth_uuid = Some(uuid);
        self
    }

    /// The pre-issued access token of the player session, this launcher performs no
    /// authentication itself. Without one, the game runs an offline session.
    #[inline]
    pub fn auth_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The user type put on the command line, `msa`, `legacy` or `mojang`.
    #[inline]
    pub fn user_type(&mut self, user_type: impl Into<String>) -> &mut Self {
        self.user_type = user_type.into();
        self
    }

    /// A specific launcher name to put on the command line.
    #[inline]
    pub fn launcher_name(&mut self, launcher_name: impl Into<String>) -> &mut Self {
        self.launcher_name = Some(launcher_name.into());
        self
    }

    /// A specific launcher version to put on the command line.
    #[inline]
    pub fn launcher_version(&mut self, launcher_version: impl Into<String>) -> &mut Self {
        self.launcher_version = Some(launcher_version.into());
        self
    }

    /// Use the given token to cooperatively interrupt the resolver workers, for
    /// example from a Ctrl-C handler.
    #[inline]
    pub fn cancel_token(&mut self, cancel: CancelToken) -> &mut Self {
        self.cancel = cancel;
        self
    }

    /// Ensure that the configured version is fully installed and return a game
    /// instance ready to be spawned.
    ///
    /// The pipeline: load and flatten the version chain, plan fetch tasks for the
    /// client JAR, libraries, asset index and objects and the Java runtime, drain the
    /// resolver pool, then stage natives, and finally compose the argument vectors.
    /// Nothing is spawned if any required artifact failed to verify.
    pub fn install(&self, mut handler: impl Handler) -> Result<Game> {
        self.install_dyn(handler.as_launch_dyn())
    }

    fn install_dyn(&self, handler: &mut dyn Handler) -> Result<Game> {

        let game = &self.game;
        let host = Host::current();

        fs::create_dir_all(game.root())
            .map_err(|e| Error::new_io_file(e, game.root().to_path_buf()))?;

        let mut features = HashSet::new();
        if self.demo {
            features.insert("is_demo_user".to_string());
        }
        if self.resolution.is_some() {
            features.insert("has_custom_resolution".to_string());
        }

        // One client per resolve operation, shared by every component that requests.
        let client = crate::http::new_client()?;

        // Load and flatten the version chain, fetching missing official versions.
        let mut manifest = ManifestCache::new();
        let chain = version::load_chain(game, &self.id, &mut manifest, &client, &mut *handler)?;
        let flattened = version::flatten(&chain)?;

        // If we don't find the main class it is impossible to launch.
        let main_class = flattened.metadata.main_class.clone()
            .ok_or(Error::MainClassNotFound)?;

        // Plan all fetch tasks.
        let mut batch = Batch::new();
        let lib_files = load_libraries(game, &flattened, &features, host, &mut batch, &mut *handler)?;
        let logger = load_logger(game, &flattened, &mut batch)?;
        let assets = assets::load_assets(game, &flattened, &client, &mut batch, &mut *handler)?;
        let jvm = jvm::load_jvm(game, flattened.metadata.java_version.as_ref(), self.java_path.as_deref(), &client, &mut batch, &mut *handler)?;

        self.drain(batch, &client, &mut *handler)?;

        jvm::finalize_jvm(&jvm)?;

        // Second batch: materialize virtual assets and stage natives, both require
        // the downloaded files.
        let mut batch = Batch::new();
        if let Some(assets) = &assets {
            assets::plan_mapping_tasks(game, assets, &mut batch);
        }
        let natives_dir = self.plan_natives(&flattened, &lib_files, &mut batch)?;
        self.drain(batch, &client, &mut *handler)?;

        handler.handle_event(Event::NativesExtracted { dir: &natives_dir });

        // The class path joins every allowed library and the client JAR. Entries are
        // canonicalized because the game resolves relative paths against its working
        // directory.
        let mut class_files = lib_files.class_files;
        for file in &mut class_files {
            *file = canonicalize_file(file)?;
        }

        let classpath = class_files.iter()
            .map(|file| file.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(CLASSPATH_SEPARATOR);

        // Resolve argument lists from the flattened metadata.
        let (mut jvm_args, mut game_args) = base_args(&flattened.metadata, &features, host);

        // The logger configuration is an additional JVM argument.
        if let Some(logger) = &logger {
            let logger_file = canonicalize_file(&logger.file)?;
            jvm_args.push(logger.argument.replace("${path}", &logger_file.to_string_lossy()));
        }

        // User-supplied arguments come after the version-defined ones and get the
        // same substitutions.
        jvm_args.extend(self.extra_jvm_args.iter().cloned());
        game_args.extend(self.extra_game_args.iter().cloned());

        // The working directory, redirected to the version directory in isolation.
        let work_dir = if self.isolate {
            game.version_dir(&flattened.id)
        } else {
            game.root().to_path_buf()
        };

        fs::create_dir_all(&work_dir)
            .map_err(|e| Error::new_io_file(e, work_dir.clone()))?;
        fs::create_dir_all(game.assets_dir())
            .map_err(|e| Error::new_io_file(e, game.assets_dir()))?;
        fs::create_dir_all(game.libraries_dir())
            .map_err(|e| Error::new_io_file(e, game.libraries_dir()))?;

        // Paths on the command line are canonicalized, relative paths confuse the
        // game which resolves them against its working directory.
        let work_dir = canonicalize_file(&work_dir)?;
        let natives_dir = canonicalize_file(&natives_dir)?;
        let assets_dir = canonicalize_file(&game.assets_dir())?;
        let libraries_dir = canonicalize_file(&game.libraries_dir())?;
        let assets_virtual_dir = match &assets {
            Some(Assets { virtual_dir: Some(dir), .. }) => Some(canonicalize_file(dir)?),
            _ => None,
        };

        let username = self.username.clone()
            .unwrap_or_else(default_username);
        let auth_uuid = self.auth_uuid
            .unwrap_or_else(|| offline_player_uuid(&username));

        let (resolution_width, resolution_height) = self.resolution.unwrap_or((854, 480));

        let mut substitute = |name: &str| -> Option<String> {
            Some(match name {
                "classpath" => classpath.clone(),
                "classpath_separator" => CLASSPATH_SEPARATOR.to_string(),
                "natives_directory" => natives_dir.display().to_string(),
                "launcher_name" => self.launcher_name.as_deref()
                    .unwrap_or(env!("CARGO_PKG_NAME"))
                    .to_string(),
                "launcher_version" => self.launcher_version.as_deref()
                    .unwrap_or(env!("CARGO_PKG_VERSION"))
                    .to_string(),
                "version_name" => flattened.id.clone(),
                "version_type" => return flattened.metadata.r#type
                    .map(|t| t.as_str().to_string()),
                "game_directory" => work_dir.display().to_string(),
                "library_directory" => libraries_dir.display().to_string(),
                "assets_root" => assets_dir.display().to_string(),
                "assets_index_name" => return assets.as_ref()
                    .map(|assets| assets.id.clone()),
                // Legacy virtual assets...
                "game_assets" => return assets_virtual_dir.as_ref()
                    .map(|dir| dir.display().to_string()),
                "auth_player_name" => username.clone(),
                "auth_uuid" => auth_uuid.as_simple().to_string(),
                "auth_access_token" => self.auth_token.clone().unwrap_or_default(),
                // Legacy sessions, only valid with a real token.
                "auth_session" => match self.auth_token.as_deref() {
                    Some(token) => format!("token:{token}:{}", auth_uuid.as_simple()),
                    None => String::new(),
                },
                "auth_xuid" => String::new(),
                "clientid" => String::new(),
                "user_type" => self.user_type.clone(),
                "user_properties" => "{}".to_string(),
                "resolution_width" => resolution_width.to_string(),
                "resolution_height" => resolution_height.to_string(),
                _ => return None,
            })
        };

        replace_strings_args(&mut jvm_args, &mut substitute);
        replace_strings_args(&mut game_args, &mut substitute);

        Ok(Game {
            work_dir,
            jvm_file: jvm.file,
            main_class,
            jvm_args,
            game_args,
            env: self.env.clone(),
        })

    }

    /// Run the resolver pool on the given batch and fail on any aggregated error.
    fn drain(&self, mut batch: Batch, client: &Client, handler: &mut dyn Handler) -> Result<()> {

        if batch.is_empty() {
            return Ok(());
        }

        handler.handle_event(Event::ResourcesDownloading { count: batch.len() });
        let result = batch.execute(client, self.concurrency, &self.cancel, &mut *handler);

        if result.is_cancelled() {
            return Err(Error::Cancelled);
        } else if result.has_errors() {
            return Err(Error::Download { errors: result.into_errors() });
        }

        handler.handle_event(Event::ResourcesDownloaded {  });
        Ok(())

    }

    /// Plan the extraction of every natives JAR into a fresh run-unique directory
    /// `versions/<id>/natives-<token>`, honoring each library's exclusion prefixes.
    fn plan_natives(&self, flattened: &Flattened, lib_files: &LibraryFiles, batch: &mut Batch) -> Result<PathBuf> {

        let token = Uuid::new_v4().simple().to_string();
        let dir = self.game.version_natives_dir(&flattened.id, &token[..8]);

        fs::create_dir_all(&dir)
            .map_err(|e| Error::new_io_file(e, dir.clone()))?;

        for jar in &lib_files.natives {
            let task = batch.push_unpack(jar.file.clone(), dir.clone());
            for exclude in &jar.excludes {
                task.add_exclude(exclude.as_str());
            }
        }

        Ok(dir)

    }

}

/// Resolved library files of a version.
#[derive(Debug, Default)]
struct LibraryFiles {
    /// Every JAR of the class path, the client JAR last.
    class_files: Vec<PathBuf>,
    /// Natives JARs to be extracted into the natives directory, with their per-entry
    /// exclusion prefixes.
    natives: Vec<NativesJar>,
}

#[derive(Debug)]
struct NativesJar {
    file: PathBuf,
    excludes: Vec<String>,
}

/// Resolved logger configuration of a version.
#[derive(Debug)]
struct LoggerConfig {
    argument: String,
    file: PathBuf,
}

/// Resolve the flattened libraries into concrete files, planning downloads for the
/// missing ones. Natives classifiers are resolved per host (with `${arch}`
/// replacement) and rules are evaluated, denied libraries are skipped entirely.
fn load_libraries(
    game: &GameDir,
    flattened: &Flattened,
    features: &HashSet<String>,
    host: &Host,
    batch: &mut Batch,
    handler: &mut dyn Handler,
) -> Result<LibraryFiles> {

    let client_file = load_client(game, flattened, batch, handler)?;

    let mut lib_files = LibraryFiles::default();
    let mut seen = HashSet::new();

    for lib in &flattened.metadata.libraries {

        let mut gav = lib.name.clone();
        let mut natives = false;

        if let Some(lib_natives) = &lib.natives {

            // No host facts means no natives variant can ever apply.
            let (Some(os_name), Some(os_bits)) = (host.name, host.bits) else {
                continue;
            };

            // The classifier associated to the OS overrides the library specifier
            // classifier, a library without natives for this OS is just skipped.
            let Some(classifier) = lib_natives.get(os_name) else {
                continue;
            };

            gav.set_classifier(Some(&classifier.replace("${arch}", os_bits)));
            natives = true;

        }

        // Rules are checked after natives so a rejected library is skipped with its
        // resolved classifier accounted for.
        if let Some(rules) = &lib.rules {
            if !rule::eval(rules, features, host) {
                continue;
            }
        }

        // The flattening already deduplicated coordinates, but classifier resolution
        // above can still produce collisions, first occurrence wins.
        let mut gav_any_version = gav.clone();
        gav_any_version.set_version("*");
        if !seen.insert(gav_any_version.to_string()) {
            continue;
        }

        let dl = if natives {
            lib.downloads.classifiers.get(gav.classifier())
        } else {
            lib.downloads.artifact.as_ref()
        };

        // An explicit artifact path takes over the GAV-derived one.
        let lib_file = match dl.and_then(|dl| dl.path.as_deref()) {
            // NOTE: Unsafe path joining.
            Some(rel_path) => game.libraries_dir().join(rel_path),
            None => game.library_file(&gav),
        };

        // Without explicit download information, the 'url' property gives the root
        // of a maven repository to derive the artifact URL from. Libraries with
        // empty URLs have been seen in the wild and mean no download source at all.
        let source = match dl {
            Some(dl) => Some((dl.download.url.clone(), dl.download.size, dl.download.sha1.as_deref().copied())),
            None => lib.url.as_deref().map(|repo_url| (gav.url(repo_url), None, None)),
        }.filter(|(url, _, _)| !url.is_empty());

        if let Some((url, size, sha1)) = source {
            if !download::check_file(&lib_file, size, sha1.as_ref())
                .map_err(|e| Error::new_io_file(e, lib_file.clone()))? {
                batch.push(url, lib_file.clone())
                    .set_expected_size(size)
                    .set_expected_sha1(sha1);
            }
        } else if !lib_file.is_file() {
            // No download source and not installed, the game cannot be launched.
            return Err(Error::LibraryNotFound { gav });
        }

        if natives {
            lib_files.natives.push(NativesJar {
                file: lib_file,
                excludes: lib.extract.as_ref().map(|e| e.exclude.clone()).unwrap_or_default(),
            });
        } else {
            lib_files.class_files.push(lib_file);
        }

    }

    lib_files.class_files.push(client_file);

    handler.handle_event(Event::LibrariesLoaded {
        class_count: lib_files.class_files.len(),
        natives_count: lib_files.natives.len(),
    });

    Ok(lib_files)

}

/// Locate the client JAR of the flattened version, planning its download if needed.
/// The JAR belongs to the version that defined `downloads.client`, for a modded
/// version that is the vanilla version it inherits from.
fn load_client(
    game: &GameDir,
    flattened: &Flattened,
    batch: &mut Batch,
    handler: &mut dyn Handler,
) -> Result<PathBuf> {

    let client_file = game.version_client_file(&flattened.client_id);

    if let Some(dl) = flattened.metadata.downloads.get("client") {
        if !download::check_file(&client_file, dl.size, dl.sha1.as_deref())
            .map_err(|e| Error::new_io_file(e, client_file.clone()))? {
            batch.push(dl.url.as_str(), client_file.clone())
                .set_expected_size(dl.size)
                .set_expected_sha1(dl.sha1.as_deref().copied());
        }
    } else if !client_file.is_file() {
        return Err(Error::ClientNotFound);
    }

    handler.handle_event(Event::ClientLoaded { file: &client_file });

    Ok(client_file)

}

/// Load the optional client logger configuration, planning its download if needed.
fn load_logger(game: &GameDir, flattened: &Flattened, batch: &mut Batch) -> Result<Option<LoggerConfig>> {

    let Some(config) = flattened.metadata.logging.get("client") else {
        return Ok(None);
    };

    let file = game.log_configs_dir().join(config.file.id.as_str());

    let dl = &config.file.download;
    if !download::check_file(&file, dl.size, dl.sha1.as_deref())
        .map_err(|e| Error::new_io_file(e, file.clone()))? {
        batch.push(dl.url.as_str(), file.clone())
            .set_expected_size(dl.size)
            .set_expected_sha1(dl.sha1.as_deref().copied());
    }

    Ok(Some(LoggerConfig {
        argument: config.argument.clone(),
        file,
    }))

}

/// Build the base JVM and game argument lists from the flattened metadata: walk the
/// structured arguments keeping literals and rule-allowed conditionals, or, for
/// legacy versions, synthesize default JVM arguments and whitespace-split
/// `minecraftArguments` into the game list.
fn base_args(
    metadata: &serde::VersionMetadata,
    features: &HashSet<String>,
    host: &Host,
) -> (Vec<String>, Vec<String>) {

    let mut jvm_args = Vec::new();
    let mut game_args = Vec::new();

    if let Some(arguments) = &metadata.arguments {
        check_args(&mut jvm_args, &arguments.jvm, features, host);
        check_args(&mut game_args, &arguments.game, features, host);
    } else if let Some(legacy_arguments) = &metadata.legacy_arguments {
        jvm_args.extend(LEGACY_JVM_ARGS.iter().copied().map(str::to_string));
        game_args.extend(legacy_arguments.split_whitespace().map(str::to_string));
    }

    (jvm_args, game_args)

}

/// Resolve metadata arguments into the destination vector, checking conditional
/// entries' rules, a list-valued conditional expands inline.
fn check_args(
    dest: &mut Vec<String>,
    args: &[serde::VersionArgument],
    features: &HashSet<String>,
    host: &Host,
) {

    for arg in args {

        if let serde::VersionArgument::Conditional(cond) = arg {
            if let Some(rules) = &cond.rules {
                if !rule::eval(rules, features, host) {
                    continue;
                }
            }
        }

        match arg {
            serde::VersionArgument::Raw(val) => dest.push(val.clone()),
            serde::VersionArgument::Conditional(cond) =>
                match &cond.value {
                    serde::SingleOrVec::Single(val) => dest.push(val.clone()),
                    serde::SingleOrVec::Vec(vals) => dest.extend_from_slice(vals),
                },
        }

    }

}

/// Apply arguments replacement for each string, explained in [`replace_string_args`].
pub(crate) fn replace_strings_args<F>(args: &mut [String], mut func: F)
where
    F: FnMut(&str) -> Option<String>,
{
    for arg in args {
        replace_string_args(arg, &mut func);
    }
}

/// Given a string buffer, search for each placeholder of the form `${name}`, give its
/// name to the given closure and if some value is returned, replace it by this value.
/// Placeholders the closure doesn't know are left verbatim.
pub(crate) fn replace_string_args<F>(s: &mut String, mut func: F)
where
    F: FnMut(&str) -> Option<String>,
{

    // Everything before this index has already been checked.
    let mut cursor = 0;

    while let Some(open_idx) = s[cursor..].find("${") {

        let open_idx = cursor + open_idx;
        let Some(close_idx) = s[open_idx + 2..].find('}') else { break };
        let close_idx = open_idx + 2 + close_idx + 1;
        cursor = close_idx;

        if let Some(value) = func(&s[open_idx + 2..close_idx - 1]) {

            s.replace_range(open_idx..close_idx, &value);

            let repl_len = close_idx - open_idx;
            let repl_diff = value.len() as isize - repl_len as isize;
            cursor = cursor.checked_add_signed(repl_diff).unwrap();

        }

    }

}

/// Derive the deterministic offline UUID of a player name, the same derivation
/// Mojang's authlib uses in offline mode: the RFC 4122 version 3 (MD5) UUID of the
/// string `OfflinePlayer:<name>`.
pub fn offline_player_uuid(username: &str) -> Uuid {

    let mut context = md5::Context::new();
    context.write_fmt(format_args!("OfflinePlayer:{username}")).unwrap();

    uuid::Builder::from_bytes(context.compute().0)
        .with_variant(uuid::Variant::RFC4122)
        .with_version(uuid::Version::Md5)
        .into_uuid()

}

/// The default player name when none is configured, derived from the host name,
/// truncated to the 16 characters the game accepts.
fn default_username() -> String {

    let mut name = gethostname::gethostname().to_string_lossy().into_owned();

    if name.len() > 16 {
        let mut end = 16;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }

    if name.is_empty() {
        name.push_str("Player");
    }

    name

}

/// Internal shortcut to canonicalize a file or directory, mapping the error.
#[inline]
fn canonicalize_file(file: &Path) -> Result<PathBuf> {
    dunce::canonicalize(file).map_err(|e| Error::new_io_file(e, file.to_path_buf()))
}

/// Description of an installed game ready to be launched. The argument lists are
/// fully substituted.
#[derive(Debug, Clone)]
pub struct Game {
    /// Working directory the JVM process runs in.
    pub work_dir: PathBuf,
    /// Path to the JVM executable file.
    pub jvm_file: PathBuf,
    /// The main class that contains the JVM entrypoint.
    pub main_class: String,
    /// List of JVM arguments (before the main class in the command line).
    pub jvm_args: Vec<String>,
    /// List of game arguments (after the main class in the command line).
    pub game_args: Vec<String>,
    /// Environment variables overlaid on the process environment.
    pub env: Vec<(String, String)>,
}

impl Game {

    /// Create a command to launch the process, this command can be modified if you wish.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.jvm_file);
        command
            .current_dir(&self.work_dir)
            .args(&self.jvm_args)
            .arg(&self.main_class)
            .args(&self.game_args)
            .envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }

    /// Create a command to launch the process and directly spawn the process.
    pub fn spawn(&self) -> io::Result<Child> {
        self.command().spawn()
    }

    /// Spawn the process and wait for it to finish.
    pub fn spawn_and_wait(&self) -> io::Result<ExitStatus> {
        self.spawn()?.wait()
    }

}

/// Handler for events happening while installing.
pub trait Handler: download::Handler {

    /// Handle an event from the launcher.
    fn handle_event(&mut self, event: Event) {
        let _ = event;
    }

    fn as_launch_dyn(&mut self) -> &mut dyn Handler
    where Self: Sized {
        self
    }

}

/// Blanket implementation that does nothing.
impl Handler for () { }

impl<H: Handler + ?Sized> Handler for &'_ mut H {
    fn handle_event(&mut self, event: Event) {
        (*self).handle_event(event)
    }
}

/// An event produced while installing, to be rendered by the frontend.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event<'a> {
    /// A version of the chain will be loaded from its metadata file.
    VersionLoading {
        id: &'a str,
        file: &'a Path,
    },
    /// A version is missing locally and will be fetched from the official manifest.
    VersionFetching {
        id: &'a str,
    },
    /// The missing version has been fetched.
    VersionFetched {
        id: &'a str,
    },
    /// A version of the chain has been loaded.
    VersionLoaded {
        id: &'a str,
        file: &'a Path,
    },
    /// The whole version chain has been loaded, child first.
    ChainLoaded {
        chain: &'a [version::Version],
    },
    /// The client JAR file has been resolved.
    ClientLoaded {
        file: &'a Path,
    },
    /// Libraries have been resolved and verified.
    LibrariesLoaded {
        class_count: usize,
        natives_count: usize,
    },
    /// The asset index will be loaded.
    AssetsLoading {
        id: &'a str,
    },
    /// All assets have been verified.
    AssetsVerified {
        id: &'a str,
        count: usize,
    },
    /// A Mojang-provided JVM of this major version will be resolved.
    JvmLoading {
        major_version: u32,
    },
    /// The JVM has been resolved.
    JvmLoaded {
        file: &'a Path,
        version: Option<&'a str>,
    },
    /// Missing resources will be downloaded.
    ResourcesDownloading {
        count: usize,
    },
    /// All resources have been successfully downloaded.
    ResourcesDownloaded {},
    /// All natives have been extracted to the given run-unique directory.
    NativesExtracted {
        dir: &'a Path,
    },
}

/// The launcher could not proceed to the installation of a version.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The given version is neither installed nor known to the official manifest.
    #[error("version not found: {id}")]
    VersionNotFound {
        id: String,
    },
    /// The version chain revisits an id.
    #[error("cyclic inheritance: {id}")]
    CyclicInheritance {
        id: String,
    },
    /// A metadata or manifest JSON document could not be deserialized.
    #[error("malformed descriptor: {error} @ {file}")]
    MalformedDescriptor {
        #[source]
        error: serde_path_to_error::Error<serde_json::Error>,
        file: Box<Path>,
    },
    /// The client JAR has no download information and is not installed, it is
    /// mandatory to build the class path.
    #[error("client not found")]
    ClientNotFound,
    /// A library has no download source and is missing from the libraries directory.
    #[error("library not found: {gav}")]
    LibraryNotFound {
        gav: Gav,
    },
    /// The version references an asset index that is neither installed nor
    /// downloadable.
    #[error("assets not found: {id}")]
    AssetsNotFound {
        id: String,
    },
    #[error("main class not found")]
    MainClassNotFound,
    /// No JVM of the required major version for this host, or its download failed.
    #[error("jvm not available for major version {major_version}")]
    JavaUnavailable {
        major_version: u32,
    },
    /// A generic system's IO error with optional file source.
    #[error("io: {error} @ {file:?}")]
    Io {
        #[source]
        error: io::Error,
        file: Option<Box<Path>>,
    },
    /// A standalone reqwest error, before any task ran.
    #[error("request: {error}")]
    Request {
        #[from]
        error: reqwest::Error,
    },
    /// One or more fetch tasks failed after the resolver pool drained.
    #[error("download failed for {} task(s)", errors.len())]
    Download {
        errors: Vec<TaskError>,
    },
    /// The installation has been cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Type alias for a result with the launcher error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {

    #[inline]
    pub fn new_io(error: io::Error) -> Self {
        Self::Io { error, file: None }
    }

    #[inline]
    pub fn new_io_file(error: io::Error, file: impl Into<Box<Path>>) -> Self {
        Self::Io { error, file: Some(file.into()) }
    }

    #[inline]
    pub fn new_json_file(error: serde_path_to_error::Error<serde_json::Error>, file: impl Into<Box<Path>>) -> Self {
        Self::MalformedDescriptor { error, file: file.into() }
    }

}

impl From<TaskError> for Error {
    fn from(error: TaskError) -> Self {
        Self::Download { errors: vec![error] }
    }
}

#[cfg(test)]
mod tests {

    use std::collections::HashSet;

    use crate::rule::Host;
    use super::{base_args, offline_player_uuid, replace_string_args, replace_strings_args};

    fn host() -> Host {
        Host {
            name: Some("linux"),
            arch: Some("x86_64"),
            bits: Some("64"),
            version: Some("6.1".to_string()),
        }
    }

    #[test]
    fn replace_known_and_unknown() {

        let mut s = "--gameDir=${game_directory} --keep ${unknown} ${broken".to_string();
        replace_string_args(&mut s, |name| match name {
            "game_directory" => Some("/game".to_string()),
            _ => None,
        });

        assert_eq!(s, "--gameDir=${game_directory} --keep ${unknown} ${broken"
            .replace("${game_directory}", "/game"));

    }

    #[test]
    fn replace_adjacent_args() {

        let mut args = vec![
            "${a}${a}".to_string(),
            "-Dx=${b}".to_string(),
        ];

        replace_strings_args(&mut args, |name| match name {
            "a" => Some("aaaa".to_string()),
            "b" => Some("".to_string()),
            _ => None,
        });

        assert_eq!(args, ["aaaaaaaa", "-Dx="]);

    }

    #[test]
    fn legacy_arguments_composed() {

        let metadata: crate::version::serde::VersionMetadata = serde_json::from_str(r#"{
            "id": "1.8.9",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--username ${auth_player_name} --version ${version_name}"
        }"#).unwrap();

        let (jvm_args, mut game_args) = base_args(&metadata, &HashSet::new(), &host());

        assert!(jvm_args.contains(&"-cp".to_string()));
        assert!(jvm_args.contains(&"${classpath}".to_string()));

        replace_strings_args(&mut game_args, |name| match name {
            "auth_player_name" => Some("Steve".to_string()),
            "version_name" => Some("1.8.9".to_string()),
            _ => None,
        });

        assert_eq!(game_args, ["--username", "Steve", "--version", "1.8.9"]);

    }

    #[test]
    fn conditional_arguments_gated_by_features() {

        let metadata: crate::version::serde::VersionMetadata = serde_json::from_str(r#"{
            "id": "1.21",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {
                "game": [
                    "--version", "${version_name}",
                    {"rules": [{"action": "allow", "features": {"is_demo_user": true}}], "value": "--demo"},
                    {"rules": [{"action": "allow", "features": {"has_custom_resolution": true}}],
                     "value": ["--width", "${resolution_width}", "--height", "${resolution_height}"]}
                ],
                "jvm": [
                    {"rules": [{"action": "allow", "os": {"name": "osx"}}], "value": "-XstartOnFirstThread"},
                    "-cp", "${classpath}"
                ]
            }
        }"#).unwrap();

        let features = HashSet::new();
        let (jvm_args, game_args) = base_args(&metadata, &features, &host());
        assert_eq!(jvm_args, ["-cp", "${classpath}"]);
        assert_eq!(game_args, ["--version", "${version_name}"]);

        // With features enabled, the conditional values expand inline.
        let features = HashSet::from(["is_demo_user".to_string(), "has_custom_resolution".to_string()]);
        let (_, game_args) = base_args(&metadata, &features, &host());
        assert_eq!(game_args, [
            "--version", "${version_name}", "--demo",
            "--width", "${resolution_width}", "--height", "${resolution_height}",
        ]);

    }

    #[test]
    fn offline_uuid_derivation() {

        let uuid = offline_player_uuid("Steve");

        // Deterministic, version 3 (MD5), RFC 4122 variant.
        assert_eq!(uuid, offline_player_uuid("Steve"));
        assert_ne!(uuid, offline_player_uuid("Alex"));
        assert_eq!(uuid.get_version_num(), 3);
        assert_eq!(uuid.get_variant(), uuid::Variant::RFC4122);

        // Same bytes as hashing "OfflinePlayer:<name>" with the nibbles forced.
        let digest = md5::compute("OfflinePlayer:Steve".as_bytes());
        let expected = uuid::Builder::from_md5_bytes(digest.0).into_uuid();
        assert_eq!(uuid, expected);

    }

}
