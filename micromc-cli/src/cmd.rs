//! Implementing the logic of the launcher command.

use std::collections::BTreeMap;
use std::process::{self, Child, ExitCode};
use std::sync::Mutex;
use std::{env, fs, io};

use micromc::download::{CancelToken, Handler as DownloadHandler};
use micromc::launch::{self, Event, Handler as LaunchHandler, Launcher};
use micromc::store::GameDir;
use micromc::{jvm, manifest, profiles};

use crate::config::{self, Config, ConfigError};
use crate::output::Output;
use crate::parse::CliArgs;


/// The running game process, killed by the Ctrl-C handler.
static GAME_CHILD: Mutex<Option<Child>> = Mutex::new(None);

pub fn main(args: CliArgs) -> ExitCode {

    let mut out = Output::new(args.verbose);

    // One Ctrl-C handler for the whole CLI: interrupt the resolver workers and kill
    // the game if it's already running.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {

            cancel.cancel();

            // No unwrap to avoid panicking if poisoned.
            if let Ok(mut guard) = GAME_CHILD.lock() {
                if let Some(mut child) = guard.take() {
                    let _ = child.kill();
                }
            }

            process::exit(130);

        }).unwrap();
    }

    match run(&mut out, &args, &cancel) {
        Ok(code) => code,
        Err(e) => {
            print_error(&mut out, &e);
            ExitCode::FAILURE
        }
    }

}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Launch(#[from] launch::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("there is no default game directory on your system, use --game-dir")]
    NoGameDir,
    #[error("no version to launch, give an id on the command line or in the config")]
    NoVersion,
}

/// Print an error with its kind and the offending artifacts where relevant.
fn print_error(out: &mut Output, error: &CliError) {

    if let CliError::Launch(launch::Error::Download { errors }) = error {
        out.error(format!("download failed for {} task(s):", errors.len()));
        for task_error in errors {
            out.error(format!("  {}: {}", task_error.origin(), task_error.kind()));
        }
    } else {
        out.error(error);
    }

}

fn run(out: &mut Output, args: &CliArgs, cancel: &CancelToken) -> Result<ExitCode, CliError> {

    // The explicit config path must load, the default one may be absent. The game
    // directory both locates the default config and can be overridden by it, so the
    // candidate directory is resolved first from the command line or the system.
    let candidate_dir = args.game_dir.clone()
        .or_else(micromc::store::default_game_dir)
        .ok_or(CliError::NoGameDir)?;

    let config = match &args.config {
        Some(file) => config::load(file)?,
        None => config::load_default(&candidate_dir)?,
    };

    let game_dir = args.game_dir.clone()
        .or_else(|| config.game_dir.clone())
        .unwrap_or(candidate_dir);
    let game = GameDir::new(game_dir);

    if args.list_versions {
        return list_versions(out, &game);
    }

    let Some(id) = args.id.clone().or_else(|| config.id.clone()) else {
        return Err(CliError::NoVersion);
    };

    // Pre-launch steps, all best-effort except profile writing which installers
    // running in `run_before` depend on.
    if args.write_profiles || config.write_profiles.unwrap_or(false) {
        fs::create_dir_all(game.root())?;
        profiles::write_profile(&game, &id)?;
        out.info("Wrote launcher profile");
    }

    delete_files(out, &game, args, &config);

    let resolver_processes = args.resolver_processes
        .or(config.resolver_processes)
        .unwrap_or(micromc::download::DEFAULT_CONCURRENCY);

    run_before(out, &game, args, &config, resolver_processes, cancel);

    // Environment overlay, config first so command line pairs win per key.
    let mut env_variables = config.env_variables.clone();
    for var in &args.env_variables {
        env_variables.insert(var.key.clone(), var.value.clone());
    }

    // Extra arguments concatenate, config first.
    let mut jvm_args = config.jvm_args.clone();
    jvm_args.extend(shell_split(out, args.jvm_args.as_deref()));
    let mut game_args = config.game_args.clone();
    game_args.extend(shell_split(out, args.game_args.as_deref()));

    let mut launcher = Launcher::new(game, id.as_str());
    launcher.cancel_token(cancel.clone());
    launcher.concurrency(resolver_processes);
    launcher.extra_jvm_args(jvm_args);
    launcher.extra_game_args(game_args);

    if args.isolate || config.isolate_profile.unwrap_or(false) {
        launcher.isolate(true);
    }

    if let Some(java_path) = args.java_path.clone().or_else(|| config.java_path.clone()) {
        launcher.java_path(java_path);
    }

    if let Some(user) = args.user.clone().or_else(|| config.user.clone()) {
        launcher.username(user);
    }

    if let Some(auth_uuid) = args.auth_uuid.or(config.auth_uuid) {
        launcher.auth_uuid(auth_uuid);
    }

    if let Some(token) = args.auth_access_token.clone().or_else(|| config.auth_access_token.clone()) {
        launcher.auth_token(token);
    }

    if let Some(user_type) = args.user_type.map(|t| t.as_str())
        .or(config.user_type.map(|t| t.as_str())) {
        launcher.user_type(user_type);
    }

    for (key, value) in env_variables {
        launcher.env(key, value);
    }

    out.phase(format!("Resolving {id}"));

    let game = launcher.install(LogHandler { out })?;

    out.phase(format!("Launching {id}"));

    let child = game.spawn()
        .map_err(launch::Error::new_io)?;

    *GAME_CHILD.lock().unwrap() = Some(child);

    // The launcher waits for the game and forwards its exit code. The child stays
    // inside the mutex while waiting so the Ctrl-C handler can still kill it, hence
    // the polling instead of a blocking wait.
    let status = loop {

        let mut guard = GAME_CHILD.lock().unwrap();
        let Some(child) = guard.as_mut() else {
            return Ok(ExitCode::FAILURE);
        };

        if let Some(status) = child.try_wait().map_err(launch::Error::new_io)? {
            guard.take();
            break status;
        }

        drop(guard);
        std::thread::sleep(std::time::Duration::from_millis(100));

    };

    match status.code() {
        Some(0) => Ok(ExitCode::SUCCESS),
        Some(code) => {
            out.warning(format!("game exited with code {code}"));
            Ok(ExitCode::from(code.clamp(0, 255) as u8))
        }
        None => {
            out.warning("game terminated by signal");
            Ok(ExitCode::FAILURE)
        }
    }

}

/// List local and official versions with provenance and release time.
fn list_versions(out: &mut Output, game: &GameDir) -> Result<ExitCode, CliError> {

    // A network failure degrades to listing local versions only.
    let manifest = micromc::http::new_client()
        .map_err(launch::Error::from)
        .and_then(|client| manifest::request_manifest(&client, &mut LogHandler { out }));

    let manifest = match manifest {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            out.warning(format!("cannot fetch the version manifest: {e}"));
            None
        }
    };

    for version in manifest::list_versions(game, manifest.as_ref())? {

        let provenance = if version.local {
            "local"
        } else {
            version.r#type.map(|t| t.as_str()).unwrap_or("unknown")
        };

        match version.release_time {
            Some(release_time) => out.phase(format!("{:<40} {:<10} {}", version.id, provenance, release_time.format("%Y-%m-%d"))),
            None => out.phase(format!("{:<40} {}", version.id, provenance)),
        }

    }

    Ok(ExitCode::SUCCESS)

}

/// Delete the files matching the configured glob patterns, relative to the game
/// directory, a best-effort pre-launch step.
fn delete_files(out: &mut Output, game: &GameDir, args: &CliArgs, config: &Config) {

    for pattern in args.delete_files.iter().chain(&config.delete_files) {

        let full_pattern = game.root().join(pattern);
        let Some(full_pattern) = full_pattern.to_str() else {
            out.warning(format!("invalid delete pattern: {pattern}"));
            continue;
        };

        let paths = match glob::glob(full_pattern) {
            Ok(paths) => paths,
            Err(e) => {
                out.warning(format!("invalid delete pattern: {pattern}: {e}"));
                continue;
            }
        };

        for path in paths {
            let Ok(path) = path else { continue };
            if path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => out.info(format!("Deleted {}", path.display())),
                    Err(e) => out.warning(format!("cannot delete {}: {e}", path.display())),
                }
            }
        }

    }

}

/// Run the configured pre-launch command, shell-split, with an optionally
/// provisioned Java runtime prepended to its PATH. Failure is a warning.
fn run_before(
    out: &mut Output,
    game: &GameDir,
    args: &CliArgs,
    config: &Config,
    resolver_processes: usize,
    cancel: &CancelToken,
) {

    let Some(command_line) = args.run_before.as_deref().or(config.run_before.as_deref()) else {
        return;
    };

    let parts = match shell_words::split(command_line) {
        Ok(parts) if !parts.is_empty() => parts,
        Ok(_) => return,
        Err(e) => {
            out.warning(format!("invalid pre-launch command: {e}"));
            return;
        }
    };

    // The pre-launch step often runs a mod loader installer, which needs a Java
    // runtime of its own before the game's one is known.
    let mut path_overlay = None::<std::ffi::OsString>;
    if let Some(major_version) = args.run_before_java.or(config.run_before_java) {
        match jvm::provision(game, major_version, resolver_processes, cancel, LogHandler { out }) {
            Ok(jvm) => {
                let bin_dir = jvm.file.parent().map(|p| p.to_path_buf()).unwrap_or_default();
                let paths = std::iter::once(bin_dir)
                    .chain(env::var_os("PATH").map(|path| env::split_paths(&path).collect::<Vec<_>>()).unwrap_or_default());
                match env::join_paths(paths) {
                    Ok(joined) => path_overlay = Some(joined),
                    Err(e) => out.warning(format!("cannot prepend java to PATH: {e}")),
                }
            }
            Err(e) => out.warning(format!("cannot provision java {major_version} for the pre-launch command: {e}")),
        }
    }

    out.phase(format!("Running pre-launch command: {command_line}"));

    let mut command = process::Command::new(&parts[0]);
    command.args(&parts[1..]).current_dir(game.root());
    if let Some(path) = path_overlay {
        command.env("PATH", path);
    }

    match command.status() {
        Ok(status) if status.success() => (),
        Ok(status) => out.warning(format!("pre-launch command exited with {status}")),
        Err(e) => out.warning(format!("pre-launch command failed: {e}")),
    }

}

/// Shell-split an extra arguments string, a malformed one degrades to nothing.
fn shell_split(out: &mut Output, raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) => match shell_words::split(raw) {
            Ok(parts) => parts,
            Err(e) => {
                out.warning(format!("invalid extra arguments: {e}"));
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

/// Handler rendering library events as one-line statuses.
struct LogHandler<'a> {
    out: &'a mut Output,
}

impl DownloadHandler for LogHandler<'_> {
    fn handle_download_progress(&mut self, count: u32, total_count: u32, _label: &str) {
        if total_count != 0 {
            self.out.progress(count, total_count);
        }
    }
}

impl LaunchHandler for LogHandler<'_> {

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::VersionLoading { id, file } =>
                self.out.info(format!("Loading version {id} ({})", file.display())),
            Event::VersionFetching { id } =>
                self.out.phase(format!("Fetching version {id}")),
            Event::ChainLoaded { chain } => {
                let ids = chain.iter().map(|v| v.id.as_str()).collect::<Vec<_>>();
                self.out.info(format!("Version chain: {}", ids.join(" -> ")));
            }
            Event::LibrariesLoaded { class_count, natives_count } =>
                self.out.info(format!("Libraries: {class_count} class path, {natives_count} natives")),
            Event::AssetsVerified { id, count } =>
                self.out.info(format!("Assets {id}: {count} objects")),
            Event::JvmLoading { major_version } =>
                self.out.info(format!("Selecting Java {major_version}")),
            Event::JvmLoaded { file, version } =>
                self.out.info(format!("Java {} ({})", version.unwrap_or("?"), file.display())),
            Event::ResourcesDownloading { count } =>
                self.out.phase(format!("Downloading {count} files")),
            Event::NativesExtracted { dir } =>
                self.out.info(format!("Natives extracted to {}", dir.display())),
            _ => (),
        }
    }

}
