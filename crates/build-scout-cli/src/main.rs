use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use build_scout_core::config::Config;
use build_scout_core::metadata::CacheFile;
use build_scout_core::{
    BuildRecord, CancelToken, Channel, DirectoryWatcher, Library, LibraryFolder, MetadataEvent,
    MetadataStore, Orchestrator, Platform, PlatformProfile, ReqwestClient, Result, ScoutError,
    ScrapeEvent, WatchEvent,
};

mod args;
use args::{ChannelArg, Cli, Commands, ConfigAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = resolve_base_dir(cli.base_dir).and_then(|base_dir| match cli.command {
        Some(Commands::Scrape { channels }) => handle_scrape(&base_dir, &channels),
        Some(Commands::List) => handle_list(&base_dir),
        Some(Commands::Info { path, json }) => handle_info(&path, json),
        Some(Commands::Favorite { path, unset }) => handle_favorite(&path, !unset),
        Some(Commands::Rename { path, name }) => handle_rename(&path, name),
        Some(Commands::Watch { path, interval }) => handle_watch(&base_dir, path, interval),
        Some(Commands::Config { action }) => handle_config(action, &base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "build-scout", &mut io::stdout());
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(base) = cli_base {
        return Ok(base);
    }

    if let Ok(base) = std::env::var("BUILD_SCOUT_BASE") {
        return Ok(PathBuf::from(base));
    }

    dirs::home_dir()
        .map(|h| h.join(".build-scout"))
        .ok_or(ScoutError::HomeNotFound)
}

fn profile() -> Arc<PlatformProfile> {
    Arc::new(PlatformProfile::current())
}

fn channel(arg: ChannelArg) -> Channel {
    match arg {
        ChannelArg::Stable => Channel::Stable,
        ChannelArg::Daily => Channel::Daily,
        ChannelArg::Experimental => Channel::Experimental,
        ChannelArg::Patch => Channel::Patch,
    }
}

fn handle_scrape(base_dir: &Path, channels: &[ChannelArg]) -> Result<()> {
    let config = Config::load(base_dir)?;
    let user_agent = format!(
        "build-scout/{} ({})",
        env!("CARGO_PKG_VERSION"),
        Platform::current().describe()
    );
    let http = Arc::new(ReqwestClient::new(user_agent, config.http.timeout()));

    let mut orchestrator = Orchestrator::new(&config, profile(), http);
    if !channels.is_empty() {
        let selected: Vec<Channel> = channels.iter().copied().map(channel).collect();
        orchestrator = orchestrator.with_channels(&selected);
    }

    let (events, handle) = orchestrator.spawn();

    println!();
    let mut found = 0;
    let mut outcome = Ok(());
    for event in events.iter() {
        match event {
            ScrapeEvent::Found(record) => {
                found += 1;
                print_build(&record);
            }
            ScrapeEvent::LatestTag(tag) => {
                println!();
                println!("Latest launcher release: {}", tag.cyan());
            }
            ScrapeEvent::Done => {
                println!();
                println!("{} {} build(s)", "Found:".green(), found);
            }
            ScrapeEvent::Error(failure) => {
                tracing::debug!(%failure, "scrape failed");
                outcome = Err(ScoutError::SourcesUnreachable);
            }
        }
    }

    if handle.join().is_err() {
        tracing::error!("scrape worker panicked");
    }
    outcome
}

fn print_build(record: &BuildRecord) {
    let hash = record.build_hash().unwrap_or("-");
    println!(
        "  {:<14} {:<28} {}  {}",
        record.branch().to_string().cyan(),
        record.display_name().bold(),
        record.commit_time(),
        hash.dimmed()
    );
    println!("    {}", record.link().dimmed());
}

fn handle_list(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir)?;
    let library = Library::new(config.library_folder(base_dir));
    let builds = library.installed_builds()?;

    if builds.is_empty() {
        println!("No builds installed in {}", library.root().display());
        return Ok(());
    }

    let store = Arc::new(MetadataStore::new(profile()));
    let pending: Vec<_> = builds
        .into_iter()
        .map(|(folder, path)| {
            let (rx, handle) = Orchestrator::load_installed(store.clone(), path.clone());
            (folder, path, rx, handle)
        })
        .collect();

    println!();
    println!("Library: {}", library.root().display());
    let mut current: Option<LibraryFolder> = None;
    for (folder, path, rx, handle) in pending {
        if current != Some(folder) {
            println!();
            println!("{}:", folder.to_string().bold());
            current = Some(folder);
        }

        match rx.recv() {
            Ok(MetadataEvent::Loaded(record)) => {
                let star = if record.is_favorite() { "★" } else { " " };
                println!(
                    "  {} {:<28} {:<12} {}",
                    star.yellow(),
                    record.display_name().cyan(),
                    record.commit_time(),
                    record.build_hash().unwrap_or("-").dimmed()
                );
            }
            Ok(MetadataEvent::Failed { path, message }) => {
                println!(
                    "  {} {} ({})",
                    "?".red(),
                    path.file_name().unwrap_or_default().to_string_lossy(),
                    message.dimmed()
                );
            }
            Err(_) => {
                println!("  {} {}", "?".red(), path.display());
            }
        }
        let _ = handle.join();
    }
    println!();

    Ok(())
}

fn handle_info(path: &Path, json: bool) -> Result<()> {
    let store = MetadataStore::new(profile());
    let record = store.load_or_derive(path)?;

    if json {
        let content = serde_json::to_string_pretty(&CacheFile::from_record(&record))?;
        println!("{}", content);
        return Ok(());
    }

    println!();
    println!("{}", record.display_name().cyan().bold());
    println!();
    println!("  Version:     {}", record.subversion());
    println!("  Branch:      {}", record.branch());
    println!("  Build hash:  {}", record.build_hash().unwrap_or("-"));
    println!("  Commit time: {}", record.commit_time());
    println!("  Favorite:    {}", if record.is_favorite() { "yes" } else { "no" });
    println!("  Platform:    {}", record.platform());
    println!("  Location:    {}", record.link());
    println!();

    Ok(())
}

fn handle_favorite(path: &Path, favorite: bool) -> Result<()> {
    let store = MetadataStore::new(profile());
    let record = store.update_user_state(path, None, Some(favorite))?;

    let label = if favorite { "Favorited:" } else { "Unfavorited:" };
    println!("{} {}", label.green(), record.display_name());
    Ok(())
}

fn handle_rename(path: &Path, name: String) -> Result<()> {
    let store = MetadataStore::new(profile());
    let record = store.update_user_state(path, Some(name.trim().to_string()), None)?;

    println!("{} {}", "Renamed:".green(), record.display_name());
    Ok(())
}

fn handle_watch(base_dir: &Path, path: Option<PathBuf>, interval: Option<u64>) -> Result<()> {
    let config = Config::load(base_dir)?;
    let interval = match interval {
        Some(0) => {
            return Err(ScoutError::InvalidConfigValue {
                key: "interval".to_string(),
                value: "0".to_string(),
            })
        }
        Some(secs) => Duration::from_secs(secs),
        None => config.watcher.poll_interval(),
    };

    let roots = match path {
        Some(path) => vec![path],
        None => {
            let library = Library::new(config.library_folder(base_dir));
            LibraryFolder::ALL
                .iter()
                .map(|f| library.folder(*f))
                .filter(|p| p.is_dir())
                .collect()
        }
    };
    if roots.is_empty() {
        println!("Nothing to watch: the library folder has no build subfolders.");
        return Ok(());
    }

    let cancel = CancelToken::new();
    let (tx, rx) = flume::unbounded::<(PathBuf, WatchEvent)>();
    let mut handles = Vec::new();

    println!();
    for root in roots {
        let watcher = DirectoryWatcher::new(&root, interval);
        println!("{} {}", "Watching:".green(), watcher.root().display());
        let (events, watcher) = watcher.spawn(cancel.clone());
        let tx = tx.clone();
        handles.push(watcher);
        handles.push(thread::spawn(move || {
            for event in events.iter() {
                if tx.send((root.clone(), event)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);
    println!();

    for (root, event) in rx.iter() {
        let folder = root.file_name().unwrap_or_default().to_string_lossy().into_owned();
        match event {
            WatchEvent::Added(names) => {
                println!("{} {}/{}", "+".green(), folder, names.join(", "))
            }
            WatchEvent::Removed(names) => {
                println!("{} {}/{}", "-".red(), folder, names.join(", "))
            }
            WatchEvent::Changed(names) => {
                println!("{} {}/{}", "~".yellow(), folder, names.join(", "))
            }
            WatchEvent::Failed { root, message } => {
                eprintln!(
                    "{} {}: {}",
                    "[WARN]".yellow().bold(),
                    root.display(),
                    message
                );
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(ScoutError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}
