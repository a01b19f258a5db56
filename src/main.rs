use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use tiered_loader::{
    DiskThumbnailCache, LoadLevels, LoadMode, LoaderConfig, LoaderEvent, ProgressiveLoader, UiQueue,
};

/// Supported RAW file extensions (common formats)
const RAW_EXTENSIONS: [&str; 16] = [
    "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2", "pef", "srw", "erf", "kdc", "dcr",
    "mos", "raw", "rwl",
];

/// How long one turn of the UI loop waits for a job
const UI_TICK: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    name = "tiered-loader",
    version,
    about = "Load thumbnails, embedded previews and full images of RAW photos"
)]
struct Args {
    /// Log loader internals
    #[arg(short, long)]
    verbose: bool,

    /// Config file (JSON). Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Levels to load, comma separated
    #[arg(long, value_enum, value_delimiter = ',', default_value = "thumbnail,large,full")]
    levels: Vec<Level>,

    /// Write every loaded level as PNG into this directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Request levels without blocking and let the UI loop pick up the results
    #[arg(long)]
    non_blocking: bool,

    /// RAW files or folders to scan
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Level {
    Thumbnail,
    Large,
    Full,
}

impl From<Level> for LoadLevels {
    fn from(level: Level) -> Self {
        match level {
            Level::Thumbnail => LoadLevels::THUMBNAIL,
            Level::Large => LoadLevels::LARGE,
            Level::Full => LoadLevels::FULL,
        }
    }
}

/// Everything one file run needs besides its path
struct Session {
    config: LoaderConfig,
    cache: Arc<DiskThumbnailCache>,
    queue: UiQueue,
    levels: LoadLevels,
    mode: LoadMode,
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = load_config(args.config.as_deref())?;
    let cache = Arc::new(DiskThumbnailCache::from_config(&config));
    log::debug!("Thumbnail cache: {}", cache.dir().display());

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let files = collect_raw_files(&args.paths);
    if files.is_empty() {
        log::warn!("No RAW files found");
        return Ok(());
    }
    log::info!("🔍 Found {} RAW files", files.len());

    let session = Session {
        config,
        cache,
        queue: UiQueue::new(),
        levels: args.levels.iter().fold(LoadLevels::empty(), |acc, &l| acc | LoadLevels::from(l)),
        mode: if args.non_blocking { LoadMode::Async } else { LoadMode::Blocking },
        output: args.output,
    };

    let mut failed = 0;
    for path in &files {
        if let Err(e) = session.load_file(path) {
            log::error!("❌ {}: {:#}", path.display(), e);
            failed += 1;
        }
    }

    log::info!("📊 Summary: {} loaded, {} failed", files.len() - failed, failed);
    if failed > 0 {
        anyhow::bail!("{} of {} files failed to load", failed, files.len());
    }
    Ok(())
}

impl Session {
    fn load_file(&self, path: &Path) -> Result<()> {
        let loader = ProgressiveLoader::for_raw(
            path,
            &self.config,
            Arc::clone(&self.cache),
            self.queue.dispatcher(),
        );

        let name = file_name(path);
        loader.subscribe(move |event| log_event(&name, event));

        let result = loader.load(self.levels, self.mode);

        // This thread is the UI thread: deliver events until the worker settles
        while loader.is_loading() || !self.queue.is_empty() {
            self.queue.run_next(UI_TICK);
        }

        result.with_context(|| format!("Loading {}", self.levels))?;

        let done = loader.completed() & self.levels;
        if done != self.levels {
            anyhow::bail!("only {} of {} loaded", done, self.levels);
        }

        if let Some(dir) = &self.output {
            for level in LoadLevels::EACH.into_iter().filter(|l| done.contains(*l)) {
                let Some(image) = loader.image(level) else {
                    continue;
                };
                let target = dir.join(format!("{}.{}.png", file_stem(path), level));
                image
                    .upright()
                    .save(&target)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                log::info!("💾 Wrote {}", target.display());
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    if let Some(path) = path {
        return LoaderConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()));
    }

    match LoaderConfig::default_path() {
        Some(path) if path.exists() => LoaderConfig::load(&path)
            .with_context(|| format!("Failed to read config {}", path.display())),
        _ => Ok(LoaderConfig::default()),
    }
}

/// Expand folders into the RAW files inside them. Files named explicitly are
/// kept whatever their extension.
fn collect_raw_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        log::info!("🔍 Scanning folder: {}", path.display());
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_raw_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }

    files
}

fn is_raw_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn log_event(name: &str, event: &LoaderEvent) {
    match event {
        LoaderEvent::AreaPrepared(level) => log::debug!("{}: {} prepared", name, level),
        LoaderEvent::AreaUpdated { level, area } => log::debug!(
            "{}: {} updated at {},{} {}x{}",
            name,
            level,
            area.x,
            area.y,
            area.width,
            area.height
        ),
        LoaderEvent::Completed(level) => log::info!("✅ {}: {} loaded", name, level),
        LoaderEvent::Failed(err) => log::error!("❌ {}: {}", name, err),
    }
}
