/// Progressive image loader
///
/// A `ProgressiveLoader` produces up to three fidelity levels of one image:
/// - Thumbnail: from the thumbnail cache, or synthesized from the large preview
/// - Large: the embedded preview from the decoder
/// - Full: the full decode
///
/// Requests are merged into a bitmask and drained by at most one background
/// worker per loader. Consumers either block until their levels are ready or
/// get notified on the UI thread through a `UiDispatcher`.

pub mod damage;
pub mod dispatch;
pub mod levels;
pub mod orientation;

pub use damage::Rect;
pub use dispatch::{Listener, LoaderEvent, UiDispatcher, UiJob, UiQueue};
pub use levels::LoadLevels;
pub use orientation::Orientation;

use image::RgbaImage;
use parking_lot::{Condvar, Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::raw::{Decoder, DiskThumbnailCache, RawDecoder, ThumbnailCache};
use damage::DamageAccumulator;

/// How `ProgressiveLoader::load` waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Return immediately with the levels already done
    Async,
    /// Block until every requested level is done
    Blocking,
}

/// A produced buffer and how to show it upright.
///
/// Cloning shares the pixels; the loader dropping its copy on disposal
/// never invalidates a clone handed out earlier.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub pixels: Arc<RgbaImage>,
    pub orientation: Orientation,
}

impl LoadedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// A rotated copy of the pixels for upright display
    pub fn upright(&self) -> RgbaImage {
        self.orientation.apply(RgbaImage::clone(&self.pixels))
    }
}

/// Bookkeeping guarded by the loader mutex
#[derive(Default)]
struct LoadState {
    requested: LoadLevels,
    completed: LoadLevels,
    /// A worker thread is running
    loading: bool,
    damage: DamageAccumulator,
    /// Bumped on every worker failure so blocking waiters can notice
    failures: u64,
    last_failure: Option<Arc<LoadError>>,
}

struct Shared {
    uri: PathBuf,
    decoder: Box<dyn Decoder>,
    cache: Arc<dyn ThumbnailCache>,
    dispatcher: Arc<dyn UiDispatcher>,
    listeners: RwLock<Vec<Listener>>,
    disposed: AtomicBool,
    state: Mutex<LoadState>,
    wake: Condvar,
    images: RwLock<[Option<LoadedImage>; 3]>,
}

/// Loads thumbnail, large and full buffers of one resource.
///
/// Dropping the loader disposes it.
pub struct ProgressiveLoader {
    shared: Arc<Shared>,
}

impl ProgressiveLoader {
    pub fn new(
        uri: impl Into<PathBuf>,
        decoder: Box<dyn Decoder>,
        cache: Arc<dyn ThumbnailCache>,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> Self {
        let shared = Shared {
            uri: uri.into(),
            decoder,
            cache,
            dispatcher,
            listeners: RwLock::new(Vec::new()),
            disposed: AtomicBool::new(false),
            state: Mutex::new(LoadState::default()),
            wake: Condvar::new(),
            images: RwLock::new(Default::default()),
        };
        Self { shared: Arc::new(shared) }
    }

    /// Loader for a camera RAW file with the on-disk thumbnail cache
    pub fn for_raw(
        uri: impl Into<PathBuf>,
        config: &LoaderConfig,
        cache: Arc<DiskThumbnailCache>,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> Self {
        let uri = uri.into();
        let decoder = RawDecoder::with_config(&uri, config);
        Self::new(uri, Box::new(decoder), cache, dispatcher)
    }

    pub fn uri(&self) -> &Path {
        &self.shared.uri
    }

    /// Register an observer. Observers are only ever called on the UI thread.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&LoaderEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.write().push(Arc::new(listener));
    }

    /// Request `levels`.
    ///
    /// Returns the requested levels that are done: immediately for
    /// `LoadMode::Async`, once all of them are for `LoadMode::Blocking`.
    /// A blocking call returns early with what is done if the loader is
    /// disposed, and with `LoadError::Failed` if the worker fails.
    /// After disposal this returns the empty set and does nothing.
    pub fn load(&self, levels: LoadLevels, mode: LoadMode) -> Result<LoadLevels> {
        self.shared.load(levels, mode)
    }

    /// Blocking load on tokio's blocking pool, for async callers
    pub async fn load_async(&self, levels: LoadLevels) -> Result<LoadLevels> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.load(levels, LoadMode::Blocking))
            .await
            .map_err(|e| LoadError::Worker(format!("Task join error: {}", e)))?
    }

    /// Stop loading for good. Aborts an in-flight decode, drops all buffers
    /// and wakes blocked callers. Safe to call more than once.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// Buffer for a single level, if produced
    pub fn image(&self, level: LoadLevels) -> Option<LoadedImage> {
        self.shared.image(level)
    }

    pub fn thumbnail(&self) -> Option<LoadedImage> {
        self.image(LoadLevels::THUMBNAIL)
    }

    pub fn large(&self) -> Option<LoadedImage> {
        self.image(LoadLevels::LARGE)
    }

    pub fn full(&self) -> Option<LoadedImage> {
        self.image(LoadLevels::FULL)
    }

    pub fn requested(&self) -> LoadLevels {
        self.shared.state.lock().requested
    }

    pub fn completed(&self) -> LoadLevels {
        self.shared.state.lock().completed
    }

    /// True while a worker thread is running
    pub fn is_loading(&self) -> bool {
        self.shared.state.lock().loading
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }
}

impl Drop for ProgressiveLoader {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for ProgressiveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ProgressiveLoader")
            .field("uri", &self.shared.uri)
            .field("requested", &state.requested)
            .field("completed", &state.completed)
            .field("loading", &state.loading)
            .finish()
    }
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn image(&self, level: LoadLevels) -> Option<LoadedImage> {
        let slot = level.index()?;
        self.images.read()[slot].clone()
    }

    fn load(self: &Arc<Self>, levels: LoadLevels, mode: LoadMode) -> Result<LoadLevels> {
        if self.is_disposed() {
            return Ok(LoadLevels::empty());
        }

        let mut state = self.state.lock();
        state.requested |= levels;
        let failures_seen = state.failures;

        if !state.loading && !state.completed.contains(state.requested) {
            log::debug!(
                "Starting worker for {} (requested: {}, done: {})",
                self.uri.display(),
                state.requested,
                state.completed
            );
            state.loading = true;
            if let Err(e) = self.spawn_worker() {
                state.loading = false;
                return Err(LoadError::Worker(format!("Failed to spawn loader thread: {}", e)));
            }
        }

        if mode == LoadMode::Async {
            return Ok(state.completed & levels);
        }

        loop {
            if state.completed.contains(levels) {
                return Ok(levels);
            }
            if self.is_disposed() {
                return Ok(state.completed & levels);
            }
            if state.failures != failures_seen {
                let cause = state
                    .last_failure
                    .clone()
                    .unwrap_or_else(|| Arc::new(LoadError::Worker("unknown failure".into())));
                return Err(LoadError::Failed(cause));
            }

            log::debug!(
                "Waiting for completion of {} (done: {})",
                levels,
                state.completed
            );
            self.wake.wait(&mut state);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.decoder.set_aborted(true);
        *self.images.write() = Default::default();

        // Wake blocked callers so they see the disposed flag
        let _state = self.state.lock();
        self.wake.notify_all();
        log::debug!("Disposed loader for {}", self.uri.display());
    }

    fn spawn_worker(self: &Arc<Self>) -> std::io::Result<()> {
        let shared = Arc::clone(self);
        thread::Builder::new()
            .name("progressive-loader".into())
            .spawn(move || shared.run_worker())
            .map(|_| ())
    }

    /// Worker loop: drain pending levels until everything requested is done
    fn run_worker(self: Arc<Self>) {
        loop {
            {
                // Exit check and clearing `loading` share one critical section,
                // otherwise a request merged right now would have no worker
                let mut state = self.state.lock();
                if self.is_disposed() || state.completed.contains(state.requested) {
                    state.loading = false;
                    log::debug!(
                        "Worker for {} done (requested: {}, done: {})",
                        self.uri.display(),
                        state.requested,
                        state.completed
                    );
                    return;
                }
            }

            if let Err(err) = self.load_pending() {
                self.fail(err);
                return;
            }
        }
    }

    fn load_pending(self: &Arc<Self>) -> Result<()> {
        if self.is_pending(LoadLevels::THUMBNAIL) {
            self.load_thumbnail()?;
        }

        if self.is_pending(LoadLevels::LARGE) {
            self.load_large()?;
        }

        if self.is_pending(LoadLevels::FULL) {
            self.load_full()?;
        }

        Ok(())
    }

    fn is_pending(&self, level: LoadLevels) -> bool {
        let state = self.state.lock();
        state.requested.contains(level) && !state.completed.contains(level)
    }

    fn load_thumbnail(self: &Arc<Self>) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        // No cached thumbnail: build it from the large preview, or ask for the
        // large preview and come back on the next pass of the worker loop
        if !self.cache.exists(&self.uri) {
            let large_done = self.state.lock().completed.contains(LoadLevels::LARGE);
            let large = self.image(LoadLevels::LARGE);

            match large {
                Some(large) if large_done => {
                    self.cache.save(&large.upright(), &self.uri)?;
                }
                _ => {
                    let escalation = LoadLevels::THUMBNAIL.escalation_on_cache_miss();
                    self.state.lock().requested |= escalation;
                    log::debug!(
                        "No cached thumbnail for {}, requesting {}",
                        self.uri.display(),
                        escalation
                    );
                    return Ok(());
                }
            }
        }

        let thumbnail = self
            .cache
            .load(&self.uri)?
            .ok_or_else(|| LoadError::ThumbnailMissingData(self.uri.clone()))?;

        self.publish(LoadLevels::THUMBNAIL, thumbnail, Orientation::TopLeft);
        Ok(())
    }

    fn load_large(self: &Arc<Self>) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        let (pixels, code) = self.decoder.load_embedded()?;
        let orientation = Orientation::from_decoder_code(code)?;

        self.publish(LoadLevels::LARGE, pixels, orientation);
        Ok(())
    }

    fn load_full(self: &Arc<Self>) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        let uri = &self.uri;
        let pixels = self.decoder.load_full(&mut |done, total| {
            log::debug!("Loading RAW {}: {}/{}", uri.display(), done, total);
        })?;

        self.publish(LoadLevels::FULL, pixels, Orientation::TopLeft);
        Ok(())
    }

    /// Store a finished buffer and signal it: prepared, updated, completed
    fn publish(self: &Arc<Self>, level: LoadLevels, pixels: RgbaImage, orientation: Orientation) {
        let Some(slot) = level.index() else {
            return;
        };
        let (width, height) = pixels.dimensions();

        {
            // Checked under the write lock so dispose can't clear before we store
            let mut images = self.images.write();
            if self.is_disposed() {
                log::debug!("Discarding {} buffer of disposed loader", level);
                return;
            }
            images[slot] = Some(LoadedImage {
                pixels: Arc::new(pixels),
                orientation,
            });
        }

        log::info!(
            "✅ {} ready for {}: {}x{} ({:?})",
            level,
            self.uri.display(),
            width,
            height,
            orientation
        );

        self.signal_area_prepared(level);
        self.signal_area_updated(level, Rect::from_size(width, height));
        self.signal_completed(level);
    }

    fn signal_area_prepared(self: &Arc<Self>, level: LoadLevels) {
        self.state.lock().damage.reset(level);
        self.post(LoaderEvent::AreaPrepared(level));
    }

    /// Merge `area` into the pending damage. Only the first update since the
    /// last flush schedules a UI job; the job takes whatever has accumulated.
    fn signal_area_updated(self: &Arc<Self>, level: LoadLevels, area: Rect) {
        if !self.state.lock().damage.add(level, area) {
            return;
        }

        let shared = Arc::downgrade(self);
        self.dispatcher.schedule(Box::new(move || {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let area = shared.state.lock().damage.take(level);
            if !area.is_empty() {
                shared.emit(&LoaderEvent::AreaUpdated { level, area });
            }
        }));
    }

    fn signal_completed(self: &Arc<Self>, level: LoadLevels) {
        {
            let mut state = self.state.lock();
            // Disposal may have raced the store in `publish`; nothing changes after it
            if self.is_disposed() {
                log::debug!("Not completing {} of disposed loader", level);
                return;
            }
            state.completed |= level;
            log::debug!(
                "Notifying completion of {} (done: {}, requested: {})",
                level,
                state.completed,
                state.requested
            );
            self.wake.notify_all();
        }

        self.post(LoaderEvent::Completed(level));
    }

    /// Worker run ended with an error
    fn fail(self: &Arc<Self>, err: LoadError) {
        let mut state = self.state.lock();
        state.loading = false;

        if self.is_disposed() {
            log::debug!("Worker for {} stopped after dispose: {}", self.uri.display(), err);
            return;
        }

        log::error!("Loading {} failed: {}", self.uri.display(), err);
        log::error!("Requested: {}, Done: {}", state.requested, state.completed);

        let err = Arc::new(err);
        state.failures += 1;
        state.last_failure = Some(Arc::clone(&err));
        self.wake.notify_all();
        drop(state);

        self.post(LoaderEvent::Failed(err));
    }

    /// Deliver `event` to observers from a UI job
    fn post(self: &Arc<Self>, event: LoaderEvent) {
        let shared = Arc::downgrade(self);
        self.dispatcher.schedule(Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.emit(&event);
            }
        }));
    }

    /// Runs on the UI thread
    fn emit(&self, event: &LoaderEvent) {
        if self.is_disposed() {
            return;
        }

        // Observers may subscribe more observers; don't hold the lock while calling out
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            if let LoaderEvent::Failed(err) = event {
                log::error!("Unhandled failure loading {}: {}", self.uri.display(), err);
            }
            return;
        }

        for listener in &listeners {
            (**listener)(event);
        }
    }
}
