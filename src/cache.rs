//! Circular image cache with double-buffered look-ahead.
//!
//! The cache owns the enumerated list, the current position and two preload
//! slots holding the decoded neighbours of the current image. Paging in
//! either direction displays the matching slot and then refreshes both
//! neighbours in the background, so the next page is normally already
//! decoded.
//!
//! Each slot has a single writer: a slot keeps at most one in-flight
//! preload, and a new preload for the same slot is chained behind the
//! previous one. [`ImageCache::advance`] joins the in-flight preload of
//! the slot it is about to display before reading it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{Direction, Displayed, ImageList, ImageRecord, PreparedImage};
use crate::platform::{Launcher, Mailer};
use crate::tasks::loader::ImageLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No images.
    Empty,
    /// Images installed, nothing positioned yet.
    Ready,
    Positioned,
}

/// Wrap `index + delta` into `0..len` using Euclidean remainder.
///
/// `len` must be non-zero.
pub fn wrap_index(index: usize, delta: isize, len: usize) -> usize {
    debug_assert!(len > 0);
    let len = len as i128;
    (index as i128 + delta as i128).rem_euclid(len) as usize
}

/// Next position for `direction`. An unset cursor sits just outside the
/// ring: forward lands on the first image, backward on the last.
pub fn step(current: Option<usize>, direction: Direction, len: usize) -> usize {
    match (current, direction) {
        (None, Direction::Forward) => 0,
        (None, Direction::Backward) => len - 1,
        (Some(c), Direction::Forward) => wrap_index(c, 1, len),
        (Some(c), Direction::Backward) => wrap_index(c, -1, len),
    }
}

#[derive(Debug, Clone)]
struct Preloaded {
    index: usize,
    image: Arc<PreparedImage>,
}

#[derive(Debug, Default)]
struct Slot {
    ready: Option<Preloaded>,
    in_flight: Option<JoinHandle<Option<Preloaded>>>,
    scheduled: Option<usize>,
}

impl Slot {
    /// Wait for the in-flight preload, if any, and keep its result.
    async fn settle(&mut self) {
        let Some(handle) = self.in_flight.take() else {
            return;
        };
        match handle.await {
            Ok(result) => self.ready = result,
            Err(err) => {
                warn!("preload task failed: {err}");
                self.ready = None;
            }
        }
    }

    /// Settled image for `index`; ignores a slot that is still loading.
    fn ready_for(&self, index: usize) -> Option<&Preloaded> {
        if self.in_flight.is_some() {
            return None;
        }
        self.ready.as_ref().filter(|p| p.index == index)
    }

    fn install(&mut self, preloaded: Preloaded) {
        // A detached stale preload finishes on its own; its result is dropped.
        self.in_flight = None;
        self.scheduled = Some(preloaded.index);
        self.ready = Some(preloaded);
    }

    fn schedule<L: ImageLoader>(&mut self, loader: Arc<L>, record: ImageRecord) {
        let prior = self.in_flight.take();
        self.scheduled = Some(record.index);
        self.in_flight = Some(tokio::spawn(async move {
            if let Some(prior) = prior {
                // Single writer per slot: let the earlier preload land first.
                let _ = prior.await;
            }
            decode(loader, record).await
        }));
    }

    fn clear(&mut self) {
        self.ready = None;
        self.in_flight = None;
        self.scheduled = None;
    }
}

async fn decode<L: ImageLoader>(loader: Arc<L>, record: ImageRecord) -> Option<Preloaded> {
    let ImageRecord { index, path } = record;
    let result = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || loader.load(&path)).await
    };
    match result {
        Ok(Ok(image)) => Some(Preloaded {
            index,
            image: Arc::new(image),
        }),
        Ok(Err(err)) => {
            warn!(index, path = %path.display(), "could not load image: {err}");
            None
        }
        Err(err) => {
            warn!(index, path = %path.display(), "decode worker failed: {err}");
            None
        }
    }
}

/// Circular list of enumerated images with the previous and next
/// neighbours of the current position kept decoded.
pub struct ImageCache<L: ImageLoader> {
    images: ImageList,
    current: Option<usize>,
    shown: Option<Preloaded>,
    prev: Slot,
    next: Slot,
    loader: Arc<L>,
}

impl<L: ImageLoader> ImageCache<L> {
    /// Empty cache decoding through `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            images: ImageList::new(),
            current: None,
            shown: None,
            prev: Slot::default(),
            next: Slot::default(),
            loader: Arc::new(loader),
        }
    }

    /// Replace the backing list wholesale. Position and both slots reset;
    /// preloads still running for the old list are detached.
    pub fn load(&mut self, mut images: ImageList) {
        for (position, record) in images.iter_mut().enumerate() {
            record.index = position;
        }
        info!(count = images.len(), "image list installed");
        self.images = images;
        self.current = None;
        self.shown = None;
        self.prev.clear();
        self.next.clear();
    }

    /// Number of images installed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether no images are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Borrow the installed list (read-only).
    #[must_use]
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        match (self.images.is_empty(), self.current) {
            (true, _) => CacheState::Empty,
            (false, None) => CacheState::Ready,
            (false, Some(_)) => CacheState::Positioned,
        }
    }

    /// Current position, `None` until the first advance or seek.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Record at the current position.
    #[must_use]
    pub fn current_image(&self) -> Option<&ImageRecord> {
        self.current.and_then(|idx| self.images.get(idx))
    }

    /// Indices most recently scheduled into the `(prev, next)` slots.
    #[must_use]
    pub fn pending_preloads(&self) -> (Option<usize>, Option<usize>) {
        (self.prev.scheduled, self.next.scheduled)
    }

    /// Move one step and display the result. Returns `None` when the list is
    /// empty, leaving the state untouched.
    pub async fn advance(&mut self, direction: Direction) -> Option<Displayed> {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        let new_index = step(self.current, direction, len);
        let slot = match direction {
            Direction::Forward => &mut self.next,
            Direction::Backward => &mut self.prev,
        };
        slot.settle().await;
        let buffered = slot.ready_for(new_index).map(|p| Arc::clone(&p.image));
        let image = match buffered {
            Some(image) => {
                debug!(index = new_index, ?direction, "displaying preloaded image");
                Some(image)
            }
            None => self.load_now(new_index).await,
        };
        Some(self.commit(new_index, image))
    }

    /// Position on `index` (taken modulo the list length).
    pub async fn seek(&mut self, index: usize) -> Option<Displayed> {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        let new_index = index % len;
        self.prev.settle().await;
        self.next.settle().await;
        let buffered = self
            .prev
            .ready_for(new_index)
            .or_else(|| self.next.ready_for(new_index))
            .or_else(|| self.shown.as_ref().filter(|p| p.index == new_index))
            .map(|p| Arc::clone(&p.image));
        let image = match buffered {
            Some(image) => Some(image),
            None => self.load_now(new_index).await,
        };
        Some(self.commit(new_index, image))
    }

    async fn load_now(&self, index: usize) -> Option<Arc<PreparedImage>> {
        let record = self.images.get(index)?.clone();
        debug!(index, "preload missing; loading synchronously");
        decode(Arc::clone(&self.loader), record)
            .await
            .map(|p| p.image)
    }

    fn commit(&mut self, new_index: usize, image: Option<Arc<PreparedImage>>) -> Displayed {
        let len = self.images.len();
        let path = self.images[new_index].path.clone();
        if image.is_none() {
            warn!(index = new_index, path = %path.display(), "showing position without image");
        }
        self.current = Some(new_index);
        let previous = self.shown.take();
        self.shown = image.clone().map(|image| Preloaded {
            index: new_index,
            image,
        });

        let prev_index = wrap_index(new_index, -1, len);
        let next_index = wrap_index(new_index, 1, len);
        self.refresh_slot(Direction::Backward, prev_index, previous.as_ref());
        self.refresh_slot(Direction::Forward, next_index, previous.as_ref());
        debug!(
            current = new_index,
            prev = prev_index,
            next = next_index,
            "neighbour preloads scheduled"
        );

        Displayed {
            index: new_index,
            path,
            image,
        }
    }

    /// Point a slot at `index`, reusing an already decoded image when one is
    /// at hand and decoding in the background otherwise.
    fn refresh_slot(&mut self, which: Direction, index: usize, previous: Option<&Preloaded>) {
        let reusable = [self.shown.as_ref(), previous]
            .into_iter()
            .flatten()
            .chain(self.prev.ready_for(index))
            .chain(self.next.ready_for(index))
            .find(|p| p.index == index)
            .cloned();
        let record = self.images[index].clone();
        let slot = match which {
            Direction::Forward => &mut self.next,
            Direction::Backward => &mut self.prev,
        };
        match reusable {
            Some(preloaded) => slot.install(preloaded),
            None => slot.schedule(Arc::clone(&self.loader), record),
        }
    }

    fn require_current(&self) -> Result<&ImageRecord> {
        self.current_image().ok_or(Error::NoCurrentImage)
    }

    /// Hand the current image to `launcher` and return its path.
    ///
    /// # Errors
    /// Returns [`Error::NoCurrentImage`] when unpositioned, or the launcher's error.
    pub fn open_externally(&self, launcher: &dyn Launcher) -> Result<PathBuf> {
        let record = self.require_current()?;
        launcher.open(&record.path)?;
        Ok(record.path.clone())
    }

    /// Compose an email for the current image and return its path.
    ///
    /// # Errors
    /// Returns [`Error::NoCurrentImage`] when unpositioned, or the mailer's error.
    pub fn share(&self, mailer: &dyn Mailer) -> Result<PathBuf> {
        let record = self.require_current()?;
        mailer.compose(&record.path)?;
        Ok(record.path.clone())
    }

    /// Copy the current image into `dir` under its own file name, replacing
    /// an existing file of that name.
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let record = self.require_current()?;
        let name = record
            .path
            .file_name()
            .ok_or_else(|| std::io::Error::other("current image has no file name"))?;
        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(name);
        tokio::fs::copy(&record.path, &target).await?;
        info!(from = %record.path.display(), to = %target.display(), "image saved");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct StubLoader {
        loads: Arc<Mutex<Vec<PathBuf>>>,
        delay: Option<Duration>,
        failing: Vec<PathBuf>,
    }

    impl StubLoader {
        fn loads_of(&self, path: &str) -> usize {
            let loads = self.loads.lock().unwrap();
            loads.iter().filter(|p| *p == Path::new(path)).count()
        }
    }

    impl ImageLoader for StubLoader {
        fn load(&self, path: &Path) -> Result<PreparedImage> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.loads.lock().unwrap().push(path.to_path_buf());
            if self.failing.iter().any(|p| p == path) {
                return Err(std::io::Error::other("corrupt asset").into());
            }
            Ok(PreparedImage {
                path: path.to_path_buf(),
                width: 1,
                height: 1,
                pixels: vec![0; 4],
            })
        }
    }

    fn list(n: usize) -> ImageList {
        (0..n)
            .map(|index| ImageRecord {
                index,
                path: PathBuf::from(format!("/img/{index}")),
            })
            .collect()
    }

    #[test]
    fn wrap_is_euclidean() {
        assert_eq!(wrap_index(0, -1, 3), 2);
        assert_eq!(wrap_index(2, 1, 3), 0);
        assert_eq!(wrap_index(0, -7, 3), 2);
        assert_eq!(wrap_index(0, -1, 1), 0);
        assert_eq!(step(None, Direction::Forward, 4), 0);
        assert_eq!(step(None, Direction::Backward, 4), 3);
    }

    #[test]
    fn load_reindexes_densely() {
        let mut cache = ImageCache::new(StubLoader::default());
        cache.load(vec![
            ImageRecord {
                index: 4,
                path: PathBuf::from("/img/a"),
            },
            ImageRecord {
                index: 9,
                path: PathBuf::from("/img/b"),
            },
        ]);
        let indices: Vec<usize> = cache.images().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(cache.state(), CacheState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_advance_loads_synchronously() {
        let loader = StubLoader::default();
        let mut cache = ImageCache::new(loader.clone());
        cache.load(list(3));

        let shown = cache.advance(Direction::Forward).await.unwrap();
        assert_eq!(shown.index, 0);
        assert!(shown.image.is_some());
        assert_eq!(loader.loads_of("/img/0"), 1);
        assert_eq!(cache.pending_preloads(), (Some(2), Some(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn advance_waits_for_in_flight_preload() {
        let loader = StubLoader {
            delay: Some(Duration::from_millis(50)),
            ..StubLoader::default()
        };
        let mut cache = ImageCache::new(loader.clone());
        cache.load(list(4));
        cache.seek(0).await.unwrap();

        // The `next` slot is still decoding /img/1; advance must join it.
        let shown = cache.advance(Direction::Forward).await.unwrap();
        assert_eq!(shown.index, 1);
        assert!(shown.image.is_some());
        assert_eq!(loader.loads_of("/img/1"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_joined_slot_chains_behind_its_in_flight_preload() {
        for direction in [Direction::Forward, Direction::Backward] {
            let loader = StubLoader {
                delay: Some(Duration::from_millis(30)),
                failing: vec![PathBuf::from("/img/0")],
                ..StubLoader::default()
            };
            let mut cache = ImageCache::new(loader.clone());
            cache.load(list(4));

            // /img/0 fails, so nothing decoded can be reused for the slot
            // pointing back at it; both neighbour preloads are in flight.
            let start = cache.seek(0).await.unwrap();
            assert!(start.image.is_none());
            assert_eq!(cache.pending_preloads(), (Some(3), Some(1)));

            let shown = cache.advance(direction).await.unwrap();
            let (stale, landed) = match direction {
                Direction::Forward => (3, 1),
                Direction::Backward => (1, 3),
            };
            assert_eq!(shown.index, landed);
            assert!(shown.image.is_some());
            let expected = match direction {
                Direction::Forward => (Some(0), Some(2)),
                Direction::Backward => (Some(2), Some(0)),
            };
            assert_eq!(cache.pending_preloads(), expected);

            let (chained, fresh) = match direction {
                Direction::Forward => (&mut cache.prev, &mut cache.next),
                Direction::Backward => (&mut cache.next, &mut cache.prev),
            };
            assert!(chained.in_flight.is_some());
            chained.settle().await;
            fresh.settle().await;
            // The stale result for `stale` landed first and was replaced by
            // the failed reload of index 0.
            assert!(chained.ready.is_none());
            assert_eq!(chained.scheduled, Some(0));
            assert_eq!(fresh.ready.as_ref().map(|p| p.index), Some(2));

            let loads = loader.loads.lock().unwrap().clone();
            let stale_at = loads
                .iter()
                .position(|p| *p == PathBuf::from(format!("/img/{stale}")))
                .unwrap();
            let reload_at = loads
                .iter()
                .rposition(|p| *p == PathBuf::from("/img/0"))
                .unwrap();
            assert!(stale_at < reload_at, "loads: {loads:?}");
            assert_eq!(loader.loads_of("/img/0"), 2);

            // Paging back onto the failed index shows the position without
            // an image and keeps going.
            let back = cache
                .advance(match direction {
                    Direction::Forward => Direction::Backward,
                    Direction::Backward => Direction::Forward,
                })
                .await
                .unwrap();
            assert_eq!(back.index, 0);
            assert!(back.image.is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_image_does_not_thrash() {
        let loader = StubLoader::default();
        let mut cache = ImageCache::new(loader.clone());
        cache.load(list(1));
        for dir in [Direction::Forward, Direction::Backward, Direction::Forward] {
            let shown = cache.advance(dir).await.unwrap();
            assert_eq!(shown.index, 0);
            assert!(shown.image.is_some());
        }
        assert_eq!(loader.loads_of("/img/0"), 1);
        assert_eq!(cache.pending_preloads(), (Some(0), Some(0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reload_discards_old_position() {
        let mut cache = ImageCache::new(StubLoader::default());
        cache.load(list(3));
        cache.seek(2).await.unwrap();
        cache.load(list(2));
        assert_eq!(cache.current_index(), None);
        assert_eq!(cache.pending_preloads(), (None, None));
        let shown = cache.advance(Direction::Backward).await.unwrap();
        assert_eq!(shown.index, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn actions_without_position_report_no_current_image() {
        let cache = ImageCache::new(StubLoader::default());
        let dir = tempfile::tempdir().unwrap();
        let err = cache.save_to(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::NoCurrentImage));
    }
}
