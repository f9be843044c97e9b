//! The point location entry point.
//!
//! A [`Locator`] owns (or borrows) an index over the current mesh of a [`MeshHandle`]. The index is
//! built by the first query, rebuilt by the first query following a topology change, and shared by
//! every slave locator created from a master.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{ConfigurationError, GeometryError, LocatorResult};
use crate::index::Index;
use crate::mesh::MeshHandle;
use crate::options::LocatorOptions;
use crate::point_locator::{Hit, Matches, PointLocator, QueryResult};

/// The build state of the index of a [`Locator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    /// No index has been built yet, or the last build failed.
    Unbuilt,
    /// An index is being built.
    Building,
    /// The index matches the current mesh.
    Ready,
    /// The index was built on a mesh that has changed since.
    Invalidated,
}

#[derive(Debug)]
enum Slot<const D: usize> {
    Unbuilt,
    Building,
    Ready {
        index: Arc<Index<D>>,
        version: u64,
        epoch: usize,
    },
}

/// An index shared by a master locator and its slaves.
#[derive(Debug)]
struct IndexCell<const D: usize> {
    options: LocatorOptions,
    slot: RwLock<Slot<D>>,
    // Serializes the builds
    guard: Mutex<()>,
    builds: AtomicUsize,
}

impl<const D: usize> IndexCell<D> {
    fn new(options: LocatorOptions) -> Self {
        Self {
            options,
            slot: RwLock::new(Slot::Unbuilt),
            guard: Mutex::new(()),
            builds: AtomicUsize::new(0),
        }
    }

    fn ready(&self, version: u64) -> Option<(Arc<Index<D>>, usize)> {
        match &*self.slot.read() {
            Slot::Ready {
                index,
                version: built,
                epoch,
            } if *built == version => Some((Arc::clone(index), *epoch)),
            _ => None,
        }
    }

    /// Returns the index for the current mesh of `mesh`, building it first if needed.
    ///
    /// Concurrent callers wait for a single build and all get its outcome. The epoch identifies
    /// the build the index comes from.
    fn acquire(&self, mesh: &MeshHandle<D>) -> LocatorResult<(Arc<Index<D>>, usize)> {
        if let Some(ready) = self.ready(mesh.version()) {
            return Ok(ready);
        }

        let _guard = self.guard.lock();
        let (snapshot, version) = mesh.snapshot();
        if let Some(ready) = self.ready(version) {
            return Ok(ready);
        }

        let (reset, stale) = self.start_build();
        if stale {
            debug!("Mesh changed since the last build, rebuilding the index");
        }
        let epoch = self.builds.fetch_add(1, Ordering::AcqRel) + 1;

        match Index::build(snapshot, &self.options) {
            Ok(index) => {
                let index = Arc::new(index);
                *self.slot.write() = Slot::Ready {
                    index: Arc::clone(&index),
                    version,
                    epoch,
                };
                Ok((index, epoch))
            }
            Err(err) => {
                warn!("Failed to build the {} index: {err}", self.options.strategy);
                drop(reset);
                Err(err.into())
            }
        }
    }

    /// Marks the slot as building and tells whether it held an index for an older mesh.
    ///
    /// The slot goes back to unbuilt when the returned guard is dropped before an index is stored,
    /// including when the build panics.
    fn start_build(&self) -> (ResetOnDrop<'_, D>, bool) {
        let mut slot = self.slot.write();
        let stale = matches!(*slot, Slot::Ready { .. });
        *slot = Slot::Building;
        (ResetOnDrop(&self.slot), stale)
    }

    fn state(&self, version: u64) -> BuildState {
        match &*self.slot.read() {
            Slot::Unbuilt => BuildState::Unbuilt,
            Slot::Building => BuildState::Building,
            Slot::Ready { version: built, .. } if *built == version => BuildState::Ready,
            Slot::Ready { .. } => BuildState::Invalidated,
        }
    }
}

struct ResetOnDrop<'s, const D: usize>(&'s RwLock<Slot<D>>);

impl<const D: usize> Drop for ResetOnDrop<'_, D> {
    fn drop(&mut self) {
        let mut slot = self.0.write();
        if matches!(*slot, Slot::Building) {
            *slot = Slot::Unbuilt;
        }
    }
}

#[derive(Debug)]
enum IndexSource<'a, const D: usize> {
    Owned(IndexCell<D>),
    Shared(&'a IndexCell<D>),
}

#[derive(Clone, Copy, Debug)]
struct CachedElement {
    epoch: usize,
    slot: usize,
}

/// Locates points in the current mesh of a [`MeshHandle`].
///
/// The index is built lazily by the first query. A master locator owns its index; a slave created
/// with [`with_master`](Self::with_master) borrows the index of its master, so the master cannot be
/// dropped while a slave is alive.
///
/// When the cache is enabled, each locator remembers the last element it found and tries it, then
/// its neighbors, before running a full search. Neighbors are the elements whose inflated boxes
/// overlap, so they include every other element that may contain the same point. This pays off for
/// query points that move little from one query to the next, and the answer is always the one a
/// full search gives.
///
/// ```
/// use meshloc::{ElementId, Locator, LocatorOptions, Mesh, MeshHandle};
///
/// let mesh = MeshHandle::new(Mesh::triangle_grid(0., 1., 0., 1., 1, 1)?);
/// let locator = Locator::new(&mesh, LocatorOptions::default())?;
///
/// let result = locator.locate(&[0.75, 0.25])?;
/// assert_eq!(result.element(), Some(ElementId(0)));
/// assert!(locator.locate(&[2., 2.])?.element().is_none());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Locator<'a, const D: usize> {
    mesh: &'a MeshHandle<D>,
    source: IndexSource<'a, D>,
    enable_cache: bool,
    cache: Mutex<Option<CachedElement>>,
}

impl<'a, const D: usize> Locator<'a, D> {
    /// Creates a master locator over `mesh`.
    ///
    /// Nothing is built until the first query.
    pub fn new(mesh: &'a MeshHandle<D>, options: LocatorOptions) -> LocatorResult<Self> {
        options.validate()?;
        Ok(Self {
            mesh,
            source: IndexSource::Owned(IndexCell::new(options)),
            enable_cache: options.enable_cache,
            cache: Mutex::new(None),
        })
    }

    /// Creates a slave locator sharing the index of `master`.
    ///
    /// `mesh` must be the very handle the master was created with. The index parameters of
    /// `options` are ignored in favor of the master's; only `enable_cache` is taken into account.
    pub fn with_master(
        mesh: &'a MeshHandle<D>,
        master: &'a Locator<'_, D>,
        options: LocatorOptions,
    ) -> LocatorResult<Self> {
        if !std::ptr::eq(mesh, master.mesh) {
            return Err(ConfigurationError::MeshMismatch.into());
        }
        options.validate()?;
        Ok(Self {
            mesh,
            source: IndexSource::Shared(master.cell()),
            enable_cache: options.enable_cache,
            cache: Mutex::new(None),
        })
    }

    fn cell(&self) -> &IndexCell<D> {
        match &self.source {
            IndexSource::Owned(cell) => cell,
            IndexSource::Shared(cell) => *cell,
        }
    }

    pub fn mesh(&self) -> &'a MeshHandle<D> {
        self.mesh
    }

    /// The options in effect: the index parameters of the master, and this locator's cache flag.
    pub fn options(&self) -> LocatorOptions {
        self.cell().options.with_cache(self.enable_cache)
    }

    pub fn is_master(&self) -> bool {
        matches!(self.source, IndexSource::Owned(_))
    }

    pub fn state(&self) -> BuildState {
        self.cell().state(self.mesh.version())
    }

    /// Number of index builds started so far, including the failed ones.
    ///
    /// A master and its slaves report the same count.
    pub fn build_count(&self) -> usize {
        self.cell().builds.load(Ordering::Acquire)
    }

    /// Builds the index now instead of on the first query.
    pub fn prepare(&self) -> LocatorResult<()> {
        self.cell().acquire(self.mesh).map(|_| ())
    }

    /// The index for the current mesh, building it if needed.
    pub fn index(&self) -> LocatorResult<Arc<Index<D>>> {
        self.cell().acquire(self.mesh).map(|(index, _)| index)
    }

    /// Forgets the last located element.
    pub fn clear_cache(&self) {
        *self.cache.lock() = None;
    }

    /// Locates `point`, returning the matching element with the lowest id.
    pub fn locate(&self, point: &[f64; D]) -> LocatorResult<QueryResult<D>> {
        let (index, epoch) = self.cell().acquire(self.mesh)?;

        if self.enable_cache {
            if let Some((hit, diagnostics)) = self.search_near_cache(&index, epoch, point) {
                trace!("Cache hit for {point:?} in element {}", hit.element);
                return Ok(QueryResult::new(Some(hit), diagnostics));
            }
        }

        let mut diagnostics = Vec::new();
        let found = index.find(point, &mut diagnostics);
        if self.enable_cache {
            if let Some((slot, _)) = found {
                *self.cache.lock() = Some(CachedElement { epoch, slot });
            }
        }
        Ok(QueryResult::new(found.map(|(_, hit)| hit), diagnostics))
    }

    /// Finds every element containing `point`. The cache is not used.
    pub fn locate_all(&self, point: &[f64; D]) -> LocatorResult<Matches<D>> {
        let (index, _) = self.cell().acquire(self.mesh)?;
        index.locate_all(point)
    }

    /// Looks for the point around the cached element.
    ///
    /// The first element found there anchors the answer: every element containing the point
    /// overlaps it, so the lowest-id match is among the anchor and its neighbors.
    fn search_near_cache(
        &self,
        index: &Index<D>,
        epoch: usize,
        point: &[f64; D],
    ) -> Option<(Hit<D>, Vec<GeometryError>)> {
        let cached = (*self.cache.lock())?;
        if cached.epoch != epoch {
            return None;
        }
        let elements = index.elements();
        let mut diagnostics = Vec::new();
        let anchor = std::iter::once(cached.slot)
            .chain(elements.neighbors(cached.slot).iter().copied())
            .find(|&slot| elements.hit_test(slot, point, &mut diagnostics).is_some())?;
        let candidates =
            std::iter::once(anchor).chain(elements.neighbors(anchor).iter().copied());
        let (slot, hit) = elements.best_of(candidates, point, &mut diagnostics)?;

        // Elements tested from both the cached element and the anchor report once
        diagnostics.sort_unstable_by_key(GeometryError::element);
        diagnostics.dedup();
        if slot != cached.slot {
            *self.cache.lock() = Some(CachedElement { epoch, slot });
        }
        Some((hit, diagnostics))
    }
}

impl<const D: usize> PointLocator<D> for Locator<'_, D> {
    fn locate_one(&self, point: &[f64; D]) -> LocatorResult<QueryResult<D>> {
        self.locate(point)
    }

    fn locate_all(&self, point: &[f64; D]) -> LocatorResult<Matches<D>> {
        Locator::locate_all(self, point)
    }
}
