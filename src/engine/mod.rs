// ============================================================================
// Synchronization Engines
// ============================================================================
//
// Entry points are extension traits on persistence sessions:
//
//   session.apply_changes(&order)?;   // push graph intent into the session
//   session.save()?;
//   session.load_related(&order)?;    // wire relations the save left empty
//   accept_changes(&order)?;          // reset the graph to Unchanged
//
// ============================================================================

mod accept;
mod apply;
mod correlate;
mod load;

use crate::config::SyncOptions;
use crate::core::{AnyEntity, EntityRef, Result, TrackableEntity};
use crate::session::{AsyncPersistenceSession, PersistenceSession};
use async_trait::async_trait;
use tracing::{Instrument, debug_span};

pub use correlate::CorrelatedPair;

/// Anything that can serve as the root set of a traversal.
pub trait GraphRoots {
    fn roots(&self) -> Vec<AnyEntity>;
}

impl GraphRoots for AnyEntity {
    fn roots(&self) -> Vec<AnyEntity> {
        vec![self.clone()]
    }
}

impl GraphRoots for [AnyEntity] {
    fn roots(&self) -> Vec<AnyEntity> {
        self.to_vec()
    }
}

impl GraphRoots for Vec<AnyEntity> {
    fn roots(&self) -> Vec<AnyEntity> {
        self.clone()
    }
}

impl<T: TrackableEntity> GraphRoots for EntityRef<T> {
    fn roots(&self) -> Vec<AnyEntity> {
        vec![self.erase()]
    }
}

impl<T: TrackableEntity> GraphRoots for [EntityRef<T>] {
    fn roots(&self) -> Vec<AnyEntity> {
        self.iter().map(EntityRef::erase).collect()
    }
}

impl<T: TrackableEntity> GraphRoots for Vec<EntityRef<T>> {
    fn roots(&self) -> Vec<AnyEntity> {
        self.as_slice().roots()
    }
}

/// Graph synchronization operations available on every persistence session.
pub trait SessionExt: PersistenceSession {
    /// Pushes the change intent of the graph(s) rooted at `roots` into the
    /// session, with default options.
    fn apply_changes<R: GraphRoots + ?Sized>(&mut self, roots: &R) -> Result<()> {
        self.apply_changes_with(roots, &SyncOptions::default())
    }

    fn apply_changes_with<R: GraphRoots + ?Sized>(
        &mut self,
        roots: &R,
        options: &SyncOptions,
    ) -> Result<()> {
        let roots = roots.roots();
        let _span = debug_span!("apply_changes", roots = roots.len()).entered();
        apply::ApplyChanges::new(self, options).run(&roots)
    }

    /// Applies the graph's changes and saves the session.
    ///
    /// A failed save leaves the session states as applied; re-running with the
    /// same graph is safe.
    fn apply_changes_and_save<R: GraphRoots + ?Sized>(&mut self, roots: &R) -> Result<()> {
        self.apply_changes(roots)?;
        self.save()
    }

    /// Loads empty references of Added nodes (and children of Added nodes).
    fn load_related<R: GraphRoots + ?Sized>(&mut self, roots: &R) -> Result<()> {
        self.load_related_with(roots, &SyncOptions::default())
    }

    /// Loads empty references; with `load_all`, for every node in the graph.
    fn load_related_all<R: GraphRoots + ?Sized>(&mut self, roots: &R, load_all: bool) -> Result<()> {
        self.load_related_with(roots, &SyncOptions::default().load_all(load_all))
    }

    fn load_related_with<R: GraphRoots + ?Sized>(
        &mut self,
        roots: &R,
        options: &SyncOptions,
    ) -> Result<()> {
        let roots = roots.roots();
        let _span = debug_span!("load_related", roots = roots.len(), load_all = options.load_all)
            .entered();
        load::LoadRelated::new(self, options).run(&roots)
    }
}

impl<S: PersistenceSession + ?Sized> SessionExt for S {}

/// Suspending variants of the session-facing operations.
#[async_trait]
pub trait AsyncSessionExt: AsyncPersistenceSession {
    async fn apply_changes_and_save_async<R: GraphRoots + ?Sized + Sync>(
        &mut self,
        roots: &R,
    ) -> Result<()> {
        self.apply_changes(roots)?;
        self.save_async().await
    }

    async fn load_related_async<R: GraphRoots + ?Sized + Sync>(
        &mut self,
        roots: &R,
        options: &SyncOptions,
    ) -> Result<()> {
        let roots = roots.roots();
        let span = debug_span!("load_related", roots = roots.len(), load_all = options.load_all);
        load::LoadRelated::new(self, options)
            .run_async(&roots)
            .instrument(span)
            .await
    }
}

impl<S: AsyncPersistenceSession + ?Sized> AsyncSessionExt for S {}

/// Marks every node reachable from `roots` Unchanged, clears modified
/// properties, and removes Deleted items from collections.
///
/// Returns the number of removed items. Calling it again is a no-op.
pub fn accept_changes<R: GraphRoots + ?Sized>(roots: &R) -> Result<usize> {
    let roots = roots.roots();
    let _span = debug_span!("accept_changes", roots = roots.len()).entered();
    accept::accept_graph(&roots)
}

/// True when any node reachable from `roots` carries a change.
pub fn has_changes<R: GraphRoots + ?Sized>(roots: &R) -> Result<bool> {
    accept::graph_has_changes(&roots.roots())
}

/// Matches round-tripped instances with the caller's instances by correlation key.
pub fn correlate<A, B>(originals: &A, returned: &B) -> Result<Vec<CorrelatedPair>>
where
    A: GraphRoots + ?Sized,
    B: GraphRoots + ?Sized,
{
    correlate::correlate_graphs(&originals.roots(), &returned.roots())
}
