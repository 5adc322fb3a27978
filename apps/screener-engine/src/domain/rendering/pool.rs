//! Render Object Pool
//!
//! Keeps one bound handle per materialized index and a free list of
//! detached ones. Handles are created lazily and never destroyed before
//! teardown, so a long scroll settles into a fixed working set.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::surface::RenderSurface;
use crate::domain::catalog::Record;
use crate::domain::viewport::VisibleRange;

/// What a [`RenderPool::sync`] pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncReport {
    /// Handles released because their index left the range.
    pub released: usize,
    /// Handles bound to newly visible indices.
    pub acquired: usize,
    /// Newly visible indices with no record to show yet.
    pub missing: usize,
}

/// Pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Handles ever created.
    pub created: usize,
    /// Handles currently bound.
    pub active: usize,
    /// Handles waiting on the free list.
    pub free: usize,
    /// Acquisitions served from the free list.
    pub reused: u64,
}

/// Recycling pool of presentation handles keyed by view index.
#[derive(Debug)]
pub struct RenderPool<H> {
    active: BTreeMap<usize, H>,
    free: Vec<H>,
    created: usize,
    reused: u64,
}

impl<H> Default for RenderPool<H> {
    fn default() -> Self {
        Self {
            active: BTreeMap::new(),
            free: Vec::new(),
            created: 0,
            reused: 0,
        }
    }
}

impl<H> RenderPool<H> {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created,
            active: self.active.len(),
            free: self.free.len(),
            reused: self.reused,
        }
    }

    /// Indices currently bound, ascending.
    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.keys().copied()
    }

    /// Handle bound to an index.
    #[must_use]
    pub fn handle(&self, index: usize) -> Option<&H> {
        self.active.get(&index)
    }

    /// Bind a handle to `index`, reusing a free one when possible.
    ///
    /// The handle is cleared before binding, so no field of its previous
    /// record survives. An index that is already bound is rebound in place.
    pub fn acquire<S>(&mut self, index: usize, record: &Record, surface: &mut S) -> &H
    where
        S: RenderSurface<Handle = H>,
    {
        let mut handle = match self.active.remove(&index) {
            Some(existing) => existing,
            None => {
                if let Some(recycled) = self.free.pop() {
                    self.reused += 1;
                    recycled
                } else {
                    self.created += 1;
                    surface.create()
                }
            }
        };
        surface.clear(&mut handle);
        surface.bind(&mut handle, index, record);
        self.active.entry(index).or_insert(handle)
    }

    /// Detach the handle at `index` and return it to the free list.
    pub fn release<S>(&mut self, index: usize, surface: &mut S) -> bool
    where
        S: RenderSurface<Handle = H>,
    {
        match self.active.remove(&index) {
            Some(mut handle) => {
                surface.unbind(&mut handle, index);
                self.free.push(handle);
                true
            }
            None => false,
        }
    }

    /// Diff the bound set against `range`.
    ///
    /// Releases every bound index outside the range, then binds each index
    /// inside it that is not yet bound and for which `resolve` yields a
    /// record. Releasing first lets the new indices reuse those handles.
    pub fn sync<S, F>(&mut self, range: VisibleRange, mut resolve: F, surface: &mut S) -> SyncReport
    where
        S: RenderSurface<Handle = H>,
        F: FnMut(usize) -> Option<Arc<Record>>,
    {
        let mut report = SyncReport::default();

        let stale: Vec<usize> = self
            .active
            .keys()
            .copied()
            .filter(|index| !range.contains(*index))
            .collect();
        for index in stale {
            if self.release(index, surface) {
                report.released += 1;
            }
        }

        for index in range.as_range() {
            if self.active.contains_key(&index) {
                continue;
            }
            match resolve(index) {
                Some(record) => {
                    self.acquire(index, &record, surface);
                    report.acquired += 1;
                }
                None => report.missing += 1,
            }
        }
        report
    }

    /// Rebind every bound index from `resolve`, releasing those that no
    /// longer resolve. Used when the active view changes underneath.
    pub fn rebind_active<S, F>(&mut self, mut resolve: F, surface: &mut S) -> SyncReport
    where
        S: RenderSurface<Handle = H>,
        F: FnMut(usize) -> Option<Arc<Record>>,
    {
        let mut report = SyncReport::default();
        let indices: Vec<usize> = self.active.keys().copied().collect();
        for index in indices {
            match resolve(index) {
                Some(record) => {
                    self.acquire(index, &record, surface);
                    report.acquired += 1;
                }
                None => {
                    self.release(index, surface);
                    report.released += 1;
                }
            }
        }
        report
    }

    /// Release every bound handle to the free list.
    pub fn release_all<S>(&mut self, surface: &mut S) -> usize
    where
        S: RenderSurface<Handle = H>,
    {
        let indices: Vec<usize> = self.active.keys().copied().collect();
        let count = indices.len();
        for index in indices {
            self.release(index, surface);
        }
        count
    }

    /// Release and destroy every handle. The pool is empty afterwards.
    pub fn teardown<S>(&mut self, surface: &mut S)
    where
        S: RenderSurface<Handle = H>,
    {
        self.release_all(surface);
        for handle in self.free.drain(..) {
            surface.destroy(handle);
        }
        self.created = 0;
        self.reused = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Handle that remembers every field ever written.
    #[derive(Debug, Default)]
    struct Row {
        id: usize,
        index: Option<usize>,
        fields: Vec<(String, String)>,
    }

    #[derive(Debug, Default)]
    struct Recorder {
        next_id: usize,
        destroyed: usize,
    }

    impl RenderSurface for Recorder {
        type Handle = Row;

        fn create(&mut self) -> Row {
            self.next_id += 1;
            Row {
                id: self.next_id,
                ..Row::default()
            }
        }

        fn clear(&mut self, handle: &mut Row) {
            handle.fields.clear();
        }

        fn bind(&mut self, handle: &mut Row, index: usize, record: &Record) {
            handle.index = Some(index);
            handle
                .fields
                .push(("symbol".into(), record.symbol.to_string()));
            if let Some(name) = &record.name {
                handle.fields.push(("name".into(), name.clone()));
            }
        }

        fn unbind(&mut self, handle: &mut Row, _index: usize) {
            handle.index = None;
        }

        fn destroy(&mut self, _handle: Row) {
            self.destroyed += 1;
        }
    }

    fn records(n: usize) -> Vec<Arc<Record>> {
        (0..n)
            .map(|i| {
                let record = Record::new(format!("R{i}"), "NYSE", dec!(1));
                Arc::new(if i % 2 == 0 {
                    record.with_name(format!("Name {i}"))
                } else {
                    record
                })
            })
            .collect()
    }

    #[test]
    fn sync_materializes_range_and_recycles() {
        let data = records(100);
        let mut surface = Recorder::default();
        let mut pool = RenderPool::new();

        let report = pool.sync(VisibleRange::new(0, 10), |i| data.get(i).cloned(), &mut surface);
        assert_eq!(report.acquired, 10);
        assert_eq!(pool.stats().created, 10);

        let report = pool.sync(VisibleRange::new(5, 15), |i| data.get(i).cloned(), &mut surface);
        assert_eq!(report.released, 5);
        assert_eq!(report.acquired, 5);
        assert_eq!(pool.stats().created, 10);
        assert_eq!(pool.stats().reused, 5);
        assert_eq!(pool.active_indices().collect::<Vec<_>>(), (5..15).collect::<Vec<_>>());
    }

    #[test]
    fn rebinding_leaves_no_stale_fields() {
        let data = records(4);
        let mut surface = Recorder::default();
        let mut pool = RenderPool::new();

        // Index 0 has a name; index 1 does not.
        pool.acquire(0, &data[0], &mut surface);
        pool.release(0, &mut surface);
        let handle = pool.acquire(1, &data[1], &mut surface);

        assert_eq!(handle.id, 1);
        assert_eq!(handle.index, Some(1));
        assert_eq!(handle.fields, vec![("symbol".to_string(), "R1".to_string())]);
    }

    #[test]
    fn unresolved_indices_are_counted_not_bound() {
        let data = records(3);
        let mut surface = Recorder::default();
        let mut pool = RenderPool::new();
        let report = pool.sync(VisibleRange::new(0, 6), |i| data.get(i).cloned(), &mut surface);
        assert_eq!(report.acquired, 3);
        assert_eq!(report.missing, 3);
    }

    #[test]
    fn pool_never_shrinks_until_teardown() {
        let data = records(50);
        let mut surface = Recorder::default();
        let mut pool = RenderPool::new();

        pool.sync(VisibleRange::new(0, 20), |i| data.get(i).cloned(), &mut surface);
        pool.sync(VisibleRange::new(40, 45), |i| data.get(i).cloned(), &mut surface);
        let stats = pool.stats();
        assert_eq!(stats.created, 20);
        assert_eq!(stats.active + stats.free, 20);

        pool.teardown(&mut surface);
        assert_eq!(surface.destroyed, 20);
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn rebind_active_refreshes_in_place() {
        let data = records(10);
        let mut surface = Recorder::default();
        let mut pool = RenderPool::new();
        pool.sync(VisibleRange::new(0, 4), |i| data.get(i).cloned(), &mut surface);

        // New view: reversed, and only three rows long.
        let report = pool.rebind_active(
            |i| if i < 3 { data.get(9 - i).cloned() } else { None },
            &mut surface,
        );
        assert_eq!(report.acquired, 3);
        assert_eq!(report.released, 1);
        assert_eq!(pool.handle(0).map(|h| h.fields[0].1.as_str()), Some("R9"));
        assert_eq!(pool.stats().created, 4);
    }
}
