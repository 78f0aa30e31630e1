use serde::Serialize;
use thiserror::Error;

use crate::catalog_store::{CatalogError, EntityKind};
use crate::remote::RemoteError;
use crate::snapshot::ItemFailure;

/// Failures that end a reconciliation pass. Its writes are rolled back.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not authenticated with Spotify: {0}")]
    Unauthenticated(String),

    #[error("Could not read the remote collection: {0}")]
    Remote(RemoteError),

    #[error("Catalog storage failed: {0}")]
    Storage(CatalogError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthenticated(reason) => SyncError::Unauthenticated(reason),
            other => SyncError::Remote(other),
        }
    }
}

impl From<CatalogError> for SyncError {
    fn from(err: CatalogError) -> Self {
        SyncError::Storage(err)
    }
}

/// Outcome of one reconciliation pass over one entity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub kind: EntityKind,
    /// Distinct ids seen in the remote collection, failed records included.
    pub remote_total: usize,
    /// Rows written for ids that were not in the catalog before the pass.
    pub added: usize,
    pub removed: usize,
    /// Removal candidates kept because something still references them.
    pub retained: usize,
    pub failures: Vec<ItemFailure>,
}

impl PassReport {
    pub fn new(kind: EntityKind) -> Self {
        PassReport {
            kind,
            remote_total: 0,
            added: 0,
            removed: 0,
            retained: 0,
            failures: Vec::new(),
        }
    }

    /// The `(added, removed)` pair a pass is summarized by.
    pub fn counts(&self) -> (usize, usize) {
        (self.added, self.removed)
    }
}

/// Outcome of syncing artists, albums and tracks in that order.
///
/// Passes that completed stay committed even when a later one fails.
#[derive(Debug, Default)]
pub struct SyncAllReport {
    pub artists: Option<PassReport>,
    pub albums: Option<PassReport>,
    pub tracks: Option<PassReport>,
    pub failure: Option<(EntityKind, SyncError)>,
}

impl SyncAllReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn passes(&self) -> impl Iterator<Item = &PassReport> {
        [&self.artists, &self.albums, &self.tracks]
            .into_iter()
            .filter_map(|p| p.as_ref())
    }

    pub(crate) fn record(&mut self, report: PassReport) {
        match report.kind {
            EntityKind::Artist => self.artists = Some(report),
            EntityKind::Album => self.albums = Some(report),
            EntityKind::Track => self.tracks = Some(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_split_by_authentication() {
        assert!(matches!(
            SyncError::from(RemoteError::Unauthenticated("expired".into())),
            SyncError::Unauthenticated(_)
        ));
        assert!(matches!(
            SyncError::from(RemoteError::Transient("503".into())),
            SyncError::Remote(_)
        ));
    }

    #[test]
    fn sync_all_report_lists_completed_passes_in_order() {
        let mut report = SyncAllReport::default();
        report.record(PassReport::new(EntityKind::Album));
        report.record(PassReport::new(EntityKind::Artist));

        let kinds: Vec<EntityKind> = report.passes().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![EntityKind::Artist, EntityKind::Album]);
        assert!(report.is_complete());
    }
}
