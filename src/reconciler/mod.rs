//! Convergence of a subnet's mutable sub-resources.
//!
//! Each pass compares a desired snapshot with the latest observation and
//! issues the minimal set of provider calls to close the gap. Route table
//! associations and tags converge independently.

pub mod associations;
pub mod tags;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::api::{ApiError, AssociationApi, TagApi};
use crate::types::{Delta, Subnet, SPEC_ROUTE_TABLES, SPEC_TAGS};

/// Errors surfaced by a convergence pass. Each variant names the provider
/// call that failed and the identifier it targeted, so a caller can tell
/// exactly where a pass stopped.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Association listing failed for subnet {subnet_id}: {source}")]
    ListAssociations {
        subnet_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Route table association failed for {route_table_id} on subnet {subnet_id}: {source}")]
    Associate {
        route_table_id: String,
        subnet_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Association removal failed for {association_id}: {source}")]
    Disassociate {
        association_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Tag deletion failed on subnet {subnet_id}: {source}")]
    DeleteTags {
        subnet_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Tag creation failed on subnet {subnet_id}: {source}")]
    CreateTags {
        subnet_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Subnet has no provider-assigned ID")]
    MissingSubnetId,
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Policy for an update whose desired route table list is empty.
///
/// An empty list is ambiguous: it can mean "associations are not managed
/// here" or "remove every association". The default leaves existing
/// associations alone, matching the creation path where an empty list skips
/// association handling entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyDesired {
    /// Leave existing associations untouched.
    #[default]
    Skip,
    /// Treat the empty list as authoritative and remove all associations.
    RemoveAll,
}

/// Converges one subnet toward its desired state through the provider API.
///
/// Holds no per-subnet state. Every pass reads associations fresh, so a pass
/// interrupted by a failed call can simply be re-run; the surviving diff
/// shrinks to whatever is still missing. Concurrent passes for the same
/// subnet are not coordinated here and must be serialized by the caller.
pub struct SubnetReconciler<C> {
    client: Arc<C>,
    empty_desired: EmptyDesired,
}

impl<C> SubnetReconciler<C>
where
    C: AssociationApi + TagApi,
{
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            empty_desired: EmptyDesired::default(),
        }
    }

    /// Override the [`EmptyDesired`] policy for updates.
    pub fn with_empty_desired(mut self, policy: EmptyDesired) -> Self {
        self.empty_desired = policy;
        self
    }

    /// Run one convergence pass.
    ///
    /// `delta` names the spec fields differing between `desired` and
    /// `latest`; only those are touched. Associations converge before tags,
    /// and the first failing call aborts the pass. Calls applied before the
    /// failure stay applied; the next pass converges from wherever the
    /// provider ended up.
    ///
    /// On success returns the updated resource view: the desired spec with
    /// the latest provider-assigned status carried over.
    pub async fn update(&self, desired: &Subnet, latest: &Subnet, delta: &Delta) -> Result<Subnet> {
        let subnet_id = latest.subnet_id().ok_or(SyncError::MissingSubnetId)?;
        info!("Updating subnet {}", subnet_id);

        if delta.different_at(SPEC_ROUTE_TABLES) {
            self.update_associations(subnet_id, &desired.spec.route_tables)
                .await?;
        }
        if delta.different_at(SPEC_TAGS) {
            self.sync_tags(subnet_id, &desired.spec.tags, &latest.spec.tags)
                .await?;
        }

        let mut updated = desired.clone();
        updated.status = latest.status.clone();
        Ok(updated)
    }
}
