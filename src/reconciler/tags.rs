//! Tag convergence.

use tracing::{debug, info};

use crate::api::{AssociationApi, TagApi};
use crate::diff::diff_tags;
use crate::reconciler::{Result, SubnetReconciler, SyncError};
use crate::types::Tag;

impl<C> SubnetReconciler<C>
where
    C: AssociationApi + TagApi,
{
    /// Converge the tags on `subnet_id` from `latest` toward `desired`.
    ///
    /// Trusts the caller's latest snapshot instead of re-reading from the
    /// provider. At most two calls go out: one batched delete for keys no
    /// longer desired, then one batched create for new keys and changed
    /// values. A delete failure prevents the create from being attempted.
    pub async fn sync_tags(&self, subnet_id: &str, desired: &[Tag], latest: &[Tag]) -> Result<()> {
        let diff = diff_tags(desired, latest);
        if diff.is_empty() {
            debug!("Tags for subnet {} already in sync", subnet_id);
            return Ok(());
        }

        info!(
            "Converging tags for subnet {}: {} to remove, {} to add",
            subnet_id,
            diff.to_remove.len(),
            diff.to_add.len()
        );

        if !diff.to_remove.is_empty() {
            debug!("Deleting tags on subnet {}: {:?}", subnet_id, diff.to_remove);
            self.client
                .delete_tags(subnet_id, &diff.to_remove)
                .await
                .map_err(|source| SyncError::DeleteTags {
                    subnet_id: subnet_id.to_string(),
                    source,
                })?;
        }
        if !diff.to_add.is_empty() {
            debug!("Creating tags on subnet {}: {:?}", subnet_id, diff.to_add);
            self.client
                .create_tags(subnet_id, &diff.to_add)
                .await
                .map_err(|source| SyncError::CreateTags {
                    subnet_id: subnet_id.to_string(),
                    source,
                })?;
        }

        Ok(())
    }
}
