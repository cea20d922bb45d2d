//! Route table association convergence.
//!
//! Associations are always read fresh from the provider; the listing is the
//! only source of association handles, which disassociation needs.

use tracing::{debug, info, warn};

use crate::api::{AssociationApi, Filter, RouteTable, RouteTableAssociation, TagApi};
use crate::diff::diff_associations;
use crate::reconciler::{EmptyDesired, Result, SubnetReconciler, SyncError};

impl<C> SubnetReconciler<C>
where
    C: AssociationApi + TagApi,
{
    /// List every association currently linking a route table to `subnet_id`,
    /// following pagination to the end.
    ///
    /// Listing pages are denormalized: a table record carries sub-records for
    /// all of its associations, and filter semantics can return tables that
    /// do not reference the subnet at all. Only the sub-record pointing at
    /// `subnet_id` is kept; a table without one is treated as filter noise
    /// and skipped. A failed page fetch aborts the listing, dropping
    /// everything accumulated so far.
    pub async fn list_associations(&self, subnet_id: &str) -> Result<Vec<RouteTableAssociation>> {
        let filter = Filter::association_subnet_id(subnet_id);
        let mut associations = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .describe_route_tables(&filter, next_token.as_deref())
                .await
                .map_err(|source| SyncError::ListAssociations {
                    subnet_id: subnet_id.to_string(),
                    source,
                })?;

            for table in &page.route_tables {
                match subnet_association(table, subnet_id) {
                    Some(assoc) => associations.push(assoc.clone()),
                    None => warn!(
                        "Route table {} listed for subnet {} without a matching association, skipping",
                        table.route_table_id, subnet_id
                    ),
                }
            }

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(associations)
    }

    /// Converge the subnet's associations toward the desired route table IDs.
    ///
    /// Reads current associations, diffs, then applies all removals before
    /// any addition. The first failing call aborts the rest; already-applied
    /// calls are not rolled back, and re-running converges the remainder.
    pub async fn update_associations(&self, subnet_id: &str, desired: &[String]) -> Result<()> {
        if desired.is_empty() && self.empty_desired == EmptyDesired::Skip {
            debug!(
                "No route tables desired for subnet {}, leaving associations untouched",
                subnet_id
            );
            return Ok(());
        }

        let latest = self.list_associations(subnet_id).await?;
        let diff = diff_associations(desired, &latest);
        if diff.is_empty() {
            debug!("Route table associations for subnet {} already in sync", subnet_id);
            return Ok(());
        }

        info!(
            "Converging route table associations for subnet {}: {} to remove, {} to add",
            subnet_id,
            diff.to_remove.len(),
            diff.to_add.len()
        );

        for assoc in &diff.to_remove {
            self.disassociate(&assoc.association_id).await?;
        }
        for route_table_id in &diff.to_add {
            self.associate(route_table_id, subnet_id).await?;
        }

        Ok(())
    }

    /// Populate associations on a freshly created subnet.
    ///
    /// A new subnet has no associations yet, so there is nothing to list or
    /// diff: each desired route table gets one associate call, failing fast.
    pub async fn create_associations(&self, subnet_id: &str, desired: &[String]) -> Result<()> {
        for route_table_id in desired {
            self.associate(route_table_id, subnet_id).await?;
        }
        Ok(())
    }

    async fn associate(&self, route_table_id: &str, subnet_id: &str) -> Result<()> {
        debug!(
            "Associating route table {} with subnet {}",
            route_table_id, subnet_id
        );
        self.client
            .associate_route_table(route_table_id, subnet_id)
            .await
            .map_err(|source| SyncError::Associate {
                route_table_id: route_table_id.to_string(),
                subnet_id: subnet_id.to_string(),
                source,
            })
    }

    async fn disassociate(&self, association_id: &str) -> Result<()> {
        debug!("Removing route table association {}", association_id);
        self.client
            .disassociate_route_table(association_id)
            .await
            .map_err(|source| SyncError::Disassociate {
                association_id: association_id.to_string(),
                source,
            })
    }
}

/// First association sub-record on `table` referencing `subnet_id`.
fn subnet_association<'a>(
    table: &'a RouteTable,
    subnet_id: &str,
) -> Option<&'a RouteTableAssociation> {
    table
        .associations
        .iter()
        .find(|a| a.subnet_id.as_deref() == Some(subnet_id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_util::{Call, FailOn, MockCloud};

    fn reconciler(cloud: &Arc<MockCloud>) -> SubnetReconciler<MockCloud> {
        SubnetReconciler::new(cloud.clone())
    }

    #[tokio::test]
    async fn lister_follows_pagination_to_the_end() {
        let cloud = Arc::new(MockCloud::new().with_page_size(2).with_empty_final_token());
        for i in 1..=5 {
            cloud
                .seed_association(&format!("rtb-{i}"), &format!("assoc-{i}"), Some("subnet-1"))
                .await;
        }

        let listed = reconciler(&cloud)
            .list_associations("subnet-1")
            .await
            .unwrap();

        let tables: Vec<&str> = listed.iter().map(|a| a.route_table_id.as_str()).collect();
        assert_eq!(tables, vec!["rtb-1", "rtb-2", "rtb-3", "rtb-4", "rtb-5"]);

        // Three pages of 2, 2 and 1, each queried with the subnet filter and
        // the token handed back by the previous page.
        let filter = Filter::association_subnet_id("subnet-1");
        assert_eq!(
            cloud.calls().await,
            vec![
                Call::DescribeRouteTables {
                    filter: filter.clone(),
                    token: None,
                },
                Call::DescribeRouteTables {
                    filter: filter.clone(),
                    token: Some("t2".to_string()),
                },
                Call::DescribeRouteTables {
                    filter,
                    token: Some("t4".to_string()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn lister_keeps_first_matching_subrecord() {
        let cloud = Arc::new(MockCloud::new());
        // One table carrying a main association, a foreign one and two for
        // the queried subnet.
        cloud.seed_association("rtb-a", "assoc-main", None).await;
        cloud
            .seed_association("rtb-a", "assoc-other", Some("subnet-2"))
            .await;
        cloud
            .seed_association("rtb-a", "assoc-first", Some("subnet-1"))
            .await;
        cloud
            .seed_association("rtb-a", "assoc-second", Some("subnet-1"))
            .await;

        let listed = reconciler(&cloud)
            .list_associations("subnet-1")
            .await
            .unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].association_id, "assoc-first");
    }

    #[tokio::test]
    async fn lister_skips_tables_without_matching_association() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;
        // Association for a different subnet and a main association.
        cloud
            .seed_association("rtb-b", "assoc-2", Some("subnet-2"))
            .await;
        cloud.seed_association("rtb-c", "assoc-3", None).await;

        let listed = reconciler(&cloud)
            .list_associations("subnet-1")
            .await
            .unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].association_id, "assoc-1");
    }

    #[tokio::test]
    async fn lister_propagates_page_failure() {
        let cloud = Arc::new(MockCloud::new().with_page_size(1));
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;
        cloud
            .seed_association("rtb-b", "assoc-2", Some("subnet-1"))
            .await;
        cloud.fail_on(FailOn::DescribePage(2)).await;

        let err = reconciler(&cloud)
            .list_associations("subnet-1")
            .await
            .unwrap_err();

        match err {
            SyncError::ListAssociations { subnet_id, .. } => assert_eq!(subnet_id, "subnet-1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_removes_before_adding() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;
        cloud
            .seed_association("rtb-b", "assoc-2", Some("subnet-1"))
            .await;

        reconciler(&cloud)
            .update_associations("subnet-1", &["rtb-a".to_string(), "rtb-c".to_string()])
            .await
            .unwrap();

        let mutations: Vec<Call> = cloud
            .calls()
            .await
            .into_iter()
            .filter(|c| !matches!(c, Call::DescribeRouteTables { .. }))
            .collect();
        assert_eq!(
            mutations,
            vec![
                Call::Disassociate {
                    association_id: "assoc-2".to_string(),
                },
                Call::Associate {
                    route_table_id: "rtb-c".to_string(),
                    subnet_id: "subnet-1".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn update_fails_fast_on_removal_failure() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-a", Some("subnet-1"))
            .await;
        cloud
            .seed_association("rtb-b", "assoc-b", Some("subnet-1"))
            .await;
        cloud.fail_on(FailOn::Disassociate("assoc-b".to_string())).await;

        let err = reconciler(&cloud)
            .update_associations("subnet-1", &["rtb-c".to_string()])
            .await
            .unwrap_err();

        match err {
            SyncError::Disassociate { association_id, .. } => {
                assert_eq!(association_id, "assoc-b")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The addition after the failed removal must never be attempted,
        // while the removal before it went through.
        let calls = cloud.calls().await;
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::Disassociate { association_id } if association_id == "assoc-a"
        )));
        assert!(!calls.iter().any(|c| matches!(c, Call::Associate { .. })));
    }

    #[tokio::test]
    async fn update_with_empty_desired_skips_by_default() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;

        reconciler(&cloud)
            .update_associations("subnet-1", &[])
            .await
            .unwrap();

        assert!(cloud.calls().await.is_empty());
        assert_eq!(cloud.associations_of("subnet-1").await, vec!["rtb-a"]);
    }

    #[tokio::test]
    async fn update_remove_all_policy_clears_associations() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;
        cloud
            .seed_association("rtb-b", "assoc-2", Some("subnet-1"))
            .await;

        SubnetReconciler::new(cloud.clone())
            .with_empty_desired(EmptyDesired::RemoveAll)
            .update_associations("subnet-1", &[])
            .await
            .unwrap();

        assert!(cloud.associations_of("subnet-1").await.is_empty());
    }

    #[tokio::test]
    async fn update_in_sync_makes_no_mutating_calls() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;

        reconciler(&cloud)
            .update_associations("subnet-1", &["rtb-a".to_string()])
            .await
            .unwrap();

        assert!(cloud
            .calls()
            .await
            .iter()
            .all(|c| matches!(c, Call::DescribeRouteTables { .. })));
    }

    #[tokio::test]
    async fn update_with_reordered_desired_mutates_nothing() {
        // Membership is a set question; a reordered desired list still lists
        // but issues no mutations.
        let cloud = Arc::new(MockCloud::new());
        cloud
            .seed_association("rtb-a", "assoc-1", Some("subnet-1"))
            .await;
        cloud
            .seed_association("rtb-b", "assoc-2", Some("subnet-1"))
            .await;

        reconciler(&cloud)
            .update_associations("subnet-1", &["rtb-b".to_string(), "rtb-a".to_string()])
            .await
            .unwrap();

        let calls = cloud.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::DescribeRouteTables { .. }));
        assert_eq!(cloud.associations_of("subnet-1").await, vec!["rtb-a", "rtb-b"]);
    }

    #[tokio::test]
    async fn create_associations_adds_each_entry() {
        let cloud = Arc::new(MockCloud::new());

        reconciler(&cloud)
            .create_associations("subnet-1", &["rtb-a".to_string(), "rtb-b".to_string()])
            .await
            .unwrap();

        assert_eq!(
            cloud.associations_of("subnet-1").await,
            vec!["rtb-a", "rtb-b"]
        );
        // No listing happens on the creation path.
        assert!(!cloud
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, Call::DescribeRouteTables { .. })));
    }

    #[tokio::test]
    async fn create_associations_fails_fast() {
        let cloud = Arc::new(MockCloud::new());
        cloud.fail_on(FailOn::Associate("rtb-b".to_string())).await;

        let err = reconciler(&cloud)
            .create_associations(
                "subnet-1",
                &[
                    "rtb-a".to_string(),
                    "rtb-b".to_string(),
                    "rtb-c".to_string(),
                ],
            )
            .await
            .unwrap_err();

        match err {
            SyncError::Associate { route_table_id, .. } => assert_eq!(route_table_id, "rtb-b"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cloud.associations_of("subnet-1").await, vec!["rtb-a"]);
    }
}
