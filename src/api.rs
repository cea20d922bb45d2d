//! Cloud provider API boundary.
//!
//! The engine only ever talks to these two traits. The embedding binary
//! supplies the real client; wire transport, retry/backoff, pagination token
//! plumbing and credentials are its concern, not this crate's. Errors coming
//! back over the boundary are propagated verbatim, never retried here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Tag;

/// Server-side filter name scoping a route table listing to the tables
/// associated with one subnet.
pub const ASSOCIATION_SUBNET_ID: &str = "association.subnet-id";

/// Server-side filter for list queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    /// Filter matching route tables that carry an association with `subnet_id`.
    pub fn association_subnet_id(subnet_id: &str) -> Self {
        Self {
            name: ASSOCIATION_SUBNET_ID.to_string(),
            values: vec![subnet_id.to_string()],
        }
    }
}

/// One association sub-record as reported by the provider: the opaque handle
/// needed to remove the association plus the two resources it links.
///
/// `subnet_id` is absent for main and gateway associations, which reference
/// no subnet at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableAssociation {
    pub association_id: String,
    pub route_table_id: String,
    pub subnet_id: Option<String>,
}

/// One route table record in a listing page, carrying all of its association
/// sub-records (denormalized: also ones for other subnets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub route_table_id: String,
    pub associations: Vec<RouteTableAssociation>,
}

/// One page of a route table listing. A missing or empty `next_token` marks
/// the last page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTablePage {
    pub route_tables: Vec<RouteTable>,
    pub next_token: Option<String>,
}

/// Error returned by a provider API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Provider error code, e.g. `InvalidRouteTableID.NotFound`.
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(message: &str) -> Self {
        Self {
            code: None,
            message: message.to_string(),
        }
    }

    pub fn with_code(code: &str, message: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            message: message.to_string(),
        }
    }
}

/// Route table association operations.
#[async_trait]
pub trait AssociationApi: Send + Sync {
    /// Fetch one page of route tables matching `filter`. Pass the previous
    /// page's token to continue; `None` starts from the beginning.
    async fn describe_route_tables(
        &self,
        filter: &Filter,
        next_token: Option<&str>,
    ) -> Result<RouteTablePage, ApiError>;

    /// Associate a route table with a subnet.
    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<(), ApiError>;

    /// Remove an association by its handle. There is no removal by route
    /// table ID; the handle comes from a prior listing.
    async fn disassociate_route_table(&self, association_id: &str) -> Result<(), ApiError>;
}

/// Tag operations. Both calls take the full batch for one resource.
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), ApiError>;

    async fn delete_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), ApiError>;
}
