//! Resource snapshot types exchanged with the caller.
//!
//! A [`Subnet`] is one point-in-time view: the declared spec plus the
//! server-assigned status. The caller hands the engine two of them per pass
//! (desired and latest observed) together with a [`Delta`] saying which
//! fields differ; the engine never merges snapshots itself.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field path of the route table association list in [`SubnetSpec`].
pub const SPEC_ROUTE_TABLES: &str = "spec.route_tables";

/// Field path of the tag list in [`SubnetSpec`].
pub const SPEC_TAGS: &str = "spec.tags";

/// Key/value tag on a cloud resource. Keys are unique per resource from the
/// provider's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Declared subnet attributes.
///
/// Only `route_tables` and `tags` are reconciled by this engine; the other
/// fields ride along so an updated view can carry them through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetSpec {
    pub cidr_block: Option<String>,
    pub vpc_id: Option<String>,
    pub availability_zone: Option<String>,
    /// Route tables this subnet should be associated with.
    pub route_tables: Vec<String>,
    pub tags: Vec<Tag>,
}

/// Server-assigned subnet attributes from the last observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetStatus {
    /// Identifier assigned by the provider at creation time. Every API call
    /// the engine issues is keyed by this.
    pub subnet_id: Option<String>,
    pub state: Option<String>,
}

/// One snapshot of a subnet: declared spec plus observed status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subnet {
    pub spec: SubnetSpec,
    pub status: SubnetStatus,
}

impl Subnet {
    /// Server-assigned subnet ID, if the resource has been created.
    pub fn subnet_id(&self) -> Option<&str> {
        self.status.subnet_id.as_deref()
    }
}

/// Tag block embedded in a create-subnet request so declared tags are applied
/// at creation rather than in a follow-up call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpecification {
    pub resource_type: String,
    pub tags: Vec<Tag>,
}

impl TagSpecification {
    /// Build the specification for a subnet create request.
    pub fn for_subnet(tags: &[Tag]) -> Self {
        Self {
            resource_type: "subnet".to_string(),
            tags: tags.to_vec(),
        }
    }
}

/// Field paths that differ between a desired and a latest snapshot.
///
/// The caller usually computes this as part of change detection;
/// [`Delta::between`] covers the two fields this engine reconciles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    paths: Vec<String>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the reconciled fields of two snapshots.
    ///
    /// Route table lists are compared positionally (a pure reordering counts
    /// as a change; converging it is a cheap no-op). Tag lists are compared as
    /// key/value maps, so reordering tags is not a change.
    pub fn between(desired: &Subnet, latest: &Subnet) -> Self {
        let mut delta = Delta::new();

        if desired.spec.route_tables != latest.spec.route_tables {
            delta.add(SPEC_ROUTE_TABLES);
        }

        if tag_map(&desired.spec.tags) != tag_map(&latest.spec.tags) {
            delta.add(SPEC_TAGS);
        }

        delta
    }

    /// Record `path` as changed.
    pub fn add(&mut self, path: &str) {
        if !self.different_at(path) {
            self.paths.push(path.to_string());
        }
    }

    /// Whether `path` was recorded as changed.
    pub fn different_at(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Key→value view of a tag list. Duplicate keys: last one wins.
fn tag_map(tags: &[Tag]) -> HashMap<&str, &str> {
    tags.iter()
        .map(|t| (t.key.as_str(), t.value.as_str()))
        .collect()
}
