//! Pure diff computation between a desired snapshot and the latest observed
//! state. No I/O here; the reconciler applies the result.

use std::collections::{HashMap, HashSet};

use crate::api::RouteTableAssociation;
use crate::types::Tag;

/// Minimal mutation set turning the observed associations into the desired
/// ones. Removals carry the full observed record because disassociation
/// needs the association handle, not the route table ID.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationDiff {
    pub to_remove: Vec<RouteTableAssociation>,
    pub to_add: Vec<String>,
}

impl AssociationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Compare desired route table IDs against the observed associations.
///
/// Membership is by route table ID. An observed association whose table is
/// not desired goes to `to_remove` (in observed order); a desired table with
/// no observed association goes to `to_add`. Duplicate desired IDs are added
/// once, first occurrence wins.
pub fn diff_associations(desired: &[String], latest: &[RouteTableAssociation]) -> AssociationDiff {
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let latest_set: HashSet<&str> = latest.iter().map(|a| a.route_table_id.as_str()).collect();

    let to_remove = latest
        .iter()
        .filter(|a| !desired_set.contains(a.route_table_id.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let to_add = desired
        .iter()
        .filter(|id| !latest_set.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    AssociationDiff { to_remove, to_add }
}

/// Mutation set for tags. A changed value shows up in `to_add` only, since
/// creating a tag overwrites the value for an existing key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagDiff {
    pub to_add: Vec<Tag>,
    pub to_remove: Vec<Tag>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare desired tags against the observed ones by key.
///
/// A desired tag whose key is missing from the observed set, or present with
/// a different value, goes to `to_add`. An observed tag whose key is not
/// desired at all goes to `to_remove`.
pub fn diff_tags(desired: &[Tag], latest: &[Tag]) -> TagDiff {
    let latest_by_key: HashMap<&str, &str> = latest
        .iter()
        .map(|t| (t.key.as_str(), t.value.as_str()))
        .collect();
    let desired_keys: HashSet<&str> = desired.iter().map(|t| t.key.as_str()).collect();

    let mut to_add = Vec::new();
    for tag in desired {
        match latest_by_key.get(tag.key.as_str()) {
            Some(value) if *value == tag.value => {}
            _ => to_add.push(tag.clone()),
        }
    }

    let mut to_remove = Vec::new();
    for tag in latest {
        if !desired_keys.contains(tag.key.as_str()) {
            to_remove.push(tag.clone());
        }
    }

    TagDiff { to_add, to_remove }
}
