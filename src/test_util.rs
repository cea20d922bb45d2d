//! Test utilities for exercising convergence against a fake provider.
//!
//! [`MockCloud`] is an in-memory stand-in for the provider API: it records
//! every call, mutates its own state the way the provider would, serves
//! paginated listings and can inject one failure at a chosen call. Listings
//! are deliberately over-broad (the filter is recorded but not applied) so
//! callers exercise their own sub-record matching.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{
    ApiError, AssociationApi, Filter, RouteTable, RouteTableAssociation, RouteTablePage, TagApi,
};
use crate::types::Tag;

/// One recorded provider call, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeRouteTables {
        filter: Filter,
        token: Option<String>,
    },
    Associate {
        route_table_id: String,
        subnet_id: String,
    },
    Disassociate {
        association_id: String,
    },
    CreateTags {
        resource_id: String,
        tags: Vec<Tag>,
    },
    DeleteTags {
        resource_id: String,
        tags: Vec<Tag>,
    },
}

/// Which call the mock should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// Fail the nth describe call, 1-based.
    DescribePage(usize),
    /// Fail associating this route table.
    Associate(String),
    /// Fail removing this association handle.
    Disassociate(String),
    CreateTags,
    DeleteTags,
}

#[derive(Default)]
struct MockState {
    route_tables: Vec<RouteTable>,
    tags: HashMap<String, Vec<Tag>>,
    calls: Vec<Call>,
    describe_count: usize,
    fail_on: Option<FailOn>,
}

pub struct MockCloud {
    state: Mutex<MockState>,
    page_size: usize,
    empty_final_token: bool,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            page_size: 100,
            empty_final_token: false,
        }
    }

    /// Serve listings in pages of `page_size` tables.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Mark the last listing page with an empty-string token instead of no
    /// token at all. Both forms terminate pagination.
    pub fn with_empty_final_token(mut self) -> Self {
        self.empty_final_token = true;
        self
    }

    /// Add an association record to `route_table_id`, creating the table if
    /// needed. `subnet` is `None` for a main association.
    pub async fn seed_association(
        &self,
        route_table_id: &str,
        association_id: &str,
        subnet: Option<&str>,
    ) {
        let mut state = self.state.lock().await;
        let assoc = RouteTableAssociation {
            association_id: association_id.to_string(),
            route_table_id: route_table_id.to_string(),
            subnet_id: subnet.map(str::to_string),
        };
        match state
            .route_tables
            .iter()
            .position(|t| t.route_table_id == route_table_id)
        {
            Some(idx) => state.route_tables[idx].associations.push(assoc),
            None => state.route_tables.push(RouteTable {
                route_table_id: route_table_id.to_string(),
                associations: vec![assoc],
            }),
        }
    }

    pub async fn seed_tags(&self, resource_id: &str, tags: &[Tag]) {
        self.state
            .lock()
            .await
            .tags
            .insert(resource_id.to_string(), tags.to_vec());
    }

    /// Make the matching call fail with an injected error. The trigger stays
    /// armed until [`clear_failures`](Self::clear_failures).
    pub async fn fail_on(&self, fail: FailOn) {
        self.state.lock().await.fail_on = Some(fail);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.fail_on = None;
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Route table IDs currently associated with `subnet_id`, in seed order.
    pub async fn associations_of(&self, subnet_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .route_tables
            .iter()
            .flat_map(|t| &t.associations)
            .filter(|a| a.subnet_id.as_deref() == Some(subnet_id))
            .map(|a| a.route_table_id.clone())
            .collect()
    }

    pub async fn tags_of(&self, resource_id: &str) -> Vec<Tag> {
        self.state
            .lock()
            .await
            .tags
            .get(resource_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssociationApi for MockCloud {
    async fn describe_route_tables(
        &self,
        filter: &Filter,
        next_token: Option<&str>,
    ) -> Result<RouteTablePage, ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::DescribeRouteTables {
            filter: filter.clone(),
            token: next_token.map(str::to_string),
        });
        state.describe_count += 1;
        if let Some(FailOn::DescribePage(n)) = &state.fail_on {
            if state.describe_count == *n {
                return Err(ApiError::new("injected describe failure"));
            }
        }

        let start = match next_token {
            None | Some("") => 0,
            Some(token) => token
                .strip_prefix('t')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    ApiError::with_code("InvalidParameterValue", "malformed pagination token")
                })?,
        };
        let end = usize::min(start + self.page_size, state.route_tables.len());
        let route_tables = state.route_tables[start..end].to_vec();
        let next_token = if end < state.route_tables.len() {
            Some(format!("t{end}"))
        } else if self.empty_final_token {
            Some(String::new())
        } else {
            None
        };

        Ok(RouteTablePage {
            route_tables,
            next_token,
        })
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Associate {
            route_table_id: route_table_id.to_string(),
            subnet_id: subnet_id.to_string(),
        });
        if let Some(FailOn::Associate(id)) = &state.fail_on {
            if id == route_table_id {
                return Err(ApiError::new("injected associate failure"));
            }
        }

        let assoc = RouteTableAssociation {
            association_id: format!("rtbassoc-{}", Uuid::new_v4().simple()),
            route_table_id: route_table_id.to_string(),
            subnet_id: Some(subnet_id.to_string()),
        };
        match state
            .route_tables
            .iter()
            .position(|t| t.route_table_id == route_table_id)
        {
            Some(idx) => state.route_tables[idx].associations.push(assoc),
            None => state.route_tables.push(RouteTable {
                route_table_id: route_table_id.to_string(),
                associations: vec![assoc],
            }),
        }
        Ok(())
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Disassociate {
            association_id: association_id.to_string(),
        });
        if let Some(FailOn::Disassociate(id)) = &state.fail_on {
            if id == association_id {
                return Err(ApiError::new("injected disassociate failure"));
            }
        }

        let mut found = false;
        for table in &mut state.route_tables {
            let before = table.associations.len();
            table.associations.retain(|a| a.association_id != association_id);
            found |= table.associations.len() != before;
        }
        if !found {
            return Err(ApiError::with_code(
                "InvalidAssociationID.NotFound",
                &format!("association {association_id} does not exist"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TagApi for MockCloud {
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::CreateTags {
            resource_id: resource_id.to_string(),
            tags: tags.to_vec(),
        });
        if matches!(state.fail_on, Some(FailOn::CreateTags)) {
            return Err(ApiError::new("injected create-tags failure"));
        }

        // Creating a tag for an existing key overwrites its value.
        let entry = state.tags.entry(resource_id.to_string()).or_default();
        for tag in tags {
            match entry.iter().position(|t| t.key == tag.key) {
                Some(idx) => entry[idx].value = tag.value.clone(),
                None => entry.push(tag.clone()),
            }
        }
        Ok(())
    }

    async fn delete_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::DeleteTags {
            resource_id: resource_id.to_string(),
            tags: tags.to_vec(),
        });
        if matches!(state.fail_on, Some(FailOn::DeleteTags)) {
            return Err(ApiError::new("injected delete-tags failure"));
        }

        if let Some(entry) = state.tags.get_mut(resource_id) {
            entry.retain(|t| !tags.iter().any(|d| d.key == t.key && d.value == t.value));
        }
        Ok(())
    }
}
