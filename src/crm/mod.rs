//! CRM backend adapter
//!
//! Supplies the backend fetch functions behind the read-through list cache
//! and the post-cache views built on top of it.

mod client;
mod recent;
mod view;

pub use client::CrmClient;
pub use recent::{CrmObjects, RecentObjects};
pub use view::{ViewOptions, filter_objects, sort_objects};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Largest page the backend serves
pub const MAX_PAGE_SIZE: u32 = 100;

/// CRM record types the gateway lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// People
    Contacts,
    /// Sales opportunities
    Deals,
    /// Support tickets
    Tickets,
}

impl ResourceType {
    /// All listable resources, in response order
    pub const ALL: [Self; 3] = [Self::Contacts, Self::Deals, Self::Tickets];

    /// Name used in backend paths and cache keys
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Deals => "deals",
            Self::Tickets => "tickets",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contacts" | "contact" => Ok(Self::Contacts),
            "deals" | "deal" => Ok(Self::Deals),
            "tickets" | "ticket" => Ok(Self::Tickets),
            other => Err(Error::InvalidRequest(format!("unknown resource type: {other}"))),
        }
    }
}

/// One CRM record as the backend returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmObject {
    /// Backend identifier
    pub id: String,
    /// Property values keyed by internal property name
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Creation timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last modification timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Whether the record is archived
    #[serde(default)]
    pub archived: bool,
}

impl CrmObject {
    /// Value of a sortable field: `id`, `createdAt`, `updatedAt` or a property
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "createdAt" | "created_at" => self.created_at.clone(),
            "updatedAt" | "updated_at" => self.updated_at.clone(),
            _ => match self.properties.get(name)? {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
        }
    }
}

/// Reject pagination the backend cannot serve
pub fn validate_page(page: u32, page_size: u32) -> crate::Result<()> {
    if page == 0 {
        return Err(Error::InvalidRequest("page starts at 1".to_string()));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(Error::InvalidRequest(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}
