//! Recently created CRM objects, served through the list cache

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{CrmClient, CrmObject, ResourceType, ViewOptions, validate_page};
use crate::Result;
use crate::list_cache::ListCache;

/// One page of each listable resource
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CrmObjects {
    /// Contacts page
    pub contacts: Vec<CrmObject>,
    /// Deals page
    pub deals: Vec<CrmObject>,
    /// Tickets page
    pub tickets: Vec<CrmObject>,
}

/// Joins the CRM client with the read-through list cache
pub struct RecentObjects {
    crm: Arc<CrmClient>,
    lists: Arc<ListCache>,
}

impl RecentObjects {
    /// Create the service
    pub fn new(crm: Arc<CrmClient>, lists: Arc<ListCache>) -> Self {
        Self { crm, lists }
    }

    /// The list cache in use
    pub fn lists(&self) -> &ListCache {
        &self.lists
    }

    /// One raw page of `resource`, from cache when possible
    pub async fn page(
        &self,
        resource: ResourceType,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CrmObject>> {
        validate_page(page, page_size)?;
        self.lists
            .get_page(resource.as_str(), page, page_size, |page, page_size| {
                self.crm.fetch_page(resource, page, page_size)
            })
            .await
    }

    /// Pages of contacts, deals and tickets with the view applied after retrieval
    pub async fn collect(&self, page: u32, page_size: u32, view: &ViewOptions) -> Result<CrmObjects> {
        let (contacts, deals, tickets) = tokio::try_join!(
            self.page(ResourceType::Contacts, page, page_size),
            self.page(ResourceType::Deals, page, page_size),
            self.page(ResourceType::Tickets, page, page_size),
        )?;
        debug!(
            contacts = contacts.len(),
            deals = deals.len(),
            tickets = tickets.len(),
            "Collected recent CRM objects"
        );

        Ok(CrmObjects {
            contacts: view.apply(contacts),
            deals: view.apply(deals),
            tickets: view.apply(tickets),
        })
    }
}
