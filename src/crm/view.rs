//! Sorting and filtering applied after cache retrieval

use serde::Deserialize;

use super::CrmObject;

/// Presentation options for a page of objects
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewOptions {
    /// Field to sort by (`id`, `createdAt`, `updatedAt` or a property name)
    pub sort_by: Option<String>,
    /// Case-insensitive substring every returned object must contain
    pub filter_by: Option<String>,
}

impl ViewOptions {
    /// Apply filter then sort to an owned page
    #[must_use]
    pub fn apply(&self, objects: Vec<CrmObject>) -> Vec<CrmObject> {
        let mut objects = match self.filter_by.as_deref() {
            Some(needle) if !needle.is_empty() => filter_objects(objects, needle),
            _ => objects,
        };
        if let Some(field) = self.sort_by.as_deref().filter(|f| !f.is_empty()) {
            sort_objects(&mut objects, field);
        }
        objects
    }
}

/// Stable sort by `field`; objects missing the field go last.
/// Integer values sort numerically ahead of all other values, which sort as text.
pub fn sort_objects(objects: &mut [CrmObject], field: &str) {
    objects.sort_by_cached_key(|obj| SortKey::of(obj.field(field)));
}

/// Total-order key for one field value
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Num(i64),
    Text(String),
    Missing,
}

impl SortKey {
    fn of(value: Option<String>) -> Self {
        match value {
            Some(v) => match v.parse::<i64>() {
                Ok(n) => Self::Num(n),
                Err(_) => Self::Text(v),
            },
            None => Self::Missing,
        }
    }
}

/// Keep objects whose JSON rendering contains `needle`, ignoring case
#[must_use]
pub fn filter_objects(objects: Vec<CrmObject>, needle: &str) -> Vec<CrmObject> {
    let needle = needle.to_lowercase();
    objects
        .into_iter()
        .filter(|obj| {
            serde_json::to_string(obj)
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .collect()
}
