//! Category hierarchy

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use crate::i18n::{Locale, Localized};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub name: Localized,
    pub position: i32,
    pub active: bool,
}

/// A category with its children, localized for output.
#[derive(Clone, Debug, Serialize)]
pub struct CategoryNode {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub position: i32,
    pub children: Vec<CategoryNode>,
}

/// Read-only view over a flat category list.
pub struct CategoryTree<'a> {
    by_id: HashMap<Uuid, &'a Category>,
    children: HashMap<Option<Uuid>, Vec<&'a Category>>,
}

impl<'a> CategoryTree<'a> {
    /// Indexes `flat`. A category whose parent is missing is treated as a root.
    pub fn new(flat: &'a [Category]) -> Self {
        let by_id: HashMap<Uuid, &Category> = flat.iter().map(|c| (c.id, c)).collect();
        let mut children: HashMap<Option<Uuid>, Vec<&Category>> = HashMap::new();
        for c in flat {
            let parent = c.parent_id.filter(|p| by_id.contains_key(p) && *p != c.id);
            children.entry(parent).or_default().push(c);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.slug.cmp(&b.slug)));
        }
        Self { by_id, children }
    }

    pub fn get(&self, id: Uuid) -> Option<&'a Category> { self.by_id.get(&id).copied() }

    /// Root nodes with their subtrees. With `active_only`, inactive categories
    /// and everything below them are left out.
    pub fn build(&self, locale: Locale, active_only: bool) -> Vec<CategoryNode> {
        let mut seen = HashSet::new();
        self.nodes(None, locale, active_only, &mut seen)
    }

    fn nodes(&self, parent: Option<Uuid>, locale: Locale, active_only: bool, seen: &mut HashSet<Uuid>) -> Vec<CategoryNode> {
        let Some(list) = self.children.get(&parent) else { return vec![] };
        let mut out = Vec::with_capacity(list.len());
        for c in list.iter().filter(|c| !active_only || c.active) {
            if !seen.insert(c.id) { continue; }
            out.push(CategoryNode {
                id: c.id,
                slug: c.slug.clone(),
                name: c.name.get(locale).to_string(),
                position: c.position,
                children: self.nodes(Some(c.id), locale, active_only, seen),
            });
        }
        out
    }

    /// Path from the root down to `id`, inclusive. Empty when `id` is unknown.
    pub fn breadcrumb(&self, id: Uuid) -> Vec<&'a Category> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);
        while let Some(c) = current {
            if !seen.insert(c.id) { break; }
            path.push(c);
            current = c.parent_id.and_then(|p| self.get(p));
        }
        path.reverse();
        path
    }

    /// `id` plus every category below it.
    pub fn descendant_ids(&self, id: Uuid) -> Vec<Uuid> {
        if !self.by_id.contains_key(&id) { return vec![]; }
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            if let Some(kids) = self.children.get(&Some(out[i])) {
                for k in kids {
                    if !out.contains(&k.id) { out.push(k.id); }
                }
            }
            i += 1;
        }
        out
    }

    /// Checks that `id` may be moved under `new_parent`.
    pub fn validate_parent(&self, id: Uuid, new_parent: Option<Uuid>) -> Result<(), CategoryError> {
        let Some(parent) = new_parent else { return Ok(()) };
        if self.get(parent).is_none() { return Err(CategoryError::ParentNotFound); }
        if self.descendant_ids(id).contains(&parent) { return Err(CategoryError::Cycle); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CategoryError { ParentNotFound, Cycle }
impl std::error::Error for CategoryError {}
impl std::fmt::Display for CategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParentNotFound => write!(f, "Parent category not found"),
            Self::Cycle => write!(f, "A category cannot be moved below itself"),
        }
    }
}
