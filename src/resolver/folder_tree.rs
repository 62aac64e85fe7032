//! # Folder Tree
//!
//! In-memory forest over the flat folder listing, built on demand once per
//! folder lookup. Folders whose declared parent is absent from the listing
//! are re-rooted rather than dropped.
//!
//! Path comparison is exact and case-sensitive, including spaces and
//! punctuation.

use std::collections::HashMap;

use crate::vault::record::Folder;

#[derive(Debug, Clone)]
pub struct FolderNode {
    pub uid: String,
    pub name: String,
    pub parent_uid: Option<String>,
    pub children: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FolderTree {
    nodes: HashMap<String, FolderNode>,
    roots: Vec<String>,
}

impl FolderTree {
    pub fn build(folders: &[Folder]) -> Self {
        let mut nodes: HashMap<String, FolderNode> = folders
            .iter()
            .map(|f| {
                (
                    f.uid.clone(),
                    FolderNode {
                        uid: f.uid.clone(),
                        name: f.name.clone(),
                        parent_uid: f.parent_uid.clone(),
                        children: Vec::new(),
                    },
                )
            })
            .collect();

        let mut roots = Vec::new();
        for folder in folders {
            match folder.parent_uid.as_deref().filter(|p| !p.is_empty()) {
                Some(parent) if nodes.contains_key(parent) => {
                    if let Some(node) = nodes.get_mut(parent) {
                        node.children.push(folder.uid.clone());
                    }
                }
                // No parent, or an orphan whose parent is not in the
                // listing: attach to the root list.
                _ => roots.push(folder.uid.clone()),
            }
        }

        Self { nodes, roots }
    }

    pub fn node(&self, uid: &str) -> Option<&FolderNode> {
        self.nodes.get(uid)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve a normalized path (one name per segment) to a folder UID.
    /// Sibling name collisions resolve depth-first to the first branch that
    /// completes the whole path.
    pub fn resolve_path(&self, segments: &[String]) -> Option<&str> {
        if segments.is_empty() {
            return None;
        }
        self.descend(&self.roots, segments)
    }

    fn descend<'a>(&'a self, candidates: &'a [String], segments: &[String]) -> Option<&'a str> {
        let (head, rest) = segments.split_first()?;
        for uid in candidates {
            let Some(node) = self.nodes.get(uid) else {
                continue;
            };
            if &node.name != head {
                continue;
            }
            if rest.is_empty() {
                return Some(&node.uid);
            }
            if let Some(found) = self.descend(&node.children, rest) {
                return Some(found);
            }
        }
        None
    }
}
