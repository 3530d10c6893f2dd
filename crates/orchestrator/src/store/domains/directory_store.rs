use crate::store::core::StoreEvent;
use chrono::{DateTime, Utc};
use shared::models::Node;
use std::collections::HashSet;
use tokio::sync::{broadcast, RwLock};

/// The set of nodes the center currently knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDirectory {
    pub nodes: Vec<Node>,
    // Set until the first refresh attempt finishes, successful or not
    pub loading: bool,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl Default for NodeDirectory {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            loading: true,
            last_refreshed: None,
        }
    }
}

impl NodeDirectory {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct DirectoryChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub updated: Vec<String>,
}

impl DirectoryChanges {
    fn between(old: &[Node], new: &[Node]) -> Self {
        let old_names: HashSet<&str> = old.iter().map(|node| node.name.as_str()).collect();
        let new_names: HashSet<&str> = new.iter().map(|node| node.name.as_str()).collect();

        let added = new
            .iter()
            .filter(|node| !old_names.contains(node.name.as_str()))
            .map(|node| node.name.clone())
            .collect();
        let removed = old
            .iter()
            .filter(|node| !new_names.contains(node.name.as_str()))
            .map(|node| node.name.clone())
            .collect();
        let updated = new
            .iter()
            .filter(|node| {
                old.iter()
                    .any(|previous| previous.name == node.name && previous.info != node.info)
            })
            .map(|node| node.name.clone())
            .collect();

        Self {
            added,
            removed,
            updated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

pub struct DirectoryStore {
    directory: RwLock<NodeDirectory>,
    events: broadcast::Sender<StoreEvent>,
}

impl DirectoryStore {
    pub fn new(events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            directory: RwLock::new(NodeDirectory::default()),
            events,
        }
    }

    pub async fn snapshot(&self) -> NodeDirectory {
        self.directory.read().await.clone()
    }

    pub async fn node_names(&self) -> Vec<String> {
        self.directory.read().await.names()
    }

    pub async fn get_node(&self, name: &str) -> Option<Node> {
        self.directory.read().await.get(name).cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.directory.read().await.loading
    }

    /// Swap in a freshly fetched node set.
    pub async fn replace(&self, nodes: Vec<Node>) -> DirectoryChanges {
        let mut directory = self.directory.write().await;
        let changes = DirectoryChanges::between(&directory.nodes, &nodes);
        let visible_change = directory.loading || directory.nodes != nodes;

        directory.nodes = nodes;
        directory.loading = false;
        directory.last_refreshed = Some(Utc::now());
        drop(directory);

        if visible_change {
            let _ = self.events.send(StoreEvent::DirectoryChanged);
        }
        changes
    }

    /// Ends the loading phase without touching the node set.
    pub async fn mark_loaded(&self) {
        let mut directory = self.directory.write().await;
        if directory.loading {
            directory.loading = false;
            drop(directory);
            let _ = self.events.send(StoreEvent::DirectoryChanged);
        }
    }
}
