//! Board tree store.
//!
//! Time-boxed, in-memory cache of explored position trees keyed by
//! session. Eviction is lazy: every store operation first prunes entries
//! whose time since last touch exceeds the TTL, so no background sweep or
//! timer thread is needed. A single coarse lock guards the map; mutation
//! is one-per-session-turn, so contention stays low.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::StoreConfig;

/// One explored position in a session's tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardTreeNode {
    /// Unique node identifier.
    pub id: String,
    /// Position at this node, as FEN.
    pub fen: String,
    /// Parent node ID; `None` at the root.
    pub parent_id: Option<String>,
    /// The move that led here; `None` at the root.
    pub move_that_led_here: Option<String>,
    /// Child node IDs, ordered; index 0 is the mainline continuation.
    pub children: Vec<String>,
    /// Whether the edge from the parent follows the main line.
    pub is_mainline_edge: bool,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// Cached scan artifact for this position, if one was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_artifact: Option<serde_json::Value>,
}

impl BoardTreeNode {
    fn new(fen: &str, parent_id: Option<String>, mv: Option<String>, mainline: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fen: fen.to_string(),
            parent_id,
            move_that_led_here: mv,
            children: Vec::new(),
            is_mainline_edge: mainline,
            created_at: Utc::now(),
            scan_artifact: None,
        }
    }
}

/// A session's explored tree, persistent within the store's TTL window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardTree {
    root_id: String,
    nodes: HashMap<String, BoardTreeNode>,
}

impl BoardTree {
    /// Create a tree holding only the root position. The root counts as a
    /// mainline node so it never contributes to variation depth.
    pub fn new(root_fen: &str) -> Self {
        let root = BoardTreeNode::new(root_fen, None, None, true);
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self { root_id, nodes }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn get(&self, id: &str) -> Option<&BoardTreeNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a child under `parent_id`. A mainline child takes index 0 in
    /// the parent's child order; variations append after it. Returns the
    /// new node's ID, or `None` when the parent does not exist.
    pub fn add_child(
        &mut self,
        parent_id: &str,
        fen: &str,
        mv: &str,
        mainline: bool,
    ) -> Option<String> {
        if !self.nodes.contains_key(parent_id) {
            return None;
        }
        let node = BoardTreeNode::new(
            fen,
            Some(parent_id.to_string()),
            Some(mv.to_string()),
            mainline,
        );
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);

        let parent = self.nodes.get_mut(parent_id)?;
        if mainline {
            parent.children.insert(0, id.clone());
        } else {
            parent.children.push(id.clone());
        }
        Some(id)
    }

    /// Attach a scan artifact to a node. Returns false when the node does
    /// not exist.
    pub fn set_artifact(&mut self, id: &str, artifact: serde_json::Value) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.scan_artifact = Some(artifact);
                true
            }
            None => false,
        }
    }

    /// Count of non-mainline edges on the path from the root to `id` —
    /// how far the node has deviated from the main line. Non-decreasing
    /// when walking away from the root.
    pub fn variation_depth(&self, id: &str) -> Option<u32> {
        let mut depth = 0;
        let mut current = self.nodes.get(id)?;
        while let Some(parent_id) = &current.parent_id {
            if !current.is_mainline_edge {
                depth += 1;
            }
            current = self.nodes.get(parent_id)?;
        }
        Some(depth)
    }
}

struct Entry {
    tree: BoardTree,
    last_access: Instant,
}

/// TTL-evicting cache of board trees keyed by
/// `"{session_id}:{sub_session_id_or_none}"`.
pub struct BoardTreeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl BoardTreeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.ttl)
    }

    fn key(session_id: &str, sub_session_id: Option<&str>) -> String {
        format!("{}:{}", session_id, sub_session_id.unwrap_or("none"))
    }

    fn evict_expired(&self, entries: &mut HashMap<String, Entry>) {
        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_access.elapsed() <= ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted = evicted, remaining = entries.len(), "Evicted expired board trees");
        }
    }

    /// Fetch a tree, refreshing its last-access time.
    pub fn get_tree(&self, session_id: &str, sub_session_id: Option<&str>) -> Option<BoardTree> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut entries);
        let entry = entries.get_mut(&Self::key(session_id, sub_session_id))?;
        entry.last_access = Instant::now();
        Some(entry.tree.clone())
    }

    /// Insert or replace a tree.
    pub fn set_tree(&self, session_id: &str, sub_session_id: Option<&str>, tree: BoardTree) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut entries);
        entries.insert(
            Self::key(session_id, sub_session_id),
            Entry {
                tree,
                last_access: Instant::now(),
            },
        );
    }

    /// Remove a tree. Returns whether an entry was present.
    pub fn delete_tree(&self, session_id: &str, sub_session_id: Option<&str>) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut entries);
        entries
            .remove(&Self::key(session_id, sub_session_id))
            .is_some()
    }

    /// Live entry count, after eviction.
    pub fn len(&self) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
