use std::io::Write;
use std::sync::Mutex;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use platform::ViewNode;
use serde::Serialize;

/// Serializable projection of `platform::ViewNode` — the wire shape of a
/// `hierarchy` payload (§4.3). Kept separate from the capability trait's
/// type so `platform` itself stays free of wire-format concerns, the same
/// separation `sdk-common::wire` keeps from `platform`'s capability types.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub id: String,
    pub class_name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub is_gpu_surface: bool,
    pub is_map_surface: bool,
    pub children: Vec<HierarchyNode>,
}

impl From<&ViewNode> for HierarchyNode {
    fn from(node: &ViewNode) -> Self {
        Self {
            id: node.id.clone(),
            class_name: node.class_name.clone(),
            x: node.rect.x,
            y: node.rect.y,
            width: node.rect.width,
            height: node.rect.height,
            is_gpu_surface: node.is_gpu_surface,
            is_map_surface: node.is_map_surface,
            children: node.children.iter().map(HierarchyNode::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HierarchySnapshot {
    captured_at_ms: u64,
    root: HierarchyNode,
}

/// Accumulates one view-tree snapshot every N ticks (default every 5,
/// §4.3) until it is flushed alongside the screenshot bundle.
pub struct HierarchyBatch {
    snapshots: Mutex<Vec<HierarchySnapshot>>,
}

impl Default for HierarchyBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyBatch {
    pub fn new() -> Self {
        Self { snapshots: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, captured_at_ms: u64, root: &ViewNode) {
        self.snapshots
            .lock()
            .unwrap()
            .push(HierarchySnapshot { captured_at_ms, root: root.into() });
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the accumulated snapshots as a JSON array and gzips it,
    /// leaving the batch empty.
    pub fn flush(&self) -> std::io::Result<Bytes> {
        let snapshots = std::mem::take(&mut *self.snapshots.lock().unwrap());
        let json = serde_json::to_vec(&snapshots).unwrap_or_default();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(Bytes::from(encoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::Rect;

    #[test]
    fn batches_until_flushed() {
        let batch = HierarchyBatch::new();
        let node = ViewNode { id: "root".into(), rect: Rect::default(), ..Default::default() };
        batch.push(1_000, &node);
        batch.push(2_000, &node);
        assert_eq!(batch.len(), 2);

        let gz = batch.flush().unwrap();
        assert!(!gz.is_empty());
        assert!(batch.is_empty());
    }
}
