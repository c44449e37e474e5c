use std::collections::HashSet;
use std::sync::Mutex;

use platform::{CapturedBitmap, Rect, SensitiveCategory, ViewNode, WindowBounds};

/// Registry of "redact this view" references, refreshed by an auto-scan of
/// the tree at a cache interval (§4.3). Explicit registrations (by view id)
/// are sticky across scans; auto-detected categories are recomputed every
/// `refresh`.
pub struct RedactionRegistry {
    explicit: Mutex<HashSet<String>>,
    cached_regions: Mutex<Vec<Rect>>,
}

impl Default for RedactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactionRegistry {
    pub fn new() -> Self {
        Self {
            explicit: Mutex::new(HashSet::new()),
            cached_regions: Mutex::new(Vec::new()),
        }
    }

    pub fn register_view(&self, view_id: impl Into<String>) {
        self.explicit.lock().unwrap().insert(view_id.into());
    }

    pub fn unregister_view(&self, view_id: &str) {
        self.explicit.lock().unwrap().remove(view_id);
    }

    /// Walks the given tree, collecting the rectangles of every auto-masked
    /// or explicitly registered node, and caches the result for reuse
    /// between scans.
    pub fn refresh(&self, root: &ViewNode) -> Vec<Rect> {
        let explicit = self.explicit.lock().unwrap();
        let mut regions = Vec::new();
        collect_sensitive_regions(root, &explicit, &mut regions);
        drop(explicit);
        *self.cached_regions.lock().unwrap() = regions.clone();
        regions
    }

    pub fn cached_regions(&self) -> Vec<Rect> {
        self.cached_regions.lock().unwrap().clone()
    }
}

fn is_auto_masked(node: &ViewNode) -> bool {
    node.tagged_sensitive
        || matches!(
            node.category,
            Some(
                SensitiveCategory::TextInput
                    | SensitiveCategory::CameraPreview
                    | SensitiveCategory::BrowserView
                    | SensitiveCategory::VideoLayer
                    | SensitiveCategory::TaggedSentinel
            )
        )
}

fn collect_sensitive_regions(node: &ViewNode, explicit: &HashSet<String>, out: &mut Vec<Rect>) {
    if is_auto_masked(node) || explicit.contains(&node.id) {
        out.push(node.rect);
    }
    for child in &node.children {
        collect_sensitive_regions(child, explicit, out);
    }
}

/// Overlays solid black rectangles over every redacted region on the final
/// scaled canvas. Window-relative `Rect`s are converted to bitmap pixel
/// coordinates using `bounds` → `bitmap` scale factors. The unmasked pixels
/// underneath must never be allowed to leave the process (§4.3) — this is
/// the last step before JPEG encoding.
pub fn apply_mask(bitmap: &mut CapturedBitmap, bounds: WindowBounds, regions: &[Rect]) {
    if bounds.width == 0 || bounds.height == 0 {
        return;
    }
    let scale_x = bitmap.width as f32 / bounds.width as f32;
    let scale_y = bitmap.height as f32 / bounds.height as f32;

    for region in regions {
        let x0 = ((region.x * scale_x).floor().max(0.0)) as u32;
        let y0 = ((region.y * scale_y).floor().max(0.0)) as u32;
        let x1 = (((region.x + region.width) * scale_x).ceil().max(0.0) as u32).min(bitmap.width);
        let y1 = (((region.y + region.height) * scale_y).ceil().max(0.0) as u32).min(bitmap.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let idx = ((y * bitmap.width + x) * 4) as usize;
                if idx + 4 <= bitmap.rgba.len() {
                    bitmap.rgba[idx] = 0;
                    bitmap.rgba[idx + 1] = 0;
                    bitmap.rgba[idx + 2] = 0;
                    bitmap.rgba[idx + 3] = 255;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_bitmap(width: u32, height: u32, value: u8) -> CapturedBitmap {
        CapturedBitmap {
            width,
            height,
            rgba: vec![value; (width * height * 4) as usize],
        }
    }

    #[test]
    fn masked_region_becomes_pure_black() {
        let mut bitmap = solid_bitmap(10, 10, 200);
        let bounds = WindowBounds { width: 10, height: 10 };
        let region = Rect { x: 2.0, y: 2.0, width: 4.0, height: 4.0 };

        apply_mask(&mut bitmap, bounds, &[region]);

        for y in 2..6 {
            for x in 2..6 {
                let idx = ((y * 10 + x) * 4) as usize;
                assert_eq!(&bitmap.rgba[idx..idx + 4], &[0, 0, 0, 255]);
            }
        }
        // Outside the region, pixels are untouched.
        assert_eq!(bitmap.rgba[0], 200);
    }

    #[test]
    fn registry_finds_auto_masked_and_explicit_nodes() {
        let registry = RedactionRegistry::new();
        registry.register_view("custom-sensitive-view");

        let tree = ViewNode {
            id: "root".into(),
            children: vec![
                ViewNode {
                    id: "input-1".into(),
                    category: Some(SensitiveCategory::TextInput),
                    rect: Rect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
                    ..Default::default()
                },
                ViewNode {
                    id: "custom-sensitive-view".into(),
                    rect: Rect { x: 20.0, y: 20.0, width: 5.0, height: 5.0 },
                    ..Default::default()
                },
                ViewNode {
                    id: "plain".into(),
                    rect: Rect { x: 50.0, y: 50.0, width: 1.0, height: 1.0 },
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let regions = registry.refresh(&tree);
        assert_eq!(regions.len(), 2);
    }
}
