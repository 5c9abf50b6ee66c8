//! Style change watcher.
//!
//! # Design
//!
//! The watcher subscribes to the document [`EventBus`] and queues raw
//! mutations; the session flushes the queue once per frame. A flush
//! classifies the batch: small batches are mapped to created, updated,
//! removed and moved style elements directly, a batch above
//! [`HUGE_MUTATIONS_COUNT`] added nodes falls back to a full rescan
//! diffed against the previously known style set. Custom elements that
//! are not defined yet are grouped by tag and their shadow roots are
//! scanned once the definition arrives.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use umbra_dom::{Document, DomEvent, EventBus, NodeId, SubscriptionId};

use crate::manager::{get_manageable_styles, should_manage_style};

const HUGE_MUTATIONS_COUNT: usize = 1000;

const WATCHED_ATTRIBUTES: [&str; 4] = ["rel", "disabled", "media", "href"];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangedStyles {
    pub created: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub moved: Vec<NodeId>,
}

impl ChangedStyles {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.moved.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct WatchDelta {
    pub styles: ChangedStyles,
    /// Shadow roots seen for the first time this flush.
    pub discovered_shadow_roots: Vec<NodeId>,
}

#[derive(Default)]
struct WatcherState {
    queue: Vec<DomEvent>,
}

pub struct StyleWatcher {
    bus: EventBus,
    subscription: Option<SubscriptionId>,
    state: Rc<RefCell<WatcherState>>,
    prev_styles: BTreeSet<NodeId>,
    /// Previous and next sibling of each known style, for detecting
    /// displaced styles during a full rescan.
    positions: BTreeMap<NodeId, (Option<NodeId>, Option<NodeId>)>,
    observed_shadow_roots: BTreeSet<NodeId>,
    /// Hosts of not-yet-defined custom elements, grouped by tag.
    undefined_groups: BTreeMap<String, BTreeSet<NodeId>>,
}

impl StyleWatcher {
    /// Subscribes to the document bus and seeds the known-style set.
    pub fn start(document: &Document, current_styles: &[NodeId]) -> StyleWatcher {
        let state: Rc<RefCell<WatcherState>> = Rc::default();
        let sink = Rc::clone(&state);
        let bus = document.bus().clone();
        let subscription = bus.subscribe(move |event| {
            sink.borrow_mut().queue.push(event.clone());
        });

        let mut watcher = StyleWatcher {
            bus,
            subscription: Some(subscription),
            state,
            prev_styles: current_styles.iter().copied().collect(),
            positions: BTreeMap::new(),
            observed_shadow_roots: BTreeSet::new(),
            undefined_groups: BTreeMap::new(),
        };
        for &style in current_styles {
            watcher.save_position(document, style);
        }
        for node in document.descendants_with_shadow(document.root()) {
            if let Some(shadow) = document.shadow_root(node) {
                watcher.observed_shadow_roots.insert(shadow);
            }
        }
        watcher.collect_undefined_elements(document, document.root());
        watcher
    }

    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(subscription);
        }
        self.state.borrow_mut().queue.clear();
        self.undefined_groups.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.state.borrow().queue.is_empty()
    }

    /// Drains queued mutations and classifies them against the current
    /// document state.
    pub fn flush(&mut self, document: &Document) -> WatchDelta {
        let events = std::mem::take(&mut self.state.borrow_mut().queue);
        let mut delta = WatchDelta::default();
        if events.is_empty() {
            return delta;
        }

        let added_count: usize = events
            .iter()
            .map(|event| match event {
                DomEvent::ChildrenChanged { added, .. } => added.len(),
                _ => 0,
            })
            .sum();

        let mut created = BTreeSet::new();
        let mut updated = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut moved = BTreeSet::new();

        if added_count > HUGE_MUTATIONS_COUNT {
            self.rescan(document, &mut created, &mut removed, &mut moved);
        } else {
            for event in &events {
                self.classify(
                    document,
                    event,
                    &mut created,
                    &mut updated,
                    &mut removed,
                    &mut moved,
                );
            }
        }

        // Definitions and shadow attachments come after structure so a
        // style created inside a fresh shadow root is reported once.
        for event in &events {
            match event {
                DomEvent::CustomElementDefined { name } => {
                    self.handle_definition(document, name, &mut created, &mut delta);
                }
                DomEvent::ShadowAttached { host } => {
                    if let Some(shadow) = document.shadow_root(*host) {
                        self.observe_shadow_root(document, shadow, &mut delta);
                    }
                }
                DomEvent::ChildrenChanged { added, .. } => {
                    for &node in added {
                        if !document.is_connected(node) {
                            continue;
                        }
                        for descendant in document.descendants_with_shadow(node) {
                            if let Some(shadow) = document.shadow_root(descendant) {
                                self.observe_shadow_root(document, shadow, &mut delta);
                            }
                        }
                        self.collect_undefined_elements(document, node);
                    }
                }
                _ => {}
            }
        }

        for &style in &created {
            self.prev_styles.insert(style);
            self.save_position(document, style);
        }
        for &style in &moved {
            self.save_position(document, style);
        }
        for &style in &removed {
            self.prev_styles.remove(&style);
            self.positions.remove(&style);
        }

        delta.styles = ChangedStyles {
            created: created.into_iter().collect(),
            updated: updated.into_iter().collect(),
            removed: removed.into_iter().collect(),
            moved: moved.into_iter().collect(),
        };
        delta
    }

    fn classify(
        &self,
        document: &Document,
        event: &DomEvent,
        created: &mut BTreeSet<NodeId>,
        updated: &mut BTreeSet<NodeId>,
        removed: &mut BTreeSet<NodeId>,
        moved: &mut BTreeSet<NodeId>,
    ) {
        match event {
            DomEvent::ChildrenChanged { added, removed: gone, .. } => {
                for &node in added {
                    if !document.is_connected(node) {
                        continue;
                    }
                    for style in get_manageable_styles(document, node) {
                        if self.prev_styles.contains(&style) {
                            moved.insert(style);
                        } else {
                            created.insert(style);
                        }
                    }
                }
                for &node in gone {
                    if document.is_connected(node) {
                        continue;
                    }
                    for &style in &self.prev_styles {
                        if style == node || is_descendant(document, style, node) {
                            removed.insert(style);
                        }
                    }
                }
            }
            DomEvent::AttributeChanged { node, name, .. } => {
                if !WATCHED_ATTRIBUTES.contains(&name.as_str())
                    || !document.is_connected(*node)
                {
                    return;
                }
                if should_manage_style(document, *node) {
                    updated.insert(*node);
                } else if document.tag_name(*node) == "link"
                    && document.has_attribute(*node, "disabled")
                    && self.prev_styles.contains(node)
                {
                    removed.insert(*node);
                }
            }
            DomEvent::TextChanged { node } => {
                if document.is_connected(*node) && should_manage_style(document, *node) {
                    updated.insert(*node);
                }
            }
            _ => {}
        }
    }

    fn rescan(
        &self,
        document: &Document,
        created: &mut BTreeSet<NodeId>,
        removed: &mut BTreeSet<NodeId>,
        moved: &mut BTreeSet<NodeId>,
    ) {
        let styles: BTreeSet<NodeId> = get_manageable_styles(document, document.root())
            .into_iter()
            .collect();
        for &style in &styles {
            if !self.prev_styles.contains(&style) {
                created.insert(style);
            }
        }
        for &style in &self.prev_styles {
            if !styles.contains(&style) {
                removed.insert(style);
            }
        }
        for &style in &styles {
            if !created.contains(&style)
                && self.positions.get(&style) != Some(&element_position(document, style))
            {
                moved.insert(style);
            }
        }
    }

    fn handle_definition(
        &mut self,
        document: &Document,
        name: &str,
        created: &mut BTreeSet<NodeId>,
        delta: &mut WatchDelta,
    ) {
        let Some(hosts) = self.undefined_groups.remove(name) else {
            return;
        };
        for host in hosts {
            if !document.is_connected(host) {
                continue;
            }
            let Some(shadow) = document.shadow_root(host) else {
                continue;
            };
            for style in get_manageable_styles(document, shadow) {
                if !self.prev_styles.contains(&style) {
                    created.insert(style);
                }
            }
            self.observe_shadow_root(document, shadow, delta);
            self.collect_undefined_elements(document, shadow);
        }
    }

    fn observe_shadow_root(&mut self, document: &Document, shadow: NodeId, delta: &mut WatchDelta) {
        if self.observed_shadow_roots.insert(shadow) && document.is_connected(shadow) {
            delta.discovered_shadow_roots.push(shadow);
        }
    }

    fn collect_undefined_elements(&mut self, document: &Document, root: NodeId) {
        for node in document.descendants_with_shadow(root) {
            let tag = document.tag_name(node);
            if tag.contains('-') && !document.is_custom_element_defined(tag) {
                self.undefined_groups
                    .entry(tag.to_string())
                    .or_default()
                    .insert(node);
            }
        }
    }

    fn save_position(&mut self, document: &Document, style: NodeId) {
        self.positions.insert(style, element_position(document, style));
    }
}

impl Drop for StyleWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn element_position(document: &Document, node: NodeId) -> (Option<NodeId>, Option<NodeId>) {
    let Some(parent) = document.parent(node) else {
        return (None, None);
    };
    let siblings = document.children(parent);
    let Some(index) = siblings.iter().position(|&c| c == node) else {
        return (None, None);
    };
    let prev = (index > 0).then(|| siblings[index - 1]);
    (prev, siblings.get(index + 1).copied())
}

fn is_descendant(document: &Document, node: NodeId, ancestor: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = document.parent(id).or_else(|| document.shadow_host(id));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style_in_head(document: &mut Document, css: &str) -> NodeId {
        let style = document.create_element("style");
        document.set_text(style, css);
        let head = document.head();
        document.append_child(head, style);
        style
    }

    // ===== structural changes =====

    #[test]
    fn test_created_style_is_reported() {
        let mut document = Document::new();
        let mut watcher = StyleWatcher::start(&document, &[]);
        let style = style_in_head(&mut document, "a { color: red }");
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.created, vec![style]);
        assert!(delta.styles.removed.is_empty());
    }

    #[test]
    fn test_removed_style_is_reported() {
        let mut document = Document::new();
        let style = style_in_head(&mut document, "a { color: red }");
        let mut watcher = StyleWatcher::start(&document, &[style]);
        document.remove(style);
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.removed, vec![style]);
        assert!(delta.styles.created.is_empty());
    }

    #[test]
    fn test_reinserted_style_is_moved_not_created() {
        let mut document = Document::new();
        let style = style_in_head(&mut document, "a { color: red }");
        let mut watcher = StyleWatcher::start(&document, &[style]);
        let body = document.body();
        document.append_child(body, style);
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.moved, vec![style]);
        assert!(delta.styles.created.is_empty());
        assert!(delta.styles.removed.is_empty());
    }

    #[test]
    fn test_wrapper_insertion_reports_nested_style() {
        let mut document = Document::new();
        let mut watcher = StyleWatcher::start(&document, &[]);
        let wrapper = document.create_element("div");
        let style = document.create_element("style");
        document.append_child(wrapper, style);
        let body = document.body();
        document.append_child(body, wrapper);
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.created, vec![style]);
    }

    #[test]
    fn test_own_override_elements_are_ignored() {
        let mut document = Document::new();
        let mut watcher = StyleWatcher::start(&document, &[]);
        let sync = document.create_element("style");
        document.set_attribute(sync, "class", "darkreader darkreader--sync");
        let head = document.head();
        document.append_child(head, sync);
        document.set_text(sync, "a { color: white }");
        let delta = watcher.flush(&document);
        assert!(delta.styles.is_empty());
    }

    // ===== attribute and text changes =====

    #[test]
    fn test_text_change_reports_update() {
        let mut document = Document::new();
        let style = style_in_head(&mut document, "a { color: red }");
        let mut watcher = StyleWatcher::start(&document, &[style]);
        document.set_text(style, "a { color: blue }");
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.updated, vec![style]);
    }

    #[test]
    fn test_disabled_link_is_removed() {
        let mut document = Document::new();
        let link = document.create_element("link");
        document.set_attribute(link, "rel", "stylesheet");
        document.set_attribute(link, "href", "site.css");
        let head = document.head();
        document.append_child(head, link);
        let mut watcher = StyleWatcher::start(&document, &[link]);
        document.set_attribute(link, "disabled", "");
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.removed, vec![link]);
    }

    #[test]
    fn test_enabled_link_is_updated() {
        let mut document = Document::new();
        let link = document.create_element("link");
        document.set_attribute(link, "rel", "stylesheet");
        document.set_attribute(link, "href", "site.css");
        document.set_attribute(link, "disabled", "");
        let head = document.head();
        document.append_child(head, link);
        let mut watcher = StyleWatcher::start(&document, &[]);
        document.remove_attribute(link, "disabled");
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.updated, vec![link]);
    }

    #[test]
    fn test_unwatched_attribute_is_ignored() {
        let mut document = Document::new();
        let style = style_in_head(&mut document, "a { color: red }");
        let mut watcher = StyleWatcher::start(&document, &[style]);
        document.set_attribute(style, "data-version", "2");
        let delta = watcher.flush(&document);
        assert!(delta.styles.is_empty());
    }

    // ===== huge batches =====

    #[test]
    fn test_huge_batch_falls_back_to_rescan() {
        let mut document = Document::new();
        let style = style_in_head(&mut document, "a { color: red }");
        let mut watcher = StyleWatcher::start(&document, &[style]);
        let body = document.body();
        for _ in 0..=HUGE_MUTATIONS_COUNT {
            let div = document.create_element("div");
            document.append_child(body, div);
        }
        let fresh = document.create_element("style");
        document.append_child(body, fresh);
        document.remove(style);
        let delta = watcher.flush(&document);
        assert_eq!(delta.styles.created, vec![fresh]);
        assert_eq!(delta.styles.removed, vec![style]);
    }

    // ===== shadow roots and custom elements =====

    #[test]
    fn test_new_shadow_root_is_discovered() {
        let mut document = Document::new();
        let mut watcher = StyleWatcher::start(&document, &[]);
        let host = document.create_element("x-widget");
        let body = document.body();
        document.append_child(body, host);
        let shadow = document.attach_shadow(host);
        let inner = document.create_element("style");
        document.append_child(shadow, inner);
        let delta = watcher.flush(&document);
        assert_eq!(delta.discovered_shadow_roots, vec![shadow]);
        assert_eq!(delta.styles.created, vec![inner]);
    }

    #[test]
    fn test_custom_element_definition_scans_shadow_styles() {
        let mut document = Document::new();
        let host = document.create_element("x-widget");
        let body = document.body();
        document.append_child(body, host);
        let mut watcher = StyleWatcher::start(&document, &[]);

        let shadow = document.attach_shadow(host);
        let inner = document.create_element("style");
        document.append_child(shadow, inner);
        // The first flush already sees the new style through structure.
        watcher.flush(&document);

        let late = document.create_element("style");
        document.append_child(shadow, late);
        document.define_custom_element("x-widget");
        let delta = watcher.flush(&document);
        assert!(delta.styles.created.contains(&late));
    }

    #[test]
    fn test_stop_ends_delivery() {
        let mut document = Document::new();
        let mut watcher = StyleWatcher::start(&document, &[]);
        watcher.stop();
        style_in_head(&mut document, "a { color: red }");
        assert!(!watcher.has_pending());
        let delta = watcher.flush(&document);
        assert!(delta.styles.is_empty());
    }
}
