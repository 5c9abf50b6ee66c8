//! Arena-backed document model.
//!
//! # Motivation
//!
//! The theming engine mutates a live document: it inserts override
//! style elements at fixed positions, reads the text of author styles
//! and walks shadow roots. This model keeps exactly the structure the
//! engine touches, elements with attributes, text content and shadow
//! roots, stored in an id arena so references stay cheap and copyable.
//!
//! # Design
//!
//! Nodes never leave the arena; removal only detaches them, so a node
//! that is re-inserted keeps its id and its manager. Every structural
//! or attribute mutation publishes on the document's [`EventBus`].

use std::collections::{BTreeMap, HashSet};

use crate::events::{DomEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    /// Set on shadow root nodes, pointing back at the host element.
    host: Option<NodeId>,
}

pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    bus: EventBus,
    defined_custom_elements: HashSet<String>,
    /// Document URL, used to resolve relative stylesheet hrefs.
    pub url: Option<String>,
}

impl Document {
    /// Creates a document with `html`, `head` and `body` elements.
    pub fn new() -> Document {
        let mut document = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            bus: EventBus::new(),
            defined_custom_elements: HashSet::new(),
            url: None,
        };
        let root = document.alloc("html");
        let head = document.alloc("head");
        let body = document.alloc("body");
        document.root = root;
        document.head = head;
        document.body = body;
        document.nodes[head.0].parent = Some(root);
        document.nodes[body.0].parent = Some(root);
        document.nodes[root.0].children = vec![head, body];
        document
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_lowercase(),
            ..Node::default()
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(tag)
    }

    // ─── Accessors ───

    pub fn tag_name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0].attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.nodes[node.0].attributes.contains_key(name)
    }

    pub fn attributes(&self, node: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.nodes[node.0]
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn text(&self, node: NodeId) -> &str {
        &self.nodes[node.0].text
    }

    pub fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].shadow_root
    }

    pub fn shadow_host(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].host
    }

    /// True while the node is reachable from the document root,
    /// crossing shadow boundaries through their hosts.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root {
                return true;
            }
            let n = &self.nodes[current.0];
            match n.parent.or(n.host) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let index = siblings.iter().position(|&c| c == node)?;
        siblings.get(index + 1).copied()
    }

    // ─── Mutation ───

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Inserts `child` before `reference`, or at the end when
    /// `reference` is `None`. Detaches the child from any old parent
    /// first.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = reference
            .and_then(|r| children.iter().position(|&c| c == r))
            .unwrap_or(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        self.bus.publish(&DomEvent::ChildrenChanged {
            parent,
            added: vec![child],
            removed: vec![],
        });
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes[child.0].parent != Some(parent) {
            return;
        }
        self.detach(child);
        self.bus.publish(&DomEvent::ChildrenChanged {
            parent,
            added: vec![],
            removed: vec![child],
        });
    }

    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent {
            self.remove_child(parent, node);
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.0].parent {
            self.nodes[old_parent.0].children.retain(|&c| c != child);
            self.nodes[child.0].parent = None;
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let old_value = self.nodes[node.0]
            .attributes
            .insert(name.to_string(), value.to_string());
        if old_value.as_deref() == Some(value) {
            return;
        }
        self.bus.publish(&DomEvent::AttributeChanged {
            node,
            name: name.to_string(),
            old_value,
            new_value: Some(value.to_string()),
        });
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        let Some(old_value) = self.nodes[node.0].attributes.remove(name) else {
            return;
        };
        self.bus.publish(&DomEvent::AttributeChanged {
            node,
            name: name.to_string(),
            old_value: Some(old_value),
            new_value: None,
        });
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if self.nodes[node.0].text == text {
            return;
        }
        self.nodes[node.0].text = text.to_string();
        self.bus.publish(&DomEvent::TextChanged { node });
    }

    /// Attaches a shadow root to `host`, or returns the existing one.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        if let Some(existing) = self.nodes[host.0].shadow_root {
            return existing;
        }
        let shadow = self.alloc("#shadow-root");
        self.nodes[shadow.0].host = Some(host);
        self.nodes[host.0].shadow_root = Some(shadow);
        self.bus.publish(&DomEvent::ShadowAttached { host });
        shadow
    }

    // ─── Custom elements ───

    pub fn define_custom_element(&mut self, name: &str) {
        if self.defined_custom_elements.insert(name.to_lowercase()) {
            self.bus.publish(&DomEvent::CustomElementDefined {
                name: name.to_lowercase(),
            });
        }
    }

    pub fn is_custom_element_defined(&self, name: &str) -> bool {
        self.defined_custom_elements.contains(&name.to_lowercase())
    }

    // ─── Traversal ───

    /// Depth-first ids under `node` in document order, the node itself
    /// included. Shadow subtrees are not entered; the watcher handles
    /// those explicitly.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.nodes[current.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Depth-first ids under `node`, descending into shadow roots right
    /// after their hosts.
    pub fn descendants_with_shadow(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.nodes[current.0].children.iter().rev() {
                stack.push(child);
            }
            if let Some(shadow) = self.nodes[current.0].shadow_root {
                stack.push(shadow);
            }
        }
        out
    }
}

impl Default for Document {
    fn default() -> Document {
        Document::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    // ===== structure =====

    #[test]
    fn test_new_document_shape() {
        let document = Document::new();
        assert_eq!(document.tag_name(document.root()), "html");
        assert_eq!(
            document.children(document.root()),
            &[document.head(), document.body()]
        );
        assert!(document.is_connected(document.body()));
    }

    #[test]
    fn test_insert_before_keeps_order() {
        let mut document = Document::new();
        let a = document.create_element("style");
        let b = document.create_element("style");
        let c = document.create_element("style");
        let head = document.head();
        document.append_child(head, a);
        document.append_child(head, c);
        document.insert_before(head, b, Some(c));
        assert_eq!(document.children(head), &[a, b, c]);
        assert_eq!(document.next_sibling(a), Some(b));
        assert_eq!(document.next_sibling(c), None);
    }

    #[test]
    fn test_reinsert_moves_node() {
        let mut document = Document::new();
        let style = document.create_element("style");
        document.append_child(document.head(), style);
        document.append_child(document.body(), style);
        assert!(document.children(document.head()).is_empty());
        assert_eq!(document.parent(style), Some(document.body()));
    }

    #[test]
    fn test_removed_node_is_disconnected_but_alive() {
        let mut document = Document::new();
        let style = document.create_element("style");
        document.append_child(document.head(), style);
        document.set_text(style, "a { color: red }");
        document.remove(style);
        assert!(!document.is_connected(style));
        assert_eq!(document.text(style), "a { color: red }");
    }

    // ===== shadow roots =====

    #[test]
    fn test_shadow_root_connectivity() {
        let mut document = Document::new();
        let host = document.create_element("x-widget");
        document.append_child(document.body(), host);
        let shadow = document.attach_shadow(host);
        let inner = document.create_element("style");
        document.append_child(shadow, inner);
        assert!(document.is_connected(inner));
        assert_eq!(document.shadow_host(shadow), Some(host));
        // Re-attaching returns the same root.
        assert_eq!(document.attach_shadow(host), shadow);
    }

    #[test]
    fn test_traversal_with_shadow() {
        let mut document = Document::new();
        let host = document.create_element("x-widget");
        document.append_child(document.body(), host);
        let shadow = document.attach_shadow(host);
        let inner = document.create_element("style");
        document.append_child(shadow, inner);

        let plain = document.descendants(document.root());
        assert!(!plain.contains(&inner));
        let with_shadow = document.descendants_with_shadow(document.root());
        assert!(with_shadow.contains(&inner));
    }

    // ===== events =====

    #[test]
    fn test_mutations_publish_events() {
        let mut document = Document::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        document
            .bus()
            .subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let link = document.create_element("link");
        document.append_child(document.head(), link);
        document.set_attribute(link, "rel", "stylesheet");
        document.set_attribute(link, "rel", "stylesheet");
        document.remove_attribute(link, "rel");
        document.define_custom_element("x-a");
        document.define_custom_element("x-a");

        let events = events.borrow();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], DomEvent::ChildrenChanged { .. }));
        assert!(matches!(
            events[1],
            DomEvent::AttributeChanged { new_value: Some(_), .. }
        ));
        assert!(matches!(
            events[2],
            DomEvent::AttributeChanged { new_value: None, .. }
        ));
        assert!(matches!(events[3], DomEvent::CustomElementDefined { .. }));
    }
}
