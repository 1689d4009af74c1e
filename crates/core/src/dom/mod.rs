//! Headless document model.
//!
//! Just enough of a page for the visualization framework: an element tree
//! with ids, a `hidden` flag, dataset metadata, text and inline styles, a
//! select control, and canvas surfaces. Layout is explicit: boxes are
//! recomputed by [`Document::flush_layout`], and [`Document::content_box`]
//! reports whatever the last flush computed.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::render::{Canvas, Size};

/// Document shared between the registry, instances and input handlers.
pub type SharedDocument = Rc<RefCell<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub disabled: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Body,
    Block,
    Canvas(Canvas),
    Select,
    Option(SelectOption),
}

#[derive(Debug, Clone)]
pub struct Element {
    id: Option<String>,
    kind: ElementKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hidden: bool,
    dataset: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    text: String,
    intrinsic: Option<Size>,
    layout: Size,
}

impl Element {
    fn new(kind: ElementKind) -> Self {
        Self {
            id: None,
            kind,
            parent: None,
            children: Vec::new(),
            hidden: false,
            dataset: BTreeMap::new(),
            styles: BTreeMap::new(),
            text: String::new(),
            intrinsic: None,
            layout: Size::ZERO,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Element>,
    ids: HashMap<String, NodeId>,
    body: NodeId,
    viewport: Size,
    layout_dirty: bool,
    layout_flushes: usize,
}

impl Document {
    pub fn new(viewport_width: f64, viewport_height: f64) -> Self {
        let mut body = Element::new(ElementKind::Body);
        let viewport = Size::new(viewport_width, viewport_height);
        body.layout = viewport;
        Self {
            nodes: vec![body],
            ids: HashMap::new(),
            body: NodeId(0),
            viewport,
            layout_dirty: false,
            layout_flushes: 0,
        }
    }

    pub fn shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0)
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        self.nodes.get_mut(node.0)
    }

    /// Number of elements ever created, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, kind: ElementKind) -> NodeId {
        self.nodes.push(Element::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    pub fn set_id(&mut self, node: NodeId, id: impl Into<String>) {
        let id = id.into();
        let Some(element) = self.element_mut(node) else {
            return;
        };
        let previous = element.id.replace(id.clone());
        if let Some(previous) = previous {
            self.ids.remove(&previous);
        }
        // Ids are unique: the element that held this one gives it up.
        if let Some(holder) = self.ids.insert(id, node).filter(|holder| *holder != node) {
            if let Some(element) = self.element_mut(holder) {
                element.id = None;
            }
        }
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.element(node).and_then(Element::parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.element(node).map(Element::children).unwrap_or(&[])
    }

    /// Whether `node` is `ancestor` or lies somewhere below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the element is reachable from the body.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Fails when either node is unknown or `child` contains `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.element(parent).is_none() || self.element(child).is_none() {
            return false;
        }
        if self.contains(child, parent) {
            tracing::warn!(?parent, ?child, "refusing to append an element under itself");
            return false;
        }
        self.detach(child);
        if let Some(element) = self.element_mut(parent) {
            element.children.push(child);
        }
        if let Some(element) = self.element_mut(child) {
            element.parent = Some(parent);
        }
        self.layout_dirty = true;
        true
    }

    /// Inserts `node` as the next sibling of `reference`. Fails when the
    /// reference has no parent.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> bool {
        if reference == node || self.element(node).is_none() {
            return false;
        }
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        if self.contains(node, parent) {
            tracing::warn!(?reference, ?node, "refusing to insert an element under itself");
            return false;
        }
        self.detach(node);
        let Some(element) = self.element_mut(parent) else {
            return false;
        };
        let position = element
            .children
            .iter()
            .position(|child| *child == reference)
            .map(|index| index + 1)
            .unwrap_or(element.children.len());
        element.children.insert(position, node);
        if let Some(element) = self.element_mut(node) {
            element.parent = Some(parent);
        }
        self.layout_dirty = true;
        true
    }

    /// Detaches the element from its parent. Its id stays resolvable so it
    /// can be re-inserted.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        if let Some(element) = self.element_mut(parent) {
            element.children.retain(|child| *child != node);
        }
        if let Some(element) = self.element_mut(node) {
            element.parent = None;
        }
        self.layout_dirty = true;
    }

    /// Removes the element and its subtree from the id index.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(element) = self.element_mut(current) {
                stack.extend(element.children.iter().copied());
                if let Some(id) = element.id.take() {
                    self.ids.remove(&id);
                }
            }
        }
    }

    pub fn clear_children(&mut self, node: NodeId) {
        let children = self.children(node).to_vec();
        for child in children {
            self.remove(child);
        }
    }

    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) {
        if let Some(element) = self.element_mut(node) {
            if element.hidden != hidden {
                element.hidden = hidden;
                self.layout_dirty = true;
            }
        }
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.element(node).map(Element::is_hidden).unwrap_or(true)
    }

    pub fn data(&self, node: NodeId, key: &str) -> Option<&str> {
        self.element(node)
            .and_then(|element| element.dataset.get(key))
            .map(String::as_str)
    }

    pub fn set_data(&mut self, node: NodeId, key: impl Into<String>, value: impl Into<String>) {
        if let Some(element) = self.element_mut(node) {
            element.dataset.insert(key.into(), value.into());
        }
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<&str> {
        self.element(node)
            .and_then(|element| element.styles.get(property))
            .map(String::as_str)
    }

    pub fn set_style(
        &mut self,
        node: NodeId,
        property: impl Into<String>,
        value: impl Into<String>,
    ) {
        if let Some(element) = self.element_mut(node) {
            element.styles.insert(property.into(), value.into());
        }
    }

    pub fn text(&self, node: NodeId) -> &str {
        self.element(node).map(Element::text).unwrap_or("")
    }

    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(element) = self.element_mut(node) {
            element.text = text.into();
        }
    }

    /// Size a block lays out to when visible. Blocks without one fill their
    /// parent.
    pub fn set_intrinsic_size(&mut self, node: NodeId, size: Size) {
        if let Some(element) = self.element_mut(node) {
            element.intrinsic = Some(size);
            self.layout_dirty = true;
        }
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, size: Size) {
        self.viewport = size;
        self.layout_dirty = true;
    }

    pub fn layout_flushes(&self) -> usize {
        self.layout_flushes
    }

    /// Recomputes every element's box. Hidden subtrees collapse to zero.
    pub fn flush_layout(&mut self) {
        if !self.layout_dirty && self.layout_flushes > 0 {
            return;
        }
        self.layout_flushes += 1;
        self.layout_dirty = false;

        let mut stack = vec![(self.body, self.viewport, false)];
        while let Some((node, available, parent_hidden)) = stack.pop() {
            let Some(element) = self.element_mut(node) else {
                continue;
            };
            let hidden = parent_hidden || element.hidden;
            let layout = if hidden {
                Size::ZERO
            } else {
                match &element.kind {
                    ElementKind::Body => available,
                    ElementKind::Canvas(canvas) => canvas.size(),
                    _ => element.intrinsic.unwrap_or(available),
                }
            };
            element.layout = layout;
            for child in element.children.clone() {
                stack.push((child, layout, hidden));
            }
        }
    }

    /// Content box computed by the last layout flush.
    pub fn content_box(&self, node: NodeId) -> Size {
        self.element(node)
            .map(|element| element.layout)
            .unwrap_or(Size::ZERO)
    }

    pub fn canvas(&self, node: NodeId) -> Option<&Canvas> {
        match self.element(node).map(Element::kind) {
            Some(ElementKind::Canvas(canvas)) => Some(canvas),
            _ => None,
        }
    }

    pub fn canvas_mut(&mut self, node: NodeId) -> Option<&mut Canvas> {
        match self.element_mut(node).map(|element| &mut element.kind) {
            Some(ElementKind::Canvas(canvas)) => Some(canvas),
            _ => None,
        }
    }

    pub fn canvas_by_id(&self, id: &str) -> Option<&Canvas> {
        self.get_element_by_id(id).and_then(|node| self.canvas(node))
    }

    pub fn canvas_by_id_mut(&mut self, id: &str) -> Option<&mut Canvas> {
        let node = self.get_element_by_id(id)?;
        self.canvas_mut(node)
    }

    /// Options of a select control, in document order.
    pub fn options(&self, select: NodeId) -> Vec<&SelectOption> {
        self.children(select)
            .iter()
            .filter_map(|child| match self.element(*child).map(Element::kind) {
                Some(ElementKind::Option(option)) => Some(option),
                _ => None,
            })
            .collect()
    }

    /// Marks the option with `value` as selected and clears the others.
    pub fn select_value(&mut self, select: NodeId, value: &str) -> bool {
        let mut found = false;
        for child in self.children(select).to_vec() {
            if let Some(element) = self.element_mut(child) {
                if let ElementKind::Option(option) = &mut element.kind {
                    option.selected = option.value == value && !option.disabled;
                    found |= option.selected;
                }
            }
        }
        found
    }
}
