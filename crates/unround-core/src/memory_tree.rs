#![forbid(unsafe_code)]

//! Arena-backed in-memory host tree.
//!
//! [`MemoryTree`] is a deterministic [`HostTree`] implementation: nodes live
//! in a slot arena addressed by generational [`NodeId`]s, layout is whatever
//! the caller says it is, and notifications are buffered until a driver
//! collects them through [`RecordSource`].
//!
//! It follows the notification rules a browser host has:
//!
//! - child-list observation covers the whole subtree below the observed root
//!   but stops at encapsulated-subtree boundaries;
//! - attribute records are produced only for observed elements and only for
//!   attributes in that element's filter, including `style` changes caused
//!   by [`HostTree::set_inline_radius`];
//! - a resize observation delivers an initial entry when the element already
//!   has a non-empty box, then one entry per actual size change.
//!
//! Removal destroys nodes: [`MemoryTree::remove`] frees the whole subtree
//! (encapsulated subtrees included) and bumps slot generations, so stale
//! handles stop resolving and are never reused for a different node.
//!
//! # Invariants
//!
//! 1. A node has at most one parent and appears once in that parent's
//!    children.
//! 2. An encapsulated-subtree root has no parent; it is reached only through
//!    its host element.
//! 3. `is_alive(id)` is false for every handle whose node was freed.
//! 4. Slot indices fit in `u32`; creating a node once every index is taken
//!    fails with [`HostError::CapacityExhausted`].

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};

use crate::host::{
    BoxSize, ComputedStyle, ElementIdentity, HostError, HostTree, MutationRecord,
    ObservationSource, Priority, RecordSource, ResizeEntry,
};

/// Generational handle into a [`MemoryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    /// Arena slot index.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Generation of the slot this handle was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Declarative description of a new element.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    radius: String,
    display: String,
    width: String,
    height: String,
    size: Option<BoxSize>,
    reject_observers: bool,
}

impl ElementSpec {
    /// A laid-out-less, unrounded, displayed element.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            radius: "0px".to_string(),
            display: "block".to_string(),
            width: "auto".to_string(),
            height: "auto".to_string(),
            size: None,
            reject_observers: false,
        }
    }

    /// Set the identifier.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class.
    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Stylesheet-resolved `border-radius`.
    #[must_use]
    pub fn radius(mut self, radius: impl Into<String>) -> Self {
        self.radius = radius.into();
        self
    }

    /// Resolved `display`.
    #[must_use]
    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    /// Declared `width` / `height` style values.
    #[must_use]
    pub fn declared_size(mut self, width: impl Into<String>, height: impl Into<String>) -> Self {
        self.width = width.into();
        self.height = height.into();
        self
    }

    /// Laid-out box size.
    #[must_use]
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(BoxSize::new(width, height));
        self
    }

    /// Make every observation request on this element fail.
    #[must_use]
    pub fn reject_observers(mut self) -> Self {
        self.reject_observers = true;
        self
    }
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    authored_radius: String,
    inline_radius: Option<(String, Priority)>,
    display: String,
    width: String,
    height: String,
    size: Option<BoxSize>,
    shadow_root: Option<NodeId>,
    attribute_filter: Option<Vec<&'static str>>,
    resize_observed: bool,
    reject_observers: bool,
}

impl ElementData {
    fn from_spec(spec: ElementSpec) -> Self {
        Self {
            tag: spec.tag,
            id: spec.id,
            classes: spec.classes,
            attributes: BTreeMap::new(),
            authored_radius: spec.radius,
            inline_radius: None,
            display: spec.display,
            width: spec.width,
            height: spec.height,
            size: spec.size,
            shadow_root: None,
            attribute_filter: None,
            resize_observed: false,
            reject_observers: spec.reject_observers,
        }
    }

    fn observes_attribute(&self, name: &str) -> bool {
        self.attribute_filter
            .as_ref()
            .is_some_and(|filter| filter.iter().any(|a| *a == name))
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(Box<ElementData>),
    ShadowRoot { host: NodeId },
    Text,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// Deterministic in-memory element tree.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    document: NodeId,
    child_list_roots: AHashSet<NodeId>,
    mutation_records: Vec<MutationRecord<NodeId>>,
    resize_entries: Vec<ResizeEntry<NodeId>>,
    style_writes: AHashMap<NodeId, u64>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Create a tree holding only a document root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(NodeData {
                    kind: NodeKind::Document,
                    parent: None,
                    children: Vec::new(),
                }),
            }],
            free: Vec::new(),
            document: NodeId {
                slot: 0,
                generation: 0,
            },
            child_list_roots: AHashSet::new(),
            mutation_records: Vec::new(),
            resize_entries: Vec::new(),
            style_writes: AHashMap::new(),
        }
    }

    // ── Arena ────────────────────────────────────────────────────────────

    fn allocate(&mut self, kind: NodeKind) -> Result<NodeId, HostError> {
        let data = NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        };
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.node = Some(data);
            return Ok(NodeId {
                slot,
                generation: entry.generation,
            });
        }
        let slot = next_slot(self.slots.len())?;
        self.slots.push(Slot {
            generation: 0,
            node: Some(data),
        });
        Ok(NodeId {
            slot,
            generation: 0,
        })
    }

    fn release(&mut self, id: NodeId) {
        if let Some(entry) = self.slots.get_mut(id.slot as usize)
            && entry.generation == id.generation
            && entry.node.take().is_some()
        {
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(id.slot);
            self.child_list_roots.remove(&id);
            self.style_writes.remove(&id);
        }
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_mut())
    }

    fn element(&self, id: NodeId) -> Result<&ElementData, HostError> {
        match self.node(id) {
            Some(NodeData {
                kind: NodeKind::Element(element),
                ..
            }) => Ok(&**element),
            Some(_) => Err(HostError::NotAnElement {
                node: format!("{id:?}"),
            }),
            None => Err(HostError::detached(id)),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, HostError> {
        match self.node_mut(id) {
            Some(NodeData {
                kind: NodeKind::Element(element),
                ..
            }) => Ok(&mut **element),
            Some(_) => Err(HostError::NotAnElement {
                node: format!("{id:?}"),
            }),
            None => Err(HostError::detached(id)),
        }
    }

    // ── Building ─────────────────────────────────────────────────────────

    /// Document root.
    #[must_use]
    pub const fn document(&self) -> NodeId {
        self.document
    }

    /// Create a detached element.
    pub fn create_element(&mut self, spec: ElementSpec) -> Result<NodeId, HostError> {
        self.allocate(NodeKind::Element(Box::new(ElementData::from_spec(spec))))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self) -> Result<NodeId, HostError> {
        self.allocate(NodeKind::Text)
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        spec: ElementSpec,
    ) -> Result<NodeId, HostError> {
        let child = self.create_element(spec)?;
        if let Err(err) = self.append_child(parent, child) {
            self.release(child);
            return Err(err);
        }
        Ok(child)
    }

    /// Append `child` (currently parentless) as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        let hierarchy = || HostError::HierarchyRequest {
            node: format!("{child:?}"),
        };
        match self.node(parent).map(|n| &n.kind) {
            None => return Err(HostError::detached(parent)),
            Some(NodeKind::Text) => return Err(hierarchy()),
            Some(_) => {}
        }
        match self.node(child) {
            None => return Err(HostError::detached(child)),
            Some(data) => {
                if data.parent.is_some()
                    || matches!(data.kind, NodeKind::Document | NodeKind::ShadowRoot { .. })
                {
                    return Err(hierarchy());
                }
            }
        }
        if self.ancestors_inclusive(parent).any(|a| a == child) {
            return Err(hierarchy());
        }

        if let Some(data) = self.node_mut(child) {
            data.parent = Some(parent);
        }
        if let Some(data) = self.node_mut(parent) {
            data.children.push(child);
        }
        if self.is_child_list_observed(parent) {
            self.mutation_records.push(MutationRecord::ChildList {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            });
        }
        Ok(())
    }

    /// Attach an encapsulated subtree root to `host`.
    pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId, HostError> {
        if self.element(host)?.shadow_root.is_some() {
            return Err(HostError::ShadowRootExists {
                node: format!("{host:?}"),
            });
        }
        let root = self.allocate(NodeKind::ShadowRoot { host })?;
        self.element_mut(host)?.shadow_root = Some(root);
        Ok(root)
    }

    /// Destroy `node` and everything below it, encapsulated subtrees
    /// included.
    pub fn remove(&mut self, node: NodeId) -> Result<(), HostError> {
        let parent = match self.node(node) {
            None => return Err(HostError::detached(node)),
            Some(NodeData {
                kind: NodeKind::Document | NodeKind::ShadowRoot { .. },
                ..
            }) => {
                return Err(HostError::HierarchyRequest {
                    node: format!("{node:?}"),
                });
            }
            Some(data) => data.parent,
        };
        let observed = parent.is_some_and(|p| self.is_child_list_observed(p));

        let doomed = self.subtree_with_shadows(node);
        if let Some(parent) = parent
            && let Some(data) = self.node_mut(parent)
        {
            data.children.retain(|c| *c != node);
        }
        for id in &doomed {
            self.release(*id);
        }

        if let Some(parent) = parent
            && observed
        {
            self.mutation_records.push(MutationRecord::ChildList {
                target: parent,
                added: Vec::new(),
                removed: doomed,
            });
        }
        Ok(())
    }

    // ── Mutation helpers ─────────────────────────────────────────────────

    /// Set an attribute. `class` and `id` update the element's identity.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        match name {
            "class" => {
                element.classes = value.split_ascii_whitespace().map(str::to_string).collect();
            }
            "id" => element.id = Some(value.to_string()),
            _ => {
                element.attributes.insert(name.to_string(), value.to_string());
            }
        }
        self.record_attribute(node, name);
        Ok(())
    }

    /// Attribute value previously set through [`set_attribute`](Self::set_attribute).
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)
            .ok()
            .and_then(|e| e.attributes.get(name))
            .map(String::as_str)
    }

    /// Page script rewrote the inline `border-radius` (or cleared it).
    pub fn set_page_inline_radius(
        &mut self,
        node: NodeId,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        self.element_mut(node)?.inline_radius = value.map(|v| (v.to_string(), Priority::Normal));
        self.record_attribute(node, "style");
        Ok(())
    }

    /// A stylesheet change altered the element's authored radius. Produces
    /// no mutation record, like a rule change in a style sheet.
    pub fn set_authored_radius(&mut self, node: NodeId, radius: &str) -> Result<(), HostError> {
        self.element_mut(node)?.authored_radius = radius.to_string();
        Ok(())
    }

    /// Change the resolved `display` value.
    ///
    /// Hiding or showing an element changes its rendered box, so a
    /// resize-observed element gets an entry when the box changes.
    pub fn set_display(&mut self, node: NodeId, display: &str) -> Result<(), HostError> {
        let before = self.bounding_box(node);
        self.element_mut(node)?.display = display.to_string();
        self.record_box_change(node, before);
        Ok(())
    }

    /// Lay the element out at `size`.
    ///
    /// A hidden element keeps the new size but reports no entry until it is
    /// shown.
    pub fn resize(&mut self, node: NodeId, size: BoxSize) -> Result<(), HostError> {
        let before = self.bounding_box(node);
        self.element_mut(node)?.size = Some(size);
        self.record_box_change(node, before);
        Ok(())
    }

    fn record_box_change(&mut self, node: NodeId, before: Option<BoxSize>) {
        let after = self.bounding_box(node);
        if after != before && self.is_resize_observed(node) {
            self.resize_entries.push(ResizeEntry {
                target: node,
                size: after.unwrap_or_default(),
            });
        }
    }

    fn record_attribute(&mut self, node: NodeId, name: &str) {
        let observed = self
            .element(node)
            .is_ok_and(|element| element.observes_attribute(name));
        if observed {
            self.mutation_records.push(MutationRecord::Attributes {
                target: node,
                attribute: name.to_string(),
            });
        }
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Parent of a node (`None` for roots and detached nodes).
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    /// Children of a node.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Tag name of an element.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).ok().map(|e| e.tag.as_str())
    }

    /// Inline `border-radius` together with its priority.
    #[must_use]
    pub fn inline_declaration(&self, node: NodeId) -> Option<(&str, Priority)> {
        self.element(node)
            .ok()
            .and_then(|e| e.inline_radius.as_ref())
            .map(|(value, priority)| (value.as_str(), *priority))
    }

    /// Number of [`HostTree::set_inline_radius`] calls that reached `node`.
    #[must_use]
    pub fn style_writes(&self, node: NodeId) -> u64 {
        self.style_writes.get(&node).copied().unwrap_or(0)
    }

    /// Total [`HostTree::set_inline_radius`] calls on live nodes.
    #[must_use]
    pub fn total_style_writes(&self) -> u64 {
        self.style_writes.values().sum()
    }

    /// Whether attribute observation is active on `node`.
    #[must_use]
    pub fn is_attribute_observed(&self, node: NodeId) -> bool {
        self.element(node)
            .is_ok_and(|e| e.attribute_filter.is_some())
    }

    /// Whether resize observation is active on `node`.
    #[must_use]
    pub fn is_resize_observed(&self, node: NodeId) -> bool {
        self.element(node).is_ok_and(|e| e.resize_observed)
    }

    /// Whether `root` itself was registered for child-list observation.
    #[must_use]
    pub fn is_child_list_root(&self, root: NodeId) -> bool {
        self.child_list_roots.contains(&root)
    }

    /// Number of live nodes, roots included.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Whether the node is attached, possibly through encapsulated-subtree
    /// hosts, to the document root.
    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            let Some(data) = self.node(current) else {
                return false;
            };
            match (&data.kind, data.parent) {
                (NodeKind::Document, _) => return current == self.document,
                (NodeKind::ShadowRoot { host }, _) => current = *host,
                (_, Some(parent)) => current = parent,
                (_, None) => return false,
            }
        }
    }

    fn ancestors_inclusive(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(node), move |id| self.parent(*id))
    }

    fn is_child_list_observed(&self, node: NodeId) -> bool {
        self.ancestors_inclusive(node)
            .any(|id| self.child_list_roots.contains(&id))
    }

    fn subtree_with_shadows(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(data) = self.node(id) else { continue };
            out.push(id);
            if let NodeKind::Element(element) = &data.kind
                && let Some(root) = element.shadow_root
            {
                stack.push(root);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }
}

fn next_slot(len: usize) -> Result<u32, HostError> {
    u32::try_from(len).map_err(|_| HostError::CapacityExhausted { slots: len })
}

impl HostTree for MemoryTree {
    type Node = NodeId;

    fn document_root(&self) -> NodeId {
        self.document
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_ok()
    }

    fn identity(&self, node: NodeId) -> Result<ElementIdentity, HostError> {
        let element = self.element(node)?;
        Ok(ElementIdentity {
            classes: element.classes.clone(),
            id: element.id.clone(),
        })
    }

    fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, HostError> {
        let element = self.element(node)?;
        let border_radius = element
            .inline_radius
            .as_ref()
            .map_or_else(|| element.authored_radius.clone(), |(v, _)| v.clone());
        Ok(ComputedStyle {
            border_radius,
            display: element.display.clone(),
            width: element.width.clone(),
            height: element.height.clone(),
        })
    }

    fn bounding_box(&self, node: NodeId) -> Option<BoxSize> {
        let element = self.element(node).ok()?;
        if element.display.trim() == "none" || !self.is_connected(node) {
            return None;
        }
        element.size
    }

    fn inline_radius(&self, node: NodeId) -> Option<String> {
        self.element(node)
            .ok()
            .and_then(|e| e.inline_radius.as_ref())
            .map(|(value, _)| value.clone())
    }

    fn set_inline_radius(
        &mut self,
        node: NodeId,
        value: &str,
        priority: Priority,
    ) -> Result<(), HostError> {
        self.element_mut(node)?.inline_radius = Some((value.to_string(), priority));
        *self.style_writes.entry(node).or_insert(0) += 1;
        self.record_attribute(node, "style");
        Ok(())
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.element(node).ok().and_then(|e| e.shadow_root)
    }

    fn descendant_elements(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.is_element(id) {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    fn observe_attributes(
        &mut self,
        node: NodeId,
        attributes: &[&'static str],
    ) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        if element.reject_observers {
            return Err(HostError::unsupported(node, ObservationSource::Attributes));
        }
        element.attribute_filter = Some(attributes.to_vec());
        Ok(())
    }

    fn observe_resize(&mut self, node: NodeId) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        if element.reject_observers {
            return Err(HostError::unsupported(node, ObservationSource::Resize));
        }
        let first = !element.resize_observed;
        element.resize_observed = true;
        if first
            && let Some(size) = self.bounding_box(node)
            && size.width != 0.0
            && size.height != 0.0
        {
            self.resize_entries.push(ResizeEntry { target: node, size });
        }
        Ok(())
    }

    fn observe_child_list(&mut self, root: NodeId) -> Result<(), HostError> {
        let allowed = match self.node(root).map(|n| &n.kind) {
            None => return Err(HostError::detached(root)),
            Some(NodeKind::Text) => false,
            Some(NodeKind::Element(element)) => !element.reject_observers,
            Some(NodeKind::Document | NodeKind::ShadowRoot { .. }) => true,
        };
        if !allowed {
            return Err(HostError::unsupported(root, ObservationSource::ChildList));
        }
        self.child_list_roots.insert(root);
        Ok(())
    }
}

impl RecordSource for MemoryTree {
    fn take_mutation_records(&mut self) -> Vec<MutationRecord<NodeId>> {
        let records = std::mem::take(&mut self.mutation_records);
        if !records.is_empty() {
            tracing::trace!(message = "tree.mutation_records", count = records.len());
        }
        records
    }

    fn take_resize_entries(&mut self) -> Vec<ResizeEntry<NodeId>> {
        let entries = std::mem::take(&mut self.resize_entries);
        if !entries.is_empty() {
            tracing::trace!(message = "tree.resize_entries", count = entries.len());
        }
        entries
    }
}
