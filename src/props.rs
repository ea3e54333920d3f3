//! Element/renderer property storage with CSS-style inheritance.

use std::collections::HashMap;

use crate::error::DocflowError;
use crate::length::LengthSpec;
use crate::text_wrap::OverflowWrap;
use crate::types::{Color, Pt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    FontSize,
    FontColor,
    FontFamily,
    TextAlignment,
    Leading,
    MarginTop,
    MarginRight,
    MarginBottom,
    MarginLeft,
    PaddingTop,
    PaddingRight,
    PaddingBottom,
    PaddingLeft,
    Width,
    Height,
    BackgroundColor,
    Opacity,
    KeepTogether,
    FlexGrow,
    FlexShrink,
    FlexBasis,
    CharacterSpacing,
    WordSpacing,
    OverflowWrap,
    Direction,
    Underline,
}

impl Property {
    pub fn is_inherited(self) -> bool {
        matches!(
            self,
            Property::FontSize
                | Property::FontColor
                | Property::FontFamily
                | Property::TextAlignment
                | Property::Leading
                | Property::CharacterSpacing
                | Property::WordSpacing
                | Property::OverflowWrap
                | Property::Direction
                | Property::Underline
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlignment {
    Left,
    Right,
    Center,
    Justified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDirection {
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Pt(Pt),
    Float(f32),
    Bool(bool),
    Color(Color),
    Str(String),
    Length(LengthSpec),
    TextAlignment(TextAlignment),
    OverflowWrap(OverflowWrap),
    Direction(BaseDirection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Document,
    Div,
    Paragraph,
    Text,
    Table,
    Cell,
    List,
    ListItem,
    Image,
}

impl ElementKind {
    const ALL: [ElementKind; 9] = [
        ElementKind::Document,
        ElementKind::Div,
        ElementKind::Paragraph,
        ElementKind::Text,
        ElementKind::Table,
        ElementKind::Cell,
        ElementKind::List,
        ElementKind::ListItem,
        ElementKind::Image,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Node {
    kind: ElementKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    element: HashMap<Property, PropertyValue>,
    renderer: HashMap<Property, PropertyValue>,
}

/// Arena of elements. Each node carries model-level (element) properties and
/// renderer overrides; lookups fall back through inheritance to per-kind defaults.
#[derive(Debug)]
pub struct PropertyTree {
    nodes: Vec<Node>,
    defaults: HashMap<(ElementKind, Property), PropertyValue>,
}

impl Default for PropertyTree {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_defaults() -> HashMap<(ElementKind, Property), PropertyValue> {
    use ElementKind::*;
    let mut out = HashMap::new();
    let doc = [
        (Property::FontSize, PropertyValue::Pt(Pt::from_i32(12))),
        (Property::FontColor, PropertyValue::Color(Color::BLACK)),
        (Property::FontFamily, PropertyValue::Str("Helvetica".to_string())),
        (
            Property::TextAlignment,
            PropertyValue::TextAlignment(TextAlignment::Left),
        ),
        (Property::Leading, PropertyValue::Float(1.35)),
        (
            Property::OverflowWrap,
            PropertyValue::OverflowWrap(OverflowWrap::Normal),
        ),
    ];
    for (property, value) in doc {
        out.insert((Document, property), value);
    }
    out.insert((Paragraph, Property::MarginTop), PropertyValue::Pt(Pt::ZERO));
    out.insert(
        (Paragraph, Property::MarginBottom),
        PropertyValue::Pt(Pt::from_i32(4)),
    );
    out.insert((Paragraph, Property::Leading), PropertyValue::Float(1.35));
    for property in [
        Property::PaddingTop,
        Property::PaddingRight,
        Property::PaddingBottom,
        Property::PaddingLeft,
    ] {
        out.insert((Cell, property), PropertyValue::Pt(Pt::from_i32(2)));
    }
    for kind in ElementKind::ALL {
        out.insert((kind, Property::FlexGrow), PropertyValue::Float(0.0));
        out.insert((kind, Property::FlexShrink), PropertyValue::Float(1.0));
    }
    out
}

impl PropertyTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            defaults: kind_defaults(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<&Node, DocflowError> {
        self.nodes.get(id.0).ok_or(DocflowError::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DocflowError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(DocflowError::UnknownNode(id.0))
    }

    fn push(&mut self, kind: ElementKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            element: HashMap::new(),
            renderer: HashMap::new(),
        });
        id
    }

    pub fn add_root(&mut self, kind: ElementKind) -> NodeId {
        self.push(kind, None)
    }

    pub fn add_child(&mut self, parent: NodeId, kind: ElementKind) -> Result<NodeId, DocflowError> {
        self.node(parent)?;
        let id = self.push(kind, Some(parent));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<ElementKind> {
        self.nodes.get(id.0).map(|n| n.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_element_property(
        &mut self,
        id: NodeId,
        property: Property,
        value: PropertyValue,
    ) -> Result<(), DocflowError> {
        self.node_mut(id)?.element.insert(property, value);
        Ok(())
    }

    pub fn set_renderer_property(
        &mut self,
        id: NodeId,
        property: Property,
        value: PropertyValue,
    ) -> Result<(), DocflowError> {
        self.node_mut(id)?.renderer.insert(property, value);
        Ok(())
    }

    /// Removes a renderer override, returning it.
    pub fn delete_own_property(
        &mut self,
        id: NodeId,
        property: Property,
    ) -> Result<Option<PropertyValue>, DocflowError> {
        Ok(self.node_mut(id)?.renderer.remove(&property))
    }

    pub fn delete_element_property(
        &mut self,
        id: NodeId,
        property: Property,
    ) -> Result<Option<PropertyValue>, DocflowError> {
        Ok(self.node_mut(id)?.element.remove(&property))
    }

    pub fn has_own_property(&self, id: NodeId, property: Property) -> bool {
        self.nodes
            .get(id.0)
            .is_some_and(|n| n.renderer.contains_key(&property))
    }

    /// Set on the node (either layer) or on an ancestor it inherits from.
    pub fn has_property(&self, id: NodeId, property: Property) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id.0) else {
                return false;
            };
            if node.renderer.contains_key(&property) || node.element.contains_key(&property) {
                return true;
            }
            if !property.is_inherited() {
                return false;
            }
            current = node.parent;
        }
        false
    }

    /// Resolution order: renderer override, element property, the parent's
    /// resolved value for inherited properties, then the kind default.
    pub fn get_property(&self, id: NodeId, property: Property) -> Option<&PropertyValue> {
        let mut path: Vec<ElementKind> = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.nodes.get(node_id.0)?;
            if let Some(value) = node
                .renderer
                .get(&property)
                .or_else(|| node.element.get(&property))
            {
                return Some(value);
            }
            path.push(node.kind);
            current = if property.is_inherited() {
                node.parent
            } else {
                None
            };
        }
        path.iter()
            .rev()
            .find_map(|kind| self.defaults.get(&(*kind, property)))
    }

    pub fn get_pt(&self, id: NodeId, property: Property) -> Option<Pt> {
        match self.get_property(id, property)? {
            PropertyValue::Pt(v) => Some(*v),
            PropertyValue::Length(LengthSpec::Absolute(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f32(&self, id: NodeId, property: Property) -> Option<f32> {
        match self.get_property(id, property)? {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Pt(v) => Some(v.to_f32()),
            _ => None,
        }
    }

    pub fn get_bool(&self, id: NodeId, property: Property) -> Option<bool> {
        match self.get_property(id, property)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_color(&self, id: NodeId, property: Property) -> Option<Color> {
        match self.get_property(id, property)? {
            PropertyValue::Color(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_paragraph() -> (PropertyTree, NodeId, NodeId) {
        let mut tree = PropertyTree::new();
        let doc = tree.add_root(ElementKind::Document);
        let para = tree.add_child(doc, ElementKind::Paragraph).expect("child");
        (tree, doc, para)
    }

    #[test]
    fn inherited_properties_come_from_document_defaults() {
        let (tree, _, para) = doc_with_paragraph();
        assert_eq!(tree.get_pt(para, Property::FontSize), Some(Pt::from_i32(12)));
        assert_eq!(tree.get_color(para, Property::FontColor), Some(Color::BLACK));
        assert_eq!(
            tree.get_property(para, Property::FontFamily),
            Some(&PropertyValue::Str("Helvetica".to_string()))
        );
        assert!(!tree.has_property(para, Property::FontSize));
    }

    #[test]
    fn element_property_is_inherited_by_descendants() {
        let (mut tree, _, para) = doc_with_paragraph();
        let text = tree.add_child(para, ElementKind::Text).expect("text");
        tree.set_element_property(para, Property::FontSize, PropertyValue::Pt(Pt::from_i32(20)))
            .expect("set");
        assert_eq!(tree.get_pt(text, Property::FontSize), Some(Pt::from_i32(20)));
        assert!(tree.has_property(text, Property::FontSize));
        assert!(!tree.has_own_property(text, Property::FontSize));
    }

    #[test]
    fn renderer_override_wins_until_deleted() {
        let (mut tree, _, para) = doc_with_paragraph();
        tree.set_element_property(para, Property::Opacity, PropertyValue::Float(0.5))
            .expect("set");
        tree.set_renderer_property(para, Property::Opacity, PropertyValue::Float(0.25))
            .expect("set");
        assert!(tree.has_own_property(para, Property::Opacity));
        assert_eq!(tree.get_f32(para, Property::Opacity), Some(0.25));
        let removed = tree
            .delete_own_property(para, Property::Opacity)
            .expect("delete");
        assert_eq!(removed, Some(PropertyValue::Float(0.25)));
        assert_eq!(tree.get_f32(para, Property::Opacity), Some(0.5));
        tree.delete_element_property(para, Property::Opacity)
            .expect("delete");
        assert_eq!(tree.get_property(para, Property::Opacity), None);
    }

    #[test]
    fn box_properties_are_not_inherited() {
        let mut tree = PropertyTree::new();
        let doc = tree.add_root(ElementKind::Document);
        let div = tree.add_child(doc, ElementKind::Div).expect("div");
        let para = tree.add_child(div, ElementKind::Paragraph).expect("para");
        let text = tree.add_child(div, ElementKind::Text).expect("text");
        tree.set_element_property(div, Property::MarginTop, PropertyValue::Pt(Pt::from_i32(9)))
            .expect("set");
        assert_eq!(tree.get_pt(para, Property::MarginTop), Some(Pt::ZERO));
        assert_eq!(tree.get_pt(text, Property::MarginTop), None);
        assert!(!tree.has_property(text, Property::MarginTop));
        assert_eq!(tree.children(div), &[para, text]);
        assert_eq!(tree.parent(text), Some(div));
    }

    #[test]
    fn per_kind_defaults() {
        let mut tree = PropertyTree::new();
        let table = tree.add_root(ElementKind::Table);
        let cell = tree.add_child(table, ElementKind::Cell).expect("cell");
        let image = tree.add_child(cell, ElementKind::Image).expect("image");
        assert_eq!(tree.get_pt(cell, Property::PaddingLeft), Some(Pt::from_i32(2)));
        assert_eq!(tree.get_pt(table, Property::PaddingLeft), None);
        assert_eq!(tree.get_f32(image, Property::FlexShrink), Some(1.0));
        assert_eq!(tree.get_f32(image, Property::FlexGrow), Some(0.0));
        // No document ancestor: nothing to inherit.
        assert_eq!(tree.get_pt(image, Property::FontSize), None);
        assert_eq!(tree.get_bool(image, Property::KeepTogether), None);
    }

    #[test]
    fn inherited_value_beats_own_kind_default() {
        let (mut tree, doc, para) = doc_with_paragraph();
        tree.set_renderer_property(doc, Property::Leading, PropertyValue::Float(2.0))
            .expect("set");
        assert_eq!(tree.get_f32(para, Property::Leading), Some(2.0));
    }

    #[test]
    fn unknown_nodes_are_errors() {
        let mut tree = PropertyTree::new();
        let err = tree
            .add_child(NodeId(7), ElementKind::Div)
            .expect_err("unknown parent");
        assert!(matches!(err, DocflowError::UnknownNode(7)));
        assert!(
            tree.set_element_property(NodeId(0), Property::Underline, PropertyValue::Bool(true))
                .is_err()
        );
        assert!(tree.children(NodeId(3)).is_empty());
    }

    #[test]
    fn deep_trees_resolve_without_recursion() {
        let mut tree = PropertyTree::new();
        let mut node = tree.add_root(ElementKind::Document);
        tree.set_element_property(node, Property::Underline, PropertyValue::Bool(true))
            .expect("set");
        for _ in 0..5_000 {
            node = tree.add_child(node, ElementKind::Div).expect("child");
        }
        assert_eq!(tree.get_bool(node, Property::Underline), Some(true));
        assert_eq!(tree.len(), 5_001);
    }
}
