pub mod parser;
pub mod events;
pub mod document;

use std::collections::HashMap;
use serde::Serialize;

pub type NodeId = u64;

/// Stamped by the browser client on tour targets: `"true"` when the element
/// has a layout box, `"false"` when it does not. Catches stylesheet rules the
/// mirror cannot evaluate.
pub const RENDERED_MARKER: &str = "data-tour-rendered";

/// Represents a node in the DOM tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    /// An element node, containing a tag name, attributes, and children.
    Element(ElementData),
    /// A text node.
    Text(String),
    /// A comment node.
    Comment(String),
}

/// Represents the data associated with an element node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementData {
    pub id: NodeId, // Unique within one snapshot
    pub tag_name: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Node>,
}

impl ElementData {
    /// Helper function to get the HTML id attribute.
    pub fn html_id(&self) -> Option<&String> {
        self.attributes.get("id")
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn element_children(&self) -> impl Iterator<Item = &ElementData> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// All element descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&ElementData> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    pub fn text_content(&self) -> String {
        let mut text = String::new();
        collect_text(self, &mut text);
        text
    }

    /// Form control value: the `value` property for inputs, text for textareas.
    pub fn value(&self) -> String {
        match self.attributes.get("value") {
            Some(v) => v.clone(),
            None if self.tag_name == "textarea" => self.text_content(),
            None => String::new(),
        }
    }

    pub fn set_value(&mut self, value: &str) {
        if self.tag_name == "textarea" {
            self.children = vec![Node::Text(value.to_string())];
        }
        self.attributes.insert("value".to_string(), value.to_string());
    }

    pub fn is_form_control(&self) -> bool {
        matches!(self.tag_name.as_str(), "input" | "textarea" | "select")
    }

    /// Whether this element alone opts out of layout. Ancestors are checked by
    /// [`Dom::is_rendered`].
    fn suppresses_box(&self) -> bool {
        if self.has_attr("hidden") || matches!(self.tag_name.as_str(), "head" | "template" | "script" | "style") {
            return true;
        }
        match self.attributes.get("style") {
            Some(style) => {
                let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
                compact.to_ascii_lowercase().contains("display:none")
            }
            None => false,
        }
    }
}

fn collect_descendants<'a>(el: &'a ElementData, out: &mut Vec<&'a ElementData>) {
    for child in el.element_children() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn collect_text(el: &ElementData, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
            Node::Comment(_) => {}
        }
    }
}

#[cfg(test)]
mod dom_test;

/// Represents a parsed HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Dom {
    pub root: Node,
}

impl Dom {
    pub fn root_element(&self) -> Option<&ElementData> {
        match &self.root {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&ElementData> {
        self.path_to(id).and_then(|path| path.last().copied())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.root {
            Node::Element(el) => find_mut(el, id),
            _ => None,
        }
    }

    /// First element, in document order, whose `name` attribute equals `value`.
    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<&ElementData> {
        let root = self.root_element()?;
        if root.attr(name) == Some(value) {
            return Some(root);
        }
        root.descendants().into_iter().find(|el| el.attr(name) == Some(value))
    }

    /// Elements from the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<&ElementData>> {
        let root = self.root_element()?;
        let mut path = Vec::new();
        if build_path(root, id, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// Elements from `id` up to the root, inclusive.
    pub fn ancestors(&self, id: NodeId) -> Vec<&ElementData> {
        let mut path = self.path_to(id).unwrap_or_default();
        path.reverse();
        path
    }

    /// True when the element and every ancestor would get a layout box. The
    /// browser's own answer wins when the snapshot carries one.
    pub fn is_rendered(&self, id: NodeId) -> bool {
        let Some(path) = self.path_to(id) else {
            return false;
        };
        if let Some(measured) = path.last().and_then(|el| el.attr(RENDERED_MARKER)) {
            return measured == "true";
        }
        for (i, el) in path.iter().enumerate() {
            if el.attr(RENDERED_MARKER) == Some("false") || el.suppresses_box() {
                return false;
            }
            if let Some(parent) = i.checked_sub(1).map(|p| path[p]) {
                // Only the summary of a closed <details> is laid out.
                if parent.tag_name == "details" && !parent.has_attr("open") && el.tag_name != "summary" {
                    return false;
                }
            }
        }
        true
    }
}

fn build_path<'a>(el: &'a ElementData, id: NodeId, path: &mut Vec<&'a ElementData>) -> bool {
    path.push(el);
    if el.id == id {
        return true;
    }
    for child in el.element_children() {
        if build_path(child, id, path) {
            return true;
        }
    }
    path.pop();
    false
}

fn find_mut(el: &mut ElementData, id: NodeId) -> Option<&mut ElementData> {
    if el.id == id {
        return Some(el);
    }
    for child in el.children.iter_mut() {
        if let Node::Element(child_el) = child {
            if let Some(found) = find_mut(child_el, id) {
                return Some(found);
            }
        }
    }
    None
}
