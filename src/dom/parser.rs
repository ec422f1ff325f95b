use scraper::{Html, Node as ScraperNode};

use super::{Dom, ElementData, Node, NodeId};
use crate::errors::TourError;

/// Parses a page snapshot into an owned tree. Node ids are assigned in
/// document order and only mean something within this snapshot.
pub fn parse(html: &str) -> Result<Dom, TourError> {
    if html.trim().is_empty() {
        return Err(TourError::Snapshot { message: "empty snapshot".to_string() });
    }
    let scraper_dom = Html::parse_document(html);
    let mut next_id: NodeId = 0;
    let root_node = convert_node(scraper_dom.tree.root(), &mut next_id);
    Ok(Dom { root: root_node })
}

fn convert_node(scraper_node: ego_tree::NodeRef<ScraperNode>, next_id: &mut NodeId) -> Node {
    match scraper_node.value() {
        ScraperNode::Document => {
            // Wrap the document node in an artificial element so the root can
            // be treated as an element like everything below it.
            let id = take_id(next_id);
            let children = scraper_node
                .children()
                .map(|c| convert_node(c, next_id))
                .collect();

            Node::Element(ElementData {
                id,
                tag_name: "document".to_string(),
                attributes: std::collections::HashMap::new(),
                children,
            })
        }
        ScraperNode::Element(el) => {
            let id = take_id(next_id);
            let attributes = el.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            let children = scraper_node
                .children()
                .map(|c| convert_node(c, next_id))
                .collect();

            Node::Element(ElementData {
                id,
                tag_name: el.name().to_string(),
                attributes,
                children,
            })
        }
        ScraperNode::Text(text) => Node::Text(text.text.to_string()),
        ScraperNode::Comment(comment) => Node::Comment(comment.comment.to_string()),
        _ => Node::Comment("unsupported node type".to_string()),
    }
}

fn take_id(next_id: &mut NodeId) -> NodeId {
    let id = *next_id;
    *next_id += 1;
    id
}
