#[cfg(test)]
mod tests {
    use crate::dom::document::Document;
    use crate::dom::events::EventKind;
    use crate::dom::parser;
    use crate::errors::TourError;

    const PAGE: &str = r#"<html><body>
        <div id="shell">
          <button data-tour="chat-dock-toggle">Chat</button>
          <nav data-tour="chat-dock-menu" hidden><button data-tour="ai-menu-entry">AI</button></nav>
          <div style="display: none"><span data-tour="collapsed">x</span></div>
          <details open><p data-tour="open-details">Body</p></details>
          <form data-tour="chat-form">
            <textarea data-tour="message-input">draft</textarea>
            <input data-tour="subject" value="Hi">
            <input name="untracked" value="ignored">
            <button type="submit" data-tour="message-send">Send</button>
          </form>
          <ul><li>one</li><li><a>two</a></li></ul>
        </div>
    </body></html>"#;

    #[test]
    fn test_parse_assigns_document_root() {
        let dom = parser::parse(PAGE).unwrap();
        let root = dom.root_element().unwrap();
        assert_eq!(root.tag_name, "document");
        assert_eq!(root.id, 0);
        assert!(dom.find_by_attr("data-tour", "chat-dock-toggle").is_some());
    }

    #[test]
    fn test_parse_rejects_empty_snapshot() {
        assert!(matches!(parser::parse("   \n"), Err(TourError::Snapshot { .. })));
    }

    #[test]
    fn test_path_and_ancestors_are_mirrored() {
        let dom = parser::parse(PAGE).unwrap();
        let entry = dom.find_by_attr("data-tour", "ai-menu-entry").unwrap().id;
        let down: Vec<_> = dom.path_to(entry).unwrap().iter().map(|el| el.tag_name.clone()).collect();
        let up: Vec<_> = dom.ancestors(entry).iter().map(|el| el.tag_name.clone()).collect();
        assert_eq!(down, vec!["document", "html", "body", "div", "nav", "button"]);
        assert_eq!(up.first().map(String::as_str), Some("button"));
        assert_eq!(up.last().map(String::as_str), Some("document"));
        assert!(dom.path_to(9_999).is_none());
    }

    #[test]
    fn test_rendering_rules() {
        let dom = parser::parse(PAGE).unwrap();
        let id = |tour_id: &str| dom.find_by_attr("data-tour", tour_id).unwrap().id;
        assert!(dom.is_rendered(id("chat-dock-toggle")));
        assert!(!dom.is_rendered(id("chat-dock-menu")));
        assert!(!dom.is_rendered(id("ai-menu-entry")));
        assert!(!dom.is_rendered(id("collapsed")));
        assert!(dom.is_rendered(id("open-details")));
    }

    #[test]
    fn test_measured_visibility_overrides_markup() {
        let page = r#"<html><body>
            <aside class="dock">
              <button data-tour="chat-dock-toggle" data-tour-rendered="true">Chat</button>
              <nav class="dock-menu is-collapsed" data-tour="chat-dock-menu" data-tour-rendered="false">
                <button data-tour="ai-menu-entry">AI</button>
              </nav>
            </aside>
            <section data-tour="chat-popup" hidden data-tour-rendered="true"></section>
        </body></html>"#;
        let mut document = Document::from_html(page, "data-tour").unwrap();
        let menu = document.find("chat-dock-menu").unwrap();
        let entry = document.find("ai-menu-entry").unwrap();
        let popup = document.find("chat-popup").unwrap();

        assert!(!document.dom().is_rendered(menu), "hidden by a stylesheet class");
        assert!(!document.dom().is_rendered(entry), "inside a menu the browser did not lay out");
        assert!(document.dom().is_rendered(popup), "the browser measured a box");
        assert!(document.dom().is_rendered(document.find("chat-dock-toggle").unwrap()));

        // A local toggle makes the old measurement stale.
        assert!(document.set_hidden(menu, false));
        assert!(document.dom().is_rendered(menu));
    }

    #[test]
    fn test_values_of_form_controls() {
        let mut document = Document::from_html(PAGE, "data-tour").unwrap();
        let input = document.find("message-input").unwrap();
        assert_eq!(document.value_of(input).unwrap(), "draft");

        assert!(document.set_value(input, "new text"));
        assert_eq!(document.value_of(input).unwrap(), "new text");

        let form = document.find("chat-form").unwrap();
        let fields = document.form_fields(form);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["message-input"], "new text");
        assert_eq!(fields["subject"], "Hi");
    }

    #[test]
    fn test_hidden_toggle_and_focus_survive_snapshot() {
        let mut document = Document::from_html(PAGE, "data-tour").unwrap();
        let menu = document.find("chat-dock-menu").unwrap();
        assert!(document.set_hidden(menu, false));
        assert!(document.dom().is_rendered(menu));

        let input = document.find("message-input").unwrap();
        assert!(document.focus(input));
        let reordered = PAGE.replace("<div id=\"shell\">", "<div id=\"shell\"><p>banner</p>");
        document.replace_snapshot(parser::parse(&reordered).unwrap());
        let input = document.find("message-input").unwrap();
        assert_eq!(document.focused(), Some(input));
        assert!(!document.focus(9_999));
    }

    #[test]
    fn test_selectors_anchor_on_nearest_identifier() {
        let document = Document::from_html(PAGE, "data-tour").unwrap();
        let toggle = document.find("chat-dock-toggle").unwrap();
        assert_eq!(document.selector_for(toggle).unwrap(), "[data-tour=\"chat-dock-toggle\"]");

        let link = document
            .dom()
            .root_element()
            .unwrap()
            .descendants()
            .into_iter()
            .find(|el| el.tag_name == "a")
            .unwrap()
            .id;
        assert_eq!(
            document.selector_for(link).unwrap(),
            "#shell > ul:nth-child(6) > li:nth-child(2) > a:nth-child(1)"
        );
    }

    #[test]
    fn test_missing_nodes_are_noops() {
        let mut document = Document::from_html(PAGE, "data-tour").unwrap();
        assert!(document.find("nope").is_none());
        assert!(!document.set_value(9_999, "x"));
        assert!(!document.set_hidden(9_999, true));
        assert!(!document.dispatch_on(EventKind::Click, 9_999));
        assert!(document.selector_for(9_999).is_none());
    }
}
