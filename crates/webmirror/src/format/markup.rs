//! HTML canonicalization.
//!
//! The document is parsed with the `scraper` crate (html5ever underneath,
//! so the tree matches what a browser builds) and copied into an owned tree
//! that callers may rewrite. Printing that tree is a fixed point: parsing
//! the printed text and printing again yields the same bytes.

use scraper::{ElementRef, Html, Node};

use super::{ContentKind, INDENT};
use crate::error::FormatError;

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose content the parser keeps as unescaped raw text.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];

/// Elements where whitespace is significant.
const PREFORMATTED_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

/// A node in an owned HTML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    /// Doctype declaration body, e.g. `html`.
    Doctype(String),
    Comment(String),
    /// Decoded text, whitespace as parsed.
    Text(String),
    Element(MarkupElement),
}

/// An HTML element with its attributes in canonical (sorted) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    /// Value of the named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Overwrite an existing attribute. Returns `false` if it is absent.
    pub fn replace_attr(&mut self, name: &str, value: &str) -> bool {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, current)) => {
                *current = value.to_string();
                true
            }
            None => false,
        }
    }

    fn is(&self, names: &[&str]) -> bool {
        names.contains(&self.name.as_str())
    }
}

/// A parsed HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupDocument {
    pub children: Vec<MarkupNode>,
}

impl MarkupDocument {
    /// Parse a complete HTML document.
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        if raw.trim().is_empty() {
            return Err(FormatError::new(ContentKind::Markup, "empty document"));
        }

        let html = Html::parse_document(raw);
        let mut children = Vec::new();
        for child in html.tree.root().children() {
            match child.value() {
                Node::Doctype(doctype) => {
                    children.push(MarkupNode::Doctype(doctype_body(
                        doctype.name(),
                        doctype.public_id(),
                        doctype.system_id(),
                    )));
                }
                Node::Comment(comment) => children.push(MarkupNode::Comment(comment.to_string())),
                Node::Element(_) => {
                    if let Some(element) = ElementRef::wrap(child) {
                        children.push(MarkupNode::Element(convert_element(element)));
                    }
                }
                _ => {}
            }
        }

        if !children.iter().any(|c| matches!(c, MarkupNode::Element(_))) {
            return Err(FormatError::new(
                ContentKind::Markup,
                "document has no root element",
            ));
        }

        Ok(Self { children })
    }

    /// Visit every element, depth first, in document order.
    pub fn visit_elements_mut(&mut self, f: &mut dyn FnMut(&mut MarkupElement)) {
        for child in &mut self.children {
            visit_node_mut(child, f);
        }
    }

    /// Print the canonical form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            render_node(node, 0, &mut out);
        }
        out
    }
}

/// Parse and re-print an HTML document in canonical form.
pub fn format_markup(raw: &str) -> Result<String, FormatError> {
    MarkupDocument::parse(raw).map(|doc| doc.render())
}

fn doctype_body(name: &str, public_id: &str, system_id: &str) -> String {
    let mut body = name.to_string();
    if !public_id.is_empty() {
        body.push_str(&format!(" PUBLIC \"{public_id}\""));
        if !system_id.is_empty() {
            body.push_str(&format!(" \"{system_id}\""));
        }
    } else if !system_id.is_empty() {
        body.push_str(&format!(" SYSTEM \"{system_id}\""));
    }
    body
}

fn convert_element(element: ElementRef<'_>) -> MarkupElement {
    let value = element.value();

    let mut attrs: Vec<(String, String)> = value
        .attrs()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    attrs.dedup_by(|a, b| a.0 == b.0);

    let mut children = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => match children.last_mut() {
                Some(MarkupNode::Text(previous)) => previous.push_str(text),
                _ => children.push(MarkupNode::Text(text.to_string())),
            },
            Node::Comment(comment) => children.push(MarkupNode::Comment(comment.to_string())),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    children.push(MarkupNode::Element(convert_element(child_element)));
                }
            }
            _ => {}
        }
    }

    MarkupElement {
        name: value.name().to_string(),
        attrs,
        children,
    }
}

fn visit_node_mut(node: &mut MarkupNode, f: &mut dyn FnMut(&mut MarkupElement)) {
    if let MarkupNode::Element(element) = node {
        f(element);
        for child in &mut element.children {
            visit_node_mut(child, f);
        }
    }
}

// ── Printing ──

fn push_line(out: &mut String, depth: usize, content: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(content);
    out.push('\n');
}

fn render_node(node: &MarkupNode, depth: usize, out: &mut String) {
    match node {
        MarkupNode::Doctype(body) => push_line(out, depth, &format!("<!DOCTYPE {body}>")),
        MarkupNode::Comment(comment) => push_line(out, depth, &format!("<!--{comment}-->")),
        MarkupNode::Text(text) => {
            let collapsed = collapse_whitespace(text);
            if !collapsed.is_empty() {
                push_line(out, depth, &escape_text(&collapsed));
            }
        }
        MarkupNode::Element(element) => render_element(element, depth, out),
    }
}

fn render_element(element: &MarkupElement, depth: usize, out: &mut String) {
    let open = open_tag(element);
    let close = format!("</{}>", element.name);

    if element.is(VOID_ELEMENTS) {
        push_line(out, depth, &open);
        return;
    }

    if element.is(RAW_TEXT_ELEMENTS) || element.is(PREFORMATTED_ELEMENTS) {
        let mut inner = String::new();
        render_inline_children(element, &mut inner);
        if element.is(PREFORMATTED_ELEMENTS) && inner.starts_with('\n') {
            // The parser swallows one newline right after the start tag.
            inner.insert(0, '\n');
        }
        push_line(out, depth, &format!("{open}{inner}{close}"));
        return;
    }

    let text_only = element
        .children
        .iter()
        .all(|child| matches!(child, MarkupNode::Text(_)));
    if text_only {
        let text: String = element
            .children
            .iter()
            .filter_map(|child| match child {
                MarkupNode::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let collapsed = collapse_whitespace(&text);
        push_line(out, depth, &format!("{open}{}{close}", escape_text(&collapsed)));
        return;
    }

    push_line(out, depth, &open);
    for child in &element.children {
        render_node(child, depth + 1, out);
    }
    push_line(out, depth, &close);
}

/// Serialize children without any layout changes.
fn render_inline_children(element: &MarkupElement, out: &mut String) {
    let raw = element.is(RAW_TEXT_ELEMENTS);
    for child in &element.children {
        match child {
            MarkupNode::Text(text) if raw => out.push_str(text),
            MarkupNode::Text(text) => out.push_str(&escape_text(text)),
            MarkupNode::Comment(comment) => out.push_str(&format!("<!--{comment}-->")),
            MarkupNode::Doctype(_) => {}
            MarkupNode::Element(inner) => {
                out.push_str(&open_tag(inner));
                if !inner.is(VOID_ELEMENTS) {
                    render_inline_children(inner, out);
                    out.push_str(&format!("</{}>", inner.name));
                }
            }
        }
    }
}

fn open_tag(element: &MarkupElement) -> String {
    let mut tag = format!("<{}", element.name);
    for (name, value) in &element.attrs {
        tag.push(' ');
        tag.push_str(name);
        if !value.is_empty() {
            tag.push_str("=\"");
            tag.push_str(&escape_attr(value));
            tag.push('"');
        }
    }
    tag.push('>');
    tag
}

fn collapse_whitespace(text: &str) -> String {
    text.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_layout() {
        let raw = "<!doctype html><html><head><title>T</title></head><body><p>Hi</p></body></html>";
        let expected = "\
<!DOCTYPE html>
<html>
    <head>
        <title>T</title>
    </head>
    <body>
        <p>Hi</p>
    </body>
</html>
";
        assert_eq!(format_markup(raw).unwrap(), expected);
    }

    #[test]
    fn whitespace_and_attribute_order_do_not_matter() {
        let a = r#"<html><head><meta name="a" content="b"></head><body><div  id="x"   class='y'>hello
            world</div></body></html>"#;
        let b = r#"<html>
  <head>
    <meta content="b" name="a" />
  </head>
  <body><div class="y" id="x">hello world</div></body>
</html>"#;
        assert_eq!(format_markup(a).unwrap(), format_markup(b).unwrap());
    }

    #[test]
    fn printing_is_a_fixed_point() {
        let raw = r#"<!DOCTYPE html><html lang=en><head>
            <script nonce="n1">var a = "<b>";  if (a < 2) {}</script>
            <style id="s">.a{color:red}
.b{color:blue}</style></head>
            <body><div>one <b>two</b> &amp; three<!-- note --></div>
            <pre>
  keep   this</pre><input disabled><noscript><img src="x.png"></noscript></body></html>"#;
        let once = format_markup(raw).unwrap();
        let twice = format_markup(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn raw_text_is_verbatim() {
        let raw = "<html><head><script>if (a<b && c>d) {\n  x();\n}</script></head><body></body></html>";
        let out = format_markup(raw).unwrap();
        assert!(out.contains("<script>if (a<b && c>d) {\n  x();\n}</script>"));
    }

    #[test]
    fn void_and_boolean_attributes() {
        let out = format_markup("<body><input disabled type=text><br></body>").unwrap();
        assert!(out.contains("<input disabled type=\"text\">"));
        assert!(out.contains("<br>"));
        assert!(!out.contains("</br>"));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let out = format_markup(r#"<body><a title='say "hi"' href="?a=1&amp;b=2">x</a></body>"#)
            .unwrap();
        assert!(out.contains(r#"<a href="?a=1&amp;b=2" title="say &quot;hi&quot;">x</a>"#));
    }

    #[test]
    fn empty_document_is_an_error() {
        let err = format_markup("  \n ").unwrap_err();
        assert_eq!(err.kind, ContentKind::Markup);
    }

    #[test]
    fn replace_attr_reports_presence() {
        let mut doc = MarkupDocument::parse("<body><div nonce=\"a\"></div></body>").unwrap();
        let mut replaced = 0;
        doc.visit_elements_mut(&mut |el| {
            if el.replace_attr("nonce", "X") {
                replaced += 1;
            }
        });
        assert_eq!(replaced, 1);
        assert!(doc.render().contains("<div nonce=\"X\"></div>"));
    }
}
