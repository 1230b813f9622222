//! Template markup parsing.
//!
//! Templates produce plain HTML strings; the differ parses them into a
//! transient [`Fragment`] that lives only for the duration of one patch.

use scraper::{ElementRef, Html, Node};
use smallvec::SmallVec;

pub type Attrs = SmallVec<[(String, String); 4]>;

#[derive(Clone, Debug, PartialEq)]
pub enum ParsedNode {
    Element {
        tag: String,
        attrs: Attrs,
        children: Vec<ParsedNode>,
    },
    Text(String),
}

impl ParsedNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            ParsedNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            ParsedNode::Text(_) => None,
        }
    }
}

pub type Fragment = Vec<ParsedNode>;

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID.contains(&tag)
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            c => out.push(c),
        }
    }
    out
}

/// Parses an HTML fragment the way a browser parses `innerHTML` in a
/// `<body>`: misnested tags are repaired, entities decoded, comments and
/// doctypes dropped. Names of tags and attributes fold to lowercase.
pub fn parse_fragment(src: &str) -> Fragment {
    let html = Html::parse_fragment(src);
    let mut out = Fragment::new();
    convert_children(html.root_element(), &mut out);
    out
}

fn convert_children(parent: ElementRef<'_>, out: &mut Vec<ParsedNode>) {
    for child in parent.children() {
        if let Some(el) = ElementRef::wrap(child) {
            let attrs: Attrs = el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let mut children = Vec::new();
            convert_children(el, &mut children);
            out.push(ParsedNode::Element {
                tag: el.value().name().to_string(),
                attrs,
                children,
            });
        } else if let Node::Text(text) = child.value() {
            push_text(out, text);
        }
    }
}

fn push_text(siblings: &mut Vec<ParsedNode>, text: &str) {
    if text.is_empty() {
        return;
    }
    // indentation between tags is not content
    if text.trim().is_empty() && text.contains('\n') {
        return;
    }
    if let Some(ParsedNode::Text(prev)) = siblings.last_mut() {
        prev.push_str(text);
    } else {
        siblings.push(ParsedNode::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(node: &ParsedNode) -> (&str, &Attrs, &[ParsedNode]) {
        match node {
            ParsedNode::Element {
                tag,
                attrs,
                children,
            } => (tag.as_str(), attrs, children.as_slice()),
            ParsedNode::Text(t) => panic!("expected element, got text {t:?}"),
        }
    }

    #[test]
    fn nested_elements_and_attributes() {
        let frag = parse_fragment(r#"<ul class="list"><li key=1 @click="pick">a</li><li key='2' checked>b</li></ul>"#);
        assert_eq!(frag.len(), 1);
        let (tag, attrs, kids) = el(&frag[0]);
        assert_eq!(tag, "ul");
        assert_eq!(attrs[0], ("class".to_string(), "list".to_string()));
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0].attr("key"), Some("1"));
        assert_eq!(kids[0].attr("@click"), Some("pick"));
        assert_eq!(kids[1].attr("key"), Some("2"));
        assert_eq!(kids[1].attr("checked"), Some(""));
        assert_eq!(el(&kids[1]).2, &[ParsedNode::Text("b".into())]);
    }

    #[test]
    fn indentation_is_dropped_inline_space_kept() {
        let frag = parse_fragment("<div>\n  <b>x</b> <i>y</i>\n</div>");
        let (_, _, kids) = el(&frag[0]);
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[1], ParsedNode::Text(" ".into()));
    }

    #[test]
    fn void_self_closing_and_comments() {
        let frag = parse_fragment(r#"<p>a<br>b<!-- note --><img src="x.png"/><span/></p>"#);
        let (_, _, kids) = el(&frag[0]);
        let tags: Vec<String> = kids
            .iter()
            .map(|k| match k {
                ParsedNode::Element { tag, .. } => tag.clone(),
                ParsedNode::Text(t) => format!("#{t}"),
            })
            .collect();
        assert_eq!(tags, vec!["#a", "br", "#b", "img", "span"]);
    }

    #[test]
    fn entities_and_raw_text() {
        let frag = parse_fragment("<p title=\"a &amp; b\">1 &lt; 2 &#65;&#x42;</p><style>a > b {}</style>");
        assert_eq!(frag[0].attr("title"), Some("a & b"));
        assert_eq!(el(&frag[0]).2, &[ParsedNode::Text("1 < 2 AB".into())]);
        assert_eq!(el(&frag[1]).2, &[ParsedNode::Text("a > b {}".into())]);
    }

    #[test]
    fn tolerates_broken_markup() {
        let frag = parse_fragment("</nope><div><p>open<span>x</div>tail < 3");
        assert_eq!(frag.len(), 2);
        let (tag, _, kids) = el(&frag[0]);
        assert_eq!(tag, "div");
        assert_eq!(el(&kids[0]).0, "p");
        assert_eq!(frag[1], ParsedNode::Text("tail < 3".into()));
    }

    #[test]
    fn binding_attribute_names_fold_like_html() {
        let frag = parse_fragment(r#"<child-view :userName="user" DATA-X="1" @Click="go"></child-view>"#);
        assert_eq!(frag[0].attr(":username"), Some("user"));
        assert_eq!(frag[0].attr("data-x"), Some("1"));
        assert_eq!(frag[0].attr("@click"), Some("go"));
    }

    #[test]
    fn misnested_markup_is_repaired() {
        let frag = parse_fragment("<p>one<div>two</div>");
        let tags: Vec<&str> = frag.iter().map(|n| el(n).0).collect();
        assert_eq!(tags, vec!["p", "div"]);
    }
}
