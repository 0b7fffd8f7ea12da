//! Minimal page model: the anchors of an HTML document.

use scraper::{Html, Selector};
use serde::Serialize;

/// An `<a>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub href: Option<String>,
    pub classes: Vec<String>,
    /// `data-target-domain` attribute.
    pub target_domain: Option<String>,
    pub text: String,
}

impl Anchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_target_domain(mut self, domain: impl Into<String>) -> Self {
        self.target_domain = Some(domain.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// The anchors of a page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    anchors: Vec<Anchor>,
}

impl Document {
    pub fn with_anchors(anchors: Vec<Anchor>) -> Self {
        Self { anchors }
    }

    /// Collect every `<a>` element of an HTML document.
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut anchors = Vec::new();

        if let Ok(sel) = Selector::parse("a") {
            for el in parsed.select(&sel) {
                let element = el.value();
                anchors.push(Anchor {
                    href: element.attr("href").map(str::to_string),
                    classes: element.classes().map(str::to_string).collect(),
                    target_domain: element.attr("data-target-domain").map(str::to_string),
                    text: el.text().collect::<String>().trim().to_string(),
                });
            }
        }

        Self { anchors }
    }

    /// Add an anchor after load, as a script would.
    pub fn push(&mut self, anchor: Anchor) -> usize {
        self.anchors.push(anchor);
        self.anchors.len() - 1
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn anchor(&self, index: usize) -> Option<&Anchor> {
        self.anchors.get(index)
    }

    pub fn anchor_mut(&mut self, index: usize) -> Option<&mut Anchor> {
        self.anchors.get_mut(index)
    }

    /// Indices of anchors carrying `class`.
    pub fn marked(&self, class: &str) -> Vec<usize> {
        self.anchors
            .iter()
            .enumerate()
            .filter(|(_, a)| a.has_class(class))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <nav>
    <a href="/">Home</a>
    <a class="cross-domain-link nav" href="http://site-b.local:3002/" data-target-domain="site-b.local:3002">
      Site B
    </a>
    <a class="cross-domain-link">No target</a>
  </nav>
</body></html>"#;

    #[test]
    fn test_parse_anchors() {
        let doc = Document::parse_html(PAGE);
        assert_eq!(doc.len(), 3);

        let home = doc.anchor(0).unwrap();
        assert_eq!(home.href.as_deref(), Some("/"));
        assert!(home.classes.is_empty());

        let site_b = doc.anchor(1).unwrap();
        assert!(site_b.has_class("cross-domain-link"));
        assert!(site_b.has_class("nav"));
        assert_eq!(site_b.target_domain.as_deref(), Some("site-b.local:3002"));
        assert_eq!(site_b.text, "Site B");

        assert_eq!(doc.anchor(2).unwrap().href, None);
    }

    #[test]
    fn test_marked() {
        let doc = Document::parse_html(PAGE);
        assert_eq!(doc.marked("cross-domain-link"), vec![1, 2]);
        assert!(doc.marked("missing").is_empty());
    }

    #[test]
    fn test_push() {
        let mut doc = Document::default();
        let index = doc.push(Anchor::new("/later").with_class("cross-domain-link"));
        assert_eq!(index, 0);
        assert_eq!(doc.marked("cross-domain-link"), vec![0]);
    }
}
