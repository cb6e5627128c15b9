//! Structural descriptors for the element an interaction targeted.
//!
//! The host's UI layer describes the target and its ancestors as
//! [`ElementNode`]s. From that chain we derive the `element_*` properties,
//! including a CSS-selector-like path that is unique within the document.

use serde::{Deserialize, Serialize};

use crate::value::{Properties, Value};

/// Longest `element_text` recorded, in characters.
pub const MAX_TEXT_CHARS: usize = 100;

/// Where a node sits among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingPosition {
    /// 1-based index among siblings with the same tag.
    pub index: usize,
    /// Number of siblings (including this node) with the same tag.
    pub same_tag: usize,
    /// Number of siblings (including this node) with the same tag and class list.
    pub same_tag_and_class: usize,
}

impl Default for SiblingPosition {
    fn default() -> Self {
        Self {
            index: 1,
            same_tag: 1,
            same_tag_and_class: 1,
        }
    }
}

/// One element in the document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementNode {
    /// Tag name.
    pub tag: String,
    /// `id` attribute.
    pub id: Option<String>,
    /// Class list.
    pub classes: Vec<String>,
    /// Text content.
    pub text: Option<String>,
    /// `name` attribute (form controls).
    pub name: Option<String>,
    /// `type` attribute (inputs).
    pub input_type: Option<String>,
    /// `href` attribute (links).
    pub href: Option<String>,
    /// Position among siblings.
    #[serde(default)]
    pub position: SiblingPosition,
}

impl ElementNode {
    /// A node with the given tag, normalized to lowercase.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Set the `id`.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into()).filter(|id: &String| !id.is_empty());
        self
    }

    /// Append a class.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the `name` attribute.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `type` attribute.
    #[must_use]
    pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    /// Set the `href` attribute.
    #[must_use]
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Set the sibling position.
    #[must_use]
    pub fn at_position(mut self, index: usize, same_tag: usize, same_tag_and_class: usize) -> Self {
        self.position = SiblingPosition {
            index,
            same_tag,
            same_tag_and_class,
        };
        self
    }

    fn selector_segment(&self) -> String {
        if let Some(id) = &self.id {
            return format!("#{id}");
        }

        let mut segment = self.tag.clone();
        for class in &self.classes {
            segment.push('.');
            segment.push_str(class);
        }

        let pos = self.position;
        let ambiguous = if self.classes.is_empty() {
            pos.same_tag > 1
        } else {
            pos.same_tag_and_class > 1
        };
        if ambiguous {
            segment.push_str(&format!(":nth-of-type({})", pos.index));
        }
        segment
    }
}

/// An interaction target together with its ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// The targeted node.
    pub node: ElementNode,
    /// Ancestors, nearest first, up to the document root.
    pub ancestors: Vec<ElementNode>,
}

impl Element {
    /// A target with no known ancestors.
    #[must_use]
    pub fn new(node: ElementNode) -> Self {
        Self {
            node,
            ancestors: Vec::new(),
        }
    }

    /// Add the next ancestor outward.
    #[must_use]
    pub fn within(mut self, parent: ElementNode) -> Self {
        self.ancestors.push(parent);
        self
    }

    /// The selector path from the nearest ancestor with an `id` (or the
    /// root) down to the target.
    #[must_use]
    pub fn selector(&self) -> String {
        let mut segments = Vec::new();
        for node in std::iter::once(&self.node).chain(&self.ancestors) {
            segments.push(node.selector_segment());
            if node.id.is_some() {
                break;
            }
        }
        segments.reverse();
        segments.join(" > ")
    }

    /// Trimmed text content, truncated to [`MAX_TEXT_CHARS`].
    #[must_use]
    pub fn text(&self) -> Option<String> {
        let text = self.node.text.as_deref()?.trim();
        (!text.is_empty()).then(|| text.chars().take(MAX_TEXT_CHARS).collect())
    }

    /// Check whether the target acts as a button.
    #[must_use]
    pub fn is_button(&self) -> bool {
        self.node.tag == "button"
            || (self.node.tag == "input"
                && self
                    .node
                    .input_type
                    .as_deref()
                    .is_some_and(|t| matches!(t, "submit" | "button" | "reset")))
    }

    /// Check whether the target is a link.
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.node.tag == "a" || self.node.href.is_some()
    }

    /// Check whether the target is a form control that takes input.
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self.node.tag.as_str(), "input" | "textarea" | "select") && !self.is_button()
    }

    /// Check whether the target is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.node.tag == "img"
    }

    /// The `element_*` properties merged into an event.
    #[must_use]
    pub fn descriptors(&self) -> Properties {
        let classes = (!self.node.classes.is_empty()).then(|| self.node.classes.join(" "));
        [
            ("element_tag", Value::from(self.node.tag.as_str())),
            ("element_id", Value::from(self.node.id.clone())),
            ("element_class", Value::from(classes)),
            ("element_text", Value::from(self.text())),
            ("element_selector", Value::from(self.selector())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_anchors_at_nearest_id() {
        let element = Element::new(ElementNode::new("BUTTON").with_class("like"))
            .within(ElementNode::new("div").with_class("actions"))
            .within(ElementNode::new("article").with_id("post-7"))
            .within(ElementNode::new("main"));

        assert_eq!(element.selector(), "#post-7 > div.actions > button.like");
    }

    #[test]
    fn test_selector_target_with_id() {
        let element = Element::new(ElementNode::new("a").with_id("login"))
            .within(ElementNode::new("nav"));
        assert_eq!(element.selector(), "#login");
    }

    #[test]
    fn test_selector_uniquified_among_same_tag_siblings() {
        let element = Element::new(ElementNode::new("li").at_position(3, 5, 5))
            .within(ElementNode::new("ul").with_class("posts"))
            .within(ElementNode::new("body"));

        assert_eq!(element.selector(), "body > ul.posts > li:nth-of-type(3)");
    }

    #[test]
    fn test_selector_class_disambiguates() {
        let unique = Element::new(ElementNode::new("li").with_class("active").at_position(2, 4, 1));
        assert_eq!(unique.selector(), "li.active");

        let shared = Element::new(ElementNode::new("li").with_class("item").at_position(2, 4, 4));
        assert_eq!(shared.selector(), "li.item:nth-of-type(2)");
    }

    #[test]
    fn test_descriptors() {
        let element = Element::new(
            ElementNode::new("button")
                .with_id("submit")
                .with_class("btn")
                .with_class("primary")
                .with_text("  Publish post \n"),
        );
        let props = element.descriptors();

        assert_eq!(props["element_tag"], Value::from("button"));
        assert_eq!(props["element_id"], Value::from("submit"));
        assert_eq!(props["element_class"], Value::from("btn primary"));
        assert_eq!(props["element_text"], Value::from("Publish post"));
        assert_eq!(props["element_selector"], Value::from("#submit"));
    }

    #[test]
    fn test_descriptors_missing_attributes_are_null() {
        let props = Element::new(ElementNode::new("div")).descriptors();
        assert!(props["element_id"].is_null());
        assert!(props["element_class"].is_null());
        assert!(props["element_text"].is_null());
    }

    #[test]
    fn test_text_truncated() {
        let long = "x".repeat(500);
        let element = Element::new(ElementNode::new("p").with_text(long));
        assert_eq!(element.text().map(|t| t.chars().count()), Some(MAX_TEXT_CHARS));
    }

    #[test]
    fn test_kind_flags() {
        let button = Element::new(ElementNode::new("button"));
        assert!(button.is_button());
        assert!(!button.is_input());

        let submit = Element::new(ElementNode::new("input").with_input_type("submit"));
        assert!(submit.is_button());
        assert!(!submit.is_input());

        let text = Element::new(ElementNode::new("input").with_input_type("text"));
        assert!(text.is_input());

        let link = Element::new(ElementNode::new("a").with_href("/posts"));
        assert!(link.is_link());

        assert!(Element::new(ElementNode::new("img")).is_image());
    }
}
