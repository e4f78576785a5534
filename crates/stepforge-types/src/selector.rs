//! Selector descriptors used to locate a target element.
//!
//! A `Selector` carries a primary CSS selector, an ordered fallback chain,
//! and optional visual and semantic descriptors used for self-healing when
//! every string selector misses.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the box has a non-zero visible area.
    pub fn is_visible(&self) -> bool {
        self.area() > 0.0
    }
}

/// Visual descriptor captured when the step was authored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisualFingerprint {
    /// Base64-encoded element screenshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    /// 64-bit perceptual hash, hex encoded.
    #[serde(default)]
    pub visual_hash: String,
}

/// Semantic descriptor of an element: what it is and where it lives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemanticContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Ancestry chain, nearest ancestor first (e.g. `["form#login", "main"]`).
    #[serde(default)]
    pub context: Vec<String>,
    /// Names of sibling fields in the nearest form.
    #[serde(default)]
    pub related_fields: Vec<String>,
}

/// Resolution descriptor for a target element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SelectorRepr")]
pub struct Selector {
    pub primary: String,
    pub fallbacks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_fingerprint: Option<VisualFingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_context: Option<SemanticContext>,
}

impl Selector {
    /// A selector with only a primary string and no fallbacks.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallbacks: Vec::new(),
            visual_fingerprint: None,
            semantic_context: None,
        }
    }

    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallbacks = fallbacks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visual(mut self, fingerprint: VisualFingerprint) -> Self {
        self.visual_fingerprint = Some(fingerprint);
        self
    }

    pub fn with_semantic(mut self, context: SemanticContext) -> Self {
        self.semantic_context = Some(context);
        self
    }

    /// Key under which learned confidence for a specific selector string
    /// is stored: `<primary>::<candidate>`.
    pub fn confidence_key(&self, candidate: &str) -> String {
        format!("{}::{}", self.primary, candidate)
    }

    /// Primary followed by every fallback, in declared order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}

/// Authored selectors may be a bare string (`"#btn"`) or a full object.
#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorRepr {
    Plain(String),
    Full {
        primary: String,
        #[serde(default)]
        fallbacks: Vec<String>,
        #[serde(default)]
        visual_fingerprint: Option<VisualFingerprint>,
        #[serde(default)]
        semantic_context: Option<SemanticContext>,
    },
}

impl From<SelectorRepr> for Selector {
    fn from(repr: SelectorRepr) -> Self {
        match repr {
            SelectorRepr::Plain(primary) => Selector::new(primary),
            SelectorRepr::Full {
                primary,
                fallbacks,
                visual_fingerprint,
                semantic_context,
            } => Selector {
                primary,
                fallbacks,
                visual_fingerprint,
                semantic_context,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_deserializes_as_primary() {
        let sel: Selector = serde_json::from_str(r##""#btn""##).unwrap();
        assert_eq!(sel.primary, "#btn");
        assert!(sel.fallbacks.is_empty());
        assert!(sel.visual_fingerprint.is_none());
    }

    #[test]
    fn full_object_keeps_fallback_order() {
        let sel: Selector = serde_json::from_str(
            r##"{
                "primary": "#submit",
                "fallbacks": ["button[type=submit]", ".btn-primary"],
                "semantic_context": { "role": "button", "label": "Sign in" }
            }"##,
        )
        .unwrap();
        assert_eq!(sel.fallbacks, vec!["button[type=submit]", ".btn-primary"]);
        let semantic = sel.semantic_context.unwrap();
        assert_eq!(semantic.role.as_deref(), Some("button"));
        assert!(semantic.context.is_empty());
    }

    #[test]
    fn candidates_lists_primary_first() {
        let sel = Selector::new("#a").with_fallbacks(["#b", "#c"]);
        let all: Vec<&str> = sel.candidates().collect();
        assert_eq!(all, vec!["#a", "#b", "#c"]);
    }

    #[test]
    fn bounding_box_visibility() {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 5.0).is_visible());
        assert!(!BoundingBox::new(4.0, 4.0, 0.0, 5.0).is_visible());
        assert_eq!(BoundingBox::new(0.0, 0.0, 10.0, 4.0).center(), (5.0, 2.0));
    }
}
