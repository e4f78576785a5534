//! Element snapshots returned by a page capability.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::selector::BoundingBox;

/// One ancestor in an element's DOM ancestry chain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AncestorInfo {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AncestorInfo {
    /// Compact descriptor such as `form#login` or `nav[navigation]`.
    pub fn descriptor(&self) -> String {
        let mut out = self.tag.clone();
        if let Some(id) = &self.id {
            out.push('#');
            out.push_str(id);
        }
        if let Some(role) = &self.role {
            out.push('[');
            out.push_str(role);
            out.push(']');
        }
        out
    }
}

/// The nearest enclosing form of an element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Names (or ids) of every field in the form, in document order.
    #[serde(default)]
    pub field_names: Vec<String>,
}

/// A concrete element on the page.
///
/// `handle` is an opaque identifier assigned by the page capability; it is
/// what `click`/`type_text` act upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub handle: String,
    pub tag: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Text of an associated `<label>`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_text: Option<String>,
    /// Ancestry, nearest first.
    #[serde(default)]
    pub ancestors: Vec<AncestorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<FormInfo>,
}

fn default_visible() -> bool {
    true
}

impl Default for ElementInfo {
    fn default() -> Self {
        Self {
            handle: String::new(),
            tag: String::new(),
            attributes: HashMap::new(),
            text: String::new(),
            bounding_box: BoundingBox::default(),
            visible: true,
            label_text: None,
            ancestors: Vec::new(),
            form: None,
        }
    }
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// The field name used to identify this element inside a form.
    pub fn field_name(&self) -> Option<&str> {
        self.attr("name").or_else(|| self.id())
    }
}

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_descriptor_includes_id_and_role() {
        let a = AncestorInfo {
            tag: "form".into(),
            id: Some("login".into()),
            role: None,
        };
        assert_eq!(a.descriptor(), "form#login");

        let b = AncestorInfo {
            tag: "nav".into(),
            id: None,
            role: Some("navigation".into()),
        };
        assert_eq!(b.descriptor(), "nav[navigation]");
    }

    #[test]
    fn field_name_prefers_name_over_id() {
        let mut el = ElementInfo {
            handle: "e1".into(),
            tag: "input".into(),
            ..Default::default()
        };
        el.attributes.insert("id".into(), "email-input".into());
        assert_eq!(el.field_name(), Some("email-input"));
        el.attributes.insert("name".into(), "email".into());
        assert_eq!(el.field_name(), Some("email"));
    }

    #[test]
    fn missing_visible_defaults_to_true() {
        let el: ElementInfo = serde_json::from_str(r#"{"handle":"e1","tag":"div"}"#).unwrap();
        assert!(el.visible);
    }
}
