//! Semantic matching: describe an element by role, label, purpose and
//! ancestry, and score candidates against such a description.

use std::collections::HashSet;

use stepforge_types::element::ElementInfo;
use stepforge_types::error::PageError;
use stepforge_types::selector::SemanticContext;

use crate::page::BoxPage;

const ROLE_WEIGHT: f64 = 0.35;
const LABEL_WEIGHT: f64 = 0.30;
const PURPOSE_WEIGHT: f64 = 0.20;
const CONTEXT_WEIGHT: f64 = 0.15;

/// Keyword table for purpose inference, checked in order.
const PURPOSE_KEYWORDS: &[(&str, &[&str])] = &[
    ("password", &["password", "passwd", "pwd"]),
    ("email", &["email", "e-mail"]),
    ("search", &["search", "query"]),
    ("phone", &["phone", "tel", "mobile"]),
    ("username", &["username", "user name", "login id"]),
    ("submit", &["submit", "sign in", "log in", "login", "continue", "send", "save"]),
    ("cancel", &["cancel", "close", "dismiss"]),
    ("navigation", &["nav", "menu"]),
    ("name", &["name"]),
];

#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub element: ElementInfo,
    pub score: f64,
}

pub struct SemanticMatcher {
    floor: f64,
}

impl SemanticMatcher {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Best candidate strictly above the confidence floor.
    pub async fn find_by_semantic_context(
        &self,
        target: &SemanticContext,
        page: &BoxPage,
    ) -> Result<Option<SemanticMatch>, PageError> {
        let candidates = page.query_all("*").await?;
        let best = candidates
            .into_iter()
            .filter(|c| c.visible)
            .map(|element| {
                let score = score(target, &analyze_element_context(&element));
                SemanticMatch { element, score }
            })
            .max_by(|a, b| a.score.total_cmp(&b.score));

        Ok(best.filter(|m| m.score > self.floor))
    }
}

/// Derive a semantic descriptor from an element's attributes and ancestry.
pub fn analyze_element_context(element: &ElementInfo) -> SemanticContext {
    let role = element
        .attr("role")
        .map(str::to_string)
        .or_else(|| implicit_role(element).map(str::to_string));

    let label = element
        .attr("aria-label")
        .map(str::to_string)
        .or_else(|| element.label_text.clone())
        .or_else(|| element.attr("placeholder").map(str::to_string))
        .or_else(|| element.attr("title").map(str::to_string))
        .or_else(|| {
            let text = element.text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .or_else(|| element.attr("name").map(str::to_string));

    let own_name = element.field_name();
    let related_fields = element
        .form
        .as_ref()
        .map(|form| {
            form.field_names
                .iter()
                .filter(|f| Some(f.as_str()) != own_name)
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    SemanticContext {
        role,
        purpose: infer_purpose(element, label.as_deref()),
        label,
        context: element.ancestors.iter().map(|a| a.descriptor()).collect(),
        related_fields,
    }
}

/// Weighted overlap between a target description and a candidate's.
///
/// Only dimensions present on the target count; weights are renormalised
/// over those.
pub fn score(target: &SemanticContext, candidate: &SemanticContext) -> f64 {
    let mut total = 0.0;
    let mut weight = 0.0;

    if let Some(role) = &target.role {
        weight += ROLE_WEIGHT;
        if candidate
            .role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(role))
        {
            total += ROLE_WEIGHT;
        }
    }
    if let Some(label) = &target.label {
        weight += LABEL_WEIGHT;
        if let Some(candidate_label) = &candidate.label {
            total += LABEL_WEIGHT * jaccard(&tokens(label), &tokens(candidate_label));
        }
    }
    if let Some(purpose) = &target.purpose {
        weight += PURPOSE_WEIGHT;
        if candidate
            .purpose
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(purpose))
        {
            total += PURPOSE_WEIGHT;
        }
    }
    if !target.context.is_empty() {
        weight += CONTEXT_WEIGHT;
        let a: HashSet<String> = target.context.iter().map(|c| c.to_lowercase()).collect();
        let b: HashSet<String> = candidate.context.iter().map(|c| c.to_lowercase()).collect();
        total += CONTEXT_WEIGHT * jaccard(&a, &b);
    }

    if weight == 0.0 { 0.0 } else { total / weight }
}

fn implicit_role(element: &ElementInfo) -> Option<&'static str> {
    let input_type = element.attr("type").map(str::to_ascii_lowercase);
    match element.tag.to_ascii_lowercase().as_str() {
        "a" if element.attr("href").is_some() => Some("link"),
        "button" => Some("button"),
        "select" => Some("combobox"),
        "textarea" => Some("textbox"),
        "img" => Some("img"),
        "form" => Some("form"),
        "nav" => Some("navigation"),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some("heading"),
        "input" => match input_type.as_deref() {
            Some("button" | "submit" | "reset" | "image") => Some("button"),
            Some("checkbox") => Some("checkbox"),
            Some("radio") => Some("radio"),
            Some("range") => Some("slider"),
            Some("search") => Some("searchbox"),
            Some("hidden") => None,
            _ => Some("textbox"),
        },
        _ => None,
    }
}

fn infer_purpose(element: &ElementInfo, label: Option<&str>) -> Option<String> {
    match element.attr("type").map(str::to_ascii_lowercase).as_deref() {
        Some("password") => return Some("password".into()),
        Some("email") => return Some("email".into()),
        Some("search") => return Some("search".into()),
        Some("tel") => return Some("phone".into()),
        Some("submit") => return Some("submit".into()),
        _ => {}
    }

    let haystack = [
        element.attr("id"),
        element.attr("name"),
        element.attr("autocomplete"),
        label,
        Some(element.text.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();

    PURPOSE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| haystack.contains(w)))
        .map(|(purpose, _)| (*purpose).to_string())
}

fn tokens(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    inter / union
}
