//! Markup-level extraction from rendered listing pages.
//!
//! Attributes are read in two passes. The structural pass looks for label
//! nodes ("Bedrooms:") and reads the neighbouring value. Fields it misses
//! are retried with a label regex over the flattened page text, which keeps
//! working when the portal reshuffles its markup.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

const DEFAULT_ALIASES: &str = include_str!("../../data/attribute_aliases.toml");

/// Longest value the free-text pass accepts; longer hits are prose.
const MAX_TEXT_VALUE_LEN: usize = 50;

const DESCRIPTION_MAX_CHARS: usize = 800;
const DESCRIPTION_SELECTED_MIN_CHARS: usize = 30;
const DESCRIPTION_BLOCK_MIN_CHARS: usize = 50;
const DESCRIPTION_BLOCK_MAX_CHARS: usize = 2000;

const BOILERPLATE_REGIONS: [&str; 4] = ["nav", "header", "footer", "aside"];
const NON_CONTENT_TAGS: [&str; 3] = ["script", "style", "noscript"];

/// Standard attribute fields filled from listing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    Bedrooms,
    Bathrooms,
    LandSizeRaw,
    FloorAreaRaw,
    StoreysRaw,
    Furnishing,
}

/// Raw attribute text keyed by field. Absent keys were not found.
pub type Attributes = BTreeMap<AttributeKey, String>;

#[derive(Debug, Deserialize)]
struct AliasFile {
    #[serde(default)]
    field: Vec<AliasGroup>,
}

#[derive(Debug, Deserialize)]
struct AliasGroup {
    key: AttributeKey,
    labels: Vec<String>,
}

#[derive(Debug, Clone)]
struct AliasEntry {
    key: AttributeKey,
    pattern: Regex,
}

/// Label synonyms for each attribute field.
#[derive(Debug, Clone)]
pub struct AliasTable {
    by_label: HashMap<String, AttributeKey>,
    ordered: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn bundled() -> Result<Self> {
        Self::from_toml(DEFAULT_ALIASES).context("Bundled alias table is invalid")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: AliasFile = toml::from_str(content)?;
        let mut by_label = HashMap::new();
        let mut ordered = Vec::new();

        for group in file.field {
            for label in group.labels {
                let label = label.trim().to_lowercase();
                if label.is_empty() || by_label.contains_key(&label) {
                    continue;
                }
                let pattern = Regex::new(&format!(
                    r"(?i){}\s*[:\-]\s*([^\n\r,|]+)",
                    regex::escape(&label)
                ))
                .with_context(|| format!("Cannot build pattern for label '{}'", label))?;
                by_label.insert(label, group.key);
                ordered.push(AliasEntry {
                    key: group.key,
                    pattern,
                });
            }
        }

        debug!(labels = ordered.len(), "Loaded attribute alias table");
        Ok(Self { by_label, ordered })
    }

    pub fn resolve(&self, label: &str) -> Option<AttributeKey> {
        self.by_label.get(label).copied()
    }
}

/// Text of an element with each text node trimmed and glued together.
pub fn compact_text(element: ElementRef<'_>) -> String {
    joined_text(element, "")
}

/// Text of an element with trimmed text nodes separated by spaces.
pub fn spaced_text(element: ElementRef<'_>) -> String {
    joined_text(element, " ")
}

fn joined_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// All visible text of the document, one text node per line.
pub fn page_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        if has_ancestor(node.ancestors().filter_map(ElementRef::wrap), &NON_CONTENT_TAGS) {
            continue;
        }
        out.push_str(text);
        out.push('\n');
    }
    out
}

fn has_ancestor<'a>(mut ancestors: impl Iterator<Item = ElementRef<'a>>, tags: &[&str]) -> bool {
    ancestors.any(|el| tags.contains(&el.value().name()))
}

/// Pull attribute values out of a listing page.
pub fn extract_attributes(document: &Html, aliases: &AliasTable) -> Attributes {
    let mut attrs = structural_pass(document, aliases);
    let found = attrs.len();

    let text = page_text(document);
    for entry in &aliases.ordered {
        if attrs.contains_key(&entry.key) {
            continue;
        }
        let Some(caps) = entry.pattern.captures(&text) else {
            continue;
        };
        let value = caps[1].trim();
        if !value.is_empty() && value.chars().count() < MAX_TEXT_VALUE_LEN {
            trace!(key = ?entry.key, value, "Attribute recovered from page text");
            attrs.insert(entry.key, value.to_string());
        }
    }

    debug!(
        structural = found,
        textual = attrs.len() - found,
        "Extracted listing attributes"
    );
    attrs
}

fn structural_pass(document: &Html, aliases: &AliasTable) -> Attributes {
    let mut attrs = Attributes::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let Some(label) = label_of(text) else {
            continue;
        };
        let Some(key) = aliases.resolve(&label) else {
            continue;
        };
        if attrs.contains_key(&key) {
            continue;
        }
        let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if let Some(value) = value_near(parent, &label) {
            attrs.insert(key, value);
        }
    }

    attrs
}

/// "  No. of Bedrooms: " becomes "no. of bedrooms".
fn label_of(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let label = trimmed.strip_suffix(':')?.trim();
    if label.is_empty() {
        return None;
    }
    Some(label.to_lowercase())
}

fn value_near(label_element: ElementRef<'_>, label: &str) -> Option<String> {
    if let Some(sibling) = label_element.next_siblings().find_map(ElementRef::wrap) {
        let value = compact_text(sibling);
        if !value.is_empty() {
            return Some(value);
        }
    }

    // Label and value share one element: "Bedrooms:|4".
    let parts: Vec<&str> = label_element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    parts
        .iter()
        .position(|part| part.to_lowercase().contains(label))
        .and_then(|i| parts.get(i + 1))
        .map(|v| v.to_string())
}

/// Listing description: the known container if present, otherwise the
/// longest content block outside page chrome.
pub fn extract_description(document: &Html, selectors: &[Selector]) -> String {
    for selector in selectors {
        if let Some(el) = document.select(selector).next() {
            let text = spaced_text(el);
            if text.chars().count() > DESCRIPTION_SELECTED_MIN_CHARS {
                return truncate_chars(&text, DESCRIPTION_MAX_CHARS);
            }
        }
    }

    let blocks = Selector::parse("p, div").expect("block selector is valid");
    let mut best: Option<(usize, String)> = None;
    for el in document.select(&blocks) {
        if has_ancestor(el.ancestors().filter_map(ElementRef::wrap), &BOILERPLATE_REGIONS) {
            continue;
        }
        let text = spaced_text(el);
        let len = text.chars().count();
        if len <= DESCRIPTION_BLOCK_MIN_CHARS || len >= DESCRIPTION_BLOCK_MAX_CHARS {
            continue;
        }
        if best.as_ref().map_or(true, |(best_len, _)| len > *best_len) {
            best = Some((len, text));
        }
    }

    best.map(|(_, text)| truncate_chars(&text, DESCRIPTION_MAX_CHARS))
        .unwrap_or_default()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// First element matched by any selector, in order, with non-empty text.
pub fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document
            .select(selector)
            .map(compact_text)
            .find(|text| !text.is_empty())
    })
}

/// Absolute, query-free URLs of listing links on an index page.
pub fn extract_listing_links(document: &Html, page_url: &Url, pattern: &str) -> Vec<String> {
    let anchors = Selector::parse("a[href]").expect("anchor selector is valid");
    let mut links = IndexSet::new();

    for a in document.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if !href.contains(pattern) {
            continue;
        }
        let Ok(mut absolute) = page_url.join(href) else {
            continue;
        };
        absolute.set_query(None);
        absolute.set_fragment(None);
        links.insert(absolute.to_string());
    }

    links.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> AliasTable {
        AliasTable::bundled().unwrap()
    }

    #[test]
    fn bundled_table_maps_synonyms() {
        let table = aliases();
        assert_eq!(table.resolve("beds"), Some(AttributeKey::Bedrooms));
        assert_eq!(table.resolve("no. of bedrooms"), Some(AttributeKey::Bedrooms));
        assert_eq!(table.resolve("extent"), Some(AttributeKey::LandSizeRaw));
        assert_eq!(table.resolve("floors"), Some(AttributeKey::StoreysRaw));
        assert_eq!(table.resolve("price"), None);
    }

    #[test]
    fn structural_pass_reads_sibling_values() {
        let html = Html::parse_document(
            r#"<html><body>
            <div class="row"><div class="label">Bedrooms: </div><div class="value">4</div></div>
            <div class="row"><div class="label">Baths:</div><div class="value"> 3 </div></div>
            <div class="row"><div class="label">Land size:</div><div class="value">10.6 perches</div></div>
            <div class="row"><div class="label">House size:</div><div class="value">2,500.0 sqft</div></div>
            </body></html>"#,
        );
        let attrs = extract_attributes(&html, &aliases());

        assert_eq!(attrs[&AttributeKey::Bedrooms], "4");
        assert_eq!(attrs[&AttributeKey::Bathrooms], "3");
        assert_eq!(attrs[&AttributeKey::LandSizeRaw], "10.6 perches");
        assert_eq!(attrs[&AttributeKey::FloorAreaRaw], "2,500.0 sqft");
        assert!(!attrs.contains_key(&AttributeKey::Furnishing));
    }

    #[test]
    fn value_in_bare_text_node_is_recovered_by_text_pass() {
        // The value is not inside an element, so only the text pass sees it.
        let html = Html::parse_document("<div><span>Furnishing:</span> Semi furnished</div>");
        let attrs = extract_attributes(&html, &aliases());
        assert_eq!(attrs[&AttributeKey::Furnishing], "Semi furnished");
    }

    #[test]
    fn label_without_value_is_absent() {
        let html = Html::parse_document("<p><b>Storeys:</b></p>");
        let attrs = extract_attributes(&html, &aliases());
        assert!(!attrs.contains_key(&AttributeKey::StoreysRaw));
    }

    #[test]
    fn label_and_value_in_one_element() {
        let table = aliases();
        let html = Html::parse_document("<div><p>Beds:<i></i></p></div>");
        let p = html
            .select(&Selector::parse("p").unwrap())
            .next()
            .unwrap();
        assert_eq!(value_near(p, "beds"), None);

        let html = Html::parse_document("<div><p>Beds:<br>5</p></div>");
        let attrs = extract_attributes(&html, &table);
        assert_eq!(attrs[&AttributeKey::Bedrooms], "5");
    }

    #[test]
    fn text_pass_fills_fields_the_markup_missed() {
        let html = Html::parse_document(
            "<div><p>Spacious home. Bedrooms - 3, Bathrooms: 2</p>\
             <p>Land size: 15 perches</p></div>",
        );
        let attrs = extract_attributes(&html, &aliases());

        assert_eq!(attrs[&AttributeKey::Bedrooms], "3");
        assert_eq!(attrs[&AttributeKey::Bathrooms], "2");
        assert_eq!(attrs[&AttributeKey::LandSizeRaw], "15 perches");
    }

    #[test]
    fn text_pass_rejects_long_prose() {
        let html = Html::parse_document(
            "<p>Furnishing: the owner is happy to discuss including all of the existing furniture in the sale</p>",
        );
        let attrs = extract_attributes(&html, &aliases());
        assert!(!attrs.contains_key(&AttributeKey::Furnishing));
    }

    #[test]
    fn text_pass_ignores_scripts() {
        let html = Html::parse_document(
            "<script>var x = 'Bedrooms: 9';</script><p>No details</p>",
        );
        let attrs = extract_attributes(&html, &aliases());
        assert!(attrs.is_empty());
    }

    #[test]
    fn structural_value_beats_text_match() {
        let html = Html::parse_document(
            "<p>Bedrooms: 7 in the original plan</p>\
             <div><div>Bedrooms:</div><div>4</div></div>",
        );
        let attrs = extract_attributes(&html, &aliases());
        assert_eq!(attrs[&AttributeKey::Bedrooms], "4");
    }

    #[test]
    fn description_prefers_known_container() {
        let html = Html::parse_document(
            r#"<div class="description--2-ez3"><p>A lovely two storey house close to the main road.</p></div>
               <div><p>Some other much longer text that should not be chosen because the container exists.</p></div>"#,
        );
        let selectors = vec![Selector::parse("div.description--2-ez3").unwrap()];
        assert_eq!(
            extract_description(&html, &selectors),
            "A lovely two storey house close to the main road."
        );
    }

    #[test]
    fn description_falls_back_to_longest_block_outside_chrome() {
        let nav_text = "Home Houses Land Apartments Post an ad Login Register Help Contact us now";
        let body = "Beautiful land plot in a quiet residential area with clear deeds and water.";
        let html = Html::parse_document(&format!(
            "<nav><div>{nav_text} {nav_text}</div></nav><main><p>short</p><p>{body}</p></main>"
        ));
        assert_eq!(extract_description(&html, &[]), body);
    }

    #[test]
    fn description_is_truncated() {
        let long = "word ".repeat(300);
        let html = Html::parse_document(&format!(
            r#"<div class="description--x"><p>{long}</p></div>"#
        ));
        let selectors = vec![Selector::parse("[class*='description--']").unwrap()];
        assert_eq!(extract_description(&html, &selectors).chars().count(), 800);
    }

    #[test]
    fn listing_links_are_absolute_and_deduplicated() {
        let html = Html::parse_document(
            r#"<a href="/en/ad/house-for-sale-in-kandy-1?slot=2">a</a>
               <a href="/en/ad/house-for-sale-in-kandy-1">dup</a>
               <a href="https://ikman.lk/en/ad/land-galle-2#photos">b</a>
               <a href="/en/ads/sri-lanka/houses-for-sale?page=2">next</a>"#,
        );
        let page = Url::parse("https://ikman.lk/en/ads/sri-lanka/houses-for-sale?page=1").unwrap();
        let links = extract_listing_links(&html, &page, "/ad/");

        assert_eq!(
            links,
            vec![
                "https://ikman.lk/en/ad/house-for-sale-in-kandy-1".to_string(),
                "https://ikman.lk/en/ad/land-galle-2".to_string(),
            ]
        );
    }

    #[test]
    fn first_text_skips_empty_matches() {
        let html = Html::parse_document(
            r#"<span class="price-tag"></span><span class="price--3SnqI">Rs 45,000,000</span>"#,
        );
        let selectors = vec![
            Selector::parse("[class*='price-tag']").unwrap(),
            Selector::parse("span.price--3SnqI").unwrap(),
        ];
        assert_eq!(first_text(&html, &selectors).as_deref(), Some("Rs 45,000,000"));
    }
}
