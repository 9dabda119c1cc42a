//! Record extraction from HTML documents
//!
//! Each extraction rule is applied independently. Records come out in rule
//! declaration order, and within a rule in document order.
//!
//! # Rule Forms
//!
//! - **Selector**: one record per matching element with `text` and `element`,
//!   plus `id`, `class` and `href` when the element carries them
//! - **Fields**: one record per matching element; each field is a sub-selector
//!   (`css`), an attribute (`css@attr` or `@attr`), or the element's own text (`""`)
//! - **Table**: one record per data row of each matching table, keyed by the
//!   cleaned header names
//! - **List**: one `item` record per non-empty `li` of each matching list

use super::fetcher::Document;
use crate::config::ExtractRule;
use crate::table::Record;
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

/// Attributes that hold links and are resolved to absolute URLs
const LINK_ATTRIBUTES: &[&str] = &["href", "src"];

/// Extracts records from a document
///
/// # Arguments
///
/// * `document` - The fetched or rendered document
/// * `rules` - Extraction rules, applied in order
///
/// # Returns
///
/// All records found; an empty vector is a valid result
///
/// # Example
///
/// ```
/// use pagesift::config::ExtractRule;
/// use pagesift::crawler::{extract, Document};
/// use url::Url;
///
/// let html = r#"<ul><li class="item">One</li><li class="item">Two</li></ul>"#;
/// let doc = Document::new(Url::parse("https://example.com/").unwrap(), html);
/// let records = extract(&doc, &[ExtractRule::Selector(".item".to_string())]);
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[1]["text"], Some("Two".to_string()));
/// ```
pub fn extract(document: &Document, rules: &[ExtractRule]) -> Vec<Record> {
    let html = Html::parse_document(&document.html);
    extract_from_html(&html, &document.url, rules)
}

/// Extracts records from an already parsed document
pub fn extract_from_html(html: &Html, base_url: &Url, rules: &[ExtractRule]) -> Vec<Record> {
    let mut records = Vec::new();

    for rule in rules {
        let selector = match Selector::parse(rule.selector()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping rule with invalid selector '{}': {:?}", rule.selector(), e);
                continue;
            }
        };

        let before = records.len();
        match rule {
            ExtractRule::Selector(_) => {
                records.extend(html.select(&selector).map(|el| element_record(el, base_url)));
            }
            ExtractRule::Fields { fields, .. } => {
                let specs = parse_field_specs(fields);
                records.extend(
                    html.select(&selector)
                        .map(|el| fielded_record(el, &specs, base_url)),
                );
            }
            ExtractRule::Table { .. } => {
                for el in html.select(&selector) {
                    for table in tables_in(el) {
                        records.extend(table_records(table));
                    }
                }
            }
            ExtractRule::List { .. } => {
                for el in html.select(&selector) {
                    for list in lists_in(el) {
                        records.extend(list_records(list));
                    }
                }
            }
        }

        tracing::trace!(
            "Rule '{}' produced {} records",
            rule.selector(),
            records.len() - before
        );
    }

    records
}

/// Collapses runs of whitespace to single spaces and trims the ends
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}

/// Reads an attribute, resolving link attributes against the document URL
fn attribute(el: ElementRef, name: &str, base_url: &Url) -> Option<String> {
    let raw = el.value().attr(name)?;
    if LINK_ATTRIBUTES.contains(&name) {
        Some(
            resolve_link(raw, base_url)
                .map(|u| u.to_string())
                .unwrap_or_else(|| raw.to_string()),
        )
    } else {
        Some(raw.to_string())
    }
}

fn element_record(el: ElementRef, base_url: &Url) -> Record {
    let mut record = Record::new();
    record.insert("text".to_string(), Some(element_text(el)));
    record.insert("element".to_string(), Some(el.value().name().to_string()));
    for name in ["id", "class", "href"] {
        if let Some(value) = attribute(el, name, base_url) {
            record.insert(name.to_string(), Some(value));
        }
    }
    record
}

/// A parsed field spec: optional sub-selector and optional attribute
struct FieldSpec {
    name: String,
    selector: Option<Selector>,
    attribute: Option<String>,
    /// A sub-selector was given but does not parse; the field is always absent
    broken: bool,
}

fn parse_field_specs(fields: &IndexMap<String, String>) -> Vec<FieldSpec> {
    fields
        .iter()
        .map(|(name, spec)| {
            let (css, attr) = match spec.split_once('@') {
                Some((css, attr)) => (css.trim(), Some(attr.trim().to_string())),
                None => (spec.trim(), None),
            };
            let (selector, broken) = if css.is_empty() {
                (None, false)
            } else {
                match Selector::parse(css) {
                    Ok(s) => (Some(s), false),
                    Err(_) => (None, true),
                }
            };
            FieldSpec {
                name: name.clone(),
                selector,
                attribute: attr.filter(|a| !a.is_empty()),
                broken,
            }
        })
        .collect()
}

fn fielded_record(el: ElementRef, specs: &[FieldSpec], base_url: &Url) -> Record {
    specs
        .iter()
        .map(|spec| {
            let target = if spec.broken {
                None
            } else {
                match &spec.selector {
                    Some(selector) => el.select(selector).next(),
                    None => Some(el),
                }
            };
            let value = target.and_then(|t| match &spec.attribute {
                Some(attr) => attribute(t, attr, base_url),
                None => Some(element_text(t)),
            });
            (spec.name.clone(), value)
        })
        .collect()
}

/// The matched element itself if it is a table, otherwise the tables inside it
fn tables_in(el: ElementRef) -> Vec<ElementRef> {
    if el.value().name() == "table" {
        return vec![el];
    }
    match Selector::parse("table") {
        Ok(selector) => el.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// The matched element itself if it is a list, otherwise the outermost lists inside it
fn lists_in(el: ElementRef) -> Vec<ElementRef> {
    if matches!(el.value().name(), "ul" | "ol") {
        return vec![el];
    }
    let Ok(selector) = Selector::parse("ul, ol") else {
        return Vec::new();
    };
    el.select(&selector)
        .filter(|list| {
            !list
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|a| *a != el)
                .any(|a| matches!(a.value().name(), "ul" | "ol"))
        })
        .collect()
}

/// Every `li` of a list, nested entries included, as `item` records
fn list_records(list: ElementRef) -> Vec<Record> {
    let Ok(item_selector) = Selector::parse("li") else {
        return Vec::new();
    };

    list.select(&item_selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .map(|text| {
            let mut record = Record::new();
            record.insert("item".to_string(), Some(text));
            record
        })
        .collect()
}

fn cells_of(row: ElementRef) -> Vec<ElementRef> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

/// Reads an HTML table the way a spreadsheet import would
///
/// The header is the first row made only of `<th>` cells; without one,
/// columns are named `column_1`, `column_2`, ... Empty cells are absent.
/// Rows with more cells than the header get extra generated column names.
fn table_records(table: ElementRef) -> Vec<Record> {
    let Ok(row_selector) = Selector::parse("tr") else {
        return Vec::new();
    };

    let rows: Vec<Vec<ElementRef>> = table
        .select(&row_selector)
        .map(cells_of)
        .filter(|cells| !cells.is_empty())
        .collect();

    let header_index = rows
        .iter()
        .position(|cells| cells.iter().all(|c| c.value().name() == "th"));

    let mut headers: Vec<String> = header_index
        .map(|i| {
            clean_column_names(
                &rows[i]
                    .iter()
                    .map(|c| element_text(*c))
                    .collect::<Vec<_>>(),
            )
        })
        .unwrap_or_default();

    let mut records = Vec::new();
    for (i, cells) in rows.iter().enumerate() {
        if Some(i) == header_index {
            continue;
        }
        // Header-style rows below the header (e.g. repeated headers) carry no data
        if cells.iter().all(|c| c.value().name() == "th") {
            continue;
        }

        while headers.len() < cells.len() {
            let generated = format!("column_{}", headers.len() + 1);
            headers.push(generated);
        }

        let mut record = Record::new();
        for (j, name) in headers.iter().enumerate() {
            let value = cells
                .get(j)
                .map(|c| element_text(*c))
                .filter(|text| !text.is_empty());
            record.insert(name.clone(), value);
        }
        records.push(record);
    }

    records
}

/// Cleans header names into identifiers
///
/// Lower-cases, strips punctuation, joins words with `_`; an empty result
/// becomes `unnamed_column`. Repeated names get `_2`, `_3`, ... suffixes.
pub fn clean_column_names(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(raw.len());

    for name in raw {
        let cleaned: String = name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
            .collect();
        let mut cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
        if cleaned.is_empty() {
            cleaned = "unnamed_column".to_string();
        }

        let count = seen.entry(cleaned.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            cleaned = format!("{}_{}", cleaned, count);
        }
        names.push(cleaned);
    }

    names
}
