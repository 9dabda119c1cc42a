//! Pagination discovery and traversal limits
//!
//! The walker finds the "next page" reference in a document and refuses to
//! hand out a URL once the page ceiling is reached or the URL has been seen
//! before in this session.

use super::extractor::{collapse_whitespace, resolve_link};
use super::fetcher::Document;
use crate::url::canonical_key;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Built-in next-link patterns, most explicit first
const NEXT_PATTERNS: &[&str] = &[
    "link[rel~='next'][href]",
    "a[rel~='next'][href]",
    ".pagination a.next[href]",
    ".pagination .next a[href]",
    "a.next[href]",
    "li.next a[href]",
    ".next a[href]",
    "a[aria-label='Next'][href]",
    "a[aria-label='Next page'][href]",
];

/// Walks a paginated result set
#[derive(Debug, Clone)]
pub struct PaginationWalker {
    max_pages: u32,
    next_selector: Option<String>,
    visited: HashSet<String>,
}

impl PaginationWalker {
    /// Creates a walker
    ///
    /// # Arguments
    ///
    /// * `max_pages` - Page ceiling for the session
    /// * `next_selector` - Custom next-link selector; replaces the built-in patterns
    pub fn new(max_pages: u32, next_selector: Option<String>) -> Self {
        Self {
            max_pages,
            next_selector,
            visited: HashSet::new(),
        }
    }

    /// Records a fetched page so it is never handed out again
    pub fn mark_visited(&mut self, url: &Url) {
        self.visited.insert(canonical_key(url));
    }

    pub fn has_visited(&self, url: &Url) -> bool {
        self.visited.contains(&canonical_key(url))
    }

    /// Finds the URL of the page after `document`
    ///
    /// # Arguments
    ///
    /// * `document` - The page just extracted
    /// * `current_index` - Zero-based index of that page in this session
    ///
    /// # Returns
    ///
    /// * `Some(Url)` - The next page to fetch
    /// * `None` - Ceiling reached, no next link, a self-link, or a revisit
    pub fn next_page(&mut self, document: &Document, current_index: u32) -> Option<Url> {
        let html = Html::parse_document(&document.html);
        self.next_from_html(&html, &document.url, current_index)
    }

    /// Same as [`next_page`](Self::next_page) for an already parsed document
    pub fn next_from_html(
        &mut self,
        html: &Html,
        page_url: &Url,
        current_index: u32,
    ) -> Option<Url> {
        if current_index + 1 >= self.max_pages {
            tracing::debug!("Page ceiling of {} reached", self.max_pages);
            return None;
        }

        let next = match &self.next_selector {
            Some(custom) => find_with_selectors(html, page_url, &[custom.as_str()]),
            None => find_with_selectors(html, page_url, NEXT_PATTERNS)
                .or_else(|| find_by_text(html, page_url)),
        }?;

        let key = canonical_key(&next);
        if key == canonical_key(page_url) {
            tracing::debug!("Next link of {} points to itself", page_url);
            return None;
        }
        if !self.visited.insert(key) {
            tracing::warn!("Pagination cycle detected at {}, stopping", next);
            return None;
        }

        Some(next)
    }
}

fn link_of(el: ElementRef, base_url: &Url) -> Option<Url> {
    el.value()
        .attr("href")
        .and_then(|href| resolve_link(href, base_url))
}

fn find_with_selectors(html: &Html, base_url: &Url, patterns: &[&str]) -> Option<Url> {
    patterns.iter().find_map(|pattern| {
        let selector = Selector::parse(pattern).ok()?;
        html.select(&selector).find_map(|el| link_of(el, base_url))
    })
}

/// Falls back to anchors whose text reads like "next"
fn find_by_text(html: &Html, base_url: &Url) -> Option<Url> {
    let selector = Selector::parse("a[href]").ok()?;
    html.select(&selector)
        .filter(|el| is_next_text(&collapse_whitespace(&el.text().collect::<String>())))
        .find_map(|el| link_of(el, base_url))
}

fn is_next_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    let stripped =
        lower.trim_matches(|c: char| c.is_whitespace() || matches!(c, '›' | '»' | '>' | '→'));
    match stripped {
        "next" | "next page" => true,
        "" => !lower.trim().is_empty(),
        _ => false,
    }
}
