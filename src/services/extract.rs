// src/services/extract.rs

//! Text extraction.
//!
//! Turns downloaded bytes into the line sequence stored in a snapshot.
//! HTML is flattened with block-level line breaks; PDFs are extracted page
//! by page on a best-effort basis.

use scraper::{ElementRef, Html, Node};

use crate::error::{AppError, Result};
use crate::models::{ContentKind, Target};
use crate::services::sections;
use crate::utils::normalize_whitespace;

/// Elements that start and end a line.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "caption", "dd", "details", "div", "dl",
    "dt", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody", "td",
    "tfoot", "th", "thead", "tr", "ul",
];

/// Elements whose content is never text.
const SKIP_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe",
];

/// Extract lines from raw bytes of a declared kind.
pub fn extract(bytes: &[u8], kind: ContentKind) -> Result<Vec<String>> {
    match kind {
        ContentKind::Html => Ok(extract_html(&String::from_utf8_lossy(bytes))),
        ContentKind::Pdf => extract_pdf(bytes),
    }
}

/// Extract lines for a target, applying its HTML section scope if any.
pub fn extract_target(bytes: &[u8], target: &Target) -> Result<Vec<String>> {
    match (&target.section, target.kind) {
        (Some(section), ContentKind::Html) => {
            let document = Html::parse_document(&String::from_utf8_lossy(bytes));
            sections::select_lines(&document, section)?.ok_or_else(|| {
                AppError::SectionNotFound {
                    target: target.name.clone(),
                    section: section.to_string(),
                }
            })
        }
        _ => extract(bytes, target.kind),
    }
}

/// Strip tags, drop scripts and styles, and collapse whitespace, keeping
/// one line per block-level element. Entities are decoded by the parser.
pub fn extract_html(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    element_lines(document.root_element())
}

/// Lines of text under a single element.
pub(crate) fn element_lines(element: ElementRef<'_>) -> Vec<String> {
    let mut collector = LineCollector::default();
    walk(element, &mut collector);
    collector.finish()
}

#[derive(Default)]
struct LineCollector {
    lines: Vec<String>,
    current: String,
}

impl LineCollector {
    fn push_text(&mut self, text: &str) {
        self.current.push_str(text);
    }

    fn break_line(&mut self) {
        let line = normalize_whitespace(&self.current);
        if !line.is_empty() {
            self.lines.push(line);
        }
        self.current.clear();
    }

    fn finish(mut self) -> Vec<String> {
        self.break_line();
        self.lines
    }
}

fn walk(element: ElementRef<'_>, out: &mut LineCollector) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_text(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }

                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.break_line();
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    walk(child_element, out);
                }
                if block {
                    out.break_line();
                }
            }
            _ => {}
        }
    }
}

/// Extract PDF text page by page, joining pages with a newline.
///
/// A page that fails to parse contributes an empty string.
#[cfg(feature = "pdf")]
pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>> {
    let document = lopdf::Document::load_mem(bytes).map_err(AppError::extraction)?;

    let pages: Vec<String> = document
        .get_pages()
        .keys()
        .map(|&number| {
            document.extract_text(&[number]).unwrap_or_else(|e| {
                log::warn!("PDF page {} could not be parsed: {}", number, e);
                String::new()
            })
        })
        .collect();

    log::debug!("Extracted text from {} PDF pages", pages.len());

    Ok(join_pages(&pages))
}

/// Join page texts with a single newline and split into lines.
///
/// lopdf ends each page with its own newline, which is dropped first so
/// pages are not separated by a blank line.
#[cfg(feature = "pdf")]
fn join_pages(pages: &[String]) -> Vec<String> {
    pages
        .iter()
        .map(|page| page.trim_end_matches(['\r', '\n']))
        .collect::<Vec<_>>()
        .join("\n")
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// PDF support is compiled out; this is a configuration error.
#[cfg(not(feature = "pdf"))]
pub fn extract_pdf(_bytes: &[u8]) -> Result<Vec<String>> {
    Err(AppError::UnsupportedFormat(
        "no PDF backend available (build with the `pdf` feature)".into(),
    ))
}
