// src/services/sections.rs

//! HTML section scoping.
//!
//! Criteria pages carry a lot of navigation and boilerplate; a target can
//! restrict extraction to the part of the page that holds the criteria.

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::Section;
use crate::services::extract::element_lines;
use crate::utils::normalize_whitespace;

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::selector(css, e))
}

/// Lines of the configured section, or `None` when it is not on the page.
pub fn select_lines(document: &Html, section: &Section) -> Result<Option<Vec<String>>> {
    match section {
        Section::OrderedList { style_contains } => ordered_list_by_style(document, style_contains),
        Section::Accordion { title } => accordion_item(document, title),
        Section::BetweenHeadings { start_id, end_id } => {
            between_headings(document, start_id, end_id.as_deref())
        }
        Section::ListAfterHeading { tag, text_contains } => {
            list_after_heading(document, tag, text_contains)
        }
    }
}

/// Text of each `<li>` under a list, one line per item.
fn list_items(list: ElementRef<'_>) -> Result<Vec<String>> {
    let li = selector("li")?;
    Ok(list
        .select(&li)
        .map(|item| normalize_whitespace(&item.text().collect::<String>()))
        .collect())
}

fn ordered_list_by_style(document: &Html, style_contains: &str) -> Result<Option<Vec<String>>> {
    let ol = selector("ol[style]")?;
    document
        .select(&ol)
        .find(|list| {
            list.value()
                .attr("style")
                .is_some_and(|style| style.contains(style_contains))
        })
        .map(list_items)
        .transpose()
}

fn accordion_item(document: &Html, title: &str) -> Result<Option<Vec<String>>> {
    let items = selector("li.block-accordion-item")?;
    let header = selector("h4.accordion-header")?;
    let content = selector("div.accordion-content")?;
    let wanted = normalize_whitespace(title);

    let item = document.select(&items).find(|item| {
        item.select(&header)
            .next()
            .map(|h| normalize_whitespace(&h.text().collect::<String>()))
            .is_some_and(|text| text == wanted)
    });

    Ok(item.map(|item| {
        let body = item.select(&content).next().unwrap_or(item);
        element_lines(body)
    }))
}

fn between_headings(
    document: &Html,
    start_id: &str,
    end_id: Option<&str>,
) -> Result<Option<Vec<String>>> {
    let h2 = selector("h2")?;
    let Some(start) = document
        .select(&h2)
        .find(|h| h.value().id() == Some(start_id))
    else {
        return Ok(None);
    };

    let mut lines = Vec::new();
    for sibling in start.next_siblings().filter_map(ElementRef::wrap) {
        if sibling.value().name() == "h2" {
            match end_id {
                None => break,
                Some(end) if sibling.value().id() == Some(end) => break,
                Some(_) => {}
            }
        }
        lines.extend(element_lines(sibling));
    }
    Ok(Some(lines))
}

fn list_after_heading(document: &Html, tag: &str, text_contains: &str) -> Result<Option<Vec<String>>> {
    let heading_sel = selector(tag)?;
    let ol = selector("ol")?;

    let Some(heading) = document.select(&heading_sel).find(|h| {
        let text = normalize_whitespace(&h.text().collect::<String>());
        !text.is_empty() && text.contains(text_contains)
    }) else {
        return Ok(None);
    };

    for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
        if sibling.value().name() == "ol" {
            return list_items(sibling).map(Some);
        }
        if let Some(nested) = sibling.select(&ol).next() {
            return list_items(nested).map(Some);
        }
    }
    Ok(None)
}
