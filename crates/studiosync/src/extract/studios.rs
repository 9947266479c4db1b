//! Reading the studio selector on the entry page.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use super::patterns::{PatternSet, Role};
use super::resolver::{element_text, resolve};

static PAREN_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[(（]\s*([A-Za-z0-9_-]+)\s*[)）]").unwrap());

/// One selectable studio, with its position among the pattern's matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioOption {
    pub code: String,
    pub name: String,
    pub region: Option<String>,
    pub index: usize,
}

/// Studio options on the page and the pattern that found them. Options
/// whose code cannot be read are left out.
pub fn studio_options(html: &str, patterns: &PatternSet) -> Option<(Vec<StudioOption>, String)> {
    let document = Html::parse_document(html);
    let resolved = resolve(
        document.root_element(),
        Role::StudioOption,
        patterns.get(Role::StudioOption),
    )?;
    let options = resolved
        .matches
        .iter()
        .enumerate()
        .filter_map(|(index, el)| {
            let code = studio_code(*el)?;
            Some(StudioOption {
                name: studio_name(*el, &code),
                region: studio_region(*el),
                code,
                index,
            })
        })
        .collect();
    Some((options, resolved.pattern.to_string()))
}

/// Reads the studio code, trying each place the site has put it.
pub fn studio_code(el: ElementRef<'_>) -> Option<String> {
    let strategies: [fn(ElementRef<'_>) -> Option<String>; 5] = [
        |el| attr(el, "data-studio-code"),
        |el| attr(el, "data-code"),
        |el| attr(el, "value"),
        |el| el.value().attr("href").and_then(href_studio_param),
        |el| {
            PAREN_CODE
                .captures(&element_text(el))
                .map(|caps| caps[1].to_string())
        },
    ];
    strategies.iter().find_map(|strategy| strategy(el))
}

fn attr(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn href_studio_param(href: &str) -> Option<String> {
    let base = Url::parse("https://localhost/").ok()?;
    let url = base.join(href).ok()?;
    url.query_pairs()
        .find(|(k, v)| k == "studio" && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

fn studio_name(el: ElementRef<'_>, code: &str) -> String {
    if let Some(name) = attr(el, "data-studio-name") {
        return name;
    }
    let text = element_text(el);
    let stripped = PAREN_CODE.replace_all(&text, "");
    let name = stripped.trim();
    if name.is_empty() {
        code.to_string()
    } else {
        name.to_string()
    }
}

fn studio_region(el: ElementRef<'_>) -> Option<String> {
    attr(el, "data-region").or_else(|| {
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .find_map(|a| attr(a, "data-region"))
    })
}
