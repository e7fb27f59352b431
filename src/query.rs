//! Thin adapter over `scraper`: the only place the engine touches the DOM.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::SelectorError;

/// A parsed HTML document, optionally remembering where it came from.
pub struct Document {
    html: Html,
    url: Option<Url>,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
            url: None,
        }
    }

    /// Parse markup fetched from `url`; the url becomes the base for
    /// relative links when the mapping has none of its own.
    pub fn parse_with_url(markup: &str, url: Url) -> Self {
        Self {
            html: Html::parse_document(markup),
            url: Some(url),
        }
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn root(&self) -> Node<'_> {
        Node(self.html.root_element())
    }
}

/// A borrowed element of a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a>(ElementRef<'a>);

impl<'a> Node<'a> {
    pub fn tag(&self) -> &'a str {
        self.0.value().name()
    }

    pub fn select(&self, selector: &str) -> Result<Vec<Node<'a>>, SelectorError> {
        select(*self, selector)
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.tag())
    }
}

pub fn parse_selector(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Descendants of `scope` matching `selector`, in document order. The whole
/// selector is evaluated inside the scope: neither the scope element nor its
/// ancestors can satisfy any compound of it.
pub fn select<'a>(scope: Node<'a>, selector: &str) -> Result<Vec<Node<'a>>, SelectorError> {
    parse_selector(selector)?;
    let parsed = Selector::parse(&anchored(selector)).map_err(|e| SelectorError {
        selector: selector.to_string(),
        message: e.to_string(),
    })?;
    Ok(scope.0.select(&parsed).map(Node).collect())
}

/// Prefix every top-level alternative of a selector list with `:scope `.
fn anchored(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len() + 8);
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                push_anchored(&mut out, &selector[start..i]);
                out.push_str(", ");
                start = i + 1;
            }
            _ => {}
        }
    }
    push_anchored(&mut out, &selector[start..]);
    out
}

fn push_anchored(out: &mut String, alternative: &str) {
    out.push_str(":scope ");
    out.push_str(alternative.trim());
}

/// Visible text with runs of whitespace collapsed to one space and trimmed.
pub fn text_of(node: Node<'_>) -> String {
    let mut out = String::new();
    for word in node.0.text().flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// All descendant text nodes concatenated untouched, e.g. a script body.
pub fn raw_text_of(node: Node<'_>) -> String {
    node.0.text().collect()
}

pub fn inner_html_of(node: Node<'_>) -> String {
    node.0.inner_html()
}

pub fn attr_of(node: Node<'_>, name: &str) -> Option<String> {
    node.0.value().attr(name).map(str::to_string)
}
