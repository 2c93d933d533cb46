//! Selector-driven strategies: recorded XPath and CSS
//!
//! Both implement the selector dialects the recorder actually emits, not the
//! full specs: compound CSS with descendant/child combinators, and the
//! attribute / text / absolute-indexed XPath forms. Anything outside those
//! dialects is an unexpected failure reported through the result's `error`
//! field.

use super::LocateStrategy;
use crate::errors::LocatorError;
use crate::scoring;
use crate::types::{MatchKind, MatchMetadata, ResolutionResult, StrategyDescriptor};
use replay_core_types::{LocatorBundle, NodeId, PageModel};
use tracing::debug;

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// XPath
// ---------------------------------------------------------------------------

/// The XPath forms the recorder emits.
#[derive(Debug, Clone, PartialEq)]
enum XPathForm {
    /// `//tag[@key='value']` or `//*[@key='value']`
    AnywhereAttr {
        tag: Option<String>,
        key: String,
        value: String,
    },
    /// `//tag[text()='value']`
    AnywhereText { tag: String, value: String },
    /// `//tag`
    Anywhere { tag: String },
    /// `/html/body/div[2]/form/input[1]` - 1-based same-tag sibling indices
    Absolute(Vec<(String, Option<usize>)>),
}

fn parse_xpath(input: &str) -> Result<XPathForm, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty xpath".to_string());
    }

    if let Some(rest) = input.strip_prefix("//") {
        return parse_anywhere(rest);
    }
    if input.starts_with('/') {
        return parse_absolute(input);
    }
    Err(format!("unsupported xpath: {}", input))
}

fn parse_anywhere(rest: &str) -> Result<XPathForm, String> {
    let (tag, predicate) = match rest.find('[') {
        Some(open) => {
            let close = rest
                .rfind(']')
                .ok_or_else(|| format!("unclosed predicate in //{}", rest))?;
            if close != rest.len() - 1 || close <= open {
                return Err(format!("malformed predicate in //{}", rest));
            }
            (&rest[..open], Some(&rest[open + 1..close]))
        }
        None => (rest, None),
    };

    if tag.is_empty() {
        return Err("missing tag in xpath step".to_string());
    }

    let Some(predicate) = predicate else {
        if tag == "*" {
            return Err("bare //* is not a usable xpath".to_string());
        }
        return Ok(XPathForm::Anywhere {
            tag: tag.to_ascii_lowercase(),
        });
    };

    if let Some(attr) = predicate.strip_prefix('@') {
        let (key, value) = parse_equality(attr)?;
        let tag = (tag != "*").then(|| tag.to_ascii_lowercase());
        return Ok(XPathForm::AnywhereAttr { tag, key, value });
    }
    if let Some(text) = predicate.strip_prefix("text()=") {
        if tag == "*" {
            return Err("text() predicate requires a tag".to_string());
        }
        return Ok(XPathForm::AnywhereText {
            tag: tag.to_ascii_lowercase(),
            value: unquote(text)?,
        });
    }
    Err(format!("unsupported predicate: [{}]", predicate))
}

fn parse_absolute(input: &str) -> Result<XPathForm, String> {
    let mut steps = Vec::new();
    for raw in input.trim_start_matches('/').split('/') {
        if raw.is_empty() {
            return Err(format!("empty step in xpath: {}", input));
        }
        let (tag, index) = match raw.find('[') {
            Some(open) => {
                let close = raw
                    .strip_suffix(']')
                    .map(|_| raw.len() - 1)
                    .ok_or_else(|| format!("unclosed index in step: {}", raw))?;
                let index: usize = raw[open + 1..close]
                    .parse()
                    .map_err(|_| format!("non-numeric index in step: {}", raw))?;
                if index == 0 {
                    return Err("xpath indices are 1-based".to_string());
                }
                (&raw[..open], Some(index))
            }
            None => (raw, None),
        };
        if tag.is_empty() || tag == "*" {
            return Err(format!("unsupported step in absolute xpath: {}", raw));
        }
        steps.push((tag.to_ascii_lowercase(), index));
    }
    Ok(XPathForm::Absolute(steps))
}

fn parse_equality(input: &str) -> Result<(String, String), String> {
    let eq = input
        .find('=')
        .ok_or_else(|| format!("missing '=' in predicate: @{}", input))?;
    let key = input[..eq].trim();
    if key.is_empty() {
        return Err("missing attribute name in predicate".to_string());
    }
    Ok((key.to_string(), unquote(&input[eq + 1..])?))
}

fn unquote(input: &str) -> Result<String, String> {
    let input = input.trim();
    let inner = input
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| input.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .ok_or_else(|| format!("unquoted literal: {}", input))?;
    Ok(inner.to_string())
}

fn evaluate_xpath(form: &XPathForm, page: &PageModel) -> Vec<NodeId> {
    match form {
        XPathForm::AnywhereAttr { tag, key, value } => page
            .find_by_attr(key, value)
            .into_iter()
            .filter(|id| tag.as_deref().is_none_or(|t| page.node(*id).tag == t))
            .collect(),
        XPathForm::AnywhereText { tag, value } => page.find_where(|n| {
            n.tag == *tag && n.text.as_deref().map(str::trim) == Some(value.trim())
        }),
        XPathForm::Anywhere { tag } => page.find_by_tag(tag),
        XPathForm::Absolute(steps) => evaluate_absolute(steps, page),
    }
}

fn evaluate_absolute(steps: &[(String, Option<usize>)], page: &PageModel) -> Vec<NodeId> {
    let Some(((first_tag, first_index), rest)) = steps.split_first() else {
        return Vec::new();
    };
    let root = PageModel::ROOT;
    if page.node(root).tag != *first_tag || first_index.is_some_and(|i| i != 1) {
        return Vec::new();
    }

    let mut current = root;
    for (tag, index) in rest {
        let want = index.unwrap_or(1);
        let mut seen = 0;
        let mut next = None;
        for child in page.children_of(current) {
            if page.node(*child).tag == *tag {
                seen += 1;
                if seen == want {
                    next = Some(*child);
                    break;
                }
            }
        }
        match next {
            Some(id) => current = id,
            None => return Vec::new(),
        }
    }
    vec![current]
}

/// Recorded-XPath strategy: the highest-priority anchor.
pub struct XPathStrategy;

impl LocateStrategy for XPathStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("xpath", 10, 0.95)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.xpath)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let descriptor = self.descriptor();
        let Some(xpath) = bundle.xpath.as_deref() else {
            return ResolutionResult::not_found(descriptor.name);
        };
        let form = match parse_xpath(xpath) {
            Ok(form) => form,
            Err(reason) => {
                let error = LocatorError::InvalidSelector {
                    strategy: descriptor.name.to_string(),
                    reason,
                };
                debug!(xpath, %error, "xpath parse failed");
                return ResolutionResult::failed(descriptor.name, error.to_string());
            }
        };
        let candidates = evaluate_xpath(&form, page);
        match scoring::rank(bundle, page, &candidates) {
            Some(ranked) => ResolutionResult::found(
                descriptor.name,
                ranked.node,
                scoring::exact_confidence(&descriptor, &ranked),
                MatchMetadata {
                    kind: MatchKind::Exact,
                    candidate_count: ranked.candidate_count,
                },
            ),
            None => ResolutionResult::not_found(descriptor.name),
        }
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        if let Some(id) = page.node(node).id_attr() {
            return Some(format!("//*[@id='{}']", id));
        }
        // Absolute path with same-tag sibling indices, root to node.
        let mut segments = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let tag = &page.node(id).tag;
            let segment = if page.parent_of(id).is_some() {
                format!("{}[{}]", tag, page.sibling_index(id))
            } else {
                tag.clone()
            };
            segments.push(segment);
            current = page.parent_of(id);
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }
}

// ---------------------------------------------------------------------------
// CSS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    /// `[key]` (value None) or `[key=value]`
    attrs: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq)]
struct CssSelector {
    /// Left to right; combinator binds a part to the one before it.
    parts: Vec<(Compound, Option<Combinator>)>,
}

fn parse_css(input: &str) -> Result<CssSelector, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty css selector".to_string());
    }

    let mut parts = Vec::new();
    let mut pending: Option<Combinator> = None;
    for token in tokenize_css(input)? {
        match token.as_str() {
            ">" => {
                if parts.is_empty() || pending.is_some() {
                    return Err(format!("dangling '>' in selector: {}", input));
                }
                pending = Some(Combinator::Child);
            }
            _ => {
                let combinator = if parts.is_empty() {
                    None
                } else {
                    Some(pending.take().unwrap_or(Combinator::Descendant))
                };
                parts.push((parse_compound(&token)?, combinator));
            }
        }
    }
    if pending.is_some() {
        return Err(format!("trailing combinator in selector: {}", input));
    }
    if parts.is_empty() {
        return Err("empty css selector".to_string());
    }
    Ok(CssSelector { parts })
}

/// Split on whitespace, keeping `>` as its own token and leaving bracketed
/// attribute expressions intact.
fn tokenize_css(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    for ch in input.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced ']' in selector: {}", input))?;
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            '>' if depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(">".to_string());
            }
            c => current.push(c),
        }
    }
    if depth != 0 {
        return Err(format!("unclosed '[' in selector: {}", input));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_compound(token: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let mut chars = token.chars().peekable();
    let mut head = String::new();
    while let Some(&c) = chars.peek() {
        if c == '#' || c == '.' || c == '[' {
            break;
        }
        head.push(c);
        chars.next();
    }
    if !head.is_empty() && head != "*" {
        compound.tag = Some(head.to_ascii_lowercase());
    }

    let rest: String = chars.collect();
    let mut rest = rest.as_str();
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('#') {
            let end = tail
                .find(['#', '.', '['])
                .unwrap_or(tail.len());
            if end == 0 {
                return Err(format!("empty id in selector part: {}", token));
            }
            compound.id = Some(tail[..end].to_string());
            rest = &tail[end..];
        } else if let Some(tail) = rest.strip_prefix('.') {
            let end = tail
                .find(['#', '.', '['])
                .unwrap_or(tail.len());
            if end == 0 {
                return Err(format!("empty class in selector part: {}", token));
            }
            compound.classes.push(tail[..end].to_string());
            rest = &tail[end..];
        } else if let Some(tail) = rest.strip_prefix('[') {
            let close = tail
                .find(']')
                .ok_or_else(|| format!("unclosed '[' in selector part: {}", token))?;
            let body = &tail[..close];
            match body.find('=') {
                Some(eq) => {
                    let key = body[..eq].trim().to_string();
                    if key.is_empty() {
                        return Err(format!("empty attribute name in: [{}]", body));
                    }
                    let value = body[eq + 1..].trim().trim_matches(['"', '\'']).to_string();
                    compound.attrs.push((key, Some(value)));
                }
                None => {
                    let key = body.trim();
                    if key.is_empty() {
                        return Err(format!("empty attribute selector in: {}", token));
                    }
                    compound.attrs.push((key.to_string(), None));
                }
            }
            rest = &tail[close + 1..];
        } else {
            return Err(format!("unsupported selector syntax: {}", token));
        }
    }

    if compound.tag.is_none()
        && compound.id.is_none()
        && compound.classes.is_empty()
        && compound.attrs.is_empty()
    {
        return Err(format!("empty selector part: {}", token));
    }
    Ok(compound)
}

fn matches_compound(page: &PageModel, id: NodeId, compound: &Compound) -> bool {
    let node = page.node(id);
    if let Some(tag) = &compound.tag {
        if node.tag != *tag {
            return false;
        }
    }
    if let Some(want) = &compound.id {
        if node.id_attr() != Some(want.as_str()) {
            return false;
        }
    }
    if !compound.classes.iter().all(|c| node.has_class(c)) {
        return false;
    }
    compound.attrs.iter().all(|(key, value)| match value {
        Some(v) => node.attr(key) == Some(v.as_str()),
        None => node.attr(key).is_some(),
    })
}

fn css_select(page: &PageModel, selector: &CssSelector) -> Vec<NodeId> {
    let Some(((last, _), _)) = selector.parts.split_last().map(|(l, r)| (l.clone(), r)) else {
        return Vec::new();
    };
    page.ids()
        .filter(|id| matches_compound(page, *id, &last))
        .filter(|id| ancestry_matches(page, *id, &selector.parts))
        .collect()
}

/// Walk the selector parts right to left, climbing the tree. A descendant
/// combinator tries every matching ancestor, not just the nearest one, so
/// `a > b c` still matches when the nearest `b` ancestor has no `a` parent
/// but a farther one does.
fn ancestry_matches(page: &PageModel, id: NodeId, parts: &[(Compound, Option<Combinator>)]) -> bool {
    climb(page, id, parts, parts.len() - 1)
}

fn climb(
    page: &PageModel,
    current: NodeId,
    parts: &[(Compound, Option<Combinator>)],
    part_index: usize,
) -> bool {
    if part_index == 0 {
        return true;
    }
    let combinator = parts[part_index].1;
    let (needed, _) = &parts[part_index - 1];
    match combinator {
        Some(Combinator::Child) => match page.parent_of(current) {
            Some(parent) if matches_compound(page, parent, needed) => {
                climb(page, parent, parts, part_index - 1)
            }
            _ => false,
        },
        Some(Combinator::Descendant) => {
            let mut ancestor = page.parent_of(current);
            while let Some(a) = ancestor {
                if matches_compound(page, a, needed) && climb(page, a, parts, part_index - 1) {
                    return true;
                }
                ancestor = page.parent_of(a);
            }
            false
        }
        None => false,
    }
}

/// Recorded-CSS strategy.
pub struct CssStrategy;

impl LocateStrategy for CssStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("css", 50, 0.80)
    }

    fn can_handle(&self, bundle: &LocatorBundle) -> bool {
        non_empty(&bundle.css)
    }

    fn find(&self, bundle: &LocatorBundle, page: &PageModel) -> ResolutionResult {
        let descriptor = self.descriptor();
        let Some(css) = bundle.css.as_deref() else {
            return ResolutionResult::not_found(descriptor.name);
        };
        let selector = match parse_css(css) {
            Ok(selector) => selector,
            Err(reason) => {
                let error = LocatorError::InvalidSelector {
                    strategy: descriptor.name.to_string(),
                    reason,
                };
                debug!(css, %error, "css parse failed");
                return ResolutionResult::failed(descriptor.name, error.to_string());
            }
        };
        let candidates = css_select(page, &selector);
        match scoring::rank(bundle, page, &candidates) {
            Some(ranked) => ResolutionResult::found(
                descriptor.name,
                ranked.node,
                scoring::exact_confidence(&descriptor, &ranked),
                MatchMetadata {
                    kind: MatchKind::Exact,
                    candidate_count: ranked.candidate_count,
                },
            ),
            None => ResolutionResult::not_found(descriptor.name),
        }
    }

    fn generate_selector(&self, page: &PageModel, node: NodeId) -> Option<String> {
        let element = page.node(node);
        if let Some(id) = element.id_attr() {
            return Some(format!("#{}", id));
        }
        if element.classes.is_empty() {
            return Some(element.tag.clone());
        }
        Some(format!("{}.{}", element.tag, element.classes.join(".")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core_types::ElementNode;

    fn nested_page() -> PageModel {
        let mut page = PageModel::new("https://example.com");
        let body = page.append_root(ElementNode::new("body"));
        let div1 = page.append(body, ElementNode::new("div").with_class("panel"));
        page.append(
            div1,
            ElementNode::new("input").with_id("username").with_name("username"),
        );
        let div2 = page.append(body, ElementNode::new("div").with_class("panel"));
        page.append(
            div2,
            ElementNode::new("button")
                .with_class("primary")
                .with_text("Save"),
        );
        page
    }

    #[test]
    fn xpath_id_shorthand() {
        let page = nested_page();
        let bundle = LocatorBundle::new().with_xpath("//*[@id='username']");
        let result = XPathStrategy.find(&bundle, &page);
        assert!(result.is_found());
        assert!((result.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn xpath_attribute_with_tag() {
        let page = nested_page();
        let bundle = LocatorBundle::new().with_xpath("//input[@name='username']");
        assert!(XPathStrategy.find(&bundle, &page).is_found());
        let wrong_tag = LocatorBundle::new().with_xpath("//div[@name='username']");
        assert!(!XPathStrategy.find(&wrong_tag, &page).is_found());
    }

    #[test]
    fn xpath_text_predicate() {
        let page = nested_page();
        let bundle = LocatorBundle::new().with_xpath("//button[text()='Save']");
        assert!(XPathStrategy.find(&bundle, &page).is_found());
    }

    #[test]
    fn xpath_absolute_with_indices() {
        let page = nested_page();
        let bundle = LocatorBundle::new().with_xpath("/html/body/div[2]/button[1]");
        let result = XPathStrategy.find(&bundle, &page);
        let button = page.find_by_tag("button")[0];
        assert_eq!(result.element, Some(button));
    }

    #[test]
    fn xpath_miss_is_clean_but_malformed_is_an_error() {
        let page = nested_page();
        let miss = LocatorBundle::new().with_xpath("//*[@id='missing']");
        let result = XPathStrategy.find(&miss, &page);
        assert!(!result.is_found());
        assert!(result.error.is_none());

        let malformed = LocatorBundle::new().with_xpath("//*[@id='unclosed'");
        let result = XPathStrategy.find(&malformed, &page);
        assert!(!result.is_found());
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid selector for 'xpath'"));
    }

    #[test]
    fn xpath_generation_round_trips() {
        let page = nested_page();
        let button = page.find_by_tag("button")[0];
        let xpath = XPathStrategy.generate_selector(&page, button).unwrap();
        assert_eq!(xpath, "/html/body[1]/div[2]/button[1]");
        let bundle = LocatorBundle::new().with_xpath(xpath);
        assert_eq!(XPathStrategy.find(&bundle, &page).element, Some(button));
    }

    #[test]
    fn css_compound_and_combinators() {
        let page = nested_page();
        let found = |css: &str| {
            CssStrategy
                .find(&LocatorBundle::new().with_css(css), &page)
                .is_found()
        };
        assert!(found("#username"));
        assert!(found("div.panel > button.primary"));
        assert!(found("body button"));
        assert!(found("input[name=\"username\"]"));
        assert!(found("input[name]"));
        assert!(!found("div.panel > input.missing"));
        assert!(!found("span button"));
    }

    #[test]
    fn css_descendant_backtracks_past_the_nearest_candidate() {
        // The span's nearest div ancestor is not a child of the section, but
        // the outer div is; the match has to consider both.
        let mut page = PageModel::new("https://example.com");
        let section = page.append_root(ElementNode::new("section"));
        let outer = page.append(section, ElementNode::new("div"));
        let inner = page.append(outer, ElementNode::new("div"));
        page.append(inner, ElementNode::new("span").with_text("deep"));

        let bundle = LocatorBundle::new().with_css("section > div span");
        let result = CssStrategy.find(&bundle, &page);
        assert!(result.is_found());
    }

    #[test]
    fn css_malformed_reports_error() {
        let page = nested_page();
        let result = CssStrategy.find(&LocatorBundle::new().with_css("div[role"), &page);
        assert!(!result.is_found());
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid selector for 'css'"));
    }

    #[test]
    fn css_ambiguous_match_penalized() {
        let page = nested_page();
        let result = CssStrategy.find(&LocatorBundle::new().with_css("div.panel"), &page);
        assert!(result.is_found());
        assert!(result.confidence < 0.80);
        assert_eq!(result.metadata.unwrap().candidate_count, 2);
    }

    #[test]
    fn css_generation_prefers_id() {
        let page = nested_page();
        let input = page.find_by_tag("input")[0];
        assert_eq!(
            CssStrategy.generate_selector(&page, input).as_deref(),
            Some("#username")
        );
        let button = page.find_by_tag("button")[0];
        assert_eq!(
            CssStrategy.generate_selector(&page, button).as_deref(),
            Some("button.primary")
        );
    }
}
