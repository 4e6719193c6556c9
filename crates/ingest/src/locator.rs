use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::ops::Deref;

use crate::dates::looks_like_date;
use crate::sources::SourceSpec;
use crate::text::clean_text;

pub const DEFAULT_MAX_CANDIDATES: usize = 20;

const GENERIC_CONTAINERS: &str = "div, li, tr, article, .card, .item";
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];
pub(crate) const TITLE_ELEMENTS: &str = "h1, h2, h3, h4, h5, h6, .title, .event-title";

#[derive(Debug, Clone)]
pub struct RawCandidate<'a> {
    pub element: ElementRef<'a>,
    pub lines: Vec<String>,
    pub text: String,
}

impl<'a> RawCandidate<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        let lines = visible_lines(element);
        let text = lines.join("\n");
        Self {
            element,
            lines,
            text,
        }
    }
}

pub struct CandidateLocator {
    rules: Vec<(&'static str, Selector)>,
    generic: Selector,
    title: Selector,
    keywords: Option<Regex>,
    max_candidates: usize,
}

impl CandidateLocator {
    pub fn for_source(source: &SourceSpec, max_candidates: usize) -> Result<Self> {
        let rules = source
            .selectors
            .iter()
            .map(|css| parse_selector(css).map(|selector| (*css, selector)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            generic: parse_selector(GENERIC_CONTAINERS)?,
            title: parse_selector(TITLE_ELEMENTS)?,
            keywords: keyword_regex(source.keywords)?,
            max_candidates,
        })
    }

    pub fn locate<'a>(&self, document: &'a Html) -> Vec<RawCandidate<'a>> {
        for (css, selector) in &self.rules {
            let matched: Vec<ElementRef<'a>> = document.select(selector).collect();
            if !matched.is_empty() {
                tracing::debug!(selector = *css, matched = matched.len(), "structural rule matched");
                return self.cap(self.regions(matched));
            }
        }

        let matched: Vec<ElementRef<'a>> = document
            .select(&self.generic)
            .filter(|el| self.is_event_like(*el))
            .collect();
        tracing::debug!(matched = matched.len(), "generic scan");
        self.cap(self.regions(matched))
    }

    fn is_event_like(&self, element: ElementRef<'_>) -> bool {
        let text = visible_lines(element).join("\n");
        if text.is_empty() {
            return false;
        }
        looks_like_date(&text) || self.keywords.as_ref().is_some_and(|re| re.is_match(&text))
    }

    fn regions<'a>(&self, matched: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
        let index: HashMap<_, usize> = matched
            .iter()
            .enumerate()
            .map(|(i, el)| (el.deref().id(), i))
            .collect();

        let mut roots = Vec::new();
        let mut children = vec![Vec::new(); matched.len()];
        for (i, el) in matched.iter().enumerate() {
            match el.ancestors().find_map(|a| index.get(&a.id())) {
                Some(&parent) => children[parent].push(i),
                None => roots.push(i),
            }
        }

        let tree = MatchTree {
            dated: matched
                .iter()
                .map(|el| looks_like_date(&visible_lines(*el).join("\n")))
                .collect(),
            elements: matched,
            children,
            title: &self.title,
        };
        roots.into_iter().flat_map(|i| tree.resolve(i)).collect()
    }

    fn cap<'a>(&self, elements: Vec<ElementRef<'a>>) -> Vec<RawCandidate<'a>> {
        elements
            .into_iter()
            .take(self.max_candidates)
            .map(RawCandidate::new)
            .collect()
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e:?}"))
}

fn keyword_regex(keywords: &[&str]) -> Result<Option<Regex>> {
    if keywords.is_empty() {
        return Ok(None);
    }
    let alternatives = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let re = Regex::new(&format!(r"(?i)\b(?:{alternatives})"))?;
    Ok(Some(re))
}

struct MatchTree<'a, 's> {
    elements: Vec<ElementRef<'a>>,
    children: Vec<Vec<usize>>,
    dated: Vec<bool>,
    title: &'s Selector,
}

impl<'a> MatchTree<'a, '_> {
    /// A match is split into its nested matches only when they are events in
    /// their own right: two or more dated ones, or a single dated one that
    /// carries its own title. Otherwise the nested matches are fragments
    /// (a date cell, a title cell) and the outer element is the event.
    fn resolve(&self, i: usize) -> Vec<ElementRef<'a>> {
        let children = &self.children[i];
        let dated: Vec<usize> = children.iter().copied().filter(|&c| self.dated[c]).collect();
        let split = match dated.as_slice() {
            [] => children.len() >= 2 && !self.dated[i],
            [only] => self.stands_alone(*only),
            _ => true,
        };
        if split {
            children.iter().flat_map(|&c| self.resolve(c)).collect()
        } else {
            vec![self.elements[i]]
        }
    }

    fn stands_alone(&self, i: usize) -> bool {
        self.elements[i].select(self.title).next().is_some() || self.dated_descendants(i) >= 2
    }

    fn dated_descendants(&self, i: usize) -> usize {
        self.children[i]
            .iter()
            .map(|&c| usize::from(self.dated[c]) + self.dated_descendants(c))
            .sum()
    }
}

fn visible_lines(element: ElementRef<'_>) -> Vec<String> {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| HIDDEN_TAGS.contains(&e.name())))
                .unwrap_or(false);
            if hidden {
                return None;
            }
            let line = clean_text(text);
            (!line.is_empty()).then_some(line)
        })
        .collect()
}
