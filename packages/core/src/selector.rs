//! A CSS selector subset, evaluated as a pure predicate over any [`Dom`].
//!
//! This is the matcher behind [`crate::MemoryDom`]. Hosts backed by a real browser compile and match
//! selectors with the browser's own engine instead.
//!
//! Supported: selector lists, type/universal selectors, `#id`, `.class`, attribute selectors with every
//! CSS2/3 operator, and the descendant and child combinators. Everything else is rejected at parse time
//! so that a registration with an unsupported selector fails instead of silently never matching.

use std::fmt;
use std::str::FromStr;

use crate::error::SelectorError;
use crate::host::Dom;

/// A parsed selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<Part>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Part {
    compound: Compound,
    /// How this part relates to the one before it. `None` only for the first part of a chain.
    combinator: Option<Combinator>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    op: AttrOp,
    value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let groups = Parser::new(source).parse_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            groups,
        })
    }

    /// The selector text this was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `node` itself matches.
    pub fn matches<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node) -> bool {
        self.groups
            .iter()
            .any(|chain| matches_chain(dom, node, chain, chain.len() - 1))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn matches_chain<D: Dom + ?Sized>(dom: &D, node: &D::Node, chain: &[Part], idx: usize) -> bool {
    let part = &chain[idx];
    if !part.compound.matches(dom, node) {
        return false;
    }
    let Some(combinator) = part.combinator else {
        return true;
    };

    match combinator {
        Combinator::Child => dom
            .parent(node)
            .is_some_and(|parent| matches_chain(dom, &parent, chain, idx - 1)),
        Combinator::Descendant => {
            let mut cursor = dom.parent(node);
            while let Some(ancestor) = cursor {
                if matches_chain(dom, &ancestor, chain, idx - 1) {
                    return true;
                }
                cursor = dom.parent(&ancestor);
            }
            false
        }
    }
}

impl Compound {
    fn matches<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node) -> bool {
        let Some(name) = dom.local_name(node) else {
            return false;
        };

        if let Some(tag) = &self.tag {
            if !name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class_attr = dom.attribute(node, "class").unwrap_or_default();
            let has_all = self.classes.iter().all(|wanted| {
                class_attr
                    .split_ascii_whitespace()
                    .any(|class| class == wanted)
            });
            if !has_all {
                return false;
            }
        }

        self.attrs.iter().all(|cond| {
            dom.attribute(node, &cond.name)
                .is_some_and(|actual| cond.op.test(&actual, &cond.value))
        })
    }
}

impl AttrOp {
    fn test(self, actual: &str, expected: &str) -> bool {
        match self {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => {
                !expected.is_empty() && actual.split_ascii_whitespace().any(|w| w == expected)
            }
            AttrOp::DashMatch => {
                actual == expected
                    || actual
                        .strip_prefix(expected)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn parse_list(mut self) -> Result<Vec<Vec<Part>>, SelectorError> {
        let mut groups = Vec::new();
        loop {
            groups.push(self.parse_chain()?);
            match self.peek() {
                Some(',') => self.pos += 1,
                None => return Ok(groups),
                Some(found) => return Err(self.unexpected(found)),
            }
        }
    }

    fn parse_chain(&mut self) -> Result<Vec<Part>, SelectorError> {
        let mut parts: Vec<Part> = Vec::new();
        let mut pending = None;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    if parts.is_empty() || pending.is_some() {
                        return Err(SelectorError::DanglingCombinator(self.source.to_string()));
                    }
                    pending = Some(Combinator::Child);
                    self.pos += 1;
                }
                Some(c @ ('+' | '~')) => {
                    return Err(self.unsupported(format!("{c} combinator")));
                }
                Some(_) => {
                    let compound = self.parse_compound()?;
                    let combinator = match parts.is_empty() {
                        true => None,
                        false => Some(pending.take().unwrap_or(Combinator::Descendant)),
                    };
                    parts.push(Part {
                        compound,
                        combinator,
                    });
                }
            }
        }

        if pending.is_some() {
            return Err(SelectorError::DanglingCombinator(self.source.to_string()));
        }
        if parts.is_empty() {
            return Err(SelectorError::Empty(self.source.to_string()));
        }
        Ok(parts)
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut components = 0;

        while let Some(c) = self.peek() {
            match c {
                '*' if components == 0 => {
                    self.pos += 1;
                }
                c if components == 0 && is_name_start(c) => {
                    compound.tag = Some(self.expect_name()?.to_ascii_lowercase());
                }
                '#' => {
                    self.pos += 1;
                    let id = self.expect_name()?;
                    compound.attrs.push(AttrCondition {
                        name: "id".to_string(),
                        op: AttrOp::Equals,
                        value: id,
                    });
                }
                '.' => {
                    self.pos += 1;
                    compound.classes.push(self.expect_name()?);
                }
                '[' => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attribute()?);
                }
                ':' => {
                    let start = self.offset();
                    self.pos += 1;
                    while self.peek().is_some_and(|c| c == ':' || is_name_char(c)) {
                        self.pos += 1;
                    }
                    let pseudo = self.source[start..self.offset()].to_string();
                    return Err(self.unsupported(pseudo));
                }
                c if c.is_whitespace() || matches!(c, ',' | '>' | '+' | '~') => break,
                found => return Err(self.unexpected(found)),
            }
            components += 1;
        }

        Ok(compound)
    }

    fn parse_attribute(&mut self) -> Result<AttrCondition, SelectorError> {
        self.skip_whitespace();
        let name = self.expect_name()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.peek() {
            None => return Err(SelectorError::UnclosedAttribute(self.source.to_string())),
            Some(']') => {
                self.pos += 1;
                return Ok(AttrCondition {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                self.pos += 1;
                match self.peek() {
                    Some('=') => self.pos += 1,
                    Some(found) => return Err(self.unexpected(found)),
                    None => return Err(SelectorError::UnclosedAttribute(self.source.to_string())),
                }
                match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Substring,
                }
            }
            Some(found) => return Err(self.unexpected(found)),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.offset();
                loop {
                    match self.peek() {
                        Some(c) if c == quote => break,
                        Some(_) => self.pos += 1,
                        None => {
                            return Err(SelectorError::UnclosedAttribute(self.source.to_string()))
                        }
                    }
                }
                let value = self.source[start..self.offset()].to_string();
                self.pos += 1;
                value
            }
            None => return Err(SelectorError::UnclosedAttribute(self.source.to_string())),
            Some(_) => self.expect_name()?,
        };

        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(AttrCondition { name, op, value })
            }
            Some(found) => Err(self.unexpected(found)),
            None => Err(SelectorError::UnclosedAttribute(self.source.to_string())),
        }
    }

    fn expect_name(&mut self) -> Result<String, SelectorError> {
        let start = self.offset();
        match self.peek() {
            Some(c) if is_name_start(c) => self.pos += 1,
            Some(found) => return Err(self.unexpected(found)),
            None => {
                return Err(SelectorError::ExpectedName {
                    selector: self.source.to_string(),
                    offset: start,
                })
            }
        }
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        Ok(self.source[start..self.offset()].to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.source.len(), |(offset, _)| *offset)
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::UnexpectedChar {
            selector: self.source.to_string(),
            found,
            offset: self.offset(),
        }
    }

    fn unsupported(&self, syntax: String) -> SelectorError {
        SelectorError::Unsupported {
            selector: self.source.to_string(),
            syntax,
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDom;

    fn parse_err(source: &str) -> SelectorError {
        Selector::parse(source).expect_err(source)
    }

    #[test]
    fn rejects_malformed_selectors() {
        assert!(matches!(parse_err(""), SelectorError::Empty(_)));
        assert!(matches!(parse_err("   "), SelectorError::Empty(_)));
        assert!(matches!(parse_err("a,,b"), SelectorError::Empty(_)));
        assert!(matches!(parse_err("> a"), SelectorError::DanglingCombinator(_)));
        assert!(matches!(parse_err("a >"), SelectorError::DanglingCombinator(_)));
        assert!(matches!(parse_err("a > > b"), SelectorError::DanglingCombinator(_)));
        assert!(matches!(parse_err("[data-x"), SelectorError::UnclosedAttribute(_)));
        assert!(matches!(parse_err("[data-x='1]"), SelectorError::UnclosedAttribute(_)));
        assert!(matches!(parse_err("#"), SelectorError::ExpectedName { .. }));
        assert!(matches!(parse_err("#1abc"), SelectorError::UnexpectedChar { found: '1', .. }));
        assert!(matches!(parse_err("div!"), SelectorError::UnexpectedChar { found: '!', .. }));
        assert!(matches!(parse_err("a:hover"), SelectorError::Unsupported { .. }));
        assert!(matches!(parse_err("a + b"), SelectorError::Unsupported { .. }));
        assert!(matches!(parse_err("a ~ b"), SelectorError::Unsupported { .. }));
    }

    #[test]
    fn accepts_supported_syntax() {
        for source in [
            "#x",
            "div",
            "*",
            "DIV.a.b",
            "div#main > .item span",
            "[data-testid]",
            "[data-testid=\"ad slot\"]",
            "a[href^='https'], a[href$=\".pdf\"]",
            "[lang|=en][class~=x][title*=foo]",
            "ytd-comments#comments",
        ] {
            assert!(Selector::parse(source).is_ok(), "{source}");
        }
    }

    #[test]
    fn matches_compounds_and_attributes() {
        let dom = MemoryDom::new();
        let el = dom.create_element("DIV");
        dom.set_attribute(el, "id", "main");
        dom.set_attribute(el, "class", "card  promoted");
        dom.set_attribute(el, "lang", "en-US");
        dom.set_attribute(el, "href", "https://example.com/a.pdf");

        let yes = [
            "div",
            "*",
            "#main",
            "div#main.card.promoted",
            "[lang|=en]",
            "[class~=card]",
            "[href^=https]",
            "[href$='.pdf']",
            "[href*=example]",
            "span, .promoted",
        ];
        let no = [
            "span",
            "#other",
            ".card.missing",
            "[lang|=e]",
            "[class~=car]",
            "[href^='']",
            "[title]",
        ];
        for source in yes {
            assert!(Selector::parse(source).unwrap().matches(&dom, &el), "{source}");
        }
        for source in no {
            assert!(!Selector::parse(source).unwrap().matches(&dom, &el), "{source}");
        }
    }

    #[test]
    fn combinators_walk_ancestors() {
        let dom = MemoryDom::new();
        let outer = dom.create_element("section");
        let middle = dom.create_element("div");
        let inner = dom.create_element("span");
        dom.set_attribute(outer, "class", "feed");
        dom.append_child(outer, middle);
        dom.append_child(middle, inner);

        let check = |source: &str| Selector::parse(source).unwrap().matches(&dom, &inner);
        assert!(check(".feed span"));
        assert!(check(".feed div > span"));
        assert!(check("section > div > span"));
        assert!(!check(".feed > span"));
        assert!(!check("span div"));
    }

    #[test]
    fn find_match_prefers_self_then_document_order() {
        let dom = MemoryDom::new();
        let wrapper = dom.create_element("div");
        let first = dom.create_element("p");
        let nested = dom.create_element("p");
        let second = dom.create_element("p");
        dom.append_child(wrapper, first);
        dom.append_child(first, nested);
        dom.append_child(wrapper, second);

        let p = dom.compile_selector("p").unwrap();
        assert_eq!(dom.find_match(&wrapper, &p), Some(first));
        assert_eq!(dom.find_match(&second, &p), Some(second));

        let text = dom.create_text("p");
        assert_eq!(dom.find_match(&text, &p), None);
    }

    #[test]
    fn find_match_does_not_enter_shadow_trees() {
        let dom = MemoryDom::new();
        let host = dom.create_element("div");
        let shadow = dom.attach_shadow(host);
        let hidden = dom.create_element("span");
        dom.append_child(shadow, hidden);

        let span = dom.compile_selector("span").unwrap();
        assert_eq!(dom.find_match(&host, &span), None);
        assert_eq!(dom.find_match(&shadow, &span), Some(hidden));
    }
}
