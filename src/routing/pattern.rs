//! Path pattern compiler.
//!
//! # Syntax
//! - `:name` named segment, `[^/#?]+?` by default
//! - `:name(\d+)` named segment with a custom pattern
//! - `(\d+)` unnamed segment, keyed by position (`"0"`, `"1"`, ...)
//! - `?` optional, `*` zero or more, `+` one or more, after any segment
//! - `{/prefix:name.suffix}` groups a segment with literal text
//! - `*` on its own is an unnamed wildcard matching anything, `/` included
//! - `\` escapes the next character
//!
//! # Design Decisions
//! - Compiled patterns are cached process-wide, keyed by pattern and options
//! - The cache stops growing at its capacity; later patterns are compiled per call

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use regex::Regex;

use crate::error::{Error, Result};
use crate::observability::metrics;

/// Capacity of the process-wide compile cache.
pub const CACHE_CAPACITY: usize = 10_000;

const DELIMITERS: &str = "/#?";
const PREFIXES: &str = "./";
const DEFAULT_SEGMENT: &str = "[^/#?]+?";
const WILDCARD_SEGMENT: &str = ".*";

/// How a pattern is anchored and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchOptions {
    /// Match to the end of the path.
    pub end: bool,
    /// Do not allow an optional trailing delimiter.
    pub strict: bool,
    /// Case-sensitive comparison.
    pub sensitive: bool,
    /// Match from the start of the path.
    pub start: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            end: true,
            strict: false,
            sensitive: false,
            start: true,
        }
    }
}

/// A parameter slot in a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub prefix: String,
    pub suffix: String,
    pub pattern: String,
    pub modifier: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Open,
    Close,
    Name(String),
    Pattern(String),
    Modifier(char),
    Wildcard,
    Char(char),
    Escaped(char),
}

fn invalid(pattern: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lex(pattern: &str) -> Result<Vec<Lexeme>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' | '+' | '?' => {
                let follows_segment = matches!(
                    out.last(),
                    Some(Lexeme::Name(_) | Lexeme::Pattern(_) | Lexeme::Close | Lexeme::Wildcard)
                );
                if c == '*' && !follows_segment {
                    out.push(Lexeme::Wildcard);
                } else {
                    out.push(Lexeme::Modifier(c));
                }
                i += 1;
            }
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .copied()
                    .ok_or_else(|| invalid(pattern, "trailing escape"))?;
                out.push(Lexeme::Escaped(escaped));
                i += 2;
            }
            '{' => {
                out.push(Lexeme::Open);
                i += 1;
            }
            '}' => {
                out.push(Lexeme::Close);
                i += 1;
            }
            ':' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && is_name_char(chars[j]) {
                    j += 1;
                }
                if j == start {
                    return Err(invalid(pattern, format!("missing parameter name at {i}")));
                }
                out.push(Lexeme::Name(chars[start..j].iter().collect()));
                i = j;
            }
            '(' => {
                let mut depth = 1;
                let mut j = i + 1;
                let mut body = String::new();
                if chars.get(j) == Some(&'?') {
                    return Err(invalid(pattern, format!("pattern cannot start with \"?\" at {j}")));
                }
                while j < chars.len() {
                    let d = chars[j];
                    if d == '\\' {
                        body.push(d);
                        if let Some(&next) = chars.get(j + 1) {
                            body.push(next);
                        }
                        j += 2;
                        continue;
                    }
                    if d == ')' {
                        depth -= 1;
                        if depth == 0 {
                            j += 1;
                            break;
                        }
                    } else if d == '(' {
                        depth += 1;
                        if chars.get(j + 1) != Some(&'?') {
                            return Err(invalid(pattern, format!("capturing groups are not allowed at {j}")));
                        }
                    }
                    body.push(d);
                    j += 1;
                }
                if depth != 0 {
                    return Err(invalid(pattern, format!("unbalanced pattern at {i}")));
                }
                if body.is_empty() {
                    return Err(invalid(pattern, format!("missing pattern at {i}")));
                }
                out.push(Lexeme::Pattern(body));
                i = j;
            }
            _ => {
                out.push(Lexeme::Char(c));
                i += 1;
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Key(Key),
}

struct Parser<'a> {
    source: &'a str,
    lexemes: Vec<Lexeme>,
    pos: usize,
    next_index: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn take_char(&mut self) -> Option<char> {
        match self.peek() {
            Some(Lexeme::Char(c)) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn take_escaped(&mut self) -> Option<char> {
        match self.peek() {
            Some(Lexeme::Escaped(c)) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn take_name(&mut self) -> Option<String> {
        match self.peek() {
            Some(Lexeme::Name(n)) => {
                let n = n.clone();
                self.pos += 1;
                Some(n)
            }
            _ => None,
        }
    }

    fn take_pattern(&mut self) -> Option<String> {
        match self.peek() {
            Some(Lexeme::Pattern(p)) => {
                let p = p.clone();
                self.pos += 1;
                Some(p)
            }
            Some(Lexeme::Wildcard) => {
                self.pos += 1;
                Some(WILDCARD_SEGMENT.to_string())
            }
            _ => None,
        }
    }

    fn take_modifier(&mut self) -> Option<char> {
        match self.peek() {
            Some(Lexeme::Modifier(m)) => {
                let m = *m;
                self.pos += 1;
                Some(m)
            }
            _ => None,
        }
    }

    fn take_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.take_char().or_else(|| self.take_escaped()) {
            text.push(c);
        }
        text
    }

    fn unnamed(&mut self) -> String {
        let name = self.next_index.to_string();
        self.next_index += 1;
        name
    }

    fn parse(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut path = String::new();

        while self.pos < self.lexemes.len() {
            let before = self.pos;
            let ch = self.take_char();
            let name = self.take_name();
            let pattern = self.take_pattern();

            if name.is_some() || pattern.is_some() {
                let mut prefix = ch.map(String::from).unwrap_or_default();
                if !prefix.is_empty() && !PREFIXES.contains(prefix.as_str()) {
                    path.push_str(&prefix);
                    prefix.clear();
                }
                if !path.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut path)));
                }
                let name = match name {
                    Some(name) => name,
                    None => self.unnamed(),
                };
                tokens.push(Token::Key(Key {
                    name,
                    prefix,
                    suffix: String::new(),
                    pattern: pattern.unwrap_or_else(|| DEFAULT_SEGMENT.to_string()),
                    modifier: self.take_modifier(),
                }));
                continue;
            }

            if let Some(c) = ch.or_else(|| self.take_escaped()) {
                path.push(c);
                continue;
            }

            if !path.is_empty() {
                tokens.push(Token::Text(std::mem::take(&mut path)));
            }

            if matches!(self.peek(), Some(Lexeme::Open)) {
                self.pos += 1;
                let prefix = self.take_text();
                let name = self.take_name();
                let pattern = self.take_pattern();
                let suffix = self.take_text();
                if !matches!(self.peek(), Some(Lexeme::Close)) {
                    return Err(invalid(self.source, format!("expected \"}}\" at lexeme {}", self.pos)));
                }
                self.pos += 1;

                let (name, pattern) = match (name, pattern) {
                    (Some(name), Some(pattern)) => (name, pattern),
                    (Some(name), None) => (name, DEFAULT_SEGMENT.to_string()),
                    (None, Some(pattern)) => (self.unnamed(), pattern),
                    (None, None) => (String::new(), String::new()),
                };
                tokens.push(Token::Key(Key {
                    name,
                    prefix,
                    suffix,
                    pattern,
                    modifier: self.take_modifier(),
                }));
                continue;
            }

            if self.pos == before {
                return Err(invalid(
                    self.source,
                    format!("unexpected {:?} at lexeme {}", self.peek(), self.pos),
                ));
            }
        }
        if !path.is_empty() {
            tokens.push(Token::Text(path));
        }
        Ok(tokens)
    }
}

fn parse(pattern: &str) -> Result<Vec<Token>> {
    Parser {
        source: pattern,
        lexemes: lex(pattern)?,
        pos: 0,
        next_index: 0,
    }
    .parse()
}

/// A pattern compiled to a regular expression.
#[derive(Debug)]
pub struct CompiledPattern {
    regex: Regex,
    keys: Vec<Key>,
    /// Index of a trailing boundary group that is not part of the match.
    boundary: Option<usize>,
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// The part of the path the pattern covered.
    pub matched: String,
    /// Captured parameters. Optional segments that did not participate are absent.
    pub params: HashMap<String, String>,
}

impl CompiledPattern {
    pub fn new(pattern: &str, options: MatchOptions) -> Result<Self> {
        let tokens = parse(pattern)?;
        let delimiter = format!("[{}]", regex::escape(DELIMITERS));
        let mut route = String::new();
        let mut keys = Vec::new();

        if !options.sensitive {
            route.push_str("(?i)");
        }
        if options.start {
            route.push('^');
        }

        for token in &tokens {
            match token {
                Token::Text(text) => route.push_str(&regex::escape(text)),
                Token::Key(key) => {
                    let prefix = regex::escape(&key.prefix);
                    let suffix = regex::escape(&key.suffix);
                    let modifier = key.modifier.map(String::from).unwrap_or_default();
                    let repeats = matches!(key.modifier, Some('+' | '*'));

                    if key.pattern.is_empty() {
                        route.push_str(&format!("(?:{prefix}{suffix}){modifier}"));
                        continue;
                    }
                    keys.push(key.clone());
                    let p = &key.pattern;
                    if !prefix.is_empty() || !suffix.is_empty() {
                        if repeats {
                            let optional = if key.modifier == Some('*') { "?" } else { "" };
                            route.push_str(&format!(
                                "(?:{prefix}((?:{p})(?:{suffix}{prefix}(?:{p}))*){suffix}){optional}"
                            ));
                        } else {
                            route.push_str(&format!("(?:{prefix}({p}){suffix}){modifier}"));
                        }
                    } else if repeats {
                        route.push_str(&format!("((?:{p}){modifier})"));
                    } else {
                        route.push_str(&format!("({p}){modifier}"));
                    }
                }
            }
        }

        let mut boundary = None;
        if options.end {
            if !options.strict {
                route.push_str(&format!("{delimiter}?"));
            }
            route.push('$');
        } else {
            let end_delimited = match tokens.last() {
                Some(Token::Text(text)) => text.chars().last().is_some_and(|c| DELIMITERS.contains(c)),
                Some(Token::Key(_)) => false,
                None => true,
            };
            if !options.strict {
                route.push_str(&format!("(?:{delimiter}$)?"));
            }
            if !end_delimited {
                // Stands in for a lookahead: consumed, then cut from `matched`.
                route.push_str(&format!("({delimiter}|$)"));
                boundary = Some(keys.len() + 1);
            }
        }

        let regex = Regex::new(&route).map_err(|e| invalid(pattern, e.to_string()))?;
        Ok(Self {
            regex,
            keys,
            boundary,
        })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Matches `pathname` against the pattern.
    pub fn captures(&self, pathname: &str) -> Option<PatternMatch> {
        let caps = self.regex.captures(pathname)?;
        let whole = caps.get(0)?;
        let end = match self.boundary.and_then(|i| caps.get(i)) {
            Some(boundary) => boundary.start(),
            None => whole.end(),
        };

        let params = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                caps.get(i + 1)
                    .map(|value| (key.name.clone(), value.as_str().to_string()))
            })
            .collect();

        Some(PatternMatch {
            matched: pathname[whole.start()..end].to_string(),
            params,
        })
    }
}

/// Compile cache that stops inserting once `capacity` patterns are stored.
pub struct PatternCache {
    entries: DashMap<(String, MatchOptions), Arc<CompiledPattern>>,
    count: AtomicUsize,
    capacity: usize,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            count: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compiled form of `pattern`, from the cache when possible.
    pub fn compile(&self, pattern: &str, options: MatchOptions) -> Result<Arc<CompiledPattern>> {
        let key = (pattern.to_string(), options);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        let compiled = Arc::new(CompiledPattern::new(pattern, options)?);

        let reserved = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            tracing::trace!(pattern, "Pattern cache full, compiled without caching");
            return Ok(compiled);
        }

        match self.entries.entry(key) {
            // Another request compiled the same pattern first.
            Entry::Occupied(existing) => {
                self.count.fetch_sub(1, Ordering::AcqRel);
                Ok(Arc::clone(existing.get()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&compiled));
                Ok(compiled)
            }
        }
    }
}

static CACHE: LazyLock<PatternCache> = LazyLock::new(|| PatternCache::new(CACHE_CAPACITY));

/// Compiles `pattern` through the process-wide cache.
pub fn compile(pattern: &str, options: MatchOptions) -> Result<Arc<CompiledPattern>> {
    let compiled = CACHE.compile(pattern, options)?;
    metrics::record_pattern_cache_size(CACHE.len());
    Ok(compiled)
}

/// Matches `pathname` against `pattern`.
pub fn match_pattern(pathname: &str, pattern: &str, options: MatchOptions) -> Result<Option<PatternMatch>> {
    Ok(compile(pattern, options)?.captures(pathname))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> Option<PatternMatch> {
        match_pattern(path, pattern, MatchOptions::default()).unwrap()
    }

    fn param(m: &PatternMatch, name: &str) -> Option<String> {
        m.params.get(name).cloned()
    }

    #[test]
    fn test_named_params() {
        let m = matches("/users/:id/posts/:post", "/users/42/posts/7").unwrap();
        assert_eq!(m.matched, "/users/42/posts/7");
        assert_eq!(param(&m, "id").as_deref(), Some("42"));
        assert_eq!(param(&m, "post").as_deref(), Some("7"));
        assert!(matches("/users/:id", "/users/42/extra").is_none());
    }

    #[test]
    fn test_trailing_slash_and_case() {
        assert!(matches("/about", "/about/").is_some());
        assert!(matches("/about", "/ABOUT").is_some());

        let strict = MatchOptions {
            strict: true,
            sensitive: true,
            ..Default::default()
        };
        assert!(match_pattern("/about/", "/about", strict).unwrap().is_none());
        assert!(match_pattern("/ABOUT", "/about", strict).unwrap().is_none());
    }

    #[test]
    fn test_custom_and_unnamed_patterns() {
        assert!(matches("/items/:id(\\d+)", "/items/abc").is_none());
        let m = matches("/items/:id(\\d+)", "/items/123").unwrap();
        assert_eq!(param(&m, "id").as_deref(), Some("123"));

        let m = matches("/files/(.*)", "/files/a/b.txt").unwrap();
        assert_eq!(param(&m, "0").as_deref(), Some("a/b.txt"));
    }

    #[test]
    fn test_modifiers() {
        let optional = "/users/:id?";
        assert!(matches(optional, "/users").is_some());
        let m = matches(optional, "/users/5").unwrap();
        assert_eq!(param(&m, "id").as_deref(), Some("5"));
        assert!(!matches(optional, "/users").unwrap().params.contains_key("id"));

        let m = matches("/path/:rest+", "/path/a/b/c").unwrap();
        assert_eq!(param(&m, "rest").as_deref(), Some("a/b/c"));
        assert!(matches("/path/:rest+", "/path").is_none());
        assert!(matches("/path/:rest*", "/path").is_some());
    }

    #[test]
    fn test_bare_wildcard() {
        let m = matches("/*", "/css/site.css").unwrap();
        assert_eq!(param(&m, "0").as_deref(), Some("css/site.css"));
        assert!(matches("/*", "/").is_some());
        assert!(matches("/static/*", "/static/app.js").is_some());
        assert!(matches("/static/*", "/other/app.js").is_none());
    }

    #[test]
    fn test_groups_and_escapes() {
        let m = matches("/file{.:ext}?", "/file.json").unwrap();
        assert_eq!(param(&m, "ext").as_deref(), Some("json"));
        assert!(matches("/file{.:ext}?", "/file").is_some());
        assert!(matches("/a\\:b", "/a:b").is_some());
    }

    #[test]
    fn test_prefix_match_without_end() {
        let options = MatchOptions {
            end: false,
            ..Default::default()
        };
        let m = match_pattern("/users/123/posts", "/users/:id", options)
            .unwrap()
            .unwrap();
        assert_eq!(m.matched, "/users/123");
        assert_eq!(param(&m, "id").as_deref(), Some("123"));

        assert!(match_pattern("/usersx", "/users", options).unwrap().is_none());
        let m = match_pattern("/users/", "/users", options).unwrap().unwrap();
        assert_eq!(m.matched, "/users/");
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["/:", "/(", "/(a(b))", "/{:id", "/(?x)"] {
            let err = CompiledPattern::new(bad, MatchOptions::default()).unwrap_err();
            assert!(matches!(err, Error::InvalidPattern { .. }), "{bad}");
        }
    }

    #[test]
    fn test_cache_stops_at_capacity() {
        let cache = PatternCache::new(2);
        let options = MatchOptions::default();
        let a = cache.compile("/a", options).unwrap();
        let again = cache.compile("/a", options).unwrap();
        assert!(Arc::ptr_eq(&a, &again));

        cache.compile("/b", options).unwrap();
        assert_eq!(cache.len(), 2);

        let c1 = cache.compile("/c", options).unwrap();
        let c2 = cache.compile("/c", options).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!Arc::ptr_eq(&c1, &c2));
        assert!(c2.captures("/c").is_some());
    }

    #[test]
    fn test_options_are_part_of_the_key() {
        let cache = PatternCache::new(10);
        let strict = MatchOptions {
            strict: true,
            ..Default::default()
        };
        cache.compile("/a", MatchOptions::default()).unwrap();
        cache.compile("/a", strict).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
