//! Restricted parser and resolver for the DEPS dependency manifest.
//!
//! The manifest is upstream gclient input, which is nominally Python. It is
//! never executed here: a small scanner accepts only `vars`/`deps` dict
//! assignments whose values are string literals, `Var('name')` lookups,
//! `Str(...)` wrappers, `+` concatenations and `{name}` substitutions.
//! Other top-level assignments (hooks, recursedeps and the like) are skipped
//! with balanced brackets and never evaluated. Anything outside that grammar
//! is a [`ManifestError`].
//!
//! Of the parsed entries only a fixed allow-list is fetched; V8 builds fine
//! without the rest of the Chromium tree.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ManifestError;
use crate::fetch::{self, FetchStrategy, SourceRef};

/// Source dependencies required to compile V8.
pub const REQUIRED_DEPS: &[&str] = &[
    "v8/build",
    "v8/third_party/icu",
    "v8/base/trace_event/common",
    "v8/third_party/jinja2",
    "v8/third_party/markupsafe",
    "v8/third_party/googletest/src",
    "v8/third_party/zlib",
    "v8/third_party/abseil-cpp",
];

/// Extra dependency when compiling with clang.
pub const CLANG_DEP: &str = "v8/tools/clang";

pub fn required_deps(use_clang: bool) -> Vec<&'static str> {
    let mut required = REQUIRED_DEPS.to_vec();
    if use_clang {
        required.push(CLANG_DEP);
    }
    required
}

/// One allow-listed manifest entry, name qualified under the main tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub name: String,
    pub source: SourceRef,
}

/// Manifest entry names are relative to the main tree unless already
/// prefixed with it.
pub fn qualify_name(name: &str) -> String {
    if name.starts_with("v8") {
        name.to_string()
    } else {
        format!("v8/{}", name)
    }
}

/// Qualify and filter parsed entries down to the required set.
pub fn plan_required(deps: &BTreeMap<String, String>, required: &[&str]) -> Vec<DependencyEntry> {
    let mut entries = Vec::new();
    for (name, url) in deps {
        let name = qualify_name(name);
        if required.iter().any(|r| *r == name) {
            entries.push(DependencyEntry {
                source: SourceRef::parse(url),
                name,
            });
        }
    }
    entries
}

/// Parse the manifest and fetch every required entry into its tree path.
pub fn fetch_required(manifest: &Path, strategy: FetchStrategy, use_clang: bool) -> Result<()> {
    let text = fs::read_to_string(manifest)
        .with_context(|| format!("reading dependency manifest '{}'", manifest.display()))?;
    let deps = parse_manifest(manifest, &text)?;
    let required = required_deps(use_clang);
    let entries = plan_required(&deps, &required);

    println!(
        "[deps] fetching {} of {} manifest entries",
        entries.len(),
        deps.len()
    );
    for entry in &entries {
        println!("[deps] {}", entry.name);
        fetch::fetch(&entry.source, Path::new(&entry.name), strategy)?;
    }
    Ok(())
}

/// Parse manifest text into a name-to-URL map.
///
/// Dict-valued entries contribute their `url` key; entries without one
/// (cipd packages) are not fetchable sources and are dropped.
pub fn parse_manifest(
    path: &Path,
    text: &str,
) -> Result<BTreeMap<String, String>, ManifestError> {
    let tokens = tokenize(path, text)?;
    Parser {
        tokens,
        pos: 0,
        path,
        vars: BTreeMap::new(),
    }
    .parse()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(String),
    Number(String),
    Punct(char),
}

fn tokenize(path: &Path, text: &str) -> Result<Vec<Token>, ManifestError> {
    let error = |message: &str| ManifestError {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            while let Some(&c) = chars.peek() {
                if c == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(ch) if ch == quote => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(error("unterminated string literal")),
                    },
                    Some(ch) => value.push(ch),
                    None => return Err(error("unterminated string literal")),
                }
            }
            tokens.push(Token::Literal(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    ident.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
            continue;
        }
        if c.is_ascii_digit() {
            let mut number = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_digit() || ch == '.' {
                    number.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(number));
            continue;
        }
        if "={}[]():,+".contains(c) {
            tokens.push(Token::Punct(c));
            chars.next();
            continue;
        }
        return Err(error(&format!("unexpected character '{}'", c)));
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    path: &'a Path,
    vars: BTreeMap<String, String>,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<BTreeMap<String, String>, ManifestError> {
        let mut deps = BTreeMap::new();
        while let Some(token) = self.next() {
            let name = match token {
                Token::Ident(name) => name,
                other => {
                    return Err(self.error(format!("expected assignment, found {:?}", other)))
                }
            };
            self.expect_punct('=')?;
            match name.as_str() {
                "vars" => self.parse_vars()?,
                "deps" => deps = self.parse_deps()?,
                _ => self.skip_value()?,
            }
        }
        Ok(deps)
    }

    fn parse_vars(&mut self) -> Result<(), ManifestError> {
        self.expect_punct('{')?;
        loop {
            if self.eat_punct('}') {
                break;
            }
            let key = self.expect_literal()?;
            self.expect_punct(':')?;
            match self.peek() {
                Some(Token::Literal(_)) => {
                    let value = self.parse_expr()?;
                    self.vars.insert(key, value);
                }
                Some(Token::Ident(id)) if id == "Var" || id == "Str" => {
                    let value = self.parse_expr()?;
                    self.vars.insert(key, value);
                }
                // booleans and numbers carry no URL text, parse and drop
                Some(Token::Ident(_)) | Some(Token::Number(_)) => {
                    self.next();
                }
                other => {
                    return Err(self.error(format!("unsupported vars value: {:?}", other)))
                }
            }
            if !self.eat_punct(',') {
                self.expect_punct('}')?;
                break;
            }
        }
        Ok(())
    }

    fn parse_deps(&mut self) -> Result<BTreeMap<String, String>, ManifestError> {
        self.expect_punct('{')?;
        let mut deps = BTreeMap::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            let name = self.expect_literal()?;
            self.expect_punct(':')?;
            if let Some(url) = self.parse_dep_value()? {
                deps.insert(name, url);
            }
            if !self.eat_punct(',') {
                self.expect_punct('}')?;
                break;
            }
        }
        Ok(deps)
    }

    fn parse_dep_value(&mut self) -> Result<Option<String>, ManifestError> {
        if !matches!(self.peek(), Some(Token::Punct('{'))) {
            return self.parse_expr().map(Some);
        }
        self.next();
        let mut url = None;
        loop {
            if self.eat_punct('}') {
                break;
            }
            let key = self.expect_literal()?;
            self.expect_punct(':')?;
            if key == "url" {
                url = Some(self.parse_expr()?);
            } else {
                self.skip_value()?;
            }
            if !self.eat_punct(',') {
                self.expect_punct('}')?;
                break;
            }
        }
        Ok(url)
    }

    fn parse_expr(&mut self) -> Result<String, ManifestError> {
        let mut value = self.parse_term()?;
        while self.eat_punct('+') {
            value.push_str(&self.parse_term()?);
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<String, ManifestError> {
        match self.next() {
            Some(Token::Literal(text)) => self.substitute(&text),
            Some(Token::Ident(id)) if id == "Var" => {
                self.expect_punct('(')?;
                let name = self.expect_literal()?;
                self.expect_punct(')')?;
                self.lookup(&name)
            }
            Some(Token::Ident(id)) if id == "Str" => {
                self.expect_punct('(')?;
                let value = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(value)
            }
            other => Err(self.error(format!("expected string expression, found {:?}", other))),
        }
    }

    /// Expand `{name}` references against the vars table.
    fn substitute(&self, text: &str) -> Result<String, ManifestError> {
        if !text.contains('{') {
            return Ok(text.to_string());
        }
        let mut result = String::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c != '{' {
                result.push(c);
                continue;
            }
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => name.push(ch),
                    _ => {
                        return Err(
                            self.error(format!("malformed substitution in '{}'", text))
                        )
                    }
                }
            }
            result.push_str(&self.lookup(&name)?);
        }
        Ok(result)
    }

    fn lookup(&self, name: &str) -> Result<String, ManifestError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| self.error(format!("undefined variable '{}'", name)))
    }

    /// Skip a value without evaluating it: a balanced bracket group, or a
    /// scalar with optional call arguments and `+` chains.
    fn skip_value(&mut self) -> Result<(), ManifestError> {
        self.skip_term()?;
        while self.eat_punct('+') {
            self.skip_term()?;
        }
        Ok(())
    }

    fn skip_term(&mut self) -> Result<(), ManifestError> {
        match self.next() {
            Some(Token::Punct('{' | '[' | '(')) => self.skip_balanced(),
            Some(Token::Ident(_)) => {
                if matches!(self.peek(), Some(Token::Punct('('))) {
                    self.next();
                    self.skip_balanced()?;
                }
                Ok(())
            }
            Some(Token::Literal(_)) | Some(Token::Number(_)) => Ok(()),
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    /// Consume tokens until the already-opened bracket group closes.
    fn skip_balanced(&mut self) -> Result<(), ManifestError> {
        let mut depth = 1u32;
        while depth > 0 {
            match self.next() {
                Some(Token::Punct('{' | '[' | '(')) => depth += 1,
                Some(Token::Punct('}' | ']' | ')')) => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unbalanced brackets in skipped value")),
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == c) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ManifestError> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(self.error(format!("expected '{}', found {:?}", c, other))),
        }
    }

    fn expect_literal(&mut self) -> Result<String, ManifestError> {
        match self.next() {
            Some(Token::Literal(text)) => Ok(text),
            other => Err(self.error(format!("expected string literal, found {:?}", other))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ManifestError {
        ManifestError {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }
}
