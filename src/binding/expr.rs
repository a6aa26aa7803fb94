//! Placeholder grammar - tokenizer for connection-string expressions
//!
//! Grammar:
//! - `{name.outputs.key}` / `{name.secretOutputs.key}` - provisioning outputs
//! - `{name.value}` - parameter resource value
//! - `{name.connectionString}` - another resource's connection string
//! - `{{` / `}}` - literal braces
//!
//! Anything else inside braces is a fatal parse error, reported against the
//! resource that declared the template. Parsed templates are cached (bounded)
//! and shared via Arc.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ProvisioError, Result};
use crate::model::Channel;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z0-9_-]+)\.(?:(outputs|secretOutputs)\.([A-Za-z0-9_-]+)|(value|connectionString))$",
    )
    .expect("placeholder regex is valid")
});

/// Upper bound on cached templates; past it, templates are parsed on every use
pub const MAX_CACHED_TEMPLATES: usize = 4096;

static TEMPLATE_CACHE: Lazy<DashMap<String, Arc<Template>>> = Lazy::new(DashMap::new);

/// What a placeholder reads from its resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Output { channel: Channel, key: String },
    Value,
    ConnectionString,
}

/// A single `{...}` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub resource: String,
    pub accessor: Accessor,
}

impl Placeholder {
    pub fn output(resource: &str, channel: Channel, key: &str) -> Self {
        Self {
            resource: resource.to_string(),
            accessor: Accessor::Output {
                channel,
                key: key.to_string(),
            },
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.accessor {
            Accessor::Output { channel, key } => {
                write!(f, "{{{}.{}.{}}}", self.resource, channel, key)
            }
            Accessor::Value => write!(f, "{{{}.value}}", self.resource),
            Accessor::ConnectionString => write!(f, "{{{}.connectionString}}", self.resource),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Placeholder(Placeholder),
}

/// Parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    tokens: Vec<Token>,
}

impl Template {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Placeholder(p) => Some(p),
            Token::Literal(_) => None,
        })
    }

    pub fn has_placeholders(&self) -> bool {
        self.placeholders().next().is_some()
    }
}

/// Parse a template declared by `owner` (with caching)
pub fn parse(owner: &str, template: &str) -> Result<Arc<Template>> {
    if let Some(cached) = TEMPLATE_CACHE.get(template) {
        return Ok(Arc::clone(&cached));
    }

    let parsed = Arc::new(tokenize(owner, template)?);
    if TEMPLATE_CACHE.len() < MAX_CACHED_TEMPLATES {
        TEMPLATE_CACHE.insert(template.to_string(), Arc::clone(&parsed));
    }
    Ok(parsed)
}

/// Placeholders referenced by a template declared by `owner`
pub fn placeholders(owner: &str, template: &str) -> Result<Vec<Placeholder>> {
    Ok(parse(owner, template)?.placeholders().cloned().collect())
}

/// Number of templates currently cached
pub fn cached_templates() -> usize {
    TEMPLATE_CACHE.len()
}

fn malformed(owner: &str, template: &str, position: usize, details: impl Into<String>) -> ProvisioError {
    ProvisioError::MalformedPlaceholder {
        resource: owner.to_string(),
        template: template.to_string(),
        position,
        details: details.into(),
    }
}

fn tokenize(owner: &str, template: &str) -> Result<Template> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' => {
                if chars.peek().map(|(_, c)| *c) == Some('{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }

                let mut end = None;
                for (j, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            end = Some(j);
                            break;
                        }
                        '{' => return Err(malformed(owner, template, j, "nested '{' inside placeholder")),
                        _ => {}
                    }
                }
                let Some(end) = end else {
                    return Err(malformed(owner, template, i, "unclosed placeholder"));
                };

                let content = &template[i + 1..end];
                let placeholder = parse_placeholder(content).ok_or_else(|| {
                    malformed(
                        owner,
                        template,
                        i,
                        format!("'{{{}}}' is not a valid placeholder", content),
                    )
                })?;

                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Placeholder(placeholder));
            }
            '}' => {
                if chars.peek().map(|(_, c)| *c) == Some('}') {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(malformed(owner, template, i, "unmatched '}'"));
                }
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    Ok(Template { tokens })
}

fn parse_placeholder(content: &str) -> Option<Placeholder> {
    let caps = PLACEHOLDER_RE.captures(content)?;
    let resource = caps[1].to_string();

    let accessor = match (caps.get(2), caps.get(3), caps.get(4)) {
        (Some(channel), Some(key), None) => Accessor::Output {
            channel: if channel.as_str() == "outputs" {
                Channel::Outputs
            } else {
                Channel::SecretOutputs
            },
            key: key.as_str().to_string(),
        },
        (None, None, Some(m)) if m.as_str() == "value" => Accessor::Value,
        (None, None, Some(_)) => Accessor::ConnectionString,
        _ => return None,
    };

    Some(Placeholder { resource, accessor })
}
