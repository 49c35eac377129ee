//! Parsers for the compact wiring descriptors used in graph declarations.
//!
//! Three grammars are supported:
//!
//! - input pins: `"-> pinName"` or `"=> pinName"`
//! - output pins: `"outputName -> pin @ node (uid)"` or
//!   `"outputName => [ "pin @ node (uid)" "pin @ node (uid)" ]"`
//! - router scopes: `selector : "pin @ node (uid)" "pin @ node (uid)"`
//!
//! The `->` arrow marks a plain pin, while `=>` marks a pin with a return channel.
//! All functions here are pure. Malformed targets are dropped, the rest of the
//! descriptor is still parsed on a best-effort basis.

use std::fmt;

/// Arrow glyph for plain pins.
pub const PLAIN_ARROW: &str = "->";
/// Arrow glyph for pins that carry a return channel.
pub const CHANNEL_ARROW: &str = "=>";

fn arrow(channel: bool) -> &'static str {
    if channel {
        CHANNEL_ARROW
    } else {
        PLAIN_ARROW
    }
}

/// A parsed input pin descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputPin {
    /// The pin name, trimmed.
    pub name: String,
    /// Whether the pin accepts requests that expect a reply.
    pub channel: bool,
}

impl InputPin {
    /// Create a new input pin.
    pub fn new<S: Into<String>>(name: S, channel: bool) -> Self {
        InputPin {
            name: name.into(),
            channel,
        }
    }
}

impl fmt::Display for InputPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", arrow(self.channel), self.name)
    }
}

/// A parsed destination of the form `pin @ node (uid)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    /// The input pin (or router selector) on the destination.
    pub pin: String,
    /// The human readable name of the destination.
    pub node: String,
    /// The unique id of the destination.
    pub uid: String,
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.pin, self.node, self.uid)
    }
}

/// A parsed output pin descriptor with its fan-out list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    /// The output pin name.
    pub name: String,
    /// Whether the output can issue requests.
    pub channel: bool,
    /// All well-formed destinations, in declaration order.
    pub targets: Vec<TargetSpec>,
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.name, arrow(self.channel))?;
        for target in self.targets.iter() {
            write!(f, " {}", quote(&target.to_string()))?;
        }
        write!(f, " ]")
    }
}

/// A parsed router scope: a selector and the destinations it reaches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeSpec {
    /// The selector text, trimmed.
    pub selector: String,
    /// All well-formed destinations, in declaration order.
    pub targets: Vec<TargetSpec>,
}

impl fmt::Display for ScopeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :", self.selector)?;
        for target in self.targets.iter() {
            write!(f, " {}", quote(&target.to_string()))?;
        }
        Ok(())
    }
}

/// Parse an input descriptor such as `"=> pinName"`.
///
/// Returns `None` if the arrow is missing or the pin name is empty.
pub fn parse_input(descriptor: &str) -> Option<InputPin> {
    let trimmed = descriptor.trim();
    let (channel, rest) = if let Some(rest) = trimmed.strip_prefix(CHANNEL_ARROW) {
        (true, rest)
    } else if let Some(rest) = trimmed.strip_prefix(PLAIN_ARROW) {
        (false, rest)
    } else {
        return None;
    };
    let name = rest.trim();
    if name.is_empty() {
        None
    } else {
        Some(InputPin::new(name, channel))
    }
}

/// Parse an output descriptor such as `"out -> pin @ node (uid)"`.
///
/// Returns `None` if no arrow is present or the output name is empty.
/// A missing or empty target list yields an output without targets.
pub fn parse_output(descriptor: &str) -> Option<OutputSpec> {
    let (position, channel) = find_arrow(descriptor)?;
    let name = descriptor[..position].trim();
    if name.is_empty() {
        return None;
    }
    let rest = descriptor[position + PLAIN_ARROW.len()..].trim();
    let targets = if rest.starts_with('[') || rest.starts_with('"') {
        quoted_items(rest)
            .iter()
            .filter_map(|item| parse_target(item))
            .collect()
    } else if rest.is_empty() {
        Vec::new()
    } else {
        parse_target(rest).into_iter().collect()
    };
    Some(OutputSpec {
        name: name.to_string(),
        channel,
        targets,
    })
}

/// Parse a single destination of the form `pin @ node (uid)`.
///
/// Returns `None` if the `@` separator, the pin name, or a non-empty
/// parenthesised uid is missing.
pub fn parse_target(descriptor: &str) -> Option<TargetSpec> {
    let (pin, rest) = descriptor.split_once('@')?;
    let pin = pin.trim();
    if pin.is_empty() {
        return None;
    }
    let open = rest.rfind('(')?;
    let close = rest[open..].find(')')? + open;
    let uid = rest[open + 1..close].trim();
    if uid.is_empty() {
        return None;
    }
    Some(TargetSpec {
        pin: pin.to_string(),
        node: rest[..open].trim().to_string(),
        uid: uid.to_string(),
    })
}

/// Parse a router table line such as `topic : "a @ A (1)" "b @ B (2)"`.
///
/// Returns `None` if the `:` separator is missing.
pub fn parse_scope(descriptor: &str) -> Option<ScopeSpec> {
    let (selector, rest) = split_selector(descriptor)?;
    let targets = quoted_items(rest)
        .iter()
        .filter_map(|item| parse_target(item))
        .collect();
    Some(ScopeSpec {
        selector: selector.trim().to_string(),
        targets,
    })
}

// The selector ends at the first ':' outside of quotes.
fn split_selector(descriptor: &str) -> Option<(&str, &str)> {
    let position = descriptor.find(|c| c == ':' || c == '"')?;
    if descriptor[position..].starts_with(':') {
        Some((&descriptor[..position], &descriptor[position + 1..]))
    } else {
        None
    }
}

fn find_arrow(descriptor: &str) -> Option<(usize, bool)> {
    match (descriptor.find(PLAIN_ARROW), descriptor.find(CHANNEL_ARROW)) {
        (Some(plain), Some(channel)) if channel < plain => Some((channel, true)),
        (Some(plain), _) => Some((plain, false)),
        (None, Some(channel)) => Some((channel, true)),
        (None, None) => None,
    }
}

/// Extract all double-quoted items from `text`, honouring `\"` and `\\` escapes.
///
/// Brackets and whitespace between items are ignored. An unterminated final
/// item is returned as far as it goes.
fn quoted_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut item = String::new();
        loop {
            match chars.next() {
                Some('\\') => {
                    if let Some(escaped) = chars.next() {
                        item.push(escaped);
                    }
                }
                Some('"') | None => break,
                Some(other) => item.push(other),
            }
        }
        items.push(item);
    }
    items
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
