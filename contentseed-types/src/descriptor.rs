//! Tokenizer for manifest-style descriptor headers.
//!
//! Grammar:
//!
//! ```text
//! header    := clause (',' clause)*
//! clause    := value (';' parameter)*
//! parameter := name ':=' argument      (directive)
//!            | name '=' argument       (attribute)
//! argument  := token | '"' quoted '"'
//! ```
//!
//! Separators inside double quotes are literal, so list-valued directives are
//! written `ignoreImportProviders:="json,xml"`.

use crate::Error;

/// One clause of a header: the leading value plus its parameters, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub value: String,
    pub directives: Vec<(String, String)>,
    pub attributes: Vec<(String, String)>,
}

impl DescriptorEntry {
    /// Returns the first directive with the given name.
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parses a full header into its clauses. A blank header yields no clauses.
pub fn parse_header(header: &str) -> Result<Vec<DescriptorEntry>, Error> {
    if header.trim().is_empty() {
        return Ok(Vec::new());
    }
    let malformed = |reason: String| Error::MalformedDescriptor {
        descriptor: header.to_string(),
        reason,
    };

    split_unquoted(header, ',')
        .map_err(&malformed)?
        .into_iter()
        .map(|clause| parse_clause(&clause).map_err(&malformed))
        .collect()
}

fn parse_clause(clause: &str) -> Result<DescriptorEntry, String> {
    let mut parts = split_unquoted(clause, ';')?.into_iter();
    let value = parts.next().unwrap_or_default().trim().to_string();
    if value.is_empty() {
        return Err("empty entry".to_string());
    }
    if value.contains('"') {
        return Err(format!("unexpected quote in entry value {value:?}"));
    }

    let mut directives = Vec::new();
    let mut attributes = Vec::new();
    for param in parts {
        let param = param.trim();
        if param.is_empty() {
            return Err(format!("empty parameter in entry {value:?}"));
        }
        let (name, argument, is_directive) = split_parameter(param)?;
        if is_directive {
            directives.push((name, argument));
        } else {
            attributes.push((name, argument));
        }
    }

    Ok(DescriptorEntry {
        value,
        directives,
        attributes,
    })
}

/// Splits `name:=arg` / `name=arg`, validating the name and unquoting the
/// argument.
fn split_parameter(param: &str) -> Result<(String, String, bool), String> {
    let eq = param
        .find('=')
        .ok_or_else(|| format!("parameter {param:?} is missing ':=' or '='"))?;
    let (name_part, is_directive) = match param[..eq].strip_suffix(':') {
        Some(n) => (n, true),
        None => (&param[..eq], false),
    };
    let name = name_part.trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(format!("invalid parameter name {name_part:?}"));
    }
    let argument = unquote(param[eq + 1..].trim())?;
    Ok((name.to_string(), argument, is_directive))
}

fn unquote(arg: &str) -> Result<String, String> {
    let Some(inner) = arg.strip_prefix('"') else {
        if arg.contains('"') {
            return Err(format!("unexpected quote in argument {arg:?}"));
        }
        return Ok(arg.to_string());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| format!("unterminated quote in argument {arg:?}"))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err(format!("dangling escape in argument {arg:?}")),
            },
            '"' => return Err(format!("unescaped quote in argument {arg:?}")),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Splits on `sep` outside of double quotes.
fn split_unquoted(input: &str, sep: char) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c == sep && !in_quotes => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quote".to_string());
    }
    parts.push(current);
    Ok(parts)
}
