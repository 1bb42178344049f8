//! Output path templates for emitted assets.
//!
//! Tokens:
//! - `{name}`: file stem of the source
//! - `{hash}`: first [`HASH_LEN`] hex chars of the content SHA-256
//! - `{ext}`: source extension including the dot, empty if none
//!
//! `{hash}` and `{ext}` are required. Anything else in braces is rejected.

use std::fmt;

/// Width of the `{hash}` fragment.
pub const HASH_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Name,
    Hash,
    Ext,
}

/// A validated output template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl OutputTemplate {
    /// Parse and validate; the error is a human-readable reason.
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find(|c: char| c == '{' || c == '}') {
            if rest[start..].starts_with('}') {
                return Err(format!("unbalanced '}}' at byte {}", template.len() - rest.len() + start));
            }

            literal.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after
                .find('}')
                .ok_or_else(|| "unclosed '{'".to_string())?;

            let segment = match &after[..end] {
                "name" => Segment::Name,
                "hash" => Segment::Hash,
                "ext" => Segment::Ext,
                other => return Err(format!("unknown token '{{{}}}'", other)),
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (token, segment) in [("{hash}", Segment::Hash), ("{ext}", Segment::Ext)] {
            if !segments.contains(&segment) {
                return Err(format!("missing required token {}", token));
            }
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Substitute tokens. `hash` must already be truncated.
    pub fn render(&self, name: &str, hash: &str, ext: &str) -> String {
        let mut out = String::with_capacity(self.source.len() + hash.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Name => out.push_str(name),
                Segment::Hash => out.push_str(hash),
                Segment::Ext => out.push_str(ext),
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for OutputTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
