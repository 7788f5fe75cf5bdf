//! Syntax of parameter expressions.
//!
//! A configuration value is a template of literal text and `${...}`
//! expressions; `$$` escapes a dollar sign. An expression whose body is a
//! property path (`root.prop[0](key)...`) is walked from a root object,
//! anything else is looked up as a property name.

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Text taken as is.
    Literal(String),
    /// Body of a `${...}` expression.
    Expression(String),
}

/// Split a configuration value into literal text and expressions.
///
/// An unterminated `${` is kept as literal text.
#[must_use]
pub fn parse_template(text: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("$$") {
            literal.push('$');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            match matching_brace(after) {
                Some(end) => {
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(TemplatePart::Expression(after[..end].to_string()));
                    rest = &after[end.saturating_add(1)..];
                },
                None => {
                    literal.push_str(tail);
                    rest = "";
                },
            }
        } else {
            literal.push('$');
            rest = &tail[1..];
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() || parts.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    parts
}

/// Byte offset of the `}` closing an expression body, allowing nested
/// `${...}` inside it.
fn matching_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth = depth.saturating_add(1),
            '}' if depth == 0 => return Some(i),
            '}' => depth = depth.saturating_sub(1),
            _ => {},
        }
    }
    None
}

/// One step of a property path after the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name`
    Property(String),
    /// `[n]`
    Index(usize),
    /// `(key)`
    Key(String),
}

/// A root object name followed by navigation steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    /// Root object name.
    pub root: String,
    /// Steps from the root.
    pub segments: Vec<Segment>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Parse an expression body as a property path, or `None` if it is not one.
#[must_use]
pub fn parse_path(expression: &str) -> Option<PropertyPath> {
    let expression = expression.trim();
    let root_end = expression
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(expression.len());
    if root_end == 0 {
        return None;
    }
    let root = expression[..root_end].to_string();
    let mut rest = &expression[root_end..];
    let mut segments = Vec::new();

    while let Some(c) = rest.chars().next() {
        match c {
            '.' => {
                let body = &rest[1..];
                let end = body.find(|c: char| !is_ident_char(c)).unwrap_or(body.len());
                if end == 0 {
                    return None;
                }
                segments.push(Segment::Property(body[..end].to_string()));
                rest = &body[end..];
            },
            '[' => {
                let end = rest.find(']')?;
                let index = rest[1..end].trim().parse().ok()?;
                segments.push(Segment::Index(index));
                rest = &rest[end.saturating_add(1)..];
            },
            '(' => {
                let end = rest.find(')')?;
                segments.push(Segment::Key(rest[1..end].to_string()));
                rest = &rest[end.saturating_add(1)..];
            },
            _ => return None,
        }
    }
    Some(PropertyPath { root, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> TemplatePart {
        TemplatePart::Literal(s.to_string())
    }

    fn expr(s: &str) -> TemplatePart {
        TemplatePart::Expression(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse_template("plain-text"), vec![lit("plain-text")]);
        assert_eq!(parse_template(""), vec![lit("")]);
        assert_eq!(parse_template("cost $5"), vec![lit("cost $5")]);
    }

    #[test]
    fn test_escaped_dollar() {
        assert_eq!(parse_template("$${not.expr}"), vec![lit("${not.expr}")]);
        assert_eq!(parse_template("a$$b"), vec![lit("a$b")]);
    }

    #[test]
    fn test_expressions() {
        assert_eq!(parse_template("${project.version}"), vec![expr("project.version")]);
        assert_eq!(
            parse_template("${project.build.directory}/classes-${suffix}"),
            vec![
                expr("project.build.directory"),
                lit("/classes-"),
                expr("suffix")
            ]
        );
        assert_eq!(parse_template("${unterminated"), vec![lit("${unterminated")]);
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            parse_path("project.dependencies[0].artifactId"),
            Some(PropertyPath {
                root: "project".into(),
                segments: vec![
                    Segment::Property("dependencies".into()),
                    Segment::Index(0),
                    Segment::Property("artifactId".into()),
                ],
            })
        );
        assert_eq!(
            parse_path("project.properties(foo.bar)").unwrap().segments,
            vec![Segment::Property("properties".into()), Segment::Key("foo.bar".into())]
        );
        assert_eq!(parse_path("basedir").unwrap().segments, vec![]);
        assert!(parse_path("a..b").is_none());
        assert!(parse_path("list[x]").is_none());
        assert!(parse_path("").is_none());
    }
}
