use regex::Regex;

/// The tag pattern of a JSDoc line: `@token {type} description`, with the
/// braced type and the description both optional.
const TAG_PATTERN: &str = r"@(?P<token>[A-Za-z]+)(?:\s+\{(?P<type>[A-Za-z]+)\})?(?:\s+(?P<description>.+))?";

/// Extracted fields of a declaration's doc comment.
///
/// Only the `@returns` tag is consumed; its type feeds the return-type
/// annotation that `Value::influence` honors (`@returns {random}` turns
/// numeric returns into the `random` kind).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Docstring {
    pub returns: Option<ReturnsTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnsTag {
    pub ty: Option<String>,
    pub description: Option<String>,
}

/// Parses JSDoc tags out of comment text. The regex is compiled once and
/// reused for every comment the analyzer sees.
#[derive(Debug)]
pub(crate) struct JsdocParser {
    tag: Regex,
}

impl JsdocParser {
    pub fn new() -> Self {
        Self {
            tag: Regex::new(TAG_PATTERN).expect("tag pattern is valid"),
        }
    }

    /// Scans a block comment line by line. Leading asterisks (the usual
    /// JSDoc gutter) are irrelevant because the tag match is unanchored.
    pub fn parse(&self, comment: &str) -> Docstring {
        let mut doc = Docstring::default();
        for line in comment.lines() {
            let Some(captures) = self.tag.captures(line.trim()) else {
                continue;
            };
            if &captures["token"] == "returns" {
                doc.returns = Some(ReturnsTag {
                    ty: captures.name("type").map(|m| m.as_str().to_owned()),
                    description: captures.name("description").map(|m| m.as_str().to_owned()),
                });
            }
        }
        doc
    }
}
