/// Placeholders a finding message may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    Table,
    RowId,
    Field,
    Label,
    Value,
    Against,
    AgainstLabel,
    Tolerance,
    Op,
    Allowed,
    Rule,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "table" => Self::Table,
            "row_id" => Self::RowId,
            "field" => Self::Field,
            "label" => Self::Label,
            "value" => Self::Value,
            "against" => Self::Against,
            "against_label" => Self::AgainstLabel,
            "tolerance" => Self::Tolerance,
            "op" => Self::Op,
            "allowed" => Self::Allowed,
            "rule" => Self::Rule,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// Message text parsed once at load time so rendering cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

/// Values substituted into a [`MessageTemplate`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MessageContext<'a> {
    pub rule: &'a str,
    pub table: Option<&'a str>,
    pub row_id: Option<&'a str>,
    pub field: Option<&'a str>,
    pub label: String,
    pub value: String,
    pub against: String,
    pub against_label: String,
    pub tolerance: String,
    pub op: String,
    pub allowed: String,
}

impl MessageTemplate {
    /// Parses `{name}` placeholders. `{{` and `}}` are literal braces.
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        name.push(next);
                    }
                    if !closed {
                        return Err(format!("unterminated placeholder `{{{name}`"));
                    }
                    let placeholder = Placeholder::parse(name.trim())
                        .ok_or_else(|| format!("unknown placeholder `{{{name}}}`"))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(placeholder));
                }
                '}' => return Err("unmatched `}` (write `}}` for a literal brace)".to_string()),
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub(crate) fn render(&self, context: &MessageContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(placeholder) => out.push_str(match placeholder {
                    Placeholder::Table => context.table.unwrap_or(""),
                    Placeholder::RowId => context.row_id.unwrap_or(""),
                    Placeholder::Field => context.field.unwrap_or(""),
                    Placeholder::Label => &context.label,
                    Placeholder::Value => &context.value,
                    Placeholder::Against => &context.against,
                    Placeholder::AgainstLabel => &context.against_label,
                    Placeholder::Tolerance => &context.tolerance,
                    Placeholder::Op => &context.op,
                    Placeholder::Allowed => &context.allowed,
                    Placeholder::Rule => context.rule,
                }),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_placeholders_and_escaped_braces() {
        let template =
            MessageTemplate::parse("{{{label}}} is {value} on row {row_id}").expect("parses");
        let context = MessageContext {
            label: "Draw Amount".to_string(),
            value: "12.00".to_string(),
            row_id: Some("d-1"),
            ..MessageContext::default()
        };
        assert_eq!(template.render(&context), "{Draw Amount} is 12.00 on row d-1");
    }

    #[test]
    fn rejects_unknown_and_unterminated_placeholders() {
        assert!(MessageTemplate::parse("{colour}").unwrap_err().contains("unknown placeholder"));
        assert!(MessageTemplate::parse("{label").unwrap_err().contains("unterminated"));
        assert!(MessageTemplate::parse("oops }").is_err());
    }

    #[test]
    fn missing_row_context_renders_empty() {
        let template = MessageTemplate::parse("[{table}:{row_id}]").expect("parses");
        assert_eq!(template.render(&MessageContext::default()), "[:]");
    }
}
