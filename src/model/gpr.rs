//! Gene-reaction rule parsing.
//!
//! Grammar (keywords are case-insensitive, `and` binds tighter than `or`):
//!
//! ```text
//! rule   := or_expr?
//! or_expr  := and_expr ("or" and_expr)*
//! and_expr := atom ("and" atom)*
//! atom   := gene | "(" or_expr ")"
//! ```

use crate::core::error::GprError;
use std::fmt;

/// Deepest parenthesis nesting [`parse_gpr`] accepts.
///
/// Walks over a [`Gpr`] recurse once per level, so the cap also bounds
/// their stack use.
pub const MAX_NESTING: usize = 64;

/// Parsed gene association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gpr {
    /// A single gene.
    Gene(String),
    /// All operands are required.
    And(Vec<Gpr>),
    /// Any operand suffices.
    Or(Vec<Gpr>),
}

impl Gpr {
    /// Gene ids in order of first appearance.
    pub fn genes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_genes(&mut out);
        out
    }

    fn collect_genes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Gpr::Gene(id) => {
                if !out.contains(&id.as_str()) {
                    out.push(id);
                }
            }
            Gpr::And(items) | Gpr::Or(items) => {
                for item in items {
                    item.collect_genes(out);
                }
            }
        }
    }

    fn fmt_operand(&self, parent_is_and: bool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gpr::Or(_) if parent_is_and => write!(f, "({self})"),
            Gpr::And(_) if !parent_is_and => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (items, joiner, is_and) = match self {
            Gpr::Gene(id) => return write!(f, "{id}"),
            Gpr::And(items) => (items, " and ", true),
            Gpr::Or(items) => (items, " or ", false),
        };
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                f.write_str(joiner)?;
            }
            item.fmt_operand(is_and, f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Gene(String),
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Open => "(",
            Token::Close => ")",
            Token::And => "and",
            Token::Or => "or",
            Token::Gene(id) => id,
        }
    }
}

fn tokenize(rule: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut chars = rule.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' || c == ')' {
            chars.next();
            tokens.push((start, if c == '(' { Token::Open } else { Token::Close }));
            continue;
        }
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }
        let word = &rule[start..end];
        let token = if word.eq_ignore_ascii_case("and") {
            Token::And
        } else if word.eq_ignore_ascii_case("or") {
            Token::Or
        } else {
            Token::Gene(word.to_string())
        };
        tokens.push((start, token));
    }
    tokens
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn unexpected(&self) -> GprError {
        match self.tokens.get(self.pos) {
            Some((position, token)) => GprError::UnexpectedToken {
                token: token.text().to_string(),
                position: *position,
            },
            None => GprError::UnexpectedEnd,
        }
    }

    fn or_expr(&mut self) -> Result<Gpr, GprError> {
        let mut items = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            items.push(self.and_expr()?);
        }
        Ok(collapse(items, Gpr::Or))
    }

    fn and_expr(&mut self) -> Result<Gpr, GprError> {
        let mut items = vec![self.atom()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            items.push(self.atom()?);
        }
        Ok(collapse(items, Gpr::And))
    }

    fn atom(&mut self) -> Result<Gpr, GprError> {
        match self.tokens.get(self.pos).cloned() {
            Some((_, Token::Gene(id))) => {
                self.pos += 1;
                Ok(Gpr::Gene(id))
            }
            Some((open_at, Token::Open)) => {
                if self.depth >= MAX_NESTING {
                    return Err(GprError::TooDeep {
                        limit: MAX_NESTING,
                        position: open_at,
                    });
                }
                self.pos += 1;
                self.depth += 1;
                let inner = self.or_expr()?;
                self.depth -= 1;
                match self.peek() {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    None => Err(GprError::UnbalancedParenthesis(open_at)),
                    Some(_) => Err(self.unexpected()),
                }
            }
            _ => Err(self.unexpected()),
        }
    }
}

fn collapse(mut items: Vec<Gpr>, wrap: fn(Vec<Gpr>) -> Gpr) -> Gpr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

/// Parse a gene-reaction rule.
///
/// An empty (or all-whitespace) rule is valid and yields `None`.
pub fn parse_gpr(rule: &str) -> Result<Option<Gpr>, GprError> {
    let tokens = tokenize(rule);
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let gpr = parser.or_expr()?;
    if parser.pos < parser.tokens.len() {
        if let Some((position, Token::Close)) = parser.tokens.get(parser.pos) {
            return Err(GprError::UnbalancedParenthesis(*position));
        }
        return Err(parser.unexpected());
    }
    Ok(Some(gpr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rule() {
        assert_eq!(parse_gpr("").unwrap(), None);
        assert_eq!(parse_gpr("   ").unwrap(), None);
    }

    #[test]
    fn test_single_gene() {
        assert_eq!(parse_gpr("b0001").unwrap(), Some(Gpr::Gene("b0001".to_string())));
    }

    #[test]
    fn test_precedence() {
        let gpr = parse_gpr("a or b and c").unwrap().unwrap();
        assert_eq!(
            gpr,
            Gpr::Or(vec![
                Gpr::Gene("a".to_string()),
                Gpr::And(vec![Gpr::Gene("b".to_string()), Gpr::Gene("c".to_string())]),
            ])
        );
    }

    #[test]
    fn test_keywords_case_insensitive_and_nested() {
        let gpr = parse_gpr("(b0001 AND b0002) Or (b0003)").unwrap().unwrap();
        assert_eq!(gpr.genes(), vec!["b0001", "b0002", "b0003"]);
        assert_eq!(gpr.to_string(), "(b0001 and b0002) or b0003");
    }

    #[test]
    fn test_display_parenthesizes_or_inside_and() {
        let gpr = Gpr::And(vec![
            Gpr::Gene("a".to_string()),
            Gpr::Or(vec![Gpr::Gene("b".to_string()), Gpr::Gene("c".to_string())]),
        ]);
        assert_eq!(gpr.to_string(), "a and (b or c)");
        assert_eq!(parse_gpr(&gpr.to_string()).unwrap(), Some(gpr));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse_gpr("a and"), Err(GprError::UnexpectedEnd)));
        assert!(matches!(parse_gpr("or a"), Err(GprError::UnexpectedToken { .. })));
        assert!(matches!(parse_gpr("a b"), Err(GprError::UnexpectedToken { .. })));
        assert!(matches!(parse_gpr("(a or b"), Err(GprError::UnbalancedParenthesis(0))));
        assert!(matches!(parse_gpr("a or b)"), Err(GprError::UnbalancedParenthesis(6))));
        assert!(parse_gpr("()").is_err());
        assert!(parse_gpr("a and and b").is_err());
    }

    #[test]
    fn test_nesting_at_limit_parses() {
        let rule = format!("{}g1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let gpr = parse_gpr(&rule).unwrap().unwrap();
        assert_eq!(gpr, Gpr::Gene("g1".to_string()));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let rule = format!("{}g1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(
            parse_gpr(&rule),
            Err(GprError::TooDeep {
                limit: MAX_NESTING,
                position: MAX_NESTING,
            })
        );

        let mixed = format!("{}a and b{}", "(a or ".repeat(500), ")".repeat(500));
        assert!(matches!(parse_gpr(&mixed), Err(GprError::TooDeep { .. })));
    }

    #[test]
    fn test_gene_ids_with_punctuation() {
        let gpr = parse_gpr("STM_1.2-3 or Y-1").unwrap().unwrap();
        assert_eq!(gpr.genes(), vec!["STM_1.2-3", "Y-1"]);
    }
}
