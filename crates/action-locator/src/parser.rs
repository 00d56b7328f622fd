//! Parser for the textual selector form
//!
//! ```text
//! selector := chain ("||" chain)* pick?
//! pick     := "@" ("first" | "last" | "nth" "=" NUMBER)
//! chain    := conj (">>" conj)*
//! conj     := primary ("&&" primary)*
//! primary  := "(" chain ")" | KEY OP VALUE | FUNC "(" chain ")"
//! OP       := "=" | "~=" | "^="
//! ```

use crate::errors::SelectorParseError;
use crate::types::{Pick, Predicate, Relation, Selector, TextMatch};

/// Characters allowed in an unquoted value
pub fn is_bare_char(c: char) -> bool {
    c.is_alphanumeric() || "_-.:/#${}',+*?!%".contains(c)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Str(String),
    LParen,
    RParen,
    And,
    Or,
    Descend,
    At,
    Eq,
    Contains,
    Prefix,
    End,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Word(w) => format!("'{w}'"),
            Tok::Str(s) => format!("\"{s}\""),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::And => "'&&'".to_string(),
            Tok::Or => "'||'".to_string(),
            Tok::Descend => "'>>'".to_string(),
            Tok::At => "'@'".to_string(),
            Tok::Eq => "'='".to_string(),
            Tok::Contains => "'~='".to_string(),
            Tok::Prefix => "'^='".to_string(),
            Tok::End => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, SelectorParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let pair = |chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
                    second: char,
                    tok: Tok|
         -> Result<Tok, SelectorParseError> {
            chars.next();
            match chars.peek() {
                Some(&(_, next)) if next == second => {
                    chars.next();
                    Ok(tok)
                }
                _ => Err(SelectorParseError::UnexpectedChar { offset, found: c }),
            }
        };

        let tok = match c {
            '(' => {
                chars.next();
                Tok::LParen
            }
            ')' => {
                chars.next();
                Tok::RParen
            }
            '@' => {
                chars.next();
                Tok::At
            }
            '=' => {
                chars.next();
                Tok::Eq
            }
            '&' => pair(&mut chars, '&', Tok::And)?,
            '|' => pair(&mut chars, '|', Tok::Or)?,
            '>' => pair(&mut chars, '>', Tok::Descend)?,
            '~' => pair(&mut chars, '=', Tok::Contains)?,
            '^' => pair(&mut chars, '=', Tok::Prefix)?,
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((pos, ch)) = chars.next() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, esc @ ('"' | '\\'))) => value.push(esc),
                            Some((_, other)) => {
                                return Err(SelectorParseError::InvalidEscape {
                                    offset: pos,
                                    found: other,
                                })
                            }
                            None => return Err(SelectorParseError::UnterminatedString(offset)),
                        },
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(SelectorParseError::UnterminatedString(offset));
                }
                Tok::Str(value)
            }
            c if is_bare_char(c) => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_bare_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                Tok::Word(word)
            }
            other => return Err(SelectorParseError::UnexpectedChar { offset, found: other }),
        };
        tokens.push(Token { tok, offset });
    }

    tokens.push(Token {
        tok: Tok::End,
        offset: input.len(),
    });
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> SelectorParseError {
        let token = self.peek();
        SelectorParseError::UnexpectedToken {
            offset: token.offset,
            expected: expected.to_string(),
            found: token.tok.describe(),
        }
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> Result<(), SelectorParseError> {
        if self.peek().tok == tok {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn selector(&mut self) -> Result<Selector, SelectorParseError> {
        let mut alternatives = vec![self.chain()?];
        while self.peek().tok == Tok::Or {
            self.advance();
            alternatives.push(self.chain()?);
        }

        let pick = if self.peek().tok == Tok::At {
            self.advance();
            self.pick()?
        } else {
            Pick::Unique
        };

        if self.peek().tok != Tok::End {
            return Err(self.unexpected("end of selector"));
        }
        Ok(Selector { alternatives, pick })
    }

    fn pick(&mut self) -> Result<Pick, SelectorParseError> {
        match self.advance().tok {
            Tok::Word(w) if w == "first" => Ok(Pick::First),
            Tok::Word(w) if w == "last" => Ok(Pick::Last),
            Tok::Word(w) if w == "nth" => {
                self.expect(Tok::Eq, "'=' after nth")?;
                match self.advance().tok {
                    Tok::Word(n) => n
                        .parse::<usize>()
                        .map(Pick::Nth)
                        .map_err(|_| SelectorParseError::InvalidPick(format!("nth={n}"))),
                    other => Err(SelectorParseError::InvalidPick(format!(
                        "nth={}",
                        other.describe()
                    ))),
                }
            }
            other => Err(SelectorParseError::InvalidPick(other.describe())),
        }
    }

    fn chain(&mut self) -> Result<Predicate, SelectorParseError> {
        let mut left = self.conj()?;
        while self.peek().tok == Tok::Descend {
            self.advance();
            let right = self.conj()?;
            left = Predicate::Descendant {
                ancestor: Box::new(left),
                target: Box::new(right),
            };
        }
        Ok(left)
    }

    fn conj(&mut self) -> Result<Predicate, SelectorParseError> {
        let mut items = vec![self.primary()?];
        while self.peek().tok == Tok::And {
            self.advance();
            items.push(self.primary()?);
        }
        if items.len() == 1 {
            Ok(items.remove(0))
        } else {
            Ok(Predicate::And(items))
        }
    }

    fn primary(&mut self) -> Result<Predicate, SelectorParseError> {
        match self.peek().tok.clone() {
            Tok::LParen => {
                self.advance();
                let inner = self.chain()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::Word(key) => {
                self.advance();
                if self.peek().tok == Tok::LParen {
                    self.advance();
                    let inner = self.chain()?;
                    self.expect(Tok::RParen, "')'")?;
                    return function(&key, inner);
                }
                let op = match self.advance().tok {
                    Tok::Eq => TextMatch::Exact,
                    Tok::Contains => TextMatch::Contains,
                    Tok::Prefix => TextMatch::Prefix,
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected("'=', '~=' or '^='"));
                    }
                };
                let value = match self.advance().tok {
                    Tok::Word(v) | Tok::Str(v) => v,
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected("a value"));
                    }
                };
                attribute(&key, op, value)
            }
            _ => Err(self.unexpected("a predicate")),
        }
    }
}

fn function(name: &str, inner: Predicate) -> Result<Predicate, SelectorParseError> {
    if name == "has" {
        return Ok(Predicate::Has(Box::new(inner)));
    }
    match Relation::from_name(name) {
        Some(relation) => Ok(Predicate::Relative {
            relation,
            anchor: Box::new(inner),
        }),
        None => Err(SelectorParseError::UnknownKey(name.to_string())),
    }
}

fn attribute(key: &str, op: TextMatch, value: String) -> Result<Predicate, SelectorParseError> {
    let exact_only = |build: fn(String) -> Predicate| {
        if op == TextMatch::Exact {
            Ok(build(value.clone()))
        } else {
            Err(SelectorParseError::UnsupportedOperator {
                key: key.to_string(),
                op: op.operator().to_string(),
            })
        }
    };

    match key {
        "id" => exact_only(Predicate::Id),
        "role" => exact_only(Predicate::Role),
        "text" => Ok(Predicate::Text { value, mode: op }),
        "enabled" | "visible" => {
            if op != TextMatch::Exact {
                return Err(SelectorParseError::UnsupportedOperator {
                    key: key.to_string(),
                    op: op.operator().to_string(),
                });
            }
            let flag = match value.as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(SelectorParseError::InvalidBool {
                        key: key.to_string(),
                        value,
                    })
                }
            };
            if key == "enabled" {
                Ok(Predicate::Enabled(flag))
            } else {
                Ok(Predicate::Visible(flag))
            }
        }
        other => Err(SelectorParseError::UnknownKey(other.to_string())),
    }
}

/// Parse a selector from its text form
pub fn parse_selector(input: &str) -> Result<Selector, SelectorParseError> {
    if input.trim().is_empty() {
        return Err(SelectorParseError::Empty);
    }
    let tokens = tokenize(input)?;
    Parser { tokens, pos: 0 }.selector()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(input: &str) -> Selector {
        let parsed = parse_selector(input).unwrap_or_else(|e| panic!("{input}: {e}"));
        let printed = parsed.to_string();
        let reparsed = parse_selector(&printed).unwrap_or_else(|e| panic!("{printed}: {e}"));
        assert_eq!(parsed, reparsed, "round trip of {input} via {printed}");
        parsed
    }

    #[test]
    fn parses_simple_atoms() {
        assert_eq!(
            roundtrip("id=login").alternatives,
            vec![Predicate::id("login")]
        );
        assert_eq!(
            roundtrip("text=Settings").alternatives,
            vec![Predicate::text("Settings")]
        );
        assert_eq!(
            roundtrip("text~=sett").alternatives,
            vec![Predicate::text_contains("sett")]
        );
        assert_eq!(
            roundtrip("enabled=false").alternatives,
            vec![Predicate::Enabled(false)]
        );
    }

    #[test]
    fn parses_conjunction_descendant_and_fallbacks() {
        let sel = roundtrip(r#"id=list >> role=button && text="Buy now" || text~=buy @first"#);
        assert_eq!(sel.alternatives.len(), 2);
        assert_eq!(sel.pick, Pick::First);
        assert_eq!(
            sel.alternatives[0],
            Predicate::role("button")
                .and(Predicate::text("Buy now"))
                .inside(Predicate::id("list"))
        );
    }

    #[test]
    fn parses_relations_and_has() {
        let sel = roundtrip("role=textfield && below(text=Email) @nth=1");
        assert_eq!(sel.pick, Pick::Nth(1));
        match &sel.alternatives[0] {
            Predicate::And(items) => assert!(matches!(
                items[1],
                Predicate::Relative {
                    relation: Relation::Below,
                    ..
                }
            )),
            other => panic!("unexpected {other:?}"),
        }

        roundtrip("role=row && has(text=\"Total\")");
        roundtrip("near(id=avatar) && role=button");
    }

    #[test]
    fn grouping_survives_round_trip() {
        roundtrip("(role=list && visible=true) && text=A");
        roundtrip("id=a >> (id=b >> id=c)");
        roundtrip("id=a >> id=b >> id=c");
        roundtrip("(id=a >> id=b) && role=button");
    }

    #[test]
    fn escapes_in_quoted_values() {
        let sel = roundtrip(r#"text="a \"quoted\" \\ value""#);
        assert_eq!(
            sel.alternatives[0],
            Predicate::text(r#"a "quoted" \ value"#)
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_selector("  "), Err(SelectorParseError::Empty));
        assert!(matches!(
            parse_selector("colour=red"),
            Err(SelectorParseError::UnknownKey(_))
        ));
        assert!(matches!(
            parse_selector("id~=log"),
            Err(SelectorParseError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            parse_selector("visible=maybe"),
            Err(SelectorParseError::InvalidBool { .. })
        ));
        assert!(matches!(
            parse_selector("text=\"open"),
            Err(SelectorParseError::UnterminatedString(5))
        ));
        assert!(matches!(
            parse_selector("id=a & id=b"),
            Err(SelectorParseError::UnexpectedChar { found: '&', .. })
        ));
        assert!(matches!(
            parse_selector("id=a @nth=x"),
            Err(SelectorParseError::InvalidPick(_))
        ));
        assert!(matches!(
            parse_selector("id=a )"),
            Err(SelectorParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_selector("has(id=a"),
            Err(SelectorParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn variable_placeholders_are_bare_words() {
        let sel = roundtrip("text=${username}");
        assert_eq!(sel.alternatives[0], Predicate::text("${username}"));
    }
}
