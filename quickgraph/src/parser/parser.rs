//! Recursive-descent parser over [`Lexer`] tokens, producing [`crate::ast`].
//!
//! Hand-written, trimmed to the selection/variable/fragment grammar this
//! crate's AST needs.

use std::collections::BTreeMap;

use derive_more::{Display, Error as DeriveError};

use super::lexer::{LexError, Lexer, Token};
use crate::ast::*;
use crate::error::Location;

#[derive(Clone, Debug, Display, DeriveError, PartialEq)]
pub enum ParseError {
    #[display("{_0}")]
    Lex(#[error(not(source))] LexError),
    #[display("expected {expected}, found {found:?}")]
    UnexpectedToken { expected: String, found: Token },
    #[display("unexpected end of file")]
    UnexpectedEof,
}

type PResult<T> = Result<T, (ParseError, Location)>;

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<(Token, Location)>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            peeked: None,
        }
    }

    fn advance(&mut self) -> PResult<(Token, Location)> {
        if let Some(t) = self.peeked.take() {
            return Ok(t);
        }
        self.lexer
            .next_token()
            .map_err(|(e, loc)| (ParseError::Lex(e), loc))
    }

    fn peek(&mut self) -> PResult<&(Token, Location)> {
        if self.peeked.is_none() {
            self.peeked = Some(self.advance()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn expect(&mut self, expected: &Token) -> PResult<Location> {
        let (tok, loc) = self.advance()?;
        if &tok == expected {
            Ok(loc)
        } else {
            Err((
                ParseError::UnexpectedToken {
                    expected: format!("{expected:?}"),
                    found: tok,
                },
                loc,
            ))
        }
    }

    fn expect_name(&mut self) -> PResult<(String, Location)> {
        let (tok, loc) = self.advance()?;
        match tok {
            Token::Name(n) => Ok((n, loc)),
            other => Err((
                ParseError::UnexpectedToken {
                    expected: "name".into(),
                    found: other,
                },
                loc,
            )),
        }
    }

    fn at(&mut self, tok: &Token) -> PResult<bool> {
        Ok(&self.peek()?.0 == tok)
    }

    fn document(&mut self) -> PResult<Document> {
        let (first_tok, start) = self.peek()?.clone();

        let mut operation_keyword = None;
        let mut operation_name = None;
        let mut variable_defs = Vec::new();
        let mut fragments = Vec::new();

        if first_tok == Token::CurlyOpen {
            // Shorthand query: `{ ... }`.
            let filter = self.selection_set()?;
            return Ok(Document {
                operation_keyword: None,
                operation_name: None,
                variable_defs: Vec::new(),
                commands: filter_to_commands(filter),
                fragments,
                start_location: start,
            });
        }

        loop {
            let (tok, loc) = self.peek()?.clone();
            match tok {
                Token::Name(ref kw) if kw == "fragment" => {
                    self.advance()?;
                    fragments.push(self.fragment_def()?);
                }
                Token::Name(kw) => {
                    self.advance()?;
                    operation_keyword = Some(Spanning::new(kw, loc));
                    if let Token::Name(_) = self.peek()?.0 {
                        let (name, _) = self.expect_name()?;
                        operation_name = Some(name);
                    }
                    if self.at(&Token::ParenOpen)? {
                        variable_defs = self.variable_defs()?;
                    }
                    let filter = self.selection_set()?;
                    return Ok(Document {
                        operation_keyword,
                        operation_name,
                        variable_defs,
                        commands: filter_to_commands(filter),
                        fragments,
                        start_location: start,
                    });
                }
                Token::Eof => {
                    return Err((ParseError::UnexpectedEof, loc));
                }
                other => {
                    return Err((
                        ParseError::UnexpectedToken {
                            expected: "operation or fragment".into(),
                            found: other,
                        },
                        loc,
                    ));
                }
            }
        }
    }

    fn variable_defs(&mut self) -> PResult<Vec<VariableDef>> {
        self.expect(&Token::ParenOpen)?;
        let mut defs = Vec::new();
        while !self.at(&Token::ParenClose)? {
            let dollar_loc = self.expect(&Token::Dollar)?;
            let (name, _) = self.expect_name()?;
            self.expect(&Token::Colon)?;
            let declared_type = self.type_ref()?;
            let default_value = if self.at(&Token::Equals)? {
                self.advance()?;
                Some(self.value()?)
            } else {
                None
            };
            defs.push(VariableDef {
                name,
                declared_type,
                default_value,
                location: dollar_loc,
            });
        }
        self.expect(&Token::ParenClose)?;
        Ok(defs)
    }

    fn type_ref(&mut self) -> PResult<TypeRef> {
        let (tok, loc) = self.advance()?;
        let mut ty = match tok {
            Token::Name(n) => TypeRef::named(n),
            Token::BracketOpen => {
                let inner = self.type_ref()?;
                self.expect(&Token::BracketClose)?;
                TypeRef::list(inner)
            }
            other => {
                return Err((
                    ParseError::UnexpectedToken {
                        expected: "type".into(),
                        found: other,
                    },
                    loc,
                ))
            }
        };
        if self.at(&Token::Bang)? {
            self.advance()?;
            ty = ty.non_null();
        }
        Ok(ty)
    }

    fn fragment_def(&mut self) -> PResult<FragmentDef> {
        let (name, _) = self.expect_name()?;
        let (on_kw, loc) = self.expect_name()?;
        if on_kw != "on" {
            return Err((
                ParseError::UnexpectedToken {
                    expected: "'on'".into(),
                    found: Token::Name(on_kw),
                },
                loc,
            ));
        }
        let (on_type, _) = self.expect_name()?;
        let filter = self.selection_set()?;
        Ok(FragmentDef { name, on_type, filter })
    }

    fn selection_set(&mut self) -> PResult<ResultFilter> {
        self.expect(&Token::CurlyOpen)?;
        let mut filter = ResultFilter::default();
        while !self.at(&Token::CurlyClose)? {
            if self.at(&Token::Ellipsis)? {
                self.advance()?;
                filter.fragment_spreads.push(self.fragment_spread()?);
            } else {
                filter.fields.push(self.result_field()?);
            }
        }
        self.expect(&Token::CurlyClose)?;
        Ok(filter)
    }

    fn fragment_spread(&mut self) -> PResult<FragmentSpread> {
        let (tok, loc) = self.peek()?.clone();
        if let Token::Name(ref kw) = tok {
            if kw == "on" {
                self.advance()?;
                let (on_type, _) = self.expect_name()?;
                let filter = self.selection_set()?;
                return Ok(FragmentSpread::Inline { on_type, filter });
            }
        }
        let (name, _) = self.expect_name()?;
        Ok(FragmentSpread::Named { name, location: loc })
    }

    fn result_field(&mut self) -> PResult<ResultField> {
        let (first, loc) = self.expect_name()?;
        let (mut name, mut alias) = (first.clone(), None);
        if self.at(&Token::Colon)? {
            self.advance()?;
            let (real_name, _) = self.expect_name()?;
            alias = Some(first);
            name = real_name;
        }
        let params = if self.at(&Token::ParenOpen)? {
            self.params()?
        } else {
            Vec::new()
        };
        let directives = self.directives()?;
        let sub_filter = if self.at(&Token::CurlyOpen)? {
            Some(self.selection_set()?)
        } else {
            None
        };
        Ok(ResultField {
            alias,
            name,
            params,
            directives,
            sub_filter,
            location: loc,
        })
    }

    fn directives(&mut self) -> PResult<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.at(&Token::At)? {
            self.advance()?;
            let (name, _) = self.expect_name()?;
            let params = if self.at(&Token::ParenOpen)? {
                self.params()?
            } else {
                Vec::new()
            };
            directives.push(Directive { name, params });
        }
        Ok(directives)
    }

    fn params(&mut self) -> PResult<Vec<ParamValue>> {
        self.expect(&Token::ParenOpen)?;
        let mut params = Vec::new();
        while !self.at(&Token::ParenClose)? {
            let (name, _) = self.expect_name()?;
            self.expect(&Token::Colon)?;
            let value = self.value()?;
            params.push(ParamValue { name, value });
        }
        self.expect(&Token::ParenClose)?;
        Ok(params)
    }

    fn value(&mut self) -> PResult<Spanning<GenericValue>> {
        let (tok, loc) = self.advance()?;
        let value = match tok {
            Token::Dollar => {
                let (name, _) = self.expect_name()?;
                GenericValue::Variable(name)
            }
            Token::Name(n) if n == "null" => GenericValue::Null,
            Token::Name(n) => GenericValue::Identifier(n),
            Token::Str(s) => GenericValue::String(s),
            Token::Int(i) => GenericValue::Int(i),
            Token::Float(f) => GenericValue::Float(f),
            Token::BracketOpen => {
                let mut items = Vec::new();
                while !self.at(&Token::BracketClose)? {
                    items.push(self.value()?);
                }
                self.expect(&Token::BracketClose)?;
                GenericValue::List(items)
            }
            Token::CurlyOpen => {
                let mut map = BTreeMap::new();
                while !self.at(&Token::CurlyClose)? {
                    let (name, _) = self.expect_name()?;
                    self.expect(&Token::Colon)?;
                    let v = self.value()?;
                    map.insert(name, v);
                }
                self.expect(&Token::CurlyClose)?;
                GenericValue::Map(map)
            }
            other => {
                return Err((
                    ParseError::UnexpectedToken {
                        expected: "value".into(),
                        found: other,
                    },
                    loc,
                ))
            }
        };
        Ok(Spanning::new(value, loc))
    }
}

/// A top-level selection set's fields are the request's root commands.
fn filter_to_commands(filter: ResultFilter) -> Vec<Command> {
    filter
        .fields
        .into_iter()
        .map(|f| Command {
            alias: f.alias,
            name: f.name,
            params: f.params,
            result_filter: f.sub_filter,
            location: f.location,
        })
        .collect()
}

/// Parses a full request string into a [`Document`].
pub fn parse_document(source: &str) -> Result<Document, (ParseError, Location)> {
    Parser::new(source).document()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_query_with_alias_and_args() {
        let doc = parse_document(
            r#"query GetCourses($categories:[String!]){ alias: courses(categories:$categories){ title instructor __typename } }"#,
        )
        .unwrap();
        assert_eq!(doc.operation_keyword.as_ref().unwrap().item, "query");
        assert_eq!(doc.operation_name.as_deref(), Some("GetCourses"));
        assert_eq!(doc.variable_defs.len(), 1);
        assert_eq!(doc.commands.len(), 1);
        let cmd = &doc.commands[0];
        assert_eq!(cmd.alias.as_deref(), Some("alias"));
        assert_eq!(cmd.name, "courses");
        assert_eq!(cmd.params.len(), 1);
        let sub = cmd.result_filter.as_ref().unwrap();
        assert_eq!(sub.fields.len(), 3);
        assert_eq!(sub.fields[2].name, "__typename");
    }

    #[test]
    fn parses_unknown_operation_keyword_without_erroring_at_parse_time() {
        let doc = parse_document("BlahBlah GetCourses { courses { title } }").unwrap();
        assert_eq!(doc.operation_keyword.as_ref().unwrap().item, "BlahBlah");
    }

    #[test]
    fn parses_fragment_spreads() {
        let doc = parse_document(
            "query { courses { ...Details } } fragment Details on Course { title }",
        )
        .unwrap();
        assert_eq!(doc.fragments.len(), 1);
        let sub = doc.commands[0].result_filter.as_ref().unwrap();
        assert_eq!(sub.fragment_spreads.len(), 1);
    }
}
