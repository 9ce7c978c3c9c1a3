use chumsky::{prelude::*, regex::regex, text::ascii::ident};

use crate::condition::CompOp;

/// SQL keywords, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Create,
    Table,
    Tables,
    Drop,
    Show,
    Desc,
    Index,
    On,
    Insert,
    Into,
    Values,
    Select,
    From,
    Where,
    And,
    Group,
    Order,
    By,
    Asc,
    Limit,
    Offset,
    Update,
    Set,
    Delete,
    Begin,
    Commit,
    Rollback,
    Sync,
    Load,
    Data,
    Infile,
    Fields,
    Terminated,
    Help,
    Exit,
    Null,
    Not,
    Is,
    In,
    Nullable,
    Int,
    Float,
    Char,
    Date,
    Count,
    Avg,
    Max,
    Min,
    Sum,
}

fn keyword_of(word: &str) -> Option<Keyword> {
    let upper = word.to_ascii_uppercase();
    Some(match upper.as_str() {
        "CREATE" => Keyword::Create,
        "TABLE" => Keyword::Table,
        "TABLES" => Keyword::Tables,
        "DROP" => Keyword::Drop,
        "SHOW" => Keyword::Show,
        "DESC" => Keyword::Desc,
        "INDEX" => Keyword::Index,
        "ON" => Keyword::On,
        "INSERT" => Keyword::Insert,
        "INTO" => Keyword::Into,
        "VALUES" => Keyword::Values,
        "SELECT" => Keyword::Select,
        "FROM" => Keyword::From,
        "WHERE" => Keyword::Where,
        "AND" => Keyword::And,
        "GROUP" => Keyword::Group,
        "ORDER" => Keyword::Order,
        "BY" => Keyword::By,
        "ASC" => Keyword::Asc,
        "LIMIT" => Keyword::Limit,
        "OFFSET" => Keyword::Offset,
        "UPDATE" => Keyword::Update,
        "SET" => Keyword::Set,
        "DELETE" => Keyword::Delete,
        "BEGIN" => Keyword::Begin,
        "COMMIT" => Keyword::Commit,
        "ROLLBACK" => Keyword::Rollback,
        "SYNC" => Keyword::Sync,
        "LOAD" => Keyword::Load,
        "DATA" => Keyword::Data,
        "INFILE" => Keyword::Infile,
        "FIELDS" => Keyword::Fields,
        "TERMINATED" => Keyword::Terminated,
        "HELP" => Keyword::Help,
        "EXIT" => Keyword::Exit,
        "NULL" => Keyword::Null,
        "NOT" => Keyword::Not,
        "IS" => Keyword::Is,
        "IN" => Keyword::In,
        "NULLABLE" => Keyword::Nullable,
        "INT" => Keyword::Int,
        "FLOAT" => Keyword::Float,
        "CHAR" => Keyword::Char,
        "DATE" => Keyword::Date,
        "COUNT" => Keyword::Count,
        "AVG" => Keyword::Avg,
        "MAX" => Keyword::Max,
        "MIN" => Keyword::Min,
        "SUM" => Keyword::Sum,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlToken<'a> {
    Keyword(Keyword),
    Identifier(&'a str),
    Integer(i64),
    Float(f64),
    String(&'a str),
    Op(CompOp),
    Symbol(char),
    Comment(&'a str),
}

pub fn lexer<'a>() -> impl Parser<'a, &'a str, Vec<SqlToken<'a>>, extra::Err<Rich<'a, char>>> {
    let comment = just("--")
        .ignore_then(none_of("\n;").repeated())
        .to_slice()
        .map(SqlToken::Comment)
        .padded();

    let float = regex(r"-?\d+\.\d*")
        .map(|s: &str| SqlToken::Float(s.parse().unwrap_or(0.0)))
        .padded();

    let integer = regex(r"-?\d+")
        .map(|s: &str| SqlToken::Integer(s.parse().unwrap_or(0)))
        .padded();

    // Single- or double-quoted, no embedded quotes of the same kind
    let single_quoted = regex(r"'[^']*'")
        .map(|s: &str| SqlToken::String(&s[1..s.len() - 1]))
        .padded();
    let double_quoted = regex(r#""[^"]*""#)
        .map(|s: &str| SqlToken::String(&s[1..s.len() - 1]))
        .padded();

    let word = ident()
        .map(|s: &str| match keyword_of(s) {
            Some(kw) => SqlToken::Keyword(kw),
            None => SqlToken::Identifier(s),
        })
        .padded();

    // Two-character operators must come before their one-character prefixes
    let op = choice((
        just("<=").to(SqlToken::Op(CompOp::Le)),
        just(">=").to(SqlToken::Op(CompOp::Ge)),
        just("<>").to(SqlToken::Op(CompOp::Ne)),
        just("!=").to(SqlToken::Op(CompOp::Ne)),
        just("=").to(SqlToken::Op(CompOp::Eq)),
        just("<").to(SqlToken::Op(CompOp::Lt)),
        just(">").to(SqlToken::Op(CompOp::Gt)),
    ))
    .padded();

    let symbol = one_of("(),;*.").map(SqlToken::Symbol).padded();

    choice((
        comment,
        float,
        integer,
        single_quoted,
        double_quoted,
        word,
        op,
        symbol,
    ))
    .repeated()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<SqlToken<'_>> {
        lexer().parse(input).unwrap()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let tokens = lex("select SELECT SeLeCt");
        assert!(tokens
            .iter()
            .all(|t| *t == SqlToken::Keyword(Keyword::Select)));
    }

    #[test]
    fn test_keyword_boundary() {
        let tokens = lex("selection");
        assert_eq!(tokens, vec![SqlToken::Identifier("selection")]);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("-123 45.67");
        assert_eq!(tokens[0], SqlToken::Integer(-123));
        assert_eq!(tokens[1], SqlToken::Float(45.67));
    }

    #[test]
    fn test_strings_both_quote_kinds() {
        let tokens = lex(r#"'foo' "bar""#);
        assert_eq!(tokens[0], SqlToken::String("foo"));
        assert_eq!(tokens[1], SqlToken::String("bar"));
    }

    #[test]
    fn test_operators() {
        let tokens = lex("= <> != < > <= >=");
        assert_eq!(
            tokens,
            vec![
                SqlToken::Op(CompOp::Eq),
                SqlToken::Op(CompOp::Ne),
                SqlToken::Op(CompOp::Ne),
                SqlToken::Op(CompOp::Lt),
                SqlToken::Op(CompOp::Gt),
                SqlToken::Op(CompOp::Le),
                SqlToken::Op(CompOp::Ge),
            ]
        );
    }

    #[test]
    fn test_comment() {
        let tokens = lex("-- a comment\nSELECT");
        assert!(matches!(tokens[0], SqlToken::Comment(_)));
        assert_eq!(tokens[1], SqlToken::Keyword(Keyword::Select));
    }
}
