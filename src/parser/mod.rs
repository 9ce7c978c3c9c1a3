pub mod ast;
mod grammar;
mod lexer;

pub use ast::Statement;
pub use lexer::{Keyword, SqlToken};

use chumsky::Parser;

/// Parse a batch of `;`-terminated statements. Any lexer or parser error
/// is flattened to a message for the SQL_SYNTAX band.
pub fn parse(input: &str) -> Result<Vec<Statement>, String> {
    let tokens = lexer::lexer()
        .parse(input)
        .into_result()
        .map_err(|errs| format!("lexer errors: {:?}", errs))?;

    let tokens: Vec<SqlToken> = tokens
        .into_iter()
        .filter(|t| !matches!(t, SqlToken::Comment(_)))
        .collect();

    grammar::parser()
        .parse(tokens.as_slice())
        .into_result()
        .map_err(|errs| format!("parser errors: {:?}", errs))
}
