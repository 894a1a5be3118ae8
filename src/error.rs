use std::io;
use std::path::PathBuf;

use colored::Colorize;

use crate::token::{Loc, Token};

/// Possible errors.
///
/// Every preprocessor error is fatal: the first one aborts the run and is
/// reported against the token it was raised for.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A specific token was required.
    #[error("{loc}: expected {expected}, but found '{found}'")]
    UnexpectedToken {
        loc: Loc,
        expected: String,
        found: String,
    },

    /// `#include` not followed by `"..."`, `<...>` or a macro.
    #[error("{loc}: expected a filename")]
    ExpectedFilename { loc: Loc },

    /// `#` at the beginning of a line followed by an unknown directive name.
    #[error("{loc}: invalid preprocessor directive '#{name}'")]
    InvalidDirective { loc: Loc, name: String },

    /// End of input inside a function-like macro invocation.
    #[error("{loc}: premature end of input")]
    PrematureEof { loc: Loc },

    /// `#define`, `#undef` or `defined` applied to a non-identifier.
    #[error("{loc}: macro name must be an identifier")]
    MacroNameNotIdent { loc: Loc },

    /// A macro parameter name was required.
    #[error("{loc}: expected an identifier")]
    ExpectedIdent { loc: Loc },

    /// `#` in a function-like macro body not followed by a parameter.
    #[error("{loc}: '#' is not followed by a macro parameter")]
    StringizeNoParam { loc: Loc },

    #[error("{loc}: '##' cannot appear at start of macro expansion")]
    PasteAtStart { loc: Loc },

    #[error("{loc}: '##' cannot appear at end of macro expansion")]
    PasteAtEnd { loc: Loc },

    /// `##` produced a character sequence that does not lex to one token.
    #[error("{loc}: pasting forms '{text}', an invalid token")]
    InvalidPaste { loc: Loc, text: String },

    #[error("{loc}: too many arguments")]
    TooManyArgs { loc: Loc },

    /// `#elif`, `#else` or `#endif` without a matching `#if`.
    #[error("{loc}: stray #{name}")]
    StrayDirective { loc: Loc, name: String },

    /// `#if` still open when the input ends.
    #[error("{loc}: unterminated conditional directive")]
    UnterminatedCondIncl { loc: Loc },

    #[error("{loc}: cannot open file: path={path:?}, reason={source}")]
    CannotOpenFile {
        loc: Loc,
        path: PathBuf,
        source: io::Error,
    },

    /// `#if` or `#elif` with nothing to evaluate.
    #[error("{loc}: no expression")]
    NoExpression { loc: Loc },

    /// Leftover tokens after a `#if`/`#elif` expression.
    #[error("{loc}: extra token '{text}'")]
    ExtraToken { loc: Loc, text: String },

    #[error("{loc}: division by zero in preprocessor expression")]
    DivisionByZero { loc: Loc },

    /// `#line` (or a GNU line marker) whose payload is not an integer.
    #[error("{loc}: invalid line marker")]
    InvalidLineMarker { loc: Loc },

    /// Adjacent string literals of two distinct wide kinds.
    #[error("{loc}: unsupported non-standard concatenation of string literals")]
    IncompatibleStringConcat { loc: Loc },

    /// A `#error` directive was reached.
    #[error("{loc}: #error{message}")]
    ErrorDirective { loc: Loc, message: String },

    /// A pp-number that does not form a valid numeric constant.
    #[error("{loc}: invalid numeric constant '{text}'")]
    InvalidNumber { loc: Loc, text: String },

    #[error("{loc}: unclosed string literal")]
    UnterminatedString { loc: Loc },

    #[error("{loc}: unclosed character constant")]
    UnterminatedChar { loc: Loc },

    #[error("{loc}: unclosed block comment")]
    UnterminatedComment { loc: Loc },

    /// A character the lexer cannot start a token with.
    #[error("{loc}: invalid token '{text}'")]
    InvalidToken { loc: Loc, text: String },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn unexpected_token(tok: &Token, expected: &str) -> Self {
        Self::UnexpectedToken {
            loc: tok.loc(),
            expected: expected.to_owned(),
            found: tok.text.clone(),
        }
    }

    pub(crate) fn expected_filename(tok: &Token) -> Self {
        Self::ExpectedFilename { loc: tok.loc() }
    }

    pub(crate) fn invalid_directive(tok: &Token) -> Self {
        Self::InvalidDirective {
            loc: tok.loc(),
            name: tok.text.clone(),
        }
    }

    pub(crate) fn premature_eof(tok: &Token) -> Self {
        Self::PrematureEof { loc: tok.loc() }
    }

    pub(crate) fn macro_name_not_ident(tok: &Token) -> Self {
        Self::MacroNameNotIdent { loc: tok.loc() }
    }

    pub(crate) fn expected_ident(tok: &Token) -> Self {
        Self::ExpectedIdent { loc: tok.loc() }
    }

    pub(crate) fn stringize_no_param(tok: &Token) -> Self {
        Self::StringizeNoParam { loc: tok.loc() }
    }

    pub(crate) fn invalid_paste(tok: &Token, text: String) -> Self {
        Self::InvalidPaste {
            loc: tok.loc(),
            text,
        }
    }

    pub(crate) fn too_many_args(tok: &Token) -> Self {
        Self::TooManyArgs { loc: tok.loc() }
    }

    pub(crate) fn stray_directive(tok: &Token, name: &str) -> Self {
        Self::StrayDirective {
            loc: tok.loc(),
            name: name.to_owned(),
        }
    }

    pub(crate) fn cannot_open_file(tok: &Token, path: PathBuf, source: io::Error) -> Self {
        Self::CannotOpenFile {
            loc: tok.loc(),
            path,
            source,
        }
    }

    pub(crate) fn extra_token(tok: &Token) -> Self {
        Self::ExtraToken {
            loc: tok.loc(),
            text: tok.text.clone(),
        }
    }

    pub(crate) fn invalid_number(tok: &Token) -> Self {
        Self::InvalidNumber {
            loc: tok.loc(),
            text: tok.text.clone(),
        }
    }
}

/// Reports a non-fatal diagnostic against `tok` on stderr.
///
/// The only warning class the preprocessor emits is "extra token": junk
/// after an otherwise well-formed directive on the same line.
pub(crate) fn warn_tok(tok: &Token, message: &str) {
    eprintln!(
        "{}: {}: {} '{}'",
        "warning".yellow().bold(),
        tok.loc(),
        message,
        tok.text
    );
}
