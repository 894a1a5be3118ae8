//! C source code preprocessor.
//!
//! Takes the raw token stream of a C translation unit and produces a
//! directive-free, fully macro-expanded token stream: object-like and
//! function-like macros with stringification, token pasting, variadics and
//! `__VA_OPT__`; conditional inclusion with constant-expression evaluation;
//! file inclusion with include-guard and `#pragma once` optimization; and
//! the dynamic built-ins such as `__FILE__`, `__LINE__` and `__COUNTER__`.
//!
//! Recursive macros terminate by the hideset discipline: each token carries
//! the set of macro names that may no longer expand it.
//!
//! # Examples
//!
//! ```
//! use c_pp::token::SourceFile;
//! use c_pp::{lexer, Preprocessor};
//!
//! let src = "#define VERSION 2\n#if VERSION >= 2\nint modern;\n#endif\n";
//! let tokens = lexer::tokenize(&SourceFile::new("app.c", 1, src)).unwrap();
//!
//! let mut pp = Preprocessor::new().unwrap();
//! let out = pp.preprocess(tokens).unwrap();
//! let texts: Vec<&str> = out
//!     .iter()
//!     .filter(|t| !t.is_eof())
//!     .map(|t| t.text.as_str())
//!     .collect();
//! assert_eq!(texts, ["int", "modern", ";"]);
//! ```

pub use crate::directive::Directive;
pub use crate::error::Error;
pub use crate::hideset::Hideset;
pub use crate::macros::{Builtin, Macro, MacroKind, MacroTable};
pub use crate::preprocessor::Preprocessor;

pub mod lexer;
pub mod token;

mod directive;
mod error;
mod expr;
mod hideset;
mod macros;
mod preprocessor;
mod strings;
mod token_reader;
mod util;

/// This crate specific `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
