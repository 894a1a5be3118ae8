//! Adjacent string-literal concatenation, as per the C spec.

use crate::lexer;
use crate::token::{StrKind, Token, TokenKind};
use crate::{Error, Result};

fn str_kind(tok: &Token) -> StrKind {
    match tok.kind {
        TokenKind::Str { kind, .. } => kind,
        _ => StrKind::Narrow,
    }
}

/// Merges every run of adjacent string literals into a single literal.
///
/// A run containing a wide (or UTF-16/32) literal first upgrades its narrow
/// members to the wider base type; two distinct non-narrow kinds in one run
/// cannot be concatenated.
pub(crate) fn join_adjacent_string_literals(mut tokens: Vec<Token>) -> Result<Vec<Token>> {
    widen_adjacent(&mut tokens)?;

    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(mut tok) = iter.next() {
        if !tok.is_str() || !iter.peek().map_or(false, |t| t.is_str()) {
            out.push(tok);
            continue;
        }
        if let TokenKind::Str {
            mut kind,
            mut bytes,
            elem_size,
        } = tok.kind.clone()
        {
            // Drop the terminator, splice the followers in, terminate once.
            bytes.truncate(bytes.len() - elem_size);
            while iter.peek().map_or(false, |t| t.is_str()) {
                if let Some(Token {
                    kind:
                        TokenKind::Str {
                            kind: next_kind,
                            bytes: next_bytes,
                            elem_size: next_elem,
                        },
                    ..
                }) = iter.next()
                {
                    if next_kind != StrKind::Narrow {
                        kind = next_kind;
                    }
                    bytes.extend_from_slice(&next_bytes[..next_bytes.len() - next_elem]);
                }
            }
            bytes.extend(std::iter::repeat(0).take(elem_size));
            tok.kind = TokenKind::Str {
                kind,
                bytes,
                elem_size,
            };
        }
        out.push(tok);
    }
    Ok(out)
}

fn widen_adjacent(tokens: &mut Vec<Token>) -> Result<()> {
    let mut i = 0;
    while i < tokens.len() {
        if !tokens[i].is_str() || !tokens.get(i + 1).map_or(false, |t| t.is_str()) {
            i += 1;
            continue;
        }

        let mut j = i;
        let mut run_kind = StrKind::Narrow;
        while j < tokens.len() && tokens[j].is_str() {
            let kind = str_kind(&tokens[j]);
            if run_kind == StrKind::Narrow {
                run_kind = kind;
            } else if kind != StrKind::Narrow && kind != run_kind {
                return Err(Error::IncompatibleStringConcat {
                    loc: tokens[j].loc(),
                });
            }
            j += 1;
        }

        if run_kind.elem_size() > 1 {
            for tok in &mut tokens[i..j] {
                if str_kind(tok).elem_size() == 1 {
                    *tok = lexer::tokenize_string_literal(tok, run_kind)?;
                }
            }
        }
        i = j;
    }
    Ok(())
}
