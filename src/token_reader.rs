//! The token stream the directive processor walks.
//!
//! Macro expansion output and included files are spliced at the front of the
//! stream, so the driver naturally rescans what it just spliced. The final
//! EOF token is sticky: reading it leaves it in place, which lets callers
//! peek and read near the end of input without an `Option` dance.

use std::collections::VecDeque;

use crate::error::warn_tok;
use crate::token::{new_eof, Token};
use crate::{Error, Result};

#[derive(Debug)]
pub(crate) struct TokenReader {
    tokens: VecDeque<Token>,
}

impl TokenReader {
    /// `tokens` must be EOF-terminated, as all lexer output is.
    pub fn new(tokens: Vec<Token>) -> TokenReader {
        TokenReader {
            tokens: tokens.into(),
        }
    }

    pub fn peek(&self) -> &Token {
        self.tokens.front().expect("unreachable")
    }

    /// Lookahead; saturates at the EOF sentinel.
    pub fn peek_at(&self, n: usize) -> &Token {
        self.tokens
            .get(n)
            .unwrap_or_else(|| self.tokens.back().expect("unreachable"))
    }

    pub fn front_mut(&mut self) -> &mut Token {
        self.tokens.front_mut().expect("unreachable")
    }

    pub fn read(&mut self) -> Token {
        let tok = self.tokens.pop_front().expect("unreachable");
        if tok.is_eof() {
            self.tokens.push_front(tok.clone());
        }
        tok
    }

    pub fn unread(&mut self, tok: Token) {
        self.tokens.push_front(tok);
    }

    /// Prepends `tokens`, dropping their EOF sentinel. The next `read` sees
    /// the first spliced token.
    pub fn splice(&mut self, mut tokens: Vec<Token>) {
        if tokens.last().map_or(false, Token::is_eof) {
            tokens.pop();
        }
        for tok in tokens.into_iter().rev() {
            self.tokens.push_front(tok);
        }
    }

    /// Reads one token, requiring its lexeme to be `text`.
    pub fn expect(&mut self, text: &str) -> Result<Token> {
        let tok = self.read();
        if tok.is(text) {
            Ok(tok)
        } else {
            Err(Error::unexpected_token(&tok, &format!("'{}'", text)))
        }
    }

    /// Reads one token if its lexeme is `text`.
    pub fn consume(&mut self, text: &str) -> bool {
        if self.peek().is(text) {
            self.read();
            true
        } else {
            false
        }
    }

    /// Copies the rest of the current logical line, EOF-terminated; the
    /// reader is left at the next beginning-of-line token.
    pub fn copy_line(&mut self) -> Vec<Token> {
        let mut line = Vec::new();
        while !self.peek().at_bol && !self.peek().is_eof() {
            line.push(self.read());
        }
        line.push(new_eof(self.peek()));
        line
    }

    /// Advances to the next beginning-of-line token, warning once if any
    /// tokens had to be discarded.
    pub fn skip_line(&mut self) {
        if self.peek().at_bol {
            return;
        }
        warn_tok(self.peek(), "extra token");
        while !self.peek().at_bol && !self.peek().is_eof() {
            self.read();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TokenReader;
    use crate::lexer::tokenize;
    use crate::token::SourceFile;

    fn reader(src: &str) -> TokenReader {
        TokenReader::new(tokenize(&SourceFile::new("test.c", 1, src)).unwrap())
    }

    #[test]
    fn eof_is_sticky() {
        let mut rd = reader("a");
        assert_eq!(rd.read().text, "a");
        assert!(rd.read().is_eof());
        assert!(rd.read().is_eof());
        assert!(rd.peek_at(5).is_eof());
    }

    #[test]
    fn splice_drops_sentinel() {
        let mut rd = reader("x");
        let spliced = tokenize(&SourceFile::new("other.c", 2, "a b")).unwrap();
        rd.splice(spliced);
        assert_eq!(rd.read().text, "a");
        assert_eq!(rd.read().text, "b");
        assert_eq!(rd.read().text, "x");
        assert!(rd.read().is_eof());
    }

    #[test]
    fn copy_line_stops_at_bol() {
        let mut rd = reader("a b\nc");
        let line = rd.copy_line();
        assert_eq!(line.len(), 3);
        assert!(line[2].is_eof());
        assert_eq!(rd.peek().text, "c");
    }
}
