//! Constant-expression evaluation for `#if` and `#elif`.
//!
//! Operates on a prepared, EOF-terminated token line: `defined` has already
//! been resolved, macros expanded, leftover identifiers replaced by `0` and
//! pp-numbers converted. Arithmetic is signed 64-bit with wrapping overflow.

use crate::token::{Token, TokenKind};
use crate::{Error, Result};

/// Evaluates a conditional-expression at the start of `tokens`, returning
/// its value and the index of the first unconsumed token.
pub(crate) fn const_expr(tokens: &[Token]) -> Result<(i64, usize)> {
    let mut parser = Parser { tokens, pos: 0 };
    let val = parser.conditional(true)?;
    Ok((val, parser.pos))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn consume(&mut self, text: &str) -> bool {
        if self.peek().is(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<()> {
        if self.consume(text) {
            Ok(())
        } else {
            Err(Error::unexpected_token(
                self.peek(),
                &format!("'{}'", text),
            ))
        }
    }

    // The `live` flag implements C's lazy contexts: the unselected branch of
    // `?:` and the short-circuited operand of `&&`/`||` are parsed but must
    // not raise evaluation errors.
    fn conditional(&mut self, live: bool) -> Result<i64> {
        let cond = self.logical_or(live)?;
        if !self.consume("?") {
            return Ok(cond);
        }
        let then = self.conditional(live && cond != 0)?;
        self.expect(":")?;
        let other = self.conditional(live && cond == 0)?;
        Ok(if cond != 0 { then } else { other })
    }

    fn logical_or(&mut self, live: bool) -> Result<i64> {
        let mut val = self.logical_and(live)?;
        while self.consume("||") {
            let rhs = self.logical_and(live && val == 0)?;
            val = (val != 0 || rhs != 0) as i64;
        }
        Ok(val)
    }

    fn logical_and(&mut self, live: bool) -> Result<i64> {
        let mut val = self.bit_or(live)?;
        while self.consume("&&") {
            let rhs = self.bit_or(live && val != 0)?;
            val = (val != 0 && rhs != 0) as i64;
        }
        Ok(val)
    }

    fn bit_or(&mut self, live: bool) -> Result<i64> {
        let mut val = self.bit_xor(live)?;
        while self.consume("|") {
            val |= self.bit_xor(live)?;
        }
        Ok(val)
    }

    fn bit_xor(&mut self, live: bool) -> Result<i64> {
        let mut val = self.bit_and(live)?;
        while self.consume("^") {
            val ^= self.bit_and(live)?;
        }
        Ok(val)
    }

    fn bit_and(&mut self, live: bool) -> Result<i64> {
        let mut val = self.equality(live)?;
        while self.consume("&") {
            val &= self.equality(live)?;
        }
        Ok(val)
    }

    fn equality(&mut self, live: bool) -> Result<i64> {
        let mut val = self.relational(live)?;
        loop {
            if self.consume("==") {
                val = (val == self.relational(live)?) as i64;
            } else if self.consume("!=") {
                val = (val != self.relational(live)?) as i64;
            } else {
                return Ok(val);
            }
        }
    }

    fn relational(&mut self, live: bool) -> Result<i64> {
        let mut val = self.shift(live)?;
        loop {
            if self.consume("<=") {
                val = (val <= self.shift(live)?) as i64;
            } else if self.consume(">=") {
                val = (val >= self.shift(live)?) as i64;
            } else if self.consume("<") {
                val = (val < self.shift(live)?) as i64;
            } else if self.consume(">") {
                val = (val > self.shift(live)?) as i64;
            } else {
                return Ok(val);
            }
        }
    }

    fn shift(&mut self, live: bool) -> Result<i64> {
        let mut val = self.additive(live)?;
        loop {
            if self.consume("<<") {
                val = val.wrapping_shl(self.additive(live)? as u32);
            } else if self.consume(">>") {
                val = val.wrapping_shr(self.additive(live)? as u32);
            } else {
                return Ok(val);
            }
        }
    }

    fn additive(&mut self, live: bool) -> Result<i64> {
        let mut val = self.multiplicative(live)?;
        loop {
            if self.consume("+") {
                val = val.wrapping_add(self.multiplicative(live)?);
            } else if self.consume("-") {
                val = val.wrapping_sub(self.multiplicative(live)?);
            } else {
                return Ok(val);
            }
        }
    }

    fn multiplicative(&mut self, live: bool) -> Result<i64> {
        let mut val = self.unary(live)?;
        loop {
            let op = self.peek().clone();
            if self.consume("*") {
                val = val.wrapping_mul(self.unary(live)?);
            } else if self.consume("/") {
                let rhs = self.unary(live)?;
                check_divisor(rhs, &op, live)?;
                val = if rhs == 0 { 0 } else { val.wrapping_div(rhs) };
            } else if self.consume("%") {
                let rhs = self.unary(live)?;
                check_divisor(rhs, &op, live)?;
                val = if rhs == 0 { 0 } else { val.wrapping_rem(rhs) };
            } else {
                return Ok(val);
            }
        }
    }

    fn unary(&mut self, live: bool) -> Result<i64> {
        if self.consume("+") {
            return self.unary(live);
        }
        if self.consume("-") {
            return Ok(self.unary(live)?.wrapping_neg());
        }
        if self.consume("!") {
            return Ok((self.unary(live)? == 0) as i64);
        }
        if self.consume("~") {
            return Ok(!self.unary(live)?);
        }
        self.primary(live)
    }

    fn primary(&mut self, live: bool) -> Result<i64> {
        if self.consume("(") {
            let val = self.conditional(live)?;
            self.expect(")")?;
            return Ok(val);
        }
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Num { val, is_float, .. } if !is_float => {
                self.pos += 1;
                Ok(val)
            }
            TokenKind::Char { val } => {
                self.pos += 1;
                Ok(val)
            }
            _ => Err(Error::unexpected_token(&tok, "an integer constant")),
        }
    }
}

fn check_divisor(rhs: i64, op: &Token, live: bool) -> Result<()> {
    if rhs == 0 && live {
        return Err(Error::DivisionByZero { loc: op.loc() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::const_expr;
    use crate::lexer::{convert_pp_tokens, tokenize};
    use crate::token::SourceFile;
    use crate::Error;

    fn eval(src: &str) -> crate::Result<i64> {
        let mut toks = tokenize(&SourceFile::new("expr.c", 1, src))?;
        convert_pp_tokens(&mut toks)?;
        let (val, rest) = const_expr(&toks)?;
        assert!(toks[rest].is_eof(), "unconsumed tokens in {:?}", src);
        Ok(val)
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("1+2*3").unwrap(), 7);
        assert_eq!(eval("(1+2)*3").unwrap(), 9);
        assert_eq!(eval("1<<3|1").unwrap(), 9);
        assert_eq!(eval("7&3^1").unwrap(), 2);
        assert_eq!(eval("10-4-3").unwrap(), 3);
        assert_eq!(eval("2+3==5").unwrap(), 1);
        assert_eq!(eval("1<2>=1").unwrap(), 1);
    }

    #[test]
    fn unary_and_ternary() {
        assert_eq!(eval("-2*-3").unwrap(), 6);
        assert_eq!(eval("!5").unwrap(), 0);
        assert_eq!(eval("~0").unwrap(), -1);
        assert_eq!(eval("1 ? 2 : 3").unwrap(), 2);
        assert_eq!(eval("0 ? 2 : 3").unwrap(), 3);
    }

    #[test]
    fn char_constants() {
        assert_eq!(eval("'A'").unwrap(), 65);
        assert_eq!(eval("'\\n'").unwrap(), 10);
    }

    #[test]
    fn division_by_zero_is_lazy() {
        assert_eq!(eval("0 && 1/0").unwrap(), 0);
        assert_eq!(eval("1 || 1/0").unwrap(), 1);
        assert_eq!(eval("1 ? 2 : 1/0").unwrap(), 2);
        assert_eq!(eval("0 ? 1%0 : 3").unwrap(), 3);
        assert!(matches!(eval("1/0"), Err(Error::DivisionByZero { .. })));
    }
}
