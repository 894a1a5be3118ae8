//! The lexer the preprocessor drives.
//!
//! Produces the raw preprocessing-token stream: identifiers, pp-numbers,
//! character constants, string literals and punctuators, each carrying its
//! beginning-of-line and preceding-whitespace flags. `convert_pp_tokens` is
//! the post-pass that turns pp-numbers into typed numbers and identifiers
//! into keywords once macro expansion is done with them.

use std::path::Path;
use std::rc::Rc;

use crate::hideset::Hideset;
use crate::token::{quote_string, Loc, SourceFile, StrKind, Token, TokenKind};
use crate::util;
use crate::{Error, Result};

/// Multi-character punctuators, longest first.
static PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "...", "==", "!=", "<=", ">=", "->", "+=", "-=", "*=", "/=", "%=", "&=", "|=",
    "^=", "++", "--", "&&", "||", "<<", ">>", "##",
];

static KEYWORDS: &[&str] = &[
    "return", "if", "else", "for", "while", "int", "sizeof", "char", "struct", "union", "short",
    "long", "void", "typedef", "_Bool", "enum", "static", "goto", "break", "continue", "switch",
    "case", "default", "extern", "_Alignof", "_Alignas", "do", "signed", "unsigned", "const",
    "volatile", "auto", "register", "restrict", "__restrict", "__restrict__", "_Noreturn", "float",
    "double", "typeof", "asm", "_Thread_local", "__thread", "_Atomic", "__attribute__",
];

/// Lexes a loaded source buffer into an EOF-terminated token sequence.
pub fn tokenize(file: &Rc<SourceFile>) -> Result<Vec<Token>> {
    Lexer::new(file).run()
}

/// Opens, reads and lexes `path`.
pub fn tokenize_file(path: &Path, file_no: usize) -> Result<Vec<Token>> {
    let contents = util::read_file(path)?;
    let file = SourceFile::new(&path.to_string_lossy(), file_no, &contents);
    tokenize(&file)
}

struct Lexer<'a> {
    file: &'a Rc<SourceFile>,
    src: &'a str,
    pos: usize,
    line: i64,
    at_bol: bool,
    has_space: bool,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a Rc<SourceFile>) -> Lexer<'a> {
        Lexer {
            file,
            src: &file.contents,
            pos: 0,
            line: 1,
            at_bol: true,
            has_space: false,
        }
    }

    fn loc(&self) -> Loc {
        Loc {
            file: self.file.display_name(),
            line: self.line,
        }
    }

    fn byte(&self, off: usize) -> u8 {
        *self.src.as_bytes().get(self.pos + off).unwrap_or(&0)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while self.pos < self.src.len() {
            // Line comment.
            if self.starts_with("//") {
                while self.pos < self.src.len() && self.byte(0) != b'\n' {
                    self.pos += 1;
                }
                self.has_space = true;
                continue;
            }

            // Block comment; counts as whitespace, not as a line break.
            if self.starts_with("/*") {
                let rest = &self.src[self.pos + 2..];
                let end = rest
                    .find("*/")
                    .ok_or_else(|| Error::UnterminatedComment { loc: self.loc() })?;
                self.line += rest[..end].matches('\n').count() as i64;
                self.pos += end + 4;
                self.has_space = true;
                continue;
            }

            match self.byte(0) {
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.at_bol = true;
                    self.has_space = false;
                }
                b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c' => {
                    self.pos += 1;
                    self.has_space = true;
                }
                // Line splice: the next line continues the current logical line.
                b'\\' if self.byte(1) == b'\n' => {
                    self.pos += 2;
                    self.line += 1;
                }
                b'\\' if self.byte(1) == b'\r' && self.byte(2) == b'\n' => {
                    self.pos += 3;
                    self.line += 1;
                }
                _ => {
                    let tok = self.read_token()?;
                    out.push(tok);
                }
            }
        }

        out.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            at_bol: true,
            has_space: self.has_space,
            line_no: self.line,
            line_delta: 0,
            file: Rc::clone(self.file),
            display_file: None,
            hideset: Hideset::new(),
            origin: None,
        });
        Ok(out)
    }

    fn read_token(&mut self) -> Result<Token> {
        let start = self.pos;
        let line = self.line;
        let kind = self.read_token_kind()?;
        let tok = Token {
            kind,
            text: self.src[start..self.pos].to_owned(),
            at_bol: self.at_bol,
            has_space: self.has_space,
            line_no: line,
            line_delta: 0,
            file: Rc::clone(self.file),
            display_file: None,
            hideset: Hideset::new(),
            origin: None,
        };
        self.at_bol = false;
        self.has_space = false;
        Ok(tok)
    }

    fn read_token_kind(&mut self) -> Result<TokenKind> {
        let c = self.byte(0);

        // String literals, with optional encoding prefix.
        for &(prefix, kind) in &[
            ("u8\"", StrKind::Utf8),
            ("u\"", StrKind::Utf16),
            ("U\"", StrKind::Utf32),
            ("L\"", StrKind::Wide),
            ("\"", StrKind::Narrow),
        ] {
            if self.starts_with(prefix) {
                self.pos += prefix.len() - 1;
                return self.read_string_literal(kind);
            }
        }

        // Character constants, with optional encoding prefix.
        for &(prefix, wide) in &[("u'", true), ("U'", true), ("L'", true), ("'", false)] {
            if self.starts_with(prefix) {
                self.pos += prefix.len() - 1;
                return self.read_char_literal(wide);
            }
        }

        // Preprocessing numbers: digits, or '.' followed by a digit.
        if c.is_ascii_digit() || (c == b'.' && self.byte(1).is_ascii_digit()) {
            self.read_pp_number();
            return Ok(TokenKind::PpNum);
        }

        // Identifiers.
        if c == b'_' || c.is_ascii_alphabetic() {
            loop {
                let b = self.byte(0);
                if b != b'_' && !b.is_ascii_alphanumeric() {
                    break;
                }
                self.pos += 1;
            }
            return Ok(TokenKind::Ident);
        }

        // Punctuators, longest match first.
        for &p in PUNCTUATORS {
            if self.starts_with(p) {
                self.pos += p.len();
                return Ok(TokenKind::Punct);
            }
        }
        if b"+-*/%&|^!<>=~?:;,.()[]{}#".contains(&c) {
            self.pos += 1;
            return Ok(TokenKind::Punct);
        }

        let text = self.src[self.pos..].chars().take(1).collect();
        Err(Error::InvalidToken {
            loc: self.loc(),
            text,
        })
    }

    fn read_pp_number(&mut self) {
        loop {
            let b = self.byte(0);
            if matches!(b, b'e' | b'E' | b'p' | b'P') && matches!(self.byte(1), b'+' | b'-') {
                self.pos += 2;
            } else if b == b'.' || b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn read_string_literal(&mut self, kind: StrKind) -> Result<TokenKind> {
        let elem_size = kind.elem_size();
        let mut bytes = Vec::new();
        self.pos += 1; // opening quote
        loop {
            match self.byte(0) {
                0 | b'\n' => return Err(Error::UnterminatedString { loc: self.loc() }),
                b'"' => {
                    self.pos += 1;
                    break;
                }
                b'\\' => {
                    self.pos += 1;
                    let val = self.read_escaped_char()?;
                    push_elem(&mut bytes, elem_size, val);
                }
                _ => {
                    let c = self.next_char();
                    push_char(&mut bytes, kind, c);
                }
            }
        }
        bytes.extend(std::iter::repeat(0).take(elem_size)); // terminating NUL
        Ok(TokenKind::Str {
            kind,
            bytes,
            elem_size,
        })
    }

    fn read_char_literal(&mut self, wide: bool) -> Result<TokenKind> {
        self.pos += 1; // opening quote
        let val = match self.byte(0) {
            0 | b'\n' => return Err(Error::UnterminatedChar { loc: self.loc() }),
            b'\\' => {
                self.pos += 1;
                self.read_escaped_char()?
            }
            _ => self.next_char() as u32,
        };
        // Scan for the closing quote; extra characters do not contribute to
        // the value.
        loop {
            match self.byte(0) {
                0 | b'\n' => return Err(Error::UnterminatedChar { loc: self.loc() }),
                b'\'' => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    self.next_char();
                }
            }
        }
        let val = if wide {
            val as i64
        } else {
            (val as u8) as i8 as i64
        };
        Ok(TokenKind::Char { val })
    }

    fn next_char(&mut self) -> char {
        let c = self.src[self.pos..].chars().next().unwrap_or('\0');
        self.pos += c.len_utf8();
        c
    }

    fn read_escaped_char(&mut self) -> Result<u32> {
        let b = self.byte(0);
        if (b'0'..=b'7').contains(&b) {
            let mut val = 0u32;
            for _ in 0..3 {
                let d = self.byte(0);
                if !(b'0'..=b'7').contains(&d) {
                    break;
                }
                val = val * 8 + u32::from(d - b'0');
                self.pos += 1;
            }
            return Ok(val);
        }
        if b == b'x' {
            self.pos += 1;
            if !self.byte(0).is_ascii_hexdigit() {
                return Err(Error::InvalidToken {
                    loc: self.loc(),
                    text: "\\x".to_owned(),
                });
            }
            let mut val = 0u32;
            while self.byte(0).is_ascii_hexdigit() {
                let d = char::from(self.byte(0)).to_digit(16).unwrap_or(0);
                val = val.wrapping_mul(16).wrapping_add(d);
                self.pos += 1;
            }
            return Ok(val);
        }
        let c = self.next_char();
        Ok(match c {
            'a' => 7,
            'b' => 8,
            't' => 9,
            'n' => 10,
            'v' => 11,
            'f' => 12,
            'r' => 13,
            // [GNU] \e for the ASCII escape character.
            'e' => 27,
            _ => c as u32,
        })
    }
}

fn push_elem(bytes: &mut Vec<u8>, elem_size: usize, val: u32) {
    match elem_size {
        1 => bytes.push(val as u8),
        2 => bytes.extend_from_slice(&(val as u16).to_le_bytes()),
        _ => bytes.extend_from_slice(&val.to_le_bytes()),
    }
}

fn push_char(bytes: &mut Vec<u8>, kind: StrKind, c: char) {
    match kind {
        StrKind::Narrow | StrKind::Utf8 => {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        StrKind::Utf16 => {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                bytes.extend_from_slice(&unit.to_le_bytes());
            }
        }
        StrKind::Utf32 | StrKind::Wide => bytes.extend_from_slice(&(c as u32).to_le_bytes()),
    }
}

/// Reclassifies identifiers that are C keywords and converts pp-numbers into
/// typed numeric tokens. Run after macro expansion, before parsing.
pub fn convert_pp_tokens(tokens: &mut [Token]) -> Result<()> {
    for tok in tokens.iter_mut() {
        if tok.is_ident() && KEYWORDS.contains(&tok.text.as_str()) {
            tok.kind = TokenKind::Keyword;
        } else if tok.kind == TokenKind::PpNum {
            tok.kind = parse_number(tok)?;
        }
    }
    Ok(())
}

fn parse_number(tok: &Token) -> Result<TokenKind> {
    let lower = tok.text.to_ascii_lowercase();
    let is_hex = lower.starts_with("0x");
    let is_float = if is_hex {
        lower.contains('p')
    } else {
        lower.contains('.') || lower.contains('e')
    };

    if is_float {
        if is_hex {
            // Hexadecimal floats never occur in directives.
            return Err(Error::invalid_number(tok));
        }
        let digits = lower.trim_end_matches(|c| matches!(c, 'f' | 'l'));
        let fval: f64 = digits.parse().map_err(|_| Error::invalid_number(tok))?;
        return Ok(TokenKind::Num {
            val: 0,
            fval,
            is_float: true,
        });
    }

    let digits = lower.trim_end_matches(|c| c == 'u' || c == 'l');
    let (digits, radix) = if let Some(rest) = digits.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = digits.strip_prefix("0b") {
        (rest, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };
    let val = u64::from_str_radix(digits, radix).map_err(|_| Error::invalid_number(tok))? as i64;
    Ok(TokenKind::Num {
        val,
        fval: 0.0,
        is_float: false,
    })
}

/// Lexes `buf` against `tmpl`'s source file, for synthesized tokens.
pub(crate) fn relex(buf: &str, tmpl: &Token) -> Result<Vec<Token>> {
    let file = SourceFile::new(&tmpl.file.name, tmpl.file.file_no, buf);
    tokenize(&file)
}

fn synthesized(mut tok: Token, tmpl: &Token) -> Token {
    tok.at_bol = false;
    tok.has_space = tmpl.has_space;
    tok.line_no = tmpl.line_no;
    tok
}

/// A single string-literal token holding `s`, with `tmpl`'s provenance.
pub(crate) fn new_str_token(s: &str, tmpl: &Token) -> Result<Token> {
    let mut toks = relex(&quote_string(s), tmpl)?;
    Ok(synthesized(toks.swap_remove(0), tmpl))
}

/// A single numeric token holding `val`, with `tmpl`'s provenance.
pub(crate) fn new_num_token(val: i64, tmpl: &Token) -> Result<Token> {
    let mut toks = relex(&format!("{}\n", val), tmpl)?;
    Ok(synthesized(toks.swap_remove(0), tmpl))
}

/// Re-lexes one string literal with a different base character type. Used
/// when adjacent literals of mixed width are concatenated.
pub(crate) fn tokenize_string_literal(tok: &Token, kind: StrKind) -> Result<Token> {
    let body = &tok.text[tok.text.find('"').unwrap_or(0)..];
    let prefix = match kind {
        StrKind::Narrow => "",
        StrKind::Utf8 => "u8",
        StrKind::Utf16 => "u",
        StrKind::Utf32 => "U",
        StrKind::Wide => "L",
    };
    let mut toks = relex(&format!("{}{}", prefix, body), tok)?;
    let mut new = toks.swap_remove(0);
    new.text = tok.text.clone();
    new.at_bol = tok.at_bol;
    new.has_space = tok.has_space;
    new.line_no = tok.line_no;
    Ok(new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        tokenize(&SourceFile::new("test.c", 1, src)).unwrap()
    }

    fn texts(src: &str) -> Vec<String> {
        lex(src)
            .into_iter()
            .filter(|t| !t.is_eof())
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn punctuators_longest_match() {
        assert_eq!(texts("a<<=b"), ["a", "<<=", "b"]);
        assert_eq!(texts("x##y"), ["x", "##", "y"]);
        assert_eq!(texts("f(a,...)"), ["f", "(", "a", ",", "...", ")"]);
    }

    #[test]
    fn bol_and_space_flags() {
        let toks = lex("a b\nc");
        assert!(toks[0].at_bol && !toks[0].has_space);
        assert!(!toks[1].at_bol && toks[1].has_space);
        assert!(toks[2].at_bol);
    }

    #[test]
    fn comments_are_whitespace() {
        let toks = lex("a/*x\ny*/b");
        assert_eq!(toks[1].text, "b");
        assert!(toks[1].has_space);
        assert!(!toks[1].at_bol);
        assert_eq!(toks[1].line_no, 2);
        assert_eq!(texts("a//b\nc"), ["a", "c"]);
    }

    #[test]
    fn line_splice_continues_line() {
        let toks = lex("a\\\nb");
        assert_eq!(toks[1].text, "b");
        assert!(!toks[1].at_bol);
    }

    #[test]
    fn pp_numbers() {
        assert_eq!(texts("1e+5 0x1f .5"), ["1e+5", "0x1f", ".5"]);
        let mut toks = lex("42 0x2a 052 0b101010 1.5 'A'");
        convert_pp_tokens(&mut toks).unwrap();
        let vals: Vec<_> = toks
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Num { val, is_float, .. } if !is_float => Some(val),
                TokenKind::Char { val } => Some(val),
                _ => None,
            })
            .collect();
        assert_eq!(vals, [42, 42, 42, 42, 65]);
        match toks[4].kind {
            TokenKind::Num { fval, is_float, .. } => {
                assert!(is_float);
                assert!((fval - 1.5).abs() < 1e-9);
            }
            _ => panic!("expected a float"),
        }
    }

    #[test]
    fn string_literals() {
        let toks = lex(r#""a\tb" u"x" L"y""#);
        match &toks[0].kind {
            TokenKind::Str {
                kind, bytes, elem_size,
            } => {
                assert_eq!(*kind, StrKind::Narrow);
                assert_eq!(*elem_size, 1);
                assert_eq!(bytes, b"a\tb\0");
            }
            _ => panic!("expected a string"),
        }
        match &toks[1].kind {
            TokenKind::Str { elem_size, .. } => assert_eq!(*elem_size, 2),
            _ => panic!("expected a string"),
        }
        match &toks[2].kind {
            TokenKind::Str { elem_size, .. } => assert_eq!(*elem_size, 4),
            _ => panic!("expected a string"),
        }
    }

    #[test]
    fn keywords_reclassified() {
        let mut toks = lex("int foo");
        convert_pp_tokens(&mut toks).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Keyword);
        assert_eq!(toks[1].kind, TokenKind::Ident);
    }
}
