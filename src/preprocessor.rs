//! C source code [preprocessor][Preprocessor].
//!
//! Transforms the raw token stream of a translation unit into a
//! directive-free, fully macro-expanded token stream ready for parsing.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::directive::Directive;
use crate::expr;
use crate::hideset::{add_hideset, Hideset};
use crate::lexer::{self, convert_pp_tokens, new_num_token, new_str_token, relex};
use crate::macros::{self, find_arg, Builtin, MacroArg, MacroKind, MacroTable};
use crate::strings;
use crate::token::{join_tokens, new_eof, SourceFile, Token, TokenKind};
use crate::token_reader::TokenReader;
use crate::util;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondCtx {
    InThen,
    InElif,
    InElse,
}

/// One open `#if`/`#ifdef`/`#ifndef`.
#[derive(Debug)]
struct CondIncl {
    ctx: CondCtx,
    tok: Token,
    /// Whether any branch of this conditional has been taken.
    included: bool,
}

/// The preprocessor driver.
///
/// All run-scoped state lives here: the macro table, the conditional
/// inclusion stack, the include caches and the search paths. One value
/// preprocesses one translation unit.
///
/// # Examples
///
/// ```
/// use c_pp::token::SourceFile;
/// use c_pp::{lexer, Preprocessor};
///
/// let src = "#define SQUARE(x) ((x) * (x))\nint y = SQUARE(3);\n";
/// let tokens = lexer::tokenize(&SourceFile::new("square.c", 1, src)).unwrap();
///
/// let mut pp = Preprocessor::new().unwrap();
/// let out = pp.preprocess(tokens).unwrap();
/// let texts: Vec<&str> = out
///     .iter()
///     .filter(|t| !t.is_eof())
///     .map(|t| t.text.as_str())
///     .collect();
/// assert_eq!(
///     texts,
///     ["int", "y", "=", "(", "(", "3", ")", "*", "(", "3", ")", ")", ";"]
/// );
/// ```
#[derive(Debug)]
pub struct Preprocessor {
    macros: MacroTable,
    cond_stack: Vec<CondIncl>,
    include_paths: Vec<PathBuf>,
    base_file: String,
    counter: i64,
    next_file_no: usize,
    /// Where `#include_next` resumes the search-path scan.
    include_next_idx: usize,
    pragma_once: HashSet<String>,
    /// Path of an included file to the macro guarding it.
    include_guards: HashMap<String, String>,
    /// Filename to resolved path and the search index one past the hit.
    filename_cache: HashMap<String, (PathBuf, usize)>,
}

impl Preprocessor {
    /// Makes a new `Preprocessor` with the predefined macros installed and
    /// `__DATE__`/`__TIME__` fixed to the current time.
    pub fn new() -> Result<Preprocessor> {
        let mut macros = MacroTable::new();
        macros.install_predefined()?;
        Ok(Preprocessor {
            macros,
            cond_stack: Vec::new(),
            include_paths: Vec::new(),
            base_file: String::new(),
            counter: 0,
            next_file_no: 2,
            include_next_idx: 0,
            pragma_once: HashSet::new(),
            include_guards: HashMap::new(),
            filename_cache: HashMap::new(),
        })
    }

    /// The `#include` search directories, in search order.
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    pub fn include_paths_mut(&mut self) -> &mut Vec<PathBuf> {
        &mut self.include_paths
    }

    /// The current macro definitions.
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn macros_mut(&mut self) -> &mut MacroTable {
        &mut self.macros
    }

    /// Defines an object-like macro, as if by `-D name=source`.
    pub fn define(&mut self, name: &str, source: &str) -> Result<()> {
        self.macros.define(name, source)
    }

    pub fn undef(&mut self, name: &str) {
        self.macros.undef(name);
    }

    /// Reads, lexes and preprocesses `path` as a translation unit.
    pub fn preprocess_file(&mut self, path: &Path) -> Result<Vec<Token>> {
        self.base_file = path.to_string_lossy().into_owned();
        let tokens = lexer::tokenize_file(path, 1)?;
        self.preprocess(tokens)
    }

    /// Preprocesses an EOF-terminated token sequence.
    ///
    /// The result has all directives removed, all macros expanded, adjacent
    /// string literals concatenated, keywords reclassified and line numbers
    /// rewritten per `#line`.
    pub fn preprocess(&mut self, tokens: Vec<Token>) -> Result<Vec<Token>> {
        if tokens.is_empty() {
            return Ok(tokens);
        }
        if self.base_file.is_empty() {
            self.base_file = tokens[0].file.name.clone();
        }

        let mut reader = TokenReader::new(tokens);
        let mut tokens = self.preprocess2(&mut reader)?;
        if let Some(ci) = self.cond_stack.last() {
            return Err(Error::UnterminatedCondIncl { loc: ci.tok.loc() });
        }
        convert_pp_tokens(&mut tokens)?;
        let mut tokens = strings::join_adjacent_string_literals(tokens)?;
        for tok in &mut tokens {
            tok.line_no += tok.line_delta;
        }
        Ok(tokens)
    }

    /// The directive dispatch loop: walks the stream, expanding macros and
    /// executing directives, until EOF.
    fn preprocess2(&mut self, rd: &mut TokenReader) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        loop {
            if self.expand_macro(rd)? {
                continue;
            }

            if rd.peek().is_eof() {
                out.push(rd.read());
                return Ok(out);
            }

            if !rd.peek().is_hash() {
                let mut tok = rd.read();
                tok.line_delta = tok.file.line_delta();
                tok.display_file = Some(tok.file.display_name());
                out.push(tok);
                continue;
            }

            let start = rd.read(); // the '#'

            // A '#' alone on its line is a no-op.
            if rd.peek().at_bol {
                continue;
            }

            let name = rd.read();
            match Directive::from_token(&name) {
                Some(Directive::Include) => self.do_include(rd, &start)?,
                Some(Directive::IncludeNext) => self.do_include_next(rd)?,
                Some(Directive::Define) => self.read_macro_definition(rd)?,
                Some(Directive::Undef) => {
                    let name_tok = rd.read();
                    if !name_tok.is_ident() {
                        return Err(Error::macro_name_not_ident(&name_tok));
                    }
                    self.macros.undef(&name_tok.text);
                    rd.skip_line();
                }
                Some(Directive::If) => {
                    let val = self.eval_const_expr(rd, &name)?;
                    self.push_cond_incl(&start, val != 0);
                    if val == 0 {
                        skip_cond_incl(rd);
                    }
                }
                Some(Directive::Ifdef) => {
                    let defined = self.macros.find(rd.peek()).is_some();
                    rd.read();
                    self.push_cond_incl(&start, defined);
                    rd.skip_line();
                    if !defined {
                        skip_cond_incl(rd);
                    }
                }
                Some(Directive::Ifndef) => {
                    let defined = self.macros.find(rd.peek()).is_some();
                    rd.read();
                    self.push_cond_incl(&start, !defined);
                    rd.skip_line();
                    if defined {
                        skip_cond_incl(rd);
                    }
                }
                Some(Directive::Elif) => {
                    let included = match self.cond_stack.last_mut() {
                        None => return Err(Error::stray_directive(&start, "elif")),
                        Some(ci) => {
                            if ci.ctx == CondCtx::InElse {
                                return Err(Error::stray_directive(&start, "elif"));
                            }
                            ci.ctx = CondCtx::InElif;
                            ci.included
                        }
                    };
                    if !included && self.eval_const_expr(rd, &name)? != 0 {
                        if let Some(ci) = self.cond_stack.last_mut() {
                            ci.included = true;
                        }
                    } else {
                        skip_cond_incl(rd);
                    }
                }
                Some(Directive::Else) => {
                    match self.cond_stack.last_mut() {
                        None => return Err(Error::stray_directive(&start, "else")),
                        Some(ci) => {
                            if ci.ctx == CondCtx::InElse {
                                return Err(Error::stray_directive(&start, "else"));
                            }
                            ci.ctx = CondCtx::InElse;
                        }
                    }
                    rd.skip_line();
                    if self.cond_stack.last().map_or(false, |ci| ci.included) {
                        skip_cond_incl(rd);
                    }
                }
                Some(Directive::Endif) => {
                    if self.cond_stack.pop().is_none() {
                        return Err(Error::stray_directive(&start, "endif"));
                    }
                    rd.skip_line();
                }
                Some(Directive::Line) => self.read_line_marker(rd)?,
                Some(Directive::Pragma) => {
                    if rd.peek().is("once") {
                        self.pragma_once.insert(start.file.name.clone());
                        rd.read();
                        rd.skip_line();
                    } else {
                        // Unknown pragmas are consumed to end of line.
                        while !rd.peek().at_bol && !rd.peek().is_eof() {
                            rd.read();
                        }
                    }
                }
                Some(Directive::Error) => {
                    let line = rd.copy_line();
                    let text = join_tokens(&line);
                    let message = if text.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", text)
                    };
                    return Err(Error::ErrorDirective {
                        loc: start.loc(),
                        message,
                    });
                }
                None => {
                    if name.kind == TokenKind::PpNum {
                        // [GNU] A bare number after '#' is a line marker.
                        rd.unread(name);
                        self.read_line_marker(rd)?;
                    } else {
                        return Err(Error::invalid_directive(&name));
                    }
                }
            }
        }
    }

    fn push_cond_incl(&mut self, tok: &Token, included: bool) {
        self.cond_stack.push(CondIncl {
            ctx: CondCtx::InThen,
            tok: tok.clone(),
            included,
        });
    }

    /// Expands the macro the stream is looking at, if any. On success the
    /// expansion is spliced at the front of the stream, where it will be
    /// rescanned with the grown hidesets.
    fn expand_macro(&mut self, rd: &mut TokenReader) -> Result<bool> {
        let tok = rd.peek();
        if tok.hideset.contains(&tok.text) {
            return Ok(false);
        }
        let m = match self.macros.find(tok) {
            Some(m) => m.clone(),
            None => return Ok(false),
        };

        match m.kind {
            MacroKind::Builtin(builtin) => {
                let tok = rd.read();
                let mut result = self.expand_builtin(builtin, &tok)?;
                result.at_bol = tok.at_bol;
                result.has_space = tok.has_space;
                rd.unread(result);
                Ok(true)
            }
            MacroKind::ObjLike { mut body } => {
                let tok = rd.read();
                let hs = tok.hideset.union(&Hideset::solo(&m.name));
                add_hideset(&mut body, &hs);
                let origin = Rc::new(tok.clone());
                for t in body.iter_mut() {
                    if !t.is_eof() {
                        t.origin = Some(Rc::clone(&origin));
                    }
                }
                rd.splice(body);
                let front = rd.front_mut();
                front.at_bol = tok.at_bol;
                front.has_space = tok.has_space;
                Ok(true)
            }
            MacroKind::FuncLike {
                params,
                va_args_name,
                body,
            } => {
                // Without an argument list this is a plain identifier.
                if !rd.peek_at(1).is("(") {
                    return Ok(false);
                }
                let macro_tok = rd.read();
                rd.read(); // '('
                let (args, rparen) =
                    self.read_macro_args(rd, &params, &va_args_name, &macro_tok)?;

                // Offspring of this invocation may descend from both the
                // macro token and the closing parenthesis; they inherit the
                // names hidden in both.
                let hs = macro_tok
                    .hideset
                    .intersection(&rparen.hideset)
                    .union(&Hideset::solo(&m.name));
                let mut body = self.subst(&body, &args)?;
                add_hideset(&mut body, &hs);
                let origin = Rc::new(macro_tok.clone());
                for t in body.iter_mut() {
                    if !t.is_eof() {
                        t.origin = Some(Rc::clone(&origin));
                    }
                }
                rd.splice(body);
                let front = rd.front_mut();
                front.at_bol = macro_tok.at_bol;
                front.has_space = macro_tok.has_space;
                Ok(true)
            }
        }
    }

    fn expand_builtin(&mut self, builtin: Builtin, tok: &Token) -> Result<Token> {
        match builtin {
            Builtin::File => {
                let root = tok.origin_root();
                new_str_token(&root.file.display_name(), root)
            }
            Builtin::Line => {
                let root = tok.origin_root();
                new_num_token(root.line_no + root.file.line_delta(), root)
            }
            Builtin::Counter => {
                let val = self.counter;
                self.counter += 1;
                new_num_token(val, tok)
            }
            Builtin::Timestamp => new_str_token(&macros::timestamp_string(&tok.file.name), tok),
            Builtin::BaseFile => new_str_token(&self.base_file, tok),
        }
    }

    /// Reads a `#define` body: name, optional parameter list (only when the
    /// `(` directly follows the name with no whitespace), then the rest of
    /// the line.
    fn read_macro_definition(&mut self, rd: &mut TokenReader) -> Result<()> {
        let name_tok = rd.read();
        if !name_tok.is_ident() {
            return Err(Error::macro_name_not_ident(&name_tok));
        }
        let name = name_tok.text;

        if rd.peek().is("(") && !rd.peek().has_space {
            rd.read();
            let (params, va_args_name) = read_macro_params(rd)?;
            let body = rd.copy_line();
            self.macros
                .define_func_like(&name, params, va_args_name, body);
        } else {
            let body = rd.copy_line();
            self.macros.define_obj_like(&name, body);
        }
        Ok(())
    }

    /// Collects the arguments of a function-like invocation. The reader is
    /// positioned just past the `(`; on return it is past the `)`, which is
    /// also handed back for its hideset.
    fn read_macro_args(
        &mut self,
        rd: &mut TokenReader,
        params: &[String],
        va_args_name: &Option<String>,
        macro_tok: &Token,
    ) -> Result<(Vec<MacroArg>, Token)> {
        let mut args = Vec::new();
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                rd.expect(",")?;
            }
            let tokens = read_macro_arg_one(rd, false)?;
            args.push(MacroArg {
                name: param.clone(),
                is_va_arg: false,
                tokens,
            });
        }

        if let Some(va_name) = va_args_name {
            // The variadic parameter absorbs everything up to the `)`,
            // commas included; an absent list is still an (empty) argument.
            let tokens = if rd.peek().is(")") {
                vec![new_eof(rd.peek())]
            } else {
                if !params.is_empty() {
                    rd.expect(",")?;
                }
                read_macro_arg_one(rd, true)?
            };
            args.push(MacroArg {
                name: va_name.clone(),
                is_va_arg: true,
                tokens,
            });
        } else if !rd.peek().is(")") {
            return Err(Error::too_many_args(macro_tok));
        }

        let rparen = rd.expect(")")?;
        Ok((args, rparen))
    }

    /// Replaces the parameters in a macro body with the collected arguments,
    /// applying `#`, `##` and `__VA_OPT__` on the way.
    fn subst(&mut self, body: &[Token], args: &[MacroArg]) -> Result<Vec<Token>> {
        let mut out: Vec<Token> = Vec::new();
        let mut i = 0;
        while !body[i].is_eof() {
            let tok = &body[i];

            // "#param" becomes the stringized raw argument.
            if tok.is("#") {
                let arg = find_arg(args, &body[i + 1])
                    .ok_or_else(|| Error::stringize_no_param(&body[i + 1]))?;
                out.push(stringize(tok, &arg.tokens)?);
                i += 2;
                continue;
            }

            // [GNU] If the variadic argument is empty, `,##__VA_ARGS__`
            // expands to nothing; otherwise the comma is kept and the
            // parameter is substituted normally.
            if tok.is(",") && body[i + 1].is("##") {
                if let Some(arg) = find_arg(args, &body[i + 2]) {
                    if arg.is_va_arg {
                        if arg.tokens[0].is_eof() {
                            i += 3;
                        } else {
                            out.push(tok.clone());
                            i += 2;
                        }
                        continue;
                    }
                }
            }

            // "##" pastes the last output token with what follows.
            if tok.is("##") {
                if out.is_empty() {
                    return Err(Error::PasteAtStart { loc: tok.loc() });
                }
                if body[i + 1].is_eof() {
                    return Err(Error::PasteAtEnd { loc: tok.loc() });
                }

                if let Some(arg) = find_arg(args, &body[i + 1]) {
                    if !arg.tokens[0].is_eof() {
                        let last = out.pop().expect("unreachable");
                        out.push(paste(&last, &arg.tokens[0])?);
                        for t in &arg.tokens[1..] {
                            if t.is_eof() {
                                break;
                            }
                            out.push(t.clone());
                        }
                    }
                    i += 2;
                    continue;
                }

                let last = out.pop().expect("unreachable");
                out.push(paste(&last, &body[i + 1])?);
                i += 2;
                continue;
            }

            let arg = find_arg(args, tok);

            // "param##rhs": the argument is placed verbatim, without
            // pre-expansion. An empty argument cancels the paste.
            if let Some(arg) = arg {
                if body[i + 1].is("##") {
                    let rhs = &body[i + 2];
                    if arg.tokens[0].is_eof() {
                        if let Some(arg2) = find_arg(args, rhs) {
                            for t in &arg2.tokens {
                                if t.is_eof() {
                                    break;
                                }
                                out.push(t.clone());
                            }
                        } else {
                            out.push(rhs.clone());
                        }
                        i += 3;
                        continue;
                    }
                    for t in &arg.tokens {
                        if t.is_eof() {
                            break;
                        }
                        out.push(t.clone());
                    }
                    // The "##" itself is handled on the next iteration.
                    i += 1;
                    continue;
                }
            }

            // __VA_OPT__(tokens) expands to its tokens only when the
            // variadic argument is non-empty.
            if tok.is("__VA_OPT__") && body[i + 1].is("(") {
                let (opt_tokens, next) = read_arg_from_slice(body, i + 2)?;
                if has_varargs(args) {
                    for t in &opt_tokens {
                        if t.is_eof() {
                            break;
                        }
                        out.push(t.clone());
                    }
                }
                i = next;
                continue;
            }

            // A normal parameter use: the argument is fully preprocessed
            // before substitution.
            if let Some(arg) = arg {
                let mut expanded = self.preprocess2(&mut TokenReader::new(arg.tokens.clone()))?;
                if let Some(first) = expanded.first_mut() {
                    first.at_bol = tok.at_bol;
                    first.has_space = tok.has_space;
                }
                for t in expanded {
                    if t.is_eof() {
                        break;
                    }
                    out.push(t);
                }
                i += 1;
                continue;
            }

            out.push(tok.clone());
            i += 1;
        }
        out.push(body[i].clone());
        Ok(out)
    }

    /// Evaluates the controlling expression of `#if`/`#elif`. `defined` is
    /// resolved against the macro table before any expansion; identifiers
    /// surviving expansion count as zero.
    fn eval_const_expr(&mut self, rd: &mut TokenReader, name_tok: &Token) -> Result<i64> {
        let line = rd.copy_line();
        let expr_toks = self.read_const_expr(line)?;
        let mut expanded = self.preprocess2(&mut TokenReader::new(expr_toks))?;

        if expanded[0].is_eof() {
            return Err(Error::NoExpression {
                loc: name_tok.loc(),
            });
        }

        for tok in expanded.iter_mut() {
            if tok.is_ident() {
                let mut zero = new_num_token(0, tok)?;
                zero.at_bol = tok.at_bol;
                *tok = zero;
            }
        }
        convert_pp_tokens(&mut expanded)?;

        let (val, rest) = expr::const_expr(&expanded)?;
        if !expanded[rest].is_eof() {
            return Err(Error::extra_token(&expanded[rest]));
        }
        Ok(val)
    }

    /// Replaces `defined name` and `defined(name)` with `1` or `0`.
    fn read_const_expr(&self, line: Vec<Token>) -> Result<Vec<Token>> {
        let mut rd = TokenReader::new(line);
        let mut out = Vec::new();
        loop {
            if rd.peek().is_eof() {
                out.push(rd.read());
                return Ok(out);
            }
            if rd.peek().is("defined") {
                let defined_tok = rd.read();
                let has_paren = rd.consume("(");
                let name = rd.read();
                if !name.is_ident() {
                    return Err(Error::macro_name_not_ident(&defined_tok));
                }
                if has_paren {
                    rd.expect(")")?;
                }
                let val = self.macros.is_defined(&name.text) as i64;
                out.push(new_num_token(val, &defined_tok)?);
                continue;
            }
            out.push(rd.read());
        }
    }

    fn do_include(&mut self, rd: &mut TokenReader, start: &Token) -> Result<()> {
        let filename_tok = rd.peek().clone();
        let (filename, is_dquote) = self.read_include_filename(rd)?;

        // A quoted relative path is first tried against the directory of the
        // including file.
        if is_dquote && !Path::new(&filename).is_absolute() {
            let dir = Path::new(&start.file.name)
                .parent()
                .unwrap_or_else(|| Path::new(""));
            let path = dir.join(&filename);
            if util::file_exists(&path) {
                return self.include_file(rd, &path, &filename_tok);
            }
        }

        let path = self
            .search_include_paths(&filename)
            .unwrap_or_else(|| PathBuf::from(&filename));
        self.include_file(rd, &path, &filename_tok)
    }

    fn do_include_next(&mut self, rd: &mut TokenReader) -> Result<()> {
        let filename_tok = rd.peek().clone();
        let (filename, _) = self.read_include_filename(rd)?;
        let path = self
            .search_include_next(&filename)
            .unwrap_or_else(|| PathBuf::from(&filename));
        self.include_file(rd, &path, &filename_tok)
    }

    /// Reads the operand of `#include`: `"file"`, `<file>`, or macros that
    /// expand to either form.
    fn read_include_filename(&mut self, rd: &mut TokenReader) -> Result<(String, bool)> {
        let tok = rd.peek().clone();

        // "foo.h": the lexeme between the quotes is taken raw, escape
        // sequences and all.
        if tok.is_str() {
            rd.read();
            rd.skip_line();
            let inner = &tok.text[1..tok.text.len() - 1];
            return Ok((inner.to_owned(), true));
        }

        // <foo.h>
        if tok.is("<") {
            rd.read();
            let mut parts = Vec::new();
            loop {
                let t = rd.peek();
                if t.at_bol || t.is_eof() {
                    return Err(Error::unexpected_token(t, "'>'"));
                }
                if t.is(">") {
                    rd.read();
                    break;
                }
                parts.push(rd.read());
            }
            rd.skip_line();
            return Ok((join_tokens(&parts), false));
        }

        // #include FOO: expand the rest of the line, then re-read it.
        if tok.is_ident() {
            let line = rd.copy_line();
            let expanded = self.preprocess2(&mut TokenReader::new(line))?;
            let mut sub = TokenReader::new(expanded);
            return self.read_include_filename(&mut sub);
        }

        Err(Error::expected_filename(&tok))
    }

    /// Lexes `path` and splices its tokens in front of the remaining input,
    /// honoring `#pragma once` and detected include guards.
    fn include_file(&mut self, rd: &mut TokenReader, path: &Path, filename_tok: &Token) -> Result<()> {
        let key = path.to_string_lossy().into_owned();
        if self.pragma_once.contains(&key) {
            return Ok(());
        }
        if let Some(guard) = self.include_guards.get(&key) {
            if self.macros.is_defined(guard) {
                return Ok(());
            }
        }

        let contents = util::read_file(path)
            .map_err(|e| Error::cannot_open_file(filename_tok, path.to_path_buf(), e))?;
        let file_no = self.next_file_no;
        self.next_file_no += 1;
        let file = SourceFile::new(&key, file_no, &contents);
        let tokens = lexer::tokenize(&file)?;

        if let Some(guard) = detect_include_guard(&tokens) {
            self.include_guards.insert(key, guard);
        }
        rd.splice(tokens);
        Ok(())
    }

    fn search_include_paths(&mut self, filename: &str) -> Option<PathBuf> {
        if Path::new(filename).is_absolute() {
            return Some(PathBuf::from(filename));
        }

        if let Some((path, idx)) = self.filename_cache.get(filename).cloned() {
            self.include_next_idx = idx;
            return Some(path);
        }

        for (i, dir) in self.include_paths.iter().enumerate() {
            let path = dir.join(filename);
            if !util::file_exists(&path) {
                continue;
            }
            self.filename_cache
                .insert(filename.to_owned(), (path.clone(), i + 1));
            self.include_next_idx = i + 1;
            return Some(path);
        }
        None
    }

    fn search_include_next(&mut self, filename: &str) -> Option<PathBuf> {
        while self.include_next_idx < self.include_paths.len() {
            let path = self.include_paths[self.include_next_idx].join(filename);
            if util::file_exists(&path) {
                return Some(path);
            }
            self.include_next_idx += 1;
        }
        None
    }

    /// Applies `#line N "file"` (or a bare GNU line marker) to the current
    /// file.
    fn read_line_marker(&mut self, rd: &mut TokenReader) -> Result<()> {
        let start = rd.peek().clone();
        let line = rd.copy_line();
        let mut toks = self.preprocess2(&mut TokenReader::new(line))?;
        convert_pp_tokens(&mut toks)?;

        let val = match toks[0].kind {
            TokenKind::Num {
                val,
                is_float: false,
                ..
            } => val,
            _ => {
                return Err(Error::InvalidLineMarker {
                    loc: toks[0].loc(),
                })
            }
        };
        start.file.set_line_delta(val - start.line_no);

        let filename_tok = &toks[1];
        if filename_tok.is_eof() {
            return Ok(());
        }
        match &filename_tok.kind {
            TokenKind::Str { bytes, .. } => {
                let name = String::from_utf8_lossy(&bytes[..bytes.len().saturating_sub(1)]);
                start.file.set_display_name(&name);
                Ok(())
            }
            _ => Err(Error::expected_filename(filename_tok)),
        }
    }
}

/// Skips a conditional body, stopping at the `#elif`/`#else`/`#endif` that
/// belongs to it; nested conditionals are skipped whole.
fn skip_cond_incl(rd: &mut TokenReader) {
    loop {
        if rd.peek().is_eof() {
            return;
        }
        if rd.peek().is_hash() {
            match Directive::from_token(rd.peek_at(1)) {
                Some(d) if d.opens_conditional() => {
                    rd.read();
                    rd.read();
                    skip_cond_incl2(rd);
                    continue;
                }
                Some(Directive::Elif) | Some(Directive::Else) | Some(Directive::Endif) => return,
                _ => {}
            }
        }
        rd.read();
    }
}

/// Skips past the `#endif` matching an already-consumed `#if`.
fn skip_cond_incl2(rd: &mut TokenReader) {
    loop {
        if rd.peek().is_eof() {
            return;
        }
        if rd.peek().is_hash() {
            match Directive::from_token(rd.peek_at(1)) {
                Some(d) if d.opens_conditional() => {
                    rd.read();
                    rd.read();
                    skip_cond_incl2(rd);
                    continue;
                }
                Some(Directive::Endif) => {
                    rd.read();
                    rd.read();
                    return;
                }
                _ => {}
            }
        }
        rd.read();
    }
}

fn read_macro_params(rd: &mut TokenReader) -> Result<(Vec<String>, Option<String>)> {
    let mut params = Vec::new();
    loop {
        if rd.consume(")") {
            return Ok((params, None));
        }
        if !params.is_empty() {
            rd.expect(",")?;
        }

        // A trailing "..." declares __VA_ARGS__; "name..." declares a named
        // variadic parameter.
        if rd.consume("...") {
            rd.expect(")")?;
            return Ok((params, Some("__VA_ARGS__".to_owned())));
        }
        let param = rd.read();
        if !param.is_ident() {
            return Err(Error::expected_ident(&param));
        }
        if rd.consume("...") {
            rd.expect(")")?;
            return Ok((params, Some(param.text)));
        }
        params.push(param.text);
    }
}

/// Reads one argument: tokens up to an unnested `)` or, unless `read_rest`
/// is set, an unnested `,`.
fn read_macro_arg_one(rd: &mut TokenReader, read_rest: bool) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut level = 0;
    loop {
        let tok = rd.peek();
        if level == 0 && tok.is(")") {
            break;
        }
        if level == 0 && !read_rest && tok.is(",") {
            break;
        }
        if tok.is_eof() {
            return Err(Error::premature_eof(tok));
        }
        if tok.is("(") {
            level += 1;
        } else if tok.is(")") {
            level -= 1;
        }
        tokens.push(rd.read());
    }
    tokens.push(new_eof(rd.peek()));
    Ok(tokens)
}

/// Slice analog of `read_macro_arg_one` for `__VA_OPT__` operands inside a
/// macro body; returns the collected tokens and the index past the `)`.
fn read_arg_from_slice(body: &[Token], mut i: usize) -> Result<(Vec<Token>, usize)> {
    let mut tokens = Vec::new();
    let mut level = 0;
    loop {
        let tok = &body[i];
        if level == 0 && tok.is(")") {
            break;
        }
        if tok.is_eof() {
            return Err(Error::premature_eof(tok));
        }
        if tok.is("(") {
            level += 1;
        } else if tok.is(")") {
            level -= 1;
        }
        tokens.push(tok.clone());
        i += 1;
    }
    tokens.push(new_eof(&body[i]));
    Ok((tokens, i + 1))
}

fn has_varargs(args: &[MacroArg]) -> bool {
    args.iter()
        .any(|arg| arg.name == "__VA_ARGS__" && !arg.tokens[0].is_eof())
}

/// `#arg`: one string literal holding the joined argument lexemes.
fn stringize(hash_tok: &Token, arg_tokens: &[Token]) -> Result<Token> {
    new_str_token(&join_tokens(arg_tokens), hash_tok)
}

/// `##`: concatenates two lexemes and re-lexes them; the result must be
/// exactly one token.
fn paste(lhs: &Token, rhs: &Token) -> Result<Token> {
    let buf = format!("{}{}", lhs.text, rhs.text);
    let mut toks =
        relex(&buf, lhs).map_err(|_| Error::invalid_paste(lhs, buf.clone()))?;
    if toks.len() != 2 {
        return Err(Error::invalid_paste(lhs, buf));
    }
    let mut tok = toks.swap_remove(0);
    tok.at_bol = false;
    tok.has_space = lhs.has_space;
    tok.line_no = lhs.line_no;
    Ok(tok)
}

/// Detects the `#ifndef X / #define X / ... / #endif` pattern spanning a
/// whole file, returning the guard macro name.
fn detect_include_guard(tokens: &[Token]) -> Option<String> {
    let first = tokens.first()?;
    if !first.is_hash() || !tokens.get(1)?.is("ifndef") {
        return None;
    }
    let name_tok = tokens.get(2)?;
    if !name_tok.is_ident() {
        return None;
    }
    let guard = name_tok.text.clone();

    if !tokens.get(3)?.is_hash()
        || !tokens.get(4)?.is("define")
        || !tokens.get(5)?.is(&guard)
    {
        return None;
    }

    // The matching #endif must be the last thing in the file.
    let mut i = 3;
    while !tokens[i].is_eof() {
        if !tokens[i].is_hash() {
            i += 1;
            continue;
        }
        if tokens[i + 1].is("endif") && tokens[i + 2].is_eof() {
            return Some(guard);
        }
        match Directive::from_token(&tokens[i + 1]) {
            Some(d) if d.opens_conditional() => i = skip_cond_incl_slice(tokens, i + 2),
            _ => i += 1,
        }
    }
    None
}

fn skip_cond_incl_slice(tokens: &[Token], mut i: usize) -> usize {
    while !tokens[i].is_eof() {
        if tokens[i].is_hash() {
            match Directive::from_token(&tokens[i + 1]) {
                Some(d) if d.opens_conditional() => {
                    i = skip_cond_incl_slice(tokens, i + 2);
                    continue;
                }
                Some(Directive::Endif) => return i + 2,
                _ => {}
            }
        }
        i += 1;
    }
    i
}
