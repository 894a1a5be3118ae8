use std::fs;

use c_pp::token::{SourceFile, Token, TokenKind};
use c_pp::{lexer, Error, Preprocessor};

fn try_pp(src: &str) -> c_pp::Result<Vec<Token>> {
    let tokens = lexer::tokenize(&SourceFile::new("test.c", 1, src))?;
    Preprocessor::new()?.preprocess(tokens)
}

fn pp(src: &str) -> Vec<Token> {
    try_pp(src).unwrap()
}

fn texts(tokens: &[Token]) -> Vec<&str> {
    tokens
        .iter()
        .filter(|t| !t.is_eof())
        .map(|t| t.text.as_str())
        .collect()
}

#[test]
fn no_directive_works() {
    let tokens = pp("int main() { return 0; }");
    assert_eq!(
        texts(&tokens),
        ["int", "main", "(", ")", "{", "return", "0", ";", "}"]
    );
}

#[test]
fn object_like_works() {
    assert_eq!(texts(&pp("#define X 42\nX")), ["42"]);
}

#[test]
fn redefinition_overwrites_and_undef_deletes() {
    let src = "#define X 1\n#define X 2\nX\n#undef X\nX";
    assert_eq!(texts(&pp(src)), ["2", "X"]);
}

#[test]
fn function_like_needs_an_argument_list() {
    assert_eq!(texts(&pp("#define F(x) x\nF F(1)")), ["F", "1"]);
}

#[test]
fn self_referential_macro_terminates() {
    // The inner f is expanded during argument pre-expansion and painted;
    // the outer f survives rescanning.
    let tokens = pp("#define f(x) f(x)+1\nf(f(1))");
    assert_eq!(
        texts(&tokens),
        ["f", "(", "f", "(", "1", ")", "+", "1", ")", "+", "1"]
    );
}

#[test]
fn mutually_recursive_macros_terminate() {
    assert_eq!(texts(&pp("#define a b\n#define b a\na")), ["a"]);
    assert_eq!(texts(&pp("#define m m\nm")), ["m"]);
}

#[test]
fn stringify_works() {
    assert_eq!(
        texts(&pp("#define S(x) #x\nS(hello world)")),
        [r#""hello world""#]
    );
}

#[test]
fn stringify_normalizes_spacing() {
    assert_eq!(texts(&pp("#define S(x) #x\nS( a  +  b )")), [r#""a + b""#]);
}

#[test]
fn paste_works() {
    assert_eq!(texts(&pp("#define P(a,b) a##b\nP(foo,123)")), ["foo123"]);
}

#[test]
fn paste_with_empty_operand() {
    assert_eq!(texts(&pp("#define P(a,b) a##b\nP(,x)")), ["x"]);
    assert_eq!(texts(&pp("#define P(a,b) a##b\nP(x,)")), ["x"]);
}

#[test]
fn paste_at_edges_is_rejected() {
    assert!(matches!(
        try_pp("#define P(a) ##a\nP(x)"),
        Err(Error::PasteAtStart { .. })
    ));
    assert!(matches!(
        try_pp("#define P(a) a##\nP(x)"),
        Err(Error::PasteAtEnd { .. })
    ));
}

#[test]
fn paste_must_form_one_token() {
    assert!(matches!(
        try_pp("#define P(a,b) a##b\nP(foo,+)"),
        Err(Error::InvalidPaste { .. })
    ));
}

#[test]
fn stringize_requires_a_parameter() {
    assert!(matches!(
        try_pp("#define S(x) #y\nS(1)"),
        Err(Error::StringizeNoParam { .. })
    ));
}

#[test]
fn variadic_with_comma_paste_and_va_opt() {
    let src = "#define L(fmt,...) printf(fmt , ## __VA_ARGS__) __VA_OPT__(;)\nL(\"a\")\nL(\"a\",1,2)";
    let tokens = pp(src);
    assert_eq!(
        texts(&tokens),
        [
            "printf", "(", "\"a\"", ")", // comma and semicolon suppressed
            "printf", "(", "\"a\"", ",", "1", ",", "2", ")", ";",
        ]
    );
}

#[test]
fn va_opt_expands_only_with_arguments() {
    let src = "#define F(...) f(0 __VA_OPT__(,) __VA_ARGS__)\nF()\nF(1)";
    assert_eq!(
        texts(&pp(src)),
        ["f", "(", "0", ")", "f", "(", "0", ",", "1", ")"]
    );
}

#[test]
fn named_variadic_parameter() {
    assert_eq!(
        texts(&pp("#define V(args...) f(args)\nV(1,2)")),
        ["f", "(", "1", ",", "2", ")"]
    );
}

#[test]
fn too_few_and_too_many_arguments() {
    assert!(matches!(
        try_pp("#define F(a,b) a b\nF(1)"),
        Err(Error::UnexpectedToken { .. })
    ));
    assert!(matches!(
        try_pp("#define F(a,b) a b\nF(1,2,3)"),
        Err(Error::TooManyArgs { .. })
    ));
}

#[test]
fn unclosed_argument_list_is_fatal() {
    assert!(matches!(
        try_pp("#define F(a) a\nF(1"),
        Err(Error::PrematureEof { .. })
    ));
}

#[test]
fn conditional_works() {
    let src = "#define A 1\n#if A+1==2\nyes\n#else\nno\n#endif";
    assert_eq!(texts(&pp(src)), ["yes"]);
}

#[test]
fn elif_takes_first_true_branch() {
    let src = "#if 0\na\n#elif 1\nb\n#elif 1\nc\n#else\nd\n#endif";
    assert_eq!(texts(&pp(src)), ["b"]);
}

#[test]
fn ifdef_and_ifndef() {
    let src = "#define X\n#ifdef X\na\n#endif\n#ifndef X\nb\n#endif";
    assert_eq!(texts(&pp(src)), ["a"]);
}

#[test]
fn skipped_branches_may_nest() {
    let src = "#if 0\n#if 1\nx\n#endif\ny\n#else\nz\n#endif";
    assert_eq!(texts(&pp(src)), ["z"]);
}

#[test]
fn defined_operator_is_resolved_before_expansion() {
    let src = "#define X\n#if defined(X) && defined X && !defined(Y)\nok\n#endif";
    assert_eq!(texts(&pp(src)), ["ok"]);
}

#[test]
fn surviving_identifiers_evaluate_to_zero() {
    assert_eq!(texts(&pp("#if FOO\nx\n#endif\ny")), ["y"]);
}

#[test]
fn conditional_errors() {
    assert!(matches!(
        try_pp("#endif"),
        Err(Error::StrayDirective { .. })
    ));
    assert!(matches!(
        try_pp("#if 1\n#else\n#else\n#endif"),
        Err(Error::StrayDirective { .. })
    ));
    assert!(matches!(
        try_pp("#if 1\nx"),
        Err(Error::UnterminatedCondIncl { .. })
    ));
    assert!(matches!(try_pp("#if\nx\n#endif"), Err(Error::NoExpression { .. })));
    assert!(matches!(
        try_pp("#if 1 2\nx\n#endif"),
        Err(Error::ExtraToken { .. })
    ));
}

#[test]
fn error_directive_is_fatal() {
    match try_pp("#error out of cheese") {
        Err(Error::ErrorDirective { message, .. }) => {
            assert_eq!(message, ": out of cheese");
        }
        other => panic!("expected #error to fail, got {:?}", other.map(|t| texts(&t).join(" "))),
    }
}

#[test]
fn unknown_directive_is_fatal() {
    assert!(matches!(
        try_pp("#bogus"),
        Err(Error::InvalidDirective { .. })
    ));
}

#[test]
fn empty_directive_is_a_no_op() {
    assert_eq!(texts(&pp("#\nint x;")), ["int", "x", ";"]);
}

#[test]
fn unknown_pragmas_are_consumed() {
    assert_eq!(texts(&pp("#pragma GCC poison puts\nint")), ["int"]);
}

#[test]
fn line_directive_rewrites_positions() {
    let tokens = pp("#line 100 \"virtual.c\"\nint x;");
    assert_eq!(tokens[0].line_no, 101);
    assert_eq!(tokens[0].display_file.as_deref(), Some("virtual.c"));
}

#[test]
fn bare_line_marker_is_implicit_line() {
    let tokens = pp("# 50 \"gen.c\"\nx");
    assert_eq!(tokens[0].line_no, 51);
    assert_eq!(tokens[0].display_file.as_deref(), Some("gen.c"));
}

#[test]
fn file_and_line_builtins() {
    assert_eq!(
        texts(&pp("__FILE__ __LINE__\n__LINE__")),
        [r#""test.c""#, "1", "2"]
    );
}

#[test]
fn line_builtin_reports_the_invocation_site() {
    assert_eq!(texts(&pp("#define LN __LINE__\nLN")), ["2"]);
}

#[test]
fn counter_increments_per_use() {
    assert_eq!(
        texts(&pp("__COUNTER__ __COUNTER__ __COUNTER__")),
        ["0", "1", "2"]
    );
}

#[test]
fn base_file_builtin() {
    assert_eq!(texts(&pp("__BASE_FILE__")), [r#""test.c""#]);
}

#[test]
fn timestamp_placeholder_for_unreadable_files() {
    assert_eq!(
        texts(&pp("__TIMESTAMP__")),
        [r#""??? ??? ?? ??:??:?? ????""#]
    );
}

#[test]
fn date_and_time_have_fixed_shape() {
    let date = pp("__DATE__");
    assert_eq!(date[0].text.len(), 13); // "Mmm dd yyyy" plus quotes
    let time = pp("__TIME__");
    assert_eq!(time[0].text.len(), 10); // "hh:mm:ss" plus quotes
}

#[test]
fn stdc_macros_are_predefined() {
    assert_eq!(texts(&pp("#if __STDC__\nok\n#endif")), ["ok"]);
    assert_eq!(texts(&pp("__STDC_VERSION__")), ["201112L"]);
}

#[test]
fn keywords_are_reclassified() {
    let tokens = pp("int x;");
    assert_eq!(tokens[0].kind, TokenKind::Keyword);
    assert_eq!(tokens[1].kind, TokenKind::Ident);
}

#[test]
fn adjacent_strings_are_concatenated() {
    let tokens = pp("char *s = \"a\" \"b\";");
    match &tokens[4].kind {
        TokenKind::Str { bytes, .. } => assert_eq!(bytes, b"ab\0"),
        other => panic!("expected a string, got {:?}", other),
    }
    assert_eq!(texts(&tokens), ["char", "*", "s", "=", "\"a\"", ";"]);
}

#[test]
fn include_works_and_guards_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("h.h"),
        "#ifndef H\n#define H\nint h;\n#endif\n",
    )
    .unwrap();
    let main = dir.path().join("main.c");
    fs::write(&main, "#include \"h.h\"\n#include \"h.h\"\nint x;\n").unwrap();

    let mut pp = Preprocessor::new().unwrap();
    let tokens = pp.preprocess_file(&main).unwrap();
    assert_eq!(texts(&tokens), ["int", "h", ";", "int", "x", ";"]);
}

#[test]
fn pragma_once_includes_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("once.h"), "#pragma once\nint h;\n").unwrap();
    let main = dir.path().join("main.c");
    fs::write(&main, "#include \"once.h\"\n#include \"once.h\"\n").unwrap();

    let mut pp = Preprocessor::new().unwrap();
    let tokens = pp.preprocess_file(&main).unwrap();
    assert_eq!(texts(&tokens), ["int", "h", ";"]);
}

#[test]
fn angle_includes_use_the_search_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("sys.h"), "int sys;\n").unwrap();

    let tokens = lexer::tokenize(&SourceFile::new("main.c", 1, "#include <sys.h>\n")).unwrap();
    let mut pp = Preprocessor::new().unwrap();
    pp.include_paths_mut().push(dir.path().to_path_buf());
    let tokens = pp.preprocess(tokens).unwrap();
    assert_eq!(texts(&tokens), ["int", "sys", ";"]);
}

#[test]
fn include_next_resumes_after_the_current_hit() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    fs::write(
        first.path().join("wrap.h"),
        "#include_next <wrap.h>\nint first;\n",
    )
    .unwrap();
    fs::write(second.path().join("wrap.h"), "int second;\n").unwrap();

    let tokens = lexer::tokenize(&SourceFile::new("main.c", 1, "#include <wrap.h>\n")).unwrap();
    let mut pp = Preprocessor::new().unwrap();
    pp.include_paths_mut().push(first.path().to_path_buf());
    pp.include_paths_mut().push(second.path().to_path_buf());
    let tokens = pp.preprocess(tokens).unwrap();
    assert_eq!(texts(&tokens), ["int", "second", ";", "int", "first", ";"]);
}

#[test]
fn include_operand_may_be_a_macro() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("h.h"), "int h;\n").unwrap();
    let main = dir.path().join("main.c");
    fs::write(&main, "#define HDR \"h.h\"\n#include HDR\n").unwrap();

    let mut pp = Preprocessor::new().unwrap();
    let tokens = pp.preprocess_file(&main).unwrap();
    assert_eq!(texts(&tokens), ["int", "h", ";"]);
}

#[test]
fn missing_include_is_fatal() {
    assert!(matches!(
        try_pp("#include \"no_such_file_anywhere.h\"\n"),
        Err(Error::CannotOpenFile { .. })
    ));
}

#[test]
fn hidesets_only_grow() {
    let src = "#define wrap(x) x\n#define id(x) wrap(x)\nid(id(1))";
    let tokens = pp(src);
    assert_eq!(texts(&tokens), ["1"]);
}
