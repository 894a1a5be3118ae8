use crate::token::Token;

/// The directives the dispatch loop recognizes after a `#` at the beginning
/// of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Include,
    IncludeNext,
    Define,
    Undef,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Line,
    Pragma,
    Error,
}

impl Directive {
    pub(crate) fn from_token(tok: &Token) -> Option<Directive> {
        let d = match tok.text.as_str() {
            "include" => Directive::Include,
            "include_next" => Directive::IncludeNext,
            "define" => Directive::Define,
            "undef" => Directive::Undef,
            "if" => Directive::If,
            "ifdef" => Directive::Ifdef,
            "ifndef" => Directive::Ifndef,
            "elif" => Directive::Elif,
            "else" => Directive::Else,
            "endif" => Directive::Endif,
            "line" => Directive::Line,
            "pragma" => Directive::Pragma,
            "error" => Directive::Error,
            _ => return None,
        };
        Some(d)
    }

    /// True for the directives that open a conditional-inclusion frame.
    pub(crate) fn opens_conditional(self) -> bool {
        matches!(self, Directive::If | Directive::Ifdef | Directive::Ifndef)
    }
}
