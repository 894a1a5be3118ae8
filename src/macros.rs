//! Macro definitions and the macro table.

use std::collections::HashMap;
use std::fs;
use std::time::UNIX_EPOCH;

use crate::lexer;
use crate::token::{SourceFile, Token};
use crate::Result;

/// A macro definition.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub kind: MacroKind,
}

/// Macro bodies are EOF-terminated token sequences, as read by `#define`.
#[derive(Debug, Clone)]
pub enum MacroKind {
    ObjLike {
        body: Vec<Token>,
    },
    FuncLike {
        params: Vec<String>,
        /// `Some("__VA_ARGS__")` for a trailing `...`, or the user-supplied
        /// name for `name...`.
        va_args_name: Option<String>,
        body: Vec<Token>,
    },
    /// Expanded by the preprocessor itself, one token per invocation.
    Builtin(Builtin),
}

/// The dynamic built-in macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    File,
    Line,
    Counter,
    Timestamp,
    BaseFile,
}

/// Fixed predefined macros, seeded at initialization as object-like
/// definitions.
static PREDEFINED: &[(&str, &str)] = &[
    ("_LP64", "1"),
    ("__C99_MACRO_WITH_VA_ARGS", "1"),
    ("__ELF__", "1"),
    ("__LP64__", "1"),
    ("__SIZEOF_DOUBLE__", "8"),
    ("__SIZEOF_FLOAT__", "4"),
    ("__SIZEOF_INT__", "4"),
    ("__SIZEOF_LONG_DOUBLE__", "8"),
    ("__SIZEOF_LONG_LONG__", "8"),
    ("__SIZEOF_LONG__", "8"),
    ("__SIZEOF_POINTER__", "8"),
    ("__SIZEOF_PTRDIFF_T__", "8"),
    ("__SIZEOF_SHORT__", "2"),
    ("__SIZEOF_SIZE_T__", "8"),
    ("__SIZE_TYPE__", "unsigned long"),
    ("__STDC_HOSTED__", "1"),
    ("__STDC_NO_ATOMICS__", "1"),
    ("__STDC_NO_COMPLEX__", "1"),
    ("__STDC_UTF_16__", "1"),
    ("__STDC_UTF_32__", "1"),
    ("__STDC_VERSION__", "201112L"),
    ("__STDC__", "1"),
    ("__USER_LABEL_PREFIX__", ""),
    ("__alignof__", "_Alignof"),
    ("__c_pp__", "1"),
    ("__const__", "const"),
    ("__gnu_linux__", "1"),
    ("__inline__", "inline"),
    ("__linux", "1"),
    ("__linux__", "1"),
    ("__signed__", "signed"),
    ("__typeof__", "typeof"),
    ("__unix", "1"),
    ("__unix__", "1"),
    ("__volatile__", "volatile"),
    ("linux", "1"),
    ("unix", "1"),
];

/// The macro table: name to definition. `#undef` deletes, redefinition
/// overwrites.
#[derive(Debug, Default)]
pub struct MacroTable {
    map: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> MacroTable {
        MacroTable::default()
    }

    /// Defines an object-like macro from preprocessor source, as if by
    /// `#define name source`.
    pub fn define(&mut self, name: &str, source: &str) -> Result<()> {
        let file = SourceFile::new("<built-in>", 1, source);
        let body = lexer::tokenize(&file)?;
        self.define_obj_like(name, body);
        Ok(())
    }

    pub(crate) fn define_obj_like(&mut self, name: &str, body: Vec<Token>) {
        self.insert(Macro {
            name: name.to_owned(),
            kind: MacroKind::ObjLike { body },
        });
    }

    pub(crate) fn define_func_like(
        &mut self,
        name: &str,
        params: Vec<String>,
        va_args_name: Option<String>,
        body: Vec<Token>,
    ) {
        self.insert(Macro {
            name: name.to_owned(),
            kind: MacroKind::FuncLike {
                params,
                va_args_name,
                body,
            },
        });
    }

    fn insert(&mut self, m: Macro) {
        self.map.insert(m.name.clone(), m);
    }

    pub fn undef(&mut self, name: &str) {
        self.map.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.map.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// The definition an identifier token refers to, if any.
    pub(crate) fn find(&self, tok: &Token) -> Option<&Macro> {
        if !tok.is_ident() {
            return None;
        }
        self.map.get(&tok.text)
    }

    /// Seeds the fixed predefined macros, the dynamic built-ins and the
    /// startup-time `__DATE__`/`__TIME__`.
    pub(crate) fn install_predefined(&mut self) -> Result<()> {
        for &(name, source) in PREDEFINED {
            self.define(name, source)?;
        }

        for &(name, builtin) in &[
            ("__FILE__", Builtin::File),
            ("__LINE__", Builtin::Line),
            ("__COUNTER__", Builtin::Counter),
            ("__TIMESTAMP__", Builtin::Timestamp),
            ("__BASE_FILE__", Builtin::BaseFile),
        ] {
            self.insert(Macro {
                name: name.to_owned(),
                kind: MacroKind::Builtin(builtin),
            });
        }

        let now = time::now();
        self.define("__DATE__", &format_date(&now))?;
        self.define("__TIME__", &format_time(&now))?;
        Ok(())
    }
}

static MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// "May 17 2020"
fn format_date(tm: &time::Tm) -> String {
    format!(
        "\"{} {:2} {}\"",
        MONTHS[tm.tm_mon as usize % 12],
        tm.tm_mday,
        tm.tm_year + 1900
    )
}

// "13:34:03"
fn format_time(tm: &time::Tm) -> String {
    format!("\"{:02}:{:02}:{:02}\"", tm.tm_hour, tm.tm_min, tm.tm_sec)
}

/// The last modification time of `path` in 24-character `ctime` form, or a
/// placeholder when the file cannot be inspected.
pub(crate) fn timestamp_string(path: &str) -> String {
    let mtime = fs::metadata(path).and_then(|meta| meta.modified());
    if let Ok(mtime) = mtime {
        if let Ok(since_epoch) = mtime.duration_since(UNIX_EPOCH) {
            let tm = time::at(time::Timespec::new(since_epoch.as_secs() as i64, 0));
            return tm.ctime().to_string();
        }
    }
    "??? ??? ?? ??:??:?? ????".to_owned()
}

/// One collected argument of a function-like macro invocation.
#[derive(Debug, Clone)]
pub(crate) struct MacroArg {
    pub name: String,
    pub is_va_arg: bool,
    /// EOF-terminated; an empty argument is a lone EOF token.
    pub tokens: Vec<Token>,
}

pub(crate) fn find_arg<'a>(args: &'a [MacroArg], tok: &Token) -> Option<&'a MacroArg> {
    args.iter().find(|arg| tok.is(&arg.name))
}
