use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{App, Arg};

use c_pp::token::Token;
use c_pp::Preprocessor;

fn main() -> anyhow::Result<()> {
    let matches = App::new("cpp")
        .arg(Arg::with_name("SOURCE_FILE").index(1).required(true))
        .arg(
            Arg::with_name("INCLUDE")
                .short("I")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("DEFINE")
                .short("D")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(Arg::with_name("SILENT").long("silent"))
        .get_matches();

    let src_file = Path::new(matches.value_of("SOURCE_FILE").expect("required"));

    let mut pp = Preprocessor::new()?;
    if let Some(dirs) = matches.values_of("INCLUDE") {
        for dir in dirs {
            pp.include_paths_mut().push(PathBuf::from(dir));
        }
    }
    if let Some(defs) = matches.values_of("DEFINE") {
        for def in defs {
            let (name, value) = match def.find('=') {
                Some(i) => (&def[..i], &def[i + 1..]),
                None => (def, "1"),
            };
            pp.define(name, value)?;
        }
    }

    let tokens = pp
        .preprocess_file(src_file)
        .with_context(|| format!("cannot preprocess {}", src_file.display()))?;

    if !matches.is_present("SILENT") {
        print_tokens(&tokens);
    }
    Ok(())
}

fn print_tokens(tokens: &[Token]) {
    let mut first = true;
    for tok in tokens {
        if tok.is_eof() {
            break;
        }
        if tok.at_bol && !first {
            println!();
        } else if tok.has_space && !first {
            print!(" ");
        }
        print!("{}", tok.text);
        first = false;
    }
    println!();
}
