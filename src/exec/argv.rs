// src/exec/argv.rs

//! Shell-style splitting of a configured command line into argv.
//!
//! Supported syntax:
//! - whitespace separates arguments;
//! - `'single quotes'` are literal (no expansion);
//! - `"double quotes"` group words and still expand variables;
//! - `\` escapes the next character (inside double quotes only `"`, `\`, `$`);
//! - `$NAME` and `${NAME}` expand against the entry's environment chain, an
//!   unset name expands to the empty string. An expansion never splits into
//!   several arguments.
//!
//! No globbing, no command substitution, no pipes: the result is executed
//! directly, not through a shell.

/// Split `cmdline` into argv, expanding variables through `lookup`.
pub fn tokenize<'a, F>(cmdline: &str, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = cmdline.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_token = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.peek() {
                            Some(&next @ ('"' | '\\' | '$')) => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        '$' => expand(&mut chars, &mut current, &lookup),
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '$' => {
                in_token = true;
                expand(&mut chars, &mut current, &lookup);
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }

    if in_token {
        args.push(current);
    }
    args
}

fn expand<'a, I, F>(chars: &mut std::iter::Peekable<I>, out: &mut String, lookup: &F)
where
    I: Iterator<Item = char>,
    F: Fn(&str) -> Option<&'a str>,
{
    let mut name = String::new();

    if chars.peek() == Some(&'{') {
        chars.next();
        for c in chars.by_ref() {
            if c == '}' {
                break;
            }
            name.push(c);
        }
    } else {
        while let Some(&c) = chars.peek() {
            let valid = c == '_' || c.is_ascii_alphanumeric();
            if !valid || (name.is_empty() && c.is_ascii_digit()) {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            out.push('$');
            return;
        }
    }

    if let Some(value) = lookup(&name) {
        out.push_str(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        pairs.iter().copied().collect()
    }

    fn split(cmd: &str, vars: &HashMap<&'static str, &'static str>) -> Vec<String> {
        tokenize(cmd, |k| vars.get(k).copied())
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            split("do_something --with-option two", &env(&[])),
            vec!["do_something", "--with-option", "two"]
        );
        assert_eq!(split("  a   b\tc ", &env(&[])), vec!["a", "b", "c"]);
        assert!(split("   ", &env(&[])).is_empty());
    }

    #[test]
    fn expands_variables_without_word_splitting() {
        let vars = env(&[("two", "two from environment"), ("one", "one")]);
        assert_eq!(
            split("do_something --with-option $two $one", &vars),
            vec!["do_something", "--with-option", "two from environment", "one"]
        );
        assert_eq!(split("x=${one}y", &vars), vec!["x=oney"]);
    }

    #[test]
    fn unset_variables_expand_to_empty() {
        assert_eq!(split("echo $nope end", &env(&[])), vec!["echo", "", "end"]);
    }

    #[test]
    fn single_quotes_suppress_expansion() {
        let vars = env(&[("HOME", "/root")]);
        assert_eq!(split("echo '$HOME is home'", &vars), vec!["echo", "$HOME is home"]);
        assert_eq!(split("echo \"$HOME is home\"", &vars), vec!["echo", "/root is home"]);
    }

    #[test]
    fn escapes_and_empty_quotes() {
        let vars = env(&[("X", "x")]);
        assert_eq!(split(r"echo \$X a\ b", &vars), vec!["echo", "$X", "a b"]);
        assert_eq!(split(r#"echo "" "\"q\"""#, &vars), vec!["echo", "", "\"q\""]);
        assert_eq!(split("cost $5", &vars), vec!["cost", "$5"]);
    }

    proptest! {
        #[test]
        fn plain_words_round_trip(words in proptest::collection::vec("[a-zA-Z0-9_./-]{1,12}", 0..8)) {
            let line = words.join(" ");
            prop_assert_eq!(split(&line, &env(&[])), words);
        }
    }
}
