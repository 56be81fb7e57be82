//! Post-edit syntax validation.
//!
//! Structured formats are parsed with their real parsers. Brace-delimited
//! source languages get a delimiter-balance check that understands strings
//! and comments: it cannot prove a file compiles, but it catches the usual
//! damage a line edit does (a dropped `}`, an unterminated string).

use std::path::Path;

/// What kind of check applies to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Json,
    Json5,
    Toml,
    Yaml,
    /// Brace-delimited source; the flags select lexer rules.
    CFamily(Dialect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dialect {
    /// Nested `/* */` comments and `r#"..."#` raw strings.
    pub rust: bool,
    /// Backtick-quoted raw strings (Go) or template literals (JS/TS).
    pub backtick_strings: bool,
    /// `'` always opens a character literal.
    pub char_literals: bool,
}

impl Language {
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let lang = match ext.as_str() {
            "json" => Language::Json,
            "json5" => Language::Json5,
            "toml" => Language::Toml,
            "yaml" | "yml" => Language::Yaml,
            "rs" => Language::CFamily(Dialect {
                rust: true,
                ..Dialect::default()
            }),
            "go" => Language::CFamily(Dialect {
                backtick_strings: true,
                char_literals: true,
                ..Dialect::default()
            }),
            "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx" => Language::CFamily(Dialect {
                backtick_strings: true,
                ..Dialect::default()
            }),
            "c" | "h" | "cc" | "cpp" | "hpp" | "java" | "kt" | "cs" | "swift" | "scala" => {
                Language::CFamily(Dialect {
                    char_literals: true,
                    ..Dialect::default()
                })
            }
            _ => return None,
        };
        Some(lang)
    }
}

/// Check `contents` as the language implied by `path`'s extension.
/// Files of unknown type always pass.
pub fn check(path: &Path, contents: &str) -> Result<(), String> {
    match Language::detect(path) {
        Some(lang) => check_language(lang, contents),
        None => Ok(()),
    }
}

pub fn check_language(lang: Language, contents: &str) -> Result<(), String> {
    match lang {
        Language::Json => serde_json::from_str::<serde_json::Value>(contents)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        Language::Json5 => json5::from_str::<serde_json::Value>(contents)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        Language::Toml => contents
            .parse::<toml::Table>()
            .map(|_| ())
            .map_err(|e| e.to_string().trim().to_string()),
        Language::Yaml => {
            // Multi-document streams are valid YAML.
            for doc in serde_yaml::Deserializer::from_str(contents) {
                <serde_yaml::Value as serde::Deserialize>::deserialize(doc).map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        Language::CFamily(dialect) => check_delimiters(contents, dialect),
    }
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Verify that `()`, `[]` and `{}` nest correctly outside strings and comments.
pub fn check_delimiters(src: &str, dialect: Dialect) -> Result<(), String> {
    let chars: Vec<char> = src.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                let start = line;
                let mut depth = 1;
                i += 2;
                loop {
                    match (chars.get(i), chars.get(i + 1)) {
                        (None, _) => return Err(format!("line {start}: unterminated block comment")),
                        (Some('*'), Some('/')) => {
                            depth -= 1;
                            i += 2;
                            if depth == 0 {
                                break;
                            }
                        }
                        (Some('/'), Some('*')) if dialect.rust => {
                            depth += 1;
                            i += 2;
                        }
                        (Some('\n'), _) => {
                            line += 1;
                            i += 1;
                        }
                        _ => i += 1,
                    }
                }
            }
            'r' if dialect.rust && is_raw_string_start(&chars, i) => {
                i = skip_raw_string(&chars, i, &mut line)?;
            }
            '"' => {
                i = skip_quoted(&chars, i, '"', &mut line, false)?;
            }
            '`' if dialect.backtick_strings => {
                i = skip_quoted(&chars, i, '`', &mut line, true)?;
            }
            '\'' if dialect.char_literals => {
                i = skip_quoted(&chars, i, '\'', &mut line, false)?;
            }
            '\'' if dialect.rust => {
                i = skip_rust_quote(&chars, i);
            }
            '(' | '[' | '{' => {
                stack.push((c, line));
                i += 1;
            }
            ')' | ']' | '}' => {
                match stack.pop() {
                    Some((open, _)) if closing_for(open) == c => {}
                    Some((open, opened_at)) => {
                        return Err(format!(
                            "line {line}: expected '{}' to close '{open}' from line {opened_at}, found '{c}'",
                            closing_for(open)
                        ));
                    }
                    None => return Err(format!("line {line}: unexpected '{c}'")),
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    match stack.pop() {
        Some((open, opened_at)) => Err(format!("line {opened_at}: unclosed '{open}'")),
        None => Ok(()),
    }
}

/// Skip a string opened at `start`; returns the index after the closing quote.
fn skip_quoted(
    chars: &[char],
    start: usize,
    quote: char,
    line: &mut usize,
    multiline: bool,
) -> Result<usize, String> {
    let opened_at = *line;
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    *line += 1;
                }
                i += 2;
            }
            c if c == quote => return Ok(i + 1),
            '\n' => {
                if !multiline && quote != '"' {
                    return Err(format!("line {opened_at}: unterminated character literal"));
                }
                *line += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Err(format!("line {opened_at}: unterminated string"))
}

fn is_raw_string_start(chars: &[char], i: usize) -> bool {
    if i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_') {
        return false;
    }
    let mut j = i + 1;
    while chars.get(j) == Some(&'#') {
        j += 1;
    }
    chars.get(j) == Some(&'"')
}

fn skip_raw_string(chars: &[char], start: usize, line: &mut usize) -> Result<usize, String> {
    let opened_at = *line;
    let mut i = start + 1;
    let mut hashes = 0;
    while chars.get(i) == Some(&'#') {
        hashes += 1;
        i += 1;
    }
    i += 1; // opening quote
    while i < chars.len() {
        if chars[i] == '\n' {
            *line += 1;
        }
        if chars[i] == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
            return Ok(i + 1 + hashes);
        }
        i += 1;
    }
    Err(format!("line {opened_at}: unterminated raw string"))
}

/// A Rust `'` is either a char literal or a lifetime/label.
fn skip_rust_quote(chars: &[char], start: usize) -> usize {
    match (chars.get(start + 1), chars.get(start + 2)) {
        (Some('\\'), _) => {
            let mut i = start + 2;
            while i < chars.len() && chars[i] != '\'' && chars[i] != '\n' {
                i += 1;
            }
            i + 1
        }
        (Some(_), Some('\'')) => start + 3,
        _ => start + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go() -> Dialect {
        match Language::detect(Path::new("main.go")) {
            Some(Language::CFamily(d)) => d,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn rust() -> Dialect {
        Dialect {
            rust: true,
            ..Dialect::default()
        }
    }

    #[test]
    fn test_detect() {
        assert_eq!(Language::detect(Path::new("a.JSON")), Some(Language::Json));
        assert_eq!(Language::detect(Path::new("ci.yml")), Some(Language::Yaml));
        assert!(Language::detect(Path::new("README.md")).is_none());
        assert!(Language::detect(Path::new("Makefile")).is_none());
    }

    #[test]
    fn test_unknown_extension_passes() {
        assert!(check(Path::new("notes.txt"), "{{{").is_ok());
    }

    #[test]
    fn test_balanced_go() {
        let src = "package main\n\nfunc main() {\n\ts := `raw { string`\n\tr := '}'\n\tfmt.Println(\"}\", s, r) // }\n}\n";
        assert!(check_delimiters(src, go()).is_ok());
    }

    #[test]
    fn test_missing_brace_reported_with_line() {
        let src = "func main() {\n\tif x {\n\t\ty()\n}\n";
        let err = check_delimiters(src, go()).unwrap_err();
        assert!(err.contains("line 1"), "got: {err}");
        assert!(err.contains("unclosed '{'"), "got: {err}");
    }

    #[test]
    fn test_mismatched_delimiter() {
        let err = check_delimiters("f(a, b]\n", go()).unwrap_err();
        assert!(err.contains("expected ')'"), "got: {err}");
    }

    #[test]
    fn test_unexpected_closer() {
        let err = check_delimiters("x := 1\n}\n", go()).unwrap_err();
        assert_eq!(err, "line 2: unexpected '}'");
    }

    #[test]
    fn test_unterminated_string() {
        let err = check_delimiters("s := \"abc\n", go()).unwrap_err();
        assert!(err.contains("unterminated"), "got: {err}");
    }

    #[test]
    fn test_rust_lifetimes_and_raw_strings() {
        let src = "fn f<'a>(x: &'a str) -> char {\n    let _ = r#\"{ \"quoted\" \"#;\n    /* outer /* inner */ } */\n    '{'\n}\n";
        assert!(check_delimiters(src, rust()).is_ok());
    }

    #[test]
    fn test_block_comment_unterminated() {
        assert!(check_delimiters("/* never closed {", go()).is_err());
    }

    #[test]
    fn test_structured_formats() {
        assert!(check(Path::new("a.json"), r#"{"a": [1, 2]}"#).is_ok());
        assert!(check(Path::new("a.json"), r#"{"a": [1, 2}"#).is_err());
        assert!(check(Path::new("a.json5"), "{a: 1, // c\n}").is_ok());
        assert!(check(Path::new("Cargo.toml"), "[package]\nname = \"x\"\n").is_ok());
        assert!(check(Path::new("Cargo.toml"), "[package\nname = \"x\"\n").is_err());
        assert!(check(Path::new("a.yaml"), "a: 1\n---\nb: [2]\n").is_ok());
        assert!(check(Path::new("a.yaml"), "a: [1, 2\n").is_err());
    }
}
