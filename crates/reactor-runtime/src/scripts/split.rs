//! Statement splitting.
//!
//! Splits on `;` outside of single-quoted literals, double-quoted identifiers,
//! `--` line comments, `/* */` block comments (which nest in PostgreSQL) and
//! dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`), so PL/pgSQL function
//! bodies stay in one statement.

use std::iter::Peekable;
use std::str::Chars;

enum Quote {
    Single,
    Double,
    LineComment,
    BlockComment { depth: usize },
    Dollar { tag: String, body_start: usize },
}

/// Split SQL into individual statements, dropping comment-only fragments.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    // Whether the fragment holds anything besides whitespace and comments.
    let mut has_code = false;
    let mut quote: Option<Quote> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        match &quote {
            Some(Quote::Single) => {
                // A doubled '' closes and immediately reopens, which is correct.
                if c == '\'' {
                    quote = None;
                }
            }
            Some(Quote::Double) => {
                if c == '"' {
                    quote = None;
                }
            }
            Some(Quote::LineComment) => {
                if c == '\n' {
                    quote = None;
                }
            }
            Some(Quote::BlockComment { depth }) => {
                let depth = *depth;
                if c == '*' && chars.peek() == Some(&'/') {
                    consume(&mut chars, &mut current);
                    quote = (depth > 1).then(|| Quote::BlockComment { depth: depth - 1 });
                } else if c == '/' && chars.peek() == Some(&'*') {
                    consume(&mut chars, &mut current);
                    quote = Some(Quote::BlockComment { depth: depth + 1 });
                }
            }
            Some(Quote::Dollar { tag, body_start }) => {
                if c == '$'
                    && current.len() >= body_start + tag.len()
                    && current.ends_with(tag.as_str())
                {
                    quote = None;
                }
            }
            None => match c {
                '-' if chars.peek() == Some(&'-') => quote = Some(Quote::LineComment),
                '/' if chars.peek() == Some(&'*') => {
                    consume(&mut chars, &mut current);
                    quote = Some(Quote::BlockComment { depth: 1 });
                }
                ';' => {
                    if has_code {
                        push_statement(&mut statements, &current);
                    }
                    current.clear();
                    has_code = false;
                }
                c if c.is_whitespace() => {}
                c => {
                    has_code = true;
                    match c {
                        '\'' => quote = Some(Quote::Single),
                        '"' => quote = Some(Quote::Double),
                        '$' => {
                            if let Some(tag) = read_dollar_tag(&mut chars, &mut current) {
                                quote = Some(Quote::Dollar {
                                    tag,
                                    body_start: current.len(),
                                });
                            }
                        }
                        _ => {}
                    }
                }
            },
        }
    }

    // The last statement may not end with ;
    if has_code {
        push_statement(&mut statements, &current);
    }
    statements
}

fn consume(chars: &mut Peekable<Chars<'_>>, current: &mut String) {
    if let Some(next) = chars.next() {
        current.push(next);
    }
}

/// After a `$`, consume the rest of a dollar-quote opener if one follows.
///
/// Returns the full tag (e.g. `$$` or `$body$`). Characters consumed while
/// probing are always appended to `current`.
fn read_dollar_tag(chars: &mut Peekable<Chars<'_>>, current: &mut String) -> Option<String> {
    let mut tag = String::from("$");

    while let Some(&next) = chars.peek() {
        if next == '$' {
            chars.next();
            current.push(next);
            tag.push(next);
            return Some(tag);
        }
        let starts_ident = tag.len() == 1;
        let valid = if starts_ident {
            next.is_alphabetic() || next == '_'
        } else {
            next.is_alphanumeric() || next == '_'
        };
        if !valid {
            break;
        }
        chars.next();
        current.push(next);
        tag.push(next);
    }

    None
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    statements.push(raw.trim().trim_end_matches(';').trim().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_statements() {
        let stmts = split_statements("SELECT 1; SELECT 2; SELECT 3;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_without_trailing_semicolon() {
        let stmts = split_statements("CREATE TABLE a (id INT);\nCREATE TABLE b (id INT)");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], "CREATE TABLE b (id INT)");
    }

    #[test]
    fn test_split_with_dollar_quoted_function() {
        let sql = r#"
CREATE FUNCTION test() RETURNS void AS $$
BEGIN
    SELECT 1;
    SELECT 2;
END;
$$ LANGUAGE plpgsql;

SELECT 3;
"#;
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE FUNCTION"));
        assert!(stmts[0].contains("$$ LANGUAGE plpgsql"));
        assert!(stmts[1].contains("SELECT 3"));
    }

    #[test]
    fn test_split_with_named_dollar_tag() {
        let sql = "DO $body$ BEGIN PERFORM 1; END $body$; SELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "DO $body$ BEGIN PERFORM 1; END $body$");
    }

    #[test]
    fn test_split_ignores_semicolons_in_literals_and_comments() {
        let sql = "INSERT INTO notes VALUES ('a; b', 'it''s; fine'); -- trailing; comment\nSELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("INSERT INTO notes"));
        assert!(stmts[1].contains("SELECT 2"));
    }

    #[test]
    fn test_split_keeps_positional_parameters() {
        let stmts = split_statements("PREPARE q AS SELECT $1; EXECUTE q(1);");
        assert_eq!(stmts, vec!["PREPARE q AS SELECT $1", "EXECUTE q(1)"]);
    }

    #[test]
    fn test_split_skips_comment_only_fragments() {
        let stmts = split_statements("-- header only\n;\n\nSELECT 1;\n-- footer");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_block_comments() {
        let sql = "/* setup; part one */ CREATE TABLE a (id INT); /* outer /* inner; */ still; */ SELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "/* setup; part one */ CREATE TABLE a (id INT)");
        assert!(stmts[1].ends_with("SELECT 2"));
    }

    #[test]
    fn test_split_ignores_semicolons_in_quoted_identifiers() {
        let stmts = split_statements(r#"CREATE TABLE "odd;name" (id INT); SELECT 1;"#);
        assert_eq!(stmts, vec![r#"CREATE TABLE "odd;name" (id INT)"#, "SELECT 1"]);
    }

    #[test]
    fn test_split_skips_block_comment_fragments() {
        let stmts = split_statements("/* generated; do not edit */;\nSELECT 1;");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }
}
