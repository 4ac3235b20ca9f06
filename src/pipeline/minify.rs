//! JavaScript minification
//!
//! Strips comments and collapses whitespace. String, template and regular
//! expression literals are copied untouched. A line break is only removed
//! where automatic semicolon insertion cannot depend on it.

/// Characters after which a line break is never significant
const BREAK_SAFE_AFTER: &[char] = &[';', '{', ',', '(', '['];

/// Characters before which a line break is never significant
const BREAK_SAFE_BEFORE: &[char] = &['}', ')', ']', ';', ','];

/// Characters after which a `/` starts a regular expression literal
const REGEX_AFTER: &[char] = &[
    '(', ',', '=', ':', '[', '!', '&', '|', '?', '{', '}', ';', '+', '-', '*', '%', '<', '>', '~',
    '^',
];

/// Keywords after which a `/` starts a regular expression literal
const REGEX_AFTER_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "case", "throw", "new", "delete", "void", "do",
    "else", "yield", "await",
];

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

/// Whether collapsed whitespace `ws` between `prev` and `next` must stay
fn needs_separator(prev: char, next: char, ws: char) -> bool {
    if ws == '\n' {
        return !(BREAK_SAFE_AFTER.contains(&prev) || BREAK_SAFE_BEFORE.contains(&next));
    }

    (is_word(prev) && is_word(next))
        || (prev == '+' && next == '+')
        || (prev == '-' && next == '-')
        || (prev.is_ascii_digit() && next == '.')
}

/// Whether a `/` following the minified output so far starts a regular
/// expression rather than a division
fn starts_regex(out: &str) -> bool {
    let before = out.trim_end();
    let Some(prev) = before.chars().last() else {
        return true;
    };
    if REGEX_AFTER.contains(&prev) {
        return true;
    }

    let rest = before.trim_end_matches(is_word);
    let word = &before[rest.len()..];
    !rest.ends_with('.') && REGEX_AFTER_KEYWORDS.contains(&word)
}

/// Copy a quoted literal starting at `start`; returns the index after it
fn copy_quoted(chars: &[char], start: usize, quote: char, out: &mut String) -> usize {
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        if c == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == quote {
            return i + 1;
        }
        i += 1;
    }
    i
}

/// Copy a regular expression literal body starting at `start`
fn copy_regex(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('/');
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            return i;
        }
        out.push(c);
        match c {
            '\\' if i + 1 < chars.len() => {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return i + 1,
            _ => {}
        }
        i += 1;
    }
    i
}

/// Minify JavaScript source
pub fn minify_js(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut pending: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            pending = Some(if c == '\n' || pending == Some('\n') { '\n' } else { ' ' });
            i += 1;
            continue;
        }

        if c == '/' && i + 1 < chars.len() {
            if chars[i + 1] == '/' {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            if chars[i + 1] == '*' {
                let mut saw_newline = false;
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    saw_newline |= chars[i] == '\n';
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                pending = Some(if saw_newline || pending == Some('\n') { '\n' } else { ' ' });
                continue;
            }
        }

        if let Some(ws) = pending.take() {
            if let Some(prev) = out.chars().last() {
                if needs_separator(prev, c, ws) {
                    out.push(ws);
                }
            }
        }

        match c {
            '"' | '\'' | '`' => {
                i = copy_quoted(&chars, i, c, &mut out);
            }
            '/' if starts_regex(&out) => {
                i = copy_regex(&chars, i, &mut out);
            }
            '\\' if i + 1 < chars.len() => {
                out.push(c);
                out.push(chars[i + 1]);
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strips_comments_and_spaces() {
        let source = "// header\nvar a = 1; /* mid */ var b = 2;\n";
        assert_eq!(minify_js(source), "var a=1;var b=2;");
    }

    #[test]
    fn test_block_bodies_collapse() {
        let source = "function f() {\n  return 1;\n}\n";
        assert_eq!(minify_js(source), "function f(){return 1;}");
    }

    #[test]
    fn test_keeps_line_breaks_needed_for_asi() {
        let source = "var a = 1\nvar b = 2\n";
        assert_eq!(minify_js(source), "var a=1\nvar b=2");
    }

    #[test]
    fn test_strings_untouched() {
        let source = "var s = \"a  // not a comment\";\nvar t = 'it\\'s  /* here */';";
        assert_eq!(
            minify_js(source),
            "var s=\"a  // not a comment\";var t='it\\'s  /* here */';"
        );
    }

    #[test]
    fn test_regex_literal_untouched() {
        let source = "var re = /\\/\\//g;";
        assert_eq!(minify_js(source), "var re=/\\/\\//g;");
    }

    #[test]
    fn test_regex_after_keyword_untouched() {
        let source = "function isUrl(u) {\n  return /^https?:\\/\\//.test(u);\n}\n";
        assert_eq!(
            minify_js(source),
            "function isUrl(u){return/^https?:\\/\\//.test(u);}"
        );
        assert_eq!(
            minify_js("var t = typeof /x/ === 'object';"),
            "var t=typeof/x/==='object';"
        );
        assert_eq!(minify_js("case /a\\/b/:"), "case/a\\/b/:");
    }

    #[test]
    fn test_property_named_like_keyword_divides() {
        assert_eq!(minify_js("var x = a.in / 2 / b;"), "var x=a.in/2/b;");
    }

    #[test]
    fn test_unary_operators_stay_apart() {
        assert_eq!(minify_js("a + +b"), "a+ +b");
        assert_eq!(minify_js("a - -b"), "a- -b");
    }

    #[test]
    fn test_division_is_not_a_regex() {
        assert_eq!(minify_js("var x = a / b / c;"), "var x=a/b/c;");
    }
}
