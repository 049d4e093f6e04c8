//! Text-level checks that run before structural parsing
//!
//! Expression text is authored outside the engine, so it is screened for
//! tokens that name host capabilities even though the expression language
//! itself has no way to reach them.

use crate::error::{FormulaError, FormulaResult};
use lazy_regex::{regex, Regex};

/// Parser limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum expression length in characters
    pub max_length: usize,
    /// Maximum call nesting depth
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_length: 8192,
            max_depth: 64,
        }
    }
}

fn denied_words() -> &'static Regex {
    regex!(
        r"(?i)\b(eval|exec|execute|system|process|file|files|directory|registry|reflection|assembly|socket|network|shell|spawn|invoke|import|require|environment|thread|unsafe|goto)\b"
    )
}

fn denied_sequences() -> &'static Regex {
    regex!(r"(?i)(\$\{|<%|%>|<script|javascript:|vbscript:|\.\.\.)")
}

/// Find the first deny-listed token in `text`, lowercased
pub fn find_unsafe_token(text: &str) -> Option<String> {
    let word = denied_words().find(text);
    let sequence = denied_sequences().find(text);
    let first = match (word, sequence) {
        (Some(w), Some(s)) => Some(if w.start() <= s.start() { w } else { s }),
        (w, s) => w.or(s),
    };
    first.map(|m| m.as_str().to_lowercase())
}

/// Check if `text` is free of deny-listed tokens
pub fn is_safe_expression(text: &str) -> bool {
    find_unsafe_token(text).is_none()
}

/// Check parenthesis balance with a running counter, skipping quoted text.
///
/// The counter must never go negative and must end at zero.
pub fn check_parentheses(text: &str) -> FormulaResult<()> {
    let mut depth: usize = 0;
    let mut last_open = 0;
    let mut quote: Option<(char, usize)> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if let Some((q, _)) = quote {
            if c == q {
                // Doubled quote is an escaped quote
                if chars.peek().map(|&(_, n)| n) == Some(q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some((c, pos)),
            '(' => {
                depth += 1;
                last_open = pos;
            }
            ')' => {
                if depth == 0 {
                    return Err(FormulaError::UnbalancedParentheses { position: pos });
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if let Some((_, position)) = quote {
        return Err(FormulaError::UnterminatedString { position });
    }
    if depth != 0 {
        return Err(FormulaError::UnbalancedParentheses { position: last_open });
    }
    Ok(())
}

/// Run every text check, stopping at the first failure
pub fn check_text(text: &str, options: &ParseOptions) -> FormulaResult<()> {
    if text.trim().is_empty() {
        return Err(FormulaError::EmptyExpression);
    }
    let length = text.chars().count();
    if length > options.max_length {
        return Err(FormulaError::ExpressionTooLong {
            length,
            limit: options.max_length,
        });
    }
    check_parentheses(text)?;
    if let Some(token) = find_unsafe_token(text) {
        return Err(FormulaError::UnsafeExpression { token });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_balanced() {
        assert!(check_parentheses("ADD(1, 2)").is_ok());
        assert!(check_parentheses("IF(a, \"(\", ')')").is_ok());
        assert_eq!(
            check_parentheses("ADD(1, 2"),
            Err(FormulaError::UnbalancedParentheses { position: 3 })
        );
        assert_eq!(
            check_parentheses("ADD(1, 2))"),
            Err(FormulaError::UnbalancedParentheses { position: 9 })
        );
        // Closing before opening never balances out
        assert!(check_parentheses(")ADD(1, 2(").is_err());
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            check_parentheses("CONCAT(\"abc, 1)"),
            Err(FormulaError::UnterminatedString { position: 7 })
        );
        assert!(check_parentheses("CONCAT('it''s', 1)").is_ok());
    }

    #[test]
    fn test_deny_list() {
        assert_eq!(find_unsafe_token("EVAL(x)"), Some("eval".into()));
        assert_eq!(find_unsafe_token("System.IO"), Some("system".into()));
        assert_eq!(find_unsafe_token("CONCAT('${x}')"), Some("${".into()));
        assert!(is_safe_expression("processingFee + filed"));
        assert!(is_safe_expression("ADD(quantity, 1)"));
    }

    #[test]
    fn test_check_text_order() {
        let options = ParseOptions::default();
        assert_eq!(check_text("   ", &options), Err(FormulaError::EmptyExpression));
        assert!(matches!(
            check_text("exec(1", &options),
            Err(FormulaError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            check_text("exec(1)", &options),
            Err(FormulaError::UnsafeExpression { .. })
        ));
        let short = ParseOptions {
            max_length: 4,
            ..ParseOptions::default()
        };
        assert!(matches!(
            check_text("ADD(1, 2)", &short),
            Err(FormulaError::ExpressionTooLong { length: 9, limit: 4 })
        ));
    }

    fn any_case(word: &'static str) -> impl Strategy<Value = String> {
        proptest::collection::vec(any::<bool>(), word.len()).prop_map(move |upper| {
            word.chars()
                .zip(upper)
                .map(|(c, u)| if u { c.to_ascii_uppercase() } else { c })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn denied_token_in_any_case_is_unsafe(
            token in prop_oneof![
                any_case("eval"),
                any_case("exec"),
                any_case("system"),
                any_case("process"),
                any_case("file"),
                any_case("reflection"),
                any_case("<script"),
                any_case("javascript:"),
            ],
            prefix in "[A-Z]{1,6}\\(",
            suffix in "[ ,)(]{0,6}",
        ) {
            let text = format!("{prefix}{token}{suffix}");
            prop_assert!(!is_safe_expression(&text));
        }
    }
}
