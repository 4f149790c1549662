//! SQL LIKE / ILIKE pattern matching.
//!
//! Patterns use two wildcards:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A pattern is compiled once into a token list and matched many times,
//! since the expression compiler fixes the pattern at query-build time.
//! Matching operates on Unicode scalar values; `ILIKE` folds both pattern
//! and candidate to lowercase.

/// One element of a compiled pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    /// `%`: zero or more characters
    Any,
    /// `_`: exactly one character
    One,
    /// A literal character
    Lit(char),
}

/// A compiled LIKE / ILIKE pattern.
#[derive(Clone, Debug)]
pub struct LikePattern {
    tokens: Vec<Token>,
    case_insensitive: bool,
}

impl LikePattern {
    /// Compiles a case-sensitive LIKE pattern.
    pub fn like(pattern: &str) -> Self {
        Self::compile(pattern, false)
    }

    /// Compiles a case-insensitive ILIKE pattern.
    pub fn ilike(pattern: &str) -> Self {
        Self::compile(pattern, true)
    }

    fn compile(pattern: &str, case_insensitive: bool) -> Self {
        let source: String = if case_insensitive {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        let mut tokens = Vec::new();
        for ch in source.chars() {
            let token = match ch {
                '%' => Token::Any,
                '_' => Token::One,
                lit => Token::Lit(lit),
            };
            // Collapse runs of %; they match the same strings and
            // collapsing keeps the backtracking shallow.
            if token == Token::Any && tokens.last() == Some(&Token::Any) {
                continue;
            }
            tokens.push(token);
        }
        Self {
            tokens,
            case_insensitive,
        }
    }

    /// Tests whether the whole of `value` matches this pattern.
    pub fn matches(&self, value: &str) -> bool {
        let chars: Vec<char> = if self.case_insensitive {
            value.to_lowercase().chars().collect()
        } else {
            value.chars().collect()
        };
        match_at(&chars, &self.tokens, 0, 0)
    }
}

fn match_at(v: &[char], tokens: &[Token], vi: usize, ti: usize) -> bool {
    if ti == tokens.len() {
        return vi == v.len();
    }
    match &tokens[ti] {
        Token::Any => {
            // zero or more characters
            for skip in vi..=v.len() {
                if match_at(v, tokens, skip, ti + 1) {
                    return true;
                }
            }
            false
        }
        Token::One => vi < v.len() && match_at(v, tokens, vi + 1, ti + 1),
        Token::Lit(ch) => vi < v.len() && v[vi] == *ch && match_at(v, tokens, vi + 1, ti + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_exact() {
        assert!(LikePattern::like("hello").matches("hello"));
        assert!(!LikePattern::like("world").matches("hello"));
    }

    #[test]
    fn like_percent() {
        assert!(LikePattern::like("%").matches("hello"));
        assert!(LikePattern::like("h%").matches("hello"));
        assert!(LikePattern::like("%o").matches("hello"));
        assert!(LikePattern::like("h%o").matches("hello"));
        assert!(LikePattern::like("%ell%").matches("hello"));
        assert!(!LikePattern::like("x%").matches("hello"));
    }

    #[test]
    fn like_underscore() {
        assert!(LikePattern::like("_ello").matches("hello"));
        assert!(LikePattern::like("h_llo").matches("hello"));
        assert!(LikePattern::like("_____").matches("hello"));
        assert!(!LikePattern::like("______").matches("hello"));
    }

    #[test]
    fn like_combined() {
        assert!(LikePattern::like("h%_o").matches("hello"));
        assert!(LikePattern::like("hello%").matches("hello world"));
        assert!(LikePattern::like("%world").matches("hello world"));
    }

    #[test]
    fn like_empty() {
        assert!(LikePattern::like("").matches(""));
        assert!(LikePattern::like("%").matches(""));
        assert!(!LikePattern::like("_").matches(""));
        assert!(!LikePattern::like("a").matches(""));
    }

    #[test]
    fn like_case_sensitivity() {
        assert!(!LikePattern::like("HELLO").matches("hello"));
        assert!(LikePattern::ilike("HELLO").matches("hello"));
        assert!(LikePattern::ilike("h%O").matches("Hello"));
    }

    #[test]
    fn like_collapses_percent_runs() {
        assert!(LikePattern::like("h%%%o").matches("hello"));
    }
}
