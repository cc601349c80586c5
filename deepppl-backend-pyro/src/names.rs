#![forbid(unsafe_code)]

/// Counters for synthesized Python names. One per compilation unless a batch wants names
/// unique across several programs.
#[derive(Debug, Default)]
pub struct NameGen {
    next_anon: u32,
    next_site: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// `anon0`, `anon1`, ...
    pub fn fresh_anon(&mut self) -> String {
        let name = format!("anon{}", self.next_anon);
        self.next_anon += 1;
        name
    }

    /// Observation site numbers start at 1.
    pub fn fresh_site(&mut self) -> u32 {
        self.next_site += 1;
        self.next_site
    }

    pub fn anon_count(&self) -> u32 {
        self.next_anon
    }
}

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// DSL identifiers that are Python keywords get a trailing underscore.
pub fn py_name(id: &str) -> String {
    if PY_KEYWORDS.contains(&id) {
        format!("{id}_")
    } else {
        id.to_string()
    }
}

/// Single-quoted Python string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_names_never_repeat() {
        let mut names = NameGen::new();
        let got: Vec<_> = (0..3).map(|_| names.fresh_anon()).collect();
        assert_eq!(got, vec!["anon0", "anon1", "anon2"]);
        assert_eq!(names.anon_count(), 3);
    }

    #[test]
    fn sites_are_numbered_from_one() {
        let mut names = NameGen::new();
        assert_eq!(names.fresh_site(), 1);
        assert_eq!(names.fresh_site(), 2);
    }

    #[test]
    fn keywords_are_suffixed() {
        assert_eq!(py_name("lambda"), "lambda_");
        assert_eq!(py_name("theta"), "theta");
    }

    #[test]
    fn quotes_escape_backslashes_and_quotes() {
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(quote("a\\b"), "'a\\\\b'");
    }
}
