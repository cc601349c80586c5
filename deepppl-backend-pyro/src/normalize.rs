#![forbid(unsafe_code)]

/// Canonical form of generated Python used to compare two outputs.
///
/// Blank lines, comment lines and trailing comments are dropped, whitespace outside string
/// literals is removed, and indentation is reduced to its nesting depth. Variable
/// annotations (`x: float = 1.0`) are stripped, and a bare annotation line disappears.
/// Each remaining line becomes `depth:content`.
pub fn normalize(src: &str) -> String {
    let mut out = String::new();
    let mut widths: Vec<usize> = vec![0];
    for raw in src.lines() {
        let content = squeeze(raw);
        if content.is_empty() {
            continue;
        }
        let Some(content) = strip_annotation(&content) else {
            continue;
        };

        let width = indent_width(raw);
        while widths.len() > 1 && widths.last().is_some_and(|w| width < *w) {
            widths.pop();
        }
        if widths.last().is_some_and(|w| width > *w) {
            widths.push(width);
        }
        out.push_str(&format!("{}:{}\n", widths.len() - 1, content));
    }
    out
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Removes whitespace and `#` comments outside string literals.
fn squeeze(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '#' => break,
                '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                c if c.is_whitespace() => {}
                c => out.push(c),
            },
        }
    }
    out
}

/// `name:T=value` becomes `name=value`; `name:T` is dropped.
fn strip_annotation(content: &str) -> Option<String> {
    let ident_len = content
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(content.len());
    let is_annotation = ident_len > 0
        && content[ident_len..].starts_with(':')
        && !content.ends_with(':')
        && !content.starts_with(|c: char| c.is_ascii_digit());
    if !is_annotation {
        return Some(content.to_string());
    }
    content
        .find('=')
        .map(|eq| format!("{}{}", &content[..ident_len], &content[eq..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_and_comments_are_insignificant() {
        let a = "def model(x=None):\n    theta = pyro.sample('theta', dist.Normal(0, 1))\n";
        let b = "# generated\ndef model( x = None ):\n\n  theta=pyro.sample('theta',dist.Normal(0,1))  # prior\n";
        assert_eq!(normalize(a), normalize(b));
    }

    #[test]
    fn indentation_depth_is_kept() {
        let a = "for i in range(1, 3):\n    x = i\ny = 1\n";
        let b = "for i in range(1, 3):\n    x = i\n    y = 1\n";
        assert_ne!(normalize(a), normalize(b));
    }

    #[test]
    fn spaces_inside_strings_are_kept() {
        assert_ne!(normalize("print('a b')"), normalize("print('ab')"));
        assert_eq!(normalize("x = '# not a comment'"), "0:x='# not a comment'\n");
    }

    #[test]
    fn annotations_are_stripped() {
        assert_eq!(normalize("x: float = 1.0"), normalize("x = 1.0"));
        assert_eq!(normalize("def f():\n    y: int\n    pass\n"), "0:deff():\n1:pass\n");
    }
}
