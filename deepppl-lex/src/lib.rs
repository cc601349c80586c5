#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{LexError, Lexer};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_numbers_distinguishes_ints_and_reals() {
        let ks = kinds("3 2.5 1e3 .5 10.");
        assert_eq!(
            ks,
            vec![
                TokenKind::Int(3),
                TokenKind::Real(2.5),
                TokenKind::Real(1000.0),
                TokenKind::Real(0.5),
                TokenKind::Real(10.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_skips_all_comment_styles() {
        let src = "// line\nint N; # hash\n/* block\n * comment */ real x;";
        let idents: Vec<String> = kinds(src)
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Ident(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(idents, vec!["int", "N", "real", "x"]);
    }

    #[test]
    fn lex_block_comment_variants() {
        for src in [
            "/* a */ real x;",
            "/* a\n b */ real x;",
            "/** doc */ real x;",
            "/*\n * doc\n */ real x;",
            "/**/ real x;",
            "/* a ** b */ real x;",
        ] {
            let ks = kinds(src);
            assert_eq!(
                ks,
                vec![
                    TokenKind::Ident("real".to_string()),
                    TokenKind::Ident("x".to_string()),
                    TokenKind::Semi,
                    TokenKind::Eof,
                ],
                "source: {src:?}"
            );
        }
    }

    #[test]
    fn lex_rejects_unterminated_block_comment() {
        let err = Lexer::new("real x; /* never closed").lex().unwrap_err();
        assert!(err.message.contains("unterminated block comment"));
        assert_eq!(err.span.offset(), 8);
    }

    #[test]
    fn lex_elementwise_operators_and_members() {
        let ks = kinds("a .* b ./ c mlp.l1 x$shape");
        assert!(ks.contains(&TokenKind::DotStar));
        assert!(ks.contains(&TokenKind::DotSlash));
        assert!(ks.contains(&TokenKind::Dot));
        assert!(ks.contains(&TokenKind::Dollar));
    }

    #[test]
    fn lex_keywords_do_not_swallow_longer_identifiers() {
        let ks = kinds("for in int information");
        assert_eq!(ks[0], TokenKind::KwFor);
        assert_eq!(ks[1], TokenKind::KwIn);
        assert_eq!(ks[2], TokenKind::Ident("int".to_string()));
        assert_eq!(ks[3], TokenKind::Ident("information".to_string()));
    }

    #[test]
    fn lex_sampling_and_factor_tokens() {
        let ks = kinds("x ~ normal(0, 1); target += 2;");
        assert_eq!(ks[1], TokenKind::Tilde);
        assert!(ks.contains(&TokenKind::PlusEq));
    }

    #[test]
    fn lex_rejects_unknown_character() {
        let err = Lexer::new("real x @ 2;").lex().unwrap_err();
        assert!(err.message.contains("unexpected character"));
        assert_eq!(err.span.offset(), 7);
    }

    #[test]
    fn lex_string_escapes() {
        let ks = kinds(r#"print("a\"b");"#);
        assert!(ks.contains(&TokenKind::String("a\"b".to_string())));
    }
}
