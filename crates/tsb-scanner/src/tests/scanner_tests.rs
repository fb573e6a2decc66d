use crate::scanner::Scanner;
use crate::token::{Literal, TokenKind};

fn kinds(src: &str) -> Vec<TokenKind> {
    Scanner::new(src)
        .scan_tokens()
        .expect("scan failed")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn scans_keywords_and_identifiers() {
    assert_eq!(
        kinds("let x = value;"),
        vec![
            TokenKind::Let,
            TokenKind::Identifier,
            TokenKind::Equal,
            TokenKind::Identifier,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn contextual_keywords_stay_identifiers() {
    let toks = Scanner::new("async of as from get set").scan_tokens().unwrap();
    for t in &toks[..toks.len() - 1] {
        assert_eq!(t.kind, TokenKind::Identifier, "{}", t.lexeme);
    }
}

#[test]
fn slash_after_identifier_is_division() {
    assert_eq!(
        kinds("a / b"),
        vec![
            TokenKind::Identifier,
            TokenKind::Slash,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn slash_in_expression_position_is_regex() {
    let toks = Scanner::new("x = /ab+c/gi;").scan_tokens().unwrap();
    assert_eq!(toks[2].kind, TokenKind::Regex);
    match &toks[2].literal {
        Some(Literal::Regex { pattern, flags }) => {
            assert_eq!(pattern, "ab+c");
            assert_eq!(flags, "gi");
        }
        other => panic!("expected regex literal, got {other:?}"),
    }
}

#[test]
fn regex_character_class_may_contain_slash() {
    let toks = Scanner::new("= /[/]/").scan_tokens().unwrap();
    assert_eq!(toks[1].kind, TokenKind::Regex);
}

#[test]
fn numeric_literals_cover_all_radixes() {
    let toks = Scanner::new("0xFF 0b101 0o17 1_000 1.5e3 .25").scan_tokens().unwrap();
    let values: Vec<f64> = toks[..6].iter().map(|t| t.number()).collect();
    assert_eq!(values, vec![255.0, 5.0, 15.0, 1000.0, 1500.0, 0.25]);
}

#[test]
fn bigint_suffix_produces_bigint_token() {
    let toks = Scanner::new("42n 0xffn").scan_tokens().unwrap();
    assert_eq!(toks[0].kind, TokenKind::BigInt);
    assert_eq!(toks[0].literal, Some(Literal::BigInt(42)));
    assert_eq!(toks[1].literal, Some(Literal::BigInt(255)));
}

#[test]
fn string_escapes() {
    let toks = Scanner::new(r#""a\n\t\x41B\u{1F600}""#).scan_tokens().unwrap();
    assert_eq!(toks[0].string_value(), "a\n\tAB\u{1F600}");
}

#[test]
fn unterminated_string_is_an_error() {
    assert!(Scanner::new("\"abc").scan_tokens().is_err());
    assert!(Scanner::new("\"abc\ndef\"").scan_tokens().is_err());
}

#[test]
fn template_without_holes_is_one_token() {
    let toks = Scanner::new("`hello`").scan_tokens().unwrap();
    assert_eq!(toks[0].kind, TokenKind::TemplateFull);
    match &toks[0].literal {
        Some(Literal::Template { cooked, raw }) => {
            assert_eq!(cooked, "hello");
            assert_eq!(raw, "hello");
        }
        other => panic!("unexpected literal {other:?}"),
    }
}

#[test]
fn template_holes_split_into_head_middle_tail() {
    let toks = Scanner::new("`a${x}b${y}c`").scan_tokens().unwrap();
    let ks: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
    assert_eq!(
        ks,
        vec![
            TokenKind::TemplateHead,
            TokenKind::Identifier,
            TokenKind::TemplateMiddle,
            TokenKind::Identifier,
            TokenKind::TemplateTail,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn template_hole_tolerates_nested_braces() {
    let toks = Scanner::new("`v=${ {a: 1}.a }`").scan_tokens().unwrap();
    assert_eq!(toks[0].kind, TokenKind::TemplateHead);
    assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
    assert!(toks.iter().any(|t| t.kind == TokenKind::TemplateTail));
}

#[test]
fn template_raw_preserves_escapes() {
    let toks = Scanner::new(r"`a\nb`").scan_tokens().unwrap();
    match &toks[0].literal {
        Some(Literal::Template { cooked, raw }) => {
            assert_eq!(cooked, "a\nb");
            assert_eq!(raw, "a\\nb");
        }
        other => panic!("unexpected literal {other:?}"),
    }
}

#[test]
fn line_and_column_are_one_based() {
    let toks = Scanner::new("a\n  bb").scan_tokens().unwrap();
    assert_eq!((toks[0].line, toks[0].column), (1, 1));
    assert_eq!((toks[1].line, toks[1].column), (2, 3));
}

#[test]
fn private_identifier() {
    let toks = Scanner::new("this.#count").scan_tokens().unwrap();
    assert_eq!(toks[2].kind, TokenKind::PrivateIdentifier);
    assert_eq!(toks[2].lexeme, "#count");
}

#[test]
fn optional_chain_vs_ternary_with_number() {
    assert_eq!(
        kinds("a?.b"),
        vec![
            TokenKind::Identifier,
            TokenKind::QuestionDot,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
    // `a ? .5 : 1` must not lex `?.`
    let ks = kinds("a ? .5 : 1");
    assert_eq!(ks[1], TokenKind::Question);
    assert_eq!(ks[2], TokenKind::Number);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        kinds("a // trailing\n/* block\nspanning */ b"),
        vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
    );
}
