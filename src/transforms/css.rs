//! Reference rewriting in stylesheets.

use cssparser::{ParseError, Parser, ParserInput, Token};

type CssParseError<'i> = ParseError<'i, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// `url(...)`, quoted or not.
    Url,
    /// The bare string of `@import "..."`.
    Import,
}

#[derive(Debug)]
struct Found {
    start: usize,
    end: usize,
    url: String,
    form: Form,
}

/// Rewrite every `url()` and `@import` target of a stylesheet.
///
/// `map` returns the replacement for a URL or `None` to keep it. Everything
/// outside the rewritten references is copied byte for byte.
pub fn rewrite_urls(css: &str, mut map: impl FnMut(&str) -> Option<String>) -> String {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut found = Vec::new();
    collect(&mut parser, &mut found);

    let mut out = String::with_capacity(css.len());
    let mut last = 0;
    for f in found {
        let Some(new) = map(&f.url).filter(|new| *new != f.url) else {
            continue;
        };
        out.push_str(&css[last..f.start]);
        match f.form {
            Form::Url => out.push_str(&format!("url(\"{new}\")")),
            Form::Import => out.push_str(&format!("\"{new}\"")),
        }
        last = f.end;
    }
    out.push_str(&css[last..]);
    out
}

/// Every URL referenced by a stylesheet, in source order.
pub fn urls(css: &str) -> Vec<String> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut found = Vec::new();
    collect(&mut parser, &mut found);
    found.into_iter().map(|f| f.url).collect()
}

fn collect<'i, 't>(parser: &mut Parser<'i, 't>, found: &mut Vec<Found>) {
    let mut after_import = false;
    loop {
        let start = parser.position().byte_index();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_) | Token::Comment(_) => continue,
            Token::AtKeyword(name) => {
                after_import = name.eq_ignore_ascii_case("import");
                continue;
            }
            Token::QuotedString(url) if after_import => {
                found.push(Found {
                    start,
                    end: parser.position().byte_index(),
                    url: url.to_string(),
                    form: Form::Import,
                });
            }
            Token::UnquotedUrl(url) => {
                found.push(Found {
                    start,
                    end: parser.position().byte_index(),
                    url: url.to_string(),
                    form: Form::Url,
                });
            }
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let url = parser
                    .parse_nested_block(|p| {
                        Ok::<_, CssParseError>(match p.next() {
                            Ok(Token::QuotedString(s)) => Some(s.to_string()),
                            _ => None,
                        })
                    })
                    .ok()
                    .flatten();
                if let Some(url) = url {
                    found.push(Found {
                        start,
                        end: parser.position().byte_index(),
                        url,
                        form: Form::Url,
                    });
                }
            }
            Token::Function(_)
            | Token::CurlyBracketBlock
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock => {
                let _ = parser.parse_nested_block(|p| {
                    collect(p, found);
                    Ok::<_, CssParseError>(())
                });
            }
            _ => {}
        }
        after_import = false;
    }
}
