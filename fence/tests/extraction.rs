use fence::{DelimiterSpec, Document, decode, extract};
use proptest::prelude::*;

fn bodies(source: &str, delimiters: &DelimiterSpec) -> Vec<String> {
    extract(source, delimiters)
        .into_iter()
        .map(|b| b.body.to_string())
        .collect()
}

#[test]
fn markdown_document_end_to_end() {
    let source = r#"# Guide

Some prose.

```js
verify(42)
```

More prose with `inline` code.

```javascript title="async"
Promise.resolve(7).then(v => verify(v))
```
"#;
    let doc = Document::scan(source, 0, &DelimiterSpec::fence());
    let decoded: Vec<_> = doc.blocks.iter().map(|b| decode(b).unwrap()).collect();

    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].language(), "js");
    assert_eq!(decoded[0].code, "verify(42)\n");
    assert_eq!(decoded[1].language(), "javascript");
    assert_eq!(decoded[1].code, "Promise.resolve(7).then(v => verify(v))\n");
}

#[test]
fn inline_backtick_does_not_open_a_block() {
    let source = "use `x` here\n```js\n1\n```";
    assert_eq!(bodies(source, &DelimiterSpec::fence()), vec!["js\n1\n"]);
}

/// Body text free of marker characters.
fn body_text() -> impl Strategy<Value = String> {
    "[a-z0-9 ();=.\n]{0,24}"
}

/// Prose between blocks; no backticks either.
fn prose() -> impl Strategy<Value = String> {
    "[A-Za-z #*\n]{0,16}"
}

proptest! {
    #[test]
    fn prop_n_pairs_yield_n_spans_in_order(
        parts in prop::collection::vec((prose(), body_text()), 0..8),
        tail in prose(),
    ) {
        let delimiters = DelimiterSpec::fence();
        let mut source = String::new();
        for (text, body) in &parts {
            source.push_str(text);
            source.push_str(&delimiters.wrap(body));
        }
        source.push_str(&tail);

        let spans = extract(&source, &delimiters);
        prop_assert_eq!(spans.len(), parts.len());
        for (span, (_, body)) in spans.iter().zip(&parts) {
            prop_assert_eq!(span.body, body.as_str());
        }
        for pair in spans.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn prop_dangling_open_marker_adds_nothing(
        parts in prop::collection::vec(body_text(), 0..6),
        dangling in body_text(),
    ) {
        let delimiters = DelimiterSpec::fence();
        let mut source: String = parts.iter().map(|b| delimiters.wrap(b)).collect();
        source.push_str(&delimiters.open);
        source.push_str(&dangling);

        prop_assert_eq!(extract(&source, &delimiters).len(), parts.len());
    }

    #[test]
    fn prop_reextraction_is_idempotent(
        parts in prop::collection::vec((prose(), body_text()), 0..8),
    ) {
        let delimiters = DelimiterSpec::new("<<<", ">>>");
        let source: String = parts
            .iter()
            .map(|(text, body)| format!("{}{}", text, delimiters.wrap(body)))
            .collect();

        let first = bodies(&source, &delimiters);
        let rewrapped: String = first.iter().map(|b| delimiters.wrap(b)).collect();
        prop_assert_eq!(bodies(&rewrapped, &delimiters), first);
    }

    #[test]
    fn prop_decode_rejoin_round_trips(tag in "[a-z ]{0,10}", code in body_text()) {
        let delimiters = DelimiterSpec::fence();
        let source = delimiters.wrap(&format!("{}\n{}", tag, code));
        let span = extract(&source, &delimiters)[0];
        let block = decode(&span).unwrap();

        prop_assert_eq!(block.language_tag, tag.as_str());
        prop_assert_eq!(block.rejoin(), span.body);
    }
}
