/*!
 * Tests for placeholder protection
 */

use std::sync::Arc;

use docbatch::translation::{Glossary, SpanKind, TerminologyProtector};

fn protector_with(pairs: &[(&str, &str)]) -> TerminologyProtector {
    TerminologyProtector::new(Arc::new(Glossary::from_pairs(pairs.iter().copied(), true)))
}

#[test]
fn test_roundTrip_withoutTerms_shouldReproduceInput() {
    let protector = TerminologyProtector::default();
    let texts = [
        "Plain sentence without links.",
        "See https://example.com/a?b=c&d=e, then ftp://files.example.org/pub.",
        "Cited as doi:10.1038/nature12373 and https://doi.org/10.1000/182.",
        "Visit www.nih.gov or cdc.gov/obesity for details.",
        "中文句子里有链接https://www.who.int/zh。",
        "Already contains ⟦U0⟧ literally, plus https://a.org.",
    ];

    for text in texts {
        let protected = protector.protect(text);
        let restored = protector.restore(&protected.text, &protected.spans);
        assert_eq!(restored.text, text, "round trip of {:?}", text);
        assert!(!restored.is_degraded());
    }
}

#[test]
fn test_protect_everySpan_shouldBeReplacedByItsToken() {
    let protector = protector_with(&[("body mass index", "体重指数")]);
    let protected = protector.protect("The body mass index (see https://bmi.org) matters.");

    assert_eq!(protected.spans.len(), 2);
    for span in &protected.spans {
        assert!(protected.text.contains(&span.token));
        assert!(!protected.text.contains(&span.original));
    }
    let kinds: Vec<SpanKind> = protected.spans.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![SpanKind::Term, SpanKind::Url]);
}

#[test]
fn test_protect_longestTerm_shouldWin() {
    let protector = protector_with(&[("heart", "心脏"), ("heart disease", "心脏病")]);
    let protected = protector.protect("heart disease risk");
    let restored = protector.restore(&protected.text, &protected.spans);

    assert_eq!(protected.spans.len(), 1);
    assert_eq!(restored.text, "心脏病 risk");
}

#[test]
fn test_protect_termInsideUrl_shouldStayInUrl() {
    let protector = protector_with(&[("obesity", "肥胖")]);
    let text = "obesity data at https://example.org/obesity/stats";
    let protected = protector.protect(text);
    let restored = protector.restore(&protected.text, &protected.spans);

    assert_eq!(restored.text, "肥胖 data at https://example.org/obesity/stats");
}

#[test]
fn test_restore_tokenDropped_shouldFlagDegradedAndKeepOthers() {
    let protector = TerminologyProtector::default();
    let protected = protector.protect("Links https://a.org and https://b.org here.");
    assert_eq!(protected.spans.len(), 2);

    let damaged = protected.text.replace(&protected.spans[0].token, "");
    let restored = protector.restore(&damaged, &protected.spans);

    assert!(restored.is_degraded());
    assert_eq!(restored.missing, vec![protected.spans[0].token.clone()]);
    assert!(restored.text.contains("https://b.org"));
}

#[test]
fn test_restore_tokensReordered_shouldStillResolve() {
    let protector = TerminologyProtector::default();
    let protected = protector.protect("A https://a.org B https://b.org");
    let (first, second) = (&protected.spans[0].token, &protected.spans[1].token);
    let reordered = format!("B {} A {}", second, first);

    let restored = protector.restore(&reordered, &protected.spans);
    assert_eq!(restored.text, "B https://b.org A https://a.org");
}
