//! End-to-end controller runs against the mock completion client.

use tocgen_core::completion::mock::{MockCompletion, MockReply};
use tocgen_core::{
    AdvanceError, CompletionError, CompletionReason, ContextMode, Document, GenerationSettings,
    Phase, SessionStore, WindowStrategy, advance, window,
};

fn book(pages: usize) -> Document {
    Document::paged(
        "book.pdf",
        (1..=pages).map(|i| format!("Chapter text on page {i}")).collect(),
    )
}

fn load(store: &mut SessionStore, doc: &Document, strategy: WindowStrategy) {
    store
        .submit(doc.name(), "\n\n", || window(doc, &strategy, Some("--- PAGE {n} ---")))
        .unwrap();
}

fn distinct_replies(n: usize) -> Vec<MockReply> {
    (1..=n)
        .map(|i| MockReply::text(format!("<tr><td>Part {i}</td><td>{}</td></tr>", i * 10)))
        .collect()
}

#[tokio::test]
async fn page_blocks_need_one_advance_per_block() {
    let doc = book(60);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::PageBlocks { pages_per_block: 10 });
    let client = MockCompletion::with_sequence(distinct_replies(6));
    let settings = GenerationSettings::default();

    for round in 1..=5 {
        let report = advance(&mut store, &client, &settings).await.unwrap();
        assert_eq!(report.round, round);
        assert_eq!(report.phase, Phase::Running);
        assert_eq!(report.remaining, 6 - round);
    }
    let report = advance(&mut store, &client, &settings).await.unwrap();
    assert_eq!(report.phase, Phase::Complete(CompletionReason::Exhausted));

    let session = store.session().unwrap();
    assert_eq!(session.current_index(), 6);
    assert_eq!(session.remaining(), 0);
    assert_eq!(session.accumulator().fragments().len(), 6);

    let requests = client.requests();
    assert!(requests[0].turns[0].content.contains("--- PAGE 1 ---"));
    assert!(requests[5].turns[0].content.contains("--- PAGE 60 ---"));
    assert!(!requests[5].turns[0].content.contains("--- PAGE 50 ---"));
}

#[tokio::test]
async fn short_document_under_head_tail_is_one_round() {
    let doc = book(10);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::HeadTail { head: 25, tail: 25 });
    let client = MockCompletion::new(MockReply::text("<table>toc</table>"));
    let settings = GenerationSettings::default();

    let report = advance(&mut store, &client, &settings).await.unwrap();
    assert_eq!(report.phase, Phase::Complete(CompletionReason::Exhausted));
    assert_eq!(client.call_count(), 1);
    assert!(client.requests()[0].turns[0].content.contains("--- PAGE 10 ---"));
}

#[tokio::test]
async fn advance_after_completion_does_nothing() {
    let doc = book(3);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::HeadTail { head: 3, tail: 0 });
    let client = MockCompletion::new(MockReply::text("<table>toc</table>"));
    let settings = GenerationSettings::default();

    advance(&mut store, &client, &settings).await.unwrap();
    let before = store.session().unwrap().accumulator().html();

    let err = advance(&mut store, &client, &settings).await.unwrap_err();
    assert!(matches!(err, AdvanceError::NothingLeft));
    assert_eq!(client.call_count(), 1);
    assert_eq!(store.session().unwrap().accumulator().html(), before);
}

#[tokio::test]
async fn empty_reply_completes_without_appending() {
    let doc = book(30);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::PageBlocks { pages_per_block: 10 });
    let client = MockCompletion::with_sequence(vec![
        MockReply::text("<table><tr><td>1</td></tr>"),
        MockReply::text("   \n"),
    ]);
    let settings = GenerationSettings::default();

    advance(&mut store, &client, &settings).await.unwrap();
    let report = advance(&mut store, &client, &settings).await.unwrap();
    assert!(!report.appended);
    assert_eq!(report.phase, Phase::Complete(CompletionReason::NoProgress));
    assert_eq!(store.session().unwrap().accumulator().fragments().len(), 1);
}

#[tokio::test]
async fn repeated_output_is_not_duplicated() {
    let doc = book(30);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::PageBlocks { pages_per_block: 10 });
    let client = MockCompletion::new(MockReply::text("<table>same</table>"));
    let settings = GenerationSettings {
        context_mode: ContextMode::Conversational,
        ..Default::default()
    };

    advance(&mut store, &client, &settings).await.unwrap();
    let report = advance(&mut store, &client, &settings).await.unwrap();
    assert_eq!(report.phase, Phase::Complete(CompletionReason::NoProgress));

    let session = store.session().unwrap();
    assert_eq!(session.accumulator().html(), "<table>same</table>");
    assert_eq!(client.requests()[1].turns.len(), 3);
}

#[tokio::test]
async fn failed_round_can_be_retried() {
    let doc = book(20);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::PageBlocks { pages_per_block: 10 });
    let client = MockCompletion::with_sequence(vec![
        MockReply::Fail(CompletionError::RateLimited { retry_after: None }),
        MockReply::text("<tr><td>A</td></tr>"),
        MockReply::text("<tr><td>B</td></tr>"),
    ]);
    let settings = GenerationSettings::default();

    let err = advance(&mut store, &client, &settings).await.unwrap_err();
    assert!(matches!(
        err,
        AdvanceError::Completion(CompletionError::RateLimited { .. })
    ));
    let session = store.session().unwrap();
    assert_eq!(session.current_index(), 0);
    assert!(!session.in_flight());
    assert!(session.accumulator().is_empty());

    advance(&mut store, &client, &settings).await.unwrap();
    let report = advance(&mut store, &client, &settings).await.unwrap();
    assert_eq!(report.phase, Phase::Complete(CompletionReason::Exhausted));
    assert_eq!(
        store.session().unwrap().accumulator().html(),
        "<tr><td>A</td></tr>\n\n<tr><td>B</td></tr>"
    );
    // The failed attempt and the retry sent the same window.
    let requests = client.requests();
    assert_eq!(requests[0].turns, requests[1].turns);
}

#[tokio::test]
async fn flow_document_is_a_single_window() {
    let doc = Document::flow(
        "report.docx",
        vec!["Contents".into(), "1 Introduction ..... 3".into()],
    );
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::PageBlocks { pages_per_block: 2 });
    assert_eq!(store.session().unwrap().windows().len(), 1);

    let client = MockCompletion::new(MockReply::text("```html\n<table>t</table>\n```"));
    let report = advance(&mut store, &client, &GenerationSettings::default())
        .await
        .unwrap();
    assert_eq!(report.phase, Phase::Complete(CompletionReason::Exhausted));
    assert_eq!(store.session().unwrap().accumulator().html(), "<table>t</table>");
}

#[tokio::test]
async fn dropped_round_does_not_lock_the_session() {
    let doc = book(20);
    let mut store = SessionStore::new();
    load(&mut store, &doc, WindowStrategy::PageBlocks { pages_per_block: 10 });
    let settings = GenerationSettings::default();

    let slow = MockCompletion::new(MockReply::text("<tr><td>late</td></tr>"))
        .with_delay(std::time::Duration::from_millis(200));
    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        advance(&mut store, &slow, &settings),
    )
    .await;
    assert!(timed_out.is_err());

    let session = store.session().unwrap();
    assert!(!session.in_flight());
    assert_eq!(session.current_index(), 0);
    assert!(session.accumulator().is_empty());

    let fast = MockCompletion::new(MockReply::text("<tr><td>Part 1</td></tr>"));
    let report = advance(&mut store, &fast, &settings).await.unwrap();
    assert_eq!(report.round, 1);
    assert_eq!(report.remaining, 1);
    assert!(fast.requests()[0].turns[0].content.contains("--- PAGE 1 ---"));
}
