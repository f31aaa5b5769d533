//! Dispatcher behaviour against the in-memory driver and probe

use std::sync::Arc;
use std::time::Duration;

use sitewatch_harness::pages::collection::PERMALINK_XPATH;
use sitewatch_harness::pages::search::PAGER_SUMMARY_CLASS;
use sitewatch_harness::testing::{FakeDriver, FakeElement, FakePage, FakeProbe};
use sitewatch_harness::{
    AvailabilityPolicy, DispatchSettings, Dispatcher, Outcome, RawRow, Verdict, WaitPolicy,
};

const COLLECTIONS: &str = "https://example.org/collections";

fn settings() -> DispatchSettings {
    DispatchSettings {
        waits: WaitPolicy {
            element: Duration::ZERO,
            mirador: Duration::from_millis(30),
        },
        availability: AvailabilityPolicy::default(),
        check_timeout: Duration::from_millis(500),
        link_concurrency: 4,
    }
}

fn dispatcher(driver: FakeDriver, probe: FakeProbe) -> Dispatcher {
    Dispatcher::new(Arc::new(driver), Arc::new(probe), settings())
}

fn listing(summary: &str) -> FakeDriver {
    FakeDriver::new().with_page(
        COLLECTIONS,
        FakePage::new().with_element(
            FakeElement::new("div")
                .with_class(PAGER_SUMMARY_CLASS)
                .with_text(summary),
        ),
    )
}

async fn run(dispatcher: &Dispatcher, url: &str, test_type: &str, input: Option<&str>) -> Outcome {
    dispatcher.dispatch(&RawRow::new(0, url, test_type, input)).await
}

#[tokio::test]
async fn collection_count_matches_pager_total() {
    let d = dispatcher(listing("1 - 20 of 42"), FakeProbe::new());
    let outcome = run(&d, COLLECTIONS, "collection_count_test", Some("42")).await;

    assert_eq!(outcome.verdict, Verdict::Passed, "{}", outcome.message);
    assert_eq!(outcome.passed(), Some(true));
}

#[tokio::test]
async fn collection_count_mismatch_reports_both_values() {
    let d = dispatcher(listing("1 - 20 of 42"), FakeProbe::new());
    let outcome = run(&d, COLLECTIONS, "collection_count_test", Some("43")).await;

    assert_eq!(outcome.passed(), Some(false));
    assert!(outcome.message.contains("42"), "{}", outcome.message);
    assert!(outcome.message.contains("43"), "{}", outcome.message);
}

#[tokio::test]
async fn absent_element_fails() {
    let d = dispatcher(
        FakeDriver::new().with_page(COLLECTIONS, FakePage::new()),
        FakeProbe::new(),
    );
    let outcome = run(&d, COLLECTIONS, "element_present_test", Some("id|my-element")).await;

    assert_eq!(outcome.verdict, Verdict::Failed);
}

#[tokio::test]
async fn unsupported_lookup_method_errors() {
    let d = dispatcher(
        FakeDriver::new().with_page(COLLECTIONS, FakePage::new()),
        FakeProbe::new(),
    );
    let outcome = run(&d, COLLECTIONS, "element_present_test", Some("bogus|sel")).await;

    assert_eq!(outcome.verdict, Verdict::Errored);
    assert_eq!(outcome.passed(), None);
    assert!(outcome.message.contains("bogus"));
}

#[tokio::test]
async fn unknown_test_type_errors_instead_of_raising() {
    let d = dispatcher(FakeDriver::new(), FakeProbe::new());
    let outcome = run(&d, COLLECTIONS, "screenshot_test", None).await;

    assert_eq!(outcome.verdict, Verdict::Errored);
    assert!(outcome.message.contains("screenshot_test"));
    assert!(outcome.result_label().starts_with("Error: "));
}

#[tokio::test]
async fn non_numeric_input_never_reaches_the_page() {
    for test_type in ["collection_count_test", "mirador_page_count_test"] {
        let driver = Arc::new(listing("1 - 20 of 42"));
        let d = Dispatcher::new(driver.clone(), Arc::new(FakeProbe::new()), settings());
        let outcome = run(&d, COLLECTIONS, test_type, Some("forty-two")).await;

        assert_eq!(outcome.verdict, Verdict::Errored, "{}", test_type);
        assert!(outcome.message.contains("forty-two"));
        assert!(driver.navigations().is_empty());
    }
}

#[tokio::test]
async fn hung_navigation_times_out_as_error() {
    let d = dispatcher(
        FakeDriver::new().with_page(COLLECTIONS, FakePage::new().hanging()),
        FakeProbe::new(),
    );
    let outcome = run(&d, COLLECTIONS, "facet_load_test", Some("genre")).await;

    assert_eq!(outcome.verdict, Verdict::Errored);
    assert!(outcome.message.contains("timed out"), "{}", outcome.message);
    assert!(outcome.elapsed >= Duration::from_millis(500));
}

#[tokio::test]
async fn probe_failure_during_availability_is_an_error() {
    let d = dispatcher(
        FakeDriver::new().with_page(COLLECTIONS, FakePage::new()),
        FakeProbe::new(),
    );
    let outcome = run(&d, COLLECTIONS, "site_availability_test", None).await;

    assert_eq!(outcome.verdict, Verdict::Errored);
    assert!(outcome.message.contains("connection refused"));
}

#[tokio::test]
async fn invalid_links_lists_every_broken_link() {
    let page = FakePage::new()
        .with_element(FakeElement::link("https://ok.example/"))
        .with_element(FakeElement::link("https://gone.example/a"))
        .with_element(FakeElement::link("mailto:webmaster@example.org"))
        .with_element(FakeElement::link("https://gone.example/b"))
        .with_element(FakeElement::link("https://soft404.example/"));
    let probe = FakeProbe::new()
        .with_page("https://ok.example/", 200, "fine")
        .with_page("https://gone.example/a", 404, "")
        .with_page("https://gone.example/b", 500, "")
        .with_page("https://soft404.example/", 200, "Sorry, Page Not Found");

    let d = dispatcher(FakeDriver::new().with_page(COLLECTIONS, page), probe);
    let outcome = run(&d, COLLECTIONS, "invalid_links_test", None).await;

    assert_eq!(outcome.verdict, Verdict::Failed);
    for broken in ["https://gone.example/a", "https://gone.example/b", "https://soft404.example/"] {
        assert!(outcome.message.contains(broken), "{} missing from {}", broken, outcome.message);
    }
    assert!(!outcome.message.contains("ok.example"));
    assert!(!outcome.message.contains("mailto"));
}

fn permalink_site() -> (FakeDriver, FakeProbe) {
    let item = "https://example.org/item/7";
    let ark = "https://n2t.net/ark:/12345/x7";
    let target = "https://example.org/islandora/object/demo:7";

    let driver = FakeDriver::new()
        .with_page(
            item,
            FakePage::new().with_query(PERMALINK_XPATH, vec![FakeElement::link(ark)]),
        )
        .with_page(ark, FakePage::new().redirecting_to(target))
        .with_page(target, FakePage::new());
    let probe = FakeProbe::new().with_page(target, 200, "<html>item</html>");
    (driver, probe)
}

#[tokio::test]
async fn permalink_redirect_ignores_trailing_slash() {
    let (driver, probe) = permalink_site();
    let d = dispatcher(driver, probe);
    let outcome = run(
        &d,
        "https://example.org/item/7",
        "permalink_redirect_test",
        Some("https://example.org/islandora/object/demo:7/"),
    )
    .await;

    assert_eq!(outcome.verdict, Verdict::Passed, "{}", outcome.message);
}

#[tokio::test]
async fn permalink_redirect_mismatch_fails() {
    let (driver, probe) = permalink_site();
    let d = dispatcher(driver, probe);
    let outcome = run(
        &d,
        "https://example.org/item/7",
        "permalink_redirect_test",
        Some("https://example.org/islandora/object/demo:8"),
    )
    .await;

    assert_eq!(outcome.verdict, Verdict::Failed);
    assert!(outcome.message.contains("demo:8"));
    assert!(outcome.message.contains("demo:7"));
}

#[tokio::test]
async fn transcript_check_names_the_missing_player() {
    let d = dispatcher(
        FakeDriver::new().with_page(COLLECTIONS, FakePage::new()),
        FakeProbe::new(),
    );
    let outcome = run(&d, COLLECTIONS, "ableplayer_transcript_load_test", None).await;

    assert_eq!(outcome.verdict, Verdict::Failed);
    assert!(outcome.message.contains("AblePlayer did not load"));
}

#[tokio::test]
async fn rows_run_in_input_order() {
    let driver = listing("1 - 20 of 42")
        .with_page("https://example.org/viewer", FakePage::new().with_element(
            FakeElement::new("div")
                .with_class("openseadragon-container")
                .with_child(FakeElement::new("canvas")),
        ));
    let d = dispatcher(driver, FakeProbe::new());

    let rows = vec![
        RawRow::new(0, COLLECTIONS, "collection_count_test", Some("42")),
        RawRow::new(1, COLLECTIONS, "made_up_test", None),
        RawRow::new(2, "https://example.org/viewer", "openseadragon_load_test", None),
        RawRow::new(3, COLLECTIONS, "Collection Count Test", Some("7")),
    ];
    let mut outcomes: Vec<Outcome> = Vec::new();
    d.run_rows(&rows, &mut outcomes).await;

    let seen: Vec<(usize, Verdict)> = outcomes.iter().map(|o| (o.row_index, o.verdict)).collect();
    assert_eq!(
        seen,
        vec![
            (0, Verdict::Passed),
            (1, Verdict::Errored),
            (2, Verdict::Passed),
            (3, Verdict::Failed),
        ]
    );
}
