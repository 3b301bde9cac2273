//! End-to-end ingestion: a real SQLite store, a mock HTTP server and the
//! scheduler in between.
//!
//! Each test creates its own in-memory database for isolation.

use chrono::Utc;
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gator::feed::{FeedFetcher, FetchConfig, FetchError, IngestSummary, Scheduler, TickOutcome};
use gator::shutdown::{self, Shutdown};
use gator::storage::{Database, Feed, User};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

async fn user_with_feed(db: &Database, url: &str) -> (User, Feed) {
    let user = db.create_user("alice").await.unwrap();
    let feed = db.create_feed("Example", url, user.id).await.unwrap();
    db.create_feed_follow(user.id, feed.id).await.unwrap();
    (user, feed)
}

fn scheduler(db: &Database, config: FetchConfig) -> Scheduler<Database> {
    let fetcher = FeedFetcher::new(&config).unwrap();
    Scheduler::new(db.clone(), fetcher, Duration::from_secs(60))
}

const TWO_POSTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com/</link>
    <description>Example feed</description>
    <item>
      <title>First</title>
      <link>https://example.com/first</link>
      <description>One</description>
      <pubDate>Wed, 01 May 2024 12:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/second</link>
      <description>Two</description>
      <pubDate>Thu, 02 May 2024 12:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

async fn serve(route: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn summary_of(outcome: &TickOutcome) -> IngestSummary {
    match outcome {
        TickOutcome::Ingested(summary) => *summary,
        other => panic!("expected Ingested, got {other:?}"),
    }
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_refetch_counts_duplicates_without_new_rows() {
    let server = serve("/rss", TWO_POSTS).await;
    let db = test_db().await;
    let (user, _) = user_with_feed(&db, &format!("{}/rss", server.uri())).await;
    let sched = scheduler(&db, FetchConfig::default());

    let first = sched.tick(&mut Shutdown::never()).await.unwrap();
    assert_eq!(
        summary_of(&first.outcome),
        IngestSummary {
            created: 2,
            ..Default::default()
        }
    );

    let second = sched.tick(&mut Shutdown::never()).await.unwrap();
    assert_eq!(
        summary_of(&second.outcome),
        IngestSummary {
            duplicates: 2,
            ..Default::default()
        }
    );

    let posts = db.posts_for_user(user.id, 10).await.unwrap();
    let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Second", "First"]);
}

#[tokio::test]
async fn test_post_fields_are_stored() {
    let body = r#"<rss version="2.0"><channel><title>T</title>
        <item>
          <title>Tom &amp;amp; Jerry</title>
          <link>https://example.com/tj</link>
          <description><![CDATA[<p>Cat &amp; mouse</p>]]></description>
          <pubDate>Wed, 01 May 2024 12:00:00 GMT</pubDate>
        </item>
        <item>
          <link>https://example.com/untitled</link>
          <pubDate>sometime</pubDate>
        </item>
        <item><title>No link</title></item>
      </channel></rss>"#;
    let server = serve("/rss", body).await;
    let db = test_db().await;
    let (user, feed) = user_with_feed(&db, &format!("{}/rss", server.uri())).await;

    let report = scheduler(&db, FetchConfig::default())
        .tick(&mut Shutdown::never())
        .await
        .unwrap();
    assert_eq!(
        summary_of(&report.outcome),
        IngestSummary {
            created: 2,
            skipped: 1,
            ..Default::default()
        }
    );

    let mut posts = db.posts_for_user(user.id, 10).await.unwrap();
    posts.sort_by(|a, b| a.url.cmp(&b.url));

    assert_eq!(posts[0].url, "https://example.com/tj");
    assert_eq!(posts[0].title, "Tom & Jerry");
    assert_eq!(posts[0].description.as_deref(), Some("<p>Cat & mouse</p>"));
    assert_eq!(
        posts[0].published_at.map(|d| d.timestamp()),
        Some(1_714_564_800)
    );
    assert_eq!(posts[0].feed_id, feed.id);

    assert_eq!(posts[1].url, "https://example.com/untitled");
    assert_eq!(posts[1].title, "Untitled");
    assert_eq!(posts[1].description, None);
    assert_eq!(posts[1].published_at, None);
}

#[tokio::test]
async fn test_same_post_in_two_feeds_stored_once() {
    let server = MockServer::start().await;
    for route in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_POSTS))
            .mount(&server)
            .await;
    }
    let db = test_db().await;
    let user = db.create_user("alice").await.unwrap();
    db.create_feed("A", &format!("{}/a", server.uri()), user.id)
        .await
        .unwrap();
    db.create_feed("B", &format!("{}/b", server.uri()), user.id)
        .await
        .unwrap();

    let sched = scheduler(&db, FetchConfig::default());
    let first = sched.tick(&mut Shutdown::never()).await.unwrap();
    let second = sched.tick(&mut Shutdown::never()).await.unwrap();

    assert_eq!(summary_of(&first.outcome).created, 2);
    assert_eq!(summary_of(&second.outcome).duplicates, 2);
    assert_ne!(first.feed.unwrap().id, second.feed.unwrap().id);
}

// ============================================================================
// Selection and claiming
// ============================================================================

#[tokio::test]
async fn test_feeds_are_visited_stalest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<rss version="2.0"><channel><title>T</title></channel></rss>"#,
        ))
        .mount(&server)
        .await;

    let db = test_db().await;
    let user = db.create_user("alice").await.unwrap();
    let a = db
        .create_feed("A", &format!("{}/a", server.uri()), user.id)
        .await
        .unwrap();
    let b = db
        .create_feed("B", &format!("{}/b", server.uri()), user.id)
        .await
        .unwrap();

    let sched = scheduler(&db, FetchConfig::default());
    let mut visited = Vec::new();
    for _ in 0..3 {
        let report = sched.tick(&mut Shutdown::never()).await.unwrap();
        visited.push(report.feed.unwrap().id);
    }

    // Never-fetched feeds come first, then the oldest claim
    assert_eq!(visited, vec![a.id, b.id, a.id]);
}

#[tokio::test]
async fn test_timed_out_feed_is_still_claimed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TWO_POSTS)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let db = test_db().await;
    let (user, feed) = user_with_feed(&db, &server.uri()).await;
    assert_eq!(feed.last_fetched_at, None);

    let config = FetchConfig {
        timeout: Duration::from_millis(200),
        ..FetchConfig::default()
    };
    let report = scheduler(&db, config)
        .tick(&mut Shutdown::never())
        .await
        .unwrap();

    assert!(
        matches!(report.outcome, TickOutcome::FetchFailed(FetchError::Timeout(_))),
        "got {:?}",
        report.outcome
    );
    let claimed = db.get_feed_by_url(&server.uri()).await.unwrap();
    assert!(claimed.last_fetched_at.is_some());
    assert!(db.posts_for_user(user.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claim_advances_an_earlier_fetch_time_to_now() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let db = test_db().await;
    let (_, feed) = user_with_feed(&db, &server.uri()).await;
    db.mark_feed_fetched(feed.id, Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    let before = db
        .get_feed_by_url(&server.uri())
        .await
        .unwrap()
        .last_fetched_at
        .unwrap();

    let report = scheduler(&db, FetchConfig::default())
        .tick(&mut Shutdown::never())
        .await
        .unwrap();
    assert!(matches!(
        report.outcome,
        TickOutcome::FetchFailed(FetchError::HttpStatus(500))
    ));

    let after = db
        .get_feed_by_url(&server.uri())
        .await
        .unwrap()
        .last_fetched_at
        .unwrap();
    assert!(after > before, "{after} should be later than {before}");
    let lag = Utc::now() - after;
    assert!(
        lag >= chrono::Duration::zero() && lag < chrono::Duration::seconds(5),
        "claim time {after} is not close to now"
    );
}

#[tokio::test]
async fn test_malformed_document_stores_nothing() {
    let server = serve("/rss", "<rss><channel><item><title>cut off").await;
    let db = test_db().await;
    let (user, _) = user_with_feed(&db, &format!("{}/rss", server.uri())).await;

    let report = scheduler(&db, FetchConfig::default())
        .tick(&mut Shutdown::never())
        .await
        .unwrap();

    assert!(matches!(report.outcome, TickOutcome::ParseFailed(_)));
    assert!(report.feed.unwrap().id > 0);
    assert!(db.posts_for_user(user.id, 10).await.unwrap().is_empty());
}

// ============================================================================
// Run loop
// ============================================================================

#[tokio::test]
async fn test_run_ingests_then_stops_on_shutdown() {
    let server = serve("/rss", TWO_POSTS).await;
    let db = test_db().await;
    let (user, _) = user_with_feed(&db, &format!("{}/rss", server.uri())).await;

    let (trigger, listener) = shutdown::channel();
    let sched = scheduler(&db, FetchConfig::default());
    let handle = tokio::spawn(async move { sched.run(listener).await });

    // The first tick fires immediately; give it time to finish
    tokio::time::sleep(Duration::from_millis(500)).await;
    trigger.trigger();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run should stop promptly")
        .unwrap()
        .unwrap();
    assert_eq!(db.posts_for_user(user.id, 10).await.unwrap().len(), 2);
}
