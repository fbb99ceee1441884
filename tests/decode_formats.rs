//! Integration tests for decoding: one document per format through the public
//! API, checked through the normalized accessors.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use feedsift::classify::{classify, Format};
use feedsift::decode::{decode, decode_atom, decode_json_feed, decode_rss};
use feedsift::model::{latest_update, Feed, Item, EPOCH};
use feedsift::validate::rule;
use feedsift::{ItemMetadata, Metadata, SourceType};

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <description>Posts about <b>things</b></description>
    <language>en-us</language>
    <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
    <item>
      <title>Hello</title>
      <link>https://example.com/hello</link>
      <guid>https://example.com/hello</guid>
      <dc:creator>Jane Doe</dc:creator>
      <category>news</category>
      <pubDate>Tue, 02 Jan 2024 08:30:00 +0000</pubDate>
      <content:encoded><![CDATA[<p>Body<script>alert(1)</script></p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xml:lang="en">
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <title>Atom Example</title>
  <updated>2024-03-01T12:00:00Z</updated>
  <link href="https://example.org/"/>
  <author><name>Jane Doe</name><email>jane@example.com</email></author>
  <entry>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <title>Entry One</title>
    <link href="https://example.org/one"/>
    <updated>2024-03-01T12:00:00Z</updated>
    <summary>Short</summary>
  </entry>
</feed>"#;

const JSON_FEED: &str = r#"{
  "version": "https://jsonfeed.org/version/1.1",
  "title": "JSON Example",
  "home_page_url": "https://example.net/",
  "feed_url": "https://example.net/feed.json",
  "authors": [{"name": "Sam"}],
  "items": [
    {"id": "1", "content_html": "<p>one</p>", "date_published": "2024-02-01T00:00:00Z"},
    {"id": 2, "content_text": "two", "date_published": "2024-02-03T00:00:00Z",
     "date_modified": "2024-02-04T00:00:00Z"}
  ]
}"#;

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_rss_accessors() {
    let decoded = decode_rss(RSS.as_bytes()).unwrap();
    assert!(decoded.is_valid());

    let feed = decoded.feed;
    assert_eq!(feed.source_type(), SourceType::Rss);
    assert_eq!(feed.title(), "Example Blog");
    assert_eq!(feed.link(), "https://example.com/");
    assert_eq!(feed.description(), "Posts about <b>things</b>");
    assert_eq!(feed.language(), "en-us");
    assert_eq!(
        feed.published(),
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    );

    let items = feed.items();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.title(), "Hello");
    assert_eq!(item.id(), "https://example.com/hello");
    assert_eq!(item.authors(), vec!["Jane Doe".to_string()]);
    assert_eq!(item.categories(), vec!["news".to_string()]);
    assert_eq!(item.content(), "<p>Body</p>");
    assert_eq!(item.feed_title(), "Example Blog");
}

#[test]
fn test_atom_accessors() {
    let decoded = decode_atom(ATOM.as_bytes()).unwrap();
    assert!(decoded.is_valid(), "{:?}", decoded.validation);

    let feed = decoded.feed;
    assert_eq!(feed.source_type(), SourceType::Atom);
    assert_eq!(feed.title(), "Atom Example");
    assert_eq!(feed.link(), "https://example.org/");
    assert_eq!(feed.language(), "en");
    assert_eq!(feed.authors(), vec!["Jane Doe (jane@example.com)".to_string()]);

    let items = feed.items();
    assert_eq!(items[0].title(), "Entry One");
    assert_eq!(items[0].link(), "https://example.org/one");
    assert_eq!(items[0].description(), "Short");
    assert_eq!(items[0].source_type(), SourceType::Atom);
}

#[test]
fn test_json_feed_accessors() {
    let decoded = decode_json_feed(JSON_FEED.as_bytes()).unwrap();
    assert!(decoded.is_valid(), "{:?}", decoded.validation);

    let feed = decoded.feed;
    assert_eq!(feed.source_type(), SourceType::JsonFeed);
    assert_eq!(feed.title(), "JSON Example");
    assert_eq!(feed.source_url(), "https://example.net/feed.json");
    assert_eq!(feed.authors(), vec!["Sam".to_string()]);

    let items = feed.items();
    let ids: Vec<String> = items.iter().map(ItemMetadata::id).collect();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(items[1].content(), "two");
}

// ============================================================================
// Date sentinel
// ============================================================================

#[test]
fn test_missing_modified_date_is_epoch() {
    let feed = decode_json_feed(JSON_FEED.as_bytes()).unwrap().feed;
    let items = feed.items();
    assert_eq!(items[0].updated(), EPOCH);
    assert_eq!(
        items[1].updated(),
        Utc.with_ymd_and_hms(2024, 2, 4, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_json_feed_level_dates_from_items() {
    let feed = decode_json_feed(JSON_FEED.as_bytes()).unwrap().feed;
    assert_eq!(
        feed.published(),
        Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap()
    );
    assert_eq!(
        feed.updated(),
        Utc.with_ymd_and_hms(2024, 2, 4, 0, 0, 0).unwrap()
    );
    assert_eq!(latest_update(&feed.items()), feed.updated());

    let empty = br#"{"version": "https://jsonfeed.org/version/1", "title": "E", "items": []}"#;
    let feed = decode_json_feed(empty).unwrap().feed;
    assert_eq!(feed.updated(), EPOCH);
    assert_eq!(feed.published(), EPOCH);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_atom_feed_author_rule() {
    let no_authors = ATOM.replace(
        "<author><name>Jane Doe</name><email>jane@example.com</email></author>",
        "",
    );
    let decoded = decode_atom(no_authors.as_bytes()).unwrap();
    let errors = decoded.validation.expect("entry without author must fail");
    assert!(errors.has("Feed.Authors", rule::ENTRY_AUTHORS));

    let entry_authors = no_authors.replace(
        "<summary>Short</summary>",
        "<summary>Short</summary><author><name>Entry Author</name></author>",
    );
    assert!(decode_atom(entry_authors.as_bytes()).unwrap().is_valid());
}

#[test]
fn test_json_feed_version_rule() {
    let bad = JSON_FEED.replace("https://jsonfeed.org/version/1.1", "2.0");
    let errors = decode_json_feed(bad.as_bytes())
        .unwrap()
        .validation
        .unwrap();
    assert!(errors.has("Feed.Version", rule::JSONFEED_VERSION));
}

// ============================================================================
// Classification → decode
// ============================================================================

#[test]
fn test_generic_xml_classified_then_decoded() {
    let format = classify(Some("application/xml; charset=utf-8"), ATOM.as_bytes()).unwrap();
    assert_eq!(format, Format::Atom);
    let decoded = decode(format, ATOM.as_bytes()).unwrap();
    assert_eq!(decoded.feed.source_type(), SourceType::Atom);

    let format = classify(Some("text/xml"), RSS.as_bytes()).unwrap();
    assert_eq!(format, Format::Rss);
}

#[test]
fn test_latin1_document_transcoded() {
    let mut bytes =
        b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><rss version=\"2.0\"><channel><title>Caf"
            .to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(
        b"</title><link>https://example.com/</link><description>D</description></channel></rss>",
    );
    let feed = decode_rss(&bytes).unwrap().feed;
    assert_eq!(feed.title(), "Café");
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_feed_and_items_survive_serde() {
    for (name, feed) in [
        ("rss", decode_rss(RSS.as_bytes()).unwrap().feed),
        ("atom", decode_atom(ATOM.as_bytes()).unwrap().feed),
        ("json", decode_json_feed(JSON_FEED.as_bytes()).unwrap().feed),
    ] {
        let json = serde_json::to_string(&feed).unwrap();
        let back: Feed = serde_json::from_str(&json).unwrap();
        assert_eq!(back, feed, "{name}");

        let items = feed.items();
        let json = serde_json::to_string(&items).unwrap();
        let back: Vec<Item> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, items, "{name}");
    }
}
