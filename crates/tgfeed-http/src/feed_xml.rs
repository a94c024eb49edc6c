//! RSS 2.0 rendering of a [`FeedDocument`].

use std::collections::BTreeMap;

use rss::{ChannelBuilder, GuidBuilder, Item, ItemBuilder};

use tgfeed_core::feed::{FeedDocument, FeedEntry};

const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
const GENERATOR: &str = concat!("tgfeed ", env!("CARGO_PKG_VERSION"));

pub fn render_rss(doc: &FeedDocument) -> String {
    let mut namespaces = BTreeMap::new();
    namespaces.insert("content".to_string(), CONTENT_NS.to_string());

    let items: Vec<Item> = doc.entries.iter().map(render_item).collect();

    ChannelBuilder::default()
        .namespaces(namespaces)
        .title(doc.title.clone())
        .link(doc.link.clone())
        .description(doc.description.clone())
        .pub_date(Some(doc.created.to_rfc2822()))
        .last_build_date(Some(doc.updated.to_rfc2822()))
        .generator(Some(GENERATOR.to_string()))
        .items(items)
        .build()
        .to_string()
}

fn render_item(entry: &FeedEntry) -> Item {
    let guid = GuidBuilder::default()
        .value(entry.id.clone())
        .permalink(false)
        .build();

    ItemBuilder::default()
        .title(Some(entry.title.clone()))
        .link(Some(entry.link.clone()))
        .description(Some(entry.description.clone()))
        .content(Some(entry.content.clone()))
        .author(Some(entry.author.clone()))
        .pub_date(Some(entry.created.to_rfc2822()))
        .guid(Some(guid))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_channel_and_items() {
        let doc = FeedDocument {
            title: "Test Channel - RSS Feed".to_string(),
            link: "http://localhost:8080/rss/42".to_string(),
            description: "RSS feed for Telegram channel: Test Channel".to_string(),
            author: "testchan".to_string(),
            created: Utc.timestamp_opt(1_000, 0).unwrap(),
            updated: Utc.timestamp_opt(2_000, 0).unwrap(),
            entries: vec![FeedEntry {
                id: "42-1".to_string(),
                title: "Hello <world>".to_string(),
                link: "https://t.me/testchan/1".to_string(),
                description: "Hello <world>".to_string(),
                content: "<p>Hello &lt;world&gt;</p>".to_string(),
                author: "@alice".to_string(),
                created: Utc.timestamp_opt(1_500, 0).unwrap(),
            }],
        };

        let xml = render_rss(&doc);
        let parsed = rss::Channel::read_from(xml.as_bytes()).unwrap();
        assert_eq!(parsed.title(), "Test Channel - RSS Feed");
        assert_eq!(parsed.link(), "http://localhost:8080/rss/42");
        assert_eq!(parsed.items().len(), 1);

        let item = &parsed.items()[0];
        assert_eq!(item.title(), Some("Hello <world>"));
        assert_eq!(item.content(), Some("<p>Hello &lt;world&gt;</p>"));
        let guid = item.guid().unwrap();
        assert_eq!(guid.value(), "42-1");
        assert!(!guid.is_permalink());
        assert!(xml.contains("xmlns:content"));
    }
}
