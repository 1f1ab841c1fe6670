use crate::model::{Author, Category, Enclosure, FeedDocument, Item};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The feed XML could not be parsed as RSS or Atom.
#[derive(Debug, Error)]
#[error("feed could not be parsed: {0}")]
pub struct ParseError(#[from] feed_rs::parser::ParseFeedError);

/// Parse raw feed bytes into a [`FeedDocument`].
///
/// Delegates format handling (RSS 0.9x/1.0/2.0, Atom, JSON Feed) to
/// `feed-rs` and maps its model onto ours. Entries missing a stable id get
/// one derived from their link, title and publication time, so the same
/// entry keeps the same id across refetches.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let feed = parser::parse(bytes)?;

    Ok(FeedDocument {
        title: feed.title.map(|t| t.content),
        link: feed.links.first().map(|l| l.href.clone()),
        description: feed.description.map(|t| t.content),
        language: feed.language,
        copyright: feed.rights.map(|t| t.content),
        authors: feed.authors.into_iter().map(person_to_author).collect(),
        categories: feed.categories.into_iter().map(map_category).collect(),
        items: feed.entries.into_iter().map(entry_to_item).collect(),
    })
}

/// Published timestamps are seconds since epoch, UTC.
fn epoch_secs(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn entry_to_item(entry: feed_rs::model::Entry) -> Item {
    let link = entry.links.first().map(|l| l.href.clone());
    let published = entry.published.map(epoch_secs);
    let title = entry.title.map(|t| t.content);
    let id = stable_id(&entry.id, link.as_deref(), title.as_deref(), published);

    Item {
        title,
        link,
        description: entry.summary.map(|t| t.content),
        content: entry.content.and_then(|c| c.body),
        date_published: published,
        date_updated: entry.updated.map(epoch_secs),
        id,
        language: entry.language,
        comments_count: None,
        comments_link: None,
        comments_feed: None,
        comment_post_uri: None,
        authors: entry.authors.into_iter().map(person_to_author).collect(),
        enclosures: entry.media.into_iter().flat_map(media_to_enclosures).collect(),
        categories: entry.categories.into_iter().map(map_category).collect(),
    }
}

fn person_to_author(person: feed_rs::model::Person) -> Author {
    let name = Some(person.name).filter(|n| !n.trim().is_empty());
    Author {
        name,
        email: person.email,
        uri: person.uri,
    }
}

fn map_category(category: feed_rs::model::Category) -> Category {
    let term = Some(category.term).filter(|t| !t.trim().is_empty());
    Category {
        term,
        scheme: category.scheme,
        label: category.label,
    }
}

fn media_to_enclosures(media: feed_rs::model::MediaObject) -> Vec<Enclosure> {
    let title = media.title.map(|t| t.content);
    let object_duration = media.duration.map(|d| d.as_secs());

    media
        .content
        .into_iter()
        .map(|content| Enclosure {
            url: content.url.map(|u| u.to_string()),
            title: title.clone(),
            mime_type: content.content_type.map(|m| m.to_string()),
            length: content.size,
            duration: content.duration.map(|d| d.as_secs()).or(object_duration),
        })
        .collect()
}

/// Use the entry's own id when it has one; otherwise derive a stable digest
/// from the fields that identify the entry.
fn stable_id(existing: &str, link: Option<&str>, title: Option<&str>, published: Option<i64>) -> String {
    let trimmed = existing.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title.unwrap_or(""),
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{hash:x}")
}
