//! Published data model.
//!
//! These are the structures the engine publishes into the result store,
//! field names PascalCase to match the record schema consumers read. The
//! `*_to_value` conversions apply the drop rules: entries that carry no
//! usable information are never published.

use serde::Serialize;
use serde_json::Value;

/// A parsed feed document, ready to be merged into a source's record.
#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub authors: Vec<Author>,
    pub categories: Vec<Category>,
    pub items: Vec<Item>,
}

impl FeedDocument {
    pub fn authors_value(&self) -> Value {
        authors_to_value(&self.authors)
    }

    pub fn categories_value(&self) -> Value {
        categories_to_value(&self.categories)
    }

    pub fn items_value(&self) -> Value {
        items_to_value(&self.items)
    }
}

/// One feed entry. Timestamps are seconds since epoch.
///
/// Comment metadata is part of the published record shape; the parser fills
/// in whatever the source format provides.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub date_published: Option<i64>,
    pub date_updated: Option<i64>,
    pub id: String,
    pub language: Option<String>,
    pub comments_count: Option<i64>,
    pub comments_link: Option<String>,
    pub comments_feed: Option<String>,
    pub comment_post_uri: Option<String>,
    #[serde(skip_serializing)]
    pub authors: Vec<Author>,
    #[serde(skip_serializing)]
    pub enclosures: Vec<Enclosure>,
    #[serde(skip_serializing)]
    pub categories: Vec<Category>,
}

impl Item {
    /// An item with neither title nor content carries nothing to show.
    fn has_presentable_content(&self) -> bool {
        !(unset(&self.title) && unset(&self.content))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Author {
    pub name: Option<String>,
    pub email: Option<String>,
    pub uri: Option<String>,
}

impl Author {
    fn is_empty(&self) -> bool {
        unset(&self.name) && unset(&self.email) && unset(&self.uri)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Category {
    pub term: Option<String>,
    pub scheme: Option<String>,
    pub label: Option<String>,
}

impl Category {
    fn is_empty(&self) -> bool {
        unset(&self.term) && unset(&self.scheme) && unset(&self.label)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Enclosure {
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "Type")]
    pub mime_type: Option<String>,
    pub length: Option<u64>,
    pub duration: Option<u64>,
}

impl Enclosure {
    /// An enclosure is addressable by url or at least nameable by title.
    fn is_empty(&self) -> bool {
        unset(&self.url) && unset(&self.title)
    }
}

fn unset(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(str::is_empty)
}

pub fn authors_to_value(authors: &[Author]) -> Value {
    Value::Array(
        authors
            .iter()
            .filter(|a| !a.is_empty())
            .map(to_value_lossy)
            .collect(),
    )
}

pub fn categories_to_value(categories: &[Category]) -> Value {
    Value::Array(
        categories
            .iter()
            .filter(|c| !c.is_empty())
            .map(to_value_lossy)
            .collect(),
    )
}

pub fn enclosures_to_value(enclosures: &[Enclosure]) -> Value {
    Value::Array(
        enclosures
            .iter()
            .filter(|e| !e.is_empty())
            .map(to_value_lossy)
            .collect(),
    )
}

pub fn items_to_value(items: &[Item]) -> Value {
    Value::Array(
        items
            .iter()
            .filter(|item| item.has_presentable_content())
            .map(item_to_value)
            .collect(),
    )
}

fn item_to_value(item: &Item) -> Value {
    let mut value = to_value_lossy(item);
    if let Value::Object(map) = &mut value {
        map.insert("Authors".to_string(), authors_to_value(&item.authors));
        map.insert("Enclosures".to_string(), enclosures_to_value(&item.enclosures));
        map.insert("Categories".to_string(), categories_to_value(&item.categories));
    }
    value
}

fn to_value_lossy<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn titled_item(title: &str, content: &str) -> Item {
        Item {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            id: "id".to_string(),
            ..Item::default()
        }
    }

    #[test]
    fn test_item_without_title_and_content_is_dropped() {
        let items = vec![titled_item("", ""), titled_item("Kept", "")];
        let value = items_to_value(&items);
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["Title"], "Kept");
    }

    #[test]
    fn test_item_with_only_content_is_kept() {
        let items = vec![titled_item("", "body text")];
        assert_eq!(items_to_value(&items).as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_author_is_dropped() {
        let authors = vec![
            Author::default(),
            Author {
                email: Some("news@example.com".to_string()),
                ..Author::default()
            },
        ];
        let value = authors_to_value(&authors);
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["Email"], "news@example.com");
    }

    #[test]
    fn test_blank_strings_count_as_unset() {
        let authors = vec![Author {
            name: Some(String::new()),
            email: Some(String::new()),
            uri: Some(String::new()),
        }];
        assert_eq!(authors_to_value(&authors), Value::Array(vec![]));
    }

    #[test]
    fn test_empty_category_is_dropped() {
        let categories = vec![
            Category::default(),
            Category {
                term: Some("tech".to_string()),
                ..Category::default()
            },
        ];
        assert_eq!(categories_to_value(&categories).as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_enclosure_needs_url_or_title() {
        let enclosures = vec![
            Enclosure::default(),
            Enclosure {
                mime_type: Some("audio/mpeg".to_string()),
                length: Some(1024),
                ..Enclosure::default()
            },
            Enclosure {
                url: Some("https://example.com/ep1.mp3".to_string()),
                ..Enclosure::default()
            },
        ];
        let value = enclosures_to_value(&enclosures);
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["Url"], "https://example.com/ep1.mp3");
    }

    #[test]
    fn test_item_value_filters_nested_lists() {
        let item = Item {
            title: Some("Story".to_string()),
            authors: vec![Author::default()],
            categories: vec![Category {
                term: Some("news".to_string()),
                ..Category::default()
            }],
            ..Item::default()
        };
        let value = items_to_value(&[item]);
        let entry = &value.as_array().unwrap()[0];
        assert_eq!(entry["Authors"], Value::Array(vec![]));
        assert_eq!(entry["Categories"].as_array().unwrap().len(), 1);
        assert_eq!(entry["Enclosures"], Value::Array(vec![]));
    }

    #[test]
    fn test_item_serializes_pascal_case_fields() {
        let item = Item {
            title: Some("Story".to_string()),
            date_published: Some(1_700_000_000),
            id: "guid-1".to_string(),
            ..Item::default()
        };
        let value = items_to_value(&[item]);
        let entry = &value.as_array().unwrap()[0];
        assert_eq!(entry["DatePublished"], 1_700_000_000);
        assert_eq!(entry["Id"], "guid-1");
        assert_eq!(entry["CommentsCount"], Value::Null);
    }
}
