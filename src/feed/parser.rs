use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link, Person};
use feed_rs::parser;
use thiserror::Error;

/// The feed body could not be decoded as RSS, Atom or JSON Feed.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// Feed document reduced to what ingestion needs, independent of syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFeed {
    pub title: Option<String>,
    /// Items in document order
    pub items: Vec<NormalizedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    /// Source-provided unique token; `None` when absent or blank
    pub guid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    pub authors: Vec<Author>,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: Option<String>,
}

impl NormalizedItem {
    /// Display string for the item's authors, see [`format_authors`].
    pub fn author_line(&self) -> String {
        format_authors(&self.authors)
    }
}

/// Join authors as `"Name (email), Name2"` in source order.
///
/// Authors without an email (or with an empty one) get no parenthetical.
pub fn format_authors(authors: &[Author]) -> String {
    authors
        .iter()
        .map(|a| match a.email.as_deref() {
            Some(email) if !email.is_empty() => format!("{} ({})", a.name, email),
            _ => a.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode an RSS, Atom or JSON Feed body.
///
/// The syntax is auto-detected. Entries without an id get no guid: the
/// parser's synthetic id generation is disabled so that dedup falls back to
/// the link.
pub fn parse_feed(bytes: &[u8]) -> Result<NormalizedFeed, ParseError> {
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let items = feed.entries.into_iter().map(normalize_entry).collect();

    Ok(NormalizedFeed {
        title: feed.title.map(|t| t.content),
        items,
    })
}

fn normalize_entry(entry: Entry) -> NormalizedItem {
    let guid = Some(entry.id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_owned);
    let link = primary_link(&entry.links).unwrap_or_default();
    // Full-body content (content:encoded, Atom <content>) is not the description
    let description = entry.summary.map(|s| s.content);
    let title = entry.title.map(|t| t.content).unwrap_or_default();
    let published = entry.published.or(entry.updated);
    let authors = entry.authors.into_iter().map(Author::from).collect();

    NormalizedItem {
        guid,
        title,
        description,
        link,
        authors,
        published,
    }
}

/// The `alternate` link if one is marked, otherwise the first link.
fn primary_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

impl From<Person> for Author {
    fn from(person: Person) -> Self {
        Author {
            name: person.name,
            email: person.email.filter(|e| !e.is_empty()),
        }
    }
}
