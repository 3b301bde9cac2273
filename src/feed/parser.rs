use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::util::unescape_html;

/// A decoded RSS 2.0 channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

/// One `<item>` of a channel. Missing children decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `<pubDate>` text; see [`super::parse_published`]
    pub pub_date: String,
}

/// Why a payload could not be read as an RSS document.
///
/// An unparseable payload is always an error, never an empty [`RssFeed`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed markup, bad encoding or a document that ends early
    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
    /// Well-formed XML whose root element is not `<rss>`
    #[error("Not an RSS document (root element <{0}>)")]
    NotRss(String),
    #[error("RSS document has no <channel>")]
    MissingChannel,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Text being collected for one field element.
struct Capture {
    field: Field,
    in_item: bool,
    /// Stack depth of the field element; only its direct text is kept
    depth: usize,
    text: String,
}

/// Tracks where we are in `<rss><channel>…` and assembles the result.
#[derive(Default)]
struct FeedBuilder {
    stack: Vec<Vec<u8>>,
    seen_channel: bool,
    feed: RssFeed,
    item: Option<RssItem>,
    capture: Option<Capture>,
}

impl FeedBuilder {
    fn in_channel(&self) -> bool {
        self.stack.get(1).is_some_and(|n| n == b"channel")
    }

    fn in_item(&self) -> bool {
        self.in_channel() && self.stack.get(2).is_some_and(|n| n == b"item")
    }

    fn start(&mut self, name: &[u8]) -> Result<(), ParseError> {
        let depth = self.stack.len();
        if depth == 0 && name != b"rss" {
            return Err(ParseError::NotRss(String::from_utf8_lossy(name).into_owned()));
        }

        if self.capture.is_none() {
            match depth {
                1 if name == b"channel" => self.seen_channel = true,
                2 if self.in_channel() && name == b"item" => self.item = Some(RssItem::default()),
                2 | 3 => {
                    let in_item = depth == 3;
                    let applies = if in_item { self.in_item() } else { self.in_channel() };
                    if let Some(field) = Field::from_name(name).filter(|_| applies) {
                        self.capture = Some(Capture {
                            field,
                            in_item,
                            depth: depth + 1,
                            text: String::new(),
                        });
                    }
                }
                _ => {}
            }
        }

        self.stack.push(name.to_vec());
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let depth = self.stack.len();
        if let Some(capture) = self.capture.as_mut().filter(|c| c.depth == depth) {
            capture.text.push_str(text);
        }
    }

    /// Close the innermost element. Returns true when the root closed.
    fn end(&mut self) -> bool {
        let depth = self.stack.len();

        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.store(capture);
            }
        }

        if depth == 3 && self.in_item() {
            if let Some(item) = self.item.take() {
                self.feed.items.push(item);
            }
        }

        self.stack.pop();
        self.stack.is_empty()
    }

    fn store(&mut self, capture: Capture) {
        let value = capture.text.trim().to_string();
        if capture.in_item {
            let Some(item) = self.item.as_mut() else {
                return;
            };
            match capture.field {
                Field::Title => item.title = value,
                Field::Link => item.link = value,
                Field::Description => item.description = value,
                Field::PubDate => item.pub_date = value,
            }
        } else {
            match capture.field {
                Field::Title => self.feed.title = value,
                Field::Link => self.feed.link = value,
                Field::Description => self.feed.description = value,
                // channel-level pubDate is not used
                Field::PubDate => {}
            }
        }
    }
}

fn xml_error(position: u64, message: impl ToString) -> ParseError {
    ParseError::Xml {
        position,
        message: message.to_string(),
    }
}

/// Decode an RSS 2.0 document.
///
/// Only un-prefixed `title`, `link`, `description` and `pubDate` children of
/// `<channel>` and `<item>` are read; namespaced extensions such as
/// `atom:link` or `content:encoded` are ignored. Text is HTML-unescaped after
/// XML decoding, so doubly encoded entities (`&amp;amp;`) come out as plain
/// characters. CDATA content is HTML-unescaped once. Entity declarations in
/// a DOCTYPE are never expanded.
///
/// Parsing stops at the end of the root element.
///
/// # Errors
///
/// - [`ParseError::Xml`] - malformed or truncated markup, invalid UTF-8
/// - [`ParseError::NotRss`] - the root element is not `<rss>`
/// - [`ParseError::MissingChannel`] - `<rss>` without a `<channel>`
pub fn parse_feed(bytes: &[u8]) -> Result<RssFeed, ParseError> {
    // Text is not trimmed by the reader: whitespace between inline pieces of
    // a field is kept and only the ends are trimmed when the field closes.
    let mut reader = Reader::from_reader(bytes);

    let mut builder = FeedBuilder::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(xml_error(reader.error_position(), e)),
        };

        match event {
            Event::Start(e) => builder.start(e.name().as_ref())?,
            Event::Empty(e) => {
                builder.start(e.name().as_ref())?;
                if builder.end() {
                    break;
                }
            }
            Event::End(_) => {
                if builder.end() {
                    break;
                }
            }
            Event::Text(e) => {
                let raw = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| xml_error(reader.buffer_position(), err))?;
                // XML-level references first, then whatever HTML escaping the
                // publisher applied on top.
                let xml_unescaped = unescape_html(&raw);
                builder.text(&unescape_html(&xml_unescaped));
            }
            Event::CData(e) => {
                let raw = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| xml_error(reader.buffer_position(), err))?;
                builder.text(&unescape_html(&raw));
            }
            Event::Eof => {
                let message = if builder.stack.is_empty() {
                    "document has no root element"
                } else {
                    "unexpected end of document"
                };
                return Err(xml_error(reader.buffer_position(), message));
            }
            _ => {}
        }
    }

    if !builder.seen_channel {
        return Err(ParseError::MissingChannel);
    }

    Ok(builder.feed)
}
