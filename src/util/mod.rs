//! Small helpers shared by the feed pipeline and the command layer.
//!
//! - **Text**: lenient HTML character-reference decoding for feed text
//! - **Durations**: parsing operator intervals such as `30s` or `1h30m`
//! - **URL validation**: refusing feed URLs that point into the local network

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_duration, DurationError};
pub use text::{collapse_whitespace, unescape_html};
pub use url_validator::{validate_feed_url, UrlValidationError};
