use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod comment;
pub use comment::*;

mod error;
pub use error::Error;

mod path;
pub use path::{CollectionPath, DocPath};

mod query;
pub use query::{OrderType, Query};

mod store;
pub use store::{LiveStore, Snapshot, SnapshotFeed, Subscription, SubscriptionId};

mod user;
pub use user::{Author, UserId};

mod value;
pub use value::{Document, FieldWrite, Fields, Value, Writes};

#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct TrailId(pub String);

#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub String);

#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ReplyId(pub String);

macro_rules! impl_string_id {
    ( $($id:ident),* ) => {
        $(
            impl $id {
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl From<&str> for $id {
                fn from(s: &str) -> $id {
                    $id(String::from(s))
                }
            }

            impl std::fmt::Display for $id {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

impl_string_id!(TrailId, CommentId, ReplyId, UserId);

// Strings with null bytes are refused by most document stores, so reject them
// before they get anywhere near the network.
pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

/// Trims user-provided text, returning `None` if nothing remains
pub fn normalize_text(s: &str) -> Option<&str> {
    Some(s.trim()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_bytes_are_rejected() {
        assert_eq!(validate_string("Great trail!"), Ok(()));
        assert_eq!(
            validate_string("foo\0bar"),
            Err(Error::NullByteInString(String::from("foo\0bar"))),
        );
    }

    #[test]
    fn text_normalization() {
        assert_eq!(normalize_text("  Great trail! \n"), Some("Great trail!"));
        assert_eq!(normalize_text("Thanks!"), Some("Thanks!"));
        assert_eq!(normalize_text(""), None);
        assert_eq!(normalize_text(" \t\n "), None);
    }

    #[test]
    fn ids_display_as_their_contents() {
        assert_eq!(CommentId::from("c1").to_string(), "c1");
        assert_eq!(TrailId::from("mont-ventoux").as_str(), "mont-ventoux");
    }
}
