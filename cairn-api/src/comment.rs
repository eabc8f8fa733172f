//! Document layout of comments and replies, shared by everything that reads or
//! writes them

use crate::{Author, FieldWrite, UserId, Value, Writes};

pub mod field {
    pub const TEXT: &str = "text";
    pub const AUTHOR_UID: &str = "authorUid";
    pub const AUTHOR_NAME: &str = "authorName";
    pub const PHOTO_URL: &str = "photoURL";
    pub const LIKES: &str = "likes";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

fn authored_writes(text: &str, author: &Author) -> Writes {
    let mut w = Writes::new();
    w.insert(field::TEXT.into(), FieldWrite::Set(Value::from(text)));
    w.insert(
        field::AUTHOR_UID.into(),
        FieldWrite::Set(Value::from(author.id.0.clone())),
    );
    w.insert(
        field::AUTHOR_NAME.into(),
        FieldWrite::Set(Value::from(author.name.clone())),
    );
    w.insert(
        field::PHOTO_URL.into(),
        FieldWrite::Set(Value::from(author.avatar_url.clone())),
    );
    w.insert(field::CREATED_AT.into(), FieldWrite::ServerTimestamp);
    w
}

/// Fields of a freshly created comment: no likes yet, creation date set by the store
pub fn new_comment_writes(text: &str, author: &Author) -> Writes {
    let mut w = authored_writes(text, author);
    w.insert(field::LIKES.into(), FieldWrite::Set(Value::Array(Vec::new())));
    w
}

/// Replies are created without a likes field, it appears on the first like
pub fn new_reply_writes(text: &str, author: &Author) -> Writes {
    authored_writes(text, author)
}

pub fn edit_writes(text: &str) -> Writes {
    let mut w = Writes::new();
    w.insert(field::TEXT.into(), FieldWrite::Set(Value::from(text)));
    w.insert(field::UPDATED_AT.into(), FieldWrite::ServerTimestamp);
    w
}

pub fn like_writes(user: &UserId, like: bool) -> Writes {
    let values = vec![Value::from(user.0.clone())];
    let mut w = Writes::new();
    w.insert(
        field::LIKES.into(),
        match like {
            true => FieldWrite::ArrayUnion(values),
            false => FieldWrite::ArrayRemove(values),
        },
    );
    w
}
