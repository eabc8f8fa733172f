#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub String);

/// Identity of whoever wrote a comment or reply
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn new(id: UserId, name: String) -> Author {
        Author {
            id,
            name,
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: String) -> Author {
        self.avatar_url = Some(url);
        self
    }
}
