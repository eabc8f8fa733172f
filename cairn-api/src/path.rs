use std::fmt;

use crate::Error;

/// Path to a collection: an odd number of segments, alternating collection and
/// document names (eg. `trails/t1/comments`)
#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(Vec<String>);

/// Path to a single document inside a collection
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl CollectionPath {
    pub fn root(name: &str) -> CollectionPath {
        CollectionPath(vec![String::from(name)])
    }

    pub fn parse(s: &str) -> Result<CollectionPath, Error> {
        let segments = s.split('/').map(String::from).collect::<Vec<_>>();
        if segments.len() % 2 != 1 || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidPath(String::from(s)));
        }
        for s in segments.iter() {
            crate::validate_string(s)?;
        }
        Ok(CollectionPath(segments))
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: String::from(id),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl DocPath {
    pub fn subcollection(&self, name: &str) -> CollectionPath {
        let mut segments = self.collection.0.clone();
        segments.push(self.id.clone());
        segments.push(String::from(name));
        CollectionPath(segments)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = Error;

    fn try_from(s: String) -> Result<CollectionPath, Error> {
        CollectionPath::parse(&s)
    }
}

impl From<CollectionPath> for String {
    fn from(p: CollectionPath) -> String {
        p.to_string()
    }
}
