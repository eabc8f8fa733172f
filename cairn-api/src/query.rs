use crate::CollectionPath;

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Asc,
    Desc,
}

/// A live query: every document of `collection` that has an `order_by` field,
/// ordered by that field
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub order_by: String,
    pub direction: OrderType,
}

impl Query {
    pub fn ordered(collection: CollectionPath, order_by: &str, direction: OrderType) -> Query {
        Query {
            collection,
            order_by: String::from(order_by),
            direction,
        }
    }
}
