use cairn_api::{CollectionPath, Document};

/// Initial contents of a store, as produced by `generate-test-data`
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct Seed {
    pub documents: Vec<SeedDocument>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct SeedDocument {
    pub collection: CollectionPath,

    #[serde(flatten)]
    pub document: Document,
}
