use super::{EntityKind, ManagedEntity};
use crate::metadata::ContractMetadata;

/// Collection-level entity whose pointer is the contract's `contractURI()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractEntity {
    pub id: String,
    pub contract_uri: Option<String>,
    pub contract_uri_updated: Option<u64>,
    pub metadata_name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub external_link: Option<String>,
    pub artist: Option<String>,
    pub artist_url: Option<String>,
    metadata_fetched: bool,
}

impl ContractEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.contract_uri = Some(uri.into());
        self
    }

    /// Overwrites every projected field, including ones the document left empty.
    pub fn apply_metadata(&mut self, metadata: ContractMetadata) {
        self.metadata_name = metadata.name;
        self.description = metadata.description;
        self.image = metadata.image;
        self.external_link = metadata.external_link;
        self.artist = metadata.artist;
        self.artist_url = metadata.artist_url;
        self.metadata_fetched = true;
    }
}

impl ManagedEntity for ContractEntity {
    const KIND: EntityKind = EntityKind::Contract;

    fn id(&self) -> &str {
        &self.id
    }

    fn pointer(&self) -> Option<&str> {
        self.contract_uri.as_deref()
    }

    fn set_pointer(&mut self, pointer: String, updated_at: u64) {
        self.contract_uri = Some(pointer);
        self.contract_uri_updated = Some(updated_at);
    }

    fn has_document(&self) -> bool {
        self.metadata_fetched
    }

    fn last_updated_at(&self) -> Option<u64> {
        self.contract_uri_updated
    }
}
