//! Zentinel Metadata Agent
//!
//! Maintains a locally cached, periodically refreshed copy of a remote SAML
//! federation metadata document for the Zentinel proxy's SAML support.

pub mod metadata;
pub mod reporter;

pub use metadata::{
    MetadataError, MetadataProviderConfig, RefreshPolicy, ReloadingMetadataProvider,
    SamlMetadataParser,
};
pub use reporter::spawn_status_reporter;
