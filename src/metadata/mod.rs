//! Reloading SAML metadata cache.
//!
//! Keeps a remotely hosted metadata document cached and refreshed with
//! conditional GETs, compression support and an expiry derived from the
//! document's own cacheDuration/validUntil hints.

pub mod cache;
pub mod config;
pub mod decoder;
pub mod document;
pub mod duration;
pub mod error;
pub mod expiry;
pub mod fetcher;
pub mod provider;

pub use cache::{CachedDocument, MetadataCache};
pub use config::{MetadataProviderConfig, MetadataProviderConfigJson, RefreshPolicy};
pub use decoder::decode;
pub use document::{
    MetadataDocument, MetadataFilter, MetadataParser, RequireValidityHints, SamlMetadata,
    SamlMetadataParser, ValidityHint,
};
pub use error::{ErrorKind, MetadataError};
pub use expiry::{compute_expiry, refresh_delay};
pub use fetcher::{ConditionalToken, FetchOutcome, HttpFetcher, RemoteSource};
pub use provider::{
    MetadataProviderBuilder, ProviderState, ProviderStatus, RefreshOutcome,
    ReloadingMetadataProvider,
};
