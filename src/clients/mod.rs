pub mod catalog_client;

pub use catalog_client::{
    CatalogClient, DownloadReceipt, ModelFileSource, SuggestionResult, SuggestionService,
};
