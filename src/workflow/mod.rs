pub mod download_flow;
pub mod suggest_flow;

pub use download_flow::{prepare_download_tasks, DownloadHandler};
pub use suggest_flow::{prepare_suggestion_tasks, SuggestionHandler};
