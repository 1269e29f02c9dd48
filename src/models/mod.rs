pub mod catalog;
pub mod loaders;

pub use catalog::{Bookmark, DownloadItem, DownloadRecord, JobFile, PendingItem};
pub use loaders::{load_all_job_files, load_job_file};
