pub mod files;

pub use files::{export_filename, upload_filename, ArtifactWriter, FileStore};
