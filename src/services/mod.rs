pub mod database; // Connection factory and store adapter
pub mod export_service;
pub mod import_service;
pub mod metadata_service;
pub mod query_planner;
pub mod row_projector;

pub use export_service::*;
pub use import_service::*;
pub use metadata_service::*;
pub use query_planner::*;
pub use row_projector::*;
