pub mod assets;
pub mod config;
pub mod listing;

pub use listing::DesignerPage;
