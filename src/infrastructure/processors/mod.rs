// Processors module
pub mod code_splitter;
pub mod common;
pub mod commonjs;
pub mod json;
pub mod minifier;
pub mod renderer;
pub mod text_asset;
pub mod tree_shaker;
pub mod typescript;

pub use code_splitter::{ChunkPlan, CodeSplitter};
pub use commonjs::CommonjsStage;
pub use json::JsonStage;
pub use minifier::MinifyStage;
pub use renderer::ChunkRenderer;
pub use text_asset::TextAssetStage;
pub use tree_shaker::TreeShaker;
pub use typescript::TypeScriptStage;
