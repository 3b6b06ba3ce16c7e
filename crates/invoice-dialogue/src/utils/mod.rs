pub mod error;
pub mod json;
pub mod text;

pub use error::{DialogueError, DialogueResult};
pub use json::extract_first_json_object;
