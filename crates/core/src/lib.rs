// Core types shared by every toolhouse server: the value model,
// the markdown renderer, timestamp helpers, errors and the response cache.

pub mod cache;
pub mod error;
pub mod render;
pub mod time;
pub mod value;

pub use cache::{MemoryCache, RedisCache, ResponseCache};
pub use error::{RenderError, ToolError, ToolResult};
pub use render::{render, Renderer, DEFAULT_MAX_DEPTH};
pub use time::{to_iso_in, to_local_iso};
pub use value::{Mapping, Scalar, Value};
