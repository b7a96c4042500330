//! 流式响应重新封帧
//!
//! Ollama 输出 NDJSON，浏览器端接收 multipart/x-mixed-replace 或 SSE

pub mod frame;
pub mod ndjson;
pub mod progress;
pub mod relay;

pub use frame::{Frame, Framing};
pub use relay::{FrameSink, GenerateStats, RelayError};
