pub mod http;
pub mod json_repair;
pub mod mindmap;
pub mod prompts;
pub mod summary;

pub use http::HttpLlmInvoker;
pub use mindmap::MindMapPipeline;
pub use prompts::PromptBuilder;
pub use summary::SummaryPipeline;
