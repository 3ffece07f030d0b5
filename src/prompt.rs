#[path = "prompt/params.rs"]
mod params;

#[path = "prompt/request.rs"]
mod request;

#[path = "prompt/response.rs"]
mod response;

pub use params::{GenerationParams, ResolvedParams};
pub use request::{Persona, PromptRequest, RagParams, MAX_PROMPT_CHARS};
pub use response::{ErrorTag, ModelResponse};
