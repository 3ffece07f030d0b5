#[path = "handlers/prompt.rs"]
mod prompt;

#[path = "handlers/evaluate.rs"]
mod evaluate;

#[path = "handlers/catalog.rs"]
mod catalog;

#[path = "handlers/ws.rs"]
mod ws;

#[path = "handlers/helpers.rs"]
mod helpers;

pub use catalog::{handle_health, handle_history, handle_model, handle_models};
pub use evaluate::{handle_ballot, handle_evaluate, handle_vote};
pub use prompt::handle_prompt;
pub use ws::handle_ws_prompt;
