use crate::gateway::GenerationRequest;
use crate::prompt::PromptRequest;

/// Builds the adapter-facing request from the caller's prompt, the resolved
/// context and any persona or system text.
pub(crate) fn compose(request: &PromptRequest, context: Option<&str>) -> GenerationRequest {
    GenerationRequest {
        prompt: compose_prompt(
            &request.prompt,
            context,
            request.instruction_prompt.as_deref(),
        ),
        system: compose_system(request),
        params: request.params.resolve(),
    }
}

fn compose_system(request: &PromptRequest) -> Option<String> {
    let parts: Vec<&str> = request
        .persona
        .as_ref()
        .map(|persona| persona.system_prompt.as_str())
        .into_iter()
        .chain(request.system_prompt.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn compose_prompt(user_prompt: &str, context: Option<&str>, instruction: Option<&str>) -> String {
    match (context, instruction) {
        (Some(context), Some(template)) => template
            .replace("{context}", context)
            .replace("{question}", user_prompt),
        (Some(context), None) => format!(
            "Use the following context to answer the question. If the context doesn't contain relevant information, say so.\n\nContext:\n{context}\n\nQuestion: {user_prompt}\n\nAnswer:"
        ),
        (None, _) => user_prompt.to_string(),
    }
}
