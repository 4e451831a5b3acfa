/// Builds the prompt text sent to the LLM for each pipeline kind, given
/// the caller-resolved template (from `EffectiveSettings`, which may be
/// the compiled-in default or a store-saved custom prompt) and the
/// transcript text to fill it with. Grounded on
/// `lt-llm::prompts::PromptManager`'s `{marker}` substitution style,
/// generalized from five ad-hoc command templates to the two pipeline
/// kinds this server runs.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn summary_prompt(&self, template: &str, transcript: &str) -> String {
        substitute(template, transcript)
    }

    pub fn mind_map_prompt(&self, template: &str, transcript: &str) -> String {
        substitute(template, transcript)
    }
}

/// Substitutes the `{transcript}` marker; if the template doesn't carry
/// one, the transcript is appended on a new line instead (SPEC_FULL §4.5
/// step 3).
fn substitute(template: &str, transcript: &str) -> String {
    if template.contains("{transcript}") {
        template.replace("{transcript}", transcript)
    } else {
        format!("{template}\n{transcript}")
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_transcript_marker() {
        let builder = PromptBuilder::new();
        let prompt = builder.summary_prompt("Summarize: {transcript}", "hello world");
        assert_eq!(prompt, "Summarize: hello world");
    }

    #[test]
    fn appends_transcript_when_marker_absent() {
        let builder = PromptBuilder::new();
        let prompt = builder.mind_map_prompt("no markers here", "ignored");
        assert_eq!(prompt, "no markers here\nignored");
    }
}
