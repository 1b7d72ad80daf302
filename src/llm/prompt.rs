//! Prompt builder for STT post-correction.
//!
//! [`PromptBuilder`] constructs the `(system_msg, user_msg)` pair sent to
//! any OpenAI-compatible `/v1/chat/completions` endpoint.  English has
//! dedicated instructions and few-shot examples; other language codes reuse
//! the English instructions with an added target-language hint so the model
//! does not translate the transcript.

// ---------------------------------------------------------------------------
// System instruction
// ---------------------------------------------------------------------------

/// Filler words, punctuation, common STT errors.
const SYSTEM_INSTRUCTION: &str = "\
You are a Speech-to-Text post-correction assistant.
Task: Fix transcription errors while preserving the original meaning.

Rules:
1. Fix mis-transcribed words (homophones, wrong words that sound similar).
2. Remove filler words (um, uh, like, you know, etc.).
3. Add appropriate punctuation and capitalisation.
4. Preserve technical terms, proper nouns, and code snippets exactly.
5. Reply with ONLY the corrected text — no explanation.
6. If the text is already correct, return it unchanged.";

// ---------------------------------------------------------------------------
// Few-shot examples
// ---------------------------------------------------------------------------

const FEW_SHOT_EXAMPLES: &str = "
Examples:
Input: \"um I finished the report uh it should be ready by tomorrow\"
Output: \"I finished the report. It should be ready by tomorrow.\"

Input: \"the file won't load because the network connection like dropped\"
Output: \"The file won't load because the network connection dropped.\"

Input: \"the patient has hypertension one forty over ninety\"
Output: \"The patient has hypertension 140/90.\"
";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds STT-correction prompts in chat-message format.
///
/// # Example
/// ```rust
/// use voxflow::llm::PromptBuilder;
///
/// let builder = PromptBuilder::new("en");
/// let (system, user) = builder.build_chat("um hello there", None);
/// assert!(system.contains("Speech-to-Text"));
/// assert!(user.contains("um hello there"));
/// ```
pub struct PromptBuilder {
    language: String,
}

impl PromptBuilder {
    /// Create a new builder for the given ISO-639-1 language code.
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// Build a **(system_msg, user_msg)** pair.
    ///
    /// * `system_msg` — the correction instructions (plus a target-language
    ///   hint for non-English transcripts).
    /// * `user_msg` — few-shot examples + optional context + raw STT input.
    pub fn build_chat(&self, raw: &str, context: Option<&str>) -> (String, String) {
        let mut system_msg = SYSTEM_INSTRUCTION.to_string();
        if self.language != "en" && self.language != "auto" {
            system_msg.push_str(&format!(
                "\n7. The text is in \"{}\". Keep it in that language; never translate.",
                self.language
            ));
        }

        let mut user_msg = String::with_capacity(1024);
        user_msg.push_str(FEW_SHOT_EXAMPLES);
        if let Some(ctx) = context {
            user_msg.push('\n');
            user_msg.push_str(ctx);
        }
        user_msg.push_str(&format!(
            "\nOriginal STT output:\n{}\n\nCorrected:\n",
            raw
        ));

        (system_msg, user_msg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
