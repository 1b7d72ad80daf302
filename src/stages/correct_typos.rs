//! `correct_typos` — rule-based find/replace over the transcript.
//!
//! Fixes recurring speech-to-text mistakes before the text is typed:
//! vocabulary the model keeps mishearing, capitalization, project jargon.
//! Cheaper and more predictable than the LLM pass, and usable alongside it.

use std::collections::BTreeSet;

use regex::RegexBuilder;

use crate::pipeline::{Resource, Stage, StageContext, StageError, StageParams, Value, ValueType};

/// Applies configured corrections to the transcript in rule order.
///
/// Parameters:
/// * `case_sensitive` — default case sensitivity for matching (false).
/// * `whole_word_only` — default whole-word matching (true).
/// * `corrections` — array of rules, each `[typo, replacement]` or
///   `[typo, replacement, overrides]` where `overrides` is a comma-separated
///   list like `"case_sensitive=true,whole_word_only=false"`.
///
/// ```toml
/// [[pipelines.stages]]
/// stage = "correct_typos"
/// corrections = [
///     ["machinelearning", "machine learning"],
///     ["air quotes", "error codes"],
///     ["Python", "python", "case_sensitive=true"],
/// ]
/// ```
///
/// Malformed rules are logged and skipped, never a run failure.
/// `text(none)` passes straight through.
pub struct CorrectTyposStage;

/// One compiled correction rule.
struct Rule {
    pattern: regex::Regex,
    replacement: String,
}

/// Build the rule list from the stage's params.  Typos are matched
/// literally (regex metacharacters escaped), optionally bounded by `\b`.
fn compile_rules(params: &StageParams) -> Vec<Rule> {
    let default_case_sensitive = params.bool_or("case_sensitive", false);
    let default_whole_word = params.bool_or("whole_word_only", true);

    let mut rules = Vec::new();
    for entry in params.array("corrections") {
        let Some(items) = entry.as_array() else {
            log::warn!("correct_typos: rule {entry:?} is not an array, skipping");
            continue;
        };
        let (Some(typo), Some(replacement)) = (
            items.first().and_then(|v| v.as_str()),
            items.get(1).and_then(|v| v.as_str()),
        ) else {
            log::warn!(
                "correct_typos: rule {entry:?} needs [typo, replacement], skipping"
            );
            continue;
        };

        let mut case_sensitive = default_case_sensitive;
        let mut whole_word = default_whole_word;
        if let Some(overrides) = items.get(2).and_then(|v| v.as_str()) {
            for pair in overrides.split(',') {
                match pair.trim().split_once('=') {
                    Some(("case_sensitive", v)) => {
                        case_sensitive = v.trim().eq_ignore_ascii_case("true");
                    }
                    Some(("whole_word_only", v)) => {
                        whole_word = v.trim().eq_ignore_ascii_case("true");
                    }
                    _ => log::warn!(
                        "correct_typos: unknown override '{}' for '{typo}', skipping",
                        pair.trim()
                    ),
                }
            }
        }

        let escaped = regex::escape(typo);
        let source = if whole_word {
            format!(r"\b{escaped}\b")
        } else {
            escaped
        };
        match RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(pattern) => rules.push(Rule {
                pattern,
                replacement: replacement.to_string(),
            }),
            // Escaped literals compile unless pathological; still no panic.
            Err(e) => log::warn!("correct_typos: cannot compile rule for '{typo}': {e}"),
        }
    }
    rules
}

impl Stage for CorrectTyposStage {
    fn name(&self) -> &'static str {
        "correct_typos"
    }

    fn description(&self) -> &'static str {
        "rule-based typo replacement over the transcript"
    }

    fn input_type(&self) -> ValueType {
        ValueType::Text
    }

    fn output_type(&self) -> ValueType {
        ValueType::Text
    }

    fn required_resources(&self) -> BTreeSet<Resource> {
        BTreeSet::new()
    }

    fn execute(&self, input: Value, ctx: &mut StageContext) -> Result<Value, StageError> {
        let text = match input {
            Value::Text(Some(text)) => text,
            _ => return Ok(Value::Text(None)),
        };

        let rules = compile_rules(&ctx.params);
        if rules.is_empty() {
            log::debug!("correct_typos: no rules configured, passing through");
            return Ok(Value::Text(Some(text)));
        }

        let mut result = text;
        let mut applied = 0usize;
        for rule in &rules {
            if rule.pattern.is_match(&result) {
                result = rule
                    .pattern
                    .replace_all(&result, rule.replacement.as_str())
                    .into_owned();
                applied += 1;
            }
        }

        if applied > 0 {
            log::info!("correct_typos: applied {applied} of {} rule(s)", rules.len());
        }
        Ok(Value::Text(Some(result)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
