//! Content-based model selection
//!
//! Pure heuristics over the declared model string, the user-visible text and
//! the declared tool names. No ML pipeline, no I/O; the same inputs always
//! produce the same selection.

use crate::protocol::chat::ReasoningEffort;

/// Tool names that signal a web search
pub const WEB_SEARCH_TOOLS: &[&str] = &["web_search", "browser_search"];

/// Model-string substrings marking high-reasoning intent
const HIGH_INTENT_MARKERS: &[&str] = &["opus", "reasoning", "think"];

/// Text keywords that upgrade to the high-reasoning model
const REASONING_KEYWORDS: &[&str] = &[
    "analyse",
    "analyze",
    "prove",
    "derive",
    "explain why",
    "design",
    "architecture",
    "trade-off",
    "complexity",
    "proof",
    "theorem",
];

/// Text keywords that select the fast coding model
const CODING_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "compile",
    "refactor",
    "bug",
    "stack trace",
    "test",
    "lint",
    "repo",
];

/// Model catalog and capabilities of one backend
#[derive(Debug, Clone, Copy)]
pub struct BackendProfile {
    /// Backend name used in logs
    pub name: &'static str,
    /// Default model for unclassified requests
    pub general_model: &'static str,
    /// Fast model for coding tasks
    pub fast_model: &'static str,
    /// High-reasoning model
    pub reasoning_model: &'static str,
    /// Model with native web search, when the backend has one
    pub web_search_model: Option<&'static str>,
    /// Output-token ceiling enforced on forwarded requests
    pub max_tokens_ceiling: u32,
    /// Whether requests may carry a `reasoning_effort` hint
    pub supports_reasoning_effort: bool,
}

/// xAI backend: a reasoning model plus a fast coding model, no native search
pub const XAI_PROFILE: BackendProfile = BackendProfile {
    name: "xai",
    general_model: "grok-code-fast-1",
    fast_model: "grok-code-fast-1",
    reasoning_model: "grok-4-0709",
    web_search_model: None,
    max_tokens_ceiling: 8192,
    supports_reasoning_effort: false,
};

/// Groq backend: one tools-capable model plus a native-search model that
/// rejects tool definitions
pub const GROQ_PROFILE: BackendProfile = BackendProfile {
    name: "groq",
    general_model: "openai/gpt-oss-120b",
    fast_model: "openai/gpt-oss-120b",
    reasoning_model: "openai/gpt-oss-120b",
    web_search_model: Some("groq/compound"),
    max_tokens_ceiling: 8192,
    supports_reasoning_effort: true,
};

/// Outcome of model selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Backend model identifier
    pub model: String,
    /// Effort hint; dropped later for backends that lack support
    pub reasoning_effort: Option<ReasoningEffort>,
    /// The request declares a web-search tool and the backend can serve it
    pub web_search_required: bool,
}

/// Deterministic model selector for one backend
#[derive(Debug, Clone, Copy)]
pub struct ModelSelector {
    profile: &'static BackendProfile,
    /// Let haiku-class model strings take the text-keyword reasoning upgrade
    haiku_high_reasoning: bool,
}

impl ModelSelector {
    pub const fn new(profile: &'static BackendProfile, haiku_high_reasoning: bool) -> Self {
        Self {
            profile,
            haiku_high_reasoning,
        }
    }

    pub const fn profile(&self) -> &'static BackendProfile {
        self.profile
    }

    /// Pick a model and effort hint for a request
    ///
    /// `user_text` is the concatenated, lowercased text of the user turns;
    /// `tool_names` are the client-declared tool names. Rules apply in a
    /// fixed order; ties break toward the earlier rule.
    pub fn select<'a>(
        &self,
        model_string: &str,
        user_text: &str,
        tool_names: impl IntoIterator<Item = &'a str>,
    ) -> Selection {
        let model_lower = model_string.to_lowercase();

        if let Some(search_model) = self.profile.web_search_model
            && tool_names
                .into_iter()
                .any(|name| WEB_SEARCH_TOOLS.contains(&name))
        {
            return Selection {
                model: search_model.to_owned(),
                reasoning_effort: None,
                web_search_required: true,
            };
        }

        if HIGH_INTENT_MARKERS.iter().any(|m| model_lower.contains(m)) {
            return Selection {
                model: self.profile.reasoning_model.to_owned(),
                reasoning_effort: Some(ReasoningEffort::High),
                web_search_required: false,
            };
        }

        // Haiku-class requests stay on the fast model unless configured
        // otherwise; the keyword upgrade below is skipped for them
        let keyword_upgrade_allowed = self.haiku_high_reasoning || !model_lower.contains("haiku");
        if keyword_upgrade_allowed && REASONING_KEYWORDS.iter().any(|k| user_text.contains(k)) {
            return Selection {
                model: self.profile.reasoning_model.to_owned(),
                reasoning_effort: Some(ReasoningEffort::High),
                web_search_required: false,
            };
        }

        if CODING_KEYWORDS.iter().any(|k| user_text.contains(k)) {
            return Selection {
                model: self.profile.fast_model.to_owned(),
                reasoning_effort: Some(ReasoningEffort::Medium),
                web_search_required: false,
            };
        }

        Selection {
            model: self.profile.general_model.to_owned(),
            reasoning_effort: Some(ReasoningEffort::Medium),
            web_search_required: false,
        }
    }
}

/// Concatenate and lowercase the user-visible text of a request
pub fn user_text(request: &crate::protocol::anthropic::AnthropicRequest) -> String {
    use crate::protocol::anthropic::{AnthropicContent, AnthropicContentBlock};

    let mut text = String::new();
    for turn in &request.messages {
        if turn.role != "user" {
            continue;
        }
        match &turn.content {
            AnthropicContent::Text(t) => {
                text.push_str(t);
                text.push(' ');
            }
            AnthropicContent::Blocks(blocks) => {
                for block in blocks {
                    if let AnthropicContentBlock::Text { text: t } = block {
                        text.push_str(t);
                        text.push(' ');
                    }
                }
            }
        }
    }
    text.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xai() -> ModelSelector {
        ModelSelector::new(&XAI_PROFILE, false)
    }

    fn groq() -> ModelSelector {
        ModelSelector::new(&GROQ_PROFILE, false)
    }

    #[test]
    fn web_search_tool_picks_search_model_on_groq() {
        let selection = groq().select("claude-3-5-sonnet", "find the rfc", ["web_search"]);
        assert_eq!(selection.model, "groq/compound");
        assert_eq!(selection.reasoning_effort, None);
        assert!(selection.web_search_required);
    }

    #[test]
    fn web_search_tool_is_ignored_without_a_search_model() {
        let selection = xai().select("claude-3-5-sonnet", "find the rfc", ["web_search"]);
        assert!(!selection.web_search_required);
        assert_eq!(selection.model, "grok-code-fast-1");
    }

    #[test]
    fn opus_model_string_upgrades_to_reasoning() {
        let selection = xai().select("claude-3-opus", "hello", []);
        assert_eq!(selection.model, "grok-4-0709");
        assert_eq!(selection.reasoning_effort, Some(ReasoningEffort::High));
    }

    #[test]
    fn reasoning_keywords_upgrade() {
        let selection = xai().select("claude-3-5-sonnet", "prove this theorem", []);
        assert_eq!(selection.model, "grok-4-0709");
        assert_eq!(selection.reasoning_effort, Some(ReasoningEffort::High));
    }

    #[test]
    fn coding_keywords_pick_the_fast_model() {
        let selection = xai().select("claude-3-5-sonnet", "fix this bug in the repo", []);
        assert_eq!(selection.model, "grok-code-fast-1");
        assert_eq!(selection.reasoning_effort, Some(ReasoningEffort::Medium));
    }

    #[test]
    fn default_is_general_model_medium() {
        let selection = xai().select("claude-3-5-sonnet", "what is the capital of france", []);
        assert_eq!(selection.model, "grok-code-fast-1");
        assert_eq!(selection.reasoning_effort, Some(ReasoningEffort::Medium));
    }

    #[test]
    fn web_search_rule_wins_over_reasoning_rule() {
        let selection = groq().select("claude-3-opus", "prove this theorem", ["browser_search"]);
        assert!(selection.web_search_required);
        assert_eq!(selection.model, "groq/compound");
    }

    #[test]
    fn haiku_skips_the_keyword_upgrade_by_default() {
        let selection = xai().select("claude-3-5-haiku", "explain why this design works", []);
        assert_eq!(selection.model, "grok-code-fast-1");
        assert_eq!(selection.reasoning_effort, Some(ReasoningEffort::Medium));
    }

    #[test]
    fn haiku_upgrade_can_be_enabled() {
        let selector = ModelSelector::new(&XAI_PROFILE, true);
        let selection = selector.select("claude-3-5-haiku", "explain why this design works", []);
        assert_eq!(selection.model, "grok-4-0709");
    }

    #[test]
    fn selection_is_deterministic() {
        let a = xai().select("claude-3-5-sonnet", "refactor the code", ["read_file"]);
        let b = xai().select("claude-3-5-sonnet", "refactor the code", ["read_file"]);
        assert_eq!(a, b);
    }
}
