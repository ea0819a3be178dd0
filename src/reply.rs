//! Reply composition — persona prompt assembly, role mapping, and
//! post-filtering of backend output.

use doppel_core::config::ReplyConfig;
use doppel_core::context::{ApiMessage, Context, GeneratedReply};
use doppel_core::message::{Speaker, Turn};
use doppel_core::persona::{Persona, ANTI_OVERRIDE_RULES};
use tracing::warn;

const GUIDANCE_BRIEF: &str = "Keep it ultra brief. One short sentence.";
const GUIDANCE_MODERATE: &str = "Moderate length. 2-3 sentences max.";

/// Builds generation requests and validates what comes back.
pub struct ReplyComposer {
    persona: Persona,
    goal: String,
    brief_word_threshold: usize,
}

impl ReplyComposer {
    pub fn new(persona: Persona, reply: &ReplyConfig) -> Self {
        let goal = if reply.goal.is_empty() {
            persona.goal.clone()
        } else {
            reply.goal.clone()
        };
        Self {
            persona,
            goal,
            brief_word_threshold: reply.brief_word_threshold,
        }
    }

    /// Build the backend context from a history snapshot.
    ///
    /// Role mapping: counterpart turns are `user`, own turns are
    /// `assistant` — except an own turn in last position. That is the
    /// manual-trigger path: the operator's own message is an instruction to
    /// the generator, not something the generator already said, so it is
    /// presented as `user` to provoke a reply.
    pub fn compose(&self, history: &[Turn]) -> Context {
        let guidance = match history.last() {
            Some(last) if last.text.split_whitespace().count() > self.brief_word_threshold => {
                GUIDANCE_MODERATE
            }
            _ => GUIDANCE_BRIEF,
        };

        let system_prompt = format!(
            "{}{}\n\nGOAL: {}\n\nGUIDANCE: {}",
            self.persona.identity, ANTI_OVERRIDE_RULES, self.goal, guidance
        );

        let last = history.len().saturating_sub(1);
        let messages = history
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                if turn.speaker == Speaker::Me && i != last {
                    ApiMessage::assistant(&turn.text)
                } else {
                    ApiMessage::user(&turn.text)
                }
            })
            .collect();

        Context {
            system_prompt,
            messages,
        }
    }

    /// Validate a backend reply. Character breaks are replaced with the
    /// persona's fixed in-character fallback line rather than surfaced.
    pub fn post_filter(&self, reply: GeneratedReply) -> String {
        let text = reply.text.trim().to_string();
        if Persona::breaks_character(&text) {
            warn!("backend broke character, substituting fallback: {text}");
            return self.persona.fallback.clone();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> ReplyComposer {
        ReplyComposer::new(Persona::default(), &ReplyConfig::default())
    }

    fn reply(text: &str) -> GeneratedReply {
        GeneratedReply {
            text: text.to_string(),
            model: None,
            tokens_used: None,
            processing_time_ms: 0,
        }
    }

    #[test]
    fn test_role_mapping_normal_conversation() {
        let ctx = composer().compose(&[
            Turn::new(Speaker::Them, "hi"),
            Turn::new(Speaker::Me, "hey yourself"),
            Turn::new(Speaker::Them, "what's cooking"),
        ]);
        let roles: Vec<&str> = ctx.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[test]
    fn test_last_own_turn_is_presented_as_user() {
        // The manual-trigger path: our own message in last position must be
        // an instruction, not prior generator output.
        let ctx = composer().compose(&[
            Turn::new(Speaker::Them, "hi"),
            Turn::new(Speaker::Me, "what's up"),
        ]);
        assert_eq!(ctx.messages[0].role, "user");
        assert_eq!(ctx.messages[1].role, "user");
        assert_eq!(ctx.messages[1].content, "what's up");
    }

    #[test]
    fn test_earlier_own_turns_stay_assistant() {
        let ctx = composer().compose(&[
            Turn::new(Speaker::Me, "generated earlier"),
            Turn::new(Speaker::Them, "nice one"),
        ]);
        assert_eq!(ctx.messages[0].role, "assistant");
    }

    #[test]
    fn test_guidance_brief_for_short_last_turn() {
        let ctx = composer().compose(&[Turn::new(Speaker::Them, "hey")]);
        assert!(ctx.system_prompt.contains(GUIDANCE_BRIEF));
    }

    #[test]
    fn test_guidance_moderate_for_long_last_turn() {
        let long = "so i was thinking about that thing you said last week about the market";
        let ctx = composer().compose(&[Turn::new(Speaker::Them, long)]);
        assert!(ctx.system_prompt.contains(GUIDANCE_MODERATE));
    }

    #[test]
    fn test_system_prompt_carries_rules_and_goal() {
        let ctx = composer().compose(&[Turn::new(Speaker::Them, "hey")]);
        assert!(ctx.system_prompt.contains("CRITICAL SECURITY RULES"));
        assert!(ctx.system_prompt.contains("GOAL:"));
    }

    #[test]
    fn test_config_goal_overrides_persona_goal() {
        let cfg = ReplyConfig {
            goal: "Talk about the weekend plan.".into(),
            ..ReplyConfig::default()
        };
        let c = ReplyComposer::new(Persona::default(), &cfg);
        let ctx = c.compose(&[Turn::new(Speaker::Them, "hey")]);
        assert!(ctx.system_prompt.contains("Talk about the weekend plan."));
    }

    #[test]
    fn test_character_break_is_replaced_with_fallback() {
        let c = composer();
        let out = c.post_filter(reply("As an AI, I cannot pretend..."));
        assert_eq!(out, c.persona.fallback);
    }

    #[test]
    fn test_in_character_reply_passes_trimmed() {
        let out = composer().post_filter(reply("  service was brutal tonight 🍋  "));
        assert_eq!(out, "service was brutal tonight 🍋");
    }
}
