//! Stage x channel message templates and placeholder rendering.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::db::{EscalationStage, MessageChannel};

/// One cell of the fixed template matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTemplate {
    pub stage: EscalationStage,
    pub label: &'static str,
    pub email: &'static str,
    pub sms: &'static str,
}

impl StageTemplate {
    pub fn body(&self, channel: MessageChannel) -> &'static str {
        match channel {
            MessageChannel::Email => self.email,
            MessageChannel::Sms => self.sms,
        }
    }
}

static STAGE_TEMPLATES: [StageTemplate; 4] = [
    StageTemplate {
        stage: EscalationStage::PoliteNudge,
        label: "Polite nudge",
        email: "Hi {{client_name}},\n\nQuick reminder that invoice {{invoice_number}} for {{amount}} was due on {{due_date}}. Please let me know if anything is needed to process payment this week.\n\nThank you,\n{{workspace_name}}",
        sms: "Hi {{client_name}} - friendly reminder invoice {{invoice_number}} ({{amount}}) was due {{due_date}}. Can you confirm payment timing?",
    },
    StageTemplate {
        stage: EscalationStage::FirmFollowUp,
        label: "Firm follow-up",
        email: "Hi {{client_name}},\n\nFollowing up on invoice {{invoice_number}} ({{amount}}), now {{days_overdue}} days overdue. Please confirm payment by {{target_date}} to avoid escalation.\n\nRegards,\n{{workspace_name}}",
        sms: "Invoice {{invoice_number}} is {{days_overdue}} days overdue. Please confirm payment by {{target_date}} to avoid escalation.",
    },
    StageTemplate {
        stage: EscalationStage::CollectionsWarning,
        label: "Collections warning",
        email: "Hi {{client_name}},\n\nThis is a formal notice regarding unpaid invoice {{invoice_number}} ({{amount}}). If payment is not received by {{target_date}}, the account may be referred for collections and small-claims preparation.\n\nThis notice is sent in good faith to resolve the balance without further action.\n\n{{workspace_name}}",
        sms: "Formal notice: invoice {{invoice_number}} ({{amount}}) remains unpaid. Please settle by {{target_date}} to avoid collections escalation.",
    },
    StageTemplate {
        stage: EscalationStage::SmallClaimsTemplate,
        label: "Small-claims prep",
        email: "Hi {{client_name}},\n\nI have prepared a small-claims filing packet for invoice {{invoice_number}} ({{amount}}), currently {{days_overdue}} days overdue. Payment received by {{target_date}} will close this matter.\n\n{{workspace_name}}",
        sms: "Small-claims prep started for invoice {{invoice_number}}. Payment by {{target_date}} resolves this without filing.",
    },
];

/// The full matrix in escalation order.
pub fn all_templates() -> &'static [StageTemplate] {
    &STAGE_TEMPLATES
}

pub fn template_for(stage: EscalationStage, channel: MessageChannel) -> &'static str {
    // ORDER and STAGE_TEMPLATES share an index.
    let idx = EscalationStage::ORDER
        .iter()
        .position(|candidate| *candidate == stage)
        .unwrap_or(0);
    STAGE_TEMPLATES[idx].body(channel)
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"));

/// Replace each `{{key}}` with its context value. Keys are trimmed; unknown
/// keys render as the empty string.
pub fn render_template(template: &str, context: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            context
                .get(caps[1].trim())
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

/// Closing-tone variants for the cosmetic rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageTone {
    #[default]
    Conservative,
    Balanced,
    Assertive,
}

impl MessageTone {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Assertive => "assertive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "conservative" => Some(Self::Conservative),
            "balanced" => Some(Self::Balanced),
            "assertive" => Some(Self::Assertive),
            _ => None,
        }
    }

    fn closing(self) -> &'static str {
        match self {
            Self::Conservative => {
                "This message is sent in good faith to resolve the balance professionally."
            }
            Self::Balanced => {
                "Please confirm next steps today so we can close this without further escalation."
            }
            Self::Assertive => {
                "Immediate response is requested to avoid collections and filing actions."
            }
        }
    }
}

/// Shortest body accepted for a rewrite.
pub const MIN_REWRITE_BODY_CHARS: usize = 8;

/// Append a tone-specific closing paragraph. Purely cosmetic: the stage is
/// accepted for symmetry with the template matrix but does not change output.
pub fn rewrite_message(_stage: EscalationStage, body: &str, tone: MessageTone) -> String {
    format!("{body}\n\n{}", tone.closing())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::{MessageTone, all_templates, render_template, rewrite_message, template_for};
    use crate::db::{EscalationStage, MessageChannel};

    fn ctx(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn placeholders_are_replaced_and_keys_trimmed() {
        let rendered = render_template(
            "Hi {{client_name}}, invoice {{ invoice_number }} is due.",
            &ctx(&[("client_name", "Globex"), ("invoice_number", "INV-7")]),
        );
        assert_eq!(rendered, "Hi Globex, invoice INV-7 is due.");
    }

    #[test]
    fn unknown_and_empty_placeholders_render_empty() {
        let rendered = render_template("[{{missing}}][{{}}][{{ }}]", &HashMap::new());
        assert_eq!(rendered, "[][][]");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let text = "No braces here, only { single } ones.";
        assert_eq!(render_template(text, &HashMap::new()), text);
    }

    #[test]
    fn matrix_covers_every_stage_and_channel() {
        assert_eq!(all_templates().len(), EscalationStage::ORDER.len());
        for (template, stage) in all_templates().iter().zip(EscalationStage::ORDER) {
            assert_eq!(template.stage, stage);
            assert_eq!(template.label, stage.label());
            for channel in MessageChannel::ALL {
                assert!(template_for(stage, channel).contains("{{invoice_number}}"));
            }
        }
    }

    #[test]
    fn polite_nudge_email_renders_fully() {
        let rendered = render_template(
            template_for(EscalationStage::PoliteNudge, MessageChannel::Email),
            &ctx(&[
                ("client_name", "North Ridge Labs"),
                ("invoice_number", "INV-2041"),
                ("amount", "$1,450.00"),
                ("due_date", "2026-01-31"),
                ("workspace_name", "Demo Workspace"),
            ]),
        );
        assert_eq!(
            rendered,
            "Hi North Ridge Labs,\n\nQuick reminder that invoice INV-2041 for $1,450.00 was due on 2026-01-31. Please let me know if anything is needed to process payment this week.\n\nThank you,\nDemo Workspace"
        );
    }

    #[test]
    fn rewrite_appends_tone_closing() {
        let body = "Please pay invoice INV-1.";
        assert_eq!(
            rewrite_message(EscalationStage::PoliteNudge, body, MessageTone::Balanced),
            "Please pay invoice INV-1.\n\nPlease confirm next steps today so we can close this without further escalation."
        );
        assert!(
            rewrite_message(EscalationStage::FirmFollowUp, body, MessageTone::default())
                .ends_with("resolve the balance professionally.")
        );
        assert!(
            rewrite_message(EscalationStage::FirmFollowUp, body, MessageTone::Assertive)
                .ends_with("collections and filing actions.")
        );
    }

    #[test]
    fn tone_parse_is_case_insensitive() {
        assert_eq!(MessageTone::parse(" Assertive "), Some(MessageTone::Assertive));
        assert_eq!(MessageTone::parse("rude"), None);
    }
}
