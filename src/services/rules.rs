//! Deterministic keyword classifier.
//!
//! Keyword groups are tested in priority order against the lower-cased
//! description; the first match sets category and base severity, then an
//! override pass can force severity High or Low. Playbooks (next steps and
//! customer messaging) are keyed by category only.

use async_trait::async_trait;

use crate::domain::classify::{AskResponse, Classification, Enrichment, ProviderMode};
use crate::domain::incident::{Category, Severity};
use crate::domain::risk::{self, RiskOverview};
use crate::services::provider::AiProvider;

/// Keyword groups in priority order; the first group with a hit wins.
const CATEGORY_RULES: [(&[&str], Category, Severity); 5] = [
    (&["gas", "leak"], Category::Leak, Severity::High),
    (&["power", "outage", "electric"], Category::Outage, Severity::Medium),
    (&["odor", "smell"], Category::Odor, Severity::Medium),
    (&["bill", "charge", "payment"], Category::Billing, Severity::Low),
    (&["meter", "reading"], Category::Meter, Severity::Medium),
];

/// Severity overrides applied after category matching. High wins when both
/// directions match.
const FORCE_HIGH: [&str; 3] = ["emergency", "urgent", "dangerous"];
const FORCE_LOW: [&str; 2] = ["minor", "small"];

const SUMMARY_EXCERPT_CHARS: usize = 80;

pub struct RulesProvider;

/// Classify a description with the keyword table. Pure; also used as the
/// fallback path of the LLM provider.
pub fn classify_text(description: &str) -> Classification {
    let text = description.to_lowercase();

    let (category, mut severity) = CATEGORY_RULES
        .iter()
        .find(|(keywords, _, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, category, severity)| (*category, *severity))
        .unwrap_or((Category::Other, Severity::Low));

    if FORCE_HIGH.iter().any(|k| text.contains(k)) {
        severity = Severity::High;
    } else if FORCE_LOW.iter().any(|k| text.contains(k)) {
        severity = Severity::Low;
    }

    Classification {
        category,
        severity,
        summary: synthesize_summary(category, description),
        next_steps: next_steps(category),
        customer_message: customer_message(category).to_string(),
    }
}

fn synthesize_summary(category: Category, description: &str) -> String {
    let excerpt: String = description.chars().take(SUMMARY_EXCERPT_CHARS).collect();
    let suffix = if description.chars().count() > SUMMARY_EXCERPT_CHARS {
        "..."
    } else {
        ""
    };
    format!("{} incident reported. {}{}", category, excerpt, suffix)
}

fn next_steps(category: Category) -> Vec<String> {
    let steps: &[&str] = match category {
        Category::Leak => &[
            "Dispatch an emergency crew to the reported location",
            "Instruct the caller to evacuate and avoid ignition sources",
            "Shut off the nearest isolation valve",
            "Notify the gas control center",
            "Schedule a leak survey of the surrounding block",
        ],
        Category::Outage => &[
            "Check the outage map for a known event at the address",
            "Create or attach the report to an outage ticket",
            "Dispatch a line crew if no event is logged",
            "Send a restoration estimate to the customer",
        ],
        Category::Odor => &[
            "Ask the caller about the odor's strength and location",
            "Dispatch a technician with a combustible gas indicator",
            "Ventilate the area if safe to do so",
            "Log the reading and escalate if above threshold",
        ],
        Category::Billing => &[
            "Pull the account's billing history",
            "Verify the most recent meter reading against usage",
            "Open a billing-review case",
            "Send the customer a corrected statement if warranted",
        ],
        Category::Meter => &[
            "Schedule a meter inspection visit",
            "Compare the reading against the same period last year",
            "Test the meter register for drift",
            "Replace the meter if it fails the accuracy test",
        ],
        Category::Other => &[
            "Review the report and assign it to the right queue",
            "Contact the customer for additional detail",
            "Close the report if no field action is required",
        ],
    };
    steps.iter().map(|s| s.to_string()).collect()
}

fn customer_message(category: Category) -> &'static str {
    match category {
        Category::Leak => {
            "We have received your report of a possible gas leak. For your safety, please evacuate the area immediately, avoid using electrical switches or open flames, and wait for our emergency crew. A technician is on the way."
        }
        Category::Outage => {
            "We have received your outage report. Our crews are investigating and we will send you a restoration estimate as soon as one is available. Thank you for your patience."
        }
        Category::Odor => {
            "Thank you for reporting the unusual odor. A technician will visit to take readings. If the smell becomes strong, please move to fresh air and call our emergency line."
        }
        Category::Billing => {
            "We have opened a review of your billing concern. A representative will contact you within two business days with the outcome. No payment is required on the disputed amount while the review is open."
        }
        Category::Meter => {
            "We have scheduled an inspection of your meter. You do not need to be present; we will leave a door tag with the result and adjust your account if a correction is needed."
        }
        Category::Other => {
            "Thank you for contacting us. Your report has been logged and routed to the appropriate team. We will follow up if we need more information."
        }
    }
}

#[async_trait]
impl AiProvider for RulesProvider {
    async fn classify(&self, description: &str, _address: Option<&str>) -> Enrichment {
        Enrichment {
            classification: classify_text(description),
            mode: ProviderMode::Rules,
        }
    }

    async fn ask(&self, question: &str, overview: &RiskOverview) -> AskResponse {
        AskResponse {
            answer: risk::summarize(question, overview),
            mode: ProviderMode::Rules,
        }
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_and_leak_keywords_classify_as_high_leak() {
        for description in ["Smell of gas outside", "Water leak under the street"] {
            let c = classify_text(description);
            assert_eq!(c.category, Category::Leak, "{}", description);
            assert_eq!(c.severity, Severity::High, "{}", description);
        }
    }

    #[test]
    fn category_groups_match_in_priority_order() {
        // "gas" outranks "odor" even though both keywords are present
        let c = classify_text("Strong gas odor in basement, no flame");
        assert_eq!(c.category, Category::Leak);
        assert_eq!(c.severity, Severity::High);

        let c = classify_text("power flickering on elm street");
        assert_eq!(c.category, Category::Outage);
        assert_eq!(c.severity, Severity::Medium);

        let c = classify_text("weird smell from the vents");
        assert_eq!(c.category, Category::Odor);

        let c = classify_text("my bill doubled this month");
        assert_eq!(c.category, Category::Billing);
        assert_eq!(c.severity, Severity::Low);

        let c = classify_text("meter reading seems wrong");
        assert_eq!(c.category, Category::Meter);

        let c = classify_text("tree branch on my fence");
        assert_eq!(c.category, Category::Other);
        assert_eq!(c.severity, Severity::Low);
    }

    #[test]
    fn urgency_keywords_force_high_regardless_of_category() {
        for word in ["emergency", "urgent", "dangerous"] {
            let c = classify_text(&format!("billing question, quite {}", word));
            assert_eq!(c.category, Category::Billing);
            assert_eq!(c.severity, Severity::High, "{}", word);
        }
    }

    #[test]
    fn minor_keywords_force_low_but_lose_to_high() {
        let c = classify_text("minor power flicker");
        assert_eq!(c.category, Category::Outage);
        assert_eq!(c.severity, Severity::Low);

        let c = classify_text("minor but urgent power issue");
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn leak_playbook_has_five_steps_and_evacuation_messaging() {
        let c = classify_text("Strong gas odor in basement, no flame");
        assert_eq!(c.next_steps.len(), 5);
        assert!(c.customer_message.to_lowercase().contains("evacuate"));
    }

    #[test]
    fn summary_embeds_category_and_truncates_long_descriptions() {
        let c = classify_text("gas leak on main street");
        assert_eq!(c.summary, "Leak incident reported. gas leak on main street");

        let long = "a".repeat(100);
        let c = classify_text(&long);
        assert!(c.summary.ends_with("..."));
        assert!(c.summary.contains(&"a".repeat(80)));
    }

    #[tokio::test]
    async fn provider_annotates_rules_mode() {
        let provider = RulesProvider;
        let enrichment = provider.classify("gas leak", None).await;
        assert_eq!(enrichment.mode, ProviderMode::Rules);
        assert_eq!(provider.name(), "rules");
    }
}
