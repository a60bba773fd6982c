//! System prompts rendered from the `templates/prompts` text templates.

use askama::Template;

use crate::models::{AiModel, Feature, User};

/// Instruction sent in place of an empty user input.
pub const GENERIC_INPUT: &str =
    "Generate a generic response based on the instructions and the business profile above.";

#[derive(Template)]
#[template(path = "prompts/feature_prompt.txt")]
struct FeaturePrompt<'a> {
    model_name: &'a str,
    model_description: &'a str,
    profile: Vec<String>,
    sections: Vec<String>,
    keys: String,
}

#[derive(Template)]
#[template(path = "prompts/master_prompt.txt")]
struct MasterPrompt<'a> {
    model_name: &'a str,
    model_description: &'a str,
    master_prompt: &'a str,
    profile: Vec<String>,
}

#[derive(Template)]
#[template(path = "prompts/regenerate_prompt.txt")]
struct RegeneratePrompt<'a> {
    model_name: &'a str,
    current_response: &'a str,
    feature_name: &'a str,
    feature_prompt: &'a str,
    feedback: &'a str,
}

/// Profile summary lines: labelled profile fields, then one line per gig.
#[must_use]
pub fn profile_lines(user: &User) -> Vec<String> {
    let mut lines: Vec<String> = user
        .profile
        .entries()
        .into_iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect();

    for gig in &user.gigs {
        let mut line = format!("Gig: {}", gig.title.trim());
        if !gig.description.trim().is_empty() {
            line.push_str(" - ");
            line.push_str(gig.description.trim());
        }
        if let Some(price) = gig.price.as_deref().filter(|p| !p.trim().is_empty()) {
            line.push_str(&format!(" ({})", price.trim()));
        }
        lines.push(line);
    }

    lines
}

fn feature_section(feature: &Feature) -> String {
    let optional = if feature.is_optional { " (optional)" } else { "" };
    format!("{}{optional}: {}", feature.name, feature.prompt.trim())
}

/// System prompt for a feature-based model: one JSON object keyed by
/// feature name, sections in prompt order.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn feature_prompt(model: &AiModel, user: &User) -> Result<String, askama::Error> {
    let keys = model
        .features
        .iter()
        .map(|f| format!("\"{}\"", f.name))
        .collect::<Vec<_>>()
        .join(", ");

    FeaturePrompt {
        model_name: &model.name,
        model_description: model.description.trim(),
        profile: profile_lines(user),
        sections: model.features.iter().map(feature_section).collect(),
        keys,
    }
    .render()
}

/// System prompt for a master-prompt model: free-form answer.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn master_prompt(model: &AiModel, user: &User) -> Result<String, askama::Error> {
    MasterPrompt {
        model_name: &model.name,
        model_description: model.description.trim(),
        master_prompt: model.master_prompt.as_deref().unwrap_or_default().trim(),
        profile: profile_lines(user),
    }
    .render()
}

/// Standalone prompt asking to rewrite one feature of an existing response.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn regenerate_prompt(
    model: &AiModel,
    feature: &Feature,
    current_response: &serde_json::Value,
    feedback: &str,
) -> Result<String, askama::Error> {
    let current = serde_json::to_string_pretty(current_response)
        .unwrap_or_else(|_| current_response.to_string());

    RegeneratePrompt {
        model_name: &model.name,
        current_response: &current,
        feature_name: &feature.name,
        feature_prompt: feature.prompt.trim(),
        feedback: feedback.trim(),
    }
    .render()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::Gig;
    use crate::models::catalog::tests::{feature, model};
    use crate::models::user::tests::sample_user;

    fn user_with_profile() -> User {
        let mut user = sample_user(Decimal::new(10, 0), Decimal::ZERO);
        user.profile.agency_name = Some("Northwind Creative".to_string());
        user.profile.services = Some("Paid social, landing pages".to_string());
        user.gigs = vec![Gig {
            title: "Landing page audit".to_string(),
            description: "48h turnaround".to_string(),
            price: Some("$150".to_string()),
            url: None,
        }];
        user
    }

    #[test]
    fn test_profile_lines() {
        let lines = profile_lines(&user_with_profile());
        assert_eq!(
            lines,
            vec![
                "Agency: Northwind Creative".to_string(),
                "Services: Paid social, landing pages".to_string(),
                "Gig: Landing page audit - 48h turnaround ($150)".to_string(),
            ]
        );
    }

    #[test]
    fn test_feature_prompt_lists_sections_in_order() {
        let mut optional = feature(3, "Follow Up", 3);
        optional.is_optional = true;
        let m = model(
            vec![feature(1, "Headline", 1), feature(2, "Body", 2), optional],
            None,
        );

        let prompt = feature_prompt(&m, &user_with_profile()).expect("render");
        assert!(prompt.starts_with("You are Ad Writer. Writes ad copy"));
        assert!(prompt.contains("- Agency: Northwind Creative"));
        let headline = prompt.find("1. Headline: Write the Headline.").expect("headline");
        let body = prompt.find("2. Body: Write the Body.").expect("body");
        assert!(headline < body);
        assert!(prompt.contains("3. Follow Up (optional)"));
        assert!(prompt.contains(r#"Use exactly these keys: "Headline", "Body", "Follow Up""#));
        assert!(prompt.contains("single JSON object"));
    }

    #[test]
    fn test_master_prompt_includes_base_and_profile() {
        let m = model(Vec::new(), Some("  Review the offer bluntly.  "));
        let prompt = master_prompt(&m, &user_with_profile()).expect("render");
        assert!(prompt.contains("Review the offer bluntly."));
        assert!(prompt.contains("About the user's business:"));
        assert!(!prompt.contains("JSON"));
    }

    #[test]
    fn test_master_prompt_without_profile_omits_section() {
        let user = sample_user(Decimal::new(10, 0), Decimal::ZERO);
        let m = model(Vec::new(), Some("Be brief."));
        let prompt = master_prompt(&m, &user).expect("render");
        assert!(!prompt.contains("About the user's business"));
    }

    #[test]
    fn test_regenerate_prompt() {
        let f = feature(1, "Headline", 1);
        let m = model(vec![f.clone()], None);
        let current = serde_json::json!({"Headline": "Old", "Body": "Text"});

        let prompt = regenerate_prompt(&m, &f, &current, " make it punchier ").expect("render");
        assert!(prompt.contains("\"Headline\": \"Old\""));
        assert!(prompt.contains("Rewrite only the \"Headline\" section."));
        assert!(prompt.contains("The user asked for this change: make it punchier"));
        assert!(prompt.contains("whose only key is \"Headline\""));
    }

    #[test]
    fn test_regenerate_prompt_without_feedback() {
        let f = feature(1, "Headline", 1);
        let m = model(vec![f.clone()], None);
        let prompt = regenerate_prompt(&m, &f, &serde_json::json!({}), "  ").expect("render");
        assert!(!prompt.contains("asked for this change"));
    }
}
