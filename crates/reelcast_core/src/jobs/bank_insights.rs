//! Bank account insights: an intro, one animated chart per bank, an outro.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{spoken, Deck, PayloadError, ReportKind};
use crate::models::SlideSpec;

pub const BACKGROUND: &str = "background.jpg";

/// The chart canvas the bank template draws into.
pub const CHART_SELECTOR: &str = "canvas#spendChart";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankInsights {
    pub name: String,
    #[serde(default)]
    pub banks: Vec<BankSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSummary {
    pub bank_name: String,
    #[serde(default)]
    pub bank_logo: String,
    pub high_spend: HighSpend,
    pub monthly_spend: Value,
    /// Category → amount, in payload order.
    #[serde(default)]
    pub category_breakdown: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighSpend {
    pub amount: Value,
    pub merchant: String,
    pub date: String,
}

impl BankInsights {
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let insights: Self =
            serde_json::from_value(value.clone()).map_err(|source| PayloadError::Invalid {
                kind: ReportKind::BankInsights,
                source,
            })?;
        if insights.name.trim().is_empty() {
            return Err(PayloadError::Missing {
                kind: ReportKind::BankInsights,
                field: "name",
            });
        }
        Ok(insights)
    }
}

pub fn deck(insights: &BankInsights, ready_timeout: Duration) -> Deck {
    let mut slides = Vec::with_capacity(insights.banks.len() + 2);

    slides.push(SlideSpec::still(
        "intro_template.html",
        json!({ "user_name": insights.name }),
        format!(
            "Hi {}, let's walk through your bank account insights.",
            insights.name
        ),
    ));

    for bank in &insights.banks {
        slides.push(
            SlideSpec::motion("bank_slide_template.html", bank_context(bank), narration(bank))
                .ready_when(CHART_SELECTOR, ready_timeout),
        );
    }

    slides.push(SlideSpec::still(
        "outro_template.html",
        json!({}),
        "Hope this was helpful. Use our app to discover more interesting features!",
    ));

    Deck {
        name: insights.name.clone(),
        slides,
        assets: vec![BACKGROUND.to_string()],
    }
}

fn bank_context(bank: &BankSummary) -> Value {
    json!({
        "bank_name": bank.bank_name,
        "high_spend": bank.high_spend,
        "monthly_spend": bank.monthly_spend,
        "category_breakdown": bank.category_breakdown,
        "bank_logo": bank.bank_logo,
        "background_image": BACKGROUND,
    })
}

fn narration(bank: &BankSummary) -> String {
    let categories: Vec<&str> = bank.category_breakdown.keys().map(String::as_str).collect();
    format!(
        "Here’s your {} account. Your highest spend was ₹{} at {} on {}. \
         This month, you spent ₹{}, mostly on {}.",
        bank.bank_name,
        spoken(&bank.high_spend.amount),
        bank.high_spend.merchant,
        bank.high_spend.date,
        spoken(&bank.monthly_spend),
        categories.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReadyCondition, RenderMode};

    fn sample() -> Value {
        json!({
            "name": "Asha",
            "banks": [{
                "bank_name": "HDFC Bank",
                "high_spend": {"amount": 12500, "merchant": "Croma", "date": "12 Mar"},
                "monthly_spend": 48200,
                "category_breakdown": {"Shopping": 20000, "Food": 9000, "Bills": 6000}
            }]
        })
    }

    #[test]
    fn intro_banks_outro() {
        let insights = BankInsights::from_value(&sample()).unwrap();
        let deck = deck(&insights, Duration::from_secs(10));

        assert_eq!(deck.slides.len(), 3);
        assert_eq!(deck.slides[0].template_id, "intro_template.html");
        assert_eq!(deck.slides[2].template_id, "outro_template.html");
        assert_eq!(deck.assets, vec!["background.jpg".to_string()]);
        assert_eq!(
            deck.slides[1].mode,
            RenderMode::Motion {
                ready: Some(ReadyCondition::new(CHART_SELECTOR, Duration::from_secs(10)))
            }
        );
    }

    #[test]
    fn bank_narration_keeps_category_order() {
        let insights = BankInsights::from_value(&sample()).unwrap();
        let deck = deck(&insights, Duration::from_secs(10));

        assert_eq!(
            deck.slides[1].narration,
            "Here’s your HDFC Bank account. Your highest spend was ₹12500 at Croma on 12 Mar. \
             This month, you spent ₹48200, mostly on Shopping, Food, Bills."
        );
        assert_eq!(deck.slides[1].context["bank_logo"], "");
        assert_eq!(deck.slides[1].context["background_image"], "background.jpg");
    }

    #[test]
    fn no_banks_still_has_intro_and_outro() {
        let insights = BankInsights::from_value(&json!({"name": "Asha"})).unwrap();
        let deck = deck(&insights, Duration::from_secs(10));
        assert_eq!(deck.slides.len(), 2);
        assert!(deck.slides.iter().all(|s| !s.mode.is_motion()));
    }
}
