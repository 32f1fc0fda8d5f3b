//! Credit report walkthrough: score, active and closed accounts, and a
//! closing note on payment history.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{spoken, Deck, PayloadError, ReportKind};
use crate::models::SlideSpec;

/// Images the credit report templates reference.
pub const ASSETS: [&str; 4] = [
    "character.png",
    "cards_clock.png",
    "money_check_calendar.png",
    "moneybag_clock.png",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReport {
    pub name: String,
    pub credit_score: Value,
    /// Account rows shown on the active accounts slide.
    #[serde(default)]
    pub accounts_active: Vec<Value>,
    /// Active accounts not listed on the slide.
    #[serde(default)]
    pub more_count_active: u32,
    #[serde(default)]
    pub total_count_active: u32,
    #[serde(default)]
    pub accounts_closed: Vec<Value>,
    #[serde(default)]
    pub more_count_closed: u32,
    #[serde(default)]
    pub total_count_closed: u32,
}

impl CreditReport {
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let report: Self =
            serde_json::from_value(value.clone()).map_err(|source| PayloadError::Invalid {
                kind: ReportKind::CreditReport,
                source,
            })?;
        if report.name.trim().is_empty() {
            return Err(PayloadError::Missing {
                kind: ReportKind::CreditReport,
                field: "name",
            });
        }
        Ok(report)
    }
}

pub fn deck(report: &CreditReport) -> Deck {
    let closed_context = json!({
        "accounts": report.accounts_closed,
        "more_count": report.more_count_closed,
    });

    let slides = vec![
        SlideSpec::still(
            "slide_1.html",
            json!({
                "user_name": report.name,
                "credit_score": report.credit_score,
            }),
            greeting(report),
        ),
        SlideSpec::still(
            "slide_2.html",
            json!({
                "accounts": report.accounts_active,
                "more_count": report.more_count_active,
            }),
            format!(
                "I can check that you currently have {} active accounts in your profile. \
                 There are no missed payments recorded on these accounts yet. This is a great thing. \
                 Continue this and ensure that no E.M.I. payments gets missed. \
                 Missing payments leads to lowering of credit score by 50 to 100 points. \
                 This will badly affect your good payment history. Avoid this. \
                 Timely payments is a financially sound behaviour and leads to good credit score.",
                report.total_count_active
            ),
        ),
        SlideSpec::still(
            "slide_3.html",
            closed_context.clone(),
            format!(
                "I can check that you currently have {} closed accounts in your profile. \
                 There are no missed payments recorded on these accounts yet. This is a great thing. \
                 Timely payments is a financially sound behaviour and leads to good credit score.",
                report.total_count_closed
            ),
        ),
        SlideSpec::still(
            "slide_4.html",
            closed_context,
            "I wanted to take a moment to congratulate you on your stellar credit history.",
        ),
        SlideSpec::motion(
            "slide_5.html",
            json!({}),
            "Its clear that you have been diligently making payments on time. \
             And your account's long history reflects your commitments to financial responsibility.",
        ),
    ];

    Deck {
        name: report.name.clone(),
        slides,
        assets: ASSETS.iter().map(|a| a.to_string()).collect(),
    }
}

fn greeting(report: &CreditReport) -> String {
    format!(
        "Hi {}, Your credit score is {}. This is a good credit score. \
         I have analysed your credit report and I have few suggestions for you to improve your credit score. \
         Watch this video till the end and follow the steps diligently.",
        report.name,
        spoken(&report.credit_score)
    )
}
