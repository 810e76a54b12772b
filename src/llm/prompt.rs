//! Prompt construction for email insight extraction

use chrono::{DateTime, Utc};

/// Body text beyond this many characters is truncated before prompting
const MAX_BODY_CHARS: usize = 6_000;

pub const SYSTEM_PROMPT: &str = r#"You are an assistant that analyzes a single email from a mortgage loan officer's personal archive and extracts structured facts about the SENDER of that email.

Rules you must follow:

1. Only describe the person who SENT this email. Quoted or forwarded text below markers like "On ... wrote:", "-----Original Message-----", or lines starting with ">" belongs to OTHER people. Never take a name, phone number, license number, company, or title from quoted or forwarded blocks.

2. Do not confuse the sender with people merely mentioned in the email. A subject line like "Smith loan application" names a borrower, not the sender. Only attribute contact details to the sender when the email's own signature or self-introduction supports it.

3. If the sender is an automated system (notifications, newsletters, receipts, marketing blasts), set is_human to false and give a short delete_reason.

4. Express uncertainty through the confidence fields (0.0 to 1.0). Use null for any field the email does not support. Never guess.

Respond with a single JSON object and nothing else:

{
  "is_human": true,
  "delete_reason": null,
  "sender_contact": {
    "name": "string or null",
    "name_source": "signature|greeting|header|null",
    "phone": "string or null",
    "company": "string or null",
    "title": "string or null",
    "nmls_license": "string or null",
    "agent_license": "string or null",
    "confidence": 0.0
  },
  "relationship": {
    "role": "client|loan_officer|processor|underwriter|closer|branch_manager|realtor|title_escrow|attorney|insurance|appraiser|finance|human_resources|compliance|operations|admin|marketing|it|lender_employee|unknown",
    "confidence": 0.0,
    "signals": ["short phrases naming the evidence"]
  },
  "email_analysis": {
    "intent": "one short phrase",
    "sentiment": "positive|neutral|negative",
    "summary": "one or two sentences"
  },
  "deal_info": "property address or loan reference if present, else null"
}"#;

/// One email presented to the model
#[derive(Debug, Clone)]
pub struct PromptEmail<'a> {
    pub sender: &'a str,
    pub sender_name: Option<&'a str>,
    pub recipient: &'a str,
    pub subject: &'a str,
    pub date: Option<DateTime<Utc>>,
    pub body: &'a str,
}

/// Builds the user prompt for one email, with the body bounded
pub fn build_user_prompt(email: &PromptEmail<'_>) -> String {
    let date = email
        .date
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    let body: String = if email.body.chars().count() > MAX_BODY_CHARS {
        let mut truncated: String = email.body.chars().take(MAX_BODY_CHARS).collect();
        truncated.push_str("\n[... truncated ...]");
        truncated
    } else {
        email.body.to_string()
    };

    format!(
        "From: {}{}\nTo: {}\nDate: {}\nSubject: {}\n\n{}",
        email.sender,
        email
            .sender_name
            .map(|n| format!(" ({})", n))
            .unwrap_or_default(),
        email.recipient,
        date,
        email.subject,
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email<'a>(body: &'a str) -> PromptEmail<'a> {
        PromptEmail {
            sender: "jane@summit.com",
            sender_name: Some("Jane Doe"),
            recipient: "op@lender.com",
            subject: "Rate lock",
            date: None,
            body,
        }
    }

    #[test]
    fn test_prompt_includes_headers() {
        let prompt = build_user_prompt(&email("Hello"));
        assert!(prompt.contains("From: jane@summit.com (Jane Doe)"));
        assert!(prompt.contains("Subject: Rate lock"));
        assert!(prompt.ends_with("Hello"));
    }

    #[test]
    fn test_long_body_truncated() {
        let long = "x".repeat(MAX_BODY_CHARS + 500);
        let prompt = build_user_prompt(&email(&long));
        assert!(prompt.contains("[... truncated ...]"));
        assert!(prompt.len() < long.len() + 200);
    }

    #[test]
    fn test_system_prompt_covers_quoting_and_mentions() {
        // The two classic extraction failure modes must be addressed head-on
        assert!(SYSTEM_PROMPT.contains("quoted or forwarded"));
        assert!(SYSTEM_PROMPT.contains("borrower"));
    }
}
