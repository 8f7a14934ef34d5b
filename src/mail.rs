//! Customer email records.

use serde::{Deserialize, Serialize};

/// An inbound customer email. Read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Subject and body as one block of text, used as a retrieval query.
    pub fn text(&self) -> String {
        match (self.subject.trim(), self.body.trim()) {
            ("", body) => body.to_string(),
            (subject, "") => subject.to_string(),
            (subject, body) => format!("{subject}\n\n{body}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(subject: &str, body: &str) -> Email {
        Email {
            id: "E001".into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    #[test]
    fn text_joins_subject_and_body() {
        assert_eq!(
            email("Red dress?", "Do you stock it in M?").text(),
            "Red dress?\n\nDo you stock it in M?"
        );
    }

    #[test]
    fn text_skips_blank_parts() {
        assert_eq!(email("", "  body only ").text(), "body only");
        assert_eq!(email("subject only", "").text(), "subject only");
    }
}
