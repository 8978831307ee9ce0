//! Routing of customer-service queries into fixed categories.

use crate::action::extract_json;
use crate::llm::{self, LLM};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DELIMITER: &str = "####";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primary {
    Billing,
    #[serde(rename = "Technical Support")]
    TechnicalSupport,
    #[serde(rename = "Account Management")]
    AccountManagement,
    #[serde(rename = "General Inquiry")]
    GeneralInquiry,
}

impl Primary {
    pub const ALL: [Primary; 4] = [
        Primary::Billing,
        Primary::TechnicalSupport,
        Primary::AccountManagement,
        Primary::GeneralInquiry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primary::Billing => "Billing",
            Primary::TechnicalSupport => "Technical Support",
            Primary::AccountManagement => "Account Management",
            Primary::GeneralInquiry => "General Inquiry",
        }
    }

    pub fn secondaries(self) -> &'static [&'static str] {
        match self {
            Primary::Billing => &[
                "Unsubscribe or upgrade",
                "Add a payment method",
                "Explanation for charge",
                "Dispute a charge",
            ],
            Primary::TechnicalSupport => &[
                "General troubleshooting",
                "Device compatibility",
                "Software updates",
            ],
            Primary::AccountManagement => &[
                "Password reset",
                "Update personal information",
                "Close account",
                "Account security",
            ],
            Primary::GeneralInquiry => &[
                "Product information",
                "Pricing",
                "Feedback",
                "Speak to a human",
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub primary: Primary,
    pub secondary: String,
}

pub struct Classifier {
    llm: Arc<dyn LLM + Send + Sync>,
    temperature: Option<f32>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LLM + Send + Sync>, temperature: Option<f32>) -> Self {
        Self { llm, temperature }
    }

    pub async fn classify(&self, query: &str) -> Result<Classification> {
        let user = format!("{}{}{}", DELIMITER, query.replace(DELIMITER, ""), DELIMITER);
        let output = llm::chat(self.llm.as_ref(), &system_prompt(), &user, self.temperature).await?;

        extract_json::<Classification>(&output).ok_or(Error::LLMResponseError(format!(
            "expected a classification object, got: {}",
            output
        )))
    }
}

pub fn system_prompt() -> String {
    let categories = Primary::ALL
        .iter()
        .map(|primary| {
            format!(
                "{} secondary categories:\n{}",
                primary.name(),
                primary.secondaries().join("\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You will be provided with customer service queries. \
The customer service query will be delimited with {d} characters.\n\
Classify each query into a primary category and a secondary category.\n\
Provide your output in json format with the keys: primary and secondary.\n\n\
Primary categories: {primaries}.\n\n{categories}",
        d = DELIMITER,
        primaries = Primary::ALL.map(Primary::name).join(", "),
        categories = categories,
    )
}

#[cfg(test)]
mod tests {
    use super::{Classification, Classifier, Primary, system_prompt};
    use crate::llm::{CompletionRequest, CompletionResponse, LLM, Message};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct CannedLLM {
        output: String,
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl LLM for CannedLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            self.seen.lock().unwrap().extend(request.messages.iter().cloned());
            Ok(CompletionResponse {
                content: self.output.clone(),
            })
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    fn canned(output: &str) -> Arc<CannedLLM> {
        Arc::new(CannedLLM {
            output: output.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_system_prompt_lists_categories() {
        let prompt = system_prompt();
        assert!(prompt.contains(
            "Primary categories: Billing, Technical Support, Account Management, General Inquiry."
        ));
        assert!(prompt.contains("Account Management secondary categories:\nPassword reset\n"));
        assert!(prompt.ends_with("Speak to a human"));
    }

    #[tokio::test]
    async fn test_classify() -> Result<()> {
        let llm = canned("```json\n{\"primary\": \"Account Management\", \"secondary\": \"Close account\"}\n```");
        let classifier = Classifier::new(llm.clone(), None);

        let res = classifier
            .classify("I want you to delete my profile and all of my user data")
            .await?;

        assert_eq!(
            res,
            Classification {
                primary: Primary::AccountManagement,
                secondary: "Close account".to_string(),
            }
        );
        assert_eq!(
            llm.seen.lock().unwrap()[1],
            Message::User(
                "####I want you to delete my profile and all of my user data####".to_string()
            )
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_classify_rejects_unknown_output() {
        let classifier = Classifier::new(canned("{\"primary\": \"Sales\", \"secondary\": \"x\"}"), None);

        assert!(matches!(
            classifier.classify("hello").await,
            Err(Error::LLMResponseError(_))
        ));
    }
}
