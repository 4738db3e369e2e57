use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{with_timeout, AiError, LlmClient, Prompt};

const SYSTEM_PROMPT: &str = r#"You are a chatbot designed to answer questions about blood donation.
Reply with a JSON object of the form {"answer": "<your answer>"} and nothing else."#;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaqQuery {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FaqAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One line of the chat transcript. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

pub async fn ask(
    client: &dyn LlmClient,
    query: &FaqQuery,
    timeout: Duration,
) -> Result<FaqAnswer, AiError> {
    let question = query.query.trim();
    if question.is_empty() {
        return Err(AiError::InvalidInput("query is empty".into()));
    }

    let prompt = Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!("Answer the following question:\n\n{}", question),
    };
    let value = with_timeout(timeout, client.complete_json(&prompt)).await?;
    serde_json::from_value(value).map_err(|e| AiError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedClient;
    use serde_json::json;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn answer_is_returned_verbatim() {
        let client = ScriptedClient::new(vec![Ok(
            json!({"answer": "Every 56 days for whole blood."}),
        )]);
        let answer = ask(
            &client,
            &FaqQuery {
                query: "  How often can I donate? ".into(),
            },
            LIMIT,
        )
        .await
        .unwrap();

        assert_eq!(answer.answer, "Every 56 days for whole blood.");
        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].user.ends_with("How often can I donate?"));
    }

    #[tokio::test]
    async fn blank_query_never_reaches_the_model() {
        let client = ScriptedClient::new(vec![]);
        let result = ask(&client, &FaqQuery { query: "   ".into() }, LIMIT).await;
        assert!(matches!(result, Err(AiError::InvalidInput(_))));
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_shape_is_a_schema_error() {
        let client = ScriptedClient::new(vec![Ok(json!({"reply": "hi"}))]);
        let result = ask(&client, &FaqQuery { query: "hi".into() }, LIMIT).await;
        assert!(matches!(result, Err(AiError::Schema(_))));
    }
}
