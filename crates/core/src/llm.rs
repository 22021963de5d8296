use crate::traits::Generator;
use crate::{Document, GenerationError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const SYSTEM_INSTRUCTION: &str = "Use the retrieved context to answer the question. \
     If the answer is unknown, say you don't know.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Fixed instruction followed by the retrieved context.
    pub system: String,
    pub question: String,
}

pub fn build_context(sources: &[Document]) -> String {
    sources
        .iter()
        .map(|document| document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, sources: &[Document]) -> Prompt {
    Prompt {
        system: format!("{SYSTEM_INSTRUCTION}\n\nContext:\n{}", build_context(sources)),
        question: question.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by `POST {base}/chat/completions`.
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self {
            client: Client::new(),
            endpoint: base.join("chat/completions")?,
            api_key,
            model: model.into(),
            temperature: 0.0,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for ChatCompletionsClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.question,
                },
            ],
            temperature: self.temperature,
            stream: false,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendResponse {
                status: status.as_u16(),
                details,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        first_completion(parsed)
    }
}

fn first_completion(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(GenerationError::EmptyCompletion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentMetadata;
    use serde_json::json;

    #[test]
    fn prompt_keeps_source_order_and_question() {
        let sources = vec![
            Document::new("first passage", DocumentMetadata::default()),
            Document::new("second passage", DocumentMetadata::default()),
        ];
        let prompt = build_prompt("How much fuel?", &sources);

        assert!(prompt.system.starts_with(SYSTEM_INSTRUCTION));
        assert!(prompt
            .system
            .ends_with("Context:\nfirst passage\n\nsecond passage"));
        assert_eq!(prompt.question, "How much fuel?");
    }

    #[test]
    fn endpoint_is_joined_onto_base_url() {
        let client =
            ChatCompletionsClient::new("https://api.deepseek.com/v1/", None, "deepseek-chat")
                .expect("client should build");
        assert_eq!(
            client.endpoint().as_str(),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn first_choice_content_is_the_answer() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "6,875 gallons"}}]
        }))
        .expect("response should parse");
        assert_eq!(first_completion(response).expect("answer"), "6,875 gallons");
    }

    #[test]
    fn missing_choices_are_an_empty_completion() {
        let response: ChatResponse =
            serde_json::from_value(json!({"choices": []})).expect("response should parse");
        assert!(matches!(
            first_completion(response),
            Err(GenerationError::EmptyCompletion)
        ));
    }
}
