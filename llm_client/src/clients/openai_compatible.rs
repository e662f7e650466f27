//! Client for any OpenAI-chat-completions-compatible endpoint (self-hosted
//! inference gateways, Groq, OpenRouter, etc.) identified purely by an
//! api_base + api_key pair rather than a fixed provider SDK.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::error;

use crate::provider::{LLMProvider, LLMProviderAPIKeys};

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientCompletionStringRequest,
    LLMClientError, LLMClientMessage, LLMClientRole,
};

pub struct OpenAICompatibleClient {}

impl OpenAICompatibleClient {
    pub fn new() -> Self {
        Self {}
    }

    fn messages(&self, messages: &[LLMClientMessage]) -> Result<Vec<ChatCompletionRequestMessage>, LLMClientError> {
        messages
            .iter()
            .map(|message| match message.role() {
                LLMClientRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content().to_owned())
                    .build()
                    .map(ChatCompletionRequestMessage::User)
                    .map_err(LLMClientError::OpenAPIError),
                LLMClientRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content().to_owned())
                    .build()
                    .map(ChatCompletionRequestMessage::System)
                    .map_err(LLMClientError::OpenAPIError),
                LLMClientRole::Assistant | LLMClientRole::Function => {
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(message.content().to_owned())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant)
                        .map_err(LLMClientError::OpenAPIError)
                }
            })
            .collect()
    }

    fn client(&self, api_key: LLMProviderAPIKeys) -> Result<Client<OpenAIConfig>, LLMClientError> {
        match api_key {
            LLMProviderAPIKeys::OpenAICompatible(config) => {
                let openai_config = OpenAIConfig::new()
                    .with_api_key(config.api_key)
                    .with_api_base(config.api_base);
                Ok(Client::with_config(openai_config))
            }
            _ => Err(LLMClientError::WrongAPIKeyType),
        }
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    fn client(&self) -> &LLMProvider {
        &LLMProvider::OpenAICompatible
    }

    async fn stream_completion(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
        sender: tokio::sync::mpsc::UnboundedSender<LLMClientCompletionResponse>,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let model = request.model().to_string();
        let messages = self.messages(request.messages())?;
        let mut request_builder = CreateChatCompletionRequestArgs::default();
        let mut request_builder = request_builder
            .model(model.clone())
            .messages(messages)
            .stream(true)
            .response_format(ResponseFormat::Text)
            .temperature(request.temperature());
        if let Some(frequency_penalty) = request.frequency_penalty() {
            request_builder = request_builder.frequency_penalty(frequency_penalty);
        }
        let chat_request = request_builder.build()?;

        let client = self.client(api_key)?;
        let mut stream = client.chat().create_stream(chat_request).await?;

        let mut buffer = String::new();
        while let Some(response) = stream.next().await {
            match response {
                Ok(response) => {
                    let Some(choice) = response.choices.into_iter().next() else {
                        continue;
                    };
                    if let Some(text) = choice.delta.content {
                        buffer.push_str(&text);
                        if let Err(e) = sender.send(LLMClientCompletionResponse::new(
                            buffer.clone(),
                            Some(text),
                            model.clone(),
                        )) {
                            error!("Failed to send completion response: {}", e);
                            return Err(LLMClientError::SendError(e));
                        }
                    }
                }
                Err(err) => {
                    error!("OpenAI-compatible stream error: {:?}", err);
                    break;
                }
            }
        }

        Ok(LLMClientCompletionResponse::new(buffer, None, model))
    }

    async fn completion(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<String, LLMClientError> {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let result = self.stream_completion(api_key, request, sender).await?;
        Ok(result.answer_up_until_now().to_owned())
    }

    async fn stream_prompt_completion(
        &self,
        _api_key: LLMProviderAPIKeys,
        _request: LLMClientCompletionStringRequest,
        _sender: tokio::sync::mpsc::UnboundedSender<LLMClientCompletionResponse>,
    ) -> Result<String, LLMClientError> {
        Err(LLMClientError::OpenAIDoesNotSupportCompletion)
    }
}
