use std::path::Path;

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    CreateSpeechRequestArgs, SpeechModel, Voice,
};
use async_openai::Client;
use async_trait::async_trait;
use tokio::time::{timeout, Duration};

use crate::error::{Error, Result};
use crate::script::TextGenerator;
use crate::voice::SpeechEngine;

/// Narration text from an OpenAI chat model
pub struct OpenAiText {
    model: String,
}

impl OpenAiText {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiText {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(1024_u32)
            .messages([ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Text(
                        prompt.to_owned(),
                    ))
                    .build()?,
            )])
            .build()?;

        let client = Client::new();
        let response = timeout(Duration::from_secs(300), client.chat().create(request)).await??;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Media("No content in response from OpenAI".to_string()))
    }
}

/// Neural TTS through the OpenAI speech endpoint
pub struct OpenAiSpeech {
    voice: Voice,
}

impl OpenAiSpeech {
    pub fn new(voice: &str) -> Result<Self> {
        Ok(Self {
            voice: parse_voice(voice)?,
        })
    }
}

#[async_trait]
impl SpeechEngine for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str, dest: &Path) -> Result<()> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .voice(self.voice.clone())
            .model(SpeechModel::Tts1Hd)
            .build()?;

        let client = Client::new();
        let response = timeout(Duration::from_secs(120), client.audio().speech(request)).await??;
        response.save(dest).await?;
        Ok(())
    }
}

fn parse_voice(name: &str) -> Result<Voice> {
    match name.trim().to_ascii_lowercase().as_str() {
        "alloy" => Ok(Voice::Alloy),
        "echo" => Ok(Voice::Echo),
        "fable" => Ok(Voice::Fable),
        "onyx" => Ok(Voice::Onyx),
        "nova" => Ok(Voice::Nova),
        "shimmer" => Ok(Voice::Shimmer),
        other => Err(Error::Config(format!("unknown OpenAI voice '{other}'"))),
    }
}
