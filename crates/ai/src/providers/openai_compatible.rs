//! Any vendor exposing the OpenAI REST surface (chat completions, images).

use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response, multipart};
use serde::{Deserialize, Serialize};

use crate::capability::{Image, ImageGenerator, ImageOptions, ImageRef, TextGenerator};
use crate::registry::ProviderConfig;
use crate::result::{AiError, Generated};

pub const TAG: &str = "openai_compatible";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEXT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const SYSTEM_PROMPT: &str = "You are a helpful assistant for creating presentation content.";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u8,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Text and image client for OpenAI-compatible endpoints.
pub struct OpenAiCompatible {
    client: Client,
    base_url: String,
    api_key: String,
    model: Option<String>,
}

impl OpenAiCompatible {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, AiError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = cfg
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn text_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_TEXT_MODEL)
    }

    fn image_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    fn download(&self, url: &str) -> Result<Image, AiError> {
        let response = self.client.get(url).timeout(DOWNLOAD_TIMEOUT).send()?;
        let response = ensure_success(response)?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(Image::new(bytes.to_vec(), mime_type))
    }

    fn finish_image(&self, response: Response) -> Result<Generated<Image>, AiError> {
        let body: ImageResponse = ensure_success(response)?.json()?;
        let url = body
            .data
            .into_iter()
            .find_map(|d| d.url)
            .filter(|u| !u.is_empty())
            .ok_or(AiError::EmptyResponse)?;
        let image = self.download(&url)?;
        Ok(Generated::new(image, body.usage.map_or(0, |u| u.total_tokens)))
    }
}

/// Maps an aspect ratio to the closest size the images endpoint accepts.
pub fn size_for_aspect_ratio(aspect_ratio: &str) -> &'static str {
    match aspect_ratio {
        "16:9" => "1792x1024",
        "9:16" => "1024x1792",
        _ => "1024x1024",
    }
}

fn ensure_success(response: Response) -> Result<Response, AiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(AiError::provider(format!("{status}: {}", body.trim())))
}

fn log_call<T>(provider: &str, op: &str, started: Instant, result: &Result<Generated<T>, AiError>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(out) => tracing::info!(
            provider,
            op,
            success = true,
            elapsed_ms,
            usage_tokens = out.usage_tokens,
            "provider call finished"
        ),
        Err(e) => tracing::warn!(
            provider,
            op,
            success = false,
            elapsed_ms,
            error = %e,
            "provider call failed"
        ),
    }
}

impl TextGenerator for OpenAiCompatible {
    fn provider(&self) -> &str {
        TAG
    }

    fn generate(&self, prompt: &str) -> Result<Generated<String>, AiError> {
        let started = Instant::now();
        let result = (|| -> Result<Generated<String>, AiError> {
            let request = ChatRequest {
                model: self.text_model(),
                messages: [
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: prompt,
                    },
                ],
            };
            let response = self
                .client
                .post(self.endpoint("chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()?;
            let body: ChatResponse = ensure_success(response)?.json()?;
            let content = body
                .choices
                .into_iter()
                .find_map(|c| c.message.content)
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .ok_or(AiError::EmptyResponse)?;
            Ok(Generated::new(content, body.usage.map_or(0, |u| u.total_tokens)))
        })();
        log_call(TAG, "text.generate", started, &result);
        result
    }
}

impl ImageGenerator for OpenAiCompatible {
    fn provider(&self) -> &str {
        TAG
    }

    fn generate(
        &self,
        prompt: &str,
        reference: Option<&Image>,
        extra_refs: &[ImageRef],
        options: &ImageOptions,
    ) -> Result<Generated<Image>, AiError> {
        if reference.is_some() || !extra_refs.is_empty() {
            tracing::debug!(
                provider = TAG,
                extra_refs = extra_refs.len(),
                "reference images are not supported by the generations endpoint"
            );
        }

        let started = Instant::now();
        let result = (|| -> Result<Generated<Image>, AiError> {
            let request = ImageRequest {
                model: self.image_model(),
                prompt,
                size: size_for_aspect_ratio(&options.aspect_ratio),
                n: 1,
            };
            let response = self
                .client
                .post(self.endpoint("images/generations"))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()?;
            self.finish_image(response)
        })();
        log_call(TAG, "image.generate", started, &result);
        result
    }

    fn edit(
        &self,
        prompt: &str,
        current: &Image,
        extra_refs: &[ImageRef],
        options: &ImageOptions,
    ) -> Result<Generated<Image>, AiError> {
        if !extra_refs.is_empty() {
            tracing::debug!(
                provider = TAG,
                extra_refs = extra_refs.len(),
                "extra reference images are not supported by the edits endpoint"
            );
        }

        let started = Instant::now();
        let result = (|| -> Result<Generated<Image>, AiError> {
            let image = multipart::Part::bytes(current.bytes.clone())
                .file_name("image.png")
                .mime_str(&current.mime_type)?;
            let form = multipart::Form::new()
                .text("model", self.image_model().to_string())
                .text("prompt", prompt.to_string())
                .text("size", size_for_aspect_ratio(&options.aspect_ratio))
                .part("image", image);
            let response = self
                .client
                .post(self.endpoint("images/edits"))
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()?;
            self.finish_image(response)
        })();
        log_call(TAG, "image.edit", started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_aspect_ratio() {
        assert_eq!(size_for_aspect_ratio("16:9"), "1792x1024");
        assert_eq!(size_for_aspect_ratio("9:16"), "1024x1792");
        assert_eq!(size_for_aspect_ratio("4:3"), "1024x1024");
    }

    #[test]
    fn base_url_defaults_and_trims_trailing_slash() {
        let client = OpenAiCompatible::new(&ProviderConfig::new(TAG, "k")).unwrap();
        assert_eq!(client.endpoint("chat/completions"), "https://api.openai.com/v1/chat/completions");

        let cfg = ProviderConfig::new(TAG, "k").with_base_url("http://localhost:8080/v1/");
        let client = OpenAiCompatible::new(&cfg).unwrap();
        assert_eq!(client.endpoint("images/edits"), "http://localhost:8080/v1/images/edits");
    }

    #[test]
    fn configured_model_applies_to_both_capabilities() {
        let client = OpenAiCompatible::new(&ProviderConfig::new(TAG, "k")).unwrap();
        assert_eq!(client.text_model(), DEFAULT_TEXT_MODEL);
        assert_eq!(client.image_model(), DEFAULT_IMAGE_MODEL);

        let client = OpenAiCompatible::new(&ProviderConfig::new(TAG, "k").with_model("qwen")).unwrap();
        assert_eq!(client.text_model(), "qwen");
        assert_eq!(client.image_model(), "qwen");
    }

    #[test]
    fn chat_response_parses_content_and_usage() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":" hi "}}],"usage":{"total_tokens":42}}"#;
        let body: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some(" hi "));
        assert_eq!(body.usage.map(|u| u.total_tokens), Some(42));
    }
}
