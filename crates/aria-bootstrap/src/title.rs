// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The slow-title [`TitleSummarizer`] implementation: asks the configured
//! model gateway for a concise summary of the session's opening message.
//!
//! Kept out of `aria-core` (which must not depend on `aria-model`) and out
//! of `aria-model` (which has no notion of a session) — this is exactly the
//! kind of seam-crossing glue `aria-bootstrap` exists to hold.

use std::sync::Arc;

use aria_core::TitleSummarizer;
use aria_model::{CompletionRequest, Message, ModelGateway, ResponseEvent};
use async_trait::async_trait;
use futures::StreamExt;

pub struct GatewayTitleSummarizer {
    gateway: Arc<ModelGateway>,
    config: Arc<aria_config::Config>,
}

impl GatewayTitleSummarizer {
    pub fn new(gateway: Arc<ModelGateway>, config: Arc<aria_config::Config>) -> Self {
        Self { gateway, config }
    }
}

#[async_trait]
impl TitleSummarizer for GatewayTitleSummarizer {
    async fn summarize(&self, first_message: &str) -> anyhow::Result<String> {
        let model_id = self
            .gateway
            .select(&self.config)
            .ok_or_else(|| anyhow::anyhow!("no model available for slow-title generation"))?;

        let req = CompletionRequest {
            messages: vec![
                Message::system("Summarize the user's message as a concise chat title of six words or fewer. Reply with the title only, no punctuation at the end."),
                Message::user(first_message),
            ],
            tools: vec![],
            stream: false,
            system_dynamic_suffix: None,
        };

        let mut stream = self.gateway.complete(&self.config, &model_id, req).await?;
        let mut title = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => title.push_str(&delta),
                ResponseEvent::Done => break,
                ResponseEvent::Error(e) => anyhow::bail!("slow-title generation failed: {e}"),
                _ => {}
            }
        }
        if title.trim().is_empty() {
            anyhow::bail!("slow-title generation returned an empty summary");
        }
        Ok(title.trim().to_string())
    }
}
