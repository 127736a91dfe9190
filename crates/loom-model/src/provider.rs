// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    ///
    /// An `Err` here, or an `Err` item inside the stream, means the model
    /// could not be reached or answered with a transport-level failure.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
