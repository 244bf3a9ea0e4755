//! Telegram channel adapter.
//!
//! Consumes the long-poll update feed, maps each message into the
//! platform-agnostic [`InboundMessage`], runs the transcription pipeline, and
//! delivers the outcome: transcript reply on success, a fixed generic reply on
//! failure, silence on skip. The dispatcher runs handlers on their own tasks,
//! so a slow pipeline run never blocks receipt of the next update; replies are
//! tied to their message by an explicit reply reference, not by ordering.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{Message as TgMessage, MessageId, ReplyParameters};
use tracing::{error, info};
use voxrelay_core::{
    reply_text_for, AudioKind, AudioRef, FetchableLocation, FileGateway, InboundMessage, Outcome,
};
use voxrelay_pipeline::Pipeline;

pub struct TelegramAdapter {
    bot: Bot,
    pipeline: Arc<Pipeline>,
}

impl TelegramAdapter {
    pub fn new(bot: Bot, pipeline: Arc<Pipeline>) -> Self {
        Self { bot, pipeline }
    }

    /// Runs the long-poll dispatcher until shutdown.
    pub async fn start(self) -> Result<()> {
        info!("ready to receive messages");

        let handler = Update::filter_message().endpoint(handle_message);
        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.pipeline])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

async fn handle_message(bot: Bot, msg: TgMessage, pipeline: Arc<Pipeline>) -> ResponseResult<()> {
    let inbound = map_message(&msg);
    let outcome = pipeline.run(&inbound).await;

    if let Some(reply) = outcome_reply(msg.id, &outcome) {
        if let Err(err) = bot
            .send_message(msg.chat.id, reply.text)
            .reply_parameters(ReplyParameters::new(reply.to_message_id))
            .await
        {
            error!(
                error = %err,
                chat_id = inbound.chat_id,
                message_id = inbound.message_id,
                "unable to send reply"
            );
        }
    }
    Ok(())
}

/// Maps a Telegram message into the pipeline's inbound shape.
///
/// A generic audio attachment takes precedence over a voice note; Telegram
/// never attaches both to one message.
pub fn map_message(msg: &TgMessage) -> InboundMessage {
    let audio = if let Some(audio) = msg.audio() {
        Some(AudioRef {
            kind: AudioKind::File,
            file_id: audio.file.id.clone(),
            duration_secs: audio.duration.seconds(),
        })
    } else {
        msg.voice().map(|voice| AudioRef {
            kind: AudioKind::Voice,
            file_id: voice.file.id.clone(),
            duration_secs: voice.duration.seconds(),
        })
    };

    InboundMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        audio,
    }
}

/// A reply to be sent back into the originating chat.
#[derive(Debug, PartialEq, Eq)]
pub struct Reply {
    pub to_message_id: MessageId,
    pub text: String,
}

/// Decides what, if anything, to send for a pipeline outcome. At most one
/// reply per message, always addressed to the original message id.
pub fn outcome_reply(message_id: MessageId, outcome: &Outcome) -> Option<Reply> {
    reply_text_for(outcome).map(|text| Reply {
        to_message_id: message_id,
        text: text.to_string(),
    })
}

/// Resolves Telegram file identifiers into short-lived download URLs.
pub struct TelegramFileGateway {
    bot: Bot,
}

impl TelegramFileGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl FileGateway for TelegramFileGateway {
    async fn resolve_file(&self, file_id: &str) -> Result<FetchableLocation> {
        let file = self.bot.get_file(file_id.to_owned()).await?;
        Ok(FetchableLocation {
            url: file_url(self.bot.token(), &file.path),
        })
    }
}

fn file_url(token: &str, file_path: &str) -> String {
    format!("https://api.telegram.org/file/bot{token}/{file_path}")
}
