//! License plate bot: turns inbound Slack events into replies.
//!
//! The bot is built once at startup from an explicit Slack client and plate extractor
//! and shared by every event task. Each event runs fetch → OCR → reply to completion;
//! any failure is logged and reported to the user as text. Nothing is retried.

pub mod blocks;

use crate::channels::{InboundEvent, SlackApi, SlackError, SlackFile};
use crate::pipeline::PlateExtractor;
use blocks::{CarProblemSubmission, CAR_PROBLEM_CALLBACK_ID, CAR_PROBLEM_COMMAND};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Bot {
    slack: Arc<dyn SlackApi>,
    extractor: Arc<dyn PlateExtractor>,
}

impl Bot {
    pub fn new(slack: Arc<dyn SlackApi>, extractor: Arc<dyn PlateExtractor>) -> Self {
        Self { slack, extractor }
    }

    /// Consume events until the sender side closes, handling each on its own task.
    pub async fn run(self: Arc<Self>, mut inbound_rx: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = inbound_rx.recv().await {
            let bot = Arc::clone(&self);
            tokio::spawn(async move {
                bot.handle(event).await;
            });
        }
        log::info!("bot: inbound channel closed");
    }

    /// Handle one event to completion. Slack call failures are logged, never propagated.
    pub async fn handle(&self, event: InboundEvent) {
        let kind = event.kind();
        let result = match event {
            InboundEvent::AppMention { channel, .. } => self.on_app_mention(&channel).await,
            InboundEvent::Message {
                channel,
                ts,
                thread_ts,
                bot_id,
                files,
            } => {
                if bot_id.is_some() {
                    return;
                }
                self.on_message(&channel, thread_ts.as_deref().unwrap_or(&ts), &files)
                    .await
            }
            InboundEvent::SlashCommand {
                command,
                trigger_id,
                channel_id,
                user_id,
                ..
            } => {
                self.on_slash_command(&command, &trigger_id, &channel_id, &user_id)
                    .await
            }
            InboundEvent::ViewSubmission {
                callback_id,
                user_id,
                private_metadata,
                values,
            } => {
                if callback_id != CAR_PROBLEM_CALLBACK_ID {
                    log::debug!("bot: ignoring view submission {}", callback_id);
                    return;
                }
                let channel = if private_metadata.is_empty() {
                    user_id.clone()
                } else {
                    private_metadata
                };
                let submission = CarProblemSubmission::from_values(&values);
                self.on_car_problem_submitted(&channel, &user_id, submission)
                    .await
            }
        };
        if let Err(e) = result {
            log::error!("bot: {} handler failed: {}", kind, e);
        }
    }

    /// Greeting goes to the channel itself, not into a thread.
    async fn on_app_mention(&self, channel: &str) -> Result<(), SlackError> {
        self.slack
            .post_message(channel, blocks::GREETING, None, None)
            .await?;
        Ok(())
    }

    /// One processing/result reply pair per image file, threaded under the upload.
    /// A failed file is logged and the loop moves on to the next one.
    async fn on_message(
        &self,
        channel: &str,
        thread_ts: &str,
        files: &[SlackFile],
    ) -> Result<(), SlackError> {
        for file in files.iter().filter(|f| f.is_image()) {
            if let Err(e) = self.reply_to_image(channel, thread_ts, file).await {
                log::error!("bot: reply for image {} failed: {}", file.id, e);
            }
        }
        Ok(())
    }

    async fn reply_to_image(
        &self,
        channel: &str,
        thread_ts: &str,
        file: &SlackFile,
    ) -> Result<(), SlackError> {
        self.slack
            .post_message(channel, blocks::PROCESSING, Some(thread_ts), None)
            .await?;
        let reply = match self.extract(file).await {
            Ok(result) => blocks::result_text(&result),
            Err(e) => {
                log::error!("error processing image {}: {}", file.id, e);
                blocks::ERROR_REPLY.to_string()
            }
        };
        self.slack
            .post_message(channel, &reply, Some(thread_ts), None)
            .await?;
        Ok(())
    }

    async fn on_slash_command(
        &self,
        command: &str,
        trigger_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), SlackError> {
        if command != CAR_PROBLEM_COMMAND {
            log::debug!("bot: ignoring command {}", command);
            return Ok(());
        }
        let channel = if channel_id.is_empty() { user_id } else { channel_id };
        self.slack
            .open_view(trigger_id, blocks::car_problem_modal(channel))
            .await?;
        log::info!("bot: opened car problem modal for {}", user_id);
        Ok(())
    }

    /// Submitted → FileFound (placeholder, pipeline, one update) or NoFileWarning (one warning).
    async fn on_car_problem_submitted(
        &self,
        channel: &str,
        user_id: &str,
        submission: CarProblemSubmission,
    ) -> Result<(), SlackError> {
        let Some(file) = submission.file else {
            self.slack
                .post_message(channel, blocks::NO_FILE_WARNING, None, None)
                .await?;
            return Ok(());
        };

        let placeholder = self
            .slack
            .post_message(channel, blocks::PLACEHOLDER, None, None)
            .await?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let (text, body) = match self.extract(&file).await {
            Ok(result) => (
                blocks::result_text(&result),
                blocks::success_blocks(
                    &result,
                    file.thumb_360.as_deref(),
                    submission.note.as_deref(),
                    user_id,
                    &timestamp,
                ),
            ),
            Err(e) => {
                log::error!("error processing submitted image {}: {}", file.id, e);
                (
                    blocks::ERROR_REPLY.to_string(),
                    blocks::failure_blocks(&e, user_id, &timestamp),
                )
            }
        };
        self.slack
            .update_message(&placeholder.channel, &placeholder.ts, &text, Some(body))
            .await
    }

    async fn extract(&self, file: &SlackFile) -> Result<crate::plate::ExtractionResult, String> {
        let url = file
            .url_private
            .as_deref()
            .ok_or_else(|| format!("file {} has no download url", file.id))?;
        self.extractor
            .extract(url, self.slack.bot_token())
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::PostedMessage;
    use crate::pipeline::PipelineError;
    use crate::plate::ExtractionResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Post {
            channel: String,
            text: String,
            thread_ts: Option<String>,
        },
        Update {
            channel: String,
            ts: String,
            text: String,
            blocks: Option<Value>,
        },
        OpenView {
            trigger_id: String,
            view: Value,
        },
    }

    /// Behaves like Slack for the parts the bot depends on: a post to a user id lands in
    /// that user's DM (`U…` becomes `D…`), and `chat.update` only accepts conversation ids.
    #[derive(Default)]
    struct RecordingSlack {
        calls: Mutex<Vec<Call>>,
        /// Number of upcoming posts to reject.
        failing_posts: AtomicUsize,
    }

    impl RecordingSlack {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn failing_first_posts(n: usize) -> Self {
            Self {
                failing_posts: AtomicUsize::new(n),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SlackApi for RecordingSlack {
        fn bot_token(&self) -> &str {
            "xoxb-test"
        }

        async fn post_message(
            &self,
            channel: &str,
            text: &str,
            thread_ts: Option<&str>,
            _blocks: Option<Value>,
        ) -> Result<PostedMessage, SlackError> {
            let rejected = self
                .failing_posts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(SlackError::Api("chat.postMessage: ratelimited".to_string()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Post {
                channel: channel.to_string(),
                text: text.to_string(),
                thread_ts: thread_ts.map(String::from),
            });
            let conversation = match channel.strip_prefix('U') {
                Some(user) => format!("D{}", user),
                None => channel.to_string(),
            };
            Ok(PostedMessage {
                channel: conversation,
                ts: format!("ts-{}", calls.len()),
            })
        }

        async fn update_message(
            &self,
            channel: &str,
            ts: &str,
            text: &str,
            blocks: Option<Value>,
        ) -> Result<(), SlackError> {
            if channel.starts_with('U') {
                return Err(SlackError::Api("chat.update: channel_not_found".to_string()));
            }
            self.calls.lock().unwrap().push(Call::Update {
                channel: channel.to_string(),
                ts: ts.to_string(),
                text: text.to_string(),
                blocks,
            });
            Ok(())
        }

        async fn open_view(&self, trigger_id: &str, view: Value) -> Result<(), SlackError> {
            self.calls.lock().unwrap().push(Call::OpenView {
                trigger_id: trigger_id.to_string(),
                view,
            });
            Ok(())
        }
    }

    enum Outcome {
        Plate(&'static str),
        Nothing,
        Fail(String),
    }

    struct FakeExtractor {
        outcome: Outcome,
        calls: AtomicUsize,
        seen_token: Mutex<Option<String>>,
    }

    impl FakeExtractor {
        fn new(outcome: Outcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
                seen_token: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PlateExtractor for FakeExtractor {
        async fn extract(&self, _url: &str, token: &str) -> Result<ExtractionResult, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_token.lock().unwrap() = Some(token.to_string());
            match &self.outcome {
                Outcome::Plate(p) => Ok(ExtractionResult {
                    plate: Some(p.to_string()),
                }),
                Outcome::Nothing => Ok(ExtractionResult::default()),
                Outcome::Fail(msg) => Err(PipelineError::Network(msg.clone())),
            }
        }
    }

    fn setup(outcome: Outcome) -> (Bot, Arc<RecordingSlack>, Arc<FakeExtractor>) {
        let slack = Arc::new(RecordingSlack::default());
        let extractor = Arc::new(FakeExtractor::new(outcome));
        let bot = Bot::new(slack.clone(), extractor.clone());
        (bot, slack, extractor)
    }

    fn image_file(id: &str) -> SlackFile {
        SlackFile {
            id: id.to_string(),
            name: None,
            mimetype: "image/png".to_string(),
            url_private: Some(format!("https://files.example/{}", id)),
            thumb_360: Some(format!("https://files.example/{}_360", id)),
        }
    }

    fn submission(values: Value) -> InboundEvent {
        InboundEvent::ViewSubmission {
            callback_id: CAR_PROBLEM_CALLBACK_ID.to_string(),
            user_id: "U1".to_string(),
            private_metadata: "C1".to_string(),
            values,
        }
    }

    fn with_file() -> Value {
        json!({
            blocks::IMAGE_BLOCK_ID: { blocks::IMAGE_ACTION_ID: { "files": [
                { "id": "F1", "mimetype": "image/png", "url_private": "https://files.example/F1" }
            ]}},
            blocks::NOTE_BLOCK_ID: { blocks::NOTE_ACTION_ID: { "value": "scratched door" } }
        })
    }

    #[tokio::test]
    async fn mention_replies_with_greeting_in_channel() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        bot.handle(InboundEvent::AppMention {
            channel: "C1".to_string(),
            ts: "5.0".to_string(),
            thread_ts: Some("4.0".to_string()),
        })
        .await;
        assert_eq!(
            slack.calls(),
            vec![Call::Post {
                channel: "C1".to_string(),
                text: blocks::GREETING.to_string(),
                thread_ts: None,
            }]
        );
    }

    #[tokio::test]
    async fn image_message_gets_processing_then_plate() {
        let (bot, slack, extractor) = setup(Outcome::Plate("AB1234C"));
        let mut pdf = image_file("F2");
        pdf.mimetype = "application/pdf".to_string();
        bot.handle(InboundEvent::Message {
            channel: "C1".to_string(),
            ts: "7.0".to_string(),
            thread_ts: Some("6.0".to_string()),
            bot_id: None,
            files: vec![image_file("F1"), pdf],
        })
        .await;

        let calls = slack.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Post { text, thread_ts, .. }
            if text == blocks::PROCESSING && thread_ts.as_deref() == Some("6.0")));
        assert!(matches!(&calls[1], Call::Post { text, .. } if text == "Found license plate: `AB1234C`"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.seen_token.lock().unwrap().as_deref(), Some("xoxb-test"));
    }

    #[tokio::test]
    async fn image_without_plate_reports_not_found() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        bot.handle(InboundEvent::Message {
            channel: "C1".to_string(),
            ts: "7.0".to_string(),
            thread_ts: None,
            bot_id: None,
            files: vec![image_file("F1")],
        })
        .await;
        let calls = slack.calls();
        assert!(matches!(&calls[1], Call::Post { text, thread_ts, .. }
            if text == blocks::NOT_FOUND && thread_ts.as_deref() == Some("7.0")));
    }

    #[tokio::test]
    async fn pipeline_failure_becomes_error_reply() {
        let (bot, slack, _) = setup(Outcome::Fail("connection reset".to_string()));
        bot.handle(InboundEvent::Message {
            channel: "C1".to_string(),
            ts: "7.0".to_string(),
            thread_ts: None,
            bot_id: None,
            files: vec![image_file("F1")],
        })
        .await;
        let calls = slack.calls();
        assert!(matches!(&calls[1], Call::Post { text, .. } if text == blocks::ERROR_REPLY));
    }

    #[tokio::test]
    async fn bot_messages_are_ignored() {
        let (bot, slack, extractor) = setup(Outcome::Plate("X1"));
        bot.handle(InboundEvent::Message {
            channel: "C1".to_string(),
            ts: "7.0".to_string(),
            thread_ts: None,
            bot_id: Some("B1".to_string()),
            files: vec![image_file("F1")],
        })
        .await;
        assert!(slack.calls().is_empty());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn car_problem_command_opens_modal() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        bot.handle(InboundEvent::SlashCommand {
            command: CAR_PROBLEM_COMMAND.to_string(),
            trigger_id: "T1".to_string(),
            channel_id: "C5".to_string(),
            user_id: "U1".to_string(),
            text: String::new(),
        })
        .await;
        let calls = slack.calls();
        assert_eq!(calls.len(), 1);
        let Call::OpenView { trigger_id, view } = &calls[0] else {
            panic!("expected views.open");
        };
        assert_eq!(trigger_id, "T1");
        assert_eq!(view["callback_id"], CAR_PROBLEM_CALLBACK_ID);
        assert_eq!(view["private_metadata"], "C5");
    }

    #[tokio::test]
    async fn other_commands_do_nothing() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        bot.handle(InboundEvent::SlashCommand {
            command: "/weather".to_string(),
            trigger_id: "T1".to_string(),
            channel_id: "C5".to_string(),
            user_id: "U1".to_string(),
            text: String::new(),
        })
        .await;
        assert!(slack.calls().is_empty());
    }

    #[tokio::test]
    async fn submission_without_file_warns_once_and_skips_pipeline() {
        let (bot, slack, extractor) = setup(Outcome::Plate("AB12"));
        bot.handle(submission(json!({}))).await;
        assert_eq!(
            slack.calls(),
            vec![Call::Post {
                channel: "C1".to_string(),
                text: blocks::NO_FILE_WARNING.to_string(),
                thread_ts: None,
            }]
        );
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submission_with_file_updates_placeholder_once() {
        let (bot, slack, extractor) = setup(Outcome::Plate("AB1234C"));
        bot.handle(submission(with_file())).await;

        let calls = slack.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Post { text, .. } if text == blocks::PLACEHOLDER));
        let Call::Update { channel, ts, text, blocks: Some(body) } = &calls[1] else {
            panic!("expected chat.update with blocks");
        };
        assert_eq!(channel, "C1");
        assert_eq!(ts, "ts-1");
        assert_eq!(text, "Found license plate: `AB1234C`");
        let rendered = body.to_string();
        assert!(rendered.contains("AB1234C"));
        assert!(rendered.contains("scratched door"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submission_without_plate_updates_with_not_found() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        bot.handle(submission(with_file())).await;
        let calls = slack.calls();
        let updates: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, Call::Update { .. }))
            .collect();
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], Call::Update { text, .. } if text == blocks::NOT_FOUND));
    }

    #[tokio::test]
    async fn submission_failure_truncates_error_text() {
        let (bot, slack, _) = setup(Outcome::Fail("z".repeat(300)));
        bot.handle(submission(with_file())).await;

        let calls = slack.calls();
        let Call::Update { text, blocks: Some(body), .. } = &calls[1] else {
            panic!("expected chat.update");
        };
        assert_eq!(text, blocks::ERROR_REPLY);
        let error_line = body[1]["elements"][0]["text"].as_str().unwrap();
        let shown = error_line.trim_start_matches("Error: ");
        assert_eq!(shown.chars().count(), blocks::MAX_ERROR_CHARS);
    }

    #[tokio::test]
    async fn submission_without_metadata_falls_back_to_user_dm() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        bot.handle(InboundEvent::ViewSubmission {
            callback_id: CAR_PROBLEM_CALLBACK_ID.to_string(),
            user_id: "U9".to_string(),
            private_metadata: String::new(),
            values: json!({}),
        })
        .await;
        assert!(matches!(&slack.calls()[0], Call::Post { channel, .. } if channel == "U9"));
    }

    #[tokio::test]
    async fn dm_placeholder_is_updated_in_resolved_conversation() {
        let (bot, slack, _) = setup(Outcome::Plate("AB1234C"));
        bot.handle(InboundEvent::ViewSubmission {
            callback_id: CAR_PROBLEM_CALLBACK_ID.to_string(),
            user_id: "U9".to_string(),
            private_metadata: String::new(),
            values: with_file(),
        })
        .await;

        let calls = slack.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Post { channel, text, .. }
            if channel == "U9" && text == blocks::PLACEHOLDER));
        let Call::Update { channel, ts, text, .. } = &calls[1] else {
            panic!("placeholder must be finalised");
        };
        assert_eq!(channel, "D9");
        assert_eq!(ts, "ts-1");
        assert_eq!(text, "Found license plate: `AB1234C`");
    }

    #[tokio::test]
    async fn failed_post_for_one_image_does_not_skip_the_next() {
        let slack = Arc::new(RecordingSlack::failing_first_posts(1));
        let extractor = Arc::new(FakeExtractor::new(Outcome::Plate("XY99Z")));
        let bot = Bot::new(slack.clone(), extractor.clone());
        bot.handle(InboundEvent::Message {
            channel: "C1".to_string(),
            ts: "7.0".to_string(),
            thread_ts: None,
            bot_id: None,
            files: vec![image_file("F1"), image_file("F2")],
        })
        .await;

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        let calls = slack.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Post { text, .. } if text == blocks::PROCESSING));
        assert!(matches!(&calls[1], Call::Post { text, .. } if text == "Found license plate: `XY99Z`"));
    }

    #[tokio::test]
    async fn run_handles_events_from_channel() {
        let (bot, slack, _) = setup(Outcome::Nothing);
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(Arc::new(bot).run(rx));
        tx.send(InboundEvent::AppMention {
            channel: "C1".to_string(),
            ts: "1.0".to_string(),
            thread_ts: None,
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();
        for _ in 0..50 {
            if !slack.calls().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(slack.calls().len(), 1);
    }
}
