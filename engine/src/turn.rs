//! Message turns: budget pinned files, ask the model, stage its proposals.

use scribe_context::{ContentBudgeter, PromptAssembler};
use scribe_providers::reply_failure;
use scribe_tools::{ChangeParser, ToolError};
use scribe_types::{ContentPart, ModelHint};
use tracing::{info, warn};

use crate::console::Console;
use crate::session::{AGENT_NAME, Session};
use crate::summarizer::ChatSummarizer;

/// Model required for screen-capture analysis.
pub(crate) const CAPTURE_MODEL: &str = "gemini";

impl Session {
    /// Send `message` with the project context and stage any proposed changes.
    pub(crate) fn send_message(&mut self, message: &str, console: &mut dyn Console) {
        let Some(model) = self.ensure_model(console) else {
            return;
        };
        let temperature = self.settings.temperature.value();

        let pinned = self.pinned.to_vec();
        let report = {
            let mut summarizer = ChatSummarizer::new(self.chat.as_mut(), &model, temperature);
            ContentBudgeter::new(&self.index, self.limits).budget(&pinned, &mut summarizer)
        };
        for notice in &report.notices {
            if notice.is_error() {
                console.error(&notice.to_string());
            } else {
                console.notice(&notice.to_string());
            }
        }
        for stale in &report.stale {
            self.pinned.remove(stale);
        }

        let parts = PromptAssembler::new(self.index.root(), self.admin_mode()).assemble(
            self.index.tree_text(),
            &report,
            message,
        );
        info!(
            %model,
            pinned = report.files.len(),
            chars = report.total_chars,
            "Sending message turn"
        );
        console.notice(&format!(
            "Sending request to {model} (focus: code assistance)..."
        ));

        let result = self.chat.chat(&parts, &model, ModelHint::Code, temperature);
        if let Some(reason) = reply_failure(&result) {
            warn!(%model, "Model request failed: {reason}");
            console.error(&format!("AI/API Error: {reason}"));
            return;
        }
        let reply = result.unwrap_or_default();
        console.agent(AGENT_NAME, &reply);
        self.stage_proposals(&reply, console);
    }

    /// Capture the screen and ask the capture model to analyze it.
    pub(crate) fn capture_context(&mut self, instruction: Option<&str>, console: &mut dyn Console) {
        if !self.chat.is_available(CAPTURE_MODEL) {
            console.error(&format!(
                "Screen capture analysis requires the '{CAPTURE_MODEL}' model, which is not available."
            ));
            return;
        }
        let Some(capture) = self.capture.as_mut() else {
            console.error("Screen capture is not supported on this system (no capture utility found).");
            return;
        };

        console.notice("Capturing screen...");
        let image = match capture.capture() {
            Ok(image) => image,
            Err(e @ ToolError::Timeout { .. }) => {
                warn!("Screen capture timed out: {e}");
                console.error(&format!("Screen capture timed out: {e}"));
                return;
            }
            Err(e) => {
                warn!("Screen capture failed: {e}");
                console.error(&format!("Screen capture failed: {e}"));
                return;
            }
        };
        console.notice("Screen captured successfully. Sending to AI for analysis...");

        let parts: Vec<ContentPart> = PromptAssembler::capture_parts(instruction, image);
        let temperature = self.settings.temperature.value();
        let result = self
            .chat
            .chat(&parts, CAPTURE_MODEL, ModelHint::Conversation, temperature);
        if let Some(reason) = reply_failure(&result) {
            warn!("Capture analysis failed: {reason}");
            console.error(&format!("AI/API Error: {reason}"));
            return;
        }
        let reply = result.unwrap_or_default();
        console.agent(AGENT_NAME, &format!("AI Analysis of Screenshot:\n{reply}"));
        self.stage_proposals(&reply, console);
    }

    /// Parse `reply` and keep any proposals as the pending batch.
    ///
    /// Any earlier batch is replaced, or dropped when the reply proposes nothing.
    fn stage_proposals(&mut self, reply: &str, console: &mut dyn Console) {
        if self.pending.take().is_some() {
            info!("Discarding unapplied proposals from the previous turn");
        }
        let outcome = ChangeParser::new(&self.sandbox).parse(reply);
        for rejected in &outcome.rejected {
            console.error(&format!(
                "Ignoring proposed change for '{}': {}",
                rejected.identifier, rejected.error
            ));
        }
        if outcome.empty_identifiers > 0 {
            console.error(&format!(
                "Ignoring {} proposed change(s) with an empty file path.",
                outcome.empty_identifiers
            ));
        }
        let Some(batch) = outcome.into_batch() else {
            return;
        };

        let (new_files, existing) = batch.new_and_modified_counts();
        console.notice(&format!(
            "\n--- AI proposed code changes involving {} file(s) ---",
            batch.unique_targets()
        ));
        console.notice(&format!(
            "Details: {new_files} new file(s), {existing} existing file(s) to be modified."
        ));
        console.notice("Use /apply to review and apply these changes, or /discard to ignore them.");
        self.pending = Some(batch);
    }
}
