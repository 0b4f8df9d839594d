use std::collections::HashMap;
use std::sync::Mutex;

use adreel_proto::{
    AdCopy, CampaignError, CopyGenerator, DeliveryReceipt, Notifier, PreferenceStore,
    RenderHandle, RenderStatus, UserPreferences, VideoArtifact, VideoRenderer,
};
use async_trait::async_trait;
use chrono::Utc;

/// Preference store backed by an in-memory map.
#[derive(Debug, Default)]
pub struct ScriptedPreferenceStore {
    users: HashMap<String, UserPreferences>,
    failure: Option<CampaignError>,
    fetches: Mutex<Vec<String>>,
}

impl ScriptedPreferenceStore {
    /// A store with no users; every lookup is a miss.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every read fails with `UpstreamUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            failure: Some(CampaignError::unavailable("preferences", "scripted outage")),
            ..Self::default()
        }
    }

    /// A store that refuses every read with `UpstreamRejected`.
    pub fn rejecting() -> Self {
        Self {
            failure: Some(CampaignError::rejected("preferences", "401 Unauthorized")),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_user(mut self, preferences: UserPreferences) -> Self {
        self.users.insert(preferences.user_id.clone(), preferences);
        self
    }

    /// User ids looked up so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl PreferenceStore for ScriptedPreferenceStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<UserPreferences>, CampaignError> {
        self.fetches.lock().unwrap().push(user_id.to_string());
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.users.get(user_id).cloned())
    }
}

/// Arguments of one copy generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    pub product_name: String,
    pub audience: String,
    pub goal: String,
    pub preferences: UserPreferences,
}

#[derive(Debug)]
struct GeneratorState {
    responses: Vec<Result<String, CampaignError>>,
    current: usize,
    calls: Vec<GenerationCall>,
}

/// Copy generator returning scripted responses in order.
///
/// Once the script is exhausted the last response is repeated.
#[derive(Debug)]
pub struct ScriptedCopyGenerator {
    state: Mutex<GeneratorState>,
}

impl ScriptedCopyGenerator {
    pub fn new(responses: Vec<Result<String, CampaignError>>) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                responses,
                current: 0,
                calls: Vec::new(),
            }),
        }
    }

    /// Always returns `text`.
    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl CopyGenerator for ScriptedCopyGenerator {
    async fn generate(
        &self,
        product_name: &str,
        audience: &str,
        goal: &str,
        preferences: &UserPreferences,
    ) -> Result<AdCopy, CampaignError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GenerationCall {
            product_name: product_name.to_string(),
            audience: audience.to_string(),
            goal: goal.to_string(),
            preferences: preferences.clone(),
        });

        let index = state.current.min(state.responses.len().saturating_sub(1));
        state.current += 1;
        match state.responses.get(index) {
            Some(Ok(text)) => Ok(AdCopy::new(text.clone())),
            Some(Err(err)) => Err(err.clone()),
            None => Err(CampaignError::GenerationFailed(
                "no scripted response".to_string(),
            )),
        }
    }
}

/// How one render submission behaves.
#[derive(Debug, Clone)]
pub struct RenderScript {
    submit_error: Option<CampaignError>,
    polls: Vec<Result<RenderStatus, CampaignError>>,
}

impl RenderScript {
    /// Pending for `pending_polls` polls, then done with `url`.
    pub fn done_after(pending_polls: usize, url: &str) -> Self {
        let mut polls = vec![Ok(RenderStatus::Pending); pending_polls];
        polls.push(Ok(RenderStatus::Done(VideoArtifact {
            url: url.to_string(),
            duration_seconds: Some(15.0),
        })));
        Self {
            submit_error: None,
            polls,
        }
    }

    /// Never leaves the pending state.
    pub fn pending_forever() -> Self {
        Self {
            submit_error: None,
            polls: vec![Ok(RenderStatus::Pending)],
        }
    }

    /// Reports a terminal failure on the first poll.
    pub fn failing(reason: &str) -> Self {
        Self {
            submit_error: None,
            polls: vec![Ok(RenderStatus::Failed(reason.to_string()))],
        }
    }

    /// Rejects the submission itself.
    pub fn rejected(error: CampaignError) -> Self {
        Self {
            submit_error: Some(error),
            polls: Vec::new(),
        }
    }

    /// Explicit poll results; the last one repeats.
    pub fn polls(polls: Vec<Result<RenderStatus, CampaignError>>) -> Self {
        Self {
            submit_error: None,
            polls,
        }
    }
}

#[derive(Debug, Default)]
struct RendererState {
    submissions: Vec<String>,
    polls: HashMap<String, usize>,
}

/// Renderer following one [`RenderScript`] per submission.
///
/// Submissions beyond the end of the script reuse its last entry.
#[derive(Debug)]
pub struct ScriptedVideoRenderer {
    scripts: Vec<RenderScript>,
    state: Mutex<RendererState>,
}

impl ScriptedVideoRenderer {
    pub fn new(scripts: Vec<RenderScript>) -> Self {
        Self {
            scripts,
            state: Mutex::new(RendererState::default()),
        }
    }

    /// Every submission follows `script`.
    pub fn always(script: RenderScript) -> Self {
        Self::new(vec![script])
    }

    pub fn submit_count(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().unwrap().polls.values().sum()
    }

    /// Copy text of each submission, in order.
    pub fn submitted_texts(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn script(&self, index: usize) -> Option<&RenderScript> {
        self.scripts
            .get(index)
            .or_else(|| self.scripts.last())
    }
}

#[async_trait]
impl VideoRenderer for ScriptedVideoRenderer {
    async fn submit(&self, _template: &str, copy: &AdCopy) -> Result<RenderHandle, CampaignError> {
        let mut state = self.state.lock().unwrap();
        let index = state.submissions.len();
        state.submissions.push(copy.text.clone());

        if let Some(err) = self.script(index).and_then(|s| s.submit_error.clone()) {
            return Err(err);
        }

        let handle = format!("render-{}", index + 1);
        state.polls.insert(handle.clone(), 0);
        Ok(RenderHandle(handle))
    }

    async fn poll(&self, handle: &RenderHandle) -> Result<RenderStatus, CampaignError> {
        let mut state = self.state.lock().unwrap();
        let Some(count) = state.polls.get_mut(handle.as_str()) else {
            return Err(CampaignError::RenderFailed(format!("unknown handle {handle}")));
        };
        let poll_index = *count;
        *count += 1;

        let index = handle
            .as_str()
            .trim_start_matches("render-")
            .parse::<usize>()
            .map_or(0, |n| n.saturating_sub(1));

        let polls = self.script(index).map(|s| s.polls.as_slice()).unwrap_or_default();
        match polls.get(poll_index).or_else(|| polls.last()) {
            Some(result) => result.clone(),
            None => Ok(RenderStatus::Pending),
        }
    }
}

/// One message handed to the notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: String,
    pub text: String,
    pub video_url: String,
}

#[derive(Debug)]
enum NotifierMode {
    Accept,
    Refuse,
    FailFirst(usize),
}

/// Notifier that records every send.
#[derive(Debug)]
pub struct RecordingNotifier {
    mode: NotifierMode,
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingNotifier {
    /// Accepts every message.
    pub fn accepting() -> Self {
        Self::with_mode(NotifierMode::Accept)
    }

    /// Answers every send with `accepted: false`.
    pub fn refusing() -> Self {
        Self::with_mode(NotifierMode::Refuse)
    }

    /// Fails the first `failures` sends with `DeliveryFailed`, then accepts.
    pub fn failing_first(failures: usize) -> Self {
        Self::with_mode(NotifierMode::FailFirst(failures))
    }

    fn with_mode(mode: NotifierMode) -> Self {
        Self {
            mode,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient_email: &str,
        copy: &AdCopy,
        artifact: &VideoArtifact,
    ) -> Result<DeliveryReceipt, CampaignError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentMessage {
            recipient: recipient_email.to_string(),
            text: copy.text.clone(),
            video_url: artifact.url.clone(),
        });
        let attempt = sent.len();

        match self.mode {
            NotifierMode::FailFirst(failures) if attempt <= failures => Err(
                CampaignError::DeliveryFailed("scripted bounce".to_string()),
            ),
            NotifierMode::Refuse => Ok(DeliveryReceipt {
                accepted: false,
                message_id: None,
                sent_at: Utc::now(),
            }),
            NotifierMode::Accept | NotifierMode::FailFirst(_) => Ok(DeliveryReceipt {
                accepted: true,
                message_id: Some(format!("msg-{attempt}")),
                sent_at: Utc::now(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generator_repeats_last_response() {
        let generator = ScriptedCopyGenerator::new(vec![
            Err(CampaignError::GenerationFailed("rate limited".into())),
            Ok("second".into()),
        ]);
        let prefs = UserPreferences::empty("u1");

        assert!(generator.generate("p", "a", "g", &prefs).await.is_err());
        assert_eq!(generator.generate("p", "a", "g", &prefs).await.unwrap().text, "second");
        assert_eq!(generator.generate("p", "a", "g", &prefs).await.unwrap().text, "second");
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn test_renderer_follows_script_per_submission() {
        let renderer = ScriptedVideoRenderer::new(vec![
            RenderScript::failing("bad template"),
            RenderScript::done_after(1, "https://cdn/x.mp4"),
        ]);
        let copy = AdCopy::new("text");

        let first = renderer.submit("t", &copy).await.unwrap();
        assert_eq!(
            renderer.poll(&first).await.unwrap(),
            RenderStatus::Failed("bad template".into())
        );

        let second = renderer.submit("t", &copy).await.unwrap();
        assert_eq!(renderer.poll(&second).await.unwrap(), RenderStatus::Pending);
        assert!(matches!(
            renderer.poll(&second).await.unwrap(),
            RenderStatus::Done(artifact) if artifact.url == "https://cdn/x.mp4"
        ));
        assert_eq!(renderer.submit_count(), 2);
        assert_eq!(renderer.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_notifier_fail_first() {
        let notifier = RecordingNotifier::failing_first(1);
        let copy = AdCopy::new("text");
        let artifact = VideoArtifact {
            url: "https://cdn/x.mp4".into(),
            duration_seconds: None,
        };

        assert!(notifier.send("a@b.com", &copy, &artifact).await.is_err());
        let receipt = notifier.send("a@b.com", &copy, &artifact).await.unwrap();
        assert!(receipt.accepted);
        assert_eq!(receipt.message_id.as_deref(), Some("msg-2"));
        assert_eq!(notifier.send_count(), 2);
    }
}
