use crate::display::PresentationSink;
use crate::error::CommandError;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "steps", rename_all = "snake_case")]
pub enum Command {
    Enable,
    Disable,
    Open,
    Close,
    Abort,
    Step(i32),
}

impl Command {
    /// Path relative to the actuator base URL.
    pub fn path(&self) -> String {
        match self {
            Command::Enable => "/enable".to_string(),
            Command::Disable => "/disable".to_string(),
            Command::Open => "/open".to_string(),
            Command::Close => "/close".to_string(),
            Command::Abort => "/abort".to_string(),
            Command::Step(steps) => format!("/step?steps={steps}"),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandAck {
    pub command: Command,
    pub message: String,
    /// Backend response body; `{"success": true}` for mock acknowledgements.
    pub body: serde_json::Value,
}

#[derive(Clone)]
pub enum DispatchMode {
    Mock,
    Live {
        client: reqwest::Client,
        base_url: String,
    },
}

impl fmt::Debug for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Mock => f.write_str("Mock"),
            DispatchMode::Live { base_url, .. } => {
                f.debug_struct("Live").field("base_url", base_url).finish()
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum PressOutcome {
    /// The control was disabled; nothing was sent.
    Ignored,
    Sent(Result<CommandAck, String>),
}

#[derive(Default)]
struct ControlState {
    busy: bool,
    disabled_until: Option<Instant>,
}

impl ControlState {
    fn disabled(&self, now: Instant) -> bool {
        self.busy || self.disabled_until.is_some_and(|until| now < until)
    }
}

pub struct CommandDispatcher {
    mode: DispatchMode,
    sink: Arc<dyn PresentationSink>,
    message_field: String,
    cooldown: Duration,
    controls: Mutex<HashMap<String, ControlState>>,
}

impl CommandDispatcher {
    pub fn new(
        mode: DispatchMode,
        sink: Arc<dyn PresentationSink>,
        message_field: impl Into<String>,
        cooldown: Duration,
    ) -> Self {
        let mode = match mode {
            DispatchMode::Live { client, base_url } => DispatchMode::Live {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            mock => mock,
        };
        Self {
            mode,
            sink,
            message_field: message_field.into(),
            cooldown,
            controls: Mutex::new(HashMap::new()),
        }
    }

    /// Sends one command and reports the outcome on the status line. Failures
    /// are not retried.
    pub async fn send(&self, command: Command) -> Result<CommandAck, CommandError> {
        let result = match &self.mode {
            DispatchMode::Mock => {
                info!("[MOCK] Command: {}", command);
                Ok(CommandAck {
                    command,
                    message: format!("[MOCK] Command sent: {command}"),
                    body: serde_json::json!({ "success": true }),
                })
            }
            DispatchMode::Live { client, base_url } => {
                post(client, base_url, command).await.map(|body| CommandAck {
                    command,
                    message: "Command sent successfully".to_string(),
                    body,
                })
            }
        };

        match &result {
            Ok(ack) => {
                self.sink.display_field(&self.message_field, &ack.message);
                self.sink.display_class(&self.message_field, "positive");
            }
            Err(e) => {
                error!("Command {} failed: {}", command, e);
                self.sink
                    .display_field(&self.message_field, &format!("Error: {e}"));
                self.sink.display_class(&self.message_field, "danger");
            }
        }
        result
    }

    /// A press on `control`. The control stays disabled while the command is in
    /// flight and for the cooldown afterwards; presses in that window are
    /// dropped, not queued.
    pub async fn press(&self, control: &str, command: Command) -> PressOutcome {
        {
            let mut controls = self.lock();
            let state = controls.entry(control.to_string()).or_default();
            if state.disabled(Instant::now()) {
                info!("Ignoring press on disabled control {}", control);
                return PressOutcome::Ignored;
            }
            state.busy = true;
        }

        // Re-enables through the cooldown even if this future is dropped mid-send.
        let _cooldown = Cooldown {
            dispatcher: self,
            control,
        };
        let result = self.send(command).await.map_err(|e| e.to_string());
        PressOutcome::Sent(result)
    }

    pub fn is_disabled(&self, control: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .get(control)
            .is_some_and(|state| state.disabled(now))
    }

    pub fn disabled_controls(&self) -> Vec<String> {
        let now = Instant::now();
        let mut ids: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, state)| state.disabled(now))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ControlState>> {
        match self.controls.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Clears the busy flag and starts the cooldown when a press ends, however it ends.
struct Cooldown<'a> {
    dispatcher: &'a CommandDispatcher,
    control: &'a str,
}

impl Drop for Cooldown<'_> {
    fn drop(&mut self) {
        let mut controls = self.dispatcher.lock();
        let state = controls.entry(self.control.to_string()).or_default();
        state.busy = false;
        state.disabled_until = Some(Instant::now() + self.dispatcher.cooldown);
    }
}

async fn post(
    client: &reqwest::Client,
    base_url: &str,
    command: Command,
) -> Result<serde_json::Value, CommandError> {
    let path = command.path();
    let url = format!("{base_url}{path}");
    let response = client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .send()
        .await
        .map_err(|source| CommandError::Transport {
            path: path.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(CommandError::Status {
            path,
            status: status.as_u16(),
        });
    }

    let body = response
        .json::<serde_json::Value>()
        .await
        .map_err(|source| CommandError::Decode { path, source })?;
    info!("Command {} acknowledged", command);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FieldStore;

    fn mock_dispatcher() -> (CommandDispatcher, Arc<FieldStore>) {
        let fields = Arc::new(FieldStore::default());
        let dispatcher = CommandDispatcher::new(
            DispatchMode::Mock,
            fields.clone(),
            "valve-message",
            DEFAULT_COOLDOWN,
        );
        (dispatcher, fields)
    }

    #[test]
    fn step_path_carries_signed_count() {
        assert_eq!(Command::Step(-10).path(), "/step?steps=-10");
        assert_eq!(Command::Step(25).path(), "/step?steps=25");
        assert_eq!(Command::Abort.path(), "/abort");
    }

    #[tokio::test]
    async fn mock_send_always_acknowledges() {
        let (dispatcher, fields) = mock_dispatcher();
        let ack = dispatcher.send(Command::Open).await.unwrap();
        assert_eq!(ack.body["success"], serde_json::Value::Bool(true));
        assert_eq!(
            fields.field("valve-message").as_deref(),
            Some("[MOCK] Command sent: /open")
        );
        assert_eq!(fields.class("valve-message").as_deref(), Some("positive"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_press_within_cooldown_is_ignored() {
        let (dispatcher, _) = mock_dispatcher();
        let first = dispatcher.press("valve-open", Command::Open).await;
        assert!(matches!(first, PressOutcome::Sent(Ok(_))));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(dispatcher.is_disabled("valve-open"));
        assert_eq!(
            dispatcher.press("valve-open", Command::Open).await,
            PressOutcome::Ignored
        );

        tokio::time::advance(Duration::from_millis(301)).await;
        assert!(!dispatcher.is_disabled("valve-open"));
        assert!(matches!(
            dispatcher.press("valve-open", Command::Open).await,
            PressOutcome::Sent(Ok(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_is_per_control() {
        let (dispatcher, _) = mock_dispatcher();
        dispatcher.press("valve-open", Command::Open).await;
        assert!(matches!(
            dispatcher.press("valve-close", Command::Close).await,
            PressOutcome::Sent(Ok(_))
        ));
    }
}
