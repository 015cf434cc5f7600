//! Terminal client: one session, driven by server traffic and typed commands.
//!
//! Everything runs on a single thread. `run_session` selects over inbound
//! server messages, lines from the terminal and Ctrl+C, and feeds each to the
//! session in turn.

use crate::command::{Command, HELP};
use crate::transport::{Inbound, WsTransport};
use anyhow::Result;
use collab_core::delta::Op;
use collab_core::editor::TextSurface;
use collab_core::session::{Session, SessionState};
use collab_core::summary::{Summarizer, SummaryPane};
use collab_core::{DocumentId, Insertable, SessionEvent};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the terminal should show after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nothing,
    Text(String),
    Quit,
}

pub struct ClientApp {
    session: Session<TextSurface, WsTransport>,
    pane: SummaryPane,
    summarizer: Option<Box<dyn Summarizer>>,
}

impl ClientApp {
    pub fn new(document_id: DocumentId, summarizer: Option<Box<dyn Summarizer>>) -> Self {
        Self {
            session: Session::new(document_id, TextSurface::new()),
            pane: SummaryPane::new(),
            summarizer,
        }
    }

    pub fn session(&self) -> &Session<TextSurface, WsTransport> {
        &self.session
    }

    pub fn summary(&self) -> Option<&str> {
        self.pane.summary()
    }

    /// Bind the session to a freshly opened connection.
    pub fn attach(&self, transport: WsTransport) -> Result<()> {
        self.session.attach(transport)?;
        Ok(())
    }

    /// Open a connection to `url` and attach the session to it.
    ///
    /// On failure the session stays in `Connecting` with editing disabled.
    pub async fn connect(&self, url: &str) -> Result<mpsc::UnboundedReceiver<Inbound>> {
        let (transport, inbound) = WsTransport::connect(url).await?;
        self.attach(transport)?;
        Ok(inbound)
    }

    /// Feed one item of server traffic to the session.
    pub fn handle_inbound(&self, inbound: Inbound) {
        match inbound {
            Inbound::Message(message) => self.session.handle_message(message),
            Inbound::Closed => self.session.connection_lost(),
        }
    }

    /// Run one terminal command. Failures come back as text for the user;
    /// none of them end the session.
    pub async fn execute(&mut self, command: Command) -> Reply {
        match self.try_execute(command).await {
            Ok(reply) => reply,
            Err(e) => Reply::Text(format!("error: {}", e)),
        }
    }

    async fn try_execute(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::Append(text) => {
                self.session.edit(|editor| editor.append_text(&text))?;
            }
            Command::Insert { index, text } => {
                self.session
                    .edit(|editor| editor.insert_text(index, &text, None))?;
            }
            Command::Delete { index, length } => {
                self.session.edit(|editor| editor.delete_text(index, length))?;
            }
            Command::Bold { index, length } => {
                let bold = !self.is_bold(index, length);
                let mut attributes = Map::new();
                attributes.insert("bold".into(), if bold { json!(true) } else { Value::Null });
                self.session
                    .edit(|editor| editor.format_text(index, length, attributes))?;
            }
            Command::Save => {
                self.session.save()?;
                return Ok(Reply::Text("Saved.".into()));
            }
            Command::Summary => return Ok(self.refresh_summary().await),
            Command::Show => return Ok(Reply::Text(self.render())),
            Command::Help => return Ok(Reply::Text(HELP.into())),
            Command::Quit => return Ok(Reply::Quit),
        }
        Ok(Reply::Nothing)
    }

    fn is_bold(&self, index: usize, length: usize) -> bool {
        let content = self.session.contents();
        let Some(runs) = content.runs_in(index, length) else {
            return false;
        };
        length > 0
            && runs.iter().all(|op| {
                op.attributes()
                    .and_then(|a| a.get("bold"))
                    .is_some_and(|v| v == &json!(true))
            })
    }

    async fn refresh_summary(&mut self) -> Reply {
        let Some(summarizer) = self.summarizer.as_deref() else {
            return Reply::Text("No summary service configured (--summary-url).".into());
        };
        let text = self.session.plain_text();
        if self.pane.refresh(summarizer, &text).await {
            Reply::Text(format!("Summary: {}", self.pane.summary().unwrap_or_default()))
        } else {
            match self.pane.summary() {
                Some(previous) => Reply::Text(format!("Summary (unchanged): {}", previous)),
                None => Reply::Text("Summary unavailable.".into()),
            }
        }
    }

    /// The document as text, bold runs wrapped in `**`.
    pub fn render(&self) -> String {
        let content = self.session.contents();
        let mut out = format!("[{} | {}]\n", self.session.document_id(), self.session.state());
        for op in &content.as_delta().ops {
            let Op::Insert { insert, attributes } = op else {
                continue;
            };
            let text = match insert {
                Insertable::Text(text) => text.clone(),
                Insertable::Embed(_) => "[embed]".to_string(),
            };
            let bold = attributes
                .as_ref()
                .and_then(|a| a.get("bold"))
                .is_some_and(|v| v == &json!(true));
            if bold {
                out.push_str(&format!("**{}**", text));
            } else {
                out.push_str(&text);
            }
        }
        out
    }

    pub fn close(&self) {
        self.session.close();
    }
}

/// Settings for one terminal session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub document_id: DocumentId,
    pub summary_url: Option<String>,
}

fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged { to, .. } if *to == SessionState::Live => Some(
            "Document loaded. Type to edit, :help for commands.".into(),
        ),
        SessionEvent::ChannelLost { .. } => Some(
            "Connection lost. Edits are disabled; restart to reconnect.".into(),
        ),
        SessionEvent::ChangeRejected { reason, .. } => {
            Some(format!("Remote change could not be applied: {}", reason))
        }
        _ => None,
    }
}

/// Next item from the server, or never if there is no connection.
async fn next_inbound(inbound: &mut Option<mpsc::UnboundedReceiver<Inbound>>) -> Option<Inbound> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run one session until the user quits, input ends, or Ctrl+C.
pub async fn run_session<R>(config: ClientConfig, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let summarizer = config
        .summary_url
        .as_deref()
        .map(|url| Box::new(crate::HttpSummarizer::new(url)) as Box<dyn Summarizer>);
    let mut app = ClientApp::new(config.document_id.clone(), summarizer);
    let _events = app.session().events().subscribe(|event| {
        if let Some(text) = describe(event) {
            println!("{}", text);
        }
    });

    println!("Connecting to {} ...", config.server_url);
    let mut inbound = match app.connect(&config.server_url).await {
        Ok(inbound) => {
            info!("Opened {}", config.document_id);
            Some(inbound)
        }
        Err(e) => {
            warn!("Failed to open {}: {:#}", config.document_id, e);
            println!("Could not reach the server. Edits are disabled; restart to retry.");
            None
        }
    };

    let mut lines = input.lines();
    loop {
        tokio::select! {
            Some(item) = next_inbound(&mut inbound) => {
                app.handle_inbound(item);
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    break;
                };
                if line.is_empty() {
                    continue;
                }
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match app.execute(command).await {
                    Reply::Nothing => {}
                    Reply::Text(text) => println!("{}", text),
                    Reply::Quit => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    app.close();
    Ok(())
}
