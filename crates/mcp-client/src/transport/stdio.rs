use std::collections::HashMap;
use std::sync::Arc;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use async_trait::async_trait;
use rmcp::model::JsonRpcMessage;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{getpgid, Pid};

use super::{Error, Transport, TransportHandle};

/// Why the actor loop stopped
#[derive(Debug, PartialEq)]
enum ActorExit {
    /// Every handle was dropped, nobody is left to talk to the server
    ClientGone,
    StdoutClosed,
    ProcessExited,
}

/// Owns the child process of a `StdioTransport` and pumps messages between
/// its stdin/stdout and the handle's channels.
///
/// Dropping the actor terminates the whole process group of the child, so a
/// server launched through `npx` does not outlive the transport.
pub struct StdioActor {
    receiver: Option<mpsc::Receiver<String>>,
    sender: Option<mpsc::Sender<JsonRpcMessage>>,
    process: Child, // we store the process to keep it alive
    error_sender: mpsc::Sender<Error>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl Drop for StdioActor {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.process.id() {
            if let Ok(pgid) = getpgid(Some(Pid::from_raw(pid as i32))) {
                terminate_process_group(pgid.as_raw());
            }
        }
    }
}

#[cfg(unix)]
fn terminate_process_group(pgid: i32) {
    let _ = kill(Pid::from_raw(-pgid), Signal::SIGTERM);
    std::thread::sleep(std::time::Duration::from_millis(100));
    let _ = kill(Pid::from_raw(-pgid), Signal::SIGKILL);
}

impl StdioActor {
    pub async fn run(mut self) {
        use tokio::pin;

        let (Some(stdout), Some(stdin), Some(msg_inbox), Some(msg_outbox)) = (
            self.stdout.take(),
            self.stdin.take(),
            self.receiver.take(),
            self.sender.take(),
        ) else {
            tracing::error!("Stdio actor started without its pipes");
            return;
        };

        let incoming = Self::handle_proc_output(stdout, msg_outbox);
        let outgoing = Self::handle_proc_input(stdin, msg_inbox);

        pin!(incoming);
        pin!(outgoing);

        let exit = tokio::select! {
            _ = &mut incoming => ActorExit::StdoutClosed,
            _ = &mut outgoing => ActorExit::ClientGone,
            status = self.process.wait() => {
                tracing::debug!("Process exited with status: {:?}", status);
                ActorExit::ProcessExited
            }
        };

        if exit == ActorExit::ClientGone {
            tracing::debug!("All transport handles dropped, stopping server process");
            return;
        }

        let mut stderr_buffer = Vec::new();
        if let Some(mut stderr) = self.stderr.take() {
            if let Ok(bytes) = stderr.read_to_end(&mut stderr_buffer).await {
                let err_msg = if bytes > 0 {
                    String::from_utf8_lossy(&stderr_buffer).to_string()
                } else {
                    "Process ended unexpectedly".to_string()
                };

                tracing::info!("Process stderr: {}", err_msg);
                let _ = self
                    .error_sender
                    .send(Error::Process(err_msg))
                    .await;
            }
        }
    }

    async fn handle_proc_output(stdout: ChildStdout, sender: mpsc::Sender<JsonRpcMessage>) {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    tracing::error!("Child process ended (EOF on stdout)");
                    break;
                }
                Ok(_) => {
                    if let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&line) {
                        tracing::debug!(message = ?message, "Received incoming message");
                        let _ = sender.send(message).await;
                    } else {
                        // servers launched via npx print banners on stdout now and then
                        tracing::warn!(message = ?line, "Failed to parse incoming message");
                    }
                    line.clear();
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Error reading line");
                    break;
                }
            }
        }
    }

    async fn handle_proc_input(mut stdin: ChildStdin, mut receiver: mpsc::Receiver<String>) {
        while let Some(message_str) = receiver.recv().await {
            tracing::debug!(message = ?message_str, "Sending outgoing message");

            if let Err(e) = stdin
                .write_all(format!("{}\n", message_str).as_bytes())
                .await
            {
                tracing::error!(error = ?e, "Error writing message to child process");
                break;
            }

            if let Err(e) = stdin.flush().await {
                tracing::error!(error = ?e, "Error flushing message to child process");
                break;
            }
        }
    }
}

#[derive(Clone)]
pub struct StdioTransportHandle {
    sender: mpsc::Sender<String>,                         // to process
    receiver: Arc<Mutex<mpsc::Receiver<JsonRpcMessage>>>, // from process
    error_receiver: Arc<Mutex<mpsc::Receiver<Error>>>,
}

#[async_trait]
impl TransportHandle for StdioTransportHandle {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), Error> {
        let line = serde_json::to_string(&message)?;
        let sent = self.sender.send(line).await.map_err(|_| Error::Closed);
        // a dead process explains a failed send better than the channel does
        self.check_for_errors().await?;
        sent
    }

    async fn receive(&self) -> Result<JsonRpcMessage, Error> {
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Some(message) => Ok(message),
            None => {
                // prefer the process stderr over a bare "channel closed"
                self.check_for_errors().await?;
                Err(Error::Closed)
            }
        }
    }
}

impl StdioTransportHandle {
    /// Check if there are any process errors
    pub async fn check_for_errors(&self) -> Result<(), Error> {
        match self.error_receiver.lock().await.try_recv() {
            Ok(error) => {
                tracing::debug!("Found error: {:?}", error);
                Err(error)
            }
            Err(_) => Ok(()),
        }
    }
}

/// Launches an MCP server as a child process and talks to it over stdio
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioTransport {
    pub fn new<S: Into<String>>(
        command: S,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            env,
        }
    }

    async fn spawn_process(&self) -> Result<(Child, ChildStdin, ChildStdout, ChildStderr), Error> {
        let mut command = Command::new(&self.command);
        command
            .envs(&self.env)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        // own process group, so the server and its children go down together
        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        command.creation_flags(0x08000000); // CREATE_NO_WINDOW flag

        let mut process = command
            .spawn()
            .map_err(|e| Error::Process(format!("{}: {}", self.command, e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Process("Failed to get stdin".into()))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Process("Failed to get stdout".into()))?;

        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| Error::Process("Failed to get stderr".into()))?;

        Ok((process, stdin, stdout, stderr))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Handle = StdioTransportHandle;

    async fn start(&self) -> Result<Self::Handle, Error> {
        let (process, stdin, stdout, stderr) = self.spawn_process().await?;
        let (outbox_tx, outbox_rx) = mpsc::channel(32);
        let (inbox_tx, inbox_rx) = mpsc::channel(32);
        let (error_tx, error_rx) = mpsc::channel(1);

        let actor = StdioActor {
            receiver: Some(outbox_rx), // client to process
            sender: Some(inbox_tx),    // process to client
            process,
            error_sender: error_tx,
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
        };

        tokio::spawn(actor.run());

        let handle = StdioTransportHandle {
            sender: outbox_tx,                        // client to process
            receiver: Arc::new(Mutex::new(inbox_rx)), // process to client
            error_receiver: Arc::new(Mutex::new(error_rx)),
        };
        Ok(handle)
    }
}
