//! The playback lifecycle: one task per speaker driving open, writes, flush
//! and close.
//!
//! Every public operation on a [`Speaker`](crate::Speaker) becomes a
//! [`Command`] in this task's mailbox. Commands are handled one at a time, so
//! at most one device primitive is ever outstanding and bytes reach the device
//! in the order they were submitted. Teardown is the one place where the
//! mailbox keeps being read while a device call is pending: close requests
//! arriving then are coalesced onto the teardown already running.

use crate::chunker::FrameChunker;
use crate::config::{Settings, SpeakerOptions};
use crate::device::{AudioDevice, DeviceSession, SessionState};
use crate::error::{SpeakerError, SpeakerResult};
use crate::events::{EventBus, SpeakerEvent};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) type Reply<T> = oneshot::Sender<SpeakerResult<T>>;

/// A request sent from a speaker handle to its lifecycle task.
pub(crate) enum Command {
    Open {
        reply: Reply<()>,
    },
    Write {
        bytes: Vec<u8>,
        reply: Reply<()>,
    },
    Format {
        options: SpeakerOptions,
        reply: Reply<Settings>,
    },
    Close {
        immediate: bool,
        reply: Reply<()>,
    },
}

/// Snapshot of lifecycle state readable from any handle.
#[derive(Debug)]
pub(crate) struct Shared {
    settings: RwLock<Settings>,
    state: RwLock<SessionState>,
}

impl Shared {
    pub(crate) fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            settings: RwLock::new(settings),
            state: RwLock::new(SessionState::Unopened),
        })
    }

    pub(crate) fn settings(&self) -> Settings {
        *self.settings.read()
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }
}

pub(crate) struct PlaybackLifecycle<D: AudioDevice> {
    session: DeviceSession<D>,
    options: SpeakerOptions,
    settings: Settings,
    events: Arc<EventBus>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<D: AudioDevice> PlaybackLifecycle<D> {
    pub(crate) const fn new(
        session: DeviceSession<D>,
        options: SpeakerOptions,
        settings: Settings,
        events: Arc<EventBus>,
        shared: Arc<Shared>,
        cancel: CancellationToken,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            session,
            options,
            settings,
            events,
            shared,
            cancel,
            commands,
        }
    }

    /// Serve commands until every handle is gone, then end the stream.
    pub(crate) async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
        }

        if !self.session.state().is_closed() {
            debug!("all speaker handles dropped, ending stream");
            let _ = self.teardown(false, Vec::new()).await;
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Open { reply } => {
                let result = self.open().await;
                let _ = reply.send(result);
            }
            Command::Write { bytes, reply } => {
                let result = self.write(bytes).await;
                let _ = reply.send(result);
            }
            Command::Format { options, reply } => {
                let _ = reply.send(self.renegotiate(options));
            }
            Command::Close { immediate, reply } => {
                if immediate {
                    self.cancel.cancel();
                }
                if self.session.state().is_closed() {
                    debug!("already closed");
                    let _ = reply.send(Ok(()));
                } else {
                    let _ = self.teardown(immediate, vec![reply]).await;
                }
            }
        }
    }

    fn report(&self, err: SpeakerError) -> SpeakerError {
        report(&self.events, err)
    }

    async fn open(&mut self) -> SpeakerResult<()> {
        debug!("open()");
        if self.session.state() != SessionState::Unopened {
            return Err(self.report(SpeakerError::AlreadyOpen));
        }
        if self.settings.checked_chunk_size().is_none() {
            debug!(
                samples_per_frame = self.settings.samples_per_frame,
                "chunk size out of range"
            );
            return Err(self.report(SpeakerError::InvalidFormat));
        }

        match self.session.open(&self.settings.format).await {
            Ok(()) => {
                self.shared.set_state(SessionState::Open);
                self.events.emit(SpeakerEvent::Opened);
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    async fn write(&mut self, bytes: Vec<u8>) -> SpeakerResult<()> {
        debug!(bytes = bytes.len(), "write()");
        if self.cancel.is_cancelled() && !self.session.state().is_closed() {
            debug!(bytes = bytes.len(), "dropping write, speaker is closing");
            return Ok(());
        }

        match self.session.state() {
            SessionState::Open => {}
            SessionState::Unopened => {
                debug!("opening device for first write");
                self.open().await?;
            }
            SessionState::Flushing | SessionState::Closed => {
                return Err(self.report(SpeakerError::SessionClosed));
            }
        }

        let chunker = FrameChunker::for_settings(&self.settings);
        match chunker.push(&mut self.session, bytes, &self.cancel).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.report(err)),
        }
    }

    fn renegotiate(&mut self, options: SpeakerOptions) -> SpeakerResult<Settings> {
        match self.session.state() {
            SessionState::Unopened => {}
            SessionState::Open | SessionState::Flushing => {
                return Err(self.report(SpeakerError::AlreadyOpen));
            }
            SessionState::Closed => return Err(self.report(SpeakerError::SessionClosed)),
        }

        let merged = self.options.merged(&options);
        let settings = Settings::from_options(&merged).map_err(|err| self.report(err))?;
        debug!(?settings, "format renegotiated");

        self.options = merged;
        self.settings = settings;
        self.shared.set_settings(settings);
        Ok(settings)
    }

    /// Flush (unless `immediate`) and close, answering every waiter once.
    ///
    /// Close requests that arrive while teardown is pending join `waiters`;
    /// anything else is rejected because the session is on its way out.
    async fn teardown(
        &mut self,
        immediate: bool,
        mut waiters: Vec<Reply<()>>,
    ) -> SpeakerResult<()> {
        let events = Arc::clone(&self.events);
        let shared = Arc::clone(&self.shared);
        let commands = &mut self.commands;

        let work = flush_then_close(&mut self.session, &events, &shared, immediate);
        tokio::pin!(work);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut work => break result,
                Some(command) = commands.recv() => match command {
                    Command::Close { reply, .. } => {
                        debug!("coalescing close with teardown in progress");
                        waiters.push(reply);
                    }
                    Command::Write { reply, .. } => {
                        let _ = reply.send(Err(report(&events, SpeakerError::SessionClosed)));
                    }
                    Command::Open { reply } => {
                        let _ = reply.send(Err(report(&events, SpeakerError::SessionClosed)));
                    }
                    Command::Format { reply, .. } => {
                        let _ = reply.send(Err(report(&events, SpeakerError::SessionClosed)));
                    }
                },
            }
        };

        debug!(waiters = waiters.len(), "teardown complete");
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }
}

fn report(events: &EventBus, err: SpeakerError) -> SpeakerError {
    warn!(%err, kind = ?err.kind(), "speaker error");
    events.emit(SpeakerEvent::Error(err.clone()));
    err
}

/// Flush errors are reported but never prevent the close.
async fn flush_then_close<D: AudioDevice>(
    session: &mut DeviceSession<D>,
    events: &EventBus,
    shared: &Shared,
    immediate: bool,
) -> SpeakerResult<()> {
    if !immediate && session.state() == SessionState::Open {
        shared.set_state(SessionState::Flushing);
        match session.flush().await {
            Ok(()) => events.emit(SpeakerEvent::Flushed),
            Err(err) => {
                report(events, err);
            }
        }
    } else {
        debug!(immediate, state = %session.state(), "skipping flush");
    }

    let result = session.close().await;
    shared.set_state(SessionState::Closed);
    if let Err(err) = &result {
        report(events, err.clone());
    }
    events.emit(SpeakerEvent::Closed);
    result
}
