use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::Instrument;

use crate::common::frame::{FrameWriter, FramedReader};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::server::handler::{RequestHandler, ServerHandlerType};
use crate::server::task::{ServerSetting, SessionAuthentication, SessionTask};
use crate::server::ServerSettings;

struct SessionTracker {
    max: usize,
    id: u64,
    sessions: BTreeMap<u64, tokio::sync::mpsc::Sender<()>>,
}

type SessionTrackerWrapper = Arc<Mutex<SessionTracker>>;

impl SessionTracker {
    fn new(max: usize) -> SessionTracker {
        Self {
            max,
            id: 0,
            sessions: BTreeMap::new(),
        }
    }

    pub(crate) fn wrapped(max: usize) -> SessionTrackerWrapper {
        Arc::new(Mutex::new(Self::new(max)))
    }

    /// register a new session, or None when the server is at capacity
    pub(crate) fn add(&mut self, sender: tokio::sync::mpsc::Sender<()>) -> Option<u64> {
        if self.sessions.len() >= self.max {
            return None;
        }

        let id = self.id;
        self.id += 1;
        self.sessions.insert(id, sender);
        Some(id)
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.sessions.remove(&id);
    }

    /// dropping the senders signals every session task to stop
    pub(crate) fn close_all(&mut self) {
        self.sessions.clear();
    }
}

#[derive(Clone)]
pub(crate) enum TcpServerConnectionHandler {
    Tcp,
    #[cfg(feature = "tls")]
    Tls(crate::tcp::tls::server::TlsServerConfig),
}

impl TcpServerConnectionHandler {
    async fn handle(
        &mut self,
        socket: tokio::net::TcpStream,
        _settings: &ServerSettings,
    ) -> Result<(PhysLayer, SessionAuthentication), String> {
        match self {
            Self::Tcp => Ok((
                PhysLayer::new_tcp(socket),
                SessionAuthentication::Unauthenticated,
            )),
            #[cfg(feature = "tls")]
            Self::Tls(config) => {
                let (phys, role) = config
                    .handle_connection(socket, _settings.write_timeout)
                    .await?;
                Ok((phys, SessionAuthentication::Authenticated(role)))
            }
        }
    }
}

pub(crate) struct ServerTask<T: RequestHandler> {
    listener: tokio::net::TcpListener,
    handler: ServerHandlerType<T>,
    tracker: SessionTrackerWrapper,
    connection_handler: TcpServerConnectionHandler,
    settings: ServerSettings,
    decode: DecodeLevel,
    /// cloned into every session so shutdown can await their completion
    session_guard: Option<tokio::sync::mpsc::Sender<()>>,
    session_done: tokio::sync::mpsc::Receiver<()>,
}

impl<T> ServerTask<T>
where
    T: RequestHandler,
{
    pub(crate) fn new(
        listener: tokio::net::TcpListener,
        handler: ServerHandlerType<T>,
        connection_handler: TcpServerConnectionHandler,
        settings: ServerSettings,
        decode: DecodeLevel,
    ) -> Self {
        let (session_guard, session_done) = tokio::sync::mpsc::channel(1);
        Self {
            listener,
            handler,
            tracker: SessionTracker::wrapped(settings.max_sessions),
            connection_handler,
            settings,
            decode,
            session_guard: Some(session_guard),
            session_done,
        }
    }

    pub(crate) async fn run(&mut self, mut commands: tokio::sync::mpsc::Receiver<ServerSetting>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(ServerSetting::ChangeDecoding(level)) => {
                            self.decode = level;
                        }
                        None => {
                            // the server handle was dropped
                            self.shutdown().await;
                            return;
                        }
                    }
                }
                result = self.listener.accept() => {
                    match result {
                        Err(err) => {
                            tracing::error!("error accepting connection: {}", err);
                            self.shutdown().await;
                            return;
                        }
                        Ok((socket, addr)) => {
                            self.handle(socket, addr).await
                        }
                    }
                }
            }
        }
    }

    /// cancel every session task, then wait for all of them to exit
    async fn shutdown(&mut self) {
        tracing::info!("server shutdown");
        self.tracker.lock().unwrap().close_all();
        drop(self.session_guard.take());
        // recv returns None once every session guard is dropped
        while self.session_done.recv().await.is_some() {}
    }

    async fn handle(&mut self, socket: tokio::net::TcpStream, addr: SocketAddr) {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        // admission check happens before the handshake so that the session
        // count includes connections still handshaking
        let id = match self.tracker.lock().unwrap().add(tx) {
            Some(id) => id,
            None => {
                tracing::warn!("at maximum session count, closing connection from: {}", addr);
                return;
            }
        };

        tracing::info!("accepted connection {} from: {}", id, addr);

        let decode = self.decode;
        let settings = self.settings;
        let handler = self.handler.clone();
        let mut conn_handler = self.connection_handler.clone();
        let tracker = self.tracker.clone();
        let span = tracing::Span::current();
        let guard = self
            .session_guard
            .as_ref()
            .expect("accept loop outlives shutdown")
            .clone();

        // spawned so that multiple TLS handshakes can run at the same time
        tokio::spawn(async move {
            let _guard = guard;
            match conn_handler.handle(socket, &settings).await {
                Err(err) => {
                    tracing::warn!("error from {}: {}", addr, err);
                }
                Ok((phys, auth)) => {
                    tracing::info!("established session {} from: {}", id, addr);
                    SessionTask::new(
                        phys,
                        handler,
                        auth,
                        FrameWriter::tcp(),
                        FramedReader::tcp(),
                        rx,
                        settings.idle_timeout,
                        decode,
                    )
                    .run()
                    .instrument(tracing::info_span!(parent: &span, "Session", "remote" = ?addr))
                    .await
                    .ok();
                    tracing::info!("shutdown session: {}", id);
                }
            }
            tracker.lock().unwrap().remove(id);
        });
    }
}
