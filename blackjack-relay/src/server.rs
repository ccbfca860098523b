use std::{
    future::Future,
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    task::JoinSet,
};
use tracing::{info, warn};

use crate::{deck::SharedDeck, room::Room, session::Session};

/// Accepts players on every configured port and seats them at one table.
pub struct Server {
    listeners: Vec<TcpListener>,
    room: Arc<Room>,
    deck: SharedDeck,
}

impl Server {
    pub fn new(listeners: Vec<TcpListener>, room: Arc<Room>, deck: SharedDeck) -> Self {
        Self {
            listeners,
            room,
            deck,
        }
    }

    /// Binds one listener per port on `host`.
    pub async fn bind(
        host: IpAddr,
        ports: &[u16],
        room: Arc<Room>,
        deck: SharedDeck,
    ) -> Result<Self> {
        let mut listeners = Vec::with_capacity(ports.len());
        for &port in ports {
            let listener = TcpListener::bind((host, port))
                .await
                .with_context(|| format!("failed to bind {host}:{port}"))?;
            listeners.push(listener);
        }
        Ok(Self::new(listeners, room, deck))
    }

    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(TcpListener::local_addr).collect()
    }

    /// The table shared by every listener.
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Serves players until `shutdown` resolves.
    ///
    /// Shutdown stops every listener and closes every open session; the
    /// sessions leave the room as they are torn down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listeners,
            room,
            deck,
        } = self;

        let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
        let mut acceptors = JoinSet::new();
        for listener in listeners {
            acceptors.spawn(accept_loop(listener, accepted_tx.clone()));
        }
        drop(accepted_tx);

        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            select! {
                _ = &mut shutdown => break,
                Some((stream, peer)) = accepted.recv() => {
                    spawn_session(&mut sessions, stream, peer, &room, &deck);
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        info!(sessions = sessions.len(), "server shutting down");
        acceptors.abort_all();
        sessions.abort_all();
        while acceptors.join_next().await.is_some() {}
        while sessions.join_next().await.is_some() {}

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn accept_loop(
    listener: TcpListener,
    accepted: mpsc::UnboundedSender<(TcpStream, SocketAddr)>,
) {
    loop {
        let Some(connection) = handle_accept_result(listener.accept().await) else {
            continue;
        };
        if accepted.send(connection).is_err() {
            break;
        }
    }
}

fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
) -> Option<(TcpStream, SocketAddr)> {
    match result {
        Ok(connection) => Some(connection),
        Err(err) => {
            warn!(error = ?err, "failed to accept connection");
            None
        }
    }
}

fn spawn_session(
    sessions: &mut JoinSet<()>,
    stream: TcpStream,
    peer: SocketAddr,
    room: &Arc<Room>,
    deck: &SharedDeck,
) {
    let room = Arc::clone(room);
    let deck = deck.clone();
    sessions.spawn(async move {
        info!(peer = %peer, "player connected");
        match Session::run(stream, room, deck).await {
            Ok(()) => info!(peer = %peer, "player disconnected"),
            Err(err) => warn!(peer = %peer, error = %err, "player connection closed with error"),
        }
    });
}
