use std::{io, sync::Arc};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::mpsc,
};
use tracing::{debug, info};

use crate::{
    deck::{DeckError, SharedDeck},
    frame::{Frame, FrameError, read_frame_into, write_frame},
    room::{Participant, ParticipantId, Room},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("cannot deal a card: {0}")]
    DeckExhausted(#[from] DeckError),
}

/// One connected player.
///
/// The room holds the session as a [`Participant`]; frames it delivers land in
/// an outbound queue that the session's writer drains one write at a time.
pub struct Session {
    id: ParticipantId,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl Participant for Session {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn deliver(&self, frame: &Frame) {
        if self.outbound.send(frame.clone()).is_err() {
            debug!(participant = self.id, "outbound queue closed; dropping frame");
        }
    }
}

impl Session {
    /// Drives a connection until it closes or fails.
    ///
    /// The session joins `room` first, so replayed history is queued ahead of
    /// anything it reads. When the read side ends, the session leaves the room
    /// and keeps writing until its queue is empty; only a write error cuts the
    /// queue short. The session is out of the room however `run` finishes,
    /// including when its task is aborted.
    pub async fn run<S>(
        stream: S,
        room: Arc<Room>,
        deck: SharedDeck,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, queue) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            id: room.next_participant_id(),
            outbound,
        });
        let id = session.id;

        room.join(session.clone());
        let seat = Seat { room: &room, id };

        let writing = write_loop(writer, queue);
        tokio::pin!(writing);

        let read_result = select! {
            result = session.read_loop(reader, &room, &deck) => result,
            result = &mut writing => {
                drop(seat);
                debug!(participant = id, "session terminated by its writer");
                return result;
            }
        };

        // Once the room and this task let go of the session, the queue closes
        // and the writer stops after flushing what is already queued.
        drop(seat);
        drop(session);
        let write_result = writing.await;

        debug!(participant = id, "session terminated");
        read_result.and(write_result)
    }

    async fn read_loop<R>(
        &self,
        mut reader: R,
        room: &Room,
        deck: &SharedDeck,
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame = Frame::new();
        while read_frame_into(&mut reader, &mut frame).await? {
            self.interpret_action(&mut frame, deck)?;
            room.deliver(&frame);
        }

        debug!(participant = self.id, "peer closed the connection");
        Ok(())
    }

    /// Deals a card into the frame when the player hits.
    ///
    /// Frames without a hit are left byte for byte as they arrived.
    fn interpret_action(&self, frame: &mut Frame, deck: &SharedDeck) -> Result<(), SessionError> {
        let mut record = frame.record()?;

        if record.hit {
            let card = deck.draw()?;
            info!(participant = self.id, %card, "player hits");
            record.card = Some(card);
            frame.set_record(&record)?;
        }

        if record.stand {
            info!(participant = self.id, "player stands");
        }

        Ok(())
    }
}

/// Keeps a participant in the room for as long as it is alive.
struct Seat<'a> {
    room: &'a Room,
    id: ParticipantId,
}

impl Drop for Seat<'_> {
    fn drop(&mut self) {
        self.room.leave(self.id);
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Frame>,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        write_frame(&mut writer, &frame).await?;
    }
    Ok(())
}
