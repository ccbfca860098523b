//! Blackjack table relay.
//!
//! Players connect over TCP and exchange small length-prefixed frames. The
//! server relays every frame to everyone at the table and deals a card from a
//! shared deck whenever a frame asks to hit. Each module owns one concern:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`frame`] defines the wire frame, its length header, and async helpers
//!   for reading and writing frames.
//! - [`deck`] holds the cards and the lock-guarded deck shared by sessions.
//! - [`room`] tracks who is seated, fans frames out, and keeps the replay
//!   history for late joiners.
//! - [`session`] drives a single connection: read, deal, broadcast, write.
//! - [`server`] binds the listeners and spawns a session per connection.
//! - [`client`] is a terminal player that sends `hit`/`stand` and prints the
//!   table.
//!
//! Integration tests exercise the server over loopback sockets.

pub mod cli;
pub mod client;
pub mod deck;
pub mod frame;
pub mod room;
pub mod server;
pub mod session;
