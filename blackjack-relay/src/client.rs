use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    frame::{ActionRecord, Frame, read_frame, write_frame},
};

/// A line typed by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Action(ActionRecord),
    Quit,
    Blank,
    Unknown,
}

pub fn parse_input(line: &str) -> Input {
    let command = line.trim();
    if command.is_empty() {
        return Input::Blank;
    }
    if command.eq_ignore_ascii_case("/quit") {
        return Input::Quit;
    }
    if command.eq_ignore_ascii_case("hit") {
        return Input::Action(ActionRecord::hit());
    }
    if command.eq_ignore_ascii_case("stand") {
        return Input::Action(ActionRecord::stand());
    }
    Input::Unknown
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let (reader, mut writer) = establish_connection(&args).await?;
    write_stdout(&format!("*** connected to {}", args.server)).await?;

    let mut frames = spawn_frame_reader(reader);
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    run_client_loop(&mut frames, &mut writer, &mut stdin, &mut input).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(args: &ClientArgs) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);
    Ok(stream.into_split())
}

/// Reads frames on a separate task so a half-read frame is never dropped when
/// another branch of the client loop wins.
fn spawn_frame_reader(
    mut reader: OwnedReadHalf,
) -> mpsc::UnboundedReceiver<io::Result<Option<Frame>>> {
    let (frames, inbox) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let result = read_frame(&mut reader).await;
            let finished = !matches!(result, Ok(Some(_)));
            if frames.send(result).is_err() || finished {
                break;
            }
        }
    });
    inbox
}

async fn run_client_loop(
    frames: &mut mpsc::UnboundedReceiver<io::Result<Option<Frame>>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            server_frame = frames.recv() => {
                if !handle_server_frame(server_frame.unwrap_or(Ok(None))).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_frame(frame: io::Result<Option<Frame>>) -> Result<bool> {
    match frame? {
        Some(frame) => {
            render_frame(&frame).await?;
            Ok(true)
        }
        None => {
            write_stdout("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    if bytes_read? == 0 {
        return Ok(false);
    }

    match parse_input(input) {
        Input::Action(record) => {
            let frame = Frame::from_record(&record)?;
            write_frame(writer, &frame).await?;
            Ok(true)
        }
        Input::Quit => {
            write_stdout("*** leaving the table").await?;
            Ok(false)
        }
        Input::Blank => Ok(true),
        Input::Unknown => {
            write_stderr(&format!(
                "!!! unknown command '{}'; use hit, stand or /quit",
                input.trim()
            ))
            .await?;
            Ok(true)
        }
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn render_frame(frame: &Frame) -> io::Result<()> {
    match frame.record() {
        Ok(record) => write_stdout(&record.to_string()).await,
        Err(err) => write_stderr(&format!("!!! unreadable frame: {err}")).await,
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
