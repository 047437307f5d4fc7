//! Stream bridge: one client connection, one upstream stream.
//!
//! [`relay`] returns a response [`Body`] immediately and drives the
//! connection from a background task that multiplexes three sources:
//! 1. the keep-alive ticker (`: ping` every [`PING_INTERVAL`])
//! 2. the upstream connect attempt, then the upstream body chunks
//! 3. the client going away (receiver dropped)
//!
//! The task ends, releasing the ticker and the upstream reader, as soon as
//! the client disconnects or the upstream body ends.

use std::future::Future;
use std::io;
use std::pin::Pin;

use axum::body::Body;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

use super::stream::PING_FRAME;
use super::PING_INTERVAL;
use crate::errors::AppError;
use crate::metrics::{StreamGuard, STREAM_METRICS};

/// Frames buffered towards a slow client before the relay waits on it.
const CHANNEL_CAPACITY: usize = 64;

type Chunk = Result<Bytes, io::Error>;

/// Bridge an upstream connect attempt into a client response body.
///
/// `fallback` is sent exactly once if `connect` fails; after that the
/// body carries keep-alives only.
pub fn relay<F, S, E>(connect: F, fallback: Bytes) -> Body
where
    F: Future<Output = Result<S, AppError>> + Send + 'static,
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (rx, _task) = spawn_relay(connect, fallback);
    Body::from_stream(ReceiverStream::new(rx))
}

/// Spawn the relay task and return its output channel.
pub fn spawn_relay<F, S, E>(connect: F, fallback: Bytes) -> (mpsc::Receiver<Chunk>, JoinHandle<()>)
where
    F: Future<Output = Result<S, AppError>> + Send + 'static,
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
    let task = tokio::spawn(run_relay(tx, connect, fallback));
    (rx, task)
}

async fn run_relay<F, S, E>(tx: mpsc::Sender<Chunk>, connect: F, fallback: Bytes)
where
    F: Future<Output = Result<S, AppError>>,
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let _guard = StreamGuard::open();
    tracing::debug!("notification stream opened");

    let mut connect = Box::pin(connect);
    let mut connecting = true;
    let mut upstream: Option<Pin<Box<S>>> = None;

    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("client disconnected");
                break;
            }
            _ = ping.tick() => {
                if tx.send(Ok(Bytes::from_static(PING_FRAME))).await.is_err() {
                    break;
                }
            }
            res = &mut connect, if connecting => {
                connecting = false;
                match res {
                    Ok(body) => {
                        tracing::info!("connected to upstream notification stream");
                        upstream = Some(Box::pin(body));
                    }
                    Err(e) => {
                        tracing::warn!("upstream stream unavailable, sending placeholder: {}", e);
                        STREAM_METRICS.upstream_failure("connect");
                        STREAM_METRICS.fallback_events_total.inc();
                        if tx.send(Ok(fallback.clone())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            chunk = next_chunk(&mut upstream) => {
                match chunk {
                    Some(Ok(bytes)) => {
                        STREAM_METRICS.relayed_bytes_total.inc_by(bytes.len() as u64);
                        if tx.send(Ok(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("error reading upstream notification stream: {}", e);
                        STREAM_METRICS.upstream_failure("read");
                        break;
                    }
                    None => {
                        tracing::info!("upstream notification stream ended");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("notification stream closed");
}

/// Next upstream chunk, or never while no upstream body is open.
async fn next_chunk<S: Stream + ?Sized>(upstream: &mut Option<Pin<Box<S>>>) -> Option<S::Item> {
    match upstream {
        Some(body) => body.next().await,
        None => std::future::pending().await,
    }
}
