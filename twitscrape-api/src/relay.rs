//! Moves posts from the blocking stream worker into the async server.

use std::{io, thread::JoinHandle, time::Duration};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, error::TryRecvError},
    watch,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use twitscrape_client::Result;
use twitscrape_common::model::post::Post;

/// Drives `stream` on its own OS thread, sending every post down the returned
/// channel in the order the stream yields them.
///
/// The worker stops after the first error, or once the receiver is gone.
/// Nothing else stops it: it is meant to die with the process.
pub fn spawn_worker<I>(stream: I) -> io::Result<(JoinHandle<()>, UnboundedReceiver<Post>)>
where
    I: Iterator<Item = Result<Post>> + Send + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();

    let handle = std::thread::Builder::new()
        .name("stream-worker".to_owned())
        .spawn(move || {
            for post in stream {
                let post = match post {
                    Ok(post) => post,
                    Err(err) => {
                        error!(error = %err, "Stream failed, stopping worker");
                        return;
                    }
                };

                if sender.send(post).is_err() {
                    debug!("Relay is gone, stopping worker");
                    return;
                }
            }
        })?;

    Ok((handle, receiver))
}

/// Appends every received post to `posts` and prints its body.
///
/// Polls the channel without ever waiting on it, sleeping `poll_interval`
/// whenever nothing is ready. Returns once the worker hangs up or `shutdown`
/// is cancelled.
pub async fn relay_posts(
    mut receiver: UnboundedReceiver<Post>,
    posts: watch::Sender<Vec<Post>>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        match receiver.try_recv() {
            Ok(post) => {
                println!("{}", post.body());
                posts.send_modify(|posts| posts.push(post));
            }
            Err(TryRecvError::Empty) => {
                tokio::select! {
                    () = tokio::time::sleep(poll_interval) => {}
                    () = shutdown.cancelled() => {
                        debug!("Relay cancelled");
                        return;
                    }
                }
            }
            Err(TryRecvError::Disconnected) => {
                info!("Stream worker finished, no more posts will arrive");
                return;
            }
        }
    }
}
