use log::{debug, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::animation::{AnimationFrame, DecodeOptions, GifDecoder};
use crate::parser::DecodeError;

/// Frames buffered between the decode worker and the scheduler.
pub const STREAM_CHANNEL_CAPACITY: usize = 8;

/// Plays a sequence of frames in an endless loop on a tokio task.
///
/// Each frame is handed to the callback, then stays on screen for its
/// [`display_duration`](AnimationFrame::display_duration) before the next
/// one is delivered. Dropping the scheduler cancels it.
#[derive(Debug)]
pub struct AnimationScheduler {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AnimationScheduler {
    /// Must be called from within a tokio runtime.
    pub fn start<F>(frames: Vec<AnimationFrame>, on_frame: F) -> Self
    where
        F: FnMut(&AnimationFrame) + Send + 'static,
    {
        Self::spawn(frames, None, on_frame)
    }

    /// Like [`start`](Self::start), but frames arrive over a channel, for
    /// example from [`spawn_decode`]. Playback starts with the first frame
    /// and wraps around once the channel is closed.
    pub fn start_streaming<F>(incoming: mpsc::Receiver<AnimationFrame>, on_frame: F) -> Self
    where
        F: FnMut(&AnimationFrame) + Send + 'static,
    {
        Self::spawn(Vec::new(), Some(incoming), on_frame)
    }

    fn spawn<F>(
        frames: Vec<AnimationFrame>,
        incoming: Option<mpsc::Receiver<AnimationFrame>>,
        on_frame: F,
    ) -> Self
    where
        F: FnMut(&AnimationFrame) + Send + 'static,
    {
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run(frames, incoming, on_frame, cancel_rx));

        Self { cancel, task }
    }

    /// Stops playback and interrupts any display wait in progress. A callback
    /// the playback task has already started may still complete, on its own
    /// thread; no later frame is delivered. Await [`finished`](Self::finished)
    /// to be sure the callback has been dropped.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Waits for the playback loop to stop, either because it was cancelled
    /// or because there was nothing to play.
    pub async fn finished(self) {
        let Self { cancel, task } = self;
        if let Err(err) = task.await {
            warn!("animation task failed: {}", err);
        }
        drop(cancel);
    }
}

async fn run<F>(
    mut frames: Vec<AnimationFrame>,
    mut incoming: Option<mpsc::Receiver<AnimationFrame>>,
    mut on_frame: F,
    mut cancel: watch::Receiver<bool>,
) where
    F: FnMut(&AnimationFrame),
{
    let mut index = 0;

    loop {
        if index == frames.len() {
            match incoming.as_mut() {
                Some(receiver) => {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.changed() => break,
                        next = receiver.recv() => next,
                    };

                    match next {
                        Some(frame) => frames.push(frame),
                        None => {
                            debug!("frame stream closed after {} frames", frames.len());
                            incoming = None;
                            continue;
                        }
                    }
                }
                None if frames.is_empty() => {
                    debug!("no frames available");
                    break;
                }
                None => index = 0,
            }
        }

        // the sender is dropped together with the scheduler, which cancels too
        if *cancel.borrow() || cancel.has_changed().is_err() {
            break;
        }

        let frame = &frames[index];
        on_frame(frame);

        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = tokio::time::sleep(frame.display_duration()) => {}
        }

        index += 1;
    }

    debug!("animation stopped");
}

/// Decodes `bytes` on a blocking worker, sending each frame through the
/// returned channel as soon as it is composited.
///
/// The join handle resolves to the number of frames sent, or the error that
/// stopped decoding. Decoding stops early when the receiver is dropped.
pub fn spawn_decode(
    bytes: Vec<u8>,
    options: DecodeOptions,
) -> (
    mpsc::Receiver<AnimationFrame>,
    JoinHandle<Result<usize, DecodeError>>,
) {
    let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || -> Result<usize, DecodeError> {
        let mut sent = 0;
        for frame in GifDecoder::with_options(&bytes, options)? {
            if sender.blocking_send(frame?).is_err() {
                debug!("frame receiver dropped, stopping decode");
                break;
            }
            sent += 1;
        }
        Ok(sent)
    });

    (receiver, handle)
}
