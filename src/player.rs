//! The decode thread and its controls.
//!
//! A [`Player`] owns one decode thread that pulls chunks from its
//! [`BufferQueue`], decodes them and pushes pictures to a display sink. The
//! thread only stops between start codes: [`Player::pause`] takes effect at
//! the next one, and [`Player::wait_paused`] waits for that to happen.
//! A stream end pauses the thread on its own.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};

use crate::config::DecoderConfig;
use crate::error::Result;
use crate::mpeg1::frame::{Frame, FrameBufferPair};
use crate::mpeg1::{Mpeg1Decoder, PresentMode, StartCode, VideoSink};
use crate::queue::BufferQueue;
use crate::ts::{AudioSink, DemuxSource};

const NO_PTS: i64 = -1;

#[derive(Debug, Default)]
struct State {
    run: bool,
    paused: bool,
    reset_requested: bool,
    present_request: Option<PresentMode>,
    shutdown: bool,
}

enum Checkpoint {
    Run,
    Reset,
    Present(PresentMode),
    Shutdown,
}

#[derive(Default)]
struct Control {
    state: Mutex<State>,
    cond: Condvar,
    last_pts: AtomicI64,
}

impl Control {
    /// Called by the decode thread before every start code. Blocks while paused.
    fn checkpoint(&self, queue: &BufferQueue) -> Checkpoint {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Checkpoint::Shutdown;
            }
            if state.reset_requested {
                state.reset_requested = false;
                return Checkpoint::Reset;
            }
            if let Some(mode) = state.present_request.take() {
                return Checkpoint::Present(mode);
            }
            if state.run {
                if state.paused {
                    state.paused = false;
                    debug!("decoder resumed");
                    self.cond.notify_all();
                }
                return Checkpoint::Run;
            }
            if !state.paused {
                state.paused = true;
                debug!("decoder paused");
                queue.unstick_producer();
                self.cond.notify_all();
            }
            self.cond.wait(&mut state);
        }
    }

    fn update(&self, f: impl FnOnce(&mut State)) {
        let mut state = self.state.lock();
        f(&mut state);
        self.cond.notify_all();
    }
}

/// Forwards pictures to the display and remembers what was presented.
struct Presenter<D> {
    display: D,
    control: Arc<Control>,
}

impl<D: VideoSink> VideoSink for Presenter<D> {
    fn push_video(&mut self, frame: &Frame, buffer_index: usize, pts: Option<i64>, mode: PresentMode) {
        self.display.push_video(frame, buffer_index, pts, mode);
        if let Some(pts) = pts {
            self.control.last_pts.store(pts, Ordering::Release);
        }
    }
}

pub struct Player {
    control: Arc<Control>,
    queue: BufferQueue,
    thread: Option<JoinHandle<()>>,
}

impl Player {
    /// Starts a paused decode thread. Call [`play`](Self::play) once data is queued.
    pub fn spawn<D, A>(config: &DecoderConfig, display: D, audio: A) -> Result<Player>
    where
        D: VideoSink + Send + 'static,
        A: AudioSink + Send + 'static,
    {
        let queue = BufferQueue::new(config.pool_size, config.chunk_size())?;
        let frames = FrameBufferPair::new(config.frame_width, config.frame_height)?;
        let control = Arc::new(Control {
            last_pts: AtomicI64::new(NO_PTS),
            ..Control::default()
        });

        let source = DemuxSource::new(queue.clone(), audio, config);
        let mut decoder = Mpeg1Decoder::new(source, frames);
        let mut presenter = Presenter {
            display,
            control: control.clone(),
        };
        let thread_control = control.clone();
        let thread_queue = queue.clone();

        let thread = thread::Builder::new()
            .name("mpeg-decode".to_string())
            .spawn(move || {
                info!("decode thread started");
                // an exhausted source yields two end codes in a row
                let mut at_end = false;
                loop {
                    match thread_control.checkpoint(&thread_queue) {
                        Checkpoint::Run => {}
                        Checkpoint::Reset => {
                            decoder.reset();
                            at_end = false;
                            continue;
                        }
                        Checkpoint::Present(mode) => {
                            decoder.flush_picture(mode, &mut presenter);
                            continue;
                        }
                        Checkpoint::Shutdown => break,
                    }

                    let code = decoder.step(&mut presenter);
                    if code == StartCode::SequenceEnd && !at_end {
                        thread_control.update(|state| state.run = false);
                    }
                    at_end = code == StartCode::SequenceEnd;
                }
                info!(
                    "decode thread stopped after {} pictures, {} errors",
                    decoder.pictures_decoded(),
                    decoder.error_count()
                );
            })?;

        Ok(Player {
            control,
            queue,
            thread: Some(thread),
        })
    }

    /// The queue to fill with transport stream chunks, e.g. with
    /// [`feed_chunk`](crate::source::feed_chunk).
    pub fn queue(&self) -> &BufferQueue {
        &self.queue
    }

    pub fn play(&self) {
        self.control.update(|state| state.run = true);
    }

    /// Asks the decoder to stop at the next start code.
    pub fn pause(&self) {
        self.control.update(|state| state.run = false);
    }

    pub fn is_paused(&self) -> bool {
        self.control.state.lock().paused
    }

    /// Waits until the decode thread has actually stopped. Returns `false` on timeout.
    pub fn wait_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.control.state.lock();
        while !state.paused {
            if self.control.cond.wait_until(&mut state, deadline).timed_out() {
                return state.paused;
            }
        }
        true
    }

    /// Drops all queued data and decoder state, e.g. before a seek. Takes
    /// effect at the decoder's next checkpoint, so call it while paused.
    pub fn reset(&self) {
        let drained = self.queue.drain();
        debug!("reset, {} queued chunks dropped", drained);
        self.control.last_pts.store(NO_PTS, Ordering::Release);
        self.control.update(|state| state.reset_requested = true);
    }

    /// Pushes the pending picture, or the last completed one, with `mode`.
    pub fn present_still(&self, mode: PresentMode) {
        self.control
            .update(|state| state.present_request = Some(mode));
    }

    /// Presentation time of the most recently presented picture.
    pub fn last_pts(&self) -> Option<i64> {
        match self.control.last_pts.load(Ordering::Acquire) {
            NO_PTS => None,
            pts => Some(pts),
        }
    }

    /// Stops the decode thread and waits for it. A display sink that blocks
    /// (such as [`DisplayHandoff`]) must be closed first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return,
        };
        self.control.update(|state| state.shutdown = true);
        self.queue.wake_consumer();
        self.queue.unstick_producer();
        if thread.join().is_err() {
            error!("decode thread panicked");
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What the decoder said about a handed-over picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub buffer_index: usize,
    pub pts: Option<i64>,
    pub mode: PresentMode,
}

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    info: Option<FrameInfo>,
    closed: bool,
}

#[derive(Default)]
struct Handoff {
    slot: Mutex<Slot>,
    cond: Condvar,
}

/// Decoder side of a single-slot picture handoff. Each push blocks until the
/// display side has shown the picture or closed.
///
/// Pictures are copied into a slot owned by the handoff. The display only
/// ever reads the slot, so it never aliases the decoder's reference or
/// current buffer, and the slot allocation is reused from one push to the next.
pub struct DisplayHandoff {
    shared: Arc<Handoff>,
}

/// Display side of a [`DisplayHandoff`]. Dropping it closes the handoff.
pub struct DisplayHandle {
    shared: Arc<Handoff>,
}

pub fn display_handoff() -> (DisplayHandoff, DisplayHandle) {
    let shared = Arc::new(Handoff::default());
    (
        DisplayHandoff {
            shared: shared.clone(),
        },
        DisplayHandle { shared },
    )
}

impl VideoSink for DisplayHandoff {
    fn push_video(&mut self, frame: &Frame, buffer_index: usize, pts: Option<i64>, mode: PresentMode) {
        let mut slot = self.shared.slot.lock();
        if slot.closed {
            return;
        }
        match &mut slot.frame {
            Some(shown) => shown.copy_from(frame),
            None => slot.frame = Some(frame.clone()),
        }
        slot.info = Some(FrameInfo {
            buffer_index,
            pts,
            mode,
        });
        self.shared.cond.notify_all();
        while slot.info.is_some() && !slot.closed {
            self.shared.cond.wait(&mut slot);
        }
    }
}

impl DisplayHandle {
    /// Waits up to `timeout` for a picture, hands it to `show` and releases the
    /// decoder. Returns `false` when nothing arrived or the handoff is closed.
    pub fn present_with<F>(&self, timeout: Duration, show: F) -> bool
    where
        F: FnOnce(&Frame, FrameInfo),
    {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while slot.info.is_none() && !slot.closed {
            if self.shared.cond.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        if slot.closed {
            return false;
        }
        let info = match slot.info {
            Some(info) => info,
            None => return false,
        };
        if let Some(frame) = &slot.frame {
            show(frame, info);
        }
        slot.info = None;
        self.shared.cond.notify_all();
        true
    }

    pub fn close(&self) {
        let mut slot = self.shared.slot.lock();
        slot.closed = true;
        self.shared.cond.notify_all();
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpeg1::frame::Plane;
    use crate::mpeg1::PictureType;
    use crate::source::{feed_all, open_memory, FeedOutcome};
    use crate::synth::{packetize, Macroblock, PesOptions, StreamBuilder};
    use crate::ts::DiscardAudio;

    const WAIT: Duration = Duration::from_secs(5);

    fn three_pictures(config: &DecoderConfig) -> Vec<u8> {
        let mut ts = Vec::new();
        for (i, &luma) in [30u8, 60, 90].iter().enumerate() {
            let mut builder = StreamBuilder::new();
            if i == 0 {
                builder.sequence_header(32, 32);
            }
            builder.picture(i as u16, PictureType::Intra);
            for row in 1..=2 {
                builder
                    .slice(row, 8, &vec![Macroblock::intra(luma, 128, 128); 2])
                    .unwrap();
            }
            let es = builder.finish();
            let pts = 1000 * (i as i64 + 1);
            ts.extend(packetize(config.video_pid, &es, PesOptions::video(pts)));
        }
        ts
    }

    fn luma_of(handle: &DisplayHandle) -> Option<(u8, FrameInfo)> {
        let mut seen = None;
        handle.present_with(WAIT, |frame, info| {
            seen = Some((frame.row(Plane::Luma, 31)[31], info));
        });
        seen
    }

    #[test]
    fn pause_resume_and_stills() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = DecoderConfig::new().with_frame_size(32, 32);
        let (handoff, handle) = display_handoff();
        let player = Player::spawn(&config, handoff, DiscardAudio).unwrap();
        assert!(player.wait_paused(WAIT));

        let mut reader = open_memory(three_pictures(&config), 0);
        assert!(matches!(feed_all(player.queue(), &mut reader), FeedOutcome::Ended));
        player.play();

        // pause from inside the display callback, while the decoder waits on it
        let mut first = None;
        assert!(handle.present_with(WAIT, |frame, info| {
            first = Some((frame.row(Plane::Luma, 0)[0], info.pts));
            player.pause();
        }));
        assert_eq!(first, Some((30, Some(1000))));
        assert!(player.wait_paused(WAIT));
        assert!(!handle.present_with(Duration::from_millis(50), |_, _| {}));
        assert_eq!(player.last_pts(), Some(1000));

        player.play();
        let second = luma_of(&handle).unwrap();
        assert_eq!((second.0, second.1.pts), (60, Some(2000)));
        let third = luma_of(&handle).unwrap();
        assert_eq!((third.0, third.1.pts), (90, Some(3000)));
        assert_eq!(third.1.mode, PresentMode::Normal);

        // the stream end pauses on its own
        assert!(player.wait_paused(WAIT));
        assert_eq!(player.last_pts(), Some(3000));

        player.present_still(PresentMode::Immediate);
        let still = luma_of(&handle).unwrap();
        assert_eq!(still.0, 90);
        assert_eq!(still.1.mode, PresentMode::Immediate);
        assert_eq!(still.1.buffer_index, third.1.buffer_index);

        player.reset();
        assert_eq!(player.last_pts(), None);

        handle.close();
        player.shutdown();
    }

    #[test]
    fn handoff_shows_a_copy_of_each_picture() {
        let (mut handoff, handle) = display_handoff();
        let pusher = thread::spawn(move || {
            let mut frame = Frame::new(16, 16).unwrap();
            for (index, &luma) in [40u8, 200].iter().enumerate() {
                frame.fill(luma);
                handoff.push_video(&frame, index, Some(luma as i64), PresentMode::Normal);
                // the display released the slot, so the decoder may overwrite
                frame.fill(0);
            }
        });

        for &(luma, index) in [(40u8, 0usize), (200, 1)].iter() {
            let mut seen = None;
            assert!(handle.present_with(WAIT, |frame, info| {
                seen = Some((frame.row(Plane::Luma, 15)[15], info.buffer_index, info.pts));
            }));
            assert_eq!(seen, Some((luma, index, Some(luma as i64))));
        }
        pusher.join().unwrap();
        assert!(!handle.present_with(Duration::from_millis(20), |_, _| {}));
    }

    #[test]
    fn closed_display_does_not_block_the_decoder() {
        let config = DecoderConfig::new().with_frame_size(32, 32);
        let (handoff, handle) = display_handoff();
        drop(handle);
        let player = Player::spawn(&config, handoff, DiscardAudio).unwrap();

        let mut reader = open_memory(three_pictures(&config), 0);
        feed_all(player.queue(), &mut reader);
        player.play();
        let deadline = Instant::now() + WAIT;
        while player.last_pts() != Some(3000) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(player.last_pts(), Some(3000));
        assert!(player.wait_paused(WAIT));
    }
}
