//! The render thread: mixer batches in, paced PCM out.

use log::{error, info};
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{PipelineError, RenderError};
use crate::mixer::action::RenderAction;
use crate::mixer::Mixer;
use crate::render::{Pacer, Renderer, Shutdown};
use crate::status::MetadataSink;

pub(crate) struct RenderLoop {
    pub mixer: Mixer,
    pub renderer: Renderer,
    pub pacer: Pacer,
    pub sink: Arc<dyn MetadataSink>,
    pub shutdown: Arc<Shutdown>,
}

impl RenderLoop {
    /// Render every batch the mixer produces into `output`.
    ///
    /// Single-action failures are logged and skipped. A mixer failure or a
    /// closed output ends the loop with an error.
    pub fn run<W: Write>(mut self, output: &mut W) -> Result<(), PipelineError> {
        self.sink.set_rendered_until(self.pacer.rendered_until());

        'batches: loop {
            if self.shutdown.is_triggered() {
                info!("Render loop interrupted.");
                break;
            }
            let batch = match self.mixer.next_batch() {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(err) => {
                    error!("Mixer failed, ending stream: {}", err);
                    self.mixer.handle().stop();
                    return Err(err.into());
                }
            };

            info!("Rendering audio data for {} actions.", batch.len());
            for action in &batch {
                if self.shutdown.is_triggered() {
                    break 'batches;
                }
                match self.render_one(action, output) {
                    Ok(()) => {}
                    Err(RenderError::Write(err)) if err.kind() == ErrorKind::BrokenPipe => {
                        error!("Transcoder input closed: {}", err);
                        self.mixer.handle().stop();
                        return Err(PipelineError::Io(err));
                    }
                    Err(err) => error!(
                        "Skipping {} action for tracks {:?}: {}",
                        action.kind(),
                        action.track_ids(),
                        err
                    ),
                }
                if !self.pacer.wait(&self.shutdown) {
                    break 'batches;
                }
            }
        }

        output.flush()?;
        info!("Render loop finished.");
        Ok(())
    }

    fn render_one<W: Write>(&mut self, action: &RenderAction, output: &mut W) -> Result<(), RenderError> {
        let started = Instant::now();
        let audio = self.renderer.render(action)?;
        output.write_all(&audio.pcm).map_err(RenderError::Write)?;

        // Tracks leaving the program are never read again.
        match action {
            RenderAction::Crossfade { outgoing: track, .. } | RenderAction::Terminate { track, .. } => {
                track.release_audio()
            }
            RenderAction::Playback { .. } => {}
        }

        let starts_at = self.pacer.rendered_until();
        let rendered_until = self.pacer.advance(audio.seconds());
        self.sink.publish(action, action.metadata(audio.frames), starts_at);
        self.sink.set_rendered_until(rendered_until);

        info!(
            "{} {:?}: {:.2}s of audio in {:.3}s",
            action.kind(),
            action.track_ids(),
            audio.seconds(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
